use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

// Fast simulated line: 500 mm/s feed, 10 mm sensor-to-nozzle, 1.5 mm strand.
fn write_sim_config(dir: &tempfile::TempDir, extra: &str) -> PathBuf {
    let toml = format!(
        r#"
[sensor]
hall_sensor_1 = "sim:a"

[filament]
nominal_filament_diameter = 1.75
min_filament_diameter = 1.0
max_filament_diameter = 3.0
measurement_delay = 10.0
measurement_interval_mm = 1.0

[sampling]
report_interval_ms = 5
sample_time_ms = 0
read_timeout_ms = 50

[control]
interval_ms = 20

[simulation]
feed_rate_mm_s = 500.0
base_diameter_mm = 1.5
{extra}
"#
    );
    let path = dir.path().join("fwidth.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn fwidth() -> Command {
    Command::cargo_bin("fwidth").unwrap()
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["command", "QUERY_FILAMENT_WIDTH"], 0, "Filament NOT present", "stdout")]
#[case(&["command", "query_filament_width", "--reading", "1.72"], 0, "Filament dia (measured mm): 1.720", "stdout")]
#[case(&["command", "RESET_FILAMENT_WIDTH_SENSOR"], 0, "Filament width measurements cleared!", "stdout")]
#[case(&["command", "DISABLE_FILAMENT_WIDTH_SENSOR"], 0, "Turned Off", "stdout")]
#[case(&["command", "ENABLE_FILAMENT_WIDTH_SENSOR"], 0, "already On", "stdout")]
#[case(&["command", "SET_FILAMENT_WIDTH"], 3, "Unknown command 'SET_FILAMENT_WIDTH'", "stderr")]
#[case(&["run", "--bogus"], 2, "unexpected argument", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_sim_config(&dir, "");

    let mut cmd = fwidth();
    cmd.arg("--config").arg(&cfg).args(args);

    let assert = cmd.assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        _ => {
            assert.stderr(predicate::str::contains(needle));
        }
    }
}

#[test]
fn run_json_reports_corrective_multiplier() {
    let dir = tempdir().unwrap();
    let cfg = write_sim_config(&dir, "");

    let out = fwidth()
        .args(["--json", "--log-level", "warn", "--config"])
        .arg(&cfg)
        .args(["run", "--duration-ms", "600"])
        .output()
        .unwrap();
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["last_percent"], 136);
    assert!(v["applied"].as_u64().unwrap() >= 1);
    assert_eq!(v["host_faults"], 0);
    assert!(v["scaler_writes"].as_u64().unwrap() >= 1);
}

#[test]
fn run_answers_sent_commands() {
    let dir = tempdir().unwrap();
    let cfg = write_sim_config(&dir, "");

    let out = fwidth()
        .args(["--json", "--log-level", "warn", "--config"])
        .arg(&cfg)
        .args([
            "run",
            "--duration-ms",
            "200",
            "--send",
            "DISABLE_FILAMENT_WIDTH_SENSOR",
        ])
        .output()
        .unwrap();
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["commands"], 1);
    assert_eq!(v["responses"][0]["command"], "DISABLE_FILAMENT_WIDTH_SENSOR");
    assert_eq!(v["responses"][0]["response"], "Filament width sensor Turned Off");
    // disabled before the first wake
    assert_eq!(v["ticks"], 0);
}

#[test]
fn run_rejects_unknown_sent_command_before_starting() {
    let dir = tempdir().unwrap();
    let cfg = write_sim_config(&dir, "");

    fwidth()
        .arg("--config")
        .arg(&cfg)
        .args(["run", "--duration-ms", "50", "--send", "NOPE"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Unknown command 'NOPE'"));
}

#[test]
fn run_writes_queue_snapshot() {
    let dir = tempdir().unwrap();
    let dump = dir.path().join("queue.json");
    let extra = format!("\n[persistence]\ndump_file = {:?}\n", dump.display().to_string());
    let cfg = write_sim_config(&dir, &extra);

    fwidth()
        .args(["--log-level", "warn", "--config"])
        .arg(&cfg)
        .args(["run", "--duration-ms", "200"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ticks="));

    let v: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&dump).unwrap()).unwrap();
    assert_eq!(v["measurement_delay_mm"], 10.0);
    assert!(v["entries"].is_array());
}

#[test]
fn same_pin_for_both_sensors_is_rejected() {
    let dir = tempdir().unwrap();
    let toml = r#"
[sensor]
hall_sensor_1 = "sim:a"
hall_sensor_2 = "sim:a"

[filament]
measurement_delay = 50.0
"#;
    let cfg = dir.path().join("dup.toml");
    fs::write(&cfg, toml).unwrap();

    fwidth()
        .arg("--config")
        .arg(&cfg)
        .arg("health")
        .assert()
        .code(4)
        .stderr(predicate::str::contains("same pin"));
}

#[rstest]
#[case("ads1115:0", "ads1115@0x48:0")]
#[case("ads1115@0x49:2", "ads1115@0X49:2")]
#[case(" sim:a", "sim:a ")]
fn aliased_pins_are_the_same_pin(#[case] pin1: &str, #[case] pin2: &str) {
    let dir = tempdir().unwrap();
    let toml = format!(
        r#"
[sensor]
hall_sensor_1 = "{pin1}"
hall_sensor_2 = "{pin2}"

[filament]
measurement_delay = 50.0
"#
    );
    let cfg = dir.path().join("alias.toml");
    fs::write(&cfg, toml).unwrap();

    fwidth()
        .arg("--config")
        .arg(&cfg)
        .arg("health")
        .assert()
        .code(4)
        .stderr(predicate::str::contains("same pin"));
}

#[test]
fn invalid_pin_is_reported() {
    let dir = tempdir().unwrap();
    let toml = r#"
[sensor]
hall_sensor_1 = "gpio17"

[filament]
measurement_delay = 50.0
"#;
    let cfg = dir.path().join("pin.toml");
    fs::write(&cfg, toml).unwrap();

    fwidth()
        .arg("--config")
        .arg(&cfg)
        .arg("self-check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("gpio17"));
}

#[test]
fn missing_config_file_fails() {
    fwidth()
        .args(["--config", "/definitely/not/here.toml", "health"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not/here.toml"));
}

#[test]
fn self_check_reads_every_channel() {
    let dir = tempdir().unwrap();
    let cfg = write_sim_config(&dir, "");

    fwidth()
        .args(["--log-level", "warn", "--config"])
        .arg(&cfg)
        .arg("self-check")
        .assert()
        .success()
        .stdout(predicate::str::contains("First sensor: 1.500 mm"))
        .stdout(predicate::str::contains("OK"));
}

#[test]
fn health_json_describes_layout() {
    let dir = tempdir().unwrap();
    let cfg = write_sim_config(&dir, "");

    let out = fwidth()
        .args(["--json", "--config"])
        .arg(&cfg)
        .arg("health")
        .output()
        .unwrap();
    assert!(out.status.success());
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["status"], "ok");
    assert_eq!(v["layout"], "single");
    assert_eq!(v["measurement_delay_mm"], 10.0);
}

#[test]
fn calibrate_prints_toml_block() {
    let dir = tempdir().unwrap();
    let csv = dir.path().join("cal.csv");
    fs::write(&csv, "reading,diameter\n1.0,1.5\n2.0,2.0\n3.0,2.5\n").unwrap();

    let out = fwidth().args(["calibrate", "--csv"]).arg(&csv).output().unwrap();
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let text = String::from_utf8(out.stdout).unwrap();
    assert!(text.contains("[calibration]"), "{text}");
    let parsed: toml::Table = text.parse().unwrap();
    let gain = parsed["calibration"]["gain_mm_per_unit"].as_float().unwrap();
    let offset = parsed["calibration"]["offset_mm"].as_float().unwrap();
    assert!((gain - 0.5).abs() < 1e-9);
    assert!((offset - 1.0).abs() < 1e-9);
}

#[test]
fn bad_calibration_header_is_explained() {
    let dir = tempdir().unwrap();
    let cfg = write_sim_config(&dir, "");
    let csv = dir.path().join("bad.csv");
    fs::write(&csv, "raw,mm\n1.0,1.5\n2.0,2.0\n").unwrap();

    fwidth()
        .arg("--config")
        .arg(&cfg)
        .arg("--calibration")
        .arg(&csv)
        .arg("health")
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "Invalid headers in calibration CSV. Expected 'reading,diameter'.",
        ));
}

#[test]
fn csv_calibration_applies_to_readings() {
    let dir = tempdir().unwrap();
    let cfg = write_sim_config(&dir, "");
    let csv = dir.path().join("cal.csv");
    fs::write(&csv, "reading,diameter\n1.0,1.5\n2.0,2.0\n3.0,2.5\n").unwrap();

    // 0.5 * 1.5 + 1.0
    fwidth()
        .arg("--config")
        .arg(&cfg)
        .arg("--calibration")
        .arg(&csv)
        .args(["command", "QUERY_FILAMENT_WIDTH", "--reading", "1.5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1.750"));
}
