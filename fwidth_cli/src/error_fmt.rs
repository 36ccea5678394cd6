//! Human-readable error descriptions and structured JSON error formatting.

use fwidth_core::{BuildError, SensorError};

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingToolhead => {
                "What happened: No toolhead was provided to the compensator.\nLikely causes: The extruder position source was not wired into the builder.\nHow to fix: Pass a toolhead via with_toolhead(...).".to_string()
            }
            BuildError::MissingScaler => {
                "What happened: No extrusion scaler was provided to the compensator.\nLikely causes: The M221 sink was not wired into the builder.\nHow to fix: Pass a scaler via with_scaler(...).".to_string()
            }
            BuildError::MissingDelay => {
                "What happened: measurement_delay was not set.\nLikely causes: The [filament] table has no measurement_delay.\nHow to fix: Set filament.measurement_delay to the sensor-to-nozzle distance in mm.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun."
            ),
        };
    }

    if let Some(se) = err.downcast_ref::<SensorError>() {
        return match se {
            SensorError::UnknownCommand(name) => format!(
                "What happened: Unknown command '{name}'.\nLikely causes: Typo in the command name.\nHow to fix: Use one of QUERY_FILAMENT_WIDTH, RESET_FILAMENT_WIDTH_SENSOR, DISABLE_FILAMENT_WIDTH_SENSOR, ENABLE_FILAMENT_WIDTH_SENSOR."
            ),
            SensorError::Timeout => "What happened: Hall sensor read timed out.\nLikely causes: ADC not wired correctly, wrong I2C address, or timeout too low.\nHow to fix: Verify [sensor] pins and raise sampling.read_timeout_ms.".to_string(),
            SensorError::Hardware(_) | SensorError::HardwareFault(_) => format!(
                "What happened: {se}.\nLikely causes: ADC power, wiring or bus permissions.\nHow to fix: Check the sensor wiring and that the process can open the I2C bus."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    let msg = err.to_string();
    let lower = format!("{err:#}").to_ascii_lowercase();

    if lower.contains("calibration csv must have headers") {
        return "Invalid headers in calibration CSV. Expected 'reading,diameter'.".to_string();
    }

    if lower.contains("invalid sensor pin") {
        return format!(
            "What happened: {msg}.\nLikely causes: Pin is not of the form ads1115:<ch>, ads1115@0x<addr>:<ch> or sim:<name>.\nHow to fix: Fix [sensor] hall_sensor_1 / hall_sensor_2 in the config."
        );
    }

    if lower.contains("open ads1115") {
        return "What happened: Failed to open the ADS1115.\nLikely causes: Wrong bus or address, or insufficient I2C permissions.\nHow to fix: Check the [sensor] pins and the i2c group membership.".to_string();
    }

    if lower.contains("config") && (lower.contains("must") || lower.contains("missing")) {
        return format!(
            "What happened: Configuration is invalid or incomplete ({msg}).\nLikely causes: Missing [filament] values or out-of-range limits.\nHow to fix: Edit the TOML config and try again."
        );
    }

    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes: 3 unknown command, 4 configuration, 5 sensor hardware, 1 otherwise.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    if err.downcast_ref::<BuildError>().is_some() {
        return 4;
    }
    match err.downcast_ref::<SensorError>() {
        Some(SensorError::UnknownCommand(_)) => 3,
        Some(SensorError::Config(_)) => 4,
        Some(SensorError::Timeout | SensorError::Hardware(_) | SensorError::HardwareFault(_)) => 5,
        _ => 1,
    }
}

fn reason_name(err: &eyre::Report) -> &'static str {
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::InvalidConfig(_) => "InvalidConfig",
            _ => "BuildIncomplete",
        };
    }
    match err.downcast_ref::<SensorError>() {
        Some(SensorError::UnknownCommand(_)) => "UnknownCommand",
        Some(SensorError::Config(_)) => "Config",
        Some(SensorError::Timeout) => "Timeout",
        Some(SensorError::Hardware(_) | SensorError::HardwareFault(_)) => "Hardware",
        Some(SensorError::Io(_)) => "Io",
        Some(SensorError::State(_)) => "State",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    serde_json::json!({
        "reason": reason_name(err),
        "exit_code": exit_code_for_error(err),
        "message": humanize(err),
    })
    .to_string()
}
