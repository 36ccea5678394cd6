//! `fwidth`: host process for the filament width compensator.
//!
//! Results go to stdout; logs go to stderr (and optionally a JSON log file).

mod cli;
mod error_fmt;
mod run;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use eyre::{Result, WrapErr};
use fwidth_config::Config;
use tracing_subscriber::{EnvFilter, Layer, Registry, prelude::*};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);

    if let Err(e) = color_eyre::install() {
        eprintln!("failed to install error reporter: {e}");
    }

    if let Err(err) = real_main(cli) {
        let json = JSON_MODE.get().copied().unwrap_or(false);
        if json {
            eprintln!("{}", format_error_json(&err));
        } else {
            eprintln!("{}", humanize(&err));
        }
        tracing::debug!(error = ?err, "exiting with error");
        std::process::exit(exit_code_for_error(&err));
    }
}

fn real_main(cli: Cli) -> Result<()> {
    // Calibration fitting needs no config file.
    if let Commands::Calibrate { csv } = &cli.cmd {
        init_logging(cli.json, &cli.log_level, None)?;
        return print_calibration(csv, cli.json);
    }

    let cfg = load_config(&cli.config)?;
    init_logging(cli.json, &cli.log_level, Some(&cfg.logging))?;
    let pins = run::parse_pins(&cfg)?;
    tracing::debug!(config = %cli.config.display(), dual = cfg.is_dual(), "config loaded");

    let calibration = run::resolve_calibration(&cfg, cli.calibration.as_deref())?;

    match cli.cmd {
        Commands::Run { duration_ms, send } => {
            let shutdown = Arc::new(AtomicBool::new(false));
            {
                let shutdown = shutdown.clone();
                ctrlc::set_handler(move || shutdown.store(true, Ordering::Relaxed))
                    .wrap_err("installing Ctrl-C handler")?;
            }
            let report = run::run_host(
                &cfg,
                calibration,
                duration_ms.map(Duration::from_millis),
                &send,
                shutdown,
            )?;
            print_run_report(&report, cli.json)
        }
        Commands::Command { name, reading } => {
            let response = run::one_shot(&cfg, calibration, &name, reading)?;
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({ "command": name.trim().to_ascii_uppercase(), "response": response })
                );
            } else {
                println!("{response}");
            }
            Ok(())
        }
        Commands::SelfCheck => {
            let readings = run::probe_channels(&cfg, calibration)?;
            let run::Devices {
                toolhead, scaler, ..
            } = run::assemble(&cfg, calibration)?;
            run::build_sensor(&cfg, calibration, toolhead, scaler)?;
            if cli.json {
                let channels: Vec<_> = readings
                    .iter()
                    .map(|(ch, d)| serde_json::json!({ "channel": format!("{ch:?}"), "diameter_mm": d }))
                    .collect();
                println!(
                    "{}",
                    serde_json::json!({ "status": "ok", "pins": pins.len(), "channels": channels })
                );
            } else {
                for (ch, d) in &readings {
                    println!("{ch:?} sensor: {d:.3} mm");
                }
                println!("OK");
            }
            Ok(())
        }
        Commands::Health => {
            let layout = if cfg.is_dual() { "dual" } else { "single" };
            let hardware = cfg!(feature = "hardware");
            let dump = cfg
                .persistence
                .dump_file
                .as_ref()
                .map(|p| p.display().to_string());
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "status": "ok",
                        "layout": layout,
                        "hardware": hardware,
                        "nominal_mm": cfg.filament.nominal_filament_diameter,
                        "measurement_delay_mm": cfg.filament.measurement_delay,
                        "dump_file": dump,
                    })
                );
            } else {
                println!("status: ok");
                println!("layout: {layout}");
                println!("hardware: {hardware}");
                println!("nominal_mm: {}", cfg.filament.nominal_filament_diameter);
                println!("measurement_delay_mm: {}", cfg.filament.measurement_delay);
                if let Some(d) = dump {
                    println!("dump_file: {d}");
                }
            }
            Ok(())
        }
        Commands::Calibrate { .. } => Ok(()),
    }
}

fn load_config(path: &Path) -> Result<Config> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("reading config {}", path.display()))?;
    let cfg = fwidth_config::load_toml(&text)
        .map_err(|e| fwidth_core::SensorError::Config(format!("{}: {e}", path.display())))?;
    cfg.validate()
        .map_err(|e| fwidth_core::SensorError::Config(format!("{e}")))?;
    Ok(cfg)
}

fn print_calibration(csv: &Path, json: bool) -> Result<()> {
    let fitted = fwidth_config::load_calibration_csv(csv)
        .wrap_err_with(|| format!("loading calibration CSV {}", csv.display()))?;
    if json {
        println!(
            "{}",
            serde_json::json!({
                "gain_mm_per_unit": fitted.gain_mm_per_unit,
                "offset_mm": fitted.offset_mm,
            })
        );
        return Ok(());
    }
    let mut block = toml::Table::new();
    block.insert("gain_mm_per_unit".into(), fitted.gain_mm_per_unit.into());
    block.insert("offset_mm".into(), fitted.offset_mm.into());
    let mut root = toml::Table::new();
    root.insert("calibration".into(), toml::Value::Table(block));
    print!("{}", toml::to_string(&root).wrap_err("formatting calibration")?);
    Ok(())
}

fn print_run_report(report: &run::HostReport, json: bool) -> Result<()> {
    let s = &report.summary;
    if json {
        let responses: Vec<_> = report
            .responses
            .iter()
            .map(|(name, r)| match r {
                Ok(msg) => serde_json::json!({ "command": name, "response": msg }),
                Err(e) => serde_json::json!({ "command": name, "error": e }),
            })
            .collect();
        let mut doc = serde_json::to_value(s).wrap_err("serializing run summary")?;
        doc["responses"] = serde_json::Value::Array(responses);
        doc["scaler_writes"] = report.scaler_history.len().into();
        println!("{doc}");
        return Ok(());
    }
    for (name, r) in &report.responses {
        match r {
            Ok(msg) => println!("{name}: {msg}"),
            Err(e) => println!("{name}: error: {e}"),
        }
    }
    let pct = s
        .last_percent
        .map_or_else(|| "-".to_string(), |p| format!("{p}%"));
    println!(
        "ticks={} applied={} neutral={} faults={} last={} diameter={:.3}mm queue={} elapsed={:.2}s",
        s.ticks, s.applied, s.neutral, s.host_faults, pct, s.last_diameter_mm, s.queue_len, s.elapsed_s
    );
    Ok(())
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn init_logging(json: bool, level: &str, file: Option<&fwidth_config::Logging>) -> Result<()> {
    let console_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level).wrap_err_with(|| format!("invalid log level '{level}'"))?,
    };
    let mut layers: Vec<BoxedLayer> = Vec::new();

    let console: BoxedLayer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(console_filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_filter(console_filter)
            .boxed()
    };
    layers.push(console);

    if let Some(logging) = file
        && let Some(path) = logging.file.as_deref()
    {
        let path = Path::new(path);
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
        let name = path
            .file_name()
            .ok_or_else(|| eyre::eyre!("logging.file has no file name: {}", path.display()))?;
        let appender = match logging.rotation.as_deref().unwrap_or("never") {
            "daily" => tracing_appender::rolling::daily(dir, name),
            "hourly" => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        let file_filter = EnvFilter::try_new(logging.level.as_deref().unwrap_or("info"))
            .wrap_err("invalid logging.level")?;
        layers.push(
            tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(file_filter)
                .boxed(),
        );
    }

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry().with(layers).try_init();
    Ok(())
}
