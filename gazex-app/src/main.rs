use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gazex_app::{
    ControlChannel, ControlMessage, JsonLinesTelemetry, Replayer, Session, SessionConfig,
    TrackerKind,
};
use gazex_core::{Command, PhaseCodeTable};
use gazex_experiment::HeadlessScene;
use gazex_eye::CalibrationParameters;
use gazex_timing::HighPrecisionTimer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "gazex", version, about = "Gaze-contingent trial runner")]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Run a session. Commands and calibration JSON are read from stdin, one per line.
    Run {
        /// Session configuration (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Calibration to apply before the first frame
        #[arg(long)]
        calibration: Option<PathBuf>,

        /// Telemetry output, JSON lines
        #[arg(long)]
        telemetry: Option<PathBuf>,

        /// Overrides the configured tracker
        #[arg(long, value_enum)]
        tracker: Option<TrackerKind>,

        /// Stop after this many frames
        #[arg(long)]
        ticks: Option<u64>,

        /// Begin without waiting for a command
        #[arg(long)]
        autostart: bool,
    },
    /// Replay a telemetry recording
    Replay {
        #[arg(long)]
        input: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print a phase code table
    Phases {
        /// legacy, extended or ordinal
        #[arg(long, default_value = "ordinal")]
        table: PhaseCodeTable,
    },
}

fn load_config(path: Option<&Path>) -> Result<SessionConfig> {
    match path {
        Some(path) => SessionConfig::load(path),
        None => SessionConfig::default().validated(),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "gazex=info".into()))
        .init();

    match cli.command {
        Cmd::Run {
            config,
            calibration,
            telemetry,
            tracker,
            ticks,
            autostart,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(kind) = tracker {
                config.tracker.kind = kind;
            }
            let telemetry = telemetry.or_else(|| config.telemetry.path.clone());
            info!("gazex v{} starting", env!("CARGO_PKG_VERSION"));

            let mut session = Session::new(config, HighPrecisionTimer::new(), HeadlessScene::new())?;
            if let Some(path) = telemetry {
                session = session.with_telemetry(Box::new(JsonLinesTelemetry::create(&path)?));
                info!("recording telemetry to {}", path.display());
            }
            if let Some(path) = calibration {
                let json = fs::read_to_string(&path)
                    .with_context(|| format!("reading calibration {}", path.display()))?;
                let params = CalibrationParameters::from_json(&json)
                    .with_context(|| format!("parsing calibration {}", path.display()))?;
                session.apply_calibration(params);
            }

            let bus = session.control_bus();
            let _control = ControlChannel::spawn_stdin(bus.clone()).context("starting control channel")?;
            if autostart {
                bus.publish(ControlMessage::Command(Command::Begin));
            }

            let report = session.run(ticks);
            info!(
                "{} frames, {} trials completed, ended in {}",
                report.frames,
                report.results.len(),
                report.final_phase
            );
        }
        Cmd::Replay { input, config } => {
            let config = load_config(config.as_deref())?;
            let report = Replayer::load(&input, config)?.run(&mut HeadlessScene::new())?;
            for line in &report.lines {
                println!("{line}");
            }
        }
        Cmd::Phases { table } => {
            println!("phase codes ({})", table.as_str());
            for (code, phase) in table.entries() {
                println!("{code:>3}  {phase}");
            }
        }
    }

    Ok(())
}
