//! Multicam-capture binary: capture JPEG stills from one or more cameras.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use multicam_capture::config::{load_config, CliOverrides, Settings};
use multicam_capture::{
    CameraId, CancelToken, DeviceResolver, Orchestrator, PlatformInfo, SessionState,
    SystemOpener,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Capture still frames from several cameras in parallel.
#[derive(Debug, Parser)]
#[command(name = "multicam-capture", version, about)]
struct Cli {
    /// YAML configuration file. Missing is fine.
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Cameras to capture from: indices or device names.
    #[arg(long, num_args = 1..)]
    cameras: Vec<CameraId>,

    /// Output root directory.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Target frames per second.
    #[arg(long)]
    fps: Option<u32>,

    /// Capture duration in seconds. Runs until Ctrl-C when omitted.
    #[arg(short, long)]
    duration: Option<f64>,

    /// Label embedded in every file name.
    #[arg(short, long)]
    label: Option<String>,

    /// Fail instead of writing synthetic frames when a camera cannot be opened.
    #[arg(long)]
    no_mock: bool,

    /// Probe for working cameras, print them and exit.
    #[arg(long)]
    list_cameras: bool,
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            cameras: self.cameras.clone(),
            output_dir: self.output.clone(),
            fps: self.fps,
            duration: self.duration,
            label: self.label.clone(),
            no_mock: self.no_mock,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_names(true)
        .init();

    match run(&Cli::parse()) {
        Ok(code) => code,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let platform = PlatformInfo::detect();
    info!(
        "multicam-capture v{} on {} ({}){}",
        env!("CARGO_PKG_VERSION"),
        platform.platform,
        platform.platform.backend_name(),
        if platform.is_jetson { ", Jetson" } else { "" }
    );

    if cli.list_cameras {
        let found = DeviceResolver::new(&platform, &SystemOpener::default()).list_available();
        if found.is_empty() {
            println!("No working cameras found");
        }
        for locator in &found {
            println!("{locator}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    let file = load_config(&cli.config)?;
    let settings = Settings::merge(cli.overrides(), file).context("invalid configuration")?;
    info!(
        "Capturing from {} camera(s) at {} fps into {}",
        settings.cameras.len(),
        settings.fps,
        settings.output_dir.display()
    );

    let orchestrator = Orchestrator::new(platform, SystemOpener::default());
    let cancel = CancelToken::new();
    let interrupt = cancel.clone();
    ctrlc::set_handler(move || {
        info!("Interrupt received, stopping capture");
        interrupt.cancel();
    })
    .context("failed to install Ctrl-C handler")?;

    let report = orchestrator.run(&settings.capture_configs(), &cancel);

    for summary in &report.sessions {
        if summary.state == SessionState::Failed {
            warn!("{summary}");
        } else {
            info!("{summary}");
        }
    }
    info!("Captured {} frames in total", report.total_frames());

    Ok(if report.any_frames() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
