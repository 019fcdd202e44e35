//! Runs one capture session per camera, in parallel.

use std::fmt;
use std::path::PathBuf;
use std::thread;
use std::time::Instant;

use tracing::{error, info};

use crate::cancel::CancelToken;
use crate::pacer::Pacer;
use crate::platform::PlatformInfo;
use crate::resolver::DeviceResolver;
use crate::session::{CaptureConfig, CaptureSession, SessionState};
use crate::traits::{CameraId, DeviceLocator, DeviceOpener};
use crate::writer::FrameWriter;

/// How one session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    /// Camera the session captured from.
    pub camera: CameraId,
    /// Frames saved.
    pub frames_captured: u64,
    /// Whether the frames are synthetic.
    pub mock: bool,
    /// Final state: `Stopped` or `Failed`.
    pub state: SessionState,
    /// Why the real device was not used, if it was not.
    pub error: Option<String>,
    /// Directory the frames went to.
    pub output_dir: PathBuf,
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "camera {}: {} frames{} → {} ({})",
            self.camera,
            self.frames_captured,
            if self.mock { " (mocked)" } else { "" },
            self.output_dir.display(),
            self.state
        )?;
        if let Some(error) = &self.error {
            write!(f, ": {error}")?;
        }
        Ok(())
    }
}

/// Summaries of every session in a run, in the order the cameras were given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// One entry per camera.
    pub sessions: Vec<SessionSummary>,
}

impl RunReport {
    /// Whether at least one session saved a frame.
    #[must_use]
    pub fn any_frames(&self) -> bool {
        self.sessions.iter().any(|s| s.frames_captured > 0)
    }

    /// Frames saved across all sessions.
    #[must_use]
    pub fn total_frames(&self) -> u64 {
        self.sessions.iter().map(|s| s.frames_captured).sum()
    }
}

/// Drives capture sessions on worker threads until their budgets run out or
/// the run is cancelled.
#[derive(Debug)]
pub struct Orchestrator<O> {
    platform: PlatformInfo,
    opener: O,
}

impl<O: DeviceOpener> Orchestrator<O> {
    /// Orchestrator opening devices through `opener`.
    pub fn new(platform: PlatformInfo, opener: O) -> Self {
        Self { platform, opener }
    }

    /// Run every session to completion and report how each ended.
    ///
    /// Cancelling `cancel` stops this run only; each run takes its own token.
    /// Blocks until all workers have closed their sessions.
    pub fn run(&self, configs: &[CaptureConfig], cancel: &CancelToken) -> RunReport {
        // A lone camera may be substituted by any working device; with
        // several, each session keeps its own so no device is claimed twice.
        let resolved = match configs {
            [config] => DeviceResolver::new(&self.platform, &self.opener)
                .resolve(std::slice::from_ref(&config.camera)),
            _ => None,
        };

        info!("Starting {} capture session(s)", configs.len());
        let sessions = thread::scope(|scope| {
            let workers: Vec<_> = configs
                .iter()
                .map(|config| {
                    let locator = resolved.clone();
                    let worker = thread::Builder::new()
                        .name(format!("capture-{}", config.camera.safe_name()))
                        .spawn_scoped(scope, move || self.run_session(config, locator, cancel));
                    (config, worker)
                })
                .collect();

            workers
                .into_iter()
                .map(|(config, worker)| {
                    let joined = worker
                        .map_err(|err| err.to_string())
                        .and_then(|handle| {
                            handle
                                .join()
                                .map_err(|_| "capture worker panicked".to_owned())
                        });
                    joined.unwrap_or_else(|reason| {
                        error!("Camera {}: {reason}", config.camera);
                        failed_summary(config, reason)
                    })
                })
                .collect()
        });

        RunReport { sessions }
    }

    /// Open, capture at the configured pace, close.
    fn run_session(
        &self,
        config: &CaptureConfig,
        locator: Option<DeviceLocator>,
        cancel: &CancelToken,
    ) -> SessionSummary {
        let mut session = CaptureSession::new(config.clone(), self.platform, self.opener.clone());
        if let Some(locator) = locator {
            session = session.with_locator(locator);
        }

        let outcome = session.open();
        if outcome.opened {
            let pacer = Pacer::new(config.fps, config.duration);
            while !cancel.is_cancelled() && !pacer.budget_elapsed() {
                let loop_start = Instant::now();
                session.capture_and_save(&config.label);
                if pacer.wait_or_cancel(loop_start, cancel) {
                    break;
                }
            }
        }
        session.close();

        SessionSummary {
            camera: config.camera.clone(),
            frames_captured: session.frames_saved(),
            mock: session.is_mock(),
            state: session.state(),
            error: outcome
                .error
                .map(|err| err.to_string())
                .or_else(|| session.last_error().map(str::to_owned)),
            output_dir: session.output_dir().to_path_buf(),
        }
    }
}

fn failed_summary(config: &CaptureConfig, reason: String) -> SessionSummary {
    SessionSummary {
        camera: config.camera.clone(),
        frames_captured: 0,
        mock: false,
        state: SessionState::Failed,
        error: Some(reason),
        output_dir: FrameWriter::new(&config.output_root, &config.camera)
            .dir()
            .to_path_buf(),
    }
}
