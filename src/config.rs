//! Run configuration: a YAML file merged with command-line overrides.
//!
//! ```yaml
//! cameras: [0, 1]
//! output_dir: ./frames
//! fps: 30
//! duration: 10      # seconds; omit to run until interrupted
//! mock_fallback: true
//! label: no_user
//! ```
//!
//! Precedence is command line, then file, then built-in default.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::session::{CaptureConfig, DEFAULT_LABEL};
use crate::traits::CameraId;
use crate::writer::label_problem;

/// Default output directory.
pub const DEFAULT_OUTPUT_DIR: &str = "./frames";
/// Default frame rate.
pub const DEFAULT_FPS: u32 = 30;

/// Configuration problems. All of them abort the run before any camera is
/// touched.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("cannot read {path}: {source}")]
    Read {
        /// Config file.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },
    /// The file is not valid YAML for this schema.
    #[error("cannot parse {path}: {source}")]
    Parse {
        /// Config file.
        path: PathBuf,
        /// Underlying error.
        source: serde_yaml::Error,
    },
    /// Frame rate must be positive.
    #[error("fps must be greater than zero")]
    InvalidFps,
    /// Duration must be a finite, non-negative number of seconds.
    #[error("invalid duration: {0} seconds")]
    InvalidDuration(f64),
    /// Nothing to capture from.
    #[error("no cameras configured")]
    NoCameras,
    /// Label cannot be embedded in a file name.
    #[error("invalid label {label:?}: {reason}")]
    InvalidLabel {
        /// Offending label.
        label: String,
        /// What is wrong with it.
        reason: &'static str,
    },
}

/// Contents of the YAML file. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Cameras to capture from.
    pub cameras: Option<Vec<CameraId>>,
    /// Output root directory.
    pub output_dir: Option<PathBuf>,
    /// Target frame rate.
    pub fps: Option<u32>,
    /// Capture duration in seconds.
    pub duration: Option<f64>,
    /// Whether to fall back to mock frames.
    pub mock_fallback: Option<bool>,
    /// File name label.
    pub label: Option<String>,
}

/// Load `path`. A missing file yields an empty configuration.
pub fn load_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!("No config file at {}, using defaults", path.display());
            return Ok(FileConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    // An empty file parses as YAML null.
    if text.trim().is_empty() {
        return Ok(FileConfig::default());
    }

    serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Values given on the command line. `None` means "not given".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliOverrides {
    /// `--cameras`; empty when not given.
    pub cameras: Vec<CameraId>,
    /// `--output`.
    pub output_dir: Option<PathBuf>,
    /// `--fps`.
    pub fps: Option<u32>,
    /// `--duration`, seconds.
    pub duration: Option<f64>,
    /// `--label`.
    pub label: Option<String>,
    /// `--no-mock`.
    pub no_mock: bool,
}

/// Fully resolved, validated settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Cameras, duplicates removed, in the order given.
    pub cameras: Vec<CameraId>,
    /// Output root.
    pub output_dir: PathBuf,
    /// Target frame rate.
    pub fps: u32,
    /// Capture budget.
    pub duration: Option<Duration>,
    /// Mock fallback enabled.
    pub mock_fallback: bool,
    /// File name label.
    pub label: String,
}

impl Settings {
    /// Merge command line over file over defaults, then validate.
    pub fn merge(cli: CliOverrides, file: FileConfig) -> Result<Self, ConfigError> {
        let requested = if cli.cameras.is_empty() {
            file.cameras.unwrap_or_else(|| vec![CameraId::Index(0)])
        } else {
            cli.cameras
        };
        if requested.is_empty() {
            return Err(ConfigError::NoCameras);
        }

        let mut cameras: Vec<CameraId> = Vec::with_capacity(requested.len());
        for camera in requested {
            if cameras.contains(&camera) {
                warn!("Camera {camera} listed more than once, ignoring duplicate");
            } else {
                cameras.push(camera);
            }
        }

        let fps = cli.fps.or(file.fps).unwrap_or(DEFAULT_FPS);
        if fps == 0 {
            return Err(ConfigError::InvalidFps);
        }

        let duration = cli
            .duration
            .or(file.duration)
            .map(|secs| {
                Duration::try_from_secs_f64(secs).map_err(|_| ConfigError::InvalidDuration(secs))
            })
            .transpose()?;

        let label = cli
            .label
            .or(file.label)
            .unwrap_or_else(|| DEFAULT_LABEL.to_owned());
        if let Some(reason) = label_problem(&label) {
            return Err(ConfigError::InvalidLabel { label, reason });
        }

        Ok(Self {
            cameras,
            output_dir: cli
                .output_dir
                .or(file.output_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            fps,
            duration,
            mock_fallback: !cli.no_mock && file.mock_fallback.unwrap_or(true),
            label,
        })
    }

    /// One session configuration per camera.
    #[must_use]
    pub fn capture_configs(&self) -> Vec<CaptureConfig> {
        self.cameras
            .iter()
            .map(|camera| {
                CaptureConfig::new(camera.clone(), &self.output_dir)
                    .with_fps(self.fps)
                    .with_duration(self.duration)
                    .with_mock_fallback(self.mock_fallback)
                    .with_label(self.label.clone())
            })
            .collect()
    }
}
