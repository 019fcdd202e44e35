//! Single-camera capture session.
//!
//! A session owns one device handle (or its synthetic stand-in) from open to
//! close:
//!
//! ```text
//! Uninitialized → Opening ─┬→ Running { mock: false } ─┐
//!                          ├→ Running { mock: true }  ─┴→ Stopped
//!                          └→ Failed
//! ```
//!
//! Opening walks an ordered list of [`OpenAttempt`]s and releases the handle
//! after every failed attempt. When all of them fail the session either
//! switches to mock mode or ends in `Failed`, depending on
//! [`CaptureConfig::allow_mock_fallback`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};
use image::RgbImage;
use tracing::{debug, error, info, warn};

use crate::convert;
use crate::platform::PlatformInfo;
use crate::synthetic::{SyntheticSource, DEFAULT_HEIGHT, DEFAULT_WIDTH};
use crate::traits::{
    CameraDevice, CameraError, CameraId, DeviceLocator, DeviceOpener, Format, FourCC, Result,
};
use crate::writer::{FrameName, FrameRecord, FrameWriter};

/// Label used when the caller does not supply one.
pub const DEFAULT_LABEL: &str = "no_user";

/// Everything one session needs. Immutable once the session starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Camera to capture from.
    pub camera: CameraId,
    /// Root directory; the session writes into `camera_<safe id>` below it.
    pub output_root: PathBuf,
    /// Target frames per second.
    pub fps: u32,
    /// Capture budget. `None` runs until cancelled.
    pub duration: Option<Duration>,
    /// Substitute random frames when the camera cannot be opened.
    pub allow_mock_fallback: bool,
    /// Width of synthetic frames.
    pub mock_width: u32,
    /// Height of synthetic frames.
    pub mock_height: u32,
    /// Label embedded in every file name.
    pub label: String,
}

impl CaptureConfig {
    /// Defaults: 30 fps, unbounded, mock fallback on, 1280×720 mock frames.
    #[must_use]
    pub fn new<P: Into<PathBuf>>(camera: CameraId, output_root: P) -> Self {
        Self {
            camera,
            output_root: output_root.into(),
            fps: 30,
            duration: None,
            allow_mock_fallback: true,
            mock_width: DEFAULT_WIDTH,
            mock_height: DEFAULT_HEIGHT,
            label: DEFAULT_LABEL.to_owned(),
        }
    }

    /// Set the target frame rate.
    #[must_use]
    pub const fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    /// Set the capture budget.
    #[must_use]
    pub const fn with_duration(mut self, duration: Option<Duration>) -> Self {
        self.duration = duration;
        self
    }

    /// Enable or disable mock fallback.
    #[must_use]
    pub const fn with_mock_fallback(mut self, allow: bool) -> Self {
        self.allow_mock_fallback = allow;
        self
    }

    /// Set the synthetic frame size.
    #[must_use]
    pub const fn with_mock_resolution(mut self, width: u32, height: u32) -> Self {
        self.mock_width = width;
        self.mock_height = height;
        self
    }

    /// Set the file name label.
    #[must_use]
    pub fn with_label<S: Into<String>>(mut self, label: S) -> Self {
        self.label = label.into();
        self
    }
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, not opened yet.
    Uninitialized,
    /// Working through open attempts.
    Opening,
    /// Producing frames, from hardware or synthesized.
    Running {
        /// Frames are synthetic.
        mock: bool,
    },
    /// Closed normally.
    Stopped,
    /// Could not open and fallback was not allowed.
    Failed,
}

impl SessionState {
    /// Whether frames can be captured.
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Running { .. })
    }

    /// Whether the session has reached the end of its lifecycle.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => f.write_str("uninitialized"),
            Self::Opening => f.write_str("opening"),
            Self::Running { mock: false } => f.write_str("running"),
            Self::Running { mock: true } => f.write_str("running (mock)"),
            Self::Stopped => f.write_str("stopped"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// Device settings applied by one open attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureOptions {
    /// Frame size to request.
    pub size: Option<(u32, u32)>,
    /// Frame rate to request.
    pub frame_rate: Option<u32>,
}

impl fmt::Display for CaptureOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.size, self.frame_rate) {
            (None, None) => f.write_str("driver defaults"),
            (Some((w, h)), None) => write!(f, "{w}x{h}"),
            (None, Some(fps)) => write!(f, "{fps} fps"),
            (Some((w, h)), Some(fps)) => write!(f, "{w}x{h} @ {fps} fps"),
        }
    }
}

/// One entry of the open retry list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenAttempt {
    /// Settings to apply after opening.
    pub options: CaptureOptions,
    /// Why this attempt is in the list, for logs.
    pub rationale: &'static str,
}

/// Open attempts in the order they are tried.
///
/// Defaults first, then explicit sizes from low to high, then size and rate
/// together. The first attempt that opens and configures cleanly wins.
#[must_use]
pub fn open_attempts(fps: u32) -> Vec<OpenAttempt> {
    let attempt = |size, frame_rate, rationale| OpenAttempt {
        options: CaptureOptions { size, frame_rate },
        rationale,
    };
    vec![
        attempt(None, None, "driver defaults"),
        attempt(None, Some(fps), "requested frame rate only"),
        attempt(Some((640, 480)), None, "VGA, supported by nearly every camera"),
        attempt(Some((1280, 720)), None, "HD"),
        attempt(Some((1920, 1080)), None, "full HD"),
        attempt(Some((1280, 720)), Some(fps), "HD at the requested frame rate"),
    ]
}

/// Result of [`CaptureSession::open`].
#[derive(Debug)]
pub struct OpenOutcome {
    /// The session is running (possibly in mock mode).
    pub opened: bool,
    /// Frames will be synthetic.
    pub using_mock: bool,
    /// Why the real device could not be used, if it could not.
    pub error: Option<CameraError>,
}

/// A frame converted to RGB, ready to be saved.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// Pixel data.
    pub image: RgbImage,
    /// When the frame was obtained.
    pub captured_at: DateTime<Local>,
    /// Whether the frame is synthetic.
    pub mock: bool,
}

/// Owns one camera from open to close.
pub struct CaptureSession<O: DeviceOpener> {
    config: CaptureConfig,
    platform: PlatformInfo,
    opener: O,
    locator: DeviceLocator,
    writer: FrameWriter,
    state: SessionState,
    device: Option<O::Device>,
    synthetic: Option<SyntheticSource>,
    mock: bool,
    next_sequence: u64,
    last_error: Option<String>,
}

impl<O: DeviceOpener> CaptureSession<O> {
    /// New session for `config`, addressing the camera through `platform`.
    pub fn new(config: CaptureConfig, platform: PlatformInfo, opener: O) -> Self {
        let locator = platform.resolve_device_path(&config.camera);
        let writer = FrameWriter::new(&config.output_root, &config.camera);
        Self {
            config,
            platform,
            opener,
            locator,
            writer,
            state: SessionState::Uninitialized,
            device: None,
            synthetic: None,
            mock: false,
            next_sequence: 0,
            last_error: None,
        }
    }

    /// Open `locator` instead of the camera's own device, e.g. one picked by
    /// the resolver.
    #[must_use]
    pub fn with_locator(mut self, locator: DeviceLocator) -> Self {
        self.locator = locator;
        self
    }

    /// Camera this session captures from.
    pub const fn camera(&self) -> &CameraId {
        &self.config.camera
    }

    /// Session configuration.
    pub const fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Device this session opens.
    pub const fn locator(&self) -> &DeviceLocator {
        &self.locator
    }

    /// Current state.
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the session fell back to synthetic frames. Stays set after close.
    pub const fn is_mock(&self) -> bool {
        self.mock
    }

    /// Frames saved so far.
    pub const fn frames_saved(&self) -> u64 {
        self.next_sequence
    }

    /// Last open error, if the real device could not be used.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Directory frames are written to.
    pub fn output_dir(&self) -> &Path {
        self.writer.dir()
    }

    /// Open the device, retrying with each [`OpenAttempt`], and fall back to
    /// mock mode if allowed.
    ///
    /// Opening a running session reports its current mode; opening a closed
    /// or failed one is an error.
    pub fn open(&mut self) -> OpenOutcome {
        match self.state {
            SessionState::Running { mock } => {
                return OpenOutcome {
                    opened: true,
                    using_mock: mock,
                    error: None,
                };
            }
            SessionState::Uninitialized => {}
            other => {
                return OpenOutcome {
                    opened: false,
                    using_mock: false,
                    error: Some(CameraError::InvalidState(other.to_string())),
                };
            }
        }

        self.state = SessionState::Opening;
        info!(
            "Opening camera {} at {} ({}, jetson: {})",
            self.config.camera,
            self.locator,
            self.platform.platform.backend_name(),
            self.platform.is_jetson
        );

        if let Err(err) = self.writer.ensure_dir() {
            warn!("Cannot create {} yet: {err}", self.writer.dir().display());
        }

        let mut last_error = None;
        for attempt in open_attempts(self.config.fps) {
            debug!(
                "Camera {}: trying {} ({})",
                self.config.camera, attempt.options, attempt.rationale
            );
            match self.try_open(&attempt) {
                Ok(device) => {
                    info!(
                        "Camera {} opened with {}",
                        self.config.camera, attempt.options
                    );
                    self.device = Some(device);
                    self.state = SessionState::Running { mock: false };
                    return OpenOutcome {
                        opened: true,
                        using_mock: false,
                        error: None,
                    };
                }
                Err(err) => {
                    debug!("Camera {}: {} failed: {err}", self.config.camera, attempt.options);
                    last_error = Some(err);
                }
            }
        }

        let reason = last_error.map_or_else(|| "no open attempts".to_owned(), |err| err.to_string());
        self.last_error = Some(reason.clone());

        if self.config.allow_mock_fallback {
            let source = SyntheticSource::new(self.config.mock_width, self.config.mock_height);
            warn!(
                "Camera {} unavailable ({reason}); falling back to mock mode at {}x{}",
                self.config.camera, self.config.mock_width, self.config.mock_height
            );
            self.synthetic = Some(source);
            self.mock = true;
            self.state = SessionState::Running { mock: true };
            OpenOutcome {
                opened: true,
                using_mock: true,
                error: Some(CameraError::DeviceUnavailable(self.config.camera.clone())),
            }
        } else {
            error!(
                "Failed to open camera {} and mock fallback is disabled: {reason}",
                self.config.camera
            );
            self.state = SessionState::Failed;
            OpenOutcome {
                opened: false,
                using_mock: false,
                error: Some(CameraError::FatalOpen {
                    camera: self.config.camera.clone(),
                    reason,
                }),
            }
        }
    }

    /// Open and configure once. The handle is dropped, and so released, on
    /// every error return.
    fn try_open(&self, attempt: &OpenAttempt) -> Result<O::Device> {
        let mut device = self.opener.open(&self.locator)?;

        if !device.capabilities().can_capture {
            return Err(CameraError::DeviceOpenFailed(format!(
                "{} cannot capture video",
                self.locator
            )));
        }

        let mut format = device.format()?;
        if let Some((width, height)) = attempt.options.size {
            format = device.set_format(&format.with_size(width, height))?;
        }
        if !convert::is_supported(format.fourcc) {
            let fallback = Format::new(format.width, format.height, FourCC::YUYV);
            format = device.set_format(&fallback)?;
            if !convert::is_supported(format.fourcc) {
                return Err(CameraError::FormatNotSupported(format));
            }
        }
        if let Some(fps) = attempt.options.frame_rate {
            let actual = device.set_frame_rate(fps)?;
            if actual != fps {
                debug!("Camera {}: asked for {fps} fps, got {actual}", self.config.camera);
            }
        }

        debug!(
            "Camera {}: {}x{} {}",
            self.config.camera, format.width, format.height, format.fourcc
        );
        Ok(device)
    }

    /// Grab one frame. `None` if the session is not running or the read
    /// failed; a failed read leaves the session running.
    pub fn capture_frame(&mut self) -> Option<CapturedFrame> {
        let SessionState::Running { mock } = self.state else {
            return None;
        };

        if mock {
            let source = self.synthetic?;
            return Some(CapturedFrame {
                image: source.frame(),
                captured_at: Local::now(),
                mock: true,
            });
        }

        let device = self.device.as_mut()?;
        match device.next_frame().and_then(|frame| convert::to_rgb(&frame)) {
            Ok(image) => Some(CapturedFrame {
                image,
                captured_at: Local::now(),
                mock: false,
            }),
            Err(err) => {
                warn!("Failed to capture frame from camera {}: {err}", self.config.camera);
                None
            }
        }
    }

    /// Persist `frame` and assign it the next sequence number.
    pub fn save_frame(&mut self, frame: &CapturedFrame, label: &str) -> Result<FrameRecord> {
        if !self.state.is_running() {
            return Err(CameraError::InvalidState(self.state.to_string()));
        }

        let sequence = self.next_sequence;
        let name = FrameName::new(&self.config.camera, &frame.captured_at, frame.mock, label);
        let path = self.writer.write(&frame.image, &name, sequence)?;
        self.next_sequence += 1;

        Ok(FrameRecord {
            session_id: self.config.camera.clone(),
            sequence,
            captured_at: frame.captured_at,
            is_mock: frame.mock,
            path,
        })
    }

    /// [`CaptureSession::capture_frame`] followed by [`CaptureSession::save_frame`].
    pub fn capture_and_save(&mut self, label: &str) -> Option<FrameRecord> {
        let frame = self.capture_frame()?;
        match self.save_frame(&frame, label) {
            Ok(record) => {
                debug!(
                    "Saved frame {} from camera {}: {}",
                    record.sequence,
                    self.config.camera,
                    record.path.display()
                );
                Some(record)
            }
            Err(err) => {
                warn!("Failed to save frame from camera {}: {err}", self.config.camera);
                None
            }
        }
    }

    /// Release the device and stop. Safe to call more than once; a failed
    /// session stays failed.
    pub fn close(&mut self) {
        if let Some(device) = self.device.take() {
            drop(device);
            debug!("Camera {} released {}", self.config.camera, self.locator);
        }
        self.synthetic = None;

        if !self.state.is_terminal() {
            self.state = SessionState::Stopped;
            info!(
                "Camera {} stopped after {} frames",
                self.config.camera, self.next_sequence
            );
        }
    }
}

impl<O: DeviceOpener> Drop for CaptureSession<O> {
    fn drop(&mut self) {
        self.close();
    }
}
