//! Multicam-Capture: still-frame capture from several cameras at once.
//!
//! Each requested camera gets its own [`CaptureSession`] on its own worker
//! thread. A session opens its device through a [`DeviceOpener`], retrying
//! with progressively more specific settings, and falls back to synthetic
//! frames when no hardware can be used. Frames are converted to RGB and
//! written as JPEG files named so that [`FrameName::parse`] can recover where
//! and when each one was taken.
//!
//! Device access sits behind traits so the whole pipeline runs against mock
//! devices in tests.

pub mod cancel;
pub mod config;
pub mod convert;
#[cfg(target_os = "linux")]
pub mod device;
pub mod orchestrator;
pub mod pacer;
pub mod platform;
pub mod resolver;
pub mod session;
pub mod synthetic;
pub mod traits;
pub mod unsupported;
pub mod validation;
pub mod writer;

#[cfg(test)]
pub mod mock;

pub use cancel::CancelToken;
pub use config::{CliOverrides, ConfigError, FileConfig, Settings};
#[cfg(target_os = "linux")]
pub use device::{V4L2Device, V4l2Opener};
pub use orchestrator::{Orchestrator, RunReport, SessionSummary};
pub use platform::{Platform, PlatformInfo};
pub use resolver::DeviceResolver;
pub use session::{CaptureConfig, CaptureSession, OpenOutcome, SessionState};
pub use traits::{
    CameraDevice, CameraError, CameraId, DeviceCapabilities, DeviceLocator, DeviceOpener, Format,
    FourCC, Frame, FrameMetadata,
};
pub use unsupported::UnsupportedOpener;
pub use writer::{FrameName, FrameRecord, FrameWriter};

/// Opener for the capture backend compiled into this build.
#[cfg(target_os = "linux")]
pub type SystemOpener = V4l2Opener;

/// Opener for the capture backend compiled into this build.
#[cfg(not(target_os = "linux"))]
pub type SystemOpener = UnsupportedOpener;
