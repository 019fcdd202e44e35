//! Core traits and types for the camera abstraction.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Abstract camera request, as given on the command line or in the config file.
///
/// Numeric names such as `"2"` are normalized to [`CameraId::Index`] so that
/// `--cameras 2` and `cameras: [2]` mean the same camera.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "RawCameraId")]
pub enum CameraId {
    /// Zero-based device index.
    Index(u32),
    /// Platform-specific device name or path.
    Name(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawCameraId {
    Index(u32),
    Name(String),
}

impl From<RawCameraId> for CameraId {
    fn from(raw: RawCameraId) -> Self {
        match raw {
            RawCameraId::Index(index) => Self::Index(index),
            RawCameraId::Name(name) => Self::from(name),
        }
    }
}

impl From<String> for CameraId {
    fn from(name: String) -> Self {
        name.trim()
            .parse::<u32>()
            .map_or(Self::Name(name), Self::Index)
    }
}

impl From<u32> for CameraId {
    fn from(index: u32) -> Self {
        Self::Index(index)
    }
}

impl FromStr for CameraId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::from(s.to_owned()))
    }
}

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => write!(f, "{index}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

/// Characters that cannot appear in a single path component on every
/// supported platform.
const RESERVED: [char; 9] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

impl CameraId {
    /// Identifier usable as one directory component.
    ///
    /// Spaces, path separators and other reserved characters become
    /// underscores, so a device path such as `/dev/v4l/by-id/usb-cam` never
    /// nests directories.
    #[must_use]
    pub fn safe_name(&self) -> String {
        self.to_string()
            .chars()
            .map(|c| if c == ' ' || is_reserved(c) { '_' } else { c })
            .collect()
    }

    /// Identifier as written into frame file names.
    ///
    /// The id is kept verbatim when it is legal in a file name, so it parses
    /// back unchanged; otherwise this is [`CameraId::safe_name`].
    #[must_use]
    pub fn file_name_id(&self) -> String {
        let raw = self.to_string();
        if raw.chars().any(is_reserved) {
            self.safe_name()
        } else {
            raw
        }
    }
}

fn is_reserved(c: char) -> bool {
    c.is_control() || RESERVED.contains(&c)
}

/// Concrete, openable device address produced by the platform backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeviceLocator {
    /// Device index understood by the platform's capture API.
    Index(u32),
    /// Device node path, e.g. `/dev/video0`.
    Path(PathBuf),
    /// Friendly device name that could not be mapped to an index.
    Name(String),
}

impl fmt::Display for DeviceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => write!(f, "#{index}"),
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Name(name) => write!(f, "\"{name}\""),
        }
    }
}

/// Pixel format representation (e.g., YUYV, MJPG, RGB3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Create a new `FourCC` from a 4-byte array.
    #[must_use]
    pub const fn new(code: &[u8; 4]) -> Self {
        Self(*code)
    }

    /// YUYV pixel format (4:2:2 packed).
    pub const YUYV: Self = Self::new(b"YUYV");
    /// MJPEG pixel format (Motion JPEG).
    pub const MJPG: Self = Self::new(b"MJPG");
    /// RGB3 pixel format (24-bit RGB).
    pub const RGB3: Self = Self::new(b"RGB3");
    /// BGR3 pixel format (24-bit BGR, the usual native order of webcams).
    pub const BGR3: Self = Self::new(b"BGR3");

    /// Bytes per pixel for packed formats, `None` for compressed ones.
    #[must_use]
    pub const fn bytes_per_pixel(self) -> Option<u32> {
        match self.0 {
            [b'Y', b'U', b'Y', b'V'] => Some(2),
            [b'R', b'G', b'B', b'3'] | [b'B', b'G', b'R', b'3'] => Some(3),
            _ => None,
        }
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

#[cfg(target_os = "linux")]
impl From<v4l::FourCC> for FourCC {
    fn from(fourcc: v4l::FourCC) -> Self {
        Self(fourcc.repr)
    }
}

#[cfg(target_os = "linux")]
impl From<FourCC> for v4l::FourCC {
    fn from(fourcc: FourCC) -> Self {
        Self::new(&fourcc.0)
    }
}

/// Video format specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel format.
    pub fourcc: FourCC,
    /// Bytes per line (stride), zero for compressed formats.
    pub stride: u32,
    /// Total frame size in bytes (upper bound for compressed formats).
    pub size: u32,
}

impl Format {
    /// Create a new format specification with a tightly packed stride.
    #[must_use]
    pub const fn new(width: u32, height: u32, fourcc: FourCC) -> Self {
        let (stride, size) = match fourcc.bytes_per_pixel() {
            Some(bpp) => (width * bpp, width * bpp * height),
            None => (0, width * height * 3),
        };
        Self {
            width,
            height,
            fourcc,
            stride,
            size,
        }
    }

    /// Same pixel format at a different resolution.
    #[must_use]
    pub const fn with_size(&self, width: u32, height: u32) -> Self {
        Self::new(width, height, self.fourcc)
    }
}

/// Device capability flags.
#[derive(Debug, Clone, Default)]
pub struct DeviceCapabilities {
    /// Driver name.
    pub driver: String,
    /// Card/device name.
    pub card: String,
    /// Bus information.
    pub bus_info: String,
    /// Whether the device can capture video.
    pub can_capture: bool,
    /// Whether the device supports streaming.
    pub can_stream: bool,
}

/// Metadata for a captured frame.
#[derive(Debug, Clone)]
pub struct FrameMetadata {
    /// Driver-side frame sequence number.
    pub sequence: u32,
    /// Driver capture timestamp.
    pub timestamp: Duration,
    /// Actual bytes used in the frame buffer.
    pub bytes_used: u32,
}

/// A raw frame as delivered by the device, in its native pixel format.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw frame data.
    pub data: Vec<u8>,
    /// Format the data is laid out in.
    pub format: Format,
    /// Frame metadata.
    pub metadata: FrameMetadata,
}

/// Error type for camera operations.
#[derive(Debug, Error)]
pub enum CameraError {
    /// Locator does not name a device on this system.
    #[error("device {0} not found")]
    DeviceNotFound(DeviceLocator),
    /// Failed to open device.
    #[error("failed to open device: {0}")]
    DeviceOpenFailed(String),
    /// Every open attempt and every probe candidate failed.
    #[error("no device could be opened for camera {0}")]
    DeviceUnavailable(CameraId),
    /// Open failed and mock fallback is disabled.
    #[error("camera {camera} failed to open and mock fallback is disabled: {reason}")]
    FatalOpen {
        /// Camera that failed.
        camera: CameraId,
        /// Last open error.
        reason: String,
    },
    /// Operation not valid in the session's current state.
    #[error("session is {0}")]
    InvalidState(String),
    /// Requested format is not supported.
    #[error("format not supported: {0:?}")]
    FormatNotSupported(Format),
    /// Error during streaming operation.
    #[error("stream error: {0}")]
    StreamError(String),
    /// Operation timed out.
    #[error("operation timed out")]
    Timeout,
    /// Frame could not be decoded or encoded.
    #[error("image codec error: {0}")]
    Codec(#[from] image::ImageError),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for camera operations.
pub type Result<T> = std::result::Result<T, CameraError>;

/// An open camera handle. Dropping it releases the device.
pub trait CameraDevice {
    /// Get device capabilities.
    fn capabilities(&self) -> &DeviceCapabilities;

    /// Get current format.
    fn format(&self) -> Result<Format>;

    /// Set capture format. Returns the actual format set by the driver.
    fn set_format(&mut self, format: &Format) -> Result<Format>;

    /// Request a frame rate. Returns the rate the driver settled on.
    fn set_frame_rate(&mut self, fps: u32) -> Result<u32>;

    /// Block until the next frame is available and return it.
    fn next_frame(&mut self) -> Result<Frame>;
}

/// Opens devices by locator.
///
/// Openers are shared by every capture worker, so they must be cheap to clone
/// and safe to send across threads. The devices they return are not: each one
/// lives and dies on the worker that opened it.
pub trait DeviceOpener: Clone + Send + Sync {
    /// Device handle type produced by this opener.
    type Device: CameraDevice;

    /// Open the device at `locator`.
    fn open(&self, locator: &DeviceLocator) -> Result<Self::Device>;
}
