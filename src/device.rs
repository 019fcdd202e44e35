//! V4L2 device implementation using the v4l crate.

use std::io;
use std::time::Duration;

use tracing::debug;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream as _;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::Device;

use crate::traits::{
    CameraDevice, CameraError, DeviceCapabilities, DeviceLocator, DeviceOpener, Format, FourCC,
    Frame, FrameMetadata, Result,
};

/// Number of mmap buffers queued while streaming.
const BUFFER_COUNT: u32 = 4;

/// Bounds on how long one dequeue may block before reporting a timeout.
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(100);
const MAX_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// V4L2 device implementation wrapping the v4l crate.
///
/// Streaming starts lazily on the first [`CameraDevice::next_frame`] call and
/// stops whenever the format changes.
pub struct V4L2Device {
    // Declared before `device` so buffers are unmapped before the fd closes.
    stream: Option<Stream<'static>>,
    device: Device,
    capabilities: DeviceCapabilities,
    format: Format,
    read_timeout: Duration,
}

impl V4L2Device {
    /// Open a V4L2 device by index (e.g., 0 for /dev/video0) or node path.
    ///
    /// Nodes that cannot capture video (metadata nodes, output devices) are
    /// rejected here so the caller moves on to the next candidate.
    pub fn open(locator: &DeviceLocator) -> Result<Self> {
        let device = match locator {
            DeviceLocator::Index(index) => Device::new(*index as usize),
            DeviceLocator::Path(path) => Device::with_path(path),
            DeviceLocator::Name(_) => return Err(CameraError::DeviceNotFound(locator.clone())),
        }
        .map_err(|err| CameraError::DeviceOpenFailed(format!("{locator}: {err}")))?;

        let caps = device
            .query_caps()
            .map_err(|err| CameraError::DeviceOpenFailed(format!("{locator}: {err}")))?;

        let capabilities = DeviceCapabilities {
            driver: caps.driver,
            card: caps.card,
            bus_info: caps.bus,
            can_capture: caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE),
            can_stream: caps.capabilities.contains(v4l::capability::Flags::STREAMING),
        };

        if !capabilities.can_capture {
            return Err(CameraError::DeviceOpenFailed(format!(
                "{locator} ({}) is not a video capture device",
                capabilities.card
            )));
        }

        let format = query_format(&device)?;
        debug!(
            "Opened {locator}: {} [{}] {}x{} {}",
            capabilities.card, capabilities.driver, format.width, format.height, format.fourcc
        );

        Ok(Self {
            stream: None,
            device,
            capabilities,
            format,
            read_timeout: MAX_READ_TIMEOUT,
        })
    }
}

/// Two frame intervals at `fps`, kept within the read timeout bounds.
fn read_timeout(fps: u32) -> Duration {
    (Duration::from_secs(2) / fps.max(1)).clamp(MIN_READ_TIMEOUT, MAX_READ_TIMEOUT)
}

fn query_format(device: &Device) -> Result<Format> {
    let fmt = device
        .format()
        .map_err(|err| CameraError::StreamError(err.to_string()))?;

    Ok(Format {
        width: fmt.width,
        height: fmt.height,
        fourcc: FourCC::from(fmt.fourcc),
        stride: fmt.stride,
        size: fmt.size,
    })
}

fn stream_error(err: &io::Error) -> CameraError {
    if err.kind() == io::ErrorKind::TimedOut {
        CameraError::Timeout
    } else {
        CameraError::StreamError(err.to_string())
    }
}

impl CameraDevice for V4L2Device {
    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn format(&self) -> Result<Format> {
        Ok(self.format.clone())
    }

    fn set_format(&mut self, format: &Format) -> Result<Format> {
        // The driver refuses S_FMT while buffers are mapped.
        self.stream = None;

        let mut fmt = self
            .device
            .format()
            .map_err(|err| CameraError::StreamError(err.to_string()))?;

        fmt.width = format.width;
        fmt.height = format.height;
        fmt.fourcc = format.fourcc.into();

        self.device
            .set_format(&fmt)
            .map_err(|_| CameraError::FormatNotSupported(format.clone()))?;

        self.format = query_format(&self.device)?;
        Ok(self.format.clone())
    }

    fn set_frame_rate(&mut self, fps: u32) -> Result<u32> {
        self.stream = None;

        let params = self
            .device
            .set_params(&Parameters::with_fps(fps))
            .map_err(|err| CameraError::StreamError(err.to_string()))?;

        let interval = params.interval;
        let granted = interval.denominator / interval.numerator.max(1);
        self.read_timeout = read_timeout(granted);
        Ok(granted)
    }

    fn next_frame(&mut self) -> Result<Frame> {
        if self.stream.is_none() {
            let mut stream = Stream::with_buffers(&self.device, Type::VideoCapture, BUFFER_COUNT)
                .map_err(|err| CameraError::StreamError(err.to_string()))?;
            // A stalled device must not block the capture loop past a cancel.
            stream.set_timeout(self.read_timeout);
            self.stream = Some(stream);
        }
        let Some(stream) = self.stream.as_mut() else {
            return Err(CameraError::StreamError("stream not started".to_owned()));
        };

        let (buf, meta) = stream.next().map_err(|err| stream_error(&err))?;

        // MJPG buffers are only partially filled.
        let used = (meta.bytesused as usize).min(buf.len());
        let data = buf.get(..used).unwrap_or(buf).to_vec();

        // Safe conversions: V4L2 timestamps are always non-negative in practice
        #[allow(clippy::cast_sign_loss)]
        let secs = meta.timestamp.sec.max(0) as u64;
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let nanos = (meta.timestamp.usec.max(0) as u32).saturating_mul(1000);

        Ok(Frame {
            data,
            format: self.format.clone(),
            metadata: FrameMetadata {
                sequence: meta.sequence,
                timestamp: Duration::new(secs, nanos),
                bytes_used: meta.bytesused,
            },
        })
    }
}

/// Opens `/dev/video*` nodes through V4L2.
#[derive(Debug, Clone, Copy, Default)]
pub struct V4l2Opener;

impl DeviceOpener for V4l2Opener {
    type Device = V4L2Device;

    fn open(&self, locator: &DeviceLocator) -> Result<Self::Device> {
        V4L2Device::open(locator)
    }
}
