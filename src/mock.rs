//! Mock devices for testing without hardware.
//!
//! [`MockOpener`] hands out [`MockDevice`]s for a configurable set of
//! locators and keeps count of opened and released handles, so tests can
//! check that every exit path gives the device back.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::traits::{
    CameraDevice, CameraError, DeviceCapabilities, DeviceLocator, DeviceOpener, Format, FourCC,
    Frame, FrameMetadata, Result,
};

/// Test pattern types for mock frame generation.
#[derive(Debug, Clone, Copy)]
pub enum TestPattern {
    /// SMPTE color bars pattern.
    ColorBars,
    /// Horizontal gradient from dark to light.
    Gradient,
    /// Solid color with specified Y, U, V values.
    Solid(u8, u8, u8),
}

#[derive(Debug)]
struct MockState {
    openable: HashSet<DeviceLocator>,
    dead: HashSet<DeviceLocator>,
    format: Format,
    pattern: TestPattern,
    failing_opens: usize,
    fail_every: Option<u32>,
    stall: Option<Duration>,
    reject_configuration: bool,
    opens: usize,
    releases: usize,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            openable: HashSet::new(),
            dead: HashSet::new(),
            format: Format::new(64, 48, FourCC::YUYV),
            pattern: TestPattern::ColorBars,
            failing_opens: 0,
            fail_every: None,
            stall: None,
            reject_configuration: false,
            opens: 0,
            releases: 0,
        }
    }
}

/// Opener backed by in-memory devices.
#[derive(Debug, Clone, Default)]
pub struct MockOpener {
    state: Arc<Mutex<MockState>>,
}

impl MockOpener {
    /// Opener with no openable devices.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `locator` openable.
    #[must_use]
    pub fn with_device(self, locator: DeviceLocator) -> Self {
        self.state.lock().openable.insert(locator);
        self
    }

    /// Make `locator` openable but unable to deliver a single frame.
    #[must_use]
    pub fn with_dead_device(self, locator: DeviceLocator) -> Self {
        {
            let mut state = self.state.lock();
            state.openable.insert(locator.clone());
            state.dead.insert(locator);
        }
        self
    }

    /// Native format of every device.
    #[must_use]
    pub fn with_format(self, format: Format) -> Self {
        self.state.lock().format = format;
        self
    }

    /// Pattern every device produces.
    #[must_use]
    pub fn with_pattern(self, pattern: TestPattern) -> Self {
        self.state.lock().pattern = pattern;
        self
    }

    /// Fail the first `count` opens regardless of locator.
    #[must_use]
    pub fn failing_first_opens(self, count: usize) -> Self {
        self.state.lock().failing_opens = count;
        self
    }

    /// Make every `n`th read of each device fail.
    #[must_use]
    pub fn failing_every_nth_read(self, n: u32) -> Self {
        self.state.lock().fail_every = Some(n);
        self
    }

    /// Make every read block for `stall` and then time out.
    #[must_use]
    pub fn stalling_reads(self, stall: Duration) -> Self {
        self.state.lock().stall = Some(stall);
        self
    }

    /// Make every `set_format` and `set_frame_rate` call fail after opening.
    #[must_use]
    pub fn rejecting_configuration(self) -> Self {
        self.state.lock().reject_configuration = true;
        self
    }

    /// Number of successful opens so far.
    pub fn opens(&self) -> usize {
        self.state.lock().opens
    }

    /// Number of handles released so far.
    pub fn releases(&self) -> usize {
        self.state.lock().releases
    }

    /// Handles currently open.
    pub fn live(&self) -> usize {
        let state = self.state.lock();
        state.opens - state.releases
    }
}

impl DeviceOpener for MockOpener {
    type Device = MockDevice;

    fn open(&self, locator: &DeviceLocator) -> Result<Self::Device> {
        let mut state = self.state.lock();
        if state.failing_opens > 0 {
            state.failing_opens -= 1;
            return Err(CameraError::DeviceOpenFailed(format!(
                "{locator}: simulated open failure"
            )));
        }
        if !state.openable.contains(locator) {
            return Err(CameraError::DeviceNotFound(locator.clone()));
        }
        state.opens += 1;

        Ok(MockDevice {
            capabilities: DeviceCapabilities {
                driver: "mock".to_owned(),
                card: "Mock Camera".to_owned(),
                bus_info: format!("mock:{locator}"),
                can_capture: true,
                can_stream: true,
            },
            format: state.format.clone(),
            pattern: state.pattern,
            fail_every: state.fail_every,
            stall: state.stall,
            dead: state.dead.contains(locator),
            reject_configuration: state.reject_configuration,
            frame_count: 0,
            state: Arc::clone(&self.state),
        })
    }
}

/// Mock device handle. Dropping it counts as a release.
#[derive(Debug)]
pub struct MockDevice {
    capabilities: DeviceCapabilities,
    format: Format,
    pattern: TestPattern,
    fail_every: Option<u32>,
    stall: Option<Duration>,
    dead: bool,
    reject_configuration: bool,
    frame_count: u32,
    state: Arc<Mutex<MockState>>,
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.state.lock().releases += 1;
    }
}

impl CameraDevice for MockDevice {
    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn format(&self) -> Result<Format> {
        Ok(self.format.clone())
    }

    fn set_format(&mut self, format: &Format) -> Result<Format> {
        if self.reject_configuration {
            return Err(CameraError::FormatNotSupported(format.clone()));
        }
        self.format = format.clone();
        Ok(self.format.clone())
    }

    fn set_frame_rate(&mut self, fps: u32) -> Result<u32> {
        if self.reject_configuration {
            return Err(CameraError::StreamError(format!("{fps} fps rejected")));
        }
        Ok(fps)
    }

    fn next_frame(&mut self) -> Result<Frame> {
        if let Some(stall) = self.stall {
            std::thread::sleep(stall);
            return Err(CameraError::Timeout);
        }
        if self.dead {
            return Err(CameraError::StreamError("no buffers dequeued".to_owned()));
        }

        let seq = self.frame_count;
        self.frame_count += 1;

        if self.fail_every.is_some_and(|n| self.frame_count % n == 0) {
            return Err(CameraError::StreamError("simulated read failure".to_owned()));
        }

        Ok(Frame {
            data: generate_test_frame(&self.format, self.pattern),
            format: self.format.clone(),
            metadata: FrameMetadata {
                sequence: seq,
                timestamp: Duration::from_millis(u64::from(seq) * 33), // ~30fps
                bytes_used: self.format.size,
            },
        })
    }
}

/// Generate YUYV test frame data based on pattern.
pub fn generate_test_frame(format: &Format, pattern: TestPattern) -> Vec<u8> {
    // 8 color bars: White, Yellow, Cyan, Green, Magenta, Red, Blue, Black
    const BARS: [(u8, u8, u8); 8] = [
        (235, 128, 128),
        (210, 16, 146),
        (170, 166, 16),
        (145, 54, 34),
        (106, 202, 222),
        (81, 90, 240),
        (41, 240, 110),
        (16, 128, 128),
    ];

    let width = format.width;
    let mut data = vec![0u8; (width * format.height * 2) as usize];

    for row in data.chunks_exact_mut((width * 2) as usize) {
        for (pair, yuyv) in (0u32..).zip(row.chunks_exact_mut(4)) {
            let x = pair * 2;
            let (y, u, v) = match pattern {
                TestPattern::ColorBars => {
                    let bar = (x / (width / 8).max(1)).min(7) as usize;
                    BARS.get(bar).copied().unwrap_or((16, 128, 128))
                }
                #[allow(clippy::cast_possible_truncation)]
                TestPattern::Gradient => (((x * 255) / width) as u8, 128, 128),
                TestPattern::Solid(y, u, v) => (y, u, v),
            };
            yuyv.copy_from_slice(&[y, u, y, v]);
        }
    }

    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn video0() -> DeviceLocator {
        DeviceLocator::Path(PathBuf::from("/dev/video0"))
    }

    #[test]
    fn test_unknown_locator_is_not_found() {
        let opener = MockOpener::new();
        assert!(matches!(
            opener.open(&video0()),
            Err(CameraError::DeviceNotFound(_))
        ));
        assert_eq!(opener.opens(), 0);
    }

    #[test]
    fn test_drop_counts_as_release() {
        let opener = MockOpener::new().with_device(video0());
        let device = opener.open(&video0()).expect("open should succeed");
        assert_eq!(device.capabilities().driver, "mock");
        assert_eq!(opener.live(), 1);
        drop(device);
        assert_eq!(opener.live(), 0);
        assert_eq!(opener.releases(), 1);
    }

    #[test]
    fn test_failing_first_opens() {
        let opener = MockOpener::new().with_device(video0()).failing_first_opens(2);
        assert!(opener.open(&video0()).is_err());
        assert!(opener.open(&video0()).is_err());
        assert!(opener.open(&video0()).is_ok());
    }

    #[test]
    fn test_mock_stream_capture() {
        let opener = MockOpener::new().with_device(video0());
        let mut device = opener.open(&video0()).expect("open should succeed");

        let frame1 = device.next_frame().expect("next_frame should succeed");
        assert_eq!(frame1.metadata.sequence, 0);
        assert_eq!(frame1.data.len(), 64 * 48 * 2);

        let frame2 = device.next_frame().expect("next_frame should succeed");
        assert_eq!(frame2.metadata.sequence, 1);
    }

    #[test]
    fn test_every_nth_read_fails() {
        let opener = MockOpener::new().with_device(video0()).failing_every_nth_read(3);
        let mut device = opener.open(&video0()).expect("open should succeed");
        let results: Vec<bool> = (0..6).map(|_| device.next_frame().is_ok()).collect();
        assert_eq!(results, vec![true, true, false, true, true, false]);
    }

    #[test]
    fn test_dead_device_opens_but_never_reads() {
        let opener = MockOpener::new().with_dead_device(video0());
        let mut device = opener.open(&video0()).expect("open should succeed");
        assert!(device.capabilities().can_capture);
        assert!(device.next_frame().is_err());
        assert!(device.next_frame().is_err());
    }

    #[test]
    fn test_stalled_read_times_out() {
        let opener = MockOpener::new()
            .with_device(video0())
            .stalling_reads(Duration::from_millis(20));
        let mut device = opener.open(&video0()).expect("open should succeed");
        assert!(matches!(device.next_frame(), Err(CameraError::Timeout)));
    }

    #[test]
    fn test_color_bars_pattern() {
        let format = Format::new(640, 480, FourCC::YUYV);
        let data = generate_test_frame(&format, TestPattern::ColorBars);
        assert_eq!(data.len(), 640 * 480 * 2);
        assert_eq!(data.first(), Some(&235));
    }

    #[test]
    fn test_solid_pattern() {
        let format = Format::new(64, 64, FourCC::YUYV);
        let data = generate_test_frame(&format, TestPattern::Solid(128, 64, 192));
        assert_eq!(data.get(..4), Some(&[128, 64, 128, 192][..]));
    }
}
