//! Opener for platforms without a native capture backend.
//!
//! Every open fails, which sends sessions down the mock fallback path.

use crate::platform::Platform;
use crate::traits::{
    CameraDevice, CameraError, DeviceCapabilities, DeviceLocator, DeviceOpener, Format, Frame,
    Result,
};

/// Device type that can never be constructed.
#[derive(Debug)]
pub enum NoDevice {}

impl CameraDevice for NoDevice {
    fn capabilities(&self) -> &DeviceCapabilities {
        match *self {}
    }

    fn format(&self) -> Result<Format> {
        match *self {}
    }

    fn set_format(&mut self, _format: &Format) -> Result<Format> {
        match *self {}
    }

    fn set_frame_rate(&mut self, _fps: u32) -> Result<u32> {
        match *self {}
    }

    fn next_frame(&mut self) -> Result<Frame> {
        match *self {}
    }
}

/// Opener that reports every device as unavailable.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedOpener;

impl DeviceOpener for UnsupportedOpener {
    type Device = NoDevice;

    fn open(&self, locator: &DeviceLocator) -> Result<Self::Device> {
        Err(CameraError::DeviceOpenFailed(format!(
            "{locator}: no {} capture backend is built into this binary",
            Platform::current().backend_name()
        )))
    }
}
