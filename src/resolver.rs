//! Two-phase device discovery.
//!
//! Phase one tries the requested cameras in order; phase two probes the
//! platform's enumeration range. The first device that opens, reports
//! capture capability and delivers a frame wins. Every probe handle is released before the next
//! candidate is touched.

use tracing::{debug, info, warn};

use crate::platform::PlatformInfo;
use crate::traits::{CameraDevice, CameraId, DeviceLocator, DeviceOpener};

/// Finds a working device for a list of requested cameras.
#[derive(Debug)]
pub struct DeviceResolver<'a, O> {
    platform: &'a PlatformInfo,
    opener: &'a O,
}

impl<'a, O: DeviceOpener> DeviceResolver<'a, O> {
    /// Resolver using `opener` to test devices on `platform`.
    pub const fn new(platform: &'a PlatformInfo, opener: &'a O) -> Self {
        Self { platform, opener }
    }

    /// Open `locator`, check it can capture, read one frame, and release it.
    ///
    /// A node that opens but never delivers a buffer (metadata nodes, devices
    /// claimed by another process) does not count as working.
    pub fn verify(&self, locator: &DeviceLocator) -> bool {
        let mut device = match self.opener.open(locator) {
            Ok(device) => device,
            Err(err) => {
                debug!("{locator}: {err}");
                return false;
            }
        };
        if !device.capabilities().can_capture {
            debug!("{locator} opened but cannot capture");
            return false;
        }
        match device.next_frame() {
            Ok(_) => true,
            Err(err) => {
                debug!("{locator} opened but test read failed: {err}");
                false
            }
        }
    }

    /// First working device: requested cameras in order, then probing.
    pub fn resolve(&self, requested: &[CameraId]) -> Option<DeviceLocator> {
        for camera in requested {
            let locator = self.platform.resolve_device_path(camera);
            if self.verify(&locator) {
                info!("Camera {camera} available at {locator}");
                return Some(locator);
            }
            debug!("Requested camera {camera} ({locator}) unavailable");
        }

        warn!("No requested camera could be opened, probing for devices");
        self.probe()
    }

    /// First working device in the platform's enumeration range.
    pub fn probe(&self) -> Option<DeviceLocator> {
        let found = self
            .platform
            .enumerate_candidates()
            .into_iter()
            .find(|locator| self.verify(locator));
        match &found {
            Some(locator) => info!("Found working device at {locator}"),
            None => warn!("No working device found"),
        }
        found
    }

    /// Every device in the enumeration range that opens and can capture.
    pub fn list_available(&self) -> Vec<DeviceLocator> {
        self.platform
            .enumerate_candidates()
            .into_iter()
            .filter(|locator| self.verify(locator))
            .collect()
    }
}
