//! Platform detection and device addressing.
//!
//! The platform is detected once at startup into an immutable [`PlatformInfo`]
//! that is handed to the resolver and to every capture session.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::traits::{CameraId, DeviceLocator};

/// Number of device indices probed when enumerating candidates.
pub const PROBE_LIMIT: u32 = 10;

const JETSON_MARKER: &str = "/etc/nv_tegra_release";

/// Operating system family, as far as device addressing is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// DirectShow-style integer indices; names map to indices when numeric.
    Windows,
    /// V4L2 device nodes under `/dev`.
    Linux,
    /// Anything else (macOS and friends): plain indices.
    Other,
}

impl Platform {
    /// Platform this binary was compiled for.
    #[must_use]
    pub const fn current() -> Self {
        if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "linux") {
            Self::Linux
        } else {
            Self::Other
        }
    }

    /// Name of the native capture API, for logs.
    #[must_use]
    pub const fn backend_name(self) -> &'static str {
        match self {
            Self::Windows => "DirectShow",
            Self::Linux => "V4L2",
            Self::Other => "AVFoundation",
        }
    }

    /// Translate an abstract camera request into something an opener understands.
    #[must_use]
    pub fn resolve_device_path(self, camera: &CameraId) -> DeviceLocator {
        match (self, camera) {
            (Self::Linux, CameraId::Index(index)) => DeviceLocator::Path(video_node(*index)),
            (Self::Linux, CameraId::Name(name)) => {
                let path = Path::new(name);
                if path.is_absolute() {
                    DeviceLocator::Path(path.to_path_buf())
                } else {
                    DeviceLocator::Path(PathBuf::from(format!("/dev/video{name}")))
                }
            }
            (Self::Windows | Self::Other, CameraId::Index(index)) => DeviceLocator::Index(*index),
            (Self::Windows | Self::Other, CameraId::Name(name)) => DeviceLocator::Name(name.clone()),
        }
    }

    /// Bounded list of devices to probe when no requested camera opens.
    #[must_use]
    pub fn enumerate_candidates(self) -> Vec<DeviceLocator> {
        match self {
            Self::Linux => (0..PROBE_LIMIT)
                .map(|index| DeviceLocator::Path(video_node(index)))
                .collect(),
            Self::Windows | Self::Other => (0..PROBE_LIMIT).map(DeviceLocator::Index).collect(),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Windows => "Windows",
            Self::Linux => "Linux",
            Self::Other => "Other",
        };
        f.write_str(name)
    }
}

fn video_node(index: u32) -> PathBuf {
    PathBuf::from(format!("/dev/video{index}"))
}

/// Immutable description of the host, computed once per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformInfo {
    /// Operating system family.
    pub platform: Platform,
    /// Whether this is an NVIDIA Jetson board.
    pub is_jetson: bool,
}

impl PlatformInfo {
    /// Detect the running platform.
    #[must_use]
    pub fn detect() -> Self {
        let platform = Platform::current();
        let is_jetson = platform == Platform::Linux && Path::new(JETSON_MARKER).exists();
        Self {
            platform,
            is_jetson,
        }
    }

    /// Fixed description, for tests and tooling that must not touch the host.
    #[must_use]
    pub const fn new(platform: Platform) -> Self {
        Self {
            platform,
            is_jetson: false,
        }
    }

    /// See [`Platform::resolve_device_path`].
    #[must_use]
    pub fn resolve_device_path(&self, camera: &CameraId) -> DeviceLocator {
        self.platform.resolve_device_path(camera)
    }

    /// See [`Platform::enumerate_candidates`].
    #[must_use]
    pub fn enumerate_candidates(&self) -> Vec<DeviceLocator> {
        self.platform.enumerate_candidates()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linux_indices_become_video_nodes() {
        let locator = Platform::Linux.resolve_device_path(&CameraId::Index(2));
        assert_eq!(locator, DeviceLocator::Path(PathBuf::from("/dev/video2")));
    }

    #[test]
    fn test_linux_absolute_names_are_kept() {
        let camera = CameraId::Name("/dev/v4l/by-id/usb-cam".to_owned());
        let locator = Platform::Linux.resolve_device_path(&camera);
        assert_eq!(
            locator,
            DeviceLocator::Path(PathBuf::from("/dev/v4l/by-id/usb-cam"))
        );
    }

    #[test]
    fn test_windows_names_stay_names() {
        let camera = CameraId::Name("Integrated Webcam".to_owned());
        assert_eq!(
            Platform::Windows.resolve_device_path(&camera),
            DeviceLocator::Name("Integrated Webcam".to_owned())
        );
        assert_eq!(
            Platform::Windows.resolve_device_path(&CameraId::Index(1)),
            DeviceLocator::Index(1)
        );
    }

    #[test]
    fn test_candidates_are_bounded() {
        for platform in [Platform::Linux, Platform::Windows, Platform::Other] {
            let candidates = platform.enumerate_candidates();
            assert_eq!(candidates.len(), PROBE_LIMIT as usize);
        }
        assert_eq!(
            Platform::Other.enumerate_candidates().first(),
            Some(&DeviceLocator::Index(0))
        );
    }

    #[test]
    fn test_fixed_platform_info_is_not_jetson() {
        let info = PlatformInfo::new(Platform::Linux);
        assert!(!info.is_jetson);
        assert_eq!(info.platform.backend_name(), "V4L2");
    }
}
