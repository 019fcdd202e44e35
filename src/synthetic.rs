//! Random-noise frames for mock mode.

use image::RgbImage;
use rand::RngCore;

/// Default mock frame width.
pub const DEFAULT_WIDTH: u32 = 1280;
/// Default mock frame height.
pub const DEFAULT_HEIGHT: u32 = 720;

/// Stand-in for a camera that could not be opened.
///
/// Every frame is freshly filled with random bytes, so the cost per frame is
/// fixed and no hardware is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyntheticSource {
    width: u32,
    height: u32,
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::new(DEFAULT_WIDTH, DEFAULT_HEIGHT)
    }
}

impl SyntheticSource {
    /// Source producing `width × height` RGB frames.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Frame dimensions.
    #[must_use]
    pub const fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Generate one frame.
    #[must_use]
    pub fn frame(&self) -> RgbImage {
        let mut pixels = vec![0u8; self.width as usize * self.height as usize * 3];
        rand::thread_rng().fill_bytes(&mut pixels);
        RgbImage::from_raw(self.width, self.height, pixels)
            .unwrap_or_else(|| RgbImage::new(self.width, self.height))
    }
}
