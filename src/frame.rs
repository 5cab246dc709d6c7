//! Camera frame container and frame geometry.
//!
//! - `Frame`: owned RGB24 pixel buffer produced by a frame source.
//! - `FrameGeometry`: the fixed coordinate system pixel error is measured in.

use anyhow::{anyhow, Result};
use image::RgbImage;

/// Fallback frame size used when the first frame cannot be read.
pub const FALLBACK_WIDTH: u32 = 640;
pub const FALLBACK_HEIGHT: u32 = 480;

// ----------------------------------------------------------------------------
// Frame: RGB24 pixels from a frame source
// ----------------------------------------------------------------------------

/// One captured camera frame.
///
/// Pixels are tightly packed RGB24, row-major. The constructor validates the
/// buffer length so every `Frame` in the pipeline is well-formed.
pub struct Frame {
    image: RgbImage,
}

impl Frame {
    /// Wrap a raw RGB24 buffer.
    pub fn from_rgb(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                pixels.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("RGB buffer does not fit {}x{}", width, height))?;
        Ok(Self::from_image(image))
    }

    pub fn from_image(image: RgbImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Consume the frame, returning the pixel buffer (used by the overlay).
    pub fn into_image(self) -> RgbImage {
        self.image
    }

    pub fn geometry(&self) -> FrameGeometry {
        FrameGeometry::new(self.width(), self.height())
    }
}

// ----------------------------------------------------------------------------
// FrameGeometry
// ----------------------------------------------------------------------------

/// Frame dimensions and optical center. Computed once, constant afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
    pub center_x: i32,
    pub center_y: i32,
}

impl FrameGeometry {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            center_x: (width / 2) as i32,
            center_y: (height / 2) as i32,
        }
    }

    /// Pixel offset of a point from the frame center.
    pub fn error_of(&self, cx: i32, cy: i32) -> (i32, i32) {
        (cx - self.center_x, cy - self.center_y)
    }
}

impl Default for FrameGeometry {
    fn default() -> Self {
        Self::new(FALLBACK_WIDTH, FALLBACK_HEIGHT)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_rejects_short_buffer() {
        assert!(Frame::from_rgb(4, 4, vec![0u8; 47]).is_err());
        assert!(Frame::from_rgb(4, 4, vec![0u8; 48]).is_ok());
    }

    #[test]
    fn geometry_center_uses_integer_division() {
        let geometry = FrameGeometry::new(641, 479);
        assert_eq!(geometry.center_x, 320);
        assert_eq!(geometry.center_y, 239);
        assert_eq!(geometry.error_of(330, 229), (10, -10));
    }

    #[test]
    fn frame_reports_its_geometry() -> Result<()> {
        let frame = Frame::from_rgb(8, 6, vec![0u8; 8 * 6 * 3])?;
        assert_eq!(frame.geometry(), FrameGeometry::new(8, 6));
        Ok(())
    }
}
