//! HSV conversion and color-range thresholding.
//!
//! Values use the 8-bit convention most calibration tools emit:
//! hue in [0, 179] (degrees / 2), saturation and value in [0, 255].

use anyhow::{anyhow, Result};
use image::{GrayImage, Luma, RgbImage};

pub const HUE_MAX: u8 = 179;

/// Closed HSV range `[lower, upper]`, per channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HsvRange {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl HsvRange {
    pub fn new(lower: [u8; 3], upper: [u8; 3]) -> Result<Self> {
        let range = Self { lower, upper };
        range.validate()?;
        Ok(range)
    }

    pub fn validate(&self) -> Result<()> {
        for channel in 0..3 {
            if self.lower[channel] > self.upper[channel] {
                return Err(anyhow!(
                    "HSV lower bound {:?} exceeds upper bound {:?} on channel {}",
                    self.lower,
                    self.upper,
                    channel
                ));
            }
        }
        if self.upper[0] > HUE_MAX {
            return Err(anyhow!("HSV hue bound {} exceeds {}", self.upper[0], HUE_MAX));
        }
        Ok(())
    }

    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        (0..3).all(|c| hsv[c] >= self.lower[c] && hsv[c] <= self.upper[c])
    }
}

impl Default for HsvRange {
    /// Red/magenta marker.
    fn default() -> Self {
        Self {
            lower: [140, 50, 50],
            upper: [179, 255, 255],
        }
    }
}

pub fn rgb_to_hsv(rgb: [u8; 3]) -> [u8; 3] {
    let [r, g, b] = rgb.map(|c| c as f32);
    let v = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = v - min;

    let s = if v > 0.0 {
        (255.0 * delta / v).round()
    } else {
        0.0
    };

    let h = if delta == 0.0 {
        0.0
    } else {
        let degrees = if v == r {
            60.0 * (g - b) / delta
        } else if v == g {
            120.0 + 60.0 * (b - r) / delta
        } else {
            240.0 + 60.0 * (r - g) / delta
        };
        let degrees = if degrees < 0.0 {
            degrees + 360.0
        } else {
            degrees
        };
        (degrees / 2.0).round() % 180.0
    };

    [h as u8, s as u8, v as u8]
}

/// Binary mask: 255 where the pixel's HSV falls inside `range`, 0 elsewhere.
pub fn threshold_mask(image: &RgbImage, range: &HsvRange) -> GrayImage {
    let mut mask = GrayImage::new(image.width(), image.height());
    for (x, y, pixel) in image.enumerate_pixels() {
        if range.contains(rgb_to_hsv(pixel.0)) {
            mask.put_pixel(x, y, Luma([255]));
        }
    }
    mask
}
