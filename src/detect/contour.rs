//! Mask cleanup, external contour extraction and polygon moments.

use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::distance_transform::Norm;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::{dilate, erode};
use imageproc::point::Point;

/// Sigma equivalent to a 5x5 Gaussian kernel with automatic sigma.
pub const MASK_BLUR_SIGMA: f32 = 1.1;

/// Two 3x3 iterations, expressed as an L-infinity radius.
pub const MORPH_RADIUS: u8 = 2;

/// Smooth, then erode and dilate the mask to remove speckle while keeping
/// the target's area.
pub fn denoise_mask(mask: &GrayImage) -> GrayImage {
    let blurred = gaussian_blur_f32(mask, MASK_BLUR_SIGMA);
    let eroded = erode(&blurred, Norm::LInf, MORPH_RADIUS);
    dilate(&eroded, Norm::LInf, MORPH_RADIUS)
}

/// Outermost contours of all non-zero regions in `mask`.
pub fn external_contours(mask: &GrayImage) -> Vec<Vec<Point<i32>>> {
    find_contours::<i32>(mask)
        .into_iter()
        .filter(|contour| contour.border_type == BorderType::Outer && contour.parent.is_none())
        .map(|contour| contour.points)
        .collect()
}

/// Zeroth and first order moments of a closed polygon.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Moments {
    pub m00: f64,
    pub m10: f64,
    pub m01: f64,
}

impl Moments {
    /// Green's theorem over the polygon edges, normalised to a positive area
    /// regardless of winding.
    pub fn of_polygon(points: &[Point<i32>]) -> Self {
        if points.len() < 3 {
            return Self::default();
        }
        let mut a00 = 0.0;
        let mut a10 = 0.0;
        let mut a01 = 0.0;
        for (i, p) in points.iter().enumerate() {
            let q = points[(i + 1) % points.len()];
            let (xi, yi) = (p.x as f64, p.y as f64);
            let (xj, yj) = (q.x as f64, q.y as f64);
            let cross = xi * yj - xj * yi;
            a00 += cross;
            a10 += cross * (xi + xj);
            a01 += cross * (yi + yj);
        }
        let sign = if a00 < 0.0 { -1.0 } else { 1.0 };
        Self {
            m00: sign * a00 / 2.0,
            m10: sign * a10 / 6.0,
            m01: sign * a01 / 6.0,
        }
    }

    pub fn area(&self) -> f64 {
        self.m00
    }

    /// Integer centroid, or `None` for degenerate (zero-area) outlines.
    pub fn centroid(&self) -> Option<(i32, i32)> {
        if self.m00.abs() < f64::EPSILON {
            return None;
        }
        let cx = self.m10 / self.m00;
        let cy = self.m01 / self.m00;
        if !cx.is_finite() || !cy.is_finite() {
            return None;
        }
        Some((cx as i32, cy as i32))
    }
}

/// Pick the contour with the largest area.
pub fn largest_contour(contours: &[Vec<Point<i32>>]) -> Option<(&[Point<i32>], Moments)> {
    contours
        .iter()
        .map(|points| (points.as_slice(), Moments::of_polygon(points)))
        .max_by(|a, b| a.1.area().total_cmp(&b.1.area()))
}
