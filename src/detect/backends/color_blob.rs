use anyhow::Result;

use crate::detect::backend::TargetBackend;
use crate::detect::color::{threshold_mask, HsvRange};
use crate::detect::contour::{denoise_mask, external_contours, largest_contour};
use crate::detect::result::{Detection, FrameAnalysis};
use crate::frame::Frame;

pub const DEFAULT_MIN_CONTOUR_AREA: f64 = 1400.0;

#[derive(Clone, Debug, PartialEq)]
pub struct ColorBlobSettings {
    pub range: HsvRange,
    /// Contours smaller than this (pixels²) are treated as noise.
    pub min_contour_area: f64,
}

impl Default for ColorBlobSettings {
    fn default() -> Self {
        Self {
            range: HsvRange::default(),
            min_contour_area: DEFAULT_MIN_CONTOUR_AREA,
        }
    }
}

/// Largest blob of a calibrated color.
///
/// Pipeline: HSV threshold, blur + erode/dilate, external contours, largest
/// by area, centroid from moments.
pub struct ColorBlobBackend {
    settings: ColorBlobSettings,
}

impl ColorBlobBackend {
    pub fn new(settings: ColorBlobSettings) -> Self {
        Self { settings }
    }
}

impl Default for ColorBlobBackend {
    fn default() -> Self {
        Self::new(ColorBlobSettings::default())
    }
}

impl TargetBackend for ColorBlobBackend {
    fn name(&self) -> &'static str {
        "color-blob"
    }

    fn analyze(&mut self, frame: &Frame) -> Result<FrameAnalysis> {
        let mask = threshold_mask(frame.image(), &self.settings.range);
        let mask = denoise_mask(&mask);
        let contours = external_contours(&mask);

        let Some((points, moments)) = largest_contour(&contours) else {
            return Ok(FrameAnalysis::not_found());
        };
        let area = moments.area();
        if area < self.settings.min_contour_area {
            return Ok(FrameAnalysis {
                largest_area: area,
                ..FrameAnalysis::not_found()
            });
        }
        let Some((cx, cy)) = moments.centroid() else {
            return Ok(FrameAnalysis {
                largest_area: area,
                ..FrameAnalysis::not_found()
            });
        };

        Ok(FrameAnalysis {
            detection: Detection::at(cx, cy),
            outline: points.iter().map(|p| (p.x, p.y)).collect(),
            largest_area: area,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use imageproc::drawing::draw_filled_circle_mut;

    const MARKER: Rgb<u8> = Rgb([220, 20, 60]);
    const GRASS: Rgb<u8> = Rgb([40, 110, 40]);

    fn scene(discs: &[((i32, i32), i32)]) -> Frame {
        let mut image = RgbImage::from_pixel(320, 240, GRASS);
        for &(center, radius) in discs {
            draw_filled_circle_mut(&mut image, center, radius, MARKER);
        }
        Frame::from_image(image)
    }

    fn backend(min_area: f64) -> ColorBlobBackend {
        ColorBlobBackend::new(ColorBlobSettings {
            min_contour_area: min_area,
            ..ColorBlobSettings::default()
        })
    }

    #[test]
    fn finds_centroid_of_marker_disc() -> Result<()> {
        let analysis = backend(200.0).analyze(&scene(&[((200, 90), 20)]))?;
        let (cx, cy) = analysis.detection.centroid().expect("marker found");
        assert!((cx - 200).abs() <= 2, "cx {}", cx);
        assert!((cy - 90).abs() <= 2, "cy {}", cy);
        assert!(!analysis.outline.is_empty());
        Ok(())
    }

    #[test]
    fn empty_scene_is_not_found() -> Result<()> {
        let analysis = backend(200.0).analyze(&scene(&[]))?;
        assert!(!analysis.detection.found);
        assert!(analysis.outline.is_empty());
        Ok(())
    }

    #[test]
    fn picks_largest_of_several_blobs() -> Result<()> {
        let analysis = backend(200.0).analyze(&scene(&[((60, 60), 12), ((250, 170), 28)]))?;
        let (cx, cy) = analysis.detection.centroid().expect("marker found");
        assert!((cx - 250).abs() <= 2 && (cy - 170).abs() <= 2);
        Ok(())
    }

    #[test]
    fn blob_below_min_area_is_rejected() -> Result<()> {
        let analysis = backend(DEFAULT_MIN_CONTOUR_AREA).analyze(&scene(&[((160, 120), 10)]))?;
        assert!(!analysis.detection.found);
        assert!(analysis.largest_area > 0.0);
        assert!(analysis.largest_area < DEFAULT_MIN_CONTOUR_AREA);
        Ok(())
    }
}
