//! Debug overlay: annotated frames for a human watching the detector.
//!
//! Purely diagnostic. Nothing in the control path reads overlay output, and
//! sink failures never affect detection.

use ab_glyph::{Font, FontRef, PxScale, ScaleFont};
use anyhow::{Context, Result};
use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{
    draw_cross_mut, draw_filled_circle_mut, draw_line_segment_mut, draw_text_mut,
};
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use crate::detect::result::FrameAnalysis;
use crate::frame::FrameGeometry;

const OUTLINE: Rgb<u8> = Rgb([0, 255, 0]);
const CENTROID: Rgb<u8> = Rgb([255, 255, 255]);
const CROSSHAIR: Rgb<u8> = Rgb([255, 255, 0]);
const CENTROID_RADIUS: i32 = 7;
const FPS_TEXT: Rgb<u8> = Rgb([0, 255, 0]);
const LABEL_TEXT: Rgb<u8> = Rgb([255, 255, 255]);
const FPS_BASELINE: (i32, i32) = (10, 20);
const FPS_SCALE: f32 = 14.0;
const LABEL_OFFSET: i32 = 10;
const LABEL_SCALE: f32 = 12.0;

static FONT_BYTES: &[u8] = include_bytes!("../../assets/fonts/DejaVuSansMono.ttf");

/// Embedded overlay font, parsed once. `None` (text skipped) if the asset is
/// unreadable.
fn overlay_font() -> Option<&'static FontRef<'static>> {
    static FONT: OnceLock<Option<FontRef<'static>>> = OnceLock::new();
    FONT.get_or_init(|| match FontRef::try_from_slice(FONT_BYTES) {
        Ok(font) => Some(font),
        Err(err) => {
            log::warn!("overlay font unusable, text disabled: {err}");
            None
        }
    })
    .as_ref()
}

/// `draw_text_mut` positions by the top of the line; overlay text is placed
/// by its baseline.
fn draw_text_at_baseline(
    image: &mut RgbImage,
    font: &FontRef<'static>,
    color: Rgb<u8>,
    (x, baseline): (i32, i32),
    scale: f32,
    text: &str,
) {
    let scale = PxScale::from(scale);
    let ascent = font.as_scaled(scale).ascent().round() as i32;
    draw_text_mut(image, color, x, baseline - ascent, scale, font, text);
}

/// Destination for annotated frames.
pub trait OverlaySink: Send {
    fn present(&mut self, frame: &RgbImage) -> Result<()>;
}

/// Draw the selected contour, its centroid with a `Target: (cx, cy)` label,
/// the frame-center crosshair and the current FPS.
pub fn render_overlay(
    mut image: RgbImage,
    analysis: &FrameAnalysis,
    geometry: FrameGeometry,
    fps: f64,
) -> RgbImage {
    let font = overlay_font();
    let outline = &analysis.outline;
    for (i, &(x0, y0)) in outline.iter().enumerate() {
        let (x1, y1) = outline[(i + 1) % outline.len()];
        draw_line_segment_mut(
            &mut image,
            (x0 as f32, y0 as f32),
            (x1 as f32, y1 as f32),
            OUTLINE,
        );
    }
    if let Some(centroid) = analysis.detection.centroid() {
        draw_filled_circle_mut(&mut image, centroid, CENTROID_RADIUS, CENTROID);
        if let Some(font) = font {
            let (cx, cy) = centroid;
            draw_text_at_baseline(
                &mut image,
                font,
                LABEL_TEXT,
                (cx + LABEL_OFFSET, cy + LABEL_OFFSET),
                LABEL_SCALE,
                &format!("Target: ({cx}, {cy})"),
            );
        }
    }
    draw_cross_mut(&mut image, CROSSHAIR, geometry.center_x, geometry.center_y);
    if let Some(font) = font {
        draw_text_at_baseline(
            &mut image,
            font,
            FPS_TEXT,
            FPS_BASELINE,
            FPS_SCALE,
            &format!("FPS: {fps:.1}"),
        );
    }
    image
}

/// Writes the latest annotated frame to a file, at most once per interval.
///
/// The file is replaced in place so an image viewer with auto-reload shows a
/// live feed.
pub struct SnapshotSink {
    path: PathBuf,
    min_interval: Duration,
    last_written: Option<Instant>,
}

impl SnapshotSink {
    pub fn new(path: impl Into<PathBuf>, min_interval: Duration) -> Self {
        Self {
            path: path.into(),
            min_interval,
            last_written: None,
        }
    }
}

impl OverlaySink for SnapshotSink {
    fn present(&mut self, frame: &RgbImage) -> Result<()> {
        if let Some(last) = self.last_written {
            if last.elapsed() < self.min_interval {
                return Ok(());
            }
        }
        let format = ImageFormat::from_path(&self.path).unwrap_or(ImageFormat::Jpeg);
        frame
            .save_with_format(&self.path, format)
            .with_context(|| format!("write overlay snapshot {}", self.path.display()))?;
        self.last_written = Some(Instant::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::Detection;
    use std::ops::Range;

    const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

    fn lit_pixels(image: &RgbImage, xs: Range<u32>, ys: Range<u32>) -> usize {
        ys.flat_map(|y| xs.clone().map(move |x| (x, y)))
            .filter(|&(x, y)| *image.get_pixel(x, y) != BLACK)
            .count()
    }

    #[test]
    fn overlay_marks_centroid_and_center() {
        let image = RgbImage::from_pixel(160, 120, BLACK);
        let analysis = FrameAnalysis {
            detection: Detection::at(100, 80),
            outline: vec![(60, 50), (140, 50), (140, 110), (60, 110)],
            largest_area: 4800.0,
        };
        let out = render_overlay(image, &analysis, FrameGeometry::new(160, 120), 30.0);
        assert_eq!(*out.get_pixel(100, 80), CENTROID);
        assert_eq!(*out.get_pixel(80, 60), CROSSHAIR);
        assert_eq!(*out.get_pixel(60, 80), OUTLINE);
        assert!(
            lit_pixels(&out, 110..139, 74..92) > 20,
            "target label should be drawn right of the centroid"
        );
    }

    #[test]
    fn lost_target_draws_only_crosshair_and_fps() {
        let image = RgbImage::from_pixel(64, 48, BLACK);
        let stale = FrameAnalysis {
            detection: Detection {
                found: false,
                cx: 10,
                cy: 40,
            },
            ..FrameAnalysis::default()
        };
        let out = render_overlay(image, &stale, FrameGeometry::new(64, 48), 0.0);
        assert_eq!(*out.get_pixel(10, 40), BLACK);
        assert_eq!(*out.get_pixel(32, 24), CROSSHAIR);
        assert_eq!(lit_pixels(&out, 0..64, 26..48), 0);
    }

    #[test]
    fn fps_text_painted_top_left() {
        let image = RgbImage::from_pixel(64, 48, BLACK);
        let geometry = FrameGeometry::new(64, 48);
        let out = render_overlay(image, &FrameAnalysis::default(), geometry, 29.7);
        let lit = lit_pixels(&out, 0..60, 0..22);
        assert!(lit > 30, "FPS band has only {lit} lit pixels");
        let green = (0..22)
            .flat_map(|y| (0..60).map(move |x| (x, y)))
            .filter(|&(x, y)| {
                let Rgb([r, g, b]) = *out.get_pixel(x, y);
                g > 0 && r == 0 && b == 0
            })
            .count();
        assert!(green > 0);
    }

    #[test]
    fn snapshot_sink_writes_and_throttles() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("overlay.png");
        let mut sink = SnapshotSink::new(&path, Duration::from_secs(3600));
        let frame = RgbImage::from_pixel(8, 8, Rgb([1, 2, 3]));
        sink.present(&frame)?;
        assert!(path.exists());

        std::fs::remove_file(&path)?;
        sink.present(&frame)?;
        assert!(!path.exists(), "second write inside interval must be skipped");
        Ok(())
    }
}
