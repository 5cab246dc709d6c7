//! Synthetic frame source (`stub://`).
//!
//! Renders a flat background with a single colored disc. Where the disc lands
//! is decided by a `TargetProjector`: a fixed position for bench tests, or the
//! simulated vehicle's view of the ground target (`crate::sim::SimScene`).
//! Optional speckle noise and injected read failures exercise the detector's
//! filtering and retry paths.

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_circle_mut;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::{FrameSource, SourceStats};
use crate::frame::Frame;

/// Crimson, inside the default detection range.
pub const DEFAULT_TARGET_COLOR: [u8; 3] = [220, 20, 60];
/// Muted green ground.
pub const DEFAULT_BACKGROUND: [u8; 3] = [40, 110, 40];

/// Pixel footprint of the target in one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TargetBlob {
    pub cx: f64,
    pub cy: f64,
    pub radius_px: f64,
}

/// Decides where the target appears in a `width`x`height` frame.
pub trait TargetProjector: Send + Sync {
    /// `None` when the target is out of view.
    fn project(&self, width: u32, height: u32) -> Option<TargetBlob>;
}

/// Target at a fixed pixel position, movable from another thread.
#[derive(Debug, Default)]
pub struct StaticTarget {
    blob: Mutex<Option<TargetBlob>>,
}

impl StaticTarget {
    pub fn at(cx: f64, cy: f64, radius_px: f64) -> Self {
        Self {
            blob: Mutex::new(Some(TargetBlob { cx, cy, radius_px })),
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn set(&self, blob: Option<TargetBlob>) {
        *self.blob.lock().unwrap_or_else(|e| e.into_inner()) = blob;
    }
}

impl TargetProjector for StaticTarget {
    fn project(&self, _width: u32, _height: u32) -> Option<TargetBlob> {
        *self.blob.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Configuration for a synthetic source.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub label: String,
    pub width: u32,
    pub height: u32,
    /// Frames per second to pace reads at. 0 disables pacing.
    pub target_fps: u32,
    pub target_color: [u8; 3],
    pub background: [u8; 3],
    /// Random pixels painted in the target color each frame.
    pub noise_pixels: u32,
    pub seed: Option<u64>,
    /// Every n-th read fails.
    pub fail_every: Option<u64>,
    /// Make `connect` fail, as an absent device would.
    pub unavailable: bool,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            label: "stub://camera".to_string(),
            width: 640,
            height: 480,
            target_fps: 30,
            target_color: DEFAULT_TARGET_COLOR,
            background: DEFAULT_BACKGROUND,
            noise_pixels: 0,
            seed: None,
            fail_every: None,
            unavailable: false,
        }
    }
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    projector: Arc<dyn TargetProjector>,
    rng: StdRng,
    connected: bool,
    reads: u64,
    frames_captured: u64,
    read_failures: u64,
    last_frame_at: Option<Instant>,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig, projector: Arc<dyn TargetProjector>) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            projector,
            rng,
            connected: false,
            reads: 0,
            frames_captured: 0,
            read_failures: 0,
            last_frame_at: None,
        }
    }

    fn pace(&mut self) {
        if self.config.target_fps == 0 {
            return;
        }
        let period = Duration::from_secs_f64(1.0 / self.config.target_fps as f64);
        if let Some(last) = self.last_frame_at {
            let elapsed = last.elapsed();
            if elapsed < period {
                std::thread::sleep(period - elapsed);
            }
        }
        self.last_frame_at = Some(Instant::now());
    }

    fn render(&mut self) -> RgbImage {
        let (width, height) = (self.config.width, self.config.height);
        let mut image = RgbImage::from_pixel(width, height, Rgb(self.config.background));
        let color = Rgb(self.config.target_color);

        if let Some(blob) = self.projector.project(width, height) {
            let radius = blob.radius_px.round() as i32;
            if radius > 0 && blob.cx.is_finite() && blob.cy.is_finite() {
                let center = (blob.cx.round() as i32, blob.cy.round() as i32);
                draw_filled_circle_mut(&mut image, center, radius, color);
            }
        }

        for _ in 0..self.config.noise_pixels {
            let x = self.rng.gen_range(0..width);
            let y = self.rng.gen_range(0..height);
            image.put_pixel(x, y, color);
        }
        image
    }
}

impl FrameSource for SyntheticSource {
    fn name(&self) -> &str {
        &self.config.label
    }

    fn connect(&mut self) -> Result<()> {
        if self.config.unavailable {
            return Err(anyhow!("synthetic device {} unavailable", self.config.label));
        }
        if self.config.width == 0 || self.config.height == 0 {
            return Err(anyhow!(
                "synthetic device {} has empty frame size",
                self.config.label
            ));
        }
        self.connected = true;
        log::info!(
            "SyntheticSource: connected to {} ({}x{})",
            self.config.label,
            self.config.width,
            self.config.height
        );
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Frame> {
        if !self.connected {
            return Err(anyhow!("synthetic source {} not connected", self.config.label));
        }
        self.pace();
        self.reads += 1;
        if let Some(n) = self.config.fail_every {
            if n > 0 && self.reads % n == 0 {
                self.read_failures += 1;
                return Err(anyhow!("injected read failure #{}", self.read_failures));
            }
        }
        let image = self.render();
        self.frames_captured += 1;
        Ok(Frame::from_image(image))
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frames_captured,
            read_failures: self.read_failures,
            source: self.config.label.clone(),
        }
    }
}
