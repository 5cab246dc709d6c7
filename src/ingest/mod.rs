//! Frame ingestion sources.
//!
//! - Synthetic `stub://` source (tests, simulation, bench calibration)
//! - USB/V4L2 devices (feature: ingest-v4l2)
//!
//! All sources produce RGB24 `Frame`s. A failed `read_frame` is transient:
//! the detector logs it and asks again. Only `connect` failures are fatal.

#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::Result;
use std::sync::Arc;

use crate::frame::Frame;

pub use synthetic::{StaticTarget, SyntheticConfig, SyntheticSource, TargetBlob, TargetProjector};
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::{V4l2Config, V4l2Source};

/// Prefix selecting the synthetic source.
pub const STUB_SCHEME: &str = "stub://";

/// A camera, as seen by the detector.
pub trait FrameSource: Send {
    fn name(&self) -> &str;

    /// Open the device. Failure here is a resource error.
    fn connect(&mut self) -> Result<()>;

    /// Next frame. Errors are transient.
    fn read_frame(&mut self) -> Result<Frame>;

    fn is_healthy(&self) -> bool {
        true
    }

    fn stats(&self) -> SourceStats;
}

/// Capture counters for a frame source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub read_failures: u64,
    pub source: String,
}

/// Camera selection shared by every source kind.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraSettings {
    /// `stub://<label>` or a device path such as `/dev/video0`.
    pub source: String,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            source: "stub://camera".to_string(),
            width: 640,
            height: 480,
            target_fps: 30,
        }
    }
}

/// Build the source named by `settings.source`.
///
/// `projector` positions the rendered target for synthetic sources and is
/// ignored for real devices.
pub fn open_source(
    settings: &CameraSettings,
    projector: Arc<dyn TargetProjector>,
) -> Result<Box<dyn FrameSource>> {
    if settings.source.starts_with(STUB_SCHEME) {
        let config = SyntheticConfig {
            label: settings.source.clone(),
            width: settings.width,
            height: settings.height,
            target_fps: settings.target_fps,
            ..SyntheticConfig::default()
        };
        return Ok(Box::new(SyntheticSource::new(config, projector)));
    }
    open_device(settings)
}

#[cfg(feature = "ingest-v4l2")]
fn open_device(settings: &CameraSettings) -> Result<Box<dyn FrameSource>> {
    let config = V4l2Config {
        device: settings.source.clone(),
        target_fps: settings.target_fps,
        width: settings.width,
        height: settings.height,
    };
    Ok(Box::new(V4l2Source::new(config)))
}

#[cfg(not(feature = "ingest-v4l2"))]
fn open_device(settings: &CameraSettings) -> Result<Box<dyn FrameSource>> {
    anyhow::bail!(
        "camera source {} requires the ingest-v4l2 feature",
        settings.source
    )
}
