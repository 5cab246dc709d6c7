//! Target detection: per-frame analysis backends and the background detector.

mod backend;
pub mod backends;
pub mod color;
pub mod contour;
mod detector;
mod fps;
pub mod overlay;
mod result;

pub use backend::TargetBackend;
pub use backends::{ColorBlobBackend, ColorBlobSettings};
pub use color::HsvRange;
pub use detector::{DetectionSource, DetectorError, DetectorStats, StopSignal, TargetDetector};
pub use fps::FpsCounter;
pub use overlay::{render_overlay, OverlaySink, SnapshotSink};
pub use result::{Detection, FrameAnalysis};
