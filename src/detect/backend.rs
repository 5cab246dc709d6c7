use anyhow::Result;

use crate::detect::result::FrameAnalysis;
use crate::frame::Frame;

/// Per-frame target extraction.
///
/// The detector loop owns exactly one backend and calls it once per acquired
/// frame. An `Err` means "this frame could not be processed": the loop logs
/// it, keeps the previous snapshot, and moves on.
pub trait TargetBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Analyze one frame.
    fn analyze(&mut self, frame: &Frame) -> Result<FrameAnalysis>;

    /// Optional warm-up hook, run on the detector thread before the first frame.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
