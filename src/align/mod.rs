//! Visual-servo alignment and the approach-and-drop phase sequence.

mod controller;
pub mod sequence;

pub use controller::{
    proportional_velocity, AlignError, AlignRequest, AlignTiming, Aligned, AlignmentController,
};
pub use sequence::{
    DropReport, DropSequence, DropSequenceConfig, MissionPhase, PayloadRelease, SequenceError,
    WaitPolicies, WaitPolicy,
};
