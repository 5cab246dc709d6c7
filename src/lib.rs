//! Vision-guided alignment for autonomous payload drops.
//!
//! A background detector keeps a "latest target position" snapshot up to
//! date from camera frames. A proportional visual-servo loop reads that
//! snapshot and nudges the vehicle in body-frame velocity until the target
//! sits under the camera, and a phase sequence strings two such passes around
//! a descent and a payload release.
//!
//! # Module Structure
//!
//! - `frame`: RGB frames and frame geometry
//! - `ingest`: Frame sources (synthetic `stub://`, V4L2)
//! - `detect`: Color-blob detection and the threaded `TargetDetector`
//! - `align`: Alignment controller and the drop phase sequence
//! - `vehicle`: Actuator trait and MAVLink-style command encoding
//! - `sim`: Kinematic vehicle and camera scene for bench runs
//! - `geo`: Short-range geographic helpers
//! - `config`: File + environment configuration

use anyhow::Result;
use std::sync::Arc;

pub mod align;
pub mod config;
pub mod detect;
pub mod frame;
pub mod geo;
pub mod ingest;
pub mod sim;
pub mod vehicle;

pub use align::{
    AlignError, AlignRequest, AlignTiming, Aligned, AlignmentController, DropReport,
    DropSequence, DropSequenceConfig, MissionPhase, SequenceError, WaitPolicy,
};
pub use config::MissionConfig;
pub use detect::{
    ColorBlobBackend, Detection, DetectionSource, DetectorError, StopSignal, TargetDetector,
};
pub use frame::{Frame, FrameGeometry};
pub use geo::{distance_metres, offset_location, GeoPosition};
pub use ingest::{FrameSource, TargetProjector};
pub use vehicle::{BodyVelocity, FlightMode, VehicleActuator};

/// Open the configured camera, build the color-blob detector (with overlay
/// output if configured) and start it.
pub fn start_detector(
    config: &MissionConfig,
    projector: Arc<dyn TargetProjector>,
    stop: StopSignal,
) -> Result<TargetDetector> {
    let source = ingest::open_source(&config.camera, projector)?;
    let backend = Box::new(ColorBlobBackend::new(config.detection.clone()));
    let mut detector = TargetDetector::new(source, backend, stop)?;
    if let Some(overlay) = &config.overlay {
        log::info!("writing overlay snapshots to {}", overlay.path.display());
        detector = detector.with_overlay(Box::new(detect::SnapshotSink::new(
            overlay.path.clone(),
            overlay.interval,
        )));
    }
    detector.start()?;
    Ok(detector)
}
