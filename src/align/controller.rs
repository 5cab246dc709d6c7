//! Bounded-time visual servoing over the detector's latest snapshot.

use std::time::{Duration, Instant};
use thiserror::Error;

use crate::detect::DetectionSource;
use crate::frame::FrameGeometry;
use crate::vehicle::{BodyVelocity, VehicleActuator};

/// Timing of one alignment attempt. Defaults match the flight-tested values.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AlignTiming {
    /// Wait after commanding heading 0 before the first sample.
    pub heading_settle: Duration,
    /// Extra wait after a "target not found" sample.
    pub poll_interval: Duration,
    /// How long each proportional correction is held.
    pub correction_burst: Duration,
    /// Zero-velocity hold while the target is not visible.
    pub hold_burst: Duration,
    /// Zero-velocity hold after convergence.
    pub settle_burst: Duration,
}

impl Default for AlignTiming {
    fn default() -> Self {
        Self {
            heading_settle: Duration::from_secs(2),
            poll_interval: Duration::from_millis(100),
            correction_burst: Duration::from_millis(200),
            hold_burst: Duration::from_millis(500),
            settle_burst: Duration::from_secs(1),
        }
    }
}

/// Parameters of one alignment attempt.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AlignRequest {
    /// Converged when both |ex| and |ey| are strictly below this.
    pub tolerance_px: u32,
    /// Velocity (m/s) commanded for an error of half the frame.
    pub speed: f64,
    pub timeout: Duration,
}

/// Successful alignment.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aligned {
    pub elapsed: Duration,
    /// Pixel error of the converging sample.
    pub error: (i32, i32),
    /// Number of non-zero corrections issued.
    pub corrections: u32,
}

#[derive(Debug, Error)]
pub enum AlignError {
    #[error("target never seen within {timeout:?} (elapsed {elapsed:?})")]
    TargetLost { elapsed: Duration, timeout: Duration },
    #[error("alignment timed out after {elapsed:?}, last pixel error {last_error:?}")]
    Timeout {
        elapsed: Duration,
        last_error: (i32, i32),
    },
    #[error("vehicle command failed during alignment")]
    Actuator(#[source] anyhow::Error),
}

/// Body-frame velocity for pixel `error`.
///
/// Image right maps to body right, image down maps to body backward, each
/// scaled by the error as a fraction of the half-frame.
pub fn proportional_velocity(
    error: (i32, i32),
    geometry: &FrameGeometry,
    speed: f64,
) -> BodyVelocity {
    let half_w = geometry.center_x.max(1) as f64;
    let half_h = geometry.center_y.max(1) as f64;
    let (ex, ey) = error;
    BodyVelocity::horizontal(-(ey as f64 / half_h) * speed, ex as f64 / half_w * speed)
}

fn within(error: (i32, i32), tolerance_px: u32) -> bool {
    let tol = tolerance_px as i64;
    (error.0 as i64).abs() < tol && (error.1 as i64).abs() < tol
}

/// Drives the vehicle until the detected target sits at the frame center.
pub struct AlignmentController<'a> {
    vehicle: &'a dyn VehicleActuator,
    detections: &'a dyn DetectionSource,
    timing: AlignTiming,
}

impl<'a> AlignmentController<'a> {
    pub fn new(vehicle: &'a dyn VehicleActuator, detections: &'a dyn DetectionSource) -> Self {
        Self::with_timing(vehicle, detections, AlignTiming::default())
    }

    pub fn with_timing(
        vehicle: &'a dyn VehicleActuator,
        detections: &'a dyn DetectionSource,
        timing: AlignTiming,
    ) -> Self {
        Self {
            vehicle,
            detections,
            timing,
        }
    }

    /// Run one attempt. The timeout covers the heading settle as well.
    pub fn align(&self, request: &AlignRequest) -> Result<Aligned, AlignError> {
        let started = Instant::now();
        let deadline = started + request.timeout;
        log::info!(
            "aligning: tolerance={}px speed={:.2}m/s timeout={:?}",
            request.tolerance_px,
            request.speed,
            request.timeout
        );

        self.vehicle
            .set_heading(0.0, false)
            .map_err(AlignError::Actuator)?;
        sleep_capped(self.timing.heading_settle, deadline);

        let geometry = self.detections.geometry();
        let mut last_error: Option<(i32, i32)> = None;
        let mut corrections = 0u32;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }

            let Some((cx, cy)) = self.detections.latest_detection().centroid() else {
                log::debug!("target not visible, holding position");
                let hold = self.timing.hold_burst.min(remaining);
                self.command(BodyVelocity::ZERO, hold)?;
                std::thread::sleep(hold);
                sleep_capped(self.timing.poll_interval, deadline);
                continue;
            };

            let error = geometry.error_of(cx, cy);
            last_error = Some(error);

            if within(error, request.tolerance_px) {
                self.command(BodyVelocity::ZERO, self.timing.settle_burst)?;
                std::thread::sleep(self.timing.settle_burst);
                let aligned = Aligned {
                    elapsed: started.elapsed(),
                    error,
                    corrections,
                };
                log::info!(
                    "aligned within {}px in {:.1}s (error {:?}, {} corrections)",
                    request.tolerance_px,
                    aligned.elapsed.as_secs_f64(),
                    error,
                    corrections
                );
                return Ok(aligned);
            }

            let velocity = proportional_velocity(error, &geometry, request.speed);
            log::debug!(
                "pixel error ({}, {}) -> forward={:.3} right={:.3}",
                error.0,
                error.1,
                velocity.forward,
                velocity.right
            );
            let burst = self.timing.correction_burst.min(remaining);
            self.command(velocity, burst)?;
            corrections += 1;
            std::thread::sleep(burst);
        }

        let elapsed = started.elapsed();
        let err = match last_error {
            None => AlignError::TargetLost {
                elapsed,
                timeout: request.timeout,
            },
            Some(last_error) => AlignError::Timeout {
                elapsed,
                last_error,
            },
        };
        log::warn!(
            "alignment within {}px failed after {:.1}s: {}",
            request.tolerance_px,
            elapsed.as_secs_f64(),
            err
        );
        Err(err)
    }

    fn command(&self, velocity: BodyVelocity, duration: Duration) -> Result<(), AlignError> {
        self.vehicle
            .set_body_velocity(velocity, duration)
            .map_err(AlignError::Actuator)
    }
}

fn sleep_capped(duration: Duration, deadline: Instant) {
    let remaining = deadline.saturating_duration_since(Instant::now());
    std::thread::sleep(duration.min(remaining));
}
