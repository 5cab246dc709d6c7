//! Downward camera model coupling the simulated vehicle to the synthetic source.

use std::sync::Arc;

use crate::geo::{ned_offset, GeoPosition};
use crate::ingest::{TargetBlob, TargetProjector};
use crate::sim::SimulatedVehicle;
use crate::vehicle::VehicleActuator;

/// Horizontal field of view of the simulated camera, degrees.
const HFOV_DEG: f64 = 62.0;

/// A ground target seen by a nadir camera on the simulated vehicle.
///
/// Image "up" is the vehicle's forward axis and image "right" its right axis,
/// so a target ahead of the vehicle appears above the frame center.
pub struct SimScene {
    vehicle: Arc<SimulatedVehicle>,
    target: GeoPosition,
    target_radius_m: f64,
}

impl SimScene {
    pub fn new(vehicle: Arc<SimulatedVehicle>, target: GeoPosition, target_radius_m: f64) -> Self {
        Self {
            vehicle,
            target,
            target_radius_m,
        }
    }

    pub fn target(&self) -> GeoPosition {
        self.target
    }

    /// Target offset in the vehicle body frame, metres (forward, right).
    pub fn body_offset(&self, vehicle: &GeoPosition, heading_deg: f64) -> (f64, f64) {
        let (north, east) = ned_offset(vehicle, &self.target);
        let (sin, cos) = heading_deg.to_radians().sin_cos();
        (north * cos + east * sin, -north * sin + east * cos)
    }
}

impl TargetProjector for SimScene {
    fn project(&self, width: u32, height: u32) -> Option<TargetBlob> {
        let state = (self.vehicle.current_position(), self.vehicle.heading_deg());
        let (position, heading) = match state {
            (Ok(position), Ok(heading)) => (position, heading),
            (Err(err), _) | (_, Err(err)) => {
                log::warn!("scene: vehicle state unavailable: {:#}", err);
                return None;
            }
        };
        if position.alt <= 0.1 {
            return None;
        }

        let ground_width = 2.0 * position.alt * (HFOV_DEG.to_radians() / 2.0).tan();
        let px_per_m = width as f64 / ground_width;
        let (forward, right) = self.body_offset(&position, heading);
        let blob = TargetBlob {
            cx: width as f64 / 2.0 + right * px_per_m,
            cy: height as f64 / 2.0 - forward * px_per_m,
            radius_px: self.target_radius_m * px_per_m,
        };

        let r = blob.radius_px;
        let visible = blob.cx + r >= 0.0
            && blob.cx - r < width as f64
            && blob.cy + r >= 0.0
            && blob.cy - r < height as f64;
        visible.then_some(blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::offset_location;
    use crate::sim::SimConfig;

    fn scene(d_north: f64, d_east: f64) -> (Arc<SimulatedVehicle>, SimScene) {
        let vehicle = Arc::new(SimulatedVehicle::new(SimConfig::default()));
        let home = SimConfig::default().home;
        let target = offset_location(&home, d_north, d_east).with_alt(0.0);
        let scene = SimScene::new(vehicle.clone(), target, 0.5);
        (vehicle, scene)
    }

    #[test]
    fn target_directly_below_is_centered() {
        let (_, scene) = scene(0.0, 0.0);
        let blob = scene.project(640, 480).unwrap();
        assert!((blob.cx - 320.0).abs() < 1e-6);
        assert!((blob.cy - 240.0).abs() < 1e-6);
        assert!(blob.radius_px > 10.0);
    }

    #[test]
    fn target_ahead_and_right_appears_up_and_right() {
        let (_, scene) = scene(1.5, 2.0);
        let blob = scene.project(640, 480).unwrap();
        assert!(blob.cx > 320.0);
        assert!(blob.cy < 240.0);
    }

    #[test]
    fn heading_rotates_the_image() -> anyhow::Result<()> {
        // Facing east, a target to the east is straight ahead.
        let (vehicle, scene) = scene(0.0, 2.0);
        vehicle.set_heading(90.0, false)?;
        let blob = scene.project(640, 480).unwrap();
        assert!((blob.cx - 320.0).abs() < 0.5, "cx {}", blob.cx);
        assert!(blob.cy < 240.0);
        Ok(())
    }

    #[test]
    fn distant_target_is_out_of_view() {
        let (_, scene) = scene(100.0, 0.0);
        assert!(scene.project(640, 480).is_none());
    }
}
