//! Vehicle actuation boundary.
//!
//! The alignment core never talks to a flight controller directly. It drives
//! anything implementing `VehicleActuator`: the kinematic simulator in
//! `crate::sim`, or a real telemetry link supplied by the caller.
//!
//! All commands are fire-and-forget. "Wait until achieved" semantics are
//! implemented by callers polling `current_position()` / `mode()`.

pub mod command;

use anyhow::Result;
use std::fmt;
use std::time::Duration;

use crate::geo::GeoPosition;

/// Body-frame velocity in m/s (forward/right/down).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BodyVelocity {
    pub forward: f64,
    pub right: f64,
    pub down: f64,
}

impl BodyVelocity {
    pub const ZERO: BodyVelocity = BodyVelocity {
        forward: 0.0,
        right: 0.0,
        down: 0.0,
    };

    pub fn horizontal(forward: f64, right: f64) -> Self {
        Self {
            forward,
            right,
            down: 0.0,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.forward == 0.0 && self.right == 0.0 && self.down == 0.0
    }
}

/// Flight controller mode.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FlightMode {
    Guided,
    Loiter,
    Land,
    Other(String),
}

impl FlightMode {
    pub fn name(&self) -> &str {
        match self {
            FlightMode::Guided => "GUIDED",
            FlightMode::Loiter => "LOITER",
            FlightMode::Land => "LAND",
            FlightMode::Other(name) => name,
        }
    }

    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "GUIDED" => FlightMode::Guided,
            "LOITER" => FlightMode::Loiter,
            "LAND" => FlightMode::Land,
            other => FlightMode::Other(other.to_string()),
        }
    }
}

impl fmt::Display for FlightMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Capabilities the alignment core consumes from the vehicle.
///
/// Implementations are shared between the control loop and (for the
/// simulator) the synthetic camera, so every method takes `&self`.
pub trait VehicleActuator: Send + Sync {
    /// Point the vehicle at `degrees` (absolute, or relative to the current heading).
    fn set_heading(&self, degrees: f64, relative: bool) -> Result<()>;

    /// Hold a body-frame velocity for `duration`. Returns once submitted.
    fn set_body_velocity(&self, velocity: BodyVelocity, duration: Duration) -> Result<()>;

    /// Request a mode change. Confirmation is observed through `mode()`.
    fn set_mode(&self, mode: FlightMode) -> Result<()>;

    fn mode(&self) -> Result<FlightMode>;

    /// Fly towards `target`, optionally at a capped groundspeed.
    fn goto(&self, target: GeoPosition, groundspeed: Option<f64>) -> Result<()>;

    fn current_position(&self) -> Result<GeoPosition>;

    fn set_servo(&self, channel: u8, pwm: u16) -> Result<()>;
}
