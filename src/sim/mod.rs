//! Simulated vehicle and camera scene.
//!
//! Stands in for the flight controller link and the physical camera so the
//! full detect/align/drop loop can run on a workstation.

mod scene;
mod vehicle;

pub use scene::SimScene;
pub use vehicle::{SimConfig, SimulatedVehicle, DEFAULT_GOTO_SPEED};
