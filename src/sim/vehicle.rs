//! Kinematic vehicle simulator.
//!
//! Good enough to close the visual servo loop: it integrates commanded body
//! velocities and goto targets against wall-clock time, applies mode changes
//! after a short confirmation delay, and records every encoded message it
//! received. There is no dynamics model (acceleration is instantaneous).

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::geo::{ned_offset, offset_location, GeoPosition};
use crate::vehicle::command::{self, DecodedCommand, VehicleMessage};
use crate::vehicle::{BodyVelocity, FlightMode, VehicleActuator};

/// Groundspeed used by `goto` when the caller does not pass one.
pub const DEFAULT_GOTO_SPEED: f64 = 5.0;

#[derive(Clone, Debug)]
pub struct SimConfig {
    /// Start position; altitude is relative to the home point.
    pub home: GeoPosition,
    pub max_speed: f64,
    pub vertical_speed: f64,
    /// Delay between a mode request and the autopilot reporting it.
    pub mode_delay: Duration,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            home: GeoPosition::new(40.230_220_1, 29.009_688_4, 10.0),
            max_speed: 12.0,
            vertical_speed: 2.5,
            mode_delay: Duration::from_millis(200),
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Motion {
    Idle,
    Velocity { ned: (f64, f64, f64), until: Instant },
    Goto { target: GeoPosition, speed: f64 },
}

#[derive(Debug)]
struct SimState {
    position: GeoPosition,
    heading_deg: f64,
    mode: FlightMode,
    pending_mode: Option<(FlightMode, Instant)>,
    motion: Motion,
    servos: HashMap<u8, u16>,
    messages: Vec<VehicleMessage>,
    updated_at: Instant,
}

impl SimState {
    fn advance(&mut self, now: Instant, config: &SimConfig) {
        if let Some((mode, at)) = self.pending_mode.clone() {
            if now >= at {
                log::debug!("sim: mode {} -> {}", self.mode, mode);
                if mode != FlightMode::Guided {
                    self.motion = Motion::Idle;
                }
                self.mode = mode;
                self.pending_mode = None;
            }
        }

        let from = self.updated_at;
        self.updated_at = now;
        if self.mode != FlightMode::Guided {
            return;
        }

        match self.motion {
            Motion::Idle => {}
            Motion::Velocity { ned, until } => {
                let end = now.min(until);
                let dt = end.saturating_duration_since(from).as_secs_f64();
                if dt > 0.0 {
                    let (vn, ve, vd) = ned;
                    self.position = offset_location(&self.position, vn * dt, ve * dt)
                        .with_alt((self.position.alt - vd * dt).max(0.0));
                }
                if now >= until {
                    self.motion = Motion::Idle;
                }
            }
            Motion::Goto { target, speed } => {
                let dt = now.saturating_duration_since(from).as_secs_f64();
                let (north, east) = ned_offset(&self.position, &target);
                let distance = north.hypot(east);
                let step = speed * dt;
                let horizontal = if distance <= step || distance == 0.0 {
                    GeoPosition::new(target.lat, target.lon, self.position.alt)
                } else {
                    let k = step / distance;
                    offset_location(&self.position, north * k, east * k)
                };

                let climb = target.alt - self.position.alt;
                let max_climb = config.vertical_speed * dt;
                let alt = self.position.alt + climb.clamp(-max_climb, max_climb);
                self.position = horizontal.with_alt(alt);
            }
        }
    }

    fn record(&mut self, message: VehicleMessage) -> DecodedCommand {
        let decoded = command::decode(&message);
        self.messages.push(message);
        decoded
    }
}

/// Simulated vehicle implementing `VehicleActuator`.
#[derive(Debug)]
pub struct SimulatedVehicle {
    config: SimConfig,
    state: Mutex<SimState>,
}

impl SimulatedVehicle {
    pub fn new(config: SimConfig) -> Self {
        let state = SimState {
            position: config.home,
            heading_deg: 0.0,
            mode: FlightMode::Guided,
            pending_mode: None,
            motion: Motion::Idle,
            servos: HashMap::new(),
            messages: Vec::new(),
            updated_at: Instant::now(),
        };
        Self {
            config,
            state: Mutex::new(state),
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, SimState>> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow!("sim vehicle state lock poisoned"))?;
        state.advance(Instant::now(), &self.config);
        Ok(state)
    }

    pub fn heading_deg(&self) -> Result<f64> {
        Ok(self.state()?.heading_deg)
    }

    pub fn servo_pwm(&self, channel: u8) -> Result<Option<u16>> {
        Ok(self.state()?.servos.get(&channel).copied())
    }

    /// Every message sent to the vehicle, oldest first.
    pub fn sent_messages(&self) -> Result<Vec<VehicleMessage>> {
        Ok(self.state()?.messages.clone())
    }
}

impl Default for SimulatedVehicle {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

impl VehicleActuator for SimulatedVehicle {
    fn set_heading(&self, degrees: f64, relative: bool) -> Result<()> {
        let mut state = self.state()?;
        if let DecodedCommand::Yaw {
            heading_deg,
            relative,
        } = state.record(command::condition_yaw(degrees, relative))
        {
            let base = if relative { state.heading_deg } else { 0.0 };
            state.heading_deg = (base + heading_deg).rem_euclid(360.0);
        }
        Ok(())
    }

    fn set_body_velocity(&self, velocity: BodyVelocity, duration: Duration) -> Result<()> {
        let mut state = self.state()?;
        let DecodedCommand::Velocity(v) = state.record(command::body_velocity(velocity)) else {
            return Err(anyhow!("velocity setpoint did not decode"));
        };
        log::trace!(
            "sim: velocity {:?} streamed x{}",
            v,
            command::stream_repetitions(duration)
        );
        if state.mode != FlightMode::Guided {
            log::debug!("sim: ignoring velocity command in {}", state.mode);
            return Ok(());
        }
        let (sin, cos) = state.heading_deg.to_radians().sin_cos();
        let north = v.forward * cos - v.right * sin;
        let east = v.forward * sin + v.right * cos;
        state.motion = Motion::Velocity {
            ned: (north, east, v.down),
            until: Instant::now() + duration,
        };
        Ok(())
    }

    fn set_mode(&self, mode: FlightMode) -> Result<()> {
        let mut state = self.state()?;
        let at = Instant::now() + self.config.mode_delay;
        state.pending_mode = Some((mode, at));
        Ok(())
    }

    fn mode(&self) -> Result<FlightMode> {
        Ok(self.state()?.mode.clone())
    }

    fn goto(&self, target: GeoPosition, groundspeed: Option<f64>) -> Result<()> {
        let mut state = self.state()?;
        if state.mode != FlightMode::Guided {
            log::debug!("sim: ignoring goto in {}", state.mode);
            return Ok(());
        }
        let speed = groundspeed
            .unwrap_or(DEFAULT_GOTO_SPEED)
            .min(self.config.max_speed);
        if !(speed.is_finite() && speed > 0.0) {
            return Err(anyhow!("invalid goto groundspeed {}", speed));
        }
        state.motion = Motion::Goto { target, speed };
        Ok(())
    }

    fn current_position(&self) -> Result<GeoPosition> {
        Ok(self.state()?.position)
    }

    fn set_servo(&self, channel: u8, pwm: u16) -> Result<()> {
        let mut state = self.state()?;
        let message = command::set_servo(channel, pwm);
        if let DecodedCommand::Servo { channel, pwm } = state.record(message) {
            state.servos.insert(channel, pwm);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::distance_metres;

    fn fast_config() -> SimConfig {
        SimConfig {
            mode_delay: Duration::from_millis(20),
            vertical_speed: 20.0,
            ..SimConfig::default()
        }
    }

    #[test]
    fn body_velocity_moves_along_heading() -> Result<()> {
        let sim = SimulatedVehicle::new(fast_config());
        let home = sim.current_position()?;
        sim.set_heading(90.0, false)?;
        sim.set_body_velocity(BodyVelocity::horizontal(2.0, 0.0), Duration::from_millis(100))?;
        std::thread::sleep(Duration::from_millis(200));

        let (north, east) = ned_offset(&home, &sim.current_position()?);
        assert!(north.abs() < 0.02, "north {}", north);
        assert!((east - 0.2).abs() < 0.03, "east {}", east);
        Ok(())
    }

    #[test]
    fn right_velocity_at_zero_heading_moves_east() -> Result<()> {
        let sim = SimulatedVehicle::new(fast_config());
        let home = sim.current_position()?;
        sim.set_body_velocity(BodyVelocity::horizontal(0.0, 1.0), Duration::from_millis(100))?;
        std::thread::sleep(Duration::from_millis(150));
        let (north, east) = ned_offset(&home, &sim.current_position()?);
        assert!(north.abs() < 0.01);
        assert!(east > 0.08 && east < 0.12, "east {}", east);
        Ok(())
    }

    #[test]
    fn goto_reaches_target_and_descends() -> Result<()> {
        let sim = SimulatedVehicle::new(fast_config());
        let home = sim.current_position()?;
        let target = offset_location(&home, 1.0, 0.0).with_alt(5.0);
        sim.goto(target, Some(10.0))?;
        std::thread::sleep(Duration::from_millis(400));

        let here = sim.current_position()?;
        assert!(distance_metres(&here, &target) < 0.01);
        assert!((here.alt - 5.0).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn mode_change_is_confirmed_after_delay_and_loiter_holds() -> Result<()> {
        let sim = SimulatedVehicle::new(fast_config());
        sim.set_mode(FlightMode::Loiter)?;
        assert_eq!(sim.mode()?, FlightMode::Guided);
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(sim.mode()?, FlightMode::Loiter);

        let before = sim.current_position()?;
        sim.set_body_velocity(BodyVelocity::horizontal(5.0, 0.0), Duration::from_millis(100))?;
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(sim.current_position()?, before);
        Ok(())
    }

    #[test]
    fn servo_and_heading_commands_are_recorded() -> Result<()> {
        let sim = SimulatedVehicle::new(fast_config());
        sim.set_heading(30.0, false)?;
        sim.set_heading(-45.0, true)?;
        assert!((sim.heading_deg()? - 345.0).abs() < 1e-4);

        sim.set_servo(6, 2000)?;
        assert_eq!(sim.servo_pwm(6)?, Some(2000));
        assert_eq!(sim.servo_pwm(7)?, None);

        let messages = sim.sent_messages()?;
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2], command::set_servo(6, 2000));
        Ok(())
    }
}
