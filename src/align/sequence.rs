//! Approach-and-drop procedure: coarse align, descend, fine align, release.
//!
//! Phases run strictly in order and none is retried. An alignment failure
//! aborts everything after it; the payload is never released over an
//! unconfirmed position.

use std::fmt;
use std::time::{Duration, Instant};

use thiserror::Error;

use super::controller::{AlignError, AlignRequest, AlignTiming, Aligned, AlignmentController};
use crate::detect::{DetectionSource, StopSignal};
use crate::vehicle::{FlightMode, VehicleActuator};

/// Altitude is considered reached within this margin above the target.
pub const ALTITUDE_MARGIN_M: f64 = 0.5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MissionPhase {
    CoarseAlign,
    Descend,
    FineAlign,
    LoiterDrop,
    Resume,
}

impl MissionPhase {
    pub const ORDER: [MissionPhase; 5] = [
        MissionPhase::CoarseAlign,
        MissionPhase::Descend,
        MissionPhase::FineAlign,
        MissionPhase::LoiterDrop,
        MissionPhase::Resume,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MissionPhase::CoarseAlign => "coarse-align",
            MissionPhase::Descend => "descend",
            MissionPhase::FineAlign => "fine-align",
            MissionPhase::LoiterDrop => "loiter-drop",
            MissionPhase::Resume => "resume",
        }
    }
}

impl fmt::Display for MissionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How long to wait for the vehicle to confirm a state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WaitPolicy {
    /// Wait until confirmed, however long it takes.
    #[default]
    Indefinite,
    Timeout(Duration),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WaitPolicies {
    pub altitude: WaitPolicy,
    pub mode: WaitPolicy,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PayloadRelease {
    pub servo_channel: u8,
    pub open_pwm: u16,
    pub close_pwm: u16,
    /// Time the release stays open.
    pub hold: Duration,
}

impl Default for PayloadRelease {
    fn default() -> Self {
        Self {
            servo_channel: 6,
            open_pwm: 2000,
            close_pwm: 1470,
            hold: Duration::from_secs(3),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DropSequenceConfig {
    pub coarse: AlignRequest,
    pub fine: AlignRequest,
    /// Altitude above home for the fine pass, metres.
    pub descend_alt: f64,
    /// Groundspeed for the descent goto, m/s.
    pub creep_speed: f64,
    pub payload: PayloadRelease,
    pub waits: WaitPolicies,
    pub timing: AlignTiming,
    pub altitude_poll: Duration,
    pub mode_poll: Duration,
}

impl Default for DropSequenceConfig {
    fn default() -> Self {
        let timeout = Duration::from_secs(180);
        Self {
            coarse: AlignRequest {
                tolerance_px: 40,
                speed: 0.35,
                timeout,
            },
            fine: AlignRequest {
                tolerance_px: 25,
                speed: 0.15,
                timeout,
            },
            descend_alt: 5.0,
            creep_speed: 3.0,
            payload: PayloadRelease::default(),
            waits: WaitPolicies::default(),
            timing: AlignTiming::default(),
            altitude_poll: Duration::from_secs(1),
            mode_poll: Duration::from_millis(500),
        }
    }
}

/// Outcome of a completed sequence.
#[derive(Clone, Debug, PartialEq)]
pub struct DropReport {
    /// Phases entered, in order.
    pub phases: Vec<MissionPhase>,
    pub coarse: Aligned,
    pub fine: Aligned,
    pub elapsed: Duration,
}

#[derive(Debug, Error)]
pub enum SequenceError {
    #[error("{phase} alignment failed")]
    Align {
        phase: MissionPhase,
        #[source]
        source: AlignError,
    },
    #[error("{phase}: vehicle did not confirm within {waited:?}")]
    WaitTimeout {
        phase: MissionPhase,
        waited: Duration,
    },
    #[error("{phase}: vehicle command failed")]
    Vehicle {
        phase: MissionPhase,
        #[source]
        source: anyhow::Error,
    },
    #[error("{phase}: stop requested")]
    Stopped { phase: MissionPhase },
}

impl SequenceError {
    pub fn phase(&self) -> MissionPhase {
        match self {
            SequenceError::Align { phase, .. }
            | SequenceError::WaitTimeout { phase, .. }
            | SequenceError::Vehicle { phase, .. }
            | SequenceError::Stopped { phase } => *phase,
        }
    }
}

pub struct DropSequence<'a> {
    vehicle: &'a dyn VehicleActuator,
    detections: &'a dyn DetectionSource,
    config: DropSequenceConfig,
    stop: StopSignal,
}

impl<'a> DropSequence<'a> {
    pub fn new(
        vehicle: &'a dyn VehicleActuator,
        detections: &'a dyn DetectionSource,
        config: DropSequenceConfig,
    ) -> Self {
        Self {
            vehicle,
            detections,
            config,
            stop: StopSignal::new(),
        }
    }

    /// Abort confirmation waits when `stop` triggers.
    pub fn with_stop(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn run(&self) -> Result<DropReport, SequenceError> {
        let started = Instant::now();
        let mut phases = Vec::with_capacity(MissionPhase::ORDER.len());
        self.warn_unbounded_waits();

        let coarse = self.align(MissionPhase::CoarseAlign, &self.config.coarse, &mut phases)?;
        self.descend(&mut phases)?;
        let fine = self.align(MissionPhase::FineAlign, &self.config.fine, &mut phases)?;
        self.loiter_drop(&mut phases)?;
        self.resume(&mut phases)?;

        let report = DropReport {
            phases,
            coarse,
            fine,
            elapsed: started.elapsed(),
        };
        log::info!(
            "drop sequence complete in {:.1}s",
            report.elapsed.as_secs_f64()
        );
        Ok(report)
    }

    fn warn_unbounded_waits(&self) {
        let waits = self.config.waits;
        if waits.altitude == WaitPolicy::Indefinite || waits.mode == WaitPolicy::Indefinite {
            log::warn!(
                "drop sequence waits are unbounded (altitude={:?}, mode={:?}); \
                 a vehicle that never confirms will stall the mission",
                waits.altitude,
                waits.mode
            );
        }
    }

    fn enter(&self, phase: MissionPhase, phases: &mut Vec<MissionPhase>) {
        log::info!("phase: {}", phase);
        phases.push(phase);
    }

    fn align(
        &self,
        phase: MissionPhase,
        request: &AlignRequest,
        phases: &mut Vec<MissionPhase>,
    ) -> Result<Aligned, SequenceError> {
        self.enter(phase, phases);
        AlignmentController::with_timing(self.vehicle, self.detections, self.config.timing)
            .align(request)
            .map_err(|source| SequenceError::Align { phase, source })
    }

    fn descend(&self, phases: &mut Vec<MissionPhase>) -> Result<(), SequenceError> {
        let phase = MissionPhase::Descend;
        self.enter(phase, phases);
        let here = self
            .vehicle
            .current_position()
            .map_err(|source| SequenceError::Vehicle { phase, source })?;
        let target_alt = self.config.descend_alt;
        log::info!(
            "descending from {:.1}m to {:.1}m at {:.1}m/s",
            here.alt,
            target_alt,
            self.config.creep_speed
        );
        self.vehicle
            .goto(here.with_alt(target_alt), Some(self.config.creep_speed))
            .map_err(|source| SequenceError::Vehicle { phase, source })?;

        self.wait_until(
            phase,
            self.config.waits.altitude,
            self.config.altitude_poll,
            || {
                let alt = self.vehicle.current_position()?.alt;
                log::debug!("altitude {:.2}m", alt);
                Ok(alt <= target_alt + ALTITUDE_MARGIN_M)
            },
        )
    }

    fn loiter_drop(&self, phases: &mut Vec<MissionPhase>) -> Result<(), SequenceError> {
        let phase = MissionPhase::LoiterDrop;
        self.enter(phase, phases);
        self.switch_mode(phase, FlightMode::Loiter)?;

        let payload = self.config.payload;
        log::info!(
            "releasing payload: servo {} -> {}",
            payload.servo_channel,
            payload.open_pwm
        );
        self.vehicle
            .set_servo(payload.servo_channel, payload.open_pwm)
            .map_err(|source| SequenceError::Vehicle { phase, source })?;
        std::thread::sleep(payload.hold);
        self.vehicle
            .set_servo(payload.servo_channel, payload.close_pwm)
            .map_err(|source| SequenceError::Vehicle { phase, source })?;
        log::info!(
            "release closed: servo {} -> {}",
            payload.servo_channel,
            payload.close_pwm
        );
        Ok(())
    }

    fn resume(&self, phases: &mut Vec<MissionPhase>) -> Result<(), SequenceError> {
        let phase = MissionPhase::Resume;
        self.enter(phase, phases);
        self.switch_mode(phase, FlightMode::Guided)
    }

    fn switch_mode(&self, phase: MissionPhase, mode: FlightMode) -> Result<(), SequenceError> {
        self.vehicle
            .set_mode(mode.clone())
            .map_err(|source| SequenceError::Vehicle { phase, source })?;
        self.wait_until(phase, self.config.waits.mode, self.config.mode_poll, || {
            Ok(self.vehicle.mode()? == mode)
        })?;
        log::info!("mode {} confirmed", mode);
        Ok(())
    }

    fn wait_until<F>(
        &self,
        phase: MissionPhase,
        policy: WaitPolicy,
        poll: Duration,
        mut confirmed: F,
    ) -> Result<(), SequenceError>
    where
        F: FnMut() -> anyhow::Result<bool>,
    {
        let started = Instant::now();
        loop {
            if confirmed().map_err(|source| SequenceError::Vehicle { phase, source })? {
                return Ok(());
            }
            if self.stop.is_triggered() {
                return Err(SequenceError::Stopped { phase });
            }
            let mut nap = poll;
            if let WaitPolicy::Timeout(limit) = policy {
                let waited = started.elapsed();
                if waited >= limit {
                    log::warn!("{}: gave up waiting after {:?}", phase, waited);
                    return Err(SequenceError::WaitTimeout { phase, waited });
                }
                nap = nap.min(limit - waited);
            }
            std::thread::sleep(nap);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::Detection;
    use crate::frame::FrameGeometry;
    use crate::sim::{SimConfig, SimulatedVehicle};

    struct Centered;

    impl DetectionSource for Centered {
        fn latest_detection(&self) -> Detection {
            Detection::at(320, 240)
        }

        fn geometry(&self) -> FrameGeometry {
            FrameGeometry::new(640, 480)
        }
    }

    fn fast_config() -> DropSequenceConfig {
        let timeout = Duration::from_secs(1);
        DropSequenceConfig {
            coarse: AlignRequest {
                tolerance_px: 40,
                speed: 0.35,
                timeout,
            },
            fine: AlignRequest {
                tolerance_px: 25,
                speed: 0.15,
                timeout,
            },
            payload: PayloadRelease {
                hold: Duration::from_millis(10),
                ..PayloadRelease::default()
            },
            timing: AlignTiming {
                heading_settle: Duration::ZERO,
                poll_interval: Duration::from_millis(5),
                correction_burst: Duration::from_millis(10),
                hold_burst: Duration::from_millis(10),
                settle_burst: Duration::ZERO,
            },
            altitude_poll: Duration::from_millis(10),
            mode_poll: Duration::from_millis(10),
            ..DropSequenceConfig::default()
        }
    }

    fn sim(mode_delay: Duration) -> SimulatedVehicle {
        SimulatedVehicle::new(SimConfig {
            vertical_speed: 50.0,
            mode_delay,
            ..SimConfig::default()
        })
    }

    #[test]
    fn phases_display_in_order() {
        let names: Vec<String> = MissionPhase::ORDER.iter().map(|p| p.to_string()).collect();
        assert_eq!(
            names,
            ["coarse-align", "descend", "fine-align", "loiter-drop", "resume"]
        );
    }

    #[test]
    fn default_wait_policy_is_indefinite() {
        assert_eq!(WaitPolicy::default(), WaitPolicy::Indefinite);
        let waits = DropSequenceConfig::default().waits;
        assert_eq!(waits.altitude, WaitPolicy::Indefinite);
        assert_eq!(waits.mode, WaitPolicy::Indefinite);
    }

    #[test]
    fn centered_target_runs_every_phase() {
        let vehicle = sim(Duration::from_millis(20));
        let report = DropSequence::new(&vehicle, &Centered, fast_config())
            .run()
            .unwrap();
        assert_eq!(report.phases, MissionPhase::ORDER.to_vec());
        assert!(vehicle.current_position().unwrap().alt <= 5.0 + ALTITUDE_MARGIN_M);
        assert_eq!(vehicle.servo_pwm(6).unwrap(), Some(1470));
        assert_eq!(vehicle.mode().unwrap(), FlightMode::Guided);
    }

    #[test]
    fn unconfirmed_mode_times_out_when_bounded() {
        let vehicle = sim(Duration::from_secs(60));
        let mut config = fast_config();
        config.waits.mode = WaitPolicy::Timeout(Duration::from_millis(100));

        let err = DropSequence::new(&vehicle, &Centered, config)
            .run()
            .unwrap_err();
        match err {
            SequenceError::WaitTimeout { phase, waited } => {
                assert_eq!(phase, MissionPhase::LoiterDrop);
                assert!(waited >= Duration::from_millis(100));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(vehicle.servo_pwm(6).unwrap(), None);
    }

    #[test]
    fn stop_signal_ends_an_unbounded_wait() {
        let vehicle = sim(Duration::from_millis(20));
        let stop = StopSignal::new();
        stop.trigger();
        let err = DropSequence::new(&vehicle, &Centered, fast_config())
            .with_stop(stop)
            .run()
            .unwrap_err();
        assert!(matches!(err, SequenceError::Stopped { .. }));
        assert_eq!(err.phase(), MissionPhase::Descend);
    }
}
