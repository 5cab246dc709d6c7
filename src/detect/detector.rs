//! Background detection loop and the shared "latest detection" snapshot.
//!
//! The detector owns the frame source and runs on its own thread. Consumers
//! only ever see copies of the most recent `Detection`; there is no queue and
//! no history, so a slow consumer reads a recent (possibly a few frames old)
//! value and never slows the producer down.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::detect::backend::TargetBackend;
use crate::detect::fps::FpsCounter;
use crate::detect::overlay::{render_overlay, OverlaySink};
use crate::detect::result::Detection;
use crate::frame::FrameGeometry;
use crate::ingest::FrameSource;

const FPS_LOG_INTERVAL: Duration = Duration::from_secs(5);
/// Pause after a failed read so a dead device does not spin the loop.
const READ_RETRY_BACKOFF: Duration = Duration::from_millis(5);

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("capture device unavailable")]
    Resource(#[source] anyhow::Error),
    #[error("failed to spawn detector thread")]
    Spawn(#[source] std::io::Error),
}

/// Process-wide stop flag. Cloning shares the flag.
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Read side of the detector, as seen by the control loop.
pub trait DetectionSource {
    /// Copy of the most recent detection. Must not block on frame processing.
    fn latest_detection(&self) -> Detection;

    /// Geometry pixel errors are measured against.
    fn geometry(&self) -> FrameGeometry;
}

#[derive(Debug, Default)]
struct Snapshot {
    latest: Mutex<Detection>,
    fps_bits: AtomicU64,
    frames_processed: AtomicU64,
    frames_skipped: AtomicU64,
}

impl Snapshot {
    fn publish(&self, detection: Detection) {
        // Detection is Copy, so a poisoned lock still holds a whole value.
        let mut guard = self.latest.lock().unwrap_or_else(|e| e.into_inner());
        *guard = detection;
    }

    fn read(&self) -> Detection {
        *self.latest.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_fps(&self, fps: f64) {
        self.fps_bits.store(fps.to_bits(), Ordering::Relaxed);
    }

    fn fps(&self) -> f64 {
        f64::from_bits(self.fps_bits.load(Ordering::Relaxed))
    }
}

/// Counters exposed for health logging.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DetectorStats {
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub fps: f64,
}

/// Continuously running target detector.
pub struct TargetDetector {
    source: Option<Box<dyn FrameSource>>,
    backend: Option<Box<dyn TargetBackend>>,
    overlay: Option<Box<dyn OverlaySink>>,
    geometry: FrameGeometry,
    snapshot: Arc<Snapshot>,
    stop: StopSignal,
    join: Option<JoinHandle<()>>,
}

impl TargetDetector {
    /// Open `source` and derive the frame geometry from its first frame.
    pub fn new(
        mut source: Box<dyn FrameSource>,
        backend: Box<dyn TargetBackend>,
        stop: StopSignal,
    ) -> Result<Self, DetectorError> {
        source.connect().map_err(DetectorError::Resource)?;

        let geometry = match source.read_frame() {
            Ok(frame) => frame.geometry(),
            Err(err) => {
                let fallback = FrameGeometry::default();
                log::warn!(
                    "could not read first frame from {} ({:#}); assuming {}x{}",
                    source.name(),
                    err,
                    fallback.width,
                    fallback.height
                );
                fallback
            }
        };
        log::info!(
            "target detector initialized: source={} backend={} frame={}x{}",
            source.name(),
            backend.name(),
            geometry.width,
            geometry.height
        );

        Ok(Self {
            source: Some(source),
            backend: Some(backend),
            overlay: None,
            geometry,
            snapshot: Arc::new(Snapshot::default()),
            stop,
            join: None,
        })
    }

    /// Render annotated frames into `sink` while running.
    pub fn with_overlay(mut self, sink: Box<dyn OverlaySink>) -> Self {
        self.overlay = Some(sink);
        self
    }

    /// Spawn the acquisition loop. Calling again is a no-op.
    pub fn start(&mut self) -> Result<(), DetectorError> {
        let (Some(source), Some(backend)) = (self.source.take(), self.backend.take()) else {
            log::debug!("target detector already started");
            return Ok(());
        };
        let worker = DetectionLoop {
            source,
            backend,
            overlay: self.overlay.take(),
            geometry: self.geometry,
            snapshot: self.snapshot.clone(),
            stop: self.stop.clone(),
        };
        let join = std::thread::Builder::new()
            .name("target-detector".to_string())
            .spawn(move || worker.run())
            .map_err(DetectorError::Spawn)?;
        self.join = Some(join);
        log::info!("target detection thread started");
        Ok(())
    }

    /// Signal the loop to finish its current iteration and wait for it.
    pub fn stop(&mut self) {
        self.stop.trigger();
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                log::error!("target detection thread panicked");
            }
        }
        // Never started: release the source here instead.
        self.source = None;
    }

    pub fn is_running(&self) -> bool {
        self.join.as_ref().is_some_and(|join| !join.is_finished())
    }

    pub fn fps(&self) -> f64 {
        self.snapshot.fps()
    }

    pub fn stats(&self) -> DetectorStats {
        DetectorStats {
            frames_processed: self.snapshot.frames_processed.load(Ordering::Relaxed),
            frames_skipped: self.snapshot.frames_skipped.load(Ordering::Relaxed),
            fps: self.snapshot.fps(),
        }
    }
}

impl DetectionSource for TargetDetector {
    fn latest_detection(&self) -> Detection {
        self.snapshot.read()
    }

    fn geometry(&self) -> FrameGeometry {
        self.geometry
    }
}

impl Drop for TargetDetector {
    fn drop(&mut self) {
        if self.join.is_some() {
            self.stop();
        }
    }
}

// ----------------------------------------------------------------------------
// Detector thread
// ----------------------------------------------------------------------------

struct DetectionLoop {
    source: Box<dyn FrameSource>,
    backend: Box<dyn TargetBackend>,
    overlay: Option<Box<dyn OverlaySink>>,
    geometry: FrameGeometry,
    snapshot: Arc<Snapshot>,
    stop: StopSignal,
}

impl DetectionLoop {
    fn run(mut self) {
        log::info!("detection loop running on {}", self.source.name());
        if let Err(err) = self.backend.warm_up() {
            log::warn!("backend {} warm-up failed: {:#}", self.backend.name(), err);
        }

        let mut fps = FpsCounter::new(Instant::now());
        let mut last_fps_log = Instant::now();
        let mut was_found = false;

        while !self.stop.is_triggered() {
            let frame = match self.source.read_frame() {
                Ok(frame) => frame,
                Err(err) => {
                    self.snapshot.frames_skipped.fetch_add(1, Ordering::Relaxed);
                    log::warn!("failed to grab frame: {:#}", err);
                    std::thread::sleep(READ_RETRY_BACKOFF);
                    continue;
                }
            };

            if let Some(rate) = fps.tick(Instant::now()) {
                self.snapshot.set_fps(rate);
                if last_fps_log.elapsed() >= FPS_LOG_INTERVAL {
                    let stats = self.source.stats();
                    log::info!(
                        "detector fps={:.1} frames={} read_failures={} healthy={}",
                        rate,
                        stats.frames_captured,
                        stats.read_failures,
                        self.source.is_healthy()
                    );
                    last_fps_log = Instant::now();
                }
            }

            let analysis = match self.backend.analyze(&frame) {
                Ok(analysis) => analysis,
                Err(err) => {
                    self.snapshot.frames_skipped.fetch_add(1, Ordering::Relaxed);
                    log::warn!("frame processing failed, keeping last detection: {:#}", err);
                    continue;
                }
            };
            let detection = analysis.detection;
            self.snapshot.publish(detection);
            self.snapshot.frames_processed.fetch_add(1, Ordering::Relaxed);

            if detection.found != was_found {
                match detection.centroid() {
                    Some((cx, cy)) => log::info!("target acquired at ({}, {})", cx, cy),
                    None => log::info!("target lost"),
                }
                was_found = detection.found;
            }

            if let Some(sink) = self.overlay.as_mut() {
                let annotated =
                    render_overlay(frame.into_image(), &analysis, self.geometry, fps.fps());
                if let Err(err) = sink.present(&annotated) {
                    log::warn!("overlay output failed: {:#}", err);
                }
            }
        }

        let stats = self.source.stats();
        drop(self.source);
        log::info!(
            "target detection thread stopped and source released ({} frames, {} read failures)",
            stats.frames_captured,
            stats.read_failures
        );
    }
}
