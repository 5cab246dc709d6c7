//! detect_probe - run the detector alone and report what it sees
//!
//! Useful for checking an HSV range against a live camera before flying.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use visual_servo::ingest::StaticTarget;
use visual_servo::{start_detector, DetectionSource, MissionConfig, StopSignal};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file (.toml or .json). Defaults to $VSERVO_CONFIG.
    #[arg(long)]
    config: Option<PathBuf>,
    /// How long to run, seconds. 0 runs until Ctrl-C.
    #[arg(long, default_value_t = 10)]
    seconds: u64,
    /// Camera source, overriding the config (`stub://...` or a device path).
    #[arg(long)]
    source: Option<String>,
    /// Report interval, milliseconds.
    #[arg(long, default_value_t = 500)]
    interval_ms: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => MissionConfig::from_path(path)?,
        None => MissionConfig::load()?,
    };
    if let Some(source) = args.source {
        config.camera.source = source;
    }

    let stop = StopSignal::new();
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || handler_stop.trigger())
        .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    // Synthetic sources show a marker up and right of center.
    let (w, h) = (config.camera.width as f64, config.camera.height as f64);
    let marker = Arc::new(StaticTarget::at(w * 0.6, h * 0.4, h * 0.08));

    let mut detector = start_detector(&config, marker, stop.clone())?;
    let geometry = detector.geometry();
    log::info!(
        "probing {} ({}x{}), HSV {:?}..{:?}, min area {}",
        config.camera.source,
        geometry.width,
        geometry.height,
        config.detection.range.lower,
        config.detection.range.upper,
        config.detection.min_contour_area
    );

    let started = Instant::now();
    let run_for = (args.seconds > 0).then(|| Duration::from_secs(args.seconds));
    while !stop.is_triggered() && run_for.map_or(true, |limit| started.elapsed() < limit) {
        std::thread::sleep(Duration::from_millis(args.interval_ms));
        let detection = detector.latest_detection();
        match detection.centroid() {
            Some((cx, cy)) => log::info!(
                "target at ({}, {}) error {:?} fps {:.1}",
                cx,
                cy,
                geometry.error_of(cx, cy),
                detector.fps()
            ),
            None => log::info!("no target, fps {:.1}", detector.fps()),
        }
    }

    detector.stop();
    let stats = detector.stats();
    log::info!(
        "processed {} frames, skipped {}",
        stats.frames_processed,
        stats.frames_skipped
    );
    Ok(())
}
