//! drop_sequence - approach, align and release over a simulated vehicle

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use visual_servo::sim::{SimConfig, SimScene, SimulatedVehicle};
use visual_servo::{
    offset_location, start_detector, DropSequence, GeoPosition, MissionConfig, StopSignal,
    VehicleActuator,
};

const HOME_LAT: f64 = 40.230_220_1;
const HOME_LON: f64 = 29.009_688_4;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file (.toml or .json). Defaults to $VSERVO_CONFIG.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Target offset north of the start point, metres.
    #[arg(long, default_value_t = 1.5, allow_hyphen_values = true)]
    target_north: f64,
    /// Target offset east of the start point, metres.
    #[arg(long, default_value_t = -2.0, allow_hyphen_values = true)]
    target_east: f64,
    /// Start altitude above home, metres.
    #[arg(long, default_value_t = 10.0)]
    altitude: f64,
    /// Radius of the ground marker, metres.
    #[arg(long, default_value_t = 0.5)]
    target_radius: f64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => MissionConfig::from_path(path)?,
        None => MissionConfig::load()?,
    };
    if args.altitude <= config.alignment.descend_alt {
        return Err(anyhow!(
            "start altitude {}m must be above the descend altitude {}m",
            args.altitude,
            config.alignment.descend_alt
        ));
    }

    let stop = StopSignal::new();
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || handler_stop.trigger())
        .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    let home = GeoPosition::new(HOME_LAT, HOME_LON, args.altitude);
    let vehicle = Arc::new(SimulatedVehicle::new(SimConfig {
        home,
        ..SimConfig::default()
    }));
    let target = offset_location(&home, args.target_north, args.target_east).with_alt(0.0);
    log::info!(
        "simulated vehicle at {:.7},{:.7} alt {:.1}m; target {:.1}m N {:.1}m E",
        home.lat,
        home.lon,
        home.alt,
        args.target_north,
        args.target_east
    );
    let scene = Arc::new(SimScene::new(vehicle.clone(), target, args.target_radius));

    let mut detector = start_detector(&config, scene, stop.clone())?;
    let outcome = DropSequence::new(vehicle.as_ref(), &detector, config.drop_sequence())
        .with_stop(stop)
        .run();
    detector.stop();

    match outcome {
        Ok(report) => {
            log::info!(
                "phases: {}",
                report
                    .phases
                    .iter()
                    .map(|p| p.name())
                    .collect::<Vec<_>>()
                    .join(" -> ")
            );
            log::info!(
                "coarse: {:?} in {:.1}s, fine: {:?} in {:.1}s",
                report.coarse.error,
                report.coarse.elapsed.as_secs_f64(),
                report.fine.error,
                report.fine.elapsed.as_secs_f64()
            );
            let miss = visual_servo::distance_metres(&vehicle.current_position()?, &target);
            log::info!("released {:.2}m from the marker", miss);
            Ok(())
        }
        Err(err) => {
            let phase = err.phase();
            log::error!("drop sequence aborted in {}: {:#}", phase, anyhow::Error::new(err));
            Err(anyhow!("drop sequence aborted"))
        }
    }
}
