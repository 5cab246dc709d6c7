use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use visual_servo::align::PayloadRelease;
use visual_servo::config::MissionConfig;
use visual_servo::detect::ColorBlobSettings;
use visual_servo::ingest::CameraSettings;
use visual_servo::{DropSequenceConfig, WaitPolicy};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "VSERVO_CONFIG",
        "VSERVO_SOURCE",
        "VSERVO_MIN_CONTOUR_AREA",
        "VSERVO_ALIGN_TIMEOUT_SECS",
        "VSERVO_OVERLAY_PATH",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(suffix: &str, body: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp config");
    file.write_all(body.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = MissionConfig::load().expect("load defaults");
    assert_eq!(cfg.camera.source, "stub://camera");
    assert_eq!((cfg.camera.width, cfg.camera.height), (640, 480));
    assert_eq!(cfg.detection.range.lower, [140, 50, 50]);
    assert_eq!(cfg.detection.range.upper, [179, 255, 255]);
    assert_eq!(cfg.detection.min_contour_area, 1400.0);
    assert_eq!(cfg.alignment.coarse_tolerance_px, 40);
    assert_eq!(cfg.alignment.fine_tolerance_px, 25);
    assert_eq!(cfg.alignment.timeout, Duration::from_secs(180));
    assert_eq!(cfg.payload.servo_channel, 6);
    assert_eq!((cfg.payload.open_pwm, cfg.payload.close_pwm), (2000, 1470));
    assert_eq!(cfg.waits.mode, WaitPolicy::Indefinite);
    assert!(cfg.overlay.is_none());

    let seq = cfg.drop_sequence();
    assert_eq!(seq.coarse.speed, 0.35);
    assert_eq!(seq.fine.speed, 0.15);
    assert_eq!(seq.creep_speed, 3.0);
    assert_eq!(seq.descend_alt, 5.0);
}

#[test]
fn defaults_come_from_component_defaults() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = MissionConfig::load().expect("load defaults");
    assert_eq!(cfg.camera, CameraSettings::default());
    assert_eq!(cfg.detection, ColorBlobSettings::default());
    assert_eq!(cfg.payload, PayloadRelease::default());
    assert_eq!(cfg.drop_sequence(), DropSequenceConfig::default());
}

#[test]
fn loads_json_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        ".json",
        r#"{
            "camera": { "source": "/dev/video2", "width": 320, "height": 240, "target_fps": 15 },
            "detection": { "hsv_lower": [0, 120, 70], "hsv_upper": [10, 255, 255] },
            "alignment": { "coarse_tolerance_px": 30, "fine_tolerance_px": 12, "descend_alt": 4.0 },
            "payload": { "servo_channel": 9, "hold_secs": 1.5 },
            "waits": { "mode_timeout_secs": 20 }
        }"#,
    );
    std::env::set_var("VSERVO_CONFIG", file.path());
    std::env::set_var("VSERVO_SOURCE", "stub://bench");
    std::env::set_var("VSERVO_MIN_CONTOUR_AREA", "600");
    std::env::set_var("VSERVO_ALIGN_TIMEOUT_SECS", "45");
    std::env::set_var("VSERVO_OVERLAY_PATH", "/tmp/overlay.jpg");

    let cfg = MissionConfig::load().expect("load config");
    assert_eq!(cfg.camera.source, "stub://bench");
    assert_eq!((cfg.camera.width, cfg.camera.height), (320, 240));
    assert_eq!(cfg.camera.target_fps, 15);
    assert_eq!(cfg.detection.range.lower, [0, 120, 70]);
    assert_eq!(cfg.detection.min_contour_area, 600.0);
    assert_eq!(cfg.alignment.coarse_tolerance_px, 30);
    assert_eq!(cfg.alignment.fine_tolerance_px, 12);
    assert_eq!(cfg.alignment.descend_alt, 4.0);
    assert_eq!(cfg.alignment.timeout, Duration::from_secs(45));
    assert_eq!(cfg.payload.servo_channel, 9);
    assert_eq!(cfg.payload.hold, Duration::from_millis(1500));
    assert_eq!(cfg.waits.mode, WaitPolicy::Timeout(Duration::from_secs(20)));
    assert_eq!(cfg.waits.altitude, WaitPolicy::Indefinite);
    let overlay = cfg.overlay.expect("overlay from env");
    assert_eq!(overlay.path, PathBuf::from("/tmp/overlay.jpg"));

    clear_env();
}

#[test]
fn loads_toml_file_by_path() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        ".toml",
        r#"
[camera]
overlay_path = "probe.png"
overlay_interval_ms = 1000

[alignment]
coarse_speed = 0.5
fine_speed = 0.2
timeout_secs = 90.0

[waits]
altitude_timeout_secs = 30.0
"#,
    );
    let cfg = MissionConfig::from_path(file.path()).expect("load toml");
    assert_eq!(cfg.alignment.coarse_speed, 0.5);
    assert_eq!(cfg.alignment.fine_speed, 0.2);
    assert_eq!(cfg.alignment.timeout, Duration::from_secs(90));
    assert_eq!(cfg.waits.altitude, WaitPolicy::Timeout(Duration::from_secs(30)));
    let overlay = cfg.overlay.expect("overlay from file");
    assert_eq!(overlay.path, PathBuf::from("probe.png"));
    assert_eq!(overlay.interval, Duration::from_secs(1));
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    for body in [
        r#"{ "detection": { "hsv_lower": [170, 50, 50], "hsv_upper": [160, 255, 255] } }"#,
        r#"{ "detection": { "hsv_upper": [200, 255, 255] } }"#,
        r#"{ "alignment": { "fine_tolerance_px": 50 } }"#,
        r#"{ "alignment": { "coarse_tolerance_px": 0 } }"#,
        r#"{ "alignment": { "fine_speed": 0.0 } }"#,
        r#"{ "alignment": { "descend_alt": -1.0 } }"#,
        r#"{ "alignment": { "timeout_secs": -5.0 } }"#,
        r#"{ "payload": { "open_pwm": 3000 } }"#,
        r#"{ "camera": { "width": 0 } }"#,
        r#"{ "camera": "not a table" }"#,
    ] {
        let file = write_config(".json", body);
        assert!(
            MissionConfig::from_path(file.path()).is_err(),
            "accepted {}",
            body
        );
    }
}

#[test]
fn rejects_malformed_env_override() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("VSERVO_ALIGN_TIMEOUT_SECS", "soon");
    assert!(MissionConfig::load().is_err());
    clear_env();

    std::env::set_var("VSERVO_MIN_CONTOUR_AREA", "big");
    assert!(MissionConfig::load().is_err());
    clear_env();
}

#[test]
fn missing_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("VSERVO_CONFIG", "/nonexistent/vservo.toml");
    assert!(MissionConfig::load().is_err());
    clear_env();
}
