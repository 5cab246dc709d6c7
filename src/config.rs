use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::align::{AlignRequest, DropSequenceConfig, PayloadRelease, WaitPolicies, WaitPolicy};
use crate::detect::{ColorBlobSettings, HsvRange};
use crate::ingest::CameraSettings;

const DEFAULT_OVERLAY_INTERVAL_MS: u64 = 250;
const PWM_RANGE: std::ops::RangeInclusive<u16> = 500..=2500;

#[derive(Debug, Deserialize, Default)]
struct MissionConfigFile {
    camera: Option<CameraConfigFile>,
    detection: Option<DetectionConfigFile>,
    alignment: Option<AlignmentConfigFile>,
    payload: Option<PayloadConfigFile>,
    waits: Option<WaitsConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    source: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
    overlay_path: Option<PathBuf>,
    overlay_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    hsv_lower: Option<[u8; 3]>,
    hsv_upper: Option<[u8; 3]>,
    min_contour_area: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct AlignmentConfigFile {
    coarse_tolerance_px: Option<u32>,
    fine_tolerance_px: Option<u32>,
    coarse_speed: Option<f64>,
    fine_speed: Option<f64>,
    creep_speed: Option<f64>,
    descend_alt: Option<f64>,
    timeout_secs: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct PayloadConfigFile {
    servo_channel: Option<u8>,
    open_pwm: Option<u16>,
    close_pwm: Option<u16>,
    hold_secs: Option<f64>,
}

#[derive(Debug, Deserialize, Default)]
struct WaitsConfigFile {
    altitude_timeout_secs: Option<f64>,
    mode_timeout_secs: Option<f64>,
}

/// Validated mission configuration.
#[derive(Debug, Clone)]
pub struct MissionConfig {
    pub camera: CameraSettings,
    pub overlay: Option<OverlaySettings>,
    pub detection: ColorBlobSettings,
    pub alignment: AlignmentSettings,
    pub payload: PayloadRelease,
    pub waits: WaitPolicies,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlaySettings {
    pub path: PathBuf,
    pub interval: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentSettings {
    pub coarse_tolerance_px: u32,
    pub fine_tolerance_px: u32,
    pub coarse_speed: f64,
    pub fine_speed: f64,
    pub creep_speed: f64,
    pub descend_alt: f64,
    pub timeout: Duration,
}

impl MissionConfig {
    /// Defaults, overlaid by the file named in `VSERVO_CONFIG` (if set), then
    /// by environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("VSERVO_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        Self::build(file_cfg.unwrap_or_default())
    }

    /// Load `path` (plus environment overrides), ignoring `VSERVO_CONFIG`.
    pub fn from_path(path: &Path) -> Result<Self> {
        Self::build(read_config_file(path)?)
    }

    fn build(file: MissionConfigFile) -> Result<Self> {
        let mut cfg = Self::from_file(file)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Unset fields fall back to the component defaults (`CameraSettings`,
    /// `ColorBlobSettings`, `DropSequenceConfig`, `PayloadRelease`).
    fn from_file(file: MissionConfigFile) -> Result<Self> {
        let camera_default = CameraSettings::default();
        let camera_file = file.camera.unwrap_or_default();
        let camera = CameraSettings {
            source: camera_file.source.unwrap_or(camera_default.source),
            width: camera_file.width.unwrap_or(camera_default.width),
            height: camera_file.height.unwrap_or(camera_default.height),
            target_fps: camera_file.target_fps.unwrap_or(camera_default.target_fps),
        };
        let overlay = camera_file.overlay_path.map(|path| OverlaySettings {
            path,
            interval: Duration::from_millis(
                camera_file
                    .overlay_interval_ms
                    .unwrap_or(DEFAULT_OVERLAY_INTERVAL_MS),
            ),
        });

        let detection_default = ColorBlobSettings::default();
        let detection_file = file.detection.unwrap_or_default();
        // Bounds are checked in validate() so env overrides are covered too.
        let detection = ColorBlobSettings {
            range: HsvRange {
                lower: detection_file
                    .hsv_lower
                    .unwrap_or(detection_default.range.lower),
                upper: detection_file
                    .hsv_upper
                    .unwrap_or(detection_default.range.upper),
            },
            min_contour_area: detection_file
                .min_contour_area
                .unwrap_or(detection_default.min_contour_area),
        };

        let sequence_default = DropSequenceConfig::default();
        let align_file = file.alignment.unwrap_or_default();
        let timeout = match align_file.timeout_secs {
            Some(secs) => secs_to_duration("alignment.timeout_secs", secs)?,
            None => sequence_default.coarse.timeout,
        };
        let alignment = AlignmentSettings {
            coarse_tolerance_px: align_file
                .coarse_tolerance_px
                .unwrap_or(sequence_default.coarse.tolerance_px),
            fine_tolerance_px: align_file
                .fine_tolerance_px
                .unwrap_or(sequence_default.fine.tolerance_px),
            coarse_speed: align_file
                .coarse_speed
                .unwrap_or(sequence_default.coarse.speed),
            fine_speed: align_file.fine_speed.unwrap_or(sequence_default.fine.speed),
            creep_speed: align_file
                .creep_speed
                .unwrap_or(sequence_default.creep_speed),
            descend_alt: align_file
                .descend_alt
                .unwrap_or(sequence_default.descend_alt),
            timeout,
        };

        let payload_default = PayloadRelease::default();
        let payload_file = file.payload.unwrap_or_default();
        let payload = PayloadRelease {
            servo_channel: payload_file
                .servo_channel
                .unwrap_or(payload_default.servo_channel),
            open_pwm: payload_file.open_pwm.unwrap_or(payload_default.open_pwm),
            close_pwm: payload_file.close_pwm.unwrap_or(payload_default.close_pwm),
            hold: match payload_file.hold_secs {
                Some(secs) => secs_to_duration("payload.hold_secs", secs)?,
                None => payload_default.hold,
            },
        };

        let waits_file = file.waits.unwrap_or_default();
        let waits = WaitPolicies {
            altitude: wait_policy("waits.altitude_timeout_secs", waits_file.altitude_timeout_secs)?,
            mode: wait_policy("waits.mode_timeout_secs", waits_file.mode_timeout_secs)?,
        };

        Ok(Self {
            camera,
            overlay,
            detection,
            alignment,
            payload,
            waits,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(source) = std::env::var("VSERVO_SOURCE") {
            if !source.trim().is_empty() {
                self.camera.source = source;
            }
        }
        if let Ok(area) = std::env::var("VSERVO_MIN_CONTOUR_AREA") {
            self.detection.min_contour_area = area
                .trim()
                .parse()
                .map_err(|_| anyhow!("VSERVO_MIN_CONTOUR_AREA must be a number of pixels"))?;
        }
        if let Ok(timeout) = std::env::var("VSERVO_ALIGN_TIMEOUT_SECS") {
            let secs: f64 = timeout.trim().parse().map_err(|_| {
                anyhow!("VSERVO_ALIGN_TIMEOUT_SECS must be a number of seconds")
            })?;
            self.alignment.timeout = secs_to_duration("VSERVO_ALIGN_TIMEOUT_SECS", secs)?;
        }
        if let Ok(path) = std::env::var("VSERVO_OVERLAY_PATH") {
            if !path.trim().is_empty() {
                let interval = self
                    .overlay
                    .as_ref()
                    .map(|overlay| overlay.interval)
                    .unwrap_or(Duration::from_millis(DEFAULT_OVERLAY_INTERVAL_MS));
                self.overlay = Some(OverlaySettings {
                    path: PathBuf::from(path),
                    interval,
                });
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera frame size must be non-zero"));
        }
        self.detection.range.validate()?;
        let area = self.detection.min_contour_area;
        if !area.is_finite() || area < 0.0 {
            return Err(anyhow!("min_contour_area must be a non-negative number"));
        }

        let align = &self.alignment;
        if align.coarse_tolerance_px == 0 || align.fine_tolerance_px == 0 {
            return Err(anyhow!("alignment tolerances must be greater than zero"));
        }
        if align.fine_tolerance_px > align.coarse_tolerance_px {
            return Err(anyhow!(
                "fine tolerance ({}px) must not exceed coarse tolerance ({}px)",
                align.fine_tolerance_px,
                align.coarse_tolerance_px
            ));
        }
        for (name, speed) in [
            ("coarse_speed", align.coarse_speed),
            ("fine_speed", align.fine_speed),
            ("creep_speed", align.creep_speed),
        ] {
            if !speed.is_finite() || speed <= 0.0 {
                return Err(anyhow!("{} must be a positive number of m/s", name));
            }
        }
        if !align.descend_alt.is_finite() || align.descend_alt <= 0.0 {
            return Err(anyhow!("descend_alt must be greater than zero"));
        }
        if align.timeout.is_zero() {
            return Err(anyhow!("alignment timeout must be greater than zero"));
        }

        for (name, pwm) in [
            ("open_pwm", self.payload.open_pwm),
            ("close_pwm", self.payload.close_pwm),
        ] {
            if !PWM_RANGE.contains(&pwm) {
                return Err(anyhow!(
                    "{} {} outside {}..={}",
                    name,
                    pwm,
                    PWM_RANGE.start(),
                    PWM_RANGE.end()
                ));
            }
        }
        Ok(())
    }

    /// Drop sequence parameters with the default control timing.
    pub fn drop_sequence(&self) -> DropSequenceConfig {
        let align = &self.alignment;
        DropSequenceConfig {
            coarse: AlignRequest {
                tolerance_px: align.coarse_tolerance_px,
                speed: align.coarse_speed,
                timeout: align.timeout,
            },
            fine: AlignRequest {
                tolerance_px: align.fine_tolerance_px,
                speed: align.fine_speed,
                timeout: align.timeout,
            },
            descend_alt: align.descend_alt,
            creep_speed: align.creep_speed,
            payload: self.payload,
            waits: self.waits,
            ..DropSequenceConfig::default()
        }
    }
}

fn secs_to_duration(name: &str, secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|_| anyhow!("{} must be a non-negative number of seconds", name))
}

fn wait_policy(name: &str, secs: Option<f64>) -> Result<WaitPolicy> {
    match secs {
        Some(secs) => Ok(WaitPolicy::Timeout(secs_to_duration(name, secs)?)),
        None => Ok(WaitPolicy::Indefinite),
    }
}

fn read_config_file(path: &Path) -> Result<MissionConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
