use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::cart::PriceTable;
use crate::detect::{BoxFormat, HttpDetectorConfig, UploadMode};
use crate::frame::Viewport;
use crate::nms::{NmsConfig, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_OVERLAP_THRESHOLD};
use crate::stabilizer::{StabilizerConfig, DEFAULT_HISTORY_LENGTH, DEFAULT_MIN_DETECTION_FRAMES};

const DEFAULT_DETECTOR_URL: &str = "http://127.0.0.1:5000/predict";
const DEFAULT_DETECTOR_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_DISPLAY_WIDTH: u32 = 1280;
const DEFAULT_DISPLAY_HEIGHT: u32 = 720;
const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

#[derive(Debug, Deserialize, Default)]
struct CartConfigFile {
    detector: Option<DetectorConfigFile>,
    stabilizer: Option<StabilizerConfigFile>,
    display: Option<DisplayConfigFile>,
    poll: Option<PollConfigFile>,
    prices: Option<BTreeMap<String, u64>>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    endpoint: Option<String>,
    upload: Option<UploadMode>,
    api_key: Option<String>,
    box_format: Option<BoxFormat>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct StabilizerConfigFile {
    confidence_threshold: Option<f32>,
    overlap_threshold: Option<f32>,
    history_length: Option<usize>,
    min_detection_frames: Option<usize>,
    drop_degenerate_boxes: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct DisplayConfigFile {
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct PollConfigFile {
    interval_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct CartConfig {
    pub detector: DetectorSettings,
    pub nms: NmsConfig,
    pub stabilizer: StabilizerConfig,
    pub display: Viewport,
    pub poll_interval: Duration,
    pub prices: PriceTable,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub endpoint: String,
    pub upload: UploadMode,
    pub api_key: Option<String>,
    pub box_format: BoxFormat,
    pub timeout: Duration,
}

impl DetectorSettings {
    pub fn http_config(&self) -> HttpDetectorConfig {
        HttpDetectorConfig {
            endpoint: self.endpoint.clone(),
            upload: self.upload,
            api_key: self.api_key.clone(),
            box_format: self.box_format,
            timeout: self.timeout,
        }
    }
}

impl Default for CartConfig {
    fn default() -> Self {
        // Defaults cannot fail validation.
        Self::from_file(CartConfigFile::default())
    }
}

impl CartConfig {
    /// Load from `SMART_CART_CONFIG` (JSON, optional), then apply env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SMART_CART_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse and validate a JSON config document. Env overrides are not applied.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let file: CartConfigFile =
            serde_json::from_str(raw).map_err(|e| anyhow!("invalid config: {}", e))?;
        let mut cfg = Self::from_file(file);
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: CartConfigFile) -> Self {
        let detector_file = file.detector.unwrap_or_default();
        let detector = DetectorSettings {
            endpoint: detector_file
                .endpoint
                .unwrap_or_else(|| DEFAULT_DETECTOR_URL.to_string()),
            upload: detector_file.upload.unwrap_or_default(),
            api_key: detector_file.api_key.filter(|key| !key.trim().is_empty()),
            box_format: detector_file.box_format.unwrap_or_default(),
            timeout: Duration::from_millis(
                detector_file
                    .timeout_ms
                    .unwrap_or(DEFAULT_DETECTOR_TIMEOUT_MS),
            ),
        };

        let stab = file.stabilizer.unwrap_or_default();
        let nms = NmsConfig {
            confidence_threshold: stab
                .confidence_threshold
                .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
            overlap_threshold: stab.overlap_threshold.unwrap_or(DEFAULT_OVERLAP_THRESHOLD),
            drop_degenerate_boxes: stab.drop_degenerate_boxes.unwrap_or(true),
        };
        let stabilizer = StabilizerConfig {
            history_length: stab.history_length.unwrap_or(DEFAULT_HISTORY_LENGTH),
            min_detection_frames: stab
                .min_detection_frames
                .unwrap_or(DEFAULT_MIN_DETECTION_FRAMES),
        };

        let display = Viewport::new(
            file.display
                .as_ref()
                .and_then(|display| display.width)
                .unwrap_or(DEFAULT_DISPLAY_WIDTH),
            file.display
                .as_ref()
                .and_then(|display| display.height)
                .unwrap_or(DEFAULT_DISPLAY_HEIGHT),
        );
        let poll_interval = Duration::from_millis(
            file.poll
                .and_then(|poll| poll.interval_ms)
                .unwrap_or(DEFAULT_POLL_INTERVAL_MS),
        );
        let prices = file.prices.map(PriceTable::new).unwrap_or_default();

        Self {
            detector,
            nms,
            stabilizer,
            display,
            poll_interval,
            prices,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("SMART_CART_DETECTOR_URL") {
            if !url.trim().is_empty() {
                self.detector.endpoint = url;
            }
        }
        if let Ok(key) = std::env::var("SMART_CART_API_KEY") {
            if !key.trim().is_empty() {
                self.detector.api_key = Some(key);
            }
        }
        if let Some(value) = env_number("SMART_CART_CONFIDENCE_THRESHOLD")? {
            self.nms.confidence_threshold = value;
        }
        if let Some(value) = env_number("SMART_CART_OVERLAP_THRESHOLD")? {
            self.nms.overlap_threshold = value;
        }
        if let Some(value) = env_number("SMART_CART_HISTORY_LENGTH")? {
            self.stabilizer.history_length = value;
        }
        if let Some(value) = env_number("SMART_CART_MIN_DETECTION_FRAMES")? {
            self.stabilizer.min_detection_frames = value;
        }
        if let Some(value) = env_number("SMART_CART_POLL_INTERVAL_MS")? {
            self.poll_interval = Duration::from_millis(value);
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        validate_unit_interval("confidence_threshold", self.nms.confidence_threshold)?;
        validate_unit_interval("overlap_threshold", self.nms.overlap_threshold)?;

        if self.stabilizer.history_length == 0 {
            return Err(anyhow!("history_length must be at least 1"));
        }
        if self.stabilizer.min_detection_frames == 0
            || self.stabilizer.min_detection_frames > self.stabilizer.history_length
        {
            return Err(anyhow!(
                "min_detection_frames must be between 1 and history_length ({})",
                self.stabilizer.history_length
            ));
        }

        self.detector.endpoint = self.detector.endpoint.trim().to_string();
        if self.detector.endpoint.is_empty() {
            return Err(anyhow!("detector endpoint must not be empty"));
        }
        if self.display.width == 0 || self.display.height == 0 {
            return Err(anyhow!("display width and height must be non-zero"));
        }
        Ok(())
    }
}

fn validate_unit_interval(name: &str, value: f32) -> Result<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(anyhow!("{} must be within [0, 1], got {}", name, value))
    }
}

fn env_number<T: FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a number, got '{}'", key, raw)),
        _ => Ok(None),
    }
}

fn read_config_file(path: &Path) -> Result<CartConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = CartConfig::default();
        assert_eq!(cfg.nms.confidence_threshold, 0.5);
        assert_eq!(cfg.nms.overlap_threshold, 0.5);
        assert!(cfg.nms.drop_degenerate_boxes);
        assert_eq!(cfg.stabilizer.history_length, 10);
        assert_eq!(cfg.stabilizer.min_detection_frames, 3);
        assert_eq!(cfg.detector.endpoint, DEFAULT_DETECTOR_URL);
        assert_eq!(cfg.prices.unit_price("Coke"), Some(100));
    }

    #[test]
    fn json_sections_override_defaults() -> Result<()> {
        let cfg = CartConfig::from_json_str(
            r#"{
                "detector": {"upload": "base64_form", "box_format": "center_size", "api_key": "k"},
                "stabilizer": {"confidence_threshold": 0.7, "history_length": 6},
                "prices": {"Coke": 120}
            }"#,
        )?;
        assert_eq!(cfg.detector.upload, UploadMode::Base64Form);
        assert_eq!(cfg.detector.box_format, BoxFormat::CenterSize);
        assert_eq!(cfg.detector.api_key.as_deref(), Some("k"));
        assert_eq!(cfg.nms.confidence_threshold, 0.7);
        assert_eq!(cfg.stabilizer.history_length, 6);
        assert_eq!(cfg.prices.unit_price("Coke"), Some(120));
        assert_eq!(cfg.prices.unit_price("Ariel"), None);
        Ok(())
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(CartConfig::from_json_str(r#"{"stabilizer": {"overlap_threshold": 1.5}}"#).is_err());
        assert!(CartConfig::from_json_str(r#"{"stabilizer": {"history_length": 0}}"#).is_err());
        assert!(CartConfig::from_json_str(
            r#"{"stabilizer": {"history_length": 4, "min_detection_frames": 5}}"#
        )
        .is_err());
        assert!(CartConfig::from_json_str(r#"{"display": {"width": 0}}"#).is_err());
        assert!(CartConfig::from_json_str(r#"{"prices": {"Coke": -1}}"#).is_err());
        assert!(CartConfig::from_json_str(r#"{"detector": {"upload": "ftp"}}"#).is_err());
    }
}
