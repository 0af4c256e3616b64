use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use smart_cart::config::CartConfig;
use smart_cart::{BoxFormat, UploadMode};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "SMART_CART_CONFIG",
        "SMART_CART_DETECTOR_URL",
        "SMART_CART_API_KEY",
        "SMART_CART_CONFIDENCE_THRESHOLD",
        "SMART_CART_OVERLAP_THRESHOLD",
        "SMART_CART_HISTORY_LENGTH",
        "SMART_CART_MIN_DETECTION_FRAMES",
        "SMART_CART_POLL_INTERVAL_MS",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "detector": {
            "endpoint": "http://detector.local:5000/predict",
            "upload": "base64_form",
            "box_format": "center_size",
            "timeout_ms": 2500
        },
        "stabilizer": {
            "confidence_threshold": 0.6,
            "overlap_threshold": 0.4,
            "history_length": 8,
            "min_detection_frames": 4
        },
        "display": {"width": 960, "height": 540},
        "poll": {"interval_ms": 250},
        "prices": {"Coke": 110, "Lays": 50}
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("SMART_CART_CONFIG", file.path());
    std::env::set_var("SMART_CART_API_KEY", "secret");
    std::env::set_var("SMART_CART_MIN_DETECTION_FRAMES", "2");
    std::env::set_var("SMART_CART_POLL_INTERVAL_MS", "500");

    let cfg = CartConfig::load().expect("load config");
    assert_eq!(cfg.detector.endpoint, "http://detector.local:5000/predict");
    assert_eq!(cfg.detector.upload, UploadMode::Base64Form);
    assert_eq!(cfg.detector.box_format, BoxFormat::CenterSize);
    assert_eq!(cfg.detector.api_key.as_deref(), Some("secret"));
    assert_eq!(cfg.detector.timeout, Duration::from_millis(2500));
    assert_eq!(cfg.nms.confidence_threshold, 0.6);
    assert_eq!(cfg.nms.overlap_threshold, 0.4);
    assert_eq!(cfg.stabilizer.history_length, 8);
    assert_eq!(cfg.stabilizer.min_detection_frames, 2);
    assert_eq!((cfg.display.width, cfg.display.height), (960, 540));
    assert_eq!(cfg.poll_interval, Duration::from_millis(500));
    assert_eq!(cfg.prices.unit_price("Lays"), Some(50));
    assert_eq!(cfg.prices.unit_price("Dettol"), None);

    clear_env();
}

#[test]
fn defaults_apply_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SMART_CART_DETECTOR_URL", "http://10.0.0.5:8080/detect");
    let cfg = CartConfig::load().expect("load config");
    assert_eq!(cfg.detector.endpoint, "http://10.0.0.5:8080/detect");
    assert_eq!(cfg.detector.upload, UploadMode::Multipart);
    assert_eq!(cfg.nms.confidence_threshold, 0.5);
    assert_eq!(cfg.stabilizer.history_length, 10);
    assert_eq!(cfg.stabilizer.min_detection_frames, 3);
    assert_eq!(cfg.prices.unit_price("Wai Wai"), Some(20));

    clear_env();
}

#[test]
fn rejects_invalid_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SMART_CART_HISTORY_LENGTH", "ten");
    assert!(CartConfig::load().is_err());

    clear_env();
    std::env::set_var("SMART_CART_CONFIDENCE_THRESHOLD", "1.2");
    assert!(CartConfig::load().is_err());

    clear_env();
    std::env::set_var("SMART_CART_HISTORY_LENGTH", "2");
    assert!(CartConfig::load().is_err(), "min frames 3 exceeds window 2");

    clear_env();
}

#[test]
fn missing_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = NamedTempFile::new().expect("temp config");
    let missing = file.path().with_extension("missing.json");
    std::env::set_var("SMART_CART_CONFIG", &missing);
    let err = CartConfig::load().expect_err("missing file");
    assert!(err.to_string().contains("failed to read config file"));

    clear_env();
}
