pub mod http;
pub mod stub;

pub use http::{HttpDetector, HttpDetectorConfig, UploadMode};
pub use stub::ScriptedDetector;
