mod backend;
mod backends;
pub mod payload;
mod result;

pub use backend::{DetectionUnavailable, FrameDetector};
pub use backends::{HttpDetector, HttpDetectorConfig, ScriptedDetector, UploadMode};
pub use payload::{parse_detections, BoxFormat, ParsedPayload};
pub use result::Detection;
