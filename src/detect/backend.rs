use thiserror::Error;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// The detection service could not produce a result for this frame.
///
/// Never fatal: the session skips stabilization for the cycle and keeps polling.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DetectionUnavailable {
    #[error("detection service unreachable: {0}")]
    Transport(String),
    #[error("detection service returned HTTP {code}")]
    Status { code: u16 },
    #[error("detection service returned an unreadable payload: {0}")]
    Payload(String),
}

/// Frame detector adapter.
///
/// Wraps a single external detection call. Implementations normalize the
/// service's native box convention into canonical corners and must not retry;
/// the polling loop decides whether to continue.
pub trait FrameDetector: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectionUnavailable>;

    /// Optional reachability check before polling starts.
    fn probe(&mut self) -> Result<(), DetectionUnavailable> {
        Ok(())
    }
}
