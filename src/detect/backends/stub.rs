use std::collections::VecDeque;

use crate::detect::backend::{DetectionUnavailable, FrameDetector};
use crate::detect::result::Detection;
use crate::frame::Frame;

type CallHook = Box<dyn FnMut(u64) + Send>;

/// Scripted backend for tests and replays.
///
/// Each `detect` call pops the next scripted result. Once the script runs out
/// every frame comes back empty.
pub struct ScriptedDetector {
    script: VecDeque<Result<Vec<Detection>, DetectionUnavailable>>,
    calls: u64,
    hook: Option<CallHook>,
}

impl ScriptedDetector {
    pub fn new() -> Self {
        Self {
            script: VecDeque::new(),
            calls: 0,
            hook: None,
        }
    }

    pub fn from_frames<I>(frames: I) -> Self
    where
        I: IntoIterator<Item = Vec<Detection>>,
    {
        let mut detector = Self::new();
        for frame in frames {
            detector.push_frame(frame);
        }
        detector
    }

    pub fn push_frame(&mut self, detections: Vec<Detection>) {
        self.script.push_back(Ok(detections));
    }

    pub fn push_unavailable(&mut self, err: DetectionUnavailable) {
        self.script.push_back(Err(err));
    }

    /// Run `hook` with the 1-based call number while each detection is "in flight".
    pub fn with_hook<F>(mut self, hook: F) -> Self
    where
        F: FnMut(u64) + Send + 'static,
    {
        self.hook = Some(Box::new(hook));
        self
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl Default for ScriptedDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDetector for ScriptedDetector {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>, DetectionUnavailable> {
        self.calls += 1;
        if let Some(hook) = self.hook.as_mut() {
            hook(self.calls);
        }
        self.script.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }
}
