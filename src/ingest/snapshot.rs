//! HTTP snapshot source.
//!
//! Fetches one still JPEG per call from a camera's snapshot URL (IP cameras,
//! ESP32-CAM `/capture`, phone webcam apps).

use anyhow::{anyhow, Context, Result};
use std::io::Read;
use std::time::{Duration, Instant};
use url::Url;

use crate::frame::Frame;

const MAX_SNAPSHOT_BYTES: u64 = 8 * 1024 * 1024;

#[derive(Clone, Debug)]
pub struct SnapshotConfig {
    pub url: String,
    pub timeout: Duration,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8080/shot.jpg".to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

pub struct SnapshotSource {
    config: SnapshotConfig,
    agent: ureq::Agent,
    connected_at: Option<Instant>,
    last_frame_at: Option<Instant>,
    frame_count: u64,
    last_error: Option<String>,
}

impl SnapshotSource {
    pub fn new(config: SnapshotConfig) -> Result<Self> {
        let url = Url::parse(&config.url).context("parse snapshot url")?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!(
                "unsupported snapshot scheme '{}'; expected http(s)",
                url.scheme()
            ));
        }
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Ok(Self {
            config,
            agent,
            connected_at: None,
            last_frame_at: None,
            frame_count: 0,
            last_error: None,
        })
    }

    /// Fetch one snapshot to confirm the camera answers.
    pub fn connect(&mut self) -> Result<()> {
        self.fetch().context("connect to snapshot camera")?;
        self.connected_at = Some(Instant::now());
        log::info!("SnapshotSource: connected to {}", self.config.url);
        Ok(())
    }

    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        let frame = self
            .fetch()
            .and_then(|bytes| Frame::from_encoded(bytes, self.frame_count + 1));
        match frame {
            Ok(frame) => {
                self.frame_count += 1;
                self.last_frame_at = Some(Instant::now());
                self.last_error = None;
                Ok(Some(frame))
            }
            Err(err) => {
                self.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    pub fn is_healthy(&self) -> bool {
        if self.last_error.is_some() {
            return false;
        }
        let Some(connected_at) = self.connected_at else {
            return false;
        };
        let grace = self.config.timeout * 2;
        match self.last_frame_at {
            Some(last) => last.elapsed() <= grace,
            None => connected_at.elapsed() <= grace,
        }
    }

    pub fn frames_captured(&self) -> u64 {
        self.frame_count
    }

    pub fn location(&self) -> String {
        self.config.url.clone()
    }

    fn fetch(&self) -> Result<Vec<u8>> {
        let response = self
            .agent
            .get(&self.config.url)
            .call()
            .with_context(|| format!("fetch snapshot from {}", self.config.url))?;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_SNAPSHOT_BYTES)
            .read_to_end(&mut bytes)
            .context("read snapshot")?;
        if bytes.is_empty() {
            return Err(anyhow!("empty snapshot"));
        }
        Ok(bytes)
    }
}
