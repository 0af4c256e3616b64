//! HTTP detection service backend.
//!
//! Two hosted-model integrations are supported:
//! - `Multipart`: the frame is posted as `multipart/form-data` in field `image`
//!   (self-hosted YOLO servers answering with corner boxes)
//! - `Base64Form`: the frame is posted base64-encoded as a form body, with the
//!   API key as a query parameter (hosted inference APIs answering with
//!   center+size boxes)
//!
//! Responses are normalized through `detect::payload`. Transport failures,
//! non-2xx statuses and unreadable bodies all surface as
//! `DetectionUnavailable`; nothing is retried here.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::io::Read;
use std::time::Duration;
use url::Url;

use crate::detect::backend::{DetectionUnavailable, FrameDetector};
use crate::detect::payload::{parse_detections, BoxFormat};
use crate::detect::result::Detection;
use crate::frame::Frame;

const MULTIPART_FIELD: &str = "image";
const MAX_RESPONSE_BYTES: u64 = 4 * 1024 * 1024;

/// How the frame is uploaded to the service.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadMode {
    #[default]
    Multipart,
    Base64Form,
}

impl UploadMode {
    pub fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "multipart" => Ok(Self::Multipart),
            "base64_form" | "base64" => Ok(Self::Base64Form),
            other => Err(anyhow!(
                "unknown upload mode '{}'; expected multipart or base64_form",
                other
            )),
        }
    }
}

#[derive(Clone, Debug)]
pub struct HttpDetectorConfig {
    /// Prediction endpoint, e.g. `http://127.0.0.1:5000/predict`.
    pub endpoint: String,
    pub upload: UploadMode,
    /// Sent as the `api_key` query parameter when set.
    pub api_key: Option<String>,
    pub box_format: BoxFormat,
    pub timeout: Duration,
}

impl Default for HttpDetectorConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:5000/predict".to_string(),
            upload: UploadMode::Multipart,
            api_key: None,
            box_format: BoxFormat::Auto,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Detection service reached over HTTP.
pub struct HttpDetector {
    config: HttpDetectorConfig,
    endpoint: Url,
    agent: ureq::Agent,
    requests: u64,
}

impl HttpDetector {
    pub fn new(config: HttpDetectorConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint)
            .with_context(|| format!("parse detector endpoint {}", config.endpoint))?;
        match endpoint.scheme() {
            "http" | "https" => {}
            other => {
                return Err(anyhow!(
                    "unsupported detector scheme '{}'; expected http(s)",
                    other
                ))
            }
        }
        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        Ok(Self {
            config,
            endpoint,
            agent,
            requests: 0,
        })
    }

    /// Service root used for the reachability probe: the endpoint with its last
    /// path segment and query removed.
    pub fn root_url(&self) -> Url {
        let mut root = self.endpoint.clone();
        root.set_query(None);
        let path = root.path().to_string();
        let parent = match path.rfind('/') {
            Some(idx) => &path[..=idx],
            None => "/",
        };
        root.set_path(parent);
        root
    }

    pub fn requests(&self) -> u64 {
        self.requests
    }

    fn send(&mut self, frame: &Frame) -> Result<ureq::Response, ureq::Error> {
        self.requests += 1;
        match self.config.upload {
            UploadMode::Multipart => {
                let boundary = format!("----smartcart{:08x}{:08x}", frame.sequence, self.requests);
                let mime = image::guess_format(frame.encoded())
                    .map(|format| format.to_mime_type())
                    .unwrap_or("application/octet-stream");
                let body = multipart_body(&boundary, MULTIPART_FIELD, mime, frame.encoded());
                self.authorized(self.agent.post(self.endpoint.as_str()))
                    .set(
                        "Content-Type",
                        &format!("multipart/form-data; boundary={}", boundary),
                    )
                    .send_bytes(&body)
            }
            UploadMode::Base64Form => {
                let body = base64::encode(frame.encoded());
                self.authorized(self.agent.post(self.endpoint.as_str()))
                    .set("Content-Type", "application/x-www-form-urlencoded")
                    .send_string(&body)
            }
        }
    }

    fn authorized(&self, request: ureq::Request) -> ureq::Request {
        match self.config.api_key.as_deref() {
            Some(key) if !key.is_empty() => request.query("api_key", key),
            _ => request,
        }
    }
}

impl FrameDetector for HttpDetector {
    fn name(&self) -> &'static str {
        "http"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, DetectionUnavailable> {
        let response = self.send(frame).map_err(unavailable)?;

        let mut body = Vec::new();
        response
            .into_reader()
            .take(MAX_RESPONSE_BYTES)
            .read_to_end(&mut body)
            .map_err(|e| DetectionUnavailable::Transport(format!("read response: {}", e)))?;
        let value: serde_json::Value = serde_json::from_slice(&body)
            .map_err(|e| DetectionUnavailable::Payload(e.to_string()))?;
        let parsed = parse_detections(&value, self.config.box_format)
            .map_err(|e| DetectionUnavailable::Payload(e.to_string()))?;

        log::debug!(
            "frame #{}: {} detections ({} malformed records dropped)",
            frame.sequence,
            parsed.detections.len(),
            parsed.dropped
        );
        Ok(parsed.detections)
    }

    fn probe(&mut self) -> Result<(), DetectionUnavailable> {
        let root = self.root_url();
        self.agent
            .get(root.as_str())
            .call()
            .map(|_| ())
            .map_err(unavailable)
    }
}

fn unavailable(err: ureq::Error) -> DetectionUnavailable {
    match err {
        ureq::Error::Status(code, _) => DetectionUnavailable::Status { code },
        ureq::Error::Transport(transport) => DetectionUnavailable::Transport(transport.to_string()),
    }
}

fn multipart_body(boundary: &str, field: &str, mime: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(data.len() + 256);
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"frame\"\r\n",
            field
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", mime).as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}
