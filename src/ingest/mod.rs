//! Frame sources.
//!
//! This module provides sources for encoded camera frames:
//! - Local image directories (demos, bench runs)
//! - HTTP snapshot URLs (IP cameras, ESP32-CAM)
//!
//! A source hands frames to the session one at a time. It never buffers ahead,
//! so a slow detection call naturally throttles capture.

pub mod file;
pub mod snapshot;

use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

pub use file::{DirectoryConfig, DirectorySource};
pub use snapshot::{SnapshotConfig, SnapshotSource};

use crate::frame::Frame;

/// Statistics for a frame source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub source: String,
}

pub enum FrameSource {
    Directory(DirectorySource),
    Snapshot(SnapshotSource),
}

impl FrameSource {
    /// `http(s)://` locations are snapshot cameras; anything else is a directory.
    pub fn from_location(location: &str, repeat: bool, timeout: Duration) -> Result<Self> {
        if location.starts_with("http://") || location.starts_with("https://") {
            Ok(Self::Snapshot(SnapshotSource::new(SnapshotConfig {
                url: location.to_string(),
                timeout,
            })?))
        } else {
            Ok(Self::Directory(DirectorySource::new(DirectoryConfig {
                path: PathBuf::from(location),
                repeat,
            })?))
        }
    }

    pub fn connect(&mut self) -> Result<()> {
        match self {
            Self::Directory(source) => source.connect(),
            Self::Snapshot(source) => source.connect(),
        }
    }

    /// Capture the next frame. `None` means the source has ended.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        match self {
            Self::Directory(source) => source.next_frame(),
            Self::Snapshot(source) => source.next_frame(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        match self {
            Self::Directory(source) => source.is_healthy(),
            Self::Snapshot(source) => source.is_healthy(),
        }
    }

    pub fn stats(&self) -> SourceStats {
        match self {
            Self::Directory(source) => SourceStats {
                frames_captured: source.frames_captured(),
                source: source.location(),
            },
            Self::Snapshot(source) => SourceStats {
                frames_captured: source.frames_captured(),
                source: source.location(),
            },
        }
    }
}
