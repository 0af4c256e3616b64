//! Local image directory source.
//!
//! Plays back the still images (`.jpg`, `.jpeg`, `.png`) of a local directory
//! in file-name order, optionally looping. Used for demos and bench runs where
//! no camera is attached.

use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;

use crate::frame::Frame;

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Clone, Debug)]
pub struct DirectoryConfig {
    pub path: PathBuf,
    /// Start over from the first image after the last one.
    pub repeat: bool,
}

pub struct DirectorySource {
    config: DirectoryConfig,
    files: Vec<PathBuf>,
    cursor: usize,
    frame_count: u64,
    last_error: Option<String>,
}

impl DirectorySource {
    pub fn new(config: DirectoryConfig) -> Result<Self> {
        if config.path.as_os_str().is_empty() {
            return Err(anyhow!("directory source requires a path"));
        }
        Ok(Self {
            config,
            files: Vec::new(),
            cursor: 0,
            frame_count: 0,
            last_error: None,
        })
    }

    /// List the directory. Fails when it holds no images.
    pub fn connect(&mut self) -> Result<()> {
        let entries = std::fs::read_dir(&self.config.path)
            .with_context(|| format!("read frame directory {}", self.config.path.display()))?;
        let mut files = Vec::new();
        for entry in entries {
            let path = entry.context("read directory entry")?.path();
            if path.is_file() && has_image_extension(&path) {
                files.push(path);
            }
        }
        files.sort();
        if files.is_empty() {
            return Err(anyhow!(
                "no images found in {}",
                self.config.path.display()
            ));
        }
        log::info!(
            "DirectorySource: {} images in {}",
            files.len(),
            self.config.path.display()
        );
        self.files = files;
        self.cursor = 0;
        Ok(())
    }

    /// Next frame, or `None` once every image has been played without `repeat`.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.files.is_empty() {
            return Err(anyhow!("directory source not connected; call connect() first"));
        }
        if self.cursor >= self.files.len() {
            if !self.config.repeat {
                return Ok(None);
            }
            self.cursor = 0;
        }
        let path = &self.files[self.cursor];
        self.cursor += 1;

        let frame = std::fs::read(path)
            .with_context(|| format!("read frame {}", path.display()))
            .and_then(|bytes| Frame::from_encoded(bytes, self.frame_count + 1));
        match frame {
            Ok(frame) => {
                self.frame_count += 1;
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
        !self.files.is_empty() && self.last_error.is_none()
    }

    pub fn frames_captured(&self) -> u64 {
        self.frame_count
    }

    pub fn location(&self) -> String {
        self.config.path.display().to_string()
    }
}

fn has_image_extension(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}
