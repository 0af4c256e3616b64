//! Per-class non-max suppression.
//!
//! A frame's raw detections are grouped by class, filtered by confidence, and
//! greedily de-duplicated by IoU. The survivors of each class are ordered by
//! descending confidence; index 0 is the representative instance used for
//! position reporting.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::detect::Detection;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
pub const DEFAULT_OVERLAP_THRESHOLD: f32 = 0.5;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NmsConfig {
    /// Detections below this confidence are discarded before suppression.
    pub confidence_threshold: f32,
    /// IoU above which a lower-confidence box is suppressed.
    pub overlap_threshold: f32,
    /// Drop zero-area, inverted, or non-finite boxes before counting.
    pub drop_degenerate_boxes: bool,
}

impl Default for NmsConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            overlap_threshold: DEFAULT_OVERLAP_THRESHOLD,
            drop_degenerate_boxes: true,
        }
    }
}

/// De-duplicated result of one frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameDetectionSet {
    pub counts_by_class: BTreeMap<String, u32>,
    pub surviving_by_class: BTreeMap<String, Vec<Detection>>,
}

impl FrameDetectionSet {
    pub fn is_empty(&self) -> bool {
        self.counts_by_class.is_empty()
    }

    /// Total surviving instances across all classes.
    pub fn total(&self) -> u32 {
        self.counts_by_class.values().sum()
    }

    /// Representative (highest-confidence) detection of a class.
    pub fn representative(&self, class: &str) -> Option<&Detection> {
        self.surviving_by_class
            .get(class)
            .and_then(|survivors| survivors.first())
    }
}

/// Suppress overlapping detections of a single class.
///
/// The sort is stable, so equal confidences keep arrival order.
pub fn non_max_suppression(detections: &[Detection], config: &NmsConfig) -> Vec<Detection> {
    let mut candidates: Vec<&Detection> = detections
        .iter()
        .filter(|det| det.confidence >= config.confidence_threshold)
        .collect();
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut selected: Vec<Detection> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let overlaps = selected
            .iter()
            .any(|kept| kept.bbox.iou(&candidate.bbox) > config.overlap_threshold);
        if !overlaps {
            selected.push(candidate.clone());
        }
    }
    selected
}

/// Group a frame's detections by class and run suppression on each group.
///
/// Classes with no survivors are absent from both maps.
pub fn deduplicate(detections: &[Detection], config: &NmsConfig) -> FrameDetectionSet {
    let mut by_class: BTreeMap<&str, Vec<Detection>> = BTreeMap::new();
    for det in detections {
        if config.drop_degenerate_boxes && det.bbox.is_degenerate() {
            log::debug!(
                "dropping degenerate {} box {:?} (conf={:.2})",
                det.class,
                det.bbox,
                det.confidence
            );
            continue;
        }
        by_class.entry(det.class.as_str()).or_default().push(det.clone());
    }

    let mut set = FrameDetectionSet::default();
    for (class, group) in by_class {
        let survivors = non_max_suppression(&group, config);
        if survivors.is_empty() {
            continue;
        }
        if survivors.len() < group.len() {
            log::debug!(
                "{}: kept {} of {} detections",
                class,
                survivors.len(),
                group.len()
            );
        }
        set.counts_by_class
            .insert(class.to_string(), survivors.len() as u32);
        set.surviving_by_class.insert(class.to_string(), survivors);
    }
    set
}
