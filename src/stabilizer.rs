//! Temporal stabilization of per-frame counts.
//!
//! Frame-level counts flicker: a frame misses an item, or double counts one.
//! The stabilizer keeps the last N frames' `counts_by_class` and derives the
//! cart from that window alone:
//!
//! - a class is stable once it appears in at least `min_detection_frames`
//!   buffered frames
//! - its quantity is the most frequent per-frame count
//!
//! The cart and the position map are recomputed from scratch on every update.
//! The history buffer is the only state carried between frames; items leave the
//! cart when enough empty frames push their sightings out of the window.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;

use crate::frame::{Scale, Viewport};
use crate::nms::FrameDetectionSet;

pub const DEFAULT_HISTORY_LENGTH: usize = 10;
pub const DEFAULT_MIN_DETECTION_FRAMES: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StabilizerConfig {
    /// Number of frames kept in the sliding window.
    pub history_length: usize,
    /// Buffered frames a class must appear in before it enters the cart.
    pub min_detection_frames: usize,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            history_length: DEFAULT_HISTORY_LENGTH,
            min_detection_frames: DEFAULT_MIN_DETECTION_FRAMES,
        }
    }
}

// ----------------------------------------------------------------------------
// HistoryBuffer: bounded window of per-frame counts
// ----------------------------------------------------------------------------

/// Last N `counts_by_class` maps in arrival order, oldest first.
#[derive(Clone, Debug)]
pub struct HistoryBuffer {
    frames: VecDeque<BTreeMap<String, u32>>,
    capacity: usize,
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Append the newest frame, evicting the oldest once over capacity.
    pub fn push(&mut self, counts: BTreeMap<String, u32>) {
        self.frames.push_back(counts);
        while self.frames.len() > self.capacity {
            self.frames.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &BTreeMap<String, u32>> {
        self.frames.iter()
    }

    /// Buffered frames in which `class` was seen with a positive count.
    pub fn frames_seen(&self, class: &str) -> usize {
        self.counts_for(class).count()
    }

    /// Positive per-frame counts of `class`, in buffer order.
    pub fn counts_for<'a>(&'a self, class: &'a str) -> impl Iterator<Item = u32> + 'a {
        self.frames
            .iter()
            .filter_map(move |frame| frame.get(class).copied())
            .filter(|count| *count > 0)
    }

    /// Every class present in any buffered frame, in first-seen order.
    pub fn classes(&self) -> Vec<&str> {
        let mut classes: Vec<&str> = Vec::new();
        for frame in &self.frames {
            for (class, count) in frame {
                if *count > 0 && !classes.contains(&class.as_str()) {
                    classes.push(class.as_str());
                }
            }
        }
        classes
    }
}

/// Most frequent value, scanning in order.
///
/// Only a strictly greater frequency replaces the current mode, so the first
/// value to reach the winning frequency is kept.
pub fn mode_quantity<I>(counts: I) -> Option<u32>
where
    I: IntoIterator<Item = u32>,
{
    let mut frequencies: HashMap<u32, usize> = HashMap::new();
    let mut best: Option<(u32, usize)> = None;
    for count in counts {
        let freq = frequencies.entry(count).or_insert(0);
        *freq += 1;
        match best {
            Some((_, best_freq)) if *freq <= best_freq => {}
            _ => best = Some((count, *freq)),
        }
    }
    best.map(|(count, _)| count)
}

// ----------------------------------------------------------------------------
// Outputs: StableCart, Position, PositionMap
// ----------------------------------------------------------------------------

/// Stable quantity per product class. Unstable classes are absent, never zero.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct StableCart(BTreeMap<String, u32>);

impl StableCart {
    pub fn get(&self, class: &str) -> Option<u32> {
        self.0.get(class).copied()
    }

    pub fn contains(&self, class: &str) -> bool {
        self.0.contains_key(class)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.0.iter().map(|(class, qty)| (class.as_str(), *qty))
    }

    /// Sum of quantities over all classes.
    pub fn item_count(&self) -> u32 {
        self.0.values().sum()
    }

    pub fn as_map(&self) -> &BTreeMap<String, u32> {
        &self.0
    }
}

impl FromIterator<(String, u32)> for StableCart {
    fn from_iter<T: IntoIterator<Item = (String, u32)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for StableCart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "(empty)");
        }
        let entries: Vec<String> = self
            .0
            .iter()
            .map(|(class, qty)| format!("{} x{}", class, qty))
            .collect();
        write!(f, "{}", entries.join(", "))
    }
}

/// Representative position of an item in viewport pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub confidence: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum VerticalBand {
    Top,
    Middle,
    Bottom,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum HorizontalBand {
    Left,
    Center,
    Right,
}

/// Coarse location of an item on screen, e.g. "Top Left".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ScreenRegion {
    pub vertical: VerticalBand,
    pub horizontal: HorizontalBand,
}

impl fmt::Display for ScreenRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {:?}", self.vertical, self.horizontal)
    }
}

const LOWER_THIRD: f32 = 0.33;
const UPPER_THIRD: f32 = 0.67;

impl Position {
    /// Viewport third the position falls in, split at 33% and 67%.
    pub fn region(&self, viewport: &Viewport) -> ScreenRegion {
        let width = viewport.width as f32;
        let height = viewport.height as f32;
        let horizontal = if self.x < width * LOWER_THIRD {
            HorizontalBand::Left
        } else if self.x > width * UPPER_THIRD {
            HorizontalBand::Right
        } else {
            HorizontalBand::Center
        };
        let vertical = if self.y < height * LOWER_THIRD {
            VerticalBand::Top
        } else if self.y > height * UPPER_THIRD {
            VerticalBand::Bottom
        } else {
            VerticalBand::Middle
        };
        ScreenRegion {
            vertical,
            horizontal,
        }
    }
}

/// Positions of classes seen in the current frame only.
pub type PositionMap = BTreeMap<String, Position>;

/// What one stabilizer update hands to the UI and cart collaborators.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StabilizerOutput {
    pub stable_cart: StableCart,
    pub positions: PositionMap,
}

// ----------------------------------------------------------------------------
// Stabilizer
// ----------------------------------------------------------------------------

/// Sliding-window majority vote over per-frame counts.
///
/// One instance per cart. Instances share nothing.
#[derive(Clone, Debug)]
pub struct Stabilizer {
    config: StabilizerConfig,
    history: HistoryBuffer,
    cart: StableCart,
    positions: PositionMap,
}

impl Stabilizer {
    pub fn new(config: StabilizerConfig) -> Self {
        Self {
            history: HistoryBuffer::new(config.history_length),
            config,
            cart: StableCart::default(),
            positions: PositionMap::new(),
        }
    }

    pub fn config(&self) -> &StabilizerConfig {
        &self.config
    }

    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }

    pub fn cart(&self) -> &StableCart {
        &self.cart
    }

    pub fn positions(&self) -> &PositionMap {
        &self.positions
    }

    /// Fold one frame into the window and recompute cart and positions.
    ///
    /// Empty frames are folded too; they are what ages items out.
    pub fn update(&mut self, frame: &FrameDetectionSet, scale: Scale) -> StabilizerOutput {
        self.history.push(frame.counts_by_class.clone());

        let cart = self.recompute_cart();
        if cart != self.cart {
            log::info!("cart changed: {}", cart);
        }
        self.cart = cart;
        self.positions = positions_for(frame, scale);

        StabilizerOutput {
            stable_cart: self.cart.clone(),
            positions: self.positions.clone(),
        }
    }

    fn recompute_cart(&self) -> StableCart {
        self.history
            .classes()
            .into_iter()
            .filter(|class| self.history.frames_seen(class) >= self.config.min_detection_frames)
            .filter_map(|class| {
                mode_quantity(self.history.counts_for(class)).map(|qty| (class.to_string(), qty))
            })
            .collect()
    }
}

fn positions_for(frame: &FrameDetectionSet, scale: Scale) -> PositionMap {
    frame
        .surviving_by_class
        .iter()
        .filter_map(|(class, survivors)| {
            let main = survivors.first()?;
            let (cx, cy) = main.bbox.center();
            Some((
                class.clone(),
                Position {
                    x: cx * scale.x,
                    y: cy * scale.y,
                    confidence: main.confidence,
                },
            ))
        })
        .collect()
}
