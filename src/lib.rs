//! Smart cart kernel
//!
//! Turns the output of a remote object-detection service into a stable,
//! priced shopping cart.
//!
//! # Pipeline
//!
//! 1. **Detect**: a `FrameDetector` sends one frame to the service and
//!    normalizes the boxes it returns into canonical corners.
//! 2. **De-duplicate**: per-class non-max suppression removes overlapping
//!    duplicates (`nms`).
//! 3. **Stabilize**: per-frame counts are folded into a sliding window; an item
//!    enters the cart once it has been seen in enough recent frames, with its
//!    most frequent count as quantity (`stabilizer`).
//! 4. **Check out**: the session latches closed and prices the cart (`cart`).
//!
//! # Module Structure
//!
//! - `geometry`: boxes and IoU
//! - `detect`: detector adapter trait, HTTP and scripted backends, payload decoding
//! - `nms`: per-class suppression and `FrameDetectionSet`
//! - `stabilizer`: history window, `StableCart`, positions
//! - `session`: polling loop and checkout latch
//! - `frame`, `ingest`: frames, viewport, frame sources
//! - `cart`: price table and receipts
//! - `config`: JSON file + environment configuration

pub mod cart;
pub mod config;
pub mod detect;
pub mod frame;
pub mod geometry;
pub mod ingest;
pub mod nms;
pub mod session;
pub mod stabilizer;

pub use cart::{PriceTable, Receipt, ReceiptLine};
pub use config::CartConfig;
pub use detect::{
    BoxFormat, Detection, DetectionUnavailable, FrameDetector, HttpDetector, HttpDetectorConfig,
    ScriptedDetector, UploadMode,
};
pub use frame::{Frame, Scale, Viewport};
pub use geometry::BoundingBox;
pub use ingest::FrameSource;
pub use nms::{deduplicate, non_max_suppression, FrameDetectionSet, NmsConfig};
pub use session::{CartSession, CheckoutLatch, CycleOutcome, SessionState, SessionStats};
pub use stabilizer::{
    mode_quantity, HistoryBuffer, Position, PositionMap, ScreenRegion, StableCart, Stabilizer,
    StabilizerConfig, StabilizerOutput,
};
