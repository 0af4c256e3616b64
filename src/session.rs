//! Cart session: the single polling loop.
//!
//! One cycle = frame → detector → per-class NMS → stabilizer. Cycles never
//! overlap; the next one starts only after the current detection call has
//! returned, successfully or not.
//!
//! Checkout is a one-way latch (`Active` → `Closed`). Once closed:
//! - no new cycle starts
//! - a call that was in flight when the latch closed has its result dropped
//!
//! The latch is shareable so a signal handler can close it from another thread.

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cart::{PriceTable, Receipt};
use crate::detect::{DetectionUnavailable, FrameDetector};
use crate::frame::{Frame, Viewport};
use crate::nms::{deduplicate, NmsConfig};
use crate::stabilizer::{PositionMap, StableCart, Stabilizer, StabilizerConfig, StabilizerOutput};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Active,
    Closed,
}

/// One-way checkout flag. Never reopens.
#[derive(Clone, Debug, Default)]
pub struct CheckoutLatch(Arc<AtomicBool>);

impl CheckoutLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Close the latch. Returns true only for the call that performed the transition.
    pub fn close(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> SessionState {
        if self.is_closed() {
            SessionState::Closed
        } else {
            SessionState::Active
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum CycleOutcome {
    /// The session was already closed; the detector was not called.
    Halted,
    /// Detections were folded into the stabilizer.
    Applied(StabilizerOutput),
    /// The detector failed; history is unchanged.
    Skipped(DetectionUnavailable),
    /// Checkout happened while the call was in flight; its result was dropped.
    Discarded,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Detector calls issued.
    pub cycles: u64,
    pub applied: u64,
    pub skipped: u64,
    pub discarded: u64,
    pub frame_errors: u64,
}

pub struct CartSession<D: FrameDetector> {
    detector: D,
    nms: NmsConfig,
    stabilizer: Stabilizer,
    latch: CheckoutLatch,
    stats: SessionStats,
}

impl<D: FrameDetector> CartSession<D> {
    pub fn new(detector: D, nms: NmsConfig, stabilizer: StabilizerConfig) -> Self {
        Self {
            detector,
            nms,
            stabilizer: Stabilizer::new(stabilizer),
            latch: CheckoutLatch::new(),
            stats: SessionStats::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.latch.state()
    }

    /// Handle for closing the session from elsewhere (e.g. a Ctrl-C handler).
    pub fn latch(&self) -> CheckoutLatch {
        self.latch.clone()
    }

    pub fn cart(&self) -> &StableCart {
        self.stabilizer.cart()
    }

    pub fn positions(&self) -> &PositionMap {
        self.stabilizer.positions()
    }

    pub fn stabilizer(&self) -> &Stabilizer {
        &self.stabilizer
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    pub fn detector_mut(&mut self) -> &mut D {
        &mut self.detector
    }

    /// Run one detection cycle on `frame`.
    pub fn run_cycle(&mut self, frame: &Frame, viewport: &Viewport) -> CycleOutcome {
        if self.latch.is_closed() {
            return CycleOutcome::Halted;
        }

        self.stats.cycles += 1;
        let result = self.detector.detect(frame);

        if self.latch.is_closed() {
            self.stats.discarded += 1;
            log::info!(
                "frame #{}: checkout started during detection, result discarded",
                frame.sequence
            );
            return CycleOutcome::Discarded;
        }

        match result {
            Ok(detections) => {
                let set = deduplicate(&detections, &self.nms);
                let output = self
                    .stabilizer
                    .update(&set, viewport.scale_for_frame(frame));
                self.stats.applied += 1;
                CycleOutcome::Applied(output)
            }
            Err(err) => {
                self.stats.skipped += 1;
                log::warn!(
                    "frame #{}: detection unavailable ({}), skipping cycle",
                    frame.sequence,
                    err
                );
                CycleOutcome::Skipped(err)
            }
        }
    }

    /// Receipt for the current stable cart, without changing state.
    pub fn receipt(&self, prices: &PriceTable) -> Receipt {
        Receipt::build(self.cart(), prices)
    }

    /// Close the session and price the cart.
    ///
    /// An empty cart is refused and the session stays active.
    pub fn checkout(&mut self, prices: &PriceTable) -> Result<Receipt> {
        if self.latch.is_closed() {
            return Err(anyhow!("session already checked out"));
        }
        if self.cart().is_empty() {
            return Err(anyhow!("no items detected in cart"));
        }
        self.latch.close();
        let receipt = self.receipt(prices);
        log::info!(
            "checkout: {} items, total Rs. {}",
            self.cart().item_count(),
            receipt.total
        );
        Ok(receipt)
    }

    /// Poll until the session closes, the source ends, or `on_cycle` breaks.
    ///
    /// Frame capture errors are logged and retried after `interval`.
    pub fn poll<F, C>(
        &mut self,
        mut next_frame: F,
        viewport: &Viewport,
        interval: Duration,
        mut on_cycle: C,
    ) -> SessionState
    where
        F: FnMut() -> Result<Option<Frame>>,
        C: FnMut(&CycleOutcome) -> ControlFlow<()>,
    {
        while !self.latch.is_closed() {
            let frame = match next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    log::info!("frame source ended");
                    break;
                }
                Err(err) => {
                    self.stats.frame_errors += 1;
                    log::warn!("frame capture failed: {}", err);
                    pause(interval);
                    continue;
                }
            };

            let outcome = self.run_cycle(&frame, viewport);
            if on_cycle(&outcome).is_break() {
                break;
            }
            pause(interval);
        }
        self.state()
    }
}

fn pause(interval: Duration) {
    if !interval.is_zero() {
        std::thread::sleep(interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{Detection, ScriptedDetector};
    use crate::geometry::BoundingBox;

    fn coke() -> Detection {
        Detection::new("Coke", 0.9, BoundingBox::from_corners(0.0, 0.0, 100.0, 100.0))
    }

    fn frame(sequence: u64) -> Frame {
        Frame::new(vec![0u8; 4], 640, 480, sequence).unwrap()
    }

    fn session(detector: ScriptedDetector) -> CartSession<ScriptedDetector> {
        CartSession::new(detector, NmsConfig::default(), StabilizerConfig::default())
    }

    #[test]
    fn latch_is_one_way() {
        let latch = CheckoutLatch::new();
        assert_eq!(latch.state(), SessionState::Active);
        assert!(latch.close());
        assert!(!latch.close());
        assert_eq!(latch.clone().state(), SessionState::Closed);
    }

    #[test]
    fn unavailable_detection_leaves_history_untouched() {
        let mut detector = ScriptedDetector::new();
        detector.push_frame(vec![coke()]);
        detector.push_unavailable(DetectionUnavailable::Transport("refused".into()));
        let mut s = session(detector);
        let viewport = Viewport::new(640, 480);

        assert!(matches!(s.run_cycle(&frame(1), &viewport), CycleOutcome::Applied(_)));
        assert!(matches!(s.run_cycle(&frame(2), &viewport), CycleOutcome::Skipped(_)));
        assert_eq!(s.stabilizer().history().len(), 1);
        assert_eq!(s.stats().skipped, 1);
        assert_eq!(s.state(), SessionState::Active);
    }

    #[test]
    fn closed_session_does_not_call_detector() {
        let mut s = session(ScriptedDetector::from_frames([vec![coke()]]));
        s.latch().close();
        assert_eq!(
            s.run_cycle(&frame(1), &Viewport::new(640, 480)),
            CycleOutcome::Halted
        );
        assert_eq!(s.detector().calls(), 0);
    }

    #[test]
    fn in_flight_result_is_dropped_after_checkout() {
        let latch = CheckoutLatch::new();
        let remote = latch.clone();
        let detector = ScriptedDetector::from_frames(vec![vec![coke()]; 5]).with_hook(move |call| {
            if call == 4 {
                remote.close();
            }
        });
        let mut s = session(detector);
        s.latch = latch;
        let viewport = Viewport::new(640, 480);

        for seq in 1..=3 {
            assert!(matches!(
                s.run_cycle(&frame(seq), &viewport),
                CycleOutcome::Applied(_)
            ));
        }
        assert_eq!(s.run_cycle(&frame(4), &viewport), CycleOutcome::Discarded);
        assert_eq!(s.stabilizer().history().len(), 3);
        assert_eq!(s.cart().get("Coke"), Some(1));
        assert_eq!(s.state(), SessionState::Closed);
    }

    #[test]
    fn checkout_refuses_empty_cart() {
        let mut s = session(ScriptedDetector::new());
        let err = s.checkout(&PriceTable::default()).unwrap_err();
        assert!(err.to_string().contains("no items"));
        assert_eq!(s.state(), SessionState::Active);
    }

    #[test]
    fn checkout_closes_and_prices_cart() {
        let mut s = session(ScriptedDetector::from_frames(vec![vec![coke()]; 3]));
        let viewport = Viewport::new(640, 480);
        for seq in 1..=3 {
            s.run_cycle(&frame(seq), &viewport);
        }
        let receipt = s.checkout(&PriceTable::default()).unwrap();
        assert_eq!(receipt.total, 100);
        assert_eq!(s.state(), SessionState::Closed);
        assert!(s.checkout(&PriceTable::default()).is_err());
    }

    #[test]
    fn poll_stops_when_source_ends() {
        let mut s = session(ScriptedDetector::from_frames(vec![vec![coke()]; 4]));
        let mut remaining = 4u64;
        let mut applied = 0;
        let state = s.poll(
            || {
                if remaining == 0 {
                    return Ok(None);
                }
                remaining -= 1;
                Ok(Some(frame(4 - remaining)))
            },
            &Viewport::new(640, 480),
            Duration::ZERO,
            |outcome| {
                if matches!(outcome, CycleOutcome::Applied(_)) {
                    applied += 1;
                }
                ControlFlow::Continue(())
            },
        );
        assert_eq!(state, SessionState::Active);
        assert_eq!(applied, 4);
        assert_eq!(s.stats().cycles, 4);
        assert_eq!(s.cart().get("Coke"), Some(1));
    }

    #[test]
    fn poll_stops_once_latch_closes() {
        let mut s = session(ScriptedDetector::new());
        let latch = s.latch();
        let mut seq = 0;
        let mut failures = 0;
        let mut seen = 0;
        let state = s.poll(
            || {
                seq += 1;
                if seq == 2 {
                    failures += 1;
                    return Err(anyhow!("camera hiccup"));
                }
                Ok(Some(frame(seq)))
            },
            &Viewport::new(640, 480),
            Duration::ZERO,
            |_| {
                seen += 1;
                if seen == 4 {
                    latch.close();
                }
                ControlFlow::Continue(())
            },
        );
        assert_eq!(state, SessionState::Closed);
        assert_eq!(failures, 1);
        assert_eq!(s.stats().frame_errors, 1);
        assert_eq!(s.stats().cycles, 4);
    }
}
