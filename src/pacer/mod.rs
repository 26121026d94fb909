//! Hand-off between the legacy present cycle and compositor submission.
//!
//! The present role refreshes poses after each present and publishes the
//! result into a one-slot channel. The submission role blocks on that slot.
//! Each snapshot carries the staleness epoch it was published under, so a
//! snapshot that was superseded by a later "stale" mark is never consumed.

use crate::error::{BridgeError, Result};
use crate::pose::{FrameSnapshot, PoseProvider};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct Stamped {
    epoch: u64,
    snapshot: FrameSnapshot,
}

pub struct FramePacer {
    slot_tx: Sender<Stamped>,
    slot_rx: Receiver<Stamped>,
    /// True while poses need a refresh before they may be consumed.
    stale: AtomicBool,
    epoch: AtomicU64,
    /// Snapshot received by the submission role and not yet consumed.
    held: Mutex<Option<Stamped>>,
    timeout: Duration,
}

impl FramePacer {
    pub fn new(timeout: Duration) -> Self {
        let (slot_tx, slot_rx) = bounded(1);
        Self {
            slot_tx,
            slot_rx,
            stale: AtomicBool::new(true),
            epoch: AtomicU64::new(0),
            held: Mutex::new(None),
            timeout,
        }
    }

    pub fn poses_stale(&self) -> bool {
        self.stale.load(Ordering::SeqCst)
    }

    /// Present role, before the legacy present call.
    pub fn notify_pre_present(&self) {
        self.mark_stale();
    }

    /// Present role, after the legacy present completed. Refreshes poses if
    /// they are stale; returns whether fresh poses are available.
    pub fn notify_post_present(&self, poses: &PoseProvider) -> bool {
        if !self.poses_stale() {
            return true;
        }
        match poses.refresh() {
            Ok(snapshot) => {
                self.publish(snapshot);
                true
            }
            Err(e) => {
                log::error!("Pacer: pose refresh failed, poses stay stale: {e}");
                false
            }
        }
    }

    /// Blocks until fresh poses are available without consuming them.
    pub fn await_fresh_poses(&self) -> Result<FrameSnapshot> {
        self.wait(false)
    }

    /// Blocks until fresh poses are available, then marks them stale so the
    /// next consumer waits for another refresh.
    pub fn consume_fresh_poses(&self) -> Result<FrameSnapshot> {
        self.wait(true)
    }

    fn mark_stale(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.stale.store(true, Ordering::SeqCst);
        while self.slot_rx.try_recv().is_ok() {}
    }

    fn publish(&self, snapshot: FrameSnapshot) {
        let stamped = Stamped {
            epoch: self.epoch.load(Ordering::SeqCst),
            snapshot,
        };
        while self.slot_rx.try_recv().is_ok() {}
        self.stale.store(false, Ordering::SeqCst);
        if self.slot_tx.try_send(stamped).is_err() {
            log::warn!(
                "Pacer: slot still occupied, frame {} not published",
                snapshot.frame_index
            );
        }
    }

    fn wait(&self, consume: bool) -> Result<FrameSnapshot> {
        let deadline = Instant::now() + self.timeout;
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);

        let stamped = loop {
            let current = self.epoch.load(Ordering::SeqCst);
            if let Some(h) = held.filter(|h| h.epoch == current) {
                break h;
            }
            *held = None;

            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.slot_rx.recv_timeout(remaining) {
                Ok(s) if s.epoch == self.epoch.load(Ordering::SeqCst) => *held = Some(s),
                Ok(s) => log::debug!(
                    "Pacer: dropping frame {} published before poses went stale",
                    s.snapshot.frame_index
                ),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return Err(BridgeError::PoseTimeout(self.timeout));
                }
            }
        };

        if consume {
            *held = None;
            self.mark_stale();
        }
        Ok(stamped.snapshot)
    }
}
