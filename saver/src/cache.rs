use ir_saver_common::message::ImageMessage;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error};

use crate::frame::Frame;

/// Single-slot cache holding the most recently decoded frame.
///
/// Cloning the cache clones the handle, not the frame: every clone sees the
/// same slot. The lock is only held to swap or clone the `Arc`, so decoding
/// and disk I/O never happen while it is taken.
#[derive(Debug, Clone, Default)]
pub struct FrameCache {
    slot: Arc<Mutex<Option<Arc<Frame>>>>,
}

impl FrameCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `msg` and make it the cached frame.
    ///
    /// A message that fails to decode is logged and dropped; the previously
    /// cached frame stays in place. Returns whether the slot was replaced.
    pub fn update(&self, msg: &ImageMessage) -> bool {
        match Frame::decode_passthrough(msg) {
            Ok(frame) => {
                debug!(
                    width = frame.width,
                    height = frame.height,
                    encoding = frame.encoding,
                    stamp_ms = frame.stamp_ms,
                    "cached latest frame"
                );
                self.store(frame);
                true
            }
            Err(e) => {
                error!(error = %e, encoding = msg.encoding, "failed to process image");
                false
            }
        }
    }

    /// Replace the cached frame unconditionally.
    pub fn store(&self, frame: Frame) {
        let frame = Arc::new(frame);
        *self.lock() = Some(frame);
    }

    /// Snapshot of the cached frame, or `None` if nothing has been decoded yet.
    pub fn peek(&self) -> Option<Arc<Frame>> {
        self.lock().clone()
    }

    // A panic while holding the lock can only happen between two pointer
    // writes, so the slot is always consistent and poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, Option<Arc<Frame>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
