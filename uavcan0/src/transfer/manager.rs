//! Buffers in-flight transfers keyed by `transfer_key`, per §4.6.
//!
//! Ordering enforcement is deliberately *not* done here: frames are simply
//! appended in arrival order, and the `frame_index == i` check happens once,
//! in `Transfer::from_frames`, when the terminating frame shows up. A
//! dropped middle frame therefore surfaces as a malformed-transfer error at
//! that point rather than being caught early.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use embedded_time::fixed_point::FixedPoint;

use crate::time::Timestamp;
use crate::transport::can::{Frame, TransferKey};

pub struct TransferManager<C: embedded_time::Clock> {
    active: BTreeMap<TransferKey, (Vec<Frame<C>>, Timestamp<C>)>,
}

impl<C: embedded_time::Clock> Default for TransferManager<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: embedded_time::Clock> TransferManager<C> {
    pub fn new() -> Self {
        Self {
            active: BTreeMap::new(),
        }
    }

    /// Appends `frame` to the buffer for its key, timestamping the entry.
    /// Returns the accumulated frame list once `frame.last_frame()` is true,
    /// removing the entry; otherwise returns `None`.
    pub fn receive_frame(&mut self, frame: Frame<C>) -> Option<Vec<Frame<C>>> {
        let key = frame.transfer_key();
        let last = frame.last_frame();
        let timestamp = frame.timestamp;

        let entry = self
            .active
            .entry(key)
            .or_insert_with(|| (Vec::new(), timestamp));
        entry.1 = timestamp;
        entry.0.push(frame);

        if last {
            self.active.remove(&key).map(|(frames, _)| frames)
        } else {
            None
        }
    }

    /// Drops entries whose last-seen frame is older than `timeout`. The
    /// caller is expected to invoke this periodically (default timeout 1s).
    pub fn remove_inactive_transfers<D>(&mut self, now: Timestamp<C>, timeout: D)
    where
        D: embedded_time::duration::Duration + FixedPoint + Copy,
        <C as embedded_time::Clock>::T: From<<D as FixedPoint>::T>,
    {
        self.active
            .retain(|_, (_, then)| !timestamp_expired(timeout, now, Some(*then)));
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

/// True if `then` is `Some` and more than `timeout` has elapsed since it,
/// relative to `now`.
pub fn timestamp_expired<C: embedded_time::Clock, D>(
    timeout: D,
    now: Timestamp<C>,
    then: Option<Timestamp<C>>,
) -> bool
where
    D: embedded_time::duration::Duration + FixedPoint,
    <C as embedded_time::Clock>::T: From<<D as FixedPoint>::T>,
{
    if let Some(then) = then {
        if now - then > timeout.to_generic(C::SCALING_FACTOR).unwrap() {
            return true;
        }
    }

    false
}
