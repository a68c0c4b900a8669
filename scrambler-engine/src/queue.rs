//! The delay queue and the reorder buffer.
//!
//! Both hold [`QueuedMessage`]s exclusively: a message lives in exactly one of them until it is
//! sent or evicted. Producers only append, so the decision path can keep inserting while the
//! delivery driver drains.

use std::{collections::VecDeque, time::Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::DropPolicy;

/// A message waiting for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMessage {
    /// The entity ID, used as the outbound key.
    pub(crate) entity_id: String,
    /// The serialized event, possibly corrupted.
    pub(crate) payload: Bytes,
    /// When the message becomes due.
    pub(crate) send_at: Instant,
    /// When the message was classified. Used for latency accounting.
    pub(crate) received_at: Instant,
}

impl QueuedMessage {
    pub fn new(entity_id: String, payload: Bytes, send_at: Instant, received_at: Instant) -> Self {
        Self { entity_id, payload, send_at, received_at }
    }

    #[inline]
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    #[inline]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    #[inline]
    pub fn send_at(&self) -> Instant {
        self.send_at
    }

    #[inline]
    pub fn received_at(&self) -> Instant {
        self.received_at
    }

    /// The payload size in bytes, as accounted by the bandwidth limiter.
    #[inline]
    pub fn size(&self) -> usize {
        self.payload.len()
    }

    /// Returns the same message rescheduled to `send_at`.
    #[inline]
    pub(crate) fn rescheduled(mut self, send_at: Instant) -> Self {
        self.send_at = send_at;
        self
    }
}

/// Messages waiting for their scheduled send time, in insertion order.
///
/// The queue is scanned from the head and the scan stops at the first message that is not yet
/// due. Entries are appended with roughly increasing send times, but reordered and throttled
/// messages can introduce local disorder; such messages simply wait behind the head.
#[derive(Debug, Default)]
pub struct DelayQueue {
    inner: Mutex<VecDeque<QueuedMessage>>,
}

impl DelayQueue {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Appends a message without any capacity check.
    #[cfg(test)]
    pub(crate) fn push(&self, msg: QueuedMessage) {
        self.inner.lock().push_back(msg);
    }

    /// Appends a message, then applies `policy` if the queue holds more than `max` entries.
    /// Returns the number of messages evicted.
    ///
    /// - [`DropPolicy::DropOldest`] evicts the head.
    /// - [`DropPolicy::DropNewest`] evicts the entry that was just appended.
    /// - [`DropPolicy::CoalesceById`] collapses duplicates (not counted), then evicts from the
    ///   head while the queue is still over capacity.
    pub(crate) fn push_bounded(&self, msg: QueuedMessage, max: usize, policy: DropPolicy) -> u64 {
        let mut queue = self.inner.lock();
        queue.push_back(msg);

        if queue.len() <= max {
            return 0;
        }

        match policy {
            DropPolicy::DropOldest => {
                queue.pop_front();
                1
            }
            DropPolicy::DropNewest => {
                queue.pop_back();
                1
            }
            DropPolicy::CoalesceById => {
                coalesce(&mut queue);

                let mut evicted = 0;
                while queue.len() > max {
                    queue.pop_front();
                    evicted += 1;
                }
                evicted
            }
        }
    }

    /// Removes the head if it is due at `now`. Returns it together with the number of messages
    /// left behind it.
    pub(crate) fn pop_due(&self, now: Instant) -> Option<(QueuedMessage, usize)> {
        let mut queue = self.inner.lock();
        if queue.front()?.send_at > now {
            return None;
        }

        let msg = queue.pop_front()?;
        Some((msg, queue.len()))
    }

    /// Collapses the queue so that at most one message per entity remains. Returns the number
    /// of messages removed.
    pub(crate) fn coalesce_by_id(&self) -> usize {
        coalesce(&mut self.inner.lock())
    }

    /// Discards every pending message. Returns how many were discarded.
    pub(crate) fn clear(&self) -> usize {
        let mut queue = self.inner.lock();
        let n = queue.len();
        queue.clear();
        n
    }

    /// Returns the entity IDs currently queued, head first.
    pub fn entity_ids(&self) -> Vec<String> {
        self.inner.lock().iter().map(|msg| msg.entity_id.clone()).collect()
    }
}

/// Keeps the last message (in queue order) for every entity, preserving the relative order of
/// the survivors.
fn coalesce(queue: &mut VecDeque<QueuedMessage>) -> usize {
    let before = queue.len();

    let mut last: FxHashMap<&str, usize> = FxHashMap::default();
    for (idx, msg) in queue.iter().enumerate() {
        last.insert(msg.entity_id.as_str(), idx);
    }

    if last.len() == before {
        return 0;
    }

    let mut keep = vec![false; before];
    for idx in last.into_values() {
        keep[idx] = true;
    }

    let mut idx = 0;
    queue.retain(|_| {
        let kept = keep[idx];
        idx += 1;
        kept
    });

    before - queue.len()
}

/// Messages flagged for out-of-order delivery. Fully drained on every delivery tick.
#[derive(Debug, Default)]
pub struct ReorderBuffer {
    inner: Mutex<Vec<QueuedMessage>>,
}

impl ReorderBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    #[inline]
    pub(crate) fn push(&self, msg: QueuedMessage) {
        self.inner.lock().push(msg);
    }

    /// Takes every buffered message, in arrival order.
    #[inline]
    pub(crate) fn drain(&self) -> Vec<QueuedMessage> {
        std::mem::take(&mut *self.inner.lock())
    }
}
