use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::{
    BandwidthLimiter, DelayQueue, DropPolicy, ImpairmentConfig, Metrics, Outbound, QueuedMessage,
    ReorderBuffer, SharedRng,
};

/// Owns the delay queue, the reorder buffer and the bandwidth window, and performs the actual
/// sends.
pub(crate) struct Scheduler {
    pub(crate) queue: DelayQueue,
    pub(crate) reorder: ReorderBuffer,
    pub(crate) limiter: BandwidthLimiter,
    outbound: Arc<dyn Outbound>,
    rng: Arc<SharedRng>,
    /// How far throttled messages are pushed back.
    throttle_retry: Duration,
    /// Held for the duration of a tick. Structural changes to the queue (drains, coalescing)
    /// happen only while holding it.
    tick_lock: Mutex<()>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("queue", &self.queue.len())
            .field("reorder", &self.reorder.len())
            .field("limiter", &self.limiter)
            .field("throttle_retry", &self.throttle_retry)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    pub(crate) fn new(
        outbound: Arc<dyn Outbound>,
        rng: Arc<SharedRng>,
        throttle_retry: Duration,
    ) -> Self {
        Self {
            queue: DelayQueue::new(),
            reorder: ReorderBuffer::new(),
            limiter: BandwidthLimiter::new(),
            outbound,
            rng,
            throttle_retry,
            tick_lock: Mutex::new(()),
        }
    }

    /// Admits a message into the delay queue, evicting per the drop policy if the queue is over
    /// capacity afterwards.
    pub(crate) fn admit(&self, msg: QueuedMessage, config: &ImpairmentConfig, metrics: &Metrics) {
        let evicted = self.queue.push_bounded(msg, config.max_queue_size, config.drop_policy);
        if evicted > 0 {
            metrics.add_dropped(evicted);
            debug!(evicted, policy = %config.drop_policy, "Delay queue full on admission");
        }
    }

    #[inline]
    pub(crate) fn buffer_reorder(&self, msg: QueuedMessage) {
        self.reorder.push(msg);
    }

    /// Runs one delivery pass:
    ///
    /// 1. Drains the reorder buffer, shuffles it, and admits the result into the delay queue.
    ///    Scheduled send times are left as they are.
    /// 2. Pops due messages from the head of the delay queue, applying the drain-time drop
    ///    policy while the queue is over capacity and sending otherwise.
    ///
    /// Returns `false` without doing anything if another tick is already running.
    pub(crate) fn tick(&self, config: &ImpairmentConfig, metrics: &Metrics, now: Instant) -> bool {
        let Some(_guard) = self.tick_lock.try_lock() else {
            trace!("Delivery tick already in progress, skipping");
            return false;
        };

        let mut reordered = self.reorder.drain();
        if !reordered.is_empty() {
            self.rng.shuffle(&mut reordered);
            trace!(n = reordered.len(), "Shuffled reorder buffer into delay queue");
            for msg in reordered {
                self.admit(msg, config, metrics);
            }
        }

        while let Some((msg, remaining)) = self.queue.pop_due(now) {
            if remaining > config.max_queue_size {
                self.apply_drop_policy(msg, config, metrics, now);
            } else {
                self.try_send(msg, config, metrics, now);
            }
        }

        true
    }

    /// Drain-time eviction for a message that was just popped while the queue is over capacity.
    fn apply_drop_policy(
        &self,
        msg: QueuedMessage,
        config: &ImpairmentConfig,
        metrics: &Metrics,
        now: Instant,
    ) {
        match config.drop_policy {
            DropPolicy::DropOldest => {
                metrics.increment_dropped();
                debug!(entity = %msg.entity_id, "Dropped oldest message (queue full)");
            }
            // The message being drained is forwarded; only new admissions are shed.
            DropPolicy::DropNewest => self.try_send(msg, config, metrics, now),
            DropPolicy::CoalesceById => {
                let removed = self.queue.coalesce_by_id();
                debug!(entity = %msg.entity_id, removed, "Coalesced delay queue (queue full)");
            }
        }
    }

    /// Sends a message if the bandwidth window allows it. Otherwise the message is admitted back
    /// into the delay queue, due again after the throttle retry delay. The re-admission goes
    /// through the drop policy like any other, so throttled immediate sends cannot grow the
    /// queue past its capacity.
    pub(crate) fn try_send(
        &self,
        msg: QueuedMessage,
        config: &ImpairmentConfig,
        metrics: &Metrics,
        now: Instant,
    ) {
        if config.has_bandwidth_limit()
            && !self.limiter.try_reserve(msg.size() as u64, config.bandwidth_bytes_per_sec)
        {
            trace!(
                entity = %msg.entity_id,
                size = msg.size(),
                "Bandwidth budget exceeded, deferring"
            );
            self.admit(msg.rescheduled(now + self.throttle_retry), config, metrics);
            return;
        }

        let latency = now.saturating_duration_since(msg.received_at);
        let QueuedMessage { entity_id, payload, .. } = msg;

        match self.outbound.send(&entity_id, payload) {
            Ok(()) => {
                metrics.record_latency(latency);
                trace!(entity = %entity_id, ?latency, "Sent message");
            }
            Err(e) => {
                warn!(err = %e, entity = %entity_id, "Failed to send message");
            }
        }
    }

    /// Starts a new bandwidth window.
    #[inline]
    pub(crate) fn reset_window(&self) {
        self.limiter.reset();
    }

    /// Drops everything still pending in both queues. Returns how many messages were discarded.
    pub(crate) fn discard_pending(&self) -> usize {
        let _guard = self.tick_lock.lock();
        self.reorder.drain().len() + self.queue.clear()
    }
}
