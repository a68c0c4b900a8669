//! Per-message impairment decisions.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::{ImpairmentConfig, Metrics, QueuedMessage, SharedRng};
use scrambler_wire::DeltaEvent;

/// The routing outcome for one inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// The message was lost and must not be forwarded.
    Drop,
    /// No delay: forward right away, bypassing both queues.
    Immediate(QueuedMessage),
    /// Hold in the delay queue until the scheduled send time.
    Delay(QueuedMessage),
    /// Hold in the reorder buffer until the next delivery tick.
    Reorder(QueuedMessage),
}

impl Action {
    /// A payload-free summary of this action.
    pub const fn verdict(&self) -> Verdict {
        match self {
            Self::Drop => Verdict::Dropped,
            Self::Immediate(_) => Verdict::Immediate,
            Self::Delay(_) => Verdict::Delayed,
            Self::Reorder(_) => Verdict::Reordered,
        }
    }

    /// Returns the message carried by this action, if any.
    pub const fn message(&self) -> Option<&QueuedMessage> {
        match self {
            Self::Drop => None,
            Self::Immediate(msg) | Self::Delay(msg) | Self::Reorder(msg) => Some(msg),
        }
    }
}

/// See [`Action::verdict`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    Dropped,
    Immediate,
    Delayed,
    Reordered,
}

/// Burst loss bookkeeping.
#[derive(Debug, Default)]
struct BurstState {
    /// Start of the current (or last) burst. `None` until burst loss is first evaluated.
    last_start: Option<Instant>,
    in_burst: bool,
}

/// Classifies inbound events. Safe to call from many ingest workers at once: the only shared
/// mutable state is the random source, the counters and the burst window.
#[derive(Debug)]
pub(crate) struct Decider {
    rng: Arc<SharedRng>,
    burst: Mutex<BurstState>,
}

impl Decider {
    pub(crate) fn new(rng: Arc<SharedRng>) -> Self {
        Self { rng, burst: Mutex::new(BurstState::default()) }
    }

    pub(crate) fn decide(
        &self,
        config: &ImpairmentConfig,
        metrics: &Metrics,
        mut event: DeltaEvent,
        mut payload: Bytes,
        now: Instant,
    ) -> Action {
        if self.should_drop(config, now) {
            metrics.increment_dropped();
            debug!(entity = %event.id, "Dropped message");
            return Action::Drop;
        }

        if self.rng.chance(config.corrupt_probability) {
            self.corrupt(config, &mut event);
            metrics.increment_corrupted();

            match event.to_json() {
                Ok(corrupted) => payload = corrupted,
                Err(e) => {
                    warn!(
                        err = ?e,
                        entity = %event.id,
                        "Failed to serialize corrupted event, forwarding original"
                    );
                }
            }
        }

        let delay = self.delay(config);
        let msg = QueuedMessage::new(event.id, payload, now + delay, now);

        if self.rng.chance(config.reorder_probability) {
            metrics.increment_reordered();
            debug!(entity = %msg.entity_id, ?delay, "Buffering message for reordering");
            Action::Reorder(msg)
        } else if delay > Duration::ZERO {
            debug!(entity = %msg.entity_id, ?delay, "Delaying message");
            Action::Delay(msg)
        } else {
            Action::Immediate(msg)
        }
    }

    /// Burst loss first, then independent loss.
    fn should_drop(&self, config: &ImpairmentConfig, now: Instant) -> bool {
        if config.burst_loss_enabled() && self.in_burst(config, now) {
            return true;
        }

        self.rng.chance(config.loss_probability)
    }

    /// Advances the burst window and returns `true` if `now` falls inside an active burst.
    ///
    /// A new burst starts at the first decision made at least one period after the previous
    /// start, so bursts drift with traffic gaps instead of following a fixed grid.
    fn in_burst(&self, config: &ImpairmentConfig, now: Instant) -> bool {
        let duration = config.burst_duration();
        let period = config.burst_period();

        let mut state = self.burst.lock();
        let mut elapsed = state
            .last_start
            .map_or(period, |start| now.saturating_duration_since(start));

        if elapsed >= period {
            state.last_start = Some(now);
            state.in_burst = true;
            elapsed = Duration::ZERO;
        }

        if state.in_burst && elapsed < duration {
            return true;
        }

        if elapsed >= duration {
            state.in_burst = false;
        }

        false
    }

    /// Perturbs both deltas by an independent uniform draw in `[-R, R]` degrees.
    fn corrupt(&self, config: &ImpairmentConfig, event: &mut DeltaEvent) {
        let radius = config.corruption_radius_degrees();
        if radius > 0.0 {
            event.delta_lat += self.rng.symmetric(radius);
            event.delta_long += self.rng.symmetric(radius);
        }
    }

    /// `fixed latency + uniform[0, jitter)`, in whole milliseconds.
    fn delay(&self, config: &ImpairmentConfig) -> Duration {
        let jitter = self.rng.below(config.jitter_ms);
        config.fixed_latency() + Duration::from_millis(jitter as u64)
    }
}
