#![doc(issue_tracker_base_url = "https://github.com/badnetwork/scrambler/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! The impairment engine.
//!
//! Inbound delta events are classified by the decision engine (drop, corrupt, delay, reorder
//! or immediate), held in the delay queue or the reorder buffer, and forwarded to an
//! [`Outbound`] by the delivery driver, subject to the bandwidth budget and the queue drop
//! policy. All parameters live in an [`ImpairmentConfig`] snapshot that can be replaced at any
//! time.

use std::time::Duration;

use thiserror::Error;

mod bandwidth;
pub use bandwidth::BandwidthLimiter;

mod config;
pub use config::{ConfigStore, DropPolicy, ImpairmentConfig, DEFAULT_MAX_QUEUE_SIZE};

mod decision;
pub use decision::{Action, Verdict};

mod driver;
pub use driver::EngineHandle;

mod engine;
pub use engine::Engine;

mod metrics;
pub use metrics::{nearest_rank, Metrics, MetricsSnapshot, DEFAULT_LATENCY_SAMPLES};

mod outbound;
pub use outbound::{Outbound, OutboundError};

mod queue;
pub use queue::{DelayQueue, QueuedMessage, ReorderBuffer};

mod rng;
pub use rng::SharedRng;

mod scheduler;

#[cfg(test)]
mod test_util;

/// The default delivery tick interval.
const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(10);
/// The default bandwidth accounting window.
const DEFAULT_BANDWIDTH_WINDOW: Duration = Duration::from_secs(1);
/// The default delay before a throttled message is retried.
const DEFAULT_THROTTLE_RETRY: Duration = Duration::from_millis(100);

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be a probability in [0, 1], got {value}")]
    Probability { field: &'static str, value: f64 },
    #[error("maxCorruptionMeters must be finite and non-negative, got {0}")]
    CorruptionRadius(f64),
    #[error("maxQueueSize must be at least 1")]
    ZeroQueueSize,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Malformed delta event: {0}")]
    Malformed(#[from] scrambler_wire::Error),
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// The interval at which the delivery driver drains the reorder buffer and the delay queue.
    tick_interval: Duration,
    /// The length of one bandwidth accounting window.
    bandwidth_window: Duration,
    /// How long a throttled message waits before it is retried.
    throttle_retry: Duration,
    /// How many recent latencies are kept for the average and 95th percentile.
    latency_samples: usize,
    /// Seed for the random source. `None` seeds from OS entropy.
    seed: Option<u64>,
    /// The config installed at startup.
    initial_config: ImpairmentConfig,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            bandwidth_window: DEFAULT_BANDWIDTH_WINDOW,
            throttle_retry: DEFAULT_THROTTLE_RETRY,
            latency_samples: DEFAULT_LATENCY_SAMPLES,
            seed: None,
            initial_config: ImpairmentConfig::default(),
        }
    }
}

impl EngineOptions {
    /// Sets the delivery tick interval. Clamped to at least 1ms.
    pub fn tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval.max(Duration::from_millis(1));
        self
    }

    /// Sets the bandwidth accounting window. Clamped to at least 1ms.
    pub fn bandwidth_window(mut self, bandwidth_window: Duration) -> Self {
        self.bandwidth_window = bandwidth_window.max(Duration::from_millis(1));
        self
    }

    /// Sets the retry delay for throttled messages. Clamped to at least 1ms so a throttled
    /// message is never due again within the same tick.
    pub fn throttle_retry(mut self, throttle_retry: Duration) -> Self {
        self.throttle_retry = throttle_retry.max(Duration::from_millis(1));
        self
    }

    /// Sets the size of the rolling latency sample.
    pub fn latency_samples(mut self, latency_samples: usize) -> Self {
        self.latency_samples = latency_samples;
        self
    }

    /// Seeds the random source, making every decision reproducible.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Sets the config installed at startup. An invalid config is replaced by the defaults
    /// when the engine is built.
    pub fn initial_config(mut self, config: ImpairmentConfig) -> Self {
        self.initial_config = config;
        self
    }
}
