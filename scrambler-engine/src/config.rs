//! The live impairment configuration and its store.

use std::{sync::Arc, time::Duration};

use arc_swap::ArcSwap;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::ConfigError;
use scrambler_common::constants::METERS_PER_DEGREE;

/// The default maximum depth of the delay queue.
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 10_000;

/// What to do with a message when the delay queue is over capacity.
#[derive(Debug, Display, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DropPolicy {
    /// Discard the oldest pending message.
    #[default]
    #[display(fmt = "drop-oldest")]
    DropOldest,
    /// Shed new admissions. A message that is already being drained is still forwarded.
    #[display(fmt = "drop-newest")]
    DropNewest,
    /// Collapse pending messages so that only the latest one per entity survives.
    #[display(fmt = "coalesce-by-id")]
    CoalesceById,
}

/// A complete, immutable set of impairment parameters.
///
/// Configs are never patched in place: the [`ConfigStore`] swaps whole snapshots, and every
/// decision runs against the single snapshot it loaded.
///
/// ```
/// use scrambler_engine::{DropPolicy, ImpairmentConfig};
///
/// // A congested cellular uplink
/// let cellular = ImpairmentConfig {
///     loss_probability: 0.02,
///     fixed_latency_ms: 80,
///     jitter_ms: 40,
///     bandwidth_bytes_per_sec: 64 * 1024,
///     drop_policy: DropPolicy::CoalesceById,
///     ..Default::default()
/// };
/// assert!(cellular.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpairmentConfig {
    // ---------------------------------------------------------------------------------
    // Loss
    // ---------------------------------------------------------------------------------
    /// Probability in [0, 1] that a message is dropped, drawn per message.
    pub loss_probability: f64,
    /// How long each loss burst lasts, in seconds. 0 disables burst loss.
    pub burst_loss_secs: u32,
    /// How often a loss burst starts, in seconds. 0 disables burst loss.
    pub burst_loss_every_secs: u32,

    // ---------------------------------------------------------------------------------
    // Delay and ordering
    // ---------------------------------------------------------------------------------
    /// Upper bound of the uniform jitter added on top of the fixed latency, in milliseconds.
    pub jitter_ms: u32,
    /// Constant latency added to every message, in milliseconds.
    pub fixed_latency_ms: u32,
    /// Probability in [0, 1] that a message goes through the reorder buffer.
    pub reorder_probability: f64,

    // ---------------------------------------------------------------------------------
    // Capacity
    // ---------------------------------------------------------------------------------
    /// Outbound byte budget per second. 0 means unlimited.
    pub bandwidth_bytes_per_sec: u64,
    /// Maximum number of messages pending in the delay queue.
    pub max_queue_size: usize,
    /// Eviction policy applied when the delay queue is over capacity.
    pub drop_policy: DropPolicy,

    // ---------------------------------------------------------------------------------
    // Corruption
    // ---------------------------------------------------------------------------------
    /// Probability in [0, 1] that a message's coordinate deltas are perturbed.
    pub corrupt_probability: f64,
    /// Maximum perturbation applied to each delta, in meters.
    pub max_corruption_meters: f64,
}

impl Default for ImpairmentConfig {
    fn default() -> Self {
        Self {
            loss_probability: 0.0,
            burst_loss_secs: 0,
            burst_loss_every_secs: 0,
            jitter_ms: 0,
            fixed_latency_ms: 0,
            reorder_probability: 0.0,
            bandwidth_bytes_per_sec: 0,
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            drop_policy: DropPolicy::DropOldest,
            corrupt_probability: 0.0,
            max_corruption_meters: 0.0,
        }
    }
}

impl ImpairmentConfig {
    /// Returns `true` if both the burst duration and period are non-zero.
    pub const fn burst_loss_enabled(&self) -> bool {
        self.burst_loss_secs > 0 && self.burst_loss_every_secs > 0
    }

    pub const fn burst_duration(&self) -> Duration {
        Duration::from_secs(self.burst_loss_secs as u64)
    }

    pub const fn burst_period(&self) -> Duration {
        Duration::from_secs(self.burst_loss_every_secs as u64)
    }

    pub const fn fixed_latency(&self) -> Duration {
        Duration::from_millis(self.fixed_latency_ms as u64)
    }

    /// Returns `true` if a bandwidth budget is configured.
    pub const fn has_bandwidth_limit(&self) -> bool {
        self.bandwidth_bytes_per_sec > 0
    }

    /// The corruption radius converted to degrees (1 degree ~= 111 km).
    ///
    /// The engine perturbs deltas rather than absolute coordinates, so no `cos(latitude)`
    /// scaling is applied to longitude.
    pub fn corruption_radius_degrees(&self) -> f64 {
        self.max_corruption_meters / METERS_PER_DEGREE
    }

    /// Checks that every field is within its domain.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("lossProbability", self.loss_probability),
            ("reorderProbability", self.reorder_probability),
            ("corruptProbability", self.corrupt_probability),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Probability { field, value });
            }
        }

        if !self.max_corruption_meters.is_finite() || self.max_corruption_meters < 0.0 {
            return Err(ConfigError::CorruptionRadius(self.max_corruption_meters));
        }

        if self.max_queue_size == 0 {
            return Err(ConfigError::ZeroQueueSize);
        }

        Ok(())
    }
}

/// Holds the current [`ImpairmentConfig`] snapshot.
///
/// Readers get an `Arc` to a complete snapshot; writers replace the whole snapshot atomically.
/// A reader racing a writer sees either the old or the new config, never a mix of both.
#[derive(Debug)]
pub struct ConfigStore {
    current: ArcSwap<ImpairmentConfig>,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(ImpairmentConfig::default())
    }
}

impl ConfigStore {
    pub fn new(initial: ImpairmentConfig) -> Self {
        Self { current: ArcSwap::from_pointee(initial) }
    }

    /// Returns the current snapshot.
    #[inline]
    pub fn get(&self) -> Arc<ImpairmentConfig> {
        self.current.load_full()
    }

    /// Validates and installs `config`, returning the applied snapshot.
    ///
    /// On error the current snapshot is left untouched.
    pub fn set(&self, config: ImpairmentConfig) -> Result<Arc<ImpairmentConfig>, ConfigError> {
        config.validate()?;

        let config = Arc::new(config);
        self.current.store(Arc::clone(&config));
        info!(?config, "Impairment configuration updated");

        Ok(config)
    }

    /// Restores the default config.
    pub fn reset(&self) -> Arc<ImpairmentConfig> {
        let config = Arc::new(ImpairmentConfig::default());
        self.current.store(Arc::clone(&config));
        info!("Impairment configuration reset to defaults");

        config
    }
}
