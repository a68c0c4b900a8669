use std::sync::Arc;

use bytes::Bytes;
use tracing::info;

use crate::RelayError;
use scrambler_engine::{ConfigError, Engine, ImpairmentConfig, MetricsSnapshot};

/// The control surface of a running relay, independent of any transport binding.
///
/// | Operation      | Method                   |
/// |----------------|--------------------------|
/// | GET config     | [`Control::get_config`]  |
/// | PUT config     | [`Control::put_config`]  |
/// | GET metrics    | [`Control::get_metrics`] |
/// | DELETE config  | [`Control::delete_config`] |
#[derive(Debug, Clone)]
pub struct Control {
    engine: Engine,
}

impl Control {
    pub(crate) fn new(engine: Engine) -> Self {
        Self { engine }
    }

    /// Returns the current config.
    pub fn get_config(&self) -> Arc<ImpairmentConfig> {
        self.engine.config()
    }

    /// Replaces the config wholesale and returns the applied config.
    pub fn put_config(
        &self,
        config: ImpairmentConfig,
    ) -> Result<Arc<ImpairmentConfig>, ConfigError> {
        info!(?config, "Received impairment config update");
        self.engine.set_config(config)
    }

    /// Returns the current metrics.
    pub fn get_metrics(&self) -> MetricsSnapshot {
        self.engine.metrics()
    }

    /// Resets the config to the defaults and returns them.
    pub fn delete_config(&self) -> Arc<ImpairmentConfig> {
        info!("Resetting impairment config to defaults");
        self.engine.reset_config()
    }

    /// PUT config from a JSON body. The body must contain every field.
    pub fn put_config_json(&self, body: &[u8]) -> Result<Bytes, RelayError> {
        let config: ImpairmentConfig = serde_json::from_slice(body)?;
        let applied = self.put_config(config)?;
        Ok(serde_json::to_vec(&*applied)?.into())
    }

    /// GET config as JSON.
    pub fn get_config_json(&self) -> Result<Bytes, RelayError> {
        Ok(serde_json::to_vec(&*self.get_config())?.into())
    }

    /// GET metrics as JSON.
    pub fn get_metrics_json(&self) -> Result<Bytes, RelayError> {
        Ok(serde_json::to_vec(&self.get_metrics())?.into())
    }
}
