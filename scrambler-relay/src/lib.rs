#![doc(issue_tracker_base_url = "https://github.com/badnetwork/scrambler/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

use thiserror::Error;

mod control;
pub use control::Control;

pub mod io;

mod outbound;
pub use outbound::{channel, ChannelOutbound};

mod relay;
pub use relay::{Relay, RelayHandle};

use scrambler_engine::{ConfigError, EngineOptions};

/// The default number of outbound records buffered between the engine and the transport.
const DEFAULT_CHANNEL_BUFFER: usize = 1024;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Wire protocol error: {0}")]
    Wire(#[from] scrambler_wire::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Rejected config: {0}")]
    Config(#[from] ConfigError),
}

#[derive(Debug, Clone)]
pub struct RelayOptions {
    /// Name of the inbound channel. Only used for logging.
    source_topic: String,
    /// Name of the outbound channel. Only used for logging.
    destination_topic: String,
    /// Outbound records buffered before sends start failing with `Full`.
    channel_buffer: usize,
    /// Options for the underlying engine.
    engine: EngineOptions,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            source_topic: "traffic-delta".to_string(),
            destination_topic: "traffic-chaos".to_string(),
            channel_buffer: DEFAULT_CHANNEL_BUFFER,
            engine: EngineOptions::default(),
        }
    }
}

impl RelayOptions {
    pub fn source_topic(mut self, topic: impl Into<String>) -> Self {
        self.source_topic = topic.into();
        self
    }

    pub fn destination_topic(mut self, topic: impl Into<String>) -> Self {
        self.destination_topic = topic.into();
        self
    }

    /// Sets the outbound channel buffer size used by [`Relay::framed`].
    pub fn channel_buffer(mut self, channel_buffer: usize) -> Self {
        self.channel_buffer = channel_buffer.max(1);
        self
    }

    pub fn engine(mut self, engine: EngineOptions) -> Self {
        self.engine = engine;
        self
    }
}
