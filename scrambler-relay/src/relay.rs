use tokio::{
    io::AsyncWrite,
    task::{JoinError, JoinHandle},
};
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info, trace, warn};

use crate::{channel, io::spawn_framed_writer, Control, RelayError, RelayOptions};
use scrambler_engine::{Engine, EngineHandle, Outbound};
use scrambler_wire::{DeltaEvent, Record};

/// Consumes a source of keyed records, runs every record through the impairment engine and
/// publishes the survivors to an [`Outbound`].
#[derive(Debug)]
pub struct Relay {
    engine: Engine,
    options: RelayOptions,
}

impl Relay {
    pub fn new<O: Outbound>(outbound: O, options: RelayOptions) -> Self {
        let engine = Engine::with_options(outbound, options.engine.clone());
        Self { engine, options }
    }

    /// Creates a relay that writes keyed frames to `writer`, together with the writer task.
    ///
    /// The writer task completes once the engine and every [`Control`] handle have been
    /// dropped.
    pub fn framed<W>(writer: W, options: RelayOptions) -> (Self, JoinHandle<Result<(), RelayError>>)
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (outbound, rx) = channel(options.channel_buffer);
        let writer = spawn_framed_writer(writer, rx);
        (Self::new(outbound, options), writer)
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn control(&self) -> Control {
        Control::new(self.engine.clone())
    }

    /// Starts the engine drivers and the ingest loop over `source`.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn spawn<S>(self, source: S) -> RelayHandle
    where
        S: Stream<Item = Record> + Send + Unpin + 'static,
    {
        let engine = self.engine.start();
        let control = Control::new(self.engine.clone());

        info!(
            source = %self.options.source_topic,
            destination = %self.options.destination_topic,
            "Relay started"
        );

        let ingest = tokio::spawn(ingest(self.engine, source, self.options));

        RelayHandle { control, engine, ingest: Some(ingest) }
    }
}

/// Feeds every record from `source` to the engine. Malformed payloads are logged and skipped.
///
/// Outbound records are keyed by the event's entity ID. A non-empty inbound key that names a
/// different entity is logged, since the record leaves under a different key than it arrived.
async fn ingest<S>(engine: Engine, mut source: S, options: RelayOptions)
where
    S: Stream<Item = Record> + Unpin,
{
    while let Some(record) = source.next().await {
        let (key, payload) = record.into_parts();

        let event = match DeltaEvent::from_json(&payload) {
            Ok(event) => event,
            Err(e) => {
                warn!(
                    err = %e,
                    key = %String::from_utf8_lossy(&key),
                    topic = %options.source_topic,
                    "Skipping malformed event"
                );
                continue;
            }
        };

        if !key.is_empty() && key != event.id.as_bytes() {
            warn!(
                key = %String::from_utf8_lossy(&key),
                entity = %event.id,
                topic = %options.source_topic,
                "Record key differs from entity ID, forwarding under the entity ID"
            );
        }

        let verdict = engine.process(event, payload);
        trace!(key = %String::from_utf8_lossy(&key), ?verdict, "Processed event");
    }

    debug!(topic = %options.source_topic, "Source closed");
}

/// A running relay.
#[derive(Debug)]
pub struct RelayHandle {
    control: Control,
    engine: EngineHandle,
    ingest: Option<JoinHandle<()>>,
}

impl RelayHandle {
    pub fn control(&self) -> &Control {
        &self.control
    }

    pub fn engine(&self) -> &Engine {
        self.engine.engine()
    }

    /// Waits until the source is exhausted. The engine keeps delivering pending messages
    /// until [`RelayHandle::shutdown`] is called.
    pub async fn source_closed(&mut self) -> Result<(), JoinError> {
        match self.ingest.take() {
            Some(ingest) => ingest.await,
            None => Ok(()),
        }
    }

    /// Stops ingesting, stops the engine and discards everything still pending. Returns how
    /// many messages were discarded.
    pub async fn shutdown(mut self) -> usize {
        if let Some(ingest) = self.ingest.take() {
            ingest.abort();
            let _ = ingest.await;
        }

        self.engine.shutdown().await
    }
}
