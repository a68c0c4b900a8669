use bytes::Bytes;
use tokio::sync::mpsc::{self, error::TrySendError};

use scrambler_engine::{Outbound, OutboundError};
use scrambler_wire::Record;

/// An [`Outbound`] backed by a bounded Tokio channel. Sends never wait: a full channel is
/// reported as [`OutboundError::Full`].
#[derive(Debug, Clone)]
pub struct ChannelOutbound {
    tx: mpsc::Sender<Record>,
}

/// Creates a bounded outbound channel with room for `buffer` records.
pub fn channel(buffer: usize) -> (ChannelOutbound, mpsc::Receiver<Record>) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    (ChannelOutbound { tx }, rx)
}

impl Outbound for ChannelOutbound {
    fn send(&self, key: &str, payload: Bytes) -> Result<(), OutboundError> {
        self.tx.try_send(Record::new(key.to_owned(), payload)).map_err(|e| match e {
            TrySendError::Full(_) => OutboundError::Full,
            TrySendError::Closed(_) => OutboundError::Closed,
        })
    }
}
