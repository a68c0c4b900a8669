//! Keyed-frame transport adapters for relays that read and write byte streams.

use futures::SinkExt;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
    task::JoinHandle,
};
use tokio_stream::{Stream, StreamExt};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error};

use crate::RelayError;
use scrambler_wire::{keyed::Codec, Record};

/// Turns a byte stream of keyed frames into a stream of records. The stream ends at EOF or at
/// the first framing error, since a broken frame boundary cannot be recovered.
pub fn framed_source<R>(reader: R) -> impl Stream<Item = Record> + Send + Unpin
where
    R: AsyncRead + Send + Unpin,
{
    FramedRead::new(reader, Codec::new()).map_while(|result| match result {
        Ok(record) => Some(record),
        Err(e) => {
            error!(err = %e, "Source framing error, closing source");
            None
        }
    })
}

/// Spawns a task that writes every record received on `rx` to `writer` as a keyed frame.
/// The task completes once all senders are dropped and the writer has been flushed.
pub fn spawn_framed_writer<W>(
    writer: W,
    mut rx: mpsc::Receiver<Record>,
) -> JoinHandle<Result<(), RelayError>>
where
    W: AsyncWrite + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        let mut framed = FramedWrite::new(writer, Codec::new());

        while let Some(record) = rx.recv().await {
            framed.feed(record).await?;

            // Batch whatever is already queued into a single flush.
            while let Ok(record) = rx.try_recv() {
                framed.feed(record).await?;
            }

            framed.flush().await?;
        }

        debug!("Outbound channel closed, closing writer");
        framed.close().await?;

        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tokio::io::AsyncWriteExt;

    use super::*;

    #[tokio::test]
    async fn writer_output_reads_back_as_records() {
        let _ = tracing_subscriber::fmt::try_init();

        let (client, server) = tokio::io::duplex(1024);
        let (tx, rx) = mpsc::channel(8);
        let writer = spawn_framed_writer(client, rx);

        tx.send(Record::new("veh-1", Bytes::from("one"))).await.unwrap();
        tx.send(Record::new("veh-2", Bytes::from("two"))).await.unwrap();
        drop(tx);
        writer.await.unwrap().unwrap();

        let records: Vec<_> = framed_source(server).collect().await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].key_lossy(), "veh-1");
        assert_eq!(records[1].payload(), &Bytes::from("two"));
    }

    #[tokio::test]
    async fn source_ends_on_framing_error() {
        let _ = tracing_subscriber::fmt::try_init();

        let (mut client, server) = tokio::io::duplex(1024);
        client.write_all(&[0xff, 0, 0, 0, 0, 0, 0, 0]).await.unwrap();
        drop(client);

        let records: Vec<_> = framed_source(server).collect().await;
        assert!(records.is_empty());
    }
}
