use std::time::Duration;

use bytes::Bytes;
use futures::SinkExt;
use tokio::io::DuplexStream;
use tokio_stream::StreamExt;
use tokio_util::codec::FramedWrite;

use scrambler_common::unix_millis;
use scrambler_engine::{EngineOptions, ImpairmentConfig};
use scrambler_relay::{io::framed_source, Relay, RelayHandle, RelayOptions};
use scrambler_wire::{keyed::Codec, DeltaEvent, Record};

fn event(id: &str) -> Record {
    let event = DeltaEvent::new(id, 0.0001, -0.0002, unix_millis() as i64);
    Record::new(id.to_owned(), event.to_json().unwrap())
}

/// Spawns a relay reading from the returned writer and publishing to the returned reader.
fn spawn_relay(
    config: ImpairmentConfig,
) -> (RelayHandle, FramedWrite<DuplexStream, Codec>, DuplexStream) {
    let (src_client, src_server) = tokio::io::duplex(64 * 1024);
    let (dst_client, dst_server) = tokio::io::duplex(64 * 1024);

    let options = RelayOptions::default()
        .source_topic("test-delta")
        .destination_topic("test-chaos")
        .engine(EngineOptions::default().seed(7).initial_config(config));

    let (relay, _writer) = Relay::framed(dst_client, options);
    let handle = relay.spawn(framed_source(src_server));

    (handle, FramedWrite::new(src_client, Codec::new()), dst_server)
}

#[tokio::test]
async fn pass_through_preserves_order_and_payloads() {
    let _ = tracing_subscriber::fmt::try_init();

    let (handle, mut source, destination) = spawn_relay(ImpairmentConfig::default());

    let sent: Vec<_> = (0..20).map(|i| event(&format!("veh-{i}"))).collect();
    for record in &sent {
        source.send(record.clone()).await.unwrap();
    }

    let received: Vec<_> = tokio::time::timeout(
        Duration::from_secs(5),
        framed_source(destination).take(sent.len()).collect::<Vec<_>>(),
    )
    .await
    .unwrap();

    assert_eq!(received, sent);

    let metrics = handle.control().get_metrics();
    assert_eq!(metrics.dropped, 0);
    assert_eq!(metrics.queued, 0);

    handle.shutdown().await;
}

#[tokio::test]
async fn full_loss_drops_and_counts_everything() {
    let _ = tracing_subscriber::fmt::try_init();

    let config = ImpairmentConfig { loss_probability: 1.0, ..Default::default() };
    let (mut handle, mut source, _destination) = spawn_relay(config);

    for i in 0..10 {
        source.send(event(&format!("veh-{i}"))).await.unwrap();
    }
    drop(source);

    handle.source_closed().await.unwrap();
    assert_eq!(handle.control().get_metrics().dropped, 10);
    assert_eq!(handle.shutdown().await, 0);
}

#[tokio::test]
async fn malformed_events_are_skipped() {
    let _ = tracing_subscriber::fmt::try_init();

    let (handle, mut source, destination) = spawn_relay(ImpairmentConfig::default());

    source.send(Record::new("veh-0", Bytes::from_static(b"not json"))).await.unwrap();
    source.send(event("veh-1")).await.unwrap();

    let received = tokio::time::timeout(Duration::from_secs(5), async {
        let mut destination = framed_source(destination);
        destination.next().await
    })
    .await
    .unwrap()
    .unwrap();

    assert_eq!(received.key_lossy(), "veh-1");

    let metrics = handle.control().get_metrics();
    assert_eq!(metrics.dropped, 0);
    assert_eq!(metrics.corrupted, 0);

    handle.shutdown().await;
}

#[tokio::test]
async fn delayed_events_are_discarded_on_shutdown() {
    let _ = tracing_subscriber::fmt::try_init();

    let config = ImpairmentConfig { fixed_latency_ms: 60_000, ..Default::default() };
    let (mut handle, mut source, _destination) = spawn_relay(config);

    for i in 0..5 {
        source.send(event(&format!("veh-{i}"))).await.unwrap();
    }
    drop(source);

    handle.source_closed().await.unwrap();
    assert_eq!(handle.control().get_metrics().queued, 5);
    assert_eq!(handle.shutdown().await, 5);
}

#[tokio::test]
async fn records_are_forwarded_under_their_entity_id() {
    let _ = tracing_subscriber::fmt::try_init();

    let (handle, mut source, destination) = spawn_relay(ImpairmentConfig::default());

    let (_, payload) = event("veh-9").into_parts();
    source.send(Record::new("partition-3", payload.clone())).await.unwrap();
    source.send(Record::new(Bytes::new(), event("veh-10").payload().clone())).await.unwrap();

    let received: Vec<_> = tokio::time::timeout(
        Duration::from_secs(5),
        framed_source(destination).take(2).collect::<Vec<_>>(),
    )
    .await
    .unwrap();

    assert_eq!(received[0].key_lossy(), "veh-9");
    assert_eq!(received[0].payload(), &payload);
    assert_eq!(received[1].key_lossy(), "veh-10");

    handle.shutdown().await;
}
