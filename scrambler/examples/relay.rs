use std::time::Duration;

use futures::SinkExt;
use rand::Rng;
use tokio_stream::StreamExt;
use tokio_util::codec::FramedWrite;
use tracing::Instrument;

use scrambler::{
    io::framed_source, keyed::Codec, DeltaEvent, DropPolicy, EngineOptions, ImpairmentConfig,
    Record, Relay, RelayOptions,
};

const VEHICLES: usize = 50;
const ROUNDS: usize = 40;

#[tokio::main]
async fn main() {
    let _ = tracing_subscriber::fmt::try_init();

    let (producer, source) = tokio::io::duplex(64 * 1024);
    let (destination, consumer) = tokio::io::duplex(64 * 1024);

    let config = ImpairmentConfig {
        loss_probability: 0.05,
        jitter_ms: 40,
        fixed_latency_ms: 20,
        reorder_probability: 0.1,
        bandwidth_bytes_per_sec: 64 * 1024,
        max_queue_size: 500,
        drop_policy: DropPolicy::CoalesceById,
        corrupt_probability: 0.02,
        max_corruption_meters: 30.0,
        ..Default::default()
    };

    let options = RelayOptions::default().engine(EngineOptions::default().initial_config(config));
    let (relay, _writer) = Relay::framed(destination, options);
    let mut handle = relay.spawn(framed_source(source));

    // Fake upstream producing one delta per vehicle every 25ms.
    tokio::spawn(
        async move {
            let mut framed = FramedWrite::new(producer, Codec::new());
            for round in 0..ROUNDS {
                for vehicle in 0..VEHICLES {
                    let (delta_lat, delta_long) = {
                        let mut rng = rand::thread_rng();
                        (rng.gen_range(-0.001..0.001), rng.gen_range(-0.001..0.001))
                    };

                    let id = format!("veh-{vehicle}");
                    let event = DeltaEvent::new(id.clone(), delta_lat, delta_long, round as i64)
                        .with_new_entity(round == 0);
                    framed.send(Record::new(id, event.to_json().unwrap())).await.unwrap();
                }
                tokio::time::sleep(Duration::from_millis(25)).await;
            }
            tracing::info!("Producer finished");
        }
        .instrument(tracing::info_span!("producer")),
    );

    let consumer = tokio::spawn(
        async move {
            let mut received = 0usize;
            let mut records = framed_source(consumer);
            while let Ok(Some(record)) =
                tokio::time::timeout(Duration::from_secs(2), records.next()).await
            {
                received += 1;
                tracing::debug!(key = %record.key_lossy(), "Received");
            }
            received
        }
        .instrument(tracing::info_span!("consumer")),
    );

    handle.source_closed().await.unwrap();
    let received = consumer.await.unwrap();

    let metrics = handle.control().get_metrics();
    tracing::info!(sent = VEHICLES * ROUNDS, received, ?metrics, "Done");

    handle.shutdown().await;
}
