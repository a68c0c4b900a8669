use scrambler_engine::{DropPolicy, ImpairmentConfig, Outbound, OutboundError};
use scrambler_relay::{Relay, RelayError, RelayOptions};

use bytes::Bytes;

#[derive(Debug)]
struct Sink;

impl Outbound for Sink {
    fn send(&self, _key: &str, _payload: Bytes) -> Result<(), OutboundError> {
        Ok(())
    }
}

const FULL_CONFIG: &str = r#"{
    "lossProbability": 0.25,
    "burstLossSecs": 2,
    "burstLossEverySecs": 10,
    "jitterMs": 50,
    "fixedLatencyMs": 100,
    "reorderProbability": 0.1,
    "bandwidthBytesPerSec": 4096,
    "maxQueueSize": 500,
    "dropPolicy": "COALESCE_BY_ID",
    "corruptProbability": 0.05,
    "maxCorruptionMeters": 25.0
}"#;

#[test]
fn put_replaces_the_whole_config() {
    let control = Relay::new(Sink, RelayOptions::default()).control();

    control.put_config_json(FULL_CONFIG.as_bytes()).unwrap();

    let config = control.get_config();
    assert_eq!(config.loss_probability, 0.25);
    assert_eq!(config.max_queue_size, 500);
    assert_eq!(config.drop_policy, DropPolicy::CoalesceById);

    let reset = control.delete_config();
    assert_eq!(*reset, ImpairmentConfig::default());
    assert_eq!(*control.get_config(), ImpairmentConfig::default());
}

#[test]
fn partial_and_invalid_configs_are_rejected() {
    let control = Relay::new(Sink, RelayOptions::default()).control();

    let partial = control.put_config_json(br#"{ "lossProbability": 0.5 }"#);
    assert!(matches!(partial, Err(RelayError::Json(_))));

    let invalid = FULL_CONFIG.replace("0.25", "1.5");
    assert!(matches!(control.put_config_json(invalid.as_bytes()), Err(RelayError::Config(_))));

    assert_eq!(*control.get_config(), ImpairmentConfig::default());
}

#[test]
fn metrics_serialize_with_camel_case_fields() {
    let control = Relay::new(Sink, RelayOptions::default()).control();

    let body = control.get_metrics_json().unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

    for field in [
        "dropped",
        "reordered",
        "queued",
        "bytesPerSec",
        "avgLatencyUs",
        "p95LatencyUs",
        "corrupted",
    ] {
        assert_eq!(json[field], 0, "{field}");
    }
}
