use bytes::Bytes;
use parking_lot::Mutex;

use crate::{Outbound, OutboundError};
use scrambler_wire::DeltaEvent;

/// Builds an event together with its serialized payload.
pub(crate) fn event(id: &str, delta_lat: f64, delta_long: f64) -> (DeltaEvent, Bytes) {
    let event = DeltaEvent::new(id, delta_lat, delta_long, 1_700_000_000_000);
    let payload = event.to_json().unwrap();
    (event, payload)
}

/// Raw payload for an event.
pub(crate) fn payload(id: &str) -> Bytes {
    event(id, 0.0001, 0.0001).1
}

/// An outbound that records everything it is handed.
#[derive(Debug, Default)]
pub(crate) struct Collector {
    sent: Mutex<Vec<(String, Bytes)>>,
    closed: std::sync::atomic::AtomicBool,
}

impl Collector {
    pub(crate) fn keys(&self) -> Vec<String> {
        self.sent.lock().iter().map(|(key, _)| key.clone()).collect()
    }

    pub(crate) fn sent(&self) -> Vec<(String, Bytes)> {
        self.sent.lock().clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.sent.lock().len()
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, std::sync::atomic::Ordering::Relaxed);
    }
}

impl Outbound for Collector {
    fn send(&self, key: &str, payload: Bytes) -> Result<(), OutboundError> {
        if self.closed.load(std::sync::atomic::Ordering::Relaxed) {
            return Err(OutboundError::Closed);
        }
        self.sent.lock().push((key.to_string(), payload));
        Ok(())
    }
}
