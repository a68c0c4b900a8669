use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::Error;

/// A position update for a single entity, expressed as offsets from its previous known position.
///
/// On the wire this is a JSON object:
///
/// ```json
/// {"id":"veh-1","deltaLat":0.0001,"deltaLong":-0.0002,"timestamp":1700000000000,"newEntity":false}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaEvent {
    /// The entity ID. Also used as the partitioning key on both channels.
    pub id: String,
    /// Latitude offset, in degrees.
    pub delta_lat: f64,
    /// Longitude offset, in degrees.
    pub delta_long: f64,
    /// Event timestamp in UNIX milliseconds.
    pub timestamp: i64,
    /// Set on the first sighting of an entity. The deltas are then absolute coordinates.
    #[serde(default)]
    pub new_entity: bool,
}

impl DeltaEvent {
    pub fn new(id: impl Into<String>, delta_lat: f64, delta_long: f64, timestamp: i64) -> Self {
        Self { id: id.into(), delta_lat, delta_long, timestamp, new_entity: false }
    }

    /// Marks this event as the first sighting of the entity.
    pub fn with_new_entity(mut self, new_entity: bool) -> Self {
        self.new_entity = new_entity;
        self
    }

    /// Decodes an event from its JSON representation.
    pub fn from_json(payload: &[u8]) -> Result<Self, Error> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// Encodes this event as JSON.
    pub fn to_json(&self) -> Result<Bytes, Error> {
        Ok(serde_json::to_vec(self)?.into())
    }
}
