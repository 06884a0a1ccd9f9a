// =============================================================================
// Matrixon Matrix NextServer - Sliding Sync Room Snapshot
// =============================================================================
//
// Project: Matrixon - Ultra High Performance Matrix NextServer (Synapse Alternative)
// Author: arkSong (arksong2018@gmail.com) - Founder of Matrixon Innovation Project
// Date: 2024-12-11
// Version: 0.11.0-alpha
// License: Apache 2.0 / MIT
//
// =============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::response::null_as_default;

/// Room data as sent inside list operations and the top level `rooms` map.
///
/// Events are kept as raw JSON; this layer never inspects them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Room {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub room_id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub required_state: Vec<Value>,

    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub timeline: Vec<Value>,

    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub invite_state: Vec<Value>,

    #[serde(default)]
    pub notification_count: i64,

    #[serde(default)]
    pub highlight_count: i64,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub initial: bool,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_dm: bool,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub prev_batch: String,
}

impl Room {
    /// Snapshot carrying only an ID, mostly useful when building ops by hand.
    pub fn with_id(room_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_log::test;

    #[test]
    fn test_empty_fields_are_omitted() {
        let room = Room::with_id("!a:localhost");
        let value = serde_json::to_value(&room).unwrap();
        assert_eq!(
            value,
            json!({"room_id": "!a:localhost", "notification_count": 0, "highlight_count": 0})
        );
    }

    #[test]
    fn test_decode_partial_room() {
        let room: Room = serde_json::from_value(json!({
            "room_id": "!b:localhost",
            "name": "Lobby",
            "timeline": [{"type": "m.room.message", "event_id": "$1"}],
            "initial": true,
        }))
        .unwrap();
        assert_eq!(room.name, "Lobby");
        assert_eq!(room.timeline.len(), 1);
        assert!(room.initial);
        assert!(!room.is_dm);
    }
}
