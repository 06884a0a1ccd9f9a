// =============================================================================
// Matrixon Matrix NextServer - Sliding Sync Cache Boundary
// =============================================================================
//
// Project: Matrixon - Ultra High Performance Matrix NextServer (Synapse Alternative)
// Author: arkSong (arksong2018@gmail.com) - Founder of Matrixon Innovation Project
// Date: 2024-12-11
// Version: 0.11.0-alpha
// License: Apache 2.0 / MIT
//
// Description:
//   Live update events drained from a connection buffer, and the read-mostly
//   global cache the extensions consult. Both are produced by the room list
//   engine; only their shape is defined here.
//
// =============================================================================

use std::fmt::Debug;

use ruma::{OwnedDeviceId, OwnedUserId};
use serde_json::Value;

use super::storage::Receipt;

/// An update drained from a connection's buffered event queue.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// The full set of users typing in a room
    Typing {
        room_id: String,
        user_ids: Vec<OwnedUserId>,
    },

    /// A new read receipt
    Receipt(Receipt),

    /// Global account data events for the syncing user
    AccountData { events: Vec<Value> },

    /// Room account data events for the syncing user
    RoomAccountData { room_id: String, events: Vec<Value> },

    /// Device keys or OTK counts changed for a user
    DeviceData { user_id: OwnedUserId },

    /// New to-device messages are waiting; carries no payload, the inbox
    /// must be re-read
    DeviceEvents {
        user_id: OwnedUserId,
        device_id: OwnedDeviceId,
    },

    /// A timeline event. No extension currently consumes these
    RoomEvent { room_id: String, event_id: String },
}

impl Update {
    /// Short label for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Update::Typing { .. } => "typing",
            Update::Receipt(_) => "receipt",
            Update::AccountData { .. } => "account_data",
            Update::RoomAccountData { .. } => "room_account_data",
            Update::DeviceData { .. } => "device_data",
            Update::DeviceEvents { .. } => "device_events",
            Update::RoomEvent { .. } => "room_event",
        }
    }
}

/// Shared room cache. Implementations must allow concurrent readers.
pub trait GlobalCache: Debug + Send + Sync {
    /// Users currently typing in `room_id`, or `None` if the room is unknown.
    fn typing_users(&self, room_id: &str) -> Option<Vec<OwnedUserId>>;
}
