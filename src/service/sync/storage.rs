// =============================================================================
// Matrixon Matrix NextServer - Sliding Sync Storage Boundary
// =============================================================================
//
// Project: Matrixon - Ultra High Performance Matrix NextServer (Synapse Alternative)
// Author: arkSong (arksong2018@gmail.com) - Founder of Matrixon Innovation Project
// Date: 2024-12-11
// Version: 0.11.0-alpha
// License: Apache 2.0 / MIT
//
// Description:
//   Durable storage and E2EE data sources the extensions read from. The
//   backing implementations live with the database layer.
//
// =============================================================================

use std::{collections::BTreeMap, fmt::Debug};

use async_trait::async_trait;
use ruma::{DeviceId, OwnedUserId, UserId};
use serde_json::Value;

use crate::Result;

/// A single read receipt for one user in one room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub room_id: String,
    pub event_id: String,
    pub user_id: OwnedUserId,
    /// e.g. `m.read`, `m.read.private`
    pub receipt_type: String,
    pub ts: u64,
    pub thread_id: Option<String>,
}

/// Encryption state for a device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceData {
    pub otk_counts: BTreeMap<String, i64>,
    pub fallback_key_types: Vec<String>,
    pub changed: Vec<String>,
    pub left: Vec<String>,
}

/// Durable storage used by extensions.
#[async_trait]
pub trait Storage: Debug + Send + Sync {
    /// To-device messages after position `from`, at most `limit` of them.
    /// Returns the messages and the position of the last one (or `from`).
    async fn to_device_messages(
        &self,
        user_id: &UserId,
        device_id: &DeviceId,
        from: i64,
        limit: usize,
    ) -> Result<(Vec<Value>, i64)>;

    /// Removes messages the client acknowledged by sending `up_to` as `since`.
    async fn delete_to_device_messages(
        &self,
        user_id: &UserId,
        device_id: &DeviceId,
        up_to: i64,
    ) -> Result<()>;

    async fn global_account_data(&self, user_id: &UserId) -> Result<Vec<Value>>;

    /// Room account data keyed by room ID, for the given rooms only.
    async fn room_account_data(
        &self,
        user_id: &UserId,
        room_ids: &[String],
    ) -> Result<BTreeMap<String, Vec<Value>>>;

    /// Latest receipts in the given rooms.
    async fn receipts(&self, room_ids: &[String]) -> Result<Vec<Receipt>>;
}

/// Source of device key state for the e2ee extension.
#[async_trait]
pub trait E2eeFetcher: Debug + Send + Sync {
    /// `is_initial` asks for the full device list state rather than the
    /// changes since the last call.
    async fn device_data(
        &self,
        user_id: &UserId,
        device_id: &DeviceId,
        is_initial: bool,
    ) -> Option<DeviceData>;
}
