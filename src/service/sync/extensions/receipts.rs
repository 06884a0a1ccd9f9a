// =============================================================================
// Matrixon Matrix NextServer - Receipts Extension
// =============================================================================
//
// Project: Matrixon - Ultra High Performance Matrix NextServer (Synapse Alternative)
// Author: arkSong (arksong2018@gmail.com) - Founder of Matrixon Innovation Project
// Date: 2024-12-11
// Version: 0.11.0-alpha
// License: Apache 2.0 / MIT
//
// =============================================================================

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::error;

use super::{Context, Enableable, GenericRequest, GenericResponse, Response};
use crate::service::sync::{caches::Update, storage::Receipt};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptsRequest {
    #[serde(flatten)]
    pub core: Enableable,
}

/// One `m.receipt` EDU per room.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReceiptsResponse {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rooms: BTreeMap<String, Value>,
}

impl GenericResponse for ReceiptsResponse {
    fn has_data(&self, _is_initial: bool) -> bool {
        !self.rooms.is_empty()
    }
}

impl ReceiptsResponse {
    /// Adds a receipt to its room's EDU as
    /// `content[event_id][receipt_type][user_id] = {ts, thread_id?}`.
    /// An older receipt of the same type from the same user is dropped.
    pub fn pack(&mut self, receipt: &Receipt) {
        let edu = self
            .rooms
            .entry(receipt.room_id.clone())
            .or_insert_with(|| json!({"type": "m.receipt", "content": {}}));
        let Some(content) = edu.get_mut("content").and_then(Value::as_object_mut) else {
            return;
        };

        let user = receipt.user_id.as_str();
        for by_type in content.values_mut() {
            if let Some(by_user) = by_type
                .get_mut(&receipt.receipt_type)
                .and_then(Value::as_object_mut)
            {
                by_user.remove(user);
            }
            if let Some(by_type) = by_type.as_object_mut() {
                by_type.retain(|_, by_user| by_user.as_object().map_or(true, |m| !m.is_empty()));
            }
        }
        content.retain(|_, by_type| by_type.as_object().map_or(true, |m| !m.is_empty()));

        let mut data = Map::new();
        data.insert("ts".to_owned(), json!(receipt.ts));
        if let Some(thread_id) = &receipt.thread_id {
            data.insert("thread_id".to_owned(), json!(thread_id));
        }

        let by_type = content
            .entry(receipt.event_id.clone())
            .or_insert_with(|| json!({}));
        let Some(by_type) = by_type.as_object_mut() else {
            return;
        };
        let by_user = by_type
            .entry(receipt.receipt_type.clone())
            .or_insert_with(|| json!({}));
        if let Some(by_user) = by_user.as_object_mut() {
            by_user.insert(user.to_owned(), Value::Object(data));
        }
    }
}

#[async_trait]
impl GenericRequest for ReceiptsRequest {
    fn name(&self) -> &'static str {
        "receipts"
    }

    fn is_enabled(&self) -> Option<bool> {
        self.core.is_enabled()
    }

    fn apply_delta(&mut self, next: &Self) {
        self.core.apply_delta(Some(next));
    }

    async fn process_initial(&self, res: &mut Response, ext_ctx: &Context<'_>) {
        let room_ids = ext_ctx.room_ids();
        if room_ids.is_empty() {
            return;
        }

        let receipts = match ext_ctx.handler.store.receipts(&room_ids).await {
            Ok(receipts) => receipts,
            Err(e) => {
                error!("❌ Failed to load receipts for {} rooms: {}", room_ids.len(), e);
                return;
            }
        };
        if receipts.is_empty() {
            return;
        }

        let ext_res = res.receipts.get_or_insert_with(ReceiptsResponse::default);
        for receipt in &receipts {
            ext_res.pack(receipt);
        }
    }

    async fn append_live(&self, res: &mut Response, _ext_ctx: &Context<'_>, update: &Update) {
        if let Update::Receipt(receipt) = update {
            res.receipts
                .get_or_insert_with(ReceiptsResponse::default)
                .pack(receipt);
        }
    }
}
