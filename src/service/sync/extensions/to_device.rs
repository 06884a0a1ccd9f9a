// =============================================================================
// Matrixon Matrix NextServer - To-Device Extension
// =============================================================================
//
// Project: Matrixon - Ultra High Performance Matrix NextServer (Synapse Alternative)
// Author: arkSong (arksong2018@gmail.com) - Founder of Matrixon Innovation Project
// Date: 2024-12-11
// Version: 0.11.0-alpha
// License: Apache 2.0 / MIT
//
// =============================================================================

use std::num::ParseIntError;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};

use super::{Context, Enableable, GenericRequest, GenericResponse, Response};
use crate::service::sync::caches::Update;

/// Client config for to-device delivery. `limit` and `since` are sticky.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToDeviceRequest {
    #[serde(flatten)]
    pub core: Enableable,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToDeviceResponse {
    pub next_batch: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<Value>,
}

impl GenericResponse for ToDeviceResponse {
    fn has_data(&self, is_initial: bool) -> bool {
        // the initial response always carries a next_batch the client needs
        is_initial || !self.events.is_empty()
    }
}

impl ToDeviceRequest {
    fn since_position(&self) -> Result<Option<i64>, ParseIntError> {
        self.since
            .as_deref()
            .filter(|since| !since.is_empty())
            .map(str::parse)
            .transpose()
    }

    async fn fetch_into(&self, res: &mut Response, ext_ctx: &Context<'_>, from: i64, limit: usize) {
        let store = &ext_ctx.handler.store;
        let (events, up_to) = match store
            .to_device_messages(&ext_ctx.user_id, &ext_ctx.device_id, from, limit)
            .await
        {
            Ok(page) => page,
            Err(e) => {
                error!(
                    "❌ Failed to read to-device messages for {} ({}): {}",
                    ext_ctx.user_id, ext_ctx.device_id, e
                );
                return;
            }
        };

        debug!("📨 {} to-device messages from {} up to {}", events.len(), from, up_to);
        let slot = res.to_device.get_or_insert_with(ToDeviceResponse::default);
        slot.next_batch = up_to.to_string();
        slot.events.extend(events);
    }
}

#[async_trait]
impl GenericRequest for ToDeviceRequest {
    fn name(&self) -> &'static str {
        "to_device"
    }

    fn is_enabled(&self) -> Option<bool> {
        self.core.is_enabled()
    }

    fn apply_delta(&mut self, next: &Self) {
        self.core.apply_delta(Some(next));
        if let Some(limit) = next.limit.filter(|limit| *limit > 0) {
            self.limit = Some(limit);
        }
        if let Some(since) = next.since.as_ref().filter(|since| !since.is_empty()) {
            self.since = Some(since.clone());
        }
    }

    async fn process_initial(&self, res: &mut Response, ext_ctx: &Context<'_>) {
        let since = match self.since_position() {
            Ok(since) => since,
            Err(e) => {
                warn!("⚠️ Invalid to-device since token {:?}: {}", self.since, e);
                return;
            }
        };

        if let Some(up_to) = since {
            // the client has seen everything up to `since`
            if let Err(e) = ext_ctx
                .handler
                .store
                .delete_to_device_messages(&ext_ctx.user_id, &ext_ctx.device_id, up_to)
                .await
            {
                error!("❌ Failed to delete acknowledged to-device messages: {}", e);
            }
        }

        let limit = ext_ctx.handler.config().to_device_limit(self.limit);
        self.fetch_into(res, ext_ctx, since.unwrap_or(0), limit).await;
    }

    async fn append_live(&self, res: &mut Response, ext_ctx: &Context<'_>, update: &Update) {
        let Update::DeviceEvents { user_id, device_id } = update else {
            return;
        };
        if *user_id != ext_ctx.user_id || *device_id != ext_ctx.device_id {
            return;
        }

        // continue from whatever this poll has already delivered
        let from = match res.to_device.as_ref() {
            Some(sent) => sent.next_batch.parse().ok(),
            None => self.since_position().ok().map(|since| since.unwrap_or(0)),
        };
        let Some(from) = from else {
            warn!("⚠️ Cannot resume to-device stream for {}", ext_ctx.user_id);
            return;
        };

        let limit = ext_ctx.handler.config().to_device_limit(self.limit);
        let sent = res.to_device.as_ref().map_or(0, |sent| sent.events.len());
        if sent >= limit {
            // the rest goes out on the next poll
            return;
        }
        self.fetch_into(res, ext_ctx, from, limit - sent).await;
    }
}
