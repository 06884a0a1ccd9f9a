// =============================================================================
// Matrixon Matrix NextServer - Account Data Extension
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
use serde_json::Value;
use tracing::error;

use super::{Context, Enableable, GenericRequest, GenericResponse, Response};
use crate::service::sync::caches::Update;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountDataRequest {
    #[serde(flatten)]
    pub core: Enableable,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountDataResponse {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub global: Vec<Value>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rooms: BTreeMap<String, Vec<Value>>,
}

impl GenericResponse for AccountDataResponse {
    fn has_data(&self, _is_initial: bool) -> bool {
        !self.global.is_empty() || !self.rooms.is_empty()
    }
}

#[async_trait]
impl GenericRequest for AccountDataRequest {
    fn name(&self) -> &'static str {
        "account_data"
    }

    fn is_enabled(&self) -> Option<bool> {
        self.core.is_enabled()
    }

    fn apply_delta(&mut self, next: &Self) {
        self.core.apply_delta(Some(next));
    }

    async fn process_initial(&self, res: &mut Response, ext_ctx: &Context<'_>) {
        let store = &ext_ctx.handler.store;
        let mut ext_res = AccountDataResponse::default();

        match store.global_account_data(&ext_ctx.user_id).await {
            Ok(global) => ext_res.global = global,
            Err(e) => error!("❌ Failed to load global account data for {}: {}", ext_ctx.user_id, e),
        }

        let room_ids = ext_ctx.room_ids();
        if !room_ids.is_empty() {
            match store.room_account_data(&ext_ctx.user_id, &room_ids).await {
                Ok(rooms) => {
                    ext_res.rooms = rooms.into_iter().filter(|(_, events)| !events.is_empty()).collect()
                }
                Err(e) => error!("❌ Failed to load room account data for {}: {}", ext_ctx.user_id, e),
            }
        }

        if ext_res.has_data(true) {
            res.account_data = Some(ext_res);
        }
    }

    async fn append_live(&self, res: &mut Response, _ext_ctx: &Context<'_>, update: &Update) {
        match update {
            Update::AccountData { events } if !events.is_empty() => res
                .account_data
                .get_or_insert_with(AccountDataResponse::default)
                .global
                .extend(events.iter().cloned()),
            Update::RoomAccountData { room_id, events } if !events.is_empty() => res
                .account_data
                .get_or_insert_with(AccountDataResponse::default)
                .rooms
                .entry(room_id.clone())
                .or_default()
                .extend(events.iter().cloned()),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::Fixture;
    use serde_json::json;

    fn enabled() -> AccountDataRequest {
        AccountDataRequest {
            core: Enableable { enabled: Some(true) },
        }
    }

    #[tokio::test]
    async fn test_initial_reads_global_and_visible_rooms() {
        let fixture = Fixture::new().with_rooms(&["!a:localhost"]);
        fixture.store.set_global_account_data(vec![json!({"type": "m.direct"})]);
        fixture
            .store
            .set_room_account_data("!a:localhost", vec![json!({"type": "m.tag"})]);
        fixture
            .store
            .set_room_account_data("!hidden:localhost", vec![json!({"type": "m.tag"})]);
        let handler = fixture.handler();

        let mut res = Response::default();
        enabled().process_initial(&mut res, &fixture.context(&handler, true)).await;

        let account_data = res.account_data.unwrap();
        assert_eq!(account_data.global, vec![json!({"type": "m.direct"})]);
        assert_eq!(account_data.rooms.keys().collect::<Vec<_>>(), vec!["!a:localhost"]);
    }

    #[tokio::test]
    async fn test_initial_without_data_leaves_slot_empty() {
        let fixture = Fixture::new();
        let handler = fixture.handler();

        let mut res = Response::default();
        enabled().process_initial(&mut res, &fixture.context(&handler, true)).await;
        assert!(res.account_data.is_none());
        assert_eq!(fixture.calls(), vec!["global_account_data"]);
    }

    #[tokio::test]
    async fn test_live_appends() {
        let fixture = Fixture::new();
        let handler = fixture.handler();
        let ctx = fixture.context(&handler, false);

        let mut res = Response::default();
        let ext = enabled();
        ext.append_live(&mut res, &ctx, &Update::AccountData { events: vec![json!({"type": "a"})] })
            .await;
        ext.append_live(
            &mut res,
            &ctx,
            &Update::RoomAccountData {
                room_id: "!r:localhost".to_owned(),
                events: vec![json!({"type": "b"})],
            },
        )
        .await;
        ext.append_live(&mut res, &ctx, &Update::AccountData { events: vec![json!({"type": "c"})] })
            .await;

        let account_data = res.account_data.unwrap();
        assert_eq!(account_data.global, vec![json!({"type": "a"}), json!({"type": "c"})]);
        assert_eq!(account_data.rooms["!r:localhost"], vec![json!({"type": "b"})]);
    }

    #[test_log::test]
    fn test_has_data() {
        assert!(!AccountDataResponse::default().has_data(true));
        let res = AccountDataResponse {
            global: vec![json!({})],
            ..Default::default()
        };
        assert!(res.has_data(false));
    }
}
