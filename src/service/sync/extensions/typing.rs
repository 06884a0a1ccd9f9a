// =============================================================================
// Matrixon Matrix NextServer - Typing Extension
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
use ruma::OwnedUserId;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{Context, Enableable, GenericRequest, GenericResponse, Response};
use crate::service::sync::caches::Update;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingRequest {
    #[serde(flatten)]
    pub core: Enableable,
}

/// `m.typing` EDUs keyed by room ID.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypingResponse {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rooms: BTreeMap<String, Value>,
}

impl GenericResponse for TypingResponse {
    fn has_data(&self, _is_initial: bool) -> bool {
        !self.rooms.is_empty()
    }
}

fn typing_edu(user_ids: &[OwnedUserId]) -> Value {
    json!({
        "type": "m.typing",
        "content": {
            "user_ids": user_ids,
        },
    })
}

#[async_trait]
impl GenericRequest for TypingRequest {
    fn name(&self) -> &'static str {
        "typing"
    }

    fn is_enabled(&self) -> Option<bool> {
        self.core.is_enabled()
    }

    fn apply_delta(&mut self, next: &Self) {
        self.core.apply_delta(Some(next));
    }

    async fn process_initial(&self, res: &mut Response, ext_ctx: &Context<'_>) {
        let cache = &ext_ctx.handler.global_cache;
        let rooms: BTreeMap<String, Value> = ext_ctx
            .room_ids()
            .into_iter()
            .filter_map(|room_id| {
                let users = cache.typing_users(&room_id)?;
                (!users.is_empty()).then(|| {
                    let edu = typing_edu(&users);
                    (room_id, edu)
                })
            })
            .collect();

        if !rooms.is_empty() {
            res.typing = Some(TypingResponse { rooms });
        }
    }

    async fn append_live(&self, res: &mut Response, _ext_ctx: &Context<'_>, update: &Update) {
        let Update::Typing { room_id, user_ids } = update else {
            return;
        };
        // an empty list is still sent so clients clear the indicator
        res.typing
            .get_or_insert_with(TypingResponse::default)
            .rooms
            .insert(room_id.clone(), typing_edu(user_ids));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{alice, Fixture};

    fn enabled() -> TypingRequest {
        TypingRequest {
            core: Enableable { enabled: Some(true) },
        }
    }

    #[tokio::test]
    async fn test_initial_only_includes_rooms_with_typers() {
        let fixture = Fixture::new().with_rooms(&["!a:localhost", "!b:localhost"]);
        fixture.cache.set_typing("!a:localhost", vec![alice()]);
        fixture.cache.set_typing("!b:localhost", Vec::new());
        fixture.cache.set_typing("!elsewhere:localhost", vec![alice()]);
        let handler = fixture.handler();

        let mut res = Response::default();
        enabled().process_initial(&mut res, &fixture.context(&handler, true)).await;

        let typing = res.typing.unwrap();
        assert_eq!(typing.rooms.len(), 1);
        assert_eq!(
            typing.rooms["!a:localhost"],
            json!({"type": "m.typing", "content": {"user_ids": ["@alice:localhost"]}})
        );
    }

    #[tokio::test]
    async fn test_initial_without_typers() {
        let fixture = Fixture::new().with_rooms(&["!a:localhost"]);
        let handler = fixture.handler();

        let mut res = Response::default();
        enabled().process_initial(&mut res, &fixture.context(&handler, true)).await;
        assert!(res.typing.is_none());
    }

    #[tokio::test]
    async fn test_live_replaces_room_edu() {
        let fixture = Fixture::new();
        let handler = fixture.handler();
        let ctx = fixture.context(&handler, false);

        let mut res = Response::default();
        let ext = enabled();
        let started = Update::Typing {
            room_id: "!a:localhost".to_owned(),
            user_ids: vec![alice()],
        };
        let stopped = Update::Typing {
            room_id: "!a:localhost".to_owned(),
            user_ids: Vec::new(),
        };
        ext.append_live(&mut res, &ctx, &started).await;
        ext.append_live(&mut res, &ctx, &stopped).await;

        let typing = res.typing.unwrap();
        assert_eq!(typing.rooms["!a:localhost"]["content"]["user_ids"], json!([]));
        assert!(typing.has_data(false));
    }
}
