// =============================================================================
// Matrixon Matrix NextServer - E2EE Extension
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
use tracing::debug;

use super::{Context, Enableable, GenericRequest, GenericResponse, Response};
use crate::service::sync::{caches::Update, storage::DeviceData};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct E2eeRequest {
    #[serde(flatten)]
    pub core: Enableable,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct E2eeDeviceList {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changed: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub left: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct E2eeResponse {
    #[serde(
        rename = "device_one_time_keys_count",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub otk_counts: Option<BTreeMap<String, i64>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_lists: Option<E2eeDeviceList>,

    #[serde(
        rename = "device_unused_fallback_key_types",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub fallback_key_types: Vec<String>,
}

impl GenericResponse for E2eeResponse {
    fn has_data(&self, is_initial: bool) -> bool {
        if is_initial {
            return true;
        }
        self.device_lists.is_some() || !self.fallback_key_types.is_empty() || self.otk_counts.is_some()
    }
}

impl E2eeResponse {
    /// Counts and fallback types are replaced, device list changes accumulate.
    fn merge(&mut self, data: DeviceData, is_initial: bool) {
        if is_initial || !data.otk_counts.is_empty() {
            self.otk_counts = Some(data.otk_counts);
        }
        if is_initial || !data.fallback_key_types.is_empty() {
            self.fallback_key_types = data.fallback_key_types;
        }
        if data.changed.is_empty() && data.left.is_empty() {
            return;
        }

        let lists = self.device_lists.get_or_insert_with(E2eeDeviceList::default);
        for user in data.changed {
            lists.left.retain(|u| *u != user);
            if !lists.changed.contains(&user) {
                lists.changed.push(user);
            }
        }
        for user in data.left {
            lists.changed.retain(|u| *u != user);
            if !lists.left.contains(&user) {
                lists.left.push(user);
            }
        }
    }
}

#[async_trait]
impl GenericRequest for E2eeRequest {
    fn name(&self) -> &'static str {
        "e2ee"
    }

    fn is_enabled(&self) -> Option<bool> {
        self.core.is_enabled()
    }

    fn apply_delta(&mut self, next: &Self) {
        self.core.apply_delta(Some(next));
    }

    async fn process_initial(&self, res: &mut Response, ext_ctx: &Context<'_>) {
        let data = ext_ctx
            .handler
            .e2ee_fetcher
            .device_data(&ext_ctx.user_id, &ext_ctx.device_id, true)
            .await;
        let Some(data) = data else {
            debug!("🔑 No device data for {} ({})", ext_ctx.user_id, ext_ctx.device_id);
            return;
        };
        res.e2ee
            .get_or_insert_with(E2eeResponse::default)
            .merge(data, true);
    }

    async fn append_live(&self, res: &mut Response, ext_ctx: &Context<'_>, update: &Update) {
        let Update::DeviceData { user_id } = update else {
            return;
        };
        if *user_id != ext_ctx.user_id {
            return;
        }

        let data = ext_ctx
            .handler
            .e2ee_fetcher
            .device_data(&ext_ctx.user_id, &ext_ctx.device_id, false)
            .await;
        if let Some(data) = data {
            res.e2ee
                .get_or_insert_with(E2eeResponse::default)
                .merge(data, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{alice, Fixture};
    use serde_json::json;

    #[test_log::test]
    fn test_has_data() {
        let res = E2eeResponse::default();
        assert!(res.has_data(true));
        assert!(!res.has_data(false));

        let res = E2eeResponse {
            fallback_key_types: vec!["signed_curve25519".to_owned()],
            ..Default::default()
        };
        assert!(res.has_data(false));
    }

    #[test_log::test]
    fn test_merge_unions_device_lists() {
        let mut res = E2eeResponse::default();
        res.merge(
            DeviceData {
                changed: vec!["@bob:localhost".to_owned()],
                left: vec!["@carol:localhost".to_owned()],
                ..Default::default()
            },
            false,
        );
        res.merge(
            DeviceData {
                changed: vec!["@bob:localhost".to_owned(), "@carol:localhost".to_owned()],
                ..Default::default()
            },
            false,
        );

        let lists = res.device_lists.unwrap();
        assert_eq!(lists.changed, vec!["@bob:localhost", "@carol:localhost"]);
        assert!(lists.left.is_empty());
        assert!(res.otk_counts.is_none());
    }

    #[test_log::test]
    fn test_wire_names() {
        let res = E2eeResponse {
            otk_counts: Some([("signed_curve25519".to_owned(), 3)].into()),
            device_lists: Some(E2eeDeviceList {
                changed: vec!["@bob:localhost".to_owned()],
                left: Vec::new(),
            }),
            fallback_key_types: vec!["signed_curve25519".to_owned()],
        };
        assert_eq!(
            serde_json::to_value(&res).unwrap(),
            json!({
                "device_one_time_keys_count": {"signed_curve25519": 3},
                "device_lists": {"changed": ["@bob:localhost"]},
                "device_unused_fallback_key_types": ["signed_curve25519"],
            })
        );
    }

    #[tokio::test]
    async fn test_initial_and_live() {
        let fixture = Fixture::new();
        fixture.e2ee.set(DeviceData {
            otk_counts: [("signed_curve25519".to_owned(), 10)].into(),
            ..Default::default()
        });
        let handler = fixture.handler();
        let req = E2eeRequest {
            core: Enableable { enabled: Some(true) },
        };

        let mut res = Response::default();
        req.process_initial(&mut res, &fixture.context(&handler, true)).await;
        assert_eq!(res.e2ee.as_ref().unwrap().otk_counts.as_ref().unwrap()["signed_curve25519"], 10);

        fixture.e2ee.set(DeviceData {
            changed: vec!["@bob:localhost".to_owned()],
            ..Default::default()
        });
        let update = Update::DeviceData { user_id: alice() };
        req.append_live(&mut res, &fixture.context(&handler, false), &update).await;

        let e2ee = res.e2ee.unwrap();
        assert_eq!(e2ee.otk_counts.unwrap()["signed_curve25519"], 10);
        assert_eq!(e2ee.device_lists.unwrap().changed, vec!["@bob:localhost"]);
        assert_eq!(fixture.e2ee.initial_flags(), vec![true, false]);
    }
}
