// =============================================================================
// Matrixon Matrix NextServer - Sliding Sync Extensions Module
// =============================================================================
//
// Project: Matrixon - Ultra High Performance Matrix NextServer (Synapse Alternative)
// Author: arkSong (arksong2018@gmail.com) - Founder of Matrixon Innovation Project
// Contributors: Matrixon Development Team
// Date: 2024-12-11
// Version: 0.11.0-alpha
// License: Apache 2.0 / MIT
//
// Description:
//   Pluggable extensions riding inside a sliding sync response (to-device,
//   e2ee, account data, typing, receipts). Per-connection extension config
//   is sticky: a request only changes what it specifies. The handler fans a
//   request out to every enabled extension, either for the initial snapshot
//   or for each buffered live update.
//
// =============================================================================

mod account_data;
mod e2ee;
mod receipts;
mod to_device;
mod typing;

use std::{
    collections::HashMap,
    fmt::Debug,
    sync::Arc,
};

use async_trait::async_trait;
use ruma::{OwnedDeviceId, OwnedUserId};
use serde::{Deserialize, Serialize};
use tracing::{debug, debug_span, instrument, trace, trace_span, Instrument};

pub use account_data::{AccountDataRequest, AccountDataResponse};
pub use e2ee::{E2eeDeviceList, E2eeRequest, E2eeResponse};
pub use receipts::{ReceiptsRequest, ReceiptsResponse};
pub use to_device::{ToDeviceRequest, ToDeviceResponse};
pub use typing::{TypingRequest, TypingResponse};

use super::{
    caches::{GlobalCache, Update},
    storage::{E2eeFetcher, Storage},
};
use crate::SlidingSyncConfig;

/// Contract for the request half of an extension.
///
/// Extensions have no error channel. Failures reading from storage are logged
/// and leave the extension's slot of the response as it was.
#[async_trait]
pub trait GenericRequest: Debug + Send + Sync {
    /// Stable name, used to label the tracing span of each invocation.
    fn name(&self) -> &'static str;

    /// Value of the `enabled` key, `None` when it was not specified.
    fn is_enabled(&self) -> Option<bool>;

    /// Mixes a newly received config into this persisted one.
    fn apply_delta(&mut self, next: &Self)
    where
        Self: Sized;

    /// Computes this extension's snapshot on the first sync of a connection.
    async fn process_initial(&self, res: &mut Response, ext_ctx: &Context<'_>);

    /// Folds one live update into the in-flight response. May be called many
    /// times per poll as the connection buffer drains.
    async fn append_live(&self, res: &mut Response, ext_ctx: &Context<'_>, update: &Update);
}

/// Contract for the response half of an extension.
pub trait GenericResponse: Debug + Send + Sync {
    fn has_data(&self, is_initial: bool) -> bool;
}

/// Shared `enabled` flag composed into every extension request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enableable {
    #[serde(default)]
    pub enabled: Option<bool>,
}

impl Enableable {
    pub fn is_enabled(&self) -> Option<bool> {
        self.enabled
    }

    pub fn apply_delta(&mut self, next: Option<&dyn GenericRequest>) {
        let Some(next) = next else {
            return;
        };
        // unspecified means leave it unchanged
        if let Some(enabled) = next.is_enabled() {
            self.enabled = Some(enabled);
        }
    }
}

/// True only for an explicit `enabled: true`.
pub fn extension_enabled(req: &dyn GenericRequest) -> bool {
    req.is_enabled() == Some(true)
}

/// The JSON request body under `extensions`.
///
/// To add an extension, add a field here and to `fields()` and `apply_delta()`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_device: Option<ToDeviceRequest>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e2ee: Option<E2eeRequest>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_data: Option<AccountDataRequest>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typing: Option<TypingRequest>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipts: Option<ReceiptsRequest>,
}

impl Request {
    /// Every extension slot in declaration order. This order is also the
    /// invocation order.
    fn fields(&self) -> [Option<&dyn GenericRequest>; 5] {
        [
            self.to_device.as_ref().map(|r| r as &dyn GenericRequest),
            self.e2ee.as_ref().map(|r| r as &dyn GenericRequest),
            self.account_data.as_ref().map(|r| r as &dyn GenericRequest),
            self.typing.as_ref().map(|r| r as &dyn GenericRequest),
            self.receipts.as_ref().map(|r| r as &dyn GenericRequest),
        ]
    }

    pub fn enabled_extensions(&self) -> Vec<&dyn GenericRequest> {
        self.fields()
            .into_iter()
            .flatten()
            .filter(|ext| extension_enabled(*ext))
            .collect()
    }

    /// Merges the extension configs of an incoming request onto this one.
    pub fn apply_delta(&mut self, next: Request) -> &mut Self {
        merge_field(&mut self.to_device, next.to_device);
        merge_field(&mut self.e2ee, next.e2ee);
        merge_field(&mut self.account_data, next.account_data);
        merge_field(&mut self.typing, next.typing);
        merge_field(&mut self.receipts, next.receipts);
        self
    }
}

fn merge_field<T: GenericRequest>(curr: &mut Option<T>, next: Option<T>) {
    let Some(next) = next else {
        // missing extension, keep it sticky
        return;
    };
    match curr {
        Some(curr) => curr.apply_delta(&next),
        None => *curr = Some(next),
    }
}

/// The top level `extensions` key in the JSON response.
///
/// To add an extension, add a field here and to `fields()`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_device: Option<ToDeviceResponse>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e2ee: Option<E2eeResponse>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_data: Option<AccountDataResponse>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typing: Option<TypingResponse>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipts: Option<ReceiptsResponse>,
}

impl Response {
    fn fields(&self) -> [Option<&dyn GenericResponse>; 5] {
        [
            self.to_device.as_ref().map(|r| r as &dyn GenericResponse),
            self.e2ee.as_ref().map(|r| r as &dyn GenericResponse),
            self.account_data.as_ref().map(|r| r as &dyn GenericResponse),
            self.typing.as_ref().map(|r| r as &dyn GenericResponse),
            self.receipts.as_ref().map(|r| r as &dyn GenericResponse),
        ]
    }

    /// Whether the `extensions` block is worth sending at all.
    pub fn has_data(&self, is_initial: bool) -> bool {
        self.fields()
            .into_iter()
            .flatten()
            .any(|ext| ext.has_data(is_initial))
    }
}

/// Per-call data handed to every extension.
#[derive(Debug, Clone)]
pub struct Context<'a> {
    pub handler: &'a Handler,
    /// Event IDs already sent in each room's timeline
    pub room_id_to_timeline: HashMap<String, Vec<String>>,
    pub is_initial: bool,
    pub user_id: OwnedUserId,
    pub device_id: OwnedDeviceId,
}

impl<'a> Context<'a> {
    pub fn new(handler: &'a Handler, user_id: OwnedUserId, device_id: OwnedDeviceId) -> Self {
        Self {
            handler,
            room_id_to_timeline: HashMap::new(),
            is_initial: false,
            user_id,
            device_id,
        }
    }

    pub fn initial(mut self, is_initial: bool) -> Self {
        self.is_initial = is_initial;
        self
    }

    pub fn with_timelines(mut self, room_id_to_timeline: HashMap<String, Vec<String>>) -> Self {
        self.room_id_to_timeline = room_id_to_timeline;
        self
    }

    /// Rooms present in this response, sorted.
    pub fn room_ids(&self) -> Vec<String> {
        let mut room_ids: Vec<String> = self.room_id_to_timeline.keys().cloned().collect();
        room_ids.sort_unstable();
        room_ids
    }

    fn rebind<'h>(self, handler: &'h Handler) -> Context<'h> {
        Context {
            handler,
            room_id_to_timeline: self.room_id_to_timeline,
            is_initial: self.is_initial,
            user_id: self.user_id,
            device_id: self.device_id,
        }
    }
}

/// Entry points used by the connection loop.
#[async_trait]
pub trait ExtensionHandler: Send + Sync {
    async fn handle(&self, req: &Request, ext_ctx: Context<'_>) -> Response;

    async fn handle_live_update(
        &self,
        update: &Update,
        req: &Request,
        res: &mut Response,
        ext_ctx: Context<'_>,
    );
}

/// Runs enabled extensions against shared storage and caches.
///
/// Extensions run one after another: they all write into one response
/// without locking. Dropping the future returned by `handle` cancels it.
#[derive(Debug, Clone)]
pub struct Handler {
    pub store: Arc<dyn Storage>,
    pub e2ee_fetcher: Arc<dyn E2eeFetcher>,
    pub global_cache: Arc<dyn GlobalCache>,
    config: SlidingSyncConfig,
}

impl Handler {
    pub fn new(
        store: Arc<dyn Storage>,
        e2ee_fetcher: Arc<dyn E2eeFetcher>,
        global_cache: Arc<dyn GlobalCache>,
    ) -> Self {
        Self::with_config(store, e2ee_fetcher, global_cache, SlidingSyncConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn Storage>,
        e2ee_fetcher: Arc<dyn E2eeFetcher>,
        global_cache: Arc<dyn GlobalCache>,
        config: SlidingSyncConfig,
    ) -> Self {
        Self {
            store,
            e2ee_fetcher,
            global_cache,
            config,
        }
    }

    pub fn config(&self) -> &SlidingSyncConfig {
        &self.config
    }
}

#[async_trait]
impl ExtensionHandler for Handler {
    #[instrument(level = "debug", skip_all, fields(user = %ext_ctx.user_id, initial = ext_ctx.is_initial))]
    async fn handle(&self, req: &Request, ext_ctx: Context<'_>) -> Response {
        let ext_ctx = ext_ctx.rebind(self);
        let exts = req.enabled_extensions();
        debug!(
            "🔄 Processing {} extensions for {} ({})",
            exts.len(),
            ext_ctx.user_id,
            ext_ctx.device_id
        );

        let mut res = Response::default();
        for ext in exts {
            let span = debug_span!("extension", name = ext.name());
            ext.process_initial(&mut res, &ext_ctx).instrument(span).await;
        }
        res
    }

    #[instrument(level = "trace", skip_all, fields(user = %ext_ctx.user_id, kind = update.kind()))]
    async fn handle_live_update(
        &self,
        update: &Update,
        req: &Request,
        res: &mut Response,
        ext_ctx: Context<'_>,
    ) {
        let ext_ctx = ext_ctx.rebind(self);
        trace!("Appending {} update for {}", update.kind(), ext_ctx.user_id);

        for ext in req.enabled_extensions() {
            let span = trace_span!("extension", name = ext.name());
            ext.append_live(res, &ext_ctx, update).instrument(span).await;
        }
    }
}
