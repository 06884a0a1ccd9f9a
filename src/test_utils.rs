// =============================================================================
// Matrixon Matrix NextServer - Test Utilities
// =============================================================================
//
// Project: Matrixon - Ultra High Performance Matrix NextServer (Synapse Alternative)
// Author: arkSong (arksong2018@gmail.com) - Founder of Matrixon Innovation Project
// Date: 2024-12-11
// Version: 0.11.0-alpha
// License: Apache 2.0 / MIT
//
// Description:
//   In-memory storage, e2ee fetcher and global cache used to drive the
//   extension handler in tests. Every collaborator call is recorded in a
//   shared call log so tests can assert invocation order.
//
// =============================================================================

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use ruma::{device_id, user_id, DeviceId, OwnedDeviceId, OwnedUserId, UserId};
use serde_json::Value;

use crate::{
    service::sync::{
        caches::GlobalCache,
        extensions::{Context, Handler},
        storage::{DeviceData, E2eeFetcher, Receipt, Storage},
    },
    MatrixonError, Result,
};

pub fn alice() -> OwnedUserId {
    user_id!("@alice:localhost").to_owned()
}

pub fn alice_device() -> OwnedDeviceId {
    device_id!("ALICEDEVICE").to_owned()
}

/// Names of collaborator methods in the order they were called.
#[derive(Debug, Default)]
pub struct CallLog(Mutex<Vec<&'static str>>);

impl CallLog {
    fn record(&self, name: &'static str) {
        self.0.lock().unwrap().push(name);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.0.lock().unwrap().clone()
    }
}

#[derive(Debug, Default)]
struct StoreState {
    to_device: Vec<(i64, Value)>,
    deleted_up_to: Option<i64>,
    global: Vec<Value>,
    rooms: BTreeMap<String, Vec<Value>>,
    receipts: Vec<Receipt>,
    failing: bool,
}

#[derive(Debug)]
pub struct FakeStorage {
    state: Mutex<StoreState>,
    log: Arc<CallLog>,
}

impl FakeStorage {
    fn new(log: Arc<CallLog>) -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            log,
        }
    }

    pub fn push_to_device(&self, pos: i64, event: Value) {
        self.state.lock().unwrap().to_device.push((pos, event));
    }

    pub fn deleted_up_to(&self) -> Option<i64> {
        self.state.lock().unwrap().deleted_up_to
    }

    pub fn set_global_account_data(&self, events: Vec<Value>) {
        self.state.lock().unwrap().global = events;
    }

    pub fn set_room_account_data(&self, room_id: &str, events: Vec<Value>) {
        self.state.lock().unwrap().rooms.insert(room_id.to_owned(), events);
    }

    pub fn add_receipt(&self, receipt: Receipt) {
        self.state.lock().unwrap().receipts.push(receipt);
    }

    /// Makes every following call return a database error.
    pub fn fail(&self) {
        self.state.lock().unwrap().failing = true;
    }

    fn enter(&self, name: &'static str) -> Result<std::sync::MutexGuard<'_, StoreState>> {
        self.log.record(name);
        let state = self.state.lock().unwrap();
        if state.failing {
            return Err(MatrixonError::Database("storage unavailable".to_owned()));
        }
        Ok(state)
    }
}

#[async_trait]
impl Storage for FakeStorage {
    async fn to_device_messages(
        &self,
        _user_id: &UserId,
        _device_id: &DeviceId,
        from: i64,
        limit: usize,
    ) -> Result<(Vec<Value>, i64)> {
        let state = self.enter("to_device_messages")?;
        let page: Vec<&(i64, Value)> = state
            .to_device
            .iter()
            .filter(|(pos, _)| *pos > from)
            .take(limit)
            .collect();
        let up_to = page.last().map_or(from, |(pos, _)| *pos);
        Ok((page.into_iter().map(|(_, event)| event.clone()).collect(), up_to))
    }

    async fn delete_to_device_messages(
        &self,
        _user_id: &UserId,
        _device_id: &DeviceId,
        up_to: i64,
    ) -> Result<()> {
        let mut state = self.enter("delete_to_device_messages")?;
        state.to_device.retain(|(pos, _)| *pos > up_to);
        state.deleted_up_to = Some(up_to);
        Ok(())
    }

    async fn global_account_data(&self, _user_id: &UserId) -> Result<Vec<Value>> {
        Ok(self.enter("global_account_data")?.global.clone())
    }

    async fn room_account_data(
        &self,
        _user_id: &UserId,
        room_ids: &[String],
    ) -> Result<BTreeMap<String, Vec<Value>>> {
        let state = self.enter("room_account_data")?;
        Ok(state
            .rooms
            .iter()
            .filter(|(room_id, _)| room_ids.contains(*room_id))
            .map(|(room_id, events)| (room_id.clone(), events.clone()))
            .collect())
    }

    async fn receipts(&self, room_ids: &[String]) -> Result<Vec<Receipt>> {
        let state = self.enter("receipts")?;
        Ok(state
            .receipts
            .iter()
            .filter(|receipt| room_ids.contains(&receipt.room_id))
            .cloned()
            .collect())
    }
}

#[derive(Debug)]
pub struct FakeE2eeFetcher {
    data: Mutex<Option<DeviceData>>,
    initial_flags: Mutex<Vec<bool>>,
    log: Arc<CallLog>,
}

impl FakeE2eeFetcher {
    /// Data returned by the next calls.
    pub fn set(&self, data: DeviceData) {
        *self.data.lock().unwrap() = Some(data);
    }

    /// The `is_initial` argument of every call so far.
    pub fn initial_flags(&self) -> Vec<bool> {
        self.initial_flags.lock().unwrap().clone()
    }
}

#[async_trait]
impl E2eeFetcher for FakeE2eeFetcher {
    async fn device_data(
        &self,
        _user_id: &UserId,
        _device_id: &DeviceId,
        is_initial: bool,
    ) -> Option<DeviceData> {
        self.log.record("device_data");
        self.initial_flags.lock().unwrap().push(is_initial);
        self.data.lock().unwrap().clone()
    }
}

#[derive(Debug)]
pub struct FakeGlobalCache {
    typing: Mutex<HashMap<String, Vec<OwnedUserId>>>,
    log: Arc<CallLog>,
}

impl FakeGlobalCache {
    pub fn set_typing(&self, room_id: &str, user_ids: Vec<OwnedUserId>) {
        self.typing.lock().unwrap().insert(room_id.to_owned(), user_ids);
    }
}

impl GlobalCache for FakeGlobalCache {
    fn typing_users(&self, room_id: &str) -> Option<Vec<OwnedUserId>> {
        self.log.record("typing_users");
        self.typing.lock().unwrap().get(room_id).cloned()
    }
}

/// Collaborators plus the rooms visible to the syncing connection.
#[derive(Debug)]
pub struct Fixture {
    pub store: Arc<FakeStorage>,
    pub e2ee: Arc<FakeE2eeFetcher>,
    pub cache: Arc<FakeGlobalCache>,
    log: Arc<CallLog>,
    rooms: HashMap<String, Vec<String>>,
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

impl Fixture {
    pub fn new() -> Self {
        let log = Arc::new(CallLog::default());
        Self {
            store: Arc::new(FakeStorage::new(log.clone())),
            e2ee: Arc::new(FakeE2eeFetcher {
                data: Mutex::new(None),
                initial_flags: Mutex::new(Vec::new()),
                log: log.clone(),
            }),
            cache: Arc::new(FakeGlobalCache {
                typing: Mutex::new(HashMap::new()),
                log: log.clone(),
            }),
            log,
            rooms: HashMap::new(),
        }
    }

    /// Rooms whose timelines are part of the response, with no events sent.
    pub fn with_rooms(mut self, room_ids: &[&str]) -> Self {
        self.rooms = room_ids
            .iter()
            .map(|room_id| (room_id.to_string(), Vec::new()))
            .collect();
        self
    }

    pub fn handler(&self) -> Handler {
        Handler::new(self.store.clone(), self.e2ee.clone(), self.cache.clone())
    }

    pub fn context<'h>(&self, handler: &'h Handler, is_initial: bool) -> Context<'h> {
        Context::new(handler, alice(), alice_device())
            .initial(is_initial)
            .with_timelines(self.rooms.clone())
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.log.calls()
    }
}
