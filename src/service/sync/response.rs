// =============================================================================
// Matrixon Matrix NextServer - Sliding Sync Response Model
// =============================================================================
//
// Project: Matrixon - Ultra High Performance Matrix NextServer (Synapse Alternative)
// Author: arkSong (arksong2018@gmail.com) - Founder of Matrixon Innovation Project
// Date: 2024-12-11
// Version: 0.11.0-alpha
// License: Apache 2.0 / MIT
//
// Description:
//   Wire envelope for a sliding sync poll: per-list operations, room
//   snapshots, extension payloads and the position cursor. List operations
//   come in two untagged shapes which are told apart by the presence of a
//   `range` key when decoding.
//
// =============================================================================

use std::{
    collections::{BTreeMap, HashSet},
    fmt,
};

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use super::{extensions, Room};
use crate::Result;

pub const OP_SYNC: &str = "SYNC";
pub const OP_INVALIDATE: &str = "INVALIDATE";
pub const OP_INSERT: &str = "INSERT";
pub const OP_DELETE: &str = "DELETE";
pub const OP_UPDATE: &str = "UPDATE";

/// Servers emit `null` for empty lists and maps, which decodes as the empty value.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Kind of a list operation.
///
/// Unknown kinds are kept verbatim so they survive a decode/encode cycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OpKind {
    Sync,
    Invalidate,
    Insert,
    Delete,
    Update,
    Other(String),
}

impl OpKind {
    pub fn as_str(&self) -> &str {
        match self {
            OpKind::Sync => OP_SYNC,
            OpKind::Invalidate => OP_INVALIDATE,
            OpKind::Insert => OP_INSERT,
            OpKind::Delete => OP_DELETE,
            OpKind::Update => OP_UPDATE,
            OpKind::Other(kind) => kind,
        }
    }
}

impl From<String> for OpKind {
    fn from(kind: String) -> Self {
        match kind.as_str() {
            OP_SYNC => OpKind::Sync,
            OP_INVALIDATE => OpKind::Invalidate,
            OP_INSERT => OpKind::Insert,
            OP_DELETE => OpKind::Delete,
            OP_UPDATE => OpKind::Update,
            _ => OpKind::Other(kind),
        }
    }
}

impl From<&str> for OpKind {
    fn from(kind: &str) -> Self {
        OpKind::from(kind.to_owned())
    }
}

impl From<OpKind> for String {
    fn from(kind: OpKind) -> Self {
        match kind {
            OpKind::Other(kind) => kind,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bulk operation over an inclusive index range (`SYNC`, `INVALIDATE`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseOpRange {
    #[serde(rename = "op")]
    pub operation: OpKind,

    #[serde(default, deserialize_with = "null_as_default")]
    pub range: [i64; 2],

    #[serde(default, deserialize_with = "null_as_default", skip_serializing_if = "Vec::is_empty")]
    pub rooms: Vec<Room>,
}

impl ResponseOpRange {
    pub fn included_room_ids(&self) -> Vec<&str> {
        if self.operation == OpKind::Invalidate {
            // the rooms are being excluded
            return Vec::new();
        }
        self.rooms.iter().map(|room| room.room_id.as_str()).collect()
    }
}

/// Operation on a single list index (`INSERT`, `UPDATE`, `DELETE`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseOpSingle {
    #[serde(rename = "op")]
    pub operation: OpKind,

    /// `Some(0)` is a real index and distinct from an absent one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<Room>,
}

impl ResponseOpSingle {
    pub fn included_room_ids(&self) -> Vec<&str> {
        match &self.room {
            Some(room) if self.operation != OpKind::Delete => vec![room.room_id.as_str()],
            _ => Vec::new(),
        }
    }
}

/// One mutation of a client visible room list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseOp {
    Range(ResponseOpRange),
    Single(ResponseOpSingle),
}

impl ResponseOp {
    pub fn op(&self) -> &OpKind {
        match self {
            ResponseOp::Range(op) => &op.operation,
            ResponseOp::Single(op) => &op.operation,
        }
    }

    /// Rooms this operation delivers data about. `INVALIDATE` and `DELETE`
    /// never count, any other kind (including unrecognised ones) does.
    pub fn included_room_ids(&self) -> Vec<&str> {
        match self {
            ResponseOp::Range(op) => op.included_room_ids(),
            ResponseOp::Single(op) => op.included_room_ids(),
        }
    }
}

impl From<ResponseOpRange> for ResponseOp {
    fn from(op: ResponseOpRange) -> Self {
        ResponseOp::Range(op)
    }
}

impl From<ResponseOpSingle> for ResponseOp {
    fn from(op: ResponseOpSingle) -> Self {
        ResponseOp::Single(op)
    }
}

// The wire format carries no variant tag, so peek at the object first.
impl<'de> Deserialize<'de> for ResponseOp {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Map::<String, Value>::deserialize(deserializer)?;
        let is_range = raw.contains_key("range");
        let raw = Value::Object(raw);

        let op = if is_range {
            serde_json::from_value(raw).map(ResponseOp::Range)
        } else {
            serde_json::from_value(raw).map(ResponseOp::Single)
        };
        op.map_err(de::Error::custom)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseList {
    #[serde(default, deserialize_with = "null_as_default")]
    pub ops: Vec<ResponseOp>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub count: usize,
}

/// Returns which room IDs this set of lists is returning information on.
/// Information means things like SYNC/INSERT/UPDATE, and not DELETE/INVALIDATE.
pub fn included_room_ids_in_ops(lists: &[ResponseList]) -> HashSet<String> {
    lists
        .iter()
        .flat_map(|list| list.ops.iter())
        .flat_map(|op| op.included_room_ids())
        .map(str::to_owned)
        .collect()
}

/// Top level sliding sync response body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, deserialize_with = "null_as_default")]
    pub lists: Vec<ResponseList>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub rooms: BTreeMap<String, Room>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub extensions: extensions::Response,

    #[serde(default, deserialize_with = "null_as_default")]
    pub pos: String,

    #[serde(
        rename = "session_id",
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "String::is_empty"
    )]
    pub session: String,
}

impl Response {
    /// Decodes a response body. Any malformed op fails the whole decode.
    #[instrument(level = "debug", skip(body), fields(len = body.len()))]
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        let res: Self = serde_json::from_slice(body)?;
        debug!("🔧 Decoded response with {} list ops", res.list_ops());
        Ok(res)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// The position cursor as an integer, or 0 if it does not parse.
    pub fn pos_int(&self) -> i64 {
        self.pos.parse().unwrap_or(0)
    }

    /// Total number of operations across every list.
    pub fn list_ops(&self) -> usize {
        self.lists.iter().map(|list| list.ops.len()).sum()
    }

    pub fn included_room_ids(&self) -> HashSet<String> {
        included_room_ids_in_ops(&self.lists)
    }
}
