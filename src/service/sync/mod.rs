// =============================================================================
// Matrixon Matrix NextServer - Sliding Sync Module
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
//   Sliding sync (MSC3575) per-connection extension state and response diff
//   encoding. Room ranking, storage and connection registration live
//   elsewhere and are reached through the `caches` and `storage` traits.
//
// =============================================================================

pub mod caches;
pub mod extensions;
mod response;
mod room;
pub mod storage;

pub use response::{
    included_room_ids_in_ops, OpKind, Response, ResponseList, ResponseOp, ResponseOpRange,
    ResponseOpSingle, OP_DELETE, OP_INSERT, OP_INVALIDATE, OP_SYNC, OP_UPDATE,
};
pub use room::Room;
