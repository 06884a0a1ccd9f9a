// =============================================================================
// Matrixon Matrix NextServer - Sliding Sync Core Library
// =============================================================================
//
// Project: Matrixon - Ultra High Performance Matrix NextServer (Synapse Alternative)
// Author: arkSong (arksong2018@gmail.com) - Founder of Matrixon Innovation Project
// Date: 2024-12-11
// Version: 0.11.0-alpha
// License: Apache 2.0 / MIT
//
// Description:
//   Extension dispatch and response diff model for the sliding sync
//   protocol. Tracks per-connection extension configuration, fans requests
//   out to the enabled extensions and encodes/decodes the list operations
//   sent back to clients.
//
// =============================================================================

pub mod config;
pub mod service;

#[cfg(any(test, feature = "testing"))]
pub mod test_utils;

pub use config::SlidingSyncConfig;
pub use matrixon_common::{MatrixonError, Result};
pub use service::sync::{
    extensions::{self, ExtensionHandler, Handler},
    included_room_ids_in_ops, OpKind, Response, ResponseList, ResponseOp, ResponseOpRange,
    ResponseOpSingle, Room,
};

// Re-export common types
pub use ruma;
pub use tracing;
