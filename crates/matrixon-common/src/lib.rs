//! Matrixon Common Library
//!
//! Author: arkSong <arksong2018@gmail.com>
//! Version: 0.11.0-alpha
//!
//! Shared error type and logging bootstrap used by the sliding sync crates.

pub mod error;
pub mod logging;

pub use error::{MatrixonError, Result};
