//! Tracing subscriber setup shared by Matrixon binaries and test harnesses.

use tracing::debug;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::{MatrixonError, Result};

/// Installs a global fmt subscriber.
///
/// `RUST_LOG` takes precedence over `default_filter` when it is set. Calling
/// this twice returns an error instead of panicking.
pub fn init(default_filter: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .map_err(|e| MatrixonError::Logging(format!("invalid filter '{default_filter}': {e}")))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .map_err(|e| MatrixonError::Logging(e.to_string()))?;

    debug!("🔧 Tracing initialized with filter '{}'", default_filter);
    Ok(())
}
