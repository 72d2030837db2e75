//! Process-wide tracing setup.

use tracing_subscriber::{fmt, EnvFilter};

use crate::types::{Result, StoreError};

/// Installs a fmt subscriber filtered by `level` (any `EnvFilter` directive,
/// e.g. `info` or `foodshare=debug`).
pub fn init_logging(level: &str) -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_new(level)
                .map_err(|e| StoreError::Invalid(format!("invalid log level: {e}")))?,
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|_| StoreError::Invalid("logging already initialized".into()))
}
