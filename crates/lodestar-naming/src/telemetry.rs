//! Log output initialisation.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::{NamingError, Result};

/// Installs the global `fmt` subscriber.
///
/// `RUST_LOG` takes precedence over the configured filter. Calling this twice
/// returns [`NamingError::Telemetry`].
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter)
            .map_err(|e| NamingError::Telemetry(format!("invalid filter {:?}: {e}", config.filter)))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| NamingError::Telemetry(e.to_string()))
}
