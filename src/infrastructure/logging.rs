use crate::infrastructure::config::LoggingConfig;
use crate::infrastructure::error::InfraError;
use tracing_subscriber::EnvFilter;

/// `RUST_LOG` wins over the configured level. `false` means a subscriber was already set.
pub fn init_logging(config: &LoggingConfig) -> Result<bool, InfraError> {
    let filter = build_filter(config)?;
    let installed = if config.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
            .is_ok()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init()
            .is_ok()
    };
    Ok(installed)
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, InfraError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(config.level.trim()).map_err(|error| {
        InfraError::InvalidConfig(format!("invalid logging.level '{}': {error}", config.level))
    })
}
