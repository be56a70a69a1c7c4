use crate::application::service::TimeTrackingService;
use crate::infrastructure::config::{ensure_default_config, load_config, TimeTrackingConfig};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::logging::init_logging;
use crate::infrastructure::rest_store::RestRemoteStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub struct BootstrapResult {
    pub config_path: PathBuf,
    pub config: TimeTrackingConfig,
    pub service: TimeTrackingService<RestRemoteStore>,
}

pub fn bootstrap_service(config_dir: &Path, viewer_id: &str) -> Result<BootstrapResult, InfraError> {
    let viewer_id = viewer_id.trim();
    if viewer_id.is_empty() {
        return Err(InfraError::InvalidConfig("viewer id must not be empty".to_string()));
    }

    let config_path = ensure_default_config(config_dir)?;
    let config = load_config(config_dir)?;
    init_logging(&config.logging)?;

    if config.backend.api_key().is_none() {
        warn!(
            env = %config.backend.api_key_env,
            "no backend api key set; requests will be anonymous"
        );
    }

    let store = Arc::new(RestRemoteStore::from_config(&config)?);
    info!(
        base_url = %config.backend.base_url,
        config = %config_path.display(),
        "time tracking service ready"
    );

    Ok(BootstrapResult {
        config_path,
        service: TimeTrackingService::new(store, viewer_id),
        config,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "taskops-timetrack-bootstrap-{name}-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn bootstrap_creates_config_and_service() {
        let dir = scratch_dir("fresh");
        let result = bootstrap_service(&dir, " viewer-1 ").expect("bootstrap");

        assert!(result.config_path.exists());
        assert_eq!(result.config.schema, 1);
        assert_eq!(result.service.viewer_id(), "viewer-1");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn bootstrap_requires_viewer() {
        let dir = scratch_dir("anonymous");
        let error = match bootstrap_service(&dir, "  ") {
            Ok(_) => panic!("blank viewer accepted"),
            Err(error) => error,
        };
        assert!(matches!(error, InfraError::InvalidConfig(_)));
        assert!(!dir.exists());
    }
}
