use crate::infrastructure::error::InfraError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const TIMETRACK_JSON: &str = "timetrack.json";
const SUPPORTED_SCHEMA: u64 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TableNames {
    pub time_records: String,
    pub global_clock: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    pub base_url: String,
    pub api_key_env: String,
    pub tables: TableNames,
}

impl BackendConfig {
    pub fn api_key(&self) -> Option<String> {
        std::env::var(self.api_key_env.trim())
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeConfig {
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimeTrackingConfig {
    pub schema: u8,
    pub backend: BackendConfig,
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TimeTrackingConfig {
    pub fn validate(&self) -> Result<(), InfraError> {
        require_non_empty(&self.backend.base_url, "backend.baseUrl")?;
        require_non_empty(&self.backend.api_key_env, "backend.apiKeyEnv")?;
        require_non_empty(&self.backend.tables.time_records, "backend.tables.timeRecords")?;
        require_non_empty(&self.backend.tables.global_clock, "backend.tables.globalClock")?;
        if self.realtime.channel_capacity == 0 {
            return Err(InfraError::InvalidConfig(
                "realtime.channelCapacity must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_config() -> serde_json::Value {
    serde_json::json!({
        "schema": 1,
        "backend": {
            "baseUrl": "http://127.0.0.1:54321",
            "apiKeyEnv": "TASKOPS_API_KEY",
            "tables": {
                "timeRecords": "task_time_tracking",
                "globalClock": "global_clock_status"
            }
        },
        "realtime": {
            "channelCapacity": 256
        },
        "logging": {
            "level": "info",
            "json": false
        }
    })
}

pub fn config_path(config_dir: &Path) -> PathBuf {
    config_dir.join(TIMETRACK_JSON)
}

pub fn ensure_default_config(config_dir: &Path) -> Result<PathBuf, InfraError> {
    fs::create_dir_all(config_dir)?;
    let path = config_path(config_dir);
    if !path.exists() {
        let formatted = serde_json::to_string_pretty(&default_config())?;
        fs::write(&path, format!("{formatted}\n"))?;
    }
    Ok(path)
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != SUPPORTED_SCHEMA {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_config(config_dir: &Path) -> Result<TimeTrackingConfig, InfraError> {
    let path = config_path(config_dir);
    let config: TimeTrackingConfig = serde_json::from_value(read_config(&path)?).map_err(|error| {
        InfraError::InvalidConfig(format!("invalid structure in {}: {error}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}

fn require_non_empty(value: &str, field_name: &str) -> Result<(), InfraError> {
    if value.trim().is_empty() {
        return Err(InfraError::InvalidConfig(format!("{field_name} must not be empty")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    static NEXT_DIR: AtomicU64 = AtomicU64::new(1);

    fn scratch_dir(name: &str) -> PathBuf {
        let sequence = NEXT_DIR.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!(
            "taskops-timetrack-{name}-{}-{sequence}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn default_config_is_written_once_and_loads() {
        let dir = scratch_dir("defaults");
        let path = ensure_default_config(&dir).expect("write defaults");
        let config = load_config(&dir).expect("load defaults");

        assert_eq!(config.schema, 1);
        assert_eq!(config.backend.tables.time_records, "task_time_tracking");
        assert_eq!(config.realtime.channel_capacity, 256);
        assert_eq!(config.logging, LoggingConfig::default());

        fs::write(&path, "{\"schema\": 1}\n").expect("overwrite");
        ensure_default_config(&dir).expect("second ensure keeps file");
        assert_eq!(fs::read_to_string(&path).expect("read back"), "{\"schema\": 1}\n");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn unsupported_schema_is_rejected() {
        let dir = scratch_dir("schema");
        fs::create_dir_all(&dir).expect("create dir");
        let mut value = default_config();
        value["schema"] = serde_json::json!(2);
        fs::write(config_path(&dir), value.to_string()).expect("write config");

        let error = load_config(&dir).expect_err("schema 2 rejected");
        assert!(matches!(error, InfraError::InvalidConfig(_)));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn zero_channel_capacity_is_rejected() {
        let dir = scratch_dir("capacity");
        fs::create_dir_all(&dir).expect("create dir");
        let mut value = default_config();
        value["realtime"]["channelCapacity"] = serde_json::json!(0);
        fs::write(config_path(&dir), value.to_string()).expect("write config");

        assert!(load_config(&dir).is_err());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn logging_section_is_optional() {
        let dir = scratch_dir("logging");
        fs::create_dir_all(&dir).expect("create dir");
        let mut value = default_config();
        value
            .as_object_mut()
            .expect("config object")
            .remove("logging");
        fs::write(config_path(&dir), value.to_string()).expect("write config");

        let config = load_config(&dir).expect("load without logging");
        assert_eq!(config.logging.level, "info");

        let _ = fs::remove_dir_all(&dir);
    }
}
