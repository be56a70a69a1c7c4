use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// `total_seconds` only covers completed intervals; the elapsing one is
/// derived from `started_at` while `is_running` holds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeRecord {
    pub id: String,
    pub task_id: String,
    pub user_id: String,
    pub is_running: bool,
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub total_seconds: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl TimeRecord {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "time_record.id")?;
        validate_non_empty(&self.task_id, "time_record.task_id")?;
        validate_non_empty(&self.user_id, "time_record.user_id")?;
        Ok(())
    }

    pub fn belongs_to(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }

    pub fn live_start(&self) -> Option<DateTime<Utc>> {
        if self.is_running { self.started_at } else { None }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ClockStatus {
    Active,
    Break,
    ClockedOut,
}

impl ClockStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Break => "break",
            Self::ClockedOut => "clocked_out",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GlobalClockState {
    pub user_id: String,
    pub status: ClockStatus,
    #[serde(default)]
    pub last_break_start: Option<DateTime<Utc>>,
}

impl GlobalClockState {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.user_id, "clock_state.user_id")
    }

    pub fn current_break_start(&self) -> Option<DateTime<Utc>> {
        match self.status {
            ClockStatus::Break => self.last_break_start,
            ClockStatus::Active | ClockStatus::ClockedOut => None,
        }
    }
}

fn null_as_zero<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u64>::deserialize(deserializer)?.unwrap_or_default())
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}
