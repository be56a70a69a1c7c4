use crate::domain::elapsed::{calculate_total_time, whole_seconds_between};
use crate::domain::models::{ClockStatus, GlobalClockState, TimeRecord};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerClock {
    pub user_id: String,
    pub clock: Option<GlobalClockState>,
}

impl ViewerClock {
    pub fn new(user_id: impl Into<String>, clock: Option<GlobalClockState>) -> Self {
        Self {
            user_id: user_id.into(),
            clock,
        }
    }

    pub fn status(&self) -> Option<ClockStatus> {
        self.clock.as_ref().map(|clock| clock.status)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectiveStatus {
    Stopped,
    RunningVisible,
    RunningSuppressedByBreak,
    RunningSuppressedByClockOut,
}

impl EffectiveStatus {
    pub fn is_running(self) -> bool {
        matches!(self, Self::RunningVisible)
    }
}

pub fn effective_status(record: &TimeRecord, viewer: &ViewerClock) -> EffectiveStatus {
    if !record.is_running {
        return EffectiveStatus::Stopped;
    }
    if !record.belongs_to(&viewer.user_id) {
        return EffectiveStatus::RunningVisible;
    }
    match viewer.status() {
        None | Some(ClockStatus::Active) => EffectiveStatus::RunningVisible,
        Some(ClockStatus::Break) => EffectiveStatus::RunningSuppressedByBreak,
        Some(ClockStatus::ClockedOut) => EffectiveStatus::RunningSuppressedByClockOut,
    }
}

/// Only the viewer's own running records are touched. On break, the time
/// between `started_at` and the break start is folded into the total.
pub fn reconcile_record(record: &TimeRecord, viewer: &ViewerClock) -> TimeRecord {
    let mut reconciled = record.clone();
    match effective_status(record, viewer) {
        EffectiveStatus::Stopped | EffectiveStatus::RunningVisible => {}
        EffectiveStatus::RunningSuppressedByBreak => {
            let break_start = viewer.clock.as_ref().and_then(GlobalClockState::current_break_start);
            if let (Some(started_at), Some(break_start)) = (record.started_at, break_start) {
                if started_at < break_start {
                    reconciled.total_seconds = record
                        .total_seconds
                        .saturating_add(whole_seconds_between(started_at, break_start));
                }
            }
            reconciled.is_running = false;
        }
        EffectiveStatus::RunningSuppressedByClockOut => {
            reconciled.is_running = false;
        }
    }
    reconciled
}

pub fn reconcile_records(records: &[TimeRecord], viewer: &ViewerClock) -> Vec<TimeRecord> {
    records
        .iter()
        .map(|record| reconcile_record(record, viewer))
        .collect()
}

/// Latest `updated_at` wins per (task, user); unstamped rows lose and ties
/// keep the earlier row. Fetch order is preserved.
pub fn dedup_records(records: Vec<TimeRecord>) -> Vec<TimeRecord> {
    let mut positions: HashMap<(String, String), usize> = HashMap::new();
    let mut kept: Vec<TimeRecord> = Vec::with_capacity(records.len());

    for record in records {
        let key = (record.task_id.clone(), record.user_id.clone());
        match positions.get(&key) {
            Some(&index) => {
                if record.updated_at > kept[index].updated_at {
                    kept[index] = record;
                }
            }
            None => {
                positions.insert(key, kept.len());
                kept.push(record);
            }
        }
    }
    kept
}

pub fn live_seconds(record: &TimeRecord, now: DateTime<Utc>) -> u64 {
    calculate_total_time(record.total_seconds, record.is_running, record.started_at, now)
}

pub fn sum_live_seconds<'a>(
    records: impl IntoIterator<Item = &'a TimeRecord>,
    now: DateTime<Utc>,
) -> u64 {
    records
        .into_iter()
        .fold(0u64, |total, record| total.saturating_add(live_seconds(record, now)))
}

pub fn any_running<'a>(records: impl IntoIterator<Item = &'a TimeRecord>) -> bool {
    records.into_iter().any(|record| record.is_running)
}
