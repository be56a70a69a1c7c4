use crate::domain::models::{GlobalClockState, TimeRecord};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::remote_store::{
    ChangeBroadcaster, ChangeEvent, ChangeFilter, ChangeKind, Filter, RemoteStore, Subscription,
    Table, USER_ID_COLUMN,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct InMemoryRemoteStore {
    tables: Mutex<HashMap<Table, Vec<Value>>>,
    changes: ChangeBroadcaster,
    queries: AtomicUsize,
}

impl InMemoryRemoteStore {
    pub fn with_channel_capacity(capacity: usize) -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            changes: ChangeBroadcaster::new(capacity),
            queries: AtomicUsize::new(0),
        }
    }

    fn key_column(table: Table) -> &'static str {
        match table {
            Table::TimeRecords => "id",
            Table::GlobalClock => USER_ID_COLUMN,
        }
    }

    fn row_key(table: Table, row: &Value) -> Option<String> {
        row.get(Self::key_column(table))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned)
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn subscriber_count(&self) -> usize {
        self.changes.subscriber_count()
    }

    pub fn upsert_row(&self, table: Table, row: Value) -> Result<(), InfraError> {
        let key = Self::row_key(table, &row).ok_or_else(|| InfraError::InvalidRow {
            table: table.as_str().to_string(),
            message: format!("{} is required for upsert", Self::key_column(table)),
        })?;

        let kind = {
            let mut tables = self
                .tables
                .lock()
                .map_err(|error| InfraError::Remote(format!("memory store lock poisoned: {error}")))?;
            let rows = tables.entry(table).or_default();
            match rows
                .iter_mut()
                .find(|existing| Self::row_key(table, existing).as_deref() == Some(key.as_str()))
            {
                Some(existing) => {
                    *existing = row.clone();
                    ChangeKind::Update
                }
                None => {
                    rows.push(row.clone());
                    ChangeKind::Insert
                }
            }
        };

        self.changes.publish(ChangeEvent { table, kind, row });
        Ok(())
    }

    pub fn delete_row(&self, table: Table, key: &str) -> Result<bool, InfraError> {
        let removed = {
            let mut tables = self
                .tables
                .lock()
                .map_err(|error| InfraError::Remote(format!("memory store lock poisoned: {error}")))?;
            let Some(rows) = tables.get_mut(&table) else {
                return Ok(false);
            };
            let Some(position) = rows
                .iter()
                .position(|row| Self::row_key(table, row).as_deref() == Some(key.trim()))
            else {
                return Ok(false);
            };
            rows.remove(position)
        };

        self.changes.publish(ChangeEvent {
            table,
            kind: ChangeKind::Delete,
            row: removed,
        });
        Ok(true)
    }

    pub fn upsert_record(&self, record: &TimeRecord) -> Result<(), InfraError> {
        self.upsert_row(Table::TimeRecords, serde_json::to_value(record)?)
    }

    pub fn upsert_clock_state(&self, state: &GlobalClockState) -> Result<(), InfraError> {
        self.upsert_row(Table::GlobalClock, serde_json::to_value(state)?)
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn query(&self, table: Table, filters: &[Filter]) -> Result<Vec<Value>, InfraError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let tables = self
            .tables
            .lock()
            .map_err(|error| InfraError::Remote(format!("memory store lock poisoned: {error}")))?;
        Ok(tables
            .get(&table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| filters.iter().all(|filter| filter.matches(row)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn subscribe(&self, table: Table, filter: Option<ChangeFilter>) -> Subscription {
        self.changes.subscribe(table, filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ClockStatus;
    use crate::infrastructure::remote_store::{
        ChangeNotice, TASK_ID_COLUMN, fetch_clock_state, fetch_records_for_tasks, fetch_task_records,
    };
    use serde_json::json;

    fn record(id: &str, task_id: &str, user_id: &str, total_seconds: u64) -> TimeRecord {
        TimeRecord {
            id: id.to_string(),
            task_id: task_id.to_string(),
            user_id: user_id.to_string(),
            is_running: false,
            started_at: None,
            total_seconds,
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn query_applies_every_filter() {
        let store = InMemoryRemoteStore::default();
        store.upsert_record(&record("r1", "task-1", "alice", 10)).expect("seed r1");
        store.upsert_record(&record("r2", "task-1", "bob", 20)).expect("seed r2");
        store.upsert_record(&record("r3", "task-2", "alice", 30)).expect("seed r3");

        let all = fetch_task_records(&store, "task-1", None).await.expect("query all");
        let alice = fetch_task_records(&store, "task-1", Some("alice")).await.expect("query alice");
        let batch = fetch_records_for_tasks(&store, &["task-1".to_string(), "task-2".to_string()])
            .await
            .expect("batch query");

        assert_eq!(all.len(), 2);
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].total_seconds, 10);
        assert_eq!(batch.len(), 3);
        assert_eq!(store.query_count(), 3);
    }

    #[tokio::test]
    async fn upsert_replaces_by_key_and_publishes_kind() {
        let store = InMemoryRemoteStore::default();
        let mut subscription =
            store.subscribe(Table::TimeRecords, Some(ChangeFilter::eq(TASK_ID_COLUMN, "task-1")));

        store.upsert_record(&record("r1", "task-1", "alice", 10)).expect("insert");
        store.upsert_record(&record("r1", "task-1", "alice", 50)).expect("update");
        assert!(store.delete_row(Table::TimeRecords, "r1").expect("delete"));
        assert!(!store.delete_row(Table::TimeRecords, "r1").expect("second delete"));

        let mut kinds = Vec::new();
        for _ in 0..3 {
            match subscription.next().await {
                Some(ChangeNotice::Changed(event)) => kinds.push(event.kind),
                other => panic!("unexpected notice: {other:?}"),
            }
        }
        assert_eq!(kinds, vec![ChangeKind::Insert, ChangeKind::Update, ChangeKind::Delete]);
        assert!(fetch_task_records(&store, "task-1", None).await.expect("query").is_empty());
    }

    #[tokio::test]
    async fn clock_rows_are_keyed_by_user() {
        let store = InMemoryRemoteStore::default();
        let mut state = GlobalClockState {
            user_id: "alice".to_string(),
            status: ClockStatus::Active,
            last_break_start: None,
        };
        store.upsert_clock_state(&state).expect("insert clock");
        state.status = ClockStatus::ClockedOut;
        store.upsert_clock_state(&state).expect("update clock");

        let loaded = fetch_clock_state(&store, "alice").await.expect("load").expect("exists");
        assert_eq!(loaded.status, ClockStatus::ClockedOut);
        assert!(fetch_clock_state(&store, "bob").await.expect("load bob").is_none());
    }

    #[test]
    fn upsert_without_key_is_rejected() {
        let store = InMemoryRemoteStore::default();
        let error = store
            .upsert_row(Table::TimeRecords, json!({ "task_id": "task-1" }))
            .expect_err("missing id");
        assert!(matches!(error, InfraError::InvalidRow { .. }));
    }

    #[tokio::test]
    async fn malformed_rows_surface_as_invalid_row() {
        let store = InMemoryRemoteStore::default();
        store
            .upsert_row(
                Table::TimeRecords,
                json!({ "id": "r1", "task_id": "task-1", "user_id": "alice", "is_running": "yes" }),
            )
            .expect("seed malformed");
        let error = fetch_task_records(&store, "task-1", None).await.expect_err("decode fails");
        assert!(matches!(error, InfraError::InvalidRow { .. }));
    }
}
