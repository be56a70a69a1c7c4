use crate::domain::models::{GlobalClockState, TimeRecord};
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::broadcast;

pub const TASK_ID_COLUMN: &str = "task_id";
pub const USER_ID_COLUMN: &str = "user_id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    TimeRecords,
    GlobalClock,
}

impl Table {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TimeRecords => "time_records",
            Self::GlobalClock => "global_clock",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Eq { column: String, value: String },
    In { column: String, values: Vec<String> },
}

impl Filter {
    pub fn eq(column: &str, value: &str) -> Self {
        Self::Eq {
            column: column.to_string(),
            value: value.to_string(),
        }
    }

    pub fn is_in(column: &str, values: &[String]) -> Self {
        Self::In {
            column: column.to_string(),
            values: values.to_vec(),
        }
    }

    pub fn matches(&self, row: &Value) -> bool {
        match self {
            Self::Eq { column, value } => column_str(row, column) == Some(value.as_str()),
            Self::In { column, values } => column_str(row, column)
                .map(|actual| values.iter().any(|value| value == actual))
                .unwrap_or(false),
        }
    }
}

/// Equality only; the realtime layer cannot filter on `IN`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeFilter {
    pub column: String,
    pub value: String,
}

impl ChangeFilter {
    pub fn eq(column: &str, value: &str) -> Self {
        Self {
            column: column.to_string(),
            value: value.to_string(),
        }
    }

    pub fn matches(&self, row: &Value) -> bool {
        column_str(row, &self.column) == Some(self.value.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub table: Table,
    pub kind: ChangeKind,
    pub row: Value,
}

impl ChangeEvent {
    pub fn column(&self, column: &str) -> Option<&str> {
        column_str(&self.row, column)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChangeNotice {
    Changed(ChangeEvent),
    Lagged(u64),
}

#[derive(Debug, Clone)]
pub struct ChangeBroadcaster {
    sender: broadcast::Sender<ChangeEvent>,
}

impl ChangeBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: ChangeEvent) {
        // No subscribers is not an error.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self, table: Table, filter: Option<ChangeFilter>) -> Subscription {
        Subscription {
            table,
            filter,
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ChangeBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

#[derive(Debug)]
pub struct Subscription {
    table: Table,
    filter: Option<ChangeFilter>,
    receiver: broadcast::Receiver<ChangeEvent>,
}

impl Subscription {
    pub fn table(&self) -> Table {
        self.table
    }

    pub async fn next(&mut self) -> Option<ChangeNotice> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if event.table != self.table {
                        continue;
                    }
                    if let Some(filter) = &self.filter {
                        if !filter.matches(&event.row) {
                            continue;
                        }
                    }
                    return Some(ChangeNotice::Changed(event));
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    return Some(ChangeNotice::Lagged(skipped));
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn query(&self, table: Table, filters: &[Filter]) -> Result<Vec<Value>, InfraError>;

    fn subscribe(&self, table: Table, filter: Option<ChangeFilter>) -> Subscription;
}

pub async fn fetch_task_records<S>(
    store: &S,
    task_id: &str,
    user_id: Option<&str>,
) -> Result<Vec<TimeRecord>, InfraError>
where
    S: RemoteStore + ?Sized,
{
    let mut filters = vec![Filter::eq(TASK_ID_COLUMN, task_id)];
    if let Some(user_id) = user_id {
        filters.push(Filter::eq(USER_ID_COLUMN, user_id));
    }
    let rows = store.query(Table::TimeRecords, &filters).await?;
    decode_records(rows)
}

pub async fn fetch_records_for_tasks<S>(
    store: &S,
    task_ids: &[String],
) -> Result<Vec<TimeRecord>, InfraError>
where
    S: RemoteStore + ?Sized,
{
    if task_ids.is_empty() {
        return Ok(Vec::new());
    }
    let rows = store
        .query(Table::TimeRecords, &[Filter::is_in(TASK_ID_COLUMN, task_ids)])
        .await?;
    decode_records(rows)
}

pub async fn fetch_clock_state<S>(
    store: &S,
    user_id: &str,
) -> Result<Option<GlobalClockState>, InfraError>
where
    S: RemoteStore + ?Sized,
{
    let rows = store
        .query(Table::GlobalClock, &[Filter::eq(USER_ID_COLUMN, user_id)])
        .await?;
    let states: Vec<GlobalClockState> = decode_rows(Table::GlobalClock, rows)?;
    let state = states.into_iter().next();
    if let Some(state) = &state {
        state.validate().map_err(|message| invalid_row(Table::GlobalClock, message))?;
    }
    Ok(state)
}

fn decode_records(rows: Vec<Value>) -> Result<Vec<TimeRecord>, InfraError> {
    let records: Vec<TimeRecord> = decode_rows(Table::TimeRecords, rows)?;
    for record in &records {
        record
            .validate()
            .map_err(|message| invalid_row(Table::TimeRecords, message))?;
    }
    Ok(records)
}

fn decode_rows<T: DeserializeOwned>(table: Table, rows: Vec<Value>) -> Result<Vec<T>, InfraError> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(row).map_err(|error| invalid_row(table, error.to_string()))
        })
        .collect()
}

fn invalid_row(table: Table, message: String) -> InfraError {
    InfraError::InvalidRow {
        table: table.as_str().to_string(),
        message,
    }
}

fn column_str<'a>(row: &'a Value, column: &str) -> Option<&'a str> {
    row.get(column).and_then(Value::as_str)
}
