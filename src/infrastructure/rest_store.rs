use crate::infrastructure::config::{TableNames, TimeTrackingConfig};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::remote_store::{
    ChangeBroadcaster, ChangeEvent, ChangeFilter, Filter, RemoteStore, Subscription, Table,
};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;
use url::Url;

const REST_PATH: [&str; 2] = ["rest", "v1"];

/// No push channel of its own; a realtime bridge feeds changes via [`Self::publish`].
#[derive(Debug, Clone)]
pub struct RestRemoteStore {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
    tables: TableNames,
    changes: ChangeBroadcaster,
}

impl RestRemoteStore {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        tables: TableNames,
        channel_capacity: usize,
    ) -> Result<Self, InfraError> {
        let base_url = Url::parse(base_url.trim()).map_err(|error| {
            InfraError::InvalidConfig(format!("invalid backend base url '{base_url}': {error}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(InfraError::InvalidConfig(format!(
                "backend base url '{base_url}' cannot be a base"
            )));
        }
        Ok(Self {
            client: Client::new(),
            base_url,
            api_key,
            tables,
            changes: ChangeBroadcaster::new(channel_capacity),
        })
    }

    pub fn from_config(config: &TimeTrackingConfig) -> Result<Self, InfraError> {
        Self::new(
            &config.backend.base_url,
            config.backend.api_key(),
            config.backend.tables.clone(),
            config.realtime.channel_capacity,
        )
    }

    pub fn publish(&self, event: ChangeEvent) {
        self.changes.publish(event);
    }

    fn table_name(&self, table: Table) -> &str {
        match table {
            Table::TimeRecords => &self.tables.time_records,
            Table::GlobalClock => &self.tables.global_clock,
        }
    }

    fn table_endpoint(&self, table: Table) -> Result<Url, InfraError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| InfraError::InvalidConfig("backend base url cannot be a base".to_string()))?;
            segments.pop_if_empty();
            segments.extend(REST_PATH);
            segments.push(self.table_name(table));
        }
        Ok(url)
    }

    fn remote_http_error(table: &str, status: reqwest::StatusCode, body: &str) -> InfraError {
        let message = if body.trim().is_empty() {
            format!("query on {table} failed: http {}", status.as_u16())
        } else {
            format!("query on {table} failed: http {}; body={body}", status.as_u16())
        };
        InfraError::Remote(message)
    }
}

pub fn filter_params(filters: &[Filter]) -> Vec<(String, String)> {
    filters
        .iter()
        .map(|filter| match filter {
            Filter::Eq { column, value } => (column.clone(), format!("eq.{value}")),
            Filter::In { column, values } => {
                let list = values
                    .iter()
                    .map(|value| quote_list_value(value))
                    .collect::<Vec<_>>()
                    .join(",");
                (column.clone(), format!("in.({list})"))
            }
        })
        .collect()
}

fn quote_list_value(value: &str) -> String {
    let reserved = value
        .chars()
        .any(|ch| matches!(ch, ',' | '(' | ')' | '"' | '\\') || ch.is_whitespace());
    if !reserved {
        return value.to_string();
    }
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

#[async_trait]
impl RemoteStore for RestRemoteStore {
    async fn query(&self, table: Table, filters: &[Filter]) -> Result<Vec<Value>, InfraError> {
        let table_name = self.table_name(table).to_string();
        let endpoint = self.table_endpoint(table)?;
        let params = filter_params(filters);
        debug!(table = %table_name, filters = params.len(), "querying backend");

        let mut request = self
            .client
            .get(endpoint)
            .query(&[("select", "*")])
            .query(&params);
        if let Some(api_key) = self.api_key.as_deref() {
            request = request.header("apikey", api_key).bearer_auth(api_key);
        }

        let response = request.send().await.map_err(|error| {
            InfraError::Remote(format!("network error while querying {table_name}: {error}"))
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|error| {
            InfraError::Remote(format!("failed reading {table_name} response: {error}"))
        })?;

        if !status.is_success() {
            return Err(Self::remote_http_error(&table_name, status, &body));
        }

        let rows: Vec<Value> = serde_json::from_str(&body).map_err(|error| {
            InfraError::Remote(format!("invalid {table_name} payload: {error}; body={body}"))
        })?;
        Ok(rows)
    }

    fn subscribe(&self, table: Table, filter: Option<ChangeFilter>) -> Subscription {
        self.changes.subscribe(table, filter)
    }
}
