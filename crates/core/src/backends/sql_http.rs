use crate::error::PipelineError;
use crate::models::{CellValue, Column, Relation};
use crate::traits::StorageBackend;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Mutex;
use tracing::warn;

/// Tabular storage connector speaking a SQL-over-HTTP gateway protocol:
/// `POST {endpoint}/query` with `{"query": ...}`, answered with
/// `{"columns": [...], "rows": [[...], ...]}`.
///
/// A failed request is retried exactly once with a fresh connection,
/// then surfaced as a storage error. No backoff, no further attempts.
pub struct SqlHttpStore {
    endpoint: String,
    username: String,
    password: String,
    client: Mutex<Client>,
}

impl SqlHttpStore {
    pub fn new(
        endpoint: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            username: username.into(),
            password: password.into(),
            client: Mutex::new(Client::new()),
        }
    }

    fn query_url(&self) -> String {
        format!("{}/query", self.endpoint)
    }

    fn current_client(&self) -> Client {
        self.client
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    fn reconnect(&self) -> Client {
        let fresh = Client::new();
        if let Ok(mut guard) = self.client.lock() {
            *guard = fresh.clone();
        }
        fresh
    }

    async fn try_fetch(&self, client: &Client, query: &str) -> Result<Relation, PipelineError> {
        let response = client
            .post(self.query_url())
            .basic_auth(&self.username, Some(&self.password))
            .json(&json!({ "query": query }))
            .send()
            .await
            .map_err(|error| PipelineError::Storage(error.to_string()))?;

        if !response.status().is_success() {
            return Err(PipelineError::Storage(format!(
                "query failed with {}",
                response.status()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|error| PipelineError::Storage(error.to_string()))?;
        parse_relation(&body)
    }
}

#[async_trait]
impl StorageBackend for SqlHttpStore {
    async fn fetch(&self, query: &str) -> Result<Relation, PipelineError> {
        match self.try_fetch(&self.current_client(), query).await {
            Ok(relation) => Ok(relation),
            Err(first_error) => {
                warn!(error = %first_error, "storage fetch failed, reconnecting once");
                let fresh = self.reconnect();
                self.try_fetch(&fresh, query).await
            }
        }
    }
}

/// Decode a gateway response body into a typed relation. JSON numbers
/// map to numeric cells, strings to text, null to null; booleans are
/// kept as text.
pub fn parse_relation(body: &Value) -> Result<Relation, PipelineError> {
    let names = body
        .pointer("/columns")
        .and_then(Value::as_array)
        .ok_or_else(|| PipelineError::Storage("response carried no columns".to_string()))?
        .iter()
        .map(|name| name.as_str().unwrap_or_default().to_string())
        .collect::<Vec<_>>();

    let rows = body
        .pointer("/rows")
        .and_then(Value::as_array)
        .ok_or_else(|| PipelineError::Storage("response carried no rows".to_string()))?;

    let mut columns: Vec<Column> = names
        .into_iter()
        .map(|name| Column {
            name,
            values: Vec::with_capacity(rows.len()),
        })
        .collect();

    for row in rows {
        let cells = row
            .as_array()
            .ok_or_else(|| PipelineError::Storage("row is not an array".to_string()))?;
        if cells.len() != columns.len() {
            return Err(PipelineError::Storage(format!(
                "row has {} cells, expected {}",
                cells.len(),
                columns.len()
            )));
        }
        for (column, cell) in columns.iter_mut().zip(cells) {
            column.values.push(decode_cell(cell));
        }
    }

    Ok(Relation { columns })
}

fn decode_cell(cell: &Value) -> CellValue {
    match cell {
        Value::Null => CellValue::Null,
        Value::Number(number) => number
            .as_f64()
            .map(CellValue::Number)
            .unwrap_or(CellValue::Null),
        Value::String(text) => CellValue::Text(text.clone()),
        Value::Bool(flag) => CellValue::Text(flag.to_string()),
        other => CellValue::Text(other.to_string()),
    }
}
