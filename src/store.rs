//! Persistent store clients used by the data verifier.
//!
//! - [`PostgrestClient`]: Supabase / PostgREST over HTTP
//! - [`MemoryStore`]: in-process tables for tests and demos
//! - [`LazyStore`]: creates a client once, on first use, from a factory

use once_cell::sync::OnceCell;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// A stored row
pub type Record = Map<String, Value>;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Store failures; messages embed the underlying cause
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store not configured")]
    NotConfigured,

    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    #[error("Store returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid store response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        StoreError::Http(err)
    }
}

/// Read-only access to a table store
pub trait StoreClient: Send + Sync {
    /// Rows of `table` whose columns equal every value in `conditions`
    fn select_eq(&self, table: &str, conditions: &Record) -> StoreResult<Vec<Record>>;
}

/// Supabase / PostgREST client
pub struct PostgrestClient {
    base_url: String,
    key: String,
    http: reqwest::blocking::Client,
}

impl PostgrestClient {
    pub fn new(base_url: impl Into<String>, key: impl Into<String>) -> StoreResult<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            key: key.into(),
            http,
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }
}

impl fmt::Debug for PostgrestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgrestClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl StoreClient for PostgrestClient {
    fn select_eq(&self, table: &str, conditions: &Record) -> StoreResult<Vec<Record>> {
        let mut query: Vec<(String, String)> = vec![("select".to_string(), "*".to_string())];
        for (column, value) in conditions {
            query.push((column.clone(), eq_filter(value)));
        }

        tracing::debug!(table, filters = conditions.len(), "querying store");
        let response = self
            .http
            .get(self.table_url(table))
            .query(&query)
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
            .header("Accept", "application/json")
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let rows: Vec<Value> = response.json()?;
        rows.into_iter()
            .map(|row| match row {
                Value::Object(record) => Ok(record),
                other => Err(StoreError::Decode(format!("expected object row, got {}", other))),
            })
            .collect()
    }
}

/// PostgREST equality filter for a JSON value
fn eq_filter(value: &Value) -> String {
    match value {
        Value::Null => "is.null".to_string(),
        Value::String(s) => format!("eq.{}", s),
        other => format!("eq.{}", other),
    }
}

/// In-memory tables
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: HashMap<String, Vec<Record>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row to `table`
    pub fn insert(&mut self, table: impl Into<String>, record: Record) -> &mut Self {
        self.tables.entry(table.into()).or_default().push(record);
        self
    }

    /// Builder form of [`insert`](Self::insert) taking a JSON object
    pub fn with_row(mut self, table: impl Into<String>, row: Value) -> Self {
        if let Value::Object(record) = row {
            self.insert(table, record);
        }
        self
    }
}

impl StoreClient for MemoryStore {
    fn select_eq(&self, table: &str, conditions: &Record) -> StoreResult<Vec<Record>> {
        let rows = self.tables.get(table).map(Vec::as_slice).unwrap_or_default();
        Ok(rows
            .iter()
            .filter(|row| conditions.iter().all(|(k, v)| row.get(k) == Some(v)))
            .cloned()
            .collect())
    }
}

type StoreFactory = Box<dyn Fn() -> StoreResult<Box<dyn StoreClient>> + Send + Sync>;

/// A store client created once on first use and shared read-only afterwards
pub struct LazyStore {
    factory: Option<StoreFactory>,
    client: OnceCell<Box<dyn StoreClient>>,
}

impl LazyStore {
    /// No store: every lookup reports "not configured"
    pub fn unconfigured() -> Self {
        Self {
            factory: None,
            client: OnceCell::new(),
        }
    }

    /// Create the client with `factory` on first use
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> StoreResult<Box<dyn StoreClient>> + Send + Sync + 'static,
    {
        Self {
            factory: Some(Box::new(factory)),
            client: OnceCell::new(),
        }
    }

    /// Use an already constructed client
    pub fn with_client(client: impl StoreClient + 'static) -> Self {
        let cell = OnceCell::new();
        let _ = cell.set(Box::new(client) as Box<dyn StoreClient>);
        Self {
            factory: None,
            client: cell,
        }
    }

    /// PostgREST client when both endpoint and credential are present
    pub fn postgrest(url: Option<&str>, key: Option<&str>) -> Self {
        match (url, key) {
            (Some(url), Some(key)) => {
                let (url, key) = (url.to_string(), key.to_string());
                Self::new(move || {
                    let client = PostgrestClient::new(url.clone(), key.clone())?;
                    Ok(Box::new(client) as Box<dyn StoreClient>)
                })
            }
            _ => Self::unconfigured(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.factory.is_some() || self.client.get().is_some()
    }

    /// The shared client, creating it on first call
    pub fn client(&self) -> StoreResult<&dyn StoreClient> {
        let client = self.client.get_or_try_init(|| match &self.factory {
            Some(factory) => {
                tracing::debug!("initializing store client");
                factory()
            }
            None => Err(StoreError::NotConfigured),
        })?;
        Ok(client.as_ref())
    }
}

impl Default for LazyStore {
    fn default() -> Self {
        Self::unconfigured()
    }
}

impl fmt::Debug for LazyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyStore")
            .field("configured", &self.is_configured())
            .field("initialized", &self.client.get().is_some())
            .finish()
    }
}
