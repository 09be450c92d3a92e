//! ClickHouse data source
//!
//! Executes rendered statements over the ClickHouse HTTP interface.
//! Rows are fetched as `JSONEachRow` and decoded with serde, so any
//! `Deserialize` type (or a JSON map) can be a row.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use clickhouse::Client;
use serde::de::DeserializeOwned;

use crate::core::config::ClickhouseConfig;
use crate::data::error::QueryError;
use crate::data::traits::DataSource;
use crate::utils::sql::{escape_placeholders, quote_identifier};

const ROW_FORMAT: &str = "JSONEachRow";
const SCALAR_FORMAT: &str = "TabSeparated";

/// [`DataSource`] backed by the `clickhouse` HTTP client
///
/// The client pools connections with HTTP keep-alive, so one source can be
/// shared across tasks behind an `Arc`.
#[derive(Clone)]
pub struct ClickhouseSource {
    client: Client,
    timeout_secs: u64,
}

impl ClickhouseSource {
    /// Build a source from resolved settings; does not connect
    pub fn new(config: &ClickhouseConfig) -> Self {
        let mut client = Client::default()
            .with_url(&config.url)
            .with_database(&config.database);

        if let Some(ref user) = config.user {
            client = client.with_user(user);
        }
        if let Some(ref password) = config.password {
            client = client.with_password(password);
        }
        if config.compression {
            client = client.with_compression(clickhouse::Compression::Lz4);
        }

        // 64-bit integers as JSON numbers, not strings
        client = client.with_option("output_format_json_quote_64bit_integers", "0");

        tracing::debug!(
            url = %config.url,
            database = %config.database,
            compression = %config.compression,
            timeout_secs = config.timeout_secs,
            "ClickhouseSource created"
        );

        Self {
            client,
            timeout_secs: config.timeout_secs,
        }
    }

    /// Get the ClickHouse client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Health check - verify connection to ClickHouse
    pub async fn health_check(&self) -> Result<(), QueryError> {
        let query = self.client.query("SELECT 1");
        self.with_timeout(async { query.execute().await.map_err(QueryError::from) })
            .await
    }

    async fn with_timeout<T, F>(&self, fut: F) -> Result<T, QueryError>
    where
        F: Future<Output = Result<T, QueryError>>,
    {
        tokio::time::timeout(Duration::from_secs(self.timeout_secs), fut)
            .await
            .map_err(|_| QueryError::Timeout {
                timeout_secs: self.timeout_secs,
            })?
    }

    /// Fetch the whole response body in `format`
    async fn fetch_text(&self, sql: &str, format: &str) -> Result<String, QueryError> {
        let query = self.client.query(&escape_placeholders(sql));
        let body = self
            .with_timeout(async {
                let mut cursor = query.fetch_bytes(format)?;
                cursor.collect().await.map_err(QueryError::from)
            })
            .await?;
        String::from_utf8(body.to_vec())
            .map_err(|e| QueryError::Source(format!("response is not valid UTF-8: {}", e)))
    }
}

impl std::fmt::Debug for ClickhouseSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClickhouseSource")
            .field("timeout_secs", &self.timeout_secs)
            .finish_non_exhaustive()
    }
}

/// Decode one JSON object per non-empty line
fn decode_rows<T: DeserializeOwned>(body: &str) -> Result<Vec<T>, QueryError> {
    body.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(QueryError::from))
        .collect()
}

#[async_trait]
impl DataSource for ClickhouseSource {
    async fn select<T>(&self, sql: &str) -> Result<Vec<T>, QueryError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let body = self.fetch_text(sql, ROW_FORMAT).await?;
        let rows = decode_rows(&body)?;
        tracing::debug!(sql = %sql, rows = rows.len(), "Selected rows");
        Ok(rows)
    }

    async fn count(&self, table: &str, conditions: &str) -> Result<u64, QueryError> {
        let sql = format!(
            "SELECT count() FROM {} WHERE {}",
            quote_identifier(table),
            conditions
        );
        let query = self.client.query(&escape_placeholders(&sql));
        let count = self
            .with_timeout(async { query.fetch_one::<u64>().await.map_err(QueryError::from) })
            .await?;
        tracing::debug!(table = %table, count, "Counted rows");
        Ok(count)
    }

    async fn raw(&self, sql: &str) -> Result<Option<String>, QueryError> {
        let body = self.fetch_text(sql, SCALAR_FORMAT).await?;
        let value = body.trim();
        tracing::debug!(sql = %sql, empty = value.is_empty(), "Raw query finished");
        Ok((!value.is_empty()).then(|| value.to_string()))
    }
}
