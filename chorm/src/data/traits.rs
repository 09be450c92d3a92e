//! Data source trait
//!
//! Query builders only render SQL; a [`DataSource`] executes it. The ClickHouse
//! client implements it in production and tests use an in-memory double.

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::data::error::QueryError;

/// Executes rendered statements
#[async_trait]
pub trait DataSource: Send + Sync + 'static {
    /// Run a SELECT statement and decode every row
    async fn select<T>(&self, sql: &str) -> Result<Vec<T>, QueryError>
    where
        T: DeserializeOwned + Send + 'static;

    /// Count rows of `table` matching `conditions` (a rendered WHERE expression)
    async fn count(&self, table: &str, conditions: &str) -> Result<u64, QueryError>;

    /// Run a statement returning a single scalar as text, `None` when empty
    async fn raw(&self, sql: &str) -> Result<Option<String>, QueryError>;
}
