//! Test fixtures: sample models and an in-memory data source

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::data::{DataSource, QueryError};
use crate::model::{
    DateField, Engine, FieldSet, FloatField, IntField, Model, NullableField, StringField,
};
use crate::utils::sql::quote_identifier;

#[allow(dead_code)] // decoded from rows; tests read only some fields
#[derive(Debug, Clone, Deserialize)]
pub struct Person {
    pub first_name: String,
    pub last_name: String,
    pub birthday: String,
    pub height: f32,
    pub passport: Option<u32>,
}

static PERSON_FIELDS: LazyLock<FieldSet> = LazyLock::new(|| {
    FieldSet::new("person")
        .with("first_name", StringField)
        .with("last_name", StringField)
        .with("birthday", DateField)
        .with("height", FloatField::float32())
        .with("passport", NullableField::new(IntField::uint32()))
});

impl Model for Person {
    fn table_name() -> &'static str {
        "person"
    }

    fn fields() -> &'static FieldSet {
        &PERSON_FIELDS
    }
}

#[allow(dead_code)]
#[derive(Debug, Clone, Deserialize)]
pub struct Visit {
    pub id: u32,
    pub sign: i8,
}

static VISIT_FIELDS: LazyLock<FieldSet> = LazyLock::new(|| {
    FieldSet::new("visit")
        .with("id", IntField::uint32())
        .with("sign", IntField::int8())
});

impl Model for Visit {
    fn table_name() -> &'static str {
        "visit"
    }

    fn fields() -> &'static FieldSet {
        &VISIT_FIELDS
    }

    fn engine() -> Engine {
        Engine::CollapsingMergeTree
    }
}

/// Data source over a fixed list of JSON rows that records every statement
///
/// Only `LIMIT offset, count` is interpreted; conditions are ignored.
#[derive(Debug, Default)]
pub struct MemorySource {
    rows: Vec<serde_json::Value>,
    statements: Mutex<Vec<String>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<serde_json::Value>) -> Self {
        Self {
            rows,
            statements: Mutex::new(Vec::new()),
        }
    }

    /// `n` person rows named `person0`, `person1`, ...
    pub fn people(n: usize) -> Arc<Self> {
        let rows = (0..n)
            .map(|i| {
                serde_json::json!({
                    "first_name": format!("person{}", i),
                    "last_name": "test",
                    "birthday": "1980-01-01",
                    "height": 1.75,
                    "passport": i,
                })
            })
            .collect();
        Arc::new(Self::with_rows(rows))
    }

    pub fn last_statement(&self) -> Option<String> {
        self.statements.lock().last().cloned()
    }

    fn record(&self, statement: String) {
        self.statements.lock().push(statement);
    }

    /// Rows selected by the trailing `LIMIT offset, count` of `sql`
    fn window(&self, sql: &str) -> &[serde_json::Value] {
        let len = self.rows.len();
        match parse_limit(sql) {
            Some((offset, count)) => {
                let start = offset.min(len);
                let end = start.saturating_add(count).min(len);
                &self.rows[start..end]
            }
            None => &self.rows,
        }
    }
}

fn parse_limit(sql: &str) -> Option<(usize, usize)> {
    let idx = sql.rfind("\nLIMIT ")?;
    let (offset, rest) = sql[idx + "\nLIMIT ".len()..].split_once(", ")?;
    let count: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    Some((offset.parse().ok()?, count.parse().ok()?))
}

#[async_trait]
impl DataSource for MemorySource {
    async fn select<T>(&self, sql: &str) -> Result<Vec<T>, QueryError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.record(sql.to_string());
        self.window(sql)
            .iter()
            .map(|row| serde_json::from_value(row.clone()).map_err(QueryError::from))
            .collect()
    }

    async fn count(&self, table: &str, conditions: &str) -> Result<u64, QueryError> {
        self.record(format!(
            "COUNT {} WHERE {}",
            quote_identifier(table),
            conditions
        ));
        Ok(self.rows.len() as u64)
    }

    async fn raw(&self, sql: &str) -> Result<Option<String>, QueryError> {
        self.record(sql.to_string());
        Ok(Some(self.window(sql).len().to_string()))
    }
}
