//! Field conditions
//!
//! A [`FieldCondition`] is one `field <operator> value` leaf of a condition
//! tree. It is usually built from a lookup key such as `"height__gt"`.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};

use crate::data::QueryError;
use crate::model::{FieldSet, Value};

use super::operators::{Operator, resolve_operator};

/// Separator between the field name and the operator name in a lookup key
pub const LOOKUP_SEPARATOR: &str = "__";

/// Operator applied when the key names none
pub const DEFAULT_OPERATOR: &str = "eq";

/// A query that can be embedded as `IN (<subquery>)`
pub trait Subquery: Send + Sync + fmt::Debug {
    fn as_sql(&self) -> Result<String, QueryError>;

    fn box_clone(&self) -> Box<dyn Subquery>;
}

impl Clone for Box<dyn Subquery> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Right-hand side of a field condition
#[derive(Debug, Clone)]
pub enum Operand {
    /// Scalar or array value
    Value(Value),
    /// Inclusive bounds for `between`; `None` is an open side
    Range(Option<Value>, Option<Value>),
    /// Verbatim SQL, for `in`/`not_in`
    Raw(String),
    /// Nested query, for `in`/`not_in`
    Subquery(Box<dyn Subquery>),
}

impl Operand {
    pub fn raw(sql: impl Into<String>) -> Self {
        Operand::Raw(sql.into())
    }

    /// Two-sided range
    pub fn between(low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Operand::Range(Some(low.into()), Some(high.into()))
    }

    /// Range with optional sides
    pub fn range(low: Option<impl Into<Value>>, high: Option<impl Into<Value>>) -> Self {
        Operand::Range(low.map(Into::into), high.map(Into::into))
    }

    pub fn subquery(query: impl Subquery + 'static) -> Self {
        Operand::Subquery(Box::new(query))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Operand::Value(_) => "value",
            Operand::Range(..) => "range",
            Operand::Raw(_) => "raw SQL",
            Operand::Subquery(_) => "subquery",
        }
    }
}

macro_rules! impl_operand_from {
    ($($t:ty),*) => {
        $(impl From<$t> for Operand {
            fn from(value: $t) -> Self {
                Operand::Value(value.into())
            }
        })*
    };
}

impl_operand_from!(
    Value, bool, i8, i16, i32, i64, u8, u16, u32, u64, usize, f32, f64, String, &str, &String,
    NaiveDate, DateTime<Utc>
);

impl<T: Into<Value>> From<Option<T>> for Operand {
    fn from(value: Option<T>) -> Self {
        Operand::Value(value.into())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Operand {
    fn from(value: Vec<T>) -> Self {
        Operand::Value(value.into())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Operand {
    fn from(value: [T; N]) -> Self {
        Operand::Value(value.into())
    }
}

/// One `field <operator> value` condition
#[derive(Debug, Clone)]
pub struct FieldCondition {
    field_name: String,
    operator_name: String,
    operator: Arc<dyn Operator>,
    value: Operand,
}

impl FieldCondition {
    /// Build a condition from a lookup key (`field` or `field__operator`)
    ///
    /// When the suffix after the last `__` is not a registered operator the
    /// whole key is taken as the field name and `eq` is used.
    pub fn parse(key: &str, value: impl Into<Operand>) -> Self {
        if let Some((field_name, operator_name)) = key.rsplit_once(LOOKUP_SEPARATOR)
            && let Some(operator) = resolve_operator(operator_name)
        {
            return Self {
                field_name: field_name.to_string(),
                operator_name: operator_name.to_string(),
                operator,
                value: value.into(),
            };
        }
        Self {
            field_name: key.to_string(),
            operator_name: DEFAULT_OPERATOR.to_string(),
            operator: default_operator(),
            value: value.into(),
        }
    }

    /// Build a condition with an explicit operator name
    pub fn new(
        field_name: impl Into<String>,
        operator_name: &str,
        value: impl Into<Operand>,
    ) -> Result<Self, QueryError> {
        let operator = resolve_operator(operator_name).ok_or_else(|| {
            QueryError::invalid_argument(format!("unknown operator `{}`", operator_name))
        })?;
        Ok(Self {
            field_name: field_name.into(),
            operator_name: operator_name.to_string(),
            operator,
            value: value.into(),
        })
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn operator_name(&self) -> &str {
        &self.operator_name
    }

    pub fn value(&self) -> &Operand {
        &self.value
    }

    pub fn to_sql(&self, fields: &FieldSet) -> Result<String, QueryError> {
        self.operator.to_sql(fields, &self.field_name, &self.value)
    }
}

fn default_operator() -> Arc<dyn Operator> {
    match resolve_operator(DEFAULT_OPERATOR) {
        Some(op) => op,
        // registered operators are never removed
        None => Arc::new(super::operators::SimpleOperator::new("=", Some("IS NULL"))),
    }
}
