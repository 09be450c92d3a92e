//! Comparison operators
//!
//! An operator renders one `field <op> value` condition. Operators are
//! stateless and looked up by name from a process-wide registry, seeded with
//! the builtins on first access. Applications may register their own.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;

use crate::data::QueryError;
use crate::model::{Field, FieldSet, Value};
use crate::utils::sql::{NULL_LITERAL, comma_join, escape_like_literal};

use super::condition::Operand;

/// Renders a single field condition as SQL
pub trait Operator: Send + Sync + Debug {
    fn to_sql(
        &self,
        fields: &FieldSet,
        field_name: &str,
        operand: &Operand,
    ) -> Result<String, QueryError>;
}

static OPERATORS: LazyLock<RwLock<HashMap<String, Arc<dyn Operator>>>> =
    LazyLock::new(|| RwLock::new(builtin_operators()));

/// Register an operator under `name`, replacing any previous one
pub fn register_operator(name: impl Into<String>, operator: Arc<dyn Operator>) {
    let name = name.into();
    tracing::trace!(operator = %name, "Registering operator");
    OPERATORS.write().insert(name, operator);
}

/// Look up an operator by name
pub fn resolve_operator(name: &str) -> Option<Arc<dyn Operator>> {
    OPERATORS.read().get(name).cloned()
}

fn builtin_operators() -> HashMap<String, Arc<dyn Operator>> {
    let mut operators: HashMap<String, Arc<dyn Operator>> = HashMap::new();
    let mut add = |name: &str, operator: Arc<dyn Operator>| {
        operators.insert(name.to_string(), operator);
    };
    let in_operator: Arc<dyn Operator> = Arc::new(InOperator);

    add("eq", Arc::new(SimpleOperator::new("=", Some("IS NULL"))));
    add("ne", Arc::new(SimpleOperator::new("!=", Some("IS NOT NULL"))));
    add("gt", Arc::new(SimpleOperator::new(">", None)));
    add("gte", Arc::new(SimpleOperator::new(">=", None)));
    add("lt", Arc::new(SimpleOperator::new("<", None)));
    add("lte", Arc::new(SimpleOperator::new("<=", None)));
    add("between", Arc::new(BetweenOperator));
    add("in", in_operator.clone());
    add("not_in", Arc::new(NotOperator::new(in_operator)));
    add("contains", Arc::new(LikeOperator::new("%{}%", true)));
    add("startswith", Arc::new(LikeOperator::new("{}%", true)));
    add("endswith", Arc::new(LikeOperator::new("%{}", true)));
    add("icontains", Arc::new(LikeOperator::new("%{}%", false)));
    add("istartswith", Arc::new(LikeOperator::new("{}%", false)));
    add("iendswith", Arc::new(LikeOperator::new("%{}", false)));
    add("iexact", Arc::new(IExactOperator));

    operators
}

// =============================================================================
// Helpers shared by the builtin operators
// =============================================================================

fn single_value<'a>(operand: &'a Operand, operator: &str) -> Result<&'a Value, QueryError> {
    match operand {
        Operand::Value(v) => Ok(v),
        other => Err(QueryError::invalid_argument(format!(
            "operator `{}` does not accept a {} operand",
            operator,
            other.kind()
        ))),
    }
}

/// Normalize `raw` with the field provider
fn normalize(field: &dyn Field, field_name: &str, raw: &Value) -> Result<Value, QueryError> {
    field
        .to_value(raw, &chrono_tz::UTC)
        .map_err(|e| QueryError::conversion(field_name, e))
}

/// Normalize and format `raw` as a quoted literal
fn literal(fields: &FieldSet, field_name: &str, raw: &Value) -> Result<String, QueryError> {
    let field = fields.get(field_name)?;
    let value = normalize(field, field_name, raw)?;
    Ok(field.to_db_string(&value, true))
}

// =============================================================================
// Builtin operators
// =============================================================================

/// Binary comparison, with an optional form for comparing against NULL
#[derive(Debug, Clone)]
pub struct SimpleOperator {
    sql_operator: &'static str,
    sql_for_null: Option<&'static str>,
}

impl SimpleOperator {
    pub fn new(sql_operator: &'static str, sql_for_null: Option<&'static str>) -> Self {
        Self {
            sql_operator,
            sql_for_null,
        }
    }
}

impl Operator for SimpleOperator {
    fn to_sql(
        &self,
        fields: &FieldSet,
        field_name: &str,
        operand: &Operand,
    ) -> Result<String, QueryError> {
        let value = literal(fields, field_name, single_value(operand, self.sql_operator)?)?;
        match self.sql_for_null {
            Some(null_sql) if value == NULL_LITERAL => Ok(format!("{} {}", field_name, null_sql)),
            _ => Ok(format!("{} {} {}", field_name, self.sql_operator, value)),
        }
    }
}

/// Membership against a literal list, a raw SQL fragment or a subquery
#[derive(Debug, Clone, Copy, Default)]
pub struct InOperator;

impl Operator for InOperator {
    fn to_sql(
        &self,
        fields: &FieldSet,
        field_name: &str,
        operand: &Operand,
    ) -> Result<String, QueryError> {
        let members = match operand {
            Operand::Value(Value::Array(items)) => comma_join(
                items
                    .iter()
                    .map(|item| literal(fields, field_name, item))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Operand::Value(scalar) => literal(fields, field_name, scalar)?,
            Operand::Raw(sql) => sql.clone(),
            Operand::Subquery(query) => query.as_sql()?,
            Operand::Range(..) => {
                return Err(QueryError::invalid_argument(
                    "operator `in` does not accept a range operand",
                ));
            }
        };
        Ok(format!("{} IN ({})", field_name, members))
    }
}

/// Negates another operator: `NOT (<inner>)`
#[derive(Debug, Clone)]
pub struct NotOperator {
    inner: Arc<dyn Operator>,
}

impl NotOperator {
    pub fn new(inner: Arc<dyn Operator>) -> Self {
        Self { inner }
    }
}

impl Operator for NotOperator {
    fn to_sql(
        &self,
        fields: &FieldSet,
        field_name: &str,
        operand: &Operand,
    ) -> Result<String, QueryError> {
        let inner = self.inner.to_sql(fields, field_name, operand)?;
        Ok(format!("NOT ({})", inner))
    }
}

/// Pattern match; `{}` in the pattern is replaced by the escaped value
#[derive(Debug, Clone)]
pub struct LikeOperator {
    pattern: &'static str,
    case_sensitive: bool,
}

impl LikeOperator {
    pub fn new(pattern: &'static str, case_sensitive: bool) -> Self {
        Self {
            pattern,
            case_sensitive,
        }
    }
}

impl Operator for LikeOperator {
    fn to_sql(
        &self,
        fields: &FieldSet,
        field_name: &str,
        operand: &Operand,
    ) -> Result<String, QueryError> {
        let field = fields.get(field_name)?;
        let value = normalize(field, field_name, single_value(operand, "LIKE")?)?;
        let body = escape_like_literal(&field.to_db_string(&value, false));
        let pattern = self.pattern.replace("{}", &body);
        if self.case_sensitive {
            Ok(format!("{} LIKE '{}'", field_name, pattern))
        } else {
            Ok(format!(
                "lowerUTF8({}) LIKE lowerUTF8('{}')",
                field_name, pattern
            ))
        }
    }
}

/// Case-insensitive equality
#[derive(Debug, Clone, Copy, Default)]
pub struct IExactOperator;

impl Operator for IExactOperator {
    fn to_sql(
        &self,
        fields: &FieldSet,
        field_name: &str,
        operand: &Operand,
    ) -> Result<String, QueryError> {
        let value = literal(fields, field_name, single_value(operand, "iexact")?)?;
        Ok(format!("lowerUTF8({}) = lowerUTF8({})", field_name, value))
    }
}

/// Inclusive range; degrades to a one-sided comparison when a bound is absent
#[derive(Debug, Clone, Copy, Default)]
pub struct BetweenOperator;

impl BetweenOperator {
    fn bounds(operand: &Operand) -> Result<(Option<&Value>, Option<&Value>), QueryError> {
        match operand {
            Operand::Range(low, high) => Ok((low.as_ref(), high.as_ref())),
            Operand::Value(Value::Array(items)) if items.len() == 2 => {
                Ok((Some(&items[0]), Some(&items[1])))
            }
            other => Err(QueryError::invalid_argument(format!(
                "operator `between` expects a range or a two-element array, got a {} operand",
                other.kind()
            ))),
        }
    }

    /// Null and empty-string bounds count as absent
    fn present(bound: Option<&Value>) -> Option<&Value> {
        bound.filter(|v| !v.is_null() && v.as_str() != Some(""))
    }
}

impl Operator for BetweenOperator {
    fn to_sql(
        &self,
        fields: &FieldSet,
        field_name: &str,
        operand: &Operand,
    ) -> Result<String, QueryError> {
        let (low, high) = Self::bounds(operand)?;
        match (Self::present(low), Self::present(high)) {
            (Some(low), Some(high)) => Ok(format!(
                "{} BETWEEN {} AND {}",
                field_name,
                literal(fields, field_name, low)?,
                literal(fields, field_name, high)?
            )),
            (Some(low), None) => Ok(format!(
                "{} >= {}",
                field_name,
                literal(fields, field_name, low)?
            )),
            (None, Some(high)) => Ok(format!(
                "{} <= {}",
                field_name,
                literal(fields, field_name, high)?
            )),
            (None, None) => Err(QueryError::invalid_argument(format!(
                "between on `{}` needs at least one bound",
                field_name
            ))),
        }
    }
}
