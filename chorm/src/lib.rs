//! ClickHouse query builder
//!
//! Composable filter expressions ([`Q`]) and immutable query builders
//! ([`QuerySet`], [`AggregateQuerySet`]) that render ClickHouse SELECT
//! statements and run them through a [`DataSource`].
//!
//! ```ignore
//! use std::sync::Arc;
//! use chorm::{ClickhouseConfig, ClickhouseSource, Model, q};
//!
//! let source = Arc::new(ClickhouseSource::new(&ClickhouseConfig::load()?));
//! let tall = Person::objects_in(source)
//!     .filter(q!(height__gt = 1.8) | q!(first_name__istartswith = "ci"))
//!     .exclude(q!(passport = chorm::Value::Null))
//!     .order_by(["-height"]);
//!
//! println!("{}", tall.as_sql()?);
//! let page = tall.paginate(1, 100).await?;
//! ```

pub mod core;
pub mod data;
pub mod model;
pub mod query;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use crate::core::{ClickhouseConfig, ClickhouseFileConfig};
pub use data::{ClickhouseSource, DataSource, QueryError};
pub use model::{Engine, Field, FieldSet, Model, Value, ValueError};
pub use query::{
    AggregateQuerySet, AggregateRow, FieldCondition, Mode, Operand, Operator, Page, Q, QuerySet,
    register_operator,
};
