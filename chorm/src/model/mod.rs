//! Model layer
//!
//! A model maps a Rust row type onto a ClickHouse table: its name, its
//! ordered field providers and its engine. Rows are decoded with serde.

mod engine;
mod fields;
mod value;

use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::data::DataSource;
use crate::query::QuerySet;

pub use engine::Engine;
pub use fields::{
    ArrayField, BooleanField, DateField, DateTimeField, EnumField, Field, FieldSet,
    FixedStringField, FloatField, IntField, NullableField, StringField,
};
pub use value::{Value, ValueError};

/// A table-backed row type
///
/// ```ignore
/// struct Person { first_name: String, height: f32 }
///
/// impl Model for Person {
///     fn table_name() -> &'static str { "person" }
///     fn fields() -> &'static FieldSet { &PERSON_FIELDS }
/// }
///
/// let tall = Person::objects_in(source).filter(q!(height__gt = 1.8));
/// ```
pub trait Model: DeserializeOwned + Send + Sync + 'static {
    fn table_name() -> &'static str;

    /// Field providers in declaration order
    fn fields() -> &'static FieldSet;

    fn engine() -> Engine {
        Engine::MergeTree
    }

    /// Start a query over this model's table
    fn objects_in<S: DataSource>(source: Arc<S>) -> QuerySet<Self, S> {
        QuerySet::new(source)
    }
}
