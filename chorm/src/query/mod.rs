//! Query building
//!
//! Conditions ([`Q`], [`FieldCondition`]) are rendered through named
//! [`Operator`]s; [`QuerySet`] and [`AggregateQuerySet`] assemble them into
//! full SELECT statements and hand those to a data source.

mod aggregate;
mod condition;
pub mod operators;
mod page;
mod q;
mod queryset;

pub use aggregate::{AggregateQuerySet, AggregateRow};
pub use condition::{DEFAULT_OPERATOR, FieldCondition, LOOKUP_SEPARATOR, Operand, Subquery};
pub use operators::{Operator, register_operator, resolve_operator};
pub use page::{LAST_PAGE, Page};
pub use q::{Mode, Q};
pub use queryset::QuerySet;
