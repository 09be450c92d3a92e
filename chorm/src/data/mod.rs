//! Data layer
//!
//! Execution seam between the query builders and ClickHouse.

pub mod clickhouse;
pub mod error;
pub mod traits;

pub use clickhouse::ClickhouseSource;
pub use error::QueryError;
pub use traits::DataSource;
