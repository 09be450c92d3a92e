//! Configuration constants

// =============================================================================
// Environment variables
// =============================================================================

/// Environment variable pointing at a JSON config file
pub const ENV_CONFIG: &str = "CHORM_CONFIG";

/// Environment variable for the ClickHouse HTTP URL
pub const ENV_CLICKHOUSE_URL: &str = "CHORM_CLICKHOUSE_URL";

/// Environment variable for the ClickHouse database name
pub const ENV_CLICKHOUSE_DATABASE: &str = "CHORM_CLICKHOUSE_DATABASE";

/// Environment variable for the ClickHouse user
pub const ENV_CLICKHOUSE_USER: &str = "CHORM_CLICKHOUSE_USER";

/// Environment variable for the ClickHouse password
pub const ENV_CLICKHOUSE_PASSWORD: &str = "CHORM_CLICKHOUSE_PASSWORD";

/// Environment variable for the per-statement timeout in seconds
pub const ENV_CLICKHOUSE_TIMEOUT_SECS: &str = "CHORM_CLICKHOUSE_TIMEOUT_SECS";

/// Environment variable toggling LZ4 compression (`true`/`false`)
pub const ENV_CLICKHOUSE_COMPRESSION: &str = "CHORM_CLICKHOUSE_COMPRESSION";

// =============================================================================
// ClickHouse defaults
// =============================================================================

/// ClickHouse default HTTP URL
pub const CLICKHOUSE_DEFAULT_URL: &str = "http://localhost:8123";

/// ClickHouse default database name
pub const CLICKHOUSE_DEFAULT_DATABASE: &str = "default";

/// ClickHouse default query timeout in seconds
pub const CLICKHOUSE_DEFAULT_TIMEOUT_SECS: u64 = 30;

/// LZ4 compression is on unless disabled
pub const CLICKHOUSE_DEFAULT_COMPRESSION: bool = true;
