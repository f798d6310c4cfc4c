//! Database row models.
//!
//! Rows carry the storage representation (epoch-ms timestamps, lowercase enum
//! strings, `i64` counters). Conversion into domain types validates them.

pub mod deployment;
pub mod metric;
pub mod server;

pub use deployment::DeploymentDbModel;
pub use metric::MetricDbModel;
pub use server::ServerDbModel;

fn counter_from_db(field: &str, value: i64) -> crate::Result<u64> {
    u64::try_from(value).map_err(|_| crate::Error::Database(format!("negative {}: {}", field, value)))
}

fn counter_to_db(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
