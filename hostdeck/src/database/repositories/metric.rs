//! Metrics store backed by SQLite.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::MetricRepository;
use crate::Result;
use crate::database::models::MetricDbModel;
use crate::database::retry::{WriteAction, WriteTarget, retry_on_sqlite_busy};
use crate::database::time::metric_window_ms;
use crate::domain::MetricSample;

/// SQLx implementation of MetricRepository.
pub struct SqlxMetricRepository {
    pool: SqlitePool,
}

impl SqlxMetricRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetricRepository for SqlxMetricRepository {
    async fn insert_metric(&self, sample: &MetricSample) -> Result<()> {
        let row = MetricDbModel::from(sample);
        retry_on_sqlite_busy(WriteTarget::metrics(WriteAction::Insert, &sample.server_id), || async {
            sqlx::query(
                r#"
                INSERT INTO metrics (
                    id, server_id, timestamp, cpu_usage, memory_usage, disk_usage,
                    network_in, network_out
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&row.id)
            .bind(&row.server_id)
            .bind(row.timestamp)
            .bind(row.cpu_usage)
            .bind(row.memory_usage)
            .bind(row.disk_usage)
            .bind(row.network_in)
            .bind(row.network_out)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn list_metrics(
        &self,
        server_ids: &[String],
        since: DateTime<Utc>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<MetricSample>> {
        if server_ids.is_empty() {
            return Ok(Vec::new());
        }

        let server_ids_json = serde_json::to_string(server_ids)?;
        let (since_ms, until_ms) = metric_window_ms(since, until);

        let rows = sqlx::query_as::<_, MetricDbModel>(
            r#"
            SELECT * FROM metrics
            WHERE server_id IN (SELECT value FROM json_each(?))
              AND timestamp >= ?
              AND timestamp < ?
            ORDER BY timestamp ASC, seq ASC
            "#,
        )
        .bind(&server_ids_json)
        .bind(since_ms)
        .bind(until_ms)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(MetricSample::try_from).collect()
    }

    async fn prune_metrics(&self, server_id: &str, keep: usize) -> Result<u64> {
        let keep = i64::try_from(keep).unwrap_or(i64::MAX);
        retry_on_sqlite_busy(WriteTarget::metrics(WriteAction::Prune, server_id), || async {
            let result = sqlx::query(
                r#"
                DELETE FROM metrics
                WHERE server_id = ?
                  AND seq NOT IN (
                    SELECT seq FROM metrics
                    WHERE server_id = ?
                    ORDER BY timestamp DESC, seq DESC
                    LIMIT ?
                  )
                "#,
            )
            .bind(server_id)
            .bind(server_id)
            .bind(keep)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected())
        })
        .await
    }

    async fn delete_metrics_for_server(&self, server_id: &str) -> Result<u64> {
        retry_on_sqlite_busy(WriteTarget::metrics(WriteAction::Delete, server_id), || async {
            let result = sqlx::query("DELETE FROM metrics WHERE server_id = ?")
                .bind(server_id)
                .execute(&self.pool)
                .await?;
            Ok(result.rows_affected())
        })
        .await
    }

    async fn count_metrics(&self, server_id: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM metrics WHERE server_id = ?")
            .bind(server_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}
