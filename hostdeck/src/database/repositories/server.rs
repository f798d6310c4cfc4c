//! Server repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use super::{ServerFilter, ServerRepository};
use crate::database::models::ServerDbModel;
use crate::database::retry::{WriteAction, WriteTarget, retry_on_sqlite_busy};
use crate::domain::Server;
use crate::{Error, Result};

/// SQLx implementation of ServerRepository.
pub struct SqlxServerRepository {
    pool: SqlitePool,
}

impl SqlxServerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ServerRepository for SqlxServerRepository {
    async fn create_server(&self, server: &Server) -> Result<()> {
        let row = ServerDbModel::from(server);
        retry_on_sqlite_busy(WriteTarget::server(WriteAction::Insert, &server.id), || async {
            sqlx::query(
                r#"
                INSERT INTO servers (
                    id, organization_id, name, provider, instance_type, region,
                    cpu_cores, memory_gb, storage_gb, bandwidth_tb, monthly_price,
                    status, ip_address, failure_reason, generation, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&row.id)
            .bind(&row.organization_id)
            .bind(&row.name)
            .bind(&row.provider)
            .bind(&row.instance_type)
            .bind(&row.region)
            .bind(row.cpu_cores)
            .bind(row.memory_gb)
            .bind(row.storage_gb)
            .bind(row.bandwidth_tb)
            .bind(row.monthly_price)
            .bind(&row.status)
            .bind(&row.ip_address)
            .bind(&row.failure_reason)
            .bind(row.generation)
            .bind(row.created_at)
            .bind(row.updated_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn get_server(&self, id: &str) -> Result<Server> {
        self.find_server(id)
            .await?
            .ok_or_else(|| Error::not_found("Server", id))
    }

    async fn find_server(&self, id: &str) -> Result<Option<Server>> {
        sqlx::query_as::<_, ServerDbModel>("SELECT * FROM servers WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Server::try_from)
            .transpose()
    }

    async fn update_server(&self, server: &Server) -> Result<()> {
        let row = ServerDbModel::from(server);
        let result = retry_on_sqlite_busy(WriteTarget::server(WriteAction::Update, &server.id), || async {
            Ok(sqlx::query(
                r#"
                UPDATE servers SET
                    name = ?, region = ?, status = ?, ip_address = ?,
                    failure_reason = ?, generation = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&row.name)
            .bind(&row.region)
            .bind(&row.status)
            .bind(&row.ip_address)
            .bind(&row.failure_reason)
            .bind(row.generation)
            .bind(row.updated_at)
            .bind(&row.id)
            .execute(&self.pool)
            .await?)
        })
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("Server", &server.id));
        }
        Ok(())
    }

    async fn delete_server(&self, id: &str) -> Result<()> {
        retry_on_sqlite_busy(WriteTarget::server(WriteAction::Delete, id), || async {
            sqlx::query("DELETE FROM servers WHERE id = ?")
                .bind(id)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await
    }

    async fn list_servers(&self, filter: &ServerFilter) -> Result<Vec<Server>> {
        let mut conditions: Vec<&str> = Vec::new();
        if filter.organization_id.is_some() {
            conditions.push("organization_id = ?");
        }
        if filter.status.is_some() {
            conditions.push("status = ?");
        }
        if filter.provider.is_some() {
            conditions.push("provider = ?");
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let sql = format!(
            "SELECT * FROM servers {} ORDER BY created_at, id",
            where_clause
        );

        let mut query = sqlx::query_as::<_, ServerDbModel>(&sql);
        if let Some(organization_id) = &filter.organization_id {
            query = query.bind(organization_id);
        }
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(provider) = filter.provider {
            query = query.bind(provider.as_str());
        }

        query
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Server::try_from)
            .collect()
    }
}
