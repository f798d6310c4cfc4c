//! Deployment repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use super::DeploymentRepository;
use crate::database::models::DeploymentDbModel;
use crate::database::retry::{WriteAction, WriteTarget, retry_on_sqlite_busy};
use crate::domain::Deployment;
use crate::{Error, Result};

/// SQLx implementation of DeploymentRepository.
pub struct SqlxDeploymentRepository {
    pool: SqlitePool,
}

impl SqlxDeploymentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeploymentRepository for SqlxDeploymentRepository {
    async fn create_deployment(&self, deployment: &Deployment) -> Result<()> {
        let row = DeploymentDbModel::from(deployment);
        retry_on_sqlite_busy(WriteTarget::deployment(WriteAction::Insert, &deployment.id), || async {
            sqlx::query(
                r#"
                INSERT INTO deployments (
                    id, server_id, organization_id, name, repository_url, branch,
                    status, build_log, generation, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&row.id)
            .bind(&row.server_id)
            .bind(&row.organization_id)
            .bind(&row.name)
            .bind(&row.repository_url)
            .bind(&row.branch)
            .bind(&row.status)
            .bind(&row.build_log)
            .bind(row.generation)
            .bind(row.created_at)
            .bind(row.updated_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn get_deployment(&self, id: &str) -> Result<Deployment> {
        self.find_deployment(id)
            .await?
            .ok_or_else(|| Error::not_found("Deployment", id))
    }

    async fn find_deployment(&self, id: &str) -> Result<Option<Deployment>> {
        sqlx::query_as::<_, DeploymentDbModel>("SELECT * FROM deployments WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Deployment::try_from)
            .transpose()
    }

    async fn update_deployment(&self, deployment: &Deployment) -> Result<()> {
        let row = DeploymentDbModel::from(deployment);
        let result = retry_on_sqlite_busy(WriteTarget::deployment(WriteAction::Update, &deployment.id), || async {
            Ok(sqlx::query(
                r#"
                UPDATE deployments SET
                    status = ?, build_log = ?, generation = ?, updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&row.status)
            .bind(&row.build_log)
            .bind(row.generation)
            .bind(row.updated_at)
            .bind(&row.id)
            .execute(&self.pool)
            .await?)
        })
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("Deployment", &deployment.id));
        }
        Ok(())
    }

    async fn delete_deployment(&self, id: &str) -> Result<()> {
        retry_on_sqlite_busy(WriteTarget::deployment(WriteAction::Delete, id), || async {
            sqlx::query("DELETE FROM deployments WHERE id = ?")
                .bind(id)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await
    }

    async fn list_deployments_for_server(&self, server_id: &str) -> Result<Vec<Deployment>> {
        sqlx::query_as::<_, DeploymentDbModel>(
            "SELECT * FROM deployments WHERE server_id = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(server_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Deployment::try_from)
        .collect()
    }
}
