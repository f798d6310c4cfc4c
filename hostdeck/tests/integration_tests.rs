//! Integration tests for the hostdeck database layer.
//!
//! These tests use a real SQLite database (in-memory) to verify
//! repository operations work correctly with the actual schema.

use chrono::{Duration, TimeZone, Utc};
use hostdeck::Error;
use hostdeck::database::repositories::{
    DeploymentRepository, MetricRepository, ServerFilter, ServerRepository, SqlxDeploymentRepository,
    SqlxMetricRepository, SqlxServerRepository,
};
use hostdeck::database::{DbPool, init_pool, run_migrations};
use hostdeck::domain::{
    Deployment, DeploymentStatus, InstanceSpec, MetricSample, Provider, Server, ServerStatus,
};

/// Helper to create a test database pool with migrations applied.
async fn setup_test_db() -> DbPool {
    let pool = init_pool("sqlite::memory:")
        .await
        .expect("Failed to create test pool");

    run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

fn test_server(org: &str, name: &str, provider: Provider) -> Server {
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
    Server::new(org, name, provider, "t3.micro", InstanceSpec::new(2, 1, 8, 1.0, 7.59), now)
}

mod server_repository_tests {
    use super::*;

    #[tokio::test]
    async fn test_server_round_trip() {
        let pool = setup_test_db().await;
        let repo = SqlxServerRepository::new(pool);

        let mut server = test_server("org-1", "web-1", Provider::Aws).with_region("eu-west-1");
        repo.create_server(&server).await.unwrap();

        let loaded = repo.get_server(&server.id).await.unwrap();
        assert_eq!(loaded, server);

        server
            .mark_provisioned("203.0.113.10", server.created_at + Duration::seconds(3))
            .unwrap();
        repo.update_server(&server).await.unwrap();

        let loaded = repo.get_server(&server.id).await.unwrap();
        assert_eq!(loaded.status, ServerStatus::Running);
        assert_eq!(loaded.ip_address.as_deref(), Some("203.0.113.10"));
        assert_eq!(loaded.generation, 1);
        assert_eq!(loaded.spec.monthly_price, 7.59);
    }

    #[tokio::test]
    async fn test_missing_server() {
        let pool = setup_test_db().await;
        let repo = SqlxServerRepository::new(pool);

        assert!(repo.find_server("missing").await.unwrap().is_none());
        assert!(matches!(
            repo.get_server("missing").await,
            Err(Error::NotFound { .. })
        ));

        let ghost = test_server("org-1", "ghost", Provider::Aws);
        assert!(matches!(
            repo.update_server(&ghost).await,
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_servers_with_filters() {
        let pool = setup_test_db().await;
        let repo = SqlxServerRepository::new(pool);

        let a = test_server("org-1", "a", Provider::Aws);
        let mut b = test_server("org-1", "b", Provider::Gcp);
        b.created_at += Duration::seconds(1);
        b.transition(ServerStatus::Terminated, b.created_at).unwrap();
        let c = test_server("org-2", "c", Provider::Aws);
        for server in [&a, &b, &c] {
            repo.create_server(server).await.unwrap();
        }

        let org1 = repo
            .list_servers(&ServerFilter::for_organization("org-1"))
            .await
            .unwrap();
        let names: Vec<&str> = org1.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);

        let pending_aws = repo
            .list_servers(
                &ServerFilter::default()
                    .with_status(ServerStatus::Pending)
                    .with_provider(Provider::Aws),
            )
            .await
            .unwrap();
        assert_eq!(pending_aws.len(), 2);

        repo.delete_server(&a.id).await.unwrap();
        let all = repo.list_servers(&ServerFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
    }
}

mod deployment_repository_tests {
    use super::*;

    #[tokio::test]
    async fn test_deployment_round_trip_and_order() {
        let pool = setup_test_db().await;
        let repo = SqlxDeploymentRepository::new(pool);
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();

        let mut first = Deployment::new("srv-1", "org-1", "api", now).with_source(
            Some("https://git.example.com/api.git".to_string()),
            Some("release".to_string()),
        );
        let second = Deployment::new("srv-1", "org-1", "web", now + Duration::minutes(5));
        repo.create_deployment(&first).await.unwrap();
        repo.create_deployment(&second).await.unwrap();

        first.start_build(now + Duration::seconds(2)).unwrap();
        repo.update_deployment(&first).await.unwrap();

        let loaded = repo.get_deployment(&first.id).await.unwrap();
        assert_eq!(loaded.status, DeploymentStatus::Building);
        assert_eq!(loaded.branch, "release");
        assert_eq!(loaded.build_log, first.build_log);

        let listed = repo.list_deployments_for_server("srv-1").await.unwrap();
        let names: Vec<&str> = listed.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["web", "api"]);

        repo.delete_deployment(&second.id).await.unwrap();
        assert!(repo.find_deployment(&second.id).await.unwrap().is_none());
    }
}

mod metric_repository_tests {
    use super::*;

    fn sample(server_id: &str, minute: i64, cpu: f64) -> MetricSample {
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        MetricSample::new(server_id, base + Duration::minutes(minute))
            .with_usage(cpu, 50.0, 30.0)
            .with_network(1024, 512)
    }

    #[tokio::test]
    async fn test_list_metrics_window() {
        let pool = setup_test_db().await;
        let repo = SqlxMetricRepository::new(pool);

        for (minute, cpu) in [(10, 30.0), (0, 10.0), (5, 20.0)] {
            repo.insert_metric(&sample("srv-1", minute, cpu)).await.unwrap();
        }
        repo.insert_metric(&sample("srv-2", 5, 99.0)).await.unwrap();

        let base = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        let samples = repo
            .list_metrics(&["srv-1".to_string()], base, Some(base + Duration::minutes(10)))
            .await
            .unwrap();
        let cpus: Vec<f64> = samples.iter().map(|s| s.cpu_usage).collect();
        assert_eq!(cpus, vec![10.0, 20.0]);

        let both = repo
            .list_metrics(&["srv-1".to_string(), "srv-2".to_string()], base, None)
            .await
            .unwrap();
        assert_eq!(both.len(), 4);
        assert!(both.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

        let none = repo.list_metrics(&[], base, None).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_prune_keeps_newest() {
        let pool = setup_test_db().await;
        let repo = SqlxMetricRepository::new(pool);

        for minute in 0..8 {
            repo.insert_metric(&sample("srv-1", minute, minute as f64)).await.unwrap();
        }
        repo.insert_metric(&sample("srv-2", 0, 1.0)).await.unwrap();

        let deleted = repo.prune_metrics("srv-1", 3).await.unwrap();
        assert_eq!(deleted, 5);
        assert_eq!(repo.count_metrics("srv-1").await.unwrap(), 3);
        assert_eq!(repo.count_metrics("srv-2").await.unwrap(), 1);

        let base = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let kept = repo
            .list_metrics(&["srv-1".to_string()], base, None)
            .await
            .unwrap();
        let cpus: Vec<f64> = kept.iter().map(|s| s.cpu_usage).collect();
        assert_eq!(cpus, vec![5.0, 6.0, 7.0]);

        assert_eq!(repo.delete_metrics_for_server("srv-1").await.unwrap(), 3);
        assert_eq!(repo.count_metrics("srv-1").await.unwrap(), 0);
    }
}
