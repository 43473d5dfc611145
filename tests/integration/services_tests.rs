//! Integration tests for service listing, status rendering, and
//! environment updates.

use skipper::models::cluster::{ContainerResources, Deployment, ServiceStatus};
use skipper::orchestrator::services::{list_services, render_status, update_environment};
use skipper::provider::task_definition::EnvChanges;
use skipper::AppError;

use super::test_helpers::{task, FakeCluster, TASK_DEF};

#[tokio::test]
async fn lists_clusters_and_services_sorted() {
    let cluster = FakeCluster::default()
        .with_service("prod", "worker")
        .with_service("prod", "api")
        .with_service("dev", "api");

    let listing = list_services(&cluster).await.expect("list");

    assert_eq!(
        listing,
        vec![
            ("dev".to_owned(), vec!["api".to_owned()]),
            ("prod".to_owned(), vec!["api".to_owned(), "worker".to_owned()]),
        ]
    );
}

#[test]
fn status_shows_counts_and_deployments() {
    let status = ServiceStatus {
        name: "api".into(),
        task_definition: TASK_DEF.into(),
        desired_count: 3,
        running_count: 2,
        pending_count: 1,
        deployments: vec![Deployment {
            task_definition: TASK_DEF.into(),
            status: "PRIMARY".into(),
            desired_count: 3,
            pending_count: 1,
            running_count: 2,
            created_at: Some("2024-05-01T10:00:00Z".into()),
        }],
        containers: Vec::new(),
    };

    let text = render_status(&status);

    assert!(text.starts_with("api  desired=3 running=2 pending=1\n"));
    assert!(text.contains(TASK_DEF));
    assert!(text.contains("PRIMARY"));
    assert!(text.contains("api:7"));
    assert!(text.contains("created=2024-05-01T10:00:00Z"));
    assert!(!text.contains("container "));
}

#[test]
fn status_lists_container_cpu_and_memory_limits() {
    let status = ServiceStatus {
        name: "api".into(),
        task_definition: TASK_DEF.into(),
        desired_count: 1,
        running_count: 1,
        pending_count: 0,
        deployments: Vec::new(),
        containers: vec![
            ContainerResources {
                name: "web".into(),
                cpu: 256,
                memory_reservation: Some(512),
                memory: Some(1024),
            },
            ContainerResources {
                name: "sidecar".into(),
                cpu: 0,
                memory_reservation: None,
                memory: Some(128),
            },
        ],
    };

    let text = render_status(&status);

    assert!(text.contains("  container web: cpu=256 soft memory=512 hard memory=1024\n"));
    assert!(text.contains("  container sidecar: cpu=0 soft memory=- hard memory=128\n"));
}

#[tokio::test]
async fn update_registers_revision_and_points_service_at_it() {
    let cluster = FakeCluster::default()
        .with_service("prod", "api")
        .with_task("prod", Some("api"), task("arn:task/1", TASK_DEF, "i-1", None));
    let changes = EnvChanges::parse(&["LOG_LEVEL=debug".to_owned()], &[]).unwrap();

    let revision = update_environment(&cluster, "prod", "api", &changes)
        .await
        .expect("update");

    assert_eq!(revision, format!("{TASK_DEF}-next"));
    let registered = cluster.registered.lock().unwrap();
    assert_eq!(registered.len(), 1);
    assert_eq!(registered[0].0, TASK_DEF);
    assert_eq!(registered[0].1, changes);
    let updates = cluster.updates.lock().unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].2.task_definition.as_deref(), Some(revision.as_str()));
    assert!(!updates[0].2.force_new_deployment);
}

#[tokio::test]
async fn empty_changes_are_rejected_before_any_call() {
    let cluster = FakeCluster::default().with_service("prod", "api");

    let err = update_environment(&cluster, "prod", "api", &EnvChanges::default())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Config(_)));
    assert!(cluster.registered.lock().unwrap().is_empty());
    assert!(cluster.updates.lock().unwrap().is_empty());
}
