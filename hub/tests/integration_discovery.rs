//! Integration tests for manifest discovery feeding the registry

mod common;

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use common::*;
use subagent_hub::discovery::{ManifestProvider, RefreshOutcome, StaticProvider};
use subagent_hub::*;

fn write_manifests(dir: &std::path::Path) {
    fs::write(
        dir.join("backend.toml"),
        r#"
id = "backend-1"
name = "Backend worker"
role = "BackendDev"
specializations = ["migration"]
tools = ["git", "psql"]

[performance]
expected_latency_ms = 1200
max_concurrent_tasks = 2
"#,
    )
    .unwrap();

    fs::write(
        dir.join("ops.toml"),
        r#"
id = "ops-1"
name = "Ops worker"
role = "DevOps"
tools = ["docker", "kubectl"]
"#,
    )
    .unwrap();
}

fn manifest_hub(dir: &std::path::Path) -> SubagentHub {
    SubagentHub::builder()
        .executor(Arc::new(EchoExecutor::default()))
        .source(
            DiscoverySource::new(SourceKind::Executors, "manifests")
                .refresh_interval(Duration::from_secs(60))
                .provider(Arc::new(ManifestProvider::new(dir))),
        )
        .source(
            DiscoverySource::new(SourceKind::Skills, "builtin").provider(Arc::new(
                StaticProvider::new(
                    "builtin",
                    vec![DiscoveredItem::skill("pdf"), DiscoveredItem::skill("xlsx")],
                ),
            )),
        )
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_discovered_manifests_become_routable() {
    let dir = tempfile::tempdir().unwrap();
    write_manifests(dir.path());
    let hub = manifest_hub(dir.path());

    let outcome = hub
        .discovery()
        .refresh(SourceKind::Executors, "manifests")
        .await
        .unwrap();
    assert_eq!(
        outcome,
        RefreshOutcome::Refreshed {
            items: 2,
            new_executors: 2
        }
    );

    let backend = hub
        .registry()
        .get(&ExecutorId::from_string("backend-1"))
        .await
        .unwrap();
    assert_eq!(backend.max_concurrent_tasks(), 2);
    assert_eq!(backend.capabilities.performance.avg_response_time_ms, 1200.0);

    let response = hub
        .delegate_task(hub.request("run the migration").required_tools(["psql"]))
        .await;
    assert!(response.success);
    assert_eq!(response.metadata.unwrap().executor_id.as_str(), "backend-1");
}

#[tokio::test]
async fn test_refresh_is_skipped_while_fresh() {
    let dir = tempfile::tempdir().unwrap();
    write_manifests(dir.path());
    let hub = manifest_hub(dir.path());
    let t0 = Utc::now();

    hub.discovery()
        .refresh_at(SourceKind::Executors, "manifests", t0)
        .await
        .unwrap();

    // a manifest added after the first scan is not seen until the entry ages
    fs::write(
        dir.path().join("qa.toml"),
        "id = \"qa-1\"\nname = \"QA\"\nrole = \"QAEngineer\"\n",
    )
    .unwrap();

    let skipped = hub
        .discovery()
        .refresh_at(SourceKind::Executors, "manifests", t0 + ChronoDuration::seconds(30))
        .await
        .unwrap();
    assert_eq!(skipped, RefreshOutcome::Skipped);
    assert_eq!(hub.registry().len().await, 2);

    let refreshed = hub
        .discovery()
        .refresh_at(SourceKind::Executors, "manifests", t0 + ChronoDuration::seconds(50))
        .await
        .unwrap();
    assert_eq!(
        refreshed,
        RefreshOutcome::Refreshed {
            items: 3,
            new_executors: 1
        }
    );
    assert_eq!(hub.registry().len().await, 3);
}

#[tokio::test]
async fn test_rediscovery_keeps_live_metrics() {
    let dir = tempfile::tempdir().unwrap();
    write_manifests(dir.path());
    let hub = manifest_hub(dir.path());

    hub.discovery().refresh_all().await;
    hub.delegate_task(hub.request("ship it").to_executor("ops-1"))
        .await;

    let summary = hub.discovery().refresh_all().await;
    assert_eq!(summary.refreshed.len(), 2);
    assert!(summary.failed.is_empty());

    let ops = hub.registry().get(&ExecutorId::from_string("ops-1")).await.unwrap();
    assert_eq!(ops.tasks_completed, 1);
}

#[tokio::test]
async fn test_inventory_by_kind() {
    let dir = tempfile::tempdir().unwrap();
    write_manifests(dir.path());
    let hub = manifest_hub(dir.path());

    hub.start().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let skills = hub.discovery().inventory(SourceKind::Skills).await;
    let keys: Vec<String> = skills.iter().map(DiscoveredItem::key).collect();
    assert_eq!(keys, vec!["skill:pdf", "skill:xlsx"]);

    let executors = hub.discovery().inventory(SourceKind::Executors).await;
    assert_eq!(executors.len(), 2);
    assert!(hub.discovery().inventory(SourceKind::Commands).await.is_empty());

    hub.shutdown().await;
}

#[tokio::test]
async fn test_missing_manifest_directory_reports_error() {
    let dir = tempfile::tempdir().unwrap();
    let hub = manifest_hub(&dir.path().join("absent"));

    let result = hub
        .discovery()
        .refresh(SourceKind::Executors, "manifests")
        .await;

    assert!(result.is_err());
    assert!(hub
        .discovery()
        .get(SourceKind::Executors, "manifests")
        .await
        .is_none());
}
