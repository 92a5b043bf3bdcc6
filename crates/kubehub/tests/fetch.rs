#![forbid(unsafe_code)]

use std::sync::Arc;

use kbrowse_core::{columns::builtin_kind, BrowseError};
use kbrowse_kubehub::{delete_with_fallback, fetch_items, get_with_fallback, spawn_fetch, ClusterApi, DeleteOptions, MemoryCluster};

fn obj(name: &str, ns: &str) -> serde_json::Value {
    serde_json::json!({
        "metadata": { "name": name, "namespace": ns, "creationTimestamp": "2020-01-01T00:00:00Z" },
        "spec": { "scaleTargetRef": { "kind": "Deployment", "name": name }, "maxReplicas": 3 }
    })
}

fn cluster() -> MemoryCluster {
    let c = MemoryCluster::new("test");
    c.insert("HorizontalPodAutoscaler", obj("a", "ns1")).unwrap();
    c.insert("HorizontalPodAutoscaler", obj("b", "ns1")).unwrap();
    c.insert("HorizontalPodAutoscaler", obj("c", "ns2")).unwrap();
    c
}

#[tokio::test]
async fn one_request_per_selected_namespace() {
    let c = cluster();
    let hpa = builtin_kind("hpa").unwrap();
    let items = fetch_items(&c, &hpa, &["ns1".to_string(), "ns2".to_string()]).await.unwrap();
    let names: Vec<&str> = items.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
    assert_eq!(c.calls(), vec!["list ns1 v2", "list ns2 v2"]);
}

#[tokio::test]
async fn no_selection_lists_cluster_wide() {
    let c = cluster();
    let hpa = builtin_kind("hpa").unwrap();
    let items = fetch_items(&c, &hpa, &[]).await.unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(c.calls(), vec!["list * v2"]);
}

#[tokio::test]
async fn falls_back_to_legacy_version_per_namespace() {
    let c = cluster();
    c.unserve_version("autoscaling", "v2").unwrap();
    let hpa = builtin_kind("hpa").unwrap();
    let items = fetch_items(&c, &hpa, &["ns1".to_string(), "ns2".to_string()]).await.unwrap();
    assert_eq!(items.len(), 3);
    let mut calls = c.calls();
    calls.sort();
    assert_eq!(calls, vec!["list ns1 v1", "list ns1 v2", "list ns2 v1", "list ns2 v2"]);
}

#[tokio::test]
async fn one_failing_namespace_fails_the_whole_fetch() {
    let c = cluster();
    c.fail_namespace("ns2").unwrap();
    let hpa = builtin_kind("hpa").unwrap();
    let err = fetch_items(&c, &hpa, &["ns1".to_string(), "ns2".to_string()]).await.unwrap_err();
    assert!(matches!(err, BrowseError::Fetch(ref m) if m.contains("ns2")), "{err}");
    // ns1 still ran to completion; both versions were tried for ns2
    assert!(c.calls().contains(&"list ns1 v2".to_string()));
    assert!(c.calls().contains(&"list ns2 v1".to_string()));
}

#[tokio::test]
async fn objects_without_name_are_skipped() {
    let c = cluster();
    c.insert("HorizontalPodAutoscaler", serde_json::json!({ "metadata": { "namespace": "ns1" } })).unwrap();
    let hpa = builtin_kind("hpa").unwrap();
    let items = fetch_items(&c, &hpa, &["ns1".to_string()]).await.unwrap();
    assert_eq!(items.len(), 2);
}

#[tokio::test]
async fn spawned_fetch_reports_its_generation() {
    let api: Arc<dyn ClusterApi> = Arc::new(cluster());
    let hpa = builtin_kind("hpa").unwrap();

    let handle = spawn_fetch(Arc::clone(&api), hpa.clone(), vec!["ns1".to_string()], 7);
    let outcome = handle.wait().await.unwrap();
    assert_eq!(outcome.generation, 7);
    assert_eq!(outcome.result.unwrap().len(), 2);

    let handle = spawn_fetch(api, hpa, vec![], 8);
    handle.cancel();
}

#[tokio::test]
async fn get_and_delete_walk_versions_like_list() {
    let c = cluster();
    c.unserve_version("autoscaling", "v2").unwrap();
    let hpa = builtin_kind("hpa").unwrap();

    let direct = DeleteOptions { namespace: Some("ns1".to_string()), api_version: None };
    assert!(c.delete_resource(&hpa.kind, "a", &direct).await.is_err());

    let raw = get_with_fallback(&c, &hpa.kind, "a", Some("ns1")).await.unwrap();
    assert_eq!(raw["metadata"]["name"], "a");
    delete_with_fallback(&c, &hpa.kind, "a", Some("ns1")).await.unwrap();
    assert_eq!(
        c.calls(),
        vec!["delete ns1/a v2", "get ns1/a v2", "get ns1/a v1", "delete ns1/a v2", "delete ns1/a v1"]
    );
    assert!(get_with_fallback(&c, &hpa.kind, "a", Some("ns1")).await.is_err());
}
