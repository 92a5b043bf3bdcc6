//! Resource fetcher: one list call per selected namespace, issued
//! concurrently, each walking the kind's API versions until one answers.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Result};
use futures::future::join_all;
use kbrowse_core::{columns::KindSpec, BrowseError, BrowseResult, ResourceItem, ResourceKind};
use metrics::{counter, histogram};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::{ClusterApi, DeleteOptions, GetOptions, ListOptions};

/// Fetch every item of `spec`'s kind in the selected namespaces.
///
/// Namespaced kinds with a non-empty selection get one request per
/// namespace; otherwise a single cluster-wide request is made. All requests
/// run to completion; if any of them failed the whole fetch fails with the
/// first failure in namespace order.
pub async fn fetch_items(api: &dyn ClusterApi, spec: &KindSpec, namespaces: &[String]) -> BrowseResult<Vec<ResourceItem>> {
    let started = Instant::now();
    let scopes: Vec<Option<&str>> = if spec.kind.namespaced && !namespaces.is_empty() {
        namespaces.iter().map(|n| Some(n.as_str())).collect()
    } else {
        vec![None]
    };

    let results = join_all(scopes.iter().map(|ns| list_with_fallback(api, &spec.kind, *ns))).await;

    let mut items = Vec::new();
    let mut first_err: Option<BrowseError> = None;
    for (ns, res) in scopes.iter().zip(results) {
        match res {
            Ok(raws) => {
                for raw in raws {
                    match ResourceItem::from_raw(raw, Some(spec.projector.as_ref())) {
                        Ok(item) => items.push(item),
                        Err(e) => warn!(kind = %spec.kind.kind, ns = ?ns, error = %e, "skipping undecodable object"),
                    }
                }
            }
            Err(e) => {
                warn!(kind = %spec.kind.kind, ns = ?ns, error = ?e, "list failed");
                counter!("fetch_errors_total", 1u64);
                if first_err.is_none() {
                    first_err = Some(BrowseError::Fetch(format!("{:#}", e)));
                }
            }
        }
    }
    if let Some(e) = first_err {
        return Err(e);
    }
    histogram!("fetch_ms", started.elapsed().as_secs_f64() * 1000.0);
    debug!(kind = %spec.kind.kind, scopes = scopes.len(), count = items.len(), "fetched");
    Ok(items)
}

async fn list_with_fallback(api: &dyn ClusterApi, kind: &ResourceKind, namespace: Option<&str>) -> Result<Vec<serde_json::Value>> {
    let mut last_err = None;
    for version in kind.versions() {
        let opts = ListOptions {
            namespace: namespace.map(str::to_string),
            api_version: Some(version.to_string()),
            name: None,
        };
        match api.list_resources(kind, &opts).await {
            Ok(v) => {
                if version != kind.version {
                    info!(kind = %kind.kind, preferred = %kind.version, used = version, "fell back to legacy api version");
                }
                return Ok(v);
            }
            Err(e) => {
                debug!(kind = %kind.kind, version, ns = ?namespace, error = %e, "version attempt failed");
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow!("{} has no api versions", kind.gvk_key())))
}

/// Get one object, walking the kind's API versions like the list does.
pub async fn get_with_fallback(
    api: &dyn ClusterApi,
    kind: &ResourceKind,
    name: &str,
    namespace: Option<&str>,
) -> Result<serde_json::Value> {
    let mut last_err = None;
    for version in kind.versions() {
        let opts = GetOptions { namespace: namespace.map(str::to_string), api_version: Some(version.to_string()) };
        match api.get_resource(kind, name, &opts).await {
            Ok(v) => return Ok(v),
            Err(e) => {
                debug!(kind = %kind.kind, version, name, error = %e, "get attempt failed");
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow!("{} has no api versions", kind.gvk_key())))
}

/// Delete one object through the first API version that accepts the call.
pub async fn delete_with_fallback(api: &dyn ClusterApi, kind: &ResourceKind, name: &str, namespace: Option<&str>) -> Result<()> {
    let mut last_err = None;
    for version in kind.versions() {
        let opts = DeleteOptions { namespace: namespace.map(str::to_string), api_version: Some(version.to_string()) };
        match api.delete_resource(kind, name, &opts).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                debug!(kind = %kind.kind, version, name, error = %e, "delete attempt failed");
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow!("{} has no api versions", kind.gvk_key())))
}

/// Cancellation handle for an in-flight fetch.
#[derive(Debug)]
pub struct CancelHandle {
    tx: Option<oneshot::Sender<()>>,
}

impl CancelHandle {
    pub fn cancel(mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Result of one load cycle, tagged with the generation that started it.
#[derive(Debug)]
pub struct FetchOutcome {
    pub generation: u64,
    pub result: BrowseResult<Vec<ResourceItem>>,
}

/// A fetch running on the runtime. Dropping the handle cancels it.
pub struct FetchHandle {
    pub generation: u64,
    rx: oneshot::Receiver<FetchOutcome>,
    cancel: CancelHandle,
}

impl FetchHandle {
    /// Wait for the outcome; `None` when the fetch was cancelled.
    pub async fn wait(mut self) -> Option<FetchOutcome> {
        (&mut self.rx).await.ok()
    }

    pub fn cancel(self) {
        self.cancel.cancel();
    }
}

/// Start `fetch_items` on a task.
pub fn spawn_fetch(api: Arc<dyn ClusterApi>, spec: KindSpec, namespaces: Vec<String>, generation: u64) -> FetchHandle {
    let (tx, rx) = oneshot::channel::<FetchOutcome>();
    let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        tokio::select! {
            result = fetch_items(api.as_ref(), &spec, &namespaces) => {
                let _ = tx.send(FetchOutcome { generation, result });
            }
            _ = cancel_rx => {
                debug!(generation, kind = %spec.kind.kind, "fetch cancelled");
            }
        }
    });
    FetchHandle { generation, rx, cancel: CancelHandle { tx: Some(cancel_tx) } }
}
