//! kbrowse kubehub: cluster API abstraction, kube-rs backend and the resource fetcher.

#![forbid(unsafe_code)]

pub mod fetch;
pub mod memory;

use anyhow::{Context, Result};
use kube::{
    api::{Api, DeleteParams, ListParams},
    config::{KubeConfigOptions, Kubeconfig},
    core::{ApiResource, DynamicObject, GroupVersionKind},
    Client,
};
use kbrowse_core::ResourceKind;
use tracing::{debug, info};

pub use fetch::{delete_with_fallback, fetch_items, get_with_fallback, spawn_fetch, CancelHandle, FetchHandle, FetchOutcome};
pub use memory::MemoryCluster;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub namespace: Option<String>,
    /// Overrides the kind's preferred version.
    pub api_version: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetOptions {
    pub namespace: Option<String>,
    pub api_version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    pub namespace: Option<String>,
    pub api_version: Option<String>,
}

/// The backend every page talks to. One instance is bound to one cluster.
#[async_trait::async_trait]
pub trait ClusterApi: Send + Sync {
    /// Cluster identity (kubeconfig context name).
    fn cluster_name(&self) -> &str;

    async fn list_resources(&self, kind: &ResourceKind, opts: &ListOptions) -> Result<Vec<serde_json::Value>>;

    async fn get_resource(&self, kind: &ResourceKind, name: &str, opts: &GetOptions) -> Result<serde_json::Value>;

    async fn delete_resource(&self, kind: &ResourceKind, name: &str, opts: &DeleteOptions) -> Result<()>;
}

/// kube-rs implementation over `DynamicObject`.
pub struct KubeClusterApi {
    client: Client,
    cluster: String,
}

impl KubeClusterApi {
    /// Connect using the given kubeconfig context, or the current one.
    pub async fn connect(context: Option<&str>) -> Result<Self> {
        let config = match context {
            Some(ctx) => {
                let opts = KubeConfigOptions { context: Some(ctx.to_string()), ..Default::default() };
                kube::Config::from_kubeconfig(&opts).await.with_context(|| format!("loading kubeconfig context {}", ctx))?
            }
            None => kube::Config::infer().await.context("inferring kube config")?,
        };
        let cluster = match context {
            Some(ctx) => ctx.to_string(),
            None => Kubeconfig::read().ok().and_then(|k| k.current_context).unwrap_or_else(|| "in-cluster".to_string()),
        };
        let client = Client::try_from(config).context("building kube client")?;
        info!(cluster = %cluster, "connected");
        Ok(Self { client, cluster })
    }

    pub fn from_client(client: Client, cluster: impl Into<String>) -> Self {
        Self { client, cluster: cluster.into() }
    }

    fn api(&self, kind: &ResourceKind, version: &str, namespace: Option<&str>) -> Api<DynamicObject> {
        let gvk = GroupVersionKind::gvk(&kind.group, version, &kind.kind);
        let ar = ApiResource::from_gvk_with_plural(&gvk, &kind.plural);
        match namespace {
            Some(ns) if kind.namespaced => Api::namespaced_with(self.client.clone(), ns, &ar),
            _ => Api::all_with(self.client.clone(), &ar),
        }
    }
}

fn strip_managed_fields(v: &mut serde_json::Value) {
    if let Some(meta) = v.get_mut("metadata") {
        if let Some(obj) = meta.as_object_mut() {
            obj.remove("managedFields");
        }
    }
}

fn to_raw(obj: &DynamicObject) -> Result<serde_json::Value> {
    let mut raw = serde_json::to_value(obj).context("serializing DynamicObject")?;
    strip_managed_fields(&mut raw);
    Ok(raw)
}

#[async_trait::async_trait]
impl ClusterApi for KubeClusterApi {
    fn cluster_name(&self) -> &str {
        &self.cluster
    }

    async fn list_resources(&self, kind: &ResourceKind, opts: &ListOptions) -> Result<Vec<serde_json::Value>> {
        let version = opts.api_version.as_deref().unwrap_or(&kind.version);
        let api = self.api(kind, version, opts.namespace.as_deref());
        let mut lp = ListParams::default();
        if let Some(name) = &opts.name {
            lp = lp.fields(&format!("metadata.name={}", name));
        }
        let list = api
            .list(&lp)
            .await
            .with_context(|| format!("listing {} ({}) in {}", kind.plural, version, opts.namespace.as_deref().unwrap_or("all namespaces")))?;
        debug!(kind = %kind.kind, version, ns = ?opts.namespace, count = list.items.len(), "listed");
        list.items.iter().map(to_raw).collect()
    }

    async fn get_resource(&self, kind: &ResourceKind, name: &str, opts: &GetOptions) -> Result<serde_json::Value> {
        let version = opts.api_version.as_deref().unwrap_or(&kind.version);
        let api = self.api(kind, version, opts.namespace.as_deref());
        let obj = api.get(name).await.with_context(|| format!("getting {} {} ({})", kind.kind, name, version))?;
        to_raw(&obj)
    }

    async fn delete_resource(&self, kind: &ResourceKind, name: &str, opts: &DeleteOptions) -> Result<()> {
        let version = opts.api_version.as_deref().unwrap_or(&kind.version);
        let api = self.api(kind, version, opts.namespace.as_deref());
        let _ = api
            .delete(name, &DeleteParams::default())
            .await
            .with_context(|| format!("deleting {} {} ({})", kind.kind, name, version))?;
        info!(kind = %kind.kind, name, ns = ?opts.namespace, "deleted");
        Ok(())
    }
}
