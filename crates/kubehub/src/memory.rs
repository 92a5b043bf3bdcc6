//! In-process `ClusterApi` holding raw objects in memory, with injectable
//! failures. Used by tests and offline demos.

use std::collections::HashSet;
use std::sync::Mutex;

use anyhow::{anyhow, bail, Result};
use kbrowse_core::ResourceKind;

use crate::{ClusterApi, DeleteOptions, GetOptions, ListOptions};

#[derive(Default)]
struct State {
    /// `(kind, raw)` pairs in insertion order.
    objects: Vec<(String, serde_json::Value)>,
    /// Versions that answer 404 for every request.
    unserved_versions: HashSet<String>,
    failing_namespaces: HashSet<String>,
    failing_deletes: HashSet<String>,
    calls: Vec<String>,
}

pub struct MemoryCluster {
    name: String,
    state: Mutex<State>,
}

fn meta_str<'a>(raw: &'a serde_json::Value, field: &str) -> Option<&'a str> {
    raw.get("metadata").and_then(|m| m.get(field)).and_then(|v| v.as_str())
}

impl MemoryCluster {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), state: Mutex::new(State::default()) }
    }

    fn state(&self) -> Result<std::sync::MutexGuard<'_, State>> {
        self.state.lock().map_err(|_| anyhow!("memory cluster mutex poisoned"))
    }

    /// Insert a raw object of `kind` (e.g. "Pod").
    pub fn insert(&self, kind: &str, raw: serde_json::Value) -> Result<()> {
        self.state()?.objects.push((kind.to_string(), raw));
        Ok(())
    }

    /// Mark an API version as not served, e.g. `autoscaling/v2`.
    pub fn unserve_version(&self, group: &str, version: &str) -> Result<()> {
        self.state()?.unserved_versions.insert(kbrowse_core::gvk_key(group, version, ""));
        Ok(())
    }

    pub fn fail_namespace(&self, namespace: &str) -> Result<()> {
        self.state()?.failing_namespaces.insert(namespace.to_string());
        Ok(())
    }

    /// Make deletes of `name` fail.
    pub fn fail_delete(&self, name: &str) -> Result<()> {
        self.state()?.failing_deletes.insert(name.to_string());
        Ok(())
    }

    /// Call log: `list <ns|*> <version>`, `get <ns|*>/<name> <version>`,
    /// `delete <ns|*>/<name> <version>`.
    pub fn calls(&self) -> Vec<String> {
        self.state().map(|s| s.calls.clone()).unwrap_or_default()
    }
}

fn check_served(st: &State, kind: &ResourceKind, version: &str) -> Result<()> {
    if st.unserved_versions.contains(&kbrowse_core::gvk_key(&kind.group, version, "")) {
        bail!("the server could not find the requested resource ({} {})", kind.plural, version);
    }
    Ok(())
}

fn matches(raw: &serde_json::Value, namespace: Option<&str>, name: Option<&str>) -> bool {
    let ns_ok = namespace.map(|ns| meta_str(raw, "namespace") == Some(ns)).unwrap_or(true);
    let name_ok = name.map(|n| meta_str(raw, "name") == Some(n)).unwrap_or(true);
    ns_ok && name_ok
}

#[async_trait::async_trait]
impl ClusterApi for MemoryCluster {
    fn cluster_name(&self) -> &str {
        &self.name
    }

    async fn list_resources(&self, kind: &ResourceKind, opts: &ListOptions) -> Result<Vec<serde_json::Value>> {
        let version = opts.api_version.as_deref().unwrap_or(&kind.version);
        let mut st = self.state()?;
        st.calls.push(format!("list {} {}", opts.namespace.as_deref().unwrap_or("*"), version));
        check_served(&st, kind, version)?;
        if let Some(ns) = opts.namespace.as_deref() {
            if st.failing_namespaces.contains(ns) {
                bail!("forbidden: cannot list {} in namespace {}", kind.plural, ns);
            }
        }
        let ns_filter = if kind.namespaced { opts.namespace.as_deref() } else { None };
        Ok(st
            .objects
            .iter()
            .filter(|(k, raw)| *k == kind.kind && matches(raw, ns_filter, opts.name.as_deref()))
            .map(|(_, raw)| raw.clone())
            .collect())
    }

    async fn get_resource(&self, kind: &ResourceKind, name: &str, opts: &GetOptions) -> Result<serde_json::Value> {
        let version = opts.api_version.as_deref().unwrap_or(&kind.version);
        let namespace = opts.namespace.as_deref();
        let mut st = self.state()?;
        st.calls.push(format!("get {}/{} {}", namespace.unwrap_or("*"), name, version));
        check_served(&st, kind, version)?;
        st.objects
            .iter()
            .find(|(k, raw)| *k == kind.kind && matches(raw, namespace, Some(name)))
            .map(|(_, raw)| raw.clone())
            .ok_or_else(|| anyhow!("{} {} not found", kind.kind, name))
    }

    async fn delete_resource(&self, kind: &ResourceKind, name: &str, opts: &DeleteOptions) -> Result<()> {
        let version = opts.api_version.as_deref().unwrap_or(&kind.version);
        let ns = opts.namespace.as_deref();
        let mut st = self.state()?;
        st.calls.push(format!("delete {}/{} {}", ns.unwrap_or("*"), name, version));
        check_served(&st, kind, version)?;
        if st.failing_deletes.contains(name) {
            bail!("admission webhook denied deletion of {}", name);
        }
        let before = st.objects.len();
        st.objects.retain(|(k, raw)| !(*k == kind.kind && matches(raw, ns, Some(name))));
        if st.objects.len() == before {
            bail!("{} {} not found", kind.kind, name);
        }
        Ok(())
    }
}
