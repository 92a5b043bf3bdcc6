//! kbrowse actions: detail routes and recon-gated deletes, plus the page
//! controller that wires them to a table.

#![forbid(unsafe_code)]

pub mod page;

use std::fmt;
use std::sync::Arc;

use kbrowse_core::{columns::KindSpec, BrowseError, BrowseResult, ItemKey};
use kbrowse_kubehub::{delete_with_fallback, ClusterApi};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

pub use page::Page;

/// What the current session may do. Checked at the start of every mutation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Read-only mode: mutating actions are refused.
    pub recon: bool,
}

impl Capabilities {
    pub fn read_only() -> Self {
        Self { recon: true }
    }

    pub fn check_mutation(&self, action: &str) -> BrowseResult<()> {
        if self.recon {
            counter!("recon_blocked_total", 1u64);
            return Err(BrowseError::ReconModeBlocked(action.to_string()));
        }
        Ok(())
    }
}

/// User-facing notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Notice {
    Info(String),
    Error(String),
}

impl Notice {
    pub fn from_error(e: &BrowseError) -> Self {
        if e.is_informational() {
            Notice::Info(e.to_string())
        } else {
            Notice::Error(e.to_string())
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Notice::Info(m) | Notice::Error(m) => m,
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Info(m) => write!(f, "info: {}", m),
            Notice::Error(m) => write!(f, "error: {}", m),
        }
    }
}

/// A destructive action waiting for confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAction {
    pub targets: Vec<ItemKey>,
    pub prompt: String,
}

/// Outcome of a confirmed bulk delete. Deletes run in order and stop at
/// the first failure; nothing already deleted is restored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteReport {
    pub deleted: Vec<ItemKey>,
    pub failed: Option<(ItemKey, BrowseError)>,
    pub not_attempted: Vec<ItemKey>,
}

impl DeleteReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_none()
    }

    /// One line naming where an incomplete delete stopped.
    pub fn failure_summary(&self) -> Option<String> {
        let (key, _) = self.failed.as_ref()?;
        Some(format!(
            "delete stopped at {}: {} deleted, {} not attempted",
            key,
            self.deleted.len(),
            self.not_attempted.len()
        ))
    }

    pub fn notices(&self, spec: &KindSpec) -> Vec<Notice> {
        let mut out = Vec::new();
        match self.deleted.as_slice() {
            [] => {}
            [one] => out.push(Notice::Info(format!("deleted {} {}", spec.kind.kind, one))),
            many => out.push(Notice::Info(format!("deleted {} {}", many.len(), spec.kind.plural))),
        }
        if let Some((key, e)) = &self.failed {
            let mut msg = format!("failed to delete {} {}: {}", spec.kind.kind, key, e);
            if !self.not_attempted.is_empty() {
                msg.push_str(&format!(" ({} not attempted)", self.not_attempted.len()));
            }
            out.push(Notice::Error(msg));
        }
        out
    }
}

/// Detail route for one object: `/{cluster}/{kind}/{namespace}/{name}`,
/// or without the namespace segment for cluster-scoped kinds.
pub fn detail_route(cluster: &str, spec: &KindSpec, key: &ItemKey) -> String {
    match key.namespace.as_deref() {
        Some(ns) if spec.kind.namespaced => format!("/{}/{}/{}/{}", cluster, spec.kind.plural, ns, key.name),
        _ => format!("/{}/{}/{}", cluster, spec.kind.plural, key.name),
    }
}

pub struct ActionDispatcher {
    api: Arc<dyn ClusterApi>,
    caps: Capabilities,
    pending: Option<PendingAction>,
}

impl ActionDispatcher {
    pub fn new(api: Arc<dyn ClusterApi>, caps: Capabilities) -> Self {
        Self { api, caps, pending: None }
    }

    pub fn capabilities(&self) -> Capabilities {
        self.caps
    }

    pub fn set_capabilities(&mut self, caps: Capabilities) {
        self.caps = caps;
    }

    /// Point at another cluster. Anything pending belonged to the old one.
    pub fn set_api(&mut self, api: Arc<dyn ClusterApi>) {
        self.api = api;
        self.pending = None;
    }

    /// View is only offered for exactly one target.
    pub fn view_route(&self, spec: &KindSpec, targets: &[ItemKey]) -> Option<String> {
        match targets {
            [one] => Some(detail_route(self.api.cluster_name(), spec, one)),
            _ => None,
        }
    }

    pub fn pending(&self) -> Option<&PendingAction> {
        self.pending.as_ref()
    }

    /// Stage a delete of `targets`. Refused in recon mode before any dialog opens.
    pub fn request_delete(&mut self, spec: &KindSpec, targets: Vec<ItemKey>) -> BrowseResult<&PendingAction> {
        if let Err(e) = self.caps.check_mutation("delete") {
            info!(kind = %spec.kind.kind, targets = targets.len(), "delete blocked by recon mode");
            return Err(e);
        }
        let prompt = match targets.as_slice() {
            [] => return Err(BrowseError::Validation("nothing selected to delete".into())),
            [one] => format!("Delete {} {}?", spec.kind.kind, one),
            many => format!("Delete {} {}?", many.len(), spec.kind.plural),
        };
        Ok(&*self.pending.insert(PendingAction { targets, prompt }))
    }

    pub fn cancel(&mut self) -> Option<PendingAction> {
        self.pending.take()
    }

    /// Run the pending delete, one target at a time in order, each through
    /// the kind's API versions.
    pub async fn confirm(&mut self, spec: &KindSpec) -> BrowseResult<DeleteReport> {
        let pending = self
            .pending
            .take()
            .ok_or_else(|| BrowseError::Validation("no action awaiting confirmation".into()))?;
        self.caps.check_mutation("delete")?;

        let mut report = DeleteReport::default();
        let mut targets = pending.targets.into_iter();
        for key in targets.by_ref() {
            match delete_with_fallback(self.api.as_ref(), &spec.kind, &key.name, key.namespace.as_deref()).await {
                Ok(()) => {
                    counter!("delete_total", 1u64);
                    info!(kind = %spec.kind.kind, key = %key, "deleted");
                    report.deleted.push(key);
                }
                Err(e) => {
                    counter!("delete_errors_total", 1u64);
                    error!(kind = %spec.kind.kind, key = %key, error = ?e, "delete failed");
                    report.failed = Some((key, BrowseError::Delete(format!("{:#}", e))));
                    break;
                }
            }
        }
        report.not_attempted = targets.collect();
        if !report.not_attempted.is_empty() {
            warn!(kind = %spec.kind.kind, skipped = report.not_attempted.len(), "bulk delete stopped early");
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbrowse_core::columns::builtin_kind;
    use kbrowse_kubehub::MemoryCluster;

    #[test]
    fn routes_include_namespace_only_for_namespaced_kinds() {
        let api: Arc<dyn ClusterApi> = Arc::new(MemoryCluster::new("prod"));
        let d = ActionDispatcher::new(api, Capabilities::default());
        let hpa = builtin_kind("hpa").unwrap();
        let node = builtin_kind("node").unwrap();
        let k = ItemKey::new(Some("web"), "frontend");
        assert_eq!(d.view_route(&hpa, &[k.clone()]).as_deref(), Some("/prod/horizontalpodautoscalers/web/frontend"));
        assert_eq!(d.view_route(&node, &[ItemKey::new(None, "n1")]).as_deref(), Some("/prod/nodes/n1"));
        assert_eq!(d.view_route(&hpa, &[k.clone(), ItemKey::new(Some("web"), "b")]), None);
    }

    #[test]
    fn prompt_names_single_target_or_count() {
        let api: Arc<dyn ClusterApi> = Arc::new(MemoryCluster::new("prod"));
        let mut d = ActionDispatcher::new(api, Capabilities::default());
        let hpa = builtin_kind("hpa").unwrap();
        let one = d.request_delete(&hpa, vec![ItemKey::new(Some("a"), "x")]).unwrap();
        assert_eq!(one.prompt, "Delete HorizontalPodAutoscaler a/x?");
        let two = d.request_delete(&hpa, vec![ItemKey::new(Some("a"), "x"), ItemKey::new(Some("a"), "y")]).unwrap();
        assert_eq!(two.prompt, "Delete 2 horizontalpodautoscalers?");
        assert!(d.cancel().is_some());
        assert!(d.pending().is_none());
        assert!(matches!(d.request_delete(&hpa, vec![]), Err(BrowseError::Validation(_))));
    }

    #[test]
    fn failure_summary_names_the_failed_target() {
        let report = DeleteReport {
            deleted: vec![ItemKey::new(Some("a"), "x")],
            failed: Some((ItemKey::new(Some("a"), "y"), BrowseError::Delete("denied".into()))),
            not_attempted: vec![ItemKey::new(Some("a"), "z"), ItemKey::new(Some("b"), "w")],
        };
        assert_eq!(report.failure_summary().as_deref(), Some("delete stopped at a/y: 1 deleted, 2 not attempted"));
        assert_eq!(DeleteReport::default().failure_summary(), None);
    }

    #[test]
    fn recon_mode_refuses_before_staging() {
        let api: Arc<dyn ClusterApi> = Arc::new(MemoryCluster::new("prod"));
        let mut d = ActionDispatcher::new(api, Capabilities::read_only());
        let hpa = builtin_kind("hpa").unwrap();
        let err = d.request_delete(&hpa, vec![ItemKey::new(Some("a"), "x")]).unwrap_err();
        assert!(matches!(err, BrowseError::ReconModeBlocked(_)));
        assert!(d.pending().is_none());
        assert!(matches!(Notice::from_error(&err), Notice::Info(_)));
    }
}
