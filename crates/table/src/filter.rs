//! Full-text filter over the canonical item list.

use std::borrow::Borrow;

use kbrowse_core::{columns::KindSpec, ResourceItem};

/// Case-insensitive substring match against name, namespace, the kind's
/// searchable fields and every label/annotation key and value.
/// `query_lower` must already be lowercased and non-empty.
pub fn matches(item: &ResourceItem, query_lower: &str, spec: &KindSpec) -> bool {
    let hit = |s: &str| s.to_lowercase().contains(query_lower);
    if hit(&item.name) {
        return true;
    }
    if item.namespace.as_deref().map(hit).unwrap_or(false) {
        return true;
    }
    if spec.searchable_fields().any(|f| hit(&item.field(f.id).render())) {
        return true;
    }
    item.labels.iter().chain(item.annotations.iter()).any(|(k, v)| hit(k) || hit(v))
}

/// Items matching `query`, in input order. A blank query keeps everything.
pub fn filter_items<T>(items: &[T], query: &str, spec: &KindSpec) -> Vec<T>
where
    T: Borrow<ResourceItem> + Clone,
{
    let q = query.trim().to_lowercase();
    if q.is_empty() {
        return items.to_vec();
    }
    items.iter().filter(|it| matches((*it).borrow(), &q, spec)).cloned().collect()
}

/// Namespace selection applied client-side; an empty selection keeps all.
pub fn in_namespaces(item: &ResourceItem, selected: &[String]) -> bool {
    if selected.is_empty() {
        return true;
    }
    match item.namespace.as_deref() {
        Some(ns) => selected.iter().any(|s| s == ns),
        // cluster-scoped objects are not partitioned
        None => true,
    }
}
