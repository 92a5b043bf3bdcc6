#![forbid(unsafe_code)]

use std::sync::Arc;

use kbrowse_core::{
    columns::{builtin_kind, ColumnKind},
    BrowseError, ItemKey, ResourceItem,
};
use kbrowse_persist::{KvStore, MemoryStore};
use kbrowse_table::{Browser, ColumnStore, InputEvent, LoadState, SelectionOutcome, SortDirection, SortState};

fn hpa(name: &str, ns: &str, annotations: serde_json::Value) -> ResourceItem {
    let spec = builtin_kind("hpa").unwrap();
    let raw = serde_json::json!({
        "metadata": { "name": name, "namespace": ns, "annotations": annotations,
                      "creationTimestamp": "2021-06-01T00:00:00Z" },
        "spec": { "scaleTargetRef": { "kind": "Deployment", "name": name }, "maxReplicas": 4 }
    });
    ResourceItem::from_raw(raw, Some(spec.projector.as_ref())).unwrap()
}

fn three() -> Vec<ResourceItem> {
    vec![
        hpa("a", "ns1", serde_json::json!({})),
        hpa("b", "ns1", serde_json::json!({ "alert": "severity=critical" })),
        hpa("c", "ns2", serde_json::json!({})),
    ]
}

fn ready_browser() -> Browser {
    let mut b = Browser::new(builtin_kind("hpa").unwrap(), "test");
    let generation = b.begin_load();
    assert!(b.complete_load(generation, Ok(three())));
    b
}

fn names(b: &Browser) -> Vec<String> {
    b.view().iter().map(|i| i.name.clone()).collect()
}

#[test]
fn namespace_selection_narrows_the_view() {
    let mut b = ready_browser();
    let generation = b.set_namespaces(vec!["ns1".to_string()]);
    assert_eq!(*b.state(), LoadState::Loading);
    b.complete_load(generation, Ok(three()));
    assert_eq!(names(&b), vec!["a", "b"]);
}

#[test]
fn search_reaches_annotation_values() {
    let mut b = ready_browser();
    b.handle_event(InputEvent::Search("critical".to_string()));
    assert_eq!(names(&b), vec!["b"]);
    b.handle_event(InputEvent::Search(String::new()));
    assert_eq!(names(&b), vec!["a", "b", "c"]);
}

#[test]
fn plain_click_then_modifier_click_selects_only_the_second_row() {
    let mut b = ready_browser();
    let a = ItemKey::new(Some("ns1"), "a");
    let bk = ItemKey::new(Some("ns1"), "b");
    assert_eq!(b.handle_event(InputEvent::RowClick { key: a.clone(), modifier: false }), SelectionOutcome::Navigate(a));
    b.handle_event(InputEvent::RowClick { key: bk.clone(), modifier: true });
    assert_eq!(b.selected_keys(), vec![bk]);
}

#[test]
fn stale_generation_is_discarded() {
    let mut b = Browser::new(builtin_kind("hpa").unwrap(), "test");
    let old = b.begin_load();
    let new = b.begin_load();
    assert!(!b.complete_load(old, Err(BrowseError::Fetch("late".into()))));
    assert_eq!(*b.state(), LoadState::Loading);
    assert!(b.complete_load(new, Ok(three())));
    assert_eq!(*b.state(), LoadState::Ready);
    assert!(!b.complete_load(old, Ok(Vec::new())));
    assert_eq!(b.items().len(), 3);
}

#[test]
fn failed_load_shows_error_and_drops_rows() {
    let mut b = ready_browser();
    let generation = b.begin_load();
    b.complete_load(generation, Err(BrowseError::Fetch("forbidden".into())));
    assert!(matches!(b.state(), LoadState::Error(BrowseError::Fetch(_))));
    assert!(b.view().is_empty());
}

#[test]
fn reload_prunes_selection_of_vanished_items() {
    let mut b = ready_browser();
    b.handle_event(InputEvent::RowClick { key: ItemKey::new(Some("ns1"), "a"), modifier: true });
    b.handle_event(InputEvent::RowClick { key: ItemKey::new(Some("ns2"), "c"), modifier: true });
    let generation = b.begin_load();
    let mut remaining = three();
    remaining.remove(0);
    b.complete_load(generation, Ok(remaining));
    assert_eq!(b.selected_keys(), vec![ItemKey::new(Some("ns2"), "c")]);
}

#[test]
fn header_clicks_drive_the_view_and_publish_snapshots() {
    let mut b = ready_browser();
    let handle = b.handle();
    let before = handle.current().epoch;
    b.handle_event(InputEvent::HeaderClick(ColumnKind::Name));
    b.handle_event(InputEvent::HeaderClick(ColumnKind::Name));
    assert_eq!(b.sort(), SortState::new(ColumnKind::Name, SortDirection::Desc));
    assert_eq!(names(&b), vec!["c", "b", "a"]);
    let snap = handle.current();
    assert!(snap.epoch > before);
    assert_eq!(snap.rows.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(), vec!["c", "b", "a"]);
    assert_eq!(*handle.subscribe_epoch().borrow(), snap.epoch);
}

#[test]
fn column_layout_survives_reopen_and_reset() {
    let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    let spec = builtin_kind("hpa").unwrap();

    let mut cols = ColumnStore::open(Arc::clone(&store), &spec);
    assert_eq!(cols.storage_key(), "horizontalpodautoscalers.columnConfig");
    cols.toggle("namespace", false).unwrap();
    cols.toggle("minReplicas", false).unwrap();
    assert!(matches!(cols.toggle("name", false), Err(BrowseError::Validation(_))));
    assert!(matches!(cols.toggle("actions", false), Err(BrowseError::Validation(_))));

    let cols = ColumnStore::open(Arc::clone(&store), &spec);
    assert!(!cols.is_visible("namespace"));
    assert!(!cols.is_visible("minReplicas"));
    assert!(cols.is_visible("maxReplicas"));
    assert!(cols.is_visible("not-a-column"));
    assert!(!cols.visible_leaves().contains(&"minReplicas"));

    let mut cols = cols;
    cols.reset_to_default().unwrap();
    assert!(cols.is_visible("namespace"));
    assert!(store.get("horizontalpodautoscalers.columnConfig").unwrap().is_none());
}

#[test]
fn reorder_persists_a_permutation() {
    let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    let spec = builtin_kind("cm").unwrap();
    let mut cols = ColumnStore::open(Arc::clone(&store), &spec);
    let mut order: Vec<String> = cols.columns().iter().map(|c| c.key.clone()).collect();
    order.reverse();
    let order_refs: Vec<&str> = order.iter().map(String::as_str).collect();
    cols.reorder(&order_refs).unwrap();

    let reopened = ColumnStore::open(store, &spec);
    let keys: Vec<&str> = reopened.columns().iter().map(|c| c.key.as_str()).collect();
    assert_eq!(keys, order_refs);
}

#[test]
fn clicks_on_unknown_rows_leave_selection_alone() {
    let mut b = ready_browser();
    let ghost = ItemKey::new(Some("ns1"), "ghost");
    assert_eq!(b.handle_event(InputEvent::RowClick { key: ghost.clone(), modifier: true }), SelectionOutcome::Unchanged);
    assert_eq!(b.handle_event(InputEvent::RowContextMenu { key: ghost }), SelectionOutcome::Unchanged);
    assert!(b.selection().is_empty());
}
