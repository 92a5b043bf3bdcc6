//! Per-kind column layout persisted under `<resourceType>.columnConfig`.

use std::sync::Arc;

use kbrowse_core::{
    columns::{Column, ColumnConfig, KindSpec},
    BrowseError, BrowseResult,
};
use kbrowse_persist::{column_config_key, Config, KvStore};
use tracing::{debug, info};

pub struct ColumnStore {
    config: Config<ColumnConfig>,
    defaults: ColumnConfig,
    columns: ColumnConfig,
}

fn find<'a>(cols: &'a [Column], key: &str) -> Option<&'a Column> {
    cols.iter().find_map(|c| if c.key == key { Some(c) } else { find(&c.children, key) })
}

fn find_mut<'a>(cols: &'a mut [Column], key: &str) -> Option<&'a mut Column> {
    for c in cols.iter_mut() {
        if c.key == key {
            return Some(c);
        }
        if let Some(hit) = find_mut(&mut c.children, key) {
            return Some(hit);
        }
    }
    None
}

/// Fit a stored layout to the current defaults. Stored order and visibility
/// win for known columns; unknown keys are dropped, columns missing from the
/// payload are appended, and pinned columns stay visible and locked.
fn reconcile(stored: &[Column], defaults: &[Column]) -> ColumnConfig {
    let mut out: ColumnConfig = Vec::with_capacity(defaults.len());
    for s in stored {
        let Some(d) = defaults.iter().find(|d| d.key == s.key) else {
            debug!(key = %s.key, "dropping unknown stored column");
            continue;
        };
        if out.iter().any(|c| c.key == s.key) {
            continue;
        }
        let mut col = d.clone();
        if d.can_toggle {
            col.visible = s.visible;
        }
        col.children = reconcile(&s.children, &d.children);
        out.push(col);
    }
    for d in defaults {
        if !out.iter().any(|c| c.key == d.key) {
            debug!(key = %d.key, "adding column missing from stored layout");
            out.push(d.clone());
        }
    }
    out
}

impl ColumnStore {
    pub fn open(store: Arc<dyn KvStore>, spec: &KindSpec) -> Self {
        let config = Config::new(store, column_config_key(spec.kind.resource_type()));
        let defaults = spec.default_columns();
        let columns = reconcile(&config.load(defaults.clone()), &defaults);
        Self { config, defaults, columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn storage_key(&self) -> &str {
        self.config.key()
    }

    /// Unknown keys are visible.
    pub fn is_visible(&self, key: &str) -> bool {
        find(&self.columns, key).map(|c| c.visible).unwrap_or(true)
    }

    /// Leaf column keys to render, in order. Children of a hidden group are hidden.
    pub fn visible_leaves(&self) -> Vec<&str> {
        fn walk<'a>(cols: &'a [Column], out: &mut Vec<&'a str>) {
            for c in cols.iter().filter(|c| c.visible) {
                if c.children.is_empty() {
                    out.push(&c.key);
                } else {
                    walk(&c.children, out);
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.columns, &mut out);
        out
    }

    pub fn toggle(&mut self, key: &str, visible: bool) -> BrowseResult<()> {
        let col = find_mut(&mut self.columns, key)
            .ok_or_else(|| BrowseError::Validation(format!("unknown column '{}'", key)))?;
        if !col.can_toggle {
            return Err(BrowseError::Validation(format!("column '{}' is pinned", key)));
        }
        if col.visible == visible {
            return Ok(());
        }
        col.visible = visible;
        debug!(key, visible, "column visibility changed");
        self.config.save(&self.columns)
    }

    /// Reorder top-level columns. `order` must name each of them exactly once.
    pub fn reorder(&mut self, order: &[&str]) -> BrowseResult<()> {
        if order.len() != self.columns.len() {
            return Err(BrowseError::Validation(format!(
                "reorder expects {} columns, got {}",
                self.columns.len(),
                order.len()
            )));
        }
        for (i, key) in order.iter().enumerate() {
            if order[..i].contains(key) || !self.columns.iter().any(|c| c.key == *key) {
                return Err(BrowseError::Validation(format!("'{}' is not a top-level column or is repeated", key)));
            }
        }
        self.columns.sort_by_key(|c| order.iter().position(|k| *k == c.key));
        self.config.save(&self.columns)
    }

    /// Drop the stored layout and go back to the built-in one.
    pub fn reset_to_default(&mut self) -> BrowseResult<()> {
        self.config.clear()?;
        self.columns = self.defaults.clone();
        info!(key = %self.config.key(), "column layout reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbrowse_core::columns::builtin_kind;
    use kbrowse_persist::MemoryStore;

    fn keys(cols: &[Column]) -> Vec<&str> {
        cols.iter().map(|c| c.key.as_str()).collect()
    }

    #[test]
    fn reorder_rejects_non_permutations_and_keeps_layout() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let spec = builtin_kind("cm").unwrap();
        let mut cols = ColumnStore::open(store, &spec);
        let before: Vec<String> = keys(cols.columns()).iter().map(|s| s.to_string()).collect();
        assert!(cols.reorder(&["name"]).is_err());
        let mut dup: Vec<&str> = before.iter().map(String::as_str).collect();
        dup[1] = "name";
        assert!(cols.reorder(&dup).is_err());
        let now: Vec<&str> = keys(cols.columns());
        let mut sorted_now = now.clone();
        sorted_now.sort();
        let mut sorted_before: Vec<&str> = before.iter().map(String::as_str).collect();
        sorted_before.sort();
        assert_eq!(sorted_now, sorted_before);
    }

    #[test]
    fn stored_payload_cannot_unpin() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let spec = builtin_kind("cm").unwrap();
        let mut tampered = spec.default_columns();
        tampered[0].visible = false;
        tampered[0].can_toggle = true;
        store.put("configmaps.columnConfig", &serde_json::to_string(&tampered).unwrap()).unwrap();
        let cols = ColumnStore::open(store, &spec);
        assert!(cols.is_visible("name"));
        assert!(!cols.columns()[0].can_toggle);
    }

    #[test]
    fn stored_layout_gains_new_columns_and_loses_unknown_ones() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let spec = builtin_kind("cm").unwrap();
        let mut stored: ColumnConfig = spec.default_columns().into_iter().filter(|c| c.key != "namespace").collect();
        stored.reverse();
        stored.iter_mut().filter(|c| c.key == "data").for_each(|c| c.visible = false);
        stored.push(Column::new("legacy", "Legacy"));
        store.put("configmaps.columnConfig", &serde_json::to_string(&stored).unwrap()).unwrap();

        let mut cols = ColumnStore::open(store, &spec);
        assert_eq!(keys(cols.columns()), vec!["actions", "age", "data", "name", "namespace"]);
        assert!(!cols.is_visible("data"));
        assert_eq!(cols.visible_leaves(), vec!["actions", "age", "name", "namespace"]);
        assert!(cols.toggle("legacy", false).is_err());
        assert!(cols.reorder(&["name", "namespace", "data", "age", "actions"]).is_ok());
    }
}
