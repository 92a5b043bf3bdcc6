//! Stable sort keyed by one column with a tri-state direction.

use std::borrow::Borrow;
use std::cmp::Ordering;

use kbrowse_core::{
    columns::{ColumnKind, FieldKind, KindSpec},
    FieldValue, ResourceItem,
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SortState {
    pub field: Option<ColumnKind>,
    pub direction: Option<SortDirection>,
}

impl SortState {
    pub fn new(field: ColumnKind, direction: SortDirection) -> Self {
        Self { field: Some(field), direction: Some(direction) }
    }

    pub fn is_active(&self) -> bool {
        self.field.is_some() && self.direction.is_some()
    }

    /// Header click: asc → desc → none on the same field; a new field starts at asc.
    pub fn click(&mut self, field: ColumnKind) {
        if self.field != Some(field) {
            *self = Self::new(field, SortDirection::Asc);
            return;
        }
        *self = match self.direction {
            None => Self::new(field, SortDirection::Asc),
            Some(SortDirection::Asc) => Self::new(field, SortDirection::Desc),
            Some(SortDirection::Desc) => Self::default(),
        };
    }
}

/// Case-insensitive primary ordering; on case-only ties lowercase sorts first.
pub fn locale_cmp(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| b.cmp(a))
}

fn num_key(v: &FieldValue) -> i64 {
    match v {
        FieldValue::Number(n) | FieldValue::Timestamp(n) => *n,
        FieldValue::Text(s) => s.trim().parse().unwrap_or(0),
        FieldValue::Missing => 0,
    }
}

/// Ascending comparison of two items on `field`.
pub fn compare(a: &ResourceItem, b: &ResourceItem, field: ColumnKind, spec: &KindSpec) -> Ordering {
    match field {
        ColumnKind::Name => locale_cmp(&a.name, &b.name),
        ColumnKind::Namespace => locale_cmp(a.namespace.as_deref().unwrap_or(""), b.namespace.as_deref().unwrap_or("")),
        ColumnKind::Age => a.creation_ts.cmp(&b.creation_ts),
        ColumnKind::Field(id) => {
            let (va, vb) = (a.field(id), b.field(id));
            match spec.field_kind(id) {
                FieldKind::Number | FieldKind::Timestamp => num_key(va).cmp(&num_key(vb)),
                FieldKind::Text => locale_cmp(&va.render(), &vb.render()),
            }
        }
    }
}

/// Sort in place; stable, and a no-op when no sort is active.
pub fn sort_items<T: Borrow<ResourceItem>>(items: &mut [T], state: SortState, spec: &KindSpec) {
    let (Some(field), Some(direction)) = (state.field, state.direction) else {
        return;
    };
    match direction {
        SortDirection::Asc => items.sort_by(|a, b| compare(a.borrow(), b.borrow(), field, spec)),
        SortDirection::Desc => items.sort_by(|a, b| compare(b.borrow(), a.borrow(), field, spec)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbrowse_core::columns::{builtin_kind, HPA_CURRENT, HPA_TARGET};

    fn hpa(name: &str, ts: Option<&str>, current: i64, target: &str) -> ResourceItem {
        let spec = builtin_kind("hpa").unwrap();
        let mut meta = serde_json::json!({ "name": name, "namespace": "default" });
        if let Some(ts) = ts {
            meta["creationTimestamp"] = serde_json::Value::String(ts.to_string());
        }
        let raw = serde_json::json!({
            "metadata": meta,
            "spec": { "scaleTargetRef": { "kind": "Deployment", "name": target }, "maxReplicas": 10 },
            "status": { "currentReplicas": current }
        });
        ResourceItem::from_raw(raw, Some(spec.projector.as_ref())).unwrap()
    }

    fn names(v: &[ResourceItem]) -> Vec<&str> {
        v.iter().map(|i| i.name.as_str()).collect()
    }

    #[test]
    fn click_cycles_asc_desc_none_and_resets_on_new_field() {
        let mut s = SortState::default();
        s.click(ColumnKind::Name);
        assert_eq!(s, SortState::new(ColumnKind::Name, SortDirection::Asc));
        s.click(ColumnKind::Name);
        assert_eq!(s.direction, Some(SortDirection::Desc));
        s.click(ColumnKind::Name);
        assert_eq!(s, SortState::default());
        s.click(ColumnKind::Name);
        s.click(ColumnKind::Age);
        assert_eq!(s, SortState::new(ColumnKind::Age, SortDirection::Asc));
    }

    #[test]
    fn numeric_fields_sort_numerically() {
        let spec = builtin_kind("hpa").unwrap();
        let mut items = vec![hpa("a", None, 10, "x"), hpa("b", None, 9, "y"), hpa("c", None, 100, "z")];
        sort_items(&mut items, SortState::new(ColumnKind::Field(HPA_CURRENT), SortDirection::Asc), &spec);
        assert_eq!(names(&items), vec!["b", "a", "c"]);
    }

    #[test]
    fn missing_timestamp_sorts_as_epoch_zero() {
        let spec = builtin_kind("hpa").unwrap();
        let mut items = vec![hpa("new", Some("2024-01-01T00:00:00Z"), 1, "x"), hpa("unknown", None, 1, "y"), hpa("old", Some("2020-01-01T00:00:00Z"), 1, "z")];
        sort_items(&mut items, SortState::new(ColumnKind::Age, SortDirection::Asc), &spec);
        assert_eq!(names(&items), vec!["unknown", "old", "new"]);
    }

    #[test]
    fn asc_then_desc_is_exact_reverse_and_sort_is_idempotent() {
        let spec = builtin_kind("hpa").unwrap();
        let mut items = vec![hpa("b", None, 1, "Web"), hpa("a", None, 1, "api"), hpa("c", None, 1, "cache")];
        let by_target = ColumnKind::Field(HPA_TARGET);
        sort_items(&mut items, SortState::new(by_target, SortDirection::Asc), &spec);
        let asc: Vec<String> = items.iter().map(|i| i.name.clone()).collect();
        assert_eq!(asc, vec!["a", "c", "b"]);
        sort_items(&mut items, SortState::new(by_target, SortDirection::Asc), &spec);
        assert_eq!(names(&items), asc);
        sort_items(&mut items, SortState::new(by_target, SortDirection::Desc), &spec);
        let mut rev = asc.clone();
        rev.reverse();
        assert_eq!(names(&items), rev);
    }

    #[test]
    fn inactive_sort_keeps_order_and_ties_are_stable() {
        let spec = builtin_kind("hpa").unwrap();
        let mut items = vec![hpa("z", None, 2, "x"), hpa("y", None, 1, "x"), hpa("x", None, 2, "x")];
        sort_items(&mut items, SortState::default(), &spec);
        assert_eq!(names(&items), vec!["z", "y", "x"]);
        sort_items(&mut items, SortState::new(ColumnKind::Field(HPA_CURRENT), SortDirection::Desc), &spec);
        assert_eq!(names(&items), vec!["z", "x", "y"]);
    }
}
