//! kbrowse core types: resource snapshots, identity keys and projected field values.

#![forbid(unsafe_code)]

pub mod columns;
pub mod error;

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

pub use error::{BrowseError, BrowseResult};

/// Namespace placeholder used in identity strings of cluster-scoped objects.
pub const CLUSTER_SCOPED: &str = "cluster-scoped";

/// Identity of an object within one kind: `(namespace, name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemKey {
    pub namespace: Option<String>,
    pub name: String,
}

impl ItemKey {
    pub fn new(namespace: Option<&str>, name: &str) -> Self {
        Self { namespace: namespace.map(str::to_string), name: name.to_string() }
    }

    /// Parse the `"{namespace}/{name}"` form. A bare name or the
    /// `cluster-scoped` sentinel yields a key without namespace.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }
        match s.split_once('/') {
            Some((_, "")) | Some(("", _)) => None,
            Some((ns, name)) if ns == CLUSTER_SCOPED => Some(Self::new(None, name)),
            Some((ns, name)) => Some(Self::new(Some(ns), name)),
            None => Some(Self::new(None, s)),
        }
    }

    pub fn namespace_or_sentinel(&self) -> &str {
        self.namespace.as_deref().unwrap_or(CLUSTER_SCOPED)
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace_or_sentinel(), self.name)
    }
}

/// A kind-specific value extracted from the raw object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Number(i64),
    /// Epoch milliseconds.
    Timestamp(i64),
    Missing,
}

impl FieldValue {
    /// Text rendering used for table cells and full-text search.
    pub fn render(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Number(n) => n.to_string(),
            Self::Timestamp(ms) => chrono::DateTime::from_timestamp_millis(*ms)
                .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
                .unwrap_or_default(),
            Self::Missing => String::new(),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }
}

static MISSING: FieldValue = FieldValue::Missing;

/// `(FieldId, value)` pair produced by a [`Projector`].
pub type ProjectedEntry = (u32, FieldValue);

/// Projector takes a raw JSON object and yields its kind-specific fields.
pub trait Projector: Send + Sync {
    fn project(&self, raw: &serde_json::Value) -> SmallVec<[ProjectedEntry; 8]>;
}

/// Immutable snapshot of one object, replaced wholesale on every fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceItem {
    pub namespace: Option<String>,
    pub name: String,
    /// Creation time in epoch milliseconds, 0 when absent.
    pub creation_ts: i64,
    pub labels: SmallVec<[(String, String); 8]>,
    pub annotations: SmallVec<[(String, String); 4]>,
    pub projected: SmallVec<[ProjectedEntry; 8]>,
    #[serde(skip_serializing_if = "serde_json::Value::is_null", default)]
    pub raw: serde_json::Value,
}

impl ResourceItem {
    /// Shape a raw Kubernetes object. `metadata.name` is required.
    pub fn from_raw(raw: serde_json::Value, projector: Option<&dyn Projector>) -> BrowseResult<Self> {
        let meta = raw
            .get("metadata")
            .ok_or_else(|| BrowseError::Decode("object has no metadata".into()))?;
        let name = meta
            .get("name")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| BrowseError::Decode("object has no metadata.name".into()))?
            .to_string();
        let namespace = meta
            .get("namespace")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let creation_ts = meta
            .get("creationTimestamp")
            .and_then(|v| v.as_str())
            .and_then(parse_timestamp_ms)
            .unwrap_or(0);
        let labels = string_pairs(meta.get("labels"));
        let annotations = string_pairs(meta.get("annotations"));
        let projected = projector.map(|p| p.project(&raw)).unwrap_or_default();
        Ok(Self { namespace, name, creation_ts, labels, annotations, projected, raw })
    }

    pub fn key(&self) -> ItemKey {
        ItemKey { namespace: self.namespace.clone(), name: self.name.clone() }
    }

    pub fn field(&self, id: u32) -> &FieldValue {
        self.projected.iter().find(|(k, _)| *k == id).map(|(_, v)| v).unwrap_or(&MISSING)
    }
}

fn string_pairs<A>(v: Option<&serde_json::Value>) -> SmallVec<A>
where
    A: smallvec::Array<Item = (String, String)>,
{
    let mut out = SmallVec::new();
    if let Some(map) = v.and_then(|v| v.as_object()) {
        for (k, v) in map {
            out.push((k.clone(), v.as_str().unwrap_or_default().to_string()));
        }
    }
    out
}

/// RFC 3339 → epoch milliseconds.
pub fn parse_timestamp_ms(s: &str) -> Option<i64> {
    chrono::DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.timestamp_millis())
}

/// Human age like `5d`, `3h`, `12m`, `40s`; `-` when the timestamp is unknown.
pub fn render_age(creation_ts_ms: i64, now_ms: i64) -> String {
    if creation_ts_ms <= 0 {
        return "-".to_string();
    }
    let secs = ((now_ms - creation_ts_ms) / 1000).max(0);
    match secs {
        s if s >= 86_400 => format!("{}d", s / 86_400),
        s if s >= 3_600 => format!("{}h", s / 3_600),
        s if s >= 60 => format!("{}m", s / 60),
        s => format!("{}s", s),
    }
}

/// A served Kubernetes kind together with the API versions to try.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceKind {
    pub group: String,
    /// Preferred version.
    pub version: String,
    /// Legacy versions tried in order when the preferred one is unavailable.
    #[serde(default)]
    pub fallback_versions: Vec<String>,
    pub kind: String,
    pub plural: String,
    pub namespaced: bool,
}

impl ResourceKind {
    pub fn gvk_key(&self) -> String {
        gvk_key(&self.group, &self.version, &self.kind)
    }

    /// Preferred version first, then fallbacks.
    pub fn versions(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.version.as_str()).chain(self.fallback_versions.iter().map(String::as_str))
    }

    /// Identifier used for per-kind persisted settings.
    pub fn resource_type(&self) -> &str {
        &self.plural
    }
}

pub fn gvk_key(group: &str, version: &str, kind: &str) -> String {
    if group.is_empty() { format!("{}/{}", version, kind) } else { format!("{}/{}/{}", group, version, kind) }
}

pub mod prelude {
    pub use super::columns::{Column, ColumnConfig, ColumnKind, FieldDef, FieldKind, KindSpec};
    pub use super::{BrowseError, BrowseResult, FieldValue, ItemKey, Projector, ResourceItem, ResourceKind};
}
