//! Built-in kinds, field accessors and default column configs.
//!
//! This module provides:
//! - Stable field IDs + definitions (key, label, value kind, searchability)
//! - A registry mapping CLI tokens to kind specs
//! - A JSON projector for built-ins that fills `ResourceItem.projected`
//! - The hardcoded default `ColumnConfig` for each kind

#![forbid(unsafe_code)]

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::{parse_timestamp_ms, FieldValue, ProjectedEntry, Projector, ResourceKind};

/// Sortable/renderable column identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnKind {
    Namespace,
    Name,
    Age,
    Field(u32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
    Timestamp,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDef {
    pub id: u32,
    pub key: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    /// Included in full-text filtering.
    pub searchable: bool,
}

/// One entry of a user-configurable column layout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub key: String,
    pub label: String,
    pub visible: bool,
    pub can_toggle: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Column>,
}

impl Column {
    pub fn new(key: &str, label: &str) -> Self {
        Self { key: key.to_string(), label: label.to_string(), visible: true, can_toggle: true, children: Vec::new() }
    }

    pub fn pinned(key: &str, label: &str) -> Self {
        Self { can_toggle: false, ..Self::new(key, label) }
    }

    pub fn group(key: &str, label: &str, children: Vec<Column>) -> Self {
        Self { children, ..Self::new(key, label) }
    }
}

pub type ColumnConfig = Vec<Column>;

pub const NAME_KEY: &str = "name";
pub const NAMESPACE_KEY: &str = "namespace";
pub const AGE_KEY: &str = "age";
pub const ACTIONS_KEY: &str = "actions";

// ---------------- Field IDs (stable) ----------------
// Pods
pub const POD_READY: u32 = 10_001;
pub const POD_STATUS: u32 = 10_002;
pub const POD_RESTARTS: u32 = 10_003;
pub const POD_NODE: u32 = 10_004;

// Deployments
pub const DEP_READY: u32 = 11_001;
pub const DEP_UPDATED: u32 = 11_002;
pub const DEP_AVAILABLE: u32 = 11_003;

// StatefulSets
pub const STS_READY: u32 = 12_001;

// Services
pub const SVC_TYPE: u32 = 13_001;
pub const SVC_CLUSTER_IP: u32 = 13_002;
pub const SVC_PORTS: u32 = 13_004;

// DaemonSets
pub const DS_DESIRED: u32 = 15_001;
pub const DS_READY: u32 = 15_003;
pub const DS_AVAILABLE: u32 = 15_005;

// Jobs
pub const JOB_COMPLETIONS: u32 = 16_001;
pub const JOB_STATUS: u32 = 16_002;

// CronJobs
pub const CJ_SCHEDULE: u32 = 17_001;
pub const CJ_SUSPEND: u32 = 17_002;
pub const CJ_ACTIVE: u32 = 17_003;
pub const CJ_LAST_SCHEDULE: u32 = 17_004;

// Nodes
pub const NODE_STATUS: u32 = 19_001;
pub const NODE_ROLES: u32 = 19_002;
pub const NODE_VERSION: u32 = 19_003;

// Namespaces
pub const NS_STATUS: u32 = 20_001;

// HorizontalPodAutoscalers
pub const HPA_TARGET: u32 = 21_001;
pub const HPA_MIN: u32 = 21_002;
pub const HPA_MAX: u32 = 21_003;
pub const HPA_CURRENT: u32 = 21_004;
pub const HPA_METRICS: u32 = 21_005;

// ConfigMaps
pub const CM_DATA: u32 = 22_001;

fn text(id: u32, key: &'static str, label: &'static str) -> FieldDef {
    FieldDef { id, key, label, kind: FieldKind::Text, searchable: false }
}

fn searchable(id: u32, key: &'static str, label: &'static str) -> FieldDef {
    FieldDef { searchable: true, ..text(id, key, label) }
}

fn number(id: u32, key: &'static str, label: &'static str) -> FieldDef {
    FieldDef { kind: FieldKind::Number, ..text(id, key, label) }
}

fn timestamp(id: u32, key: &'static str, label: &'static str) -> FieldDef {
    FieldDef { kind: FieldKind::Timestamp, ..text(id, key, label) }
}

/// Everything the generic browser needs to know about one kind.
#[derive(Clone)]
pub struct KindSpec {
    pub kind: ResourceKind,
    pub aliases: &'static [&'static str],
    pub fields: Vec<FieldDef>,
    /// Column groups: `(group key, label, member field keys)`.
    pub groups: Vec<(&'static str, &'static str, Vec<&'static str>)>,
    pub projector: Arc<dyn Projector>,
}

impl fmt::Debug for KindSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KindSpec")
            .field("kind", &self.kind)
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

impl KindSpec {
    /// Generic spec for kinds without opinionated fields.
    pub fn generic(kind: ResourceKind) -> Self {
        Self { kind, aliases: &[], fields: Vec::new(), groups: Vec::new(), projector: Arc::new(NoopProjector) }
    }

    pub fn field_by_key(&self, key: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.key == key)
    }

    pub fn searchable_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.searchable)
    }

    /// Resolve a column key to its sortable identity.
    pub fn column_kind(&self, key: &str) -> Option<ColumnKind> {
        match key {
            NAME_KEY => Some(ColumnKind::Name),
            NAMESPACE_KEY if self.kind.namespaced => Some(ColumnKind::Namespace),
            AGE_KEY => Some(ColumnKind::Age),
            _ => self.field_by_key(key).map(|f| ColumnKind::Field(f.id)),
        }
    }

    pub fn field_kind(&self, id: u32) -> FieldKind {
        self.fields.iter().find(|f| f.id == id).map(|f| f.kind).unwrap_or(FieldKind::Text)
    }

    /// Hardcoded default layout: everything visible, `name` and `actions` pinned.
    pub fn default_columns(&self) -> ColumnConfig {
        let mut cols = vec![Column::pinned(NAME_KEY, "Name")];
        if self.kind.namespaced {
            cols.push(Column::new(NAMESPACE_KEY, "Namespace"));
        }
        let mut grouped: Vec<&str> = Vec::new();
        for f in &self.fields {
            if grouped.contains(&f.key) {
                continue;
            }
            if let Some((gkey, glabel, members)) = self.groups.iter().find(|(_, _, m)| m.contains(&f.key)) {
                let children = members
                    .iter()
                    .filter_map(|k| self.field_by_key(k))
                    .map(|m| Column::new(m.key, m.label))
                    .collect();
                cols.push(Column::group(gkey, glabel, children));
                grouped.extend(members.iter().copied());
                continue;
            }
            cols.push(Column::new(f.key, f.label));
        }
        cols.push(Column::new(AGE_KEY, "Age"));
        cols.push(Column::pinned(ACTIONS_KEY, "Actions"));
        cols
    }
}

fn kind(group: &str, version: &str, fallbacks: &[&str], kind: &str, plural: &str, namespaced: bool) -> ResourceKind {
    ResourceKind {
        group: group.to_string(),
        version: version.to_string(),
        fallback_versions: fallbacks.iter().map(|s| s.to_string()).collect(),
        kind: kind.to_string(),
        plural: plural.to_string(),
        namespaced,
    }
}

fn spec(rk: ResourceKind, aliases: &'static [&'static str], fields: Vec<FieldDef>) -> KindSpec {
    let projector = Arc::new(BuiltinProjector { kind: rk.kind.clone() });
    KindSpec { kind: rk, aliases, fields, groups: Vec::new(), projector }
}

/// All built-in kinds, in display order.
pub fn builtin_kinds() -> Vec<KindSpec> {
    let mut hpa = spec(
        kind("autoscaling", "v2", &["v1"], "HorizontalPodAutoscaler", "horizontalpodautoscalers", true),
        &["hpa", "hpas", "horizontalpodautoscaler", "horizontalpodautoscalers"],
        vec![
            searchable(HPA_TARGET, "reference", "Reference"),
            number(HPA_MIN, "minReplicas", "Min"),
            number(HPA_MAX, "maxReplicas", "Max"),
            number(HPA_CURRENT, "currentReplicas", "Current"),
            searchable(HPA_METRICS, "metrics", "Metrics"),
        ],
    );
    hpa.groups.push(("replicas", "Replicas", vec!["minReplicas", "maxReplicas", "currentReplicas"]));

    vec![
        spec(
            kind("", "v1", &[], "Pod", "pods", true),
            &["po", "pod", "pods"],
            vec![
                text(POD_READY, "ready", "Ready"),
                searchable(POD_STATUS, "status", "Status"),
                number(POD_RESTARTS, "restarts", "Restarts"),
                searchable(POD_NODE, "node", "Node"),
            ],
        ),
        spec(
            kind("apps", "v1", &[], "Deployment", "deployments", true),
            &["deploy", "deployment", "deployments"],
            vec![
                text(DEP_READY, "ready", "Ready"),
                number(DEP_UPDATED, "upToDate", "Up-to-date"),
                number(DEP_AVAILABLE, "available", "Available"),
            ],
        ),
        spec(
            kind("apps", "v1", &[], "StatefulSet", "statefulsets", true),
            &["sts", "statefulset", "statefulsets"],
            vec![text(STS_READY, "ready", "Ready")],
        ),
        spec(
            kind("apps", "v1", &[], "DaemonSet", "daemonsets", true),
            &["ds", "daemonset", "daemonsets"],
            vec![
                number(DS_DESIRED, "desired", "Desired"),
                number(DS_READY, "ready", "Ready"),
                number(DS_AVAILABLE, "available", "Available"),
            ],
        ),
        spec(
            kind("", "v1", &[], "Service", "services", true),
            &["svc", "service", "services"],
            vec![
                searchable(SVC_TYPE, "type", "Type"),
                text(SVC_CLUSTER_IP, "clusterIP", "Cluster IP"),
                searchable(SVC_PORTS, "ports", "Ports"),
            ],
        ),
        spec(
            kind("", "v1", &[], "ConfigMap", "configmaps", true),
            &["cm", "configmap", "configmaps"],
            vec![number(CM_DATA, "data", "Data")],
        ),
        spec(
            kind("batch", "v1", &[], "Job", "jobs", true),
            &["job", "jobs"],
            vec![text(JOB_COMPLETIONS, "completions", "Completions"), searchable(JOB_STATUS, "status", "Status")],
        ),
        spec(
            kind("batch", "v1", &["v1beta1"], "CronJob", "cronjobs", true),
            &["cj", "cronjob", "cronjobs"],
            vec![
                searchable(CJ_SCHEDULE, "schedule", "Schedule"),
                text(CJ_SUSPEND, "suspend", "Suspend"),
                number(CJ_ACTIVE, "active", "Active"),
                timestamp(CJ_LAST_SCHEDULE, "lastSchedule", "Last Schedule"),
            ],
        ),
        hpa,
        spec(
            kind("", "v1", &[], "Node", "nodes", false),
            &["no", "node", "nodes"],
            vec![
                searchable(NODE_STATUS, "status", "Status"),
                searchable(NODE_ROLES, "roles", "Roles"),
                text(NODE_VERSION, "version", "Version"),
            ],
        ),
        spec(
            kind("", "v1", &[], "Namespace", "namespaces", false),
            &["ns", "namespace", "namespaces"],
            vec![searchable(NS_STATUS, "status", "Status")],
        ),
    ]
}

/// Look up a built-in kind by alias, kind name or plural (case-insensitive).
pub fn builtin_kind(token: &str) -> Option<KindSpec> {
    let token = token.trim().to_ascii_lowercase();
    builtin_kinds().into_iter().find(|s| {
        s.aliases.contains(&token.as_str())
            || s.kind.kind.eq_ignore_ascii_case(&token)
            || s.kind.plural == token
    })
}

struct NoopProjector;

impl Projector for NoopProjector {
    fn project(&self, _raw: &serde_json::Value) -> SmallVec<[ProjectedEntry; 8]> {
        SmallVec::new()
    }
}

/// Projector for built-in kinds, keyed by kind name so that every served
/// version of a kind shares one projection.
struct BuiltinProjector {
    kind: String,
}

fn ptr_str(raw: &serde_json::Value, path: &str) -> Option<String> {
    raw.pointer(path).and_then(|v| v.as_str()).map(str::to_string)
}

fn ptr_i64(raw: &serde_json::Value, path: &str) -> Option<i64> {
    raw.pointer(path).and_then(|v| v.as_i64())
}

fn num_or_zero(raw: &serde_json::Value, path: &str) -> FieldValue {
    FieldValue::Number(ptr_i64(raw, path).unwrap_or(0))
}

fn text_or_missing(v: Option<String>) -> FieldValue {
    v.map(FieldValue::Text).unwrap_or(FieldValue::Missing)
}

impl BuiltinProjector {
    fn project_pod(&self, raw: &serde_json::Value, out: &mut SmallVec<[ProjectedEntry; 8]>) {
        let mut ready = 0i64;
        let mut total = 0i64;
        let mut restarts = 0i64;
        if let Some(cs) = raw.pointer("/status/containerStatuses").and_then(|v| v.as_array()) {
            total = cs.len() as i64;
            for c in cs {
                if c.get("ready").and_then(|v| v.as_bool()).unwrap_or(false) {
                    ready += 1;
                }
                restarts += c.get("restartCount").and_then(|v| v.as_i64()).unwrap_or(0);
            }
        }
        out.push((POD_READY, FieldValue::Text(format!("{}/{}", ready, total))));
        // Reason (e.g. Evicted) wins over phase
        let status = ptr_str(raw, "/status/reason").filter(|s| !s.is_empty()).or_else(|| ptr_str(raw, "/status/phase"));
        out.push((POD_STATUS, text_or_missing(status)));
        out.push((POD_RESTARTS, FieldValue::Number(restarts)));
        out.push((POD_NODE, text_or_missing(ptr_str(raw, "/spec/nodeName"))));
    }

    fn project_deployment(&self, raw: &serde_json::Value, out: &mut SmallVec<[ProjectedEntry; 8]>) {
        let replicas = ptr_i64(raw, "/status/replicas").unwrap_or(0);
        let ready = ptr_i64(raw, "/status/readyReplicas").unwrap_or(0);
        out.push((DEP_READY, FieldValue::Text(format!("{}/{}", ready, replicas))));
        out.push((DEP_UPDATED, num_or_zero(raw, "/status/updatedReplicas")));
        out.push((DEP_AVAILABLE, num_or_zero(raw, "/status/availableReplicas")));
    }

    fn project_statefulset(&self, raw: &serde_json::Value, out: &mut SmallVec<[ProjectedEntry; 8]>) {
        let replicas = ptr_i64(raw, "/status/replicas").unwrap_or(0);
        let ready = ptr_i64(raw, "/status/readyReplicas").unwrap_or(0);
        out.push((STS_READY, FieldValue::Text(format!("{}/{}", ready, replicas))));
    }

    fn project_daemonset(&self, raw: &serde_json::Value, out: &mut SmallVec<[ProjectedEntry; 8]>) {
        out.push((DS_DESIRED, num_or_zero(raw, "/status/desiredNumberScheduled")));
        out.push((DS_READY, num_or_zero(raw, "/status/numberReady")));
        out.push((DS_AVAILABLE, num_or_zero(raw, "/status/numberAvailable")));
    }

    fn project_service(&self, raw: &serde_json::Value, out: &mut SmallVec<[ProjectedEntry; 8]>) {
        out.push((SVC_TYPE, text_or_missing(ptr_str(raw, "/spec/type"))));
        out.push((SVC_CLUSTER_IP, text_or_missing(ptr_str(raw, "/spec/clusterIP"))));
        if let Some(ports) = raw.pointer("/spec/ports").and_then(|v| v.as_array()) {
            let v: Vec<String> = ports
                .iter()
                .map(|p| {
                    let port = p.get("port").and_then(|v| v.as_u64()).unwrap_or(0);
                    let proto = p.get("protocol").and_then(|v| v.as_str()).unwrap_or("TCP");
                    format!("{}/{}", port, proto)
                })
                .collect();
            if !v.is_empty() {
                out.push((SVC_PORTS, FieldValue::Text(v.join(","))));
            }
        }
    }

    fn project_configmap(&self, raw: &serde_json::Value, out: &mut SmallVec<[ProjectedEntry; 8]>) {
        let data = raw.get("data").and_then(|v| v.as_object()).map(|m| m.len()).unwrap_or(0);
        let binary = raw.get("binaryData").and_then(|v| v.as_object()).map(|m| m.len()).unwrap_or(0);
        out.push((CM_DATA, FieldValue::Number((data + binary) as i64)));
    }

    fn project_job(&self, raw: &serde_json::Value, out: &mut SmallVec<[ProjectedEntry; 8]>) {
        let desired = ptr_i64(raw, "/spec/completions").unwrap_or(1);
        let succeeded = ptr_i64(raw, "/status/succeeded").unwrap_or(0);
        out.push((JOB_COMPLETIONS, FieldValue::Text(format!("{}/{}", succeeded, desired))));
        let mut status = String::new();
        if let Some(conds) = raw.pointer("/status/conditions").and_then(|v| v.as_array()) {
            for c in conds {
                let t = c.get("type").and_then(|v| v.as_str()).unwrap_or("");
                let s = c.get("status").and_then(|v| v.as_str()).unwrap_or("");
                if t == "Complete" && s == "True" {
                    status = "Complete".into();
                    break;
                }
                if t == "Failed" && s == "True" {
                    status = "Failed".into();
                }
            }
        }
        if status.is_empty() && ptr_i64(raw, "/status/active").unwrap_or(0) > 0 {
            status = "Running".into();
        }
        out.push((JOB_STATUS, text_or_missing(Some(status).filter(|s| !s.is_empty()))));
    }

    fn project_cronjob(&self, raw: &serde_json::Value, out: &mut SmallVec<[ProjectedEntry; 8]>) {
        out.push((CJ_SCHEDULE, text_or_missing(ptr_str(raw, "/spec/schedule"))));
        let suspend = raw.pointer("/spec/suspend").and_then(|v| v.as_bool()).unwrap_or(false);
        out.push((CJ_SUSPEND, FieldValue::Text(if suspend { "True".into() } else { "False".into() })));
        let active = raw.pointer("/status/active").and_then(|v| v.as_array()).map(|a| a.len()).unwrap_or(0);
        out.push((CJ_ACTIVE, FieldValue::Number(active as i64)));
        let last = ptr_str(raw, "/status/lastScheduleTime").and_then(|s| parse_timestamp_ms(&s));
        out.push((CJ_LAST_SCHEDULE, last.map(FieldValue::Timestamp).unwrap_or(FieldValue::Missing)));
    }

    /// Handles both `autoscaling/v2` (metrics list) and `autoscaling/v1`
    /// (single CPU target) shapes.
    fn project_hpa(&self, raw: &serde_json::Value, out: &mut SmallVec<[ProjectedEntry; 8]>) {
        let target = match (ptr_str(raw, "/spec/scaleTargetRef/kind"), ptr_str(raw, "/spec/scaleTargetRef/name")) {
            (Some(k), Some(n)) => Some(format!("{}/{}", k, n)),
            (None, Some(n)) => Some(n),
            _ => None,
        };
        out.push((HPA_TARGET, text_or_missing(target)));
        // minReplicas defaults to 1 server-side
        out.push((HPA_MIN, FieldValue::Number(ptr_i64(raw, "/spec/minReplicas").unwrap_or(1))));
        out.push((HPA_MAX, num_or_zero(raw, "/spec/maxReplicas")));
        out.push((HPA_CURRENT, num_or_zero(raw, "/status/currentReplicas")));

        let mut names: Vec<String> = Vec::new();
        if let Some(metrics) = raw.pointer("/spec/metrics").and_then(|v| v.as_array()) {
            for m in metrics {
                let name = ["/resource/name", "/containerResource/name", "/pods/metric/name", "/object/metric/name", "/external/metric/name"]
                    .iter()
                    .find_map(|p| m.pointer(p).and_then(|v| v.as_str()));
                if let Some(n) = name.or_else(|| m.get("type").and_then(|v| v.as_str())) {
                    names.push(n.to_string());
                }
            }
        } else if raw.pointer("/spec/targetCPUUtilizationPercentage").is_some() {
            names.push("cpu".to_string());
        }
        out.push((HPA_METRICS, text_or_missing(Some(names.join(",")).filter(|s| !s.is_empty()))));
    }

    fn project_node(&self, raw: &serde_json::Value, out: &mut SmallVec<[ProjectedEntry; 8]>) {
        let mut status = "Unknown".to_string();
        if let Some(conds) = raw.pointer("/status/conditions").and_then(|v| v.as_array()) {
            if let Some(c) = conds.iter().find(|c| c.get("type").and_then(|v| v.as_str()) == Some("Ready")) {
                status = if c.get("status").and_then(|v| v.as_str()) == Some("True") { "Ready".into() } else { "NotReady".into() };
            }
        }
        out.push((NODE_STATUS, FieldValue::Text(status)));
        let mut roles: Vec<String> = Vec::new();
        if let Some(lbls) = raw.pointer("/metadata/labels").and_then(|v| v.as_object()) {
            for k in lbls.keys() {
                if let Some(role) = k.strip_prefix("node-role.kubernetes.io/") {
                    roles.push(if role.is_empty() { "node".into() } else { role.to_string() });
                }
            }
        }
        if roles.is_empty() {
            roles.push("none".into());
        }
        out.push((NODE_ROLES, FieldValue::Text(roles.join(","))));
        out.push((NODE_VERSION, text_or_missing(ptr_str(raw, "/status/nodeInfo/kubeletVersion"))));
    }

    fn project_namespace(&self, raw: &serde_json::Value, out: &mut SmallVec<[ProjectedEntry; 8]>) {
        out.push((NS_STATUS, text_or_missing(ptr_str(raw, "/status/phase"))));
    }
}

impl Projector for BuiltinProjector {
    fn project(&self, raw: &serde_json::Value) -> SmallVec<[ProjectedEntry; 8]> {
        let mut out = SmallVec::new();
        match self.kind.as_str() {
            "Pod" => self.project_pod(raw, &mut out),
            "Deployment" => self.project_deployment(raw, &mut out),
            "StatefulSet" => self.project_statefulset(raw, &mut out),
            "DaemonSet" => self.project_daemonset(raw, &mut out),
            "Service" => self.project_service(raw, &mut out),
            "ConfigMap" => self.project_configmap(raw, &mut out),
            "Job" => self.project_job(raw, &mut out),
            "CronJob" => self.project_cronjob(raw, &mut out),
            "HorizontalPodAutoscaler" => self.project_hpa(raw, &mut out),
            "Node" => self.project_node(raw, &mut out),
            "Namespace" => self.project_namespace(raw, &mut out),
            _ => {}
        }
        out
    }
}
