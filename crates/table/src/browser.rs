//! Page state machine for one resource kind: `Loading → Ready | Error`,
//! with every load tagged by a generation so late results are dropped.

use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use kbrowse_core::{columns::ColumnKind, columns::KindSpec, BrowseError, BrowseResult, ItemKey, ResourceItem};
use metrics::counter;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::filter::{filter_items, in_namespaces};
use crate::selection::{ClickTarget, SelectionOutcome, SelectionSet};
use crate::sort::{sort_items, SortState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Loading,
    Ready,
    Error(BrowseError),
}

/// User input the table reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    RowClick { key: ItemKey, modifier: bool },
    RowContextMenu { key: ItemKey },
    OutsideClick(ClickTarget),
    ClearSelection,
    Search(String),
    HeaderClick(ColumnKind),
}

/// Immutable view published after every change.
#[derive(Debug, Clone)]
pub struct TableSnapshot {
    pub epoch: u64,
    pub state: LoadState,
    /// Filtered and sorted rows.
    pub rows: Vec<Arc<ResourceItem>>,
    /// Size of the unfiltered list.
    pub total: usize,
    pub selected: usize,
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl Default for TableSnapshot {
    fn default() -> Self {
        Self { epoch: 0, state: LoadState::Loading, rows: Vec::new(), total: 0, selected: 0, refreshed_at: None }
    }
}

/// Read side for renderers: latest snapshot plus an epoch to wait on.
#[derive(Clone)]
pub struct BrowserHandle {
    snap: Arc<ArcSwap<TableSnapshot>>,
    epoch_rx: watch::Receiver<u64>,
}

impl BrowserHandle {
    pub fn current(&self) -> Arc<TableSnapshot> {
        self.snap.load_full()
    }

    pub fn subscribe_epoch(&self) -> watch::Receiver<u64> {
        self.epoch_rx.clone()
    }
}

pub struct Browser {
    spec: KindSpec,
    cluster: String,
    state: LoadState,
    generation: u64,
    items: Vec<Arc<ResourceItem>>,
    namespaces: Vec<String>,
    query: String,
    sort: SortState,
    selection: SelectionSet,
    refreshed_at: Option<DateTime<Utc>>,
    epoch: u64,
    snap: Arc<ArcSwap<TableSnapshot>>,
    epoch_tx: watch::Sender<u64>,
    epoch_rx: watch::Receiver<u64>,
}

impl Browser {
    /// A fresh page starts in `Loading`; call [`Browser::begin_load`] to get a ticket.
    pub fn new(spec: KindSpec, cluster: impl Into<String>) -> Self {
        let (epoch_tx, epoch_rx) = watch::channel(0u64);
        Self {
            spec,
            cluster: cluster.into(),
            state: LoadState::Loading,
            generation: 0,
            items: Vec::new(),
            namespaces: Vec::new(),
            query: String::new(),
            sort: SortState::default(),
            selection: SelectionSet::new(),
            refreshed_at: None,
            epoch: 0,
            snap: Arc::new(ArcSwap::from_pointee(TableSnapshot::default())),
            epoch_tx,
            epoch_rx,
        }
    }

    pub fn handle(&self) -> BrowserHandle {
        BrowserHandle { snap: Arc::clone(&self.snap), epoch_rx: self.epoch_rx.clone() }
    }

    pub fn spec(&self) -> &KindSpec {
        &self.spec
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn namespaces(&self) -> &[String] {
        &self.namespaces
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn sort(&self) -> SortState {
        self.sort
    }

    pub fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    pub fn items(&self) -> &[Arc<ResourceItem>] {
        &self.items
    }

    pub fn item(&self, key: &ItemKey) -> Option<&ResourceItem> {
        self.items.iter().map(|i| &**i).find(|i| i.namespace == key.namespace && i.name == key.name)
    }

    /// Enter `Loading` and hand out the ticket the result must carry.
    pub fn begin_load(&mut self) -> u64 {
        self.generation += 1;
        self.state = LoadState::Loading;
        debug!(kind = %self.spec.kind.kind, generation = self.generation, "load started");
        self.publish();
        self.generation
    }

    /// Apply a load result. Returns false when `generation` is stale.
    pub fn complete_load(&mut self, generation: u64, result: BrowseResult<Vec<ResourceItem>>) -> bool {
        if generation != self.generation {
            debug!(kind = %self.spec.kind.kind, generation, current = self.generation, "stale load discarded");
            counter!("browser_stale_loads_total", 1u64);
            return false;
        }
        match result {
            Ok(items) => {
                self.items = items.into_iter().map(Arc::new).collect();
                let present: rustc_hash::FxHashSet<ItemKey> = self.items.iter().map(|i| i.key()).collect();
                self.selection.retain(|k| present.contains(k));
                self.state = LoadState::Ready;
                self.refreshed_at = Some(Utc::now());
                info!(kind = %self.spec.kind.kind, count = self.items.len(), "loaded");
            }
            Err(e) => {
                warn!(kind = %self.spec.kind.kind, error = %e, "load failed");
                self.items.clear();
                self.selection.clear();
                self.state = LoadState::Error(e);
            }
        }
        self.publish();
        true
    }

    /// Change the namespace selection; starts a new load.
    pub fn set_namespaces(&mut self, namespaces: Vec<String>) -> u64 {
        self.namespaces = namespaces;
        self.begin_load()
    }

    /// Switch cluster; the old list and selection belong to the old cluster.
    pub fn set_cluster(&mut self, cluster: impl Into<String>) -> u64 {
        self.cluster = cluster.into();
        self.items.clear();
        self.selection.clear();
        self.begin_load()
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
        self.publish();
    }

    pub fn set_sort(&mut self, sort: SortState) {
        self.sort = sort;
        self.publish();
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
        self.publish();
    }

    pub fn handle_event(&mut self, event: InputEvent) -> SelectionOutcome {
        let outcome = match event {
            InputEvent::RowClick { key, .. } | InputEvent::RowContextMenu { key } if self.item(&key).is_none() => {
                debug!(key = %key, "click on unknown row ignored");
                return SelectionOutcome::Unchanged;
            }
            InputEvent::RowClick { key, modifier } => self.selection.row_click(key, modifier),
            InputEvent::RowContextMenu { key } => self.selection.context_menu(key),
            InputEvent::OutsideClick(target) => self.selection.outside_click(target),
            InputEvent::ClearSelection => {
                self.selection.clear();
                SelectionOutcome::Cleared
            }
            InputEvent::Search(q) => {
                self.query = q;
                SelectionOutcome::Unchanged
            }
            InputEvent::HeaderClick(field) => {
                self.sort.click(field);
                SelectionOutcome::Unchanged
            }
        };
        self.publish();
        outcome
    }

    /// Derived rows: namespace selection, then text filter, then sort.
    pub fn view(&self) -> Vec<Arc<ResourceItem>> {
        let scoped: Vec<Arc<ResourceItem>> =
            self.items.iter().filter(|i| in_namespaces(i, &self.namespaces)).cloned().collect();
        let mut rows = filter_items(&scoped, &self.query, &self.spec);
        sort_items(&mut rows, self.sort, &self.spec);
        rows
    }

    /// Selected keys in canonical list order.
    pub fn selected_keys(&self) -> Vec<ItemKey> {
        self.items.iter().map(|i| i.key()).filter(|k| self.selection.contains(k)).collect()
    }

    fn publish(&mut self) {
        self.epoch = self.epoch.saturating_add(1);
        let snap = TableSnapshot {
            epoch: self.epoch,
            state: self.state.clone(),
            rows: self.view(),
            total: self.items.len(),
            selected: self.selection.len(),
            refreshed_at: self.refreshed_at,
        };
        self.snap.store(Arc::new(snap));
        let _ = self.epoch_tx.send(self.epoch);
    }
}
