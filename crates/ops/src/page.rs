//! One browser page per resource kind: owns the table state, the column
//! layout, the dispatcher and the in-flight fetch.

use std::sync::Arc;

use kbrowse_core::{columns::KindSpec, BrowseError, ItemKey};
use kbrowse_kubehub::{spawn_fetch, ClusterApi, FetchHandle};
use kbrowse_persist::KvStore;
use kbrowse_table::{Browser, BrowserHandle, ClickTarget, ColumnStore, InputEvent, SelectionOutcome, SortState};
use tracing::{debug, info};

use crate::{ActionDispatcher, Capabilities, DeleteReport, Notice, PendingAction};

pub struct Page {
    api: Arc<dyn ClusterApi>,
    browser: Browser,
    columns: ColumnStore,
    dispatcher: ActionDispatcher,
    inflight: Option<FetchHandle>,
    /// Targets of the last opened context menu.
    menu_targets: Vec<ItemKey>,
    notices: Vec<Notice>,
}

impl Page {
    pub fn new(api: Arc<dyn ClusterApi>, spec: KindSpec, store: Arc<dyn KvStore>, caps: Capabilities) -> Self {
        let columns = ColumnStore::open(store, &spec);
        let browser = Browser::new(spec, api.cluster_name());
        let dispatcher = ActionDispatcher::new(Arc::clone(&api), caps);
        Self { api, browser, columns, dispatcher, inflight: None, menu_targets: Vec::new(), notices: Vec::new() }
    }

    pub fn browser(&self) -> &Browser {
        &self.browser
    }

    pub fn handle(&self) -> BrowserHandle {
        self.browser.handle()
    }

    pub fn spec(&self) -> &KindSpec {
        self.browser.spec()
    }

    pub fn columns(&self) -> &ColumnStore {
        &self.columns
    }

    pub fn columns_mut(&mut self) -> &mut ColumnStore {
        &mut self.columns
    }

    pub fn dispatcher(&self) -> &ActionDispatcher {
        &self.dispatcher
    }

    pub fn pending(&self) -> Option<&PendingAction> {
        self.dispatcher.pending()
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    fn start_fetch(&mut self, generation: u64) {
        if let Some(prev) = self.inflight.take() {
            debug!(generation = prev.generation, "superseding in-flight fetch");
            prev.cancel();
        }
        let handle = spawn_fetch(
            Arc::clone(&self.api),
            self.browser.spec().clone(),
            self.browser.namespaces().to_vec(),
            generation,
        );
        self.inflight = Some(handle);
    }

    /// First load after the page is shown.
    pub fn mount(&mut self) {
        info!(kind = %self.spec().kind.kind, cluster = %self.api.cluster_name(), "page mounted");
        self.refresh();
    }

    pub fn refresh(&mut self) {
        let generation = self.browser.begin_load();
        self.start_fetch(generation);
    }

    pub fn set_namespaces(&mut self, namespaces: Vec<String>) {
        let generation = self.browser.set_namespaces(namespaces);
        self.start_fetch(generation);
    }

    pub fn set_cluster(&mut self, api: Arc<dyn ClusterApi>) {
        self.api = Arc::clone(&api);
        self.dispatcher.set_api(api);
        self.menu_targets.clear();
        let generation = self.browser.set_cluster(self.api.cluster_name());
        self.start_fetch(generation);
    }

    /// Wait for the in-flight fetch, if any, and apply it. Returns whether
    /// a result was applied.
    pub async fn settle(&mut self) -> bool {
        let Some(handle) = self.inflight.take() else {
            return false;
        };
        match handle.wait().await {
            Some(outcome) => self.browser.complete_load(outcome.generation, outcome.result),
            None => false,
        }
    }

    /// Menu targets survive only clicks on the menu or its dialog; any other
    /// input closes the menu and actions fall back to the live selection.
    pub fn handle_event(&mut self, event: InputEvent) -> SelectionOutcome {
        let on_menu = matches!(event, InputEvent::OutsideClick(ClickTarget::ContextMenu | ClickTarget::ConfirmDialog));
        let outcome = self.browser.handle_event(event);
        match &outcome {
            SelectionOutcome::MenuOpened { targets } => self.menu_targets = targets.clone(),
            _ if on_menu => {}
            _ => self.menu_targets.clear(),
        }
        outcome
    }

    pub fn set_sort(&mut self, sort: SortState) {
        self.browser.set_sort(sort);
    }

    /// Detail route for the context-menu target; `None` when several rows are targeted.
    pub fn view_route(&self) -> Option<String> {
        self.dispatcher.view_route(self.browser.spec(), &self.menu_targets)
    }

    pub fn route_for(&self, key: &ItemKey) -> String {
        crate::detail_route(self.browser.cluster(), self.browser.spec(), key)
    }

    fn action_targets(&self) -> Vec<ItemKey> {
        if self.menu_targets.is_empty() {
            self.browser.selected_keys()
        } else {
            self.menu_targets.clone()
        }
    }

    /// Delete the context-menu targets, or the selection. Returns the prompt
    /// to confirm; in recon mode only a notice is produced.
    pub fn request_delete(&mut self) -> Option<String> {
        let targets = self.action_targets();
        match self.dispatcher.request_delete(self.browser.spec(), targets) {
            Ok(pending) => Some(pending.prompt.clone()),
            Err(e) => {
                self.notices.push(Notice::from_error(&e));
                None
            }
        }
    }

    /// Run the confirmed action. Selection is cleared and the list refetched
    /// whatever the outcome.
    pub async fn confirm_pending(&mut self) -> Option<DeleteReport> {
        let result = self.dispatcher.confirm(self.browser.spec()).await;
        let report = match result {
            Ok(report) => {
                self.notices.extend(report.notices(self.browser.spec()));
                Some(report)
            }
            Err(BrowseError::Validation(msg)) => {
                debug!(%msg, "nothing to confirm");
                return None;
            }
            Err(e) => {
                self.notices.push(Notice::from_error(&e));
                None
            }
        };
        self.menu_targets.clear();
        self.browser.clear_selection();
        self.refresh();
        report
    }

    pub fn cancel_pending(&mut self) {
        if self.dispatcher.cancel().is_some() {
            debug!("pending action cancelled");
        }
    }
}

impl Drop for Page {
    fn drop(&mut self) {
        if let Some(handle) = self.inflight.take() {
            debug!(generation = handle.generation, "page dropped; cancelling fetch");
            handle.cancel();
        }
    }
}
