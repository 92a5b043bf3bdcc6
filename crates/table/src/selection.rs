//! Multi-row selection and the click rules that drive it.

use kbrowse_core::ItemKey;
use rustc_hash::FxHashSet;

/// Where a click that did not hit a row handler landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickTarget {
    Row,
    ContextMenu,
    ConfirmDialog,
    /// Anywhere else on the page.
    Background,
}

impl ClickTarget {
    /// Clicks on rows and on the menus/dialogs acting on the selection keep it.
    fn preserves_selection(self) -> bool {
        !matches!(self, ClickTarget::Background)
    }
}

/// What the page should do after a selection event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionOutcome {
    /// Modifier click flipped membership of one row.
    Toggled { key: ItemKey, selected: bool },
    /// Plain click: open the detail view.
    Navigate(ItemKey),
    /// Context menu opened; actions apply to `targets`.
    MenuOpened { targets: Vec<ItemKey> },
    Cleared,
    Unchanged,
}

#[derive(Debug, Clone, Default)]
pub struct SelectionSet {
    keys: FxHashSet<ItemKey>,
}

impl SelectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn contains(&self, key: &ItemKey) -> bool {
        self.keys.contains(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ItemKey> {
        self.keys.iter()
    }

    /// Flip membership; returns whether `key` is selected afterwards.
    pub fn toggle(&mut self, key: ItemKey) -> bool {
        if self.keys.remove(&key) {
            false
        } else {
            self.keys.insert(key);
            true
        }
    }

    pub fn clear(&mut self) {
        self.keys.clear();
    }

    /// Drop identities that are no longer present.
    pub fn retain(&mut self, mut keep: impl FnMut(&ItemKey) -> bool) {
        self.keys.retain(|k| keep(k));
    }

    /// Row click. With the modifier held the row toggles; without it the
    /// row's detail view is requested, clearing the selection first unless
    /// the row is part of it.
    pub fn row_click(&mut self, key: ItemKey, modifier: bool) -> SelectionOutcome {
        if modifier {
            let selected = self.toggle(key.clone());
            return SelectionOutcome::Toggled { key, selected };
        }
        if !self.keys.contains(&key) {
            self.keys.clear();
        }
        SelectionOutcome::Navigate(key)
    }

    /// Right click. An unselected row replaces the selection; a selected
    /// row keeps the whole selection as the action target.
    pub fn context_menu(&mut self, key: ItemKey) -> SelectionOutcome {
        if !self.keys.contains(&key) {
            self.keys.clear();
            self.keys.insert(key);
        }
        let mut targets: Vec<ItemKey> = self.keys.iter().cloned().collect();
        targets.sort();
        SelectionOutcome::MenuOpened { targets }
    }

    pub fn outside_click(&mut self, target: ClickTarget) -> SelectionOutcome {
        if target.preserves_selection() || self.keys.is_empty() {
            return SelectionOutcome::Unchanged;
        }
        self.keys.clear();
        SelectionOutcome::Cleared
    }
}
