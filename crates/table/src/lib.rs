//! Table state for the kind browser: filter, sort, selection, column layout
//! and the page state machine that ties them together.

#![forbid(unsafe_code)]

pub mod browser;
pub mod columns;
pub mod filter;
pub mod selection;
pub mod sort;

pub use browser::{Browser, BrowserHandle, InputEvent, LoadState, TableSnapshot};
pub use columns::ColumnStore;
pub use filter::{filter_items, in_namespaces};
pub use selection::{ClickTarget, SelectionOutcome, SelectionSet};
pub use sort::{sort_items, SortDirection, SortState};
