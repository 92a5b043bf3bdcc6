//! Error taxonomy shared by every kbrowse crate.

use serde::{Deserialize, Serialize};

/// Errors surfaced to frontends. Payloads are plain strings so they can be
/// rendered inline or carried through a notice without borrowing the source.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum BrowseError {
    #[error("fetch: {0}")]
    Fetch(String),
    #[error("delete: {0}")]
    Delete(String),
    /// Policy rejection, not a failure: recon mode forbids the named action.
    #[error("recon mode is enabled: {0} is not allowed")]
    ReconModeBlocked(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("decode: {0}")]
    Decode(String),
    #[error("storage: {0}")]
    Storage(String),
}

impl BrowseError {
    /// Informational errors are shown as a notice rather than an error state.
    pub fn is_informational(&self) -> bool {
        matches!(self, Self::ReconModeBlocked(_))
    }
}

pub type BrowseResult<T> = Result<T, BrowseError>;
