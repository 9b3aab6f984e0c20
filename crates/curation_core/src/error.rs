use std::time::Duration;

use chrono::{DateTime, Utc};
use shared::{
    domain::{ContainerId, ItemId},
    error::ErrorCode,
};
use thiserror::Error;

use crate::store::MembershipEdit;

/// Failure reported by a collaborator service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("{resource} '{id}' not found")]
    NotFound { resource: &'static str, id: String },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("request rejected with status {status}: {message}")]
    Rejected {
        status: u16,
        code: Option<ErrorCode>,
        message: String,
    },
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

impl ServiceError {
    pub fn item_not_found(id: &ItemId) -> Self {
        Self::NotFound {
            resource: "item",
            id: id.to_string(),
        }
    }

    pub fn container_not_found(id: &ContainerId) -> Self {
        Self::NotFound {
            resource: "container",
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            Self::Decode(value.to_string())
        } else {
            Self::Transport(value.to_string())
        }
    }
}

/// An edit the store refused. Never reaches the network.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvalidEdit {
    #[error("reorder payload is not a permutation of the current members")]
    NotAPermutation,
    #[error("item '{0}' is not in the known pool")]
    UnknownItem(ItemId),
}

#[derive(Debug, Error)]
pub enum CurationError {
    #[error("failed to load container '{container_id}': {source}")]
    Load {
        container_id: ContainerId,
        #[source]
        source: ServiceError,
    },
    #[error("curation session for container '{0}' is closed")]
    Closed(ContainerId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The update call failed; the view was restored from a fresh fetch.
    Persist,
    /// The update call failed and so did the refetch; the view fell back to the last confirmed list.
    PersistAndRefetch,
    /// Pruned members could not be written back; the view is pruned locally only.
    PrunePersist,
    /// The server's list moved under edits made while a call was out, and they no longer apply.
    /// The view shows the server's list and the edits are discarded.
    Conflict,
    /// New members reported by the server could not be looked up.
    Resolve,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CurationFailure {
    pub kind: FailureKind,
    pub message: String,
    /// Edits whose optimistic effect was discarded. `retry_failed` re-issues them.
    pub discarded_edits: Vec<MembershipEdit>,
    pub occurred_at: DateTime<Utc>,
}

impl CurationFailure {
    pub(crate) fn new(
        kind: FailureKind,
        message: impl Into<String>,
        discarded_edits: Vec<MembershipEdit>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            discarded_edits,
            occurred_at: Utc::now(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        !self.discarded_edits.is_empty()
    }
}
