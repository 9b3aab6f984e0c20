use serde::{Deserialize, Serialize};

use crate::domain::ItemId;

/// Body of the "replace membership order" call. Always carries the whole list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateMembersRequest {
    pub member_ids: Vec<ItemId>,
}

/// Server-side narrowing for `get_all`. Empty means every item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl ItemQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn of_kind(kind: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            category: None,
        }
    }
}
