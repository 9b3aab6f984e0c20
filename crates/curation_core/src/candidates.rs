use std::collections::HashSet;

use shared::domain::{Item, ItemId};

use crate::store::ItemPool;

/// Inclusive lower bound, exclusive upper bound, both in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DurationRange {
    pub min_secs: Option<u32>,
    pub max_secs: Option<u32>,
}

impl DurationRange {
    pub fn under(max_secs: u32) -> Self {
        Self {
            min_secs: None,
            max_secs: Some(max_secs),
        }
    }

    pub fn between(min_secs: u32, max_secs: u32) -> Self {
        Self {
            min_secs: Some(min_secs),
            max_secs: Some(max_secs),
        }
    }

    pub fn at_least(min_secs: u32) -> Self {
        Self {
            min_secs: Some(min_secs),
            max_secs: None,
        }
    }

    pub fn contains(&self, secs: u32) -> bool {
        self.min_secs.map_or(true, |min| secs >= min) && self.max_secs.map_or(true, |max| secs < max)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateFilter {
    /// Case-insensitive substring matched against the name and every tag.
    pub search: Option<String>,
    pub kind: Option<String>,
    pub category: Option<String>,
    pub duration: Option<DurationRange>,
}

impl CandidateFilter {
    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn duration(mut self, range: DurationRange) -> Self {
        self.duration = Some(range);
        self
    }

    pub fn matches(&self, item: &Item) -> bool {
        if let Some(needle) = self.normalized_search() {
            let in_name = item.name.to_lowercase().contains(&needle);
            let in_tags = item
                .tags
                .iter()
                .any(|tag| tag.to_lowercase().contains(&needle));
            if !in_name && !in_tags {
                return false;
            }
        }
        if let Some(kind) = &self.kind {
            if item.kind.as_deref() != Some(kind.as_str()) {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if item.category.as_deref() != Some(category.as_str()) {
                return false;
            }
        }
        if let Some(range) = &self.duration {
            match item.duration_secs {
                Some(secs) if range.contains(secs) => {}
                _ => return false,
            }
        }
        true
    }

    fn normalized_search(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_lowercase)
    }
}

/// Items eligible to be added, in pool order.
///
/// `container_kind` is the container's own type restriction and applies on top of `filter`.
pub fn candidate_items(
    pool: &ItemPool,
    member_ids: &[ItemId],
    filter: &CandidateFilter,
    container_kind: Option<&str>,
) -> Vec<Item> {
    let members: HashSet<&ItemId> = member_ids.iter().collect();
    pool.iter()
        .filter(|item| !members.contains(&item.id))
        .filter(|item| container_kind.map_or(true, |kind| item.kind.as_deref() == Some(kind)))
        .filter(|item| filter.matches(item))
        .cloned()
        .collect()
}

#[cfg(test)]
#[path = "tests/candidates_tests.rs"]
mod tests;
