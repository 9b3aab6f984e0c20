use std::collections::{HashMap, HashSet};

use shared::domain::{Item, ItemId};

use crate::error::InvalidEdit;

/// An intent against a container's member list, alive between the user action and its
/// reconciliation outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipEdit {
    Add(ItemId),
    Remove(ItemId),
    Reorder(Vec<ItemId>),
}

impl MembershipEdit {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Add(_) => "add",
            Self::Remove(_) => "remove",
            Self::Reorder(_) => "reorder",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ItemPool {
    items: Vec<Item>,
    index: HashMap<ItemId, usize>,
}

impl ItemPool {
    pub fn new(items: impl IntoIterator<Item = Item>) -> Self {
        let mut pool = Self::default();
        for item in items {
            pool.insert(item);
        }
        pool
    }

    /// Adds the item, or replaces the stored copy in place if the id is already known.
    pub fn insert(&mut self, item: Item) {
        match self.index.get(&item.id) {
            Some(&slot) => self.items[slot] = item,
            None => {
                self.index.insert(item.id.clone(), self.items.len());
                self.items.push(item);
            }
        }
    }

    pub fn get(&self, id: &ItemId) -> Option<&Item> {
        self.index.get(id).map(|&slot| &self.items[slot])
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.index.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub items: Vec<Item>,
    pub unresolved: Vec<ItemId>,
}

impl Resolution {
    pub fn ids(&self) -> Vec<ItemId> {
        self.items.iter().map(|item| item.id.clone()).collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct MembershipStore {
    member_ids: Vec<ItemId>,
    pool: ItemPool,
}

impl MembershipStore {
    pub fn new(member_ids: Vec<ItemId>, pool: ItemPool) -> Self {
        Self {
            member_ids: dedup_preserving_order(member_ids),
            pool,
        }
    }

    pub fn member_ids(&self) -> &[ItemId] {
        &self.member_ids
    }

    pub fn pool(&self) -> &ItemPool {
        &self.pool
    }

    pub fn is_member(&self, id: &ItemId) -> bool {
        self.member_ids.contains(id)
    }

    pub fn insert_item(&mut self, item: Item) {
        self.pool.insert(item);
    }

    /// Computes the member list that `edit` would produce without touching `self`.
    pub fn apply(&self, edit: &MembershipEdit) -> Result<Vec<ItemId>, InvalidEdit> {
        match edit {
            MembershipEdit::Add(id) => {
                if !self.pool.contains(id) {
                    return Err(InvalidEdit::UnknownItem(id.clone()));
                }
                let mut next = self.member_ids.clone();
                if !next.contains(id) {
                    next.push(id.clone());
                }
                Ok(next)
            }
            MembershipEdit::Remove(id) => {
                if !self.pool.contains(id) && !self.is_member(id) {
                    return Err(InvalidEdit::UnknownItem(id.clone()));
                }
                Ok(self
                    .member_ids
                    .iter()
                    .filter(|member| *member != id)
                    .cloned()
                    .collect())
            }
            MembershipEdit::Reorder(order) => {
                if !is_permutation_of(order, &self.member_ids) {
                    return Err(InvalidEdit::NotAPermutation);
                }
                Ok(order.clone())
            }
        }
    }

    /// Replaces the member list wholesale, dropping repeated ids.
    pub fn replace_members(&mut self, member_ids: Vec<ItemId>) {
        self.member_ids = dedup_preserving_order(member_ids);
    }

    /// Replays `edits` in order on top of `base`. Fails on the first edit that no longer applies.
    pub fn rebase(
        &self,
        base: Vec<ItemId>,
        edits: &[MembershipEdit],
    ) -> Result<Vec<ItemId>, InvalidEdit> {
        let mut scratch = self.clone();
        scratch.replace_members(base);
        for edit in edits {
            let next = scratch.apply(edit)?;
            scratch.replace_members(next);
        }
        Ok(scratch.member_ids)
    }

    pub fn resolve_items(&self, ids: &[ItemId]) -> Resolution {
        let mut resolution = Resolution::default();
        for id in ids {
            match self.pool.get(id) {
                Some(item) => resolution.items.push(item.clone()),
                None => resolution.unresolved.push(id.clone()),
            }
        }
        resolution
    }

    pub fn resolved_members(&self) -> Resolution {
        self.resolve_items(&self.member_ids)
    }
}

fn is_permutation_of(candidate: &[ItemId], current: &[ItemId]) -> bool {
    if candidate.len() != current.len() {
        return false;
    }
    let current: HashSet<&ItemId> = current.iter().collect();
    let mut seen = HashSet::with_capacity(candidate.len());
    candidate
        .iter()
        .all(|id| current.contains(id) && seen.insert(id))
}

pub(crate) fn dedup_preserving_order(ids: Vec<ItemId>) -> Vec<ItemId> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
