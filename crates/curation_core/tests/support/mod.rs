#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use curation_core::{
    config::Settings, ContainerService, CurationSession, ItemService, LoadReport, ServiceError,
};
use shared::{
    domain::{Container, ContainerId, Item, ItemId},
    protocol::ItemQuery,
};
use tokio::sync::{Mutex, Notify, Semaphore};

/// In-memory admin API. `update` replaces the whole list and drops repeated ids; it does not
/// check that the ids still exist.
#[derive(Default)]
pub struct FakeBackend {
    containers: Mutex<HashMap<ContainerId, Container>>,
    items: Mutex<Vec<Item>>,
    update_calls: Mutex<Vec<Vec<ItemId>>>,
    failing_updates: AtomicUsize,
    failing_gets: AtomicBool,
    failing_lookups: AtomicBool,
    injected_member: Mutex<Option<ItemId>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
    pub update_started: Notify,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn add_container(&self, id: &str, members: &[&str]) {
        self.containers
            .lock()
            .await
            .insert(id.into(), Container::new(id, members.iter().copied()));
    }

    pub async fn add_songs(&self, ids: &[&str]) {
        let mut items = self.items.lock().await;
        for id in ids {
            items.push(Item::new(*id, format!("Song {id}")).with_kind("song"));
        }
    }

    pub async fn add_item(&self, item: Item) {
        self.items.lock().await.push(item);
    }

    pub async fn delete_item(&self, id: &str) {
        self.items.lock().await.retain(|item| item.id.as_str() != id);
    }

    pub fn fail_next_updates(&self, count: usize) {
        self.failing_updates.store(count, Ordering::SeqCst);
    }

    pub fn fail_gets(&self, failing: bool) {
        self.failing_gets.store(failing, Ordering::SeqCst);
    }

    /// Single-item lookups fail with a transport error; listing still works.
    pub fn fail_lookups(&self, failing: bool) {
        self.failing_lookups.store(failing, Ordering::SeqCst);
    }

    /// The next successful update also appends `id`, as if another operator had added it.
    pub async fn inject_member_on_next_update(&self, id: &str) {
        *self.injected_member.lock().await = Some(id.into());
    }

    /// Updates block until `release_updates`.
    pub async fn hold_updates(&self) {
        *self.gate.lock().await = Some(Arc::new(Semaphore::new(0)));
    }

    pub async fn release_updates(&self) {
        if let Some(gate) = self.gate.lock().await.take() {
            gate.close();
        }
    }

    pub async fn update_calls(&self) -> Vec<Vec<ItemId>> {
        self.update_calls.lock().await.clone()
    }

    pub async fn stored_members(&self, id: &str) -> Vec<ItemId> {
        self.containers
            .lock()
            .await
            .get(&ContainerId::from(id))
            .map(|container| container.member_ids.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ContainerService for FakeBackend {
    async fn get(&self, container_id: &ContainerId) -> Result<Container, ServiceError> {
        if self.failing_gets.load(Ordering::SeqCst) {
            return Err(ServiceError::Transport("connection refused".into()));
        }
        self.containers
            .lock()
            .await
            .get(container_id)
            .cloned()
            .ok_or_else(|| ServiceError::container_not_found(container_id))
    }

    async fn update(
        &self,
        container_id: &ContainerId,
        member_ids: &[ItemId],
    ) -> Result<Container, ServiceError> {
        self.update_calls.lock().await.push(member_ids.to_vec());
        self.update_started.notify_one();

        let gate = self.gate.lock().await.clone();
        if let Some(gate) = gate {
            // Resolves with an error once the gate is closed.
            let _ = gate.acquire().await;
        }

        let failing = self.failing_updates.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_updates.store(failing - 1, Ordering::SeqCst);
            return Err(ServiceError::Rejected {
                status: 409,
                code: None,
                message: "membership changed on the server".into(),
            });
        }

        let mut next = member_ids.to_vec();
        if let Some(injected) = self.injected_member.lock().await.take() {
            next.push(injected);
        }
        let mut accepted: Vec<ItemId> = Vec::new();
        for id in next {
            if !accepted.contains(&id) {
                accepted.push(id);
            }
        }

        let mut containers = self.containers.lock().await;
        let container = containers
            .get_mut(container_id)
            .ok_or_else(|| ServiceError::container_not_found(container_id))?;
        container.member_ids = accepted;
        Ok(container.clone())
    }
}

#[async_trait]
impl ItemService for FakeBackend {
    async fn get_by_id(&self, item_id: &ItemId) -> Result<Item, ServiceError> {
        if self.failing_lookups.load(Ordering::SeqCst) {
            return Err(ServiceError::Transport("connection reset".into()));
        }
        self.items
            .lock()
            .await
            .iter()
            .find(|item| &item.id == item_id)
            .cloned()
            .ok_or_else(|| ServiceError::item_not_found(item_id))
    }

    async fn get_all(&self, query: &ItemQuery) -> Result<Vec<Item>, ServiceError> {
        Ok(self
            .items
            .lock()
            .await
            .iter()
            .filter(|item| query.kind.is_none() || item.kind == query.kind)
            .cloned()
            .collect())
    }
}

pub fn test_settings() -> Settings {
    Settings {
        request_timeout_ms: 2_000,
        coalesce_window_ms: 20,
        ..Settings::default()
    }
}

pub async fn open(
    backend: &Arc<FakeBackend>,
    container_id: &str,
    settings: &Settings,
) -> (CurationSession, LoadReport) {
    CurationSession::open(
        container_id.into(),
        backend.clone(),
        backend.clone(),
        ItemQuery::all(),
        settings,
    )
    .await
    .expect("open session")
}

pub fn ids(raw: &[&str]) -> Vec<ItemId> {
    raw.iter().map(|id| ItemId::from(*id)).collect()
}
