use std::{future::Future, sync::Arc, time::Duration};

use shared::{
    domain::{Container, ContainerId, Item, ItemId},
    protocol::ItemQuery,
};
use tracing::{debug, info, warn};

use crate::{error::ServiceError, ContainerService, ItemService};

#[derive(Debug, Clone)]
pub struct Healed {
    /// Authoritative container after pruning, or the locally pruned copy if write-back failed.
    pub container: Container,
    pub resolved: Vec<Item>,
    pub pruned: Vec<ItemId>,
    pub prune_error: Option<ServiceError>,
}

impl Healed {
    pub fn unchanged(container: Container) -> Self {
        Self {
            container,
            resolved: Vec::new(),
            pruned: Vec::new(),
            prune_error: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedContainer {
    pub pool: Vec<Item>,
    pub healed: Healed,
}

/// Nothing here retries. Every call is bounded by the configured timeout.
#[derive(Clone)]
pub struct Reconciler {
    containers: Arc<dyn ContainerService>,
    items: Arc<dyn ItemService>,
    timeout: Duration,
}

impl Reconciler {
    pub fn new(
        containers: Arc<dyn ContainerService>,
        items: Arc<dyn ItemService>,
        timeout: Duration,
    ) -> Self {
        Self {
            containers,
            items,
            timeout,
        }
    }

    pub async fn fetch(&self, container_id: &ContainerId) -> Result<Container, ServiceError> {
        self.bounded(self.containers.get(container_id)).await
    }

    pub async fn persist(
        &self,
        container_id: &ContainerId,
        member_ids: &[ItemId],
    ) -> Result<Container, ServiceError> {
        debug!(
            container_id = %container_id,
            member_count = member_ids.len(),
            "persisting member order"
        );
        self.bounded(self.containers.update(container_id, member_ids))
            .await
    }

    pub async fn load(
        &self,
        container_id: &ContainerId,
        query: &ItemQuery,
    ) -> Result<LoadedContainer, ServiceError> {
        let container = self.fetch(container_id).await?;
        let pool = self.bounded(self.items.get_all(query)).await?;
        let healed = self.heal(container, |_| true).await?;
        Ok(LoadedContainer { pool, healed })
    }

    /// Only a missing item counts as pruned; any other lookup failure aborts.
    pub async fn heal(
        &self,
        container: Container,
        needs_lookup: impl Fn(&ItemId) -> bool,
    ) -> Result<Healed, ServiceError> {
        let mut resolved = Vec::new();
        let mut pruned = Vec::new();
        for item_id in container.member_ids.iter().filter(|id| needs_lookup(*id)) {
            match self.bounded(self.items.get_by_id(item_id)).await {
                Ok(item) => resolved.push(item),
                Err(err) if err.is_not_found() => {
                    debug!(container_id = %container.id, item_id = %item_id, "member no longer resolves");
                    pruned.push(item_id.clone());
                }
                Err(err) => return Err(err),
            }
        }

        if pruned.is_empty() {
            return Ok(Healed {
                container,
                resolved,
                pruned,
                prune_error: None,
            });
        }

        let kept: Vec<ItemId> = container
            .member_ids
            .iter()
            .filter(|id| !pruned.contains(*id))
            .cloned()
            .collect();
        info!(
            container_id = %container.id,
            pruned = pruned.len(),
            "pruning unresolvable members"
        );

        match self.persist(&container.id, &kept).await {
            Ok(authoritative) => Ok(Healed {
                container: authoritative,
                resolved,
                pruned,
                prune_error: None,
            }),
            Err(err) => {
                warn!(container_id = %container.id, error = %err, "failed to persist pruned members");
                Ok(Healed {
                    container: Container {
                        member_ids: kept,
                        ..container
                    },
                    resolved,
                    pruned,
                    prune_error: Some(err),
                })
            }
        }
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, ServiceError>>,
    ) -> Result<T, ServiceError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| ServiceError::Timeout(self.timeout))?
    }
}

#[cfg(test)]
#[path = "tests/reconciler_tests.rs"]
mod tests;
