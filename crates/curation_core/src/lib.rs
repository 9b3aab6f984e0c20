use async_trait::async_trait;
use shared::{
    domain::{Container, ContainerId, Item, ItemId},
    protocol::ItemQuery,
};

pub mod candidates;
pub mod config;
pub mod edit_queue;
pub mod error;
pub mod http;
pub mod reconciler;
pub mod reorder;
pub mod session;
pub mod store;

pub use candidates::{candidate_items, CandidateFilter, DurationRange};
pub use error::{CurationError, CurationFailure, FailureKind, InvalidEdit, ServiceError};
pub use http::HttpCurationApi;
pub use reconciler::Reconciler;
pub use reorder::Step;
pub use session::{CurationEvent, CurationSession, EditStatus, LoadReport, MembershipView};
pub use store::{ItemPool, MembershipEdit, MembershipStore, Resolution};

/// Remote owner of containers and their ordered membership.
#[async_trait]
pub trait ContainerService: Send + Sync {
    async fn get(&self, container_id: &ContainerId) -> Result<Container, ServiceError>;

    /// Replaces the full ordered member list and returns the authoritative container.
    async fn update(
        &self,
        container_id: &ContainerId,
        member_ids: &[ItemId],
    ) -> Result<Container, ServiceError>;
}

/// Remote owner of items. Items are only ever read.
#[async_trait]
pub trait ItemService: Send + Sync {
    /// A deleted item is reported as [`ServiceError::NotFound`].
    async fn get_by_id(&self, item_id: &ItemId) -> Result<Item, ServiceError>;

    async fn get_all(&self, query: &ItemQuery) -> Result<Vec<Item>, ServiceError>;
}
