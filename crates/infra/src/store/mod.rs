//! Persistence for items, requests and actor profiles.
//!
//! The store is the only place inventory and request state are written. A
//! status change and its inventory delta are committed together through
//! [`LendingStore::commit_transition`]; there is no API for adjusting stock on
//! its own.

use thiserror::Error;

use campusops_auth::Actor;
use campusops_core::{DomainId, ExpectedVersion, FacultyId, ItemId, RequestId, StudentId, UserId};
use campusops_lending::{Item, ItemKind, LendingRequest};

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryLendingStore;
pub use postgres::PostgresLendingStore;

/// Store operation error.
///
/// These are infrastructure errors; business rule failures are decided before
/// anything reaches the store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The request changed since it was read.
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    /// The conditional stock update matched no row: the delta would take the
    /// available count outside `0..=total`.
    #[error("inventory bounds check failed: {0}")]
    InventoryBounds(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(String),
}

/// A status change ready to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionCommit {
    pub item_id: ItemId,
    pub inventory_delta: i64,
    /// New request state; its `version` field is ignored and assigned by the store.
    pub request: LendingRequest,
    pub expected_version: ExpectedVersion,
}

/// Which requests a caller may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListScope {
    All,
    Student(StudentId),
    /// Requests on items in `domains` or on items with no domain, plus any
    /// request this faculty member handled.
    Faculty {
        faculty_id: FacultyId,
        domains: Vec<DomainId>,
    },
}

impl ListScope {
    pub fn for_actor(actor: &Actor) -> Self {
        match actor {
            Actor::Admin { .. } => ListScope::All,
            Actor::Student { student_id, .. } => ListScope::Student(*student_id),
            Actor::Faculty {
                faculty_id,
                coordinated_domains,
                ..
            } => ListScope::Faculty {
                faculty_id: *faculty_id,
                domains: coordinated_domains.clone(),
            },
        }
    }

    pub fn includes(&self, request: &LendingRequest, item: &Item) -> bool {
        match self {
            ListScope::All => true,
            ListScope::Student(student_id) => request.student_id == *student_id,
            ListScope::Faculty { faculty_id, domains } => {
                request.faculty_id == Some(*faculty_id)
                    || item.domain_id().is_none_or(|d| domains.contains(&d))
            }
        }
    }
}

#[async_trait::async_trait]
pub trait LendingStore: Send + Sync {
    /// Look up the actor behind a user id. `None` for unknown users.
    async fn resolve_actor(&self, user_id: UserId) -> Result<Option<Actor>, StoreError>;

    async fn insert_item(&self, item: &Item) -> Result<(), StoreError>;

    async fn get_item(&self, id: ItemId) -> Result<Option<Item>, StoreError>;

    /// Items of one kind, ordered by name.
    async fn list_items(&self, kind: ItemKind) -> Result<Vec<Item>, StoreError>;

    async fn insert_request(&self, request: &LendingRequest) -> Result<(), StoreError>;

    async fn load_request(&self, id: RequestId) -> Result<Option<LendingRequest>, StoreError>;

    /// Requests on items of `kind` visible under `scope`, newest first, each
    /// paired with its item.
    async fn list_requests(
        &self,
        kind: ItemKind,
        scope: &ListScope,
    ) -> Result<Vec<(LendingRequest, Item)>, StoreError>;

    /// Atomically apply the inventory delta and write the request.
    ///
    /// Either both writes happen or neither does. Returns the stored request
    /// (with its new version) and the item after the delta.
    async fn commit_transition(
        &self,
        commit: TransitionCommit,
    ) -> Result<(LendingRequest, Item), StoreError>;

    async fn delete_request(
        &self,
        id: RequestId,
        expected_version: ExpectedVersion,
    ) -> Result<(), StoreError>;
}

#[async_trait::async_trait]
impl<S> LendingStore for std::sync::Arc<S>
where
    S: LendingStore + ?Sized,
{
    async fn resolve_actor(&self, user_id: UserId) -> Result<Option<Actor>, StoreError> {
        (**self).resolve_actor(user_id).await
    }

    async fn insert_item(&self, item: &Item) -> Result<(), StoreError> {
        (**self).insert_item(item).await
    }

    async fn get_item(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
        (**self).get_item(id).await
    }

    async fn list_items(&self, kind: ItemKind) -> Result<Vec<Item>, StoreError> {
        (**self).list_items(kind).await
    }

    async fn insert_request(&self, request: &LendingRequest) -> Result<(), StoreError> {
        (**self).insert_request(request).await
    }

    async fn load_request(&self, id: RequestId) -> Result<Option<LendingRequest>, StoreError> {
        (**self).load_request(id).await
    }

    async fn list_requests(
        &self,
        kind: ItemKind,
        scope: &ListScope,
    ) -> Result<Vec<(LendingRequest, Item)>, StoreError> {
        (**self).list_requests(kind, scope).await
    }

    async fn commit_transition(
        &self,
        commit: TransitionCommit,
    ) -> Result<(LendingRequest, Item), StoreError> {
        (**self).commit_transition(commit).await
    }

    async fn delete_request(
        &self,
        id: RequestId,
        expected_version: ExpectedVersion,
    ) -> Result<(), StoreError> {
        (**self).delete_request(id, expected_version).await
    }
}
