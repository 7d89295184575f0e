//! Application service for lending: load, authorize, decide, commit.
//!
//! ```text
//! actor + request id
//!   -> load request and item (404 if missing or of another kind)
//!   -> authorization gate
//!   -> read-triggered overdue refresh
//!   -> transition table
//!   -> one atomic commit (status + inventory delta, version-checked)
//! ```
//!
//! The domain crates decide; this layer only sequences IO around them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::instrument;

use campusops_auth::{
    Actor, AuthzError, RequestScope, Role, authorize_item_management, authorize_request_access,
};
use campusops_core::{AggregateRoot, Clock, DomainError, ExpectedVersion, ItemId, RequestId, UserId};
use campusops_lending::{
    Item, ItemKind, LendingError, LendingPolicy, LendingRequest, NewItem, NewRequest, RequestStatus,
    StatusChange, TransitionOutcome, decide, ensure_deletable, refresh_overdue,
};

use crate::store::{LendingStore, ListScope, StoreError, TransitionCommit};

#[derive(Debug, Error)]
pub enum ServiceError {
    /// No user, or a user id that resolves to nobody.
    #[error("authentication required")]
    Unauthenticated,

    #[error(transparent)]
    Forbidden(#[from] AuthzError),

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Lending(#[from] LendingError),

    /// Lost an optimistic concurrency race; retrying with fresh state may succeed.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Concurrency(msg) => ServiceError::Conflict(msg),
            StoreError::InventoryBounds(msg) => {
                ServiceError::Conflict(format!("stock changed concurrently; {msg}"))
            }
            StoreError::NotFound(what) => ServiceError::NotFound(what),
            other => ServiceError::Store(other),
        }
    }
}

impl From<DomainError> for ServiceError {
    fn from(value: DomainError) -> Self {
        ServiceError::Lending(LendingError::Domain(value))
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// A request together with the item it borrows, as stored after the operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDetails {
    pub request: LendingRequest,
    pub item: Item,
}

/// A student's submission, before ids and dates are assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    pub item_id: ItemId,
    pub quantity: i64,
    pub required_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

pub struct LendingService<S> {
    store: S,
    policy: LendingPolicy,
    clock: Arc<dyn Clock>,
}

impl<S: LendingStore> LendingService<S> {
    pub fn new(store: S, policy: LendingPolicy, clock: Arc<dyn Clock>) -> Self {
        Self { store, policy, clock }
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    pub async fn resolve_actor(&self, user_id: UserId) -> ServiceResult<Actor> {
        self.store
            .resolve_actor(user_id)
            .await?
            .ok_or(ServiceError::Unauthenticated)
    }

    #[instrument(skip(self, actor, new), fields(user_id = %actor.user_id(), kind = %new.kind), err)]
    pub async fn create_item(&self, actor: &Actor, new: NewItem) -> ServiceResult<Item> {
        authorize_item_management(actor, new.domain_id)?;
        let item = Item::new(ItemId::new(), new)?;
        self.store.insert_item(&item).await?;
        tracing::info!(item_id = %item.id_typed(), total = item.total_quantity(), "item created");
        Ok(item)
    }

    #[instrument(skip(self), err)]
    pub async fn get_item(&self, kind: ItemKind, id: ItemId) -> ServiceResult<Item> {
        self.store
            .get_item(id)
            .await?
            .filter(|item| item.kind() == kind)
            .ok_or_else(|| ServiceError::NotFound(format!("{kind} {id}")))
    }

    #[instrument(skip(self), err)]
    pub async fn list_items(&self, kind: ItemKind) -> ServiceResult<Vec<Item>> {
        Ok(self.store.list_items(kind).await?)
    }

    #[instrument(
        skip(self, actor, submission),
        fields(user_id = %actor.user_id(), item_id = %submission.item_id, quantity = submission.quantity),
        err
    )]
    pub async fn submit_request(
        &self,
        actor: &Actor,
        kind: ItemKind,
        submission: SubmitRequest,
    ) -> ServiceResult<RequestDetails> {
        let Some(student_id) = actor.student_id() else {
            return Err(AuthzError::RoleNotPermitted(actor.role(), "submit requests").into());
        };
        let item = self.get_item(kind, submission.item_id).await?;

        let request = LendingRequest::submit(
            RequestId::new(),
            NewRequest {
                item_id: item.id_typed(),
                student_id,
                quantity: submission.quantity,
                required_date: submission.required_date,
                notes: submission.notes,
            },
            &item,
            self.clock.now(),
        )?;
        self.store.insert_request(&request).await?;

        tracing::info!(request_id = %request.id, "request submitted");
        Ok(RequestDetails { request, item })
    }

    /// Requests visible to `actor`, newest first, with overdue state brought up to date.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id(), role = %actor.role()), err)]
    pub async fn list_requests(
        &self,
        actor: &Actor,
        kind: ItemKind,
        status: Option<RequestStatus>,
    ) -> ServiceResult<Vec<RequestDetails>> {
        let rows = self.store.list_requests(kind, &ListScope::for_actor(actor)).await?;

        let mut out = Vec::with_capacity(rows.len());
        for (request, item) in rows {
            if let Some(details) = self.refresh_and_store(request, item).await? {
                if status.is_none_or(|s| details.request.status == s) {
                    out.push(details);
                }
            }
        }
        Ok(out)
    }

    #[instrument(skip(self, actor), fields(user_id = %actor.user_id(), role = %actor.role()), err)]
    pub async fn get_request(
        &self,
        actor: &Actor,
        kind: ItemKind,
        id: RequestId,
    ) -> ServiceResult<RequestDetails> {
        let (request, item) = self.load_visible(actor, kind, id).await?;
        self.refresh_and_store(request, item)
            .await?
            .ok_or_else(|| request_not_found(id))
    }

    #[instrument(
        skip(self, actor, change),
        fields(user_id = %actor.user_id(), role = %actor.role(), target = %change.target),
        err
    )]
    pub async fn change_status(
        &self,
        actor: &Actor,
        kind: ItemKind,
        id: RequestId,
        change: StatusChange,
    ) -> ServiceResult<RequestDetails> {
        let (request, mut item) = self.load_gated(actor, kind, id).await?;
        let now = self.clock.now();
        let expected = request.version();

        let outcome = match refresh_overdue(&request, &self.policy, now) {
            Some(refreshed) if refreshed.to != change.target => {
                item.apply_delta(refreshed.inventory_delta)?;
                let next = decide(actor, &refreshed.request, &item, &change, &self.policy, now)?;
                refreshed.then(next)
            }
            // When the refresh lands on the target, the table edge from the
            // stored status carries the same stock and fine effects.
            _ => decide(actor, &request, &item, &change, &self.policy, now)?,
        };

        self.commit(outcome, expected).await
    }

    /// Remove an expired reservation. Only the owning student may do this.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id(), role = %actor.role()), err)]
    pub async fn delete_request(&self, actor: &Actor, kind: ItemKind, id: RequestId) -> ServiceResult<()> {
        if actor.role() != Role::Student {
            return Err(AuthzError::RoleNotPermitted(actor.role(), "delete requests").into());
        }
        let (request, item) = self.load_gated(actor, kind, id).await?;

        let current = self
            .refresh_and_store(request, item)
            .await?
            .ok_or_else(|| request_not_found(id))?;
        ensure_deletable(&current.request)?;

        self.store
            .delete_request(id, ExpectedVersion::Exact(current.request.version()))
            .await?;
        tracing::info!(request_id = %id, "request deleted");
        Ok(())
    }

    async fn load(&self, kind: ItemKind, id: RequestId) -> ServiceResult<(LendingRequest, Item)> {
        let request = self
            .store
            .load_request(id)
            .await?
            .ok_or_else(|| request_not_found(id))?;
        let item = self
            .store
            .get_item(request.item_id)
            .await?
            .filter(|item| item.kind() == kind)
            .ok_or_else(|| request_not_found(id))?;
        Ok((request, item))
    }

    /// Load and pass the authorization gate required to act on a request.
    async fn load_gated(
        &self,
        actor: &Actor,
        kind: ItemKind,
        id: RequestId,
    ) -> ServiceResult<(LendingRequest, Item)> {
        let (request, item) = self.load(kind, id).await?;
        authorize_request_access(actor, &scope_of(&request, &item))?;
        Ok((request, item))
    }

    /// Like [`Self::load_gated`], but faculty may also read requests they handled.
    async fn load_visible(
        &self,
        actor: &Actor,
        kind: ItemKind,
        id: RequestId,
    ) -> ServiceResult<(LendingRequest, Item)> {
        let (request, item) = self.load(kind, id).await?;
        let handled = actor.faculty_id().is_some() && request.faculty_id == actor.faculty_id();
        if !handled {
            authorize_request_access(actor, &scope_of(&request, &item))?;
        }
        Ok((request, item))
    }

    /// Apply and persist read-triggered overdue changes.
    ///
    /// Losing the race to another writer is not an error for a read: the
    /// stored state is reloaded and returned as is. `None` means the request
    /// was deleted in the meantime.
    async fn refresh_and_store(
        &self,
        request: LendingRequest,
        item: Item,
    ) -> ServiceResult<Option<RequestDetails>> {
        let Some(outcome) = refresh_overdue(&request, &self.policy, self.clock.now()) else {
            return Ok(Some(RequestDetails { request, item }));
        };

        match self.commit(outcome, request.version()).await {
            Ok(details) => Ok(Some(details)),
            Err(ServiceError::Conflict(reason)) => {
                tracing::warn!(request_id = %request.id, %reason, "overdue refresh lost a race; reloading");
                let Some(request) = self.store.load_request(request.id).await? else {
                    return Ok(None);
                };
                let item = self
                    .store
                    .get_item(request.item_id)
                    .await?
                    .ok_or_else(|| ServiceError::NotFound(format!("item {}", request.item_id)))?;
                Ok(Some(RequestDetails { request, item }))
            }
            Err(e) => Err(e),
        }
    }

    async fn commit(&self, outcome: TransitionOutcome, expected: u64) -> ServiceResult<RequestDetails> {
        let TransitionOutcome {
            from,
            to,
            inventory_delta,
            request,
        } = outcome;

        let (request, item) = self
            .store
            .commit_transition(TransitionCommit {
                item_id: request.item_id,
                inventory_delta,
                request,
                expected_version: ExpectedVersion::Exact(expected),
            })
            .await?;

        tracing::info!(
            request_id = %request.id,
            from = %from,
            to = %to,
            delta = inventory_delta,
            available = item.available_quantity(),
            "request transition committed"
        );
        Ok(RequestDetails { request, item })
    }
}

fn scope_of(request: &LendingRequest, item: &Item) -> RequestScope {
    RequestScope {
        student_id: request.student_id,
        item_domain: item.domain_id(),
    }
}

fn request_not_found(id: RequestId) -> ServiceError {
    ServiceError::NotFound(format!("request {id}"))
}
