use std::collections::HashMap;
use std::sync::RwLock;

use campusops_auth::Actor;
use campusops_core::{ExpectedVersion, ItemId, RequestId, UserId};
use campusops_lending::{Item, ItemKind, LendingRequest};

use super::{LendingStore, ListScope, StoreError, TransitionCommit};

#[derive(Debug, Default)]
struct State {
    actors: HashMap<UserId, Actor>,
    items: HashMap<ItemId, Item>,
    requests: HashMap<RequestId, LendingRequest>,
}

/// In-memory lending store.
///
/// Intended for tests/dev. A single lock covers items and requests, so a
/// transition's stock change and request write land together.
#[derive(Debug, Default)]
pub struct InMemoryLendingStore {
    state: RwLock<State>,
}

impl InMemoryLendingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `actor` resolvable by its user id.
    pub fn register_actor(&self, actor: Actor) -> Result<(), StoreError> {
        let mut state = self.write()?;
        state.actors.insert(actor.user_id(), actor);
        Ok(())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Database("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Database("lock poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl LendingStore for InMemoryLendingStore {
    async fn resolve_actor(&self, user_id: UserId) -> Result<Option<Actor>, StoreError> {
        Ok(self.read()?.actors.get(&user_id).cloned())
    }

    async fn insert_item(&self, item: &Item) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if state.items.contains_key(&item.id_typed()) {
            return Err(StoreError::Concurrency(format!("item {} already exists", item.id_typed())));
        }
        state.items.insert(item.id_typed(), item.clone());
        Ok(())
    }

    async fn get_item(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
        Ok(self.read()?.items.get(&id).cloned())
    }

    async fn list_items(&self, kind: ItemKind) -> Result<Vec<Item>, StoreError> {
        let state = self.read()?;
        let mut items: Vec<Item> = state
            .items
            .values()
            .filter(|i| i.kind() == kind)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.name().cmp(b.name()).then(a.id_typed().as_uuid().cmp(b.id_typed().as_uuid())));
        Ok(items)
    }

    async fn insert_request(&self, request: &LendingRequest) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if !state.items.contains_key(&request.item_id) {
            return Err(StoreError::NotFound(format!("item {}", request.item_id)));
        }
        if state.requests.contains_key(&request.id) {
            return Err(StoreError::Concurrency(format!("request {} already exists", request.id)));
        }
        state.requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn load_request(&self, id: RequestId) -> Result<Option<LendingRequest>, StoreError> {
        Ok(self.read()?.requests.get(&id).cloned())
    }

    async fn list_requests(
        &self,
        kind: ItemKind,
        scope: &ListScope,
    ) -> Result<Vec<(LendingRequest, Item)>, StoreError> {
        let state = self.read()?;
        let mut rows: Vec<(LendingRequest, Item)> = state
            .requests
            .values()
            .filter_map(|r| state.items.get(&r.item_id).map(|i| (r, i)))
            .filter(|(r, i)| i.kind() == kind && scope.includes(r, i))
            .map(|(r, i)| (r.clone(), i.clone()))
            .collect();
        rows.sort_by(|(a, _), (b, _)| {
            b.request_date
                .cmp(&a.request_date)
                .then(b.id.as_uuid().cmp(a.id.as_uuid()))
        });
        Ok(rows)
    }

    async fn commit_transition(
        &self,
        commit: TransitionCommit,
    ) -> Result<(LendingRequest, Item), StoreError> {
        let mut state = self.write()?;

        let current = state
            .requests
            .get(&commit.request.id)
            .ok_or_else(|| StoreError::NotFound(format!("request {}", commit.request.id)))?;
        commit
            .expected_version
            .check(current.version)
            .map_err(|e| StoreError::Concurrency(format!("request {}: {e}", commit.request.id)))?;
        let next_version = current.version + 1;

        let item = state
            .items
            .get(&commit.item_id)
            .ok_or_else(|| StoreError::NotFound(format!("item {}", commit.item_id)))?;
        let mut item = item.clone();
        item.apply_delta(commit.inventory_delta)
            .map_err(|e| StoreError::InventoryBounds(format!("item {}: {e}", commit.item_id)))?;

        let mut request = commit.request;
        request.version = next_version;

        state.items.insert(item.id_typed(), item.clone());
        state.requests.insert(request.id, request.clone());
        Ok((request, item))
    }

    async fn delete_request(
        &self,
        id: RequestId,
        expected_version: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let mut state = self.write()?;
        let current = state
            .requests
            .get(&id)
            .ok_or_else(|| StoreError::NotFound(format!("request {id}")))?;
        expected_version
            .check(current.version)
            .map_err(|e| StoreError::Concurrency(format!("request {id}: {e}")))?;
        state.requests.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use campusops_core::{DomainId, FacultyId, StudentId};
    use campusops_lending::{NewItem, NewRequest, RequestStatus};
    use chrono::{Duration, Utc};

    fn item(kind: ItemKind, name: &str, total: i64, domain_id: Option<DomainId>) -> Item {
        Item::new(
            ItemId::new(),
            NewItem {
                kind,
                name: name.to_string(),
                total_quantity: total,
                domain_id,
            },
        )
        .unwrap()
    }

    fn request(item: &Item, student_id: StudentId, quantity: i64) -> LendingRequest {
        LendingRequest::submit(
            RequestId::new(),
            NewRequest {
                item_id: item.id_typed(),
                student_id,
                quantity,
                required_date: None,
                notes: None,
            },
            item,
            Utc::now(),
        )
        .unwrap()
    }

    fn approve(mut r: LendingRequest) -> LendingRequest {
        r.status = RequestStatus::Approved;
        r
    }

    #[tokio::test]
    async fn commit_moves_stock_and_bumps_version_together() {
        let store = InMemoryLendingStore::new();
        let it = item(ItemKind::LabComponent, "Oscilloscope", 3, None);
        store.insert_item(&it).await.unwrap();
        let req = request(&it, StudentId::new(), 2);
        store.insert_request(&req).await.unwrap();

        let (stored, after) = store
            .commit_transition(TransitionCommit {
                item_id: it.id_typed(),
                inventory_delta: -2,
                request: approve(req.clone()),
                expected_version: ExpectedVersion::Exact(0),
            })
            .await
            .unwrap();

        assert_eq!(stored.version, 1);
        assert_eq!(stored.status, RequestStatus::Approved);
        assert_eq!(after.available_quantity(), 1);
        assert_eq!(store.get_item(it.id_typed()).await.unwrap().unwrap().available_quantity(), 1);
    }

    #[tokio::test]
    async fn stale_version_changes_nothing() {
        let store = InMemoryLendingStore::new();
        let it = item(ItemKind::LabComponent, "Multimeter", 3, None);
        store.insert_item(&it).await.unwrap();
        let req = request(&it, StudentId::new(), 1);
        store.insert_request(&req).await.unwrap();

        let err = store
            .commit_transition(TransitionCommit {
                item_id: it.id_typed(),
                inventory_delta: -1,
                request: approve(req.clone()),
                expected_version: ExpectedVersion::Exact(7),
            })
            .await
            .unwrap_err();

        assert!(matches!(
            &err,
            StoreError::Concurrency(msg) if msg.contains("expected: Exact(7), actual: 0")
        ));
        assert_eq!(store.get_item(it.id_typed()).await.unwrap().unwrap().available_quantity(), 3);
        assert_eq!(store.load_request(req.id).await.unwrap().unwrap().status, RequestStatus::Pending);
    }

    #[tokio::test]
    async fn out_of_bounds_delta_leaves_request_untouched() {
        let store = InMemoryLendingStore::new();
        let it = item(ItemKind::LibraryItem, "Compilers", 1, None);
        store.insert_item(&it).await.unwrap();
        let req = request(&it, StudentId::new(), 1);
        store.insert_request(&req).await.unwrap();

        let err = store
            .commit_transition(TransitionCommit {
                item_id: it.id_typed(),
                inventory_delta: -2,
                request: approve(req.clone()),
                expected_version: ExpectedVersion::Exact(0),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::InventoryBounds(_)));
        let stored = store.load_request(req.id).await.unwrap().unwrap();
        assert_eq!((stored.status, stored.version), (RequestStatus::Pending, 0));
    }

    #[tokio::test]
    async fn listing_respects_kind_and_scope_newest_first() {
        let store = InMemoryLendingStore::new();
        let physics = DomainId::new();
        let chemistry = DomainId::new();
        let faculty_id = FacultyId::new();
        let alice = StudentId::new();
        let bob = StudentId::new();

        let open_book = item(ItemKind::LibraryItem, "Open shelf", 5, None);
        let physics_book = item(ItemKind::LibraryItem, "Optics", 5, Some(physics));
        let chem_book = item(ItemKind::LibraryItem, "Organic", 5, Some(chemistry));
        let breadboard = item(ItemKind::LabComponent, "Breadboard", 5, None);
        for it in [&open_book, &physics_book, &chem_book, &breadboard] {
            store.insert_item(it).await.unwrap();
        }

        let mut older = request(&open_book, alice, 1);
        older.request_date -= Duration::hours(1);
        let on_physics = request(&physics_book, bob, 1);
        let on_chem = request(&chem_book, alice, 1);
        let mut handled_chem = request(&chem_book, bob, 1);
        handled_chem.faculty_id = Some(faculty_id);
        let component = request(&breadboard, alice, 1);
        for r in [&older, &on_physics, &on_chem, &handled_chem, &component] {
            store.insert_request(r).await.unwrap();
        }

        let all = store.list_requests(ItemKind::LibraryItem, &ListScope::All).await.unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all.last().map(|(r, _)| r.id), Some(older.id));

        let alices = store
            .list_requests(ItemKind::LibraryItem, &ListScope::Student(alice))
            .await
            .unwrap();
        let ids: Vec<_> = alices.iter().map(|(r, _)| r.id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&older.id) && ids.contains(&on_chem.id));

        let faculty = store
            .list_requests(
                ItemKind::LibraryItem,
                &ListScope::Faculty {
                    faculty_id,
                    domains: vec![physics],
                },
            )
            .await
            .unwrap();
        let ids: Vec<_> = faculty.iter().map(|(r, _)| r.id).collect();
        assert_eq!(ids.len(), 3);
        assert!(ids.contains(&older.id));
        assert!(ids.contains(&on_physics.id));
        assert!(ids.contains(&handled_chem.id));
        assert!(!ids.contains(&on_chem.id));
    }

    #[tokio::test]
    async fn delete_checks_version() {
        let store = InMemoryLendingStore::new();
        let it = item(ItemKind::LibraryItem, "Atlas", 1, None);
        store.insert_item(&it).await.unwrap();
        let req = request(&it, StudentId::new(), 1);
        store.insert_request(&req).await.unwrap();

        let err = store.delete_request(req.id, ExpectedVersion::Exact(3)).await.unwrap_err();
        assert!(matches!(err, StoreError::Concurrency(_)));

        store.delete_request(req.id, ExpectedVersion::Exact(0)).await.unwrap();
        assert!(store.load_request(req.id).await.unwrap().is_none());
    }
}
