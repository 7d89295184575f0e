use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use reqwest::StatusCode;
use serde_json::{Value, json};

use campusops_auth::Actor;
use campusops_core::{DomainId, FacultyId, ManualClock, StudentId, UserId};
use campusops_infra::{InMemoryLendingStore, LendingService, LendingStore};
use campusops_lending::LendingPolicy;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
    client: reqwest::Client,
    clock: Arc<ManualClock>,
    admin: Actor,
    alice: Actor,
    bob: Actor,
    physics_faculty: Actor,
    physics: DomainId,
}

impl TestServer {
    async fn spawn() -> Self {
        let physics = DomainId::new();
        let admin = Actor::Admin { user_id: UserId::new() };
        let alice = Actor::Student {
            user_id: UserId::new(),
            student_id: StudentId::new(),
        };
        let bob = Actor::Student {
            user_id: UserId::new(),
            student_id: StudentId::new(),
        };
        let physics_faculty = Actor::Faculty {
            user_id: UserId::new(),
            faculty_id: FacultyId::new(),
            coordinated_domains: vec![physics],
        };

        let store = InMemoryLendingStore::new();
        for actor in [&admin, &alice, &bob, &physics_faculty] {
            store.register_actor(actor.clone()).unwrap();
        }
        let store: Arc<dyn LendingStore> = Arc::new(store);

        let clock = Arc::new(ManualClock::default());
        let policy = LendingPolicy {
            reservation_window: ChronoDuration::minutes(2),
            ..LendingPolicy::default()
        };
        let service = LendingService::new(store, policy, clock.clone());

        // Same router as prod, bound to an ephemeral port.
        let app = campusops_api::app::build_app(Arc::new(service));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            handle,
            client: reqwest::Client::new(),
            clock,
            admin,
            alice,
            bob,
            physics_faculty,
            physics,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, as_actor: &Actor, method: reqwest::Method, path: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = self
            .client
            .request(method, self.url(path))
            .header("x-user-id", as_actor.user_id().to_string());
        if let Some(body) = body {
            req = req.json(&body);
        }
        let res = req.send().await.unwrap();
        let status = res.status();
        let body = res.json::<Value>().await.unwrap_or(Value::Null);
        (status, body)
    }

    async fn get(&self, as_actor: &Actor, path: &str) -> (StatusCode, Value) {
        self.send(as_actor, reqwest::Method::GET, path, None).await
    }

    async fn post(&self, as_actor: &Actor, path: &str, body: Value) -> (StatusCode, Value) {
        self.send(as_actor, reqwest::Method::POST, path, Some(body)).await
    }

    async fn patch(&self, as_actor: &Actor, path: &str, body: Value) -> (StatusCode, Value) {
        self.send(as_actor, reqwest::Method::PATCH, path, Some(body)).await
    }

    async fn delete(&self, as_actor: &Actor, path: &str) -> (StatusCode, Value) {
        self.send(as_actor, reqwest::Method::DELETE, path, None).await
    }

    async fn stock_component(&self, total: i64, domain_id: Option<DomainId>) -> String {
        let (status, body) = self
            .post(
                &self.admin,
                "/lab-components",
                json!({
                    "name": "Arduino Uno",
                    "total_quantity": total,
                    "domain_id": domain_id.map(|d| d.to_string()),
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().unwrap().to_string()
    }

    async fn request_component(&self, student: &Actor, item_id: &str, quantity: i64) -> String {
        let (status, body) = self
            .post(
                student,
                "/component-requests",
                json!({ "item_id": item_id, "quantity": quantity }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        assert_eq!(body["status"], "PENDING");
        body["id"].as_str().unwrap().to_string()
    }

    async fn available(&self, item_id: &str) -> i64 {
        let (status, body) = self.get(&self.admin, &format!("/lab-components/{item_id}")).await;
        assert_eq!(status, StatusCode::OK);
        body["available_quantity"].as_i64().unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = srv.client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn user_header_is_required_and_must_resolve() {
    let srv = TestServer::spawn().await;

    let res = srv.client.get(srv.url("/whoami")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["code"], "unauthenticated");
    assert!(body["error"].is_string());

    let res = srv
        .client
        .get(srv.url("/component-requests"))
        .header("x-user-id", UserId::new().to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let (status, body) = srv.get(&srv.alice, "/whoami").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "STUDENT");
    assert_eq!(body["user_id"], srv.alice.user_id().to_string());
}

#[tokio::test]
async fn approve_collect_overdue_and_fined_return() {
    let srv = TestServer::spawn().await;
    let item = srv.stock_component(5, Some(srv.physics)).await;
    let id = srv.request_component(&srv.alice, &item, 2).await;
    let path = format!("/component-requests/{id}");
    let faculty = &srv.physics_faculty;

    let (status, body) = srv.patch(faculty, &path, json!({ "status": "APPROVED", "faculty_notes": "bench 4" })).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "APPROVED");
    assert_eq!(body["faculty_notes"], "bench 4");
    assert_eq!(body["faculty_id"], faculty.faculty_id().unwrap().to_string());
    assert_eq!(srv.available(&item).await, 3);

    let (status, body) = srv.patch(faculty, &path, json!({ "status": "COLLECTED" })).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert!(body["due_date"].is_string());
    assert_eq!(srv.available(&item).await, 3);

    srv.clock.advance(ChronoDuration::days(17));

    let (status, body) = srv.get(&srv.alice, &path).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OVERDUE");
    assert_eq!(body["fine_amount"], "15.00");
    assert_eq!(srv.available(&item).await, 3);

    let (status, body) = srv
        .patch(&srv.alice, &path, json!({ "status": "PENDING_RETURN", "payment_proof": "upi/ref/8812" }))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["payment_proof"], "upi/ref/8812");

    let (status, body) = srv.patch(faculty, &path, json!({ "status": "RETURNED" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "payment_not_verified");
    assert_eq!(srv.available(&item).await, 3);

    let (status, body) = srv
        .patch(faculty, &path, json!({ "status": "RETURNED", "payment_verified": true }))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "RETURNED");
    assert_eq!(body["fine_paid"], true);
    assert_eq!(body["item"]["available_quantity"], 5);
}

#[tokio::test]
async fn late_return_settled_directly_by_staff() {
    let srv = TestServer::spawn().await;
    let item = srv.stock_component(5, None).await;
    let id = srv.request_component(&srv.alice, &item, 2).await;
    let path = format!("/component-requests/{id}");

    for next in ["APPROVED", "COLLECTED"] {
        let (status, body) = srv.patch(&srv.admin, &path, json!({ "status": next })).await;
        assert_eq!(status, StatusCode::OK, "{body}");
    }
    srv.clock.advance(ChronoDuration::days(16));

    let (status, body) = srv.patch(&srv.admin, &path, json!({ "status": "RETURNED" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "payment_not_verified");
    assert_eq!(srv.available(&item).await, 3);

    let (status, body) = srv
        .patch(&srv.admin, &path, json!({ "status": "RETURNED", "payment_verified": true }))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "RETURNED");
    assert_eq!(body["version"], 3);
    assert_eq!(body["fine_amount"], "10.00");
    assert_eq!(body["fine_paid"], true);
    assert_eq!(body["item"]["available_quantity"], 5);
}

#[tokio::test]
async fn approval_beyond_stock_is_rejected_without_changing_it() {
    let srv = TestServer::spawn().await;
    let item = srv.stock_component(3, None).await;
    let first = srv.request_component(&srv.alice, &item, 2).await;
    let second = srv.request_component(&srv.bob, &item, 2).await;

    let (status, _) = srv
        .patch(&srv.admin, &format!("/component-requests/{first}"), json!({ "status": "APPROVED" }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = srv
        .patch(&srv.admin, &format!("/component-requests/{second}"), json!({ "status": "APPROVED" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "insufficient_inventory");
    assert_eq!(srv.available(&item).await, 1);
}

#[tokio::test]
async fn rejection_restores_only_reserved_stock() {
    let srv = TestServer::spawn().await;
    let item = srv.stock_component(4, None).await;
    let pending = srv.request_component(&srv.alice, &item, 1).await;
    let approved = srv.request_component(&srv.alice, &item, 3).await;

    let (status, _) = srv
        .patch(&srv.admin, &format!("/component-requests/{pending}"), json!({ "status": "REJECTED" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(srv.available(&item).await, 4);

    srv.patch(&srv.admin, &format!("/component-requests/{approved}"), json!({ "status": "APPROVED" }))
        .await;
    assert_eq!(srv.available(&item).await, 1);
    let (status, body) = srv
        .patch(&srv.admin, &format!("/component-requests/{approved}"), json!({ "status": "rejected" }))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(srv.available(&item).await, 4);
}

#[tokio::test]
async fn students_cannot_make_staff_transitions_or_touch_others_requests() {
    let srv = TestServer::spawn().await;
    let item = srv.stock_component(2, None).await;
    let id = srv.request_component(&srv.alice, &item, 1).await;
    let path = format!("/component-requests/{id}");

    let (status, body) = srv.patch(&srv.alice, &path, json!({ "status": "APPROVED" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "illegal_transition");

    let (status, body) = srv.get(&srv.bob, &path).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden");

    let (status, body) = srv.patch(&srv.alice, &path, json!({ "status": "MISPLACED" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_status");
}

#[tokio::test]
async fn faculty_outside_the_items_domain_is_forbidden() {
    let srv = TestServer::spawn().await;
    let item = srv.stock_component(2, Some(DomainId::new())).await;
    let id = srv.request_component(&srv.alice, &item, 1).await;

    let (status, _) = srv
        .patch(&srv.physics_faculty, &format!("/component-requests/{id}"), json!({ "status": "APPROVED" }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(srv.available(&item).await, 2);
}

#[tokio::test]
async fn only_overdue_requests_can_be_deleted_by_their_owner() {
    let srv = TestServer::spawn().await;
    let item = srv.stock_component(3, None).await;
    let id = srv.request_component(&srv.alice, &item, 2).await;
    let path = format!("/component-requests/{id}");

    let (status, body) = srv.delete(&srv.alice, &path).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "not_deletable");

    srv.patch(&srv.admin, &path, json!({ "status": "APPROVED" })).await;
    assert_eq!(srv.available(&item).await, 1);

    // Reservation window elapses; the delete itself expires it first.
    srv.clock.advance(ChronoDuration::minutes(5));
    let (status, _) = srv.delete(&srv.bob, &path).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = srv.delete(&srv.alice, &path).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(srv.available(&item).await, 3);

    let (status, _) = srv.get(&srv.alice, &path).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn requests_are_only_reachable_under_their_own_kind() {
    let srv = TestServer::spawn().await;
    let item = srv.stock_component(1, None).await;
    let id = srv.request_component(&srv.alice, &item, 1).await;

    let (status, _) = srv.get(&srv.alice, &format!("/library-requests/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = srv.get(&srv.alice, &format!("/library-items/{item}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = srv
        .post(&srv.alice, "/library-requests", json!({ "item_id": item, "quantity": 1 }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND, "{body}");

    let (status, body) = srv.get(&srv.alice, "/component-requests/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_id");
}

#[tokio::test]
async fn listing_is_scoped_to_the_caller_and_filterable() {
    let srv = TestServer::spawn().await;
    let item = srv.stock_component(5, None).await;
    let mine = srv.request_component(&srv.alice, &item, 1).await;
    srv.request_component(&srv.bob, &item, 1).await;
    srv.patch(&srv.admin, &format!("/component-requests/{mine}"), json!({ "status": "APPROVED" }))
        .await;

    let (status, body) = srv.get(&srv.alice, "/component-requests").await;
    assert_eq!(status, StatusCode::OK);
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], mine.as_str());

    let (_, body) = srv.get(&srv.admin, "/component-requests").await;
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (_, body) = srv.get(&srv.admin, "/component-requests?status=PENDING").await;
    let rows = body.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["student_id"], srv.bob.student_id().unwrap().to_string());

    let (_, body) = srv.get(&srv.alice, "/library-requests").await;
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn students_cannot_stock_items() {
    let srv = TestServer::spawn().await;
    let (status, body) = srv
        .post(&srv.alice, "/library-items", json!({ "name": "Feynman Lectures", "total_quantity": 2 }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden");

    let (status, body) = srv
        .post(&srv.admin, "/library-items", json!({ "name": "Feynman Lectures", "total_quantity": 2 }))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["kind"], "library_item");
    assert_eq!(body["available_quantity"], 2);

    let (_, body) = srv.get(&srv.alice, "/library-items").await;
    assert_eq!(body.as_array().unwrap().len(), 1);
}
