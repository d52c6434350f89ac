use actix_web::{http::StatusCode, test, web, App};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use taskdeck::api::AuthClient;
use taskdeck::auth::{ProviderGate, StaticGate};
use taskdeck::error::{Error, Result};
use taskdeck::models::{Identity, NewTask, Priority, Task, TaskExtras, TaskPatch, TaskStatus};
use taskdeck::server::{configure, cors, AppState};
use taskdeck::store::{MemoryTaskStore, TaskStore};
use uuid::Uuid;

const ALICE: &str = "Bearer alice-token";
const BOB: &str = "Bearer bob-token";

fn gate() -> StaticGate {
    StaticGate::new()
        .with_token("alice-token", Identity::new("alice"))
        .with_token("bob-token", Identity::new("bob"))
}

fn task(owner: &str, title: &str, status: TaskStatus, month: u32, priority: Option<Priority>) -> Task {
    let created = Utc.with_ymd_and_hms(2024, month, 10, 12, 0, 0).unwrap();
    Task {
        id: Uuid::new_v4(),
        title: title.to_string(),
        description: String::new(),
        status,
        extras: TaskExtras {
            priority,
            ..TaskExtras::default()
        },
        owner_id: owner.to_string(),
        created_at: created,
        updated_at: created,
    }
}

struct FailingStore;

#[async_trait]
impl TaskStore for FailingStore {
    async fn list_tasks(&self, _owner: &Identity) -> Result<Vec<Task>> {
        Err(Error::Upstream("connection refused".to_string()))
    }

    async fn create_task(&self, _draft: &NewTask, _owner: &Identity) -> Result<Task> {
        Err(Error::Upstream("connection refused".to_string()))
    }

    async fn update_task(&self, _owner: &Identity, _id: Uuid, _patch: &TaskPatch) -> Result<Task> {
        Err(Error::Upstream("connection refused".to_string()))
    }

    async fn delete_task(&self, _owner: &Identity, _id: Uuid) -> Result<()> {
        Err(Error::Upstream("connection refused".to_string()))
    }
}

macro_rules! service {
    ($store:expr) => {
        service!($store, Arc::new(gate()))
    };
    ($store:expr, $gate:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new(AppState::new($store, $gate)))
                .wrap(cors())
                .configure(configure),
        )
        .await
    };
}

#[actix_web::test]
async fn test_missing_header_is_unauthorized() {
    let app = service!(MemoryTaskStore::shared());
    let req = test::TestRequest::get().uri("/task-insights").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(resp.headers().get("Access-Control-Allow-Origin").unwrap(), "*");
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({ "error": "No authorization header" }));
}

#[actix_web::test]
async fn test_session_is_checked_before_the_body() {
    let store = MemoryTaskStore::shared();
    let app = service!(store.clone());

    let req = test::TestRequest::post()
        .uri("/tasks")
        .set_json(json!({}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({ "error": "No authorization header" }));

    let req = test::TestRequest::put()
        .uri(&format!("/tasks/{}", Uuid::new_v4()))
        .insert_header(("Authorization", "Bearer nope"))
        .set_payload("not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({ "error": "Invalid token" }));
    assert!(store.is_empty().await);
}

#[actix_web::test]
async fn test_bad_body_from_signed_in_caller_is_bad_request() {
    let app = service!(MemoryTaskStore::shared());
    let req = test::TestRequest::post()
        .uri("/tasks")
        .insert_header(("Authorization", ALICE))
        .set_json(json!({ "description": "no title" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Invalid request body"));
}

#[actix_web::test]
async fn test_unreachable_identity_provider_is_internal_error() {
    // Nothing listens on port 1.
    let gate = ProviderGate::new(AuthClient::new("http://127.0.0.1:1", "service-key"));
    let app = service!(MemoryTaskStore::shared(), Arc::new(gate));
    let req = test::TestRequest::get()
        .uri("/task-insights")
        .insert_header(("Authorization", ALICE))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(resp.headers().get("Access-Control-Allow-Origin").unwrap(), "*");
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({ "error": "Internal server error" }));
}

#[actix_web::test]
async fn test_unknown_or_malformed_token_is_unauthorized() {
    let app = service!(MemoryTaskStore::shared());
    for header in ["Bearer nope", "Basic abc", "Bearer "] {
        let req = test::TestRequest::get()
            .uri("/task-insights")
            .insert_header(("Authorization", header))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "header {:?}", header);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({ "error": "Invalid token" }));
    }
}

#[actix_web::test]
async fn test_preflight_needs_no_auth() {
    let app = service!(MemoryTaskStore::shared());
    let req = test::TestRequest::default()
        .method(actix_web::http::Method::OPTIONS)
        .uri("/task-insights")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let headers = resp.headers();
    assert_eq!(headers.get("Access-Control-Allow-Origin").unwrap(), "*");
    assert_eq!(
        headers.get("Access-Control-Allow-Headers").unwrap(),
        "authorization, x-client-info, apikey, content-type"
    );
    assert_eq!(
        headers.get("Access-Control-Allow-Methods").unwrap(),
        "GET, POST, PUT, DELETE, OPTIONS"
    );
    let body = test::read_body(resp).await;
    assert!(body.is_empty());
}

#[actix_web::test]
async fn test_insights_for_caller_only() {
    let store = Arc::new(MemoryTaskStore::with_tasks(vec![
        task("alice", "Old", TaskStatus::Done, 1, Some(Priority::High)),
        task("alice", "Newest", TaskStatus::Pending, 3, None),
        task("alice", "Middle", TaskStatus::InProgress, 2, Some(Priority::Low)),
        task("bob", "Not mine", TaskStatus::Done, 4, None),
    ]));
    let app = service!(store);
    let req = test::TestRequest::get()
        .uri("/task-insights")
        .insert_header(("Authorization", ALICE))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get("Access-Control-Allow-Origin").unwrap(),
        "*"
    );
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["totalTasks"], 3);
    assert_eq!(body["pendingTasks"], 1);
    assert_eq!(body["inProgressTasks"], 1);
    assert_eq!(body["completedTasks"], 1);
    assert_eq!(body["completionRate"], 33);
    assert_eq!(body["mostRecentTask"], "Newest");
    assert_eq!(
        body["tasksByMonth"],
        json!({ "January 2024": 1, "February 2024": 1, "March 2024": 1 })
    );
    assert_eq!(
        body["priorityDistribution"],
        json!({ "low": 1, "medium": 1, "high": 1 })
    );
}

#[actix_web::test]
async fn test_insights_with_no_tasks() {
    let app = service!(MemoryTaskStore::shared());
    let req = test::TestRequest::get()
        .uri("/task-insights")
        .insert_header(("Authorization", BOB))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["totalTasks"], 0);
    assert_eq!(body["completionRate"], 0);
    assert_eq!(body["mostRecentTask"], Value::Null);
    assert_eq!(body["tasksByMonth"], json!({}));
}

#[actix_web::test]
async fn test_store_failure_is_reported() {
    let app = service!(Arc::new(FailingStore));
    let req = test::TestRequest::get()
        .uri("/task-insights")
        .insert_header(("Authorization", ALICE))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(resp.headers().get("Access-Control-Allow-Origin").unwrap(), "*");
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({ "error": "Failed to fetch tasks" }));
}

#[actix_web::test]
async fn test_task_lifecycle() {
    let store = MemoryTaskStore::shared();
    let app = service!(store.clone());

    // create, ignoring any owner sent in the body
    let req = test::TestRequest::post()
        .uri("/tasks")
        .insert_header(("Authorization", ALICE))
        .set_json(json!({
            "title": "Write report",
            "status": "pending",
            "extras": { "priority": "high", "tags": ["work"] },
            "user_id": "bob"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: Value = test::read_body_json(resp).await;
    assert_eq!(created["user_id"], "alice");
    assert_eq!(created["description"], "");
    let id = created["id"].as_str().unwrap().to_string();

    // bob cannot see or touch it
    let req = test::TestRequest::put()
        .uri(&format!("/tasks/{}", id))
        .insert_header(("Authorization", BOB))
        .set_json(json!({ "status": "done" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({ "error": "Task not found" }));

    // owner update
    let req = test::TestRequest::put()
        .uri(&format!("/tasks/{}", id))
        .insert_header(("Authorization", ALICE))
        .set_json(json!({ "status": "in-progress" }))
        .to_request();
    let updated: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(updated["status"], "in-progress");
    assert_eq!(updated["title"], "Write report");
    assert_eq!(updated["extras"]["priority"], "high");

    // delete twice
    let req = test::TestRequest::delete()
        .uri(&format!("/tasks/{}", id))
        .insert_header(("Authorization", ALICE))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);
    let req = test::TestRequest::delete()
        .uri(&format!("/tasks/{}", id))
        .insert_header(("Authorization", ALICE))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    assert!(store.is_empty().await);
}

#[actix_web::test]
async fn test_blank_title_is_rejected() {
    let store = MemoryTaskStore::shared();
    let app = service!(store.clone());
    let req = test::TestRequest::post()
        .uri("/tasks")
        .insert_header(("Authorization", ALICE))
        .set_json(json!({ "title": "   " }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body, json!({ "error": "Title is required" }));
    assert!(store.is_empty().await);
}

#[actix_web::test]
async fn test_malformed_id_is_not_found() {
    let app = service!(MemoryTaskStore::shared());
    let req = test::TestRequest::delete()
        .uri("/tasks/not-a-uuid")
        .insert_header(("Authorization", ALICE))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_list_filters_by_status_and_query() {
    let store = Arc::new(MemoryTaskStore::with_tasks(vec![
        task("alice", "Report draft", TaskStatus::Pending, 1, None),
        task("alice", "Report final", TaskStatus::Done, 2, None),
        task("alice", "Groceries", TaskStatus::Pending, 3, None),
        task("bob", "Report for bob", TaskStatus::Pending, 3, None),
    ]));
    let app = service!(store);

    let req = test::TestRequest::get()
        .uri("/tasks?status=pending&q=REPORT")
        .insert_header(("Authorization", ALICE))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let titles: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Report draft"]);

    let req = test::TestRequest::get()
        .uri("/tasks")
        .insert_header(("Authorization", ALICE))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    let titles: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Groceries", "Report final", "Report draft"]);

    let req = test::TestRequest::get()
        .uri("/tasks?status=archived")
        .insert_header(("Authorization", ALICE))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
}
