//! HTTP surface: `GET /task-insights` plus the owner-scoped task routes.

use crate::auth::{authorize, SessionGate};
use crate::error::{Error, Result};
use crate::filter::{filter_tasks, StatusFilter};
use crate::insights::compute_insights;
use crate::models::{Identity, NewTask, TaskPatch};
use crate::store::TaskStore;
use actix_web::http::{header, StatusCode};
use actix_web::{
    delete, get, middleware, options, post, put, web, App, HttpRequest, HttpResponse,
    HttpServer, ResponseError,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

pub struct AppState {
    pub store: Arc<dyn TaskStore>,
    pub gate: Arc<dyn SessionGate>,
}

impl AppState {
    pub fn new(store: Arc<dyn TaskStore>, gate: Arc<dyn SessionGate>) -> Self {
        AppState { store, gate }
    }
}

/// Error as sent to HTTP callers: a status and an `{"error": ...}` body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        ApiError {
            status,
            message: message.into(),
        }
    }

    fn fetch_failed() -> Self {
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch tasks")
    }

    fn internal() -> Self {
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    }

    fn not_found() -> Self {
        ApiError::new(StatusCode::NOT_FOUND, "Task not found")
    }

    fn bad_request(message: impl Into<String>) -> Self {
        ApiError::new(StatusCode::BAD_REQUEST, message)
    }

    /// Store failures; a rejected credential here is the server's own key, not the caller's.
    fn from_store(err: Error) -> Self {
        match err {
            Error::Unauthorized(_) => {
                error!(error = %err, "Store rejected the service credential");
                ApiError::internal()
            }
            other => other.into(),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status, self.message)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        self.status
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status).json(json!({ "error": self.message }))
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Unauthorized(failure) => {
                ApiError::new(StatusCode::UNAUTHORIZED, failure.to_string())
            }
            Error::NotFound(_) => ApiError::not_found(),
            Error::Validation(message) => ApiError::bad_request(message),
            other => {
                error!(error = %other, "Request failed");
                ApiError::internal()
            }
        }
    }
}

type ApiResult = std::result::Result<HttpResponse, ApiError>;

async fn identify(req: &HttpRequest, state: &AppState) -> std::result::Result<Identity, ApiError> {
    let header = req
        .headers()
        .get(header::AUTHORIZATION)
        .map(|value| value.to_str().unwrap_or_default());
    Ok(authorize(state.gate.as_ref(), header).await?)
}

fn parse_task_id(raw: &str) -> std::result::Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::not_found())
}

#[get("/task-insights")]
async fn task_insights(req: HttpRequest, state: web::Data<AppState>) -> ApiResult {
    let identity = identify(&req, &state).await?;
    let tasks = state.store.list_tasks(&identity).await.map_err(|err| {
        error!(error = %err, user_id = %identity.user_id, "Failed to fetch tasks");
        ApiError::fetch_failed()
    })?;
    let insight = compute_insights(&tasks);
    info!(
        user_id = %identity.user_id,
        total = insight.total_tasks,
        "Computed task insights"
    );
    Ok(HttpResponse::Ok().json(insight))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    q: Option<String>,
}

#[get("/tasks")]
async fn list_tasks(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<ListQuery>,
) -> ApiResult {
    let identity = identify(&req, &state).await?;
    let status: StatusFilter = query.status.as_deref().unwrap_or("all").parse()?;
    let tasks = state.store.list_tasks(&identity).await.map_err(|err| {
        error!(error = %err, user_id = %identity.user_id, "Failed to fetch tasks");
        ApiError::fetch_failed()
    })?;
    let visible = filter_tasks(&tasks, status, query.q.as_deref().unwrap_or_default());
    Ok(HttpResponse::Ok().json(visible))
}

/// Decodes a JSON body. Bodies are taken raw so the session check runs first.
fn parse_body<T: DeserializeOwned>(body: &[u8]) -> std::result::Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|err| {
        warn!(error = %err, "Rejected request body");
        ApiError::bad_request(format!("Invalid request body: {}", err))
    })
}

#[post("/tasks")]
async fn create_task(req: HttpRequest, state: web::Data<AppState>, body: web::Bytes) -> ApiResult {
    let identity = identify(&req, &state).await?;
    let draft: NewTask = parse_body(&body)?;
    draft.validate()?;
    let task = state
        .store
        .create_task(&draft, &identity)
        .await
        .map_err(ApiError::from_store)?;
    info!(task_id = %task.id, user_id = %identity.user_id, "Created task");
    Ok(HttpResponse::Created().json(task))
}

#[put("/tasks/{id}")]
async fn update_task(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Bytes,
) -> ApiResult {
    let identity = identify(&req, &state).await?;
    let id = parse_task_id(&path)?;
    let patch: TaskPatch = parse_body(&body)?;
    let task = state
        .store
        .update_task(&identity, id, &patch)
        .await
        .map_err(ApiError::from_store)?;
    info!(task_id = %task.id, "Updated task");
    Ok(HttpResponse::Ok().json(task))
}

#[delete("/tasks/{id}")]
async fn delete_task(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> ApiResult {
    let identity = identify(&req, &state).await?;
    let id = parse_task_id(&path)?;
    state
        .store
        .delete_task(&identity, id)
        .await
        .map_err(ApiError::from_store)?;
    info!(task_id = %id, "Deleted task");
    Ok(HttpResponse::NoContent().finish())
}

#[options("/{tail:.*}")]
async fn preflight() -> HttpResponse {
    HttpResponse::Ok().finish()
}

/// CORS headers added to every response.
pub fn cors() -> middleware::DefaultHeaders {
    middleware::DefaultHeaders::new()
        .add(("Access-Control-Allow-Origin", "*"))
        .add((
            "Access-Control-Allow-Headers",
            "authorization, x-client-info, apikey, content-type",
        ))
        .add((
            "Access-Control-Allow-Methods",
            "GET, POST, PUT, DELETE, OPTIONS",
        ))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::QueryConfig::default().error_handler(|err, _req| {
        ApiError::bad_request(err.to_string()).into()
    }))
    .service(preflight)
    .service(task_insights)
    .service(list_tasks)
    .service(create_task)
    .service(update_task)
    .service(delete_task);
}

pub async fn run(state: AppState, bind: &str) -> Result<()> {
    let state = web::Data::new(state);
    info!(%bind, "Starting task insights server");
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(cors())
            .wrap(middleware::Logger::default())
            .configure(configure)
    })
    .bind(bind)?
    .run()
    .await?;
    Ok(())
}
