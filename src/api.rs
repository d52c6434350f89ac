use crate::error::{AuthFailure, Error, Result};
use crate::insights::TaskInsight;
use crate::models::{Identity, NewTask, Task, TaskExtras, TaskPatch, TaskStatus};
use crate::session::AuthSession;
use crate::store::TaskStore;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error};
use uuid::Uuid;

/// Task table behind a PostgREST endpoint (`<url>/rest/v1/<table>`).
///
/// Runs either with the service key (server side) or with a user's access
/// token (terminal client). Every query filters on `user_id` regardless.
#[derive(Clone)]
pub struct RestTaskStore {
    client: Client,
    base_url: String,
    table: String,
    api_key: String,
    bearer: String,
}

#[derive(Serialize)]
struct InsertRow<'a> {
    title: &'a str,
    description: &'a str,
    status: TaskStatus,
    extras: &'a TaskExtras,
    user_id: &'a str,
}

impl RestTaskStore {
    pub fn new(base_url: &str, api_key: &str, table: &str) -> Self {
        RestTaskStore {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            table: table.to_string(),
            api_key: api_key.to_string(),
            bearer: api_key.to_string(),
        }
    }

    /// Sends `token` instead of the api key as the bearer credential.
    pub fn with_bearer(mut self, token: &str) -> Self {
        self.bearer = token.to_string();
        self
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn request(&self, method: Method) -> RequestBuilder {
        self.client
            .request(method, self.table_url())
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.bearer))
    }

    fn owned_row(&self, method: Method, owner: &Identity, id: Uuid) -> RequestBuilder {
        self.request(method)
            .query(&[
                ("id", format!("eq.{}", id)),
                ("user_id", format!("eq.{}", owner.user_id)),
            ])
            .header("Prefer", "return=representation")
    }

    pub(crate) fn list_request(&self, owner: &Identity) -> RequestBuilder {
        self.request(Method::GET).query(&[
            ("select", "*".to_string()),
            ("user_id", format!("eq.{}", owner.user_id)),
            ("order", "created_at.desc".to_string()),
        ])
    }

    pub(crate) fn create_request(&self, draft: &NewTask, owner: &Identity) -> RequestBuilder {
        let row = InsertRow {
            title: &draft.title,
            description: &draft.description,
            status: draft.status,
            extras: &draft.extras,
            user_id: &owner.user_id,
        };
        self.request(Method::POST)
            .header("Prefer", "return=representation")
            .json(&[row])
    }

    /// `updated_at` is left to the database trigger in `sql/tasks.sql`, so it is
    /// stamped by the same clock as `created_at`.
    pub(crate) fn update_request(&self, owner: &Identity, id: Uuid, patch: &TaskPatch) -> RequestBuilder {
        self.owned_row(Method::PATCH, owner, id).json(patch)
    }

    pub(crate) fn delete_request(&self, owner: &Identity, id: Uuid) -> RequestBuilder {
        self.owned_row(Method::DELETE, owner, id)
    }
}

#[async_trait]
impl TaskStore for RestTaskStore {
    async fn list_tasks(&self, owner: &Identity) -> Result<Vec<Task>> {
        let res = self.list_request(owner).send().await?;
        let tasks = check(res, "list tasks").await?.json::<Vec<Task>>().await?;
        debug!(count = tasks.len(), owner = %owner.user_id, "Fetched tasks");
        Ok(tasks)
    }

    async fn create_task(&self, draft: &NewTask, owner: &Identity) -> Result<Task> {
        draft.validate()?;
        let res = self.create_request(draft, owner).send().await?;
        let rows = check(res, "create task").await?.json::<Vec<Task>>().await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| Error::Upstream("insert returned no row".to_string()))
    }

    async fn update_task(&self, owner: &Identity, id: Uuid, patch: &TaskPatch) -> Result<Task> {
        patch.validate()?;
        let res = self.update_request(owner, id, patch).send().await?;
        let rows = check(res, "update task").await?.json::<Vec<Task>>().await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }

    async fn delete_task(&self, owner: &Identity, id: Uuid) -> Result<()> {
        let res = self.delete_request(owner, id).send().await?;
        let rows = check(res, "delete task").await?.json::<Vec<Task>>().await?;
        if rows.is_empty() {
            Err(Error::NotFound(id.to_string()))
        } else {
            Ok(())
        }
    }
}

// Token grant as returned by the identity provider
#[derive(Debug, Deserialize)]
struct TokenGrant {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    user: ProviderUser,
}

#[derive(Debug, Deserialize)]
struct ProviderUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

impl TokenGrant {
    fn into_session(self, now: DateTime<Utc>) -> AuthSession {
        AuthSession {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: self.expires_in.map(|secs| now + Duration::seconds(secs)),
            user_id: self.user.id,
            email: self.user.email,
        }
    }
}

/// Client for the identity provider's `/auth/v1` API.
#[derive(Clone)]
pub struct AuthClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl AuthClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        AuthClient {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    pub async fn get_user(&self, token: &str) -> Result<Identity> {
        let res = self
            .client
            .get(self.url("user"))
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await
            .map_err(|err| Error::Upstream(format!("identity provider unreachable: {}", err)))?;

        let status = res.status();
        if status == StatusCode::UNAUTHORIZED
            || status == StatusCode::FORBIDDEN
            || status == StatusCode::BAD_REQUEST
        {
            return Err(Error::Unauthorized(AuthFailure::InvalidToken));
        }
        let user = check(res, "verify token")
            .await?
            .json::<ProviderUser>()
            .await?;
        Ok(Identity {
            user_id: user.id,
            email: user.email,
        })
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession> {
        let res = self
            .client
            .post(self.url("token"))
            .query(&[("grant_type", "password")])
            .header("apikey", &self.api_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let grant = rejected_or_ok(res).await?.json::<TokenGrant>().await?;
        Ok(grant.into_session(Utc::now()))
    }

    /// Registers an account. `None` when the provider wants the email confirmed first.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Option<AuthSession>> {
        let res = self
            .client
            .post(self.url("signup"))
            .header("apikey", &self.api_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let body = rejected_or_ok(res).await?.json::<serde_json::Value>().await?;
        if body.get("access_token").is_none() {
            return Ok(None);
        }
        let grant: TokenGrant = serde_json::from_value(body)?;
        Ok(Some(grant.into_session(Utc::now())))
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthSession> {
        let res = self
            .client
            .post(self.url("token"))
            .query(&[("grant_type", "refresh_token")])
            .header("apikey", &self.api_key)
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await?;
        let grant = rejected_or_ok(res).await?.json::<TokenGrant>().await?;
        Ok(grant.into_session(Utc::now()))
    }
}

/// Client for the `/task-insights` endpoint served by `taskdeck serve`.
#[derive(Clone)]
pub struct InsightsClient {
    client: Client,
    url: String,
}

impl InsightsClient {
    pub fn new(url: &str) -> Self {
        InsightsClient {
            client: Client::new(),
            url: url.to_string(),
        }
    }

    pub async fn fetch(&self, token: &str) -> Result<TaskInsight> {
        let res = self
            .client
            .get(&self.url)
            .header("Authorization", format!("Bearer {}", token))
            .header("Content-Type", "application/json")
            .send()
            .await?;

        let status = res.status();
        if status.is_success() {
            return Ok(res.json::<TaskInsight>().await?);
        }
        let message = error_message(&res.text().await.unwrap_or_default())
            .unwrap_or_else(|| "Failed to fetch insights".to_string());
        if status == StatusCode::UNAUTHORIZED {
            Err(Error::Unauthorized(AuthFailure::Rejected(message)))
        } else {
            Err(Error::Upstream(message))
        }
    }
}

async fn check(res: Response, context: &str) -> Result<Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    error!(%status, context, "Store request failed");
    Err(status_error(status, context, &body))
}

async fn rejected_or_ok(res: Response) -> Result<Response> {
    let status = res.status();
    if status.is_client_error() {
        let body = res.text().await.unwrap_or_default();
        let message = error_message(&body).unwrap_or_else(|| status.to_string());
        return Err(Error::Unauthorized(AuthFailure::Rejected(message)));
    }
    check(res, "authenticate").await
}

pub(crate) fn status_error(status: StatusCode, context: &str, body: &str) -> Error {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Error::Unauthorized(AuthFailure::InvalidToken)
        }
        StatusCode::NOT_FOUND => Error::NotFound(context.to_string()),
        _ => {
            let detail = error_message(body).unwrap_or_else(|| body.trim().to_string());
            Error::Upstream(format!("{}: {} {}", context, status, detail))
        }
    }
}

/// Picks the human message out of the error bodies the store and provider send.
fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["error_description", "msg", "message", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(|v| v.as_str()))
        .map(str::to_string)
}
