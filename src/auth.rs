//! Session gate: turns an `Authorization` header into a verified [`Identity`].

use crate::api::AuthClient;
use crate::error::{AuthFailure, Error, Result};
use crate::models::Identity;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, warn};

#[async_trait]
pub trait SessionGate: Send + Sync {
    /// Verifies a bearer token and yields the stable user id behind it.
    async fn verify(&self, token: &str) -> Result<Identity>;
}

/// Extracts the token from a `Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> Result<&str> {
    let header = header.ok_or(Error::Unauthorized(AuthFailure::MissingHeader))?;
    let token = header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
        .unwrap_or_default();
    if token.is_empty() || token.contains(char::is_whitespace) {
        return Err(Error::Unauthorized(AuthFailure::InvalidToken));
    }
    Ok(token)
}

/// Full gate check for a raw header value. Callers must stop on `Err`.
pub async fn authorize(gate: &dyn SessionGate, header: Option<&str>) -> Result<Identity> {
    let token = bearer_token(header)?;
    match gate.verify(token).await {
        Ok(identity) => {
            debug!(user_id = %identity.user_id, "Session verified");
            Ok(identity)
        }
        Err(err) => {
            warn!(error = %err, "Session rejected");
            Err(err)
        }
    }
}

/// Verifies tokens against the identity provider's `/auth/v1/user` endpoint.
pub struct ProviderGate {
    client: AuthClient,
}

impl ProviderGate {
    pub fn new(client: AuthClient) -> Self {
        ProviderGate { client }
    }
}

#[async_trait]
impl SessionGate for ProviderGate {
    async fn verify(&self, token: &str) -> Result<Identity> {
        self.client.get_user(token).await
    }
}

/// Fixed token table, for local runs and tests.
#[derive(Debug, Default, Clone)]
pub struct StaticGate {
    tokens: HashMap<String, Identity>,
}

impl StaticGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, identity: Identity) -> Self {
        self.tokens.insert(token.into(), identity);
        self
    }
}

#[async_trait]
impl SessionGate for StaticGate {
    async fn verify(&self, token: &str) -> Result<Identity> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or(Error::Unauthorized(AuthFailure::InvalidToken))
    }
}
