//! Auth boundary — verified owner identity, passed explicitly into the core.
//!
//! Token issuance lives outside this service. Every request carries a bearer
//! token from that single authority; [`TokenVerifier`] checks it and yields
//! an [`AuthenticatedUser`] that handlers pass down. The core never reads
//! ambient session state.

use std::collections::HashMap;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};

use crate::api::{ApiError, AppState};

/// A verified owner identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: String,
}

/// Contract of the identity authority as this service consumes it.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Resolve a bearer token to its owner, or `None` when unrecognized.
    async fn verify(&self, token: &str) -> Option<AuthenticatedUser>;
}

/// Static token table, configured from the environment.
///
/// Stands in for the external authority in deployments and tests; the rest
/// of the service only ever sees the trait.
pub struct StaticTokenVerifier {
    tokens: HashMap<String, String>,
}

impl StaticTokenVerifier {
    /// Parse a `token:user` comma-separated spec. Malformed entries are skipped.
    pub fn from_spec(spec: &str) -> Self {
        let tokens = spec
            .split(',')
            .filter_map(|entry| {
                let (token, user) = entry.trim().split_once(':')?;
                (!token.is_empty() && !user.is_empty())
                    .then(|| (token.to_string(), user.to_string()))
            })
            .collect();
        Self { tokens }
    }

    /// Single-token verifier, handy in tests.
    pub fn single(token: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            tokens: HashMap::from([(token.into(), user.into())]),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl TokenVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> Option<AuthenticatedUser> {
        self.tokens.get(token).map(|user_id| AuthenticatedUser {
            user_id: user_id.clone(),
        })
    }
}

impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| ApiError::unauthorized("missing bearer token"))?;

        state
            .verifier
            .verify(token)
            .await
            .ok_or_else(|| ApiError::unauthorized("invalid token"))
    }
}
