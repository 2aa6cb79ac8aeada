use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use surveydesk_core::{FixedWindow, RateLimitPolicy};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::api::ApiError;

/// Newtype wrapping a request ID string, stored as a request extension.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// The authenticated caller, stored as a request extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub actor_id: String,
    pub org_id: String,
}

#[derive(Clone)]
struct ApiKey {
    digest: [u8; 32],
    actor: Actor,
}

/// API key auth settings used by middleware.
///
/// Keys are held only as salted SHA-256 digests.
#[derive(Clone)]
pub struct AuthState {
    keys: Arc<Vec<ApiKey>>,
    salt: Arc<str>,
    pub enabled: bool,
}

impl AuthState {
    /// Builds auth config from `SURVEYDESK_API_KEYS`.
    ///
    /// # Errors
    ///
    /// See [`AuthState::from_entries`].
    pub fn from_env(salt: &str, is_development: bool) -> anyhow::Result<Self> {
        let raw = std::env::var("SURVEYDESK_API_KEYS").unwrap_or_default();
        Self::from_entries(&raw, salt, is_development)
    }

    /// Parses comma-separated `token:actor_id:org_id` entries.
    ///
    /// In development, no entries disables bearer auth and the caller is taken
    /// from the `x-actor-id` / `x-org-id` headers instead. Outside development,
    /// no entries fails startup.
    ///
    /// # Errors
    ///
    /// Returns an error for a malformed entry, or for an empty key list
    /// outside development.
    pub fn from_entries(raw: &str, salt: &str, is_development: bool) -> anyhow::Result<Self> {
        let mut keys = Vec::new();
        for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let mut parts = entry.splitn(3, ':').map(str::trim);
            let (Some(token), Some(actor_id), Some(org_id)) =
                (parts.next(), parts.next(), parts.next())
            else {
                anyhow::bail!("SURVEYDESK_API_KEYS entries must look like token:actor_id:org_id");
            };
            if token.is_empty() || actor_id.is_empty() || org_id.is_empty() {
                anyhow::bail!("SURVEYDESK_API_KEYS entry has an empty field");
            }
            keys.push(ApiKey {
                digest: hash_token(salt, token),
                actor: Actor {
                    actor_id: actor_id.to_owned(),
                    org_id: org_id.to_owned(),
                },
            });
        }

        if keys.is_empty() {
            if is_development {
                tracing::warn!(
                    "SURVEYDESK_API_KEYS not set; trusting x-actor-id/x-org-id headers in development"
                );
                return Ok(Self {
                    keys: Arc::new(Vec::new()),
                    salt: Arc::from(salt),
                    enabled: false,
                });
            }

            anyhow::bail!(
                "SURVEYDESK_API_KEYS is required outside development; provide token:actor_id:org_id entries"
            );
        }

        Ok(Self {
            keys: Arc::new(keys),
            salt: Arc::from(salt),
            enabled: true,
        })
    }

    /// Every key is compared so timing does not reveal which one matched.
    fn authenticate(&self, token: &str) -> Option<&Actor> {
        let digest = hash_token(&self.salt, token);
        let mut found = None;
        for key in self.keys.iter() {
            if bool::from(key.digest[..].ct_eq(&digest[..])) {
                found = Some(&key.actor);
            }
        }
        found
    }
}

fn hash_token(salt: &str, token: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(token.as_bytes());
    hasher.finalize().into()
}

/// Per-actor fixed-window limiter protecting the API as a whole.
///
/// Provider quotas are separate and persisted; this one is in memory.
#[derive(Debug, Clone)]
pub struct RateLimitState {
    policy: RateLimitPolicy,
    windows: Arc<Mutex<HashMap<String, FixedWindow>>>,
}

impl RateLimitState {
    #[must_use]
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn admit(&self, key: &str) -> bool {
        self.admit_at(key, Utc::now()).await
    }

    /// Windows that have run out are dropped whenever a new key arrives, so
    /// the map holds only actors seen within the last window.
    async fn admit_at(&self, key: &str, now: DateTime<Utc>) -> bool {
        let mut windows = self.windows.lock().await;
        if let Some(window) = windows.get_mut(key) {
            return window.admit(&self.policy, now);
        }
        windows.retain(|_, window| !window.has_elapsed(&self.policy, now));
        windows.insert(key.to_owned(), FixedWindow::opened_at(now));
        true
    }
}

fn request_id_of(req: &Request) -> String {
    req.extensions()
        .get::<RequestId>()
        .map_or_else(String::new, |id| id.0.clone())
}

/// Axum middleware that extracts or generates a request ID.
///
/// If the incoming request has an `x-request-id` header, that value is used.
/// Otherwise a new `UUIDv4` is generated. The ID is:
/// - Inserted into request extensions as [`RequestId`]
/// - Set on the response as the `x-request-id` header
pub async fn request_id(mut req: Request, next: Next) -> Response {
    let id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map_or_else(|| Uuid::new_v4().to_string(), String::from);

    req.extensions_mut().insert(RequestId(id.clone()));

    let mut res = next.run(req).await;

    if let Ok(val) = HeaderValue::from_str(&id) {
        res.headers_mut().insert("x-request-id", val);
    }

    res
}

/// Middleware resolving the caller to an [`Actor`].
pub async fn require_actor(State(auth): State<AuthState>, mut req: Request, next: Next) -> Response {
    let actor = if auth.enabled {
        extract_bearer_token(req.headers().get(AUTHORIZATION))
            .and_then(|token| auth.authenticate(token))
            .cloned()
    } else {
        actor_from_headers(req.headers())
    };

    match actor {
        Some(actor) => {
            req.extensions_mut().insert(actor);
            next.run(req).await
        }
        None => ApiError::new(
            request_id_of(&req),
            "unauthorized",
            "missing or invalid credentials",
        )
        .into_response(),
    }
}

/// Middleware enforcing a per-actor request-per-window limit.
pub async fn enforce_rate_limit(
    State(rate_limit): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Response {
    let key = req
        .extensions()
        .get::<Actor>()
        .map_or_else(String::new, |a| a.actor_id.clone());

    if !rate_limit.admit(&key).await {
        tracing::warn!(actor_id = %key, "API rate limit exceeded");
        return ApiError::new(request_id_of(&req), "rate_limited", "rate limit exceeded")
            .into_response();
    }

    next.run(req).await
}

fn extract_bearer_token(value: Option<&HeaderValue>) -> Option<&str> {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|s| !s.trim().is_empty())
}

fn actor_from_headers(headers: &HeaderMap) -> Option<Actor> {
    let read = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToOwned::to_owned)
    };
    Some(Actor {
        actor_id: read("x-actor-id")?,
        org_id: read("x-org-id")?,
    })
}
