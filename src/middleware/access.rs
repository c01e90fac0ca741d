//! Access guard for the session WebSocket
//!
//! Browsers do not apply CORS to WebSocket upgrades, so any page the user
//! visits could reach a local gateway. Upgrades are accepted only from
//! allow-listed origins and, when configured, with the access token.

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::server::config::ServerConfig;

/// Who may open a session
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    allowed_origins: Vec<String>,
    access_token: Option<String>,
}

impl AccessPolicy {
    /// Build from server config.
    ///
    /// Without an explicit allow-list only the server's own origin is
    /// accepted, which is where the bundled UI is served from.
    pub fn from_config(server: &ServerConfig) -> Self {
        let allowed_origins = if server.allowed_origins.is_empty() {
            vec![
                format!("http://{}:{}", server.host, server.port),
                format!("http://localhost:{}", server.port),
                format!("http://127.0.0.1:{}", server.port),
            ]
        } else {
            server.allowed_origins.clone()
        };

        Self {
            allowed_origins: allowed_origins
                .iter()
                .map(|o| o.trim_end_matches('/').to_ascii_lowercase())
                .collect(),
            access_token: server.access_token.clone().filter(|t| !t.is_empty()),
        }
    }

    fn origin_allowed(&self, origin: &str) -> bool {
        let origin = origin.trim_end_matches('/').to_ascii_lowercase();
        self.allowed_origins.iter().any(|allowed| *allowed == origin)
    }

    fn check(&self, parts: &Parts) -> Result<(), AccessRejection> {
        // Clients without an Origin header are not browsers
        if let Some(origin) = parts.headers.get(header::ORIGIN) {
            let origin = origin.to_str().unwrap_or_default();
            if !self.origin_allowed(origin) {
                warn!(origin = %origin, "Rejected session from untrusted origin");
                return Err(AccessRejection::new(
                    StatusCode::FORBIDDEN,
                    "Origin is not allowed",
                    "ORIGIN_NOT_ALLOWED",
                ));
            }
        }

        if let Some(expected) = &self.access_token {
            match extract_token(parts) {
                Some(token) if token == *expected => {}
                Some(_) => {
                    return Err(AccessRejection::new(
                        StatusCode::UNAUTHORIZED,
                        "Invalid access token",
                        "INVALID_CREDENTIALS",
                    ))
                }
                None => {
                    return Err(AccessRejection::new(
                        StatusCode::UNAUTHORIZED,
                        "Access token required. Provide Authorization: Bearer <token> or ?token=<token>.",
                        "UNAUTHORIZED",
                    ))
                }
            }
        }

        Ok(())
    }
}

/// JSON error response for rejected upgrades
#[derive(Debug, Serialize)]
struct AccessErrorResponse {
    success: bool,
    error: String,
    code: &'static str,
}

/// Access rejection type
pub struct AccessRejection {
    status: StatusCode,
    body: AccessErrorResponse,
}

impl AccessRejection {
    fn new(status: StatusCode, error: impl Into<String>, code: &'static str) -> Self {
        Self {
            status,
            body: AccessErrorResponse {
                success: false,
                error: error.into(),
                code,
            },
        }
    }
}

impl IntoResponse for AccessRejection {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Axum extractor that admits only trusted session clients
pub struct RequireTrustedClient;

#[axum::async_trait]
impl<S> FromRequestParts<S> for RequireTrustedClient
where
    S: Send + Sync,
{
    type Rejection = AccessRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let policy = parts.extensions.get::<Arc<AccessPolicy>>().ok_or_else(|| {
            AccessRejection::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Access policy not configured",
                "INTERNAL_ERROR",
            )
        })?;

        policy.check(parts)?;
        Ok(RequireTrustedClient)
    }
}

/// Token from `Authorization: Bearer`, `X-API-Key` or `?token=`
fn extract_token(parts: &Parts) -> Option<String> {
    if let Some(value) = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        if let Some(token) = value.strip_prefix("Bearer ") {
            return Some(token.trim().to_string());
        }
    }

    if let Some(value) = parts.headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        return Some(value.trim().to_string());
    }

    // Browsers cannot set headers on WebSocket upgrades
    parts.uri.query().and_then(|query| {
        query
            .split('&')
            .find_map(|param| param.strip_prefix("token="))
            .map(str::to_string)
    })
}
