// SPDX-License-Identifier: MIT OR Apache-2.0
//! HTTP service for the test-case management application.
//!
//! The router exposes the REST resources under `/api/v1` (runs, the
//! run/caseversion join, and create-only results), the account/session
//! routes, and `/health`.  All state lives in [`AppState`]; there are no
//! ambient globals.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Account and session routes.
pub mod accounts;
/// REST resources under `/api/v1`.
pub mod api;
/// Middleware stack (request ids, request logging, login throttling).
pub mod middleware;

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use mt_config::ServerConfig;
use mt_error::{ErrorCode, MtError};
use mt_store::{Store, StoreError};
use serde_json::json;
use std::sync::Arc;

pub use accounts::SessionMap;
pub use middleware::KeyedRateLimiter;

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Shared application state for the HTTP server.
#[derive(Clone)]
pub struct AppState {
    /// Runtime configuration, loaded once at startup.
    pub config: ServerConfig,
    /// The shared entity store.
    pub store: Arc<Store>,
    /// Active sessions.
    pub sessions: SessionMap,
    /// Pending password-reset tokens.
    pub reset_tokens: accounts::ResetTokens,
    /// Per-username login throttle.
    pub login_limiter: KeyedRateLimiter,
}

impl AppState {
    /// Assemble state from a config and a store.
    pub fn new(config: ServerConfig, store: Arc<Store>) -> Self {
        let login_limiter = KeyedRateLimiter::new(
            config.login_limit.max_attempts,
            std::time::Duration::from_secs(config.login_limit.window_secs),
        );
        Self {
            config,
            store,
            sessions: SessionMap::default(),
            reset_tokens: accounts::ResetTokens::default(),
            login_limiter,
        }
    }
}

// ---------------------------------------------------------------------------
// ApiError
// ---------------------------------------------------------------------------

/// An API error with HTTP status code, optional stable code, and message.
#[derive(Debug)]
pub struct ApiError {
    /// HTTP status code.
    pub status: StatusCode,
    /// Stable machine-readable code, when the failure has one.
    pub code: Option<ErrorCode>,
    /// Human-readable error message.
    pub message: String,
}

impl ApiError {
    /// Create a new `ApiError` with the given status and message.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            code: None,
            message: message.into(),
        }
    }

    /// Create an `ApiError` carrying a stable [`ErrorCode`].
    pub fn coded(status: StatusCode, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status,
            code: Some(code),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status.as_u16(), self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({ "error": self.message });
        if let Some(code) = self.code {
            body["code"] = json!(code.as_str());
        }
        (self.status, Json(body)).into_response()
    }
}

/// Stable code for a missing store entity, for the entities the HTTP
/// surface exposes.
fn missing_entity_code(entity: &str) -> Option<ErrorCode> {
    match entity {
        "run" => Some(ErrorCode::RunNotFound),
        "runcaseversion" => Some(ErrorCode::RunCaseVersionNotFound),
        "environment" => Some(ErrorCode::EnvironmentNotFound),
        "user" | "tester" => Some(ErrorCode::UserNotFound),
        _ => None,
    }
}

impl From<MtError> for ApiError {
    fn from(err: MtError) -> Self {
        let status = match err.code {
            ErrorCode::ResultStatusUnknown
            | ErrorCode::UsernameTaken
            | ErrorCode::ResetTokenInvalid
            | ErrorCode::ConfigInvalid => StatusCode::BAD_REQUEST,
            ErrorCode::ResultAlreadyFinished => StatusCode::CONFLICT,
            ErrorCode::AuthBadCredentials
            | ErrorCode::AuthApiKeyInvalid
            | ErrorCode::AuthSessionRequired => StatusCode::UNAUTHORIZED,
            ErrorCode::AuthRateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::RunNotFound
            | ErrorCode::RunCaseVersionNotFound
            | ErrorCode::EnvironmentNotFound
            | ErrorCode::UserNotFound
            | ErrorCode::ActivationKeyInvalid => StatusCode::NOT_FOUND,
            ErrorCode::StoreIoFailed | ErrorCode::StoreDecodeFailed | ErrorCode::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            code: Some(err.code),
            message: err.to_string(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let message = err.to_string();
        match err {
            StoreError::NotFound { entity, .. } => Self {
                status: StatusCode::NOT_FOUND,
                code: missing_entity_code(entity),
                message,
            },
            StoreError::UsernameTaken { .. } => {
                Self::coded(StatusCode::BAD_REQUEST, ErrorCode::UsernameTaken, message)
            }
            StoreError::Domain(domain) => domain.into(),
            StoreError::Io(_) => Self::coded(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::StoreIoFailed,
                message,
            ),
            StoreError::Decode(_) => Self::coded(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::StoreDecodeFailed,
                message,
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the Axum router with all service routes.
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(cmd_health))
        // REST resources.
        .route("/api/v1/runs", get(api::cmd_list_runs))
        .route("/api/v1/runs/{run_id}", get(api::cmd_get_run))
        .route(
            "/api/v1/runcaseversions",
            get(api::cmd_list_run_case_versions),
        )
        .route(
            "/api/v1/runcaseversions/{rcv_id}",
            get(api::cmd_get_run_case_version),
        )
        .route("/api/v1/results", post(api::cmd_create_result))
        // Accounts.
        .route("/login", post(accounts::cmd_login))
        .route("/logout", post(accounts::cmd_logout))
        .route("/password/change", post(accounts::cmd_password_change))
        .route("/password/reset", post(accounts::cmd_password_reset))
        .route(
            "/password/reset/confirm/{user_id}/{token}",
            post(accounts::cmd_password_reset_confirm),
        )
        .route("/register", post(accounts::cmd_register))
        .route("/activate/{key}", get(accounts::cmd_activate))
        .route("/set-username", post(accounts::cmd_set_username))
        .route("/users/{user_id}/apikey", post(accounts::cmd_create_apikey))
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(axum::middleware::from_fn(middleware::RequestLogger::layer))
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state)
}

async fn cmd_health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "time": Utc::now().to_rfc3339(),
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_entities_map_to_their_codes() {
        for (entity, code) in [
            ("run", ErrorCode::RunNotFound),
            ("runcaseversion", ErrorCode::RunCaseVersionNotFound),
            ("environment", ErrorCode::EnvironmentNotFound),
            ("user", ErrorCode::UserNotFound),
            ("tester", ErrorCode::UserNotFound),
        ] {
            let api: ApiError = StoreError::NotFound { entity, id: 7 }.into();
            assert_eq!(api.status, StatusCode::NOT_FOUND);
            assert_eq!(api.code, Some(code), "entity {entity}");
        }
    }

    #[test]
    fn internal_only_entities_carry_no_code() {
        let api: ApiError = StoreError::NotFound {
            entity: "product",
            id: 7,
        }
        .into();
        assert_eq!(api.status, StatusCode::NOT_FOUND);
        assert_eq!(api.code, None);
    }

    #[test]
    fn username_taken_maps_to_bad_request() {
        let api: ApiError = StoreError::UsernameTaken {
            username: "tester".into(),
        }
        .into();
        assert_eq!(api.status, StatusCode::BAD_REQUEST);
        assert_eq!(api.code, Some(ErrorCode::UsernameTaken));
    }

    #[test]
    fn snapshot_failures_map_to_store_codes() {
        let api: ApiError = StoreError::Io(std::io::Error::other("disk gone")).into();
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api.code, Some(ErrorCode::StoreIoFailed));

        let bad_json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let api: ApiError = StoreError::Decode(bad_json).into();
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api.code, Some(ErrorCode::StoreDecodeFailed));
    }

    #[test]
    fn domain_errors_keep_their_code_and_status() {
        let api: ApiError =
            StoreError::Domain(MtError::new(ErrorCode::ResultAlreadyFinished, "done")).into();
        assert_eq!(api.status, StatusCode::CONFLICT);
        assert_eq!(api.code, Some(ErrorCode::ResultAlreadyFinished));

        let api: ApiError = MtError::new(ErrorCode::ResultStatusUnknown, "bogus").into();
        assert_eq!(api.status, StatusCode::BAD_REQUEST);
        assert_eq!(api.code, Some(ErrorCode::ResultStatusUnknown));
    }

    #[test]
    fn auth_codes_map_to_their_statuses() {
        for (code, status) in [
            (ErrorCode::AuthBadCredentials, StatusCode::UNAUTHORIZED),
            (ErrorCode::AuthApiKeyInvalid, StatusCode::UNAUTHORIZED),
            (ErrorCode::AuthSessionRequired, StatusCode::UNAUTHORIZED),
            (ErrorCode::AuthRateLimited, StatusCode::TOO_MANY_REQUESTS),
        ] {
            let api: ApiError = MtError::new(code, "denied").into();
            assert_eq!(api.status, status, "code {code}");
            assert_eq!(api.code, Some(code));
        }
    }
}
