// SPDX-License-Identifier: MIT OR Apache-2.0
//! Account and session routes.
//!
//! Each route is a thin JSON rendition of the classic auth flows: login
//! (throttled per submitted username, with open-redirect protection on the
//! `next` parameter), logout, password change/reset/reset-confirm,
//! registration and activation, username change, and API-key provisioning.
//! Success messages and redirect targets travel in the response body.
//!
//! Activation and password-reset "emails" are structured log lines carrying
//! the token; there is no real mail transport.

use crate::{ApiError, AppState};
use axum::{
    Json,
    extract::{Path as AxPath, Query, State},
    http::{HeaderMap, StatusCode},
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use mt_error::ErrorCode;
use mt_model::{Id, User};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Session {
    user: Id,
    expires_at: DateTime<Utc>,
}

/// Active sessions, keyed by bearer token.
#[derive(Clone, Default)]
pub struct SessionMap {
    inner: Arc<RwLock<HashMap<String, Session>>>,
}

impl SessionMap {
    /// Open a session for `user` lasting `ttl_secs`; returns the token.
    ///
    /// TTLs beyond the representable range saturate to the far future
    /// rather than wrapping into the past.
    pub async fn create(&self, user: Id, ttl_secs: u64) -> String {
        let token = Uuid::new_v4().simple().to_string();
        let expires_at = i64::try_from(ttl_secs)
            .ok()
            .and_then(ChronoDuration::try_seconds)
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let session = Session { user, expires_at };
        self.inner.write().await.insert(token.clone(), session);
        token
    }

    /// Resolve a token to its user id, evicting it when expired.
    pub async fn resolve(&self, token: &str) -> Option<Id> {
        let mut guard = self.inner.write().await;
        match guard.get(token) {
            Some(s) if s.expires_at > Utc::now() => Some(s.user),
            Some(_) => {
                guard.remove(token);
                None
            }
            None => None,
        }
    }

    /// Drop a session.  Returns `true` if it existed.
    pub async fn remove(&self, token: &str) -> bool {
        self.inner.write().await.remove(token).is_some()
    }
}

/// Pending password-reset tokens, keyed by token.
#[derive(Clone, Default)]
pub struct ResetTokens {
    inner: Arc<RwLock<HashMap<String, Id>>>,
}

impl ResetTokens {
    /// Issue a token for `user`.
    pub async fn issue(&self, user: Id) -> String {
        let token = Uuid::new_v4().simple().to_string();
        self.inner.write().await.insert(token.clone(), user);
        token
    }

    /// Consume a token, returning its user id.  Single use.
    pub async fn take(&self, token: &str) -> Option<Id> {
        self.inner.write().await.remove(token)
    }
}

// ---------------------------------------------------------------------------
// Redirect safety
// ---------------------------------------------------------------------------

/// Routes accepted verbatim as redirect targets.
const INTERNAL_ROUTES: &[&str] = &[
    "/",
    "/login",
    "/logout",
    "/register",
    "/password/change",
    "/password/reset",
    "/set-username",
    "/health",
];

/// Route prefixes accepted as redirect targets.
const INTERNAL_PREFIXES: &[&str] = &[
    "/activate/",
    "/users/",
    "/password/reset/confirm/",
    "/api/v1/",
];

/// Whether `path` resolves to a known internal route.
fn resolves_internally(path: &str) -> bool {
    // Reject absolute and protocol-relative URLs outright.
    if !path.starts_with('/') || path.starts_with("//") {
        return false;
    }
    let bare = path.split('?').next().unwrap_or(path);
    INTERNAL_ROUTES.contains(&bare) || INTERNAL_PREFIXES.iter().any(|p| bare.starts_with(p))
}

/// Only allow `next` redirects to locations within the service; anything
/// else silently becomes `/`.
pub fn safe_next(next: Option<&str>) -> String {
    match next {
        Some(n) if resolves_internally(n) => n.to_owned(),
        _ => "/".to_owned(),
    }
}

// ---------------------------------------------------------------------------
// Session extraction
// ---------------------------------------------------------------------------

/// Resolve the `Authorization: Bearer <token>` header to a user.
pub async fn require_session(state: &AppState, headers: &HeaderMap) -> Result<User, ApiError> {
    let unauthorized = || {
        ApiError::coded(
            StatusCode::UNAUTHORIZED,
            ErrorCode::AuthSessionRequired,
            "authentication required",
        )
    };

    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(unauthorized)?;

    let user_id = state
        .sessions
        .resolve(token)
        .await
        .ok_or_else(unauthorized)?;

    state.store.user(user_id).await.ok_or_else(unauthorized)
}

// ---------------------------------------------------------------------------
// Login / logout
// ---------------------------------------------------------------------------

/// Query parameters shared by the redirect-honoring routes.
#[derive(Debug, Deserialize)]
pub struct NextQuery {
    /// Post-action redirect target; must resolve internally.
    pub next: Option<String>,
}

/// Login request body.
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    /// Login name.
    pub username: String,
    /// Cleartext password.
    pub password: String,
}

/// `POST /login`
pub async fn cmd_login(
    Query(q): Query<NextQuery>,
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let redirect = safe_next(q.next.as_deref());

    // Throttle by the *submitted* username before touching the store.
    if state.login_limiter.check(&req.username).await.is_err() {
        warn!(username = %req.username, "login throttled");
        return Err(ApiError::coded(
            StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::AuthRateLimited,
            "too many login attempts; try again shortly",
        ));
    }

    let failed = || {
        ApiError::coded(
            StatusCode::UNAUTHORIZED,
            ErrorCode::AuthBadCredentials,
            "Unable to sign in with that username and password; \
             have you registered an account?",
        )
    };

    let user = state
        .store
        .user_by_username(&req.username)
        .await
        .ok_or_else(failed)?;
    if !user.is_active || !user.check_password(&req.password) {
        return Err(failed());
    }

    let token = state
        .sessions
        .create(user.id, state.config.session_ttl_secs)
        .await;
    info!(username = %user.username, "signed in");

    Ok(Json(json!({
        "message": "Signed in.",
        "token": token,
        "user_id": user.id,
        "redirect": redirect,
    })))
}

/// `POST /logout`
pub async fn cmd_logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Json<serde_json::Value> {
    if let Some(token) = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        state.sessions.remove(token).await;
    }
    Json(json!({ "redirect": "/login" }))
}

// ---------------------------------------------------------------------------
// Password flows
// ---------------------------------------------------------------------------

/// Password change request body.
#[derive(Debug, Serialize, Deserialize)]
pub struct PasswordChangeRequest {
    /// Current password, re-verified.
    pub old_password: String,
    /// Replacement password.
    pub new_password: String,
}

/// `POST /password/change`
pub async fn cmd_password_change(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<PasswordChangeRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = require_session(&state, &headers).await?;
    if !user.check_password(&req.old_password) {
        return Err(ApiError::coded(
            StatusCode::BAD_REQUEST,
            ErrorCode::AuthBadCredentials,
            "current password is incorrect",
        ));
    }
    state
        .store
        .set_user_password(user.id, &req.new_password)
        .await?;
    Ok(Json(json!({
        "message": "Password changed.",
        "redirect": "/",
    })))
}

/// Password reset request body.
#[derive(Debug, Serialize, Deserialize)]
pub struct PasswordResetRequest {
    /// Address the reset token is "sent" to.
    pub email: String,
}

/// `POST /password/reset`
///
/// Always answers with the same message, whether or not the address is
/// known, so the endpoint does not reveal which accounts exist.
pub async fn cmd_password_reset(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PasswordResetRequest>,
) -> Json<serde_json::Value> {
    if let Some(user) = state.store.user_by_email(&req.email).await {
        let token = state.reset_tokens.issue(user.id).await;
        // Stand-in for the reset email.
        info!(
            user_id = user.id,
            email = %user.email,
            reset_token = %token,
            "password reset token issued"
        );
    }
    Json(json!({
        "message": "Password reset email sent; check your email. \
                    If you don't receive an email, verify that you are \
                    entering the email address you signed up with, and \
                    try again.",
        "redirect": "/",
    }))
}

/// Reset confirmation request body.
#[derive(Debug, Serialize, Deserialize)]
pub struct PasswordResetConfirmRequest {
    /// Replacement password.
    pub new_password: String,
}

/// `POST /password/reset/confirm/{user_id}/{token}`
pub async fn cmd_password_reset_confirm(
    AxPath((user_id, token)): AxPath<(Id, String)>,
    State(state): State<Arc<AppState>>,
    Json(req): Json<PasswordResetConfirmRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    match state.reset_tokens.take(&token).await {
        Some(owner) if owner == user_id => {}
        _ => {
            return Err(ApiError::coded(
                StatusCode::BAD_REQUEST,
                ErrorCode::ResetTokenInvalid,
                "invalid or expired reset token",
            ));
        }
    }
    state
        .store
        .set_user_password(user_id, &req.new_password)
        .await?;
    Ok(Json(json!({
        "message": "Password changed.",
        "redirect": "/",
    })))
}

// ---------------------------------------------------------------------------
// Registration / activation
// ---------------------------------------------------------------------------

/// Registration request body.
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// Desired login name.
    pub username: String,
    /// Contact address for the activation "email".
    pub email: String,
    /// Initial password.
    pub password: String,
}

/// `POST /register`
pub async fn cmd_register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let user = state
        .store
        .register_user(&req.username, &req.email, &req.password)
        .await?;

    // Stand-in for the activation email.
    info!(
        user_id = user.id,
        email = %user.email,
        activation_key = %user.activation_key.as_deref().unwrap_or_default(),
        "activation key issued"
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Check your email for an account activation link.",
            "user_id": user.id,
            "redirect": "/",
        })),
    ))
}

/// `GET /activate/{key}`
pub async fn cmd_activate(
    AxPath(key): AxPath<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = state
        .store
        .activate_user(&key)
        .await?
        .ok_or_else(|| {
            ApiError::coded(
                StatusCode::NOT_FOUND,
                ErrorCode::ActivationKeyInvalid,
                "invalid activation key",
            )
        })?;
    info!(username = %user.username, "account activated");
    Ok(Json(json!({
        "message": "Account activated; now you can login.",
        "redirect": "/",
    })))
}

// ---------------------------------------------------------------------------
// Username change
// ---------------------------------------------------------------------------

/// Username change request body.
#[derive(Debug, Serialize, Deserialize)]
pub struct SetUsernameRequest {
    /// Replacement login name.
    pub username: String,
}

/// `POST /set-username`
pub async fn cmd_set_username(
    Query(q): Query<NextQuery>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<SetUsernameRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let redirect = safe_next(q.next.as_deref());
    let user = require_session(&state, &headers).await?;
    let renamed = state.store.rename_user(user.id, &req.username).await?;
    Ok(Json(json!({
        "username": renamed.username,
        "redirect": redirect,
    })))
}

// ---------------------------------------------------------------------------
// API-key provisioning
// ---------------------------------------------------------------------------

/// `POST /users/{user_id}/apikey`
///
/// Generate an API key for the given user; the response points back at
/// their management page.
pub async fn cmd_create_apikey(
    AxPath(user_id): AxPath<Id>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let requester = require_session(&state, &headers).await?;
    let owner = state
        .store
        .user(user_id)
        .await
        .ok_or_else(|| {
            ApiError::coded(
                StatusCode::NOT_FOUND,
                ErrorCode::UserNotFound,
                "user not found",
            )
        })?;

    let key = state.store.create_api_key(owner.id, requester.id).await?;
    info!(
        owner = %owner.username,
        created_by = %requester.username,
        "api key generated"
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "api_key": key.key,
            "owner": owner.id,
            "redirect": format!("/users/{user_id}"),
        })),
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- safe_next --------------------------------------------------------

    #[test]
    fn safe_next_accepts_known_routes() {
        assert_eq!(safe_next(Some("/")), "/");
        assert_eq!(safe_next(Some("/password/change")), "/password/change");
        assert_eq!(safe_next(Some("/users/7")), "/users/7");
        assert_eq!(safe_next(Some("/api/v1/runs")), "/api/v1/runs");
        assert_eq!(safe_next(Some("/login?next=/")), "/login?next=/");
    }

    #[test]
    fn safe_next_replaces_unknown_paths() {
        assert_eq!(safe_next(Some("/etc/passwd")), "/");
        assert_eq!(safe_next(Some("/admin")), "/");
    }

    #[test]
    fn safe_next_replaces_external_urls() {
        assert_eq!(safe_next(Some("https://evil.example/")), "/");
        assert_eq!(safe_next(Some("//evil.example/")), "/");
        assert_eq!(safe_next(Some("javascript:alert(1)")), "/");
    }

    #[test]
    fn safe_next_defaults_to_root() {
        assert_eq!(safe_next(None), "/");
        assert_eq!(safe_next(Some("")), "/");
    }

    // -- SessionMap -------------------------------------------------------

    #[tokio::test]
    async fn session_create_resolve_remove() {
        let sessions = SessionMap::default();
        let token = sessions.create(7, 3600).await;
        assert_eq!(sessions.resolve(&token).await, Some(7));
        assert!(sessions.remove(&token).await);
        assert_eq!(sessions.resolve(&token).await, None);
    }

    #[tokio::test]
    async fn expired_session_is_evicted() {
        let sessions = SessionMap::default();
        let token = sessions.create(7, 0).await;
        // TTL of zero expires immediately.
        assert_eq!(sessions.resolve(&token).await, None);
    }

    #[tokio::test]
    async fn huge_ttl_session_saturates_instead_of_expiring() {
        let sessions = SessionMap::default();
        // A TTL past the signed range must not wrap into the past.
        let token = sessions.create(7, u64::MAX).await;
        assert_eq!(sessions.resolve(&token).await, Some(7));
        let token = sessions.create(8, i64::MAX as u64).await;
        assert_eq!(sessions.resolve(&token).await, Some(8));
    }

    #[tokio::test]
    async fn reset_tokens_are_single_use() {
        let tokens = ResetTokens::default();
        let t = tokens.issue(3).await;
        assert_eq!(tokens.take(&t).await, Some(3));
        assert_eq!(tokens.take(&t).await, None);
    }
}
