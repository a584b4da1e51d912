// SPDX-License-Identifier: MIT OR Apache-2.0
//! Middleware stack for the service HTTP API.

use axum::{
    extract::Request,
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RequestId middleware
// ---------------------------------------------------------------------------

/// A unique request identifier, available as an Axum extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(pub Uuid);

/// Axum middleware that generates a [`RequestId`] for each request and sets
/// the `X-Request-Id` response header.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let id = RequestId(Uuid::new_v4());
    req.extensions_mut().insert(id);
    let mut resp = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&id.0.to_string()) {
        resp.headers_mut().insert("x-request-id", value);
    }
    resp
}

// ---------------------------------------------------------------------------
// RequestLogger
// ---------------------------------------------------------------------------

/// Axum middleware that logs method, path, status code, and duration for each
/// request using [`tracing`] structured fields.
pub struct RequestLogger;

impl RequestLogger {
    /// Axum-compatible handler function.
    pub async fn layer(req: Request, next: Next) -> Response {
        let method = req.method().clone();
        let path = req.uri().path().to_owned();
        let start = Instant::now();

        let resp = next.run(req).await;

        let duration = start.elapsed();
        let status = resp.status().as_u16();

        info!(
            http.method = %method,
            http.path = %path,
            http.status = status,
            http.duration_ms = duration.as_millis() as u64,
            "request completed"
        );

        resp
    }
}

// ---------------------------------------------------------------------------
// KeyedRateLimiter
// ---------------------------------------------------------------------------

/// In-memory sliding-window rate limiter keyed by an arbitrary string.
///
/// Used for login throttling: the key is the *submitted* username, so an
/// attacker hammering one account is cut off without affecting others.
#[derive(Clone)]
pub struct KeyedRateLimiter {
    inner: Arc<Mutex<HashMap<String, VecDeque<Instant>>>>,
    max_requests: u32,
    window: Duration,
}

impl KeyedRateLimiter {
    /// Create a limiter that allows `max_requests` per `window` per key.
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            max_requests,
            window,
        }
    }

    /// Record an attempt for `key`.  Returns `Err(())` when the key has
    /// exhausted its window.
    pub async fn check(&self, key: &str) -> Result<(), ()> {
        let now = Instant::now();
        let mut guard = self.inner.lock().await;
        let timestamps = guard.entry(key.to_owned()).or_default();

        // Expire timestamps outside the window.
        while let Some(&front) = timestamps.front() {
            if now.duration_since(front) > self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        if timestamps.len() as u32 >= self.max_requests {
            return Err(());
        }

        timestamps.push_back(now);
        Ok(())
    }
}
