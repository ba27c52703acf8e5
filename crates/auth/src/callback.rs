// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local redirect receiver for the authorization-code flow.
//!
//! `GET /authorize` sends the browser to the consent page and remembers the
//! issued `state`; `GET /callback` checks and consumes that `state`, then
//! exchanges the code.

use std::collections::VecDeque;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::{AuthError, ErrorBody, ErrorKind, ErrorResponse};
use crate::provider::AccessTokenProvider;

/// Outstanding `state` values kept at once; the oldest is dropped beyond this.
pub const MAX_PENDING_STATES: usize = 16;

/// Shared state for the callback routes.
pub struct CallbackState {
    provider: AccessTokenProvider,
    enable_tenant_selection: bool,
    pending: Mutex<VecDeque<String>>,
}

impl CallbackState {
    pub fn new(provider: AccessTokenProvider, enable_tenant_selection: bool) -> Self {
        Self { provider, enable_tenant_selection, pending: Mutex::new(VecDeque::new()) }
    }

    fn remember(&self, state: String) {
        let mut pending = self.pending.lock();
        if pending.len() >= MAX_PENDING_STATES {
            pending.pop_front();
        }
        pending.push_back(state);
    }

    /// Remove `state` if it was issued here. Each value is accepted once.
    fn consume(&self, state: &str) -> bool {
        let mut pending = self.pending.lock();
        match pending.iter().position(|s| s == state) {
            Some(idx) => {
                pending.remove(idx);
                true
            }
            None => false,
        }
    }
}

/// Query parameters for `GET /authorize`.
#[derive(Debug, Default, Deserialize)]
pub struct AuthorizeQuery {
    #[serde(default)]
    pub select_tenant: Option<bool>,
}

/// Query parameters the provider appends to the redirect URI.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Response for a completed `GET /callback`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackResponse {
    pub authenticated: bool,
    pub expires_in: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

/// Build the callback router.
pub fn build_router(state: Arc<CallbackState>) -> Router {
    Router::new()
        .route("/authorize", get(authorize))
        .route("/callback", get(callback))
        .route("/status", get(status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn authorize(
    State(s): State<Arc<CallbackState>>,
    Query(query): Query<AuthorizeQuery>,
) -> Response {
    let select_tenant = query.select_tenant.unwrap_or(s.enable_tenant_selection);
    let request = s.provider.authorization_url(None, select_tenant);
    s.remember(request.state);
    (StatusCode::FOUND, [(header::LOCATION, request.url)]).into_response()
}

async fn callback(
    State(s): State<Arc<CallbackState>>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    if let Some(error) = query.error {
        let message = match query.error_description {
            Some(desc) => format!("{error}: {desc}"),
            None => error,
        };
        warn!(error = %message, "provider returned an authorization error");
        return bad_request("AUTHORIZATION_DENIED", message);
    }

    let (Some(code), Some(state)) = (query.code, query.state) else {
        return bad_request("BAD_REQUEST", "missing code or state".to_owned());
    };
    if !s.consume(&state) {
        warn!("callback with unknown state");
        return bad_request("INVALID_STATE", "unknown or already used state".to_owned());
    }

    match s.provider.exchange_code(&code).await {
        Ok(tokens) => {
            info!(tenant_id = tokens.tenant_id.as_deref(), "authorization completed");
            Json(CallbackResponse {
                authenticated: true,
                expires_in: tokens.expires_in,
                tenant_id: tokens.tenant_id,
            })
            .into_response()
        }
        Err(err) => error_response(&err),
    }
}

async fn status(State(s): State<Arc<CallbackState>>) -> Response {
    Json(s.provider.status()).into_response()
}

/// Status a failed exchange is reported with.
fn error_status(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Unauthenticated | ErrorKind::InvalidGrant => StatusCode::UNAUTHORIZED,
        ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::ServerError => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::TransportError | ErrorKind::UnknownApiError => StatusCode::BAD_GATEWAY,
    }
}

fn error_response(err: &AuthError) -> Response {
    let body = ErrorResponse { error: err.to_error_body() };
    (error_status(err.kind), Json(body)).into_response()
}

fn bad_request(code: &str, message: String) -> Response {
    let body = ErrorResponse {
        error: ErrorBody { code: code.to_owned(), message, correlation_id: None },
    };
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

#[cfg(test)]
#[path = "callback_tests.rs"]
mod tests;
