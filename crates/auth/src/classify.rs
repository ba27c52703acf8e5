// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Failure classification for token endpoint calls.
//!
//! Every retry and invalidation decision is made from the [`ErrorKind`]
//! assigned here.

use std::time::Duration;

use reqwest::header::HeaderMap;
use serde::Deserialize;

use crate::error::{AuthError, ErrorKind};

/// Response header carrying the provider's request correlation id.
pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Map an HTTP status from the token endpoint to an error kind.
pub fn classify_status(status: u16) -> ErrorKind {
    match status {
        429 => ErrorKind::RateLimited,
        500 | 502 | 503 | 504 => ErrorKind::ServerError,
        400 | 401 | 403 => ErrorKind::InvalidGrant,
        _ => ErrorKind::UnknownApiError,
    }
}

/// Classify a request that produced no HTTP response.
pub fn classify_transport(err: &reqwest::Error) -> AuthError {
    let message = if err.is_timeout() {
        format!("token endpoint timed out: {err}")
    } else {
        format!("token endpoint unreachable: {err}")
    };
    AuthError::new(ErrorKind::TransportError, message)
}

/// Classify a non-success HTTP response.
pub fn classify_response(status: u16, headers: &HeaderMap, body: &str) -> AuthError {
    let kind = classify_status(status);
    let message =
        provider_message(body).unwrap_or_else(|| format!("token endpoint returned HTTP {status}"));
    let retry_after = if kind == ErrorKind::RateLimited { retry_after(headers) } else { None };
    AuthError::new(kind, message)
        .with_status(status)
        .with_correlation_id(correlation_id(headers))
        .with_retry_after(retry_after)
}

/// Read the correlation id header, if present and valid UTF-8.
pub fn correlation_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

/// `Retry-After` in delta-seconds form. HTTP-date values are ignored.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Provider error payload. Accepts both the `errors[]` envelope and the
/// standard OAuth `error`/`error_description` pair.
#[derive(Debug, Default, Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    errors: Vec<ErrorItem>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorItem {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

/// Extract a human-readable message from an error body.
fn provider_message(body: &str) -> Option<String> {
    let payload: ErrorPayload = serde_json::from_str(body).ok()?;

    let items: Vec<String> = payload
        .errors
        .iter()
        .filter_map(|item| {
            let code = item.code.as_ref().map(|c| match c {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            });
            match (code, item.message.as_deref()) {
                (Some(code), Some(msg)) => Some(format!("{msg} ({code})")),
                (None, Some(msg)) => Some(msg.to_owned()),
                (Some(code), None) => Some(code),
                (None, None) => None,
            }
        })
        .collect();
    if !items.is_empty() {
        return Some(items.join("; "));
    }

    match (payload.error, payload.error_description) {
        (Some(error), Some(desc)) => Some(format!("{error}: {desc}")),
        (Some(error), None) => Some(error),
        (None, Some(desc)) => Some(desc),
        (None, None) => payload.message,
    }
}

#[cfg(test)]
#[path = "classify_tests.rs"]
mod tests;
