// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Auth error taxonomy surfaced to callers of the token provider.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Failure categories returned by the token lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// No credentials available; the authorization-code flow must be started.
    Unauthenticated,
    /// Network failure, no HTTP response received.
    TransportError,
    /// HTTP 429 from the token endpoint.
    RateLimited,
    /// HTTP 500/502/503/504 from the token endpoint.
    ServerError,
    /// HTTP 400/401/403: credentials or grant are invalid.
    InvalidGrant,
    /// Any other status, or an undecodable success body.
    UnknownApiError,
}

/// How a failure should be treated by retry and invalidation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Retryable,
    Critical,
    Informational,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::TransportError => "TRANSPORT_ERROR",
            Self::RateLimited => "RATE_LIMITED",
            Self::ServerError => "SERVER_ERROR",
            Self::InvalidGrant => "INVALID_GRANT",
            Self::UnknownApiError => "UNKNOWN_API_ERROR",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::TransportError | Self::RateLimited | Self::ServerError => Severity::Retryable,
            Self::InvalidGrant => Severity::Critical,
            Self::Unauthenticated | Self::UnknownApiError => Severity::Informational,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.severity() == Severity::Retryable
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified auth failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthError {
    pub kind: ErrorKind,
    /// Human-readable message, taken from the provider payload when present.
    pub message: String,
    /// HTTP status of the failed response, if one was received.
    pub status: Option<u16>,
    pub retryable: bool,
    /// Provider correlation id from the response headers.
    pub correlation_id: Option<String>,
    /// `Retry-After` hint supplied with a 429.
    pub retry_after: Option<Duration>,
    /// Set once the stored credentials were discarded because of this failure.
    pub reauthorization_required: bool,
}

impl AuthError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            retryable: kind.is_retryable(),
            correlation_id: None,
            retry_after: None,
            reauthorization_required: kind == ErrorKind::Unauthenticated,
        }
    }

    pub fn unauthenticated() -> Self {
        Self::new(ErrorKind::Unauthenticated, "no credentials available; start authorization")
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: Option<String>) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    pub fn with_retry_after(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }

    /// Mark this error as having forced the credentials to be discarded.
    pub fn requiring_reauthorization(mut self) -> Self {
        self.reauthorization_required = true;
        self
    }

    pub fn severity(&self) -> Severity {
        self.kind.severity()
    }

    pub fn is_critical(&self) -> bool {
        self.severity() == Severity::Critical
    }

    /// Text suitable for showing to an end user.
    pub fn user_message(&self) -> String {
        if self.reauthorization_required {
            format!("reauthorization required: {}", self.message)
        } else if self.retryable {
            format!("temporarily unavailable, try again: {}", self.message)
        } else {
            self.message.clone()
        }
    }

    pub fn to_error_body(&self) -> ErrorBody {
        ErrorBody {
            code: self.kind.as_str().to_owned(),
            message: self.user_message(),
            correlation_id: self.correlation_id.clone(),
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(status) = self.status {
            write!(f, " (HTTP {status})")?;
        }
        if let Some(ref id) = self.correlation_id {
            write!(f, " [correlation {id}]")?;
        }
        Ok(())
    }
}

impl std::error::Error for AuthError {}

impl From<tokio::task::JoinError> for AuthError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::new(ErrorKind::TransportError, format!("refresh task aborted: {err}"))
    }
}

/// Top-level error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
