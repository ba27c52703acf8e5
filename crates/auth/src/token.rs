// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token set and authentication state types.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Seconds before expiry at which a proactive refresh is triggered.
pub const DEFAULT_REFRESH_MARGIN_SECS: u64 = 300;

/// Credentials returned by a successful grant, stamped with issuance time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub token_type: String,
    /// Lifetime in seconds, counted from `issued_at`.
    pub expires_in: u64,
    /// Epoch seconds at which the token endpoint answered.
    pub issued_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl TokenSet {
    /// Absolute expiry instant in epoch seconds.
    pub fn expires_at(&self) -> u64 {
        self.issued_at.saturating_add(self.expires_in)
    }
}

/// Current credential state owned by the access token provider.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthState {
    #[default]
    Unauthenticated,
    Authenticated { tokens: TokenSet, expires_at: u64 },
}

impl AuthState {
    pub fn authenticated(tokens: TokenSet) -> Self {
        let expires_at = tokens.expires_at();
        Self::Authenticated { tokens, expires_at }
    }

    pub fn tokens(&self) -> Option<&TokenSet> {
        match self {
            Self::Unauthenticated => None,
            Self::Authenticated { tokens, .. } => Some(tokens),
        }
    }

    pub fn expires_at(&self) -> Option<u64> {
        match self {
            Self::Unauthenticated => None,
            Self::Authenticated { expires_at, .. } => Some(*expires_at),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }
}

/// Whether a token expiring at `expires_at` is inside the refresh margin.
pub fn needs_refresh(expires_at: u64, now: u64, margin_secs: u64) -> bool {
    now >= expires_at.saturating_sub(margin_secs)
}

/// Strict validity, no margin applied.
pub fn is_valid(expires_at: u64, now: u64) -> bool {
    now < expires_at
}

/// Standard OAuth2 token response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl TokenResponse {
    pub fn into_token_set(self, issued_at: u64) -> TokenSet {
        TokenSet {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            token_type: self.token_type.unwrap_or_else(|| "Bearer".to_owned()),
            expires_in: self.expires_in,
            issued_at,
            scope: self.scope,
            tenant_id: self.tenant_id,
            correlation_id: self.correlation_id,
        }
    }
}

/// Return current epoch seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

#[cfg(test)]
#[path = "token_tests.rs"]
mod tests;
