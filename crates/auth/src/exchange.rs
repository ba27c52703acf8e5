// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token endpoint client for the authorization-code and refresh grants.
//!
//! This is a transport adapter only: it never touches the auth state.

use std::time::Duration;

use reqwest::header::HeaderMap;
use tracing::debug;

use crate::classify::{classify_response, classify_transport, correlation_id};
use crate::config::OAuthConfig;
use crate::error::{AuthError, ErrorKind};
use crate::token::{epoch_secs, TokenResponse, TokenSet};

/// Posts grants to `{base_url}/token`.
#[derive(Debug, Clone)]
pub struct TokenExchanger {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl TokenExchanger {
    pub fn new(config: &OAuthConfig, timeout: Duration) -> anyhow::Result<Self> {
        let _ = rustls::crypto::ring::default_provider().install_default();
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            token_url: config.token_url(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
        })
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// Exchange an authorization code from the consent callback.
    pub async fn exchange_authorization_code(&self, code: &str) -> Result<TokenSet, AuthError> {
        self.post_grant(&[
            ("grant_type", "authorization_code"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
        ])
        .await
    }

    /// Exchange a refresh token for a new token set.
    ///
    /// The returned set carries whatever `refresh_token` the provider sent,
    /// which may be none.
    pub async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<TokenSet, AuthError> {
        self.post_grant(&[
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    async fn post_grant(&self, form: &[(&str, &str)]) -> Result<TokenSet, AuthError> {
        let grant = form.first().map(|(_, v)| *v).unwrap_or_default();
        let resp = self
            .http
            .post(&self.token_url)
            .form(form)
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp
            .text()
            .await
            .map_err(|e| unread_body_error(status.as_u16(), &headers, classify_transport(&e)))?;

        if !status.is_success() {
            let err = classify_response(status.as_u16(), &headers, &body);
            debug!(grant, status = status.as_u16(), err = %err, "token endpoint rejected grant");
            return Err(err);
        }

        let token: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            AuthError::new(ErrorKind::UnknownApiError, format!("malformed token response: {e}"))
                .with_status(status.as_u16())
                .with_correlation_id(correlation_id(&headers))
        })?;
        if token.access_token.is_empty() {
            return Err(AuthError::new(
                ErrorKind::UnknownApiError,
                "token response carried an empty access_token",
            )
            .with_status(status.as_u16())
            .with_correlation_id(correlation_id(&headers)));
        }

        let mut tokens = token.into_token_set(epoch_secs());
        if tokens.correlation_id.is_none() {
            tokens.correlation_id = correlation_id(&headers);
        }
        debug!(grant, expires_in = tokens.expires_in, "token endpoint issued tokens");
        Ok(tokens)
    }
}

/// Error for a response whose body could not be read. A non-success status
/// is still classified by status, as if the body were empty.
fn unread_body_error(status: u16, headers: &HeaderMap, transport: AuthError) -> AuthError {
    if (200..300).contains(&status) {
        transport
    } else {
        classify_response(status, headers, "")
    }
}

#[cfg(test)]
#[path = "exchange_tests.rs"]
mod tests;
