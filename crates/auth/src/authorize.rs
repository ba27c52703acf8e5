// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Consent URL construction for the authorization-code grant.

use rand::distr::Alphanumeric;
use rand::Rng;
use serde::Serialize;

use crate::config::OAuthConfig;

/// Length of a generated CSRF `state` value.
pub const STATE_LEN: usize = 32;

/// Query parameter that asks the provider to show its tenant picker.
const TENANT_SELECTION_PARAM: (&str, &str) = ("prompt", "select_tenant");

/// A consent URL and the `state` embedded in it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizationRequest {
    pub url: String,
    /// The caller must compare this against the `state` on the callback.
    pub state: String,
}

/// Generate a random alphanumeric `state` value.
pub fn generate_state() -> String {
    rand::rng().sample_iter(&Alphanumeric).take(STATE_LEN).map(char::from).collect()
}

/// Build the consent URL the user opens in a browser.
///
/// Parameter order is `response_type`, `client_id`, `redirect_uri`, `state`,
/// then the optional tenant prompt.
pub fn build_authorization_url(
    config: &OAuthConfig,
    state: Option<&str>,
    enable_tenant_selection: bool,
) -> AuthorizationRequest {
    let state = match state {
        Some(s) => s.to_owned(),
        None => generate_state(),
    };

    let mut params = vec![
        ("response_type", "code"),
        ("client_id", config.client_id.as_str()),
        ("redirect_uri", config.redirect_uri.as_str()),
        ("state", state.as_str()),
    ];
    if enable_tenant_selection {
        params.push(TENANT_SELECTION_PARAM);
    }

    let url = format!("{}?{}", config.authorize_url(), urlencoded(&params));
    AuthorizationRequest { url, state }
}

/// Build a URL-encoded query string.
fn urlencoded(params: &[(&str, &str)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding(k), urlencoding(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Form-style encoding for URL query parameters (spaces as `+`).
fn urlencoding(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char);
            }
            b' ' => out.push('+'),
            _ => {
                out.push('%');
                out.push(char::from(HEX[(b >> 4) as usize]));
                out.push(char::from(HEX[(b & 0xf) as usize]));
            }
        }
    }
    out
}

const HEX: &[u8; 16] = b"0123456789ABCDEF";

#[cfg(test)]
#[path = "authorize_tests.rs"]
mod tests;
