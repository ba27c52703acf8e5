// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

use crate::token::DEFAULT_REFRESH_MARGIN_SECS;

/// Consecutive refresh failures tolerated before credentials are discarded.
pub const DEFAULT_MAX_REFRESH_FAILURES: u32 = 3;

/// Per-request timeout for token endpoint calls.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// OAuth client registration for the accounting provider.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    /// Base URL of the token endpoint (`{base_url}/token`).
    pub base_url: String,
    /// Base URL of the consent page (`{auth_base_url}/authorize`).
    pub auth_base_url: String,
}

impl OAuthConfig {
    /// Build a config whose consent page lives on the same host as the token endpoint.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            auth_base_url: base_url.clone(),
            base_url,
        }
    }

    pub fn with_auth_base_url(mut self, auth_base_url: impl Into<String>) -> Self {
        self.auth_base_url = auth_base_url.into();
        self
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.client_id.trim().is_empty() {
            anyhow::bail!("client id must not be empty");
        }
        if self.client_secret.trim().is_empty() {
            anyhow::bail!("client secret must not be empty");
        }
        if self.redirect_uri.trim().is_empty() {
            anyhow::bail!("redirect uri must not be empty");
        }
        for (name, url) in [("base url", &self.base_url), ("auth base url", &self.auth_base_url)] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                anyhow::bail!("{name} must be an http(s) URL, got {url:?}");
            }
        }
        Ok(())
    }

    pub fn token_url(&self) -> String {
        format!("{}/token", self.base_url.trim_end_matches('/'))
    }

    pub fn authorize_url(&self) -> String {
        format!("{}/authorize", self.auth_base_url.trim_end_matches('/'))
    }
}

/// Tuning for the token provider.
#[derive(Debug, Clone)]
pub struct ProviderOptions {
    pub refresh_margin_secs: u64,
    pub max_refresh_failures: u32,
    pub http_timeout: Duration,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            refresh_margin_secs: DEFAULT_REFRESH_MARGIN_SECS,
            max_refresh_failures: DEFAULT_MAX_REFRESH_FAILURES,
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}

/// Command-line and environment configuration.
#[derive(Debug, Clone, clap::Args)]
pub struct AuthConfig {
    /// OAuth client identifier.
    #[arg(long, env = "LEDGER_CLIENT_ID", default_value = "")]
    pub client_id: String,

    /// OAuth client secret.
    #[arg(long, env = "LEDGER_CLIENT_SECRET", default_value = "", hide_env_values = true)]
    pub client_secret: String,

    /// Redirect URI registered with the provider.
    #[arg(long, env = "LEDGER_REDIRECT_URI", default_value = "http://localhost:8765/callback")]
    pub redirect_uri: String,

    /// Provider base URL; the token endpoint is `{base_url}/token`.
    #[arg(long, env = "LEDGER_BASE_URL")]
    pub base_url: String,

    /// Consent page base URL. Defaults to `--base-url`.
    #[arg(long, env = "LEDGER_AUTH_BASE_URL")]
    pub auth_base_url: Option<String>,

    /// Token file path. Defaults to `$HOME/.ledger-auth/tokens.json`.
    #[arg(long, env = "LEDGER_AUTH_TOKEN_PATH")]
    pub token_path: Option<PathBuf>,

    /// Seconds before expiry at which tokens are refreshed.
    #[arg(long, env = "LEDGER_REFRESH_MARGIN_SECS", default_value_t = DEFAULT_REFRESH_MARGIN_SECS)]
    pub refresh_margin_secs: u64,

    /// Consecutive refresh failures before credentials are discarded.
    #[arg(
        long,
        env = "LEDGER_MAX_REFRESH_FAILURES",
        default_value_t = DEFAULT_MAX_REFRESH_FAILURES
    )]
    pub max_refresh_failures: u32,

    /// Timeout for each token endpoint request, in seconds.
    #[arg(long, env = "LEDGER_HTTP_TIMEOUT_SECS", default_value_t = DEFAULT_HTTP_TIMEOUT_SECS)]
    pub http_timeout_secs: u64,

    /// Log filter (e.g. `info`, `ledger_auth=debug`).
    #[arg(long, env = "LEDGER_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format: `text` or `json`.
    #[arg(long, env = "LEDGER_LOG_FORMAT", default_value = "text")]
    pub log_format: String,
}

impl AuthConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        self.to_oauth_config().validate()?;
        if self.max_refresh_failures == 0 {
            anyhow::bail!("--max-refresh-failures must be at least 1");
        }
        if self.http_timeout_secs == 0 {
            anyhow::bail!("--http-timeout-secs must be at least 1");
        }
        match self.log_format.as_str() {
            "text" | "json" => Ok(()),
            other => anyhow::bail!("--log-format must be text or json, got {other:?}"),
        }
    }

    pub fn to_oauth_config(&self) -> OAuthConfig {
        let config = OAuthConfig::new(
            &self.client_id,
            &self.client_secret,
            &self.redirect_uri,
            &self.base_url,
        );
        match self.auth_base_url {
            Some(ref url) => config.with_auth_base_url(url),
            None => config,
        }
    }

    pub fn provider_options(&self) -> ProviderOptions {
        ProviderOptions {
            refresh_margin_secs: self.refresh_margin_secs,
            max_refresh_failures: self.max_refresh_failures,
            http_timeout: Duration::from_secs(self.http_timeout_secs),
        }
    }

    pub fn token_path(&self) -> PathBuf {
        self.token_path.clone().unwrap_or_else(crate::store::default_token_path)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
