// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The access token provider: the one handle callers use to obtain a valid
//! bearer token, complete the authorization-code flow, and inspect state.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::authorize::{build_authorization_url, AuthorizationRequest};
use crate::config::{OAuthConfig, ProviderOptions};
use crate::error::AuthError;
use crate::exchange::TokenExchanger;
use crate::refresh::{FailureVerdict, RefreshCoordinator};
use crate::store::TokenStore;
use crate::token::{epoch_secs, is_valid, needs_refresh, AuthState, TokenSet};

/// Lifecycle events broadcast by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuthEvent {
    /// Tokens were installed by a code exchange or seeding.
    Authenticated {
        expires_at: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        tenant_id: Option<String>,
    },
    /// A refresh grant succeeded and its tokens were committed.
    Refreshed { expires_at: u64 },
    /// A refresh failed; the credentials were kept.
    RefreshFailed { error: String, consecutive_failures: u32 },
    /// Credentials were discarded and reauthorization is required.
    Invalidated { reason: String },
}

/// Serializable snapshot for status surfaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthStatus {
    pub authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in_secs: Option<u64>,
    pub needs_refresh: bool,
    pub has_refresh_token: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    pub consecutive_failures: u32,
    pub refreshing: bool,
    pub token_path: String,
}

/// What a token request has to do given the current state.
enum Plan {
    Unauthenticated,
    /// Outside the refresh margin.
    Current(TokenSet),
    /// Inside the margin with no refresh token, but not yet expired.
    Grace(TokenSet),
    /// Inside the margin with no refresh token, and expired.
    Expired,
    Refresh { refresh_token: String },
}

/// Cloneable handle to the token lifecycle.
#[derive(Clone)]
pub struct AccessTokenProvider {
    inner: Arc<Inner>,
}

struct Inner {
    config: OAuthConfig,
    options: ProviderOptions,
    state: RwLock<AuthState>,
    /// Held from a state change through its store write. Taken before `state`.
    persist_lock: Mutex<()>,
    store: TokenStore,
    exchanger: TokenExchanger,
    coordinator: RefreshCoordinator,
    event_tx: broadcast::Sender<AuthEvent>,
}

impl AccessTokenProvider {
    /// Validate the config and load whatever the store holds.
    pub fn new(
        config: OAuthConfig,
        options: ProviderOptions,
        store: TokenStore,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        let exchanger = TokenExchanger::new(&config, options.http_timeout)?;
        let state = store.load();
        let (event_tx, _) = broadcast::channel(64);
        info!(
            token_url = exchanger.token_url(),
            path = %store.path().display(),
            authenticated = state.is_authenticated(),
            "token provider ready"
        );
        Ok(Self {
            inner: Arc::new(Inner {
                coordinator: RefreshCoordinator::new(options.max_refresh_failures),
                config,
                options,
                state: RwLock::new(state),
                persist_lock: Mutex::new(()),
                store,
                exchanger,
                event_tx,
            }),
        })
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.inner.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.event_tx.subscribe()
    }

    /// Build a consent URL. A fresh `state` is generated when none is given.
    pub fn authorization_url(
        &self,
        state: Option<&str>,
        enable_tenant_selection: bool,
    ) -> AuthorizationRequest {
        build_authorization_url(&self.inner.config, state, enable_tenant_selection)
    }

    /// Exchange an authorization code and install the resulting tokens.
    ///
    /// A rejected exchange (400/401/403) also discards any credentials held
    /// from an earlier authorization.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenSet, AuthError> {
        match self.inner.exchanger.exchange_authorization_code(code).await {
            Ok(tokens) => {
                self.inner.install(tokens.clone());
                Ok(tokens)
            }
            Err(err) if err.is_critical() => {
                warn!(err = %err, "authorization code rejected, discarding credentials");
                self.inner.coordinator.reset_failures();
                self.inner.invalidate("authorization code rejected", |_| true);
                Err(err.requiring_reauthorization())
            }
            Err(err) => {
                warn!(err = %err, "authorization code exchange failed");
                Err(err)
            }
        }
    }

    /// Install a token set obtained elsewhere.
    pub fn seed(&self, tokens: TokenSet) {
        self.inner.install(tokens);
    }

    /// Return an access token that is valid now, refreshing first if the
    /// current one is inside the refresh margin.
    pub async fn get_valid_access_token(&self) -> Result<String, AuthError> {
        match self.inner.plan(epoch_secs()) {
            Plan::Unauthenticated => Err(AuthError::unauthenticated()),
            Plan::Current(tokens) => Ok(tokens.access_token),
            Plan::Grace(tokens) => {
                debug!("token inside refresh margin without refresh token, using current");
                Ok(tokens.access_token)
            }
            Plan::Expired => {
                self.inner.expire();
                Err(AuthError::unauthenticated())
            }
            Plan::Refresh { .. } => {
                let inner = Arc::clone(&self.inner);
                self.inner.coordinator.refresh(move || inner.run_refresh()).await?;
                self.current_access_token().ok_or_else(AuthError::unauthenticated)
            }
        }
    }

    /// Strict validity of the current token, no margin applied.
    pub fn is_token_valid(&self) -> bool {
        let now = epoch_secs();
        self.inner.state.read().expires_at().is_some_and(|at| is_valid(at, now))
    }

    pub fn current_access_token(&self) -> Option<String> {
        self.inner.state.read().tokens().map(|t| t.access_token.clone())
    }

    pub fn state(&self) -> AuthState {
        self.inner.state.read().clone()
    }

    pub fn status(&self) -> AuthStatus {
        let now = epoch_secs();
        let state = self.state();
        let tokens = state.tokens();
        AuthStatus {
            authenticated: state.is_authenticated(),
            expires_in_secs: state.expires_at().map(|at| at.saturating_sub(now)),
            needs_refresh: state
                .expires_at()
                .is_some_and(|at| needs_refresh(at, now, self.inner.options.refresh_margin_secs)),
            has_refresh_token: tokens.is_some_and(|t| t.refresh_token.is_some()),
            tenant_id: tokens.and_then(|t| t.tenant_id.clone()),
            consecutive_failures: self.inner.coordinator.consecutive_failures(),
            refreshing: self.inner.coordinator.is_refreshing(),
            token_path: self.inner.store.path().display().to_string(),
        }
    }

    /// Discard the credentials and the persisted record.
    pub fn logout(&self) {
        let previous =
            self.inner.transition(|state| Some(std::mem::take(state))).unwrap_or_default();
        if previous.is_authenticated() {
            info!("logged out");
            let event = AuthEvent::Invalidated { reason: "logged out".to_owned() };
            let _ = self.inner.event_tx.send(event);
        }
    }
}

impl Inner {
    fn plan(&self, now: u64) -> Plan {
        let state = self.state.read();
        let AuthState::Authenticated { tokens, expires_at } = &*state else {
            return Plan::Unauthenticated;
        };
        if !needs_refresh(*expires_at, now, self.options.refresh_margin_secs) {
            return Plan::Current(tokens.clone());
        }
        match tokens.refresh_token {
            Some(ref refresh_token) => Plan::Refresh { refresh_token: refresh_token.clone() },
            None if is_valid(*expires_at, now) => Plan::Grace(tokens.clone()),
            None => Plan::Expired,
        }
    }

    /// Body of the single in-flight refresh. Runs detached from any caller.
    async fn run_refresh(self: Arc<Self>) -> Result<TokenSet, AuthError> {
        // A previous flight may have committed between the caller's check and now.
        let refresh_token = match self.plan(epoch_secs()) {
            Plan::Refresh { refresh_token } => refresh_token,
            Plan::Current(tokens) | Plan::Grace(tokens) => return Ok(tokens),
            Plan::Expired => {
                self.expire();
                return Err(AuthError::unauthenticated());
            }
            Plan::Unauthenticated => return Err(AuthError::unauthenticated()),
        };

        let result = self.exchanger.exchange_refresh_token(&refresh_token).await;
        self.settle(&refresh_token, result)
    }

    /// Apply a refresh outcome to the state. Only the state that issued
    /// `used` is touched; a logout or code exchange in the meantime wins.
    fn settle(
        &self,
        used: &str,
        result: Result<TokenSet, AuthError>,
    ) -> Result<TokenSet, AuthError> {
        let err = match result {
            Ok(mut tokens) => {
                if tokens.refresh_token.is_none() {
                    tokens.refresh_token = Some(used.to_owned());
                }
                self.coordinator.reset_failures();
                if self.commit_if_current(used, &tokens) {
                    info!(expires_in = tokens.expires_in, "refreshed access token");
                    let event = AuthEvent::Refreshed { expires_at: tokens.expires_at() };
                    let _ = self.event_tx.send(event);
                } else {
                    debug!("credentials changed during refresh, dropping refreshed tokens");
                }
                return Ok(tokens);
            }
            Err(err) => err,
        };

        match self.coordinator.record_failure(&err) {
            FailureVerdict::Retain { consecutive } => {
                warn!(
                    err = %err,
                    consecutive,
                    max = self.coordinator.max_failures(),
                    "token refresh failed"
                );
                let _ = self.event_tx.send(AuthEvent::RefreshFailed {
                    error: err.to_string(),
                    consecutive_failures: consecutive,
                });
                Err(err)
            }
            FailureVerdict::Invalidate(reason) => {
                warn!(err = %err, "token refresh failed, discarding credentials");
                self.invalidate(&reason.describe(), |t| t.refresh_token.as_deref() == Some(used));
                Err(err.requiring_reauthorization())
            }
        }
    }

    /// Apply `update` to the state and mirror the result to the store.
    ///
    /// Returns `None` without touching the store when `update` declines.
    /// Readers only wait for the in-memory change, never for the file write.
    fn transition<R>(&self, update: impl FnOnce(&mut AuthState) -> Option<R>) -> Option<R> {
        let _persist = self.persist_lock.lock();
        let (out, snapshot) = {
            let mut state = self.state.write();
            let out = update(&mut *state)?;
            (out, state.clone())
        };
        self.persist(&snapshot);
        Some(out)
    }

    fn commit_if_current(&self, used: &str, tokens: &TokenSet) -> bool {
        self.transition(|state| {
            let current = state.tokens().and_then(|t| t.refresh_token.as_deref()) == Some(used);
            if !current {
                return None;
            }
            *state = AuthState::authenticated(tokens.clone());
            Some(())
        })
        .is_some()
    }

    fn install(&self, tokens: TokenSet) {
        let expires_at = tokens.expires_at();
        let tenant_id = tokens.tenant_id.clone();
        self.transition(|state| {
            *state = AuthState::authenticated(tokens);
            Some(())
        });
        self.coordinator.reset_failures();
        info!(expires_at, tenant_id = tenant_id.as_deref(), "authenticated");
        let _ = self.event_tx.send(AuthEvent::Authenticated { expires_at, tenant_id });
    }

    /// Expired with nothing to refresh with.
    fn expire(&self) {
        let now = epoch_secs();
        self.invalidate("token expired without a refresh token", |t| {
            t.refresh_token.is_none() && !is_valid(t.expires_at(), now)
        });
    }

    /// Drop to `Unauthenticated` if `still_current` accepts the held tokens.
    fn invalidate(&self, reason: &str, still_current: impl FnOnce(&TokenSet) -> bool) {
        let invalidated = self.transition(|state| {
            if !still_current(state.tokens()?) {
                debug!(reason, "credentials changed, skipping invalidation");
                return None;
            }
            *state = AuthState::Unauthenticated;
            Some(())
        });
        if invalidated.is_none() {
            return;
        }
        info!(reason, "credentials invalidated");
        let _ = self.event_tx.send(AuthEvent::Invalidated { reason: reason.to_owned() });
    }

    fn persist(&self, state: &AuthState) {
        if let Err(e) = self.store.save(state) {
            warn!(path = %self.store.path().display(), "failed to persist tokens: {e:#}");
        }
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
