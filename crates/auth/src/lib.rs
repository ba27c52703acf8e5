// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

pub mod authorize;
pub mod callback;
pub mod classify;
pub mod config;
pub mod error;
pub mod exchange;
pub mod provider;
pub mod refresh;
pub mod singleflight;
pub mod store;
pub mod token;

pub use config::{AuthConfig, OAuthConfig, ProviderOptions};
pub use error::{AuthError, ErrorKind, Severity};
pub use provider::{AccessTokenProvider, AuthEvent, AuthStatus};
pub use store::TokenStore;
pub use token::{AuthState, TokenSet};
