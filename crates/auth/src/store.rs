// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token persistence: a single JSON file with atomic writes.
//!
//! The file is a cache of the in-memory [`AuthState`]. Anything that cannot be
//! trusted on load (missing, corrupt, inconsistent, expired) is treated as
//! absent and removed.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::token::{epoch_secs, is_valid, AuthState, TokenSet};

/// Env var overriding the token file location.
pub const TOKEN_PATH_ENV: &str = "LEDGER_AUTH_TOKEN_PATH";

/// Resolve the token file path.
///
/// Checks `LEDGER_AUTH_TOKEN_PATH`, then `$HOME/.ledger-auth/tokens.json`.
pub fn default_token_path() -> PathBuf {
    if let Ok(path) = std::env::var(TOKEN_PATH_ENV) {
        return PathBuf::from(path);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".ledger-auth/tokens.json");
    }
    PathBuf::from(".ledger-auth/tokens.json")
}

/// On-disk projection of an authenticated state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PersistedTokenRecord {
    pub tokens: TokenSet,
    /// Epoch seconds; must equal `tokens.issued_at + tokens.expires_in`.
    pub expires_at: u64,
    /// Epoch seconds at which the record was written.
    pub saved_at: u64,
}

/// Single-file token store.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at [`default_token_path`].
    pub fn at_default_path() -> Self {
        Self::new(default_token_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted state, discarding the file if it is unusable.
    pub fn load(&self) -> AuthState {
        self.load_at(epoch_secs())
    }

    pub(crate) fn load_at(&self, now: u64) -> AuthState {
        let contents = match std::fs::read(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no persisted tokens");
                return AuthState::Unauthenticated;
            }
            Err(e) => {
                warn!(path = %self.path.display(), "failed to read persisted tokens: {e}");
                return AuthState::Unauthenticated;
            }
        };

        let record: PersistedTokenRecord = match serde_json::from_slice(&contents) {
            Ok(r) => r,
            Err(e) => {
                warn!(path = %self.path.display(), "discarding corrupt token file: {e}");
                self.discard();
                return AuthState::Unauthenticated;
            }
        };

        if record.expires_at != record.tokens.expires_at() {
            warn!(
                path = %self.path.display(),
                stored = record.expires_at,
                derived = record.tokens.expires_at(),
                "discarding token file with inconsistent expiry"
            );
            self.discard();
            return AuthState::Unauthenticated;
        }

        if !is_valid(record.expires_at, now) {
            info!(path = %self.path.display(), "persisted tokens expired, discarding");
            self.discard();
            return AuthState::Unauthenticated;
        }

        info!(
            path = %self.path.display(),
            expires_in = record.expires_at - now,
            "loaded persisted tokens"
        );
        AuthState::authenticated(record.tokens)
    }

    /// Persist the state. An unauthenticated state clears the file.
    ///
    /// Writes to a unique temp file then renames over the target, so a reader
    /// never observes a partially written record.
    pub fn save(&self, state: &AuthState) -> anyhow::Result<()> {
        use std::sync::atomic::{AtomicU32, Ordering};
        static COUNTER: AtomicU32 = AtomicU32::new(0);

        let AuthState::Authenticated { tokens, expires_at } = state else {
            return self.clear();
        };
        let record = PersistedTokenRecord {
            tokens: tokens.clone(),
            expires_at: *expires_at,
            saved_at: epoch_secs(),
        };
        let json = serde_json::to_string_pretty(&record)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp_name = format!(
            "{}.{}.{}.tmp",
            self.path.file_name().unwrap_or_default().to_string_lossy(),
            std::process::id(),
            seq,
        );
        let tmp_path = self.path.with_file_name(tmp_name);
        if let Err(e) = write_private(&tmp_path, json.as_bytes()) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        std::fs::rename(&tmp_path, &self.path)?;
        debug!(path = %self.path.display(), "persisted tokens");
        Ok(())
    }

    /// Remove the token file. A missing file is not an error.
    pub fn clear(&self) -> anyhow::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "removed token file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn discard(&self) {
        if let Err(e) = self.clear() {
            warn!(path = %self.path.display(), "failed to remove token file: {e}");
        }
    }
}

/// Write a file readable only by the owner where the platform supports it.
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
