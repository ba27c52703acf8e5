// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serial_test::serial;

use super::*;

fn tokens(issued_at: u64, expires_in: u64) -> TokenSet {
    TokenSet {
        access_token: "access-1".into(),
        refresh_token: Some("refresh-1".into()),
        token_type: "Bearer".into(),
        expires_in,
        issued_at,
        scope: Some("accounting.transactions offline_access".into()),
        tenant_id: Some("tenant-9".into()),
        correlation_id: None,
    }
}

fn temp_store() -> anyhow::Result<(tempfile::TempDir, TokenStore)> {
    let dir = tempfile::tempdir()?;
    let store = TokenStore::new(dir.path().join("nested/tokens.json"));
    Ok((dir, store))
}

#[test]
fn round_trip_restores_authenticated_state() -> anyhow::Result<()> {
    let (_dir, store) = temp_store()?;
    let state = AuthState::authenticated(tokens(epoch_secs(), 3600));
    store.save(&state)?;

    let reloaded = TokenStore::new(store.path()).load();
    assert_eq!(reloaded, state);
    Ok(())
}

#[test]
fn expired_record_is_removed_on_load() -> anyhow::Result<()> {
    let (_dir, store) = temp_store()?;
    store.save(&AuthState::authenticated(tokens(epoch_secs() - 7200, 3600)))?;
    assert!(store.path().exists());

    assert_eq!(store.load(), AuthState::Unauthenticated);
    assert!(!store.path().exists());
    Ok(())
}

#[test]
fn corrupt_file_is_removed_on_load() -> anyhow::Result<()> {
    let (_dir, store) = temp_store()?;
    std::fs::create_dir_all(store.path().parent().unwrap_or(store.path()))?;
    std::fs::write(store.path(), "{not json")?;

    assert_eq!(store.load(), AuthState::Unauthenticated);
    assert!(!store.path().exists());
    Ok(())
}

#[test]
fn non_utf8_file_is_removed_on_load() -> anyhow::Result<()> {
    let (_dir, store) = temp_store()?;
    std::fs::create_dir_all(store.path().parent().unwrap_or(store.path()))?;
    std::fs::write(store.path(), [0xff, 0xfe, 0x00, 0x7b])?;

    assert_eq!(store.load(), AuthState::Unauthenticated);
    assert!(!store.path().exists());
    Ok(())
}

#[test]
fn unknown_fields_are_treated_as_absent() -> anyhow::Result<()> {
    let (_dir, store) = temp_store()?;
    let now = epoch_secs();
    let mut value = serde_json::to_value(PersistedTokenRecord {
        tokens: tokens(now, 3600),
        expires_at: now + 3600,
        saved_at: now,
    })?;
    value["version"] = serde_json::json!(2);
    std::fs::create_dir_all(store.path().parent().unwrap_or(store.path()))?;
    std::fs::write(store.path(), value.to_string())?;

    assert_eq!(store.load(), AuthState::Unauthenticated);
    assert!(!store.path().exists());
    Ok(())
}

#[test]
fn inconsistent_expiry_is_treated_as_absent() -> anyhow::Result<()> {
    let (_dir, store) = temp_store()?;
    let now = epoch_secs();
    let record = PersistedTokenRecord {
        tokens: tokens(now, 3600),
        expires_at: now + 999_999,
        saved_at: now,
    };
    std::fs::create_dir_all(store.path().parent().unwrap_or(store.path()))?;
    std::fs::write(store.path(), serde_json::to_string(&record)?)?;

    assert_eq!(store.load(), AuthState::Unauthenticated);
    assert!(!store.path().exists());
    Ok(())
}

#[test]
fn record_uses_camel_case_envelope() -> anyhow::Result<()> {
    let (_dir, store) = temp_store()?;
    store.save(&AuthState::authenticated(tokens(epoch_secs(), 3600)))?;

    let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(store.path())?)?;
    assert!(raw.get("expiresAt").is_some());
    assert!(raw.get("savedAt").is_some());
    assert_eq!(raw["tokens"]["access_token"], "access-1");
    Ok(())
}

#[test]
fn saving_unauthenticated_clears_file() -> anyhow::Result<()> {
    let (_dir, store) = temp_store()?;
    store.save(&AuthState::authenticated(tokens(epoch_secs(), 3600)))?;
    store.save(&AuthState::Unauthenticated)?;
    assert!(!store.path().exists());
    Ok(())
}

#[test]
fn clear_tolerates_missing_file() -> anyhow::Result<()> {
    let (_dir, store) = temp_store()?;
    store.clear()?;
    store.clear()?;
    Ok(())
}

#[cfg(unix)]
#[test]
fn saved_file_is_owner_only() -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let (_dir, store) = temp_store()?;
    store.save(&AuthState::authenticated(tokens(epoch_secs(), 3600)))?;
    let mode = std::fs::metadata(store.path())?.permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
    Ok(())
}

#[test]
#[serial]
fn default_path_prefers_env_override() {
    std::env::set_var(TOKEN_PATH_ENV, "/tmp/ledger-test/tokens.json");
    assert_eq!(default_token_path(), PathBuf::from("/tmp/ledger-test/tokens.json"));
    std::env::remove_var(TOKEN_PATH_ENV);
}

#[test]
#[serial]
fn default_path_falls_back_to_home() {
    std::env::remove_var(TOKEN_PATH_ENV);
    if let Ok(home) = std::env::var("HOME") {
        assert_eq!(default_token_path(), PathBuf::from(home).join(".ledger-auth/tokens.json"));
    }
}
