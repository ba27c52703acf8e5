// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::AtomicU32;
use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::error::ErrorKind;

fn tokens(access: &str) -> TokenSet {
    TokenSet {
        access_token: access.to_owned(),
        refresh_token: Some("r".into()),
        token_type: "Bearer".into(),
        expires_in: 1800,
        issued_at: 0,
        scope: None,
        tenant_id: None,
        correlation_id: None,
    }
}

#[test]
fn critical_failure_invalidates_immediately() {
    let coordinator = RefreshCoordinator::new(3);
    let verdict = coordinator.record_failure(&AuthError::new(ErrorKind::InvalidGrant, "revoked"));
    assert_eq!(verdict, FailureVerdict::Invalidate(InvalidationReason::Critical));
    assert_eq!(coordinator.consecutive_failures(), 0);
}

#[test]
fn retryable_failures_exhaust_budget() {
    let coordinator = RefreshCoordinator::new(3);
    let err = AuthError::new(ErrorKind::ServerError, "down");
    assert_eq!(coordinator.record_failure(&err), FailureVerdict::Retain { consecutive: 1 });
    assert_eq!(coordinator.record_failure(&err), FailureVerdict::Retain { consecutive: 2 });
    assert_eq!(
        coordinator.record_failure(&err),
        FailureVerdict::Invalidate(InvalidationReason::BudgetExhausted { attempts: 3 })
    );
    assert_eq!(coordinator.consecutive_failures(), 0);
}

#[test]
fn success_resets_counter() {
    let coordinator = RefreshCoordinator::new(3);
    let err = AuthError::new(ErrorKind::TransportError, "unreachable");
    coordinator.record_failure(&err);
    coordinator.record_failure(&err);
    coordinator.reset_failures();
    assert_eq!(coordinator.consecutive_failures(), 0);
    assert_eq!(coordinator.record_failure(&err), FailureVerdict::Retain { consecutive: 1 });
}

#[test]
fn informational_failures_count_toward_budget() {
    let coordinator = RefreshCoordinator::new(2);
    let err = AuthError::new(ErrorKind::UnknownApiError, "teapot");
    assert_eq!(coordinator.record_failure(&err), FailureVerdict::Retain { consecutive: 1 });
    assert!(matches!(coordinator.record_failure(&err), FailureVerdict::Invalidate(_)));
}

#[test]
fn zero_budget_is_clamped_to_one() {
    let coordinator = RefreshCoordinator::new(0);
    assert_eq!(coordinator.max_failures(), 1);
}

#[tokio::test]
async fn concurrent_refreshes_share_outcome() {
    let coordinator = Arc::new(RefreshCoordinator::new(3));
    let calls = Arc::new(AtomicU32::new(0));

    let spawn_caller = |label: &'static str| {
        let coordinator = Arc::clone(&coordinator);
        let calls = Arc::clone(&calls);
        tokio::spawn(async move {
            coordinator
                .refresh(move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(tokens(label))
                })
                .await
        })
    };
    let a = spawn_caller("first");
    let b = spawn_caller("second");
    let c = spawn_caller("third");

    let results: Vec<String> = futures_util::future::join_all([a, b, c])
        .await
        .into_iter()
        .filter_map(|joined| joined.ok().and_then(|r| r.ok()).map(|t| t.access_token))
        .collect();

    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|t| t == &results[0]));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!coordinator.is_refreshing());
}
