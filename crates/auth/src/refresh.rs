// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Refresh coordination: one in-flight refresh at a time, plus the
//! consecutive-failure budget that decides when credentials are discarded.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};

use tracing::debug;

use crate::error::AuthError;
use crate::singleflight::SingleFlight;
use crate::token::TokenSet;

/// What to do with the stored credentials after a failed refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureVerdict {
    /// Keep the credentials; a later call may retry.
    Retain { consecutive: u32 },
    /// Discard the credentials and require reauthorization.
    Invalidate(InvalidationReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationReason {
    /// The provider rejected the grant or client credentials.
    Critical,
    /// Too many consecutive retryable failures.
    BudgetExhausted { attempts: u32 },
}

impl InvalidationReason {
    pub fn describe(&self) -> String {
        match self {
            Self::Critical => "refresh grant rejected".to_owned(),
            Self::BudgetExhausted { attempts } => {
                format!("refresh failed {attempts} consecutive times")
            }
        }
    }
}

/// Serializes refresh requests onto a single shared operation.
pub struct RefreshCoordinator {
    flight: SingleFlight<TokenSet, AuthError>,
    failures: AtomicU32,
    max_failures: u32,
}

impl RefreshCoordinator {
    pub fn new(max_failures: u32) -> Self {
        Self {
            flight: SingleFlight::new(),
            failures: AtomicU32::new(0),
            max_failures: max_failures.max(1),
        }
    }

    /// Await the in-flight refresh, starting one with `start` if none is running.
    ///
    /// `start` must settle the outcome itself (commit or invalidate) so that
    /// the state is updated exactly once per network call, even when every
    /// caller stops waiting.
    pub async fn refresh<F, Fut>(&self, start: F) -> Result<TokenSet, AuthError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<TokenSet, AuthError>> + Send + 'static,
    {
        let (outcome, leader) = self.flight.join_or_start(start);
        if leader {
            debug!("started token refresh");
        } else {
            debug!("joined in-flight token refresh");
        }
        outcome.await
    }

    pub fn is_refreshing(&self) -> bool {
        self.flight.is_in_flight()
    }

    pub fn max_failures(&self) -> u32 {
        self.max_failures
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    /// Zero the failure count after a success or a fresh authorization.
    pub fn reset_failures(&self) {
        self.failures.store(0, Ordering::SeqCst);
    }

    /// Count a failed refresh and decide whether credentials survive it.
    pub fn record_failure(&self, err: &AuthError) -> FailureVerdict {
        if err.is_critical() {
            self.failures.store(0, Ordering::SeqCst);
            return FailureVerdict::Invalidate(InvalidationReason::Critical);
        }
        let consecutive = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
        if consecutive >= self.max_failures {
            self.failures.store(0, Ordering::SeqCst);
            let reason = InvalidationReason::BudgetExhausted { attempts: consecutive };
            FailureVerdict::Invalidate(reason)
        } else {
            FailureVerdict::Retain { consecutive }
        }
    }
}

#[cfg(test)]
#[path = "refresh_tests.rs"]
mod tests;
