use crate::state::mutate_state;
use candid::Principal;
use ic_canister_log::log;
use ic_cdk::api::time;

const MAX_CONCURRENT: usize = 100;

/// Guards older than this are considered leftovers of a call that never
/// released them and are evicted on the next guard attempt.
const GUARD_TIMEOUT_NANOS: u64 = 5 * 60 * 1_000_000_000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperationGuard {
    pub started_at: u64,
    pub operation: String,
}

#[derive(Debug, PartialEq, Eq)]
pub enum GuardError {
    AlreadyProcessing,
    TooManyConcurrentRequests,
}

/// Prevents a principal from running two mutating operations concurrently
/// and bounds the number of in-flight operations overall. Released on drop.
#[must_use]
pub struct GuardPrincipal {
    principal: Principal,
}

impl GuardPrincipal {
    pub fn new(principal: Principal, operation: &str) -> Result<Self, GuardError> {
        mutate_state(|s| {
            let now = time();

            s.guards.retain(|p, guard| {
                let stale = now.saturating_sub(guard.started_at) > GUARD_TIMEOUT_NANOS;
                if stale {
                    log!(
                        crate::logs::INFO,
                        "[guard] evicting stale guard '{}' held by {} for {}s",
                        guard.operation,
                        p,
                        now.saturating_sub(guard.started_at) / 1_000_000_000
                    );
                }
                !stale
            });

            if let Some(guard) = s.guards.get(&principal) {
                log!(
                    crate::logs::DEBUG,
                    "[guard] {} already running '{}'",
                    principal,
                    guard.operation
                );
                return Err(GuardError::AlreadyProcessing);
            }

            if s.guards.len() >= MAX_CONCURRENT {
                return Err(GuardError::TooManyConcurrentRequests);
            }

            s.guards.insert(
                principal,
                OperationGuard {
                    started_at: now,
                    operation: operation.to_string(),
                },
            );
            Ok(Self { principal })
        })
    }
}

impl Drop for GuardPrincipal {
    fn drop(&mut self) {
        mutate_state(|s| {
            s.guards.remove(&self.principal);
        });
    }
}

#[must_use]
pub struct PayoutTimerGuard(());

impl PayoutTimerGuard {
    pub fn new() -> Option<Self> {
        mutate_state(|s| {
            if s.is_processing_payouts {
                return None;
            }
            s.is_processing_payouts = true;
            Some(PayoutTimerGuard(()))
        })
    }
}

impl Drop for PayoutTimerGuard {
    fn drop(&mut self) {
        mutate_state(|s| {
            s.is_processing_payouts = false;
        });
    }
}

#[must_use]
pub struct FetchPricesGuard(());

impl FetchPricesGuard {
    pub fn new() -> Option<Self> {
        mutate_state(|s| {
            if s.is_fetching_prices {
                return None;
            }
            s.is_fetching_prices = true;
            Some(FetchPricesGuard(()))
        })
    }
}

impl Drop for FetchPricesGuard {
    fn drop(&mut self) {
        mutate_state(|s| {
            s.is_fetching_prices = false;
        });
    }
}
