use crate::guard::GuardError;
use crate::logs::{DEBUG, INFO};
use crate::numeric::{mul_div, HealthFactor, E18, VUSD};
use crate::state::{mutate_state, read_state, PayoutId};
use candid::{CandidType, Deserialize, Principal};
use ic_canister_log::log;
use icrc_ledger_types::icrc1::transfer::TransferError;
use icrc_ledger_types::icrc2::transfer_from::TransferFromError;
use serde::Serialize;
use std::time::Duration;

pub mod event;
pub mod guard;
pub mod liquidation;
pub mod logs;
pub mod management;
pub mod numeric;
pub mod oracle;
pub mod position;
pub mod state;
pub mod storage;

#[cfg(any(test, feature = "test_endpoints"))]
pub mod test_helpers;

#[cfg(test)]
mod tests;

pub const SEC_NANOS: u64 = 1_000_000_000;

/// Collateral counts at 50% of its USD value when measured against debt,
/// encoding the 200% overcollateralization requirement.
pub const LIQUIDATION_THRESHOLD: u128 = 50;
pub const LIQUIDATION_PRECISION: u128 = 100;

/// Extra collateral a liquidator receives on top of the USD equivalent of
/// the debt repaid, in percent.
pub const LIQUIDATION_BONUS: u128 = 10;

/// An account whose health factor drops below 1.0 can be liquidated.
pub const MIN_HEALTH_FACTOR: HealthFactor = HealthFactor::new(E18);

/// Delay before the payout processor retries failed outbound transfers.
pub const PAYOUT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Periodic sweep interval for payouts stuck past their immediate attempt.
pub const PAYOUT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

#[derive(CandidType, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolArg {
    Init(InitArg),
    Upgrade(UpgradeArg),
}

#[derive(CandidType, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitArg {
    /// Parallel lists: the i-th collateral ledger is priced by the i-th
    /// feed and carries the i-th decimal precision. Construction traps on
    /// a length mismatch.
    pub collateral_ledgers: Vec<Principal>,
    pub price_feeds: Vec<Principal>,
    pub collateral_decimals: Vec<u8>,
    pub stable_ledger_principal: Principal,
}

#[derive(CandidType, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeArg {}

#[derive(CandidType, Deserialize, Debug)]
pub struct ProtocolStatus {
    pub total_debt: u128,
    /// Best-effort USD value of all custody at the cached prices; assets
    /// without a cached price contribute zero.
    pub total_collateral_value: u128,
    pub account_count: u64,
    pub pending_payout_count: u64,
}

#[derive(CandidType, Deserialize, Debug)]
pub struct CandidCollateralAsset {
    pub ledger_canister_id: Principal,
    pub price_feed_canister_id: Principal,
    pub decimals: u8,
    pub last_price: Option<f64>,
    pub last_price_timestamp: Option<u64>,
}

#[derive(CandidType, Deserialize, Debug)]
pub struct CandidPayout {
    pub payout_id: u64,
    pub receiver: Principal,
    pub ledger_canister_id: Principal,
    pub amount: u128,
    pub created_at: u64,
}

#[derive(CandidType, Deserialize, Debug)]
pub struct RedeemSuccess {
    pub payout_id: u64,
    /// Block index of the outbound transfer when it settled immediately;
    /// `None` means the payout is queued for retry.
    pub block_index: Option<u64>,
}

#[derive(CandidType, Deserialize, Debug)]
pub struct LiquidationSuccess {
    pub collateral_seized: u128,
    pub payout_id: u64,
    pub block_index: Option<u64>,
}

#[derive(candid::CandidType, Deserialize)]
pub struct GetEventsArg {
    pub start: u64,
    pub length: u64,
}

#[derive(CandidType, Debug, Clone, PartialEq, Eq, Deserialize)]
pub enum ProtocolError {
    ZeroAmount,
    UnknownCollateral {
        asset: Principal,
    },
    StalePrice {
        asset: Principal,
    },
    InsufficientCollateral {
        asset: Principal,
        balance: u128,
        requested: u128,
    },
    InsufficientDebt {
        debt: u128,
        requested: u128,
    },
    /// The operation would leave the account below the minimum health
    /// factor; carries the factor it would have had, scaled by 1e18.
    HealthFactorTooLow {
        health_factor: u128,
    },
    /// The liquidation target is not below the minimum health factor.
    HealthFactorOk,
    /// The liquidation would not strictly improve the target's health.
    HealthFactorNotImproved,
    TransferError(TransferError),
    TransferFromError(TransferFromError),
    ArithmeticOverflow,
    AlreadyProcessing,
    TemporarilyUnavailable(String),
    AnonymousCallerNotAllowed,
    GenericError(String),
}

impl From<GuardError> for ProtocolError {
    fn from(e: GuardError) -> Self {
        match e {
            GuardError::AlreadyProcessing => Self::AlreadyProcessing,
            GuardError::TooManyConcurrentRequests => {
                Self::TemporarilyUnavailable("too many concurrent requests".to_string())
            }
        }
    }
}

/// Risk-adjusted collateralization of a position, scaled by 1e18. An
/// account with no debt is maximally healthy and can never be liquidated.
pub fn compute_health_factor(collateral_value: VUSD, debt: VUSD) -> HealthFactor {
    if debt.is_zero() {
        return HealthFactor::MAX;
    }
    let adjusted = mul_div(
        collateral_value.to_u128(),
        LIQUIDATION_THRESHOLD,
        LIQUIDATION_PRECISION,
    )
    .expect("bug: threshold scaling cannot overflow");
    match mul_div(adjusted, E18, debt.to_u128()) {
        Some(factor) => HealthFactor::new(factor),
        None => HealthFactor::MAX,
    }
}

/// Scans for accounts below the minimum health factor and logs them.
/// Unwinding them is the liquidators' business, not the engine's.
pub fn check_accounts() {
    let now = ic_cdk::api::time();
    let unhealthy = read_state(|s| {
        let mut unhealthy = Vec::new();
        for (owner, account) in &s.accounts {
            if account.debt.is_zero() {
                continue;
            }
            if let Ok(health_factor) = s.health_factor_of(owner, now) {
                if health_factor < MIN_HEALTH_FACTOR {
                    unhealthy.push((*owner, health_factor, account.debt));
                }
            }
        }
        unhealthy
    });
    if unhealthy.is_empty() {
        log!(
            DEBUG,
            "[check_accounts] every indebted account is healthy at current prices"
        );
        return;
    }
    log!(
        INFO,
        "[check_accounts] found {} liquidatable accounts, waiting for external liquidators",
        unhealthy.len()
    );
    for (owner, health_factor, debt) in unhealthy {
        log!(
            INFO,
            "[check_accounts] liquidatable account {}: health factor {}, debt {}",
            owner,
            health_factor,
            debt
        );
    }
}

/// Attempts to settle one queued payout right away. Returns the block
/// index on success; on failure the payout stays queued and a retry is
/// scheduled.
pub async fn process_payout(payout_id: PayoutId) -> Option<u64> {
    let payout = mutate_state(|s| {
        let payout = s.pending_payouts.get(&payout_id).copied()?;
        // Another task may already be sending this payout.
        if !s.payouts_in_flight.insert(payout_id) {
            return None;
        }
        Some(payout)
    })?;

    let fee = read_state(|s| s.payout_fee(&payout.ledger_canister_id));
    if payout.amount <= fee {
        log!(
            INFO,
            "[process_payout] dropping payout {}: amount {} not worth the {} ledger fee",
            payout_id,
            payout.amount,
            fee
        );
        mutate_state(|s| {
            event::record_payout_dropped(s, payout_id);
            s.payouts_in_flight.remove(&payout_id);
        });
        return None;
    }

    let result = management::transfer_token(
        payout.ledger_canister_id,
        payout.receiver,
        payout.amount - fee,
    )
    .await;
    mutate_state(|s| {
        s.payouts_in_flight.remove(&payout_id);
    });
    match result {
        Ok(block_index) => {
            log!(
                INFO,
                "[process_payout] sent {} units on ledger {} to {} (payout {}, block {})",
                payout.amount - fee,
                payout.ledger_canister_id,
                payout.receiver,
                payout_id,
                block_index
            );
            mutate_state(|s| event::record_payout_sent(s, payout_id, block_index));
            Some(block_index)
        }
        Err(error) => {
            log!(
                DEBUG,
                "[process_payout] failed to send payout {} to {}: {:?}, will retry",
                payout_id,
                payout.receiver,
                error
            );
            schedule_payout_retry();
            None
        }
    }
}

/// Drains the payout queue, one transfer at a time. Reschedules itself
/// while anything remains queued.
pub async fn process_pending_payouts() {
    let _guard = match crate::guard::PayoutTimerGuard::new() {
        Some(guard) => guard,
        None => {
            log!(INFO, "[process_pending_payouts] double entry.");
            return;
        }
    };

    let pending: Vec<PayoutId> = read_state(|s| s.pending_payouts.keys().copied().collect());
    if pending.is_empty() {
        return;
    }
    log!(
        INFO,
        "[process_pending_payouts] processing {} pending payouts",
        pending.len()
    );
    for payout_id in pending {
        process_payout(payout_id).await;
    }

    if read_state(|s| !s.pending_payouts.is_empty()) {
        schedule_payout_retry();
    }
}

pub(crate) fn schedule_payout_retry() {
    ic_cdk_timers::set_timer(PAYOUT_RETRY_DELAY, || {
        ic_cdk::spawn(process_pending_payouts())
    });
}
