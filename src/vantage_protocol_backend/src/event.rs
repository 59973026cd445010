use crate::logs::INFO;
use crate::numeric::VUSD;
use crate::state::{LiquidationPlan, PayoutId, PendingPayout, State};
use crate::storage::record_event;
use crate::{InitArg, ProtocolError, UpgradeArg};
use candid::{CandidType, Principal};
use ic_canister_log::log;
use serde::{Deserialize, Serialize};

/// The full history of successful state transitions. The stable log of
/// events is the only persistent storage; `replay` rebuilds the in-memory
/// state from it after an upgrade.
#[derive(CandidType, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    #[serde(rename = "init")]
    Init(InitArg),

    #[serde(rename = "upgrade")]
    Upgrade(UpgradeArg),

    #[serde(rename = "deposit")]
    Deposit {
        owner: Principal,
        asset: Principal,
        amount: u128,
        block_index: u64,
    },

    #[serde(rename = "redeem")]
    Redeem {
        owner: Principal,
        asset: Principal,
        amount: u128,
        payout_id: u64,
    },

    #[serde(rename = "mint")]
    Mint {
        owner: Principal,
        amount: u128,
        block_index: u64,
    },

    #[serde(rename = "burn")]
    Burn {
        owner: Principal,
        amount: u128,
        block_index: u64,
    },

    /// A burn pull exceeded the debt that was left by a concurrent
    /// liquidation; the difference goes back to the caller.
    #[serde(rename = "burn_refund_queued")]
    BurnRefundQueued {
        owner: Principal,
        amount: u128,
        payout_id: u64,
    },

    #[serde(rename = "liquidate")]
    Liquidate {
        liquidator: Principal,
        target: Principal,
        asset: Principal,
        debt_covered: u128,
        collateral_seized: u128,
        block_index: u64,
        payout_id: u64,
    },

    /// A liquidation could no longer be settled after the repayment pull;
    /// the pulled vUSD goes back to the liquidator.
    #[serde(rename = "liquidation_refund_queued")]
    LiquidationRefundQueued {
        liquidator: Principal,
        amount: u128,
        payout_id: u64,
    },

    #[serde(rename = "payout_sent")]
    PayoutSent { payout_id: u64, block_index: u64 },

    /// A payout not worth more than its ledger fee, removed from the queue.
    #[serde(rename = "payout_dropped")]
    PayoutDropped { payout_id: u64 },
}

impl Event {
    pub fn concerns(&self, principal: &Principal) -> bool {
        match self {
            Event::Init(_) | Event::Upgrade(_) => false,
            Event::Deposit { owner, .. }
            | Event::Redeem { owner, .. }
            | Event::Mint { owner, .. }
            | Event::Burn { owner, .. }
            | Event::BurnRefundQueued { owner, .. } => owner == principal,
            Event::Liquidate {
                liquidator, target, ..
            } => liquidator == principal || target == principal,
            Event::LiquidationRefundQueued { liquidator, .. } => liquidator == principal,
            Event::PayoutSent { .. } | Event::PayoutDropped { .. } => false,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ReplayLogError {
    /// There are no events in the log.
    EmptyLog,
    InconsistentLog(String),
}

/// Rebuilds the state from an event log. The first event must be `Init`.
pub fn replay(mut events: impl Iterator<Item = Event>) -> Result<State, ReplayLogError> {
    let mut state = match events.next() {
        Some(Event::Init(args)) => State::from(args),
        Some(event) => {
            return Err(ReplayLogError::InconsistentLog(format!(
                "the log does not start with an init event: {event:?}"
            )))
        }
        None => return Err(ReplayLogError::EmptyLog),
    };
    for event in events {
        apply(&mut state, event)?;
    }
    Ok(state)
}

fn apply(state: &mut State, event: Event) -> Result<(), ReplayLogError> {
    match event {
        Event::Init(_) => {
            return Err(ReplayLogError::InconsistentLog(
                "found an init event past the start of the log".to_string(),
            ))
        }
        Event::Upgrade(_) => {}
        Event::Deposit {
            owner,
            asset,
            amount,
            ..
        } => {
            state.add_collateral(owner, asset, amount);
        }
        Event::Redeem {
            owner,
            asset,
            amount,
            payout_id,
        } => {
            let ledger = replayed_asset_ledger(state, &asset)?;
            state
                .remove_collateral(&owner, &asset, amount)
                .map_err(|e| inconsistent("redeem", &e))?;
            state.restore_payout(
                payout_id,
                PendingPayout {
                    receiver: owner,
                    ledger_canister_id: ledger,
                    amount,
                    created_at: 0,
                },
            );
        }
        Event::Mint { owner, amount, .. } => {
            state
                .increase_debt(owner, VUSD::from(amount))
                .map_err(|e| inconsistent("mint", &e))?;
        }
        Event::Burn { owner, amount, .. } => {
            state
                .decrease_debt(&owner, VUSD::from(amount))
                .map_err(|e| inconsistent("burn", &e))?;
        }
        Event::BurnRefundQueued {
            owner,
            amount,
            payout_id,
        } => {
            state.restore_payout(
                payout_id,
                PendingPayout {
                    receiver: owner,
                    ledger_canister_id: state.stable_ledger_principal,
                    amount,
                    created_at: 0,
                },
            );
        }
        Event::Liquidate {
            liquidator,
            target,
            asset,
            debt_covered,
            collateral_seized,
            payout_id,
            ..
        } => {
            let ledger = replayed_asset_ledger(state, &asset)?;
            state
                .remove_collateral(&target, &asset, collateral_seized)
                .map_err(|e| inconsistent("liquidate", &e))?;
            state
                .decrease_debt(&target, VUSD::from(debt_covered))
                .map_err(|e| inconsistent("liquidate", &e))?;
            state.restore_payout(
                payout_id,
                PendingPayout {
                    receiver: liquidator,
                    ledger_canister_id: ledger,
                    amount: collateral_seized,
                    created_at: 0,
                },
            );
        }
        Event::LiquidationRefundQueued {
            liquidator,
            amount,
            payout_id,
        } => {
            state.restore_payout(
                payout_id,
                PendingPayout {
                    receiver: liquidator,
                    ledger_canister_id: state.stable_ledger_principal,
                    amount,
                    created_at: 0,
                },
            );
        }
        Event::PayoutSent { payout_id, .. } | Event::PayoutDropped { payout_id } => {
            state.pending_payouts.remove(&payout_id);
        }
    }
    Ok(())
}

fn replayed_asset_ledger(state: &State, asset: &Principal) -> Result<Principal, ReplayLogError> {
    state
        .get_asset(asset)
        .map(|a| a.ledger_canister_id)
        .map_err(|e| inconsistent("asset lookup", &e))
}

fn inconsistent(context: &str, error: &ProtocolError) -> ReplayLogError {
    ReplayLogError::InconsistentLog(format!("{context} replay failed: {error:?}"))
}

// --- Record helpers. Each writes the event to stable storage at the point
// --- where the corresponding state change is final.

pub fn record_deposit(
    state: &mut State,
    owner: Principal,
    asset: Principal,
    amount: u128,
    block_index: u64,
) {
    record_event(&Event::Deposit {
        owner,
        asset,
        amount,
        block_index,
    });
    state.add_collateral(owner, asset, amount);
}

pub fn record_redeem(
    state: &mut State,
    owner: Principal,
    asset: Principal,
    amount: u128,
    now: u64,
) -> Result<PayoutId, ProtocolError> {
    let payout_id = state.apply_redeem(owner, asset, amount, now)?;
    record_event(&Event::Redeem {
        owner,
        asset,
        amount,
        payout_id,
    });
    Ok(payout_id)
}

/// The debt increase was already applied (and health-gated) before the
/// external mint; only the event remains to be written.
pub fn record_mint(owner: Principal, amount: VUSD, block_index: u64) {
    record_event(&Event::Mint {
        owner,
        amount: amount.to_u128(),
        block_index,
    });
}

/// Settles a burn after the vUSD pull succeeded. Returns how much debt was
/// actually extinguished; any excess is queued back to the owner.
pub fn record_burn(
    state: &mut State,
    owner: Principal,
    requested: VUSD,
    block_index: u64,
    now: u64,
) -> VUSD {
    let burned = state.apply_burn(&owner, requested);
    if !burned.is_zero() {
        record_event(&Event::Burn {
            owner,
            amount: burned.to_u128(),
            block_index,
        });
    }
    if burned < requested {
        let refund = requested - burned;
        let stable_ledger = state.stable_ledger_principal;
        let payout_id = state.queue_payout(owner, stable_ledger, refund.to_u128(), now);
        record_event(&Event::BurnRefundQueued {
            owner,
            amount: refund.to_u128(),
            payout_id,
        });
        log!(
            INFO,
            "[record_burn] {} repaid {} beyond the remaining debt, refunding via payout {}",
            owner,
            refund,
            payout_id
        );
    }
    burned
}

pub fn record_liquidation(
    state: &mut State,
    plan: &LiquidationPlan,
    block_index: u64,
    now: u64,
) -> Result<PayoutId, ProtocolError> {
    let payout_id = state.apply_liquidation(plan, now)?;
    record_event(&Event::Liquidate {
        liquidator: plan.liquidator,
        target: plan.target,
        asset: plan.asset,
        debt_covered: plan.debt_to_cover.to_u128(),
        collateral_seized: plan.collateral_seized,
        block_index,
        payout_id,
    });
    Ok(payout_id)
}

pub fn record_liquidation_refund(
    state: &mut State,
    liquidator: Principal,
    amount: VUSD,
    now: u64,
) -> PayoutId {
    let stable_ledger = state.stable_ledger_principal;
    let payout_id = state.queue_payout(liquidator, stable_ledger, amount.to_u128(), now);
    record_event(&Event::LiquidationRefundQueued {
        liquidator,
        amount: amount.to_u128(),
        payout_id,
    });
    payout_id
}

pub fn record_payout_sent(state: &mut State, payout_id: PayoutId, block_index: u64) {
    record_event(&Event::PayoutSent {
        payout_id,
        block_index,
    });
    state.pending_payouts.remove(&payout_id);
}

pub fn record_payout_dropped(state: &mut State, payout_id: PayoutId) {
    record_event(&Event::PayoutDropped { payout_id });
    state.pending_payouts.remove(&payout_id);
}
