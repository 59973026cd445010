//! All inter-canister calls live here: price feed reads, vUSD movement on
//! the stable ledger, and collateral movement on the asset ledgers. The
//! engine canister is the stable ledger's minting account, so a transfer
//! from the engine mints vUSD and a transfer into the engine burns it.

use crate::oracle::PriceFeedData;
use crate::state::read_state;
use candid::{Nat, Principal};
use ic_cdk::api::call::RejectionCode;
use icrc_ledger_client_cdk::{CdkRuntime, ICRC1Client};
use icrc_ledger_types::icrc1::account::Account;
use icrc_ledger_types::icrc1::transfer::{TransferArg, TransferError};
use icrc_ledger_types::icrc2::transfer_from::{TransferFromArgs, TransferFromError};
use num_traits::ToPrimitive;
use std::fmt;

/// An error from a call to an external canister.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallError {
    method: String,
    reason: Reason,
}

impl CallError {
    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn reason(&self) -> &Reason {
        &self.reason
    }
}

impl fmt::Display for CallError {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "call '{}' failed: {}", self.method, self.reason)
    }
}

/// The reason for the call failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reason {
    /// The target canister's input queue is full.
    QueueIsFull,
    /// The call failed with an error.
    CanisterError(String),
    /// The target canister rejected the call.
    Rejected(String),
}

impl Reason {
    fn from_reject(code: RejectionCode, message: String) -> Self {
        match code {
            RejectionCode::SysTransient => Self::QueueIsFull,
            RejectionCode::CanisterReject => Self::Rejected(message),
            _ => Self::CanisterError(message),
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueIsFull => write!(fmt, "the canister queue is full"),
            Self::CanisterError(msg) => write!(fmt, "canister error: {}", msg),
            Self::Rejected(msg) => write!(fmt, "the canister rejected the call: {}", msg),
        }
    }
}

/// Reads the latest round from a price feed canister.
pub async fn fetch_price_data(feed: Principal) -> Result<PriceFeedData, CallError> {
    let result: Result<(PriceFeedData,), (RejectionCode, String)> =
        ic_cdk::api::call::call(feed, "latest_round_data", ()).await;
    match result {
        Ok((data,)) => Ok(data),
        Err((code, message)) => Err(CallError {
            method: "latest_round_data".to_string(),
            reason: Reason::from_reject(code, message),
        }),
    }
}

/// Mints `amount` vUSD to `to` by transferring from the minting account.
pub async fn mint_stable(amount: u128, to: Principal) -> Result<u64, TransferError> {
    let ledger = read_state(|s| s.stable_ledger_principal);
    transfer_token(ledger, to, amount).await
}

/// Pulls `amount` vUSD from `from` into the engine. Transfers into the
/// minting account are burns on the stable ledger.
pub async fn pull_stable_from(amount: u128, from: Principal) -> Result<u64, TransferFromError> {
    let ledger = read_state(|s| s.stable_ledger_principal);
    pull_token_from(ledger, from, amount).await
}

/// Moves tokens from the engine's custody to a recipient on any ledger.
pub async fn transfer_token(
    ledger: Principal,
    to: Principal,
    amount: u128,
) -> Result<u64, TransferError> {
    let client = ICRC1Client {
        runtime: CdkRuntime,
        ledger_canister_id: ledger,
    };
    let block_index = client
        .transfer(TransferArg {
            from_subaccount: None,
            to: Account {
                owner: to,
                subaccount: None,
            },
            fee: None,
            created_at_time: None,
            memo: None,
            amount: Nat::from(amount),
        })
        .await
        .map_err(|e| TransferError::GenericError {
            error_code: Nat::from(e.0.max(0) as u64),
            message: e.1,
        })??;

    Ok(block_index
        .0
        .to_u64()
        .expect("bug: block index does not fit in u64"))
}

/// Pulls tokens from a user into the engine's custody on any ledger.
pub async fn pull_token_from(
    ledger: Principal,
    from: Principal,
    amount: u128,
) -> Result<u64, TransferFromError> {
    let client = ICRC1Client {
        runtime: CdkRuntime,
        ledger_canister_id: ledger,
    };
    let engine_id = ic_cdk::id();
    let block_index = client
        .transfer_from(TransferFromArgs {
            spender_subaccount: None,
            from: Account {
                owner: from,
                subaccount: None,
            },
            to: Account {
                owner: engine_id,
                subaccount: None,
            },
            amount: Nat::from(amount),
            fee: None,
            created_at_time: None,
            memo: None,
        })
        .await
        .map_err(|e| TransferFromError::GenericError {
            error_code: Nat::from(e.0.max(0) as u64),
            message: e.1,
        })??;

    Ok(block_index
        .0
        .to_u64()
        .expect("bug: block index does not fit in u64"))
}
