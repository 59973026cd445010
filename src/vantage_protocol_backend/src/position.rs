//! Deposit/redeem and mint/burn operations. Ordering discipline: pulls
//! (deposit funds, burn funds) happen before the dependent ledger credit;
//! debits (redeem) are applied together with their health gate before the
//! outbound transfer is attempted.

use crate::event::{record_burn, record_deposit, record_mint, record_redeem};
use crate::guard::GuardPrincipal;
use crate::logs::INFO;
use crate::numeric::{HealthFactor, VUSD};
use crate::state::{mutate_state, read_state, AssetId};
use crate::{management, oracle, ProtocolError, RedeemSuccess};
use candid::{CandidType, Principal};
use ic_canister_log::log;
use serde::{Deserialize, Serialize};

#[derive(CandidType, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidCollateralEntry {
    pub asset: Principal,
    pub amount: u128,
}

#[derive(CandidType, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidAccount {
    pub owner: Principal,
    pub collateral: Vec<CandidCollateralEntry>,
    pub debt: u128,
    /// `None` when some held asset has no usable price right now.
    pub collateral_value: Option<u128>,
    pub health_factor: Option<u128>,
}

/// Assets whose prices an operation on `owner`'s position depends on:
/// everything the account holds, plus any extra the operation touches.
pub(crate) fn price_sensitive_assets(owner: &Principal, extra: Option<AssetId>) -> Vec<AssetId> {
    let mut assets: Vec<AssetId> = read_state(|s| {
        s.account(owner)
            .map(|a| a.collateral.keys().copied().collect())
            .unwrap_or_default()
    });
    if let Some(asset) = extra {
        if !assets.contains(&asset) {
            assets.push(asset);
        }
    }
    assets
}

pub async fn deposit_collateral(
    asset: AssetId,
    amount: u128,
) -> Result<u64, ProtocolError> {
    let caller = ic_cdk::api::caller();
    let _guard = GuardPrincipal::new(caller, "deposit_collateral")?;
    deposit_inner(caller, asset, amount).await
}

async fn deposit_inner(
    caller: Principal,
    asset: AssetId,
    amount: u128,
) -> Result<u64, ProtocolError> {
    read_state(|s| s.validate_deposit(&caller, &asset, amount))?;
    let health_before = read_state(|s| s.health_factor_of(&caller, ic_cdk::api::time()).ok());

    let block_index = management::pull_token_from(asset, caller, amount)
        .await
        .map_err(ProtocolError::TransferFromError)?;
    mutate_state(|s| record_deposit(s, caller, asset, amount, block_index));
    log!(
        INFO,
        "[deposit_collateral] {} deposited {} units of {} (block {})",
        caller,
        amount,
        asset,
        block_index
    );

    // A deposit can only improve the health factor; verified defensively,
    // never a failure condition.
    if let (Some(before), Ok(after)) = (
        health_before,
        read_state(|s| s.health_factor_of(&caller, ic_cdk::api::time())),
    ) {
        if after < before {
            log!(
                INFO,
                "[deposit_collateral] BUG: health factor of {} dropped from {} to {} on a deposit",
                caller,
                before,
                after
            );
        }
    }
    Ok(block_index)
}

pub async fn redeem_collateral(
    asset: AssetId,
    amount: u128,
) -> Result<RedeemSuccess, ProtocolError> {
    let caller = ic_cdk::api::caller();
    let _guard = GuardPrincipal::new(caller, "redeem_collateral")?;
    redeem_inner(caller, asset, amount).await
}

async fn redeem_inner(
    caller: Principal,
    asset: AssetId,
    amount: u128,
) -> Result<RedeemSuccess, ProtocolError> {
    if amount == 0 {
        return Err(ProtocolError::ZeroAmount);
    }
    read_state(|s| s.get_asset(&asset).map(|_| ()))?;
    oracle::ensure_fresh_prices(price_sensitive_assets(&caller, Some(asset))).await?;

    let now = ic_cdk::api::time();
    let payout_id = mutate_state(|s| record_redeem(s, caller, asset, amount, now))?;
    log!(
        INFO,
        "[redeem_collateral] {} redeemed {} units of {} (payout {})",
        caller,
        amount,
        asset,
        payout_id
    );
    let block_index = crate::process_payout(payout_id).await;
    Ok(RedeemSuccess {
        payout_id,
        block_index,
    })
}

pub async fn mint_stable(amount: u128) -> Result<u64, ProtocolError> {
    let caller = ic_cdk::api::caller();
    let _guard = GuardPrincipal::new(caller, "mint_stable")?;
    mint_inner(caller, VUSD::from(amount)).await
}

async fn mint_inner(caller: Principal, amount: VUSD) -> Result<u64, ProtocolError> {
    if amount.is_zero() {
        return Err(ProtocolError::ZeroAmount);
    }
    oracle::ensure_fresh_prices(price_sensitive_assets(&caller, None)).await?;

    let now = ic_cdk::api::time();
    mutate_state(|s| s.apply_mint(caller, amount, now))?;
    match management::mint_stable(amount.to_u128(), caller).await {
        Ok(block_index) => {
            record_mint(caller, amount, block_index);
            log!(
                INFO,
                "[mint_stable] {} minted {} (block {})",
                caller,
                amount,
                block_index
            );
            Ok(block_index)
        }
        Err(error) => {
            mutate_state(|s| s.revert_mint(&caller, amount));
            log!(
                INFO,
                "[mint_stable] ledger refused to mint {} for {}: {:?}",
                amount,
                caller,
                error
            );
            Err(ProtocolError::TransferError(error))
        }
    }
}

pub async fn burn_stable(amount: u128) -> Result<u64, ProtocolError> {
    let caller = ic_cdk::api::caller();
    let _guard = GuardPrincipal::new(caller, "burn_stable")?;
    burn_inner(caller, VUSD::from(amount)).await
}

async fn burn_inner(caller: Principal, amount: VUSD) -> Result<u64, ProtocolError> {
    if amount.is_zero() {
        return Err(ProtocolError::ZeroAmount);
    }
    let debt = read_state(|s| s.debt_of(&caller));
    if amount > debt {
        return Err(ProtocolError::InsufficientDebt {
            debt: debt.to_u128(),
            requested: amount.to_u128(),
        });
    }

    let block_index = management::pull_stable_from(amount.to_u128(), caller)
        .await
        .map_err(ProtocolError::TransferFromError)?;
    let now = ic_cdk::api::time();
    let burned = mutate_state(|s| record_burn(s, caller, amount, block_index, now));
    log!(
        INFO,
        "[burn_stable] {} burned {} against their debt (block {})",
        caller,
        burned,
        block_index
    );
    if burned < amount {
        // The excess was queued back to the caller; try to deliver it now.
        crate::process_pending_payouts().await;
    }
    Ok(block_index)
}

/// Deposits and mints in one call, removing the window in which the
/// deposit exists without its debt being gated.
pub async fn deposit_collateral_and_mint(
    asset: AssetId,
    amount: u128,
    mint_amount: u128,
) -> Result<u64, ProtocolError> {
    let caller = ic_cdk::api::caller();
    let _guard = GuardPrincipal::new(caller, "deposit_collateral_and_mint")?;
    deposit_inner(caller, asset, amount).await?;
    mint_inner(caller, VUSD::from(mint_amount)).await
}

/// Burns and then redeems under a single guard, so no intermediate state
/// with the old debt and the reduced collateral is ever observable.
pub async fn redeem_collateral_and_burn(
    asset: AssetId,
    amount: u128,
    burn_amount: u128,
) -> Result<RedeemSuccess, ProtocolError> {
    let caller = ic_cdk::api::caller();
    let _guard = GuardPrincipal::new(caller, "redeem_collateral_and_burn")?;
    burn_inner(caller, VUSD::from(burn_amount)).await?;
    redeem_inner(caller, asset, amount).await
}

/// Account view with best-effort valuation at current verified prices.
pub fn candid_account(owner: Principal, now: u64) -> Option<CandidAccount> {
    read_state(|s| {
        let account = s.account(&owner)?;
        let collateral_value = s.account_collateral_value(account, now).ok();
        let health_factor = match collateral_value {
            Some(value) if !account.debt.is_zero() => {
                Some(crate::compute_health_factor(value, account.debt).to_u128())
            }
            Some(_) => Some(HealthFactor::MAX.to_u128()),
            None if account.debt.is_zero() => Some(HealthFactor::MAX.to_u128()),
            None => None,
        };
        Some(CandidAccount {
            owner,
            collateral: account
                .collateral
                .iter()
                .map(|(asset, amount)| CandidCollateralEntry {
                    asset: *asset,
                    amount: *amount,
                })
                .collect(),
            debt: account.debt.to_u128(),
            collateral_value: collateral_value.map(|v| v.to_u128()),
            health_factor,
        })
    })
}
