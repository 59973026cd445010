//! Forced unwinding of undercollateralized positions. A liquidator repays
//! part of a target's vUSD debt and receives the USD-equivalent collateral
//! plus a bonus. Every gate is evaluated against the prospective state
//! before the repayment is pulled; the seized collateral leaves through
//! the payout queue.

use crate::event::{record_liquidation, record_liquidation_refund};
use crate::guard::GuardPrincipal;
use crate::logs::INFO;
use crate::numeric::VUSD;
use crate::state::{mutate_state, read_state, AssetId, PayoutId};
use crate::{management, oracle, position, LiquidationSuccess, ProtocolError};
use candid::Principal;
use ic_canister_log::log;

pub async fn liquidate(
    asset: AssetId,
    target: Principal,
    debt_to_cover: u128,
) -> Result<LiquidationSuccess, ProtocolError> {
    let caller = ic_cdk::api::caller();
    let _guard = GuardPrincipal::new(caller, "liquidate")?;
    liquidate_inner(caller, asset, target, VUSD::from(debt_to_cover)).await
}

async fn liquidate_inner(
    liquidator: Principal,
    asset: AssetId,
    target: Principal,
    debt_to_cover: VUSD,
) -> Result<LiquidationSuccess, ProtocolError> {
    // The target's health and the seizure conversion both need usable
    // prices; so does the liquidator's own gate when it carries debt.
    let mut assets = position::price_sensitive_assets(&target, Some(asset));
    for extra in position::price_sensitive_assets(&liquidator, None) {
        if !assets.contains(&extra) {
            assets.push(extra);
        }
    }
    oracle::ensure_fresh_prices(assets).await?;

    let now = ic_cdk::api::time();
    let plan = read_state(|s| s.check_liquidation(liquidator, target, asset, debt_to_cover, now))?;
    log!(
        INFO,
        "[liquidate] {} covering {} of {}'s debt: seizing {} units of {}, health {} -> {}",
        liquidator,
        plan.debt_to_cover,
        target,
        plan.collateral_seized,
        asset,
        plan.target_health_before,
        plan.target_health_after
    );

    // Pull the repayment; a transfer into the minting account burns it.
    let block_index = management::pull_stable_from(debt_to_cover.to_u128(), liquidator)
        .await
        .map_err(ProtocolError::TransferFromError)?;

    let now = ic_cdk::api::time();
    let settled: Result<PayoutId, (ProtocolError, PayoutId)> =
        mutate_state(|s| match record_liquidation(s, &plan, block_index, now) {
            Ok(payout_id) => Ok(payout_id),
            Err(error) => {
                // The target's position moved while the pull was in
                // flight; the repayment goes back to the liquidator.
                let refund_id = record_liquidation_refund(s, liquidator, debt_to_cover, now);
                Err((error, refund_id))
            }
        });

    match settled {
        Ok(payout_id) => {
            let payout_block = crate::process_payout(payout_id).await;
            Ok(LiquidationSuccess {
                collateral_seized: plan.collateral_seized,
                payout_id,
                block_index: payout_block,
            })
        }
        Err((error, refund_id)) => {
            log!(
                INFO,
                "[liquidate] settling against {} failed ({:?}), refunding {} via payout {}",
                target,
                error,
                debt_to_cover,
                refund_id
            );
            crate::process_payout(refund_id).await;
            Err(error)
        }
    }
}
