//! Helper functions for testing purposes.
//! These functions should only be available in test builds.

use candid::Principal;
use ic_cdk_macros::update;

use crate::logs::INFO;
use crate::oracle::PriceReading;
use crate::state::mutate_state;
use ic_canister_log::log;

/// Set a collateral asset's price directly, bypassing the feed.
/// This method is only intended for use in tests.
#[cfg(any(test, feature = "test_endpoints"))]
#[update]
pub fn test_set_price(asset: Principal, answer_e8: u64) {
    let caller = ic_cdk::caller();
    if caller != ic_cdk::id() && caller != Principal::management_canister() {
        ic_cdk::trap("Only the management canister or self can call test methods");
    }

    log!(
        INFO,
        "[test_set_price] setting the price of {} to {} e8s",
        asset,
        answer_e8
    );

    let now = ic_cdk::api::time();
    mutate_state(|s| {
        let round_id = s
            .last_prices
            .get(&asset)
            .map(|r| r.round_id + 1)
            .unwrap_or(1);
        s.last_prices.insert(
            asset,
            PriceReading {
                answer_e8,
                timestamp: now,
                round_id,
            },
        );
    });
}
