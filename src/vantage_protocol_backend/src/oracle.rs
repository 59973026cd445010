//! Price feed adapter. Every consumer goes through [`verify_reading`] (via
//! `State::verified_answer`) so staleness is enforced in exactly one place.

use crate::logs::TRACE_ORACLE;
use crate::management;
use crate::numeric::UsdPrice;
use crate::state::{mutate_state, read_state, AssetId};
use crate::{ProtocolError, SEC_NANOS};
use candid::CandidType;
use ic_canister_log::log;
use serde::Deserialize;
use std::time::Duration;

/// How often the background timer refreshes every feed. Price-sensitive
/// operations refresh on demand when the cached reading is older than
/// [`PRICE_FRESHNESS_THRESHOLD_NANOS`], so this is a lazy sweep for
/// queries and the unhealthy-account scan.
pub const FETCHING_PRICES_INTERVAL: Duration = Duration::from_secs(300);

/// Maximum age of a cached reading before a price-sensitive operation
/// triggers an on-demand fetch.
pub const PRICE_FRESHNESS_THRESHOLD_NANOS: u64 = 30 * SEC_NANOS;

/// Maximum age of a feed's own `updated_at` before the reading is
/// untrusted and every valuation using it fails.
pub const STALENESS_WINDOW_NANOS: u64 = 3 * 60 * 60 * SEC_NANOS;

/// Raw answer of a price feed canister's `latest_round_data`. The engine
/// uses `answer` (8 fractional decimals) and `updated_at` (seconds).
#[derive(CandidType, Clone, Debug, Deserialize)]
pub struct PriceFeedData {
    pub round_id: u64,
    pub answer: u64,
    pub started_at: u64,
    pub updated_at: u64,
    pub answered_in_round: u64,
}

/// A normalized reading kept per asset. Never persisted: rebuilt from the
/// feeds after an upgrade.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PriceReading {
    pub answer_e8: u64,
    /// Feed's `updated_at`, converted to nanoseconds.
    pub timestamp: u64,
    pub round_id: u64,
}

impl PriceReading {
    pub fn price(&self) -> UsdPrice {
        UsdPrice::from_e8s(self.answer_e8)
    }
}

/// Rejects readings older than the staleness window; returns the usable
/// 8-decimal answer otherwise.
pub fn verify_reading(
    asset: &AssetId,
    reading: &PriceReading,
    now: u64,
) -> Result<u64, ProtocolError> {
    if now.saturating_sub(reading.timestamp) > STALENESS_WINDOW_NANOS {
        return Err(ProtocolError::StalePrice { asset: *asset });
    }
    Ok(reading.answer_e8)
}

/// Fetches the latest round from the asset's feed and stores it when it is
/// newer than the cached reading. Zero answers are discarded.
pub async fn refresh_price(asset: AssetId) {
    let feed = match read_state(|s| {
        s.collateral_assets
            .get(&asset)
            .map(|a| a.price_feed_canister_id)
    }) {
        Some(feed) => feed,
        None => return,
    };
    match management::fetch_price_data(feed).await {
        Ok(data) => {
            if data.answer == 0 {
                log!(
                    TRACE_ORACLE,
                    "[refresh_price] feed {} answered zero for {}, discarding round {}",
                    feed,
                    asset,
                    data.round_id
                );
                return;
            }
            let timestamp = data.updated_at.saturating_mul(SEC_NANOS);
            let stored = mutate_state(|s| match s.last_prices.get(&asset) {
                Some(previous) if previous.timestamp >= timestamp => false,
                _ => {
                    s.last_prices.insert(
                        asset,
                        PriceReading {
                            answer_e8: data.answer,
                            timestamp,
                            round_id: data.round_id,
                        },
                    );
                    true
                }
            });
            if stored {
                log!(
                    TRACE_ORACLE,
                    "[refresh_price] {} now at {} (round {}, updated_at {})",
                    asset,
                    UsdPrice::from_e8s(data.answer),
                    data.round_id,
                    data.updated_at
                );
            }
        }
        Err(error) => log!(
            TRACE_ORACLE,
            "[refresh_price] failed to call feed {} for {}: {}",
            feed,
            asset,
            error
        ),
    }
}

/// Background sweep over every registered feed, followed by the
/// undercollateralized-account scan.
pub async fn refresh_all_prices() {
    let _guard = match crate::guard::FetchPricesGuard::new() {
        Some(guard) => guard,
        None => return,
    };
    let assets: Vec<AssetId> = read_state(|s| s.collateral_assets.keys().copied().collect());
    for asset in assets {
        refresh_price(asset).await;
    }
    crate::check_accounts();
}

/// Makes sure each listed asset has a usable price before a
/// price-sensitive operation: refreshes on demand when the cache is older
/// than [`PRICE_FRESHNESS_THRESHOLD_NANOS`], then verifies the result.
pub async fn ensure_fresh_prices(assets: Vec<AssetId>) -> Result<(), ProtocolError> {
    for asset in assets {
        let needs_refresh = read_state(|s| match s.last_prices.get(&asset) {
            None => true,
            Some(reading) => {
                ic_cdk::api::time().saturating_sub(reading.timestamp)
                    > PRICE_FRESHNESS_THRESHOLD_NANOS
            }
        });
        if needs_refresh {
            log!(
                TRACE_ORACLE,
                "[ensure_fresh_prices] cached price for {} is missing or old, fetching on demand",
                asset
            );
            refresh_price(asset).await;
        }
        read_state(|s| s.verified_answer(&asset, ic_cdk::api::time()))?;
    }
    Ok(())
}
