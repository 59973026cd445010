//! Mock price feed canister for local deployments and integration tests.
//! Serves `latest_round_data` with an answer settable through update calls.

use ic_cdk_macros::{init, query, update};
use std::cell::RefCell;
use vantage_protocol_backend::oracle::PriceFeedData;

#[derive(Clone, Copy, Default)]
struct FeedState {
    answer_e8: u64,
    round_id: u64,
    started_at: u64,
    updated_at: u64,
}

thread_local! {
    static FEED: RefCell<FeedState> = RefCell::default();
}

fn now_seconds() -> u64 {
    ic_cdk::api::time() / 1_000_000_000
}

#[init]
fn init(initial_answer_e8: u64) {
    let now = now_seconds();
    FEED.with(|f| {
        *f.borrow_mut() = FeedState {
            answer_e8: initial_answer_e8,
            round_id: 1,
            started_at: now,
            updated_at: now,
        }
    });
}

/// Publishes a new round with the given 8-decimal answer.
#[update]
fn set_answer(answer_e8: u64) {
    let now = now_seconds();
    FEED.with(|f| {
        let mut feed = f.borrow_mut();
        feed.answer_e8 = answer_e8;
        feed.round_id += 1;
        feed.started_at = now;
        feed.updated_at = now;
    });
}

/// Backdates the current round, for exercising staleness handling.
#[update]
fn set_updated_at(updated_at: u64) {
    FEED.with(|f| f.borrow_mut().updated_at = updated_at);
}

#[query]
fn latest_round_data() -> PriceFeedData {
    FEED.with(|f| {
        let feed = f.borrow();
        PriceFeedData {
            round_id: feed.round_id,
            answer: feed.answer_e8,
            started_at: feed.started_at,
            updated_at: feed.updated_at,
            answered_in_round: feed.round_id,
        }
    })
}
