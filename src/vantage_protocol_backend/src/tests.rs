use crate::event::{
    record_deposit, record_liquidation, record_mint, record_payout_sent, record_redeem, replay,
    Event,
};
use crate::numeric::{
    collateral_amount_from_usd, collateral_usd_value, mul_div, pow10, HealthFactor, E18, VUSD,
};
use crate::oracle::{verify_reading, PriceReading, STALENESS_WINDOW_NANOS};
use crate::state::{AssetId, State};
use crate::{compute_health_factor, InitArg, ProtocolError, MIN_HEALTH_FACTOR};
use assert_matches::assert_matches;
use candid::Principal;
use proptest::collection::vec as pvec;
use proptest::prelude::*;

const E8: u64 = 100_000_000;
const NOW: u64 = 1_700_000_000 * crate::SEC_NANOS;

fn principal(id: u8) -> Principal {
    Principal::self_authenticating([id; 32])
}

fn wrapped_token() -> AssetId {
    Principal::self_authenticating(b"wrapped-token-ledger")
}

fn wrapped_token_feed() -> Principal {
    Principal::self_authenticating(b"wrapped-token-feed")
}

fn native_token() -> AssetId {
    Principal::self_authenticating(b"native-token-ledger")
}

fn native_token_feed() -> Principal {
    Principal::self_authenticating(b"native-token-feed")
}

fn stable_ledger() -> Principal {
    Principal::self_authenticating(b"vusd-ledger")
}

fn init_arg() -> InitArg {
    InitArg {
        collateral_ledgers: vec![wrapped_token(), native_token()],
        price_feeds: vec![wrapped_token_feed(), native_token_feed()],
        collateral_decimals: vec![8, 18],
        stable_ledger_principal: stable_ledger(),
    }
}

fn set_price(state: &mut State, asset: AssetId, answer_e8: u64) {
    let round_id = state
        .last_prices
        .get(&asset)
        .map(|r| r.round_id + 1)
        .unwrap_or(1);
    state.last_prices.insert(
        asset,
        PriceReading {
            answer_e8,
            timestamp: NOW,
            round_id,
        },
    );
}

/// Engine state with the wrapped token at $2,000 and the native token at
/// $10.
fn test_state() -> State {
    let mut state = State::from(init_arg());
    set_price(&mut state, wrapped_token(), 2_000 * E8);
    set_price(&mut state, native_token(), 10 * E8);
    state
}

fn vusd(whole: u128) -> VUSD {
    VUSD::from(whole * E18)
}

#[test]
#[should_panic(expected = "same length")]
fn init_rejects_mismatched_lists() {
    let _ = State::from(InitArg {
        collateral_ledgers: vec![wrapped_token(), native_token()],
        price_feeds: vec![wrapped_token_feed()],
        collateral_decimals: vec![8, 18],
        stable_ledger_principal: stable_ledger(),
    });
}

#[test]
#[should_panic(expected = "duplicate collateral ledger")]
fn init_rejects_duplicate_assets() {
    let _ = State::from(InitArg {
        collateral_ledgers: vec![wrapped_token(), wrapped_token()],
        price_feeds: vec![wrapped_token_feed(), native_token_feed()],
        collateral_decimals: vec![8, 8],
        stable_ledger_principal: stable_ledger(),
    });
}

#[test]
fn usd_value_of_fifteen_tokens_at_two_thousand() {
    // 15 tokens at $2,000 are worth $30,000, regardless of the token's
    // own precision.
    assert_eq!(
        collateral_usd_value(15 * E8 as u128, 2_000 * E8, 8),
        Some(vusd(30_000))
    );
    assert_eq!(
        collateral_usd_value(15 * E18, 2_000 * E8, 18),
        Some(vusd(30_000))
    );
}

#[test]
fn valuation_truncates_toward_zero() {
    // A dust amount at a dust price quotes as zero rather than rounding up.
    assert_eq!(collateral_usd_value(1, 1, 18), Some(VUSD::ZERO));
    // Truncation drops the fractional quantum and never rounds up, in
    // either direction of the conversion.
    let usd = collateral_usd_value(1, 99_999_999, 11).unwrap();
    assert_eq!(usd, VUSD::from(9_999_999));
    assert_eq!(collateral_amount_from_usd(usd, 99_999_999, 11), Some(0));
}

#[test]
fn mul_div_rejects_zero_divisor_and_overflow() {
    assert_eq!(mul_div(1, 1, 0), None);
    assert_eq!(mul_div(u128::MAX, 2, 1), None);
    assert_eq!(mul_div(u128::MAX, 3, 3), Some(u128::MAX));
}

#[test]
fn health_factor_of_debt_free_account_is_max() {
    let mut state = test_state();
    state.add_collateral(principal(1), wrapped_token(), 5 * E8 as u128);
    assert_eq!(
        state.health_factor_of(&principal(1), NOW),
        Ok(HealthFactor::MAX)
    );
    // Same for an account that never existed.
    assert_eq!(
        state.health_factor_of(&principal(9), NOW),
        Ok(HealthFactor::MAX)
    );
}

#[test]
fn compute_health_factor_halves_collateral() {
    // $20,000 of collateral against 10,000 vUSD of debt is exactly at the
    // minimum: the threshold counts collateral at 50%.
    assert_eq!(
        compute_health_factor(vusd(20_000), vusd(10_000)),
        MIN_HEALTH_FACTOR
    );
    assert_eq!(
        compute_health_factor(vusd(20_000), vusd(5_000)),
        HealthFactor::new(2 * E18)
    );
    assert_eq!(compute_health_factor(VUSD::ZERO, VUSD::ZERO), HealthFactor::MAX);
}

#[test]
fn mint_up_to_half_of_collateral_value_succeeds() {
    let mut state = test_state();
    let owner = principal(1);
    state.add_collateral(owner, wrapped_token(), 10 * E8 as u128);

    // 10 tokens at $2,000 = $20,000; exactly half can be minted.
    assert_eq!(state.apply_mint(owner, vusd(10_000), NOW), Ok(()));
    assert_eq!(state.debt_of(&owner), vusd(10_000));
    assert_eq!(
        state.health_factor_of(&owner, NOW),
        Ok(MIN_HEALTH_FACTOR)
    );
}

#[test]
fn mint_one_unit_beyond_half_reverts() {
    let mut state = test_state();
    let owner = principal(1);
    state.add_collateral(owner, wrapped_token(), 10 * E8 as u128);

    assert_eq!(state.apply_mint(owner, vusd(10_000), NOW), Ok(()));
    assert_matches!(
        state.apply_mint(owner, VUSD::from(1), NOW),
        Err(ProtocolError::HealthFactorTooLow { health_factor }) if health_factor < E18
    );
    // The failed mint left no trace.
    assert_eq!(state.debt_of(&owner), vusd(10_000));
}

#[test]
fn minting_more_than_half_reports_the_computed_factor() {
    let mut state = test_state();
    let owner = principal(1);
    state.add_collateral(owner, wrapped_token(), 10 * E8 as u128);

    // Minting $15,000 against $20,000 of collateral would put the factor
    // at 10,000/15,000.
    let expected = mul_div(vusd(10_000).to_u128(), E18, vusd(15_000).to_u128()).unwrap();
    assert_matches!(
        state.apply_mint(owner, vusd(15_000), NOW),
        Err(ProtocolError::HealthFactorTooLow { health_factor }) if health_factor == expected
    );
    assert_eq!(state.debt_of(&owner), VUSD::ZERO);
    assert!(state.account(&owner).is_some());
}

#[test]
fn mint_without_collateral_reverts() {
    let mut state = test_state();
    assert_matches!(
        state.apply_mint(principal(1), vusd(1), NOW),
        Err(ProtocolError::HealthFactorTooLow { health_factor: 0 })
    );
    assert_eq!(state.account(&principal(1)), None);
}

#[test]
fn zero_amounts_are_rejected_uniformly() {
    let mut state = test_state();
    let owner = principal(1);
    state.add_collateral(owner, wrapped_token(), 10 * E8 as u128);

    assert_matches!(
        state.validate_deposit(&owner, &wrapped_token(), 0),
        Err(ProtocolError::ZeroAmount)
    );
    assert_matches!(
        state.apply_redeem(owner, wrapped_token(), 0, NOW),
        Err(ProtocolError::ZeroAmount)
    );
    assert_matches!(
        state.apply_mint(owner, VUSD::ZERO, NOW),
        Err(ProtocolError::ZeroAmount)
    );
    // An unhealthy target still rejects a zero cover before anything else
    // involving amounts happens.
    state.apply_mint(owner, vusd(10_000), NOW).unwrap();
    set_price(&mut state, wrapped_token(), 1_800 * E8);
    assert_matches!(
        state.check_liquidation(principal(2), owner, wrapped_token(), VUSD::ZERO, NOW),
        Err(ProtocolError::ZeroAmount)
    );
}

#[test]
fn deposit_rejects_unknown_assets() {
    let state = test_state();
    assert_matches!(
        state.validate_deposit(&principal(1), &principal(99), 1),
        Err(ProtocolError::UnknownCollateral { .. })
    );
}

#[test]
fn redeem_rejects_overdraw() {
    let mut state = test_state();
    let owner = principal(1);
    state.add_collateral(owner, wrapped_token(), E8 as u128);
    assert_matches!(
        state.apply_redeem(owner, wrapped_token(), 2 * E8 as u128, NOW),
        Err(ProtocolError::InsufficientCollateral { balance, requested, .. })
            if balance == E8 as u128 && requested == 2 * E8 as u128
    );
}

#[test]
fn redeem_that_breaks_health_factor_rolls_back() {
    let mut state = test_state();
    let owner = principal(1);
    state.add_collateral(owner, wrapped_token(), 10 * E8 as u128);
    state.apply_mint(owner, vusd(10_000), NOW).unwrap();

    assert_matches!(
        state.apply_redeem(owner, wrapped_token(), 1, NOW),
        Err(ProtocolError::HealthFactorTooLow { .. })
    );
    assert_eq!(
        state.collateral_balance(&owner, &wrapped_token()),
        10 * E8 as u128
    );
    assert!(state.pending_payouts.is_empty());
}

#[test]
fn redeem_of_unencumbered_collateral_queues_a_payout() {
    let mut state = test_state();
    let owner = principal(1);
    state.add_collateral(owner, wrapped_token(), 10 * E8 as u128);

    let payout_id = state
        .apply_redeem(owner, wrapped_token(), 10 * E8 as u128, NOW)
        .unwrap();
    let payout = state.pending_payouts.get(&payout_id).unwrap();
    assert_eq!(payout.receiver, owner);
    assert_eq!(payout.ledger_canister_id, wrapped_token());
    assert_eq!(payout.amount, 10 * E8 as u128);
    // The fully-zeroed account is gone, indistinguishable from one that
    // never existed.
    assert_eq!(state.account(&owner), None);
}

#[test]
fn redeem_with_stale_price_rolls_back() {
    let mut state = test_state();
    let owner = principal(1);
    state.add_collateral(owner, wrapped_token(), 10 * E8 as u128);
    state.apply_mint(owner, vusd(1_000), NOW).unwrap();

    let later = NOW + STALENESS_WINDOW_NANOS + 1;
    assert_matches!(
        state.apply_redeem(owner, wrapped_token(), E8 as u128, later),
        Err(ProtocolError::StalePrice { asset }) if asset == wrapped_token()
    );
    assert_eq!(
        state.collateral_balance(&owner, &wrapped_token()),
        10 * E8 as u128
    );
}

#[test]
fn burn_extinguishes_at_most_the_current_debt() {
    let mut state = test_state();
    let owner = principal(1);
    state.add_collateral(owner, wrapped_token(), 10 * E8 as u128);
    state.apply_mint(owner, vusd(4_000), NOW).unwrap();

    assert_eq!(state.apply_burn(&owner, vusd(1_000)), vusd(1_000));
    assert_eq!(state.debt_of(&owner), vusd(3_000));
    // A pull that raced a liquidation burns only what is left.
    assert_eq!(state.apply_burn(&owner, vusd(5_000)), vusd(3_000));
    assert_eq!(state.debt_of(&owner), VUSD::ZERO);
}

#[test]
fn decrease_debt_rejects_more_than_owed() {
    let mut state = test_state();
    let owner = principal(1);
    state.add_collateral(owner, wrapped_token(), 10 * E8 as u128);
    state.apply_mint(owner, vusd(100), NOW).unwrap();
    assert_matches!(
        state.decrease_debt(&owner, vusd(101)),
        Err(ProtocolError::InsufficientDebt { debt, requested })
            if debt == vusd(100).to_u128() && requested == vusd(101).to_u128()
    );
}

#[test]
fn stale_reading_is_rejected_at_the_window_edge() {
    let reading = PriceReading {
        answer_e8: 2_000 * E8,
        timestamp: NOW,
        round_id: 7,
    };
    let asset = wrapped_token();
    assert_eq!(
        verify_reading(&asset, &reading, NOW + STALENESS_WINDOW_NANOS),
        Ok(2_000 * E8)
    );
    assert_matches!(
        verify_reading(&asset, &reading, NOW + STALENESS_WINDOW_NANOS + 1),
        Err(ProtocolError::StalePrice { .. })
    );
}

#[test]
fn liquidation_of_healthy_account_is_rejected() {
    let mut state = test_state();
    let owner = principal(1);
    state.add_collateral(owner, wrapped_token(), 10 * E8 as u128);
    state.apply_mint(owner, vusd(9_000), NOW).unwrap();

    assert_matches!(
        state.check_liquidation(principal(2), owner, wrapped_token(), vusd(1_000), NOW),
        Err(ProtocolError::HealthFactorOk)
    );
}

#[test]
fn liquidation_seizes_collateral_plus_bonus_and_improves_health() {
    let mut state = test_state();
    let target = principal(1);
    let liquidator = principal(2);
    state.add_collateral(target, wrapped_token(), 10 * E8 as u128);
    state.apply_mint(target, vusd(10_000), NOW).unwrap();

    // $2,000 -> $1,800 pushes the factor to 0.9.
    set_price(&mut state, wrapped_token(), 1_800 * E8);
    let before = state.health_factor_of(&target, NOW).unwrap();
    assert!(before < MIN_HEALTH_FACTOR);

    let plan = state
        .check_liquidation(liquidator, target, wrapped_token(), vusd(5_000), NOW)
        .unwrap();
    // $5,000 at $1,800 is 2.77777777 tokens, plus the 10% bonus.
    assert_eq!(plan.collateral_seized, 277_777_777 + 27_777_777);
    assert_eq!(plan.target_health_before, before);
    assert!(plan.target_health_after > plan.target_health_before);

    let payout_id = state.apply_liquidation(&plan, NOW).unwrap();
    assert_eq!(state.debt_of(&target), vusd(5_000));
    assert_eq!(
        state.collateral_balance(&target, &wrapped_token()),
        10 * E8 as u128 - 305_555_554
    );
    let payout = state.pending_payouts.get(&payout_id).unwrap();
    assert_eq!(payout.receiver, liquidator);
    assert_eq!(payout.amount, 305_555_554);
    assert_eq!(
        state.health_factor_of(&target, NOW).unwrap(),
        plan.target_health_after
    );
}

#[test]
fn too_small_liquidation_of_deep_underwater_account_is_rejected() {
    let mut state = test_state();
    let target = principal(1);
    state.add_collateral(target, wrapped_token(), 10 * E8 as u128);
    state.apply_mint(target, vusd(10_000), NOW).unwrap();

    // At $1,000 the collateral is worth exactly the debt; seizing with a
    // bonus now costs the position more value than the debt it sheds.
    set_price(&mut state, wrapped_token(), 1_000 * E8);
    assert_matches!(
        state.check_liquidation(principal(2), target, wrapped_token(), vusd(1_000), NOW),
        Err(ProtocolError::HealthFactorNotImproved)
    );
}

#[test]
fn liquidation_seizing_more_than_the_balance_is_rejected() {
    let mut state = test_state();
    let target = principal(1);
    state.add_collateral(target, wrapped_token(), 10 * E8 as u128);
    state.apply_mint(target, vusd(10_000), NOW).unwrap();

    set_price(&mut state, wrapped_token(), 1_000 * E8);
    // Covering the full debt would seize 11 tokens against a balance of 10.
    assert_matches!(
        state.check_liquidation(principal(2), target, wrapped_token(), vusd(10_000), NOW),
        Err(ProtocolError::InsufficientCollateral { requested, balance, .. })
            if requested == 11 * E8 as u128 && balance == 10 * E8 as u128
    );
}

#[test]
fn self_liquidation_behaves_as_deleveraging() {
    let mut state = test_state();
    let owner = principal(1);
    state.add_collateral(owner, wrapped_token(), 10 * E8 as u128);
    state.apply_mint(owner, vusd(10_000), NOW).unwrap();

    set_price(&mut state, wrapped_token(), 1_800 * E8);
    let plan = state
        .check_liquidation(owner, owner, wrapped_token(), vusd(5_000), NOW)
        .unwrap();
    let payout_id = state.apply_liquidation(&plan, NOW).unwrap();
    assert_eq!(state.debt_of(&owner), vusd(5_000));
    assert_eq!(state.pending_payouts.get(&payout_id).unwrap().receiver, owner);
    assert!(state.health_factor_of(&owner, NOW).unwrap() >= MIN_HEALTH_FACTOR);
}

#[test]
fn indebted_liquidator_must_stay_healthy_itself() {
    let mut state = test_state();
    let target = principal(1);
    let liquidator = principal(2);
    state.add_collateral(target, wrapped_token(), 10 * E8 as u128);
    state.apply_mint(target, vusd(10_000), NOW).unwrap();
    state.add_collateral(liquidator, native_token(), 1_000 * E18);
    state.apply_mint(liquidator, vusd(5_000), NOW).unwrap();

    // The crash hits both positions; the broken liquidator is turned away.
    set_price(&mut state, wrapped_token(), 1_800 * E8);
    set_price(&mut state, native_token(), 5 * E8);
    assert_matches!(
        state.check_liquidation(liquidator, target, wrapped_token(), vusd(5_000), NOW),
        Err(ProtocolError::HealthFactorTooLow { .. })
    );
}

#[test]
fn event_replay_reconstructs_the_state() {
    use crate::storage::{events, record_event};

    record_event(&Event::Init(init_arg()));
    let mut state = State::from(init_arg());
    set_price(&mut state, wrapped_token(), 2_000 * E8);

    let owner = principal(1);
    let liquidator = principal(2);
    record_deposit(&mut state, owner, wrapped_token(), 10 * E8 as u128, 1);
    state.apply_mint(owner, vusd(8_000), NOW).unwrap();
    record_mint(owner, vusd(8_000), 2);
    let redeem_payout = record_redeem(&mut state, owner, wrapped_token(), E8 as u128 / 2, NOW)
        .expect("the redeem should pass the health gate");
    record_payout_sent(&mut state, redeem_payout, 3);

    set_price(&mut state, wrapped_token(), 1_500 * E8);
    let plan = state
        .check_liquidation(liquidator, owner, wrapped_token(), vusd(4_000), NOW)
        .unwrap();
    record_liquidation(&mut state, &plan, 4, NOW).unwrap();

    let replayed = replay(events().into_iter()).expect("the log should replay cleanly");
    state
        .check_semantically_eq(&replayed)
        .expect("the replayed state should match the live one");
    replayed.check_invariants().unwrap();
}

fn arb_amount_e8() -> impl Strategy<Value = u128> {
    1..(100 * E8 as u128)
}

fn arb_vusd() -> impl Strategy<Value = VUSD> {
    (1u128..50_000).prop_map(|n| VUSD::from(n * E18 / 10))
}

#[derive(Clone, Debug)]
enum Op {
    Deposit { actor: u8, amount: u128 },
    Mint { actor: u8, amount: VUSD },
    Redeem { actor: u8, amount: u128 },
    Burn { actor: u8, amount: VUSD },
}

fn arb_op() -> impl Strategy<Value = Op> {
    let actor = 1u8..4;
    prop_oneof![
        (actor.clone(), arb_amount_e8()).prop_map(|(actor, amount)| Op::Deposit { actor, amount }),
        (actor.clone(), arb_vusd()).prop_map(|(actor, amount)| Op::Mint { actor, amount }),
        (actor.clone(), arb_amount_e8()).prop_map(|(actor, amount)| Op::Redeem { actor, amount }),
        (actor, arb_vusd()).prop_map(|(actor, amount)| Op::Burn { actor, amount }),
    ]
}

proptest! {
    /// Round trip: converting an amount to USD and back never gains value
    /// and loses at most one price-quantum of the token.
    #[test]
    fn usd_round_trip_is_lossless_up_to_truncation(
        amount in 1u128..100_000_000_000_000_000,
        answer_e8 in 1u64..100_000_000_000,
        decimals in 0u8..19,
    ) {
        let usd = collateral_usd_value(amount, answer_e8, decimals).unwrap();
        let round_tripped = collateral_amount_from_usd(usd, answer_e8, decimals).unwrap();
        prop_assert!(round_tripped <= amount);
        let unit = pow10(decimals).unwrap();
        let scaled_price = answer_e8 as u128 * crate::numeric::ADDITIONAL_FEED_PRECISION;
        prop_assert!(amount - round_tripped <= unit / scaled_price + 1);
    }

    /// Solvency invariant: at a fixed price, no sequence of gated calls
    /// leaves an indebted account below the minimum health factor.
    #[test]
    fn no_call_sequence_breaks_the_health_invariant(ops in pvec(arb_op(), 1..80)) {
        let mut state = test_state();
        for op in ops {
            match op {
                Op::Deposit { actor, amount } => {
                    if state.validate_deposit(&principal(actor), &wrapped_token(), amount).is_ok() {
                        state.add_collateral(principal(actor), wrapped_token(), amount);
                    }
                }
                Op::Mint { actor, amount } => {
                    let _ = state.apply_mint(principal(actor), amount, NOW);
                }
                Op::Redeem { actor, amount } => {
                    let _ = state.apply_redeem(principal(actor), wrapped_token(), amount, NOW);
                }
                Op::Burn { actor, amount } => {
                    let requested = amount.min(state.debt_of(&principal(actor)));
                    if !requested.is_zero() {
                        let _ = state.apply_burn(&principal(actor), requested);
                    }
                }
            }
            for (owner, account) in &state.accounts {
                if !account.debt.is_zero() {
                    let health_factor = state.health_factor_of(owner, NOW).unwrap();
                    prop_assert!(
                        health_factor >= MIN_HEALTH_FACTOR,
                        "account {} ended below the minimum: {}",
                        owner,
                        health_factor
                    );
                }
            }
        }
        prop_assert!(state.check_invariants().is_ok());
    }

    /// Deposits only grow a balance, redeems only shrink it; mints only
    /// grow debt, burns only shrink it.
    #[test]
    fn balances_move_monotonically(
        deposit in arb_amount_e8(),
        redeem in arb_amount_e8(),
        mint in arb_vusd(),
        burn in arb_vusd(),
    ) {
        let mut state = test_state();
        let owner = principal(1);

        let balance_before = state.collateral_balance(&owner, &wrapped_token());
        state.add_collateral(owner, wrapped_token(), deposit);
        let after_deposit = state.collateral_balance(&owner, &wrapped_token());
        prop_assert!(after_deposit >= balance_before);

        let _ = state.apply_redeem(owner, wrapped_token(), redeem, NOW);
        prop_assert!(state.collateral_balance(&owner, &wrapped_token()) <= after_deposit);

        let debt_before = state.debt_of(&owner);
        let _ = state.apply_mint(owner, mint, NOW);
        let after_mint = state.debt_of(&owner);
        prop_assert!(after_mint >= debt_before);

        let _ = state.apply_burn(&owner, burn);
        prop_assert!(state.debt_of(&owner) <= after_mint);
    }

    /// A successful liquidation strictly improves the target's health
    /// factor, whatever the drop and cover are.
    #[test]
    fn liquidation_strictly_improves_target_health(
        dropped_price_e8 in (500 * E8 as u64)..(1_999 * E8 as u64),
        cover in 1u128..10_000,
    ) {
        let mut state = test_state();
        let target = principal(1);
        let liquidator = principal(2);
        state.add_collateral(target, wrapped_token(), 10 * E8 as u128);
        state.apply_mint(target, vusd(10_000), NOW).unwrap();

        set_price(&mut state, wrapped_token(), dropped_price_e8);
        let before = state.health_factor_of(&target, NOW).unwrap();
        prop_assume!(before < MIN_HEALTH_FACTOR);

        match state.check_liquidation(liquidator, target, wrapped_token(), vusd(cover), NOW) {
            Ok(plan) => {
                state.apply_liquidation(&plan, NOW).unwrap();
                let after = state.health_factor_of(&target, NOW).unwrap();
                prop_assert!(after > before);
            }
            Err(ProtocolError::HealthFactorNotImproved)
            | Err(ProtocolError::InsufficientCollateral { .. })
            | Err(ProtocolError::InsufficientDebt { .. }) => {}
            Err(other) => prop_assert!(false, "unexpected liquidation error: {:?}", other),
        }
    }
}
