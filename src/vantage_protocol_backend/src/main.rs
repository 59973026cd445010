use candid::{candid_method, Principal};
use candid_parser::utils::service_equal;
use candid_parser::utils::CandidSource;
use ic_canister_log::log;
use ic_cdk_macros::{init, post_upgrade, query, update};
use vantage_protocol_backend::event::Event;
use vantage_protocol_backend::logs::{LogRecord, Priority, INFO};
use vantage_protocol_backend::position::CandidAccount;
use vantage_protocol_backend::state::{read_state, replace_state, State};
use vantage_protocol_backend::{
    liquidation, oracle, position, CandidCollateralAsset, CandidPayout, GetEventsArg,
    LiquidationSuccess, ProtocolArg, ProtocolError, ProtocolStatus, RedeemSuccess,
};

#[cfg(feature = "self_check")]
fn ok_or_die(result: Result<(), String>) {
    if let Err(msg) = result {
        ic_cdk::println!("{}", msg);
        ic_cdk::trap(&msg);
    }
}

/// Checks that the engine state is internally consistent and equal to the
/// state recovered by replaying the event log.
#[cfg(feature = "self_check")]
fn check_invariants() -> Result<(), String> {
    use vantage_protocol_backend::event::replay;
    use vantage_protocol_backend::storage;

    read_state(|s| {
        s.check_invariants()?;

        let events: Vec<_> = storage::events();
        let recovered_state = replay(events.clone().into_iter())
            .unwrap_or_else(|e| panic!("failed to replay log {:?}: {:?}", events, e));

        recovered_state.check_invariants()?;
        s.check_semantically_eq(&recovered_state)?;

        Ok(())
    })
}

fn check_postcondition<T>(t: T) -> T {
    #[cfg(feature = "self_check")]
    ok_or_die(check_invariants());
    t
}

fn validate_caller() -> Result<(), ProtocolError> {
    if ic_cdk::caller() == Principal::anonymous() {
        return Err(ProtocolError::AnonymousCallerNotAllowed);
    }
    Ok(())
}

fn setup_timers() {
    ic_cdk_timers::set_timer_interval(oracle::FETCHING_PRICES_INTERVAL, || {
        ic_cdk::spawn(oracle::refresh_all_prices())
    });
    ic_cdk_timers::set_timer_interval(vantage_protocol_backend::PAYOUT_SWEEP_INTERVAL, || {
        ic_cdk::spawn(vantage_protocol_backend::process_pending_payouts())
    });
}

fn main() {}

#[candid_method(init)]
#[init]
fn init(arg: ProtocolArg) {
    match arg {
        ProtocolArg::Init(init_arg) => {
            log!(INFO, "[init] initialized the engine with args: {:?}", init_arg);
            vantage_protocol_backend::storage::record_event(&Event::Init(init_arg.clone()));
            replace_state(State::from(init_arg));
        }
        ProtocolArg::Upgrade(_) => ic_cdk::trap("expected Init got Upgrade"),
    }
    setup_timers();
}

#[post_upgrade]
fn post_upgrade(arg: ProtocolArg) {
    use vantage_protocol_backend::event::replay;
    use vantage_protocol_backend::storage::{count_events, events, record_event};

    let start = ic_cdk::api::instruction_counter();

    log!(INFO, "[upgrade]: replaying {} events", count_events());

    match arg {
        ProtocolArg::Init(_) => ic_cdk::trap("expected Upgrade got Init"),
        ProtocolArg::Upgrade(upgrade_arg) => {
            record_event(&Event::Upgrade(upgrade_arg));
        }
    }

    let state = replay(events().into_iter()).unwrap_or_else(|e| {
        ic_cdk::trap(&format!(
            "[upgrade]: failed to replay the event log: {:?}",
            e
        ))
    });

    replace_state(state);

    let end = ic_cdk::api::instruction_counter();
    log!(
        INFO,
        "[upgrade]: replaying events consumed {} instructions",
        end - start
    );

    setup_timers();
}

#[candid_method(update)]
#[update]
async fn deposit_collateral(asset: Principal, amount: u128) -> Result<u64, ProtocolError> {
    validate_caller()?;
    check_postcondition(position::deposit_collateral(asset, amount).await)
}

#[candid_method(update)]
#[update]
async fn redeem_collateral(
    asset: Principal,
    amount: u128,
) -> Result<RedeemSuccess, ProtocolError> {
    validate_caller()?;
    check_postcondition(position::redeem_collateral(asset, amount).await)
}

#[candid_method(update)]
#[update]
async fn mint_stable(amount: u128) -> Result<u64, ProtocolError> {
    validate_caller()?;
    check_postcondition(position::mint_stable(amount).await)
}

#[candid_method(update)]
#[update]
async fn burn_stable(amount: u128) -> Result<u64, ProtocolError> {
    validate_caller()?;
    check_postcondition(position::burn_stable(amount).await)
}

#[candid_method(update)]
#[update]
async fn deposit_collateral_and_mint(
    asset: Principal,
    amount: u128,
    mint_amount: u128,
) -> Result<u64, ProtocolError> {
    validate_caller()?;
    check_postcondition(position::deposit_collateral_and_mint(asset, amount, mint_amount).await)
}

#[candid_method(update)]
#[update]
async fn redeem_collateral_and_burn(
    asset: Principal,
    amount: u128,
    burn_amount: u128,
) -> Result<RedeemSuccess, ProtocolError> {
    validate_caller()?;
    check_postcondition(position::redeem_collateral_and_burn(asset, amount, burn_amount).await)
}

#[candid_method(update)]
#[update]
async fn liquidate(
    asset: Principal,
    target: Principal,
    debt_to_cover: u128,
) -> Result<LiquidationSuccess, ProtocolError> {
    validate_caller()?;
    check_postcondition(liquidation::liquidate(asset, target, debt_to_cover).await)
}

#[candid_method(update)]
#[update]
async fn retry_payout(payout_id: u64) -> Result<u64, ProtocolError> {
    validate_caller()?;
    let caller = ic_cdk::caller();
    let is_receiver = read_state(|s| {
        s.pending_payouts
            .get(&payout_id)
            .map(|payout| payout.receiver == caller)
            .unwrap_or(false)
    });
    if !is_receiver {
        return Err(ProtocolError::GenericError(
            "no pending payout with this id for the caller".to_string(),
        ));
    }
    match vantage_protocol_backend::process_payout(payout_id).await {
        Some(block_index) => check_postcondition(Ok(block_index)),
        None => Err(ProtocolError::TemporarilyUnavailable(
            "the payout could not be delivered yet, a retry is scheduled".to_string(),
        )),
    }
}

#[candid_method(query)]
#[query]
fn get_protocol_status() -> ProtocolStatus {
    read_state(|s| ProtocolStatus {
        total_debt: s.total_debt().to_u128(),
        total_collateral_value: s.total_collateral_value_estimate().to_u128(),
        account_count: s.accounts.len() as u64,
        pending_payout_count: s.pending_payouts.len() as u64,
    })
}

#[candid_method(query)]
#[query]
fn get_collateral_assets() -> Vec<CandidCollateralAsset> {
    read_state(|s| {
        s.collateral_assets
            .values()
            .map(|asset| {
                let reading = s.last_prices.get(&asset.ledger_canister_id);
                CandidCollateralAsset {
                    ledger_canister_id: asset.ledger_canister_id,
                    price_feed_canister_id: asset.price_feed_canister_id,
                    decimals: asset.decimals,
                    last_price: reading.map(|r| r.price().to_f64()),
                    last_price_timestamp: reading.map(|r| r.timestamp),
                }
            })
            .collect()
    })
}

#[candid_method(query)]
#[query]
fn get_account(owner: Principal) -> Option<CandidAccount> {
    position::candid_account(owner, ic_cdk::api::time())
}

#[candid_method(query)]
#[query]
fn get_health_factor(owner: Principal) -> Result<u128, ProtocolError> {
    read_state(|s| {
        s.health_factor_of(&owner, ic_cdk::api::time())
            .map(|hf| hf.to_u128())
    })
}

#[candid_method(query)]
#[query]
fn get_collateral_balance(owner: Principal, asset: Principal) -> u128 {
    read_state(|s| s.collateral_balance(&owner, &asset))
}

#[candid_method(query)]
#[query]
fn get_usd_value(asset: Principal, amount: u128) -> Result<u128, ProtocolError> {
    read_state(|s| {
        s.usd_value(&asset, amount, ic_cdk::api::time())
            .map(|usd| usd.to_u128())
    })
}

#[candid_method(query)]
#[query]
fn get_token_amount_from_usd(asset: Principal, usd: u128) -> Result<u128, ProtocolError> {
    read_state(|s| s.token_amount_from_usd(&asset, usd.into(), ic_cdk::api::time()))
}

#[candid_method(query)]
#[query]
fn get_pending_payouts() -> Vec<CandidPayout> {
    read_state(|s| {
        s.pending_payouts
            .iter()
            .map(|(id, payout)| CandidPayout {
                payout_id: *id,
                receiver: payout.receiver,
                ledger_canister_id: payout.ledger_canister_id,
                amount: payout.amount,
                created_at: payout.created_at,
            })
            .collect()
    })
}

#[candid_method(query)]
#[query]
fn get_events(args: GetEventsArg) -> Vec<Event> {
    const MAX_EVENTS_PER_QUERY: usize = 2000;

    vantage_protocol_backend::storage::events()
        .into_iter()
        .skip(args.start as usize)
        .take(MAX_EVENTS_PER_QUERY.min(args.length as usize))
        .collect()
}

#[candid_method(query)]
#[query]
fn get_account_history(owner: Principal) -> Vec<Event> {
    vantage_protocol_backend::storage::events()
        .into_iter()
        .filter(|event| event.concerns(&owner))
        .collect()
}

#[candid_method(query)]
#[query]
fn get_logs(priority: Option<Priority>) -> Vec<LogRecord> {
    vantage_protocol_backend::logs::collect_logs(priority)
}

// Checks the real candid interface against the one declared in the did file
#[test]
fn check_candid_interface_compatibility() {
    fn source_to_str(source: &CandidSource) -> String {
        match source {
            CandidSource::File(f) => std::fs::read_to_string(f).unwrap_or_else(|_| "".to_string()),
            CandidSource::Text(t) => t.to_string(),
        }
    }

    fn check_service_compatible(
        new_name: &str,
        new: CandidSource,
        old_name: &str,
        old: CandidSource,
    ) {
        let new_str = source_to_str(&new);
        let old_str = source_to_str(&old);
        match service_equal(new, old) {
            Ok(_) => {}
            Err(e) => {
                eprintln!(
                    "{} is not compatible with {}!\n\n\
            {}:\n\
            {}\n\n\
            {}:\n\
            {}\n",
                    new_name, old_name, new_name, new_str, old_name, old_str
                );
                panic!("{:?}", e);
            }
        }
    }

    candid::export_service!();

    let new_interface = __export_service();

    let old_interface = std::path::PathBuf::from(std::env::var("CARGO_MANIFEST_DIR").unwrap())
        .join("vantage_protocol_backend.did");

    check_service_compatible(
        "actual Vantage Protocol candid interface",
        CandidSource::Text(&new_interface),
        "declared candid interface in vantage_protocol_backend.did file",
        CandidSource::File(old_interface.as_path()),
    );
}
