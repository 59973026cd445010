use crate::guard::OperationGuard;
use crate::numeric::{
    collateral_amount_from_usd, collateral_usd_value, mul_div, HealthFactor, VUSD,
};
use crate::oracle::PriceReading;
use crate::{
    compute_health_factor, InitArg, ProtocolError, LIQUIDATION_BONUS, LIQUIDATION_PRECISION,
    MIN_HEALTH_FACTOR,
};
use candid::Principal;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

// Like assert_eq, but returns an error instead of panicking.
macro_rules! ensure_eq {
    ($lhs:expr, $rhs:expr, $msg:expr $(, $args:expr)* $(,)*) => {
        if $lhs != $rhs {
            return Err(format!("{} ({:?}) != {} ({:?}): {}",
                               std::stringify!($lhs), $lhs,
                               std::stringify!($rhs), $rhs,
                               format!($msg $(,$args)*)));
        }
    }
}

macro_rules! ensure {
    ($cond:expr, $msg:expr $(, $args:expr)* $(,)*) => {
        if !$cond {
            return Err(format!("Condition {} is false: {}",
                               std::stringify!($cond),
                               format!($msg $(,$args)*)));
        }
    }
}

/// Collateral type identified by its ICRC-1 ledger canister principal.
pub type AssetId = Principal;

pub const DEFAULT_LEDGER_FEE: u128 = 10_000;

pub type PayoutId = u64;

/// A registered collateral asset. The set is fixed at construction; there
/// is no dynamic add/remove.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollateralAsset {
    pub ledger_canister_id: Principal,
    pub price_feed_canister_id: Principal,
    pub decimals: u8,
    /// Transfer fee of the asset's ledger, deducted from outbound payouts.
    pub ledger_fee: u128,
}

/// A user position: per-asset collateral balances plus minted vUSD debt.
/// Created on first deposit; pruned again once fully zeroed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Account {
    pub collateral: BTreeMap<AssetId, u128>,
    pub debt: VUSD,
}

impl Account {
    pub fn collateral_balance(&self, asset: &AssetId) -> u128 {
        self.collateral.get(asset).copied().unwrap_or(0)
    }

    pub fn is_zeroed(&self) -> bool {
        self.debt.is_zero() && self.collateral.values().all(|amount| *amount == 0)
    }
}

/// An outbound transfer owed to a user. The ledger debit has already
/// happened; delivery is attempted immediately and retried by timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingPayout {
    pub receiver: Principal,
    pub ledger_canister_id: Principal,
    pub amount: u128,
    pub created_at: u64,
}

/// Everything needed to settle a liquidation, computed and gated against
/// the prospective state before any funds move.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LiquidationPlan {
    pub liquidator: Principal,
    pub target: Principal,
    pub asset: AssetId,
    pub debt_to_cover: VUSD,
    pub collateral_seized: u128,
    pub target_health_before: HealthFactor,
    pub target_health_after: HealthFactor,
}

thread_local! {
    static __STATE: RefCell<Option<State>> = RefCell::default();
}

pub struct State {
    pub collateral_assets: BTreeMap<AssetId, CollateralAsset>,
    pub accounts: BTreeMap<Principal, Account>,
    pub last_prices: BTreeMap<AssetId, PriceReading>,
    pub stable_ledger_principal: Principal,
    pub pending_payouts: BTreeMap<PayoutId, PendingPayout>,
    pub next_payout_id: PayoutId,
    /// Payouts currently being sent; keeps the immediate attempt and the
    /// timer sweep from double-paying. Never persisted.
    pub payouts_in_flight: BTreeSet<PayoutId>,
    pub guards: BTreeMap<Principal, OperationGuard>,
    pub is_processing_payouts: bool,
    pub is_fetching_prices: bool,
}

impl From<InitArg> for State {
    fn from(args: InitArg) -> Self {
        if args.collateral_ledgers.len() != args.price_feeds.len()
            || args.collateral_ledgers.len() != args.collateral_decimals.len()
        {
            panic!("collateral ledger, price feed and decimals lists must have the same length");
        }
        let mut collateral_assets = BTreeMap::new();
        for ((ledger, feed), decimals) in args
            .collateral_ledgers
            .iter()
            .zip(args.price_feeds.iter())
            .zip(args.collateral_decimals.iter())
        {
            let previous = collateral_assets.insert(
                *ledger,
                CollateralAsset {
                    ledger_canister_id: *ledger,
                    price_feed_canister_id: *feed,
                    decimals: *decimals,
                    ledger_fee: DEFAULT_LEDGER_FEE,
                },
            );
            if previous.is_some() {
                panic!("duplicate collateral ledger: {ledger}");
            }
        }
        Self {
            collateral_assets,
            accounts: BTreeMap::new(),
            last_prices: BTreeMap::new(),
            stable_ledger_principal: args.stable_ledger_principal,
            pending_payouts: BTreeMap::new(),
            next_payout_id: 0,
            payouts_in_flight: BTreeSet::new(),
            guards: BTreeMap::new(),
            is_processing_payouts: false,
            is_fetching_prices: false,
        }
    }
}

impl State {
    pub fn get_asset(&self, asset: &AssetId) -> Result<&CollateralAsset, ProtocolError> {
        self.collateral_assets
            .get(asset)
            .ok_or(ProtocolError::UnknownCollateral { asset: *asset })
    }

    pub fn account(&self, owner: &Principal) -> Option<&Account> {
        self.accounts.get(owner)
    }

    pub fn collateral_balance(&self, owner: &Principal, asset: &AssetId) -> u128 {
        self.accounts
            .get(owner)
            .map(|a| a.collateral_balance(asset))
            .unwrap_or(0)
    }

    pub fn debt_of(&self, owner: &Principal) -> VUSD {
        self.accounts.get(owner).map(|a| a.debt).unwrap_or(VUSD::ZERO)
    }

    pub fn total_debt(&self) -> VUSD {
        self.accounts.values().map(|a| a.debt).sum()
    }

    /// Best-effort USD value of all custody at the cached prices, for
    /// status reporting only. Assets without a cached price contribute
    /// zero, which understates but never overstates the total.
    pub fn total_collateral_value_estimate(&self) -> VUSD {
        let mut total = VUSD::ZERO;
        for account in self.accounts.values() {
            for (asset, amount) in &account.collateral {
                let Some(reading) = self.last_prices.get(asset) else {
                    continue;
                };
                let Ok(config) = self.get_asset(asset) else {
                    continue;
                };
                if let Some(value) =
                    collateral_usd_value(*amount, reading.answer_e8, config.decimals)
                {
                    total = total.checked_add(value).unwrap_or(total);
                }
            }
        }
        total
    }

    /// The freshness-checked 8-decimal price of a registered asset.
    pub fn verified_answer(&self, asset: &AssetId, now: u64) -> Result<u64, ProtocolError> {
        self.get_asset(asset)?;
        let reading = self
            .last_prices
            .get(asset)
            .ok_or(ProtocolError::StalePrice { asset: *asset })?;
        crate::oracle::verify_reading(asset, reading, now)
    }

    /// Total USD value of an account's collateral at current verified prices.
    pub fn account_collateral_value(
        &self,
        account: &Account,
        now: u64,
    ) -> Result<VUSD, ProtocolError> {
        let mut total = VUSD::ZERO;
        for (asset, amount) in &account.collateral {
            if *amount == 0 {
                continue;
            }
            let answer = self.verified_answer(asset, now)?;
            let decimals = self.get_asset(asset)?.decimals;
            let value = collateral_usd_value(*amount, answer, decimals)
                .ok_or(ProtocolError::ArithmeticOverflow)?;
            total = total
                .checked_add(value)
                .ok_or(ProtocolError::ArithmeticOverflow)?;
        }
        Ok(total)
    }

    pub fn health_factor_of(
        &self,
        owner: &Principal,
        now: u64,
    ) -> Result<HealthFactor, ProtocolError> {
        match self.accounts.get(owner) {
            None => Ok(HealthFactor::MAX),
            Some(account) => {
                if account.debt.is_zero() {
                    return Ok(HealthFactor::MAX);
                }
                let value = self.account_collateral_value(account, now)?;
                Ok(compute_health_factor(value, account.debt))
            }
        }
    }

    pub fn usd_value(
        &self,
        asset: &AssetId,
        amount: u128,
        now: u64,
    ) -> Result<VUSD, ProtocolError> {
        let answer = self.verified_answer(asset, now)?;
        let decimals = self.get_asset(asset)?.decimals;
        collateral_usd_value(amount, answer, decimals).ok_or(ProtocolError::ArithmeticOverflow)
    }

    pub fn token_amount_from_usd(
        &self,
        asset: &AssetId,
        usd: VUSD,
        now: u64,
    ) -> Result<u128, ProtocolError> {
        let answer = self.verified_answer(asset, now)?;
        let decimals = self.get_asset(asset)?.decimals;
        collateral_amount_from_usd(usd, answer, decimals).ok_or(ProtocolError::ArithmeticOverflow)
    }

    // --- Raw position mutators. No external calls, no gating; callers are
    // --- responsible for ordering and health checks.

    pub fn add_collateral(&mut self, owner: Principal, asset: AssetId, amount: u128) {
        let account = self.accounts.entry(owner).or_default();
        let balance = account.collateral.entry(asset).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .expect("bug: collateral balance overflow");
    }

    pub fn remove_collateral(
        &mut self,
        owner: &Principal,
        asset: &AssetId,
        amount: u128,
    ) -> Result<(), ProtocolError> {
        let balance = self.collateral_balance(owner, asset);
        if amount > balance {
            return Err(ProtocolError::InsufficientCollateral {
                asset: *asset,
                balance,
                requested: amount,
            });
        }
        let account = self
            .accounts
            .get_mut(owner)
            .expect("bug: account with a balance must exist");
        let remaining = balance - amount;
        if remaining == 0 {
            account.collateral.remove(asset);
        } else {
            account.collateral.insert(*asset, remaining);
        }
        self.prune_if_zeroed(owner);
        Ok(())
    }

    pub fn increase_debt(&mut self, owner: Principal, amount: VUSD) -> Result<(), ProtocolError> {
        let account = self.accounts.entry(owner).or_default();
        account.debt = account
            .debt
            .checked_add(amount)
            .ok_or(ProtocolError::ArithmeticOverflow)?;
        Ok(())
    }

    pub fn decrease_debt(&mut self, owner: &Principal, amount: VUSD) -> Result<(), ProtocolError> {
        let debt = self.debt_of(owner);
        if amount > debt {
            return Err(ProtocolError::InsufficientDebt {
                debt: debt.to_u128(),
                requested: amount.to_u128(),
            });
        }
        let account = self
            .accounts
            .get_mut(owner)
            .expect("bug: account with debt must exist");
        account.debt = debt - amount;
        self.prune_if_zeroed(owner);
        Ok(())
    }

    fn prune_if_zeroed(&mut self, owner: &Principal) {
        if let Some(account) = self.accounts.get(owner) {
            if account.is_zeroed() {
                self.accounts.remove(owner);
            }
        }
    }

    // --- Operation-level transitions. Each applies all of its position
    // --- mutations and its health gate atomically: on failure the state is
    // --- exactly as it was before the call.

    pub fn validate_deposit(
        &self,
        owner: &Principal,
        asset: &AssetId,
        amount: u128,
    ) -> Result<(), ProtocolError> {
        if amount == 0 {
            return Err(ProtocolError::ZeroAmount);
        }
        self.get_asset(asset)?;
        self.collateral_balance(owner, asset)
            .checked_add(amount)
            .ok_or(ProtocolError::ArithmeticOverflow)?;
        Ok(())
    }

    pub fn apply_redeem(
        &mut self,
        owner: Principal,
        asset: AssetId,
        amount: u128,
        now: u64,
    ) -> Result<PayoutId, ProtocolError> {
        if amount == 0 {
            return Err(ProtocolError::ZeroAmount);
        }
        let ledger = self.get_asset(&asset)?.ledger_canister_id;
        self.remove_collateral(&owner, &asset, amount)?;
        match self.health_factor_of(&owner, now) {
            Ok(health_factor) if health_factor >= MIN_HEALTH_FACTOR => {}
            Ok(health_factor) => {
                self.add_collateral(owner, asset, amount);
                return Err(ProtocolError::HealthFactorTooLow {
                    health_factor: health_factor.to_u128(),
                });
            }
            Err(e) => {
                self.add_collateral(owner, asset, amount);
                return Err(e);
            }
        }
        Ok(self.queue_payout(owner, ledger, amount, now))
    }

    pub fn apply_mint(
        &mut self,
        owner: Principal,
        amount: VUSD,
        now: u64,
    ) -> Result<(), ProtocolError> {
        if amount.is_zero() {
            return Err(ProtocolError::ZeroAmount);
        }
        self.increase_debt(owner, amount)?;
        match self.health_factor_of(&owner, now) {
            Ok(health_factor) if health_factor >= MIN_HEALTH_FACTOR => Ok(()),
            Ok(health_factor) => {
                self.decrease_debt(&owner, amount)
                    .expect("bug: reverting a debt increase cannot fail");
                Err(ProtocolError::HealthFactorTooLow {
                    health_factor: health_factor.to_u128(),
                })
            }
            Err(e) => {
                self.decrease_debt(&owner, amount)
                    .expect("bug: reverting a debt increase cannot fail");
                Err(e)
            }
        }
    }

    /// Undo a debt increase whose external mint leg failed.
    pub fn revert_mint(&mut self, owner: &Principal, amount: VUSD) {
        self.decrease_debt(owner, amount)
            .expect("bug: reverting a debt increase cannot fail");
    }

    /// Burns up to `amount` against the account's debt and returns how much
    /// was actually burned. The difference, if any, is the caller's to
    /// refund: debt may have shrunk concurrently through a liquidation.
    pub fn apply_burn(&mut self, owner: &Principal, amount: VUSD) -> VUSD {
        let burned = self.debt_of(owner).min(amount);
        if !burned.is_zero() {
            self.decrease_debt(owner, burned)
                .expect("bug: burning at most the current debt cannot fail");
        }
        burned
    }

    pub fn check_liquidation(
        &self,
        liquidator: Principal,
        target: Principal,
        asset: AssetId,
        debt_to_cover: VUSD,
        now: u64,
    ) -> Result<LiquidationPlan, ProtocolError> {
        let target_health_before = self.health_factor_of(&target, now)?;
        if target_health_before >= MIN_HEALTH_FACTOR {
            return Err(ProtocolError::HealthFactorOk);
        }
        if debt_to_cover.is_zero() {
            return Err(ProtocolError::ZeroAmount);
        }
        let config = self.get_asset(&asset)?;
        let answer = self.verified_answer(&asset, now)?;
        let token_amount = collateral_amount_from_usd(debt_to_cover, answer, config.decimals)
            .ok_or(ProtocolError::ArithmeticOverflow)?;
        let bonus = mul_div(token_amount, LIQUIDATION_BONUS, LIQUIDATION_PRECISION)
            .ok_or(ProtocolError::ArithmeticOverflow)?;
        let collateral_seized = token_amount
            .checked_add(bonus)
            .ok_or(ProtocolError::ArithmeticOverflow)?;

        let account = self
            .accounts
            .get(&target)
            .expect("bug: an unhealthy account must exist");
        let balance = account.collateral_balance(&asset);
        if collateral_seized > balance {
            return Err(ProtocolError::InsufficientCollateral {
                asset,
                balance,
                requested: collateral_seized,
            });
        }
        if debt_to_cover > account.debt {
            return Err(ProtocolError::InsufficientDebt {
                debt: account.debt.to_u128(),
                requested: debt_to_cover.to_u128(),
            });
        }

        let mut prospective = account.clone();
        let remaining = balance - collateral_seized;
        if remaining == 0 {
            prospective.collateral.remove(&asset);
        } else {
            prospective.collateral.insert(asset, remaining);
        }
        prospective.debt = prospective.debt - debt_to_cover;
        let target_health_after = if prospective.debt.is_zero() {
            HealthFactor::MAX
        } else {
            compute_health_factor(
                self.account_collateral_value(&prospective, now)?,
                prospective.debt,
            )
        };
        if target_health_after <= target_health_before {
            return Err(ProtocolError::HealthFactorNotImproved);
        }

        // The liquidator must not end the call below the minimum either. Its
        // position only changes when it is liquidating itself.
        let liquidator_health = if liquidator == target {
            target_health_after
        } else {
            self.health_factor_of(&liquidator, now)?
        };
        if liquidator_health < MIN_HEALTH_FACTOR {
            return Err(ProtocolError::HealthFactorTooLow {
                health_factor: liquidator_health.to_u128(),
            });
        }

        Ok(LiquidationPlan {
            liquidator,
            target,
            asset,
            debt_to_cover,
            collateral_seized,
            target_health_before,
            target_health_after,
        })
    }

    /// Settles a checked liquidation plan against the ledger. Re-validates
    /// the target's balances: they may have moved between the check and the
    /// repayment pull.
    pub fn apply_liquidation(
        &mut self,
        plan: &LiquidationPlan,
        now: u64,
    ) -> Result<PayoutId, ProtocolError> {
        let ledger = self.get_asset(&plan.asset)?.ledger_canister_id;
        self.remove_collateral(&plan.target, &plan.asset, plan.collateral_seized)?;
        if let Err(e) = self.decrease_debt(&plan.target, plan.debt_to_cover) {
            self.add_collateral(plan.target, plan.asset, plan.collateral_seized);
            return Err(e);
        }
        Ok(self.queue_payout(plan.liquidator, ledger, plan.collateral_seized, now))
    }

    // --- Payout queue.

    pub fn queue_payout(
        &mut self,
        receiver: Principal,
        ledger_canister_id: Principal,
        amount: u128,
        now: u64,
    ) -> PayoutId {
        let id = self.next_payout_id;
        self.next_payout_id += 1;
        self.pending_payouts.insert(
            id,
            PendingPayout {
                receiver,
                ledger_canister_id,
                amount,
                created_at: now,
            },
        );
        id
    }

    /// Re-inserts a payout under its original id during event replay.
    pub fn restore_payout(&mut self, id: PayoutId, payout: PendingPayout) {
        self.pending_payouts.insert(id, payout);
        self.next_payout_id = self.next_payout_id.max(id + 1);
    }

    /// Fee deducted from a payout on the given ledger. Transfers from the
    /// stable ledger's minting account are fee-less.
    pub fn payout_fee(&self, ledger: &Principal) -> u128 {
        if *ledger == self.stable_ledger_principal {
            return 0;
        }
        self.collateral_assets
            .get(ledger)
            .map(|a| a.ledger_fee)
            .unwrap_or(DEFAULT_LEDGER_FEE)
    }

    // --- Consistency checks used by the self_check build and the tests.

    pub fn check_semantically_eq(&self, other: &Self) -> Result<(), String> {
        // Payout creation times are not replayed, so compare everything else.
        fn payout_essence(
            payouts: &BTreeMap<PayoutId, PendingPayout>,
        ) -> BTreeMap<PayoutId, (Principal, Principal, u128)> {
            payouts
                .iter()
                .map(|(id, p)| (*id, (p.receiver, p.ledger_canister_id, p.amount)))
                .collect()
        }

        ensure_eq!(self.accounts, other.accounts, "accounts do not match");
        ensure_eq!(
            payout_essence(&self.pending_payouts),
            payout_essence(&other.pending_payouts),
            "pending_payouts does not match"
        );
        ensure_eq!(
            self.next_payout_id,
            other.next_payout_id,
            "next_payout_id does not match"
        );
        ensure_eq!(
            self.collateral_assets,
            other.collateral_assets,
            "collateral_assets does not match"
        );
        ensure_eq!(
            self.stable_ledger_principal,
            other.stable_ledger_principal,
            "stable_ledger_principal does not match"
        );
        Ok(())
    }

    pub fn check_invariants(&self) -> Result<(), String> {
        for (owner, account) in &self.accounts {
            ensure!(
                !account.is_zeroed(),
                "zeroed account {} was not pruned",
                owner
            );
            for asset in account.collateral.keys() {
                ensure!(
                    self.collateral_assets.contains_key(asset),
                    "account {} holds unregistered collateral {}",
                    owner,
                    asset
                );
            }
        }
        for id in self.pending_payouts.keys() {
            ensure!(
                *id < self.next_payout_id,
                "payout id {} is not below the next id {}",
                id,
                self.next_payout_id
            );
        }
        Ok(())
    }
}

pub fn read_state<R>(f: impl FnOnce(&State) -> R) -> R {
    __STATE.with(|s| f(s.borrow().as_ref().expect("state not initialized")))
}

pub fn mutate_state<R>(f: impl FnOnce(&mut State) -> R) -> R {
    __STATE.with(|s| f(s.borrow_mut().as_mut().expect("state not initialized")))
}

pub fn replace_state(state: State) {
    __STATE.with(|s| {
        *s.borrow_mut() = Some(state);
    });
}
