//! CURRENT→TARGET allocation resolver.
//!
//! Turns a [`Target`] or [`TargetPortfolio`] plus the account's current
//! holdings, value and cash into the signed order intents needed to reach
//! it. Pure computation: prices and balances are passed in, nothing is
//! fetched or placed here.
//!
//! The batch is all-or-nothing: if the net cost of the buys (after the
//! proceeds of the sells in the same batch) exceeds available cash, no
//! intents are returned at all.

use rustc_hash::FxHashMap;

use crate::order::OrderIntent;
use crate::target::{Basis, Target, TargetPortfolio};
use crate::types::{Price, Symbol};

/// Current position as the resolver sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Holding {
    pub symbol: Symbol,
    /// Positive = long, negative = short.
    pub quantity: i64,
}

/// Account-level inputs to a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountSnapshot {
    /// Total account value; the base for `Basis::Percent`.
    pub account_value: Price,
    /// Cash that may be spent on net buys.
    pub cash_available: Price,
}

/// Why a target could not be turned into orders.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocationError {
    #[error("insufficient funds: batch needs {required}, {available} available")]
    InsufficientFunds { required: Price, available: Price },

    #[error("no usable price for {0}")]
    MissingPrice(Symbol),
}

/// Resolve a partial target. Symbols held but not listed are untouched.
pub fn resolve_target(
    target: &Target,
    holdings: &[Holding],
    account: AccountSnapshot,
    prices: &[(Symbol, Price)],
) -> Result<Vec<OrderIntent>, AllocationError> {
    resolve(
        target.basis,
        &target.allocations,
        holdings,
        account,
        prices,
        false,
    )
}

/// Resolve a whole-portfolio target. Symbols held but not listed are
/// liquidated.
pub fn resolve_target_portfolio(
    target: &TargetPortfolio,
    holdings: &[Holding],
    account: AccountSnapshot,
    prices: &[(Symbol, Price)],
) -> Result<Vec<OrderIntent>, AllocationError> {
    resolve(
        target.basis,
        &target.allocations,
        holdings,
        account,
        prices,
        true,
    )
}

fn resolve(
    basis: Basis,
    allocations: &[(Symbol, f64)],
    holdings: &[Holding],
    account: AccountSnapshot,
    prices: &[(Symbol, Price)],
    liquidate_untargeted: bool,
) -> Result<Vec<OrderIntent>, AllocationError> {
    let price_map: FxHashMap<Symbol, Price> = prices.iter().copied().collect();

    let mut held: FxHashMap<Symbol, i64> = FxHashMap::default();
    for h in holdings {
        let q = held.entry(h.symbol).or_insert(0);
        *q = q.saturating_add(h.quantity);
    }

    // Last allocation for a symbol wins; keep first-appearance order.
    let mut wanted: FxHashMap<Symbol, f64> = FxHashMap::default();
    let mut ordered: Vec<Symbol> = Vec::with_capacity(allocations.len());
    for &(sym, allocation) in allocations {
        if wanted.insert(sym, allocation).is_none() {
            ordered.push(sym);
        }
    }

    let mut exposures: Vec<(Symbol, i64)> = ordered
        .iter()
        .map(|sym| (*sym, exposure_cents(basis, wanted[sym], account.account_value)))
        .collect();

    if liquidate_untargeted {
        for h in holdings {
            if !wanted.contains_key(&h.symbol) && !exposures.iter().any(|(s, _)| *s == h.symbol) {
                exposures.push((h.symbol, 0));
            }
        }
    }

    let mut sells = Vec::new();
    let mut buys = Vec::new();
    let mut buy_cost: i64 = 0;
    let mut sell_proceeds: i64 = 0;

    for (sym, exposure) in exposures {
        let current = held.get(&sym).copied().unwrap_or(0);
        let price = price_map.get(&sym).copied().filter(|p| p.is_positive());

        let desired = if exposure <= 0 {
            0
        } else {
            let price = price.ok_or(AllocationError::MissingPrice(sym))?;
            // Integer division rounds toward zero: never overspend.
            exposure / price.0
        };

        let delta = desired.saturating_sub(current);
        if delta == 0 {
            continue;
        }

        if delta > 0 {
            let price = price.ok_or(AllocationError::MissingPrice(sym))?;
            buy_cost = buy_cost.saturating_add(delta.saturating_mul(price.0));
            buys.push(OrderIntent::market(sym, delta));
        } else {
            // A liquidation without a quote still goes out; its proceeds
            // just don't count toward funding the buys.
            if let Some(price) = price {
                let proceeds = delta.saturating_neg().saturating_mul(price.0);
                sell_proceeds = sell_proceeds.saturating_add(proceeds);
            }
            sells.push(OrderIntent::market(sym, delta));
        }
    }

    // Only net buys need cash; a negative balance never blocks selling
    let required = buy_cost.saturating_sub(sell_proceeds).max(0);
    if required > 0 && required > account.cash_available.0 {
        return Err(AllocationError::InsufficientFunds {
            required: Price(required),
            available: account.cash_available,
        });
    }

    sells.extend(buys);
    Ok(sells)
}

/// Desired dollar exposure in cents, rounded down. Non-positive or
/// non-finite allocations mean "liquidate".
fn exposure_cents(basis: Basis, allocation: f64, account_value: Price) -> i64 {
    if !allocation.is_finite() || allocation <= 0.0 {
        return 0;
    }
    let cents = match basis {
        Basis::Percent => floor_cents(allocation * account_value.0 as f64),
        Basis::Nominal => Price::from_dollars(allocation).0,
    };
    cents.max(0)
}

/// Round a cent amount down, absorbing float noise around whole cents
/// (`0.29 * 100.0` is `28.999999999999996`).
fn floor_cents(cents: f64) -> i64 {
    let nearest = cents.round();
    if (cents - nearest).abs() < 1e-6 {
        nearest as i64
    } else {
        cents.floor() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aapl() -> Symbol {
        Symbol::new("AAPL")
    }
    fn msft() -> Symbol {
        Symbol::new("MSFT")
    }
    fn spy() -> Symbol {
        Symbol::new("SPY")
    }

    fn account(value: i64, cash: i64) -> AccountSnapshot {
        AccountSnapshot {
            account_value: Price(value),
            cash_available: Price(cash),
        }
    }

    fn held(symbol: Symbol, quantity: i64) -> Holding {
        Holding { symbol, quantity }
    }

    #[test]
    fn percent_buy_from_flat() {
        let target = Target::new(Basis::Percent, [(aapl(), 0.5)]);
        let orders = resolve_target(
            &target,
            &[held(aapl(), 0)],
            account(10_000_00, 10_000_00),
            &[(aapl(), Price(100_00))],
        )
        .unwrap();

        assert_eq!(orders, vec![OrderIntent::market(aapl(), 50)]);
    }

    #[test]
    fn rounds_toward_zero() {
        // $500,000 / $185 = 2702.7 shares
        let target = Target::new(Basis::Percent, [(aapl(), 0.5)]);
        let orders = resolve_target(
            &target,
            &[],
            account(1_000_000_00, 1_000_000_00),
            &[(aapl(), Price(185_00))],
        )
        .unwrap();

        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].quantity, 2702);
    }

    #[test]
    fn rebalance_increase() {
        let target = Target::new(Basis::Percent, [(aapl(), 0.5)]);
        let orders = resolve_target(
            &target,
            &[held(aapl(), 100)],
            account(1_000_000_00, 1_000_000_00),
            &[(aapl(), Price(185_00))],
        )
        .unwrap();

        // Target: 2702 shares. Current: 100. Diff: 2602
        assert_eq!(orders[0].quantity, 2602);
    }

    #[test]
    fn nominal_basis_uses_dollars() {
        let target = Target::new(Basis::Nominal, [(msft(), 4_100.0)]);
        let orders = resolve_target(
            &target,
            &[],
            account(50_000_00, 50_000_00),
            &[(msft(), Price(410_00))],
        )
        .unwrap();

        assert_eq!(orders, vec![OrderIntent::market(msft(), 10)]);
    }

    #[test]
    fn portfolio_liquidates_unlisted_holdings() {
        let target = TargetPortfolio::new(Basis::Percent, []);
        let orders = resolve_target_portfolio(
            &target,
            &[held(aapl(), 50)],
            account(10_000_00, 0),
            &[(aapl(), Price(100_00))],
        )
        .unwrap();

        assert_eq!(orders, vec![OrderIntent::market(aapl(), -50)]);
    }

    #[test]
    fn partial_target_leaves_unlisted_holdings() {
        let target = Target::new(Basis::Percent, [(aapl(), 0.1)]);
        let orders = resolve_target(
            &target,
            &[held(msft(), 200)],
            account(100_000_00, 100_000_00),
            &[(aapl(), Price(100_00)), (msft(), Price(410_00))],
        )
        .unwrap();

        assert_eq!(orders, vec![OrderIntent::market(aapl(), 100)]);
    }

    #[test]
    fn negative_and_zero_allocations_liquidate() {
        let target = Target::new(Basis::Percent, [(aapl(), 0.0), (spy(), -0.10)]);
        let orders = resolve_target(
            &target,
            &[held(aapl(), 30), held(spy(), 12)],
            account(100_000_00, 0),
            &[(aapl(), Price(100_00)), (spy(), Price(430_00))],
        )
        .unwrap();

        assert_eq!(
            orders,
            vec![
                OrderIntent::market(aapl(), -30),
                OrderIntent::market(spy(), -12)
            ]
        );
    }

    #[test]
    fn zero_delta_dropped() {
        let target = Target::new(Basis::Percent, [(aapl(), 0.5)]);
        let orders = resolve_target(
            &target,
            &[held(aapl(), 2702)],
            account(1_000_000_00, 0),
            &[(aapl(), Price(185_00))],
        )
        .unwrap();

        assert!(orders.is_empty());
    }

    #[test]
    fn insufficient_funds_rejects_whole_batch() {
        let target = Target::new(Basis::Percent, [(aapl(), 0.3), (msft(), 0.3)]);
        let result = resolve_target(
            &target,
            &[],
            account(100_000_00, 40_000_00),
            &[(aapl(), Price(100_00)), (msft(), Price(100_00))],
        );

        assert_eq!(
            result,
            Err(AllocationError::InsufficientFunds {
                required: Price(60_000_00),
                available: Price(40_000_00),
            })
        );
    }

    #[test]
    fn sells_fund_buys() {
        // Sell $30k of MSFT, buy $30k of AAPL with no spare cash
        let target = TargetPortfolio::new(Basis::Percent, [(aapl(), 0.3)]);
        let orders = resolve_target_portfolio(
            &target,
            &[held(msft(), 300)],
            account(100_000_00, 0),
            &[(aapl(), Price(100_00)), (msft(), Price(100_00))],
        )
        .unwrap();

        // Sells come first so the cash exists when the buys go out
        assert_eq!(
            orders,
            vec![
                OrderIntent::market(msft(), -300),
                OrderIntent::market(aapl(), 300)
            ]
        );
    }

    #[test]
    fn missing_price_for_buy_is_error() {
        let target = Target::new(Basis::Percent, [(aapl(), 0.5)]);
        let result = resolve_target(&target, &[], account(10_000_00, 10_000_00), &[]);
        assert_eq!(result, Err(AllocationError::MissingPrice(aapl())));
    }

    #[test]
    fn liquidation_without_price_still_sells() {
        let target = TargetPortfolio::new(Basis::Percent, []);
        let orders =
            resolve_target_portfolio(&target, &[held(spy(), 7)], account(10_000_00, 0), &[])
                .unwrap();
        assert_eq!(orders, vec![OrderIntent::market(spy(), -7)]);
    }

    #[test]
    fn short_holding_covered_on_liquidation() {
        let target = TargetPortfolio::new(Basis::Percent, []);
        let orders = resolve_target_portfolio(
            &target,
            &[held(spy(), -100)],
            account(100_000_00, 100_000_00),
            &[(spy(), Price(430_00))],
        )
        .unwrap();
        assert_eq!(orders, vec![OrderIntent::market(spy(), 100)]);
    }

    #[test]
    fn liquidation_with_negative_cash() {
        // Margin debit: nothing is bought, so the sell goes out
        let target = TargetPortfolio::new(Basis::Percent, []);
        let orders = resolve_target_portfolio(
            &target,
            &[held(aapl(), 50)],
            account(10_000_00, -250_00),
            &[(aapl(), Price(100_00))],
        )
        .unwrap();
        assert_eq!(orders, vec![OrderIntent::market(aapl(), -50)]);
    }

    #[test]
    fn sell_funded_rebalance_with_negative_cash() {
        // Sell $5k of MSFT, buy $3k of AAPL: net proceeds, no cash needed
        let target = TargetPortfolio::new(Basis::Percent, [(aapl(), 0.3)]);
        let orders = resolve_target_portfolio(
            &target,
            &[held(msft(), 50)],
            account(10_000_00, -250_00),
            &[(aapl(), Price(100_00)), (msft(), Price(100_00))],
        )
        .unwrap();
        assert_eq!(
            orders,
            vec![
                OrderIntent::market(msft(), -50),
                OrderIntent::market(aapl(), 30)
            ]
        );
    }

    #[test]
    fn net_buy_with_negative_cash_rejected() {
        let target = Target::new(Basis::Percent, [(aapl(), 0.1)]);
        let result = resolve_target(
            &target,
            &[],
            account(10_000_00, -250_00),
            &[(aapl(), Price(100_00))],
        );
        assert_eq!(
            result,
            Err(AllocationError::InsufficientFunds {
                required: Price(1_000_00),
                available: Price(-250_00),
            })
        );
    }

    #[test]
    fn fractional_cent_exposure_rounds_down() {
        // 0.099995 * $1,000 = 9999.5 cents, just under one $100 share
        let target = Target::new(Basis::Percent, [(aapl(), 0.099995)]);
        let orders = resolve_target(
            &target,
            &[],
            account(1_000_00, 1_000_00),
            &[(aapl(), Price(100_00))],
        )
        .unwrap();
        assert!(orders.is_empty());

        assert_eq!(exposure_cents(Basis::Percent, 0.29, Price(100)), 29);
    }

    #[test]
    fn saturated_holdings_do_not_overflow() {
        let target = TargetPortfolio::new(Basis::Percent, []);
        let orders = resolve_target_portfolio(
            &target,
            &[held(aapl(), i64::MAX), held(aapl(), 10)],
            account(10_000_00, 0),
            &[(aapl(), Price(100_00))],
        )
        .unwrap();
        assert_eq!(orders, vec![OrderIntent::market(aapl(), -i64::MAX)]);
    }

    #[test]
    fn duplicate_symbol_last_wins() {
        let target = Target::new(Basis::Percent, [(aapl(), 0.9), (aapl(), 0.1)]);
        let orders = resolve_target(
            &target,
            &[],
            account(10_000_00, 10_000_00),
            &[(aapl(), Price(100_00))],
        )
        .unwrap();
        assert_eq!(orders, vec![OrderIntent::market(aapl(), 10)]);
    }
}
