//! Broker trait, sessions and backends for tradegate.
//!
//! Provides a generic `Broker` trait that abstracts over brokerages, a
//! [`SessionRegistry`] mapping session ids to live connections, and the
//! OAuth 1.0a handshake those connections authenticate with.
//! Implementations:
//!
//! - **E*Trade** (feature `etrade`, default): REST API with the two-phase
//!   preview/place order protocol
//! - **Mock** ([`mock::MockBroker`]): in-memory, for tests and dry runs

pub mod error;
pub mod mock;
pub mod session;
pub mod transport;
pub mod types;

#[cfg(feature = "oauth")]
pub mod oauth;

#[cfg(feature = "etrade")]
pub mod etrade;

pub use error::{BrokerError, Precondition};
pub use session::{BackendRegistry, SessionId, SessionRegistry, SharedBroker};
pub use types::*;

use log::{info, warn};
use rustc_hash::FxHashSet;
use tradegate::allocation::{self, AccountSnapshot};
use tradegate::{ClientOrderId, Holding, OrderIntent, Price, Symbol, Target, TargetPortfolio};

/// A brokerage connection: handshake, account selection, queries and
/// order placement.
///
/// Account-scoped calls fail with [`BrokerError::Precondition`] until the
/// handshake is complete and an account is selected.
pub trait Broker: Send {
    /// Backend tag this connection was created under (e.g. `"etrade"`).
    fn kind(&self) -> &'static str;

    fn handshake_phase(&self) -> HandshakePhase;

    /// Start the OAuth handshake. Returns the URL the user must visit to
    /// obtain a verifier code.
    fn begin_handshake(&mut self, consumer: ConsumerCredentials) -> Result<String, BrokerError>;

    /// Finish the OAuth handshake with the user's verifier code.
    fn complete_handshake(&mut self, verifier: &str) -> Result<(), BrokerError>;

    /// Select the account all later calls act on. Separators in the id are
    /// ignored; an id the backend does not know is [`BrokerError::InvalidAccount`].
    fn select_account(&mut self, account_id: &str) -> Result<AccountHandle, BrokerError>;

    fn selected_account(&self) -> Option<&AccountHandle>;

    /// Total account value.
    fn account_value(&self) -> Result<Price, BrokerError>;

    /// Cash available for investment.
    fn cash_available(&self) -> Result<Price, BrokerError>;

    /// All current positions.
    fn positions(&self) -> Result<Vec<Position>, BrokerError>;

    /// Current quote for a symbol.
    fn quote(&self, symbol: Symbol) -> Result<Quote, BrokerError>;

    /// Place one order. Pass the client order id of an earlier attempt to
    /// retry it idempotently; `None` generates a fresh one.
    fn place_order(
        &mut self,
        intent: &OrderIntent,
        client_order_id: Option<ClientOrderId>,
    ) -> Result<OrderResult, BrokerError>;

    /// Orders that would move the targeted symbols to their allocations.
    fn plan_target(&self, target: &Target) -> Result<Vec<OrderIntent>, BrokerError> {
        let snapshot = MarketSnapshot::gather(self, target.symbols(), false)?;
        Ok(allocation::resolve_target(
            target,
            &snapshot.holdings,
            snapshot.account,
            &snapshot.prices,
        )?)
    }

    /// Orders that would turn the whole portfolio into `target`, selling
    /// everything it does not list.
    fn plan_target_portfolio(
        &self,
        target: &TargetPortfolio,
    ) -> Result<Vec<OrderIntent>, BrokerError> {
        let snapshot = MarketSnapshot::gather(self, target.symbols(), true)?;
        Ok(allocation::resolve_target_portfolio(
            target,
            &snapshot.holdings,
            snapshot.account,
            &snapshot.prices,
        )?)
    }

    fn order_target(&mut self, target: &Target) -> Result<Vec<OrderResult>, BrokerError> {
        let intents = self.plan_target(target)?;
        place_all(self, &intents)
    }

    fn order_target_portfolio(
        &mut self,
        target: &TargetPortfolio,
    ) -> Result<Vec<OrderResult>, BrokerError> {
        let intents = self.plan_target_portfolio(target)?;
        place_all(self, &intents)
    }
}

/// Place intents in order, stopping at the first failure.
pub fn place_all<B: Broker + ?Sized>(
    broker: &mut B,
    intents: &[OrderIntent],
) -> Result<Vec<OrderResult>, BrokerError> {
    let mut results = Vec::with_capacity(intents.len());
    for intent in intents {
        match broker.place_order(intent, None) {
            Ok(result) => {
                info!("placed {intent} ({})", result.client_order_id);
                results.push(result);
            }
            Err(e) => {
                if !results.is_empty() {
                    warn!(
                        "batch stopped after {} of {} orders: {e}",
                        results.len(),
                        intents.len()
                    );
                }
                return Err(e);
            }
        }
    }
    Ok(results)
}

/// Everything the allocation resolver needs from a live account.
struct MarketSnapshot {
    holdings: Vec<Holding>,
    account: AccountSnapshot,
    prices: Vec<(Symbol, Price)>,
}

impl MarketSnapshot {
    /// Quotes every targeted symbol, plus every held one when
    /// `include_holdings` is set. Symbols without a usable quote fall back
    /// to the position's last price; a failed quote is only tolerated for
    /// symbols that are held but not targeted.
    fn gather<B: Broker + ?Sized>(
        broker: &B,
        targeted: impl Iterator<Item = Symbol>,
        include_holdings: bool,
    ) -> Result<Self, BrokerError> {
        let account = AccountSnapshot {
            account_value: broker.account_value()?,
            cash_available: broker.cash_available()?,
        };
        let positions = broker.positions()?;

        let mut seen = FxHashSet::default();
        let mut symbols: Vec<Symbol> = targeted.filter(|s| seen.insert(*s)).collect();
        let targeted_len = symbols.len();
        if include_holdings {
            symbols.extend(
                positions
                    .iter()
                    .filter(|p| p.quantity != 0 && p.is_equity())
                    .map(|p| p.symbol)
                    .filter(|s| seen.insert(*s)),
            );
        }

        let mut prices = Vec::with_capacity(symbols.len());
        for (i, symbol) in symbols.into_iter().enumerate() {
            let quoted = match broker.quote(symbol) {
                Ok(q) => q.reference_price(),
                Err(e) if i >= targeted_len => {
                    warn!("no quote for held {symbol}, using last price: {e}");
                    None
                }
                Err(e) => return Err(e),
            };
            let fallback = || {
                positions
                    .iter()
                    .find(|p| p.symbol == symbol && p.is_equity() && p.last_price.is_positive())
                    .map(|p| p.last_price)
            };
            if let Some(price) = quoted.or_else(fallback) {
                prices.push((symbol, price));
            }
        }

        Ok(Self {
            holdings: positions.iter().filter_map(Position::holding).collect(),
            account,
            prices,
        })
    }
}
