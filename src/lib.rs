// Allow our dollar.cents digit grouping convention (e.g., 100_00 = $100.00)
#![allow(clippy::inconsistent_digit_grouping)]

//! # tradegate
//!
//! Brokerage-agnostic building blocks for placing orders against a
//! brokerage account:
//!
//! - **Order intents**: symbol, signed quantity delta, price type, term and
//!   market session, validated before anything reaches a backend
//! - **Client order ids**: idempotency tokens for the two-phase
//!   preview/confirm order protocol
//! - **Targets**: desired allocations in percent of account value or in
//!   dollars, for a subset of symbols or for the whole portfolio
//! - **Allocation resolver**: turns a target plus current holdings into the
//!   orders that reach it, all-or-nothing against available cash
//!
//! Backends, sessions and the OAuth handshake live in `tradegate-broker`.
//!
//! ## Quick Start
//!
//! ```
//! use tradegate::{Basis, Target, Symbol, Price, OrderIntent};
//! use tradegate::allocation::{resolve_target, AccountSnapshot, Holding};
//!
//! let aapl = Symbol::new("AAPL");
//! let target = Target::new(Basis::Percent, [(aapl, 0.5)]);
//! let account = AccountSnapshot {
//!     account_value: Price(10_000_00),
//!     cash_available: Price(10_000_00),
//! };
//!
//! let orders = resolve_target(
//!     &target,
//!     &[Holding { symbol: aapl, quantity: 0 }],
//!     account,
//!     &[(aapl, Price(100_00))],
//! ).unwrap();
//!
//! assert_eq!(orders, vec![OrderIntent::market(aapl, 50)]);
//! ```
//!
//! ## Price Representation
//!
//! Prices are stored as [`i64`] cents:
//!
//! ```
//! use tradegate::Price;
//!
//! let price = Price(100_50);  // $100.50
//! assert_eq!(format!("{}", price), "$100.50");
//! assert_eq!(Price::from_dollars(100.5), price);
//! ```

pub mod allocation;
mod error;
mod order;
mod target;
mod types;

pub use allocation::{AccountSnapshot, AllocationError, Holding};
pub use error::ValidationError;
pub use order::{ClientOrderId, MarketSession, OrderAction, OrderIntent, OrderTerm, PriceType};
pub use target::{Basis, Target, TargetPortfolio};
pub use types::{Price, Quantity, Symbol};
