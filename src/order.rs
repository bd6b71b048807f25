//! Order intents: what the resolver produces and the order protocol consumes.

use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;
use crate::types::{Price, Quantity, Symbol};

/// Buy or sell, derived from the sign of an intent's quantity delta.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OrderAction {
    Buy,
    Sell,
}

impl OrderAction {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderAction::Buy => "BUY",
            OrderAction::Sell => "SELL",
        }
    }
}

impl fmt::Display for OrderAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generates `as_str`, `Display`, and `FromStr` over upper-snake wire names.
macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $wire:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_ascii_uppercase().replace('-', "_").as_str() {
                    $($wire => Ok($name::$variant),)+
                    other => Err(format!(
                        concat!("unknown ", stringify!($name), ": {}"),
                        other
                    )),
                }
            }
        }
    };
}

wire_enum! {
    /// How the order is priced.
    PriceType {
        Market => "MARKET",
        Limit => "LIMIT",
        Stop => "STOP",
        StopLimit => "STOP_LIMIT",
    }
}

impl PriceType {
    pub fn needs_limit_price(self) -> bool {
        matches!(self, PriceType::Limit | PriceType::StopLimit)
    }

    pub fn needs_stop_price(self) -> bool {
        matches!(self, PriceType::Stop | PriceType::StopLimit)
    }
}

wire_enum! {
    /// Time-in-force.
    OrderTerm {
        GoodUntilCancel => "GOOD_UNTIL_CANCEL",
        GoodForDay => "GOOD_FOR_DAY",
        GoodTillDate => "GOOD_TILL_DATE",
        ImmediateOrCancel => "IMMEDIATE_OR_CANCEL",
        FillOrKill => "FILL_OR_KILL",
    }
}

wire_enum! {
    /// Trading session the order is eligible for.
    MarketSession {
        Regular => "REGULAR",
        Extended => "EXTENDED",
    }
}

/// A single order the caller wants placed.
///
/// `quantity` is a signed delta: positive buys, negative sells.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OrderIntent {
    pub symbol: Symbol,
    pub quantity: i64,
    pub price_type: PriceType,
    pub term: OrderTerm,
    pub market_session: MarketSession,
    pub limit_price: Option<Price>,
    pub stop_price: Option<Price>,
}

impl OrderIntent {
    /// Market order, good for the day, regular session.
    pub fn market(symbol: Symbol, quantity: i64) -> Self {
        Self {
            symbol,
            quantity,
            price_type: PriceType::Market,
            term: OrderTerm::GoodForDay,
            market_session: MarketSession::Regular,
            limit_price: None,
            stop_price: None,
        }
    }

    /// Limit order, good for the day, regular session.
    pub fn limit(symbol: Symbol, quantity: i64, limit_price: Price) -> Self {
        Self {
            price_type: PriceType::Limit,
            limit_price: Some(limit_price),
            ..Self::market(symbol, quantity)
        }
    }

    pub fn with_term(mut self, term: OrderTerm) -> Self {
        self.term = term;
        self
    }

    pub fn with_market_session(mut self, session: MarketSession) -> Self {
        self.market_session = session;
        self
    }

    pub fn action(&self) -> OrderAction {
        if self.quantity < 0 {
            OrderAction::Sell
        } else {
            OrderAction::Buy
        }
    }

    /// Absolute share count sent on the wire.
    pub fn shares(&self) -> Quantity {
        self.quantity.unsigned_abs()
    }

    /// Check quantity and the price fields against the price type.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.quantity == 0 {
            return Err(ValidationError::ZeroQuantity);
        }

        match (self.price_type.needs_limit_price(), self.limit_price) {
            (true, None) => return Err(ValidationError::MissingLimitPrice),
            (false, Some(_)) => return Err(ValidationError::UnexpectedLimitPrice),
            (true, Some(p)) if !p.is_positive() => return Err(ValidationError::ZeroPrice),
            _ => {}
        }

        match (self.price_type.needs_stop_price(), self.stop_price) {
            (true, None) => Err(ValidationError::MissingStopPrice),
            (false, Some(_)) => Err(ValidationError::UnexpectedStopPrice),
            (true, Some(p)) if !p.is_positive() => Err(ValidationError::ZeroPrice),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for OrderIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.action(),
            self.shares(),
            self.symbol,
            self.price_type
        )?;
        if let Some(limit) = self.limit_price {
            write!(f, " limit {limit}")?;
        }
        if let Some(stop) = self.stop_price {
            write!(f, " stop {stop}")?;
        }
        write!(f, " ({}, {})", self.term, self.market_session)
    }
}

const CLIENT_ORDER_ID_MAX: usize = 20;

/// Caller-chosen idempotency token for one logical order.
///
/// Reuse an id only to retry the same order; the backend deduplicates
/// placements that carry an id it has already accepted.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClientOrderId(String);

impl ClientOrderId {
    /// Validate a caller-supplied id.
    pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
        let id = id.into();
        if id.is_empty()
            || id.len() > CLIENT_ORDER_ID_MAX
            || !id.bytes().all(|b| b.is_ascii_alphanumeric())
        {
            return Err(ValidationError::MalformedClientOrderId);
        }
        Ok(Self(id))
    }

    /// Fresh id from the first 20 hex digits of a random UUID.
    pub fn generate() -> Self {
        let mut id = uuid::Uuid::new_v4().simple().to_string();
        id.truncate(CLIENT_ORDER_ID_MAX);
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientOrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aapl() -> Symbol {
        Symbol::new("AAPL")
    }

    #[test]
    fn action_follows_sign() {
        assert_eq!(OrderIntent::market(aapl(), 50).action(), OrderAction::Buy);
        assert_eq!(OrderIntent::market(aapl(), -50).action(), OrderAction::Sell);
        assert_eq!(OrderIntent::market(aapl(), -50).shares(), 50);
    }

    #[test]
    fn market_order_validates() {
        assert!(OrderIntent::market(aapl(), 10).validate().is_ok());
    }

    #[test]
    fn zero_quantity_rejected() {
        assert_eq!(
            OrderIntent::market(aapl(), 0).validate(),
            Err(ValidationError::ZeroQuantity)
        );
    }

    #[test]
    fn market_order_with_limit_rejected() {
        let mut intent = OrderIntent::market(aapl(), 10);
        intent.limit_price = Some(Price(150_00));
        assert_eq!(
            intent.validate(),
            Err(ValidationError::UnexpectedLimitPrice)
        );
    }

    #[test]
    fn limit_order_requires_price() {
        let mut intent = OrderIntent::limit(aapl(), 10, Price(150_00));
        assert!(intent.validate().is_ok());

        intent.limit_price = None;
        assert_eq!(intent.validate(), Err(ValidationError::MissingLimitPrice));

        intent.limit_price = Some(Price::ZERO);
        assert_eq!(intent.validate(), Err(ValidationError::ZeroPrice));
    }

    #[test]
    fn stop_limit_requires_both_prices() {
        let mut intent = OrderIntent::limit(aapl(), -10, Price(140_00));
        intent.price_type = PriceType::StopLimit;
        assert_eq!(intent.validate(), Err(ValidationError::MissingStopPrice));

        intent.stop_price = Some(Price(141_00));
        assert!(intent.validate().is_ok());
    }

    #[test]
    fn stop_order_rejects_limit() {
        let mut intent = OrderIntent::market(aapl(), -10);
        intent.price_type = PriceType::Stop;
        intent.stop_price = Some(Price(140_00));
        assert!(intent.validate().is_ok());

        intent.limit_price = Some(Price(139_00));
        assert_eq!(
            intent.validate(),
            Err(ValidationError::UnexpectedLimitPrice)
        );
    }

    #[test]
    fn wire_names_parse() {
        assert_eq!("stop_limit".parse::<PriceType>(), Ok(PriceType::StopLimit));
        assert_eq!(
            "good-for-day".parse::<OrderTerm>(),
            Ok(OrderTerm::GoodForDay)
        );
        assert_eq!(
            "EXTENDED".parse::<MarketSession>(),
            Ok(MarketSession::Extended)
        );
        assert!("sometimes".parse::<OrderTerm>().is_err());
        assert_eq!(OrderTerm::FillOrKill.to_string(), "FILL_OR_KILL");
    }

    #[test]
    fn display_intent() {
        let intent = OrderIntent::limit(aapl(), -5, Price(190_00));
        assert_eq!(
            intent.to_string(),
            "SELL 5 AAPL LIMIT limit $190.00 (GOOD_FOR_DAY, REGULAR)"
        );
    }

    #[test]
    fn generated_ids_are_unique_and_wellformed() {
        let a = ClientOrderId::generate();
        let b = ClientOrderId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 20);
        assert!(ClientOrderId::new(a.as_str()).is_ok());
    }

    #[test]
    fn client_order_id_validation() {
        assert!(ClientOrderId::new("4815162342").is_ok());
        assert!(ClientOrderId::new("").is_err());
        assert!(ClientOrderId::new("has-dash").is_err());
        assert!(ClientOrderId::new("x".repeat(21)).is_err());
    }
}
