//! Shared broker types: credentials, accounts, positions, quotes, order results.

use std::fmt;

use serde::Serialize;
use tradegate::{ClientOrderId, Holding, Price, Symbol};
use zeroize::Zeroize;

use crate::error::{BrokerError, Precondition};

/// Application credentials issued by the brokerage (OAuth consumer).
#[derive(Clone, PartialEq, Eq)]
pub struct ConsumerCredentials {
    pub key: String,
    pub secret: String,
}

impl ConsumerCredentials {
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            secret: secret.into(),
        }
    }
}

impl Drop for ConsumerCredentials {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

impl fmt::Debug for ConsumerCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerCredentials")
            .field("key", &self.key)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Where a connection is in the three-legged OAuth flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HandshakePhase {
    Unauthenticated,
    RequestTokenObtained,
    Authorized,
}

impl fmt::Display for HandshakePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakePhase::Unauthenticated => write!(f, "unauthenticated"),
            HandshakePhase::RequestTokenObtained => write!(f, "request token obtained"),
            HandshakePhase::Authorized => write!(f, "authorized"),
        }
    }
}

/// A brokerage account picked for this connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountHandle {
    /// Account id with separators stripped (e.g. `12345678`).
    pub account_id: String,
    /// Opaque key the backend uses in account-scoped URLs.
    pub account_key: String,
}

/// Strip everything but ASCII alphanumerics from a human-entered account id.
pub fn normalize_account_id(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_alphanumeric).collect()
}

/// Guard shared by all account-scoped operations: authorized and an account
/// selected, checked before any request is built.
pub fn require_ready(
    phase: HandshakePhase,
    account: Option<&AccountHandle>,
) -> Result<&AccountHandle, BrokerError> {
    if phase != HandshakePhase::Authorized {
        return Err(Precondition::NotAuthorized.into());
    }
    account.ok_or(BrokerError::Precondition(Precondition::NoAccountSelected))
}

/// Broker-level position.
#[derive(Debug, Clone, Serialize)]
pub struct Position {
    pub symbol: Symbol,
    /// Positive = long, negative = short.
    pub quantity: i64,
    pub market_value: Price,
    pub last_price: Price,
    /// Backend security type (`EQ` for shares), when the backend reports one.
    pub security_type: Option<String>,
    /// The backend's position record, passed through untouched.
    pub raw: serde_json::Value,
}

impl Position {
    /// Shares of the symbol itself. Options and other derivatives carry the
    /// underlying's symbol but are not share holdings.
    pub fn is_equity(&self) -> bool {
        self.security_type.as_deref().is_none_or(|t| t == "EQ")
    }

    /// The resolver's view of this position; `None` for non-equity records.
    pub fn holding(&self) -> Option<Holding> {
        self.is_equity().then_some(Holding {
            symbol: self.symbol,
            quantity: self.quantity,
        })
    }
}

/// Latest quote for a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Quote {
    pub symbol: Symbol,
    pub bid: Price,
    pub ask: Price,
    pub last: Price,
}

impl Quote {
    /// Price used for sizing orders: last trade, else the bid/ask midpoint.
    pub fn reference_price(&self) -> Option<Price> {
        if self.last.is_positive() {
            return Some(self.last);
        }
        if self.bid.is_positive() && self.ask.is_positive() {
            return Some(Price((self.bid.0 + self.ask.0) / 2));
        }
        None
    }
}

/// Outcome of a confirmed order placement.
#[derive(Debug, Clone, Serialize)]
pub struct OrderResult {
    pub client_order_id: ClientOrderId,
    pub preview_id: u64,
    /// The backend's placement confirmation, verbatim.
    pub confirmation: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_id_normalization() {
        assert_eq!(normalize_account_id("1234-5678"), "12345678");
        assert_eq!(normalize_account_id(" 12 34_56.78 "), "12345678");
        assert_eq!(normalize_account_id("AB-12"), "AB12");
    }

    #[test]
    fn ready_guard_checks_phase_before_account() {
        let handle = AccountHandle {
            account_id: "1".into(),
            account_key: "k".into(),
        };
        assert!(matches!(
            require_ready(HandshakePhase::RequestTokenObtained, Some(&handle)),
            Err(BrokerError::Precondition(Precondition::NotAuthorized))
        ));
        assert!(matches!(
            require_ready(HandshakePhase::Authorized, None),
            Err(BrokerError::Precondition(Precondition::NoAccountSelected))
        ));
        assert_eq!(
            require_ready(HandshakePhase::Authorized, Some(&handle)).unwrap(),
            &handle
        );
    }

    #[test]
    fn reference_price_falls_back_to_mid() {
        let mut q = Quote {
            symbol: Symbol::new("AAPL"),
            bid: Price(149_50),
            ask: Price(150_50),
            last: Price(150_10),
        };
        assert_eq!(q.reference_price(), Some(Price(150_10)));
        q.last = Price::ZERO;
        assert_eq!(q.reference_price(), Some(Price(150_00)));
        q.bid = Price::ZERO;
        assert_eq!(q.reference_price(), None);
    }

    #[test]
    fn only_equity_positions_are_holdings() {
        let mut p = Position {
            symbol: Symbol::new("AAPL"),
            quantity: 2,
            market_value: Price(900_00),
            last_price: Price(4_50),
            security_type: Some("OPTN".into()),
            raw: serde_json::Value::Null,
        };
        assert!(!p.is_equity());
        assert_eq!(p.holding(), None);

        p.security_type = None;
        assert_eq!(
            p.holding(),
            Some(Holding {
                symbol: Symbol::new("AAPL"),
                quantity: 2
            })
        );
        p.security_type = Some("EQ".into());
        assert!(p.is_equity());
    }

    #[test]
    fn consumer_secret_not_in_debug() {
        let c = ConsumerCredentials::new("key", "hunter2");
        assert!(!format!("{c:?}").contains("hunter2"));
    }
}
