//! Broker error types.
//!
//! Every backend or transport failure is converted into one of these kinds
//! at the backend boundary, so callers can tell "your input was wrong"
//! apart from "the backend could not be reached".

use std::fmt;

use tradegate::{AllocationError, ClientOrderId, Price, ValidationError};

/// Which state requirement an operation did not meet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// `complete_handshake` before `begin_handshake`.
    HandshakeNotStarted,
    /// `begin_handshake` while a request token is outstanding.
    HandshakeInProgress,
    /// A handshake step after the session is already authorized.
    AlreadyAuthorized,
    /// An authenticated call before the handshake completed.
    NotAuthorized,
    /// An account-scoped call before `select_account`.
    NoAccountSelected,
}

impl fmt::Display for Precondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Precondition::HandshakeNotStarted => write!(f, "handshake not started"),
            Precondition::HandshakeInProgress => write!(f, "handshake already in progress"),
            Precondition::AlreadyAuthorized => write!(f, "session already authorized"),
            Precondition::NotAuthorized => write!(f, "session not authorized"),
            Precondition::NoAccountSelected => write!(f, "no account selected"),
        }
    }
}

/// Errors that can occur during broker operations.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("unknown backend: {0}")]
    UnknownBackend(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("precondition failed: {0}")]
    Precondition(Precondition),

    #[error("handshake transport error: {0}")]
    HandshakeTransport(String),

    #[error("backend query error: {0}")]
    BackendQuery(String),

    #[error("order preview failed (client order id {client_order_id}): {reason}")]
    OrderPreviewFailed {
        client_order_id: ClientOrderId,
        reason: String,
    },

    #[error("order placement failed (client order id {client_order_id}): {reason}")]
    OrderPlacementFailed {
        client_order_id: ClientOrderId,
        preview_id: Option<u64>,
        reason: String,
    },

    #[error("insufficient funds: need {required}, {available} available")]
    InsufficientFunds { required: Price, available: Price },

    #[error("invalid account: {0}")]
    InvalidAccount(String),

    #[error("invalid order: {0}")]
    InvalidOrder(#[from] ValidationError),
}

impl BrokerError {
    /// True when the caller supplied something wrong (and can fix it),
    /// false for operational failures of the backend or transport.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            BrokerError::UnknownBackend(_)
                | BrokerError::SessionNotFound(_)
                | BrokerError::Precondition(_)
                | BrokerError::InsufficientFunds { .. }
                | BrokerError::InvalidAccount(_)
                | BrokerError::InvalidOrder(_)
        )
    }

    /// True when repeating the call may succeed without changing input.
    ///
    /// A failed preview may be retried with a fresh client order id; a
    /// failed placement only with the same one.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BrokerError::HandshakeTransport(_)
                | BrokerError::BackendQuery(_)
                | BrokerError::OrderPreviewFailed { .. }
                | BrokerError::OrderPlacementFailed { .. }
        )
    }

    /// HTTP status a request facade should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            BrokerError::UnknownBackend(_)
            | BrokerError::SessionNotFound(_)
            | BrokerError::Precondition(_)
            | BrokerError::InvalidAccount(_) => 404,
            BrokerError::InsufficientFunds { .. } | BrokerError::InvalidOrder(_) => 400,
            BrokerError::HandshakeTransport(_)
            | BrokerError::BackendQuery(_)
            | BrokerError::OrderPreviewFailed { .. }
            | BrokerError::OrderPlacementFailed { .. } => 500,
        }
    }
}

impl From<Precondition> for BrokerError {
    fn from(p: Precondition) -> Self {
        BrokerError::Precondition(p)
    }
}

impl From<AllocationError> for BrokerError {
    fn from(e: AllocationError) -> Self {
        match e {
            AllocationError::InsufficientFunds {
                required,
                available,
            } => BrokerError::InsufficientFunds {
                required,
                available,
            },
            // Prices come from the backend's quote endpoint
            AllocationError::MissingPrice(symbol) => {
                BrokerError::BackendQuery(format!("no usable quote for {symbol}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tradegate::Symbol;

    #[test]
    fn user_errors_map_to_client_statuses() {
        let e = BrokerError::InvalidAccount("12345678".into());
        assert!(e.is_user_error());
        assert!(!e.is_retryable());
        assert_eq!(e.http_status(), 404);

        let e = BrokerError::from(Precondition::NotAuthorized);
        assert_eq!(e.http_status(), 404);
        assert_eq!(e.to_string(), "precondition failed: session not authorized");

        let e = BrokerError::from(ValidationError::MissingLimitPrice);
        assert_eq!(e.http_status(), 400);
    }

    #[test]
    fn operational_errors_map_to_500() {
        let e = BrokerError::OrderPlacementFailed {
            client_order_id: ClientOrderId::new("abc123").unwrap(),
            preview_id: Some(7),
            reason: "503".into(),
        };
        assert!(!e.is_user_error());
        assert!(e.is_retryable());
        assert_eq!(e.http_status(), 500);
        assert!(e.to_string().contains("abc123"));
    }

    #[test]
    fn allocation_errors_convert() {
        let e: BrokerError = AllocationError::InsufficientFunds {
            required: Price(600_00),
            available: Price(400_00),
        }
        .into();
        assert!(matches!(e, BrokerError::InsufficientFunds { .. }));
        assert!(e.is_user_error());

        let e: BrokerError = AllocationError::MissingPrice(Symbol::new("AAPL")).into();
        assert!(matches!(e, BrokerError::BackendQuery(_)));
    }
}
