//! Validation errors for order intents and client order ids.

use std::fmt;

/// Errors returned when an [`OrderIntent`](crate::OrderIntent) or a
/// [`ClientOrderId`](crate::ClientOrderId) is not well formed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ValidationError {
    /// Quantity delta must be non-zero.
    ZeroQuantity,
    /// Limit and stop prices must be greater than zero.
    ZeroPrice,
    /// Limit and stop-limit orders need a limit price.
    MissingLimitPrice,
    /// Only limit and stop-limit orders may carry a limit price.
    UnexpectedLimitPrice,
    /// Stop and stop-limit orders need a stop price.
    MissingStopPrice,
    /// Only stop and stop-limit orders may carry a stop price.
    UnexpectedStopPrice,
    /// Client order ids are 1..=20 ASCII alphanumerics.
    MalformedClientOrderId,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::ZeroQuantity => write!(f, "quantity must be non-zero"),
            ValidationError::ZeroPrice => write!(f, "price must be greater than zero"),
            ValidationError::MissingLimitPrice => {
                write!(f, "limit price required for this price type")
            }
            ValidationError::UnexpectedLimitPrice => {
                write!(f, "limit price not allowed for this price type")
            }
            ValidationError::MissingStopPrice => {
                write!(f, "stop price required for this price type")
            }
            ValidationError::UnexpectedStopPrice => {
                write!(f, "stop price not allowed for this price type")
            }
            ValidationError::MalformedClientOrderId => {
                write!(f, "client order id must be 1-20 alphanumeric characters")
            }
        }
    }
}

impl std::error::Error for ValidationError {}
