//! Target allocations: desired per-symbol exposure in percent or dollars.

use std::fmt;

use crate::types::Symbol;

/// Unit system for allocation values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "UPPERCASE"))]
pub enum Basis {
    /// Fraction of total account value (`0.25` = 25%).
    Percent,
    /// Absolute dollar amount.
    Nominal,
}

impl fmt::Display for Basis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Basis::Percent => write!(f, "PERCENT"),
            Basis::Nominal => write!(f, "NOMINAL"),
        }
    }
}

/// Desired allocation for the listed symbols only. Holdings not listed are
/// left alone.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Target {
    pub basis: Basis,
    pub allocations: Vec<(Symbol, f64)>,
}

impl Target {
    pub fn new(basis: Basis, allocations: impl IntoIterator<Item = (Symbol, f64)>) -> Self {
        Self {
            basis,
            allocations: allocations.into_iter().collect(),
        }
    }

    pub fn symbols(&self) -> impl Iterator<Item = Symbol> + '_ {
        self.allocations.iter().map(|(s, _)| *s)
    }
}

/// Desired state of the whole portfolio. Holdings not listed are targeted
/// to zero.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TargetPortfolio {
    pub basis: Basis,
    pub allocations: Vec<(Symbol, f64)>,
}

impl TargetPortfolio {
    pub fn new(basis: Basis, allocations: impl IntoIterator<Item = (Symbol, f64)>) -> Self {
        Self {
            basis,
            allocations: allocations.into_iter().collect(),
        }
    }

    pub fn symbols(&self) -> impl Iterator<Item = Symbol> + '_ {
        self.allocations.iter().map(|(s, _)| *s)
    }
}

impl From<TargetPortfolio> for Target {
    fn from(portfolio: TargetPortfolio) -> Self {
        Target {
            basis: portfolio.basis,
            allocations: portfolio.allocations,
        }
    }
}
