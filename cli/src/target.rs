//! Target allocation file (JSON) loading and validation.
//!
//! ```json
//! {
//!   "timestamp": "2026-02-08T15:30:00Z",
//!   "basis": "PERCENT",
//!   "allocations": { "AAPL": 0.40, "MSFT": 0.30 }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tradegate::{Basis, Symbol, Target, TargetPortfolio};

use crate::error::{Error, Result};

/// A target allocation as written by the optimizer or by hand.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetFile {
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    pub basis: Basis,
    /// Symbol -> fraction of account value (`PERCENT`) or dollars (`NOMINAL`).
    /// Zero or negative means liquidate.
    #[serde(default)]
    pub allocations: BTreeMap<String, f64>,
}

impl TargetFile {
    /// Load and validate a target file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::TargetRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json(&contents)
    }

    /// Parse from a JSON string (useful for testing).
    pub fn from_json(json: &str) -> Result<Self> {
        let file: TargetFile = serde_json::from_str(json)?;
        file.validate()?;
        Ok(file)
    }

    fn validate(&self) -> Result<()> {
        for (symbol, value) in &self.allocations {
            if symbol.is_empty() {
                return Err(Error::Target("empty symbol".into()));
            }
            if Symbol::try_new(symbol).is_none() {
                return Err(Error::Target(format!(
                    "symbol '{symbol}' is not 1-8 printable ASCII bytes"
                )));
            }
            if !value.is_finite() {
                return Err(Error::Target(format!("allocation for {symbol} is not finite")));
            }
            if self.basis == Basis::Percent && value.abs() > 1.0 {
                return Err(Error::Target(format!(
                    "allocation for {symbol} ({value}) has magnitude > 1.0"
                )));
            }
        }

        if self.basis == Basis::Percent {
            let long_sum: f64 = self.allocations.values().filter(|v| **v > 0.0).sum();
            if long_sum > 1.0 + 1e-9 {
                return Err(Error::Target(format!(
                    "allocations sum to {long_sum:.4} (> 1.0)"
                )));
            }
        }
        Ok(())
    }

    fn pairs(&self) -> Vec<(Symbol, f64)> {
        // Validated: every key is a legal symbol
        self.allocations
            .iter()
            .filter_map(|(s, v)| Symbol::try_new(s).map(|sym| (sym, *v)))
            .collect()
    }

    /// Partial target: unlisted holdings are left alone.
    pub fn to_target(&self) -> Target {
        Target::new(self.basis, self.pairs())
    }

    /// Whole-portfolio target: unlisted holdings are sold.
    pub fn to_portfolio(&self) -> TargetPortfolio {
        TargetPortfolio::new(self.basis, self.pairs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_json() -> &'static str {
        r#"{
            "timestamp": "2026-02-08T15:30:00Z",
            "basis": "PERCENT",
            "allocations": { "MSFT": 0.30, "AAPL": 0.40, "SPY": 0.0 }
        }"#
    }

    #[test]
    fn parse_valid_target() {
        let file = TargetFile::from_json(valid_json()).unwrap();
        assert_eq!(file.basis, Basis::Percent);
        assert!(file.timestamp.is_some());

        let target = file.to_target();
        assert_eq!(target.basis, Basis::Percent);
        // Sorted by symbol
        assert_eq!(target.allocations[0], (Symbol::new("AAPL"), 0.40));
        assert_eq!(target.allocations.len(), 3);
    }

    #[test]
    fn nominal_allows_large_values() {
        let file = TargetFile::from_json(
            r#"{ "basis": "NOMINAL", "allocations": { "AAPL": 5000.0, "TSLA": -1.0 } }"#,
        )
        .unwrap();
        assert!(file.timestamp.is_none());
        let portfolio = file.to_portfolio();
        assert_eq!(portfolio.basis, Basis::Nominal);
        assert_eq!(portfolio.allocations.len(), 2);
    }

    #[test]
    fn empty_portfolio_is_allowed() {
        let file = TargetFile::from_json(r#"{ "basis": "PERCENT", "allocations": {} }"#).unwrap();
        assert!(file.to_portfolio().allocations.is_empty());
    }

    #[test]
    fn reject_long_symbol() {
        let err = TargetFile::from_json(
            r#"{ "basis": "PERCENT", "allocations": { "TOOLONGSYM": 0.1 } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Target(_)));
    }

    #[test]
    fn reject_empty_symbol() {
        assert!(TargetFile::from_json(r#"{ "basis": "PERCENT", "allocations": { "": 0.1 } }"#).is_err());
    }

    #[test]
    fn reject_percent_over_one() {
        assert!(
            TargetFile::from_json(r#"{ "basis": "PERCENT", "allocations": { "AAPL": 1.5 } }"#)
                .is_err()
        );
        assert!(
            TargetFile::from_json(
                r#"{ "basis": "PERCENT", "allocations": { "AAPL": 0.6, "MSFT": 0.6 } }"#
            )
            .is_err()
        );
    }

    #[test]
    fn reject_unknown_basis() {
        let err =
            TargetFile::from_json(r#"{ "basis": "SHARES", "allocations": {} }"#).unwrap_err();
        assert!(matches!(err, Error::TargetParse(_)));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("target.json");
        std::fs::write(&path, valid_json()).unwrap();
        assert!(TargetFile::load(&path).is_ok());

        let missing = dir.path().join("missing.json");
        assert!(matches!(
            TargetFile::load(&missing),
            Err(Error::TargetRead { .. })
        ));
    }
}
