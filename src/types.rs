//! Core value types: Price, Symbol, Quantity

use std::fmt;

/// Price in cents.
///
/// `Price(10050)` represents $100.50. Using fixed-point avoids
/// floating-point drift when summing notionals.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Price(pub i64);

impl Price {
    pub const ZERO: Price = Price(0);

    /// Convert a dollar amount reported by a backend (e.g. `185.5`) to cents,
    /// rounding to the nearest cent. Non-finite input maps to zero.
    pub fn from_dollars(dollars: f64) -> Self {
        if !dollars.is_finite() {
            return Price::ZERO;
        }
        Price((dollars * 100.0).round() as i64)
    }

    /// Dollar value as a float, for wire payloads.
    pub fn as_dollars(self) -> f64 {
        self.0 as f64 / 100.0
    }

    #[inline]
    pub fn is_positive(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dollars = self.0 / 100;
        let cents = (self.0 % 100).abs();
        if self.0 < 0 {
            write!(f, "-${}.{:02}", dollars.abs(), cents)
        } else {
            write!(f, "${}.{:02}", dollars, cents)
        }
    }
}

/// Number of shares. Always positive on the wire; signed deltas live in
/// [`OrderIntent`](crate::OrderIntent).
pub type Quantity = u64;

const SYMBOL_CAP: usize = 8;

/// Ticker symbol stored inline (up to 8 ASCII bytes), so it is `Copy` and
/// cheap to hash.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol {
    bytes: [u8; SYMBOL_CAP],
    len: u8,
}

impl Symbol {
    /// Create a symbol, panicking on invalid input.
    ///
    /// Use [`Symbol::try_new`] for untrusted input.
    pub fn new(s: &str) -> Self {
        Self::try_new(s).unwrap_or_else(|| panic!("invalid symbol: {s:?}"))
    }

    /// Create a symbol from 1..=8 printable, non-whitespace ASCII bytes.
    pub fn try_new(s: &str) -> Option<Self> {
        let raw = s.as_bytes();
        if raw.is_empty() || raw.len() > SYMBOL_CAP {
            return None;
        }
        if !raw.iter().all(|b| b.is_ascii_graphic()) {
            return None;
        }
        let mut bytes = [0u8; SYMBOL_CAP];
        bytes[..raw.len()].copy_from_slice(raw);
        Some(Self {
            bytes,
            len: raw.len() as u8,
        })
    }

    pub fn as_str(&self) -> &str {
        // Constructed only from ASCII input
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or_default()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.as_str())
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Symbol {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Symbol {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Symbol::try_new(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid symbol: {s:?}")))
    }
}
