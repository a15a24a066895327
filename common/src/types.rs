//! Primitive value types: fixed-point price, quantity, symbol, sides and kinds

use crate::constants::PRICE_SCALE;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Price in fixed-point ticks (1 tick = 0.0001 display units)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Px(i64);

impl Px {
    /// Zero price, also the empty-side sentinel
    pub const ZERO: Self = Self(0);

    /// Create a price from display units, rounding to the nearest tick
    ///
    /// For external inputs only; internal code should stay in ticks.
    #[must_use]
    pub fn new(value: f64) -> Self {
        let scaled = (value * PRICE_SCALE as f64).round();
        const MAX_SAFE: f64 = 9_223_372_036_854_775_807.0;
        const MIN_SAFE: f64 = -9_223_372_036_854_775_808.0;
        let clamped = if scaled >= MAX_SAFE {
            i64::MAX
        } else if scaled <= MIN_SAFE {
            i64::MIN
        } else {
            #[allow(clippy::cast_possible_truncation)]
            let ticks = scaled as i64;
            ticks
        };
        Self(clamped)
    }

    /// Create from raw ticks
    #[must_use]
    pub const fn from_i64(ticks: i64) -> Self {
        Self(ticks)
    }

    /// Raw ticks
    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        self.0
    }

    /// Display units; lossy above 2^53 / 10_000, boundary use only
    #[must_use]
    pub fn as_f64(&self) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        {
            self.0 as f64 / PRICE_SCALE as f64
        }
    }

    /// True for the zero sentinel
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Fixed-point addition
    #[must_use]
    pub const fn add(self, other: Self) -> Self {
        Self(self.0 + other.0)
    }

    /// Fixed-point subtraction
    #[must_use]
    pub const fn sub(self, other: Self) -> Self {
        Self(self.0 - other.0)
    }

    /// Saturating fixed-point subtraction, floored at zero
    #[must_use]
    pub const fn saturating_sub_floor(self, other: Self) -> Self {
        let d = self.0 - other.0;
        if d < 0 { Self(0) } else { Self(d) }
    }
}

impl fmt::Display for Px {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / PRICE_SCALE;
        let frac = (self.0 % PRICE_SCALE).abs();
        write!(f, "{whole}.{frac:04}")
    }
}

/// Order / trade quantity in whole units
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Qty(u64);

impl Qty {
    /// Zero quantity
    pub const ZERO: Self = Self(0);

    /// Create from a unit count
    #[must_use]
    pub const fn new(units: u64) -> Self {
        Self(units)
    }

    /// Unit count
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// True when zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Saturating addition
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Saturating subtraction, floored at zero
    #[must_use]
    pub const fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }
}

impl fmt::Display for Qty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Maximum symbol length in bytes
pub const SYMBOL_LEN: usize = 16;

/// Fixed-width instrument identifier: ASCII, NUL-padded to 16 bytes
///
/// Two symbols are equal iff their byte images are equal, so the type is
/// cheap to copy, compare and hash.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol([u8; SYMBOL_LEN]);

impl Symbol {
    /// Build a symbol from a string, truncating to 15 bytes so the final
    /// byte stays NUL
    #[must_use]
    pub fn new(name: &str) -> Self {
        let mut buf = [0u8; SYMBOL_LEN];
        let bytes = name.as_bytes();
        let len = bytes.len().min(SYMBOL_LEN - 1);
        buf[..len].copy_from_slice(&bytes[..len]);
        Self(buf)
    }

    /// Build a symbol from raw bytes, truncating to 15 bytes
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut buf = [0u8; SYMBOL_LEN];
        let len = bytes.len().min(SYMBOL_LEN - 1);
        buf[..len].copy_from_slice(&bytes[..len]);
        Self(buf)
    }

    /// The symbol text up to the first NUL
    #[must_use]
    pub fn as_str(&self) -> &str {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(SYMBOL_LEN);
        std::str::from_utf8(&self.0[..end]).unwrap_or("")
    }

    /// Raw padded bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; SYMBOL_LEN] {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Symbol {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Symbol {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::new(&s))
    }
}

/// Trade / order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Buying interest (bids)
    Buy,
    /// Selling interest (asks)
    Sell,
}

impl Side {
    /// The opposite side
    #[must_use]
    pub const fn flip(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

/// Kind discriminant of an inbound market-data message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// Executed trade print
    Trade,
    /// Top-of-book quote
    Quote,
    /// Aggregate level addition
    OrderAdd,
    /// Aggregate level move
    OrderModify,
    /// Aggregate level reduction
    OrderDelete,
    /// Full book refresh
    BookSnapshot,
    /// Session keep-alive
    Heartbeat,
    /// Exchange statistics broadcast
    Statistics,
}
