//! Native-currency amounts.

use std::fmt;
use std::str::FromStr;

/// An amount of native currency in wei (10^-18 ether).
///
/// 128 bits covers every balance a load test moves around; balances reported
/// wider than that are saturated by the client.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Wei(pub u128);

impl Wei {
    /// Zero wei.
    pub const ZERO: Self = Self(0);

    /// Wei per ether.
    pub const PER_ETHER: u128 = 1_000_000_000_000_000_000;

    /// Construct from a whole number of ether.
    pub const fn from_ether(ether: u128) -> Self {
        Self(ether * Self::PER_ETHER)
    }

    /// Check if this is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Subtract, returning `None` on underflow.
    pub fn checked_sub(self, other: Wei) -> Option<Wei> {
        self.0.checked_sub(other.0).map(Wei)
    }

    /// Add, saturating at `u128::MAX`.
    pub fn saturating_add(self, other: Wei) -> Wei {
        Wei(self.0.saturating_add(other.0))
    }

    /// Render as a decimal ether string, e.g. `1.5`.
    pub fn to_ether_string(&self) -> String {
        let whole = self.0 / Self::PER_ETHER;
        let frac = self.0 % Self::PER_ETHER;
        if frac == 0 {
            return whole.to_string();
        }
        let frac = format!("{:018}", frac);
        format!("{}.{}", whole, frac.trim_end_matches('0'))
    }
}

impl fmt::Debug for Wei {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Wei({})", self.0)
    }
}

impl fmt::Display for Wei {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u128> for Wei {
    fn from(value: u128) -> Self {
        Self(value)
    }
}

impl FromStr for Wei {
    type Err = std::num::ParseIntError;

    /// Parse a decimal wei amount.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u128>().map(Wei)
    }
}
