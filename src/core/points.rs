use super::error::{LedgerError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Non-negative point balance with half-unit granularity.
///
/// Stored as a count of half points so that every balance is a multiple of
/// 0.5 by construction; on the wire it is a plain JSON number (`17.5`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Points {
    half_units: u64,
}

impl Points {
    pub const ZERO: Points = Points { half_units: 0 };

    pub const fn whole(points: u64) -> Self {
        Self { half_units: points * 2 }
    }

    pub const fn from_half_units(half_units: u64) -> Self {
        Self { half_units }
    }

    /// Rounds to the nearest half point; negatives and NaN become zero.
    pub fn from_f64_clamped(value: f64) -> Self {
        if !value.is_finite() || value <= 0.0 {
            return Self::ZERO;
        }
        let doubled = (value * 2.0).round();
        if doubled >= u64::MAX as f64 {
            return Self { half_units: u64::MAX };
        }
        Self { half_units: doubled as u64 }
    }

    /// Parses a caller-supplied amount, rejecting negative or non-finite input.
    pub fn parse_amount(value: f64) -> Result<Self> {
        if !value.is_finite() {
            return Err(LedgerError::InvalidAmount("amount must be a finite number".into()));
        }
        if value < 0.0 {
            return Err(LedgerError::InvalidAmount(format!(
                "amount must be >= 0, got {}",
                value
            )));
        }
        Ok(Self::from_f64_clamped(value))
    }

    pub fn half_units(self) -> u64 {
        self.half_units
    }

    pub fn as_f64(self) -> f64 {
        self.half_units as f64 / 2.0
    }

    pub fn is_zero(self) -> bool {
        self.half_units == 0
    }

    pub fn saturating_add(self, other: Points) -> Self {
        Self { half_units: self.half_units.saturating_add(other.half_units) }
    }

    /// Subtraction clamped at zero.
    pub fn saturating_sub(self, other: Points) -> Self {
        Self { half_units: self.half_units.saturating_sub(other.half_units) }
    }
}

impl fmt::Display for Points {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.half_units % 2 == 0 {
            write!(f, "{}", self.half_units / 2)
        } else {
            write!(f, "{}.5", self.half_units / 2)
        }
    }
}

impl Serialize for Points {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

impl<'de> Deserialize<'de> for Points {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = f64::deserialize(deserializer)?;
        Ok(Self::from_f64_clamped(raw))
    }
}
