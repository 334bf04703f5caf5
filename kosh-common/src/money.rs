use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Monetary amount in paise, the smallest unit of INR.
///
/// All money in the core is integer paise; floating point is never used.
/// Arithmetic is checked and overflow surfaces as a validation failure.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Paise(pub i64);

impl Paise {
    pub const ZERO: Paise = Paise(0);

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn checked_add(self, other: Paise) -> Result<Paise, CoreError> {
        self.0
            .checked_add(other.0)
            .map(Paise)
            .ok_or_else(|| CoreError::Validation("amount overflow".into()))
    }

    pub fn checked_sub(self, other: Paise) -> Result<Paise, CoreError> {
        self.0
            .checked_sub(other.0)
            .map(Paise)
            .ok_or_else(|| CoreError::Validation("amount underflow".into()))
    }

    /// Rejects zero and negative amounts at the request boundary.
    pub fn require_positive(self) -> Result<Paise, CoreError> {
        if self.is_positive() {
            Ok(self)
        } else {
            Err(CoreError::Validation("amount must be positive".into()))
        }
    }
}

impl fmt::Display for Paise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Settlement currency of an account or wallet.
///
/// The core clears a single currency; the closed enum keeps every currency
/// comparison an exhaustive match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Currency {
    #[serde(rename = "INR")]
    Inr,
}

impl Currency {
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Inr => "INR",
        }
    }

    pub fn from_code(code: &str) -> Result<Self, CoreError> {
        match code {
            "INR" => Ok(Currency::Inr),
            other => Err(CoreError::Validation(format!(
                "unsupported currency: {other}"
            ))),
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_add_overflow() {
        let a = Paise(i64::MAX);
        assert!(a.checked_add(Paise(1)).is_err());
        assert_eq!(Paise(2).checked_add(Paise(3)).unwrap(), Paise(5));
    }

    #[test]
    fn test_require_positive() {
        assert!(Paise(1).require_positive().is_ok());
        assert!(Paise(0).require_positive().is_err());
        assert!(Paise(-5).require_positive().is_err());
    }

    #[test]
    fn test_currency_round_trip() {
        assert_eq!(Currency::from_code("INR").unwrap(), Currency::Inr);
        assert!(Currency::from_code("USD").is_err());
        assert_eq!(Currency::Inr.code(), "INR");
    }
}
