//! Funding amount validation.
//!
//! A funding request names a quantity of the reference fiat currency. The
//! amount is checked against `0 < amount <= max` at the boundary, before any
//! network call is made, and only a [`FundingAmount`] is allowed past it.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::Value;

/// Default per-request ceiling, in reference currency units.
pub const DEFAULT_MAX_AMOUNT: Decimal = Decimal::from_parts(2000, 0, 0, false, 0);

/// Errors produced when an inbound amount fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    /// No amount was supplied.
    #[error("Invalid amount_usd. Must be a number between 0 and {max}: value is missing")]
    Missing {
        /// The configured ceiling.
        max: Decimal,
    },
    /// The supplied value is not numeric.
    #[error("Invalid amount_usd. Must be a number between 0 and {max}: {value} is not a number")]
    NotANumber {
        /// The offending value, as received.
        value: String,
        /// The configured ceiling.
        max: Decimal,
    },
    /// The value is zero, negative, or above the ceiling.
    #[error("Invalid amount_usd. Must be a number between 0 and {max}: {amount} is out of range")]
    OutOfRange {
        /// The parsed amount.
        amount: Decimal,
        /// The configured ceiling.
        max: Decimal,
    },
}

/// A validated funding amount, strictly positive and at most the ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FundingAmount(Decimal);

impl FundingAmount {
    /// Validates `amount` against `0 < amount <= max`.
    ///
    /// # Errors
    ///
    /// Returns [`AmountError::OutOfRange`] if the bound does not hold.
    pub fn new(amount: Decimal, max: Decimal) -> Result<Self, AmountError> {
        if amount <= Decimal::ZERO || amount > max {
            return Err(AmountError::OutOfRange { amount, max });
        }
        Ok(Self(amount.normalize()))
    }

    /// Validates an untyped JSON value as received from a request body.
    ///
    /// Numbers and numeric strings are accepted; `null` counts as missing.
    ///
    /// # Errors
    ///
    /// Returns [`AmountError`] describing why the value was rejected.
    pub fn from_json(value: Option<&Value>, max: Decimal) -> Result<Self, AmountError> {
        let raw = match value {
            None | Some(Value::Null) => return Err(AmountError::Missing { max }),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::String(s)) => s.trim().to_owned(),
            Some(other) => {
                return Err(AmountError::NotANumber {
                    value: other.to_string(),
                    max,
                });
            }
        };
        let amount = parse_decimal(&raw).ok_or_else(|| AmountError::NotANumber {
            value: raw.clone(),
            max,
        })?;
        Self::new(amount, max)
    }

    /// Returns the amount as a decimal.
    #[must_use]
    pub const fn value(&self) -> Decimal {
        self.0
    }
}

impl Display for FundingAmount {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

fn parse_decimal(raw: &str) -> Option<Decimal> {
    if raw.is_empty() {
        return None;
    }
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}
