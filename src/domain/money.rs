use crate::error::PaymentError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A wallet balance.
///
/// Wraps `rust_decimal::Decimal` so that wallet arithmetic cannot be mixed up with
/// signed ledger amounts. Wallet code never lets it drop below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Balance(pub Decimal);

/// A strictly positive monetary amount.
///
/// Every funds movement (credit, debit, transfer, charge) is expressed as an
/// `Amount`; direction comes from the operation, never from the sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, PaymentError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(PaymentError::ValidationError(format!(
                "Amount must be positive, got {value}"
            )))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = PaymentError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Balance {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn covers(&self, amount: Amount) -> bool {
        self.0 >= amount.0
    }

    /// Balance after receiving `amount`; fails instead of overflowing `Decimal`.
    pub fn plus(self, amount: Amount) -> Result<Self, PaymentError> {
        self.0.checked_add(amount.0).map(Self).ok_or_else(|| {
            PaymentError::ValidationError(format!("balance {self} cannot absorb {amount}"))
        })
    }

    /// Balance after paying out `amount`, or `InsufficientFunds`.
    pub fn minus(self, amount: Amount) -> Result<Self, PaymentError> {
        if !self.covers(amount) {
            return Err(PaymentError::InsufficientFunds {
                available: self.0,
                required: amount.0,
            });
        }
        Ok(Self(self.0 - amount.0))
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
