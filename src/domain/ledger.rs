use super::{InvoiceId, PropertyId, UserId};
use crate::error::PaymentError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Suffix of the ledger entry that credits the owner with the rent.
pub const RENT_SUFFIX: &str = "RENT";
/// Suffix of the ledger entry that credits the platform with the service fee.
pub const FEE_SUFFIX: &str = "FEE";

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
pub enum EntryType {
    Income,
    Expense,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
pub enum EntryStatus {
    #[default]
    Completed,
}

/// An immutable row of the financial ledger.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct LedgerEntry {
    /// Monotonic sequence number assigned by the store.
    pub id: u64,
    pub date: DateTime<Utc>,
    pub description: String,
    pub entry_type: EntryType,
    /// Signed amount; income is positive.
    pub amount: Decimal,
    /// Running balance after this entry.
    pub balance: Decimal,
    pub status: EntryStatus,
    pub invoice_id: Option<InvoiceId>,
    pub property_id: Option<PropertyId>,
    /// `None` means the entry belongs to the platform.
    pub owner_id: Option<UserId>,
    pub idempotency_key: String,
    /// Gateway or wallet transaction id of the payment behind this entry.
    #[serde(default)]
    pub external_ref: Option<String>,
}

/// A ledger entry before it has been given an id and a running balance.
#[derive(Debug, PartialEq, Clone)]
pub struct NewLedgerEntry {
    pub date: DateTime<Utc>,
    pub description: String,
    pub entry_type: EntryType,
    pub amount: Decimal,
    pub invoice_id: Option<InvoiceId>,
    pub property_id: Option<PropertyId>,
    pub owner_id: Option<UserId>,
    pub idempotency_key: String,
    pub external_ref: Option<String>,
}

impl NewLedgerEntry {
    pub fn income(
        description: impl Into<String>,
        amount: Decimal,
        idempotency_key: String,
    ) -> Self {
        Self {
            date: Utc::now(),
            description: description.into(),
            entry_type: EntryType::Income,
            amount,
            invoice_id: None,
            property_id: None,
            owner_id: None,
            idempotency_key,
            external_ref: None,
        }
    }

    /// Finalises the entry on top of `previous`, the most recent ledger row.
    ///
    /// Fails when the running balance would leave the `Decimal` range.
    pub fn into_entry(
        self,
        previous: Option<&LedgerEntry>,
    ) -> Result<LedgerEntry, PaymentError> {
        let (id, prev_balance) = previous
            .map(|p| (p.id + 1, p.balance))
            .unwrap_or((1, Decimal::ZERO));
        let balance = prev_balance.checked_add(self.amount).ok_or_else(|| {
            PaymentError::ValidationError(format!(
                "ledger balance {prev_balance} cannot absorb {}",
                self.amount
            ))
        })?;
        Ok(LedgerEntry {
            id,
            date: self.date,
            description: self.description,
            entry_type: self.entry_type,
            amount: self.amount,
            balance,
            status: EntryStatus::Completed,
            invoice_id: self.invoice_id,
            property_id: self.property_id,
            owner_id: self.owner_id,
            idempotency_key: self.idempotency_key,
            external_ref: self.external_ref,
        })
    }
}

/// Derives the key of one entry written for a payment attempt.
pub fn entry_key(idempotency_key: &str, suffix: &str) -> String {
    format!("{idempotency_key}-{suffix}")
}

/// Key used when the caller did not supply one.
pub fn derive_idempotency_key(scope: &str, user_id: UserId, invoice_id: InvoiceId) -> String {
    format!(
        "{scope}-{user_id}-{invoice_id}-{}",
        Utc::now().timestamp_millis()
    )
}
