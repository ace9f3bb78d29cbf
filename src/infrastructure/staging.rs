//! Write buffer behind every [`UnitOfWork`](crate::domain::ports::UnitOfWork).
//!
//! Backends keep committed data in their own format and stage pending writes
//! here. Reads consult the buffer first, so a unit of work always sees its own
//! writes, and `commit` drains the buffer into the backend in one step.

use crate::domain::invoice::{Invoice, PaymentClaim};
use crate::domain::ledger::LedgerEntry;
use crate::domain::user::User;
use crate::domain::wallet::{Wallet, WalletTransaction};
use crate::domain::{InvoiceId, UserId};
use crate::error::{PaymentError, Result};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub(crate) struct Staged {
    pub invoices: HashMap<InvoiceId, Invoice>,
    pub users: HashMap<UserId, User>,
    pub ledger: Vec<LedgerEntry>,
    pub wallets: HashMap<UserId, Wallet>,
    pub created_wallets: u64,
    pub wallet_txs: Vec<WalletTransaction>,
    /// `None` marks a claim removed in this unit of work.
    pub claims: HashMap<InvoiceId, Option<PaymentClaim>>,
}

impl Staged {
    pub fn last_ledger_entry(&self, committed_last: Option<LedgerEntry>) -> Option<LedgerEntry> {
        self.ledger.last().cloned().or(committed_last)
    }

    pub fn ledger_entry_by_key(&self, key: &str) -> Option<&LedgerEntry> {
        self.ledger.iter().find(|e| e.idempotency_key == key)
    }

    /// Stages `entry` after checking key uniqueness and sequence continuity.
    ///
    /// `key_committed` tells whether the backend already holds the key.
    pub fn stage_ledger_entry(
        &mut self,
        committed_last: Option<LedgerEntry>,
        key_committed: bool,
        entry: LedgerEntry,
    ) -> Result<()> {
        if key_committed || self.ledger_entry_by_key(&entry.idempotency_key).is_some() {
            return Err(PaymentError::DuplicateRequest(entry.idempotency_key));
        }
        let expected = self
            .last_ledger_entry(committed_last)
            .map_or(1, |last| last.id + 1);
        if entry.id != expected {
            return Err(PaymentError::internal(format!(
                "ledger sequence violation: expected entry {expected}, got {}",
                entry.id
            )));
        }
        self.ledger.push(entry);
        Ok(())
    }

    /// Staged view of a claim: `Some(None)` if removed here, `None` if untouched.
    pub fn claim(&self, invoice_id: InvoiceId) -> Option<Option<PaymentClaim>> {
        self.claims.get(&invoice_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ledger::NewLedgerEntry;
    use rust_decimal_macros::dec;

    #[test]
    fn test_stage_rejects_duplicate_keys() {
        let mut staged = Staged::default();
        let first = NewLedgerEntry::income("a", dec!(1), "k".into())
            .into_entry(None)
            .unwrap();
        staged
            .stage_ledger_entry(None, false, first.clone())
            .unwrap();

        let again = NewLedgerEntry::income("b", dec!(1), "k".into())
            .into_entry(Some(&first))
            .unwrap();
        assert!(matches!(
            staged.stage_ledger_entry(None, false, again),
            Err(PaymentError::DuplicateRequest(_))
        ));

        let committed = NewLedgerEntry::income("c", dec!(1), "other".into())
            .into_entry(Some(&first))
            .unwrap();
        assert!(matches!(
            staged.stage_ledger_entry(None, true, committed),
            Err(PaymentError::DuplicateRequest(_))
        ));
    }

    #[test]
    fn test_stage_rejects_sequence_gaps() {
        let mut staged = Staged::default();
        let mut entry = NewLedgerEntry::income("a", dec!(1), "k".into())
            .into_entry(None)
            .unwrap();
        entry.id = 5;
        assert!(staged.stage_ledger_entry(None, false, entry).is_err());
        assert!(staged.ledger.is_empty());
    }
}
