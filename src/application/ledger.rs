use crate::domain::invoice::Invoice;
use crate::domain::ledger::{
    EntryType, FEE_SUFFIX, LedgerEntry, NewLedgerEntry, RENT_SUFFIX, entry_key,
};
use crate::domain::ports::{StorageHandle, UnitOfWork};
use crate::domain::{InvoiceId, UserId};
use crate::error::{PaymentError, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, info, instrument, warn};

/// What a settled payment contributes to the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentDetails {
    /// Provider label stored on the invoice, e.g. `WALLET` or `STRIPE`.
    pub method: String,
    pub idempotency_key: String,
    /// Gateway or wallet transaction id.
    pub external_ref: String,
    pub amount_paid: Decimal,
    pub rent_covered: Decimal,
    pub service_fee: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    /// The invoice was marked paid and its entries written.
    Applied(Invoice),
    /// Someone settled the invoice first; nothing was written.
    AlreadySettled(Invoice),
}

impl Reconciliation {
    pub fn invoice(&self) -> &Invoice {
        match self {
            Reconciliation::Applied(invoice) | Reconciliation::AlreadySettled(invoice) => invoice,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Created(LedgerEntry),
    /// The idempotency key was already used; this is the entry that holds it.
    Replayed(LedgerEntry),
}

impl Recorded {
    pub fn entry(&self) -> &LedgerEntry {
        match self {
            Recorded::Created(entry) | Recorded::Replayed(entry) => entry,
        }
    }
}

/// Double-checked bookkeeping for invoice payments.
///
/// Every write goes through a [`UnitOfWork`], which serializes appends and
/// makes the "read last balance, append next" step safe under concurrency.
pub struct AccountingLedger {
    storage: StorageHandle,
}

impl AccountingLedger {
    pub fn new(storage: StorageHandle) -> Self {
        Self { storage }
    }

    /// Marks the invoice paid and writes its ledger entries as one unit.
    #[instrument(skip(self, details), fields(key = %details.idempotency_key))]
    pub async fn reconcile(
        &self,
        invoice_id: InvoiceId,
        details: &PaymentDetails,
    ) -> Result<Reconciliation> {
        let mut uow = self.storage.begin().await?;
        let outcome = Self::reconcile_in(uow.as_mut(), invoice_id, details).await?;
        if let Reconciliation::Applied(_) = outcome {
            uow.commit().await?;
            info!(invoice_id, amount = %details.amount_paid, "invoice reconciled");
        }
        Ok(outcome)
    }

    /// Reconciliation steps inside a caller-owned unit of work.
    ///
    /// Nothing is committed here; any error leaves the unit to be dropped.
    pub async fn reconcile_in(
        uow: &mut dyn UnitOfWork,
        invoice_id: InvoiceId,
        details: &PaymentDetails,
    ) -> Result<Reconciliation> {
        let mut invoice = uow
            .invoice(invoice_id)
            .await?
            .ok_or_else(|| PaymentError::not_found("invoice", invoice_id))?;

        if invoice.is_paid() {
            warn!(invoice_id, "invoice settled concurrently, skipping reconciliation");
            return Ok(Reconciliation::AlreadySettled(invoice));
        }

        let amount_paid = if details.amount_paid > Decimal::ZERO {
            details.amount_paid
        } else {
            invoice.amount
        };
        invoice.mark_paid(&details.method, amount_paid, Utc::now());
        uow.put_invoice(invoice.clone()).await?;

        let mut rent = NewLedgerEntry::income(
            format!("Rent Payment for Invoice {}", invoice.number),
            details.rent_covered,
            entry_key(&details.idempotency_key, RENT_SUFFIX),
        );
        rent.invoice_id = Some(invoice.id);
        rent.property_id = Some(invoice.property_id);
        rent.owner_id = invoice.owner_id;
        rent.external_ref = Some(details.external_ref.clone());
        Self::record_fresh(uow, rent).await?;

        if details.service_fee > Decimal::ZERO {
            let mut fee = NewLedgerEntry::income(
                format!("Service Fee for Invoice {}", invoice.number),
                details.service_fee,
                entry_key(&details.idempotency_key, FEE_SUFFIX),
            );
            fee.invoice_id = Some(invoice.id);
            fee.property_id = Some(invoice.property_id);
            fee.external_ref = Some(details.external_ref.clone());
            Self::record_fresh(uow, fee).await?;
        }

        uow.remove_payment_claim(invoice_id).await?;
        Ok(Reconciliation::Applied(invoice))
    }

    /// Appends `entry` on top of the current running balance.
    ///
    /// A key that is already taken does not create a second row; the existing
    /// entry is returned as [`Recorded::Replayed`].
    pub async fn record_transaction(
        uow: &mut dyn UnitOfWork,
        entry: NewLedgerEntry,
    ) -> Result<Recorded> {
        let previous = uow.last_ledger_entry().await?;
        let key = entry.idempotency_key.clone();
        let entry = entry.into_entry(previous.as_ref())?;

        match uow.append_ledger_entry(entry.clone()).await {
            Ok(()) => {
                debug!(
                    entry_id = entry.id,
                    amount = %entry.amount,
                    balance = %entry.balance,
                    "ledger entry staged"
                );
                Ok(Recorded::Created(entry))
            }
            Err(PaymentError::DuplicateRequest(_)) => {
                let existing = uow.ledger_entry_by_key(&key).await?.ok_or_else(|| {
                    PaymentError::internal(format!("ledger key {key} reported taken but not found"))
                })?;
                debug!(entry_id = existing.id, key, "ledger key replayed");
                Ok(Recorded::Replayed(existing))
            }
            Err(e) => Err(e),
        }
    }

    /// Like [`record_transaction`](Self::record_transaction) but a replay is an
    /// error: the key belongs to an earlier, different write.
    async fn record_fresh(uow: &mut dyn UnitOfWork, entry: NewLedgerEntry) -> Result<LedgerEntry> {
        match Self::record_transaction(uow, entry).await? {
            Recorded::Created(entry) => Ok(entry),
            Recorded::Replayed(existing) => {
                Err(PaymentError::DuplicateRequest(existing.idempotency_key))
            }
        }
    }

    /// Marks an invoice paid outside the payment flow (e.g. cash handed to an
    /// administrator) and records the full amount as owner income.
    #[instrument(skip(self))]
    pub async fn settle_manually(&self, invoice_id: InvoiceId, method: &str) -> Result<Invoice> {
        let mut uow = self.storage.begin().await?;
        let mut invoice = uow
            .invoice(invoice_id)
            .await?
            .ok_or_else(|| PaymentError::not_found("invoice", invoice_id))?;
        if invoice.is_paid() {
            return Err(PaymentError::AlreadyPaid(invoice_id));
        }

        let now = Utc::now();
        let total = invoice.chargeable_total()?.value();
        invoice.mark_paid(method, total, now);
        uow.put_invoice(invoice.clone()).await?;

        let mut entry = NewLedgerEntry::income(
            format!("Manual Payment entry for {} (Admin)", invoice.number),
            total,
            format!("ADMIN-PAY-{}-{}", invoice.id, now.timestamp_millis()),
        );
        entry.date = now;
        entry.invoice_id = Some(invoice.id);
        entry.property_id = Some(invoice.property_id);
        entry.owner_id = invoice.owner_id;
        Self::record_fresh(uow.as_mut(), entry).await?;
        uow.remove_payment_claim(invoice_id).await?;
        uow.commit().await?;

        info!(invoice_id, %total, "invoice settled manually");
        Ok(invoice)
    }

    pub async fn entries(&self) -> Result<Vec<LedgerEntry>> {
        self.storage.ledger_entries().await
    }

    pub async fn entry_by_key(&self, key: &str) -> Result<Option<LedgerEntry>> {
        self.storage.ledger_entry_by_key(key).await
    }

    /// Current running balance, zero for an empty ledger.
    pub async fn balance(&self) -> Result<Decimal> {
        let entries = self.storage.ledger_entries().await?;
        Ok(entries.last().map_or(Decimal::ZERO, |e| e.balance))
    }

    /// Recomputes the running balance from the amounts and checks it against
    /// the stored balance of every entry. Returns the closing balance.
    pub async fn verify_chain(&self) -> Result<Decimal> {
        let entries = self.storage.ledger_entries().await?;
        verify_entries(&entries)
    }

    /// Total rent income attributed to one owner.
    pub async fn owner_income(&self, owner_id: UserId) -> Result<Decimal> {
        let entries = self.storage.ledger_entries().await?;
        Ok(entries
            .iter()
            .filter(|e| e.entry_type == EntryType::Income && e.owner_id == Some(owner_id))
            .map(|e| e.amount)
            .sum())
    }
}

pub(crate) fn verify_entries(entries: &[LedgerEntry]) -> Result<Decimal> {
    let mut running = Decimal::ZERO;
    for entry in entries {
        running += entry.amount;
        if entry.balance != running {
            return Err(PaymentError::LedgerCorrupted { entry_id: entry.id });
        }
    }
    Ok(running)
}
