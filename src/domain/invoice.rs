use super::money::Amount;
use super::{InvoiceId, PropertyId, UnitId, UserId};
use crate::error::PaymentError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Draft,
    #[default]
    Pending,
    Paid,
}

/// A billing period for one tenant and unit.
///
/// Invoices are produced by the billing side of the system; this crate only
/// reads them and flips them to [`InvoiceStatus::Paid`] exactly once.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Invoice {
    pub id: InvoiceId,
    /// Human-readable invoice number, e.g. `INV-2024-001`.
    pub number: String,
    pub tenant_id: UserId,
    pub unit_id: UnitId,
    pub property_id: PropertyId,
    /// Owner of the property. `None` routes the rent to the platform reserve.
    #[serde(default)]
    pub owner_id: Option<UserId>,
    pub rent: Decimal,
    #[serde(default)]
    pub service_fees: Decimal,
    /// Total due, always `rent + service_fees`.
    pub amount: Decimal,
    #[serde(default)]
    pub status: InvoiceStatus,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub total_paid: Option<Decimal>,
}

impl Invoice {
    pub fn new(
        id: InvoiceId,
        tenant_id: UserId,
        unit_id: UnitId,
        property_id: PropertyId,
        owner_id: Option<UserId>,
        rent: Decimal,
        service_fees: Decimal,
    ) -> Self {
        Self {
            id,
            number: format!("INV-{id:05}"),
            tenant_id,
            unit_id,
            property_id,
            owner_id,
            rent,
            service_fees,
            amount: rent.saturating_add(service_fees),
            status: InvoiceStatus::Pending,
            paid_at: None,
            payment_method: None,
            total_paid: None,
        }
    }

    pub fn is_paid(&self) -> bool {
        self.status == InvoiceStatus::Paid
    }

    /// The amount the tenant must pay, recomputed from its parts.
    pub fn total_due(&self) -> Decimal {
        self.rent.saturating_add(self.service_fees)
    }

    /// Checks the rent/fee split and returns the total to charge.
    ///
    /// Rent must be positive and fees must not be negative.
    pub fn chargeable_total(&self) -> Result<Amount, PaymentError> {
        if self.rent <= Decimal::ZERO {
            return Err(PaymentError::ValidationError(format!(
                "invoice {} rent must be positive, got {}",
                self.id, self.rent
            )));
        }
        if self.service_fees < Decimal::ZERO {
            return Err(PaymentError::ValidationError(format!(
                "invoice {} service fees must not be negative, got {}",
                self.id, self.service_fees
            )));
        }
        let total = self.rent.checked_add(self.service_fees).ok_or_else(|| {
            PaymentError::ValidationError(format!("invoice {} total overflows", self.id))
        })?;
        Amount::new(total)
    }

    /// Account reference the landlord share is routed to.
    pub fn landlord_account_ref(&self) -> String {
        match self.owner_id {
            Some(owner) => format!("OWNER-{owner}"),
            None => "PLATFORM_RESERVE".to_string(),
        }
    }

    pub fn mark_paid(&mut self, method: &str, total_paid: Decimal, at: DateTime<Utc>) {
        self.status = InvoiceStatus::Paid;
        self.paid_at = Some(at);
        self.payment_method = Some(method.to_string());
        self.total_paid = Some(total_paid);
    }
}

/// Marker written before an external charge so that only one attempt per
/// invoice can be in flight with the provider at a time.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct PaymentClaim {
    pub invoice_id: InvoiceId,
    pub idempotency_key: String,
    pub claimed_at: DateTime<Utc>,
}

impl PaymentClaim {
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now - self.claimed_at > ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_new_invoice_total() {
        let invoice = Invoice::new(7, 1, 2, 3, Some(4), dec!(12000), dec!(1500));
        assert_eq!(invoice.amount, dec!(13500));
        assert_eq!(invoice.total_due(), dec!(13500));
        assert_eq!(invoice.number, "INV-00007");
        assert_eq!(invoice.status, InvoiceStatus::Pending);
    }

    #[test]
    fn test_chargeable_total_rejects_bad_split() {
        let ok = Invoice::new(1, 1, 1, 1, None, dec!(100), dec!(0));
        assert_eq!(ok.chargeable_total().unwrap().value(), dec!(100));

        for (rent, fees) in [
            (dec!(-100), dec!(200)),
            (dec!(0), dec!(50)),
            (dec!(100), dec!(-1)),
            (Decimal::MAX, dec!(1)),
        ] {
            let invoice = Invoice::new(1, 1, 1, 1, None, rent, fees);
            assert!(matches!(
                invoice.chargeable_total(),
                Err(PaymentError::ValidationError(_))
            ));
        }
    }

    #[test]
    fn test_landlord_account_ref() {
        let mut invoice = Invoice::new(1, 1, 1, 1, Some(42), dec!(10), dec!(0));
        assert_eq!(invoice.landlord_account_ref(), "OWNER-42");
        invoice.owner_id = None;
        assert_eq!(invoice.landlord_account_ref(), "PLATFORM_RESERVE");
    }

    #[test]
    fn test_mark_paid() {
        let mut invoice = Invoice::new(1, 1, 1, 1, None, dec!(10), dec!(1));
        let now = Utc::now();
        invoice.mark_paid("WALLET", dec!(11), now);
        assert!(invoice.is_paid());
        assert_eq!(invoice.paid_at, Some(now));
        assert_eq!(invoice.payment_method.as_deref(), Some("WALLET"));
        assert_eq!(invoice.total_paid, Some(dec!(11)));
    }

    #[test]
    fn test_claim_expiry() {
        let now = Utc::now();
        let claim = PaymentClaim {
            invoice_id: 1,
            idempotency_key: "k".into(),
            claimed_at: now - chrono::Duration::minutes(20),
        };
        assert!(claim.is_expired(now, chrono::Duration::minutes(15)));
        assert!(!claim.is_expired(now, chrono::Duration::minutes(30)));
    }
}
