//! JSON seed data for batch runs: the users and invoices that the external
//! user and billing systems would normally own.

use crate::domain::invoice::{Invoice, InvoiceStatus};
use crate::domain::ports::Storage;
use crate::domain::user::User;
use crate::domain::{InvoiceId, PropertyId, UnitId, UserId};
use crate::error::{PaymentError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use tracing::info;

#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct SeedInvoice {
    pub id: InvoiceId,
    #[serde(default)]
    pub number: Option<String>,
    pub tenant: UserId,
    pub unit: UnitId,
    pub property: PropertyId,
    #[serde(default)]
    pub owner: Option<UserId>,
    pub rent: Decimal,
    #[serde(default)]
    pub service_fees: Decimal,
    #[serde(default)]
    pub status: InvoiceStatus,
}

impl TryFrom<SeedInvoice> for Invoice {
    type Error = PaymentError;

    fn try_from(seed: SeedInvoice) -> Result<Self> {
        let mut invoice = Invoice::new(
            seed.id,
            seed.tenant,
            seed.unit,
            seed.property,
            seed.owner,
            seed.rent,
            seed.service_fees,
        );
        if let Some(number) = seed.number {
            invoice.number = number;
        }
        invoice.status = seed.status;
        invoice.chargeable_total()?;
        Ok(invoice)
    }
}

#[derive(Debug, Deserialize, Default, PartialEq, Clone)]
pub struct Seed {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub invoices: Vec<SeedInvoice>,
}

impl Seed {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Writes every user and invoice in a single unit of work.
    ///
    /// Invoices are validated before anything is staged; one bad invoice
    /// rejects the whole seed.
    pub async fn load_into(self, storage: &dyn Storage) -> Result<()> {
        let users = self.users.len();
        let invoices = self
            .invoices
            .into_iter()
            .map(Invoice::try_from)
            .collect::<Result<Vec<_>>>()?;
        let invoice_count = invoices.len();
        let mut uow = storage.begin().await?;
        for user in self.users {
            uow.put_user(user).await?;
        }
        for invoice in invoices {
            uow.put_invoice(invoice).await?;
        }
        uow.commit().await?;
        info!(users, invoices = invoice_count, "seed data loaded");
        Ok(())
    }
}
