use crate::domain::ledger::{EntryStatus, EntryType, LedgerEntry};
use crate::domain::wallet::Wallet;
use crate::domain::{InvoiceId, UserId};
use crate::error::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct WalletRow {
    user: UserId,
    balance: Decimal,
}

#[derive(Serialize)]
struct LedgerRow<'a> {
    id: u64,
    date: DateTime<Utc>,
    description: &'a str,
    #[serde(rename = "type")]
    entry_type: EntryType,
    amount: Decimal,
    balance: Decimal,
    status: EntryStatus,
    invoice: Option<InvoiceId>,
    owner: Option<UserId>,
    key: &'a str,
}

/// Writes the final wallet balances as `user,balance`.
pub struct WalletWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> WalletWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_wallets(&mut self, wallets: impl IntoIterator<Item = Wallet>) -> Result<()> {
        for wallet in wallets {
            self.writer.serialize(WalletRow {
                user: wallet.user_id,
                balance: wallet.balance.value().normalize(),
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

/// Writes ledger entries in id order, one row per entry.
pub struct LedgerWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> LedgerWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_entries(&mut self, entries: &[LedgerEntry]) -> Result<()> {
        for entry in entries {
            self.writer.serialize(LedgerRow {
                id: entry.id,
                date: entry.date,
                description: &entry.description,
                entry_type: entry.entry_type,
                amount: entry.amount.normalize(),
                balance: entry.balance.normalize(),
                status: entry.status,
                invoice: entry.invoice_id,
                owner: entry.owner_id,
                key: &entry.idempotency_key,
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ledger::NewLedgerEntry;
    use crate::domain::money::Balance;
    use rust_decimal_macros::dec;

    #[test]
    fn test_write_wallets() {
        let mut wallet = Wallet::new(1, 4);
        wallet.balance = Balance::new(dec!(6500.00));
        let mut out = Vec::new();
        WalletWriter::new(&mut out).write_wallets([wallet]).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "user,balance\n4,6500\n");
    }

    #[test]
    fn test_write_ledger() {
        let mut rent = NewLedgerEntry::income(
            "Rent Payment for Invoice INV-00001",
            dec!(12000),
            "K-RENT".into(),
        );
        rent.invoice_id = Some(1);
        rent.owner_id = Some(9);
        let entry = rent.into_entry(None).unwrap();

        let mut out = Vec::new();
        LedgerWriter::new(&mut out).write_entries(&[entry]).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("id,date,description,type,amount,balance,status,invoice,owner,key")
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("1,"));
        assert!(row.ends_with(
            ",Rent Payment for Invoice INV-00001,Income,12000,12000,Completed,1,9,K-RENT"
        ));
    }
}
