use crate::domain::money::Amount;
use crate::domain::{InvoiceId, UserId};
use crate::error::{PaymentError, Result};
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Deposit,
    Withdraw,
    Transfer,
    Pay,
}

/// One row of the operations file.
///
/// Columns that do not apply to a row's type may be empty or missing.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct Operation {
    #[serde(rename = "type")]
    pub r#type: OperationType,
    pub user: UserId,
    #[serde(default)]
    pub invoice: Option<InvoiceId>,
    #[serde(default)]
    pub amount: Option<Amount>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub recipient: Option<String>,
}

impl Operation {
    pub fn required_amount(&self) -> Result<Amount> {
        self.amount.ok_or_else(|| {
            PaymentError::ValidationError(format!("{:?} requires an amount", self.r#type))
        })
    }

    pub fn required_invoice(&self) -> Result<InvoiceId> {
        self.invoice.ok_or_else(|| {
            PaymentError::ValidationError(format!("{:?} requires an invoice", self.r#type))
        })
    }

    pub fn required_recipient(&self) -> Result<&str> {
        self.recipient
            .as_deref()
            .filter(|r| !r.is_empty())
            .ok_or_else(|| {
                PaymentError::ValidationError(format!("{:?} requires a recipient", self.r#type))
            })
    }
}

/// Reads wallet and payment operations from a CSV source.
///
/// Wraps `csv::Reader` with whitespace trimming and flexible record lengths so
/// rows may omit trailing columns they do not use.
pub struct OperationReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> OperationReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes operations in file order.
    pub fn operations(self) -> impl Iterator<Item = Result<Operation>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(PaymentError::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_reader_valid_stream() {
        let data = "type, user, invoice, amount, method, key, recipient\n\
                    deposit, 1, , 20000, , ,\n\
                    pay, 1, 7, , wallet, K-1,\n\
                    transfer, 1, , 5.5, , , bo@example.com";
        let reader = OperationReader::new(data.as_bytes());
        let results: Vec<Result<Operation>> = reader.operations().collect();

        assert_eq!(results.len(), 3);
        let deposit = results[0].as_ref().unwrap();
        assert_eq!(deposit.r#type, OperationType::Deposit);
        assert_eq!(deposit.amount, Some(Amount::new(dec!(20000)).unwrap()));
        assert_eq!(deposit.method, None);

        let pay = results[1].as_ref().unwrap();
        assert_eq!(pay.required_invoice().unwrap(), 7);
        assert_eq!(pay.key.as_deref(), Some("K-1"));
        assert!(pay.required_amount().is_err());

        let transfer = results[2].as_ref().unwrap();
        assert_eq!(transfer.required_recipient().unwrap(), "bo@example.com");
    }

    #[test]
    fn test_reader_short_rows() {
        let data = "type, user, invoice, amount, method, key, recipient\ndeposit, 2, , 10";
        let results: Vec<Result<Operation>> =
            OperationReader::new(data.as_bytes()).operations().collect();
        let op = results[0].as_ref().unwrap();
        assert_eq!(op.user, 2);
        assert_eq!(op.recipient, None);
    }

    #[test]
    fn test_reader_rejects_bad_rows() {
        let data = "type, user, invoice, amount\nrefund, 1, , 1.0\ndeposit, 1, , -3";
        let results: Vec<Result<Operation>> =
            OperationReader::new(data.as_bytes()).operations().collect();
        assert!(results[0].is_err());
        assert!(results[1].is_err());
    }
}
