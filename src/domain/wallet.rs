use super::UserId;
use super::money::{Amount, Balance};
use crate::error::PaymentError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WalletTxType {
    AddFunds,
    Withdraw,
    TransferIn,
    TransferOut,
    RentPayment,
}

impl WalletTxType {
    /// Whether this kind of transaction adds to the wallet balance.
    pub fn is_credit(&self) -> bool {
        matches!(self, WalletTxType::AddFunds | WalletTxType::TransferIn)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum WalletTxStatus {
    #[default]
    Success,
    Failed,
}

/// A user's system-custodied balance.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Wallet {
    pub id: u64,
    pub user_id: UserId,
    pub balance: Balance,
    pub created_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(id: u64, user_id: UserId) -> Self {
        Self {
            id,
            user_id,
            balance: Balance::ZERO,
            created_at: Utc::now(),
        }
    }

    /// Adds `amount`, leaving the wallet untouched if the balance would overflow.
    pub fn credit(&mut self, amount: Amount) -> Result<(), PaymentError> {
        self.balance = self.balance.plus(amount)?;
        Ok(())
    }

    /// Takes `amount` out of the wallet, refusing to go below zero.
    pub fn debit(&mut self, amount: Amount) -> Result<(), PaymentError> {
        self.balance = self.balance.minus(amount)?;
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct WalletTransaction {
    pub id: u64,
    pub wallet_id: u64,
    pub tx_type: WalletTxType,
    pub amount: Amount,
    pub method: String,
    pub status: WalletTxStatus,
    pub created_at: DateTime<Utc>,
}

impl WalletTransaction {
    /// Contribution of this transaction to the wallet balance.
    pub fn signed_amount(&self) -> Decimal {
        if self.status != WalletTxStatus::Success {
            return Decimal::ZERO;
        }
        if self.tx_type.is_credit() {
            self.amount.value()
        } else {
            -self.amount.value()
        }
    }
}

/// A wallet transaction that has not been assigned an id yet.
#[derive(Debug, PartialEq, Clone)]
pub struct NewWalletTransaction {
    pub wallet_id: u64,
    pub tx_type: WalletTxType,
    pub amount: Amount,
    pub method: String,
}

impl NewWalletTransaction {
    pub fn into_transaction(self, id: u64) -> WalletTransaction {
        WalletTransaction {
            id,
            wallet_id: self.wallet_id,
            tx_type: self.tx_type,
            amount: self.amount,
            method: self.method,
            status: WalletTxStatus::Success,
            created_at: Utc::now(),
        }
    }
}
