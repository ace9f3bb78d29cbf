use super::gateway::{ChargeReceipt, RefundReceipt, TransferReceipt};
use super::invoice::{Invoice, PaymentClaim};
use super::ledger::LedgerEntry;
use super::money::Amount;
use super::user::User;
use super::wallet::{NewWalletTransaction, Wallet, WalletTransaction};
use super::{InvoiceId, UserId};
use crate::error::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;

/// A scoped, all-or-nothing set of storage operations.
///
/// A unit of work holds the store's single writer slot from `begin` until it is
/// committed or dropped. Writes are buffered and only become visible on
/// [`UnitOfWork::commit`]; dropping the unit without committing discards them.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn invoice(&mut self, id: InvoiceId) -> Result<Option<Invoice>>;
    async fn put_invoice(&mut self, invoice: Invoice) -> Result<()>;
    async fn put_user(&mut self, user: User) -> Result<()>;

    async fn last_ledger_entry(&mut self) -> Result<Option<LedgerEntry>>;
    async fn ledger_entry_by_key(&mut self, key: &str) -> Result<Option<LedgerEntry>>;
    /// Appends a finalised entry.
    ///
    /// Fails with `DuplicateRequest` if the idempotency key is already taken and
    /// with an internal error if `entry.id` does not directly follow the last id.
    async fn append_ledger_entry(&mut self, entry: LedgerEntry) -> Result<()>;

    async fn wallet(&mut self, user_id: UserId) -> Result<Option<Wallet>>;
    /// Creates an empty wallet, or returns the existing one for `user_id`.
    async fn create_wallet(&mut self, user_id: UserId) -> Result<Wallet>;
    async fn put_wallet(&mut self, wallet: Wallet) -> Result<()>;
    async fn append_wallet_transaction(
        &mut self,
        tx: NewWalletTransaction,
    ) -> Result<WalletTransaction>;

    async fn payment_claim(&mut self, invoice_id: InvoiceId) -> Result<Option<PaymentClaim>>;
    async fn put_payment_claim(&mut self, claim: PaymentClaim) -> Result<()>;
    async fn remove_payment_claim(&mut self, invoice_id: InvoiceId) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;
}

/// The process-wide persistence handle.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;

    async fn find_invoice(&self, id: InvoiceId) -> Result<Option<Invoice>>;
    async fn ledger_entries(&self) -> Result<Vec<LedgerEntry>>;
    async fn ledger_entry_by_key(&self, key: &str) -> Result<Option<LedgerEntry>>;
    async fn find_wallet(&self, user_id: UserId) -> Result<Option<Wallet>>;
    async fn wallets(&self) -> Result<Vec<Wallet>>;
    async fn wallet_transactions(&self, wallet_id: u64) -> Result<Vec<WalletTransaction>>;

    /// Makes every committed write durable. Called once on shutdown.
    async fn flush(&self) -> Result<()>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, id: UserId) -> Result<Option<User>>;
    /// Resolves a user by email address or numeric id.
    async fn find_user_by_identifier(&self, identifier: &str) -> Result<Option<User>>;
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn charge(&self, amount: Amount, currency: &str) -> Result<ChargeReceipt>;
    async fn transfer(
        &self,
        total: Amount,
        primary_amount: Decimal,
        fee_amount: Decimal,
        destination_ref: &str,
    ) -> Result<TransferReceipt>;
    async fn refund(&self, transaction_id: &str, amount: Amount) -> Result<RefundReceipt>;
    fn provider_name(&self) -> &'static str;
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify_landlord_payment(
        &self,
        invoice_id: InvoiceId,
        amount: Decimal,
        tenant_name: &str,
    ) -> Result<()>;
}

pub type StorageHandle = Arc<dyn Storage>;
pub type UserDirectoryHandle = Arc<dyn UserDirectory>;
pub type GatewayBox = Box<dyn PaymentGateway>;
pub type NotifierHandle = Arc<dyn NotificationDispatcher>;
