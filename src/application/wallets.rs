use crate::domain::UserId;
use crate::domain::money::Amount;
use crate::domain::ports::{StorageHandle, UnitOfWork, UserDirectoryHandle};
use crate::domain::wallet::{NewWalletTransaction, Wallet, WalletTransaction, WalletTxType};
use crate::error::{PaymentError, Result};
use rust_decimal::Decimal;
use tracing::{info, instrument};

pub const DEFAULT_DEPOSIT_METHOD: &str = "DEBIT_CARD";
pub const DEFAULT_WITHDRAW_METHOD: &str = "BANK";
pub const WALLET_METHOD: &str = "WALLET";

/// Both legs of a wallet-to-wallet transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferOutcome {
    pub outgoing: WalletTransaction,
    pub incoming: WalletTransaction,
    pub recipient_id: UserId,
}

/// Per-user wallets.
///
/// Each operation changes the balance and appends the matching
/// [`WalletTransaction`] inside a single unit of work, so a wallet's balance
/// always equals the signed sum of its history.
pub struct WalletService {
    storage: StorageHandle,
    users: UserDirectoryHandle,
}

impl WalletService {
    pub fn new(storage: StorageHandle, users: UserDirectoryHandle) -> Self {
        Self { storage, users }
    }

    /// Returns the user's wallet, creating an empty one on first access.
    pub async fn wallet(&self, user_id: UserId) -> Result<Wallet> {
        if let Some(wallet) = self.storage.find_wallet(user_id).await? {
            return Ok(wallet);
        }
        let mut uow = self.storage.begin().await?;
        let wallet = uow.create_wallet(user_id).await?;
        uow.commit().await?;
        Ok(wallet)
    }

    pub async fn credit(
        &self,
        user_id: UserId,
        amount: Amount,
        tx_type: WalletTxType,
        method: &str,
    ) -> Result<WalletTransaction> {
        let mut uow = self.storage.begin().await?;
        let tx = Self::credit_in(uow.as_mut(), user_id, amount, tx_type, method).await?;
        uow.commit().await?;
        Ok(tx)
    }

    pub async fn debit(
        &self,
        user_id: UserId,
        amount: Amount,
        tx_type: WalletTxType,
        method: &str,
    ) -> Result<WalletTransaction> {
        let mut uow = self.storage.begin().await?;
        let tx = Self::debit_in(uow.as_mut(), user_id, amount, tx_type, method).await?;
        uow.commit().await?;
        Ok(tx)
    }

    /// Credits inside a caller-owned unit of work, creating the wallet if needed.
    pub async fn credit_in(
        uow: &mut dyn UnitOfWork,
        user_id: UserId,
        amount: Amount,
        tx_type: WalletTxType,
        method: &str,
    ) -> Result<WalletTransaction> {
        let mut wallet = uow.create_wallet(user_id).await?;
        wallet.credit(amount)?;
        let tx = uow
            .append_wallet_transaction(NewWalletTransaction {
                wallet_id: wallet.id,
                tx_type,
                amount,
                method: method.to_string(),
            })
            .await?;
        uow.put_wallet(wallet).await?;
        Ok(tx)
    }

    /// Debits inside a caller-owned unit of work.
    ///
    /// Fails with `NotFound` when the user has no wallet and with
    /// `InsufficientFunds` when the balance does not cover `amount`; in both cases
    /// nothing is staged.
    pub async fn debit_in(
        uow: &mut dyn UnitOfWork,
        user_id: UserId,
        amount: Amount,
        tx_type: WalletTxType,
        method: &str,
    ) -> Result<WalletTransaction> {
        let mut wallet = uow
            .wallet(user_id)
            .await?
            .ok_or_else(|| PaymentError::not_found("wallet", user_id))?;
        wallet.debit(amount)?;
        let tx = uow
            .append_wallet_transaction(NewWalletTransaction {
                wallet_id: wallet.id,
                tx_type,
                amount,
                method: method.to_string(),
            })
            .await?;
        uow.put_wallet(wallet).await?;
        Ok(tx)
    }

    #[instrument(skip(self))]
    pub async fn add_funds(
        &self,
        user_id: UserId,
        amount: Amount,
        method: Option<&str>,
    ) -> Result<WalletTransaction> {
        let method = method.unwrap_or(DEFAULT_DEPOSIT_METHOD);
        let tx = self
            .credit(user_id, amount, WalletTxType::AddFunds, method)
            .await?;
        info!(tx_id = tx.id, "funds added");
        Ok(tx)
    }

    #[instrument(skip(self))]
    pub async fn withdraw(
        &self,
        user_id: UserId,
        amount: Amount,
        method: Option<&str>,
    ) -> Result<WalletTransaction> {
        let method = method.unwrap_or(DEFAULT_WITHDRAW_METHOD);
        let tx = self
            .debit(user_id, amount, WalletTxType::Withdraw, method)
            .await?;
        info!(tx_id = tx.id, "funds withdrawn");
        Ok(tx)
    }

    /// Moves `amount` from the sender to the user named by `recipient`, an email
    /// address or a numeric user id.
    #[instrument(skip(self))]
    pub async fn transfer(
        &self,
        from_user_id: UserId,
        recipient: &str,
        amount: Amount,
    ) -> Result<TransferOutcome> {
        let to = self
            .users
            .find_user_by_identifier(recipient)
            .await?
            .ok_or_else(|| PaymentError::RecipientNotFound(recipient.trim().to_string()))?;
        if to.id == from_user_id {
            return Err(PaymentError::SelfTransfer);
        }

        let mut uow = self.storage.begin().await?;
        let outgoing = Self::debit_in(
            uow.as_mut(),
            from_user_id,
            amount,
            WalletTxType::TransferOut,
            WALLET_METHOD,
        )
        .await?;
        let incoming = Self::credit_in(
            uow.as_mut(),
            to.id,
            amount,
            WalletTxType::TransferIn,
            WALLET_METHOD,
        )
        .await?;
        uow.commit().await?;

        info!(to = to.id, %amount, "wallet transfer completed");
        Ok(TransferOutcome {
            outgoing,
            incoming,
            recipient_id: to.id,
        })
    }

    /// Transactions of the user's wallet, oldest first. Empty if there is no wallet.
    pub async fn history(&self, user_id: UserId) -> Result<Vec<WalletTransaction>> {
        match self.storage.find_wallet(user_id).await? {
            Some(wallet) => self.storage.wallet_transactions(wallet.id).await,
            None => Ok(Vec::new()),
        }
    }

    /// Checks that the stored balance equals the signed sum of the history.
    pub async fn audit(&self, user_id: UserId) -> Result<Decimal> {
        let wallet = self
            .storage
            .find_wallet(user_id)
            .await?
            .ok_or_else(|| PaymentError::not_found("wallet", user_id))?;
        let computed: Decimal = self
            .storage
            .wallet_transactions(wallet.id)
            .await?
            .iter()
            .map(WalletTransaction::signed_amount)
            .sum();
        if computed != wallet.balance.value() {
            return Err(PaymentError::BalanceMismatch {
                wallet_id: wallet.id,
                stored: wallet.balance.value(),
                computed,
            });
        }
        Ok(computed)
    }
}
