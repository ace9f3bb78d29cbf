use super::staging::Staged;
use crate::domain::invoice::{Invoice, PaymentClaim};
use crate::domain::ledger::LedgerEntry;
use crate::domain::ports::{Storage, UnitOfWork, UserDirectory};
use crate::domain::user::User;
use crate::domain::wallet::{NewWalletTransaction, Wallet, WalletTransaction};
use crate::domain::{InvoiceId, UserId};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

#[derive(Debug, Default)]
struct State {
    users: HashMap<UserId, User>,
    invoices: HashMap<InvoiceId, Invoice>,
    ledger: Vec<LedgerEntry>,
    ledger_keys: HashMap<String, usize>,
    wallets: HashMap<UserId, Wallet>,
    wallet_txs: Vec<WalletTransaction>,
    claims: HashMap<InvoiceId, PaymentClaim>,
}

/// A thread-safe in-memory store.
///
/// Uses `Arc<RwLock<_>>` for shared access. A unit of work takes the write lock
/// for its whole lifetime, which serializes writers; plain reads share the lock.
/// Ideal for tests or short-lived batch runs where persistence is not required.
#[derive(Default, Clone)]
pub struct InMemoryStorage {
    state: Arc<RwLock<State>>,
}

impl InMemoryStorage {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let guard = self.state.clone().write_owned().await;
        Ok(Box::new(InMemoryUnitOfWork {
            state: guard,
            staged: Staged::default(),
        }))
    }

    async fn find_invoice(&self, id: InvoiceId) -> Result<Option<Invoice>> {
        let state = self.state.read().await;
        Ok(state.invoices.get(&id).cloned())
    }

    async fn ledger_entries(&self) -> Result<Vec<LedgerEntry>> {
        let state = self.state.read().await;
        Ok(state.ledger.clone())
    }

    async fn ledger_entry_by_key(&self, key: &str) -> Result<Option<LedgerEntry>> {
        let state = self.state.read().await;
        Ok(state.ledger_keys.get(key).map(|&i| state.ledger[i].clone()))
    }

    async fn find_wallet(&self, user_id: UserId) -> Result<Option<Wallet>> {
        let state = self.state.read().await;
        Ok(state.wallets.get(&user_id).cloned())
    }

    async fn wallets(&self) -> Result<Vec<Wallet>> {
        let state = self.state.read().await;
        let mut wallets: Vec<Wallet> = state.wallets.values().cloned().collect();
        wallets.sort_by_key(|w| w.user_id);
        Ok(wallets)
    }

    async fn wallet_transactions(&self, wallet_id: u64) -> Result<Vec<WalletTransaction>> {
        let state = self.state.read().await;
        Ok(state
            .wallet_txs
            .iter()
            .filter(|tx| tx.wallet_id == wallet_id)
            .cloned()
            .collect())
    }

    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for InMemoryStorage {
    async fn find_user(&self, id: UserId) -> Result<Option<User>> {
        let state = self.state.read().await;
        Ok(state.users.get(&id).cloned())
    }

    async fn find_user_by_identifier(&self, identifier: &str) -> Result<Option<User>> {
        let state = self.state.read().await;
        Ok(state.users.values().find(|u| u.matches(identifier)).cloned())
    }
}

struct InMemoryUnitOfWork {
    state: OwnedRwLockWriteGuard<State>,
    staged: Staged,
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn invoice(&mut self, id: InvoiceId) -> Result<Option<Invoice>> {
        Ok(self
            .staged
            .invoices
            .get(&id)
            .or_else(|| self.state.invoices.get(&id))
            .cloned())
    }

    async fn put_invoice(&mut self, invoice: Invoice) -> Result<()> {
        self.staged.invoices.insert(invoice.id, invoice);
        Ok(())
    }

    async fn put_user(&mut self, user: User) -> Result<()> {
        self.staged.users.insert(user.id, user);
        Ok(())
    }

    async fn last_ledger_entry(&mut self) -> Result<Option<LedgerEntry>> {
        Ok(self
            .staged
            .last_ledger_entry(self.state.ledger.last().cloned()))
    }

    async fn ledger_entry_by_key(&mut self, key: &str) -> Result<Option<LedgerEntry>> {
        if let Some(entry) = self.staged.ledger_entry_by_key(key) {
            return Ok(Some(entry.clone()));
        }
        Ok(self
            .state
            .ledger_keys
            .get(key)
            .map(|&i| self.state.ledger[i].clone()))
    }

    async fn append_ledger_entry(&mut self, entry: LedgerEntry) -> Result<()> {
        let key_committed = self.state.ledger_keys.contains_key(&entry.idempotency_key);
        let committed_last = self.state.ledger.last().cloned();
        self.staged
            .stage_ledger_entry(committed_last, key_committed, entry)
    }

    async fn wallet(&mut self, user_id: UserId) -> Result<Option<Wallet>> {
        Ok(self
            .staged
            .wallets
            .get(&user_id)
            .or_else(|| self.state.wallets.get(&user_id))
            .cloned())
    }

    async fn create_wallet(&mut self, user_id: UserId) -> Result<Wallet> {
        if let Some(existing) = self.wallet(user_id).await? {
            return Ok(existing);
        }
        self.staged.created_wallets += 1;
        let id = self.state.wallets.len() as u64 + self.staged.created_wallets;
        let wallet = Wallet::new(id, user_id);
        self.staged.wallets.insert(user_id, wallet.clone());
        Ok(wallet)
    }

    async fn put_wallet(&mut self, wallet: Wallet) -> Result<()> {
        self.staged.wallets.insert(wallet.user_id, wallet);
        Ok(())
    }

    async fn append_wallet_transaction(
        &mut self,
        tx: NewWalletTransaction,
    ) -> Result<WalletTransaction> {
        let id = (self.state.wallet_txs.len() + self.staged.wallet_txs.len()) as u64 + 1;
        let tx = tx.into_transaction(id);
        self.staged.wallet_txs.push(tx.clone());
        Ok(tx)
    }

    async fn payment_claim(&mut self, invoice_id: InvoiceId) -> Result<Option<PaymentClaim>> {
        match self.staged.claim(invoice_id) {
            Some(staged) => Ok(staged),
            None => Ok(self.state.claims.get(&invoice_id).cloned()),
        }
    }

    async fn put_payment_claim(&mut self, claim: PaymentClaim) -> Result<()> {
        self.staged.claims.insert(claim.invoice_id, Some(claim));
        Ok(())
    }

    async fn remove_payment_claim(&mut self, invoice_id: InvoiceId) -> Result<()> {
        self.staged.claims.insert(invoice_id, None);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let InMemoryUnitOfWork { mut state, staged } = *self;
        state.users.extend(staged.users);
        state.invoices.extend(staged.invoices);
        state.wallets.extend(staged.wallets);
        state.wallet_txs.extend(staged.wallet_txs);
        for entry in staged.ledger {
            let index = state.ledger.len();
            state
                .ledger_keys
                .insert(entry.idempotency_key.clone(), index);
            state.ledger.push(entry);
        }
        for (invoice_id, claim) in staged.claims {
            match claim {
                Some(claim) => state.claims.insert(invoice_id, claim),
                None => state.claims.remove(&invoice_id),
            };
        }
        Ok(())
    }
}
