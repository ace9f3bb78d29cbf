use super::staging::Staged;
use crate::domain::invoice::{Invoice, PaymentClaim};
use crate::domain::ledger::LedgerEntry;
use crate::domain::ports::{Storage, UnitOfWork, UserDirectory};
use crate::domain::user::User;
use crate::domain::wallet::{NewWalletTransaction, Wallet, WalletTransaction};
use crate::domain::{InvoiceId, UserId};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

pub const CF_USERS: &str = "users";
pub const CF_USER_EMAILS: &str = "user_emails";
pub const CF_INVOICES: &str = "invoices";
/// Ledger entries keyed by big-endian id, so iteration order is ledger order.
pub const CF_LEDGER: &str = "ledger";
/// Unique index from idempotency key to ledger entry id.
pub const CF_LEDGER_KEYS: &str = "ledger_keys";
pub const CF_WALLETS: &str = "wallets";
/// Wallet transactions keyed by `wallet_id ++ tx_id`, both big-endian.
pub const CF_WALLET_TXS: &str = "wallet_transactions";
pub const CF_CLAIMS: &str = "payment_claims";
pub const CF_META: &str = "meta";

const ALL_CFS: [&str; 9] = [
    CF_USERS,
    CF_USER_EMAILS,
    CF_INVOICES,
    CF_LEDGER,
    CF_LEDGER_KEYS,
    CF_WALLETS,
    CF_WALLET_TXS,
    CF_CLAIMS,
    CF_META,
];

const WALLET_SEQ: &[u8] = b"wallet_seq";
const WALLET_TX_SEQ: &[u8] = b"wallet_tx_seq";

/// A persistent store implementation using RocksDB.
///
/// Every entity lives in its own Column Family. Units of work take a process-wide
/// writer lock and commit through a single `WriteBatch`, so a commit is atomic and
/// appends to the ledger can never interleave.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStorage {
    db: Arc<DB>,
    writer: Arc<Mutex<()>>,
}

impl RocksDBStorage {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that all required column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            writer: Arc::new(Mutex::new(())),
        })
    }
}

fn cf<'a>(db: &'a DB, name: &str) -> Result<&'a ColumnFamily> {
    db.cf_handle(name)
        .ok_or_else(|| PaymentError::internal(format!("{name} column family not found")))
}

fn get_json<T: DeserializeOwned>(db: &DB, name: &str, key: &[u8]) -> Result<Option<T>> {
    match db.get_cf(cf(db, name)?, key)? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

fn put_json<T: Serialize>(
    batch: &mut WriteBatch,
    db: &DB,
    name: &str,
    key: &[u8],
    value: &T,
) -> Result<()> {
    let bytes = serde_json::to_vec(value)?;
    batch.put_cf(cf(db, name)?, key, bytes);
    Ok(())
}

fn decode_u64(bytes: &[u8]) -> Result<u64> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| PaymentError::internal("corrupted u64 value"))?;
    Ok(u64::from_be_bytes(raw))
}

fn counter(db: &DB, name: &[u8]) -> Result<u64> {
    match db.get_cf(cf(db, CF_META)?, name)? {
        Some(bytes) => decode_u64(&bytes),
        None => Ok(0),
    }
}

fn last_ledger_entry(db: &DB) -> Result<Option<LedgerEntry>> {
    let mut iter = db.iterator_cf(cf(db, CF_LEDGER)?, IteratorMode::End);
    match iter.next() {
        Some(item) => {
            let (_key, value) = item?;
            Ok(Some(serde_json::from_slice(&value)?))
        }
        None => Ok(None),
    }
}

fn ledger_entry_by_key(db: &DB, key: &str) -> Result<Option<LedgerEntry>> {
    match db.get_cf(cf(db, CF_LEDGER_KEYS)?, key.as_bytes())? {
        Some(id) => get_json(db, CF_LEDGER, &id),
        None => Ok(None),
    }
}

fn collect_json<T: DeserializeOwned>(db: &DB, name: &str) -> Result<Vec<T>> {
    let mut items = Vec::new();
    for item in db.iterator_cf(cf(db, name)?, IteratorMode::Start) {
        let (_key, value) = item?;
        items.push(serde_json::from_slice(&value)?);
    }
    Ok(items)
}

fn wallet_tx_key(wallet_id: u64, tx_id: u64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&wallet_id.to_be_bytes());
    key[8..].copy_from_slice(&tx_id.to_be_bytes());
    key
}

#[async_trait]
impl Storage for RocksDBStorage {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let guard = self.writer.clone().lock_owned().await;
        Ok(Box::new(RocksDBUnitOfWork {
            db: self.db.clone(),
            _writer: guard,
            staged: Staged::default(),
        }))
    }

    async fn find_invoice(&self, id: InvoiceId) -> Result<Option<Invoice>> {
        get_json(&self.db, CF_INVOICES, &id.to_be_bytes())
    }

    async fn ledger_entries(&self) -> Result<Vec<LedgerEntry>> {
        collect_json(&self.db, CF_LEDGER)
    }

    async fn ledger_entry_by_key(&self, key: &str) -> Result<Option<LedgerEntry>> {
        ledger_entry_by_key(&self.db, key)
    }

    async fn find_wallet(&self, user_id: UserId) -> Result<Option<Wallet>> {
        get_json(&self.db, CF_WALLETS, &user_id.to_be_bytes())
    }

    async fn wallets(&self) -> Result<Vec<Wallet>> {
        collect_json(&self.db, CF_WALLETS)
    }

    async fn wallet_transactions(&self, wallet_id: u64) -> Result<Vec<WalletTransaction>> {
        let prefix = wallet_id.to_be_bytes();
        let mode = IteratorMode::From(&prefix, Direction::Forward);
        let mut txs = Vec::new();
        for item in self.db.iterator_cf(cf(&self.db, CF_WALLET_TXS)?, mode) {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            txs.push(serde_json::from_slice(&value)?);
        }
        Ok(txs)
    }

    async fn flush(&self) -> Result<()> {
        for name in ALL_CFS {
            self.db.flush_cf(cf(&self.db, name)?)?;
        }
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for RocksDBStorage {
    async fn find_user(&self, id: UserId) -> Result<Option<User>> {
        get_json(&self.db, CF_USERS, &id.to_be_bytes())
    }

    async fn find_user_by_identifier(&self, identifier: &str) -> Result<Option<User>> {
        let identifier = identifier.trim();
        if let Ok(id) = identifier.parse::<UserId>() {
            return self.find_user(id).await;
        }
        let email = identifier.to_ascii_lowercase();
        match self.db.get_cf(cf(&self.db, CF_USER_EMAILS)?, email.as_bytes())? {
            Some(id) => get_json(&self.db, CF_USERS, &id),
            None => Ok(None),
        }
    }
}

struct RocksDBUnitOfWork {
    db: Arc<DB>,
    _writer: OwnedMutexGuard<()>,
    staged: Staged,
}

#[async_trait]
impl UnitOfWork for RocksDBUnitOfWork {
    async fn invoice(&mut self, id: InvoiceId) -> Result<Option<Invoice>> {
        if let Some(invoice) = self.staged.invoices.get(&id) {
            return Ok(Some(invoice.clone()));
        }
        get_json(&self.db, CF_INVOICES, &id.to_be_bytes())
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
        let committed = last_ledger_entry(&self.db)?;
        Ok(self.staged.last_ledger_entry(committed))
    }

    async fn ledger_entry_by_key(&mut self, key: &str) -> Result<Option<LedgerEntry>> {
        if let Some(entry) = self.staged.ledger_entry_by_key(key) {
            return Ok(Some(entry.clone()));
        }
        ledger_entry_by_key(&self.db, key)
    }

    async fn append_ledger_entry(&mut self, entry: LedgerEntry) -> Result<()> {
        let key_committed = self
            .db
            .get_pinned_cf(cf(&self.db, CF_LEDGER_KEYS)?, entry.idempotency_key.as_bytes())?
            .is_some();
        let committed_last = last_ledger_entry(&self.db)?;
        self.staged
            .stage_ledger_entry(committed_last, key_committed, entry)
    }

    async fn wallet(&mut self, user_id: UserId) -> Result<Option<Wallet>> {
        if let Some(wallet) = self.staged.wallets.get(&user_id) {
            return Ok(Some(wallet.clone()));
        }
        get_json(&self.db, CF_WALLETS, &user_id.to_be_bytes())
    }

    async fn create_wallet(&mut self, user_id: UserId) -> Result<Wallet> {
        if let Some(existing) = self.wallet(user_id).await? {
            return Ok(existing);
        }
        self.staged.created_wallets += 1;
        let id = counter(&self.db, WALLET_SEQ)? + self.staged.created_wallets;
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
        let id = counter(&self.db, WALLET_TX_SEQ)? + self.staged.wallet_txs.len() as u64 + 1;
        let tx = tx.into_transaction(id);
        self.staged.wallet_txs.push(tx.clone());
        Ok(tx)
    }

    async fn payment_claim(&mut self, invoice_id: InvoiceId) -> Result<Option<PaymentClaim>> {
        match self.staged.claim(invoice_id) {
            Some(staged) => Ok(staged),
            None => get_json(&self.db, CF_CLAIMS, &invoice_id.to_be_bytes()),
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
        let db = &self.db;
        let staged = &self.staged;
        let mut batch = WriteBatch::default();

        for user in staged.users.values() {
            put_json(&mut batch, db, CF_USERS, &user.id.to_be_bytes(), user)?;
            batch.put_cf(
                cf(db, CF_USER_EMAILS)?,
                user.email.to_ascii_lowercase().as_bytes(),
                user.id.to_be_bytes(),
            );
        }
        for invoice in staged.invoices.values() {
            put_json(&mut batch, db, CF_INVOICES, &invoice.id.to_be_bytes(), invoice)?;
        }
        for entry in &staged.ledger {
            put_json(&mut batch, db, CF_LEDGER, &entry.id.to_be_bytes(), entry)?;
            batch.put_cf(
                cf(db, CF_LEDGER_KEYS)?,
                entry.idempotency_key.as_bytes(),
                entry.id.to_be_bytes(),
            );
        }
        for wallet in staged.wallets.values() {
            put_json(&mut batch, db, CF_WALLETS, &wallet.user_id.to_be_bytes(), wallet)?;
        }
        if staged.created_wallets > 0 {
            let seq = counter(db, WALLET_SEQ)? + staged.created_wallets;
            batch.put_cf(cf(db, CF_META)?, WALLET_SEQ, seq.to_be_bytes());
        }
        for tx in &staged.wallet_txs {
            put_json(&mut batch, db, CF_WALLET_TXS, &wallet_tx_key(tx.wallet_id, tx.id), tx)?;
        }
        if let Some(last) = staged.wallet_txs.last() {
            batch.put_cf(cf(db, CF_META)?, WALLET_TX_SEQ, last.id.to_be_bytes());
        }
        for (invoice_id, claim) in &staged.claims {
            let key = invoice_id.to_be_bytes();
            match claim {
                Some(claim) => put_json(&mut batch, db, CF_CLAIMS, &key, claim)?,
                None => batch.delete_cf(cf(db, CF_CLAIMS)?, key),
            }
        }

        db.write(batch)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ledger::NewLedgerEntry;
    use crate::domain::money::{Amount, Balance};
    use crate::domain::wallet::WalletTxType;
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDBStorage::open(dir.path()).expect("Failed to open RocksDB");

        for name in ALL_CFS {
            assert!(store.db.cf_handle(name).is_some());
        }
    }

    #[tokio::test]
    async fn test_rocksdb_ledger_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = RocksDBStorage::open(dir.path()).unwrap();
            let mut uow = store.begin().await.unwrap();
            let first = NewLedgerEntry::income("a", dec!(10), "k1".into())
                .into_entry(None)
                .unwrap();
            let second = NewLedgerEntry::income("b", dec!(5), "k2".into())
                .into_entry(Some(&first))
                .unwrap();
            uow.append_ledger_entry(first).await.unwrap();
            uow.append_ledger_entry(second).await.unwrap();
            uow.commit().await.unwrap();
            store.flush().await.unwrap();
        }

        let store = RocksDBStorage::open(dir.path()).unwrap();
        let entries = store.ledger_entries().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].balance, dec!(15));
        assert_eq!(
            Storage::ledger_entry_by_key(&store, "k2").await.unwrap().map(|e| e.id),
            Some(2)
        );

        let mut uow = store.begin().await.unwrap();
        let dup = NewLedgerEntry::income("c", dec!(1), "k1".into())
            .into_entry(entries.last())
            .unwrap();
        assert!(matches!(
            uow.append_ledger_entry(dup).await,
            Err(PaymentError::DuplicateRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_rocksdb_wallets_and_transactions() {
        let dir = tempdir().unwrap();
        let store = RocksDBStorage::open(dir.path()).unwrap();

        let mut uow = store.begin().await.unwrap();
        let mut wallet = uow.create_wallet(7).await.unwrap();
        let other = uow.create_wallet(8).await.unwrap();
        assert_ne!(wallet.id, other.id);
        wallet.balance = Balance::new(dec!(20));
        uow.put_wallet(wallet.clone()).await.unwrap();
        uow.append_wallet_transaction(NewWalletTransaction {
            wallet_id: wallet.id,
            tx_type: WalletTxType::AddFunds,
            amount: Amount::new(dec!(20)).unwrap(),
            method: "CASH".into(),
        })
        .await
        .unwrap();
        uow.commit().await.unwrap();

        let stored = store.find_wallet(7).await.unwrap().unwrap();
        assert_eq!(stored.balance, Balance::new(dec!(20)));
        assert_eq!(store.wallets().await.unwrap().len(), 2);
        assert_eq!(store.wallet_transactions(wallet.id).await.unwrap().len(), 1);
        assert!(store.wallet_transactions(other.id).await.unwrap().is_empty());

        let mut uow = store.begin().await.unwrap();
        let third = uow.create_wallet(9).await.unwrap();
        assert_eq!(third.id, 3);
    }

    #[tokio::test]
    async fn test_rocksdb_user_directory() {
        let dir = tempdir().unwrap();
        let store = RocksDBStorage::open(dir.path()).unwrap();
        let mut uow = store.begin().await.unwrap();
        uow.put_user(User {
            id: 3,
            email: "Owner@Example.com".into(),
            name: "Owner".into(),
        })
        .await
        .unwrap();
        uow.commit().await.unwrap();

        let by_email = store
            .find_user_by_identifier("owner@example.com")
            .await
            .unwrap();
        assert_eq!(by_email.map(|u| u.id), Some(3));
        let by_id = store.find_user_by_identifier("3").await.unwrap();
        assert_eq!(by_id.map(|u| u.name), Some("Owner".to_string()));
        assert!(store.find_user_by_identifier("nobody@example.com").await.unwrap().is_none());
    }
}
