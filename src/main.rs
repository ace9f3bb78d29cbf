use clap::Parser;
use miette::{IntoDiagnostic, Result};
use rentledger::application::orchestrator::{PaymentMethod, PaymentOrchestrator};
use rentledger::application::wallets::WalletService;
use rentledger::config::SettingsArgs;
use rentledger::domain::ports::{StorageHandle, UserDirectoryHandle};
use rentledger::infrastructure::gateway::GatewayFacade;
use rentledger::infrastructure::in_memory::InMemoryStorage;
use rentledger::infrastructure::notifier::LogNotifier;
use rentledger::interfaces::csv::operation_reader::{Operation, OperationReader, OperationType};
use rentledger::interfaces::csv::report_writer::{LedgerWriter, WalletWriter};
use rentledger::interfaces::seed::Seed;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::error;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input operations CSV file
    input: PathBuf,

    /// JSON file with the users and invoices to load before processing
    #[arg(long)]
    seed: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Write the ledger as CSV to this file after processing
    #[arg(long)]
    ledger_out: Option<PathBuf>,

    #[command(flatten)]
    settings: SettingsArgs,
}

struct App {
    wallets: WalletService,
    orchestrator: PaymentOrchestrator,
}

impl App {
    async fn apply(&self, op: Operation) -> rentledger::error::Result<()> {
        match op.r#type {
            OperationType::Deposit => {
                self.wallets
                    .add_funds(op.user, op.required_amount()?, op.method.as_deref())
                    .await?;
            }
            OperationType::Withdraw => {
                self.wallets
                    .withdraw(op.user, op.required_amount()?, op.method.as_deref())
                    .await?;
            }
            OperationType::Transfer => {
                self.wallets
                    .transfer(op.user, op.required_recipient()?, op.required_amount()?)
                    .await?;
            }
            OperationType::Pay => {
                let invoice = op.required_invoice()?;
                let method: PaymentMethod = op.method.as_deref().unwrap_or("wallet").parse()?;
                let key = match op.key.as_deref() {
                    Some(key) if !key.is_empty() => key.to_string(),
                    _ => self.orchestrator.idempotency_key_for(op.user, invoice),
                };
                self.orchestrator
                    .collect_payment(op.user, invoice, &key, &method)
                    .await?;
            }
        }
        Ok(())
    }
}

fn open_storage(db_path: Option<PathBuf>) -> Result<(StorageHandle, UserDirectoryHandle)> {
    if let Some(db_path) = db_path {
        #[cfg(feature = "storage-rocksdb")]
        {
            let store = Arc::new(rentledger::infrastructure::rocksdb::RocksDBStorage::open(
                db_path,
            )?);
            let users: UserDirectoryHandle = store.clone();
            let storage: StorageHandle = store;
            return Ok((storage, users));
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        {
            let _ = db_path;
            tracing::warn!(
                "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
        }
    }
    let store = Arc::new(InMemoryStorage::new());
    let users: UserDirectoryHandle = store.clone();
    let storage: StorageHandle = store;
    Ok((storage, users))
}

#[tokio::main]
async fn main() -> Result<()> {
    rentledger::telemetry::init();
    let cli = Cli::parse();
    let settings = cli.settings.into_settings();

    let (storage, users) = open_storage(cli.db_path)?;
    if let Some(seed) = cli.seed {
        Seed::from_path(seed)?.load_into(storage.as_ref()).await?;
    }

    let app = App {
        wallets: WalletService::new(storage.clone(), users.clone()),
        orchestrator: PaymentOrchestrator::new(
            storage.clone(),
            users,
            Box::new(GatewayFacade::from_settings(&settings.gateway)),
            Arc::new(LogNotifier),
            &settings,
        ),
    };

    // Process operations
    let file = File::open(cli.input).into_diagnostic()?;
    let reader = OperationReader::new(file);
    for (row, op_result) in reader.operations().enumerate() {
        match op_result {
            Ok(op) => {
                if let Err(e) = app.apply(op).await {
                    error!(
                        row = row + 1,
                        kind = e.kind().as_str(),
                        "Error processing operation: {e}"
                    );
                }
            }
            Err(e) => {
                error!(row = row + 1, "Error reading operation: {e}");
            }
        }
    }

    // Output final state
    let stdout = io::stdout();
    let mut writer = WalletWriter::new(stdout.lock());
    writer.write_wallets(storage.wallets().await?)?;

    if let Some(path) = cli.ledger_out {
        let entries = app.orchestrator.ledger().entries().await?;
        let file = File::create(path).into_diagnostic()?;
        LedgerWriter::new(file).write_entries(&entries)?;
    }

    storage.flush().await?;
    Ok(())
}
