use crate::domain::{InvoiceId, UserId};
use miette::Diagnostic;
use rust_decimal::Decimal;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PaymentError>;

#[derive(Error, Diagnostic, Debug)]
pub enum PaymentError {
    #[error("{entity} {id} not found")]
    #[diagnostic(code(rentledger::not_found))]
    NotFound { entity: &'static str, id: String },

    #[error("user {payer} is not the tenant on invoice {invoice}")]
    #[diagnostic(code(rentledger::unauthorized))]
    Unauthorized { payer: UserId, invoice: InvoiceId },

    #[error("invoice {0} is already paid")]
    #[diagnostic(code(rentledger::already_paid))]
    AlreadyPaid(InvoiceId),

    #[error("idempotency key {0} has already been processed")]
    #[diagnostic(code(rentledger::duplicate_request))]
    DuplicateRequest(String),

    #[error("insufficient funds: available {available}, required {required}")]
    #[diagnostic(
        code(rentledger::insufficient_funds),
        help("add funds to the wallet or pay with another method")
    )]
    InsufficientFunds {
        available: Decimal,
        required: Decimal,
    },

    #[error("payment provider rejected the request: {0}")]
    #[diagnostic(
        code(rentledger::provider_rejected),
        help("retry with a new payment attempt")
    )]
    ProviderRejected(String),

    #[error("payment provider did not answer within {0:?}")]
    #[diagnostic(code(rentledger::gateway_timeout))]
    GatewayTimeout(Duration),

    #[error("a payment for invoice {0} is already in progress")]
    #[diagnostic(code(rentledger::payment_in_progress))]
    PaymentInProgress(InvoiceId),

    #[error("recipient {0} not found")]
    #[diagnostic(code(rentledger::recipient_not_found))]
    RecipientNotFound(String),

    #[error("cannot transfer funds to yourself")]
    #[diagnostic(code(rentledger::self_transfer))]
    SelfTransfer,

    #[error("configuration error: {0}")]
    #[diagnostic(code(rentledger::configuration))]
    ConfigurationError(String),

    #[error("validation error: {0}")]
    #[diagnostic(code(rentledger::validation))]
    ValidationError(String),

    #[error("ledger balance chain broken at entry {entry_id}")]
    #[diagnostic(code(rentledger::ledger_corrupted))]
    LedgerCorrupted { entry_id: u64 },

    #[error("wallet {wallet_id} balance {stored} does not match its transactions ({computed})")]
    #[diagnostic(code(rentledger::balance_mismatch))]
    BalanceMismatch {
        wallet_id: u64,
        stored: Decimal,
        computed: Decimal,
    },

    #[error("CSV error: {0}")]
    #[diagnostic(code(rentledger::internal))]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    #[diagnostic(code(rentledger::internal))]
    IoError(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    #[diagnostic(code(rentledger::internal))]
    SerializationError(#[from] serde_json::Error),

    #[cfg(feature = "storage-rocksdb")]
    #[error("storage error: {0}")]
    #[diagnostic(code(rentledger::internal))]
    StorageError(#[from] rocksdb::Error),

    #[error("internal error: {0}")]
    #[diagnostic(code(rentledger::internal))]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

/// Stable, machine-checkable classification of a [`PaymentError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Unauthorized,
    AlreadyPaid,
    DuplicateRequest,
    InsufficientFunds,
    ProviderRejected,
    GatewayTimeout,
    PaymentInProgress,
    RecipientNotFound,
    SelfTransfer,
    Configuration,
    Validation,
    LedgerCorrupted,
    BalanceMismatch,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::AlreadyPaid => "already_paid",
            ErrorKind::DuplicateRequest => "duplicate_request",
            ErrorKind::InsufficientFunds => "insufficient_funds",
            ErrorKind::ProviderRejected => "provider_rejected",
            ErrorKind::GatewayTimeout => "gateway_timeout",
            ErrorKind::PaymentInProgress => "payment_in_progress",
            ErrorKind::RecipientNotFound => "recipient_not_found",
            ErrorKind::SelfTransfer => "self_transfer",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Validation => "validation",
            ErrorKind::LedgerCorrupted => "ledger_corrupted",
            ErrorKind::BalanceMismatch => "balance_mismatch",
            ErrorKind::Internal => "internal",
        }
    }

    /// Whether the same request may succeed if sent again later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::PaymentInProgress | ErrorKind::GatewayTimeout)
    }
}

impl PaymentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PaymentError::NotFound { .. } => ErrorKind::NotFound,
            PaymentError::Unauthorized { .. } => ErrorKind::Unauthorized,
            PaymentError::AlreadyPaid(_) => ErrorKind::AlreadyPaid,
            PaymentError::DuplicateRequest(_) => ErrorKind::DuplicateRequest,
            PaymentError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            PaymentError::ProviderRejected(_) => ErrorKind::ProviderRejected,
            PaymentError::GatewayTimeout(_) => ErrorKind::GatewayTimeout,
            PaymentError::PaymentInProgress(_) => ErrorKind::PaymentInProgress,
            PaymentError::RecipientNotFound(_) => ErrorKind::RecipientNotFound,
            PaymentError::SelfTransfer => ErrorKind::SelfTransfer,
            PaymentError::ConfigurationError(_) => ErrorKind::Configuration,
            PaymentError::ValidationError(_) => ErrorKind::Validation,
            PaymentError::LedgerCorrupted { .. } => ErrorKind::LedgerCorrupted,
            PaymentError::BalanceMismatch { .. } => ErrorKind::BalanceMismatch,
            PaymentError::CsvError(_)
            | PaymentError::IoError(_)
            | PaymentError::SerializationError(_)
            | PaymentError::InternalError(_) => ErrorKind::Internal,
            #[cfg(feature = "storage-rocksdb")]
            PaymentError::StorageError(_) => ErrorKind::Internal,
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        PaymentError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        PaymentError::InternalError(Box::new(std::io::Error::other(message.into())))
    }
}
