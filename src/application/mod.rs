//! Application layer: the services that implement payment collection,
//! bookkeeping and wallets on top of the domain ports.
//!
//! [`PaymentOrchestrator`](orchestrator::PaymentOrchestrator) is the entry point
//! for rent payments. It relies on [`AccountingLedger`](ledger::AccountingLedger)
//! for reconciliation and on [`WalletService`](wallets::WalletService) for the
//! wallet path.

pub mod ledger;
pub mod orchestrator;
pub mod wallets;
