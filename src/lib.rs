//! Rent payment orchestration with an append-only accounting ledger and
//! per-user wallets.
//!
//! The crate is laid out in layers: [`domain`] holds entities and ports,
//! [`application`] the services, [`infrastructure`] the storage backends and
//! payment providers, and [`interfaces`] the batch CSV adapters used by the
//! binary.

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
pub mod telemetry;
