//! Adapters implementing the domain ports: storage backends, payment providers
//! and notification delivery.

pub mod gateway;
pub mod in_memory;
pub mod notifier;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
pub(crate) mod staging;
