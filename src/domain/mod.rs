//! Domain layer: entities, value objects and the ports the application layer
//! talks to. Nothing in here knows about a concrete store or provider.

pub mod gateway;
pub mod invoice;
pub mod ledger;
pub mod money;
pub mod ports;
pub mod user;
pub mod wallet;

pub type UserId = u64;
pub type InvoiceId = u64;
pub type UnitId = u64;
pub type PropertyId = u64;
