//! Batch-run adapters: CSV operations in, CSV reports out, JSON seed data.

pub mod csv;
pub mod seed;
