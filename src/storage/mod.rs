//! Durable record store for tasks and proxy endpoints.
//!
//! The distribution core consumes persistence through the `RecordStore`
//! capability trait; it requires read-your-writes consistency per record
//! and no cross-record transactions. Two implementations are provided:
//!
//! - `PgRecordStore`: PostgreSQL via sqlx, for deployments
//! - `MemoryRecordStore`: in-process maps, for tests and single-node demos

pub mod memory;
pub mod postgres;
pub mod records;
pub mod store;

pub use memory::MemoryRecordStore;
pub use postgres::PgRecordStore;
pub use records::ProxyEndpoint;
pub use store::{RecordStore, StoreError};
