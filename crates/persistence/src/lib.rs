//! SQLite persistence for the signal pipeline.
//!
//! Every pipeline component owns writes to its own table; only the outcome
//! updater may transition a prediction's status. The prediction dedup rule
//! is enforced at write time, inside the same transaction as the insert.

mod schema;
mod store;

pub use schema::REQUIRED_TABLES;
pub use store::{MorningWrite, SignalStore, WriteOutcome};
