//! Integration layer between the transaction feed and the ledger.

pub mod ingest;
pub mod locks;

pub use ingest::{IngestError, IngestOutcome, Ingestor};
pub use locks::UserLocks;
