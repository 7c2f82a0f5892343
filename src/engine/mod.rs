//! Cost-basis ledger engine.
//!
//! - `fifo` - pure FIFO matching over an in-memory slice of open lots
//! - `ledger` - `LedgerEngine`: incremental processing and full replay

pub mod fifo;
pub mod ledger;

pub use fifo::{consume_fifo, FifoMatch};
pub use ledger::{LedgerEngine, LedgerError, LedgerOutcome, ReplayReport};
