//! Domain types for the cost-basis ledger.
//!
//! This module provides:
//! - Lossless numeric handling via the Decimal wrapper
//! - Primitives: TimeMs, UserId, Asset, Exchange, Side
//! - Transactions and their ledger classification
//! - Lots, realized gain records and holding periods
//! - Stable orderings for FIFO matching and replay

pub mod decimal;
pub mod lot;
pub mod ordering;
pub mod primitives;
pub mod realized;
pub mod transaction;

pub use decimal::{Decimal, DecimalOverflow};
pub use lot::{CostBasisLot, LotSource};
pub use ordering::{sort_lots_fifo, sort_transactions_for_replay};
pub use primitives::{Asset, Exchange, Side, TimeMs, UserId, DAY_MS};
pub use realized::{HoldingPeriod, LotConsumption, RealizedGainRecord, LONG_TERM_THRESHOLD_MS};
pub use transaction::{
    unit_price_in_range, LedgerAction, Transaction, TransactionType, MAX_QUANTITY, MAX_UNIT_PRICE,
};
