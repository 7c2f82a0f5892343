//! Stable orderings for deterministic lot matching and replay.
//!
//! Both sorts are stable: equal timestamps keep the order the store returned,
//! which is insertion order.

use crate::domain::{CostBasisLot, Transaction};

/// Oldest lot first.
pub fn sort_lots_fifo(lots: &mut [CostBasisLot]) {
    lots.sort_by_key(|lot| lot.acquired_at);
}

/// Oldest transaction first.
pub fn sort_transactions_for_replay(transactions: &mut [Transaction]) {
    transactions.sort_by_key(|tx| tx.timestamp);
}
