use crate::db::Repository;
use crate::domain::{
    sort_transactions_for_replay, CostBasisLot, Decimal, LedgerAction, LotSource,
    RealizedGainRecord, TimeMs, Transaction, UserId,
};
use crate::pricing::{price_or_zero, PriceResolver};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::fifo::consume_fifo;

/// What `process_transaction` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerOutcome {
    LotCreated(CostBasisLot),
    GainRealized(RealizedGainRecord),
    Ignored,
}

/// Result of a full replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayReport {
    /// Transactions in the stored history.
    pub total: usize,
    /// Transactions applied successfully (including ignored types).
    pub processed: usize,
    /// Transactions that failed and were skipped.
    pub failed: usize,
    /// Replay stopped early on cancellation.
    pub cancelled: bool,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
    #[error("invalid transaction {id}: {reason}")]
    InvalidTransaction { id: String, reason: String },
}

impl LedgerError {
    fn invalid(tx: &Transaction, reason: &str) -> Self {
        LedgerError::InvalidTransaction {
            id: tx.id.clone(),
            reason: reason.to_string(),
        }
    }
}

/// Cost-basis ledger: opens lots on acquisitions and matches disposals FIFO.
///
/// The engine does not lock. Calls for the same (user, asset) must be
/// serialized by the caller; see `orchestration::Ingestor`.
#[derive(Debug, Clone)]
pub struct LedgerEngine {
    repo: Arc<Repository>,
    prices: Arc<dyn PriceResolver>,
}

impl LedgerEngine {
    pub fn new(repo: Arc<Repository>, prices: Arc<dyn PriceResolver>) -> Self {
        Self { repo, prices }
    }

    /// Apply one transaction to the ledger.
    ///
    /// Lot changes, the realized record and the source transaction's processed
    /// mark are committed together or not at all.
    ///
    /// # Errors
    /// `Store` if the database write fails (nothing is applied);
    /// `InvalidTransaction` for a zero-quantity acquisition or disposal, an
    /// amount or unit price outside the accepted range, or a disposal whose
    /// totals overflow. Nothing is written in either case.
    pub async fn process_transaction(&self, tx: &Transaction) -> Result<LedgerOutcome, LedgerError> {
        let action = tx.classify();
        if action == LedgerAction::Ignore {
            debug!(tx_id = %tx.id, tx_type = %tx.tx_type, "Transaction does not affect cost basis");
            let mut db_tx = self.repo.begin().await?;
            Repository::mark_transaction_processed_in(&mut db_tx, &tx.id, TimeMs::now()).await?;
            db_tx.commit().await?;
            return Ok(LedgerOutcome::Ignored);
        }

        let quantity = tx.quantity();
        if !quantity.is_positive() {
            return Err(LedgerError::invalid(tx, "amount must be non-zero"));
        }
        if let Some(reason) = tx.magnitude_violation() {
            return Err(LedgerError::invalid(tx, reason));
        }

        let unit_price = self.resolve_unit_price(tx).await;

        match action {
            LedgerAction::Acquire(source) => self.open_lot(tx, quantity, unit_price, source).await,
            LedgerAction::Dispose => self.dispose(tx, quantity, unit_price).await,
            LedgerAction::Ignore => Ok(LedgerOutcome::Ignored),
        }
    }

    /// Explicit price, else the historical price at the transaction time, else zero.
    async fn resolve_unit_price(&self, tx: &Transaction) -> Decimal {
        if let Some(price) = tx.explicit_price() {
            return price;
        }
        let (price, fallback) =
            price_or_zero(self.prices.historical_price(&tx.asset, tx.timestamp).await);
        if let Some(reason) = fallback {
            warn!(
                tx_id = %tx.id,
                asset = %tx.asset,
                timestamp = tx.timestamp.as_ms(),
                reason = %reason,
                "No historical price, recording zero"
            );
        }
        price
    }

    async fn open_lot(
        &self,
        tx: &Transaction,
        quantity: Decimal,
        cost_per_unit: Decimal,
        source: LotSource,
    ) -> Result<LedgerOutcome, LedgerError> {
        let lot = CostBasisLot::open(
            tx.user_id.clone(),
            tx.asset.clone(),
            quantity,
            cost_per_unit,
            tx.timestamp,
            tx.id.clone(),
            tx.exchange.clone(),
            source,
        );

        let mut db_tx = self.repo.begin().await?;
        Repository::mark_transaction_processed_in(&mut db_tx, &tx.id, TimeMs::now()).await?;
        Repository::insert_lot_in(&mut db_tx, &lot).await?;
        db_tx.commit().await?;

        debug!(
            user = %tx.user_id,
            asset = %tx.asset,
            lot_id = %lot.id,
            amount = %quantity,
            cost_per_unit = %cost_per_unit,
            "Opened lot"
        );
        Ok(LedgerOutcome::LotCreated(lot))
    }

    async fn dispose(
        &self,
        tx: &Transaction,
        quantity: Decimal,
        proceeds_per_unit: Decimal,
    ) -> Result<LedgerOutcome, LedgerError> {
        let mut db_tx = self.repo.begin().await?;
        // First statement is a write: SQLite holds the write lock across the FIFO read.
        Repository::mark_transaction_processed_in(&mut db_tx, &tx.id, TimeMs::now()).await?;

        let mut lots = Repository::fetch_open_lots_in(&mut db_tx, &tx.user_id, &tx.asset).await?;
        // Returning early drops `db_tx`, rolling back the processed mark.
        let matched = consume_fifo(&mut lots, quantity)
            .map_err(|_| LedgerError::invalid(tx, "cost basis overflows"))?;
        let proceeds = matched
            .amount_sold
            .checked_mul(proceeds_per_unit)
            .ok_or_else(|| LedgerError::invalid(tx, "proceeds overflow"))?;
        let realized_gain = proceeds
            .checked_sub(matched.cost_basis)
            .ok_or_else(|| LedgerError::invalid(tx, "realized gain overflows"))?;

        for idx in &matched.touched {
            Repository::update_lot_remaining_in(&mut db_tx, &lots[*idx]).await?;
        }

        let record = RealizedGainRecord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: tx.user_id.clone(),
            source_transaction_id: tx.id.clone(),
            asset: tx.asset.clone(),
            amount_sold: matched.amount_sold,
            proceeds,
            cost_basis: matched.cost_basis,
            realized_gain,
            realized_at: tx.timestamp,
            holding_period: matched.holding_period(tx.timestamp),
            exchange: tx.exchange.clone(),
            lot_breakdown: matched.breakdown.clone(),
        };
        Repository::insert_realized_gain_in(&mut db_tx, &record).await?;
        db_tx.commit().await?;

        if matched.shortfall().is_positive() {
            warn!(
                user = %tx.user_id,
                asset = %tx.asset,
                tx_id = %tx.id,
                requested = %matched.requested,
                matched = %matched.amount_sold,
                "Disposal exceeds tracked lots, excess left unmatched"
            );
        }
        debug!(
            user = %tx.user_id,
            asset = %tx.asset,
            record_id = %record.id,
            realized_gain = %record.realized_gain,
            lots = record.lot_breakdown.len(),
            "Realized gain"
        );
        Ok(LedgerOutcome::GainRealized(record))
    }

    /// Rebuild a user's lots and realized records from the stored history.
    ///
    /// Per-transaction failures are logged and skipped. The token is checked
    /// between transactions; a cancelled replay leaves the ledger partially
    /// rebuilt and reports `cancelled = true`.
    ///
    /// # Errors
    /// Returns an error only if the wipe or the history read fails.
    pub async fn recalculate_all(
        &self,
        user: &UserId,
        cancel: &CancellationToken,
    ) -> Result<ReplayReport, LedgerError> {
        let mut db_tx = self.repo.begin().await?;
        let (lots_deleted, records_deleted) = Repository::wipe_ledger_in(&mut db_tx, user).await?;
        Repository::reset_processed_in(&mut db_tx, user).await?;
        db_tx.commit().await?;

        let mut history = self.repo.query_transactions_for_user(user).await?;
        sort_transactions_for_replay(&mut history);

        info!(
            user = %user,
            transactions = history.len(),
            lots_deleted,
            records_deleted,
            "Recalculating ledger"
        );

        let mut report = ReplayReport {
            total: history.len(),
            ..ReplayReport::default()
        };

        for tx in &history {
            if cancel.is_cancelled() {
                report.cancelled = true;
                warn!(user = %user, processed = report.processed, "Recalculation cancelled");
                break;
            }
            match self.process_transaction(tx).await {
                Ok(_) => report.processed += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(user = %user, tx_id = %tx.id, error = %e, "Skipping transaction during replay");
                }
            }
        }

        info!(
            user = %user,
            total = report.total,
            processed = report.processed,
            failed = report.failed,
            "Recalculation finished"
        );
        Ok(report)
    }
}
