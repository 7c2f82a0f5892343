use crate::db::Repository;
use crate::domain::{Transaction, UserId};
use crate::engine::{LedgerEngine, LedgerError, LedgerOutcome, ReplayReport};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::locks::UserLocks;

/// Entry point for the transaction feed.
///
/// Stores each transaction, then applies it to the ledger under the user's
/// lock. Redelivered transactions that were already applied are skipped; a
/// redelivery whose content differs from the stored row is rejected.
#[derive(Debug, Clone)]
pub struct Ingestor {
    repo: Arc<Repository>,
    engine: LedgerEngine,
    locks: Arc<UserLocks>,
}

impl Ingestor {
    pub fn new(repo: Arc<Repository>, engine: LedgerEngine) -> Self {
        Self {
            repo,
            engine,
            locks: Arc::new(UserLocks::new()),
        }
    }

    /// Store and apply one transaction.
    ///
    /// A transaction stored earlier but never applied (for example after a
    /// failed ledger write) is applied now. The stored row is what replay
    /// reads, so a redelivery is only accepted if it matches it exactly.
    ///
    /// # Errors
    /// `Conflict` if a different transaction is stored under the same
    /// (exchange, external id); nothing is applied.
    pub async fn ingest(&self, tx: &Transaction) -> Result<IngestOutcome, IngestError> {
        let _guard = self.locks.lock(&tx.user_id).await;

        if !self.repo.insert_transaction(tx).await? {
            let stored = self
                .repo
                .get_transaction(&tx.id)
                .await?
                .ok_or(sqlx::Error::RowNotFound)?;
            if stored != *tx {
                warn!(
                    tx_id = %tx.id,
                    stored_user = %stored.user_id,
                    user = %tx.user_id,
                    "Redelivered transaction differs from stored one, rejecting"
                );
                return Err(IngestError::Conflict { id: tx.id.clone() });
            }
            if self.repo.is_transaction_processed(&tx.id).await? {
                debug!(user = %tx.user_id, tx_id = %tx.id, "Duplicate transaction, skipping");
                return Ok(IngestOutcome::Duplicate);
            }
        }

        let outcome = self.engine.process_transaction(tx).await?;
        Ok(IngestOutcome::Processed(outcome))
    }

    /// Rebuild the user's ledger while holding their lock.
    pub async fn recalculate(
        &self,
        user: &UserId,
        cancel: &CancellationToken,
    ) -> Result<ReplayReport, IngestError> {
        let _guard = self.locks.lock(user).await;
        Ok(self.engine.recalculate_all(user, cancel).await?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Processed(LedgerOutcome),
    Duplicate,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Store(#[from] sqlx::Error),
    #[error("transaction {id} already stored with different content")]
    Conflict { id: String },
}
