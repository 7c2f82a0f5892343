//! Repository layer for database operations.
//!
//! This module provides the `Repository` struct for all database operations.
//! Methods are organized across submodules by store:
//! - `mod.rs` - stored transaction history written by the feed
//! - `lots.rs` - the Lot Store (FIFO scans, consumption writes, listings)
//! - `realized.rs` - the Realized-Gain Store (inserts, history queries)
//!
//! Functions suffixed `_in` run on a caller-supplied connection so the ledger
//! can group several writes into one SQLite transaction.

mod lots;
mod realized;

use crate::domain::{
    Asset, Decimal, Exchange, Side, TimeMs, Transaction, TransactionType, UserId,
};
use sqlx::sqlite::{SqliteConnection, SqlitePool, SqliteRow};
use sqlx::{Sqlite, Row};
use std::str::FromStr;

/// Maximum page size accepted by paginated listings.
pub const MAX_PAGE_LIMIT: i64 = 500;

/// 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
}

impl Pagination {
    /// Clamp to `page >= 1` and `1 <= limit <= MAX_PAGE_LIMIT`.
    pub fn new(page: i64, limit: i64) -> Self {
        Self {
            page: page.max(1),
            limit: limit.clamp(1, MAX_PAGE_LIMIT),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 1, limit: 50 }
    }
}

/// One page of results plus totals.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, pagination: Pagination) -> Self {
        Self {
            items,
            total,
            page: pagination.page,
            limit: pagination.limit,
            total_pages: total_pages(total, pagination.limit),
        }
    }
}

/// `ceil(total / limit)`.
pub fn total_pages(total: i64, limit: i64) -> i64 {
    if limit <= 0 || total <= 0 {
        return 0;
    }
    (total + limit - 1) / limit
}

/// Filters for realized-gain history. Empty sets mean "any".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RealizedFilter {
    /// Inclusive lower bound on `realized_at`.
    pub from: Option<TimeMs>,
    /// Inclusive upper bound on `realized_at`.
    pub to: Option<TimeMs>,
    pub assets: Vec<Asset>,
    pub exchanges: Vec<Exchange>,
}

/// Filters for lot listings. Empty sets mean "any".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LotFilter {
    pub assets: Vec<Asset>,
    pub exchanges: Vec<Exchange>,
    /// Include lots whose remaining amount is zero.
    pub include_consumed: bool,
}

/// Repository for database operations.
#[derive(Debug)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    /// Start a write transaction. Dropping it without `commit` rolls back.
    pub async fn begin(&self) -> Result<sqlx::Transaction<'static, Sqlite>, sqlx::Error> {
        self.pool.begin().await
    }

    /// Round-trip to the database.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // =========================================================================
    // Transaction history (feed side)
    // =========================================================================

    /// Store a transaction idempotently.
    ///
    /// Returns `false` if a transaction with the same id was already stored.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn insert_transaction(&self, tx: &Transaction) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO transactions (
                id, user_id, exchange, external_id, asset, amount,
                tx_type, side, price, timestamp_ms
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&tx.id)
        .bind(tx.user_id.as_str())
        .bind(tx.exchange.as_str())
        .bind(&tx.external_id)
        .bind(tx.asset.as_str())
        .bind(tx.amount.to_canonical_string())
        .bind(tx.tx_type.as_str())
        .bind(tx.side.map(|s| s.as_str()))
        .bind(tx.price.map(|p| p.to_canonical_string()))
        .bind(tx.timestamp.as_ms())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Stored transaction by id.
    ///
    /// # Errors
    /// Returns an error if the query fails or the row cannot be decoded.
    pub async fn get_transaction(&self, tx_id: &str) -> Result<Option<Transaction>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, exchange, external_id, asset, amount,
                   tx_type, side, price, timestamp_ms
            FROM transactions
            WHERE id = ?
            "#,
        )
        .bind(tx_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(transaction_from_row).transpose()
    }

    /// Whether the ledger has already applied the transaction.
    pub async fn is_transaction_processed(&self, tx_id: &str) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT processed_at_ms FROM transactions WHERE id = ?")
            .bind(tx_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row
            .map(|r| r.get::<Option<i64>, _>("processed_at_ms").is_some())
            .unwrap_or(false))
    }

    /// Mark a stored transaction as applied. No-op for unknown ids.
    pub async fn mark_transaction_processed_in(
        conn: &mut SqliteConnection,
        tx_id: &str,
        at: TimeMs,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE transactions SET processed_at_ms = ? WHERE id = ?")
            .bind(at.as_ms())
            .bind(tx_id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Clear the processed mark for all of a user's transactions.
    pub async fn reset_processed_in(
        conn: &mut SqliteConnection,
        user: &UserId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE transactions SET processed_at_ms = NULL WHERE user_id = ?")
            .bind(user.as_str())
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Full transaction history for a user, oldest first, ties in insertion order.
    ///
    /// # Errors
    /// Returns an error if the query fails or a stored row cannot be decoded.
    pub async fn query_transactions_for_user(
        &self,
        user: &UserId,
    ) -> Result<Vec<Transaction>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, exchange, external_id, asset, amount,
                   tx_type, side, price, timestamp_ms
            FROM transactions
            WHERE user_id = ?
            ORDER BY timestamp_ms ASC, seq ASC
            "#,
        )
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(transaction_from_row).collect()
    }

    pub async fn count_transactions_for_user(&self, user: &UserId) -> Result<i64, sqlx::Error> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM transactions WHERE user_id = ?")
            .bind(user.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("n"))
    }

    // =========================================================================
    // Recalculation
    // =========================================================================

    /// Delete every lot and realized record for a user.
    pub async fn wipe_ledger_in(
        conn: &mut SqliteConnection,
        user: &UserId,
    ) -> Result<(u64, u64), sqlx::Error> {
        let lots = sqlx::query("DELETE FROM cost_basis_lots WHERE user_id = ?")
            .bind(user.as_str())
            .execute(&mut *conn)
            .await?
            .rows_affected();
        let records = sqlx::query("DELETE FROM realized_gains WHERE user_id = ?")
            .bind(user.as_str())
            .execute(&mut *conn)
            .await?
            .rows_affected();
        Ok((lots, records))
    }
}

fn transaction_from_row(row: &SqliteRow) -> Result<Transaction, sqlx::Error> {
    let tx_type_str: String = row.get("tx_type");
    let tx_type = TransactionType::parse(&tx_type_str)
        .ok_or_else(|| decode_error("tx_type", &tx_type_str))?;
    let side = match row.get::<Option<String>, _>("side") {
        Some(s) => Some(Side::parse(&s).ok_or_else(|| decode_error("side", &s))?),
        None => None,
    };
    let price = match row.get::<Option<String>, _>("price") {
        Some(p) => Some(parse_decimal("price", &p)?),
        None => None,
    };

    Ok(Transaction {
        id: row.get("id"),
        user_id: UserId::new(row.get::<String, _>("user_id")),
        exchange: Exchange::new(row.get::<String, _>("exchange")),
        external_id: row.get("external_id"),
        asset: Asset::new(row.get::<String, _>("asset")),
        amount: parse_decimal("amount", &row.get::<String, _>("amount"))?,
        tx_type,
        side,
        price,
        timestamp: TimeMs::new(row.get("timestamp_ms")),
    })
}

/// Decode a canonical decimal column.
pub(crate) fn parse_decimal(column: &str, raw: &str) -> Result<Decimal, sqlx::Error> {
    Decimal::from_str(raw).map_err(|_| decode_error(column, raw))
}

pub(crate) fn decode_error(column: &str, raw: &str) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: format!("unexpected value {:?}", raw).into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_pages_is_ceiling() {
        assert_eq!(total_pages(0, 10), 0);
        assert_eq!(total_pages(1, 10), 1);
        assert_eq!(total_pages(10, 10), 1);
        assert_eq!(total_pages(11, 10), 2);
        assert_eq!(total_pages(101, 25), 5);
    }

    #[test]
    fn test_pagination_clamps() {
        let p = Pagination::new(0, 10_000);
        assert_eq!(p.page, 1);
        assert_eq!(p.limit, MAX_PAGE_LIMIT);
        assert_eq!(Pagination::new(3, 20).offset(), 40);
        assert_eq!(Pagination::new(1, 0).limit, 1);
    }

    #[test]
    fn test_page_carries_totals() {
        let page = Page::new(vec![1, 2], 7, Pagination::new(2, 2));
        assert_eq!(page.total_pages, 4);
        assert_eq!(page.page, 2);
    }

    #[test]
    fn test_parse_decimal_reports_column() {
        let err = parse_decimal("amount", "abc").unwrap_err();
        assert!(err.to_string().contains("amount"));
    }
}
