//! Lot Store operations for the repository.

use crate::domain::{Asset, CostBasisLot, Exchange, LotSource, TimeMs, UserId};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};

use super::{decode_error, parse_decimal, LotFilter, Page, Pagination, Repository};

const LOT_COLUMNS: &str = "id, user_id, asset, original_amount, remaining_amount, cost_per_unit, \
     acquired_at_ms, source_transaction_id, exchange, source";

impl Repository {
    /// Insert a newly opened lot.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn insert_lot_in(
        conn: &mut SqliteConnection,
        lot: &CostBasisLot,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO cost_basis_lots (
                id, user_id, asset, original_amount, remaining_amount, is_open,
                cost_per_unit, acquired_at_ms, source_transaction_id, exchange, source
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&lot.id)
        .bind(lot.user_id.as_str())
        .bind(lot.asset.as_str())
        .bind(lot.original_amount.to_canonical_string())
        .bind(lot.remaining_amount.to_canonical_string())
        .bind(i32::from(lot.is_open()))
        .bind(lot.cost_per_unit.to_canonical_string())
        .bind(lot.acquired_at.as_ms())
        .bind(&lot.source_transaction_id)
        .bind(lot.exchange.as_str())
        .bind(lot.source.as_str())
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Open lots for one (user, asset), oldest first, ties in insertion order.
    ///
    /// # Errors
    /// Returns an error if the query fails or a row cannot be decoded.
    pub async fn fetch_open_lots_in(
        conn: &mut SqliteConnection,
        user: &UserId,
        asset: &Asset,
    ) -> Result<Vec<CostBasisLot>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM cost_basis_lots \
             WHERE user_id = ? AND asset = ? AND is_open = 1 \
             ORDER BY acquired_at_ms ASC, seq ASC",
            LOT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(user.as_str())
            .bind(asset.as_str())
            .fetch_all(&mut *conn)
            .await?;

        rows.iter().map(lot_from_row).collect()
    }

    /// Persist a lot's new remaining amount after consumption.
    pub async fn update_lot_remaining_in(
        conn: &mut SqliteConnection,
        lot: &CostBasisLot,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE cost_basis_lots SET remaining_amount = ?, is_open = ? WHERE id = ?")
            .bind(lot.remaining_amount.to_canonical_string())
            .bind(i32::from(lot.is_open()))
            .bind(&lot.id)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// All lots with a positive remaining amount for a user, oldest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn query_open_lots(&self, user: &UserId) -> Result<Vec<CostBasisLot>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM cost_basis_lots WHERE user_id = ? AND is_open = 1 \
             ORDER BY asset ASC, acquired_at_ms ASC, seq ASC",
            LOT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(user.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(lot_from_row).collect()
    }

    /// Every lot for a user, consumed or not, in FIFO order.
    pub async fn query_all_lots(&self, user: &UserId) -> Result<Vec<CostBasisLot>, sqlx::Error> {
        let sql = format!(
            "SELECT {} FROM cost_basis_lots WHERE user_id = ? \
             ORDER BY asset ASC, acquired_at_ms ASC, seq ASC",
            LOT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(user.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(lot_from_row).collect()
    }

    /// Filtered, paginated lot listing ordered by acquisition time.
    ///
    /// # Errors
    /// Returns an error if either query fails.
    pub async fn query_lots_page(
        &self,
        user: &UserId,
        filter: &LotFilter,
        pagination: Pagination,
    ) -> Result<Page<CostBasisLot>, sqlx::Error> {
        let mut count: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) AS n FROM cost_basis_lots");
        push_lot_filters(&mut count, user, filter);
        let total: i64 = count.build().fetch_one(&self.pool).await?.get("n");

        let mut select: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM cost_basis_lots", LOT_COLUMNS));
        push_lot_filters(&mut select, user, filter);
        select.push(" ORDER BY acquired_at_ms ASC, seq ASC LIMIT ");
        select.push_bind(pagination.limit);
        select.push(" OFFSET ");
        select.push_bind(pagination.offset());

        let rows = select.build().fetch_all(&self.pool).await?;
        let lots = rows
            .iter()
            .map(lot_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page::new(lots, total, pagination))
    }
}

fn push_lot_filters(qb: &mut QueryBuilder<'_, Sqlite>, user: &UserId, filter: &LotFilter) {
    qb.push(" WHERE user_id = ");
    qb.push_bind(user.as_str().to_string());

    if !filter.include_consumed {
        qb.push(" AND is_open = 1");
    }
    if !filter.assets.is_empty() {
        qb.push(" AND asset IN (");
        let mut list = qb.separated(", ");
        for asset in &filter.assets {
            list.push_bind(asset.as_str().to_string());
        }
        list.push_unseparated(")");
    }
    if !filter.exchanges.is_empty() {
        qb.push(" AND exchange IN (");
        let mut list = qb.separated(", ");
        for exchange in &filter.exchanges {
            list.push_bind(exchange.as_str().to_string());
        }
        list.push_unseparated(")");
    }
}

fn lot_from_row(row: &SqliteRow) -> Result<CostBasisLot, sqlx::Error> {
    let source_str: String = row.get("source");
    let source = LotSource::parse(&source_str).ok_or_else(|| decode_error("source", &source_str))?;

    Ok(CostBasisLot {
        id: row.get("id"),
        user_id: UserId::new(row.get::<String, _>("user_id")),
        asset: Asset::new(row.get::<String, _>("asset")),
        original_amount: parse_decimal(
            "original_amount",
            &row.get::<String, _>("original_amount"),
        )?,
        remaining_amount: parse_decimal(
            "remaining_amount",
            &row.get::<String, _>("remaining_amount"),
        )?,
        cost_per_unit: parse_decimal("cost_per_unit", &row.get::<String, _>("cost_per_unit"))?,
        acquired_at: TimeMs::new(row.get("acquired_at_ms")),
        source_transaction_id: row.get("source_transaction_id"),
        exchange: Exchange::new(row.get::<String, _>("exchange")),
        source,
    })
}
