//! Realized-Gain Store operations for the repository.

use crate::domain::{
    Asset, Exchange, HoldingPeriod, LotConsumption, RealizedGainRecord, TimeMs, UserId,
};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Row, Sqlite};

use super::{decode_error, parse_decimal, Page, Pagination, RealizedFilter, Repository};

const REALIZED_COLUMNS: &str = "id, user_id, source_transaction_id, asset, amount_sold, proceeds, \
     cost_basis, realized_gain, realized_at_ms, holding_period, exchange, lot_breakdown";

/// Stored form of a breakdown entry; decimals as canonical strings so the
/// audit trail round-trips exactly.
#[derive(Debug, Serialize, Deserialize)]
struct StoredConsumption {
    lot_id: String,
    amount_consumed: String,
    cost_per_unit: String,
    lot_acquired_at_ms: i64,
}

impl From<&LotConsumption> for StoredConsumption {
    fn from(c: &LotConsumption) -> Self {
        StoredConsumption {
            lot_id: c.lot_id.clone(),
            amount_consumed: c.amount_consumed.to_canonical_string(),
            cost_per_unit: c.cost_per_unit.to_canonical_string(),
            lot_acquired_at_ms: c.lot_acquired_at.as_ms(),
        }
    }
}

impl StoredConsumption {
    fn into_domain(self) -> Result<LotConsumption, sqlx::Error> {
        Ok(LotConsumption {
            amount_consumed: parse_decimal("lot_breakdown.amount_consumed", &self.amount_consumed)?,
            cost_per_unit: parse_decimal("lot_breakdown.cost_per_unit", &self.cost_per_unit)?,
            lot_acquired_at: TimeMs::new(self.lot_acquired_at_ms),
            lot_id: self.lot_id,
        })
    }
}

impl Repository {
    /// Insert a realized gain record. The lot breakdown is stored as JSON.
    ///
    /// # Errors
    /// Returns an error if serialization or the insert fails.
    pub async fn insert_realized_gain_in(
        conn: &mut SqliteConnection,
        record: &RealizedGainRecord,
    ) -> Result<(), sqlx::Error> {
        let breakdown = encode_breakdown(&record.lot_breakdown)?;

        sqlx::query(
            r#"
            INSERT INTO realized_gains (
                id, user_id, source_transaction_id, asset, amount_sold, proceeds,
                cost_basis, realized_gain, realized_at_ms, holding_period, exchange, lot_breakdown
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(record.user_id.as_str())
        .bind(&record.source_transaction_id)
        .bind(record.asset.as_str())
        .bind(record.amount_sold.to_canonical_string())
        .bind(record.proceeds.to_canonical_string())
        .bind(record.cost_basis.to_canonical_string())
        .bind(record.realized_gain.to_canonical_string())
        .bind(record.realized_at.as_ms())
        .bind(record.holding_period.as_str())
        .bind(record.exchange.as_str())
        .bind(breakdown)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Realized records for a user matching `filter`, oldest first.
    ///
    /// # Errors
    /// Returns an error if the query fails or a row cannot be decoded.
    pub async fn query_realized_gains(
        &self,
        user: &UserId,
        filter: &RealizedFilter,
    ) -> Result<Vec<RealizedGainRecord>, sqlx::Error> {
        let mut select: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM realized_gains", REALIZED_COLUMNS));
        push_realized_filters(&mut select, user, filter);
        select.push(" ORDER BY realized_at_ms ASC, seq ASC");

        let rows = select.build().fetch_all(&self.pool).await?;
        rows.iter().map(realized_from_row).collect()
    }

    /// Filtered, paginated realized history, newest first.
    ///
    /// # Errors
    /// Returns an error if either query fails.
    pub async fn query_realized_gains_page(
        &self,
        user: &UserId,
        filter: &RealizedFilter,
        pagination: Pagination,
    ) -> Result<Page<RealizedGainRecord>, sqlx::Error> {
        let mut count: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) AS n FROM realized_gains");
        push_realized_filters(&mut count, user, filter);
        let total: i64 = count.build().fetch_one(&self.pool).await?.get("n");

        let mut select: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM realized_gains", REALIZED_COLUMNS));
        push_realized_filters(&mut select, user, filter);
        select.push(" ORDER BY realized_at_ms DESC, seq DESC LIMIT ");
        select.push_bind(pagination.limit);
        select.push(" OFFSET ");
        select.push_bind(pagination.offset());

        let rows = select.build().fetch_all(&self.pool).await?;
        let records = rows
            .iter()
            .map(realized_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page::new(records, total, pagination))
    }
}

fn push_realized_filters(
    qb: &mut QueryBuilder<'_, Sqlite>,
    user: &UserId,
    filter: &RealizedFilter,
) {
    qb.push(" WHERE user_id = ");
    qb.push_bind(user.as_str().to_string());

    if let Some(from) = filter.from {
        qb.push(" AND realized_at_ms >= ");
        qb.push_bind(from.as_ms());
    }
    if let Some(to) = filter.to {
        qb.push(" AND realized_at_ms <= ");
        qb.push_bind(to.as_ms());
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

fn encode_breakdown(breakdown: &[LotConsumption]) -> Result<String, sqlx::Error> {
    let stored: Vec<StoredConsumption> = breakdown.iter().map(StoredConsumption::from).collect();
    serde_json::to_string(&stored)
        .map_err(|e| sqlx::Error::Protocol(format!("lot_breakdown encode failed: {}", e)))
}

fn decode_breakdown(raw: &str) -> Result<Vec<LotConsumption>, sqlx::Error> {
    let stored: Vec<StoredConsumption> =
        serde_json::from_str(raw).map_err(|_| decode_error("lot_breakdown", raw))?;
    stored
        .into_iter()
        .map(StoredConsumption::into_domain)
        .collect()
}

fn realized_from_row(row: &SqliteRow) -> Result<RealizedGainRecord, sqlx::Error> {
    let holding_str: String = row.get("holding_period");
    let holding_period = HoldingPeriod::parse(&holding_str)
        .ok_or_else(|| decode_error("holding_period", &holding_str))?;
    let lot_breakdown = decode_breakdown(&row.get::<String, _>("lot_breakdown"))?;

    Ok(RealizedGainRecord {
        id: row.get("id"),
        user_id: UserId::new(row.get::<String, _>("user_id")),
        source_transaction_id: row.get("source_transaction_id"),
        asset: Asset::new(row.get::<String, _>("asset")),
        amount_sold: parse_decimal("amount_sold", &row.get::<String, _>("amount_sold"))?,
        proceeds: parse_decimal("proceeds", &row.get::<String, _>("proceeds"))?,
        cost_basis: parse_decimal("cost_basis", &row.get::<String, _>("cost_basis"))?,
        realized_gain: parse_decimal("realized_gain", &row.get::<String, _>("realized_gain"))?,
        realized_at: TimeMs::new(row.get("realized_at_ms")),
        holding_period,
        exchange: Exchange::new(row.get::<String, _>("exchange")),
        lot_breakdown,
    })
}
