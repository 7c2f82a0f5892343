//! Read-side aggregation over the Lot and Realized-Gain stores.
//!
//! Nothing here writes. Prices come from the `PriceResolver`; a missing or
//! failed price values the position at zero. Aggregates use checked decimal
//! arithmetic and surface overflow as `QueryError::Overflow`.

pub mod periods;
pub mod summary;
pub mod unrealized;

pub use periods::{PeriodBoundaries, PeriodBreakdown, PeriodPnl};
pub use summary::{build_summary, AssetPnl, PnlSummary};
pub use unrealized::{group_open_lots, Holding, UnrealizedPnl, UnrealizedPosition};

use crate::config::WeekStart;
use crate::db::{LotFilter, Page, Pagination, RealizedFilter, Repository};
use crate::domain::{CostBasisLot, DecimalOverflow, RealizedGainRecord, TimeMs, UserId};
use crate::pricing::{price_or_zero, PriceResolver};
use futures::future::join_all;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
    #[error("P&L for user {user} overflows the decimal range")]
    Overflow { user: String },
}

#[derive(Debug, Clone)]
pub struct PnlQueries {
    repo: Arc<Repository>,
    prices: Arc<dyn PriceResolver>,
    week_start: WeekStart,
}

impl PnlQueries {
    pub fn new(repo: Arc<Repository>, prices: Arc<dyn PriceResolver>, week_start: WeekStart) -> Self {
        Self {
            repo,
            prices,
            week_start,
        }
    }

    /// Open positions valued at current prices, one row per asset.
    ///
    /// Prices are fetched concurrently.
    pub async fn unrealized_pnl(&self, user: &UserId) -> Result<UnrealizedPnl, QueryError> {
        let overflow = |_: DecimalOverflow| QueryError::Overflow {
            user: user.to_string(),
        };
        let lots = self.repo.query_open_lots(user).await?;
        let holdings = group_open_lots(&lots).map_err(overflow)?;

        let quotes = join_all(
            holdings
                .iter()
                .map(|h| self.prices.current_price(&h.asset)),
        )
        .await;

        let positions = holdings
            .into_iter()
            .zip(quotes)
            .map(|(holding, quote)| {
                let (price, fallback) = price_or_zero(quote);
                if let Some(reason) = fallback {
                    warn!(
                        user = %user,
                        asset = %holding.asset,
                        reason = %reason,
                        "No current price, valuing position at zero"
                    );
                }
                UnrealizedPosition::value(holding, price)
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(overflow)?;

        UnrealizedPnl::from_positions(positions).map_err(overflow)
    }

    pub async fn summary(&self, user: &UserId) -> Result<PnlSummary, QueryError> {
        self.summary_at(user, TimeMs::now()).await
    }

    /// Summary with period boundaries computed relative to `now`.
    pub async fn summary_at(&self, user: &UserId, now: TimeMs) -> Result<PnlSummary, QueryError> {
        let records = self
            .repo
            .query_realized_gains(user, &RealizedFilter::default())
            .await?;
        let unrealized = self.unrealized_pnl(user).await?;
        let bounds = PeriodBoundaries::at(now, self.week_start);
        build_summary(&records, &unrealized, &bounds).map_err(|_| QueryError::Overflow {
            user: user.to_string(),
        })
    }

    /// Realized records with `from <= realized_at <= to`, oldest first.
    pub async fn realized_pnl(
        &self,
        user: &UserId,
        from: Option<TimeMs>,
        to: Option<TimeMs>,
    ) -> Result<Vec<RealizedGainRecord>, sqlx::Error> {
        let filter = RealizedFilter {
            from,
            to,
            ..RealizedFilter::default()
        };
        self.repo.query_realized_gains(user, &filter).await
    }

    /// Filtered realized history, newest first.
    pub async fn realized_pnl_page(
        &self,
        user: &UserId,
        filter: &RealizedFilter,
        pagination: Pagination,
    ) -> Result<Page<RealizedGainRecord>, sqlx::Error> {
        self.repo
            .query_realized_gains_page(user, filter, pagination)
            .await
    }

    pub async fn cost_basis_lots(
        &self,
        user: &UserId,
        filter: &LotFilter,
        pagination: Pagination,
    ) -> Result<Page<CostBasisLot>, sqlx::Error> {
        self.repo.query_lots_page(user, filter, pagination).await
    }
}
