use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use super::params::{pagination, parse_assets, parse_exchanges, parse_range, parse_user};
use super::AppState;
use crate::db::{Page, RealizedFilter};
use crate::domain::RealizedGainRecord;
use crate::error::AppError;
use crate::query::{PnlSummary, UnrealizedPnl};

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user: String,
}

pub async fn get_summary(
    Query(params): Query<UserQuery>,
    State(state): State<AppState>,
) -> Result<Json<PnlSummary>, AppError> {
    let user = parse_user(&params.user)?;
    Ok(Json(state.queries.summary(&user).await?))
}

pub async fn get_unrealized(
    Query(params): Query<UserQuery>,
    State(state): State<AppState>,
) -> Result<Json<UnrealizedPnl>, AppError> {
    let user = parse_user(&params.user)?;
    Ok(Json(state.queries.unrealized_pnl(&user).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealizedQuery {
    pub user: String,
    pub from_ms: Option<i64>,
    pub to_ms: Option<i64>,
    pub assets: Option<String>,
    pub exchanges: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Realized gain history, newest first.
pub async fn get_realized(
    Query(params): Query<RealizedQuery>,
    State(state): State<AppState>,
) -> Result<Json<Page<RealizedGainRecord>>, AppError> {
    let user = parse_user(&params.user)?;
    let (from, to) = parse_range(params.from_ms, params.to_ms)?;
    let filter = RealizedFilter {
        from,
        to,
        assets: parse_assets(params.assets.as_deref()),
        exchanges: parse_exchanges(params.exchanges.as_deref()),
    };

    let page = state
        .queries
        .realized_pnl_page(&user, &filter, pagination(params.page, params.limit))
        .await?;
    Ok(Json(page))
}
