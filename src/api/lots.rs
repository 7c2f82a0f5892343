use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use super::params::{pagination, parse_assets, parse_exchanges, parse_user};
use super::AppState;
use crate::db::{LotFilter, Page};
use crate::domain::CostBasisLot;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LotsQuery {
    pub user: String,
    pub assets: Option<String>,
    pub exchanges: Option<String>,
    pub include_consumed: Option<bool>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn get_lots(
    Query(params): Query<LotsQuery>,
    State(state): State<AppState>,
) -> Result<Json<Page<CostBasisLot>>, AppError> {
    let user = parse_user(&params.user)?;
    let filter = LotFilter {
        assets: parse_assets(params.assets.as_deref()),
        exchanges: parse_exchanges(params.exchanges.as_deref()),
        include_consumed: params.include_consumed.unwrap_or(false),
    };

    let page = state
        .queries
        .cost_basis_lots(&user, &filter, pagination(params.page, params.limit))
        .await?;
    Ok(Json(page))
}
