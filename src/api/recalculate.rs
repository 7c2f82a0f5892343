use axum::extract::{Query, State};
use axum::Json;
use tracing::info;

use super::params::parse_user;
use super::pnl::UserQuery;
use super::AppState;
use crate::engine::ReplayReport;
use crate::error::AppError;

/// Rebuild a user's lots and realized records from stored history.
///
/// Cancelled by server shutdown.
pub async fn post_recalculate(
    Query(params): Query<UserQuery>,
    State(state): State<AppState>,
) -> Result<Json<ReplayReport>, AppError> {
    let user = parse_user(&params.user)?;
    if state.repo.count_transactions_for_user(&user).await? == 0 {
        return Err(AppError::NotFound(format!("no transactions for user {}", user)));
    }

    info!(user = %user, "Recalculation requested");
    let cancel = state.shutdown.child_token();
    let report = state.ingestor.recalculate(&user, &cancel).await?;
    Ok(Json(report))
}
