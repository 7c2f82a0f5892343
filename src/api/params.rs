//! Query-string helpers shared by the handlers.

use crate::db::Pagination;
use crate::domain::{Asset, Exchange, TimeMs, UserId};
use crate::error::AppError;

pub fn parse_user(input: &str) -> Result<UserId, AppError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest("user is required".to_string()));
    }
    Ok(UserId::new(trimmed))
}

/// Split a comma-separated list, dropping empty entries.
pub fn parse_list<T>(input: Option<&str>, make: impl Fn(&str) -> T) -> Vec<T> {
    input
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(make)
        .collect()
}

pub fn parse_assets(input: Option<&str>) -> Vec<Asset> {
    parse_list(input, |s| Asset::new(s))
}

pub fn parse_exchanges(input: Option<&str>) -> Vec<Exchange> {
    parse_list(input, |s| Exchange::new(s))
}

pub fn parse_range(
    from_ms: Option<i64>,
    to_ms: Option<i64>,
) -> Result<(Option<TimeMs>, Option<TimeMs>), AppError> {
    let from = from_ms.map(TimeMs::new);
    let to = to_ms.map(TimeMs::new);
    if let (Some(from), Some(to)) = (from, to) {
        if from > to {
            return Err(AppError::BadRequest("fromMs must be <= toMs".to_string()));
        }
    }
    Ok((from, to))
}

pub fn pagination(page: Option<i64>, limit: Option<i64>) -> Pagination {
    let default = Pagination::default();
    Pagination::new(page.unwrap_or(default.page), limit.unwrap_or(default.limit))
}
