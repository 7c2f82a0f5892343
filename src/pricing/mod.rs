//! Price resolver abstraction: current and historical USD prices per asset.

use crate::domain::{unit_price_in_range, Asset, Decimal, TimeMs};
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

pub mod http;
pub mod mock;

pub use http::HttpPriceResolver;
pub use mock::MockPriceResolver;

/// USD price oracle consumed by the ledger and the query layer.
///
/// Calls may be slow and may fail. `Ok(None)` means the asset or timestamp is
/// unknown to the oracle; callers treat both that and errors as a zero price.
#[async_trait]
pub trait PriceResolver: Send + Sync + fmt::Debug {
    /// Latest USD price for `asset`.
    async fn current_price(&self, asset: &Asset) -> Result<Option<Decimal>, PriceError>;

    /// USD price for `asset` as of `at`.
    async fn historical_price(
        &self,
        asset: &Asset,
        at: TimeMs,
    ) -> Result<Option<Decimal>, PriceError>;
}

#[derive(Debug, Clone, Error)]
pub enum PriceError {
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("HTTP error {status}: {message}")]
    HttpError { status: u16, message: String },
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Rate limited")]
    RateLimited,
    #[error("Error: {0}")]
    Other(String),
}

/// Resolve to a usable price: errors, unknown, zero and out-of-range quotes
/// all become zero.
///
/// Returns the price together with whether it had to fall back.
pub fn price_or_zero(result: Result<Option<Decimal>, PriceError>) -> (Decimal, Option<String>) {
    match result {
        Ok(Some(price)) if price.is_positive() && unit_price_in_range(price) => (price, None),
        Ok(Some(price)) if price.is_positive() => {
            (Decimal::zero(), Some(format!("price {} out of range", price)))
        }
        Ok(Some(price)) => (Decimal::zero(), Some(format!("non-positive price {}", price))),
        Ok(None) => (Decimal::zero(), Some("price unavailable".to_string())),
        Err(e) => (Decimal::zero(), Some(e.to_string())),
    }
}
