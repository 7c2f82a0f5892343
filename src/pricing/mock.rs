//! In-memory price resolver for tests and offline runs.

use super::{PriceError, PriceResolver};
use crate::domain::{Asset, Decimal, TimeMs};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};

/// Returns predefined prices.
///
/// Historical lookups return the latest point at or before the requested time.
#[derive(Debug, Clone, Default)]
pub struct MockPriceResolver {
    current: HashMap<Asset, Decimal>,
    history: HashMap<Asset, BTreeMap<TimeMs, Decimal>>,
    failing: bool,
}

impl MockPriceResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_current(mut self, asset: &str, price: Decimal) -> Self {
        self.current.insert(Asset::new(asset), price);
        self
    }

    pub fn with_historical(mut self, asset: &str, at: TimeMs, price: Decimal) -> Self {
        self.history
            .entry(Asset::new(asset))
            .or_default()
            .insert(at, price);
        self
    }

    /// Every lookup fails with a network error.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl PriceResolver for MockPriceResolver {
    async fn current_price(&self, asset: &Asset) -> Result<Option<Decimal>, PriceError> {
        if self.failing {
            return Err(PriceError::NetworkError("mock resolver offline".to_string()));
        }
        Ok(self.current.get(asset).copied())
    }

    async fn historical_price(
        &self,
        asset: &Asset,
        at: TimeMs,
    ) -> Result<Option<Decimal>, PriceError> {
        if self.failing {
            return Err(PriceError::NetworkError("mock resolver offline".to_string()));
        }
        Ok(self
            .history
            .get(asset)
            .and_then(|points| points.range(..=at).next_back())
            .map(|(_, price)| *price))
    }
}
