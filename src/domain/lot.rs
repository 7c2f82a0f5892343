//! Cost-basis lot: a quantity of an asset acquired at a known USD cost.

use crate::domain::{Asset, Decimal, Exchange, TimeMs, UserId};
use serde::{Deserialize, Serialize};

/// Why a lot was opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LotSource {
    Buy,
    Deposit,
    Interest,
    TransferIn,
}

impl LotSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LotSource::Buy => "buy",
            LotSource::Deposit => "deposit",
            LotSource::Interest => "interest",
            LotSource::TransferIn => "transfer_in",
        }
    }

    pub fn parse(s: &str) -> Option<LotSource> {
        match s {
            "buy" => Some(LotSource::Buy),
            "deposit" => Some(LotSource::Deposit),
            "interest" => Some(LotSource::Interest),
            "transfer_in" => Some(LotSource::TransferIn),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostBasisLot {
    pub id: String,
    pub user_id: UserId,
    pub asset: Asset,
    pub original_amount: Decimal,
    /// Unconsumed quantity; only ever decreases.
    pub remaining_amount: Decimal,
    /// USD per unit at acquisition.
    pub cost_per_unit: Decimal,
    pub acquired_at: TimeMs,
    pub source_transaction_id: String,
    pub exchange: Exchange,
    pub source: LotSource,
}

impl CostBasisLot {
    /// Open a fresh lot with `remaining_amount == original_amount`.
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        user_id: UserId,
        asset: Asset,
        amount: Decimal,
        cost_per_unit: Decimal,
        acquired_at: TimeMs,
        source_transaction_id: String,
        exchange: Exchange,
        source: LotSource,
    ) -> Self {
        CostBasisLot {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            asset,
            original_amount: amount,
            remaining_amount: amount,
            cost_per_unit,
            acquired_at,
            source_transaction_id,
            exchange,
            source,
        }
    }

    pub fn is_open(&self) -> bool {
        self.remaining_amount.is_positive()
    }

    /// Cost basis of the unconsumed remainder. `None` on overflow.
    pub fn remaining_cost(&self) -> Option<Decimal> {
        self.remaining_amount.checked_mul(self.cost_per_unit)
    }

    /// Take up to `wanted` units from the lot and return how much was taken.
    ///
    /// Never drives `remaining_amount` below zero.
    pub fn consume(&mut self, wanted: Decimal) -> Decimal {
        if !wanted.is_positive() {
            return Decimal::zero();
        }
        let taken = self.remaining_amount.min(wanted);
        self.remaining_amount -= taken;
        taken
    }
}
