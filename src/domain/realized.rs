//! Realized gain record produced by a disposal.

use crate::domain::{Asset, Decimal, Exchange, TimeMs, UserId, DAY_MS};
use serde::{Deserialize, Serialize};

/// Holding-period threshold: a fixed 365 x 24h, not calendar years.
pub const LONG_TERM_THRESHOLD_MS: i64 = 365 * DAY_MS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldingPeriod {
    ShortTerm,
    LongTerm,
}

impl HoldingPeriod {
    /// Classify by elapsed time since acquisition; `>=` threshold is long-term.
    pub fn between(acquired_at: TimeMs, realized_at: TimeMs) -> Self {
        if realized_at.since(acquired_at) >= LONG_TERM_THRESHOLD_MS {
            HoldingPeriod::LongTerm
        } else {
            HoldingPeriod::ShortTerm
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HoldingPeriod::ShortTerm => "short_term",
            HoldingPeriod::LongTerm => "long_term",
        }
    }

    pub fn parse(s: &str) -> Option<HoldingPeriod> {
        match s {
            "short_term" => Some(HoldingPeriod::ShortTerm),
            "long_term" => Some(HoldingPeriod::LongTerm),
            _ => None,
        }
    }
}

/// One lot's contribution to a disposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LotConsumption {
    pub lot_id: String,
    pub amount_consumed: Decimal,
    pub cost_per_unit: Decimal,
    pub lot_acquired_at: TimeMs,
}

impl LotConsumption {
    /// `None` on overflow.
    pub fn cost(&self) -> Option<Decimal> {
        self.amount_consumed.checked_mul(self.cost_per_unit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealizedGainRecord {
    pub id: String,
    pub user_id: UserId,
    pub source_transaction_id: String,
    pub asset: Asset,
    /// Quantity actually matched against lots; may be below the disposal amount.
    pub amount_sold: Decimal,
    pub proceeds: Decimal,
    pub cost_basis: Decimal,
    pub realized_gain: Decimal,
    pub realized_at: TimeMs,
    pub holding_period: HoldingPeriod,
    pub exchange: Exchange,
    /// Consumed lots, oldest first.
    pub lot_breakdown: Vec<LotConsumption>,
}

impl RealizedGainRecord {
    /// True when `Σ amount_consumed == amount_sold` and `Σ cost == cost_basis`.
    /// False if any of the sums overflows.
    pub fn is_balanced(&self) -> bool {
        let consumed = Decimal::try_sum(self.lot_breakdown.iter().map(|c| c.amount_consumed));
        let cost = self
            .lot_breakdown
            .iter()
            .map(LotConsumption::cost)
            .collect::<Option<Vec<_>>>()
            .map(Decimal::try_sum);
        consumed == Ok(self.amount_sold)
            && cost == Some(Ok(self.cost_basis))
            && self.proceeds.checked_sub(self.cost_basis) == Some(self.realized_gain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holding_period_boundary_is_inclusive() {
        let t0 = TimeMs::new(1_600_000_000_000);
        assert_eq!(
            HoldingPeriod::between(t0, t0.plus_days(364)),
            HoldingPeriod::ShortTerm
        );
        assert_eq!(
            HoldingPeriod::between(t0, TimeMs::new(t0.as_ms() + LONG_TERM_THRESHOLD_MS - 1)),
            HoldingPeriod::ShortTerm
        );
        assert_eq!(
            HoldingPeriod::between(t0, t0.plus_days(365)),
            HoldingPeriod::LongTerm
        );
        assert_eq!(
            HoldingPeriod::between(t0, t0.plus_days(366)),
            HoldingPeriod::LongTerm
        );
    }

    #[test]
    fn holding_period_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&HoldingPeriod::LongTerm).unwrap(),
            "\"long_term\""
        );
        assert_eq!(
            HoldingPeriod::parse("short_term"),
            Some(HoldingPeriod::ShortTerm)
        );
    }
}
