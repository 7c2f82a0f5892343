//! Unrealized P&L from open lots.

use crate::domain::{Asset, CostBasisLot, Decimal, DecimalOverflow};
use serde::Serialize;
use std::collections::BTreeMap;

/// Open quantity and remaining cost for one asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Holding {
    pub asset: Asset,
    pub amount: Decimal,
    pub cost_basis: Decimal,
    pub lot_count: usize,
}

/// Group lots with a positive remaining amount by asset, sorted by symbol.
pub fn group_open_lots(lots: &[CostBasisLot]) -> Result<Vec<Holding>, DecimalOverflow> {
    let mut by_asset: BTreeMap<Asset, Holding> = BTreeMap::new();
    for lot in lots.iter().filter(|l| l.is_open()) {
        let holding = by_asset.entry(lot.asset.clone()).or_insert_with(|| Holding {
            asset: lot.asset.clone(),
            amount: Decimal::zero(),
            cost_basis: Decimal::zero(),
            lot_count: 0,
        });
        let cost = lot.remaining_cost().ok_or(DecimalOverflow)?;
        holding.amount = holding
            .amount
            .checked_add(lot.remaining_amount)
            .ok_or(DecimalOverflow)?;
        holding.cost_basis = holding.cost_basis.checked_add(cost).ok_or(DecimalOverflow)?;
        holding.lot_count += 1;
    }
    Ok(by_asset.into_values().collect())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnrealizedPosition {
    pub asset: Asset,
    pub amount: Decimal,
    pub cost_basis: Decimal,
    pub average_cost: Decimal,
    pub current_price: Decimal,
    pub current_value: Decimal,
    pub unrealized_gain: Decimal,
    pub unrealized_gain_percent: Decimal,
    pub lot_count: usize,
}

impl UnrealizedPosition {
    /// Value a holding at `current_price`. Percent is 0 when cost basis is 0.
    pub fn value(holding: Holding, current_price: Decimal) -> Result<Self, DecimalOverflow> {
        let current_value = holding
            .amount
            .checked_mul(current_price)
            .ok_or(DecimalOverflow)?;
        let unrealized_gain = current_value
            .checked_sub(holding.cost_basis)
            .ok_or(DecimalOverflow)?;
        let unrealized_gain_percent = unrealized_gain
            .checked_div_or_zero(holding.cost_basis)
            .checked_mul(Decimal::hundred())
            .ok_or(DecimalOverflow)?;

        Ok(UnrealizedPosition {
            average_cost: holding.cost_basis.checked_div_or_zero(holding.amount),
            asset: holding.asset,
            amount: holding.amount,
            cost_basis: holding.cost_basis,
            current_price,
            current_value,
            unrealized_gain,
            unrealized_gain_percent,
            lot_count: holding.lot_count,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnrealizedPnl {
    pub total_unrealized_pnl: Decimal,
    pub total_cost_basis: Decimal,
    pub total_current_value: Decimal,
    pub positions: Vec<UnrealizedPosition>,
}

impl UnrealizedPnl {
    pub fn from_positions(positions: Vec<UnrealizedPosition>) -> Result<Self, DecimalOverflow> {
        Ok(UnrealizedPnl {
            total_unrealized_pnl: Decimal::try_sum(positions.iter().map(|p| p.unrealized_gain))?,
            total_cost_basis: Decimal::try_sum(positions.iter().map(|p| p.cost_basis))?,
            total_current_value: Decimal::try_sum(positions.iter().map(|p| p.current_value))?,
            positions,
        })
    }

    pub fn position(&self, asset: &Asset) -> Option<&UnrealizedPosition> {
        self.positions.iter().find(|p| &p.asset == asset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Exchange, LotSource, TimeMs, UserId};

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn lot(asset: &str, remaining: &str, cost: &str) -> CostBasisLot {
        CostBasisLot::open(
            UserId::new("u1"),
            Asset::new(asset),
            d(remaining),
            d(cost),
            TimeMs::new(1),
            "tx:1".to_string(),
            Exchange::new("kraken"),
            LotSource::Buy,
        )
    }

    #[test]
    fn groups_by_asset_and_skips_consumed() {
        let mut consumed = lot("ETH", "1", "3000");
        consumed.remaining_amount = Decimal::zero();
        let lots = vec![
            lot("eth", "2", "1500"),
            lot("BTC", "0.5", "20000"),
            consumed,
            lot("BTC", "0.5", "30000"),
        ];

        let holdings = group_open_lots(&lots).unwrap();
        assert_eq!(holdings.len(), 2);
        assert_eq!(holdings[0].asset, Asset::new("BTC"));
        assert_eq!(holdings[0].amount, d("1"));
        assert_eq!(holdings[0].cost_basis, d("25000"));
        assert_eq!(holdings[0].lot_count, 2);
        assert_eq!(holdings[1].asset, Asset::new("ETH"));
        assert_eq!(holdings[1].cost_basis, d("3000"));
        assert_eq!(holdings[1].lot_count, 1);
    }

    #[test]
    fn values_position_at_current_price() {
        let holding = Holding {
            asset: Asset::new("BTC"),
            amount: d("0.4"),
            cost_basis: d("8000"),
            lot_count: 1,
        };
        let p = UnrealizedPosition::value(holding, d("25000")).unwrap();
        assert_eq!(p.current_value, d("10000"));
        assert_eq!(p.unrealized_gain, d("2000"));
        assert_eq!(p.unrealized_gain_percent, d("25"));
        assert_eq!(p.average_cost, d("20000"));
    }

    #[test]
    fn zero_cost_basis_gives_zero_percent() {
        let holding = Holding {
            asset: Asset::new("DOT"),
            amount: d("10"),
            cost_basis: Decimal::zero(),
            lot_count: 1,
        };
        let p = UnrealizedPosition::value(holding, d("5")).unwrap();
        assert_eq!(p.unrealized_gain, d("50"));
        assert_eq!(p.unrealized_gain_percent, Decimal::zero());
    }

    #[test]
    fn totals_sum_positions() {
        let a = UnrealizedPosition::value(
            Holding {
                asset: Asset::new("BTC"),
                amount: d("1"),
                cost_basis: d("100"),
                lot_count: 1,
            },
            d("150"),
        )
        .unwrap();
        let b = UnrealizedPosition::value(
            Holding {
                asset: Asset::new("ETH"),
                amount: d("2"),
                cost_basis: d("100"),
                lot_count: 1,
            },
            d("40"),
        )
        .unwrap();
        let pnl = UnrealizedPnl::from_positions(vec![a, b]).unwrap();
        assert_eq!(pnl.total_cost_basis, d("200"));
        assert_eq!(pnl.total_current_value, d("230"));
        assert_eq!(pnl.total_unrealized_pnl, d("30"));
        assert!(pnl.position(&Asset::new("ETH")).is_some());
    }

    #[test]
    fn oversized_lots_report_overflow_instead_of_panicking() {
        let lots = vec![lot("BTC", "10000000000000000000000000000", "10")];
        assert_eq!(group_open_lots(&lots), Err(DecimalOverflow));

        let lots = vec![
            lot("BTC", "40000000000000000000000000000", "1"),
            lot("BTC", "40000000000000000000000000000", "1"),
        ];
        assert_eq!(group_open_lots(&lots), Err(DecimalOverflow));
    }

    #[test]
    fn oversized_valuation_reports_overflow() {
        let holding = Holding {
            asset: Asset::new("BTC"),
            amount: d("10000000000000000"),
            cost_basis: d("1"),
            lot_count: 1,
        };
        assert_eq!(
            UnrealizedPosition::value(holding.clone(), d("100000000000000")),
            Err(DecimalOverflow)
        );
        assert!(UnrealizedPosition::value(holding, d("2")).is_ok());
    }
}
