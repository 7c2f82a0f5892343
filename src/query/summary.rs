//! Realized + unrealized summary with per-asset and per-period breakdowns.

use crate::domain::{Asset, Decimal, DecimalOverflow, RealizedGainRecord};
use serde::Serialize;
use std::collections::BTreeMap;

use super::periods::{PeriodBoundaries, PeriodBreakdown};
use super::unrealized::UnrealizedPnl;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetPnl {
    pub asset: Asset,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub total_pnl: Decimal,
    pub amount_held: Decimal,
    pub cost_basis: Decimal,
    pub current_value: Decimal,
    pub disposal_count: usize,
}

impl AssetPnl {
    fn empty(asset: Asset) -> Self {
        AssetPnl {
            asset,
            realized_pnl: Decimal::zero(),
            unrealized_pnl: Decimal::zero(),
            total_pnl: Decimal::zero(),
            amount_held: Decimal::zero(),
            cost_basis: Decimal::zero(),
            current_value: Decimal::zero(),
            disposal_count: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PnlSummary {
    pub total_realized_pnl: Decimal,
    pub total_unrealized_pnl: Decimal,
    pub total_pnl: Decimal,
    pub by_asset: Vec<AssetPnl>,
    pub period_breakdown: PeriodBreakdown,
}

/// Merge realized history with current unrealized positions.
///
/// An asset appears in `by_asset` if it has any realized record or an open
/// position. Rows are sorted by symbol.
pub fn build_summary(
    records: &[RealizedGainRecord],
    unrealized: &UnrealizedPnl,
    bounds: &PeriodBoundaries,
) -> Result<PnlSummary, DecimalOverflow> {
    let mut by_asset: BTreeMap<Asset, AssetPnl> = BTreeMap::new();

    for record in records {
        let row = by_asset
            .entry(record.asset.clone())
            .or_insert_with(|| AssetPnl::empty(record.asset.clone()));
        row.realized_pnl = row
            .realized_pnl
            .checked_add(record.realized_gain)
            .ok_or(DecimalOverflow)?;
        row.disposal_count += 1;
    }
    for position in &unrealized.positions {
        let row = by_asset
            .entry(position.asset.clone())
            .or_insert_with(|| AssetPnl::empty(position.asset.clone()));
        row.unrealized_pnl = position.unrealized_gain;
        row.amount_held = position.amount;
        row.cost_basis = position.cost_basis;
        row.current_value = position.current_value;
    }
    for row in by_asset.values_mut() {
        row.total_pnl = row
            .realized_pnl
            .checked_add(row.unrealized_pnl)
            .ok_or(DecimalOverflow)?;
    }

    let total_realized_pnl = Decimal::try_sum(records.iter().map(|r| r.realized_gain))?;
    let total_unrealized_pnl = unrealized.total_unrealized_pnl;

    Ok(PnlSummary {
        total_realized_pnl,
        total_unrealized_pnl,
        total_pnl: total_realized_pnl
            .checked_add(total_unrealized_pnl)
            .ok_or(DecimalOverflow)?,
        by_asset: by_asset.into_values().collect(),
        period_breakdown: PeriodBreakdown::from_records(records, bounds)?,
    })
}
