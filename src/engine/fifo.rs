//! Pure FIFO lot matching.
//!
//! Operates on an ordered in-memory slice of one (user, asset)'s open lots.
//! The caller loads the slice, runs the match, and persists the touched lots
//! together with the resulting record.

use crate::domain::{
    sort_lots_fifo, CostBasisLot, Decimal, DecimalOverflow, HoldingPeriod, LotConsumption,
    TimeMs,
};

/// Outcome of matching one disposal against open lots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FifoMatch {
    /// Quantity the disposal asked for.
    pub requested: Decimal,
    /// Quantity actually matched; below `requested` when lots ran out.
    pub amount_sold: Decimal,
    pub cost_basis: Decimal,
    /// Consumed lots, oldest first.
    pub breakdown: Vec<LotConsumption>,
    /// Indices into the lot slice whose remaining amount changed.
    pub touched: Vec<usize>,
}

impl FifoMatch {
    /// Quantity that could not be matched.
    pub fn shortfall(&self) -> Decimal {
        self.requested - self.amount_sold
    }

    /// Holding period from the oldest consumed lot. Short-term when nothing matched.
    pub fn holding_period(&self, realized_at: TimeMs) -> HoldingPeriod {
        self.breakdown
            .first()
            .map(|oldest| HoldingPeriod::between(oldest.lot_acquired_at, realized_at))
            .unwrap_or(HoldingPeriod::ShortTerm)
    }
}

/// Consume `quantity` from `lots`, oldest first.
///
/// The slice is stably re-sorted by acquisition time before matching, so equal
/// timestamps keep the order they were loaded in.
///
/// # Errors
/// `DecimalOverflow` if the accumulated cost basis leaves the decimal range.
/// Lots may already be partly consumed when this happens; discard the slice.
pub fn consume_fifo(
    lots: &mut [CostBasisLot],
    quantity: Decimal,
) -> Result<FifoMatch, DecimalOverflow> {
    sort_lots_fifo(lots);

    let mut still_to_sell = quantity.abs();
    let mut result = FifoMatch {
        requested: still_to_sell,
        amount_sold: Decimal::zero(),
        cost_basis: Decimal::zero(),
        breakdown: Vec::new(),
        touched: Vec::new(),
    };

    for (idx, lot) in lots.iter_mut().enumerate() {
        if !still_to_sell.is_positive() {
            break;
        }
        if !lot.is_open() {
            continue;
        }

        let taken = lot.consume(still_to_sell);
        still_to_sell -= taken;

        let cost = taken.checked_mul(lot.cost_per_unit).ok_or(DecimalOverflow)?;
        result.amount_sold += taken;
        result.cost_basis = result.cost_basis.checked_add(cost).ok_or(DecimalOverflow)?;
        result.breakdown.push(LotConsumption {
            lot_id: lot.id.clone(),
            amount_consumed: taken,
            cost_per_unit: lot.cost_per_unit,
            lot_acquired_at: lot.acquired_at,
        });
        result.touched.push(idx);
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Asset, Exchange, LotSource, UserId, DAY_MS};

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn lot(id: &str, amount: &str, cost: &str, acquired_at: i64) -> CostBasisLot {
        let mut lot = CostBasisLot::open(
            UserId::new("u1"),
            Asset::new("BTC"),
            d(amount),
            d(cost),
            TimeMs::new(acquired_at),
            format!("tx:{}", id),
            Exchange::new("binance"),
            LotSource::Buy,
        );
        lot.id = id.to_string();
        lot
    }

    #[test]
    fn spans_lots_oldest_first() {
        let mut lots = vec![lot("a", "1.0", "20000", 1), lot("b", "0.5", "30000", 2)];
        let m = consume_fifo(&mut lots, d("1.2")).unwrap();

        assert_eq!(m.amount_sold, d("1.2"));
        assert_eq!(m.cost_basis, d("26000"));
        assert_eq!(m.breakdown.len(), 2);
        assert_eq!(m.breakdown[0].lot_id, "a");
        assert_eq!(m.breakdown[0].amount_consumed, d("1.0"));
        assert_eq!(m.breakdown[1].lot_id, "b");
        assert_eq!(m.breakdown[1].amount_consumed, d("0.2"));
        assert_eq!(lots[0].remaining_amount, Decimal::zero());
        assert_eq!(lots[1].remaining_amount, d("0.3"));
        assert_eq!(m.touched, vec![0, 1]);
    }

    #[test]
    fn small_disposal_touches_only_oldest_lot() {
        let mut lots = vec![lot("b", "1", "200", 2_000), lot("a", "1", "100", 1_000)];
        let m = consume_fifo(&mut lots, d("0.4")).unwrap();

        assert_eq!(m.breakdown.len(), 1);
        assert_eq!(m.breakdown[0].lot_id, "a");
        assert_eq!(m.cost_basis, d("40"));
        // re-sorted in place: "a" first
        assert_eq!(lots[0].id, "a");
        assert_eq!(lots[0].remaining_amount, d("0.6"));
        assert_eq!(lots[1].remaining_amount, d("1"));
    }

    #[test]
    fn equal_timestamps_keep_loaded_order() {
        let mut lots = vec![lot("first", "1", "10", 5), lot("second", "1", "20", 5)];
        let m = consume_fifo(&mut lots, d("1.5")).unwrap();
        assert_eq!(m.breakdown[0].lot_id, "first");
        assert_eq!(m.breakdown[1].lot_id, "second");
        assert_eq!(m.cost_basis, d("20"));
    }

    #[test]
    fn shortfall_is_left_unmatched() {
        let mut lots = vec![lot("a", "0.5", "100", 1)];
        let m = consume_fifo(&mut lots, d("2")).unwrap();
        assert_eq!(m.amount_sold, d("0.5"));
        assert_eq!(m.shortfall(), d("1.5"));
        assert_eq!(lots[0].remaining_amount, Decimal::zero());
    }

    #[test]
    fn no_lots_matches_nothing() {
        let mut lots: Vec<CostBasisLot> = Vec::new();
        let m = consume_fifo(&mut lots, d("1")).unwrap();
        assert_eq!(m.amount_sold, Decimal::zero());
        assert_eq!(m.cost_basis, Decimal::zero());
        assert!(m.breakdown.is_empty());
        assert_eq!(m.holding_period(TimeMs::new(0)), HoldingPeriod::ShortTerm);
    }

    #[test]
    fn consumed_lots_are_skipped() {
        let mut lots = vec![lot("a", "1", "100", 1), lot("b", "1", "300", 2)];
        lots[0].remaining_amount = Decimal::zero();
        let m = consume_fifo(&mut lots, d("0.5")).unwrap();
        assert_eq!(m.breakdown.len(), 1);
        assert_eq!(m.breakdown[0].lot_id, "b");
        assert_eq!(m.touched, vec![1]);
    }

    #[test]
    fn conservation_and_monotonicity_over_sequence() {
        let mut lots = vec![
            lot("a", "0.3", "100", 1),
            lot("b", "0.7", "110", 2),
            lot("c", "2.0", "120", 3),
        ];
        let mut previous: Vec<Decimal> = lots.iter().map(|l| l.remaining_amount).collect();

        for qty in ["0.1", "0.25", "0.5", "1.0", "3.0"] {
            let m = consume_fifo(&mut lots, d(qty)).unwrap();
            let consumed: Decimal = m.breakdown.iter().map(|c| c.amount_consumed).sum();
            let cost: Decimal = m.breakdown.iter().map(|c| c.cost().unwrap()).sum();
            assert_eq!(consumed, m.amount_sold);
            assert!(m.amount_sold <= d(qty));
            assert_eq!(cost, m.cost_basis);

            for (lot, before) in lots.iter().zip(previous.iter()) {
                assert!(lot.remaining_amount <= *before);
                assert!(!lot.remaining_amount.is_negative());
            }
            previous = lots.iter().map(|l| l.remaining_amount).collect();
        }
        assert!(lots.iter().all(|l| !l.is_open()));
    }

    #[test]
    fn cost_overflow_is_an_error() {
        let mut lots = vec![lot("a", "50000000000000000000000000", "10000", 1)];
        assert_eq!(consume_fifo(&mut lots, d("1")).unwrap().cost_basis, d("10000"));
        assert_eq!(
            consume_fifo(&mut lots, d("40000000000000000000000000")),
            Err(DecimalOverflow)
        );
    }

    #[test]
    fn holding_period_uses_oldest_consumed_lot() {
        let t0 = 1_000_000;
        let mut lots = vec![
            lot("old", "1", "10", t0),
            lot("new", "1", "10", t0 + 200 * DAY_MS),
        ];
        let m = consume_fifo(&mut lots, d("1.5")).unwrap();
        let realized_at = TimeMs::new(t0 + 365 * DAY_MS);
        assert_eq!(m.holding_period(realized_at), HoldingPeriod::LongTerm);
    }
}
