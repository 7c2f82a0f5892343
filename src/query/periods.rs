//! Calendar buckets for realized P&L: today, this week, this month, this year.

use crate::config::WeekStart;
use crate::domain::{Decimal, DecimalOverflow, RealizedGainRecord, TimeMs};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::Serialize;

/// Start of each bucket, as UTC midnights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodBoundaries {
    pub today: TimeMs,
    pub week: TimeMs,
    pub month: TimeMs,
    pub year: TimeMs,
}

impl PeriodBoundaries {
    pub fn at(now: TimeMs, week_start: WeekStart) -> Self {
        let date = DateTime::<Utc>::from_timestamp_millis(now.as_ms())
            .unwrap_or_default()
            .date_naive();

        let days_into_week = match week_start {
            WeekStart::Sunday => date.weekday().num_days_from_sunday(),
            WeekStart::Monday => date.weekday().num_days_from_monday(),
        };
        let week = date - Duration::days(i64::from(days_into_week));
        let month = NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date);
        let year = NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date);

        Self {
            today: midnight(date),
            week: midnight(week),
            month: midnight(month),
            year: midnight(year),
        }
    }
}

fn midnight(date: NaiveDate) -> TimeMs {
    TimeMs::new(date.and_time(chrono::NaiveTime::MIN).and_utc().timestamp_millis())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodPnl {
    pub realized_pnl: Decimal,
    pub count: usize,
}

impl PeriodPnl {
    fn add(&mut self, gain: Decimal) -> Result<(), DecimalOverflow> {
        self.realized_pnl = self.realized_pnl.checked_add(gain).ok_or(DecimalOverflow)?;
        self.count += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodBreakdown {
    pub today: PeriodPnl,
    pub this_week: PeriodPnl,
    pub this_month: PeriodPnl,
    pub this_year: PeriodPnl,
    pub all_time: PeriodPnl,
}

impl PeriodBreakdown {
    /// Bucket each record by `realized_at >= boundary`.
    pub fn from_records(
        records: &[RealizedGainRecord],
        bounds: &PeriodBoundaries,
    ) -> Result<Self, DecimalOverflow> {
        let mut out = PeriodBreakdown::default();
        for record in records {
            let gain = record.realized_gain;
            let at = record.realized_at;
            if at >= bounds.today {
                out.today.add(gain)?;
            }
            if at >= bounds.week {
                out.this_week.add(gain)?;
            }
            if at >= bounds.month {
                out.this_month.add(gain)?;
            }
            if at >= bounds.year {
                out.this_year.add(gain)?;
            }
            out.all_time.add(gain)?;
        }
        Ok(out)
    }
}
