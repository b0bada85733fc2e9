//! Monthly revenue totals over allocation rows

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::clock::YearMonth;
use crate::error::MembershipResult;
use crate::model::AllocationRecord;

/// Months covered by the default report: the current month plus this many
pub const DEFAULT_WINDOW_EXTRA_MONTHS: u32 = 2;

/// Which months a revenue report covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RevenueFilter {
    /// Current calendar month and the next two, zero-filled
    #[default]
    Upcoming,
    /// A single calendar month
    Month { month: YearMonth },
    /// Inclusive range of calendar months
    Range { from: YearMonth, to: YearMonth },
}

impl RevenueFilter {
    /// Inclusive month bounds of this filter relative to `now`
    pub fn bounds(&self, now: i64) -> MembershipResult<(YearMonth, YearMonth)> {
        Ok(match *self {
            RevenueFilter::Upcoming => {
                let current = YearMonth::from_epoch_ms(now)?;
                (current, current.advance(DEFAULT_WINDOW_EXTRA_MONTHS))
            }
            RevenueFilter::Month { month } => (month, month),
            RevenueFilter::Range { from, to } => (from, to),
        })
    }

    pub fn is_zero_filled(&self) -> bool {
        matches!(self, RevenueFilter::Upcoming)
    }
}

/// Revenue recognized in one calendar month
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyTotal {
    pub year: i32,
    pub month: u8,
    pub total: i64,
}

/// Sum allocation amounts per calendar month, in chronological order.
///
/// The default window always reports all three months, with explicit zeros.
/// Single-month and range filters only report months that have rows, so an
/// empty result means "no revenue data" rather than "zero revenue".
pub fn aggregate(
    allocations: &[AllocationRecord],
    filter: &RevenueFilter,
    now: i64,
) -> MembershipResult<Vec<MonthlyTotal>> {
    let (from, to) = filter.bounds(now)?;

    let mut totals: BTreeMap<YearMonth, i64> = BTreeMap::new();

    if filter.is_zero_filled() {
        let mut month = from;
        while month <= to {
            totals.insert(month, 0);
            month = month.next();
        }
    }

    for allocation in allocations {
        let ym = allocation.year_month();
        if ym < from || ym > to {
            continue;
        }
        *totals.entry(ym).or_insert(0) += allocation.amount;
    }

    Ok(totals
        .into_iter()
        .map(|(ym, total)| MonthlyTotal {
            year: ym.year,
            month: ym.month,
            total,
        })
        .collect())
}
