//! Expiry calculation and revenue allocation
//!
//! Pure functions: they compute the next state of a membership and the
//! allocation rows for a purchase, and leave persistence to the caller.

use serde::Serialize;

use crate::clock::{add_days, add_months, YearMonth};
use crate::error::{MembershipError, MembershipResult};
use crate::model::{Allocation, MembershipRecord};

/// Result of extending or setting a membership
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Extension {
    pub new_expiry_at: i64,
    /// Always false: a new expiry starts a new warning cycle
    pub warned: bool,
    /// Whether the extension stacked on a still-active expiry
    pub extended_from_existing: bool,
}

impl Extension {
    pub fn into_record(self, user_id: impl Into<String>) -> MembershipRecord {
        MembershipRecord {
            user_id: user_id.into(),
            expiry_at: self.new_expiry_at,
            warned: self.warned,
        }
    }
}

/// Largest number of months a single purchase may cover
pub const MAX_PURCHASE_MONTHS: u32 = 120;

fn positive(value: i64, what: &str) -> MembershipResult<u32> {
    if value <= 0 {
        return Err(MembershipError::InvalidArgument(format!(
            "{} must be a positive integer, got {}",
            what, value
        )));
    }
    u32::try_from(value)
        .map_err(|_| MembershipError::InvalidArgument(format!("{} is too large: {}", what, value)))
}

fn purchase_months(value: i64) -> MembershipResult<u32> {
    let months = positive(value, "months")?;
    if months > MAX_PURCHASE_MONTHS {
        return Err(MembershipError::InvalidArgument(format!(
            "months must be at most {}, got {}",
            MAX_PURCHASE_MONTHS, months
        )));
    }
    Ok(months)
}

/// Extend a membership by `months` calendar months.
///
/// An active membership (expiry strictly after `now`) is extended from its
/// current expiry; a missing or lapsed one starts from `now`.
pub fn extend_by_months(
    current: Option<&MembershipRecord>,
    months: i64,
    now: i64,
) -> MembershipResult<Extension> {
    let months = purchase_months(months)?;

    let (base, extended_from_existing) = match current {
        Some(record) if record.is_active(now) => (record.expiry_at, true),
        _ => (now, false),
    };

    Ok(Extension {
        new_expiry_at: add_months(base, months)?,
        warned: false,
        extended_from_existing,
    })
}

/// Expiry exactly `days` days from `now`, replacing whatever was there
pub fn set_exact_days(now: i64, days: i64) -> MembershipResult<Extension> {
    let days = positive(days, "days")?;
    Ok(Extension {
        new_expiry_at: add_days(now, days)?,
        warned: false,
        extended_from_existing: false,
    })
}

/// Split a purchase of `months` months into one allocation per calendar month,
/// starting with the month containing `base`.
pub fn allocate_revenue(
    base: i64,
    months: i64,
    price_per_month: i64,
) -> MembershipResult<Vec<Allocation>> {
    let months = purchase_months(months)?;
    let first = YearMonth::from_epoch_ms(base)?;

    Ok((0..months)
        .map(|i| {
            let ym = first.advance(i);
            Allocation {
                year: ym.year,
                month: ym.month,
                amount: price_per_month,
            }
        })
        .collect())
}
