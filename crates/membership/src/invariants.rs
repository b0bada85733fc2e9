//! Membership Invariants Module
//!
//! Runnable consistency checks over the membership and allocation tables.
//! They can be run at any time, e.g. after a restore or a missed sweep.
//!
//! ## Design Principles
//!
//! 1. **Executable**: Each invariant is a real query against the store
//! 2. **Explanatory**: Violations include enough context to debug
//! 3. **Non-destructive**: Checks only read, never write

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::clock::YearMonth;
use crate::error::MembershipResult;
use crate::ports::MembershipStore;
use crate::revenue::RevenueFilter;

/// Result of running a single invariant check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantViolation {
    /// Which invariant was violated
    pub invariant: String,
    /// Members affected (empty for allocation checks)
    pub user_ids: Vec<String>,
    /// Human-readable description of the violation
    pub description: String,
    /// Additional context for debugging
    pub context: serde_json::Value,
    pub severity: ViolationSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationSeverity {
    /// Revenue reports are wrong
    Critical,
    /// A member will miss or repeat a notification
    High,
    /// Sweep is behind
    Medium,
    Low,
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationSeverity::Critical => write!(f, "CRITICAL"),
            ViolationSeverity::High => write!(f, "HIGH"),
            ViolationSeverity::Medium => write!(f, "MEDIUM"),
            ViolationSeverity::Low => write!(f, "LOW"),
        }
    }
}

/// Summary of all invariant checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantCheckSummary {
    /// Epoch milliseconds the checks ran at
    pub checked_at: i64,
    pub checks_run: usize,
    pub checks_passed: usize,
    pub checks_failed: usize,
    pub violations: Vec<InvariantViolation>,
    pub healthy: bool,
}

// Allocation rows are read through a range wide enough to cover any real purchase
const ALL_TIME: RevenueFilter = RevenueFilter::Range {
    from: YearMonth { year: i32::MIN / 12, month: 1 },
    to: YearMonth { year: i32::MAX / 12, month: 12 },
};

pub struct InvariantChecker<'a> {
    store: &'a dyn MembershipStore,
    warn_window_ms: i64,
}

impl<'a> InvariantChecker<'a> {
    pub fn new(store: &'a dyn MembershipStore, warn_window_ms: i64) -> Self {
        Self {
            store,
            warn_window_ms,
        }
    }

    /// Run all invariant checks and return summary
    pub async fn run_all_checks(&self, now: i64) -> MembershipResult<InvariantCheckSummary> {
        let mut violations = Vec::new();

        violations.extend(self.check_warned_within_window(now).await?);
        violations.extend(self.check_no_lapsed_members(now).await?);
        violations.extend(self.check_allocation_month_in_range(now).await?);
        violations.extend(self.check_allocation_amount_positive(now).await?);

        let checks_run = Self::available_checks().len();
        let checks_failed = violations
            .iter()
            .map(|v| &v.invariant)
            .collect::<HashSet<_>>()
            .len();

        Ok(InvariantCheckSummary {
            checked_at: now,
            checks_run,
            checks_passed: checks_run - checks_failed,
            checks_failed,
            healthy: violations.is_empty(),
            violations,
        })
    }

    /// Invariant 1: `warned` is only set inside the warn window
    ///
    /// Extending a membership must clear the flag. A warned member whose
    /// expiry is beyond the window was extended without the reset and will
    /// never be warned about the new expiry.
    async fn check_warned_within_window(&self, now: i64) -> MembershipResult<Vec<InvariantViolation>> {
        let offenders: Vec<_> = self
            .store
            .list_all()
            .await?
            .into_iter()
            .filter(|r| r.warned && r.expiry_at - now > self.warn_window_ms)
            .collect();

        Ok(offenders
            .into_iter()
            .map(|r| InvariantViolation {
                invariant: "warned_within_window".to_string(),
                description: format!(
                    "Member {} is marked warned but expires {} ms from now",
                    r.user_id,
                    r.expiry_at - now
                ),
                context: serde_json::json!({
                    "expiry_at": r.expiry_at,
                    "warn_window_ms": self.warn_window_ms,
                }),
                user_ids: vec![r.user_id],
                severity: ViolationSeverity::High,
            })
            .collect())
    }

    /// Invariant 2: no record outlives its expiry
    ///
    /// The sweep deletes lapsed members. Leftovers mean a sweep tick was
    /// missed or failed to write.
    async fn check_no_lapsed_members(&self, now: i64) -> MembershipResult<Vec<InvariantViolation>> {
        let lapsed: Vec<String> = self
            .store
            .list_all()
            .await?
            .into_iter()
            .filter(|r| r.expiry_at <= now)
            .map(|r| r.user_id)
            .collect();

        if lapsed.is_empty() {
            return Ok(vec![]);
        }

        Ok(vec![InvariantViolation {
            invariant: "no_lapsed_members".to_string(),
            description: format!("{} expired member(s) still stored", lapsed.len()),
            context: serde_json::json!({ "count": lapsed.len() }),
            user_ids: lapsed,
            severity: ViolationSeverity::Medium,
        }])
    }

    /// Invariant 3: allocation months are 1-12
    async fn check_allocation_month_in_range(&self, now: i64) -> MembershipResult<Vec<InvariantViolation>> {
        let rows = self.store.query_allocations(&ALL_TIME, now).await?;

        Ok(rows
            .into_iter()
            .filter(|a| !(1..=12).contains(&a.month))
            .map(|a| InvariantViolation {
                invariant: "allocation_month_in_range".to_string(),
                user_ids: vec![],
                description: format!("Allocation {} has month {}", a.id, a.month),
                context: serde_json::json!({ "id": a.id, "year": a.year, "month": a.month }),
                severity: ViolationSeverity::Critical,
            })
            .collect())
    }

    /// Invariant 4: allocation amounts are positive
    async fn check_allocation_amount_positive(&self, now: i64) -> MembershipResult<Vec<InvariantViolation>> {
        let rows = self.store.query_allocations(&ALL_TIME, now).await?;

        Ok(rows
            .into_iter()
            .filter(|a| a.amount <= 0)
            .map(|a| InvariantViolation {
                invariant: "allocation_amount_positive".to_string(),
                user_ids: vec![],
                description: format!("Allocation {} has amount {}", a.id, a.amount),
                context: serde_json::json!({ "id": a.id, "amount": a.amount }),
                severity: ViolationSeverity::Medium,
            })
            .collect())
    }

    /// Run a single invariant check by name
    pub async fn run_check(&self, name: &str, now: i64) -> MembershipResult<Vec<InvariantViolation>> {
        match name {
            "warned_within_window" => self.check_warned_within_window(now).await,
            "no_lapsed_members" => self.check_no_lapsed_members(now).await,
            "allocation_month_in_range" => self.check_allocation_month_in_range(now).await,
            "allocation_amount_positive" => self.check_allocation_amount_positive(now).await,
            _ => Ok(vec![]),
        }
    }

    pub fn available_checks() -> Vec<&'static str> {
        vec![
            "warned_within_window",
            "no_lapsed_members",
            "allocation_month_in_range",
            "allocation_amount_positive",
        ]
    }
}
