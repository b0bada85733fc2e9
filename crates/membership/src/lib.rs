// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! PrimeBot Membership Engine
//!
//! Tracks time-limited Prime memberships and the revenue they bring in.
//!
//! ## Features
//!
//! - **Expiry Calculation**: Stack purchased months on an active membership, or start from now
//! - **Revenue Allocation**: One allocation row per purchased calendar month
//! - **Daily Sweep**: Warn members close to expiry once, expire lapsed members
//! - **Revenue Reports**: Monthly totals for the upcoming window, a month, or a range
//! - **Backup Reconciliation**: Restore an empty store from the remote backup, push after mutations
//! - **Invariants**: Read-only consistency checks over the stored state
//!
//! Discord, the database and the backup webhook are reached only through the
//! traits in [`ports`].

pub mod backup;
pub mod clock;
pub mod command;
pub mod context;
pub mod error;
pub mod expiry;
pub mod invariants;
pub mod messages;
pub mod model;
pub mod ports;
pub mod revenue;
pub mod store;
pub mod sweep;

#[cfg(test)]
mod testing;

// Backup
pub use backup::{push, push_after_mutation, reconcile_on_startup, RestoreReport};

// Clock
pub use clock::{Clock, FixedClock, SystemClock, YearMonth, DAY_MS, WARN_WINDOW_MS};

// Command
pub use command::{handle_command, Command, CommandAction, CommandOutcome, CommandRequest};

// Context
pub use context::{EngineSettings, MembershipContext, DEFAULT_MONTHLY_PRICE};

// Error
pub use error::{MembershipError, MembershipResult};

// Expiry
pub use expiry::{
    allocate_revenue, extend_by_months, set_exact_days, Extension, MAX_PURCHASE_MONTHS,
};

// Invariants
pub use invariants::{
    InvariantCheckSummary, InvariantChecker, InvariantViolation, ViolationSeverity,
};

// Model
pub use model::{
    Allocation, AllocationRecord, BackupMember, BackupSnapshot, MembershipRecord,
};

// Ports
pub use ports::{BackupPort, MembershipStore, NotificationPort, RolePort};

// Revenue
pub use revenue::{aggregate, MonthlyTotal, RevenueFilter};

// Store
pub use store::{InMemoryStore, PgMembershipStore};

// Sweep
pub use sweep::{plan_sweep, run_daily_sweep, Classification, SweepAction, SweepReport};
