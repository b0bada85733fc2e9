//! Daily membership sweep
//!
//! `plan_sweep` is the pure decision: it classifies every record against
//! `now`. `run_daily_sweep` applies the plan through the context's ports.
//!
//! The sweep is idempotent for a fixed `now`: expired records are deleted,
//! and warned records carry `warned = true`, so a second pass finds nothing
//! to do.

use serde::Serialize;

use crate::backup::push_after_mutation;
use crate::context::MembershipContext;
use crate::error::{MembershipError, MembershipResult};
use crate::messages;
use crate::model::MembershipRecord;

/// Where a record stands relative to `now`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Active,
    WarnDue,
    ExpireDue,
}

pub fn classify(record: &MembershipRecord, now: i64, warn_window_ms: i64) -> Classification {
    if record.expiry_at <= now {
        Classification::ExpireDue
    } else if record.expiry_at - now <= warn_window_ms && !record.warned {
        Classification::WarnDue
    } else {
        Classification::Active
    }
}

/// A state transition the sweep requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SweepAction {
    Expire { user_id: String },
    Warn { user_id: String, expiry_at: i64 },
}

impl SweepAction {
    pub fn user_id(&self) -> &str {
        match self {
            SweepAction::Expire { user_id } | SweepAction::Warn { user_id, .. } => user_id,
        }
    }
}

/// Decide the actions due for `records` at `now`
pub fn plan_sweep(records: &[MembershipRecord], now: i64, warn_window_ms: i64) -> Vec<SweepAction> {
    records
        .iter()
        .filter_map(|record| match classify(record, now, warn_window_ms) {
            Classification::ExpireDue => Some(SweepAction::Expire {
                user_id: record.user_id.clone(),
            }),
            Classification::WarnDue => Some(SweepAction::Warn {
                user_id: record.user_id.clone(),
                expiry_at: record.expiry_at,
            }),
            Classification::Active => None,
        })
        .collect()
}

/// Counters for one sweep tick
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub checked: usize,
    pub expired: usize,
    pub warned: usize,
    /// Role or message deliveries that failed; state changes were kept
    pub delivery_failures: usize,
    /// Records whose state change could not be written
    pub store_failures: usize,
    pub backup_pushed: bool,
    pub actions: Vec<SweepAction>,
}

/// Run one sweep over the full membership set as read at tick start.
///
/// Only failing to read the set aborts the sweep. Every other failure is
/// isolated to its member and logged.
pub async fn run_daily_sweep(ctx: &MembershipContext, now: i64) -> MembershipResult<SweepReport> {
    let records = ctx.store.list_all().await?;
    let actions = plan_sweep(&records, now, ctx.settings.warn_window_ms);

    let mut report = SweepReport {
        checked: records.len(),
        ..SweepReport::default()
    };

    for action in &actions {
        match action {
            SweepAction::Expire { user_id } => expire_member(ctx, user_id, now, &mut report).await,
            SweepAction::Warn { user_id, expiry_at } => {
                warn_member(ctx, user_id, *expiry_at, &mut report).await
            }
        }
    }

    report.backup_pushed = push_after_mutation(ctx).await.is_none();
    report.actions = actions;

    tracing::info!(
        checked = report.checked,
        expired = report.expired,
        warned = report.warned,
        delivery_failures = report.delivery_failures,
        store_failures = report.store_failures,
        backup_pushed = report.backup_pushed,
        "Membership sweep complete"
    );

    Ok(report)
}

async fn expire_member(ctx: &MembershipContext, user_id: &str, now: i64, report: &mut SweepReport) {
    // Delete first and only if still lapsed: a renewal since tick start wins
    match ctx.store.delete_expired(user_id, now).await {
        Ok(true) => {
            tracing::info!(user_id = %user_id, "Membership expired");
            report.expired += 1;
        }
        Ok(false) => {
            tracing::debug!(user_id = %user_id, "Membership renewed or removed during sweep, not expiring");
            return;
        }
        Err(e) => {
            tracing::error!(user_id = %user_id, error = %e, "Failed to delete expired membership");
            report.store_failures += 1;
            return;
        }
    }

    if let Err(e) = ctx.roles.revoke(user_id).await {
        tracing::warn!(user_id = %user_id, error = %e, "Failed to revoke Prime role");
        report.delivery_failures += 1;
    }

    if let Err(e) = ctx.notifier.send(user_id, &messages::expired_notice()).await {
        tracing::warn!(user_id = %user_id, error = %e, "Failed to send expiry notice");
        report.delivery_failures += 1;
    }
}

async fn warn_member(ctx: &MembershipContext, user_id: &str, expiry_at: i64, report: &mut SweepReport) {
    // Flag first: a lost message is preferable to a repeated one
    let flagged = ctx
        .store
        .upsert_with(user_id, &|current| match current {
            // A purchase since tick start moved the expiry; leave it alone
            Some(record) if record.expiry_at != expiry_at => Ok(record.clone()),
            Some(record) => Ok(MembershipRecord {
                warned: true,
                ..record.clone()
            }),
            None => Err(MembershipError::NotFound(user_id.to_string())),
        })
        .await;

    match flagged {
        Ok(record) if record.warned && record.expiry_at == expiry_at => {}
        Ok(_) => {
            tracing::debug!(user_id = %user_id, "Membership renewed during sweep, skipping warning");
            return;
        }
        Err(MembershipError::NotFound(_)) => {
            tracing::debug!(user_id = %user_id, "Membership removed during sweep, skipping warning");
            return;
        }
        Err(e) => {
            tracing::error!(user_id = %user_id, error = %e, "Failed to mark membership as warned");
            report.store_failures += 1;
            return;
        }
    }

    report.warned += 1;

    if let Err(e) = ctx
        .notifier
        .send(user_id, &messages::expiry_warning(expiry_at))
        .await
    {
        tracing::warn!(user_id = %user_id, error = %e, "Failed to send expiry warning");
        report.delivery_failures += 1;
    }
}
