//! Backup reconciliation against the remote membership copy
//!
//! Two operations only:
//! - on cold start, an empty local store is repopulated from the backup
//! - after every mutation, the full local set is pushed to the backup
//!
//! A non-empty store is never merged with the backup. Divergence between the
//! two is resolved by the next push overwriting the remote copy.

use serde::Serialize;

use crate::context::MembershipContext;
use crate::error::MembershipResult;
use crate::model::{BackupSnapshot, MembershipRecord};
use crate::ports::{BackupPort, MembershipStore, RolePort};

/// What `reconcile_on_startup` did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RestoreReport {
    /// Local store already had members; backup not consulted
    StoreNotEmpty { members: usize },
    /// Pull failed; store left empty
    BackupUnavailable { error: String },
    Restored {
        restored: usize,
        store_failures: usize,
        role_failures: usize,
    },
}

/// Repopulate an empty store from the backup.
///
/// Every restored member starts with `warned = false`. When `roles` is given,
/// the Prime role is granted again to each restored member. Failures are
/// isolated per member.
pub async fn reconcile_on_startup(
    store: &dyn MembershipStore,
    backup: &dyn BackupPort,
    roles: Option<&dyn RolePort>,
) -> MembershipResult<RestoreReport> {
    let members = store.count().await?;
    if members > 0 {
        tracing::info!(members = members, "Local store populated, skipping backup restore");
        return Ok(RestoreReport::StoreNotEmpty { members });
    }

    tracing::info!("Local store empty, restoring from backup");

    let snapshot = match backup.pull().await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::error!(error = %e, "Backup pull failed, starting with an empty store");
            return Ok(RestoreReport::BackupUnavailable {
                error: e.to_string(),
            });
        }
    };

    let mut restored = 0;
    let mut store_failures = 0;
    let mut role_failures = 0;

    for member in &snapshot.members {
        let record = MembershipRecord::new(member.user_id.clone(), member.expiry);

        if let Err(e) = store.upsert(&record).await {
            tracing::error!(user_id = %member.user_id, error = %e, "Failed to restore member");
            store_failures += 1;
            continue;
        }
        restored += 1;

        if let Some(roles) = roles {
            if let Err(e) = roles.grant(&member.user_id).await {
                tracing::warn!(user_id = %member.user_id, error = %e, "Failed to re-grant role on restore");
                role_failures += 1;
            }
        }
    }

    tracing::info!(
        restored = restored,
        store_failures = store_failures,
        role_failures = role_failures,
        "Backup restore complete"
    );

    Ok(RestoreReport::Restored {
        restored,
        store_failures,
        role_failures,
    })
}

/// Send the full local membership set to the backup. Returns members pushed.
pub async fn push(store: &dyn MembershipStore, backup: &dyn BackupPort) -> MembershipResult<usize> {
    let mut records = store.list_all().await?;
    records.sort_by(|a, b| a.expiry_at.cmp(&b.expiry_at).then_with(|| a.user_id.cmp(&b.user_id)));

    let snapshot = BackupSnapshot::from_records(&records);
    backup.push(&snapshot).await?;

    tracing::debug!(members = snapshot.members.len(), "Backup pushed");
    Ok(snapshot.members.len())
}

/// Push after a mutation, logging instead of failing.
///
/// Returns the failure text so callers can surface it as a warning.
pub async fn push_after_mutation(ctx: &MembershipContext) -> Option<String> {
    match push(ctx.store.as_ref(), ctx.backup.as_ref()).await {
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(error = %e, "Backup push failed, local state kept");
            Some(format!("backup push failed: {}", e))
        }
    }
}
