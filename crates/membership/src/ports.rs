//! Interfaces the engine consumes
//!
//! The engine never talks to Discord, the database or the backup webhook
//! directly. The binary supplies implementations of these traits; tests use
//! the in-memory store and recording fakes.

use async_trait::async_trait;

use crate::error::MembershipResult;
use crate::model::{Allocation, AllocationRecord, BackupSnapshot, MembershipRecord};
use crate::revenue::RevenueFilter;

/// Read-modify-write step applied to a single member under the store's lock
pub type RecordUpdate<'a> =
    dyn Fn(Option<&MembershipRecord>) -> MembershipResult<MembershipRecord> + Send + Sync + 'a;

/// Keyed persistence of membership and allocation records
#[async_trait]
pub trait MembershipStore: Send + Sync {
    async fn get(&self, user_id: &str) -> MembershipResult<Option<MembershipRecord>>;

    async fn upsert(&self, record: &MembershipRecord) -> MembershipResult<()>;

    /// Atomically compute and write a member's next record from its current one.
    ///
    /// No other mutation of the same `user_id` may interleave between the
    /// read and the write. If `update` fails nothing is written.
    async fn upsert_with(
        &self,
        user_id: &str,
        update: &RecordUpdate<'_>,
    ) -> MembershipResult<MembershipRecord>;

    /// Returns whether a record was removed
    async fn delete(&self, user_id: &str) -> MembershipResult<bool>;

    /// Delete the member only if `expiry_at <= now` at the moment of deletion.
    /// Returns false when the record is gone or was renewed.
    async fn delete_expired(&self, user_id: &str, now: i64) -> MembershipResult<bool>;

    async fn list_all(&self) -> MembershipResult<Vec<MembershipRecord>>;

    async fn count(&self) -> MembershipResult<usize>;

    async fn insert_allocation(&self, allocation: &Allocation) -> MembershipResult<AllocationRecord>;

    /// Allocation rows matching `filter`, in insertion order
    async fn query_allocations(
        &self,
        filter: &RevenueFilter,
        now: i64,
    ) -> MembershipResult<Vec<AllocationRecord>>;
}

/// Grants and revokes the Prime role
#[async_trait]
pub trait RolePort: Send + Sync {
    async fn grant(&self, user_id: &str) -> MembershipResult<()>;

    async fn revoke(&self, user_id: &str) -> MembershipResult<()>;
}

/// Best-effort direct messages to members
#[async_trait]
pub trait NotificationPort: Send + Sync {
    async fn send(&self, user_id: &str, message: &str) -> MembershipResult<()>;
}

/// Remote copy of the membership table
#[async_trait]
pub trait BackupPort: Send + Sync {
    async fn push(&self, snapshot: &BackupSnapshot) -> MembershipResult<()>;

    async fn pull(&self) -> MembershipResult<BackupSnapshot>;
}
