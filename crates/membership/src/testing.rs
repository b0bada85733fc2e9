//! Recording port fakes shared by the unit tests

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::context::{EngineSettings, MembershipContext};
use crate::error::{MembershipError, MembershipResult};
use crate::model::{Allocation, AllocationRecord, BackupSnapshot, MembershipRecord};
use crate::ports::{BackupPort, MembershipStore, NotificationPort, RecordUpdate, RolePort};
use crate::revenue::RevenueFilter;
use crate::store::InMemoryStore;

#[derive(Default)]
pub struct RecordingRoles {
    granted: Mutex<Vec<String>>,
    revoked: Mutex<Vec<String>>,
    failing: HashSet<String>,
}

impl RecordingRoles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for<const N: usize>(user_ids: [&str; N]) -> Self {
        Self {
            failing: user_ids.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    pub async fn granted(&self) -> Vec<String> {
        self.granted.lock().await.clone()
    }

    pub async fn revoked(&self) -> Vec<String> {
        self.revoked.lock().await.clone()
    }
}

#[async_trait]
impl RolePort for RecordingRoles {
    async fn grant(&self, user_id: &str) -> MembershipResult<()> {
        if self.failing.contains(user_id) {
            return Err(MembershipError::Delivery(format!("cannot grant to {}", user_id)));
        }
        self.granted.lock().await.push(user_id.to_string());
        Ok(())
    }

    async fn revoke(&self, user_id: &str) -> MembershipResult<()> {
        if self.failing.contains(user_id) {
            return Err(MembershipError::Delivery(format!("cannot revoke from {}", user_id)));
        }
        self.revoked.lock().await.push(user_id.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
    failing: HashSet<String>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for<const N: usize>(user_ids: [&str; N]) -> Self {
        Self {
            failing: user_ids.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    pub async fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_to(&self, user_id: &str) -> usize {
        self.sent.lock().await.iter().filter(|(id, _)| id == user_id).count()
    }
}

#[async_trait]
impl NotificationPort for RecordingNotifier {
    async fn send(&self, user_id: &str, message: &str) -> MembershipResult<()> {
        if self.failing.contains(user_id) {
            return Err(MembershipError::Delivery(format!("DMs closed for {}", user_id)));
        }
        self.sent
            .lock()
            .await
            .push((user_id.to_string(), message.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingBackup {
    snapshot: BackupSnapshot,
    pushed: Mutex<Vec<BackupSnapshot>>,
    pulls: Mutex<usize>,
    failing: bool,
}

impl RecordingBackup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: BackupSnapshot) -> Self {
        Self {
            snapshot,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub async fn pushes(&self) -> usize {
        self.pushed.lock().await.len()
    }

    pub async fn pulls(&self) -> usize {
        *self.pulls.lock().await
    }

    pub async fn last_pushed(&self) -> Option<BackupSnapshot> {
        self.pushed.lock().await.last().cloned()
    }
}

#[async_trait]
impl BackupPort for RecordingBackup {
    async fn push(&self, snapshot: &BackupSnapshot) -> MembershipResult<()> {
        if self.failing {
            return Err(MembershipError::BackupUnavailable("webhook returned 503".into()));
        }
        self.pushed.lock().await.push(snapshot.clone());
        Ok(())
    }

    async fn pull(&self) -> MembershipResult<BackupSnapshot> {
        *self.pulls.lock().await += 1;
        if self.failing {
            return Err(MembershipError::BackupUnavailable("webhook returned 503".into()));
        }
        Ok(self.snapshot.clone())
    }
}

/// Store whose allocation table rejects every insert
pub struct AllocationsDown(pub Arc<InMemoryStore>);

#[async_trait]
impl MembershipStore for AllocationsDown {
    async fn get(&self, user_id: &str) -> MembershipResult<Option<MembershipRecord>> {
        self.0.get(user_id).await
    }

    async fn upsert(&self, record: &MembershipRecord) -> MembershipResult<()> {
        self.0.upsert(record).await
    }

    async fn upsert_with(
        &self,
        user_id: &str,
        update: &RecordUpdate<'_>,
    ) -> MembershipResult<MembershipRecord> {
        self.0.upsert_with(user_id, update).await
    }

    async fn delete(&self, user_id: &str) -> MembershipResult<bool> {
        self.0.delete(user_id).await
    }

    async fn delete_expired(&self, user_id: &str, now: i64) -> MembershipResult<bool> {
        self.0.delete_expired(user_id, now).await
    }

    async fn list_all(&self) -> MembershipResult<Vec<MembershipRecord>> {
        self.0.list_all().await
    }

    async fn count(&self) -> MembershipResult<usize> {
        self.0.count().await
    }

    async fn insert_allocation(&self, _allocation: &Allocation) -> MembershipResult<AllocationRecord> {
        Err(MembershipError::Store("allocations table unavailable".into()))
    }

    async fn query_allocations(
        &self,
        filter: &RevenueFilter,
        now: i64,
    ) -> MembershipResult<Vec<AllocationRecord>> {
        self.0.query_allocations(filter, now).await
    }
}

/// Context wired to fakes, with handles kept for assertions
pub struct Harness {
    pub ctx: MembershipContext,
    pub store: Arc<InMemoryStore>,
    pub roles: Arc<RecordingRoles>,
    pub notifier: Arc<RecordingNotifier>,
    pub backup: Arc<RecordingBackup>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(
            InMemoryStore::new(),
            RecordingRoles::new(),
            RecordingNotifier::new(),
            RecordingBackup::new(),
        )
    }

    pub fn with_members<I>(records: I) -> Self
    where
        I: IntoIterator<Item = MembershipRecord>,
    {
        Self::build(
            InMemoryStore::with_members(records),
            RecordingRoles::new(),
            RecordingNotifier::new(),
            RecordingBackup::new(),
        )
    }

    /// Members are stored normally but every allocation insert fails
    pub fn with_failing_allocations() -> Self {
        let mut h = Self::new();
        h.ctx.store = Arc::new(AllocationsDown(h.store.clone()));
        h
    }

    pub fn build(
        store: InMemoryStore,
        roles: RecordingRoles,
        notifier: RecordingNotifier,
        backup: RecordingBackup,
    ) -> Self {
        let store = Arc::new(store);
        let roles = Arc::new(roles);
        let notifier = Arc::new(notifier);
        let backup = Arc::new(backup);

        let ctx = MembershipContext::new(
            store.clone(),
            roles.clone(),
            notifier.clone(),
            backup.clone(),
            EngineSettings::default(),
        );

        Self {
            ctx,
            store,
            roles,
            notifier,
            backup,
        }
    }
}
