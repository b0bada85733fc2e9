//! In-memory membership store for tests and database-less deployments

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::MembershipResult;
use crate::model::{Allocation, AllocationRecord, MembershipRecord};
use crate::ports::{MembershipStore, RecordUpdate};
use crate::revenue::RevenueFilter;

#[derive(Debug, Default)]
struct Inner {
    members: HashMap<String, MembershipRecord>,
    allocations: Vec<AllocationRecord>,
    next_allocation_id: i64,
}

/// Store backed by process memory. Contents are lost on restart, which is
/// what the backup webhook is for.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with existing records
    pub fn with_members<I>(records: I) -> Self
    where
        I: IntoIterator<Item = MembershipRecord>,
    {
        let members = records
            .into_iter()
            .map(|r| (r.user_id.clone(), r))
            .collect();
        Self {
            inner: RwLock::new(Inner {
                members,
                ..Inner::default()
            }),
        }
    }
}

#[async_trait]
impl MembershipStore for InMemoryStore {
    async fn get(&self, user_id: &str) -> MembershipResult<Option<MembershipRecord>> {
        Ok(self.inner.read().await.members.get(user_id).cloned())
    }

    async fn upsert(&self, record: &MembershipRecord) -> MembershipResult<()> {
        self.inner
            .write()
            .await
            .members
            .insert(record.user_id.clone(), record.clone());
        Ok(())
    }

    async fn upsert_with(
        &self,
        user_id: &str,
        update: &RecordUpdate<'_>,
    ) -> MembershipResult<MembershipRecord> {
        // The write guard spans read and write, serializing all mutations
        let mut inner = self.inner.write().await;
        let next = update(inner.members.get(user_id))?;
        inner.members.insert(user_id.to_string(), next.clone());
        Ok(next)
    }

    async fn delete(&self, user_id: &str) -> MembershipResult<bool> {
        Ok(self.inner.write().await.members.remove(user_id).is_some())
    }

    async fn delete_expired(&self, user_id: &str, now: i64) -> MembershipResult<bool> {
        let mut inner = self.inner.write().await;
        match inner.members.get(user_id) {
            Some(record) if record.expiry_at <= now => {
                inner.members.remove(user_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_all(&self) -> MembershipResult<Vec<MembershipRecord>> {
        Ok(self.inner.read().await.members.values().cloned().collect())
    }

    async fn count(&self) -> MembershipResult<usize> {
        Ok(self.inner.read().await.members.len())
    }

    async fn insert_allocation(&self, allocation: &Allocation) -> MembershipResult<AllocationRecord> {
        let mut inner = self.inner.write().await;
        inner.next_allocation_id += 1;
        let record = AllocationRecord {
            id: inner.next_allocation_id,
            year: allocation.year,
            month: allocation.month,
            amount: allocation.amount,
        };
        inner.allocations.push(record);
        Ok(record)
    }

    async fn query_allocations(
        &self,
        filter: &RevenueFilter,
        now: i64,
    ) -> MembershipResult<Vec<AllocationRecord>> {
        let (from, to) = filter.bounds(now)?;
        Ok(self
            .inner
            .read()
            .await
            .allocations
            .iter()
            .filter(|a| {
                let ym = a.year_month();
                ym >= from && ym <= to
            })
            .copied()
            .collect())
    }
}
