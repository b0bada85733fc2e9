//! Postgres membership store
//!
//! Persisted shape:
//! - `members (user_id TEXT PRIMARY KEY, expiry BIGINT, warned SMALLINT)`
//! - `allocations (id BIGSERIAL, year INT, month INT, amount BIGINT)`

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};

use crate::error::MembershipResult;
use crate::model::{Allocation, AllocationRecord, MembershipRecord};
use crate::ports::{MembershipStore, RecordUpdate};
use crate::revenue::RevenueFilter;

/// Row type for the members table
#[derive(Debug, FromRow)]
struct MemberRow {
    user_id: String,
    expiry: i64,
    warned: i16,
}

impl From<MemberRow> for MembershipRecord {
    fn from(row: MemberRow) -> Self {
        MembershipRecord {
            user_id: row.user_id,
            expiry_at: row.expiry,
            warned: row.warned != 0,
        }
    }
}

/// Row type for the allocations table
#[derive(Debug, FromRow)]
struct AllocationRow {
    id: i64,
    year: i32,
    month: i32,
    amount: i64,
}

impl From<AllocationRow> for AllocationRecord {
    fn from(row: AllocationRow) -> Self {
        AllocationRecord {
            id: row.id,
            year: row.year,
            // CHECK constraint keeps month within 1-12
            month: row.month as u8,
            amount: row.amount,
        }
    }
}

pub struct PgMembershipStore {
    pool: PgPool,
}

impl PgMembershipStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and apply pending migrations
    pub async fn connect(database_url: &str) -> MembershipResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Membership database ready");

        Ok(Self::new(pool))
    }
}

const UPSERT_MEMBER: &str = r#"
    INSERT INTO members (user_id, expiry, warned)
    VALUES ($1, $2, $3)
    ON CONFLICT (user_id) DO UPDATE
    SET expiry = EXCLUDED.expiry,
        warned = EXCLUDED.warned
"#;

#[async_trait]
impl MembershipStore for PgMembershipStore {
    async fn get(&self, user_id: &str) -> MembershipResult<Option<MembershipRecord>> {
        let row: Option<MemberRow> =
            sqlx::query_as("SELECT user_id, expiry, warned FROM members WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(Into::into))
    }

    async fn upsert(&self, record: &MembershipRecord) -> MembershipResult<()> {
        sqlx::query(UPSERT_MEMBER)
            .bind(&record.user_id)
            .bind(record.expiry_at)
            .bind(i16::from(record.warned))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert_with(
        &self,
        user_id: &str,
        update: &RecordUpdate<'_>,
    ) -> MembershipResult<MembershipRecord> {
        let mut tx = self.pool.begin().await?;

        // Serializes writers on this user id, including first-time inserts
        // where there is no row yet to lock with FOR UPDATE
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let current: Option<MemberRow> =
            sqlx::query_as("SELECT user_id, expiry, warned FROM members WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;
        let current: Option<MembershipRecord> = current.map(Into::into);

        // Dropping the transaction on error rolls it back
        let next = update(current.as_ref())?;

        sqlx::query(UPSERT_MEMBER)
            .bind(&next.user_id)
            .bind(next.expiry_at)
            .bind(i16::from(next.warned))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(next)
    }

    async fn delete(&self, user_id: &str) -> MembershipResult<bool> {
        let result = sqlx::query("DELETE FROM members WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_expired(&self, user_id: &str, now: i64) -> MembershipResult<bool> {
        let mut tx = self.pool.begin().await?;

        // Same lock as upsert_with, so a renewal in flight finishes first
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM members WHERE user_id = $1 AND expiry <= $2")
            .bind(user_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_all(&self) -> MembershipResult<Vec<MembershipRecord>> {
        let rows: Vec<MemberRow> =
            sqlx::query_as("SELECT user_id, expiry, warned FROM members ORDER BY expiry ASC")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn count(&self) -> MembershipResult<usize> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM members")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as usize)
    }

    async fn insert_allocation(&self, allocation: &Allocation) -> MembershipResult<AllocationRecord> {
        let row: AllocationRow = sqlx::query_as(
            r#"
            INSERT INTO allocations (year, month, amount)
            VALUES ($1, $2, $3)
            RETURNING id, year, month, amount
            "#,
        )
        .bind(allocation.year)
        .bind(i32::from(allocation.month))
        .bind(allocation.amount)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn query_allocations(
        &self,
        filter: &RevenueFilter,
        now: i64,
    ) -> MembershipResult<Vec<AllocationRecord>> {
        let (from, to) = filter.bounds(now)?;
        let rows: Vec<AllocationRow> = sqlx::query_as(
            r#"
            SELECT id, year, month, amount
            FROM allocations
            WHERE (year, month) >= ($1, $2)
              AND (year, month) <= ($3, $4)
            ORDER BY id ASC
            "#,
        )
        .bind(from.year)
        .bind(i32::from(from.month))
        .bind(to.year)
        .bind(i32::from(to.month))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
