// ============================================================================
// Quota Accounting - Dual Daily Budgets
// ============================================================================
//
// Two independent ceilings gate every reply:
//
// 1. Global API budget: daily unit spend across all users, persisted as an
//    atomic counter per user row and summed for the project-wide view.
// 2. Per-user reply cap: how many replies one user may post per day,
//    counted from the replied-comments audit table.
//
// State is keyed by (user, reset date). Reads under a new date see zero
// without any explicit reset job; the first write under a new date
// overwrites the stale counter. Reservations are single atomic increments
// and never unwound - a reservation that crosses the cap still commits,
// which bounds overshoot at worker_concurrency x reply_cost.
//
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::QuotaConfig;
use crate::middleware::error_handling::Result;
use crate::repositories::DedupStore;

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

#[async_trait]
pub trait QuotaTracker: Send + Sync {
    /// Unspent units of the global daily budget.
    async fn remaining_global(&self) -> Result<i64>;

    /// Replies this user may still post today.
    async fn remaining_for_user(&self, user_id: Uuid) -> Result<i64>;

    /// Record spend against both budgets. Atomic per (user, date);
    /// commits even when it crosses a cap.
    async fn reserve(&self, cost: i64, user_id: Uuid) -> Result<()>;

    /// Replies this user has posted today, counted from the audit table.
    async fn user_reply_count(&self, user_id: Uuid) -> Result<i64>;

    fn user_daily_limit(&self) -> i64;

    /// True iff both budgets have headroom for the given spend.
    async fn can_reserve(&self, cost: i64, user_id: Uuid) -> Result<bool> {
        Ok(self.remaining_global().await? >= cost && self.remaining_for_user(user_id).await? > 0)
    }
}

/// Postgres-backed tracker. The global counter lives on the user row as
/// `(daily_quota_used, last_quota_reset)`; the date roll happens inside
/// the update itself.
pub struct PgQuotaTracker {
    pool: PgPool,
    config: QuotaConfig,
}

impl PgQuotaTracker {
    pub fn new(pool: PgPool, config: QuotaConfig) -> Self {
        Self { pool, config }
    }

    async fn current_global_usage(&self) -> Result<i64> {
        let used: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(daily_quota_used), 0)::BIGINT FROM users WHERE last_quota_reset = $1",
        )
        .bind(today())
        .fetch_one(&self.pool)
        .await?;
        Ok(used)
    }
}

#[async_trait]
impl QuotaTracker for PgQuotaTracker {
    async fn remaining_global(&self) -> Result<i64> {
        let used = self.current_global_usage().await?;
        Ok((self.config.daily_quota_limit - used).max(0))
    }

    async fn remaining_for_user(&self, user_id: Uuid) -> Result<i64> {
        let replies_today = self.user_reply_count(user_id).await?;
        Ok((self.config.user_daily_reply_limit - replies_today).max(0))
    }

    async fn reserve(&self, cost: i64, user_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET daily_quota_used = CASE
                    WHEN last_quota_reset = $2 THEN daily_quota_used + $3
                    ELSE $3
                END,
                last_quota_reset = $2
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .bind(today())
        .bind(cost)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn user_reply_count(&self, user_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM replied_comments WHERE user_id = $1 AND replied_at::date = $2",
        )
        .bind(user_id)
        .bind(today())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    fn user_daily_limit(&self) -> i64 {
        self.config.user_daily_reply_limit
    }
}

/// In-memory tracker for local runs and hermetic tests. Counters are
/// keyed per (user, date); stale keys are pruned after two days, the
/// same retention a TTL'd shared store would give.
pub struct MemoryQuotaTracker {
    config: QuotaConfig,
    dedup: Arc<dyn DedupStore>,
    counters: DashMap<(Uuid, NaiveDate), i64>,
}

impl MemoryQuotaTracker {
    pub fn new(config: QuotaConfig, dedup: Arc<dyn DedupStore>) -> Self {
        Self {
            config,
            dedup,
            counters: DashMap::new(),
        }
    }

    fn usage_on(&self, date: NaiveDate) -> i64 {
        self.counters
            .iter()
            .filter(|entry| entry.key().1 == date)
            .map(|entry| *entry.value())
            .sum()
    }

    fn reserve_on(&self, cost: i64, user_id: Uuid, date: NaiveDate) {
        *self.counters.entry((user_id, date)).or_insert(0) += cost;
        self.counters.retain(|(_, d), _| (date - *d).num_days() <= 2);
    }
}

#[async_trait]
impl QuotaTracker for MemoryQuotaTracker {
    async fn remaining_global(&self) -> Result<i64> {
        Ok((self.config.daily_quota_limit - self.usage_on(today())).max(0))
    }

    async fn remaining_for_user(&self, user_id: Uuid) -> Result<i64> {
        let replies_today = self.user_reply_count(user_id).await?;
        Ok((self.config.user_daily_reply_limit - replies_today).max(0))
    }

    async fn reserve(&self, cost: i64, user_id: Uuid) -> Result<()> {
        self.reserve_on(cost, user_id, today());
        Ok(())
    }

    async fn user_reply_count(&self, user_id: Uuid) -> Result<i64> {
        self.dedup.count_for_user_on(user_id, today()).await
    }

    fn user_daily_limit(&self) -> i64 {
        self.config.user_daily_reply_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewReply;
    use crate::repositories::MemoryDedupStore;
    use chrono::Duration;

    fn quota_config(daily_limit: i64, user_limit: i64) -> QuotaConfig {
        QuotaConfig {
            daily_quota_limit: daily_limit,
            user_daily_reply_limit: user_limit,
            reply_cost: 50,
            fetch_cost: 1,
        }
    }

    fn tracker(daily_limit: i64, user_limit: i64) -> (MemoryQuotaTracker, Arc<MemoryDedupStore>) {
        let dedup = Arc::new(MemoryDedupStore::new());
        (
            MemoryQuotaTracker::new(quota_config(daily_limit, user_limit), dedup.clone()),
            dedup,
        )
    }

    fn reply(comment_id: &str, user_id: Uuid) -> NewReply {
        NewReply {
            comment_id: comment_id.to_string(),
            video_id: "vid-1".to_string(),
            user_id,
            comment_text: None,
            comment_author: None,
            keyword_matched: None,
            reply_text: "Thanks!".to_string(),
        }
    }

    #[tokio::test]
    async fn reserving_reduces_the_global_budget() {
        let (quota, _) = tracker(10_000, 200);
        let user = Uuid::new_v4();

        quota.reserve(50, user).await.unwrap();
        quota.reserve(50, user).await.unwrap();

        assert_eq!(quota.remaining_global().await.unwrap(), 9_900);
    }

    #[tokio::test]
    async fn reply_count_follows_the_audit_table() {
        let (quota, dedup) = tracker(10_000, 200);
        let user = Uuid::new_v4();

        for i in 0..5 {
            dedup.insert(&reply(&format!("c{i}"), user)).await.unwrap();
            quota.reserve(50, user).await.unwrap();
        }

        assert_eq!(quota.user_reply_count(user).await.unwrap(), 5);
        assert_eq!(quota.remaining_for_user(user).await.unwrap(), 195);
    }

    #[tokio::test]
    async fn can_reserve_requires_headroom_in_both_budgets() {
        let (quota, _dedup) = tracker(60, 1);
        let user = Uuid::new_v4();

        assert!(quota.can_reserve(50, user).await.unwrap());

        quota.reserve(50, user).await.unwrap();
        // 10 units left globally: not enough for another reply.
        assert!(!quota.can_reserve(50, user).await.unwrap());

        let (quota, dedup) = tracker(10_000, 1);
        dedup.insert(&reply("c1", user)).await.unwrap();
        // User cap reached even though the global budget is wide open.
        assert!(!quota.can_reserve(50, user).await.unwrap());
    }

    #[tokio::test]
    async fn a_new_date_starts_from_zero_without_explicit_reset() {
        let (quota, _) = tracker(10_000, 200);
        let user = Uuid::new_v4();
        let yesterday = today() - Duration::days(1);

        quota.reserve_on(500, user, yesterday);
        assert_eq!(quota.remaining_global().await.unwrap(), 10_000);

        quota.reserve(50, user).await.unwrap();
        assert_eq!(quota.remaining_global().await.unwrap(), 9_950);
    }

    #[tokio::test]
    async fn stale_counters_are_pruned_after_two_days() {
        let (quota, _) = tracker(10_000, 200);
        let user = Uuid::new_v4();

        quota.reserve_on(100, user, today() - Duration::days(5));
        quota.reserve_on(50, user, today());

        assert_eq!(quota.counters.len(), 1);
    }
}
