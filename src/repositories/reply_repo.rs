use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use dashmap::{DashMap, DashSet};
use sqlx::PgPool;
use uuid::Uuid;

use crate::middleware::error_handling::Result;
use crate::models::{DailyReplyCount, NewReply, RepliedComment, ReplyStats};

/// Outcome of an idempotent dedup insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyReplied,
}

/// Authoritative record of which comment IDs have been replied to.
///
/// `insert` is idempotent: re-inserting an existing comment ID returns
/// `AlreadyReplied` and leaves the stored row untouched. The reply loop
/// uses exactly that property as its reservation step - whichever worker
/// wins the insert owns the comment, every loser backs off, so at most
/// one reply is ever posted per comment even across concurrent workers.
#[async_trait]
pub trait DedupStore: Send + Sync {
    /// Which of the given comment IDs are already present. Single round
    /// trip regardless of batch size.
    async fn contains_any(&self, comment_ids: &[String]) -> Result<HashSet<String>>;

    async fn insert(&self, reply: &NewReply) -> Result<InsertOutcome>;

    async fn insert_batch(&self, replies: &[NewReply]) -> Result<u64>;

    /// All known comment IDs for a user; used to warm a local mirror.
    async fn list_ids_for_user(&self, user_id: Uuid) -> Result<Vec<String>>;

    /// Replies recorded for a user on the given date. Source of truth
    /// for the per-user daily reply count.
    async fn count_for_user_on(&self, user_id: Uuid, date: NaiveDate) -> Result<i64>;

    async fn recent_for_user(&self, user_id: Uuid, limit: i64) -> Result<Vec<RepliedComment>>;

    async fn stats_for_user(&self, user_id: Uuid, days: i64) -> Result<ReplyStats>;

    async fn chart_for_user(&self, user_id: Uuid, days: i64) -> Result<Vec<DailyReplyCount>>;
}

pub struct PgDedupStore {
    pool: PgPool,
}

impl PgDedupStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DedupStore for PgDedupStore {
    async fn contains_any(&self, comment_ids: &[String]) -> Result<HashSet<String>> {
        if comment_ids.is_empty() {
            return Ok(HashSet::new());
        }

        let found: Vec<String> = sqlx::query_scalar(
            "SELECT comment_id FROM replied_comments WHERE comment_id = ANY($1)",
        )
        .bind(comment_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(found.into_iter().collect())
    }

    async fn insert(&self, reply: &NewReply) -> Result<InsertOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO replied_comments (
                comment_id, video_id, user_id, comment_text,
                comment_author, keyword_matched, reply_text
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (comment_id) DO NOTHING
            "#,
        )
        .bind(&reply.comment_id)
        .bind(&reply.video_id)
        .bind(reply.user_id)
        .bind(&reply.comment_text)
        .bind(&reply.comment_author)
        .bind(&reply.keyword_matched)
        .bind(&reply.reply_text)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            Ok(InsertOutcome::Inserted)
        } else {
            Ok(InsertOutcome::AlreadyReplied)
        }
    }

    async fn insert_batch(&self, replies: &[NewReply]) -> Result<u64> {
        let mut inserted = 0;
        for reply in replies {
            if self.insert(reply).await? == InsertOutcome::Inserted {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn list_ids_for_user(&self, user_id: Uuid) -> Result<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT comment_id FROM replied_comments WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn count_for_user_on(&self, user_id: Uuid, date: NaiveDate) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM replied_comments WHERE user_id = $1 AND replied_at::date = $2",
        )
        .bind(user_id)
        .bind(date)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn recent_for_user(&self, user_id: Uuid, limit: i64) -> Result<Vec<RepliedComment>> {
        let replies = sqlx::query_as::<_, RepliedComment>(
            r#"
            SELECT * FROM replied_comments
            WHERE user_id = $1
            ORDER BY replied_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(replies)
    }

    async fn stats_for_user(&self, user_id: Uuid, days: i64) -> Result<ReplyStats> {
        let total_replies: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM replied_comments
            WHERE user_id = $1 AND replied_at >= NOW() - make_interval(days => $2::int)
            "#,
        )
        .bind(user_id)
        .bind(days)
        .fetch_one(&self.pool)
        .await?;

        Ok(ReplyStats {
            total_replies,
            window_days: days,
        })
    }

    async fn chart_for_user(&self, user_id: Uuid, days: i64) -> Result<Vec<DailyReplyCount>> {
        let rows = sqlx::query_as::<_, DailyReplyCount>(
            r#"
            SELECT replied_at::date AS date, COUNT(*) AS count
            FROM replied_comments
            WHERE user_id = $1 AND replied_at >= NOW() - make_interval(days => $2::int)
            GROUP BY replied_at::date
            ORDER BY date
            "#,
        )
        .bind(user_id)
        .bind(days)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

/// In-memory store for local runs and hermetic tests. Per-key entry
/// locking gives the same winner-takes-all insert semantics as the
/// unique index in Postgres.
#[derive(Default)]
pub struct MemoryDedupStore {
    records: DashMap<String, RepliedComment>,
}

impl MemoryDedupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, comment_id: &str) -> Option<RepliedComment> {
        self.records.get(comment_id).map(|r| r.clone())
    }
}

#[async_trait]
impl DedupStore for MemoryDedupStore {
    async fn contains_any(&self, comment_ids: &[String]) -> Result<HashSet<String>> {
        Ok(comment_ids
            .iter()
            .filter(|id| self.records.contains_key(*id))
            .cloned()
            .collect())
    }

    async fn insert(&self, reply: &NewReply) -> Result<InsertOutcome> {
        match self.records.entry(reply.comment_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Ok(InsertOutcome::AlreadyReplied),
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(reply.clone().into_record());
                Ok(InsertOutcome::Inserted)
            }
        }
    }

    async fn insert_batch(&self, replies: &[NewReply]) -> Result<u64> {
        let mut inserted = 0;
        for reply in replies {
            if self.insert(reply).await? == InsertOutcome::Inserted {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn list_ids_for_user(&self, user_id: Uuid) -> Result<Vec<String>> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.user_id == user_id)
            .map(|r| r.comment_id.clone())
            .collect())
    }

    async fn count_for_user_on(&self, user_id: Uuid, date: NaiveDate) -> Result<i64> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.user_id == user_id && r.replied_at.date_naive() == date)
            .count() as i64)
    }

    async fn recent_for_user(&self, user_id: Uuid, limit: i64) -> Result<Vec<RepliedComment>> {
        let mut replies: Vec<RepliedComment> = self
            .records
            .iter()
            .filter(|r| r.user_id == user_id)
            .map(|r| r.clone())
            .collect();
        replies.sort_by(|a, b| b.replied_at.cmp(&a.replied_at));
        replies.truncate(limit as usize);
        Ok(replies)
    }

    async fn stats_for_user(&self, user_id: Uuid, days: i64) -> Result<ReplyStats> {
        let cutoff = Utc::now() - Duration::days(days);
        let total_replies = self
            .records
            .iter()
            .filter(|r| r.user_id == user_id && r.replied_at >= cutoff)
            .count() as i64;
        Ok(ReplyStats {
            total_replies,
            window_days: days,
        })
    }

    async fn chart_for_user(&self, user_id: Uuid, days: i64) -> Result<Vec<DailyReplyCount>> {
        let cutoff = Utc::now() - Duration::days(days);
        let mut per_day: std::collections::BTreeMap<NaiveDate, i64> = Default::default();
        for record in self.records.iter() {
            if record.user_id == user_id && record.replied_at >= cutoff {
                *per_day.entry(record.replied_at.date_naive()).or_default() += 1;
            }
        }
        Ok(per_day
            .into_iter()
            .map(|(date, count)| DailyReplyCount { date, count })
            .collect())
    }
}

/// A fast local mirror in front of an authoritative store.
///
/// Membership hits on the mirror skip the round trip entirely; misses
/// still consult the store, and inserts go to the store first so the
/// mirror can never claim a comment the store has not recorded.
pub struct WarmDedupCache {
    store: Arc<dyn DedupStore>,
    known_ids: DashSet<String>,
}

impl WarmDedupCache {
    pub fn new(store: Arc<dyn DedupStore>) -> Self {
        Self {
            store,
            known_ids: DashSet::new(),
        }
    }

    /// Preload the mirror with every known ID for a user.
    pub async fn warm_for_user(&self, user_id: Uuid) -> Result<usize> {
        let ids = self.store.list_ids_for_user(user_id).await?;
        let count = ids.len();
        for id in ids {
            self.known_ids.insert(id);
        }
        Ok(count)
    }

    pub fn mirror_len(&self) -> usize {
        self.known_ids.len()
    }
}

#[async_trait]
impl DedupStore for WarmDedupCache {
    async fn contains_any(&self, comment_ids: &[String]) -> Result<HashSet<String>> {
        let mut found: HashSet<String> = HashSet::new();
        let mut misses: Vec<String> = Vec::new();

        for id in comment_ids {
            if self.known_ids.contains(id) {
                found.insert(id.clone());
            } else {
                misses.push(id.clone());
            }
        }

        if !misses.is_empty() {
            for id in self.store.contains_any(&misses).await? {
                self.known_ids.insert(id.clone());
                found.insert(id);
            }
        }

        Ok(found)
    }

    async fn insert(&self, reply: &NewReply) -> Result<InsertOutcome> {
        let outcome = self.store.insert(reply).await?;
        self.known_ids.insert(reply.comment_id.clone());
        Ok(outcome)
    }

    async fn insert_batch(&self, replies: &[NewReply]) -> Result<u64> {
        let inserted = self.store.insert_batch(replies).await?;
        for reply in replies {
            self.known_ids.insert(reply.comment_id.clone());
        }
        Ok(inserted)
    }

    async fn list_ids_for_user(&self, user_id: Uuid) -> Result<Vec<String>> {
        self.store.list_ids_for_user(user_id).await
    }

    async fn count_for_user_on(&self, user_id: Uuid, date: NaiveDate) -> Result<i64> {
        self.store.count_for_user_on(user_id, date).await
    }

    async fn recent_for_user(&self, user_id: Uuid, limit: i64) -> Result<Vec<RepliedComment>> {
        self.store.recent_for_user(user_id, limit).await
    }

    async fn stats_for_user(&self, user_id: Uuid, days: i64) -> Result<ReplyStats> {
        self.store.stats_for_user(user_id, days).await
    }

    async fn chart_for_user(&self, user_id: Uuid, days: i64) -> Result<Vec<DailyReplyCount>> {
        self.store.chart_for_user(user_id, days).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(comment_id: &str, user_id: Uuid, text: &str) -> NewReply {
        NewReply {
            comment_id: comment_id.to_string(),
            video_id: "vid-1".to_string(),
            user_id,
            comment_text: Some("How much is the price?".to_string()),
            comment_author: Some("Ana".to_string()),
            keyword_matched: Some("price".to_string()),
            reply_text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn insert_is_idempotent_and_keeps_first_values() {
        let store = MemoryDedupStore::new();
        let user = Uuid::new_v4();

        let first = store.insert(&reply("c1", user, "first")).await.unwrap();
        assert_eq!(first, InsertOutcome::Inserted);

        let second = store.insert(&reply("c1", user, "second")).await.unwrap();
        assert_eq!(second, InsertOutcome::AlreadyReplied);

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("c1").unwrap().reply_text, "first");
    }

    #[tokio::test]
    async fn contains_any_reports_only_known_ids() {
        let store = MemoryDedupStore::new();
        let user = Uuid::new_v4();
        store.insert(&reply("c1", user, "hi")).await.unwrap();

        let found = store
            .contains_any(&["c1".to_string(), "c2".to_string()])
            .await
            .unwrap();
        assert!(found.contains("c1"));
        assert!(!found.contains("c2"));
    }

    #[tokio::test]
    async fn warm_cache_serves_membership_locally_after_warming() {
        let backing: Arc<dyn DedupStore> = Arc::new(MemoryDedupStore::new());
        let user = Uuid::new_v4();
        backing.insert(&reply("c1", user, "hi")).await.unwrap();

        let cache = WarmDedupCache::new(backing);
        assert_eq!(cache.warm_for_user(user).await.unwrap(), 1);
        assert_eq!(cache.mirror_len(), 1);

        let found = cache
            .contains_any(&["c1".to_string(), "c2".to_string()])
            .await
            .unwrap();
        assert!(found.contains("c1"));
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn warm_cache_insert_round_trips_to_the_store() {
        let backing = Arc::new(MemoryDedupStore::new());
        let cache = WarmDedupCache::new(backing.clone());
        let user = Uuid::new_v4();

        cache.insert(&reply("c9", user, "hi")).await.unwrap();
        assert_eq!(backing.len(), 1);
        assert!(cache
            .contains_any(&["c9".to_string()])
            .await
            .unwrap()
            .contains("c9"));
    }
}
