use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::Result;

/// 読み出し結果（値と、ソフトTTLを過ぎているかどうか）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub value: String,
    pub is_stale: bool,
}

/// キーバリューストアの抽象化トレイト
///
/// 値はシリアライズ済みの文字列。どの操作も失敗しうる前提で扱う。
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;
}

/// 保存形式（ソフトTTLとハード期限を持つ）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEntry {
    pub value: String,
    pub stored_at: DateTime<Utc>,
    /// これ以降は stale として返す
    pub stale_at: DateTime<Utc>,
    /// これ以降は存在しないものとして扱う
    pub expires_at: DateTime<Utc>,
}

impl StoredEntry {
    pub fn new(value: String, ttl: Duration, stale_retention: Duration) -> Self {
        let now = Utc::now();
        let stale_at = now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            value,
            stored_at: now,
            stale_at,
            expires_at: stale_at
                .checked_add_signed(stale_retention)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn to_entry(&self, now: DateTime<Utc>) -> CacheEntry {
        CacheEntry {
            value: self.value.clone(),
            is_stale: now >= self.stale_at,
        }
    }
}

/// プロセス内メモリのキャッシュストア
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, StoredEntry>>,
    stale_retention: Duration,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            stale_retention: Duration::hours(1),
        }
    }

    /// TTL 経過後に stale 値を保持し続ける期間を設定
    pub fn with_stale_retention(mut self, retention: Duration) -> Self {
        self.stale_retention = retention;
        self
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let now = Utc::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return Ok(None),
                Some(stored) if !stored.is_expired(now) => return Ok(Some(stored.to_entry(now))),
                Some(_) => {}
            }
        }
        self.entries.write().await.remove(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let stored = StoredEntry::new(value, ttl, self.stale_retention);
        self.entries.write().await.insert(key.to_string(), stored);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_fresh_hit() {
        let store = MemoryCacheStore::new();
        store.set("k", "v".to_string(), Duration::seconds(60)).await.unwrap();

        let entry = store.get("k").await.unwrap().unwrap();
        assert_eq!(entry.value, "v");
        assert!(!entry.is_stale);
    }

    #[tokio::test]
    async fn test_memory_store_stale_hit_within_retention() {
        // Given: TTL 0 で保存（即座に stale）
        let store = MemoryCacheStore::new();
        store.set("k", "v".to_string(), Duration::zero()).await.unwrap();

        // When: 読み出し
        let entry = store.get("k").await.unwrap().unwrap();

        // Then: 値は返るが stale
        assert_eq!(entry.value, "v");
        assert!(entry.is_stale);
    }

    #[tokio::test]
    async fn test_memory_store_expired_after_retention() {
        let store = MemoryCacheStore::new().with_stale_retention(Duration::zero());
        store.set("k", "v".to_string(), Duration::zero()).await.unwrap();

        assert!(store.get("k").await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[test]
    fn test_stored_entry_saturates_on_huge_ttl() {
        // Given/When: 加算がオーバーフローする TTL
        let stored = StoredEntry::new("v".to_string(), Duration::MAX, Duration::MAX);

        // Then: パニックせず最大時刻に丸められ、stale にならない
        assert_eq!(stored.stale_at, DateTime::<Utc>::MAX_UTC);
        assert_eq!(stored.expires_at, DateTime::<Utc>::MAX_UTC);
        assert!(!stored.to_entry(Utc::now()).is_stale);
    }

    #[tokio::test]
    async fn test_memory_store_delete() {
        let store = MemoryCacheStore::new();
        store.set("k", "v".to_string(), Duration::seconds(60)).await.unwrap();
        store.delete("k").await.unwrap();
        assert!(store.get("k").await.unwrap().is_none());
    }
}
