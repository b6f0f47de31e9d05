use chrono::Duration;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::store::{CacheEntry, CacheStore, MemoryCacheStore};
use crate::error::{Error, Result};
use crate::models::LookupValue;

type InFlight = Shared<BoxFuture<'static, Result<()>>>;

/// TTL の上限（10年）。これを超える指定は丸める
pub const MAX_TTL_SECONDS: u64 = 10 * 365 * 24 * 60 * 60;

/// 型付きの読み出し結果
#[derive(Debug, Clone, PartialEq)]
pub struct Cached<T> {
    pub value: T,
    pub is_stale: bool,
}

/// 候補リストと汎用ブロブのキャッシュ
///
/// バックエンドの `CacheStore` に加えて、キー単位で実行中の更新を1つに
/// まとめるテーブルを持つ。クローンは同じテーブルを共有する。
#[derive(Clone)]
pub struct LookupCache {
    store: Arc<dyn CacheStore>,
    in_flight: Arc<Mutex<HashMap<String, InFlight>>>,
}

impl LookupCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// メモリストアで作成
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCacheStore::new()))
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        self.store.get(key).await
    }

    pub async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()> {
        self.store
            .set(key, value.to_string(), ttl(ttl_seconds))
            .await
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.store.delete(key).await
    }

    /// JSONとして読み出す（壊れたエントリは Cache エラー）
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<Cached<T>>> {
        let Some(entry) = self.store.get(key).await? else {
            return Ok(None);
        };
        let value = serde_json::from_str(&entry.value)
            .map_err(|e| Error::Cache(format!("corrupt cache entry '{}': {}", key, e)))?;
        Ok(Some(Cached {
            value,
            is_stale: entry.is_stale,
        }))
    }

    pub async fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl_seconds: u64) -> Result<()> {
        let serialized = serde_json::to_string(value)
            .map_err(|e| Error::Cache(format!("cannot serialize '{}': {}", key, e)))?;
        self.store.set(key, serialized, ttl(ttl_seconds)).await
    }

    /// `lookup:{projectKey}:{fieldType}[:{issueType}]`
    pub fn lookup_key(project_key: &str, field_type: &str, issue_type: Option<&str>) -> String {
        match issue_type {
            Some(issue_type) => format!("lookup:{}:{}:{}", project_key, field_type, issue_type),
            None => format!("lookup:{}:{}", project_key, field_type),
        }
    }

    /// 候補リストを読み出す（未キャッシュなら `value = None`）
    pub async fn get_lookup(
        &self,
        project_key: &str,
        field_type: &str,
        issue_type: Option<&str>,
    ) -> Result<Cached<Option<Vec<LookupValue>>>> {
        let key = Self::lookup_key(project_key, field_type, issue_type);
        Ok(match self.get_json::<Vec<LookupValue>>(&key).await? {
            Some(cached) => Cached {
                value: Some(cached.value),
                is_stale: cached.is_stale,
            },
            None => Cached {
                value: None,
                is_stale: false,
            },
        })
    }

    pub async fn set_lookup(
        &self,
        project_key: &str,
        field_type: &str,
        issue_type: Option<&str>,
        values: &[LookupValue],
        ttl_seconds: u64,
    ) -> Result<()> {
        let key = Self::lookup_key(project_key, field_type, issue_type);
        self.set_json(&key, values, ttl_seconds).await
    }

    /// 同じキーの更新を同時に1つだけ実行する
    ///
    /// 実行中の更新があればそれの完了を待ち、同じ結果を受け取る。
    pub async fn refresh_once<F, Fut>(&self, key: &str, refresh: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let task = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            match in_flight.get(key) {
                Some(existing) => {
                    debug!(%key, "joining in-flight refresh");
                    existing.clone()
                }
                None => {
                    let table = Arc::clone(&self.in_flight);
                    let owned_key = key.to_string();
                    let refresh = refresh();
                    let task = async move {
                        let result = refresh.await;
                        table
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .remove(&owned_key);
                        result
                    }
                    .boxed()
                    .shared();
                    in_flight.insert(key.to_string(), task.clone());
                    task
                }
            }
        };
        task.await
    }

    /// 切り離したタスクで `refresh_once` を実行する（失敗はログのみ）
    pub fn spawn_refresh<F, Fut>(&self, key: impl Into<String>, refresh: F) -> JoinHandle<()>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let cache = self.clone();
        let key = key.into();
        tokio::spawn(async move {
            match cache.refresh_once(&key, refresh).await {
                Ok(()) => debug!(%key, "background refresh completed"),
                Err(err) => warn!(%key, error = %err, "background refresh failed"),
            }
        })
    }

    /// 実行中の更新数
    pub fn in_flight_count(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl std::fmt::Debug for LookupCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LookupCache")
            .field("store", &"<CacheStore>")
            .field("in_flight", &self.in_flight_count())
            .finish()
    }
}

fn ttl(seconds: u64) -> Duration {
    Duration::seconds(i64::try_from(seconds.min(MAX_TTL_SECONDS)).unwrap_or_default())
}
