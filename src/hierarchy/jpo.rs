use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, LookupCache};
use crate::client::HttpClient;
use crate::error::{Error, Result};
use crate::models::HierarchyLevel;

/// 階層プラグインのエンドポイント
pub const HIERARCHY_ENDPOINT: &str = "/rest/jpo-api/1.0/hierarchy";

/// 「階層なし」を表すキャッシュ値
pub const NULL_SENTINEL: &str = "null";

/// 階層情報キャッシュの既定TTL（秒）
pub const DEFAULT_HIERARCHY_TTL_SECONDS: u64 = 3600;

/// 課題タイプ階層（JPO）の取得
///
/// プラグインが無い環境（404）では `None` をキャッシュし、
/// `refresh = true` で呼ばれるまで再取得しない。
#[derive(Clone)]
pub struct JpoHierarchyDiscovery {
    client: Arc<dyn HttpClient>,
    cache: Option<LookupCache>,
    ttl_seconds: u64,
}

impl JpoHierarchyDiscovery {
    pub fn new(client: Arc<dyn HttpClient>, cache: Option<LookupCache>) -> Self {
        Self {
            client,
            cache,
            ttl_seconds: DEFAULT_HIERARCHY_TTL_SECONDS,
        }
    }

    pub fn with_ttl(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds = ttl_seconds;
        self
    }

    /// `jpo-hierarchy:{baseUrl}`
    pub fn cache_key(base_url: &str) -> String {
        format!("jpo-hierarchy:{}", base_url)
    }

    /// 階層を取得する（プラグインが無ければ `None`）
    ///
    /// stale な階層はそのまま返し、バックグラウンドで取り直す。
    pub async fn get_hierarchy(&self, refresh: bool) -> Result<Option<Vec<HierarchyLevel>>> {
        let key = Self::cache_key(self.client.base_url());
        let mut cached = None;

        if let Some(cache) = &self.cache {
            match cache.get(&key).await {
                Ok(Some(entry)) => {
                    if !refresh {
                        if entry.value == NULL_SENTINEL {
                            debug!(%key, "hierarchy plugin absent (cached)");
                            return Ok(None);
                        }
                        match serde_json::from_str::<Vec<HierarchyLevel>>(&entry.value) {
                            Ok(levels) => {
                                if entry.is_stale {
                                    self.spawn_background_refresh(cache, key.clone());
                                }
                                return Ok(Some(levels));
                            }
                            Err(err) => warn!(%key, error = %err, "unreadable cached hierarchy, refetching"),
                        }
                    }
                    cached = Some(entry);
                }
                Ok(None) => {}
                Err(err) => warn!(%key, error = %err, "hierarchy cache read failed"),
            }
        }

        self.fetch(&key, cached).await
    }

    /// リモートから取得してキャッシュする（内容が同じで新しいエントリは書き直さない）
    async fn fetch(&self, key: &str, cached: Option<CacheEntry>) -> Result<Option<Vec<HierarchyLevel>>> {
        match self.client.get(HIERARCHY_ENDPOINT, None).await {
            Ok(raw) => {
                let levels = normalize_hierarchy(&raw)?;
                let serialized = serde_json::to_string(&levels)?;
                let unchanged = cached
                    .as_ref()
                    .is_some_and(|entry| !entry.is_stale && entry.value == serialized);
                if !unchanged {
                    self.store(key, &serialized, self.ttl_seconds).await;
                }
                Ok(Some(levels))
            }
            Err(Error::NotFound { .. }) => {
                info!("hierarchy endpoint not found, assuming no hierarchy plugin");
                self.store(key, NULL_SENTINEL, DEFAULT_HIERARCHY_TTL_SECONDS)
                    .await;
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn spawn_background_refresh(&self, cache: &LookupCache, key: String) {
        let discovery = self.clone();
        let cache_for_check = cache.clone();
        let refresh_key = key.clone();

        cache.spawn_refresh(key, move || async move {
            let current = cache_for_check.get(&refresh_key).await.ok().flatten();
            if current.as_ref().is_some_and(|entry| !entry.is_stale) {
                return Ok(());
            }
            discovery.fetch(&refresh_key, current).await.map(|_| ())
        });
    }

    async fn store(&self, key: &str, value: &str, ttl_seconds: u64) {
        let Some(cache) = &self.cache else {
            return;
        };
        if let Err(err) = cache.set(key, value, ttl_seconds).await {
            warn!(%key, error = %err, "failed to cache hierarchy");
        }
    }
}

/// 階層レスポンスを検証・正規化する
///
/// 各レベルの `issueTypeIds` は文字列化してソートし、レベルは `id` 昇順に並べる。
pub fn normalize_hierarchy(raw: &Value) -> Result<Vec<HierarchyLevel>> {
    let entries = raw
        .as_array()
        .ok_or_else(|| Error::Schema("hierarchy response must be an array".to_string()))?;

    let mut levels = entries
        .iter()
        .enumerate()
        .map(|(index, entry)| normalize_level(index, entry))
        .collect::<Result<Vec<_>>>()?;
    levels.sort_by_key(|level| level.id);
    Ok(levels)
}

fn normalize_level(index: usize, entry: &Value) -> Result<HierarchyLevel> {
    let map = entry
        .as_object()
        .ok_or_else(|| Error::Schema(format!("hierarchy level {} is not an object", index)))?;

    let id = map
        .get("id")
        .and_then(Value::as_u64)
        .and_then(|id| u32::try_from(id).ok())
        .ok_or_else(|| {
            Error::Schema(format!(
                "hierarchy level {} must have a non-negative integer id",
                index
            ))
        })?;

    let title = map
        .get("title")
        .and_then(Value::as_str)
        .filter(|title| !title.trim().is_empty())
        .ok_or_else(|| Error::Schema(format!("hierarchy level {} must have a non-empty title", id)))?
        .to_string();

    let raw_ids = map
        .get("issueTypeIds")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::Schema(format!("hierarchy level {} must have an issueTypeIds array", id)))?;

    let mut issue_type_ids = raw_ids
        .iter()
        .map(|value| match value {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(Error::Schema(format!(
                "hierarchy level {} has an invalid issue type id: {}",
                id, other
            ))),
        })
        .collect::<Result<Vec<_>>>()?;
    issue_type_ids.sort();

    if issue_type_ids.is_empty() {
        warn!(level = id, %title, "hierarchy level has no issue types");
    }

    Ok(HierarchyLevel {
        id,
        title,
        issue_type_ids,
    })
}

/// 課題タイプが属するレベル
pub fn find_level<'a>(issue_type_id: &str, hierarchy: &'a [HierarchyLevel]) -> Option<&'a HierarchyLevel> {
    hierarchy.iter().find(|level| level.contains(issue_type_id))
}

/// 課題タイプの1つ上のレベル（最上位または未登録なら `None`）
pub fn get_parent_level<'a>(
    issue_type_id: &str,
    hierarchy: &'a [HierarchyLevel],
) -> Option<&'a HierarchyLevel> {
    let level = find_level(issue_type_id, hierarchy)?;
    let parent_id = level.id.checked_add(1)?;
    hierarchy.iter().find(|candidate| candidate.id == parent_id)
}

/// `parent_id` が `child_id` の親レベルに属するか
pub fn is_valid_parent(child_id: &str, parent_id: &str, hierarchy: &[HierarchyLevel]) -> bool {
    get_parent_level(child_id, hierarchy).is_some_and(|level| level.contains(parent_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converters::tests::StaticClient;
    use serde_json::json;
    use std::time::Duration;

    fn sample_hierarchy() -> Vec<HierarchyLevel> {
        normalize_hierarchy(&json!([
            {"id": 2, "title": "Epic", "issueTypeIds": [10000]},
            {"id": 0, "title": "Story", "issueTypeIds": ["10002", "10001"]},
            {"id": 1, "title": "Feature", "issueTypeIds": ["10005"]}
        ]))
        .unwrap()
    }

    #[test]
    fn test_normalize_sorts_levels_and_ids() {
        let levels = sample_hierarchy();

        assert_eq!(levels.iter().map(|l| l.id).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(levels[0].issue_type_ids, vec!["10001", "10002"]);
        assert_eq!(levels[2].issue_type_ids, vec!["10000"]);
    }

    #[test]
    fn test_normalize_rejects_non_array() {
        let err = normalize_hierarchy(&json!({"levels": []})).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Schema);
    }

    #[test]
    fn test_normalize_rejects_invalid_levels() {
        let cases = vec![
            json!([{"id": -1, "title": "Story", "issueTypeIds": []}]),
            json!([{"id": 0, "title": "", "issueTypeIds": []}]),
            json!([{"id": 0, "title": "Story"}]),
            json!([{"id": 0, "title": "Story", "issueTypeIds": [null]}]),
            json!(["Story"]),
        ];
        for case in cases {
            assert!(normalize_hierarchy(&case).is_err(), "accepted {}", case);
        }
    }

    #[test]
    fn test_normalize_tolerates_empty_issue_types() {
        let levels = normalize_hierarchy(&json!([{"id": 3, "title": "Initiative", "issueTypeIds": []}])).unwrap();
        assert!(levels[0].issue_type_ids.is_empty());
    }

    #[test]
    fn test_parent_level_queries() {
        let levels = sample_hierarchy();

        assert_eq!(get_parent_level("10001", &levels).unwrap().title, "Feature");
        assert!(get_parent_level("10000", &levels).is_none());
        assert!(get_parent_level("99999", &levels).is_none());

        assert!(is_valid_parent("10001", "10005", &levels));
        assert!(!is_valid_parent("10001", "10000", &levels));
        assert!(is_valid_parent("10005", "10000", &levels));
    }

    #[tokio::test]
    async fn test_stale_hierarchy_is_served_then_refreshed() {
        // Given: stale な階層（Story のみ）と、Epic も返すエンドポイント
        let client = StaticClient::new(vec![(
            HIERARCHY_ENDPOINT,
            json!([
                {"id": 0, "title": "Story", "issueTypeIds": ["10001"]},
                {"id": 1, "title": "Epic", "issueTypeIds": ["10000"]}
            ]),
        )]);
        let cache = LookupCache::in_memory();
        let key = JpoHierarchyDiscovery::cache_key(client.base_url());
        let stale = serde_json::to_string(&normalize_hierarchy(&json!([
            {"id": 0, "title": "Story", "issueTypeIds": ["10001"]}
        ]))
        .unwrap())
        .unwrap();
        cache.set(&key, &stale, 0).await.unwrap();
        let discovery = JpoHierarchyDiscovery::new(client.clone(), Some(cache.clone()));

        // When: 取得してバックグラウンド更新を待つ
        let levels = discovery.get_hierarchy(false).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Then: 今回は stale な値、キャッシュは新しい階層になる
        assert_eq!(levels.len(), 1);
        assert_eq!(client.calls(), 1);
        let entry = cache.get(&key).await.unwrap().unwrap();
        assert!(!entry.is_stale);
        let refreshed = discovery.get_hierarchy(false).await.unwrap().unwrap();
        assert_eq!(refreshed.len(), 2);
        assert_eq!(client.calls(), 1);
    }
}
