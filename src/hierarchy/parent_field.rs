use tracing::{debug, warn};

use super::jpo::NULL_SENTINEL;
use crate::cache::LookupCache;
use crate::config::default_parent_field_synonyms;
use crate::error::Result;
use crate::models::{FieldType, ProjectSchema};
use crate::schema::SchemaDiscovery;

/// 親フィールドキャッシュの既定TTL（秒）
pub const DEFAULT_PARENT_FIELD_TTL_SECONDS: u64 = 3600;

/// 標準の親フィールド
pub const NATIVE_PARENT_FIELD: &str = "parent";

/// 課題タイプごとに「親」を指すフィールドを特定する
#[derive(Clone)]
pub struct ParentFieldDiscovery {
    schema: SchemaDiscovery,
    cache: Option<LookupCache>,
    synonyms: Vec<String>,
    ttl_seconds: u64,
}

impl ParentFieldDiscovery {
    pub fn new(schema: SchemaDiscovery, cache: Option<LookupCache>) -> Self {
        Self {
            schema,
            cache,
            synonyms: default_parent_field_synonyms(),
            ttl_seconds: DEFAULT_PARENT_FIELD_TTL_SECONDS,
        }
    }

    pub fn with_synonyms(mut self, synonyms: Vec<String>) -> Self {
        self.synonyms = synonyms;
        self
    }

    pub fn with_ttl(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds = ttl_seconds;
        self
    }

    pub fn synonyms(&self) -> &[String] {
        &self.synonyms
    }

    /// `parent-field:{baseUrl}:{projectKey}:{issueType}`
    pub fn cache_key(base_url: &str, project_key: &str, issue_type: &str) -> String {
        format!("parent-field:{}:{}:{}", base_url, project_key, issue_type)
    }

    /// 親フィールドのIDを返す（見つからなければ `None`）
    ///
    /// `None` は階層プラグインの無い環境の通常状態で、エラーではない。
    pub async fn get_parent_field_key(&self, project_key: &str, issue_type_name: &str) -> Result<Option<String>> {
        if is_subtask_name(issue_type_name) {
            return Ok(Some(NATIVE_PARENT_FIELD.to_string()));
        }

        let key = Self::cache_key(self.schema.base_url(), project_key, issue_type_name);
        if let Some(cache) = &self.cache {
            match cache.get(&key).await {
                Ok(Some(entry)) => {
                    if entry.is_stale {
                        self.spawn_background_refresh(cache, key.clone(), project_key, issue_type_name);
                    }
                    return Ok((entry.value != NULL_SENTINEL).then_some(entry.value));
                }
                Ok(None) => {}
                Err(err) => warn!(%key, error = %err, "parent field cache read failed"),
            }
        }

        self.discover(&key, project_key, issue_type_name).await
    }

    /// スキーマから親フィールドを探してキャッシュする
    async fn discover(&self, key: &str, project_key: &str, issue_type_name: &str) -> Result<Option<String>> {
        let schema = self
            .schema
            .get_fields_for_issue_type(project_key, issue_type_name)
            .await?;
        let found = find_parent_field(&schema, &self.synonyms);

        match &found {
            Some(field_id) => debug!(project = project_key, issue_type = issue_type_name, %field_id, "parent field discovered"),
            None => warn!(
                project = project_key,
                issue_type = issue_type_name,
                "no parent field found, standard fields only"
            ),
        }

        if let Some(cache) = &self.cache {
            let value = found.as_deref().unwrap_or(NULL_SENTINEL);
            if let Err(err) = cache.set(key, value, self.ttl_seconds).await {
                warn!(%key, error = %err, "failed to cache parent field");
            }
        }
        Ok(found)
    }

    fn spawn_background_refresh(
        &self,
        cache: &LookupCache,
        key: String,
        project_key: &str,
        issue_type_name: &str,
    ) {
        let discovery = self.clone();
        let cache_for_check = cache.clone();
        let refresh_key = key.clone();
        let project_key = project_key.to_string();
        let issue_type_name = issue_type_name.to_string();

        cache.spawn_refresh(key, move || async move {
            if let Ok(Some(entry)) = cache_for_check.get(&refresh_key).await
                && !entry.is_stale
            {
                return Ok(());
            }
            discovery
                .discover(&refresh_key, &project_key, &issue_type_name)
                .await
                .map(|_| ())
        });
    }
}

/// サブタスク型の名前か（"sub-task" / "subtask" / "sub task" を含む）
pub fn is_subtask_name(issue_type_name: &str) -> bool {
    let lowered = issue_type_name.to_lowercase();
    ["sub-task", "subtask", "sub task"]
        .iter()
        .any(|pattern| lowered.contains(pattern))
}

/// スキーマから同義語に一致する any 型のカスタムフィールドを探す
///
/// 完全一致の優先度は同義語の順位、部分一致は順位＋同義語数。
/// 同じ優先度ならフィールド名の辞書順。
pub fn find_parent_field(schema: &ProjectSchema, synonyms: &[String]) -> Option<String> {
    let patterns: Vec<String> = synonyms.iter().map(|s| s.trim().to_lowercase()).collect();

    let mut candidates: Vec<(usize, &str, &str)> = schema
        .fields
        .values()
        .filter(|field| field.is_custom() && !field.is_virtual() && field.field_type == FieldType::Any)
        .filter_map(|field| {
            let name = field.name.trim().to_lowercase();
            let exact = patterns.iter().position(|p| *p == name);
            let partial = patterns
                .iter()
                .position(|p| !p.is_empty() && name.contains(p.as_str()))
                .map(|index| index + patterns.len());
            exact
                .or(partial)
                .map(|priority| (priority, field.name.as_str(), field.id.as_str()))
        })
        .collect();

    candidates.sort();
    candidates.first().map(|(_, _, id)| id.to_string())
}
