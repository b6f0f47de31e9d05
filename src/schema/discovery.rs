use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::VirtualFieldRegistry;
use crate::cache::LookupCache;
use crate::client::HttpClient;
use crate::error::{Error, Result};
use crate::models::{
    AllowedValue, CreateMetaPage, FieldSchema, FieldType, IssueType, ProjectSchema, RemoteField,
};

/// createmeta の1ページあたりの取得件数
pub const PAGE_SIZE: u64 = 50;

/// スキーマキャッシュの既定TTL（秒）
pub const DEFAULT_SCHEMA_TTL_SECONDS: u64 = 900;

/// プロジェクト＋課題タイプのフィールドスキーマを取得・正規化する
///
/// キャッシュが stale の場合は古い値を即座に返し、バックグラウンドで
/// 1度だけ再取得する。
#[derive(Clone)]
pub struct SchemaDiscovery {
    client: Arc<dyn HttpClient>,
    cache: Option<LookupCache>,
    virtual_fields: Arc<VirtualFieldRegistry>,
    ttl_seconds: u64,
}

impl SchemaDiscovery {
    pub fn new(client: Arc<dyn HttpClient>, cache: Option<LookupCache>) -> Self {
        Self {
            client,
            cache,
            virtual_fields: Arc::new(VirtualFieldRegistry::new()),
            ttl_seconds: DEFAULT_SCHEMA_TTL_SECONDS,
        }
    }

    pub fn with_virtual_fields(mut self, registry: VirtualFieldRegistry) -> Self {
        self.virtual_fields = Arc::new(registry);
        self
    }

    pub fn with_ttl(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds = ttl_seconds;
        self
    }

    pub fn base_url(&self) -> &str {
        self.client.base_url()
    }

    /// `schema:{baseUrl}:{projectKey}:{issueType}`
    pub fn cache_key(base_url: &str, project_key: &str, issue_type: &str) -> String {
        format!("schema:{}:{}:{}", base_url, project_key, issue_type)
    }

    /// フィールドスキーマを取得する
    pub async fn get_fields_for_issue_type(
        &self,
        project_key: &str,
        issue_type_name: &str,
    ) -> Result<ProjectSchema> {
        let key = Self::cache_key(self.client.base_url(), project_key, issue_type_name);

        if let Some(cache) = &self.cache {
            match cache.get_json::<ProjectSchema>(&key).await {
                Ok(Some(cached)) => {
                    if cached.is_stale {
                        debug!(%key, "schema cache stale, refreshing in background");
                        self.spawn_background_refresh(cache, key, project_key, issue_type_name);
                    }
                    return Ok(cached.value);
                }
                Ok(None) => debug!(%key, "schema cache miss"),
                Err(err) => warn!(%key, error = %err, "schema cache read failed"),
            }
        }

        let schema = self.fetch_schema(project_key, issue_type_name).await?;
        self.store(&key, &schema).await;
        Ok(schema)
    }

    /// キャッシュを使わずにリモートから取得して組み立てる
    pub async fn fetch_schema(&self, project_key: &str, issue_type_name: &str) -> Result<ProjectSchema> {
        let issue_types = fetch_issue_types(self.client.as_ref(), project_key).await?;
        let wanted = issue_type_name.trim().to_lowercase();
        let issue_type = issue_types
            .iter()
            .find(|it| it.name.to_lowercase() == wanted)
            .ok_or_else(|| {
                let available: Vec<String> = issue_types.iter().map(|it| it.name.clone()).collect();
                Error::NotFound {
                    resource: Some("issuetype".to_string()),
                    message: format!(
                        "Issue type '{}' not found in project {}. Available issue types: {}",
                        issue_type_name,
                        project_key,
                        available.join(", ")
                    ),
                    available,
                }
            })?;

        let endpoint = format!(
            "/rest/api/{}/issue/createmeta/{}/issuetypes/{}",
            self.client.api_version(),
            urlencoding::encode(project_key),
            urlencoding::encode(&issue_type.id)
        );
        let remote_fields: Vec<RemoteField> = fetch_all_pages(self.client.as_ref(), &endpoint).await?;

        let mut schema = ProjectSchema::new(project_key, issue_type.name.clone(), issue_type.id.clone());
        for remote in remote_fields {
            if schema.contains(&remote.field_id) {
                warn!(field = %remote.field_id, "duplicate field id in createmeta response, keeping first");
                continue;
            }
            let field = parse_field(remote);
            let virtual_fields = self.virtual_fields.synthesize(&field);
            schema = schema.with_field(field);
            for virtual_field in virtual_fields {
                schema = schema.with_field(virtual_field);
            }
        }

        info!(
            project = project_key,
            issue_type = %schema.issue_type,
            fields = schema.len(),
            "schema discovered"
        );
        Ok(schema)
    }

    /// キャッシュを強制的に更新する
    pub async fn refresh(&self, project_key: &str, issue_type_name: &str) -> Result<ProjectSchema> {
        let key = Self::cache_key(self.client.base_url(), project_key, issue_type_name);
        let schema = self.fetch_schema(project_key, issue_type_name).await?;
        self.store(&key, &schema).await;
        Ok(schema)
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
            // 先行する更新が完了していれば何もしない
            if let Ok(Some(entry)) = cache_for_check.get(&refresh_key).await
                && !entry.is_stale
            {
                return Ok(());
            }
            let schema = discovery.fetch_schema(&project_key, &issue_type_name).await?;
            discovery.store(&refresh_key, &schema).await;
            Ok(())
        });
    }

    async fn store(&self, key: &str, schema: &ProjectSchema) {
        let Some(cache) = &self.cache else {
            return;
        };
        if let Err(err) = cache.set_json(key, schema, self.ttl_seconds).await {
            warn!(%key, error = %err, "failed to cache schema");
        }
    }
}

/// プロジェクトで作成可能な課題タイプ一覧を取得する
pub async fn fetch_issue_types(client: &dyn HttpClient, project_key: &str) -> Result<Vec<IssueType>> {
    let endpoint = format!(
        "/rest/api/{}/issue/createmeta/{}/issuetypes",
        client.api_version(),
        urlencoding::encode(project_key)
    );
    fetch_all_pages(client, &endpoint).await.map_err(|err| match err {
        Error::NotFound { .. } => Error::NotFound {
            resource: Some("project".to_string()),
            message: format!("Project '{}' not found", project_key),
            available: Vec::new(),
        },
        other => other,
    })
}

/// createmeta のページングを total に達するまで繰り返す
pub async fn fetch_all_pages<T: DeserializeOwned>(client: &dyn HttpClient, endpoint: &str) -> Result<Vec<T>> {
    let mut items = Vec::new();
    let mut start_at = 0u64;

    loop {
        let url = format!("{}?startAt={}&maxResults={}", endpoint, start_at, PAGE_SIZE);
        let raw = client.get(&url, None).await?;
        let page: CreateMetaPage<T> = serde_json::from_value(raw)
            .map_err(|e| Error::Schema(format!("unexpected createmeta response from {}: {}", endpoint, e)))?;

        let count = page.values.len() as u64;
        items.extend(page.values);
        start_at = page.start_at.max(start_at) + count;

        let done = count == 0
            || page.is_last == Some(true)
            || match page.total {
                Some(total) => start_at >= total,
                None => page.is_last.is_none() && count < PAGE_SIZE,
            };
        if done {
            break;
        }
        debug!(endpoint, start_at, "fetching next createmeta page");
    }

    Ok(items)
}

/// リモートのフィールド定義を FieldSchema に変換する
pub fn parse_field(remote: RemoteField) -> FieldSchema {
    let mut info = remote.schema.unwrap_or_default();
    if info.field_type.is_empty() {
        info.field_type = FieldType::Any.as_str().to_string();
    }
    let allowed_values = remote
        .allowed_values
        .as_deref()
        .map(normalize_allowed_values)
        .filter(|values| !values.is_empty());

    FieldSchema {
        field_type: FieldType::from_remote(&info.field_type),
        id: remote.field_id,
        name: remote.name,
        required: remote.required,
        allowed_values,
        schema: info,
        virtual_of: None,
    }
}

/// `allowedValues` を `{id, name, value?, children?}` に正規化する
///
/// `value` と `name` は `name` に統一する。IDのない要素は捨てる。
pub fn normalize_allowed_values(raw: &[Value]) -> Vec<AllowedValue> {
    raw.iter().filter_map(normalize_allowed_value).collect()
}

fn normalize_allowed_value(raw: &Value) -> Option<AllowedValue> {
    let map = raw.as_object()?;

    let mut extra: Map<String, Value> = map
        .iter()
        .filter(|(key, _)| !matches!(key.as_str(), "id" | "name" | "value" | "children" | "self"))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    let id = match (map.get("id"), map.get("accountId")) {
        (Some(id), _) => scalar_to_string(id)?,
        (None, Some(account_id)) => {
            extra.insert("idKey".to_string(), Value::from("accountId"));
            scalar_to_string(account_id)?
        }
        (None, None) => return None,
    };

    let value = map.get("value").and_then(Value::as_str).map(str::to_string);
    let name = map
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| value.clone())
        .or_else(|| {
            map.get("displayName")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_default();
    let children = map
        .get("children")
        .and_then(Value::as_array)
        .map(|children| normalize_allowed_values(children));

    Some(AllowedValue {
        id,
        name,
        value,
        children,
        extra,
    })
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
