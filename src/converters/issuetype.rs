use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::lookup::{cached_candidates, enrich_not_found, refresh_candidates, store_candidates};
use super::{ConversionContext, FieldConverter, handle_null};
use crate::error::{Error, Result};
use crate::models::{FieldSchema, IssueType, LookupValue, ResolvedIssueType};
use crate::normalize::{extract_value, has_identifier};
use crate::resolver::{resolve_name, sanitize_input};
use crate::schema::fetch_issue_types;

const LOOKUP_TYPE: &str = "issuetype";

/// 課題タイプ（名前 → `{id}`）
///
/// 略称展開・階層レベルでの絞り込みに対応し、解決結果を短時間キャッシュする。
pub struct IssueTypeConverter;

impl IssueTypeConverter {
    /// `issuetype:{baseUrl}:{projectKey}:{name}:{level|any}`
    pub fn cache_key(ctx: &ConversionContext, name: &str) -> String {
        let level = ctx
            .hierarchy_level
            .map(|level| level.to_string())
            .unwrap_or_else(|| "any".to_string());
        format!(
            "issuetype:{}:{}:{}:{}",
            ctx.base_url,
            ctx.project_key,
            name.to_lowercase(),
            level
        )
    }
}

#[async_trait]
impl FieldConverter for IssueTypeConverter {
    async fn convert(&self, value: &Value, field: &FieldSchema, ctx: &ConversionContext) -> Result<Value> {
        if value.is_null() {
            return handle_null(field);
        }
        if has_identifier(value) {
            return Ok(value.clone());
        }

        let raw = match extract_value(value) {
            Value::String(text) => text,
            other => {
                return Err(Error::validation(format!(
                    "Invalid issue type value: {} (expected a name or {{\"id\": ...}})",
                    other
                )));
            }
        };
        let name = sanitize_input(ctx.config.expand_issue_type_abbreviation(&raw));
        if name.is_empty() {
            return Err(Error::validation("Issue type must not be empty"));
        }

        let key = Self::cache_key(ctx, &name);
        if let Some(cache) = &ctx.lookup_cache {
            match cache.get_json::<ResolvedIssueType>(&key).await {
                Ok(Some(cached)) if !cached.is_stale => return Ok(json!({"id": cached.value.id})),
                Ok(Some(_)) => debug!(%key, "resolved issue type is stale, resolving again"),
                Ok(None) => {}
                Err(err) => warn!(%key, error = %err, "issue type cache read failed"),
            }
        }

        let candidates = filter_by_level(ctx, load_candidates(field, ctx).await?).await;
        let found = match exact_matches(&name, &candidates).as_slice() {
            [only] => (*only).clone(),
            _ => resolve_name(&name, &candidates, &ctx.resolve_options("issue type", LOOKUP_TYPE))
                .map_err(|err| enrich_not_found(err, "issue type", &candidates))?,
        };

        let resolved = ResolvedIssueType {
            id: found.id.clone(),
            name: found.name.clone(),
            subtask: found
                .extra
                .get("subtask")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        };
        if let Some(cache) = &ctx.lookup_cache
            && let Err(err) = cache
                .set_json(&key, &resolved, ctx.config.issue_type_ttl_seconds)
                .await
        {
            warn!(%key, error = %err, "failed to cache resolved issue type");
        }

        debug!(input = %raw, id = %resolved.id, "issue type resolved");
        Ok(json!({"id": resolved.id}))
    }
}

fn exact_matches<'a>(name: &str, candidates: &'a [LookupValue]) -> Vec<&'a LookupValue> {
    let wanted = name.to_lowercase();
    candidates
        .iter()
        .filter(|c| c.name.to_lowercase() == wanted)
        .collect()
}

/// 候補: キャッシュ → 許可値 → createmeta の課題タイプ一覧
async fn load_candidates(field: &FieldSchema, ctx: &ConversionContext) -> Result<Vec<LookupValue>> {
    if let Some(cached) = cached_candidates(ctx, LOOKUP_TYPE, None).await {
        if cached.is_stale {
            let allowed = field.allowed_lookups();
            let client = ctx.http_client.clone();
            let project_key = ctx.project_key.clone();
            refresh_candidates(ctx, LOOKUP_TYPE, None, move || async move {
                if let Some(allowed) = allowed {
                    return Ok(allowed);
                }
                let fetched = fetch_issue_types(client.as_ref(), &project_key).await?;
                Ok(fetched.iter().map(IssueType::to_lookup).collect())
            });
        }
        return Ok(cached.value);
    }
    if let Some(allowed) = field.allowed_lookups() {
        store_candidates(ctx, LOOKUP_TYPE, None, &allowed).await;
        return Ok(allowed);
    }

    let fetched: Vec<LookupValue> = fetch_issue_types(ctx.http_client.as_ref(), &ctx.project_key)
        .await?
        .iter()
        .map(IssueType::to_lookup)
        .collect();
    store_candidates(ctx, LOOKUP_TYPE, None, &fetched).await;
    Ok(fetched)
}

/// 階層レベルで候補を絞り込む（階層が無い・レベルが無い場合はそのまま）
async fn filter_by_level(ctx: &ConversionContext, candidates: Vec<LookupValue>) -> Vec<LookupValue> {
    let (Some(level_id), Some(hierarchy)) = (ctx.hierarchy_level, &ctx.hierarchy) else {
        return candidates;
    };

    let levels = match hierarchy.get_hierarchy(false).await {
        Ok(Some(levels)) => levels,
        Ok(None) => {
            debug!(level = level_id, "no hierarchy available, skipping level filter");
            return candidates;
        }
        Err(err) => {
            warn!(level = level_id, error = %err, "hierarchy lookup failed, skipping level filter");
            return candidates;
        }
    };
    let Some(level) = levels.iter().find(|level| level.id == level_id) else {
        debug!(level = level_id, "hierarchy level not found, skipping level filter");
        return candidates;
    };

    candidates
        .into_iter()
        .filter(|candidate| level.contains(&candidate.id))
        .collect()
}
