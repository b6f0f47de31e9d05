//! 名前 → ID 解決を行う選択系フィールド（コンポーネント・バージョン・選択肢・優先度）

use async_trait::async_trait;
use serde_json::{Value, json};
use std::future::Future;
use tracing::{debug, warn};

use super::{ConversionContext, FieldConverter, handle_null};
use crate::cache::{Cached, LookupCache};
use crate::error::{Error, Result};
use crate::models::{FieldSchema, LookupValue};
use crate::normalize::{extract_value, has_identifier};
use crate::resolver::resolve_unique_name;

/// 候補リストのキャッシュ範囲
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    /// プロジェクト単位（コンポーネント・バージョン）
    Project,
    /// 課題タイプ単位（優先度・選択肢）
    IssueType,
}

struct LookupKind {
    /// ポリシー上書きのキーにもなる型タグ
    type_tag: &'static str,
    label: &'static str,
    scope: Scope,
}

const COMPONENT: LookupKind = LookupKind {
    type_tag: "component",
    label: "component",
    scope: Scope::Project,
};

const VERSION: LookupKind = LookupKind {
    type_tag: "version",
    label: "version",
    scope: Scope::Project,
};

const PRIORITY: LookupKind = LookupKind {
    type_tag: "priority",
    label: "priority",
    scope: Scope::IssueType,
};

const OPTION: LookupKind = LookupKind {
    type_tag: "option",
    label: "option",
    scope: Scope::IssueType,
};

pub struct ComponentConverter;
pub struct VersionConverter;
pub struct PriorityConverter;
/// 単一選択のカスタムフィールド（候補はフィールドごとにキャッシュ）
pub struct OptionConverter;

#[async_trait]
impl FieldConverter for ComponentConverter {
    async fn convert(&self, value: &Value, field: &FieldSchema, ctx: &ConversionContext) -> Result<Value> {
        resolve_lookup(value, field, ctx, &COMPONENT, COMPONENT.type_tag.to_string()).await
    }
}

#[async_trait]
impl FieldConverter for VersionConverter {
    async fn convert(&self, value: &Value, field: &FieldSchema, ctx: &ConversionContext) -> Result<Value> {
        resolve_lookup(value, field, ctx, &VERSION, VERSION.type_tag.to_string()).await
    }
}

#[async_trait]
impl FieldConverter for PriorityConverter {
    async fn convert(&self, value: &Value, field: &FieldSchema, ctx: &ConversionContext) -> Result<Value> {
        resolve_lookup(value, field, ctx, &PRIORITY, PRIORITY.type_tag.to_string()).await
    }
}

#[async_trait]
impl FieldConverter for OptionConverter {
    async fn convert(&self, value: &Value, field: &FieldSchema, ctx: &ConversionContext) -> Result<Value> {
        let cache_type = format!("option_{}", field.id);
        resolve_lookup(value, field, ctx, &OPTION, cache_type).await
    }
}

async fn resolve_lookup(
    value: &Value,
    field: &FieldSchema,
    ctx: &ConversionContext,
    kind: &LookupKind,
    cache_type: String,
) -> Result<Value> {
    if value.is_null() {
        return handle_null(field);
    }
    if has_identifier(value) {
        return Ok(value.clone());
    }

    let input = extract_value(value);
    let options = ctx.resolve_options(kind.label, kind.type_tag);
    let issue_type = match kind.scope {
        Scope::Project => None,
        Scope::IssueType => Some(ctx.issue_type.as_str()),
    };

    if let Some(cached) = cached_candidates(ctx, &cache_type, issue_type).await {
        if cached.is_stale {
            let fresh = field.allowed_lookups().unwrap_or_default();
            refresh_candidates(ctx, &cache_type, issue_type, move || async move { Ok(fresh) });
        }
        match resolve_unique_name(&input, &cached.value, &options) {
            Ok(found) => return Ok(json!({"id": found.id})),
            Err(err) if err.is_validation() && field.allowed_values.is_some() => {
                debug!(field = %field.id, "not found in cached {} list, retrying with allowed values", kind.label);
            }
            Err(err) => return Err(err),
        }
    }

    let allowed = field.allowed_lookups().ok_or_else(|| {
        Error::validation(format!(
            "No allowed {} values are available for {}",
            kind.label, field.name
        ))
    })?;

    let found = resolve_unique_name(&input, &allowed, &options)
        .map_err(|err| enrich_not_found(err, kind.label, &allowed))?;
    store_candidates(ctx, &cache_type, issue_type, &allowed).await;
    Ok(json!({"id": found.id}))
}

/// キャッシュから候補リストを読む（失敗・未キャッシュ・空は None）
///
/// stale でも値は返す。更新は呼び出し側が `refresh_candidates` で起動する。
pub(crate) async fn cached_candidates(
    ctx: &ConversionContext,
    field_type: &str,
    issue_type: Option<&str>,
) -> Option<Cached<Vec<LookupValue>>> {
    let cache = ctx.lookup_cache.as_ref()?;
    match cache.get_lookup(&ctx.project_key, field_type, issue_type).await {
        Ok(Cached { value, is_stale }) => value
            .filter(|values| !values.is_empty())
            .map(|value| Cached { value, is_stale }),
        Err(err) => {
            warn!(field_type, error = %err, "lookup cache read failed, using fallback");
            None
        }
    }
}

/// stale な候補リストをバックグラウンドで取り直して書き戻す
///
/// 同じキーの更新は1つにまとめる。先行する更新で新しくなっていれば何もせず、
/// `fetch` が空を返したときは stale な一覧を残す。
pub(crate) fn refresh_candidates<F, Fut>(
    ctx: &ConversionContext,
    field_type: &str,
    issue_type: Option<&str>,
    fetch: F,
) where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Vec<LookupValue>>> + Send + 'static,
{
    let Some(cache) = ctx.lookup_cache.clone() else {
        return;
    };
    let key = LookupCache::lookup_key(&ctx.project_key, field_type, issue_type);
    let refresh_cache = cache.clone();
    let project_key = ctx.project_key.clone();
    let field_type = field_type.to_string();
    let issue_type = issue_type.map(str::to_string);
    let ttl_seconds = ctx.config.lookup_ttl_seconds;

    debug!(%key, "lookup list is stale, refreshing in background");
    cache.spawn_refresh(key, move || async move {
        let current = refresh_cache
            .get_lookup(&project_key, &field_type, issue_type.as_deref())
            .await?;
        if current.value.is_some() && !current.is_stale {
            return Ok(());
        }
        let values = fetch().await?;
        if values.is_empty() {
            debug!(%field_type, "no fresh lookup values, keeping stale list");
            return Ok(());
        }
        refresh_cache
            .set_lookup(&project_key, &field_type, issue_type.as_deref(), &values, ttl_seconds)
            .await
    });
}

/// 候補リストをキャッシュに書く（失敗はログのみ）
pub(crate) async fn store_candidates(
    ctx: &ConversionContext,
    field_type: &str,
    issue_type: Option<&str>,
    values: &[LookupValue],
) {
    let Some(cache) = &ctx.lookup_cache else {
        return;
    };
    if let Err(err) = cache
        .set_lookup(
            &ctx.project_key,
            field_type,
            issue_type,
            values,
            ctx.config.lookup_ttl_seconds,
        )
        .await
    {
        warn!(field_type, error = %err, "failed to cache lookup values");
    }
}

/// 未検出エラーに利用可能な値の一覧を付ける
pub(crate) fn enrich_not_found(err: Error, label: &str, candidates: &[LookupValue]) -> Error {
    match err {
        Error::Validation { message, mut details } => {
            let names: Vec<String> = candidates
                .iter()
                .filter(|c| !c.name.is_empty())
                .map(|c| c.name.clone())
                .collect();
            let message = if names.is_empty() {
                message
            } else {
                format!("{}. Available {} values: {}", message, label, names.join(", "))
            };
            details.available_values = names;
            Error::Validation { message, details }
        }
        other => other,
    }
}
