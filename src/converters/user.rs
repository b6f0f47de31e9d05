use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use super::lookup::{cached_candidates, enrich_not_found, refresh_candidates, store_candidates};
use super::{ConversionContext, FieldConverter, handle_null};
use crate::client::HttpClient;
use crate::error::{Error, Result};
use crate::models::{FieldSchema, LookupValue, User};
use crate::normalize::extract_value;
use crate::resolver::{resolve_name, sanitize_input};

const LOOKUP_TYPE: &str = "user";
const USER_KEYS: [&str; 4] = ["accountId", "name", "key", "id"];

/// ユーザーフィールド（担当者・報告者など）
///
/// メールアドレスの完全一致を優先し、次に表示名で解決する。
/// Cloud は `{accountId}`、Server/DC は `{name}` を返す。
pub struct UserConverter;

#[async_trait]
impl FieldConverter for UserConverter {
    async fn convert(&self, value: &Value, field: &FieldSchema, ctx: &ConversionContext) -> Result<Value> {
        if value.is_null() {
            return handle_null(field);
        }
        if let Some(map) = value.as_object()
            && USER_KEYS.iter().any(|key| map.contains_key(*key))
        {
            return Ok(value.clone());
        }

        let query = match extract_value(value) {
            Value::String(text) => sanitize_input(&text),
            other => {
                return Err(Error::validation(format!(
                    "Invalid user value: {} (expected an email, display name or {{\"accountId\": ...}})",
                    other
                )));
            }
        };
        if query.is_empty() {
            return handle_null(field);
        }

        if let Some(cached) = cached_candidates(ctx, LOOKUP_TYPE, None).await {
            if cached.is_stale {
                // 許可値がなければ今回の検索語で一覧を作り直す
                let allowed = field.allowed_lookups();
                let client = ctx.http_client.clone();
                let project_key = ctx.project_key.clone();
                let search = query.clone();
                refresh_candidates(ctx, LOOKUP_TYPE, None, move || async move {
                    match allowed {
                        Some(allowed) => Ok(allowed),
                        None => search_assignable(client.as_ref(), &project_key, &search).await,
                    }
                });
            }
            match match_user(&query, &cached.value, ctx) {
                Ok(found) => return Ok(to_wire(&found)),
                Err(err) if err.is_validation() => debug!(%query, "user not in cached list"),
                Err(err) => return Err(err),
            }
        }

        if let Some(allowed) = field.allowed_lookups() {
            return match_user(&query, &allowed, ctx)
                .map(|found| to_wire(&found))
                .map_err(|err| enrich_not_found(err, "user", &allowed));
        }

        let found_users = search_assignable(ctx.http_client.as_ref(), &ctx.project_key, &query).await?;
        let found = match_user(&query, &found_users, ctx)?;
        remember(ctx, &found_users).await;
        Ok(to_wire(&found))
    }
}

fn match_user(query: &str, candidates: &[LookupValue], ctx: &ConversionContext) -> Result<LookupValue> {
    let email = query.to_lowercase();
    if let Some(found) = candidates.iter().find(|candidate| {
        candidate
            .extra
            .get("emailAddress")
            .and_then(Value::as_str)
            .is_some_and(|address| address.to_lowercase() == email)
    }) {
        return Ok(found.clone());
    }
    resolve_name(query, candidates, &ctx.resolve_options("user", LOOKUP_TYPE))
}

async fn search_assignable(client: &dyn HttpClient, project_key: &str, query: &str) -> Result<Vec<LookupValue>> {
    let endpoint = format!(
        "/rest/api/{}/user/assignable/search?project={}&query={}",
        client.api_version(),
        urlencoding::encode(project_key),
        urlencoding::encode(query)
    );
    let raw = client.get(&endpoint, None).await?;
    let users: Vec<User> = serde_json::from_value(raw)
        .map_err(|e| Error::Schema(format!("unexpected user search response: {}", e)))?;

    let candidates: Vec<LookupValue> = users
        .iter()
        .filter(|user| user.active != Some(false))
        .filter_map(User::to_lookup)
        .collect();
    if candidates.is_empty() {
        return Err(Error::validation(format!(
            "No assignable user matching '{}' found in project {}",
            query, project_key
        )));
    }
    Ok(candidates)
}

/// 検索で見つかったユーザーをキャッシュ済みの一覧に追加する
async fn remember(ctx: &ConversionContext, found: &[LookupValue]) {
    let mut merged = cached_candidates(ctx, LOOKUP_TYPE, None)
        .await
        .map(|cached| cached.value)
        .unwrap_or_default();
    for user in found {
        if !merged.iter().any(|known| known.id == user.id) {
            merged.push(user.clone());
        }
    }
    store_candidates(ctx, LOOKUP_TYPE, None, &merged).await;
}

fn to_wire(user: &LookupValue) -> Value {
    let id_key = user
        .extra
        .get("idKey")
        .and_then(Value::as_str)
        .unwrap_or("accountId");
    let mut wire = Map::new();
    wire.insert(id_key.to_string(), Value::from(user.id.clone()));
    Value::Object(wire)
}
