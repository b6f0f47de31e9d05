//! 利用者が入力したフィールド名をスキーマ上のフィールドIDに解決する

use tracing::debug;

use crate::config::default_parent_field_synonyms;
use crate::error::{Error, Result};
use crate::hierarchy::{NATIVE_PARENT_FIELD, ParentFieldDiscovery};
use crate::models::{AmbiguityCandidate, ProjectSchema};
use crate::normalize::normalize_field_name;

/// よく使われる別名（正規化済み）→ 標準フィールドID
const FIELD_ALIASES: &[(&str, &str)] = &[
    ("type", "issuetype"),
    ("due", "duedate"),
    ("duedate", "duedate"),
    ("fixversion", "fixVersions"),
    ("component", "components"),
    ("label", "labels"),
    ("tags", "labels"),
    ("affectsversion", "versions"),
    ("affectsversions", "versions"),
];

pub struct FieldResolver {
    parent_fields: Option<ParentFieldDiscovery>,
    parent_synonyms: Vec<String>,
}

impl FieldResolver {
    pub fn new(parent_fields: Option<ParentFieldDiscovery>) -> Self {
        let parent_synonyms = parent_fields
            .as_ref()
            .map(|discovery| discovery.synonyms().to_vec())
            .unwrap_or_else(default_parent_field_synonyms);
        Self {
            parent_fields,
            parent_synonyms,
        }
    }

    pub fn with_parent_synonyms(mut self, synonyms: Vec<String>) -> Self {
        self.parent_synonyms = synonyms;
        self
    }

    /// フィールドIDに解決する（見つからなければ `None`）
    ///
    /// 1. ID の正規化一致
    /// 2. 表示名の正規化一致（同名が複数あれば曖昧エラー）
    /// 3. 既知の別名
    /// 4. 親フィールドの同義語（課題タイプごとの親フィールドへ）
    pub async fn resolve_field_name(&self, user_key: &str, schema: &ProjectSchema) -> Result<Option<String>> {
        if schema.contains(user_key) {
            return Ok(Some(user_key.to_string()));
        }

        let normalized = normalize_field_name(user_key);
        if normalized.is_empty() {
            return Ok(None);
        }

        if let Some(field) = schema
            .fields
            .values()
            .find(|field| normalize_field_name(&field.id) == normalized)
        {
            return Ok(Some(field.id.clone()));
        }

        let by_name: Vec<_> = schema
            .fields
            .values()
            .filter(|field| normalize_field_name(&field.name) == normalized)
            .collect();
        match by_name.as_slice() {
            [field] => return Ok(Some(field.id.clone())),
            [] => {}
            duplicates => {
                let candidates: Vec<AmbiguityCandidate> = duplicates
                    .iter()
                    .map(|field| AmbiguityCandidate {
                        id: field.id.clone(),
                        name: field.name.clone(),
                        score: None,
                    })
                    .collect();
                let listed: Vec<String> = candidates
                    .iter()
                    .map(|c| format!("{} ({})", c.name, c.id))
                    .collect();
                return Err(Error::ambiguity(
                    format!(
                        "Field name '{}' matches multiple fields: {}. Use the field id instead.",
                        user_key,
                        listed.join(", ")
                    ),
                    candidates,
                ));
            }
        }

        if let Some((_, target)) = FIELD_ALIASES.iter().find(|(alias, _)| *alias == normalized)
            && schema.contains(target)
        {
            return Ok(Some(target.to_string()));
        }

        let is_parent_synonym = self
            .parent_synonyms
            .iter()
            .any(|synonym| normalize_field_name(synonym) == normalized);
        if is_parent_synonym {
            return self.resolve_parent_field(schema).await;
        }

        debug!(field = user_key, "field name not resolved");
        Ok(None)
    }

    async fn resolve_parent_field(&self, schema: &ProjectSchema) -> Result<Option<String>> {
        if let Some(discovery) = &self.parent_fields
            && let Some(field_id) = discovery
                .get_parent_field_key(&schema.project_key, &schema.issue_type)
                .await?
            && (field_id == NATIVE_PARENT_FIELD || schema.contains(&field_id))
        {
            return Ok(Some(field_id));
        }
        Ok(schema
            .contains(NATIVE_PARENT_FIELD)
            .then(|| NATIVE_PARENT_FIELD.to_string()))
    }
}
