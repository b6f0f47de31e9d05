use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::FieldSchema;

/// プロジェクト＋課題タイプ単位のフィールドスキーマ
///
/// スキーマ探索で構築され、以後は不変。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSchema {
    #[serde(rename = "projectKey")]
    pub project_key: String,
    #[serde(rename = "issueType")]
    pub issue_type: String,
    #[serde(rename = "issueTypeId")]
    pub issue_type_id: String,
    pub fields: BTreeMap<String, FieldSchema>,
}

impl ProjectSchema {
    pub fn new(
        project_key: impl Into<String>,
        issue_type: impl Into<String>,
        issue_type_id: impl Into<String>,
    ) -> Self {
        Self {
            project_key: project_key.into(),
            issue_type: issue_type.into(),
            issue_type_id: issue_type_id.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, field: FieldSchema) -> Self {
        self.fields.insert(field.id.clone(), field);
        self
    }

    pub fn field(&self, id: &str) -> Option<&FieldSchema> {
        self.fields.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.fields.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// 表示名の一覧（エラーメッセージ用）
    pub fn field_names(&self) -> Vec<String> {
        self.fields.values().map(|f| f.name.clone()).collect()
    }
}
