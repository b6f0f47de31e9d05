use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use super::LookupValue;

/// 内部フィールド型タグ
///
/// リモートの `schema.type` を正規化したもの。未知の型は `Other` に保持され、
/// 変換時はそのまま通過する。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    String,
    Number,
    Date,
    DateTime,
    User,
    Priority,
    SelectOption,
    CascadingOption,
    Component,
    Version,
    Array,
    TimeTracking,
    IssueType,
    Project,
    IssueLink,
    Any,
    Other(String),
}

impl FieldType {
    pub fn from_remote(tag: &str) -> Self {
        match tag {
            "string" => FieldType::String,
            "number" => FieldType::Number,
            "date" => FieldType::Date,
            "datetime" => FieldType::DateTime,
            "user" => FieldType::User,
            "priority" => FieldType::Priority,
            "option" => FieldType::SelectOption,
            "option-with-child" => FieldType::CascadingOption,
            "component" => FieldType::Component,
            "version" => FieldType::Version,
            "array" => FieldType::Array,
            "timetracking" => FieldType::TimeTracking,
            "issuetype" => FieldType::IssueType,
            "project" => FieldType::Project,
            "issuelink" => FieldType::IssueLink,
            "any" => FieldType::Any,
            other => FieldType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Date => "date",
            FieldType::DateTime => "datetime",
            FieldType::User => "user",
            FieldType::Priority => "priority",
            FieldType::SelectOption => "option",
            FieldType::CascadingOption => "option-with-child",
            FieldType::Component => "component",
            FieldType::Version => "version",
            FieldType::Array => "array",
            FieldType::TimeTracking => "timetracking",
            FieldType::IssueType => "issuetype",
            FieldType::Project => "project",
            FieldType::IssueLink => "issuelink",
            FieldType::Any => "any",
            FieldType::Other(tag) => tag,
        }
    }
}

impl From<String> for FieldType {
    fn from(tag: String) -> Self {
        FieldType::from_remote(&tag)
    }
}

impl From<FieldType> for String {
    fn from(field_type: FieldType) -> Self {
        field_type.as_str().to_string()
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// リモートのスキーマメタデータ（`schema` オブジェクト）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldTypeInfo {
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom: Option<String>,
    #[serde(rename = "customId")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_id: Option<u64>,
}

/// 正規化済みの許可値
///
/// リモートの `value` / `name` は `name` に統一される。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllowedValue {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<AllowedValue>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AllowedValue {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            value: None,
            children: None,
            extra: Map::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<AllowedValue>) -> Self {
        self.children = Some(children);
        self
    }

    pub fn to_lookup(&self) -> LookupValue {
        LookupValue {
            id: self.id.clone(),
            name: self.name.clone(),
            extra: self.extra.clone(),
        }
    }
}

/// 仮想フィールドの参照先（親フィールドとサブプロパティ）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualFieldRef {
    #[serde(rename = "parentId")]
    pub parent_id: String,
    #[serde(rename = "propertyPath")]
    pub property_path: String,
}

/// 1フィールド分のスキーマ定義
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub required: bool,
    #[serde(rename = "allowedValues")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<AllowedValue>>,
    #[serde(default)]
    pub schema: FieldTypeInfo,
    #[serde(rename = "virtualOf")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub virtual_of: Option<VirtualFieldRef>,
}

impl FieldSchema {
    pub fn new(id: impl Into<String>, name: impl Into<String>, field_type: FieldType) -> Self {
        let field_type_tag = field_type.as_str().to_string();
        Self {
            id: id.into(),
            name: name.into(),
            field_type,
            required: false,
            allowed_values: None,
            schema: FieldTypeInfo {
                field_type: field_type_tag,
                ..Default::default()
            },
            virtual_of: None,
        }
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn allowed_values(mut self, values: Vec<AllowedValue>) -> Self {
        self.allowed_values = Some(values);
        self
    }

    pub fn items(mut self, items: impl Into<String>) -> Self {
        self.schema.items = Some(items.into());
        self
    }

    pub fn is_custom(&self) -> bool {
        self.schema.custom.is_some() || self.id.starts_with("customfield_")
    }

    pub fn is_virtual(&self) -> bool {
        self.virtual_of.is_some()
    }

    /// 配列要素の型
    pub fn items_type(&self) -> Option<FieldType> {
        self.schema.items.as_deref().map(FieldType::from_remote)
    }

    /// 許可値を候補リストとして返す（空の場合は None）
    pub fn allowed_lookups(&self) -> Option<Vec<LookupValue>> {
        self.allowed_values
            .as_ref()
            .filter(|values| !values.is_empty())
            .map(|values| values.iter().map(AllowedValue::to_lookup).collect())
    }

    /// 許可値の名前一覧
    pub fn allowed_names(&self) -> Vec<String> {
        self.allowed_values
            .as_ref()
            .map(|values| values.iter().map(|v| v.name.clone()).collect())
            .unwrap_or_default()
    }

    /// 配列要素を変換するためのスキーマ
    pub fn item_schema(&self, item_type: FieldType) -> FieldSchema {
        FieldSchema {
            id: self.id.clone(),
            name: self.name.clone(),
            schema: FieldTypeInfo {
                field_type: item_type.as_str().to_string(),
                items: None,
                system: self.schema.system.clone(),
                custom: self.schema.custom.clone(),
                custom_id: self.schema.custom_id,
            },
            field_type: item_type,
            required: false,
            allowed_values: self.allowed_values.clone(),
            virtual_of: None,
        }
    }
}
