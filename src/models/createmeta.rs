use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::FieldTypeInfo;

/// createmeta のページングレスポンス
///
/// Cloud は課題タイプ一覧を `issueTypes`、フィールド一覧を `fields` で返し、
/// Server/DC はどちらも `values` で返す。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMetaPage<T> {
    #[serde(rename = "startAt")]
    #[serde(default)]
    pub start_at: u64,
    #[serde(rename = "maxResults")]
    #[serde(default)]
    pub max_results: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(rename = "isLast")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_last: Option<bool>,
    #[serde(alias = "issueTypes", alias = "fields")]
    #[serde(default = "Vec::new")]
    pub values: Vec<T>,
}

/// createmeta が返すフィールド定義（正規化前）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteField {
    #[serde(rename = "fieldId")]
    #[serde(alias = "key")]
    pub field_id: String,
    pub name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<FieldTypeInfo>,
    #[serde(rename = "allowedValues")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<Value>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IssueType;
    use serde_json::json;

    #[test]
    fn test_field_page_deserialization() {
        let json_data = json!({
            "startAt": 0,
            "maxResults": 50,
            "total": 2,
            "fields": [
                {
                    "fieldId": "summary",
                    "name": "Summary",
                    "required": true,
                    "hasDefaultValue": false,
                    "schema": {"type": "string", "system": "summary"}
                },
                {
                    "fieldId": "customfield_10001",
                    "name": "Story Points",
                    "required": false,
                    "schema": {
                        "type": "number",
                        "custom": "com.atlassian.jira.plugin.system.customfieldtypes:float",
                        "customId": 10001
                    }
                }
            ]
        });

        let page: CreateMetaPage<RemoteField> = serde_json::from_value(json_data).unwrap();

        assert_eq!(page.total, Some(2));
        assert_eq!(page.values.len(), 2);
        assert_eq!(page.values[1].schema.as_ref().unwrap().custom_id, Some(10001));
        // 使わない属性は読み捨てる
        let summary = serde_json::to_value(&page.values[0]).unwrap();
        assert!(summary.get("hasDefaultValue").is_none());
    }

    #[test]
    fn test_server_issue_type_page_uses_values() {
        let json_data = json!({
            "startAt": 0,
            "maxResults": 50,
            "total": 1,
            "isLast": true,
            "values": [{"id": "1", "name": "Bug", "subtask": false}]
        });

        let page: CreateMetaPage<IssueType> = serde_json::from_value(json_data).unwrap();

        assert_eq!(page.values[0].name, "Bug");
        assert_eq!(page.is_last, Some(true));
    }
}
