use serde::{Deserialize, Serialize};

use super::LookupValue;

/// createmeta が返す課題タイプ
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueType {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub subtask: bool,
}

impl IssueType {
    pub fn to_lookup(&self) -> LookupValue {
        LookupValue::new(self.id.clone(), self.name.clone())
            .with_extra("subtask", self.subtask.into())
    }
}

/// 解決済みの課題タイプ（キャッシュ対象）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedIssueType {
    pub id: String,
    pub name: String,
    pub subtask: bool,
}
