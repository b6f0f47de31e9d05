use serde::{Deserialize, Serialize};

/// 課題タイプ階層の1レベル
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyLevel {
    pub id: u32,
    pub title: String,
    #[serde(rename = "issueTypeIds")]
    pub issue_type_ids: Vec<String>,
}

impl HierarchyLevel {
    pub fn contains(&self, issue_type_id: &str) -> bool {
        self.issue_type_ids.iter().any(|id| id == issue_type_id)
    }
}
