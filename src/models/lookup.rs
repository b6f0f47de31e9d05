use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 名前解決の候補となる値 `{id, name, ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupValue {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LookupValue {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            extra: Map::new(),
        }
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// 解決失敗時に提示する近似候補
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmbiguityCandidate {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl From<&LookupValue> for AmbiguityCandidate {
    fn from(value: &LookupValue) -> Self {
        Self {
            id: value.id.clone(),
            name: value.name.clone(),
            score: None,
        }
    }
}
