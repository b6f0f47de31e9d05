use serde::{Deserialize, Serialize};

use super::LookupValue;

/// ユーザー検索APIが返すユーザー
///
/// Cloud は `accountId`、Server/DC は `name` / `key` で識別される。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "accountId")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(rename = "displayName")]
    #[serde(default)]
    pub display_name: String,
    #[serde(rename = "emailAddress")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

impl User {
    /// 識別子とペイロードでのキー名
    pub fn identifier(&self) -> Option<(&'static str, &str)> {
        if let Some(account_id) = self.account_id.as_deref() {
            return Some(("accountId", account_id));
        }
        self.name.as_deref().map(|name| ("name", name))
    }

    pub fn to_lookup(&self) -> Option<LookupValue> {
        let (id_key, id) = self.identifier()?;
        let mut lookup = LookupValue::new(id, self.display_name.clone())
            .with_extra("idKey", id_key.into());
        if let Some(email) = &self.email_address {
            lookup = lookup.with_extra("emailAddress", email.clone().into());
        }
        Some(lookup)
    }
}
