use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::AmbiguityCandidate;

/// エラー種別（パターンマッチ用の判別子）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Ambiguity,
    NotFound,
    Configuration,
    Cache,
    Schema,
    Authentication,
    RateLimit,
    ServerError,
    Network,
}

/// 入力検証エラーの詳細
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationDetails {
    /// フィールドID
    pub field: Option<String>,
    /// フィールド表示名
    pub field_name: Option<String>,
    /// 問題のある入力値
    pub value: Option<Value>,
    /// 利用可能な値の一覧
    pub available_values: Vec<String>,
}

/// 曖昧一致エラーの詳細
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AmbiguityDetails {
    pub field: Option<String>,
    pub field_name: Option<String>,
    pub value: Option<Value>,
    /// 一致した候補
    pub candidates: Vec<AmbiguityCandidate>,
}

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("{message}")]
    Validation {
        message: String,
        details: ValidationDetails,
    },

    #[error("{message}")]
    Ambiguity {
        message: String,
        details: AmbiguityDetails,
    },

    #[error("Not found: {message}")]
    NotFound {
        resource: Option<String>,
        message: String,
        available: Vec<String>,
    },

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Invalid schema: {0}")]
    Schema(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rate limit exceeded")]
    RateLimit { retry_after_seconds: Option<u64> },

    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation { .. } => ErrorKind::Validation,
            Error::Ambiguity { .. } => ErrorKind::Ambiguity,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::Configuration(_) => ErrorKind::Configuration,
            Error::Cache(_) => ErrorKind::Cache,
            Error::Schema(_) => ErrorKind::Schema,
            Error::Authentication(_) => ErrorKind::Authentication,
            Error::RateLimit { .. } => ErrorKind::RateLimit,
            Error::ServerError { .. } => ErrorKind::ServerError,
            Error::Network(_) => ErrorKind::Network,
        }
    }

    /// 詳細なしの検証エラーを作成
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
            details: ValidationDetails::default(),
        }
    }

    /// 利用可能な値の一覧付きの検証エラーを作成
    pub fn validation_with_available(message: impl Into<String>, available: Vec<String>) -> Self {
        Error::Validation {
            message: message.into(),
            details: ValidationDetails {
                available_values: available,
                ..Default::default()
            },
        }
    }

    pub fn ambiguity(message: impl Into<String>, candidates: Vec<AmbiguityCandidate>) -> Self {
        Error::Ambiguity {
            message: message.into(),
            details: AmbiguityDetails {
                candidates,
                ..Default::default()
            },
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Error::NotFound {
            resource: None,
            message: message.into(),
            available: Vec::new(),
        }
    }

    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// リトライ可能な失敗かどうか（429/503/ネットワーク）
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::RateLimit { .. } | Error::Network(_) => true,
            Error::ServerError { status, .. } => *status == 503,
            _ => false,
        }
    }

    /// 利用可能な値の一覧（エラーに含まれる場合）
    pub fn available_values(&self) -> &[String] {
        match self {
            Error::Validation { details, .. } => &details.available_values,
            Error::NotFound { available, .. } => available,
            _ => &[],
        }
    }

    /// 曖昧一致の候補一覧
    pub fn candidates(&self) -> &[AmbiguityCandidate] {
        match self {
            Error::Ambiguity { details, .. } => &details.candidates,
            _ => &[],
        }
    }

    /// 変換エラーにフィールド情報と入力値を付与する
    ///
    /// Validation/Ambiguity 以外の種別はそのまま返す。
    pub fn with_field_context(self, field_id: &str, field_name: &str, value: &Value) -> Self {
        let prefix = format!("Field '{}' ({})", field_name, field_id);
        match self {
            Error::Validation { message, mut details } => {
                details.field.get_or_insert_with(|| field_id.to_string());
                details.field_name.get_or_insert_with(|| field_name.to_string());
                details.value.get_or_insert_with(|| value.clone());
                Error::Validation {
                    message: prefix_message(&prefix, message),
                    details,
                }
            }
            Error::Ambiguity { message, mut details } => {
                details.field.get_or_insert_with(|| field_id.to_string());
                details.field_name.get_or_insert_with(|| field_name.to_string());
                details.value.get_or_insert_with(|| value.clone());
                Error::Ambiguity {
                    message: prefix_message(&prefix, message),
                    details,
                }
            }
            other => other,
        }
    }
}

fn prefix_message(prefix: &str, message: String) -> String {
    if message.starts_with("Field '") {
        message
    } else {
        format!("{}: {}", prefix, message)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Network(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Schema(format!("JSON parsing failed: {}", err))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Cache(format!("IO error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_discriminant() {
        assert_eq!(Error::validation("x").kind(), ErrorKind::Validation);
        assert_eq!(Error::not_found("x").kind(), ErrorKind::NotFound);
        assert_eq!(Error::Cache("x".into()).kind(), ErrorKind::Cache);
        assert_eq!(
            Error::RateLimit { retry_after_seconds: None }.kind(),
            ErrorKind::RateLimit
        );
    }

    #[test]
    fn test_with_field_context_enriches_validation() {
        // Given: フィールド情報なしの検証エラー
        let err = Error::validation_with_available(
            "Value 'Hgh' not found",
            vec!["High".to_string(), "Low".to_string()],
        );

        // When: フィールド情報を付与
        let err = err.with_field_context("priority", "Priority", &json!("Hgh"));

        // Then: メッセージとdetailsにフィールド情報が入る
        assert_eq!(err.to_string(), "Field 'Priority' (priority): Value 'Hgh' not found");
        match err {
            Error::Validation { details, .. } => {
                assert_eq!(details.field.as_deref(), Some("priority"));
                assert_eq!(details.value, Some(json!("Hgh")));
                assert_eq!(details.available_values.len(), 2);
            }
            _ => panic!("Expected Validation error"),
        }
    }

    #[test]
    fn test_with_field_context_keeps_other_kinds() {
        let err = Error::Network("timeout".into()).with_field_context("f", "F", &json!(1));
        assert_eq!(err.kind(), ErrorKind::Network);
        assert_eq!(err.to_string(), "Network error: timeout");
    }

    #[test]
    fn test_with_field_context_not_prefixed_twice() {
        let err = Error::validation("bad")
            .with_field_context("duedate", "Due Date", &json!("x"))
            .with_field_context("duedate", "Due Date", &json!("x"));
        assert_eq!(err.to_string(), "Field 'Due Date' (duedate): bad");
    }

    #[test]
    fn test_retryable() {
        assert!(Error::RateLimit { retry_after_seconds: Some(1) }.is_retryable());
        assert!(Error::ServerError { status: 503, message: String::new() }.is_retryable());
        assert!(!Error::ServerError { status: 500, message: String::new() }.is_retryable());
        assert!(!Error::validation("x").is_retryable());
    }
}
