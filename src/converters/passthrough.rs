use async_trait::async_trait;
use regex::Regex;
use serde_json::{Value, json};
use std::sync::LazyLock;

use super::{ConversionContext, FieldConverter, handle_null};
use crate::error::{Error, Result};
use crate::models::FieldSchema;
use crate::normalize::{extract_value, has_identifier};

static ISSUE_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][A-Z0-9_]*-\d+$").expect("valid issue key pattern"));

/// 課題への参照（標準の親フィールドなど）
pub struct IssueLinkConverter;

#[async_trait]
impl FieldConverter for IssueLinkConverter {
    async fn convert(&self, value: &Value, field: &FieldSchema, _ctx: &ConversionContext) -> Result<Value> {
        if value.is_null() {
            return handle_null(field);
        }
        if has_identifier(value) {
            return Ok(value.clone());
        }
        match extract_value(value) {
            Value::String(text) => {
                let key = text.trim().to_uppercase();
                if !ISSUE_KEY.is_match(&key) {
                    return Err(Error::validation(format!(
                        "Invalid issue key for {}: '{}' (expected e.g. PROJ-123)",
                        field.name, text
                    )));
                }
                Ok(json!({"key": key}))
            }
            other => Err(Error::validation(format!(
                "Invalid issue reference for {}: {}",
                field.name, other
            ))),
        }
    }
}

/// プロジェクト（キー → `{key}`）
pub struct ProjectConverter;

#[async_trait]
impl FieldConverter for ProjectConverter {
    async fn convert(&self, value: &Value, field: &FieldSchema, _ctx: &ConversionContext) -> Result<Value> {
        if value.is_null() {
            return handle_null(field);
        }
        if has_identifier(value) {
            return Ok(value.clone());
        }
        match extract_value(value) {
            Value::String(text) if !text.trim().is_empty() => Ok(json!({"key": text.trim()})),
            other => Err(Error::validation(format!(
                "Invalid project value: {} (expected a project key)",
                other
            ))),
        }
    }
}

/// 型を持たないカスタムフィールド（Parent Link など）は値をそのまま送る
pub struct AnyConverter;

#[async_trait]
impl FieldConverter for AnyConverter {
    async fn convert(&self, value: &Value, field: &FieldSchema, _ctx: &ConversionContext) -> Result<Value> {
        if value.is_null() {
            return handle_null(field);
        }
        Ok(value.clone())
    }
}
