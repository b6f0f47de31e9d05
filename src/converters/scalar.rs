use async_trait::async_trait;
use serde_json::{Number, Value};

use super::{ConversionContext, FieldConverter, handle_null};
use crate::error::{Error, Result};
use crate::models::FieldSchema;
use crate::normalize::extract_value;

/// 文字列フィールド（数値・真偽値は文字列化）
pub struct StringConverter;

#[async_trait]
impl FieldConverter for StringConverter {
    async fn convert(&self, value: &Value, field: &FieldSchema, _ctx: &ConversionContext) -> Result<Value> {
        match extract_value(value) {
            Value::Null => handle_null(field),
            Value::String(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() && field.required {
                    return Err(Error::validation(format!("{} is required", field.name)));
                }
                Ok(Value::from(trimmed))
            }
            Value::Number(n) => Ok(Value::from(n.to_string())),
            Value::Bool(b) => Ok(Value::from(b.to_string())),
            other => Err(Error::validation(format!(
                "Expected text for {}, got {}",
                field.name, other
            ))),
        }
    }
}

/// 数値フィールド（数値文字列も受け付ける）
pub struct NumberConverter;

#[async_trait]
impl FieldConverter for NumberConverter {
    async fn convert(&self, value: &Value, field: &FieldSchema, _ctx: &ConversionContext) -> Result<Value> {
        match extract_value(value) {
            Value::Null => handle_null(field),
            Value::Number(n) => Ok(Value::Number(n)),
            Value::String(text) if text.trim().is_empty() => handle_null(field),
            Value::String(text) => parse_number(text.trim()).ok_or_else(|| {
                Error::validation(format!("Invalid number for {}: '{}'", field.name, text))
            }),
            other => Err(Error::validation(format!(
                "Expected a number for {}, got {}",
                field.name, other
            ))),
        }
    }
}

fn parse_number(text: &str) -> Option<Value> {
    if let Ok(integer) = text.parse::<i64>() {
        return Some(Value::from(integer));
    }
    let float = text.parse::<f64>().ok()?;
    Number::from_f64(float).map(Value::Number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converters::tests::{StaticClient, context};
    use crate::models::FieldType;
    use serde_json::json;

    #[tokio::test]
    async fn test_string_converter() {
        let field = FieldSchema::new("summary", "Summary", FieldType::String).required(true);
        let ctx = context(StaticClient::empty());

        assert_eq!(StringConverter.convert(&json!(" hi "), &field, &ctx).await.unwrap(), json!("hi"));
        assert_eq!(StringConverter.convert(&json!(42), &field, &ctx).await.unwrap(), json!("42"));
        assert!(StringConverter.convert(&json!("  "), &field, &ctx).await.is_err());
        assert!(StringConverter.convert(&json!(["a"]), &field, &ctx).await.is_err());
        assert!(StringConverter.convert(&Value::Null, &field, &ctx).await.is_err());
    }

    #[tokio::test]
    async fn test_number_converter() {
        let field = FieldSchema::new("customfield_10016", "Story Points", FieldType::Number);
        let ctx = context(StaticClient::empty());

        assert_eq!(NumberConverter.convert(&json!(5), &field, &ctx).await.unwrap(), json!(5));
        assert_eq!(NumberConverter.convert(&json!("3"), &field, &ctx).await.unwrap(), json!(3));
        assert_eq!(NumberConverter.convert(&json!(" 2.5 "), &field, &ctx).await.unwrap(), json!(2.5));
        assert_eq!(NumberConverter.convert(&json!(""), &field, &ctx).await.unwrap(), Value::Null);
        assert!(NumberConverter.convert(&json!("NaN"), &field, &ctx).await.is_err());
        assert!(NumberConverter.convert(&json!("five"), &field, &ctx).await.is_err());
    }
}
