use async_trait::async_trait;
use serde_json::Value;

use super::{ConversionContext, FieldConverter, handle_null};
use crate::error::{Error, Result};
use crate::models::FieldSchema;

/// 配列フィールド（要素は `schema.items` の型のコンバーターに委譲）
pub struct ArrayConverter;

#[async_trait]
impl FieldConverter for ArrayConverter {
    async fn convert(&self, value: &Value, field: &FieldSchema, ctx: &ConversionContext) -> Result<Value> {
        if value.is_null() {
            return handle_null(field);
        }

        let items = split_array_input(value);
        if items.is_empty() && field.required {
            return Err(Error::validation(format!("{} requires at least one value", field.name)));
        }

        let item_type = field.items_type().ok_or_else(|| {
            Error::validation(format!("{} has no item type in its schema", field.name))
        })?;
        let registry = ctx.registry.as_ref().ok_or_else(|| {
            Error::validation(format!(
                "Cannot convert {}: no converter registry available for array items",
                field.name
            ))
        })?;
        let converter = registry.get(&item_type).ok_or_else(|| {
            Error::validation(format!(
                "Cannot convert {}: no converter registered for item type '{}'",
                field.name, item_type
            ))
        })?;

        let item_schema = field.item_schema(item_type);
        let mut converted = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let wire = converter
                .convert(item, &item_schema, ctx)
                .await
                .map_err(|err| wrap_item_error(err, index))?;
            converted.push(wire);
        }
        Ok(Value::Array(converted))
    }
}

/// 配列入力を要素に分ける
///
/// 文字列はカンマ区切りとして分割し、前後の空白を除いて空要素を捨てる。
/// 配列以外の値は1要素として扱う。
pub fn split_array_input(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.iter().filter(|item| !item.is_null()).cloned().collect(),
        Value::String(text) => text
            .split(',')
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .map(Value::from)
            .collect(),
        other => vec![other.clone()],
    }
}

fn wrap_item_error(err: Error, index: usize) -> Error {
    match err {
        Error::Validation { message, details } => Error::Validation {
            message: format!("Item {}: {}", index, message),
            details,
        },
        Error::Ambiguity { message, details } => Error::Ambiguity {
            message: format!("Item {}: {}", index, message),
            details,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converters::ConverterRegistry;
    use crate::converters::tests::{StaticClient, context};
    use crate::models::{AllowedValue, FieldType};
    use serde_json::json;

    fn labels_field() -> FieldSchema {
        FieldSchema::new("labels", "Labels", FieldType::Array).items("string")
    }

    #[test]
    fn test_split_csv_drops_empty_segments() {
        assert_eq!(split_array_input(&json!("bug,,frontend,")), vec![json!("bug"), json!("frontend")]);
        assert_eq!(split_array_input(&json!(" a , b ")), vec![json!("a"), json!("b")]);
        assert!(split_array_input(&json!(",,")).is_empty());
    }

    #[tokio::test]
    async fn test_csv_and_native_arrays() {
        let ctx = context(StaticClient::empty()).with_registry(ConverterRegistry::with_defaults());
        let field = labels_field();

        let from_csv = ArrayConverter.convert(&json!("bug,,frontend,"), &field, &ctx).await.unwrap();
        let from_array = ArrayConverter.convert(&json!(["bug", "frontend"]), &field, &ctx).await.unwrap();

        assert_eq!(from_csv, json!(["bug", "frontend"]));
        assert_eq!(from_array, from_csv);
    }

    #[tokio::test]
    async fn test_missing_registry_item_type_or_converter() {
        let field = labels_field();
        let no_registry = context(StaticClient::empty());
        assert!(ArrayConverter.convert(&json!("a"), &field, &no_registry).await.unwrap_err().is_validation());

        let ctx = context(StaticClient::empty()).with_registry(ConverterRegistry::with_defaults());
        let no_items = FieldSchema::new("labels", "Labels", FieldType::Array);
        assert!(ArrayConverter.convert(&json!("a"), &no_items, &ctx).await.unwrap_err().is_validation());

        let empty_registry = context(StaticClient::empty()).with_registry(ConverterRegistry::new());
        assert!(ArrayConverter.convert(&json!("a"), &field, &empty_registry).await.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn test_item_error_carries_index() {
        let ctx = context(StaticClient::empty()).with_registry(ConverterRegistry::with_defaults());
        let field = FieldSchema::new("components", "Components", FieldType::Array)
            .items("component")
            .allowed_values(vec![AllowedValue::new("100", "Backend"), AllowedValue::new("101", "Frontend")]);

        let err = ArrayConverter
            .convert(&json!(["Backend", "Mobile"]), &field, &ctx)
            .await
            .unwrap_err();

        assert!(err.is_validation());
        assert!(err.to_string().starts_with("Item 1:"), "{}", err);
    }

    #[tokio::test]
    async fn test_component_items_resolved() {
        let ctx = context(StaticClient::empty()).with_registry(ConverterRegistry::with_defaults());
        let field = FieldSchema::new("components", "Components", FieldType::Array)
            .items("component")
            .allowed_values(vec![AllowedValue::new("100", "Backend"), AllowedValue::new("101", "Frontend")]);

        let converted = ArrayConverter
            .convert(&json!(["backend", {"id": "101"}]), &field, &ctx)
            .await
            .unwrap();
        assert_eq!(converted, json!([{"id": "100"}, {"id": "101"}]));
    }
}
