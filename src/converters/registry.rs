use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{
    AnyConverter, ArrayConverter, CascadingSelectConverter, ComponentConverter, ConversionContext,
    DateConverter, DateTimeConverter, FieldConverter, IssueLinkConverter, IssueTypeConverter,
    NumberConverter, OptionConverter, PriorityConverter, ProjectConverter, StringConverter,
    TimeTrackingConverter, UserConverter, VersionConverter,
};
use crate::error::{Error, Result};
use crate::models::{FieldSchema, FieldType, ProjectSchema};

/// 型タグ → コンバーターの対応表
///
/// クローンは同じ表を共有する。
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    converters: Arc<HashMap<String, Arc<dyn FieldConverter>>>,
}

impl ConverterRegistry {
    /// 空のレジストリ
    pub fn new() -> Self {
        Self::default()
    }

    /// 組み込みコンバーターを登録したレジストリ
    pub fn with_defaults() -> Self {
        Self::new()
            .register(FieldType::String, StringConverter)
            .register(FieldType::Number, NumberConverter)
            .register(FieldType::Date, DateConverter)
            .register(FieldType::DateTime, DateTimeConverter)
            .register(FieldType::User, UserConverter)
            .register(FieldType::Priority, PriorityConverter)
            .register(FieldType::SelectOption, OptionConverter)
            .register(FieldType::CascadingOption, CascadingSelectConverter)
            .register(FieldType::Component, ComponentConverter)
            .register(FieldType::Version, VersionConverter)
            .register(FieldType::Array, ArrayConverter)
            .register(FieldType::TimeTracking, TimeTrackingConverter)
            .register(FieldType::IssueType, IssueTypeConverter)
            .register(FieldType::Project, ProjectConverter)
            .register(FieldType::IssueLink, IssueLinkConverter)
            .register(FieldType::Any, AnyConverter)
    }

    /// コンバーターを登録（同じ型タグは置き換え）
    pub fn register<C>(mut self, field_type: FieldType, converter: C) -> Self
    where
        C: FieldConverter + 'static,
    {
        Arc::make_mut(&mut self.converters).insert(field_type.as_str().to_string(), Arc::new(converter));
        self
    }

    pub fn get(&self, field_type: &FieldType) -> Option<Arc<dyn FieldConverter>> {
        self.converters.get(field_type.as_str()).cloned()
    }

    pub fn contains(&self, field_type: &FieldType) -> bool {
        self.converters.contains_key(field_type.as_str())
    }

    /// 1値を変換する（未登録の型はそのまま通す）
    pub async fn convert(&self, value: &Value, field: &FieldSchema, ctx: &ConversionContext) -> Result<Value> {
        match self.get(&field.field_type) {
            Some(converter) => converter.convert(value, field, ctx).await,
            None => {
                warn!(
                    field = %field.id,
                    field_type = %field.field_type,
                    "no converter registered, passing value through"
                );
                Ok(value.clone())
            }
        }
    }

    /// フィールドID → 生の値のマップを変換する
    ///
    /// null は省略、`project` と `issuetype` はそのまま通す。
    /// 変換エラーにはフィールド情報を付与する。
    pub async fn convert_fields(
        &self,
        schema: &ProjectSchema,
        raw_fields: &Map<String, Value>,
        ctx: &ConversionContext,
    ) -> Result<Map<String, Value>> {
        let ctx = if ctx.registry.is_some() {
            ctx.clone()
        } else {
            ctx.clone().with_registry(self.clone())
        };

        let mut converted = Map::new();
        for (field_id, value) in raw_fields {
            if value.is_null() {
                debug!(field = %field_id, "skipping null value");
                continue;
            }
            if matches!(field_id.as_str(), "project" | "issuetype") {
                converted.insert(field_id.clone(), value.clone());
                continue;
            }

            let field = schema.field(field_id).ok_or_else(|| {
                Error::validation_with_available(
                    format!(
                        "Field '{}' is not available for {} / {}",
                        field_id, schema.project_key, schema.issue_type
                    ),
                    schema.field_names(),
                )
            })?;

            let wire = self
                .convert(value, field, &ctx)
                .await
                .map_err(|err| err.with_field_context(&field.id, &field.name, value))?;
            if !wire.is_null() {
                converted.insert(field_id.clone(), wire);
            }
        }
        Ok(converted)
    }
}

impl std::fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<_> = self.converters.keys().collect();
        types.sort();
        f.debug_struct("ConverterRegistry").field("types", &types).finish()
    }
}
