use async_trait::async_trait;
use serde_json::{Value, json};

use super::lookup::enrich_not_found;
use super::{ConversionContext, FieldConverter, handle_null};
use crate::error::{Error, Result};
use crate::models::{AllowedValue, FieldSchema, LookupValue};
use crate::normalize::{extract_value, has_identifier};
use crate::resolver::resolve_unique_name;

const SEPARATOR: &str = "->";

/// 連動選択リスト（親 → 子）
///
/// `"Hardware -> Keyboard"` または `{value, child}` を受け取り、
/// `{id, child: {id}}` を返す。
pub struct CascadingSelectConverter;

#[async_trait]
impl FieldConverter for CascadingSelectConverter {
    async fn convert(&self, value: &Value, field: &FieldSchema, ctx: &ConversionContext) -> Result<Value> {
        if value.is_null() {
            return handle_null(field);
        }
        if has_identifier(value) {
            return Ok(value.clone());
        }

        let (parent_input, child_input) = split_input(value)?;
        let options = field.allowed_values.as_deref().unwrap_or(&[]);
        if options.is_empty() {
            return Err(Error::validation(format!(
                "No allowed options are available for {}",
                field.name
            )));
        }

        let parents: Vec<LookupValue> = options.iter().map(AllowedValue::to_lookup).collect();
        let resolve = ctx.resolve_options("option", "option-with-child");
        let parent = resolve_unique_name(&parent_input, &parents, &resolve)
            .map_err(|err| enrich_not_found(err, "option", &parents))?;

        let Some(child_input) = child_input else {
            return Ok(json!({"id": parent.id}));
        };

        let children: Vec<LookupValue> = options
            .iter()
            .find(|option| option.id == parent.id)
            .and_then(|option| option.children.as_deref())
            .unwrap_or(&[])
            .iter()
            .map(AllowedValue::to_lookup)
            .collect();
        if children.is_empty() {
            return Err(Error::validation(format!(
                "Option '{}' of {} has no child options",
                parent.name, field.name
            )));
        }
        let child = resolve_unique_name(&child_input, &children, &resolve)
            .map_err(|err| enrich_not_found(err, "child option", &children))?;

        Ok(json!({"id": parent.id, "child": {"id": child.id}}))
    }
}

/// 親と子の入力値に分ける
fn split_input(value: &Value) -> Result<(Value, Option<Value>)> {
    match value {
        Value::String(text) => match text.split_once(SEPARATOR) {
            Some((parent, child)) => Ok((Value::from(parent.trim()), Some(Value::from(child.trim())))),
            None => Ok((Value::from(text.trim()), None)),
        },
        Value::Object(map) if map.contains_key("child") => {
            let parent = map
                .get("value")
                .or_else(|| map.get("name"))
                .cloned()
                .ok_or_else(|| Error::validation("Cascading select object requires 'value' and 'child'"))?;
            let child = map.get("child").map(extract_value).filter(|child| !child.is_null());
            Ok((parent, child))
        }
        other => Ok((extract_value(other), None)),
    }
}
