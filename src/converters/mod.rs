//! 生の入力値を Jira の送信形式に変換するコンバーター群
//!
//! `ConverterRegistry` がフィールド型タグで振り分ける。

mod array;
mod cascading;
mod context;
mod date;
mod datetime;
mod issuetype;
mod lookup;
mod passthrough;
mod registry;
mod scalar;
mod timetracking;
mod user;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::FieldSchema;

pub use array::{ArrayConverter, split_array_input};
pub use cascading::CascadingSelectConverter;
pub use context::ConversionContext;
pub use date::{DateConverter, convert_date, convert_native_date, excel_serial_to_date};
pub use datetime::{DateTimeConverter, convert_datetime, convert_native_datetime};
pub use issuetype::IssueTypeConverter;
pub use lookup::{ComponentConverter, OptionConverter, PriorityConverter, VersionConverter};
pub use passthrough::{AnyConverter, IssueLinkConverter, ProjectConverter};
pub use registry::ConverterRegistry;
pub use scalar::{NumberConverter, StringConverter};
pub use timetracking::{TimeTrackingConverter, parse_duration, seconds_to_duration};
pub use user::UserConverter;

/// 1フィールド分の値を送信形式に変換する
#[async_trait]
pub trait FieldConverter: Send + Sync {
    async fn convert(&self, value: &Value, field: &FieldSchema, ctx: &ConversionContext) -> Result<Value>;
}

/// null の共通処理（必須フィールドなら検証エラー）
pub(crate) fn handle_null(field: &FieldSchema) -> Result<Value> {
    if field.required {
        Err(Error::validation(format!("{} is required", field.name)))
    } else {
        Ok(Value::Null)
    }
}
