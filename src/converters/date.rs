use async_trait::async_trait;
use chrono::{Days, NaiveDate, NaiveTime};
use serde_json::Value;

use super::datetime::ISO_DATETIME;
use super::{ConversionContext, FieldConverter, handle_null};
use crate::error::{Error, Result};
use crate::models::FieldSchema;
use crate::normalize::extract_value;

/// 日付フィールド（`YYYY-MM-DD` で送信）
pub struct DateConverter;

#[async_trait]
impl FieldConverter for DateConverter {
    async fn convert(&self, value: &Value, field: &FieldSchema, _ctx: &ConversionContext) -> Result<Value> {
        let value = extract_value(value);
        if value.is_null() {
            return handle_null(field);
        }
        convert_date(&value).map(Value::from)
    }
}

/// ISO 日付文字列または Excel のシリアル値を `YYYY-MM-DD` にする
pub fn convert_date(value: &Value) -> Result<String> {
    match value {
        Value::String(text) => parse_iso_date(text.trim()).map(convert_native_date),
        Value::Number(n) => {
            let serial = n
                .as_f64()
                .ok_or_else(|| Error::validation(format!("Invalid Excel serial date: {}", n)))?;
            excel_serial_to_date(serial).map(convert_native_date)
        }
        other => Err(Error::validation(format!(
            "Invalid date value: {} (expected YYYY-MM-DD or an Excel serial number)",
            other
        ))),
    }
}

pub fn convert_native_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Excel のシリアル値を日付にする
///
/// Excel は 1900-02-29 を実在する日として数えるため、60 以下は `serial - 1`、
/// 61 以降は `serial - 2` 日を 1900-01-01 に足す。小数部（時刻）は切り捨てる。
pub fn excel_serial_to_date(serial: f64) -> Result<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return Err(Error::validation(format!(
            "Invalid Excel serial date: {} (must be 1 or greater)",
            serial
        )));
    }
    let whole = serial.floor() as u64;
    let offset = if whole <= 60 { whole - 1 } else { whole - 2 };

    NaiveDate::from_ymd_opt(1900, 1, 1)
        .and_then(|epoch| epoch.checked_add_days(Days::new(offset)))
        .ok_or_else(|| Error::validation(format!("Excel serial date out of range: {}", serial)))
}

/// `YYYY-MM-DD` の日付部分を取り出す
///
/// 続きは ISO 8601 の時刻・タイムゾーンのみ許可し、時刻も実在するものに限る。
fn parse_iso_date(text: &str) -> Result<NaiveDate> {
    let captures = ISO_DATETIME.captures(text).ok_or_else(|| {
        Error::validation(format!(
            "Invalid date format: '{}' (expected YYYY-MM-DD)",
            text
        ))
    })?;
    let number = |index: usize| -> u32 {
        captures
            .get(index)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0)
    };

    let year: i32 = captures[1].parse().unwrap_or_default();
    let date = NaiveDate::from_ymd_opt(year, number(2), number(3))
        .ok_or_else(|| Error::validation(format!("Invalid calendar date: '{}'", text)))?;
    NaiveTime::from_hms_opt(number(4), number(5), number(6))
        .ok_or_else(|| Error::validation(format!("Invalid time of day: '{}'", text)))?;
    Ok(date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_iso_dates() {
        assert_eq!(convert_date(&json!("2024-02-29")).unwrap(), "2024-02-29");
        assert_eq!(convert_date(&json!("2024-03-15T10:30:00Z")).unwrap(), "2024-03-15");
        assert_eq!(convert_date(&json!(" 2024-03-15 ")).unwrap(), "2024-03-15");
    }

    #[test]
    fn test_invalid_calendar_dates_rejected() {
        assert!(convert_date(&json!("2024-06-31")).is_err());
        assert!(convert_date(&json!("2023-02-29")).is_err());
        assert!(convert_date(&json!("2024-13-01")).is_err());
    }

    #[test]
    fn test_non_iso_formats_rejected() {
        assert!(convert_date(&json!("03/15/2024")).is_err());
        assert!(convert_date(&json!("2024-03")).is_err());
        assert!(convert_date(&json!("2024")).is_err());
        assert!(convert_date(&json!("2024-03-15abc")).is_err());
        assert!(convert_date(&json!(true)).is_err());
    }

    #[test]
    fn test_trailing_text_must_be_iso_time() {
        // 時刻・タイムゾーン以外の続きは切り捨てずにエラー
        assert!(convert_date(&json!("2024-03-15 not a date")).is_err());
        assert!(convert_date(&json!("2024-03-15Tgarbage")).is_err());
        assert!(convert_date(&json!("2024-03-15T25:00")).is_err());

        assert_eq!(convert_date(&json!("2024-03-15 10:30")).unwrap(), "2024-03-15");
        assert_eq!(convert_date(&json!("2024-03-15T23:59:59.123+09:00")).unwrap(), "2024-03-15");
    }

    #[test]
    fn test_excel_serial_boundaries() {
        assert_eq!(convert_date(&json!(1)).unwrap(), "1900-01-01");
        assert_eq!(convert_date(&json!(59)).unwrap(), "1900-02-28");
        assert_eq!(convert_date(&json!(61)).unwrap(), "1900-03-01");
        assert_eq!(convert_date(&json!(45306)).unwrap(), "2024-01-15");
        assert_eq!(convert_date(&json!(45306.75)).unwrap(), "2024-01-15");
    }

    #[test]
    fn test_excel_serial_below_one_rejected() {
        assert!(convert_date(&json!(0)).is_err());
        assert!(convert_date(&json!(-5)).is_err());
    }

    #[test]
    fn test_native_date() {
        let date = NaiveDate::from_ymd_opt(2024, 7, 4).unwrap();
        assert_eq!(convert_native_date(date), "2024-07-04");
    }
}
