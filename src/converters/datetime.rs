use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use super::{ConversionContext, FieldConverter, handle_null};
use crate::error::{Error, Result};
use crate::models::FieldSchema;
use crate::normalize::extract_value;

/// これ未満の数値は秒、以上はミリ秒として扱う
const SECONDS_THRESHOLD: f64 = 10_000_000_000.0;

pub(super) static ISO_DATETIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(\d{4})-(\d{2})-(\d{2})(?:[T ](\d{2}):(\d{2})(?::(\d{2})(?:\.(\d{1,9}))?)?)?\s*(Z|[+-]\d{2}:?\d{2})?$",
    )
    .expect("valid datetime pattern")
});

/// 日時フィールド（`YYYY-MM-DDTHH:mm:ss.sss+0000` で送信）
pub struct DateTimeConverter;

#[async_trait]
impl FieldConverter for DateTimeConverter {
    async fn convert(&self, value: &Value, field: &FieldSchema, _ctx: &ConversionContext) -> Result<Value> {
        let value = extract_value(value);
        if value.is_null() {
            return handle_null(field);
        }
        convert_datetime(&value).map(Value::from)
    }
}

/// ISO 文字列または Unix タイムスタンプを UTC の送信形式にする
pub fn convert_datetime(value: &Value) -> Result<String> {
    let instant = match value {
        Value::Number(n) => {
            let raw = n
                .as_f64()
                .ok_or_else(|| Error::validation(format!("Invalid timestamp: {}", n)))?;
            from_timestamp(raw)?
        }
        Value::String(text) => parse_iso_datetime(text.trim())?,
        other => {
            return Err(Error::validation(format!(
                "Invalid datetime value: {} (expected ISO 8601 or a Unix timestamp)",
                other
            )));
        }
    };
    Ok(convert_native_datetime(&instant))
}

pub fn convert_native_datetime<Tz: TimeZone>(instant: &DateTime<Tz>) -> String {
    instant
        .with_timezone(&Utc)
        .format("%Y-%m-%dT%H:%M:%S%.3f+0000")
        .to_string()
}

fn from_timestamp(raw: f64) -> Result<DateTime<Utc>> {
    if !raw.is_finite() {
        return Err(Error::validation(format!("Invalid timestamp: {}", raw)));
    }
    let millis = if raw.abs() < SECONDS_THRESHOLD {
        (raw * 1000.0).round()
    } else {
        raw.round()
    };
    DateTime::from_timestamp_millis(millis as i64)
        .ok_or_else(|| Error::validation(format!("Timestamp out of range: {}", raw)))
}

fn parse_iso_datetime(text: &str) -> Result<DateTime<Utc>> {
    let invalid = || {
        Error::validation(format!(
            "Invalid datetime format: '{}' (expected ISO 8601, e.g. 2024-03-15T10:30:00Z)",
            text
        ))
    };
    let captures = ISO_DATETIME.captures(text).ok_or_else(invalid)?;

    let number = |index: usize| -> u32 {
        captures
            .get(index)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0)
    };
    let year = captures[1].parse::<i32>().map_err(|_| invalid())?;
    let date = NaiveDate::from_ymd_opt(year, number(2), number(3)).ok_or_else(invalid)?;

    let millis = captures
        .get(7)
        .map(|fraction| {
            let digits: String = fraction.as_str().chars().chain("000".chars()).take(3).collect();
            digits.parse::<u32>().unwrap_or(0)
        })
        .unwrap_or(0);
    let time = NaiveTime::from_hms_milli_opt(number(4), number(5), number(6), millis).ok_or_else(invalid)?;
    let local = date.and_time(time);

    let offset = match captures.get(8).map(|m| m.as_str()) {
        None | Some("Z") => FixedOffset::east_opt(0),
        Some(zone) => parse_offset(zone),
    }
    .ok_or_else(invalid)?;

    offset
        .from_local_datetime(&local)
        .single()
        .map(|instant| instant.with_timezone(&Utc))
        .ok_or_else(invalid)
}

/// `+09:00` / `-0530` を FixedOffset にする
fn parse_offset(zone: &str) -> Option<FixedOffset> {
    let sign = if zone.starts_with('-') { -1 } else { 1 };
    let digits: String = zone[1..].chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() != 4 {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
