use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

use super::{ConversionContext, FieldConverter, handle_null};
use crate::error::{Error, Result};
use crate::models::FieldSchema;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
/// 1日 = 8時間
const DAY: u64 = 8 * HOUR;
/// 1週 = 5日
const WEEK: u64 = 5 * DAY;

const ESTIMATE_KEYS: [&str; 2] = ["originalEstimate", "remainingEstimate"];

static NATIVE_DURATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+[wdhm](?:\s+\d+[wdhm])*$").expect("valid duration pattern"));

static HUMAN_COMPONENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?)\s*(weeks?|wks?|w|days?|d|hours?|hrs?|h|minutes?|mins?|m)\b")
        .expect("valid duration pattern")
});

static HUMAN_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[\s,]|and)*$").expect("valid separator pattern"));

/// 時間管理フィールド（見積もり）
///
/// 仮想フィールド（`timetracking.originalEstimate` など）では期間文字列を、
/// 親フィールドでは `{originalEstimate, remainingEstimate}` を返す。
pub struct TimeTrackingConverter;

#[async_trait]
impl FieldConverter for TimeTrackingConverter {
    async fn convert(&self, value: &Value, field: &FieldSchema, _ctx: &ConversionContext) -> Result<Value> {
        if value.is_null() {
            return handle_null(field);
        }
        if field.is_virtual() {
            return convert_estimate(value).map(Value::from);
        }

        match value {
            Value::Object(map) => {
                let mut converted = Map::new();
                for key in ESTIMATE_KEYS {
                    match map.get(key) {
                        None | Some(Value::Null) => {}
                        Some(estimate) => {
                            let duration = convert_estimate(estimate)
                                .map_err(|err| prefix_error(err, key))?;
                            converted.insert(key.to_string(), Value::from(duration));
                        }
                    }
                }
                if converted.is_empty() {
                    return Err(Error::validation(format!(
                        "Time tracking object must contain {}",
                        ESTIMATE_KEYS.join(" or ")
                    )));
                }
                Ok(Value::Object(converted))
            }
            scalar => {
                let duration = convert_estimate(scalar)?;
                let mut converted = Map::new();
                converted.insert(ESTIMATE_KEYS[0].to_string(), Value::from(duration));
                Ok(Value::Object(converted))
            }
        }
    }
}

fn prefix_error(err: Error, key: &str) -> Error {
    match err {
        Error::Validation { message, details } => Error::Validation {
            message: format!("{}: {}", key, message),
            details,
        },
        other => other,
    }
}

/// 秒数または期間文字列を Jira の期間表記にする
fn convert_estimate(value: &Value) -> Result<String> {
    match value {
        Value::Number(n) => match (n.as_u64(), n.as_f64()) {
            (Some(seconds), _) => Ok(seconds_to_duration(seconds)),
            (None, Some(seconds)) if seconds.is_finite() && seconds >= 0.0 => {
                Ok(seconds_to_duration(seconds.floor() as u64))
            }
            _ => Err(Error::validation(format!(
                "Invalid time estimate: {} (seconds must be non-negative)",
                n
            ))),
        },
        Value::String(text) => parse_duration(text),
        other => Err(Error::validation(format!(
            "Invalid time estimate: {} (expected a duration like '2h 30m' or seconds)",
            other
        ))),
    }
}

/// 期間文字列を Jira の表記（`1w 2d 3h 4m`）にする
///
/// ネイティブ表記はそのまま、数字のみは秒数、"2 hours" のような表現は変換する。
pub fn parse_duration(text: &str) -> Result<String> {
    let normalized = text.trim().to_lowercase();
    let invalid = || {
        Error::validation(format!(
            "Invalid time estimate: '{}' (expected a duration like '2h 30m', '2 hours' or seconds)",
            text
        ))
    };

    if normalized.is_empty() {
        return Err(invalid());
    }
    if NATIVE_DURATION.is_match(&normalized) {
        return Ok(normalized.split_whitespace().collect::<Vec<_>>().join(" "));
    }
    if normalized.chars().all(|c| c.is_ascii_digit()) {
        let seconds = normalized.parse::<u64>().map_err(|_| invalid())?;
        return Ok(seconds_to_duration(seconds));
    }

    let mut components = Vec::new();
    let mut total_seconds = 0f64;
    let mut all_integral = true;
    for captures in HUMAN_COMPONENT.captures_iter(&normalized) {
        let amount: f64 = captures[1].parse().map_err(|_| invalid())?;
        let (unit, unit_seconds) = match captures[2].chars().next() {
            Some('w') => ('w', WEEK),
            Some('d') => ('d', DAY),
            Some('h') => ('h', HOUR),
            _ => ('m', MINUTE),
        };
        all_integral &= amount.fract() == 0.0;
        total_seconds += amount * unit_seconds as f64;
        components.push((amount, unit));
    }

    let leftover = HUMAN_COMPONENT.replace_all(&normalized, "");
    if components.is_empty() || !HUMAN_SEPARATORS.is_match(&leftover) {
        return Err(invalid());
    }

    if all_integral {
        Ok(components
            .iter()
            .map(|(amount, unit)| format!("{}{}", *amount as u64, unit))
            .collect::<Vec<_>>()
            .join(" "))
    } else {
        Ok(seconds_to_duration(total_seconds.round() as u64))
    }
}

/// 秒数を作業カレンダー（1日8時間・週5日）で期間表記にする
pub fn seconds_to_duration(seconds: u64) -> String {
    let mut remaining = seconds / MINUTE * MINUTE;
    if remaining == 0 {
        return "0m".to_string();
    }

    let mut parts = Vec::new();
    for (unit, unit_seconds) in [('w', WEEK), ('d', DAY), ('h', HOUR), ('m', MINUTE)] {
        let count = remaining / unit_seconds;
        if count > 0 {
            parts.push(format!("{}{}", count, unit));
            remaining -= count * unit_seconds;
        }
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converters::tests::{StaticClient, context};
    use crate::models::{FieldType, VirtualFieldRef};
    use serde_json::json;

    #[test]
    fn test_native_durations_pass_through() {
        assert_eq!(parse_duration("2h 30m").unwrap(), "2h 30m");
        assert_eq!(parse_duration(" 1W  2D ").unwrap(), "1w 2d");
    }

    #[test]
    fn test_human_phrases() {
        assert_eq!(parse_duration("2 hours").unwrap(), "2h");
        assert_eq!(parse_duration("30 minutes").unwrap(), "30m");
        assert_eq!(parse_duration("1 day, 4 hours and 15 mins").unwrap(), "1d 4h 15m");
        assert_eq!(parse_duration("1.5 hours").unwrap(), "1h 30m");
    }

    #[test]
    fn test_invalid_durations() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("2 hours maybe").is_err());
    }

    #[test]
    fn test_seconds_to_duration_work_calendar() {
        assert_eq!(seconds_to_duration(0), "0m");
        assert_eq!(seconds_to_duration(3600), "1h");
        assert_eq!(seconds_to_duration(28800), "1d");
        assert_eq!(seconds_to_duration(144000), "1w");
        assert_eq!(seconds_to_duration(144000 + 28800 + 5400), "1w 1d 1h 30m");
        assert_eq!(parse_duration("7200").unwrap(), "2h");
    }

    #[tokio::test]
    async fn test_parent_field_object_and_scalar() {
        let field = FieldSchema::new("timetracking", "Time tracking", FieldType::TimeTracking);
        let ctx = context(StaticClient::empty());

        let converted = TimeTrackingConverter
            .convert(&json!({"originalEstimate": 7200, "remainingEstimate": "30 minutes"}), &field, &ctx)
            .await
            .unwrap();
        assert_eq!(converted, json!({"originalEstimate": "2h", "remainingEstimate": "30m"}));

        let scalar = TimeTrackingConverter.convert(&json!("3d"), &field, &ctx).await.unwrap();
        assert_eq!(scalar, json!({"originalEstimate": "3d"}));

        assert!(
            TimeTrackingConverter
                .convert(&json!({"spent": "1h"}), &field, &ctx)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_virtual_field_returns_duration() {
        let mut field = FieldSchema::new("timetracking.remainingEstimate", "Remaining Estimate", FieldType::TimeTracking);
        field.virtual_of = Some(VirtualFieldRef {
            parent_id: "timetracking".to_string(),
            property_path: "remainingEstimate".to_string(),
        });
        let ctx = context(StaticClient::empty());

        let converted = TimeTrackingConverter.convert(&json!(0), &field, &ctx).await.unwrap();
        assert_eq!(converted, json!("0m"));
    }
}
