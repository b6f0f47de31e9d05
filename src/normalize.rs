//! フィールド名の正規化と、単一キーのラッパーオブジェクトからの値の取り出し

use serde_json::Value;

/// 識別子を表すキー（これを持つオブジェクトは解決済みとみなす）
pub const IDENTIFIER_KEYS: [&str; 3] = ["id", "accountId", "key"];

/// フィールド名を比較用トークンに正規化する
///
/// 小文字化し、空白・`_`・`-`・`/` を除去する。
/// `"Issue Type"` と `"issue_type"` はどちらも `"issuetype"` になる。
pub fn normalize_field_name(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '_' | '-' | '/'))
        .flat_map(char::to_lowercase)
        .collect()
}

/// オブジェクトが識別子キーを持つか
pub fn has_identifier(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|map| IDENTIFIER_KEYS.iter().any(|key| map.contains_key(*key)))
}

/// `{name: "Bug"}` のような単一キーのラッパーをプリミティブに展開する
///
/// 配列・識別子付きオブジェクト・複数キーのオブジェクト・値がオブジェクトの
/// ものはそのまま返す。
pub fn extract_value(value: &Value) -> Value {
    let Some(map) = value.as_object() else {
        return value.clone();
    };
    if has_identifier(value) || map.len() != 1 {
        return value.clone();
    }
    match map.values().next() {
        Some(inner) if !inner.is_object() && !inner.is_array() => inner.clone(),
        _ => value.clone(),
    }
}
