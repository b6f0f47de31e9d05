//! 自由入力テキストを候補リスト中の一意な値に解決する
//!
//! 1. NFKC正規化と不可視文字の除去
//! 2. 大文字小文字を無視した完全一致（あれば最優先）
//! 3. 位置に依存しない近似部分一致（閾値 0.3、0 = 完全一致）
//! 4. 上位スコアが 0.1 以内に並ぶ場合は曖昧としてエラー

use serde_json::Value;
use tracing::debug;
use unicode_normalization::UnicodeNormalization;

use crate::config::AmbiguityPolicy;
use crate::error::{Error, Result};
use crate::models::{AmbiguityCandidate, LookupValue};

/// 近似一致とみなすスコアの上限
pub const FUZZY_THRESHOLD: f64 = 0.3;
/// 最良スコアとの差がこの範囲なら曖昧とみなす
pub const AMBIGUITY_MARGIN: f64 = 0.1;
/// 近似一致の最小文字数
pub const MIN_MATCH_CHARS: usize = 2;

/// 解決時の文脈（エラーメッセージ用ラベルと曖昧時のポリシー）
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    pub label: String,
    pub policy: AmbiguityPolicy,
}

impl ResolveOptions {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            policy: AmbiguityPolicy::default(),
        }
    }

    pub fn policy(mut self, policy: AmbiguityPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// 入力を正規化する（NFKC + ゼロ幅文字/BOM除去 + 前後空白除去）
pub fn sanitize_input(input: &str) -> String {
    input
        .nfkc()
        .filter(|c| !matches!(c, '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}'))
        .map(|c| if c == '\u{00A0}' { ' ' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

/// JSON値を候補リストに対して解決する
pub fn resolve_unique_name(
    input: &Value,
    candidates: &[LookupValue],
    options: &ResolveOptions,
) -> Result<LookupValue> {
    match input {
        Value::String(text) => resolve_name(text, candidates, options),
        other => Err(Error::Validation {
            message: format!(
                "Invalid {} value: expected a non-empty string, got {}",
                options.label, other
            ),
            details: crate::error::ValidationDetails {
                value: Some(other.clone()),
                ..Default::default()
            },
        }),
    }
}

/// 文字列を候補リストに対して解決する
pub fn resolve_name(
    input: &str,
    candidates: &[LookupValue],
    options: &ResolveOptions,
) -> Result<LookupValue> {
    let needle = sanitize_input(input);
    if needle.is_empty() {
        return Err(Error::Validation {
            message: format!("Empty or invalid {} value", options.label),
            details: crate::error::ValidationDetails {
                value: Some(Value::String(input.to_string())),
                ..Default::default()
            },
        });
    }
    if candidates.is_empty() {
        return Err(Error::validation(format!(
            "No {} values available to match '{}'",
            options.label, needle
        )));
    }

    let named: Vec<&LookupValue> = candidates.iter().filter(|c| !c.name.is_empty()).collect();
    let needle_lower = needle.to_lowercase();

    let exact: Vec<&LookupValue> = named
        .iter()
        .copied()
        .filter(|c| sanitize_input(&c.name).to_lowercase() == needle_lower)
        .collect();
    match exact.len() {
        0 => {}
        1 => return Ok(exact[0].clone()),
        _ if options.policy == AmbiguityPolicy::First => return Ok(exact[0].clone()),
        _ => {
            let listed: Vec<AmbiguityCandidate> = exact.iter().map(|c| (*c).into()).collect();
            return Err(Error::ambiguity(
                format!(
                    "Ambiguous {} '{}': multiple exact matches: {}. Use an explicit id instead",
                    options.label,
                    needle,
                    describe_candidates(&listed)
                ),
                listed,
            ));
        }
    }

    let mut hits: Vec<(usize, f64, &LookupValue)> = named
        .iter()
        .enumerate()
        .filter_map(|(index, candidate)| {
            fuzzy_score(&needle, &candidate.name)
                .filter(|score| *score <= FUZZY_THRESHOLD)
                .map(|score| (index, score, *candidate))
        })
        .collect();
    hits.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

    debug!(
        label = %options.label,
        input = %needle,
        hits = hits.len(),
        "fuzzy match finished"
    );

    match hits.as_slice() {
        [] => Err(Error::validation_with_available(
            format!("No {} matching '{}' found", options.label, needle),
            named.iter().map(|c| c.name.clone()).collect(),
        )),
        [(_, _, only)] => Ok((*only).clone()),
        [(_, best, first), ..] => {
            let close: Vec<AmbiguityCandidate> = hits
                .iter()
                .filter(|(_, score, _)| score - best <= AMBIGUITY_MARGIN)
                .map(|(_, score, c)| AmbiguityCandidate {
                    id: c.id.clone(),
                    name: c.name.clone(),
                    score: Some(*score),
                })
                .collect();
            if close.len() == 1 || options.policy == AmbiguityPolicy::First {
                return Ok((*first).clone());
            }
            Err(Error::ambiguity(
                format!(
                    "Ambiguous {} '{}': matches {}. Use an explicit id instead",
                    options.label,
                    needle,
                    describe_candidates(&close)
                ),
                close,
            ))
        }
    }
}

fn describe_candidates(candidates: &[AmbiguityCandidate]) -> String {
    candidates
        .iter()
        .map(|c| match c.score {
            Some(score) => format!("{} (id: {}, score: {:.2})", c.name, c.id, score),
            None => format!("{} (id: {})", c.name, c.id),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// 近似一致スコア（0 = 完全一致、1 = 不一致）
///
/// パターン全体と、パターンの各トークンを別々に照合した平均のうち良い方を返す。
/// パターンが短すぎる場合は None。
pub fn fuzzy_score(pattern: &str, text: &str) -> Option<f64> {
    let pattern = pattern.to_lowercase();
    let text = text.to_lowercase();
    if pattern.chars().count() < MIN_MATCH_CHARS || text.is_empty() {
        return None;
    }

    let whole = substring_score(&pattern, &text);
    let tokens: Vec<&str> = pattern
        .split_whitespace()
        .filter(|t| t.chars().count() >= MIN_MATCH_CHARS)
        .collect();
    if tokens.len() < 2 {
        return Some(whole);
    }
    let token_total: f64 = tokens.iter().map(|t| substring_score(t, &text)).sum();
    Some(whole.min(token_total / tokens.len() as f64))
}

/// テキスト中の任意の部分文字列に対する最小編集距離をパターン長で割った値
fn substring_score(pattern: &str, text: &str) -> f64 {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();

    // 先頭行は0（テキストのどこからでも照合を開始できる）
    let mut prev = vec![0usize; t.len() + 1];
    let mut curr = vec![0usize; t.len() + 1];
    for (i, pc) in p.iter().enumerate() {
        curr[0] = i + 1;
        for (j, tc) in t.iter().enumerate() {
            let cost = usize::from(pc != tc);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    let distance = prev.iter().copied().min().unwrap_or(p.len());
    (distance as f64 / p.len() as f64).min(1.0)
}
