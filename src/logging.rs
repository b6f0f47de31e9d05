//! tracing サブスクライバーの初期化
//!
//! ライブラリ自体はサブスクライバーを登録しない。利用側のバイナリやテストが
//! 必要に応じて呼び出す。

use tracing_subscriber::EnvFilter;

use crate::config::AdapterConfig;

/// `RUST_LOG` があればそれを、なければ `default_directive` を使って初期化する
///
/// 二重初期化はエラーにせず無視する。
pub fn init_logging(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// `AdapterConfig::log_level` を既定のフィルターとして初期化する
pub fn init_logging_from_config(config: &AdapterConfig) {
    init_logging(&config.log_level);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_twice_is_harmless() {
        init_logging("jira_fields=debug");
        init_logging("jira_fields=info");
        tracing::info!("logging initialized");
    }

    #[test]
    fn test_init_logging_from_config() {
        let config = AdapterConfig::new().log_level("jira_fields=trace");
        init_logging_from_config(&config);
        tracing::debug!(level = %config.log_level, "logging initialized from config");
    }
}
