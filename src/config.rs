use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::cache::MAX_TTL_SECONDS;
use crate::error::{Error, Result};

/// リトライ回数の上限
pub const MAX_RETRIES_LIMIT: u32 = 10;

/// 曖昧一致時の振る舞い
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmbiguityPolicy {
    /// 曖昧ならエラー（明確な最良候補があればそれを返す）
    #[default]
    Error,
    /// 常に先頭の候補を返す
    First,
    /// スコアで判定（明確な最良候補のみ採用）
    Score,
}

/// 曖昧一致ポリシーの設定（コンバーター単位で上書き可能）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AmbiguityPolicyConfig {
    #[serde(default)]
    pub default: AmbiguityPolicy,
    /// 型タグ（"priority", "component" など）ごとの上書き
    #[serde(default)]
    pub overrides: HashMap<String, AmbiguityPolicy>,
}

impl AmbiguityPolicyConfig {
    pub fn for_type(&self, type_tag: &str) -> AmbiguityPolicy {
        self.overrides.get(type_tag).copied().unwrap_or(self.default)
    }
}

pub fn default_parent_field_synonyms() -> Vec<String> {
    ["parent", "epic link", "epic", "parent link", "parent issue"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// フィールド解決パイプラインの設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// 曖昧一致ポリシー
    pub ambiguity_policy: AmbiguityPolicyConfig,
    /// 親フィールドの同義語（優先度順）
    pub parent_field_synonyms: Vec<String>,
    /// 課題タイプ名の略称（例: "st" → "Sub-task"）
    pub issue_type_abbreviations: HashMap<String, String>,
    /// スキーマキャッシュのTTL（秒）
    pub schema_ttl_seconds: u64,
    /// 候補リストキャッシュのTTL（秒）
    pub lookup_ttl_seconds: u64,
    /// 階層情報キャッシュのTTL（秒）
    pub hierarchy_ttl_seconds: u64,
    /// 親フィールドキャッシュのTTL（秒）
    pub parent_field_ttl_seconds: u64,
    /// 課題タイプ解決結果キャッシュのTTL（秒）
    pub issue_type_ttl_seconds: u64,
    /// 同時リクエスト数の上限
    pub max_concurrent_requests: usize,
    /// リクエストタイムアウト（ミリ秒）
    pub request_timeout_ms: u64,
    /// リトライ回数
    pub max_retries: u32,
    /// `RUST_LOG` がないときの tracing フィルター（例: "info", "jira_fields=debug"）
    pub log_level: String,
}

impl AdapterConfig {
    pub fn new() -> Self {
        Self {
            ambiguity_policy: AmbiguityPolicyConfig::default(),
            parent_field_synonyms: default_parent_field_synonyms(),
            issue_type_abbreviations: HashMap::new(),
            schema_ttl_seconds: 900,
            lookup_ttl_seconds: 900,
            hierarchy_ttl_seconds: 3600,
            parent_field_ttl_seconds: 3600,
            issue_type_ttl_seconds: 300,
            max_concurrent_requests: 8,
            request_timeout_ms: 30_000,
            max_retries: 3,
            log_level: "info".to_string(),
        }
    }

    /// 既定の曖昧一致ポリシーを設定
    pub fn ambiguity_policy(mut self, policy: AmbiguityPolicy) -> Self {
        self.ambiguity_policy.default = policy;
        self
    }

    /// 型タグ単位のポリシー上書きを追加
    pub fn ambiguity_override(mut self, type_tag: impl Into<String>, policy: AmbiguityPolicy) -> Self {
        self.ambiguity_policy.overrides.insert(type_tag.into(), policy);
        self
    }

    pub fn parent_field_synonyms(mut self, synonyms: Vec<String>) -> Self {
        self.parent_field_synonyms = synonyms;
        self
    }

    pub fn issue_type_abbreviation(mut self, abbreviation: impl Into<String>, name: impl Into<String>) -> Self {
        self.issue_type_abbreviations
            .insert(abbreviation.into(), name.into());
        self
    }

    pub fn schema_ttl_seconds(mut self, seconds: u64) -> Self {
        self.schema_ttl_seconds = seconds;
        self
    }

    pub fn max_concurrent_requests(mut self, count: usize) -> Self {
        self.max_concurrent_requests = count;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn log_level(mut self, directive: impl Into<String>) -> Self {
        self.log_level = directive.into();
        self
    }

    /// 略称を展開する（大文字小文字を無視）
    pub fn expand_issue_type_abbreviation<'a>(&'a self, name: &'a str) -> &'a str {
        let trimmed = name.trim();
        self.issue_type_abbreviations
            .iter()
            .find(|(abbreviation, _)| abbreviation.trim().eq_ignore_ascii_case(trimmed))
            .map(|(_, full)| full.as_str())
            .unwrap_or(name)
    }

    /// 設定の構造的な妥当性を検証
    pub fn validate(&self) -> Result<()> {
        if self.schema_ttl_seconds == 0 {
            return Err(Error::Configuration(
                "schema_ttl_seconds must be greater than zero".to_string(),
            ));
        }
        for (name, seconds) in [
            ("schema_ttl_seconds", self.schema_ttl_seconds),
            ("lookup_ttl_seconds", self.lookup_ttl_seconds),
            ("hierarchy_ttl_seconds", self.hierarchy_ttl_seconds),
            ("parent_field_ttl_seconds", self.parent_field_ttl_seconds),
            ("issue_type_ttl_seconds", self.issue_type_ttl_seconds),
        ] {
            if seconds > MAX_TTL_SECONDS {
                return Err(Error::Configuration(format!(
                    "{} must be at most {} (got {})",
                    name, MAX_TTL_SECONDS, seconds
                )));
            }
        }
        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(Error::Configuration(format!(
                "max_retries must be at most {} (got {})",
                MAX_RETRIES_LIMIT, self.max_retries
            )));
        }
        if let Err(e) = tracing_subscriber::EnvFilter::try_new(&self.log_level) {
            return Err(Error::Configuration(format!(
                "log_level '{}' is not a valid filter: {}",
                self.log_level, e
            )));
        }
        if self.max_concurrent_requests == 0 {
            return Err(Error::Configuration(
                "max_concurrent_requests must be greater than zero".to_string(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(Error::Configuration(
                "request_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if let Some(index) = self
            .parent_field_synonyms
            .iter()
            .position(|s| s.trim().is_empty())
        {
            return Err(Error::Configuration(format!(
                "parent_field_synonyms[{}] is empty",
                index
            )));
        }
        for (abbreviation, full) in &self.issue_type_abbreviations {
            if abbreviation.trim().is_empty() || full.trim().is_empty() {
                return Err(Error::Configuration(format!(
                    "issue_type_abbreviations entry '{}' -> '{}' is empty",
                    abbreviation, full
                )));
            }
        }
        Ok(())
    }
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// 設定ストアの抽象化トレイト
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// アダプター設定を保存
    async fn save_adapter_config(&mut self, config: &AdapterConfig) -> Result<()>;

    /// アダプター設定を読み込み
    async fn load_adapter_config(&self) -> Result<Option<AdapterConfig>>;

    /// 設定ストアを初期化
    async fn initialize(&mut self) -> Result<()>;

    /// 設定ストアをクリア
    async fn clear(&mut self) -> Result<()>;
}

/// JSON形式のファイルベース設定ストア
pub struct FileConfigStore {
    config_dir: PathBuf,
}

impl FileConfigStore {
    pub fn new<P: AsRef<Path>>(config_dir: P) -> Self {
        Self {
            config_dir: config_dir.as_ref().to_path_buf(),
        }
    }

    /// デフォルトの設定ディレクトリでファイル設定ストアを作成
    pub fn default_config_dir() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Configuration("config directory not found".to_string()))?
            .join("jira-fields");

        Ok(Self::new(config_dir))
    }

    fn adapter_config_path(&self) -> PathBuf {
        self.config_dir.join("adapter_config.json")
    }

    async fn write_json_file<T>(&self, path: &Path, data: &T) -> Result<()>
    where
        T: Serialize,
    {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Configuration(format!("cannot create {}: {}", parent.display(), e)))?;
        }

        let json_data = serde_json::to_string_pretty(data)
            .map_err(|e| Error::Configuration(format!("JSON serialization failed: {}", e)))?;

        let mut file = fs::File::create(path)
            .await
            .map_err(|e| Error::Configuration(format!("cannot write {}: {}", path.display(), e)))?;
        file.write_all(json_data.as_bytes())
            .await
            .map_err(|e| Error::Configuration(format!("cannot write {}: {}", path.display(), e)))?;
        file.sync_all()
            .await
            .map_err(|e| Error::Configuration(format!("cannot write {}: {}", path.display(), e)))?;

        Ok(())
    }

    async fn read_json_file<T>(&self, path: &Path) -> Result<Option<T>>
    where
        T: for<'de> Deserialize<'de>,
    {
        if !path.exists() {
            return Ok(None);
        }

        let mut file = fs::File::open(path)
            .await
            .map_err(|e| Error::Configuration(format!("cannot read {}: {}", path.display(), e)))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .await
            .map_err(|e| Error::Configuration(format!("cannot read {}: {}", path.display(), e)))?;

        if contents.trim().is_empty() {
            return Ok(None);
        }

        let data: T = serde_json::from_str(&contents)
            .map_err(|e| Error::Configuration(format!("JSON deserialization failed: {}", e)))?;

        Ok(Some(data))
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn save_adapter_config(&mut self, config: &AdapterConfig) -> Result<()> {
        config.validate()?;
        let path = self.adapter_config_path();
        self.write_json_file(&path, config).await
    }

    async fn load_adapter_config(&self) -> Result<Option<AdapterConfig>> {
        let path = self.adapter_config_path();
        let config: Option<AdapterConfig> = self.read_json_file(&path).await?;
        if let Some(config) = &config {
            config.validate()?;
        }
        Ok(config)
    }

    async fn initialize(&mut self) -> Result<()> {
        fs::create_dir_all(&self.config_dir)
            .await
            .map_err(|e| Error::Configuration(format!("cannot create config dir: {}", e)))?;
        Ok(())
    }

    async fn clear(&mut self) -> Result<()> {
        if self.config_dir.exists() {
            fs::remove_dir_all(&self.config_dir)
                .await
                .map_err(|e| Error::Configuration(format!("cannot remove config dir: {}", e)))?;
        }
        Ok(())
    }
}
