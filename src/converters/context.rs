use std::sync::Arc;

use super::ConverterRegistry;
use crate::cache::LookupCache;
use crate::client::HttpClient;
use crate::config::{AdapterConfig, AmbiguityPolicy};
use crate::hierarchy::JpoHierarchyDiscovery;
use crate::resolver::ResolveOptions;

/// 変換時に各コンバーターへ渡す依存関係
///
/// キャッシュや階層情報は無くても変換できる（その場合はスキーマの
/// 許可値やリモートAPIにフォールバックする）。
#[derive(Clone)]
pub struct ConversionContext {
    pub project_key: String,
    pub issue_type: String,
    pub base_url: String,
    /// 課題タイプ解決時に絞り込む階層レベル
    pub hierarchy_level: Option<u32>,
    pub lookup_cache: Option<LookupCache>,
    pub http_client: Arc<dyn HttpClient>,
    pub config: Arc<AdapterConfig>,
    /// 配列要素の変換に使うレジストリ
    pub registry: Option<ConverterRegistry>,
    pub hierarchy: Option<JpoHierarchyDiscovery>,
}

impl ConversionContext {
    pub fn new(
        project_key: impl Into<String>,
        issue_type: impl Into<String>,
        http_client: Arc<dyn HttpClient>,
    ) -> Self {
        Self {
            project_key: project_key.into(),
            issue_type: issue_type.into(),
            base_url: http_client.base_url().to_string(),
            hierarchy_level: None,
            lookup_cache: None,
            http_client,
            config: Arc::new(AdapterConfig::default()),
            registry: None,
            hierarchy: None,
        }
    }

    pub fn with_cache(mut self, cache: LookupCache) -> Self {
        self.lookup_cache = Some(cache);
        self
    }

    pub fn with_config(mut self, config: Arc<AdapterConfig>) -> Self {
        self.config = config;
        self
    }

    pub fn with_registry(mut self, registry: ConverterRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_hierarchy(mut self, hierarchy: JpoHierarchyDiscovery) -> Self {
        self.hierarchy = Some(hierarchy);
        self
    }

    pub fn hierarchy_level(mut self, level: u32) -> Self {
        self.hierarchy_level = Some(level);
        self
    }

    pub fn policy_for(&self, type_tag: &str) -> AmbiguityPolicy {
        self.config.ambiguity_policy.for_type(type_tag)
    }

    /// 名前解決用のオプション（ラベルと型ごとのポリシー）
    pub fn resolve_options(&self, label: &str, type_tag: &str) -> ResolveOptions {
        ResolveOptions::new(label).policy(self.policy_for(type_tag))
    }
}

impl std::fmt::Debug for ConversionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionContext")
            .field("project_key", &self.project_key)
            .field("issue_type", &self.issue_type)
            .field("base_url", &self.base_url)
            .field("hierarchy_level", &self.hierarchy_level)
            .field("has_cache", &self.lookup_cache.is_some())
            .field("has_registry", &self.registry.is_some())
            .finish()
    }
}
