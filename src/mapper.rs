//! 入力行（人間向けのフィールド名と値）を課題作成APIの `fields` に変換する

use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::{debug, info};

use crate::cache::LookupCache;
use crate::client::HttpClient;
use crate::config::AdapterConfig;
use crate::converters::{ConversionContext, ConverterRegistry, FieldConverter, IssueTypeConverter};
use crate::error::{Error, Result};
use crate::field_resolver::FieldResolver;
use crate::hierarchy::{JpoHierarchyDiscovery, NATIVE_PARENT_FIELD, ParentFieldDiscovery};
use crate::models::{FieldSchema, FieldType, ProjectSchema};
use crate::normalize::normalize_field_name;
use crate::schema::{SchemaDiscovery, VirtualFieldRegistry};

/// マッパーが自前で組み立てるメタフィールド（入力に含まれていても無視する）
const META_KEYS: [&str; 3] = ["project", "issuetype", "type"];

/// スキーマ探索・フィールド名解決・値変換をまとめたパイプライン
pub struct FieldMapper {
    client: Arc<dyn HttpClient>,
    cache: Option<LookupCache>,
    config: Arc<AdapterConfig>,
    schema: SchemaDiscovery,
    hierarchy: JpoHierarchyDiscovery,
    resolver: FieldResolver,
    registry: ConverterRegistry,
}

impl FieldMapper {
    pub fn new(client: Arc<dyn HttpClient>, cache: Option<LookupCache>, config: AdapterConfig) -> Self {
        Self::assemble(
            client,
            cache,
            Arc::new(config),
            VirtualFieldRegistry::new(),
            ConverterRegistry::with_defaults(),
        )
    }

    /// 仮想フィールドの登録を差し替える
    pub fn with_virtual_fields(self, virtual_fields: VirtualFieldRegistry) -> Self {
        Self::assemble(self.client, self.cache, self.config, virtual_fields, self.registry)
    }

    /// コンバーターの登録を差し替える
    pub fn with_registry(mut self, registry: ConverterRegistry) -> Self {
        self.registry = registry;
        self
    }

    fn assemble(
        client: Arc<dyn HttpClient>,
        cache: Option<LookupCache>,
        config: Arc<AdapterConfig>,
        virtual_fields: VirtualFieldRegistry,
        registry: ConverterRegistry,
    ) -> Self {
        let schema = SchemaDiscovery::new(client.clone(), cache.clone())
            .with_virtual_fields(virtual_fields)
            .with_ttl(config.schema_ttl_seconds);
        let hierarchy =
            JpoHierarchyDiscovery::new(client.clone(), cache.clone()).with_ttl(config.hierarchy_ttl_seconds);
        let parent_fields = ParentFieldDiscovery::new(schema.clone(), cache.clone())
            .with_synonyms(config.parent_field_synonyms.clone())
            .with_ttl(config.parent_field_ttl_seconds);

        Self {
            client,
            cache,
            config,
            schema,
            hierarchy,
            resolver: FieldResolver::new(Some(parent_fields)),
            registry,
        }
    }

    pub fn schema_discovery(&self) -> &SchemaDiscovery {
        &self.schema
    }

    pub fn hierarchy(&self) -> &JpoHierarchyDiscovery {
        &self.hierarchy
    }

    pub fn registry(&self) -> &ConverterRegistry {
        &self.registry
    }

    /// 変換コンテキストを作る
    pub fn context(&self, project_key: &str, issue_type_name: &str) -> ConversionContext {
        let ctx = ConversionContext::new(project_key, issue_type_name, self.client.clone())
            .with_config(self.config.clone())
            .with_registry(self.registry.clone())
            .with_hierarchy(self.hierarchy.clone());
        match &self.cache {
            Some(cache) => ctx.with_cache(cache.clone()),
            None => ctx,
        }
    }

    /// 入力行を `fields` に変換する
    ///
    /// 未知のフィールド名は利用可能なフィールド名を列挙した検証エラーになる。
    pub async fn map_fields(
        &self,
        project_key: &str,
        issue_type_name: &str,
        raw: &Map<String, Value>,
    ) -> Result<Map<String, Value>> {
        let issue_type_name = self.config.expand_issue_type_abbreviation(issue_type_name);
        let schema = self
            .schema
            .get_fields_for_issue_type(project_key, issue_type_name)
            .await?;

        let (schema, by_id) = self.resolve_keys(schema, raw).await?;
        let ctx = self.context(project_key, &schema.issue_type);

        let issue_type_field = schema
            .field("issuetype")
            .cloned()
            .unwrap_or_else(|| FieldSchema::new("issuetype", "Issue Type", FieldType::IssueType));
        let issue_type = IssueTypeConverter
            .convert(&Value::from(schema.issue_type.clone()), &issue_type_field, &ctx)
            .await?;

        let converted = self.registry.convert_fields(&schema, &by_id, &ctx).await?;
        let mut fields = fold_virtual_fields(&schema, converted)?;

        fields.insert("project".to_string(), json!({"key": project_key}));
        fields.insert("issuetype".to_string(), issue_type);
        info!(
            project = project_key,
            issue_type = %schema.issue_type,
            fields = fields.len(),
            "fields mapped"
        );
        Ok(fields)
    }

    /// 入力キーをフィールドIDに置き換える
    async fn resolve_keys(
        &self,
        mut schema: ProjectSchema,
        raw: &Map<String, Value>,
    ) -> Result<(ProjectSchema, Map<String, Value>)> {
        let mut by_id = Map::new();
        for (key, value) in raw {
            if META_KEYS.contains(&normalize_field_name(key).as_str()) {
                debug!(field = %key, "ignoring meta field in input");
                continue;
            }

            let field_id = self
                .resolver
                .resolve_field_name(key, &schema)
                .await?
                .ok_or_else(|| {
                    Error::validation_with_available(
                        format!(
                            "Unknown field '{}' for {} / {}. Available fields: {}",
                            key,
                            schema.project_key,
                            schema.issue_type,
                            schema.field_names().join(", ")
                        ),
                        schema.field_names(),
                    )
                })?;

            if field_id == NATIVE_PARENT_FIELD && !schema.contains(NATIVE_PARENT_FIELD) {
                schema = schema.with_field(FieldSchema::new(NATIVE_PARENT_FIELD, "Parent", FieldType::IssueLink));
            }
            if by_id.insert(field_id.clone(), value.clone()).is_some() {
                return Err(Error::validation(format!(
                    "Field '{}' is given more than once (last key: '{}')",
                    field_id, key
                )));
            }
        }
        Ok((schema, by_id))
    }
}

/// 仮想フィールド（`timetracking.originalEstimate` など）を親オブジェクトへまとめる
pub fn fold_virtual_fields(schema: &ProjectSchema, converted: Map<String, Value>) -> Result<Map<String, Value>> {
    let mut fields = Map::new();
    let mut virtual_values = Vec::new();
    for (field_id, value) in converted {
        match schema.field(&field_id).and_then(|field| field.virtual_of.as_ref()) {
            Some(target) => virtual_values.push((target.clone(), value)),
            None => {
                fields.insert(field_id, value);
            }
        }
    }

    for (target, value) in virtual_values {
        let parent = fields
            .entry(target.parent_id.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        let Value::Object(parent) = parent else {
            return Err(Error::validation(format!(
                "Cannot set {}.{}: '{}' already holds a non-object value",
                target.parent_id, target.property_path, target.parent_id
            )));
        };
        parent.insert(target.property_path.clone(), value);
    }
    Ok(fields)
}

impl std::fmt::Debug for FieldMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldMapper")
            .field("base_url", &self.client.base_url())
            .field("has_cache", &self.cache.is_some())
            .field("registry", &self.registry)
            .finish()
    }
}
