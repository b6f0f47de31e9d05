pub mod cache;
pub mod client;
pub mod config;
pub mod converters;
pub mod error;
pub mod field_resolver;
pub mod hierarchy;
pub mod logging;
pub mod mapper;
pub mod models;
pub mod normalize;
pub mod resolver;
pub mod schema;

pub use client::{Auth, HttpClient, JiraClient, JiraConfig};
pub use error::{Error, ErrorKind, Result};
pub use models::*;

// Cache re-exports
pub use cache::{CacheEntry, CacheStore, Cached, FileCacheStore, LookupCache, MemoryCacheStore};

// Config re-exports
pub use config::{AdapterConfig, AmbiguityPolicy, AmbiguityPolicyConfig, ConfigStore, FileConfigStore};

// Discovery re-exports
pub use hierarchy::{JpoHierarchyDiscovery, ParentFieldDiscovery};
pub use schema::{SchemaDiscovery, VirtualFieldDefinition, VirtualFieldRegistry};

// Resolution and conversion re-exports
pub use converters::{ConversionContext, ConverterRegistry, FieldConverter};
pub use field_resolver::FieldResolver;
pub use mapper::FieldMapper;
pub use normalize::{extract_value, normalize_field_name};
pub use resolver::{ResolveOptions, resolve_name, resolve_unique_name};

pub use logging::{init_logging, init_logging_from_config};
