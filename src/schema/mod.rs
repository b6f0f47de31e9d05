mod discovery;
mod virtual_fields;

pub use discovery::{
    DEFAULT_SCHEMA_TTL_SECONDS, PAGE_SIZE, SchemaDiscovery, fetch_all_pages, fetch_issue_types,
    normalize_allowed_values, parse_field,
};
pub use virtual_fields::{VirtualFieldDefinition, VirtualFieldRegistry};
