mod jpo;
mod parent_field;

pub use jpo::{
    DEFAULT_HIERARCHY_TTL_SECONDS, HIERARCHY_ENDPOINT, JpoHierarchyDiscovery, NULL_SENTINEL, find_level,
    get_parent_level, is_valid_parent, normalize_hierarchy,
};
pub use parent_field::{
    DEFAULT_PARENT_FIELD_TTL_SECONDS, NATIVE_PARENT_FIELD, ParentFieldDiscovery, find_parent_field,
    is_subtask_name,
};
