use std::collections::BTreeMap;

use crate::models::{FieldSchema, FieldType, VirtualFieldRef};

/// 親フィールドのサブプロパティを指す仮想フィールドの定義
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualFieldDefinition {
    pub name: String,
    pub property_path: String,
    pub field_type: FieldType,
}

impl VirtualFieldDefinition {
    pub fn new(name: impl Into<String>, property_path: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            property_path: property_path.into(),
            field_type,
        }
    }
}

/// 親フィールドID → 仮想フィールド定義の対応表
///
/// 構築時に組み込み定義を登録し、以後は変更しない。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualFieldRegistry {
    mappings: BTreeMap<String, Vec<VirtualFieldDefinition>>,
}

impl VirtualFieldRegistry {
    /// 組み込み定義（timetracking の見積もり2種）入りで作成
    pub fn new() -> Self {
        Self::empty()
            .register(
                "timetracking",
                VirtualFieldDefinition::new("Original Estimate", "originalEstimate", FieldType::TimeTracking),
            )
            .register(
                "timetracking",
                VirtualFieldDefinition::new("Remaining Estimate", "remainingEstimate", FieldType::TimeTracking),
            )
    }

    pub fn empty() -> Self {
        Self {
            mappings: BTreeMap::new(),
        }
    }

    /// 定義を追加（同じプロパティパスは上書き）
    pub fn register(mut self, parent_id: impl Into<String>, definition: VirtualFieldDefinition) -> Self {
        let entries = self.mappings.entry(parent_id.into()).or_default();
        entries.retain(|d| d.property_path != definition.property_path);
        entries.push(definition);
        self
    }

    pub fn definitions(&self, parent_id: &str) -> &[VirtualFieldDefinition] {
        self.mappings
            .get(parent_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// 親フィールドから仮想フィールドを生成する
    ///
    /// IDは `"{parentId}.{propertyPath}"`、必須フラグは親から引き継ぐ。
    pub fn synthesize(&self, parent: &FieldSchema) -> Vec<FieldSchema> {
        self.definitions(&parent.id)
            .iter()
            .map(|definition| {
                let mut field = FieldSchema::new(
                    format!("{}.{}", parent.id, definition.property_path),
                    definition.name.clone(),
                    definition.field_type.clone(),
                )
                .required(parent.required);
                field.virtual_of = Some(VirtualFieldRef {
                    parent_id: parent.id.clone(),
                    property_path: definition.property_path.clone(),
                });
                field
            })
            .collect()
    }
}

impl Default for VirtualFieldRegistry {
    fn default() -> Self {
        Self::new()
    }
}
