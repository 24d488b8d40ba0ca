use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::TableName;

/// Errors raised while interpreting source schema information.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("invalid table name `{0}`: expected `schema.table`")]
    InvalidTableName(String),

    #[error("column `{column}` has unsupported type `{type_name}`")]
    UnsupportedType { column: String, type_name: String },

    #[error("column `{column}` has an invalid {attribute} `{value}`")]
    InvalidAttribute {
        column: String,
        attribute: &'static str,
        value: String,
    },
}

/// Table-level kind of a captured schema change.
///
/// Everything that is not a table or schema level action is treated as [`ChangeType::None`] and
/// compared column by column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeType {
    None,
    Truncate,
    DropTable,
    RenameTable,
    DropSchema,
    CreateTable,
    CreateSchema,
}

impl ChangeType {
    /// Maps a TiDB DDL action number to a change type.
    pub fn from_action(action: u8) -> ChangeType {
        match action {
            1 => ChangeType::CreateSchema,
            2 => ChangeType::DropSchema,
            3 => ChangeType::CreateTable,
            4 => ChangeType::DropTable,
            11 => ChangeType::Truncate,
            14 | 55 => ChangeType::RenameTable,
            _ => ChangeType::None,
        }
    }

    /// Returns the TiDB DDL action number of this change type.
    pub fn as_action(&self) -> u8 {
        match self {
            ChangeType::None => 0,
            ChangeType::CreateSchema => 1,
            ChangeType::DropSchema => 2,
            ChangeType::CreateTable => 3,
            ChangeType::DropTable => 4,
            ChangeType::Truncate => 11,
            ChangeType::RenameTable => 14,
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeType::None => "none",
            ChangeType::Truncate => "truncate",
            ChangeType::DropTable => "drop-table",
            ChangeType::RenameTable => "rename-table",
            ChangeType::DropSchema => "drop-schema",
            ChangeType::CreateTable => "create-table",
            ChangeType::CreateSchema => "create-schema",
        };
        f.write_str(name)
    }
}

/// One column of a captured table definition.
///
/// Field names follow the schema files TiCDC writes next to the change log. Boolean attributes
/// are stored by TiCDC as the strings `"true"`/`"false"` and are omitted when false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableColumn {
    /// Stable column id assigned by TiDB. Survives renames.
    #[serde(rename = "ColumnId", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "ColumnName")]
    pub name: String,
    /// Upper-case source type name, e.g. `VARCHAR` or `BIGINT UNSIGNED`.
    #[serde(rename = "ColumnType")]
    pub type_name: String,
    #[serde(rename = "ColumnDefault", default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    /// Length for character and binary types, precision for decimals.
    #[serde(rename = "ColumnPrecision", default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<String>,
    /// Scale for decimals, fractional seconds precision for temporal types.
    #[serde(rename = "ColumnScale", default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<String>,
    #[serde(
        rename = "ColumnNullable",
        default,
        with = "string_flag",
        skip_serializing_if = "is_false"
    )]
    pub nullable: bool,
    #[serde(
        rename = "ColumnIsPk",
        default,
        with = "string_flag",
        skip_serializing_if = "is_false"
    )]
    pub is_primary_key: bool,
}

impl TableColumn {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> TableColumn {
        Self {
            id: None,
            name: name.into(),
            type_name: type_name.into(),
            default: None,
            precision: None,
            scale: None,
            nullable: true,
            is_primary_key: false,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_precision(mut self, precision: u32) -> Self {
        self.precision = Some(precision.to_string());
        self
    }

    pub fn with_scale(mut self, scale: u32) -> Self {
        self.scale = Some(scale.to_string());
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Marks the column as part of the primary key, which also makes it non-nullable.
    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.nullable = false;
        self
    }

    /// Returns `true` when both columns describe the same type and nullability.
    pub fn same_shape(&self, other: &TableColumn) -> bool {
        self.type_name.eq_ignore_ascii_case(&other.type_name)
            && self.precision == other.precision
            && self.scale == other.scale
            && self.nullable == other.nullable
    }

    pub(crate) fn parse_attribute(
        &self,
        attribute: &'static str,
        value: Option<&str>,
    ) -> Result<Option<u32>, SchemaError> {
        match value {
            None | Some("") => Ok(None),
            Some(value) => value
                .parse()
                .map(Some)
                .map_err(|_| SchemaError::InvalidAttribute {
                    column: self.name.clone(),
                    attribute,
                    value: value.to_owned(),
                }),
        }
    }
}

/// One captured version of a table's schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefinition {
    #[serde(rename = "Table")]
    pub table: String,
    #[serde(rename = "Schema")]
    pub schema: String,
    #[serde(rename = "Version", default)]
    pub version: u64,
    /// Commit timestamp of the DDL that produced this version.
    #[serde(rename = "TableVersion")]
    pub table_version: u64,
    /// DDL statement that produced this version, empty for the initial version.
    #[serde(rename = "Query", default)]
    pub query: String,
    #[serde(rename = "Type", default)]
    pub action: u8,
    #[serde(rename = "TableColumns", default)]
    pub columns: Vec<TableColumn>,
    #[serde(rename = "TableColumnsTotal", default)]
    pub total_columns: usize,
}

impl TableDefinition {
    pub fn new(table: &TableName, table_version: u64, columns: Vec<TableColumn>) -> Self {
        Self {
            table: table.name.clone(),
            schema: table.schema.clone(),
            version: 1,
            table_version,
            query: String::new(),
            action: ChangeType::None.as_action(),
            total_columns: columns.len(),
            columns,
        }
    }

    pub fn with_change_type(mut self, change_type: ChangeType) -> Self {
        self.action = change_type.as_action();
        self
    }

    pub fn change_type(&self) -> ChangeType {
        ChangeType::from_action(self.action)
    }

    pub fn table_name(&self) -> TableName {
        TableName::new(self.schema.clone(), self.table.clone())
    }

    pub fn primary_key_columns(&self) -> impl Iterator<Item = &TableColumn> {
        self.columns.iter().filter(|column| column.is_primary_key)
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Serde adapter for the `"true"`/`"false"` strings used by TiCDC for boolean attributes.
mod string_flag {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &bool, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(if *value { "true" } else { "false" })
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<String>::deserialize(deserializer)?;
        Ok(value.is_some_and(|value| value.eq_ignore_ascii_case("true")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA_FILE: &str = r#"{
        "Table": "orders",
        "Schema": "sales",
        "Version": 1,
        "TableVersion": 446144580390125569,
        "Query": "ALTER TABLE orders ADD COLUMN note VARCHAR(64)",
        "Type": 5,
        "TableColumns": [
            {"ColumnId": "1", "ColumnName": "id", "ColumnType": "BIGINT", "ColumnPrecision": "20", "ColumnIsPk": "true"},
            {"ColumnId": "2", "ColumnName": "amount", "ColumnType": "DECIMAL", "ColumnPrecision": "10", "ColumnScale": "2", "ColumnNullable": "true"},
            {"ColumnId": "3", "ColumnName": "note", "ColumnType": "VARCHAR", "ColumnPrecision": "64", "ColumnNullable": "true"}
        ],
        "TableColumnsTotal": 3
    }"#;

    #[test]
    fn decodes_captured_schema_file() {
        let definition: TableDefinition = serde_json::from_str(SCHEMA_FILE).unwrap();

        assert_eq!(definition.table_name(), TableName::new("sales", "orders"));
        assert_eq!(definition.table_version, 446144580390125569);
        assert_eq!(definition.change_type(), ChangeType::None);
        assert_eq!(definition.columns.len(), 3);

        let id = &definition.columns[0];
        assert!(id.is_primary_key);
        assert!(!id.nullable);
        assert_eq!(id.id.as_deref(), Some("1"));

        let amount = &definition.columns[1];
        assert!(amount.nullable);
        assert_eq!(amount.scale.as_deref(), Some("2"));
    }

    #[test]
    fn omits_false_flags_when_encoding() {
        let column = TableColumn::new("id", "INT").primary_key();
        let json = serde_json::to_value(&column).unwrap();

        assert_eq!(json["ColumnIsPk"], "true");
        assert!(json.get("ColumnNullable").is_none());
    }

    #[test]
    fn maps_table_level_actions() {
        assert_eq!(ChangeType::from_action(11), ChangeType::Truncate);
        assert_eq!(ChangeType::from_action(4), ChangeType::DropTable);
        assert_eq!(ChangeType::from_action(2), ChangeType::DropSchema);
        assert_eq!(ChangeType::from_action(55), ChangeType::RenameTable);
        assert_eq!(ChangeType::from_action(12), ChangeType::None);
    }
}
