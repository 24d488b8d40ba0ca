use tidb::types::{DataType, TableColumn};

use crate::dialect::Dialect;
use crate::dialect::base::quote_with;
use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;

/// Largest precision of a Snowflake `NUMBER`.
const NUMBER_MAX_PRECISION: u32 = 38;

/// Snowflake SQL.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnowflakeDialect;

fn with_length(name: &str, length: Option<u32>) -> String {
    match length {
        Some(length) => format!("{name}({length})"),
        None => name.to_owned(),
    }
}

impl Dialect for SnowflakeDialect {
    fn name(&self) -> &'static str {
        "snowflake"
    }

    fn add_column_if_not_exists(&self) -> bool {
        true
    }

    fn drop_column_if_exists(&self) -> bool {
        true
    }

    fn quote_identifier(&self, identifier: &str) -> String {
        quote_with(identifier, '"')
    }

    fn map_type(&self, column: &str, data_type: DataType) -> EtlResult<String> {
        let type_name = match data_type {
            DataType::TinyInt { .. } => "NUMBER(3, 0)".to_owned(),
            DataType::SmallInt { .. } | DataType::Year => "NUMBER(5, 0)".to_owned(),
            DataType::MediumInt { unsigned: false } => "NUMBER(7, 0)".to_owned(),
            DataType::MediumInt { unsigned: true } => "NUMBER(8, 0)".to_owned(),
            DataType::Int { .. } => "NUMBER(10, 0)".to_owned(),
            DataType::BigInt { unsigned: false } => "NUMBER(19, 0)".to_owned(),
            DataType::BigInt { unsigned: true } | DataType::Bit { .. } => {
                "NUMBER(20, 0)".to_owned()
            }
            DataType::Decimal { precision, scale } => {
                if precision > NUMBER_MAX_PRECISION {
                    return Err(etl_error!(
                        ErrorKind::UnsupportedType,
                        "Decimal precision exceeds the Snowflake maximum",
                        format!("column `{column}` has precision {precision}")
                    ));
                }
                format!("NUMBER({precision}, {scale})")
            }
            DataType::Float => "FLOAT".to_owned(),
            DataType::Double => "DOUBLE".to_owned(),
            DataType::Char { length } => with_length("CHAR", length),
            DataType::VarChar { length } => with_length("VARCHAR", length),
            DataType::Text | DataType::Enum | DataType::Set => "TEXT".to_owned(),
            DataType::Binary { .. } | DataType::VarBinary { .. } | DataType::Blob => {
                "BINARY".to_owned()
            }
            DataType::Date => "DATE".to_owned(),
            DataType::DateTime { fsp } => format!("TIMESTAMP_NTZ({fsp})"),
            DataType::Timestamp { fsp } => format!("TIMESTAMP_TZ({fsp})"),
            DataType::Time { fsp } => format!("TIME({fsp})"),
            DataType::Json => "VARIANT".to_owned(),
        };

        Ok(type_name)
    }

    fn string_type(&self) -> &'static str {
        "VARCHAR"
    }

    fn commit_ts_type(&self) -> &'static str {
        "NUMBER(20, 0)"
    }

    fn render_modify(
        &self,
        table: &str,
        before: &TableColumn,
        after: &TableColumn,
    ) -> EtlResult<Vec<String>> {
        let column = self.quote_identifier(&after.name);
        let mut statements = Vec::new();

        let before_type = self.column_type(before)?;
        let after_type = self.column_type(after)?;
        if before_type != after_type {
            statements.push(format!(
                "ALTER TABLE {table} ALTER COLUMN {column} SET DATA TYPE {after_type}"
            ));
        }

        match (before.nullable, after.nullable) {
            (true, false) => statements.push(format!(
                "ALTER TABLE {table} ALTER COLUMN {column} SET NOT NULL"
            )),
            (false, true) => statements.push(format!(
                "ALTER TABLE {table} ALTER COLUMN {column} DROP NOT NULL"
            )),
            _ => {}
        }

        Ok(statements)
    }

    fn select_all_except(&self, column: &str) -> String {
        format!("* EXCLUDE ({column})")
    }
}
