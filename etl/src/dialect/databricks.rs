use tidb::types::DataType;

use crate::dialect::Dialect;
use crate::dialect::base::quote_with;
use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;

/// Largest precision of a Databricks `DECIMAL`.
const DECIMAL_MAX_PRECISION: u32 = 38;

/// Databricks SQL over Delta tables.
///
/// Delta tables cannot change a column type in place, so every modify fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct DatabricksDialect;

impl Dialect for DatabricksDialect {
    fn name(&self) -> &'static str {
        "databricks"
    }

    fn drop_column_if_exists(&self) -> bool {
        true
    }

    fn quote_identifier(&self, identifier: &str) -> String {
        quote_with(identifier, '`')
    }

    fn map_type(&self, column: &str, data_type: DataType) -> EtlResult<String> {
        let type_name = match data_type {
            DataType::TinyInt { unsigned: false } => "TINYINT".to_owned(),
            DataType::TinyInt { unsigned: true }
            | DataType::SmallInt { unsigned: false }
            | DataType::Year => "SMALLINT".to_owned(),
            DataType::SmallInt { unsigned: true }
            | DataType::MediumInt { .. }
            | DataType::Int { unsigned: false } => "INT".to_owned(),
            DataType::Int { unsigned: true } | DataType::BigInt { unsigned: false } => {
                "BIGINT".to_owned()
            }
            DataType::BigInt { unsigned: true } | DataType::Bit { .. } => {
                "DECIMAL(20, 0)".to_owned()
            }
            DataType::Decimal { precision, scale } => {
                if precision > DECIMAL_MAX_PRECISION {
                    return Err(etl_error!(
                        ErrorKind::UnsupportedType,
                        "Decimal precision exceeds the Databricks maximum",
                        format!("column `{column}` has precision {precision}")
                    ));
                }
                format!("DECIMAL({precision}, {scale})")
            }
            DataType::Float => "FLOAT".to_owned(),
            DataType::Double => "DOUBLE".to_owned(),
            DataType::Char { .. }
            | DataType::VarChar { .. }
            | DataType::Text
            | DataType::Enum
            | DataType::Set
            | DataType::Json
            | DataType::Time { .. } => "STRING".to_owned(),
            DataType::Binary { .. } | DataType::VarBinary { .. } | DataType::Blob => {
                "BINARY".to_owned()
            }
            DataType::Date => "DATE".to_owned(),
            DataType::DateTime { .. } | DataType::Timestamp { .. } => "TIMESTAMP".to_owned(),
        };

        Ok(type_name)
    }

    fn string_type(&self) -> &'static str {
        "STRING"
    }

    fn commit_ts_type(&self) -> &'static str {
        "BIGINT"
    }

    fn select_all_except(&self, column: &str) -> String {
        format!("* EXCEPT ({column})")
    }
}
