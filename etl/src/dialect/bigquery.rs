use tidb::types::{DataType, TableColumn};

use crate::bail;
use crate::dialect::Dialect;
use crate::error::{ErrorKind, EtlResult};

/// Largest scale of `NUMERIC`.
const NUMERIC_MAX_SCALE: u32 = 9;
/// Largest number of integer digits of `NUMERIC`.
const NUMERIC_MAX_INTEGER_DIGITS: u32 = 29;

/// GoogleSQL as spoken by BigQuery.
#[derive(Debug, Clone, Copy, Default)]
pub struct BigQueryDialect;

impl Dialect for BigQueryDialect {
    fn name(&self) -> &'static str {
        "bigquery"
    }

    fn add_column_if_not_exists(&self) -> bool {
        true
    }

    fn drop_column_if_exists(&self) -> bool {
        true
    }

    fn rename_column_if_exists(&self) -> bool {
        true
    }

    fn quote_identifier(&self, identifier: &str) -> String {
        format!("`{}`", identifier.replace('`', "\\`"))
    }

    fn map_type(&self, _column: &str, data_type: DataType) -> EtlResult<String> {
        let type_name = match data_type {
            DataType::TinyInt { .. }
            | DataType::SmallInt { .. }
            | DataType::MediumInt { .. }
            | DataType::Int { .. }
            | DataType::BigInt { unsigned: false }
            | DataType::Year => "INT64".to_owned(),
            DataType::BigInt { unsigned: true } | DataType::Bit { .. } => "NUMERIC".to_owned(),
            DataType::Decimal { precision, scale } => {
                if scale <= NUMERIC_MAX_SCALE
                    && precision.saturating_sub(scale) <= NUMERIC_MAX_INTEGER_DIGITS
                {
                    format!("NUMERIC({precision}, {scale})")
                } else {
                    format!("BIGNUMERIC({precision}, {scale})")
                }
            }
            DataType::Float | DataType::Double => "FLOAT64".to_owned(),
            DataType::Char { .. }
            | DataType::VarChar { .. }
            | DataType::Text
            | DataType::Enum
            | DataType::Set
            | DataType::Time { .. } => "STRING".to_owned(),
            DataType::Binary { .. } | DataType::VarBinary { .. } | DataType::Blob => {
                "BYTES".to_owned()
            }
            DataType::Date => "DATE".to_owned(),
            DataType::DateTime { .. } => "DATETIME".to_owned(),
            DataType::Timestamp { .. } => "TIMESTAMP".to_owned(),
            DataType::Json => "JSON".to_owned(),
        };

        Ok(type_name)
    }

    fn string_type(&self) -> &'static str {
        "STRING"
    }

    fn commit_ts_type(&self) -> &'static str {
        "INT64"
    }

    /// Columns can only be added as nullable.
    fn added_column_definition(&self, column: &TableColumn) -> EtlResult<String> {
        Ok(format!(
            "{} {}",
            self.quote_identifier(&column.name),
            self.column_type(column)?
        ))
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
            (false, true) => statements.push(format!(
                "ALTER TABLE {table} ALTER COLUMN {column} DROP NOT NULL"
            )),
            (true, false) => bail!(
                ErrorKind::UnsupportedDdl,
                "unsupported modify",
                format!("BigQuery cannot make column `{}` NOT NULL", after.name)
            ),
            _ => {}
        }

        Ok(statements)
    }

    fn primary_key_clause(&self, columns: &[String]) -> Option<String> {
        Some(format!("PRIMARY KEY ({}) NOT ENFORCED", columns.join(", ")))
    }

    fn select_all_except(&self, column: &str) -> String {
        format!("* EXCEPT({column})")
    }
}
