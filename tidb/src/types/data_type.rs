use crate::types::{SchemaError, TableColumn};

/// Abstract source data type, independent of any warehouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    TinyInt { unsigned: bool },
    SmallInt { unsigned: bool },
    MediumInt { unsigned: bool },
    Int { unsigned: bool },
    BigInt { unsigned: bool },
    Decimal { precision: u32, scale: u32 },
    Float,
    Double,
    Bit { width: u32 },
    Year,
    Char { length: Option<u32> },
    VarChar { length: Option<u32> },
    Text,
    Binary { length: Option<u32> },
    VarBinary { length: Option<u32> },
    Blob,
    Date,
    DateTime { fsp: u32 },
    Timestamp { fsp: u32 },
    Time { fsp: u32 },
    Json,
    Enum,
    Set,
}

/// Default precision of `DECIMAL` without arguments.
const DEFAULT_DECIMAL_PRECISION: u32 = 10;

impl DataType {
    /// Derives the abstract type of a captured column.
    pub fn parse(column: &TableColumn) -> Result<DataType, SchemaError> {
        let normalized = column.type_name.trim().to_ascii_uppercase();
        // Some producers keep the argument list, e.g. `varchar(20)`; arguments come from the
        // precision and scale attributes instead.
        let base = normalized
            .split('(')
            .next()
            .unwrap_or_default()
            .trim()
            .to_owned();
        let unsigned = normalized.contains("UNSIGNED");
        let base = base.trim_end_matches("UNSIGNED").trim();
        let base = base.split_whitespace().next().unwrap_or_default();

        let precision = column.parse_attribute("precision", column.precision.as_deref())?;
        let scale = column.parse_attribute("scale", column.scale.as_deref())?;

        let data_type = match base {
            "TINYINT" | "BOOL" | "BOOLEAN" => DataType::TinyInt { unsigned },
            "SMALLINT" => DataType::SmallInt { unsigned },
            "MEDIUMINT" => DataType::MediumInt { unsigned },
            "INT" | "INTEGER" => DataType::Int { unsigned },
            "BIGINT" => DataType::BigInt { unsigned },
            "DECIMAL" | "NUMERIC" => DataType::Decimal {
                precision: precision.unwrap_or(DEFAULT_DECIMAL_PRECISION),
                scale: scale.unwrap_or(0),
            },
            "FLOAT" => DataType::Float,
            "DOUBLE" | "REAL" => DataType::Double,
            "BIT" => DataType::Bit {
                width: precision.unwrap_or(1),
            },
            "YEAR" => DataType::Year,
            "CHAR" => DataType::Char { length: precision },
            "VARCHAR" => DataType::VarChar { length: precision },
            "TINYTEXT" | "TEXT" | "MEDIUMTEXT" | "LONGTEXT" => DataType::Text,
            "BINARY" => DataType::Binary { length: precision },
            "VARBINARY" => DataType::VarBinary { length: precision },
            "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => DataType::Blob,
            "DATE" => DataType::Date,
            "DATETIME" => DataType::DateTime {
                fsp: scale.unwrap_or(0),
            },
            "TIMESTAMP" => DataType::Timestamp {
                fsp: scale.unwrap_or(0),
            },
            "TIME" => DataType::Time {
                fsp: scale.unwrap_or(0),
            },
            "JSON" => DataType::Json,
            "ENUM" => DataType::Enum,
            "SET" => DataType::Set,
            _ => {
                return Err(SchemaError::UnsupportedType {
                    column: column.name.clone(),
                    type_name: column.type_name.clone(),
                });
            }
        };

        Ok(data_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(column: TableColumn) -> DataType {
        DataType::parse(&column).unwrap()
    }

    #[test]
    fn parses_integer_signedness() {
        assert_eq!(
            parse(TableColumn::new("a", "BIGINT UNSIGNED")),
            DataType::BigInt { unsigned: true }
        );
        assert_eq!(
            parse(TableColumn::new("a", "int")),
            DataType::Int { unsigned: false }
        );
    }

    #[test]
    fn reads_arguments_from_attributes() {
        assert_eq!(
            parse(
                TableColumn::new("a", "DECIMAL")
                    .with_precision(12)
                    .with_scale(4)
            ),
            DataType::Decimal {
                precision: 12,
                scale: 4
            }
        );
        assert_eq!(
            parse(TableColumn::new("a", "VARCHAR").with_precision(255)),
            DataType::VarChar { length: Some(255) }
        );
        assert_eq!(
            parse(TableColumn::new("a", "DATETIME").with_scale(6)),
            DataType::DateTime { fsp: 6 }
        );
    }

    #[test]
    fn rejects_unknown_types() {
        let column = TableColumn::new("shape", "GEOMETRY");

        assert!(matches!(
            DataType::parse(&column),
            Err(SchemaError::UnsupportedType { column, .. }) if column == "shape"
        ));
    }

    #[test]
    fn rejects_malformed_precision() {
        let mut column = TableColumn::new("a", "VARCHAR");
        column.precision = Some("wide".to_owned());

        assert!(matches!(
            DataType::parse(&column),
            Err(SchemaError::InvalidAttribute {
                attribute: "precision",
                ..
            })
        ));
    }
}
