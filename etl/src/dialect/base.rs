use tidb::types::{DataType, TableColumn};

use crate::bail;
use crate::error::{ErrorKind, EtlResult};

/// Rendering rules of a destination SQL dialect.
///
/// A dialect is pure: it turns column descriptions into SQL fragments and never talks to the
/// warehouse. Connectors pair a dialect with an executor.
pub trait Dialect: Send + Sync {
    /// Returns the name of the dialect, used in logs and errors.
    fn name(&self) -> &'static str;

    /// Quotes a single identifier.
    fn quote_identifier(&self, identifier: &str) -> String;

    /// Quotes a string literal with backslash escapes.
    fn quote_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
    }

    /// Maps a source data type to the destination type name.
    fn map_type(&self, column: &str, data_type: DataType) -> EtlResult<String>;

    /// Type of the textual change-log metadata columns.
    fn string_type(&self) -> &'static str;

    /// Type of the commit timestamp metadata column.
    fn commit_ts_type(&self) -> &'static str;

    /// Returns the destination type of `column`.
    fn column_type(&self, column: &TableColumn) -> EtlResult<String> {
        let data_type = DataType::parse(column)?;
        self.map_type(&column.name, data_type)
    }

    /// Renders `name TYPE [NOT NULL]`. Defaults are never rendered.
    fn column_definition(&self, column: &TableColumn) -> EtlResult<String> {
        let mut definition = format!(
            "{} {}",
            self.quote_identifier(&column.name),
            self.column_type(column)?
        );
        if !column.nullable {
            definition.push_str(" NOT NULL");
        }

        Ok(definition)
    }

    /// Renders the definition used by `ALTER TABLE ... ADD COLUMN`.
    fn added_column_definition(&self, column: &TableColumn) -> EtlResult<String> {
        self.column_definition(column)
    }

    /// Whether `ADD COLUMN IF NOT EXISTS` is accepted.
    fn add_column_if_not_exists(&self) -> bool {
        false
    }

    /// Whether `DROP COLUMN IF EXISTS` is accepted.
    fn drop_column_if_exists(&self) -> bool {
        false
    }

    /// Whether `RENAME COLUMN IF EXISTS` is accepted.
    fn rename_column_if_exists(&self) -> bool {
        false
    }

    /// Renders the statements changing the type or nullability of a column in `table`.
    ///
    /// Dialects without a type alteration primitive keep this default and fail.
    fn render_modify(
        &self,
        table: &str,
        before: &TableColumn,
        after: &TableColumn,
    ) -> EtlResult<Vec<String>> {
        let _ = (table, before);
        bail!(
            ErrorKind::UnsupportedDdl,
            "unsupported modify",
            format!(
                "modifying column `{}` is not supported by {}",
                after.name,
                self.name()
            )
        )
    }

    /// Renders the table constraint declaring the primary key, if the dialect declares one.
    fn primary_key_clause(&self, columns: &[String]) -> Option<String> {
        Some(format!("PRIMARY KEY ({})", columns.join(", ")))
    }

    /// Renders a projection of every column except `column`.
    fn select_all_except(&self, column: &str) -> String;
}

/// Fully qualified destination table, e.g. `project.dataset.table`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetTable {
    namespace: Vec<String>,
    name: String,
}

impl TargetTable {
    pub fn new<I, S>(namespace: I, name: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            namespace: namespace.into_iter().map(Into::into).collect(),
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns another table in the same namespace.
    pub fn sibling(&self, name: impl Into<String>) -> TargetTable {
        TargetTable {
            namespace: self.namespace.clone(),
            name: name.into(),
        }
    }

    pub fn qualified(&self, dialect: &dyn Dialect) -> String {
        self.namespace
            .iter()
            .chain(std::iter::once(&self.name))
            .map(|part| dialect.quote_identifier(part))
            .collect::<Vec<_>>()
            .join(".")
    }

    pub fn qualified_namespace(&self, dialect: &dyn Dialect) -> String {
        self.namespace
            .iter()
            .map(|part| dialect.quote_identifier(part))
            .collect::<Vec<_>>()
            .join(".")
    }
}

/// Quotes with a doubled delimiter as the escape.
pub(crate) fn quote_with(identifier: &str, quote: char) -> String {
    let escaped = identifier.replace(quote, &format!("{quote}{quote}"));
    format!("{quote}{escaped}{quote}")
}
