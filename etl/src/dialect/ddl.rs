use tidb::types::TableColumn;

use crate::changelog::{COMMIT_TS_COLUMN, META_COLUMNS};
use crate::dialect::{Dialect, TargetTable};
use crate::error::EtlResult;
use crate::schema::diff::{ColumnAction, DiffResult};

/// Renders the statement creating the destination table.
///
/// With `replace` the table is recreated, which makes replaying a snapshot load idempotent.
/// This is the only place a primary key is declared.
pub fn render_create_table(
    dialect: &dyn Dialect,
    target: &TargetTable,
    columns: &[TableColumn],
    replace: bool,
) -> EtlResult<String> {
    let mut rows = columns
        .iter()
        .map(|column| dialect.column_definition(column))
        .collect::<EtlResult<Vec<_>>>()?;

    let primary_key: Vec<String> = columns
        .iter()
        .filter(|column| column.is_primary_key)
        .map(|column| dialect.quote_identifier(&column.name))
        .collect();
    if !primary_key.is_empty()
        && let Some(clause) = dialect.primary_key_clause(&primary_key)
    {
        rows.push(clause);
    }

    let create = if replace {
        "CREATE OR REPLACE TABLE"
    } else {
        "CREATE TABLE IF NOT EXISTS"
    };

    Ok(format!(
        "{create} {} (\n    {}\n)",
        target.qualified(dialect),
        rows.join(",\n    ")
    ))
}

/// Renders the DDL statements applying `diff` to the destination table.
///
/// Unchanged columns produce nothing, and a modify that maps to the same destination type and
/// nullability produces nothing either. Column statements carry `IF [NOT] EXISTS` where the
/// dialect accepts it, so replaying them after a crash is a no-op.
pub fn render_ddl(
    dialect: &dyn Dialect,
    target: &TargetTable,
    diff: &DiffResult,
) -> EtlResult<Vec<String>> {
    let table = target.qualified(dialect);

    let items = match diff {
        DiffResult::Truncate { .. } => return Ok(vec![format!("TRUNCATE TABLE {table}")]),
        DiffResult::DropTable { .. } => return Ok(vec![format!("DROP TABLE IF EXISTS {table}")]),
        DiffResult::DropSchema { .. } => {
            return Ok(vec![format!(
                "DROP SCHEMA IF EXISTS {} CASCADE",
                target.qualified_namespace(dialect)
            )]);
        }
        DiffResult::Columns { items, .. } => items,
    };

    let add = if dialect.add_column_if_not_exists() {
        "ADD COLUMN IF NOT EXISTS"
    } else {
        "ADD COLUMN"
    };
    let drop = if dialect.drop_column_if_exists() {
        "DROP COLUMN IF EXISTS"
    } else {
        "DROP COLUMN"
    };
    let rename = if dialect.rename_column_if_exists() {
        "RENAME COLUMN IF EXISTS"
    } else {
        "RENAME COLUMN"
    };

    let mut statements = Vec::new();
    for item in items {
        match (item.action, &item.before, &item.after) {
            (ColumnAction::Add, _, Some(after)) => statements.push(format!(
                "ALTER TABLE {table} {add} {}",
                dialect.added_column_definition(after)?
            )),
            (ColumnAction::Drop, Some(before), _) => statements.push(format!(
                "ALTER TABLE {table} {drop} {}",
                dialect.quote_identifier(&before.name)
            )),
            (ColumnAction::Rename, Some(before), Some(after)) => statements.push(format!(
                "ALTER TABLE {table} {rename} {} TO {}",
                dialect.quote_identifier(&before.name),
                dialect.quote_identifier(&after.name)
            )),
            (ColumnAction::Modify, Some(before), Some(after)) => {
                statements.extend(dialect.render_modify(&table, before, after)?);
            }
            _ => {}
        }
    }

    Ok(statements)
}

/// Renders the columns of a change-log file as `name TYPE` pairs, metadata columns first.
///
/// Every column is nullable, since deletes only carry the key for some producers.
pub fn render_change_log_columns(
    dialect: &dyn Dialect,
    columns: &[TableColumn],
) -> EtlResult<Vec<String>> {
    let mut rendered: Vec<String> = META_COLUMNS
        .iter()
        .map(|name| {
            let type_name = if *name == COMMIT_TS_COLUMN {
                dialect.commit_ts_type()
            } else {
                dialect.string_type()
            };
            format!("{} {type_name}", dialect.quote_identifier(name))
        })
        .collect();

    for column in columns {
        rendered.push(format!(
            "{} {}",
            dialect.quote_identifier(&column.name),
            dialect.column_type(column)?
        ));
    }

    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::bigquery::BigQueryDialect;
    use crate::dialect::databricks::DatabricksDialect;
    use crate::dialect::snowflake::SnowflakeDialect;
    use crate::error::ErrorKind;
    use crate::schema::diff::diff_columns;
    use tidb::types::{ChangeType, TableDefinition, TableName};

    fn source() -> TableName {
        TableName::new("sales", "orders")
    }

    fn target() -> TargetTable {
        TargetTable::new(["analytics"], "orders")
    }

    fn columns() -> Vec<TableColumn> {
        vec![
            TableColumn::new("id", "BIGINT").with_id("1").primary_key(),
            TableColumn::new("note", "VARCHAR").with_id("2").with_precision(64),
        ]
    }

    #[test]
    fn create_table_declares_the_primary_key() {
        let sql = render_create_table(&BigQueryDialect, &target(), &columns(), true).unwrap();

        assert_eq!(
            sql,
            "CREATE OR REPLACE TABLE `analytics`.`orders` (\n    `id` INT64 NOT NULL,\n    `note` STRING,\n    PRIMARY KEY (`id`) NOT ENFORCED\n)"
        );

        let sql = render_create_table(&SnowflakeDialect, &target(), &columns(), false).unwrap();
        assert!(sql.starts_with(r#"CREATE TABLE IF NOT EXISTS "analytics"."orders" ("#));
        assert!(sql.contains(r#"PRIMARY KEY ("id")"#));
    }

    #[test]
    fn table_level_changes_render_one_statement() {
        let prev = columns();
        for (change_type, expected) in [
            (ChangeType::Truncate, "TRUNCATE TABLE `analytics`.`orders`"),
            (ChangeType::DropTable, "DROP TABLE IF EXISTS `analytics`.`orders`"),
            (ChangeType::DropSchema, "DROP SCHEMA IF EXISTS `analytics` CASCADE"),
        ] {
            let cur = TableDefinition::new(&source(), 2, vec![]).with_change_type(change_type);
            let diff = diff_columns(&prev, &cur).unwrap();

            assert_eq!(
                render_ddl(&DatabricksDialect, &target(), &diff).unwrap(),
                vec![expected.to_owned()]
            );
        }
    }

    #[test]
    fn renders_column_changes_in_diff_order() {
        let prev = columns();
        let cur = TableDefinition::new(
            &source(),
            2,
            vec![
                TableColumn::new("id", "BIGINT").with_id("1").primary_key(),
                TableColumn::new("comment", "VARCHAR").with_id("2").with_precision(64),
                TableColumn::new("status", "INT").with_id("3").not_null(),
            ],
        );
        let diff = diff_columns(&prev, &cur).unwrap();

        assert_eq!(
            render_ddl(&DatabricksDialect, &target(), &diff).unwrap(),
            vec![
                "ALTER TABLE `analytics`.`orders` RENAME COLUMN `note` TO `comment`".to_owned(),
                "ALTER TABLE `analytics`.`orders` ADD COLUMN `status` INT NOT NULL".to_owned(),
            ]
        );
    }

    #[test]
    fn column_statements_are_guarded_where_supported() {
        let prev = columns();
        let cur = TableDefinition::new(
            &source(),
            2,
            vec![
                TableColumn::new("id", "BIGINT").with_id("1").primary_key(),
                TableColumn::new("status", "INT").with_id("3"),
            ],
        );
        let diff = diff_columns(&prev, &cur).unwrap();

        assert_eq!(
            render_ddl(&BigQueryDialect, &target(), &diff).unwrap(),
            vec![
                "ALTER TABLE `analytics`.`orders` DROP COLUMN IF EXISTS `note`".to_owned(),
                "ALTER TABLE `analytics`.`orders` ADD COLUMN IF NOT EXISTS `status` INT64".to_owned(),
            ]
        );
        assert_eq!(
            render_ddl(&SnowflakeDialect, &target(), &diff).unwrap(),
            vec![
                r#"ALTER TABLE "analytics"."orders" DROP COLUMN IF EXISTS "note""#.to_owned(),
                r#"ALTER TABLE "analytics"."orders" ADD COLUMN IF NOT EXISTS "status" NUMBER(10, 0)"#.to_owned(),
            ]
        );
        assert_eq!(
            render_ddl(&DatabricksDialect, &target(), &diff).unwrap(),
            vec![
                "ALTER TABLE `analytics`.`orders` DROP COLUMN IF EXISTS `note`".to_owned(),
                "ALTER TABLE `analytics`.`orders` ADD COLUMN `status` INT".to_owned(),
            ]
        );

        let renamed = TableDefinition::new(
            &source(),
            2,
            vec![
                TableColumn::new("id", "BIGINT").with_id("1").primary_key(),
                TableColumn::new("comment", "VARCHAR").with_id("2").with_precision(64),
            ],
        );
        let diff = diff_columns(&prev, &renamed).unwrap();
        assert_eq!(
            render_ddl(&BigQueryDialect, &target(), &diff).unwrap(),
            vec!["ALTER TABLE `analytics`.`orders` RENAME COLUMN IF EXISTS `note` TO `comment`".to_owned()]
        );
    }

    #[test]
    fn unsupported_modify_fails_instead_of_rendering() {
        let prev = columns();
        let cur = TableDefinition::new(
            &source(),
            2,
            vec![
                TableColumn::new("id", "BIGINT").with_id("1").primary_key(),
                TableColumn::new("note", "TEXT").with_id("2"),
            ],
        );
        let diff = diff_columns(&prev, &cur).unwrap();

        let err = render_ddl(&DatabricksDialect, &target(), &diff).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedDdl);

        // Both types map to STRING, so there is nothing to alter.
        assert!(render_ddl(&BigQueryDialect, &target(), &diff).unwrap().is_empty());
    }

    #[test]
    fn renders_change_log_columns_with_metadata_first() {
        assert_eq!(
            render_change_log_columns(&SnowflakeDialect, &columns()).unwrap(),
            vec![
                r#""etl_flag" VARCHAR"#.to_owned(),
                r#""etl_tablename" VARCHAR"#.to_owned(),
                r#""etl_schemaname" VARCHAR"#.to_owned(),
                r#""etl_commit_ts" NUMBER(20, 0)"#.to_owned(),
                r#""id" NUMBER(19, 0)"#.to_owned(),
                r#""note" VARCHAR(64)"#.to_owned(),
            ]
        );
    }
}
