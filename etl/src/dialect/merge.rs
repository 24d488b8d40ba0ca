use tidb::types::TableColumn;

use crate::bail;
use crate::changelog::{COMMIT_TS_COLUMN, DELETE_FLAG, FLAG_COLUMN};
use crate::dialect::Dialect;
use crate::error::{ErrorKind, EtlResult};

/// Alias of the window rank inside the dedup query.
const ROW_NUMBER_ALIAS: &str = "row_num";

/// Renders the statement applying a change-log batch read from `source` to `target`.
///
/// The batch is first reduced to the latest row per primary key, then merged: matched rows are
/// updated or deleted depending on the flag, unmatched rows are inserted unless they are deletes.
/// `target` and `source` are already qualified relations.
pub fn render_merge(
    dialect: &dyn Dialect,
    target: &str,
    source: &str,
    columns: &[TableColumn],
) -> EtlResult<String> {
    let quote = |name: &str| dialect.quote_identifier(name);

    let keys: Vec<&TableColumn> = columns.iter().filter(|column| column.is_primary_key).collect();
    if keys.is_empty() {
        bail!(
            ErrorKind::UnsupportedSchemaChange,
            "Incremental replication requires a primary key",
            target
        );
    }

    let partition = keys
        .iter()
        .map(|column| quote(&column.name))
        .collect::<Vec<_>>()
        .join(", ");
    let on = keys
        .iter()
        .map(|column| {
            let name = quote(&column.name);
            format!("T.{name} = S.{name}")
        })
        .collect::<Vec<_>>()
        .join(" AND ");
    let update = columns
        .iter()
        .filter(|column| !column.is_primary_key)
        .map(|column| {
            let name = quote(&column.name);
            format!("{name} = S.{name}")
        })
        .collect::<Vec<_>>()
        .join(", ");
    let insert = columns
        .iter()
        .map(|column| quote(&column.name))
        .collect::<Vec<_>>()
        .join(", ");
    let values = columns
        .iter()
        .map(|column| format!("S.{}", quote(&column.name)))
        .collect::<Vec<_>>()
        .join(", ");

    let flag = quote(FLAG_COLUMN);
    let mut sql = format!(
        "MERGE INTO {target} AS T USING (\n    \
         SELECT {except} FROM (\n        \
         SELECT *, row_number() OVER (PARTITION BY {partition} ORDER BY {commit_ts} DESC, {flag} DESC) AS {ROW_NUMBER_ALIAS}\n        \
         FROM {source}\n    \
         ) AS ranked\n    \
         WHERE {ROW_NUMBER_ALIAS} = 1\n\
         ) AS S\n\
         ON ({on})\n",
        except = dialect.select_all_except(ROW_NUMBER_ALIAS),
        commit_ts = quote(COMMIT_TS_COLUMN),
    );
    if !update.is_empty() {
        sql.push_str(&format!(
            "WHEN MATCHED AND S.{flag} != '{DELETE_FLAG}' THEN UPDATE SET {update}\n"
        ));
    }
    sql.push_str(&format!(
        "WHEN MATCHED AND S.{flag} = '{DELETE_FLAG}' THEN DELETE\n"
    ));
    sql.push_str(&format!(
        "WHEN NOT MATCHED AND S.{flag} != '{DELETE_FLAG}' THEN INSERT ({insert}) VALUES ({values})"
    ));

    Ok(sql)
}
