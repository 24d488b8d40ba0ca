use config::shared::SourceConfig;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::{MySqlPool, Row};

use crate::types::{TableColumn, TableName};

/// Connects to the source cluster with a small pool; the replicator only runs metadata queries.
pub async fn connect_to_source_database(
    config: &SourceConfig,
    max_connections: u32,
) -> Result<MySqlPool, sqlx::Error> {
    MySqlPoolOptions::new()
        .max_connections(max_connections)
        .connect_with(config.connect_options())
        .await
}

/// Returns the current TSO of the cluster, a consistency point usable as a snapshot position and
/// as the start position of a changefeed.
pub async fn get_current_tso(pool: &MySqlPool) -> Result<u64, sqlx::Error> {
    let row = sqlx::query("SELECT CAST(TIDB_CURRENT_TSO() AS UNSIGNED) AS tso")
        .fetch_one(pool)
        .await?;

    row.try_get("tso")
}

/// Reads the columns of `table` from `information_schema`, ordered by position.
///
/// The result uses the same representation as captured schema files. Column ids are not
/// exposed by `information_schema` and stay empty.
pub async fn get_table_columns(
    pool: &MySqlPool,
    table: &TableName,
) -> Result<Vec<TableColumn>, sqlx::Error> {
    let query = r#"
        SELECT
            c.column_name AS column_name,
            c.data_type AS data_type,
            c.column_type AS column_type,
            CAST(c.character_maximum_length AS SIGNED) AS character_maximum_length,
            CAST(c.numeric_precision AS SIGNED) AS numeric_precision,
            CAST(c.numeric_scale AS SIGNED) AS numeric_scale,
            CAST(c.datetime_precision AS SIGNED) AS datetime_precision,
            c.is_nullable AS is_nullable,
            c.column_key AS column_key
        FROM information_schema.columns c
        WHERE c.table_schema = ?
        AND c.table_name = ?
        ORDER BY c.ordinal_position
    "#;

    let rows = sqlx::query(query)
        .bind(&table.schema)
        .bind(&table.name)
        .fetch_all(pool)
        .await?;

    let mut columns = Vec::with_capacity(rows.len());
    for row in rows {
        let name: String = row.try_get("column_name")?;
        let data_type: String = row.try_get("data_type")?;
        let column_type: String = row.try_get("column_type")?;
        let max_length: Option<i64> = row.try_get("character_maximum_length")?;
        let numeric_precision: Option<i64> = row.try_get("numeric_precision")?;
        let numeric_scale: Option<i64> = row.try_get("numeric_scale")?;
        let datetime_precision: Option<i64> = row.try_get("datetime_precision")?;
        let is_nullable: String = row.try_get("is_nullable")?;
        let column_key: String = row.try_get("column_key")?;

        let base_type = data_type.to_ascii_uppercase();
        let mut type_name = base_type.clone();
        if column_type.to_ascii_lowercase().contains("unsigned") {
            type_name.push_str(" UNSIGNED");
        }

        let (precision, scale) = match base_type.as_str() {
            "DECIMAL" | "NUMERIC" => (numeric_precision, numeric_scale),
            "BIT" => (numeric_precision, None),
            "DATETIME" | "TIMESTAMP" | "TIME" => (None, datetime_precision),
            _ => (max_length, None),
        };

        let mut column = TableColumn::new(name, type_name);
        column.precision = precision.map(|value| value.to_string());
        column.scale = scale.map(|value| value.to_string());
        column.nullable = is_nullable.eq_ignore_ascii_case("YES");
        column.is_primary_key = column_key.eq_ignore_ascii_case("PRI");

        columns.push(column);
    }

    Ok(columns)
}
