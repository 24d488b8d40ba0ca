use config::shared::RunMode;
use etl::changelog::ChangeFlag;
use etl::error::ErrorKind;
use etl::test_utils::fixtures::{
    change_row, orders_columns, orders_table, write_change_log, write_schema_file,
};
use etl::test_utils::pipeline::TestEnvironment;
use etl::test_utils::source::{FIRST_POSITION, TABLE_CREATED_TS};
use telemetry::init_test_tracing;
use tidb::types::{ChangeType, TableColumn};

/// Version of the table after the schema change under test.
const CHANGED_VERSION: u64 = 200;

/// Prepares a snapshot of rows 1 and 2 and a first change-log file inserting row 3.
async fn setup_environment() -> TestEnvironment {
    let env = TestEnvironment::new();
    env.upstream
        .set_snapshot_rows(&[
            &[Some("1"), Some("10.50"), Some("new")],
            &[Some("2"), None, Some("paid")],
        ])
        .await;
    write_change_log(
        &env.storage,
        &orders_table(),
        TABLE_CREATED_TS,
        1,
        &[change_row(
            ChangeFlag::Insert,
            FIRST_POSITION + 1,
            &["3", "5.00", "new"],
        )],
    )
    .await;

    env
}

async fn change_schema(env: &TestEnvironment, columns: &[TableColumn], change_type: ChangeType) {
    write_schema_file(
        &env.storage,
        &orders_table(),
        CHANGED_VERSION,
        columns,
        change_type,
    )
    .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn added_column_is_altered_before_its_rows_are_applied() {
    init_test_tracing();

    let env = setup_environment().await;
    let mut columns = orders_columns();
    columns.push(TableColumn::new("note", "VARCHAR").with_id("4"));
    change_schema(&env, &columns, ChangeType::None).await;
    write_change_log(
        &env.storage,
        &orders_table(),
        CHANGED_VERSION,
        1,
        &[change_row(
            ChangeFlag::Insert,
            FIRST_POSITION + 2,
            &["4", "7.25", "new", "gift"],
        )],
    )
    .await;

    let pipeline = env.pipeline(RunMode::Full);
    let shutdown_tx = pipeline.shutdown_tx();
    let applied = env.connector.wait_for_increment_files(2).await;
    let handle = tokio::spawn(async move { pipeline.run().await });

    applied.notified().await;
    shutdown_tx.shutdown().unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(
        env.connector.ddl_batches().await,
        vec![vec![
            "ALTER TABLE `memory`.`orders` ADD COLUMN IF NOT EXISTS `note` STRING".to_owned()
        ]]
    );

    let table = orders_table();
    assert_eq!(env.connector.row_count(&table).await, 4);
    let row = env.connector.row(&table, &["4"]).await.unwrap();
    assert_eq!(row["note"], Some("gift".to_owned()));
}

#[tokio::test(flavor = "multi_thread")]
async fn truncate_clears_rows_applied_before_it() {
    init_test_tracing();

    let env = setup_environment().await;
    change_schema(&env, &orders_columns(), ChangeType::Truncate).await;
    write_change_log(
        &env.storage,
        &orders_table(),
        CHANGED_VERSION,
        1,
        &[change_row(
            ChangeFlag::Insert,
            FIRST_POSITION + 2,
            &["4", "7.25", "new"],
        )],
    )
    .await;

    let pipeline = env.pipeline(RunMode::Full);
    let shutdown_tx = pipeline.shutdown_tx();
    let applied = env.connector.wait_for_increment_files(2).await;
    let handle = tokio::spawn(async move { pipeline.run().await });

    applied.notified().await;
    shutdown_tx.shutdown().unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(
        env.connector.ddl_batches().await,
        vec![vec!["TRUNCATE TABLE `memory`.`orders`".to_owned()]]
    );

    let table = orders_table();
    assert_eq!(env.connector.row_count(&table).await, 1);
    assert!(env.connector.row(&table, &["4"]).await.is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn dropped_table_ends_replication() {
    init_test_tracing();

    let env = setup_environment().await;
    change_schema(&env, &orders_columns(), ChangeType::DropTable).await;

    // No shutdown is requested, the drop alone ends the run.
    env.pipeline(RunMode::Full).run().await.unwrap();

    assert_eq!(
        env.connector.ddl_batches().await,
        vec![vec!["DROP TABLE IF EXISTS `memory`.`orders`".to_owned()]]
    );
    assert!(!env.connector.table_exists(&orders_table()).await);
}

#[tokio::test(flavor = "multi_thread")]
async fn tightening_nullability_stops_replication() {
    init_test_tracing();

    let env = setup_environment().await;
    let columns: Vec<TableColumn> = orders_columns()
        .into_iter()
        .map(|column| {
            if column.name == "status" {
                column.not_null()
            } else {
                column
            }
        })
        .collect();
    change_schema(&env, &columns, ChangeType::None).await;

    let err = env.pipeline(RunMode::Full).run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::IncrementLoadFailed);
    assert!(err.caused_by(ErrorKind::UnsupportedDdl));
    assert!(env.connector.ddl_batches().await.is_empty());
    // Rows of the version before the change were applied.
    assert_eq!(env.connector.row_count(&orders_table()).await, 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn renamed_table_stops_replication() {
    init_test_tracing();

    let env = setup_environment().await;
    change_schema(&env, &orders_columns(), ChangeType::RenameTable).await;

    let err = env.pipeline(RunMode::Full).run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::IncrementLoadFailed);
    assert!(err.caused_by(ErrorKind::UnsupportedDdl));
}

#[tokio::test(flavor = "multi_thread")]
async fn dropped_primary_key_column_stops_replication() {
    init_test_tracing();

    let env = setup_environment().await;
    let columns: Vec<TableColumn> = orders_columns()
        .into_iter()
        .filter(|column| !column.is_primary_key)
        .collect();
    change_schema(&env, &columns, ChangeType::None).await;

    let err = env.pipeline(RunMode::Full).run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::IncrementLoadFailed);
    assert!(err.caused_by(ErrorKind::UnsupportedSchemaChange));
}
