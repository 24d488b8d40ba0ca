use std::collections::BTreeMap;

use chrono::Utc;
use config::shared::RunMode;
use etl::changelog::ChangeFlag;
use etl::changelog::layout::table_prefix;
use etl::error::ErrorKind;
use etl::source::StartPosition;
use etl::state::markers::{
    INCREMENT_LOADINFO, INCREMENT_METADATA, SNAPSHOT_LOADINFO, SNAPSHOT_METADATA,
    SnapshotLoadInfo, write_snapshot_load_info,
};
use etl::state::stage::Stage;
use etl::test_utils::fixtures::{
    change_row, orders_columns, orders_table, test_config, write_change_log, write_checkpoint,
    write_schema_file, write_snapshot_file,
};
use etl::test_utils::pipeline::TestEnvironment;
use etl::test_utils::source::{FIRST_POSITION, TABLE_CREATED_TS};
use telemetry::init_test_tracing;
use tidb::types::ChangeType;

const SNAPSHOT_FILE: &str = "snapshot/sales.orders.000000000.csv";

async fn with_snapshot_rows(env: &TestEnvironment) {
    env.upstream
        .set_snapshot_rows(&[
            &[Some("1"), Some("10.50"), Some("new")],
            &[Some("2"), None, Some("paid")],
        ])
        .await;
}

/// Writes the change log of the initial table version: row 2 ships and row 3 is inserted.
async fn with_initial_changes(env: &TestEnvironment) {
    write_change_log(
        &env.storage,
        &orders_table(),
        TABLE_CREATED_TS,
        1,
        &[
            change_row(ChangeFlag::Update, FIRST_POSITION + 1, &["2", "20.00", "shipped"]),
            change_row(ChangeFlag::Insert, FIRST_POSITION + 2, &["3", "5.00", "new"]),
        ],
    )
    .await;
}

/// Leaves the storage root the way a finished changefeed setup and snapshot dump leave it.
async fn with_dumped_snapshot(env: &TestEnvironment) {
    let table = orders_table();
    write_schema_file(
        &env.storage,
        &table,
        TABLE_CREATED_TS,
        &orders_columns(),
        ChangeType::None,
    )
    .await;
    write_checkpoint(&env.storage, FIRST_POSITION).await;
    write_snapshot_file(
        &env.storage,
        &table,
        0,
        &[
            &[Some("1"), Some("10.50"), Some("new")],
            &[Some("2"), None, Some("paid")],
        ],
    )
    .await;
    env.storage
        .put(SNAPSHOT_METADATA, "SHOW MASTER STATUS:\n\tPos: 1000\n")
        .await;
}

fn status(row: Option<BTreeMap<String, Option<String>>>) -> Option<String> {
    row.and_then(|row| row.get("status").cloned().flatten())
}

#[tokio::test(flavor = "multi_thread")]
async fn full_run_replicates_snapshot_and_changes() {
    init_test_tracing();

    let env = TestEnvironment::new();
    with_snapshot_rows(&env).await;
    with_initial_changes(&env).await;

    let pipeline = env.pipeline(RunMode::Full);
    let shutdown_tx = pipeline.shutdown_tx();
    let applied = env.connector.wait_for_increment_files(1).await;
    let handle = tokio::spawn(async move { pipeline.run().await });

    applied.notified().await;
    shutdown_tx.shutdown().unwrap();
    let context = handle.await.unwrap().unwrap();

    assert_eq!(context.stage, Stage::Init);
    assert_eq!(context.start, StartPosition::Tso(FIRST_POSITION));
    assert_eq!(env.upstream.source().position_requests().await, 1);

    // The changefeed and the dump share the acquired position.
    let changefeeds = env.upstream.changefeeds().await;
    assert_eq!(changefeeds.len(), 1);
    assert_eq!(changefeeds[0].start, StartPosition::Tso(FIRST_POSITION));
    assert_eq!(changefeeds[0].sink_uri.as_str(), "s3://bucket/etl/increment");
    let dumps = env.upstream.dumps().await;
    assert_eq!(dumps.len(), 1);
    assert_eq!(dumps[0].start, StartPosition::Tso(FIRST_POSITION));
    assert_eq!(dumps[0].output_uri.as_str(), "s3://bucket/etl/snapshot");

    assert_eq!(env.connector.snapshot_files().await, vec![SNAPSHOT_FILE]);
    assert!(env.storage.contents(SNAPSHOT_LOADINFO).await.is_some());
    assert!(env.storage.contents(INCREMENT_LOADINFO).await.is_some());

    let table = orders_table();
    assert_eq!(env.connector.row_count(&table).await, 3);
    assert_eq!(
        status(env.connector.row(&table, &["1"]).await),
        Some("new".to_owned())
    );
    assert_eq!(
        status(env.connector.row(&table, &["2"]).await),
        Some("shipped".to_owned())
    );
    assert_eq!(
        status(env.connector.row(&table, &["3"]).await),
        Some("new".to_owned())
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn resuming_after_the_dump_only_loads() {
    init_test_tracing();

    let env = TestEnvironment::new();
    with_dumped_snapshot(&env).await;

    let pipeline = env.pipeline(RunMode::Full);
    pipeline.shutdown_tx().shutdown().unwrap();
    let context = pipeline.run().await.unwrap();

    assert_eq!(context.stage, Stage::SnapshotDumped);
    assert_eq!(context.start, StartPosition::Current);
    assert_eq!(env.upstream.source().position_requests().await, 0);
    assert!(env.upstream.changefeeds().await.is_empty());
    assert!(env.upstream.dumps().await.is_empty());

    assert_eq!(env.connector.created_tables().await.len(), 1);
    assert_eq!(env.connector.row_count(&orders_table()).await, 2);
    assert!(env.storage.contents(SNAPSHOT_LOADINFO).await.is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn resuming_after_the_snapshot_load_only_applies_changes() {
    init_test_tracing();

    let env = TestEnvironment::new();
    with_dumped_snapshot(&env).await;
    with_initial_changes(&env).await;
    let load_info = SnapshotLoadInfo {
        table: orders_table().to_string(),
        files: vec![SNAPSHOT_FILE.to_owned()],
        loaded_at: Utc::now(),
    };
    write_snapshot_load_info(&env.storage, &load_info)
        .await
        .unwrap();

    let pipeline = env.pipeline(RunMode::Full);
    let shutdown_tx = pipeline.shutdown_tx();
    let applied = env.connector.wait_for_increment_files(1).await;
    let handle = tokio::spawn(async move { pipeline.run().await });

    applied.notified().await;
    shutdown_tx.shutdown().unwrap();
    let context = handle.await.unwrap().unwrap();

    assert_eq!(context.stage, Stage::SnapshotLoaded);
    assert!(env.upstream.changefeeds().await.is_empty());
    assert!(env.upstream.dumps().await.is_empty());
    assert!(env.connector.snapshot_files().await.is_empty());
    // The loaded table is kept, creating it again is a no-op.
    let created = env.connector.created_tables().await;
    assert_eq!(created.len(), 1);
    assert!(created[0].starts_with("CREATE TABLE IF NOT EXISTS `memory`.`orders`"));

    // Only the change log reached the destination.
    let table = orders_table();
    assert_eq!(env.connector.row_count(&table).await, 2);
    assert_eq!(
        status(env.connector.row(&table, &["2"]).await),
        Some("shipped".to_owned())
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn snapshot_only_mode_stops_after_the_load() {
    init_test_tracing();

    let env = TestEnvironment::new();
    with_snapshot_rows(&env).await;

    let context = env.pipeline(RunMode::SnapshotOnly).run().await.unwrap();

    assert_eq!(context.start, StartPosition::Current);
    assert_eq!(env.upstream.source().position_requests().await, 0);
    assert!(env.upstream.changefeeds().await.is_empty());
    let dumps = env.upstream.dumps().await;
    assert_eq!(dumps.len(), 1);
    assert_eq!(dumps[0].start, StartPosition::Current);

    assert_eq!(env.connector.row_count(&orders_table()).await, 2);
    assert!(env.storage.contents(SNAPSHOT_LOADINFO).await.is_some());
    assert!(env.storage.contents(INCREMENT_METADATA).await.is_none());
    assert!(env.connector.increment_files().await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn incremental_only_mode_skips_the_snapshot() {
    init_test_tracing();

    let env = TestEnvironment::new();
    with_snapshot_rows(&env).await;
    with_initial_changes(&env).await;

    let pipeline = env.pipeline(RunMode::IncrementalOnly);
    let shutdown_tx = pipeline.shutdown_tx();
    let applied = env.connector.wait_for_increment_files(1).await;
    let handle = tokio::spawn(async move { pipeline.run().await });

    applied.notified().await;
    shutdown_tx.shutdown().unwrap();
    let context = handle.await.unwrap().unwrap();

    assert_eq!(context.start, StartPosition::Current);
    assert_eq!(env.upstream.source().position_requests().await, 0);
    let changefeeds = env.upstream.changefeeds().await;
    assert_eq!(changefeeds.len(), 1);
    assert_eq!(changefeeds[0].start, StartPosition::Current);
    assert!(env.upstream.dumps().await.is_empty());
    let created = env.connector.created_tables().await;
    assert_eq!(created.len(), 1);
    assert!(created[0].starts_with("CREATE TABLE IF NOT EXISTS `memory`.`orders`"));

    // Without a snapshot the destination only holds what the change log touched.
    assert_eq!(env.connector.row_count(&orders_table()).await, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn cloud_mode_loads_externally_produced_files() {
    init_test_tracing();

    let env = TestEnvironment::new();
    with_dumped_snapshot(&env).await;
    with_initial_changes(&env).await;

    let pipeline = env.pipeline(RunMode::Cloud);
    let shutdown_tx = pipeline.shutdown_tx();
    let applied = env.connector.wait_for_increment_files(1).await;
    let handle = tokio::spawn(async move { pipeline.run().await });

    applied.notified().await;
    shutdown_tx.shutdown().unwrap();
    let context = handle.await.unwrap().unwrap();

    assert_eq!(context.stage, Stage::SnapshotDumped);
    assert_eq!(context.start, StartPosition::Current);
    assert!(env.upstream.changefeeds().await.is_empty());
    assert!(env.upstream.dumps().await.is_empty());

    let table = orders_table();
    assert_eq!(env.connector.snapshot_files().await, vec![SNAPSHOT_FILE]);
    assert_eq!(env.connector.row_count(&table).await, 3);
    assert_eq!(
        status(env.connector.row(&table, &["2"]).await),
        Some("shipped".to_owned())
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_progress_check_runs_nothing() {
    init_test_tracing();

    let env = TestEnvironment::new();
    env.storage.fail_on(INCREMENT_METADATA).await;

    let err = env.pipeline(RunMode::Full).run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::StorageCheckFailed);
    assert_eq!(env.upstream.source().position_requests().await, 0);
    assert!(env.upstream.changefeeds().await.is_empty());
    assert!(env.upstream.dumps().await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_source_fails_position_acquisition() {
    init_test_tracing();

    let env = TestEnvironment::new();
    env.upstream.source().fail_position(true).await;

    let err = env.pipeline(RunMode::Full).run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::PositionAcquisitionFailed);
    assert!(err.caused_by(ErrorKind::SourceConnectionFailed));
    assert!(env.upstream.changefeeds().await.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn rejected_changefeed_fails_capture_setup() {
    init_test_tracing();

    let env = TestEnvironment::new();
    env.upstream.fail_changefeed(true).await;

    let err = env.pipeline(RunMode::Full).run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::CaptureSetupFailed);
    assert!(env.upstream.dumps().await.is_empty());
    assert!(env.storage.contents(INCREMENT_METADATA).await.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_dump_resumes_without_a_second_changefeed() {
    init_test_tracing();

    let env = TestEnvironment::new();
    with_snapshot_rows(&env).await;
    env.upstream.fail_dump(true).await;

    let err = env.pipeline(RunMode::Full).run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SnapshotDumpFailed);
    assert!(env.storage.contents(SNAPSHOT_METADATA).await.is_none());
    assert!(env.storage.contents(SNAPSHOT_LOADINFO).await.is_none());

    env.upstream.fail_dump(false).await;
    let pipeline = env.pipeline(RunMode::Full);
    pipeline.shutdown_tx().shutdown().unwrap();
    let context = pipeline.run().await.unwrap();

    assert_eq!(context.stage, Stage::ChangefeedCreated);
    assert_eq!(env.upstream.changefeeds().await.len(), 1);
    assert_eq!(env.upstream.dumps().await.len(), 2);
    assert_eq!(env.connector.row_count(&orders_table()).await, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_snapshot_load_is_retried_from_scratch() {
    init_test_tracing();

    let env = TestEnvironment::new();
    with_dumped_snapshot(&env).await;
    env.connector.fail_on(SNAPSHOT_FILE).await;

    let err = env.pipeline(RunMode::Full).run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SnapshotLoadFailed);
    assert!(err.caused_by(ErrorKind::DestinationQueryFailed));
    assert!(env.storage.contents(SNAPSHOT_LOADINFO).await.is_none());

    env.connector.clear_failures().await;
    let pipeline = env.pipeline(RunMode::Full);
    pipeline.shutdown_tx().shutdown().unwrap();
    let context = pipeline.run().await.unwrap();

    assert_eq!(context.stage, Stage::SnapshotDumped);
    assert_eq!(env.connector.created_tables().await.len(), 2);
    assert_eq!(env.connector.row_count(&orders_table()).await, 2);
    assert!(env.storage.contents(SNAPSHOT_LOADINFO).await.is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_change_log_file_stops_incremental_replication() {
    init_test_tracing();

    let env = TestEnvironment::new();
    with_snapshot_rows(&env).await;
    with_initial_changes(&env).await;
    let change_log = format!("{}{TABLE_CREATED_TS}/CDC000001.csv", table_prefix(&orders_table()));
    env.connector.fail_on(&change_log).await;

    let err = env.pipeline(RunMode::Full).run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::IncrementLoadFailed);
    assert!(err.caused_by(ErrorKind::DestinationQueryFailed));
    assert!(env.connector.increment_files().await.is_empty());
    // The snapshot stays loaded, so a restart resumes with the change log.
    assert!(env.storage.contents(SNAPSHOT_LOADINFO).await.is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_table_name_is_a_configuration_error() {
    init_test_tracing();

    let env = TestEnvironment::new();
    let mut config = test_config(RunMode::Full);
    config.table = "orders".to_owned();

    let err = env.pipeline_with_config(config).run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConfigError);
    assert_eq!(env.upstream.source().position_requests().await, 0);
    assert!(env.upstream.changefeeds().await.is_empty());
}
