use config::shared::RunMode;
use etl::changelog::ChangeFlag;
use etl::changelog::layout::table_prefix;
use etl::error::ErrorKind;
use etl::failpoints::{
    AFTER_CHANGEFEED_CREATED, BEFORE_INCREMENT_PROGRESS_SAVED, BEFORE_SNAPSHOT_LOADINFO,
};
use etl::state::markers::{INCREMENT_LOADINFO, INCREMENT_METADATA, SNAPSHOT_LOADINFO};
use etl::state::stage::Stage;
use etl::test_utils::failpoints::FailpointGuard;
use etl::test_utils::fixtures::{change_row, orders_table, write_change_log};
use etl::test_utils::pipeline::TestEnvironment;
use etl::test_utils::source::{FIRST_POSITION, TABLE_CREATED_TS};
use telemetry::init_test_tracing;

async fn setup_environment() -> TestEnvironment {
    let env = TestEnvironment::new();
    env.upstream
        .set_snapshot_rows(&[
            &[Some("1"), Some("10.50"), Some("new")],
            &[Some("2"), None, Some("paid")],
        ])
        .await;

    env
}

fn change_log_file(index: u64) -> String {
    format!(
        "{}{TABLE_CREATED_TS}/CDC{index:06}.csv",
        table_prefix(&orders_table())
    )
}

#[tokio::test(flavor = "multi_thread")]
async fn crash_after_changefeed_creation_resumes_with_the_dump() {
    init_test_tracing();
    let mut failpoints = FailpointGuard::setup();
    failpoints.arm(AFTER_CHANGEFEED_CREATED, "return");

    let env = setup_environment().await;

    let err = env.pipeline(RunMode::Full).run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InjectedFailure);
    assert!(env.storage.contents(INCREMENT_METADATA).await.is_some());
    assert!(env.upstream.dumps().await.is_empty());

    failpoints.disarm(AFTER_CHANGEFEED_CREATED);
    let pipeline = env.pipeline(RunMode::Full);
    pipeline.shutdown_tx().shutdown().unwrap();
    let context = pipeline.run().await.unwrap();

    assert_eq!(context.stage, Stage::ChangefeedCreated);
    assert_eq!(env.upstream.changefeeds().await.len(), 1);
    assert_eq!(env.upstream.dumps().await.len(), 1);
    assert_eq!(env.connector.row_count(&orders_table()).await, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn crash_before_snapshot_loadinfo_reloads_without_duplicates() {
    init_test_tracing();
    let mut failpoints = FailpointGuard::setup();
    failpoints.arm(BEFORE_SNAPSHOT_LOADINFO, "return");

    let env = setup_environment().await;

    let err = env.pipeline(RunMode::Full).run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SnapshotLoadFailed);
    assert!(err.caused_by(ErrorKind::InjectedFailure));
    assert_eq!(env.connector.row_count(&orders_table()).await, 2);
    assert!(env.storage.contents(SNAPSHOT_LOADINFO).await.is_none());

    failpoints.disarm(BEFORE_SNAPSHOT_LOADINFO);
    let pipeline = env.pipeline(RunMode::Full);
    pipeline.shutdown_tx().shutdown().unwrap();
    let context = pipeline.run().await.unwrap();

    assert_eq!(context.stage, Stage::SnapshotDumped);
    assert_eq!(env.connector.created_tables().await.len(), 2);
    assert_eq!(env.connector.snapshot_files().await.len(), 2);
    assert_eq!(env.connector.row_count(&orders_table()).await, 2);
    assert!(env.storage.contents(SNAPSHOT_LOADINFO).await.is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn crash_before_increment_progress_replays_the_last_file() {
    init_test_tracing();
    let mut failpoints = FailpointGuard::setup();
    failpoints.arm(BEFORE_INCREMENT_PROGRESS_SAVED, "1*return");

    let env = setup_environment().await;
    let table = orders_table();
    write_change_log(
        &env.storage,
        &table,
        TABLE_CREATED_TS,
        1,
        &[change_row(
            ChangeFlag::Insert,
            FIRST_POSITION + 1,
            &["3", "5.00", "new"],
        )],
    )
    .await;
    write_change_log(
        &env.storage,
        &table,
        TABLE_CREATED_TS,
        2,
        &[change_row(
            ChangeFlag::Update,
            FIRST_POSITION + 2,
            &["3", "5.00", "shipped"],
        )],
    )
    .await;

    let err = env.pipeline(RunMode::Full).run().await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::IncrementLoadFailed);
    assert!(err.caused_by(ErrorKind::InjectedFailure));
    assert_eq!(env.connector.increment_files().await, vec![change_log_file(1)]);

    // The restarted process has no fault configured.
    failpoints.disarm(BEFORE_INCREMENT_PROGRESS_SAVED);
    let pipeline = env.pipeline(RunMode::Full);
    let shutdown_tx = pipeline.shutdown_tx();
    let applied = env.connector.wait_for_increment_files(3).await;
    let handle = tokio::spawn(async move { pipeline.run().await });

    applied.notified().await;
    shutdown_tx.shutdown().unwrap();
    let context = handle.await.unwrap().unwrap();

    assert_eq!(context.stage, Stage::SnapshotLoaded);
    assert_eq!(
        env.connector.increment_files().await,
        vec![change_log_file(1), change_log_file(1), change_log_file(2)]
    );
    assert!(env.storage.contents(INCREMENT_LOADINFO).await.is_some());

    // Replaying the first file merges instead of duplicating.
    assert_eq!(env.connector.row_count(&table).await, 3);
    let row = env.connector.row(&table, &["3"]).await.unwrap();
    assert_eq!(row["status"], Some("shipped".to_owned()));
}
