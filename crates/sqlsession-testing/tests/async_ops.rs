//! Background operations, deadlines and cancellation.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::time::Duration;

use futures_util::future::join_all;
use sqlsession::{Config, Context, Db, Error, ExecOutcome, SqlValue};
use sqlsession_testing::{MockDatabase, MockEvent, fixtures};
use tokio_util::sync::CancellationToken;

fn setup() -> (MockDatabase, Db) {
    fixtures::init_tracing();
    let mock = MockDatabase::new();
    let db = Db::new(mock.handle());
    (mock, db)
}

// =============================================================================
// query_async / exec_async
// =============================================================================

#[tokio::test]
async fn test_query_async_delivers_cursor() {
    let (mock, db) = setup();
    mock.expect_query(fixtures::USERS_SQL).returning(fixtures::users());

    let session = db.session().unwrap();
    let pending = session.query_async(&Context::new(), fixtures::USERS_SQL, &[]);
    let rows = pending.await.unwrap().fetch_all().await.unwrap();

    assert_eq!(rows.len(), 3);
    assert_eq!(rows[2].get::<String>("name").unwrap(), "cy");
    mock.verify().unwrap();
}

#[tokio::test]
async fn test_exec_async_in_transaction() {
    let (mock, db) = setup();
    mock.expect_begin();
    mock.expect_exec("INSERT INTO t (v) VALUES (?)")
        .with_args([SqlValue::Int(5)])
        .returning_outcome(ExecOutcome::new(11, 1));
    mock.expect_commit();

    let ctx = Context::new();
    let session = db.session().unwrap();
    let tx = session.begin(&ctx).await.unwrap();
    let res = tx
        .exec_async(&ctx, "INSERT INTO t (v) VALUES (?)", &[&5i64])
        .await
        .unwrap();
    tx.commit(&ctx).await.unwrap();

    assert_eq!(res.last_insert_id, 11);
    assert_eq!(
        mock.count(|e| matches!(e, MockEvent::Exec { in_tx: true, .. })),
        1
    );
    mock.verify().unwrap();
}

#[tokio::test]
async fn test_exec_async_on_finished_transaction() {
    let (mock, db) = setup();
    mock.expect_begin();
    mock.expect_commit();

    let ctx = Context::new();
    let session = db.session().unwrap();
    let tx = session.begin(&ctx).await.unwrap();
    tx.commit(&ctx).await.unwrap();

    let err = tx.exec_async(&ctx, "DELETE FROM t", &[]).await.unwrap_err();
    assert!(err.is_transaction_done());
}

#[tokio::test]
async fn test_bad_parameter_fails_before_submission() {
    let (mock, db) = setup();
    let session = db.session().unwrap();

    // A list nested in an option cannot become a single parameter.
    let nested: Option<Vec<i64>> = Some(vec![1, 2]);
    let err = session
        .exec_async(&Context::new(), "DELETE FROM t WHERE id = ?", &[&nested])
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Type(_)));
    assert!(mock.events().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_async_queries_share_one_timer() {
    const CALLS: usize = 8;

    let (mock, db) = setup();
    for _ in 0..CALLS {
        mock.expect_query("SELECT n FROM counters")
            .returning(fixtures::ints("n", &[1]));
    }

    let ctx = Context::new();
    let session = db.session().unwrap();
    let pending: Vec<_> = (0..CALLS)
        .map(|_| session.query_async(&ctx, "SELECT n FROM counters", &[]))
        .collect();

    for cursor in join_all(pending).await {
        let rows = cursor.unwrap().fetch_all().await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    let timer = db.metrics().timer("SELECT n FROM counters").unwrap();
    assert_eq!(timer.count(), CALLS as u64);
    assert_eq!(db.metrics().queries().count(), CALLS as u64);
    mock.verify().unwrap();
}

// =============================================================================
// Deadlines
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_command_timeout_applies_to_slow_driver() {
    fixtures::init_tracing();
    let mock = MockDatabase::new();
    mock.expect_query("SELECT pg_sleep(10)")
        .with_delay(Duration::from_secs(10));
    let db = Db::builder(mock.handle())
        .config(Config::new().command_timeout(Duration::from_millis(500)))
        .build()
        .unwrap();

    let session = db.session().unwrap();
    let err = session
        .query(&Context::new(), "SELECT pg_sleep(10)", &[])
        .await
        .unwrap_err();

    assert!(matches!(err, Error::CommandTimeout));
    assert!(err.is_transient());
    assert_eq!(db.metrics().errors().count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_context_deadline_wins_over_config() {
    fixtures::init_tracing();
    let mock = MockDatabase::new();
    mock.expect_exec("VACUUM").with_delay(Duration::from_secs(2));
    let db = Db::builder(mock.handle())
        .config(Config::new().command_timeout(Duration::from_secs(1)))
        .build()
        .unwrap();

    // A longer caller deadline replaces the configured default.
    let ctx = Context::new().with_timeout(Duration::from_secs(5));
    let session = db.session().unwrap();
    session.exec(&ctx, "VACUUM", &[]).await.unwrap();
    mock.verify().unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_timeout_on_begin() {
    let (mock, db) = setup();
    mock.expect_begin().with_delay(Duration::from_secs(3));

    let ctx = Context::new().with_timeout(Duration::from_secs(1));
    let session = db.session().unwrap();
    let err = session.begin(&ctx).await.unwrap_err();

    assert!(matches!(err, Error::CommandTimeout));
    assert!(!session.is_tx());
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn test_cancelled_context_never_reaches_driver() {
    let (mock, db) = setup();
    let token = CancellationToken::new();
    token.cancel();

    let ctx = Context::new().with_cancellation(token);
    let session = db.session().unwrap();
    let err = session.exec(&ctx, "DELETE FROM t", &[]).await.unwrap_err();

    assert!(matches!(err, Error::Cancelled));
    assert!(mock.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_call() {
    let (mock, db) = setup();
    mock.expect_query("SELECT pg_sleep(60)")
        .with_delay(Duration::from_secs(60));

    let token = CancellationToken::new();
    let ctx = Context::new().with_cancellation(token.clone());
    let session = db.session().unwrap();

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        token.cancel();
    });
    let err = session
        .query(&ctx, "SELECT pg_sleep(60)", &[])
        .await
        .unwrap_err();
    canceller.await.unwrap();

    assert!(matches!(err, Error::Cancelled));
}
