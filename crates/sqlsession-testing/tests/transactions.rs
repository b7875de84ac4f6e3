//! Transaction tests against the mock driver.
//!
//! Nested scopes must reach the driver exactly once, at the outermost
//! commit or rollback, and `run_in_tx` must never commit after an error or
//! a panic.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use sqlsession::{Context, Db, Error, ExecOutcome, Result, SqlValue};
use sqlsession_testing::{MockDatabase, MockEvent, fixtures};

fn setup() -> (MockDatabase, Db) {
    fixtures::init_tracing();
    let mock = MockDatabase::new();
    let db = Db::new(mock.handle());
    (mock, db)
}

fn commits(mock: &MockDatabase) -> usize {
    mock.count(|e| matches!(e, MockEvent::Commit))
}

fn rollbacks(mock: &MockDatabase) -> usize {
    mock.count(|e| matches!(e, MockEvent::Rollback))
}

// =============================================================================
// Nesting
// =============================================================================

#[tokio::test]
async fn test_single_transaction_commits() {
    let (mock, db) = setup();
    mock.expect_begin();
    mock.expect_exec("UPDATE users SET active = ?")
        .returning_outcome(ExecOutcome::new(0, 3));
    mock.expect_commit();

    let ctx = Context::new();
    let session = db.session().unwrap();
    assert!(!session.is_tx());
    assert_eq!(session.depth(), 0);

    let tx = session.begin(&ctx).await.unwrap();
    assert!(tx.is_tx());
    assert_eq!(tx.depth(), 1);

    let res = tx.exec(&ctx, "UPDATE users SET active = ?", &[&false]).await.unwrap();
    assert_eq!(res.rows_affected, 3);
    tx.commit(&ctx).await.unwrap();
    assert_eq!(tx.depth(), 0);

    mock.verify().unwrap();
    let in_tx = mock.count(|e| matches!(e, MockEvent::Exec { in_tx: true, .. }));
    assert_eq!(in_tx, 1);
}

#[tokio::test]
async fn test_nested_begin_commit_reaches_driver_once() {
    let (mock, db) = setup();
    mock.expect_begin();
    mock.expect_commit();

    let ctx = Context::new();
    let mut root = db.session().unwrap();
    let outer = root.begin(&ctx).await.unwrap();
    let inner = outer.begin(&ctx).await.unwrap();

    // Depth is shared by every handle on the transaction.
    assert_eq!(inner.depth(), 2);
    assert_eq!(outer.depth(), 2);

    inner.commit(&ctx).await.unwrap();
    assert_eq!(commits(&mock), 0);
    assert_eq!(outer.depth(), 1);

    outer.commit(&ctx).await.unwrap();
    assert_eq!(commits(&mock), 1);

    drop(inner);
    drop(outer);
    root.close().unwrap();
    assert_eq!(db.pool_stats().sessions.in_use, 0);
    mock.verify().unwrap();
}

#[tokio::test]
async fn test_nested_writes_commit_once_and_release_slots() {
    let (mock, db) = setup();
    mock.expect_begin();
    mock.expect_exec("INSERT INTO users (name) VALUES (?)")
        .returning_outcome(ExecOutcome::new(1, 1));
    mock.expect_exec("UPDATE users SET name = ? WHERE id = ?")
        .with_args([SqlValue::String("ann b".into()), SqlValue::Int(1)])
        .returning_outcome(ExecOutcome::new(0, 1));
    mock.expect_query("SELECT name FROM users WHERE id = ?")
        .returning(fixtures::scalar(
            "name",
            sqlsession::ValueKind::String,
            SqlValue::String("ann b".into()),
        ));
    mock.expect_commit();

    let ctx = Context::new();
    let mut root = db.session().unwrap();
    let tx = root.begin(&ctx).await.unwrap();
    let res = tx
        .exec(&ctx, "INSERT INTO users (name) VALUES (?)", &[&"ann"])
        .await
        .unwrap();
    assert_eq!(res.last_insert_id, 1);

    let nested = tx.begin(&ctx).await.unwrap();
    assert_eq!(nested.depth(), 2);
    nested
        .exec(
            &ctx,
            "UPDATE users SET name = ? WHERE id = ?",
            &[&"ann b", &res.last_insert_id],
        )
        .await
        .unwrap();
    let name: String = nested
        .get(&ctx, "SELECT name FROM users WHERE id = ?", &[&res.last_insert_id])
        .await
        .unwrap();
    assert_eq!(name, "ann b");

    nested.commit(&ctx).await.unwrap();
    assert_eq!(nested.depth(), 1);
    assert_eq!(commits(&mock), 0);

    tx.commit(&ctx).await.unwrap();
    assert_eq!(commits(&mock), 1);

    assert!(db.pool_stats().values.in_use > 0);
    root.close().unwrap();
    assert_eq!(db.pool_stats().values.in_use, 0);
    mock.verify().unwrap();
}

#[tokio::test]
async fn test_many_nested_scopes_commit_once() {
    const DEPTH: usize = 10;

    let (mock, db) = setup();
    mock.expect_begin();
    mock.expect_commit();

    let ctx = Context::new();
    let root = db.session().unwrap();
    let mut scopes = vec![root.begin(&ctx).await.unwrap()];
    for _ in 1..DEPTH {
        let next = scopes.last().unwrap().begin(&ctx).await.unwrap();
        scopes.push(next);
    }
    assert_eq!(scopes[0].depth(), DEPTH);

    for scope in scopes.iter().rev() {
        scope.commit(&ctx).await.unwrap();
    }

    assert_eq!(commits(&mock), 1);
    assert_eq!(mock.count(|e| matches!(e, MockEvent::Begin)), 1);
    mock.verify().unwrap();
}

#[tokio::test]
async fn test_inner_rollback_then_outer_commit() {
    let (mock, db) = setup();
    mock.expect_begin();
    mock.expect_commit();

    let ctx = Context::new();
    let root = db.session().unwrap();
    let outer = root.begin(&ctx).await.unwrap();
    let inner = outer.begin(&ctx).await.unwrap();

    inner.rollback(&ctx).await.unwrap();
    assert_eq!(rollbacks(&mock), 0);
    outer.commit(&ctx).await.unwrap();

    assert_eq!(commits(&mock), 1);
    assert_eq!(rollbacks(&mock), 0);
    mock.verify().unwrap();
}

#[tokio::test]
async fn test_outer_rollback() {
    let (mock, db) = setup();
    mock.expect_begin();
    mock.expect_rollback();

    let ctx = Context::new();
    let root = db.session().unwrap();
    let outer = root.begin(&ctx).await.unwrap();
    let inner = outer.begin(&ctx).await.unwrap();
    inner.commit(&ctx).await.unwrap();
    outer.rollback(&ctx).await.unwrap();

    assert_eq!(rollbacks(&mock), 1);
    assert_eq!(commits(&mock), 0);
    mock.verify().unwrap();
}

// =============================================================================
// Error states
// =============================================================================

#[tokio::test]
async fn test_commit_outside_transaction() {
    let (mock, db) = setup();
    let ctx = Context::new();
    let session = db.session().unwrap();

    assert!(session.commit(&ctx).await.unwrap_err().is_not_in_transaction());
    assert!(session.rollback(&ctx).await.unwrap_err().is_not_in_transaction());
    assert!(mock.events().is_empty());
}

#[tokio::test]
async fn test_finished_transaction_rejects_work() {
    let (mock, db) = setup();
    mock.expect_begin();
    mock.expect_commit();

    let ctx = Context::new();
    let root = db.session().unwrap();
    let tx = root.begin(&ctx).await.unwrap();
    tx.commit(&ctx).await.unwrap();

    assert!(tx.commit(&ctx).await.unwrap_err().is_transaction_done());
    assert!(tx.rollback(&ctx).await.unwrap_err().is_transaction_done());
    assert!(tx.query(&ctx, "SELECT 1", &[]).await.unwrap_err().is_transaction_done());
    assert!(tx.exec(&ctx, "DELETE FROM t", &[]).await.unwrap_err().is_transaction_done());
    assert!(tx.begin(&ctx).await.unwrap_err().is_transaction_done());
    assert!(
        tx.get::<i64>(&ctx, "SELECT 1", &[])
            .await
            .unwrap_err()
            .is_transaction_done()
    );

    // The root session is still usable.
    mock.expect_exec("DELETE FROM t");
    root.exec(&ctx, "DELETE FROM t", &[]).await.unwrap();
    mock.verify().unwrap();
}

#[tokio::test]
async fn test_begin_failure() {
    let (mock, db) = setup();
    mock.expect_begin().with_error("too many connections");

    let ctx = Context::new();
    let session = db.session().unwrap();
    let err = session.begin(&ctx).await.unwrap_err();

    assert_eq!(err.to_string(), "too many connections");
    assert!(!session.is_tx());
    assert_eq!(db.metrics().begins().count(), 1);
    assert_eq!(db.metrics().errors().count(), 1);
}

#[tokio::test]
async fn test_commit_failure_finishes_transaction() {
    let (mock, db) = setup();
    mock.expect_begin();
    mock.expect_commit().with_error("serialization failure");

    let ctx = Context::new();
    let root = db.session().unwrap();
    let tx = root.begin(&ctx).await.unwrap();

    let err = tx.commit(&ctx).await.unwrap_err();
    assert_eq!(err.to_string(), "serialization failure");
    assert!(tx.commit(&ctx).await.unwrap_err().is_transaction_done());
    mock.verify().unwrap();
}

// =============================================================================
// run_in_tx
// =============================================================================

#[tokio::test]
async fn test_run_in_tx_commits_on_success() {
    let (mock, db) = setup();
    mock.expect_begin();
    mock.expect_exec("INSERT INTO users (name) VALUES (?)")
        .with_args([SqlValue::String("ann".into())])
        .returning_outcome(ExecOutcome::new(7, 1));
    mock.expect_exec("INSERT INTO audit (user_id) VALUES (?)")
        .with_args([SqlValue::Int(7)])
        .returning_outcome(ExecOutcome::new(1, 1));
    mock.expect_commit();

    let ctx = Context::new();
    let session = db.session().unwrap();
    let inner_ctx = ctx.clone();
    let id = session
        .run_in_tx(&ctx, move |tx| {
            Box::pin(async move {
                let res = tx
                    .exec(&inner_ctx, "INSERT INTO users (name) VALUES (?)", &[&"ann"])
                    .await?;
                tx.exec(
                    &inner_ctx,
                    "INSERT INTO audit (user_id) VALUES (?)",
                    &[&res.last_insert_id],
                )
                .await?;
                Ok(res.last_insert_id)
            })
        })
        .await
        .unwrap();

    assert_eq!(id, 7);
    assert_eq!(commits(&mock), 1);
    assert_eq!(rollbacks(&mock), 0);
    mock.verify().unwrap();
}

#[tokio::test]
async fn test_run_in_tx_rolls_back_on_error() {
    let (mock, db) = setup();
    mock.expect_begin();
    mock.expect_exec("INSERT INTO users (name) VALUES (?)")
        .with_error("duplicate key");
    mock.expect_rollback();

    let ctx = Context::new();
    let session = db.session().unwrap();
    let inner_ctx = ctx.clone();
    let result: Result<()> = session
        .run_in_tx(&ctx, move |tx| {
            Box::pin(async move {
                tx.exec(&inner_ctx, "INSERT INTO users (name) VALUES (?)", &[&"ann"])
                    .await?;
                Ok(())
            })
        })
        .await;

    assert_eq!(result.unwrap_err().to_string(), "duplicate key");
    assert_eq!(commits(&mock), 0);
    assert_eq!(rollbacks(&mock), 1);
    mock.verify().unwrap();
}

#[tokio::test]
async fn test_run_in_tx_recovers_panic() {
    let (mock, db) = setup();
    mock.expect_begin();
    mock.expect_rollback();

    let ctx = Context::new();
    let session = db.session().unwrap();
    let result: Result<()> = session
        .run_in_tx(&ctx, |_tx| Box::pin(async move { panic!("boom") }))
        .await;

    let err = result.unwrap_err();
    let panic = err.recovered().expect("panic should be recovered");
    assert_eq!(panic.message(), "boom");
    assert_eq!(commits(&mock), 0);
    assert_eq!(rollbacks(&mock), 1);
    mock.verify().unwrap();
}

#[tokio::test]
async fn test_run_in_tx_recovers_panic_before_future() {
    let (mock, db) = setup();
    mock.expect_begin();
    mock.expect_rollback();

    let ctx = Context::new();
    let session = db.session().unwrap();
    let result: Result<()> = session
        .run_in_tx(&ctx, |_tx| panic!("too early"))
        .await;

    assert!(matches!(result, Err(Error::Recovered(_))));
    assert_eq!(rollbacks(&mock), 1);
}

#[tokio::test]
async fn test_run_in_tx_recovers_panic_after_write() {
    let (mock, db) = setup();
    mock.expect_begin();
    mock.expect_exec("UPDATE accounts SET balance = 0");
    mock.expect_rollback();

    let ctx = Context::new();
    let session = db.session().unwrap();
    let inner_ctx = ctx.clone();
    let result: Result<()> = session
        .run_in_tx(&ctx, move |tx| {
            Box::pin(async move {
                tx.exec(&inner_ctx, "UPDATE accounts SET balance = 0", &[])
                    .await?;
                panic!("after write");
            })
        })
        .await;

    let err = result.unwrap_err();
    assert_eq!(err.recovered().unwrap().message(), "after write");
    assert_eq!(commits(&mock), 0);
    assert_eq!(rollbacks(&mock), 1);
    mock.verify().unwrap();
}

#[tokio::test]
async fn test_run_in_tx_callback_commits_itself() {
    let (mock, db) = setup();
    mock.expect_begin();
    mock.expect_commit();

    let ctx = Context::new();
    let session = db.session().unwrap();
    let inner_ctx = ctx.clone();
    let result: Result<()> = session
        .run_in_tx(&ctx, move |tx| Box::pin(async move { tx.commit(&inner_ctx).await }))
        .await;

    result.unwrap();
    assert_eq!(commits(&mock), 1);
    assert_eq!(rollbacks(&mock), 0);
    assert_eq!(db.metrics().commits().count(), 1);
    assert_eq!(db.metrics().errors().count(), 0);
    mock.verify().unwrap();
}

#[tokio::test]
async fn test_run_in_tx_callback_rolls_back_itself() {
    let (mock, db) = setup();
    mock.expect_begin();
    mock.expect_rollback();

    let ctx = Context::new();
    let session = db.session().unwrap();
    let inner_ctx = ctx.clone();
    let result: Result<()> = session
        .run_in_tx(&ctx, move |tx| {
            Box::pin(async move {
                tx.rollback(&inner_ctx).await?;
                Err(Error::driver("nothing to do"))
            })
        })
        .await;

    assert_eq!(result.unwrap_err().to_string(), "nothing to do");
    assert_eq!(rollbacks(&mock), 1);
    assert_eq!(db.metrics().rollback_failures().count(), 0);
    mock.verify().unwrap();
}

#[tokio::test]
async fn test_nested_run_in_tx_callback_commits_itself() {
    let (mock, db) = setup();
    mock.expect_begin();
    mock.expect_commit();

    let ctx = Context::new();
    let root = db.session().unwrap();
    let tx = root.begin(&ctx).await.unwrap();

    let inner_ctx = ctx.clone();
    tx.run_in_tx(&ctx, move |inner| Box::pin(async move { inner.commit(&inner_ctx).await }))
        .await
        .unwrap();

    // Only the inner scope ended; the outer one is still open.
    assert_eq!(tx.depth(), 1);
    assert_eq!(commits(&mock), 0);
    tx.commit(&ctx).await.unwrap();
    assert_eq!(commits(&mock), 1);
    mock.verify().unwrap();
}

#[tokio::test]
async fn test_run_in_tx_keeps_original_error_when_rollback_fails() {
    let (mock, db) = setup();
    mock.expect_begin();
    mock.expect_rollback().with_error("connection lost");

    let ctx = Context::new();
    let session = db.session().unwrap();
    let result: Result<()> = session
        .run_in_tx(&ctx, |_tx| {
            Box::pin(async move { Err(Error::driver("validation failed")) })
        })
        .await;

    assert_eq!(result.unwrap_err().to_string(), "validation failed");
    assert_eq!(db.metrics().rollback_failures().count(), 1);
    mock.verify().unwrap();
}

#[tokio::test]
async fn test_run_in_tx_returns_commit_failure() {
    let (mock, db) = setup();
    mock.expect_begin();
    mock.expect_commit().with_error("serialization failure");

    let ctx = Context::new();
    let session = db.session().unwrap();
    let result = session
        .run_in_tx(&ctx, |_tx| Box::pin(async move { Ok(1) }))
        .await;

    assert_eq!(result.unwrap_err().to_string(), "serialization failure");
    assert_eq!(rollbacks(&mock), 0);
    mock.verify().unwrap();
}

#[tokio::test]
async fn test_run_in_tx_nested_joins_outer() {
    let (mock, db) = setup();
    mock.expect_begin();
    mock.expect_exec("DELETE FROM sessions");
    mock.expect_commit();

    let ctx = Context::new();
    let root = db.session().unwrap();
    let tx = root.begin(&ctx).await.unwrap();

    let inner_ctx = ctx.clone();
    tx.run_in_tx(&ctx, move |inner| {
        Box::pin(async move {
            assert_eq!(inner.depth(), 2);
            inner.exec(&inner_ctx, "DELETE FROM sessions", &[]).await?;
            Ok(())
        })
    })
    .await
    .unwrap();

    assert_eq!(commits(&mock), 0);
    assert_eq!(tx.depth(), 1);
    tx.commit(&ctx).await.unwrap();
    assert_eq!(commits(&mock), 1);
    mock.verify().unwrap();
}

#[tokio::test]
async fn test_db_run_in_tx_closes_session() {
    let (mock, db) = setup();
    mock.expect_begin();
    mock.expect_query("SELECT id FROM users")
        .returning(fixtures::ints("id", &[1, 2]));
    mock.expect_commit();

    let ctx = Context::new();
    let inner_ctx = ctx.clone();
    let ids = db
        .run_in_tx(&ctx, move |tx| {
            Box::pin(async move { tx.select::<i64>(&inner_ctx, "SELECT id FROM users", &[]).await })
        })
        .await
        .unwrap();

    assert_eq!(ids, vec![1, 2]);
    let stats = db.pool_stats();
    assert_eq!(stats.sessions.in_use, 0);
    assert_eq!(stats.values.in_use, 0);
    mock.verify().unwrap();
}
