use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use db_switchboard::prelude::*;
use db_switchboard::test_utils::MemoryAdapter;
use futures_util::FutureExt;

fn memory(dialect: Dialect) -> MemoryAdapter {
    MemoryAdapter::new(DriverId::new("memory"), dialect)
}

fn committed_sql(db: &MemoryAdapter) -> Vec<String> {
    db.committed().into_iter().map(|s| s.sql).collect()
}

#[test]
fn inner_savepoint_rollback_keeps_outer_rows() -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let db = memory(Dialect::Postgresql);
        db.transaction(|tx| {
            Box::pin(async move {
                tx.execute("INSERT INTO t VALUES ('A')", &[]).await?;
                tx.savepoint(|s1| {
                    Box::pin(async move {
                        s1.execute("INSERT INTO t VALUES ('B')", &[]).await?;
                        let inner = s1
                            .savepoint(|s2| {
                                Box::pin(async move {
                                    s2.execute("INSERT INTO t VALUES ('C')", &[]).await?;
                                    Err::<(), _>(DriverError::ProtocolError("discard C".into()))
                                })
                            })
                            .await;
                        assert!(inner.is_err());
                        Ok::<_, DriverError>(())
                    })
                })
                .await?;
                Ok::<_, DriverError>(())
            })
        })
        .await?;

        assert_eq!(
            committed_sql(&db),
            vec!["INSERT INTO t VALUES ('A')", "INSERT INTO t VALUES ('B')"]
        );
        let log = db.sql_log();
        assert!(log.contains(&r#"SAVEPOINT "sp_1""#.to_string()));
        assert!(log.contains(&r#"SAVEPOINT "sp_1_1""#.to_string()));
        assert!(log.contains(&r#"ROLLBACK TO SAVEPOINT "sp_1_1""#.to_string()));
        assert!(log.contains(&r#"RELEASE SAVEPOINT "sp_1""#.to_string()));
        assert_eq!(log.last().map(String::as_str), Some("COMMIT"));
        Ok(())
    })
}

#[test]
fn savepoints_nest_past_three_levels() -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let db = memory(Dialect::Mysql);
        let depth = db
            .transaction(|tx| {
                Box::pin(async move {
                    tx.savepoint(|a| {
                        Box::pin(async move {
                            a.savepoint(|b| {
                                Box::pin(async move {
                                    b.savepoint(|c| {
                                        Box::pin(async move {
                                            c.savepoint(|d| {
                                                Box::pin(async move {
                                                    d.execute("INSERT deep", &[]).await?;
                                                    Ok::<_, DriverError>(d.depth())
                                                })
                                            })
                                            .await
                                        })
                                    })
                                    .await
                                })
                            })
                            .await
                        })
                    })
                    .await
                })
            })
            .await?;

        assert_eq!(depth, 4);
        assert_eq!(committed_sql(&db), vec!["INSERT deep"]);
        assert!(db.sql_log().contains(&"SAVEPOINT `sp_1_1_1_1`".to_string()));
        Ok(())
    })
}

#[test]
fn sibling_savepoints_get_fresh_names() -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let db = memory(Dialect::Postgresql);
        db.transaction(|tx| {
            Box::pin(async move {
                for _ in 0..3 {
                    let _ = tx
                        .savepoint(|sp| {
                            Box::pin(async move {
                                sp.execute("INSERT x", &[]).await?;
                                Err::<(), _>(DriverError::ProtocolError("undo".into()))
                            })
                        })
                        .await;
                }
                Ok::<_, DriverError>(())
            })
        })
        .await?;

        let savepoints: Vec<String> = db
            .sql_log()
            .into_iter()
            .filter(|sql| sql.starts_with("SAVEPOINT"))
            .collect();
        assert_eq!(
            savepoints,
            vec![r#"SAVEPOINT "sp_1""#, r#"SAVEPOINT "sp_2""#, r#"SAVEPOINT "sp_3""#]
        );
        assert!(db.committed().is_empty());
        Ok(())
    })
}

#[test]
fn callback_error_rolls_back_everything() -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let db = memory(Dialect::Postgresql);
        let result = db
            .transaction(|tx| {
                Box::pin(async move {
                    tx.execute("INSERT a", &[]).await?;
                    Err::<(), _>(DriverError::ParameterError("bad input".into()))
                })
            })
            .await;
        assert!(matches!(result, Err(DriverError::ParameterError(_))));
        assert!(db.committed().is_empty());
        assert_eq!(db.sql_log().last().map(String::as_str), Some("ROLLBACK"));
        Ok(())
    })
}

#[test]
fn transaction_dropped_after_begin_rolls_back() -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let db = memory(Dialect::Postgresql);
        let pending = db.transaction(|tx| {
            Box::pin(async move {
                tx.execute("INSERT a", &[]).await?;
                Ok::<_, DriverError>(())
            })
        });
        // BEGIN has run; the first poll parks right after it.
        assert!(pending.now_or_never().is_none());
        assert_eq!(db.sql_log(), vec!["BEGIN".to_string(), "ROLLBACK".to_string()]);
        assert!(db.committed().is_empty());

        db.transaction(|tx| {
            Box::pin(async move {
                tx.execute("INSERT b", &[]).await?;
                Ok::<_, DriverError>(())
            })
        })
        .await?;
        assert_eq!(committed_sql(&db), vec!["INSERT b"]);
        Ok(())
    })
}

#[test]
fn failed_rollback_keeps_the_original_error() -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let db = memory(Dialect::Postgresql);
        db.fail_on("ROLLBACK");
        let result = db
            .transaction(|tx| {
                Box::pin(async move {
                    tx.execute("INSERT a", &[]).await?;
                    Err::<(), _>(DriverError::ParameterError("original".into()))
                })
            })
            .await;
        match result {
            Err(DriverError::ParameterError(message)) => assert_eq!(message, "original"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(db.committed().is_empty());
        Ok(())
    })
}

#[test]
fn transaction_options_shape_begin() -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let pg = memory(Dialect::Postgresql);
        let options = TransactionOptions::new()
            .isolation_level(IsolationLevel::Serializable)
            .read_only()
            .deferrable(true);
        pg.transaction_with(options, |_tx| Box::pin(async { Ok::<_, DriverError>(()) }))
            .await?;
        assert!(pg.sql_log()[0].starts_with("BEGIN ISOLATION LEVEL SERIALIZABLE"));

        let my = memory(Dialect::Mysql);
        my.transaction_with(options, |_tx| Box::pin(async { Ok::<_, DriverError>(()) }))
            .await?;
        let log = my.sql_log();
        assert_eq!(log[0], "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE");
        assert_eq!(log[1], "START TRANSACTION READ ONLY");
        Ok(())
    })
}

#[test]
fn transactions_refused_without_capability() -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let db = memory(Dialect::Postgresql).with_capabilities(DriverCapabilities::NEON_HTTP);
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let result = db
            .transaction(move |tx| {
                Box::pin(async move {
                    flag.store(true, Ordering::SeqCst);
                    tx.execute("INSERT a", &[]).await?;
                    Ok::<_, DriverError>(())
                })
            })
            .await;
        assert!(matches!(result, Err(DriverError::CapabilityError(_))));
        assert!(!ran.load(Ordering::SeqCst));
        assert!(db.statements().is_empty());
        Ok(())
    })
}

#[test]
fn concurrent_transactions_use_distinct_connections() -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let db = Arc::new(memory(Dialect::Postgresql));
        let barrier = Arc::new(tokio::sync::Barrier::new(2));

        let run = |label: &'static str| {
            let db = Arc::clone(&db);
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                db.transaction(move |tx| {
                    Box::pin(async move {
                        let id = tx.connection_id();
                        tx.execute(label, &[]).await?;
                        barrier.wait().await;
                        tx.execute(label, &[]).await?;
                        Ok::<_, DriverError>(id)
                    })
                })
                .await
            })
        };
        let (first, second) = tokio::join!(run("INSERT left"), run("INSERT right"));
        let (first, second) = (first??, second??);
        assert_ne!(first, second);

        for statement in db.statements() {
            match statement.sql.as_str() {
                "INSERT left" => assert_eq!(statement.connection_id, first),
                "INSERT right" => assert_eq!(statement.connection_id, second),
                _ => {}
            }
        }
        Ok(())
    })
}

#[test]
fn batches_are_atomic_and_gated() -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let db = memory(Dialect::Postgresql);
        let results = db
            .execute_batch(&[
                BatchStatement::from("INSERT a"),
                BatchStatement::new("SELECT $1", vec![RowValues::Int(1)]),
            ])
            .await?;
        assert_eq!(results.len(), 2);
        assert_eq!(committed_sql(&db), vec!["INSERT a", "SELECT $1"]);

        db.fail_on("INSERT c");
        let failed = db
            .execute_batch(&[BatchStatement::from("INSERT b"), BatchStatement::from("INSERT c")])
            .await;
        assert!(matches!(failed, Err(DriverError::ServerError { .. })));
        assert_eq!(committed_sql(&db).len(), 2);

        let stateless = memory(Dialect::Mysql).with_capabilities(DriverCapabilities::PLANETSCALE);
        let refused = stateless.execute_batch(&[BatchStatement::from("INSERT a")]).await;
        assert!(matches!(refused, Err(DriverError::CapabilityError(_))));
        assert!(stateless.statements().is_empty());
        Ok(())
    })
}

#[test]
fn templates_render_per_dialect() -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let template = SqlTemplate::new("SELECT * FROM t WHERE a = ")
            .param(1_i64)
            .raw(" AND b = ")
            .param("two")
            .raw(" AND c = ")
            .param(true);

        let pg = memory(Dialect::Postgresql);
        pg.execute_sql(&template).await?;
        let my = memory(Dialect::Mysql);
        my.execute_sql(&template).await?;

        let pg_statement = &pg.statements()[0];
        assert_eq!(pg_statement.sql, "SELECT * FROM t WHERE a = $1 AND b = $2 AND c = $3");
        assert_eq!(
            pg_statement.params,
            vec![RowValues::Int(1), RowValues::Text("two".into()), RowValues::Bool(true)]
        );
        let my_statement = &my.statements()[0];
        assert_eq!(my_statement.sql, "SELECT * FROM t WHERE a = ? AND b = ? AND c = ?");
        assert_eq!(my_statement.params, pg_statement.params);
        Ok(())
    })
}

#[test]
fn close_is_idempotent() -> Result<(), Box<dyn std::error::Error>> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let db = memory(Dialect::Postgresql);
        db.transaction(|tx| Box::pin(async move { tx.execute("INSERT a", &[]).await }))
            .await?;
        assert_eq!(db.stats().map(|s| s.idle), Some(1));

        db.close().await?;
        db.close().await?;
        assert_eq!(db.stats().map(|s| s.total), Some(0));
        assert!(db.native_handle().is_closed());
        assert!(!db.ping().await);
        Ok(())
    })
}
