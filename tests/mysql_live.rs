#![cfg(feature = "mysql")]

//! Runs against a real server only when `DB_SWITCHBOARD_TEST_MYSQL_URL` is set.

use std::sync::Arc;
use std::time::Duration;

use db_switchboard::prelude::*;

const URL_VAR: &str = "DB_SWITCHBOARD_TEST_MYSQL_URL";

fn live_url() -> Option<String> {
    let url = std::env::var(URL_VAR).ok().filter(|u| !u.is_empty());
    if url.is_none() {
        eprintln!("{URL_VAR} not set; skipping live mysql test");
    }
    url
}

async fn open(url: &str) -> Result<Database, DriverError> {
    DatabaseFactory::new()
        .with_env(MapEnv::new())
        .create(DatabaseOptions::new().url(url).driver(DriverId::MYSQL2))
        .await
}

fn int_column(result: &QueryResult, column: &str) -> Option<i64> {
    result
        .first()
        .and_then(|r| r.get(column))
        .and_then(RowValues::as_int)
        .copied()
}

async fn connection_alive(observer: &Database, id: i64) -> Result<bool, DriverError> {
    let rows = observer
        .execute(
            "SELECT CAST(COUNT(*) AS SIGNED) AS n FROM information_schema.PROCESSLIST WHERE ID = ?",
            &[RowValues::Int(id)],
        )
        .await?;
    Ok(int_column(&rows, "n").is_some_and(|n| n > 0))
}

#[test]
fn savepoint_scenarios_on_mysql2() -> Result<(), Box<dyn std::error::Error>> {
    let Some(url) = live_url() else {
        return Ok(());
    };
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let db = open(&url).await?;
        db.execute("DROP TABLE IF EXISTS switchboard_sp_mysql2", &[]).await?;
        db.execute(
            "CREATE TABLE switchboard_sp_mysql2 (val VARCHAR(8) NOT NULL) ENGINE=InnoDB",
            &[],
        )
        .await?;
        let insert = "INSERT INTO switchboard_sp_mysql2 (val) VALUES (?)";
        let values = |db: &Database| {
            let db = db.clone();
            async move {
                let rows = db
                    .execute("SELECT val FROM switchboard_sp_mysql2 ORDER BY val", &[])
                    .await?;
                Ok::<_, DriverError>(
                    rows.rows
                        .iter()
                        .filter_map(|row| row.get("val").and_then(RowValues::as_text))
                        .map(str::to_string)
                        .collect::<Vec<_>>(),
                )
            }
        };

        // Inner savepoint fails: A and B survive.
        db.transaction(move |tx| {
            Box::pin(async move {
                tx.execute(insert, &[RowValues::from("A")]).await?;
                tx.savepoint(|s1| {
                    Box::pin(async move {
                        s1.execute(insert, &[RowValues::from("B")]).await?;
                        let _ = s1
                            .savepoint(|s2| {
                                Box::pin(async move {
                                    s2.execute(insert, &[RowValues::from("C")]).await?;
                                    Err::<(), _>(DriverError::ProtocolError("drop C".into()))
                                })
                            })
                            .await;
                        Ok::<_, DriverError>(())
                    })
                })
                .await
            })
        })
        .await?;
        assert_eq!(values(&db).await?, vec!["A", "B"]);

        // Outer savepoint fails after a committed inner one: only A survives.
        db.execute("DELETE FROM switchboard_sp_mysql2", &[]).await?;
        db.transaction(move |tx| {
            Box::pin(async move {
                tx.execute(insert, &[RowValues::from("A")]).await?;
                let _ = tx
                    .savepoint(|s1| {
                        Box::pin(async move {
                            s1.execute(insert, &[RowValues::from("B")]).await?;
                            s1.savepoint(|s2| {
                                Box::pin(async move {
                                    s2.execute(insert, &[RowValues::from("C")]).await?;
                                    Ok::<_, DriverError>(())
                                })
                            })
                            .await?;
                            Err::<(), _>(DriverError::ProtocolError("drop B and C".into()))
                        })
                    })
                    .await;
                Ok::<_, DriverError>(())
            })
        })
        .await?;
        assert_eq!(values(&db).await?, vec!["A"]);

        // The whole transaction fails: nothing survives.
        db.execute("DELETE FROM switchboard_sp_mysql2", &[]).await?;
        let failed = db
            .transaction(move |tx| {
                Box::pin(async move {
                    tx.execute(insert, &[RowValues::from("A")]).await?;
                    tx.savepoint(|s1| {
                        Box::pin(async move {
                            s1.execute(insert, &[RowValues::from("B")]).await?;
                            Ok::<_, DriverError>(())
                        })
                    })
                    .await?;
                    Err::<(), _>(DriverError::ProtocolError("drop everything".into()))
                })
            })
            .await;
        assert!(matches!(failed, Err(DriverError::ProtocolError(_))));
        assert!(values(&db).await?.is_empty());

        db.execute("DROP TABLE switchboard_sp_mysql2", &[]).await?;
        db.close().await?;
        db.close().await?;
        assert!(matches!(
            db.execute("SELECT 1", &[]).await,
            Err(DriverError::ConnectionClosed(_))
        ));
        Ok(())
    })
}

#[test]
fn concurrent_transactions_use_separate_connections() -> Result<(), Box<dyn std::error::Error>> {
    let Some(url) = live_url() else {
        return Ok(());
    };
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let db = Arc::new(open(&url).await?);
        let barrier = Arc::new(tokio::sync::Barrier::new(2));
        let run = || {
            let db = Arc::clone(&db);
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                db.transaction(move |tx| {
                    Box::pin(async move {
                        let rows = tx
                            .execute("SELECT CAST(CONNECTION_ID() AS SIGNED) AS id", &[])
                            .await?;
                        barrier.wait().await;
                        Ok::<_, DriverError>((tx.connection_id(), int_column(&rows, "id")))
                    })
                })
                .await
            })
        };
        let (left, right) = tokio::join!(run(), run());
        let (left, right) = (left??, right??);
        assert_ne!(left.1, right.1);
        assert_eq!(left.1.and_then(|id| u64::try_from(id).ok()), Some(left.0));
        assert_eq!(right.1.and_then(|id| u64::try_from(id).ok()), Some(right.0));
        db.close().await?;
        Ok(())
    })
}

#[test]
fn close_releases_mysql_connections() -> Result<(), Box<dyn std::error::Error>> {
    let Some(url) = live_url() else {
        return Ok(());
    };
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let observer = open(&url).await?;
        let db = open(&url).await?;
        let rows = db
            .execute("SELECT CAST(CONNECTION_ID() AS SIGNED) AS id", &[])
            .await?;
        let id = int_column(&rows, "id").ok_or("connection id")?;
        assert!(connection_alive(&observer, id).await?);

        db.close().await?;
        assert!(db.query().is_closed());
        assert_eq!(db.stats().map(|s| s.total), Some(0));

        let mut alive = true;
        for _ in 0..50 {
            alive = connection_alive(&observer, id).await?;
            if !alive {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(!alive, "connection {id} still open after close");
        observer.close().await?;
        Ok(())
    })
}
