#![cfg(feature = "postgres")]

//! Runs against a real server only when `DB_SWITCHBOARD_TEST_PG_URL` is set.

use db_switchboard::prelude::*;

const URL_VAR: &str = "DB_SWITCHBOARD_TEST_PG_URL";

fn live_url() -> Option<String> {
    let url = std::env::var(URL_VAR).ok().filter(|u| !u.is_empty());
    if url.is_none() {
        eprintln!("{URL_VAR} not set; skipping live postgres test");
    }
    url
}

async fn open(driver: DriverId, url: &str) -> Result<Database, DriverError> {
    DatabaseFactory::new()
        .with_env(MapEnv::new())
        .create(
            DatabaseOptions::new()
                .url(url)
                .driver(driver)
                .application_name("db-switchboard-tests"),
        )
        .await
}

#[test]
fn savepoints_on_every_postgres_driver() -> Result<(), Box<dyn std::error::Error>> {
    let Some(url) = live_url() else {
        return Ok(());
    };
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        for driver in [DriverId::POSTGRES, DriverId::PG, DriverId::PG_POOL] {
            let table = format!("switchboard_sp_{}", driver.as_str().replace('-', "_"));
            let db = open(driver.clone(), &url).await?;
            db.execute(&format!("DROP TABLE IF EXISTS {table}"), &[]).await?;
            db.execute(&format!("CREATE TABLE {table} (val TEXT NOT NULL)"), &[])
                .await?;

            let insert = format!("INSERT INTO {table} (val) VALUES ($1)");
            db.transaction(move |tx| {
                Box::pin(async move {
                    tx.execute(&insert, &[RowValues::from("A")]).await?;
                    tx.savepoint(|s1| {
                        Box::pin(async move {
                            s1.execute(&insert, &[RowValues::from("B")]).await?;
                            let _ = s1
                                .savepoint(|s2| {
                                    Box::pin(async move {
                                        s2.execute(&insert, &[RowValues::from("C")]).await?;
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

            let rows = db
                .execute(&format!("SELECT val FROM {table} ORDER BY val"), &[])
                .await?;
            let values: Vec<&str> = rows
                .rows
                .iter()
                .filter_map(|row| row.get("val").and_then(RowValues::as_text))
                .collect();
            assert_eq!(values, vec!["A", "B"], "driver {driver}");

            db.execute(&format!("DROP TABLE {table}"), &[]).await?;
            db.close().await?;
            db.close().await?;
            assert!(db.execute("SELECT 1", &[]).await.is_err());
        }
        Ok(())
    })
}

#[test]
fn pooled_transactions_hold_separate_backends() -> Result<(), Box<dyn std::error::Error>> {
    let Some(url) = live_url() else {
        return Ok(());
    };
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let db = std::sync::Arc::new(open(DriverId::PG_POOL, &url).await?);
        let barrier = std::sync::Arc::new(tokio::sync::Barrier::new(2));
        let run = || {
            let db = std::sync::Arc::clone(&db);
            let barrier = std::sync::Arc::clone(&barrier);
            tokio::spawn(async move {
                db.transaction(move |tx| {
                    Box::pin(async move {
                        let pid = tx.execute("SELECT pg_backend_pid()::bigint AS pid", &[]).await?;
                        barrier.wait().await;
                        Ok::<_, DriverError>((
                            tx.connection_id(),
                            pid.first().and_then(|r| r.get("pid")).and_then(RowValues::as_int).copied(),
                        ))
                    })
                })
                .await
            })
        };
        let (left, right) = tokio::join!(run(), run());
        let (left, right) = (left??, right??);
        assert_ne!(left.0, right.0);
        assert_ne!(left.1, right.1);

        let stats = db.stats().ok_or("pg-pool reports stats")?;
        assert!(stats.total >= 2);
        db.close().await?;
        assert_eq!(db.stats().map(|s| s.total), Some(0));
        Ok(())
    })
}

async fn backend_alive(observer: &Database, pid: i64) -> Result<bool, DriverError> {
    let rows = observer
        .execute(
            "SELECT count(*)::bigint AS n FROM pg_stat_activity WHERE pid = $1::int",
            &[RowValues::Int(pid)],
        )
        .await?;
    Ok(rows
        .first()
        .and_then(|r| r.get("n"))
        .and_then(RowValues::as_int)
        .is_some_and(|n| *n > 0))
}

#[test]
fn close_releases_backends_held_by_the_query_layer() -> Result<(), Box<dyn std::error::Error>> {
    let Some(url) = live_url() else {
        return Ok(());
    };
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let observer = open(DriverId::PG, &url).await?;
        for driver in [DriverId::POSTGRES, DriverId::PG, DriverId::PG_POOL] {
            let db = open(driver.clone(), &url).await?;
            let rows = db.execute("SELECT pg_backend_pid()::bigint AS pid", &[]).await?;
            let pid = rows
                .first()
                .and_then(|r| r.get("pid"))
                .and_then(RowValues::as_int)
                .copied()
                .ok_or("backend pid")?;
            assert!(backend_alive(&observer, pid).await?, "driver {driver}");
            assert!(!db.query().is_closed());

            db.close().await?;
            assert!(db.query().is_closed(), "driver {driver}");
            assert!(db.adapter().native_handle().is_closed());
            assert_eq!(db.stats().map_or(0, |s| s.total), 0);

            let mut alive = true;
            for _ in 0..50 {
                alive = backend_alive(&observer, pid).await?;
                if !alive {
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
            assert!(!alive, "driver {driver} left backend {pid} open after close");
        }
        observer.close().await?;
        Ok(())
    })
}
