use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::adapter::{ConnectionStats, DriverAdapter, NativeHandle};
use crate::capabilities::DriverCapabilities;
use crate::error::DriverError;
use crate::results::{FieldInfo, QueryResult};
use crate::transaction::TxConnection;
use crate::types::{Dialect, DriverId, RowValues};

/// One statement as it reached a connection.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedStatement {
    pub connection_id: u64,
    pub sql: String,
    pub params: Vec<RowValues>,
}

#[derive(Debug, Default)]
struct State {
    log: Vec<RecordedStatement>,
    committed: Vec<RecordedStatement>,
    fail_on: Vec<String>,
    idle: Vec<u64>,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    permits: Arc<Semaphore>,
    next_id: AtomicU64,
    created: AtomicUsize,
    waiting: AtomicUsize,
    closed: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// In-memory adapter with a bounded pool of numbered connections.
///
/// Statements outside a transaction are committed immediately. Inside one they are
/// journaled and only reach [`MemoryAdapter::committed`] on `COMMIT`; savepoints
/// truncate the journal on `ROLLBACK TO SAVEPOINT`. `SELECT` statements return one
/// row with a single `value` column set to 1.
#[derive(Debug, Clone)]
pub struct MemoryAdapter {
    driver: DriverId,
    dialect: Dialect,
    capabilities: DriverCapabilities,
    shared: Arc<Shared>,
}

impl MemoryAdapter {
    /// Pooled, transactional adapter with room for 4 connections.
    #[must_use]
    pub fn new(driver: DriverId, dialect: Dialect) -> Self {
        Self::with_pool(driver, dialect, 4)
    }

    #[must_use]
    pub fn with_pool(driver: DriverId, dialect: Dialect, max: usize) -> Self {
        Self {
            driver,
            dialect,
            capabilities: DriverCapabilities::POSTGRES,
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                permits: Arc::new(Semaphore::new(max.max(1))),
                next_id: AtomicU64::new(1),
                created: AtomicUsize::new(0),
                waiting: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    #[must_use]
    pub fn with_capabilities(mut self, capabilities: DriverCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Fail every statement containing `fragment`, control statements included.
    pub fn fail_on(&self, fragment: impl Into<String>) {
        self.shared.lock().fail_on.push(fragment.into());
    }

    /// Every statement in arrival order.
    #[must_use]
    pub fn statements(&self) -> Vec<RecordedStatement> {
        self.shared.lock().log.clone()
    }

    /// SQL text of every statement in arrival order.
    #[must_use]
    pub fn sql_log(&self) -> Vec<String> {
        self.shared.lock().log.iter().map(|s| s.sql.clone()).collect()
    }

    /// Non-control statements that were committed.
    #[must_use]
    pub fn committed(&self) -> Vec<RecordedStatement> {
        self.shared.lock().committed.clone()
    }

    async fn acquire(&self) -> Result<MemoryConnection, DriverError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(DriverError::closed(&self.driver));
        }
        self.shared.waiting.fetch_add(1, Ordering::SeqCst);
        let permit = Arc::clone(&self.shared.permits).acquire_owned().await;
        self.shared.waiting.fetch_sub(1, Ordering::SeqCst);
        let permit = permit.map_err(|_| DriverError::closed(&self.driver))?;
        let reused = self.shared.lock().idle.pop();
        let id = reused.unwrap_or_else(|| {
            self.shared.created.fetch_add(1, Ordering::SeqCst);
            self.shared.next_id.fetch_add(1, Ordering::SeqCst)
        });
        Ok(MemoryConnection {
            id,
            shared: Arc::clone(&self.shared),
            journal: Vec::new(),
            savepoints: Vec::new(),
            in_transaction: false,
            rollback_on_drop: false,
            _permit: permit,
        })
    }
}

fn select_result() -> QueryResult {
    let mut result = QueryResult::with_fields(vec![FieldInfo::new("value", "int8")], 1);
    result.push_row(vec![RowValues::Int(1)]);
    result
}

fn unquote(name: &str) -> &str {
    name.trim().trim_matches(|c| c == '"' || c == '`')
}

struct MemoryConnection {
    id: u64,
    shared: Arc<Shared>,
    journal: Vec<RecordedStatement>,
    savepoints: Vec<(String, usize)>,
    in_transaction: bool,
    /// Set through `TxConnection::set_in_transaction`, like the real adapters.
    rollback_on_drop: bool,
    _permit: OwnedSemaphorePermit,
}

impl MemoryConnection {
    fn record(&self, sql: &str, params: &[RowValues]) -> Result<RecordedStatement, DriverError> {
        let statement = RecordedStatement {
            connection_id: self.id,
            sql: sql.to_string(),
            params: params.to_vec(),
        };
        let mut state = self.shared.lock();
        state.log.push(statement.clone());
        if let Some(fragment) = state.fail_on.iter().find(|f| sql.contains(f.as_str())) {
            return Err(DriverError::ServerError {
                message: format!("injected failure on `{fragment}`"),
                code: None,
            });
        }
        Ok(statement)
    }

    fn run(&mut self, sql: &str, params: &[RowValues]) -> Result<QueryResult, DriverError> {
        let statement = self.record(sql, params)?;
        if self.in_transaction {
            self.journal.push(statement);
        } else {
            self.shared.lock().committed.push(statement);
        }
        let upper = sql.trim_start().to_ascii_uppercase();
        Ok(if upper.starts_with("SELECT") {
            select_result()
        } else {
            QueryResult::affected(1)
        })
    }

    fn control(&mut self, sql: &str) -> Result<(), DriverError> {
        self.record(sql, &[])?;
        let upper = sql.trim().to_ascii_uppercase();
        if upper.starts_with("BEGIN") || upper.starts_with("START TRANSACTION") {
            self.in_transaction = true;
            self.journal.clear();
            self.savepoints.clear();
        } else if upper == "COMMIT" {
            let journal = std::mem::take(&mut self.journal);
            self.shared.lock().committed.extend(journal);
            self.in_transaction = false;
        } else if let Some(name) = upper.strip_prefix("ROLLBACK TO SAVEPOINT ") {
            let name = unquote(name);
            if let Some((_, mark)) = self.savepoints.iter().rev().find(|(n, _)| n == name) {
                self.journal.truncate(*mark);
            }
        } else if upper == "ROLLBACK" {
            self.journal.clear();
            self.savepoints.clear();
            self.in_transaction = false;
        } else if let Some(name) = upper.strip_prefix("RELEASE SAVEPOINT ") {
            let name = unquote(name);
            if let Some(pos) = self.savepoints.iter().rposition(|(n, _)| n == name) {
                self.savepoints.truncate(pos);
            }
        } else if let Some(name) = upper.strip_prefix("SAVEPOINT ") {
            self.savepoints.push((unquote(name).to_string(), self.journal.len()));
        }
        Ok(())
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        if self.rollback_on_drop {
            state.log.push(RecordedStatement {
                connection_id: self.id,
                sql: "ROLLBACK".into(),
                params: Vec::new(),
            });
        }
        if !self.shared.closed.load(Ordering::SeqCst) {
            state.idle.push(self.id);
        }
    }
}

/// The journal is discarded when the connection is dropped mid-transaction.
struct MemoryTxConnection {
    conn: MemoryConnection,
}

#[async_trait]
impl TxConnection for MemoryTxConnection {
    fn connection_id(&self) -> u64 {
        self.conn.id
    }

    async fn execute(&mut self, sql: &str, params: &[RowValues]) -> Result<QueryResult, DriverError> {
        tokio::task::yield_now().await;
        self.conn.run(sql, params)
    }

    async fn simple(&mut self, sql: &str) -> Result<(), DriverError> {
        let result = self.conn.control(sql);
        tokio::task::yield_now().await;
        result
    }

    fn set_in_transaction(&mut self, open: bool) {
        self.conn.rollback_on_drop = open;
    }
}

#[async_trait]
impl DriverAdapter for MemoryAdapter {
    fn driver(&self) -> &DriverId {
        &self.driver
    }

    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn capabilities(&self) -> DriverCapabilities {
        self.capabilities
    }

    async fn execute(&self, sql: &str, params: &[RowValues]) -> Result<QueryResult, DriverError> {
        let mut conn = self.acquire().await?;
        conn.run(sql, params)
    }

    async fn checkout(&self) -> Result<Box<dyn TxConnection>, DriverError> {
        if !self.capabilities.transactions {
            return Err(DriverError::no_transactions(&self.driver));
        }
        Ok(Box::new(MemoryTxConnection {
            conn: self.acquire().await?,
        }))
    }

    async fn close(&self) -> Result<(), DriverError> {
        if !self.shared.closed.swap(true, Ordering::SeqCst) {
            self.shared.permits.close();
            self.shared.lock().idle.clear();
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    fn stats(&self) -> Option<ConnectionStats> {
        if self.is_closed() {
            return Some(ConnectionStats::closed());
        }
        let idle = self.shared.lock().idle.len();
        Some(ConnectionStats::from_counts(
            self.shared.created.load(Ordering::SeqCst),
            idle,
            self.shared.waiting.load(Ordering::SeqCst),
        ))
    }

    fn native_handle(&self) -> NativeHandle {
        if self.is_closed() {
            NativeHandle::Closed
        } else {
            NativeHandle::Custom(Arc::new(self.clone()))
        }
    }
}
