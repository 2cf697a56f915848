use std::time::Duration;

use mysql_async::prelude::{Protocol, Queryable};
use mysql_async::{Conn, Params};

use super::convert::{from_mysql_value, to_mysql_value, type_name};
use crate::error::DriverError;
use crate::logging::QueryLog;
use crate::results::{FieldInfo, QueryResult};
use crate::types::RowValues;

/// Statement execution shared by pooled calls and transactions.
#[derive(Debug, Clone)]
pub(crate) struct MysqlRunner {
    pub(crate) log: QueryLog,
    pub(crate) query_timeout: Option<Duration>,
}

impl MysqlRunner {
    /// Parameterless statements go over the text protocol, the rest are prepared.
    ///
    /// # Errors
    /// Returns `DriverError::Timeout` when the query timeout elapses, otherwise the
    /// `mysql_async` error.
    pub(crate) async fn run(
        &self,
        conn: &mut Conn,
        sql: &str,
        params: &[RowValues],
    ) -> Result<QueryResult, DriverError> {
        self.log.statement(sql, params);
        let work = async {
            if params.is_empty() {
                drain(conn.query_iter(sql).await?).await
            } else {
                let values = params.iter().map(to_mysql_value).collect();
                drain(conn.exec_iter(sql, Params::Positional(values)).await?).await
            }
        };
        match self.query_timeout {
            Some(limit) => tokio::time::timeout(limit, work)
                .await
                .map_err(|_| DriverError::Timeout(limit))?,
            None => work.await,
        }
    }

    pub(crate) async fn simple(&self, conn: &mut Conn, sql: &str) -> Result<(), DriverError> {
        self.log.statement(sql, &[]);
        conn.query_drop(sql).await?;
        Ok(())
    }
}

async fn drain<P: Protocol>(
    mut result: mysql_async::QueryResult<'_, 'static, P>,
) -> Result<QueryResult, DriverError> {
    let columns = result.columns();
    let rows: Vec<mysql_async::Row> = result.collect().await?;
    let affected = result.affected_rows();
    result.drop_result().await?;

    let Some(columns) = columns.filter(|c| !c.is_empty()) else {
        return Ok(QueryResult::affected(affected));
    };
    let fields = columns
        .iter()
        .map(|c| FieldInfo::new(c.name_str().into_owned(), type_name(c.column_type())))
        .collect();
    let mut out = QueryResult::with_fields(fields, rows.len());
    for row in rows {
        let values = row
            .unwrap()
            .into_iter()
            .zip(columns.iter())
            .map(|(value, column)| from_mysql_value(value, column.column_type(), column.character_set()))
            .collect();
        out.push_row(values);
    }
    Ok(out)
}
