//! Per-dialect rendering: placeholders, quoting and transaction control statements.
//!
//! There is exactly one formatter per dialect and every adapter of that dialect uses
//! it through [`formatter_for`].

use std::fmt;
use std::fmt::Write as _;

use crate::error::DriverError;
use crate::transaction::{AccessMode, TransactionOptions};
use crate::types::{Dialect, RowValues, TIMESTAMP_FORMAT};

mod inline;
mod parsers;
mod scanner;
mod template;

pub use inline::{count_placeholders, inline_params};
pub(crate) use inline::rewrite_placeholders;
pub use template::{RenderedSql, SqlChunk, SqlTemplate};

pub trait DialectFormatter: Send + Sync + fmt::Debug {
    fn dialect(&self) -> Dialect;

    /// Placeholder for the `position`-th parameter, counted from 1.
    fn placeholder(&self, position: usize) -> String;

    fn quote_identifier(&self, ident: &str) -> String;

    /// SQL literal for `value`, used where parameters cannot be bound.
    ///
    /// # Errors
    /// Returns `DriverError::ParameterError` for a value the dialect has no literal for.
    fn quote_literal(&self, value: &RowValues) -> Result<String, DriverError>;

    /// Statements that open a transaction with `options`, in order.
    fn begin_statements(&self, options: &TransactionOptions) -> Vec<String>;

    fn commit_statement(&self) -> &'static str {
        "COMMIT"
    }

    fn rollback_statement(&self) -> &'static str {
        "ROLLBACK"
    }

    fn savepoint(&self, name: &str) -> String {
        format!("SAVEPOINT {}", self.quote_identifier(name))
    }

    fn release_savepoint(&self, name: &str) -> String {
        format!("RELEASE SAVEPOINT {}", self.quote_identifier(name))
    }

    fn rollback_to_savepoint(&self, name: &str) -> String {
        format!("ROLLBACK TO SAVEPOINT {}", self.quote_identifier(name))
    }

    /// Render a template into statement text plus positional parameters.
    fn render(&self, template: &SqlTemplate) -> RenderedSql {
        let mut sql = String::new();
        let mut params = Vec::new();
        for chunk in template.chunks() {
            match chunk {
                SqlChunk::Raw(text) => sql.push_str(text),
                SqlChunk::Param(value) => {
                    params.push(value.clone());
                    sql.push_str(&self.placeholder(params.len()));
                }
                SqlChunk::Identifier(parts) => {
                    let quoted: Vec<String> =
                        parts.iter().map(|p| self.quote_identifier(p)).collect();
                    sql.push_str(&quoted.join("."));
                }
            }
        }
        RenderedSql { sql, params }
    }
}

/// `$N` placeholders and double-quoted identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresFormatter;

/// `?` placeholders and backtick-quoted identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlFormatter;

static POSTGRES: PostgresFormatter = PostgresFormatter;
static MYSQL: MysqlFormatter = MysqlFormatter;

/// The shared formatter for `dialect`.
#[must_use]
pub fn formatter_for(dialect: Dialect) -> &'static dyn DialectFormatter {
    match dialect {
        Dialect::Postgresql => &POSTGRES,
        Dialect::Mysql => &MYSQL,
    }
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

fn float_literal(value: f64) -> Option<String> {
    value.is_finite().then(|| {
        let text = value.to_string();
        if text.contains(['.', 'e', 'E']) {
            text
        } else {
            format!("{text}.0")
        }
    })
}

impl DialectFormatter for PostgresFormatter {
    fn dialect(&self) -> Dialect {
        Dialect::Postgresql
    }

    fn placeholder(&self, position: usize) -> String {
        format!("${position}")
    }

    fn quote_identifier(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn quote_literal(&self, value: &RowValues) -> Result<String, DriverError> {
        let quote = |s: &str| format!("'{}'", s.replace('\'', "''"));
        Ok(match value {
            RowValues::Int(i) => i.to_string(),
            RowValues::Float(f) => float_literal(*f).unwrap_or_else(|| {
                let special = if f.is_nan() {
                    "NaN"
                } else if f.is_sign_positive() {
                    "Infinity"
                } else {
                    "-Infinity"
                };
                format!("'{special}'::float8")
            }),
            RowValues::Text(s) => quote(s),
            RowValues::Bool(b) => String::from(if *b { "TRUE" } else { "FALSE" }),
            RowValues::Timestamp(ts) => format!("'{}'::timestamp", ts.format(TIMESTAMP_FORMAT)),
            RowValues::Null => "NULL".to_string(),
            RowValues::JSON(v) => format!("{}::jsonb", quote(&v.to_string())),
            RowValues::Blob(bytes) => format!("'\\x{}'::bytea", hex(bytes)),
        })
    }

    fn begin_statements(&self, options: &TransactionOptions) -> Vec<String> {
        let mut modes = Vec::new();
        if let Some(level) = options.isolation_level {
            modes.push(format!("ISOLATION LEVEL {}", level.as_sql()));
        }
        if let Some(mode) = options.access_mode {
            modes.push(mode.as_sql().to_string());
        }
        if let Some(deferrable) = options.deferrable {
            modes.push(String::from(if deferrable {
                "DEFERRABLE"
            } else {
                "NOT DEFERRABLE"
            }));
        }
        if modes.is_empty() {
            vec!["BEGIN".to_string()]
        } else {
            vec![format!("BEGIN {}", modes.join(", "))]
        }
    }
}

impl DialectFormatter for MysqlFormatter {
    fn dialect(&self) -> Dialect {
        Dialect::Mysql
    }

    fn placeholder(&self, _position: usize) -> String {
        "?".to_string()
    }

    fn quote_identifier(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }

    fn quote_literal(&self, value: &RowValues) -> Result<String, DriverError> {
        Ok(match value {
            RowValues::Int(i) => i.to_string(),
            RowValues::Float(f) => float_literal(*f).ok_or_else(|| {
                DriverError::ParameterError(format!("MySQL has no literal for the float {f}"))
            })?,
            RowValues::Text(s) => mysql_string(s),
            RowValues::Bool(b) => String::from(if *b { "TRUE" } else { "FALSE" }),
            RowValues::Timestamp(ts) => format!("'{}'", ts.format(TIMESTAMP_FORMAT)),
            RowValues::Null => "NULL".to_string(),
            RowValues::JSON(v) => mysql_string(&v.to_string()),
            RowValues::Blob(bytes) => format!("X'{}'", hex(bytes)),
        })
    }

    fn begin_statements(&self, options: &TransactionOptions) -> Vec<String> {
        let mut statements = Vec::with_capacity(2);
        if let Some(level) = options.isolation_level {
            statements.push(format!("SET TRANSACTION ISOLATION LEVEL {}", level.as_sql()));
        }
        if options.deferrable.is_some() {
            tracing::debug!("mysql has no deferrable transactions; ignoring");
        }
        statements.push(match options.access_mode {
            Some(AccessMode::ReadOnly) => "START TRANSACTION READ ONLY".to_string(),
            Some(AccessMode::ReadWrite) => "START TRANSACTION READ WRITE".to_string(),
            None => "START TRANSACTION".to_string(),
        });
        statements
    }
}

fn mysql_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            '\x1a' => out.push_str("\\Z"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}
