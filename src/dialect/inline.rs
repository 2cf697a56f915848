use std::borrow::Cow;

use crate::error::DriverError;
use crate::types::{Dialect, RowValues};

use super::formatter_for;
use super::parsers::{
    is_block_comment_end, is_block_comment_start, is_hash_comment_start, is_line_comment_start,
    matches_tag, try_start_dollar_quote,
};
use super::scanner::{State, scan_digits};

/// Walk `sql` and hand every placeholder outside quotes and comments to `replace`.
///
/// `replace` receives the zero-based parameter index: `$N` maps to `N - 1` for
/// Postgres, and the n-th `?` maps to `n` for `MySQL`. Returns a borrowed `Cow` when
/// the statement has no placeholders.
pub(crate) fn rewrite_placeholders<'a, F>(
    sql: &'a str,
    dialect: Dialect,
    mut replace: F,
) -> Result<Cow<'a, str>, DriverError>
where
    F: FnMut(usize) -> Result<String, DriverError>,
{
    let mysql = matches!(dialect, Dialect::Mysql);
    let bytes = sql.as_bytes();
    let mut out: Option<String> = None;
    let mut copied = 0;
    let mut positional = 0;
    let mut state = State::Normal;
    let mut idx = 0;

    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            State::Normal => match b {
                b'\'' => state = State::SingleQuoted,
                b'"' => state = State::DoubleQuoted,
                b'`' if mysql => state = State::Backticked,
                _ if is_line_comment_start(bytes, idx) => state = State::LineComment,
                _ if mysql && is_hash_comment_start(bytes, idx) => state = State::LineComment,
                _ if is_block_comment_start(bytes, idx) => {
                    state = State::BlockComment(1);
                    idx += 1;
                }
                b'$' if !mysql => {
                    if let Some((tag, advance)) = try_start_dollar_quote(bytes, idx) {
                        state = State::DollarQuoted(tag);
                        idx = advance;
                    } else if let Some((digits_end, digits)) = scan_digits(bytes, idx + 1) {
                        let number: usize = digits.parse().map_err(|_| {
                            DriverError::ParameterError(format!("invalid placeholder ${digits}"))
                        })?;
                        if number == 0 {
                            return Err(DriverError::ParameterError(
                                "placeholders are numbered from $1".to_string(),
                            ));
                        }
                        let buf = out.get_or_insert_with(String::new);
                        buf.push_str(&sql[copied..idx]);
                        buf.push_str(&replace(number - 1)?);
                        copied = digits_end;
                        idx = digits_end - 1;
                    }
                }
                b'?' if mysql => {
                    let buf = out.get_or_insert_with(String::new);
                    buf.push_str(&sql[copied..idx]);
                    buf.push_str(&replace(positional)?);
                    positional += 1;
                    copied = idx + 1;
                }
                _ => {}
            },
            State::SingleQuoted | State::DoubleQuoted => {
                let quote = if matches!(state, State::SingleQuoted) {
                    b'\''
                } else {
                    b'"'
                };
                if mysql && b == b'\\' {
                    idx += 1; // escaped character
                } else if b == quote {
                    if bytes.get(idx + 1) == Some(&quote) {
                        idx += 1; // doubled quote
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::Backticked => {
                if b == b'`' {
                    if bytes.get(idx + 1) == Some(&b'`') {
                        idx += 1;
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment(depth) => {
                if !mysql && is_block_comment_start(bytes, idx) {
                    state = State::BlockComment(depth + 1);
                    idx += 1;
                } else if is_block_comment_end(bytes, idx) {
                    state = if depth == 1 {
                        State::Normal
                    } else {
                        State::BlockComment(depth - 1)
                    };
                    idx += 1;
                }
            }
            State::DollarQuoted(ref tag) => {
                if b == b'$' && matches_tag(bytes, idx, tag) {
                    idx += tag.len() + 1;
                    state = State::Normal;
                }
            }
        }
        idx += 1;
    }

    match out {
        Some(mut buf) => {
            buf.push_str(&sql[copied..]);
            Ok(Cow::Owned(buf))
        }
        None => Ok(Cow::Borrowed(sql)),
    }
}

/// Number of distinct parameters a statement references.
///
/// # Errors
/// Returns `DriverError::ParameterError` for malformed Postgres placeholders such as `$0`.
pub fn count_placeholders(sql: &str, dialect: Dialect) -> Result<usize, DriverError> {
    let mut highest = 0;
    rewrite_placeholders(sql, dialect, |index| {
        highest = highest.max(index + 1);
        Ok(String::new())
    })?;
    Ok(highest)
}

/// Replace placeholders with quoted literals for transports that cannot bind parameters.
///
/// Placeholders inside string literals, quoted identifiers, comments and dollar-quoted
/// bodies are left alone:
/// ```rust
/// use db_switchboard::prelude::*;
///
/// let sql = inline_params(
///     "SELECT '?' AS q, name FROM users WHERE id = ? -- ?",
///     &[RowValues::Int(7)],
///     Dialect::Mysql,
/// )?;
/// assert_eq!(sql, "SELECT '?' AS q, name FROM users WHERE id = 7 -- ?");
/// # Ok::<(), DriverError>(())
/// ```
///
/// # Errors
/// Returns `DriverError::ParameterError` when the placeholder count and the number of
/// parameters disagree, or when a value has no literal in `dialect`.
pub fn inline_params(sql: &str, params: &[RowValues], dialect: Dialect) -> Result<String, DriverError> {
    let formatter = formatter_for(dialect);
    let mut highest = 0;
    let rendered = rewrite_placeholders(sql, dialect, |index| {
        highest = highest.max(index + 1);
        let value = params.get(index).ok_or_else(|| {
            DriverError::ParameterError(format!(
                "statement references parameter {} but only {} were supplied",
                index + 1,
                params.len()
            ))
        })?;
        formatter.quote_literal(value)
    })?;
    if highest != params.len() {
        return Err(DriverError::ParameterError(format!(
            "statement uses {highest} parameters but {} were supplied",
            params.len()
        )));
    }
    Ok(rendered.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postgres_placeholders_can_repeat() {
        let sql = inline_params(
            "select $1, $2, $1",
            &[RowValues::Int(1), RowValues::Text("o'neil".into())],
            Dialect::Postgresql,
        )
        .unwrap();
        assert_eq!(sql, "select 1, 'o''neil', 1");
    }

    #[test]
    fn postgres_skips_literals_comments_and_dollar_bodies() {
        let sql = "select '$1', \"$1\" -- $1\n/* $1 /* $1 */ */ $tag$ $1 $tag$, $1";
        let out = inline_params(sql, &[RowValues::Bool(true)], Dialect::Postgresql).unwrap();
        assert_eq!(
            out,
            "select '$1', \"$1\" -- $1\n/* $1 /* $1 */ */ $tag$ $1 $tag$, TRUE"
        );
    }

    #[test]
    fn mysql_respects_backslash_escapes_and_backticks() {
        let sql = r"select 'it\'s ?', `odd?name`, ? # ?";
        let out = inline_params(sql, &[RowValues::Null], Dialect::Mysql).unwrap();
        assert_eq!(out, r"select 'it\'s ?', `odd?name`, NULL # ?");
    }

    #[test]
    fn mysql_quotes_special_characters() {
        let out = inline_params(
            "insert into t values (?, ?)",
            &[RowValues::Text("a'b\\c\n".into()), RowValues::Blob(vec![0xde, 0xad])],
            Dialect::Mysql,
        )
        .unwrap();
        assert_eq!(out, r"insert into t values ('a\'b\\c\n', X'dead')");
    }

    #[test]
    fn non_ascii_text_survives() {
        let out = inline_params("select 'héllo', ?", &[RowValues::Text("ünï".into())], Dialect::Mysql)
            .unwrap();
        assert_eq!(out, "select 'héllo', 'ünï'");
    }

    #[test]
    fn count_mismatch_is_a_parameter_error() {
        let err = inline_params("select ?, ?", &[RowValues::Int(1)], Dialect::Mysql).unwrap_err();
        assert!(matches!(err, DriverError::ParameterError(_)));
        let err = inline_params("select $1", &[RowValues::Int(1), RowValues::Int(2)], Dialect::Postgresql)
            .unwrap_err();
        assert!(matches!(err, DriverError::ParameterError(_)));
        assert!(inline_params("select $0", &[], Dialect::Postgresql).is_err());
    }

    #[test]
    fn mysql_inlining_refuses_nan() {
        let err = inline_params("insert into t values (?)", &[RowValues::Float(f64::NAN)], Dialect::Mysql)
            .unwrap_err();
        assert!(matches!(err, DriverError::ParameterError(_)));
        let out = inline_params("select $1", &[RowValues::Float(f64::INFINITY)], Dialect::Postgresql).unwrap();
        assert_eq!(out, "select 'Infinity'::float8");
    }

    #[test]
    fn counting_and_borrowing() {
        assert_eq!(count_placeholders("select $3, $1", Dialect::Postgresql).unwrap(), 3);
        assert_eq!(count_placeholders("select ?, '?', ?", Dialect::Mysql).unwrap(), 2);
        let untouched = rewrite_placeholders("select 1", Dialect::Mysql, |_| Ok(String::new())).unwrap();
        assert!(matches!(untouched, Cow::Borrowed(_)));
    }
}
