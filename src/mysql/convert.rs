use chrono::{Datelike, NaiveDate, Timelike};
use mysql_async::Value;
use mysql_async::consts::ColumnType;

use crate::types::{RowValues, TIMESTAMP_FORMAT, parse_timestamp};

/// Character set id `MySQL` reports for binary columns.
pub(crate) const BINARY_CHARSET: u16 = 63;

/// Bind a parameter. Booleans travel as 0/1, JSON as text.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn to_mysql_value(value: &RowValues) -> Value {
    match value {
        RowValues::Null => Value::NULL,
        RowValues::Int(i) => Value::Int(*i),
        RowValues::Float(f) => Value::Double(*f),
        RowValues::Text(s) => Value::Bytes(s.as_bytes().to_vec()),
        RowValues::Bool(b) => Value::Int(i64::from(*b)),
        RowValues::Timestamp(ts) => match u16::try_from(ts.year()) {
            Ok(year) => Value::Date(
                year,
                ts.month() as u8,
                ts.day() as u8,
                ts.hour() as u8,
                ts.minute() as u8,
                ts.second() as u8,
                ts.nanosecond() / 1_000,
            ),
            Err(_) => Value::Bytes(ts.format(TIMESTAMP_FORMAT).to_string().into_bytes()),
        },
        RowValues::JSON(v) => Value::Bytes(v.to_string().into_bytes()),
        RowValues::Blob(bytes) => Value::Bytes(bytes.clone()),
    }
}

/// Short type name for [`crate::results::FieldInfo`], e.g. `LONG` or `VAR_STRING`.
pub(crate) fn type_name(column_type: ColumnType) -> String {
    let debug = format!("{column_type:?}");
    debug
        .strip_prefix("MYSQL_TYPE_")
        .map_or_else(|| debug.clone(), str::to_string)
}

fn is_integer(column_type: ColumnType) -> bool {
    matches!(
        column_type,
        ColumnType::MYSQL_TYPE_TINY
            | ColumnType::MYSQL_TYPE_SHORT
            | ColumnType::MYSQL_TYPE_LONG
            | ColumnType::MYSQL_TYPE_INT24
            | ColumnType::MYSQL_TYPE_LONGLONG
            | ColumnType::MYSQL_TYPE_YEAR
    )
}

fn is_datetime(column_type: ColumnType) -> bool {
    matches!(
        column_type,
        ColumnType::MYSQL_TYPE_DATETIME
            | ColumnType::MYSQL_TYPE_DATETIME2
            | ColumnType::MYSQL_TYPE_TIMESTAMP
            | ColumnType::MYSQL_TYPE_TIMESTAMP2
    )
}

/// Decode one column value. The text protocol delivers everything as bytes, so bytes
/// are re-typed from the column metadata; unparsable values stay text.
pub(crate) fn from_mysql_value(value: Value, column_type: ColumnType, charset: u16) -> RowValues {
    match value {
        Value::NULL => RowValues::Null,
        Value::Int(i) => RowValues::Int(i),
        Value::UInt(u) => i64::try_from(u).map_or_else(|_| RowValues::Text(u.to_string()), RowValues::Int),
        Value::Float(f) => RowValues::Float(f64::from(f)),
        Value::Double(d) => RowValues::Float(d),
        Value::Date(year, month, day, hour, minute, second, micro) => {
            if matches!(
                column_type,
                ColumnType::MYSQL_TYPE_DATE | ColumnType::MYSQL_TYPE_NEWDATE
            ) {
                return RowValues::Text(format!("{year:04}-{month:02}-{day:02}"));
            }
            NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day))
                .and_then(|date| {
                    date.and_hms_micro_opt(
                        u32::from(hour),
                        u32::from(minute),
                        u32::from(second),
                        micro,
                    )
                })
                .map_or_else(
                    || {
                        RowValues::Text(format!(
                            "{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}"
                        ))
                    },
                    RowValues::Timestamp,
                )
        }
        Value::Time(negative, days, hours, minutes, seconds, micro) => {
            let sign = if negative { "-" } else { "" };
            let hours = days * 24 + u32::from(hours);
            RowValues::Text(format!(
                "{sign}{hours:02}:{minutes:02}:{seconds:02}.{micro:06}"
            ))
        }
        Value::Bytes(bytes) => from_bytes(bytes, column_type, charset),
    }
}

fn from_bytes(bytes: Vec<u8>, column_type: ColumnType, charset: u16) -> RowValues {
    let text = |bytes: Vec<u8>| match String::from_utf8(bytes) {
        Ok(s) => RowValues::Text(s),
        Err(e) => RowValues::Blob(e.into_bytes()),
    };
    match column_type {
        t if is_integer(t) => match std::str::from_utf8(&bytes).ok().and_then(|s| s.parse().ok()) {
            Some(i) => RowValues::Int(i),
            None => text(bytes),
        },
        ColumnType::MYSQL_TYPE_FLOAT | ColumnType::MYSQL_TYPE_DOUBLE => {
            match std::str::from_utf8(&bytes).ok().and_then(|s| s.parse().ok()) {
                Some(f) => RowValues::Float(f),
                None => text(bytes),
            }
        }
        ColumnType::MYSQL_TYPE_JSON => match serde_json::from_slice(&bytes) {
            Ok(json) => RowValues::JSON(json),
            Err(_) => text(bytes),
        },
        t if is_datetime(t) => match std::str::from_utf8(&bytes).ok().and_then(parse_timestamp) {
            Some(ts) => RowValues::Timestamp(ts),
            None => text(bytes),
        },
        // Numeric and temporal columns report the binary charset too.
        ColumnType::MYSQL_TYPE_DECIMAL
        | ColumnType::MYSQL_TYPE_NEWDECIMAL
        | ColumnType::MYSQL_TYPE_DATE
        | ColumnType::MYSQL_TYPE_NEWDATE
        | ColumnType::MYSQL_TYPE_TIME
        | ColumnType::MYSQL_TYPE_TIME2 => text(bytes),
        ColumnType::MYSQL_TYPE_BIT => RowValues::Blob(bytes),
        _ if charset == BINARY_CHARSET => RowValues::Blob(bytes),
        _ => text(bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const UTF8MB4: u16 = 45;

    #[test]
    fn text_protocol_bytes_are_retyped() {
        let int = from_mysql_value(Value::Bytes(b"42".to_vec()), ColumnType::MYSQL_TYPE_LONGLONG, BINARY_CHARSET);
        assert_eq!(int, RowValues::Int(42));
        let price = from_mysql_value(Value::Bytes(b"9.90".to_vec()), ColumnType::MYSQL_TYPE_NEWDECIMAL, BINARY_CHARSET);
        assert_eq!(price, RowValues::Text("9.90".into()));
        let blob = from_mysql_value(Value::Bytes(vec![0, 159]), ColumnType::MYSQL_TYPE_BLOB, BINARY_CHARSET);
        assert_eq!(blob, RowValues::Blob(vec![0, 159]));
        let name = from_mysql_value(Value::Bytes(b"ada".to_vec()), ColumnType::MYSQL_TYPE_VAR_STRING, UTF8MB4);
        assert_eq!(name, RowValues::Text("ada".into()));
        let doc = from_mysql_value(Value::Bytes(br#"{"k":[1]}"#.to_vec()), ColumnType::MYSQL_TYPE_JSON, UTF8MB4);
        assert_eq!(doc, RowValues::JSON(serde_json::json!({"k": [1]})));
        let at = from_mysql_value(
            Value::Bytes(b"2024-02-03 04:05:06".to_vec()),
            ColumnType::MYSQL_TYPE_DATETIME,
            BINARY_CHARSET,
        );
        assert_eq!(at.as_timestamp().map(|t| t.to_string()), Some("2024-02-03 04:05:06".into()));
    }

    #[test]
    fn binary_protocol_dates() {
        let ts = from_mysql_value(
            Value::Date(2024, 2, 3, 4, 5, 6, 500_000),
            ColumnType::MYSQL_TYPE_TIMESTAMP,
            BINARY_CHARSET,
        );
        assert_eq!(ts.as_timestamp().map(|t| t.to_string()), Some("2024-02-03 04:05:06.500".into()));
        let day = from_mysql_value(Value::Date(2024, 2, 3, 0, 0, 0, 0), ColumnType::MYSQL_TYPE_DATE, BINARY_CHARSET);
        assert_eq!(day, RowValues::Text("2024-02-03".into()));
        let time = from_mysql_value(Value::Time(true, 1, 2, 3, 4, 0), ColumnType::MYSQL_TYPE_TIME, BINARY_CHARSET);
        assert_eq!(time, RowValues::Text("-26:03:04.000000".into()));
    }

    #[test]
    fn params_bind_natively() {
        assert_eq!(to_mysql_value(&RowValues::Bool(true)), Value::Int(1));
        assert_eq!(
            to_mysql_value(&RowValues::JSON(serde_json::json!({"a": 1}))),
            Value::Bytes(br#"{"a":1}"#.to_vec())
        );
        let ts = parse_timestamp("2024-02-03 04:05:06.250").unwrap();
        assert_eq!(
            to_mysql_value(&RowValues::Timestamp(ts)),
            Value::Date(2024, 2, 3, 4, 5, 6, 250_000)
        );
    }

    #[test]
    fn type_names_are_short() {
        assert_eq!(type_name(ColumnType::MYSQL_TYPE_VAR_STRING), "VAR_STRING");
    }
}
