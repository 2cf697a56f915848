use std::fmt::Write as _;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value;
use tokio_postgres::types::{FromSql, Type};
use tokio_postgres::{Row, Statement};

use crate::error::DriverError;
use crate::results::{FieldInfo, QueryResult};
use crate::types::RowValues;

/// Raw column bytes for types without a dedicated conversion.
struct RawValue(Vec<u8>);

impl<'a> FromSql<'a> for RawValue {
    fn from_sql(
        _ty: &Type,
        raw: &'a [u8],
    ) -> Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        Ok(RawValue(raw.to_vec()))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

/// Build a buffered result from rows of `statement`.
///
/// # Errors
/// Returns `DriverError::PostgresError` if a column cannot be decoded.
pub(crate) fn build_result(statement: &Statement, rows: &[Row]) -> Result<QueryResult, DriverError> {
    let fields = statement
        .columns()
        .iter()
        .map(|col| FieldInfo::new(col.name(), col.type_().name()))
        .collect::<Vec<_>>();
    let column_count = fields.len();
    let mut result = QueryResult::with_fields(fields, rows.len());
    for row in rows {
        let mut values = Vec::with_capacity(column_count);
        for idx in 0..column_count {
            values.push(extract_value(row, idx)?);
        }
        result.push_row(values);
    }
    Ok(result)
}

/// Extract column `idx` of `row` as a [`RowValues`].
///
/// # Errors
/// Returns `DriverError::PostgresError` if the value cannot be read.
pub(crate) fn extract_value(row: &Row, idx: usize) -> Result<RowValues, DriverError> {
    let ty = row.columns()[idx].type_().clone();
    let value = match ty {
        Type::INT2 => row
            .try_get::<_, Option<i16>>(idx)?
            .map_or(RowValues::Null, |v| RowValues::Int(i64::from(v))),
        Type::INT4 => row
            .try_get::<_, Option<i32>>(idx)?
            .map_or(RowValues::Null, |v| RowValues::Int(i64::from(v))),
        Type::INT8 => row
            .try_get::<_, Option<i64>>(idx)?
            .map_or(RowValues::Null, RowValues::Int),
        Type::OID => row
            .try_get::<_, Option<u32>>(idx)?
            .map_or(RowValues::Null, |v| RowValues::Int(i64::from(v))),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)?
            .map_or(RowValues::Null, |v| RowValues::Float(f64::from(v))),
        Type::FLOAT8 => row
            .try_get::<_, Option<f64>>(idx)?
            .map_or(RowValues::Null, RowValues::Float),
        Type::BOOL => row
            .try_get::<_, Option<bool>>(idx)?
            .map_or(RowValues::Null, RowValues::Bool),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map_or(RowValues::Null, RowValues::Timestamp),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map_or(RowValues::Null, |v| RowValues::Timestamp(v.naive_utc())),
        Type::DATE => row
            .try_get::<_, Option<NaiveDate>>(idx)?
            .map_or(RowValues::Null, |v| RowValues::Text(v.to_string())),
        Type::TIME => row
            .try_get::<_, Option<NaiveTime>>(idx)?
            .map_or(RowValues::Null, |v| RowValues::Text(v.to_string())),
        Type::JSON | Type::JSONB => row
            .try_get::<_, Option<Value>>(idx)?
            .map_or(RowValues::Null, RowValues::JSON),
        Type::BYTEA => row
            .try_get::<_, Option<Vec<u8>>>(idx)?
            .map_or(RowValues::Null, RowValues::Blob),
        ref other if <String as FromSql>::accepts(other) => row
            .try_get::<_, Option<String>>(idx)?
            .map_or(RowValues::Null, RowValues::Text),
        Type::NUMERIC => match row.try_get::<_, Option<RawValue>>(idx)? {
            None => RowValues::Null,
            Some(RawValue(raw)) => numeric_text(&raw)
                .map_or(RowValues::Blob(raw), RowValues::Text),
        },
        Type::UUID => match row.try_get::<_, Option<RawValue>>(idx)? {
            None => RowValues::Null,
            Some(RawValue(raw)) => uuid_text(&raw).map_or(RowValues::Blob(raw), RowValues::Text),
        },
        _ => row
            .try_get::<_, Option<RawValue>>(idx)?
            .map_or(RowValues::Null, |RawValue(raw)| RowValues::Blob(raw)),
    };
    Ok(value)
}

/// Decimal text of a binary `numeric` value.
pub(crate) fn numeric_text(raw: &[u8]) -> Option<String> {
    let word = |i: usize| -> Option<u16> {
        Some(u16::from_be_bytes([*raw.get(i)?, *raw.get(i + 1)?]))
    };
    let ndigits = usize::from(word(0)?);
    #[allow(clippy::cast_possible_wrap)]
    let weight = i32::from(word(2)? as i16);
    let sign = word(4)?;
    let dscale = usize::from(word(6)?);
    match sign {
        0xC000 => return Some("NaN".to_string()),
        0xD000 => return Some("Infinity".to_string()),
        0xF000 => return Some("-Infinity".to_string()),
        _ => {}
    }
    let digits = (0..ndigits)
        .map(|i| word(8 + 2 * i))
        .collect::<Option<Vec<u16>>>()?;
    let digit_at = |i: i32| -> u16 {
        usize::try_from(i)
            .ok()
            .and_then(|i| digits.get(i).copied())
            .unwrap_or(0)
    };

    let mut out = String::new();
    if sign == 0x4000 {
        out.push('-');
    }
    if weight < 0 {
        out.push('0');
    } else {
        for i in 0..=weight {
            if i == 0 {
                let _ = write!(out, "{}", digit_at(i));
            } else {
                let _ = write!(out, "{:04}", digit_at(i));
            }
        }
    }
    if dscale > 0 {
        let mut frac = String::with_capacity(dscale + 4);
        let mut i = weight + 1;
        while frac.len() < dscale {
            let _ = write!(frac, "{:04}", digit_at(i));
            i += 1;
        }
        frac.truncate(dscale);
        out.push('.');
        out.push_str(&frac);
    }
    Some(out)
}

fn uuid_text(raw: &[u8]) -> Option<String> {
    if raw.len() != 16 {
        return None;
    }
    let mut out = String::with_capacity(36);
    for (i, b) in raw.iter().enumerate() {
        if matches!(i, 4 | 6 | 8 | 10) {
            out.push('-');
        }
        let _ = write!(out, "{b:02x}");
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric(ndigits: u16, weight: i16, sign: u16, dscale: u16, digits: &[u16]) -> Vec<u8> {
        let mut raw = Vec::new();
        raw.extend_from_slice(&ndigits.to_be_bytes());
        raw.extend_from_slice(&weight.to_be_bytes());
        raw.extend_from_slice(&sign.to_be_bytes());
        raw.extend_from_slice(&dscale.to_be_bytes());
        for d in digits {
            raw.extend_from_slice(&d.to_be_bytes());
        }
        raw
    }

    #[test]
    fn numeric_decoding() {
        // 12345.678
        assert_eq!(
            numeric_text(&numeric(3, 1, 0, 3, &[1, 2345, 6780])).as_deref(),
            Some("12345.678")
        );
        // -0.0042
        assert_eq!(
            numeric_text(&numeric(1, -1, 0x4000, 4, &[42])).as_deref(),
            Some("-0.0042")
        );
        // 0.00000001 (first group lies two groups below the point)
        assert_eq!(
            numeric_text(&numeric(1, -2, 0, 8, &[1])).as_deref(),
            Some("0.00000001")
        );
        // 20000 with trailing zero groups dropped by the server
        assert_eq!(numeric_text(&numeric(1, 1, 0, 0, &[2])).as_deref(), Some("20000"));
        assert_eq!(numeric_text(&numeric(0, 0, 0xC000, 0, &[])).as_deref(), Some("NaN"));
        assert!(numeric_text(&[0, 1]).is_none());
    }

    #[test]
    fn uuid_formatting() {
        let raw: Vec<u8> = (0..16).collect();
        assert_eq!(
            uuid_text(&raw).as_deref(),
            Some("00010203-0405-0607-0809-0a0b0c0d0e0f")
        );
    }
}
