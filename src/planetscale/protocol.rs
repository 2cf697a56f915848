//! Wire shapes of the PlanetScale-style `Execute` RPC.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::error::DriverError;
use crate::results::{FieldInfo, QueryResult};
use crate::types::{RowValues, parse_timestamp};

#[derive(Debug, Serialize)]
pub(crate) struct ExecuteRequest<'a> {
    pub(crate) query: &'a str,
    /// Always null: every call runs in a fresh server-side session.
    pub(crate) session: Option<()>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExecuteResponse {
    #[serde(default)]
    pub(crate) result: Option<ResultSet>,
    #[serde(default)]
    pub(crate) error: Option<VitessError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VitessError {
    pub(crate) message: String,
    #[serde(default)]
    pub(crate) code: Option<String>,
}

impl From<VitessError> for DriverError {
    fn from(err: VitessError) -> Self {
        DriverError::ServerError {
            message: err.message,
            code: err.code,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct Field {
    pub(crate) name: String,
    #[serde(rename = "type", default)]
    pub(crate) column_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EncodedRow {
    /// Byte length of each value as a decimal string; `-1` is NULL.
    #[serde(default)]
    pub(crate) lengths: Vec<String>,
    /// Every non-null value concatenated, base64 encoded.
    #[serde(default)]
    pub(crate) values: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ResultSet {
    #[serde(default)]
    pub(crate) fields: Vec<Field>,
    #[serde(default)]
    pub(crate) rows: Vec<EncodedRow>,
    #[serde(default)]
    pub(crate) rows_affected: Option<String>,
}

/// Server error from a non-2xx body, falling back to the raw text.
pub(crate) fn http_error(status: u16, body: &str) -> DriverError {
    match serde_json::from_str::<VitessError>(body) {
        Ok(err) => err.into(),
        Err(_) => DriverError::ServerError {
            message: format!("HTTP {status}: {}", body.trim()),
            code: None,
        },
    }
}

fn split_row(row: EncodedRow) -> Result<Vec<Option<Vec<u8>>>, DriverError> {
    let bytes = match row.values.as_deref() {
        Some(encoded) if !encoded.is_empty() => STANDARD
            .decode(encoded)
            .map_err(|e| DriverError::ProtocolError(format!("row values are not base64: {e}")))?,
        _ => Vec::new(),
    };
    let mut offset = 0_usize;
    let mut out = Vec::with_capacity(row.lengths.len());
    for raw in &row.lengths {
        let len: i64 = raw
            .parse()
            .map_err(|_| DriverError::ProtocolError(format!("invalid value length `{raw}`")))?;
        let Ok(len) = usize::try_from(len) else {
            out.push(None);
            continue;
        };
        let value = offset
            .checked_add(len)
            .and_then(|end| bytes.get(offset..end))
            .ok_or_else(|| DriverError::ProtocolError("row values shorter than their lengths".into()))?;
        out.push(Some(value.to_vec()));
        offset += len;
    }
    Ok(out)
}

/// Decode one value by its Vitess type name. Unparsable values stay text.
pub(crate) fn decode_value(column_type: &str, raw: Option<Vec<u8>>) -> RowValues {
    let Some(bytes) = raw else {
        return RowValues::Null;
    };
    if column_type == "NULL_TYPE" {
        return RowValues::Null;
    }
    if matches!(
        column_type,
        "BLOB" | "BINARY" | "VARBINARY" | "BIT" | "GEOMETRY" | "BITNUM"
    ) {
        return RowValues::Blob(bytes);
    }
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => return RowValues::Blob(e.into_bytes()),
    };
    match column_type {
        t if t.starts_with("INT") || t.starts_with("UINT") || t == "YEAR" => {
            text.parse().map_or(RowValues::Text(text), RowValues::Int)
        }
        "FLOAT32" | "FLOAT64" => text.parse().map_or(RowValues::Text(text), RowValues::Float),
        "JSON" => serde_json::from_str(&text).map_or(RowValues::Text(text), RowValues::JSON),
        "DATETIME" | "TIMESTAMP" => parse_timestamp(&text).map_or(RowValues::Text(text), RowValues::Timestamp),
        _ => RowValues::Text(text),
    }
}

impl ResultSet {
    pub(crate) fn into_result(self) -> Result<QueryResult, DriverError> {
        let affected = self
            .rows_affected
            .as_deref()
            .and_then(|n| n.parse().ok())
            .unwrap_or(0);
        if self.fields.is_empty() {
            return Ok(QueryResult::affected(affected));
        }
        let types: Vec<String> = self
            .fields
            .iter()
            .map(|f| f.column_type.clone().unwrap_or_else(|| "VARCHAR".into()))
            .collect();
        let fields = self
            .fields
            .into_iter()
            .zip(types.iter())
            .map(|(f, t)| FieldInfo::new(f.name, t.clone()))
            .collect();
        let mut result = QueryResult::with_fields(fields, self.rows.len());
        for row in self.rows {
            let values = split_row(row)?
                .into_iter()
                .zip(types.iter())
                .map(|(raw, t)| decode_value(t, raw))
                .collect();
            result.push_row(values);
        }
        Ok(result)
    }
}
