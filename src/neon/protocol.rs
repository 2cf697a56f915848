//! Wire shapes of the Neon-style SQL-over-HTTP endpoint.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DriverError;
use crate::results::{FieldInfo, QueryResult};
use crate::types::{RowValues, TIMESTAMP_FORMAT, parse_timestamp};

pub(crate) const CONNECTION_STRING_HEADER: &str = "Neon-Connection-String";
pub(crate) const RAW_TEXT_HEADER: &str = "Neon-Raw-Text-Output";
pub(crate) const ARRAY_MODE_HEADER: &str = "Neon-Array-Mode";

#[derive(Debug, Serialize)]
pub(crate) struct QueryRequest {
    pub(crate) query: String,
    pub(crate) params: Vec<Option<String>>,
}

impl QueryRequest {
    pub(crate) fn new(sql: &str, params: &[RowValues]) -> Self {
        Self {
            query: sql.to_string(),
            params: params.iter().map(encode_param).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct BatchRequest {
    pub(crate) queries: Vec<QueryRequest>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FieldDescription {
    pub(crate) name: String,
    #[serde(rename = "dataTypeID")]
    pub(crate) data_type_id: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QueryResponse {
    #[serde(default)]
    pub(crate) fields: Vec<FieldDescription>,
    #[serde(default)]
    pub(crate) rows: Vec<Vec<Option<String>>>,
    pub(crate) row_count: Option<u64>,
    #[serde(default)]
    pub(crate) command: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BatchResponse {
    pub(crate) results: Vec<QueryResponse>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorResponse {
    pub(crate) message: String,
    #[serde(default)]
    pub(crate) code: Option<String>,
}

/// Server error from a non-2xx body, falling back to the raw text.
pub(crate) fn server_error(status: u16, body: &str) -> DriverError {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(err) => DriverError::ServerError {
            message: err.message,
            code: err.code,
        },
        Err(_) => DriverError::ServerError {
            message: format!("HTTP {status}: {}", body.trim()),
            code: None,
        },
    }
}

/// Parameters travel as text, exactly like the Postgres text protocol.
pub(crate) fn encode_param(value: &RowValues) -> Option<String> {
    match value {
        RowValues::Null => None,
        RowValues::Int(i) => Some(i.to_string()),
        RowValues::Float(f) => Some(f.to_string()),
        RowValues::Text(s) => Some(s.clone()),
        RowValues::Bool(b) => Some(b.to_string()),
        RowValues::Timestamp(ts) => Some(ts.format(TIMESTAMP_FORMAT).to_string()),
        RowValues::JSON(v) => Some(v.to_string()),
        RowValues::Blob(bytes) => {
            let mut out = String::with_capacity(2 + bytes.len() * 2);
            out.push_str("\\x");
            for b in bytes {
                out.push_str(&format!("{b:02x}"));
            }
            Some(out)
        }
    }
}

// Postgres type OIDs the decoder understands.
const BOOL: u32 = 16;
const BYTEA: u32 = 17;
const INT8: u32 = 20;
const INT2: u32 = 21;
const INT4: u32 = 23;
const OID: u32 = 26;
const JSON: u32 = 114;
const FLOAT4: u32 = 700;
const FLOAT8: u32 = 701;
const TIMESTAMP: u32 = 1114;
const TIMESTAMPTZ: u32 = 1184;
const NUMERIC: u32 = 1700;
const JSONB: u32 = 3802;

fn type_name(oid: u32) -> &'static str {
    match oid {
        BOOL => "bool",
        BYTEA => "bytea",
        INT8 => "int8",
        INT2 => "int2",
        INT4 => "int4",
        OID => "oid",
        JSON => "json",
        FLOAT4 => "float4",
        FLOAT8 => "float8",
        TIMESTAMP => "timestamp",
        TIMESTAMPTZ => "timestamptz",
        NUMERIC => "numeric",
        JSONB => "jsonb",
        _ => "text",
    }
}

/// Decode one raw text value by type OID. Unparsable values stay text.
pub(crate) fn decode_value(oid: u32, raw: Option<String>) -> RowValues {
    let Some(raw) = raw else {
        return RowValues::Null;
    };
    match oid {
        BOOL => RowValues::Bool(matches!(raw.as_str(), "t" | "true")),
        INT8 | INT2 | INT4 | OID => raw.parse().map_or(RowValues::Text(raw), RowValues::Int),
        FLOAT4 | FLOAT8 => raw.parse().map_or(RowValues::Text(raw), RowValues::Float),
        JSON | JSONB => serde_json::from_str::<Value>(&raw).map_or(RowValues::Text(raw), RowValues::JSON),
        BYTEA => decode_bytea(&raw).map_or(RowValues::Text(raw), RowValues::Blob),
        TIMESTAMP => parse_timestamp(&raw).map_or(RowValues::Text(raw), RowValues::Timestamp),
        TIMESTAMPTZ => DateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S%.f%#z")
            .map(|dt| dt.naive_utc())
            .map_or(RowValues::Text(raw), RowValues::Timestamp),
        _ => RowValues::Text(raw),
    }
}

fn decode_bytea(raw: &str) -> Option<Vec<u8>> {
    let hex = raw.strip_prefix("\\x")?;
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect()
}

impl QueryResponse {
    pub(crate) fn into_result(self) -> QueryResult {
        if self.fields.is_empty() {
            return QueryResult::affected(self.row_count.unwrap_or(0));
        }
        let oids: Vec<u32> = self.fields.iter().map(|f| f.data_type_id).collect();
        let fields = self
            .fields
            .into_iter()
            .map(|f| FieldInfo::new(f.name, type_name(f.data_type_id)))
            .collect();
        let row_count = self.row_count;
        let mut result = QueryResult::with_fields(fields, self.rows.len());
        for row in self.rows {
            let values = row
                .into_iter()
                .zip(oids.iter())
                .map(|(raw, oid)| decode_value(*oid, raw))
                .collect();
            result.push_row(values);
        }
        match row_count {
            Some(count) if self.command.as_deref() != Some("SELECT") => result.with_row_count(count),
            _ => result,
        }
    }
}
