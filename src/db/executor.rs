use chrono::{DateTime, NaiveTime};
use duckdb::types::{TimeUnit, Value};
use duckdb::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;
use tracing::debug;

/// One result row, column name to value, in select-list order.
pub type Row = Map<String, JsonValue>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl ResultSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("database connection error: {0}")]
    Connectivity(String),
    #[error("SQL syntax error: {0}")]
    Syntax(String),
    #[error("SQL execution error: {0}")]
    Execution(String),
}

impl From<duckdb::Error> for QueryError {
    fn from(err: duckdb::Error) -> Self {
        let msg = err.to_string();
        if msg.contains("Parser Error") || msg.contains("syntax error") {
            QueryError::Syntax(msg)
        } else if msg.contains("Connection Error") || msg.contains("IO Error") {
            QueryError::Connectivity(msg)
        } else {
            QueryError::Execution(msg)
        }
    }
}

impl From<r2d2::Error> for QueryError {
    fn from(err: r2d2::Error) -> Self {
        QueryError::Connectivity(err.to_string())
    }
}

/// Runs `sql` verbatim and collects every row.
pub fn execute(conn: &Connection, sql: &str) -> Result<ResultSet, QueryError> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([])?;

    // Column metadata is only available once the statement has run
    let columns: Vec<String> = rows
        .as_ref()
        .map(|stmt| stmt.column_names())
        .unwrap_or_default();

    let mut result = ResultSet {
        columns,
        rows: Vec::new(),
    };

    while let Some(row) = rows.next()? {
        let mut record = Row::new();
        for (i, name) in result.columns.iter().enumerate() {
            let value: Value = row.get(i)?;
            record.insert(name.clone(), to_json(value));
        }
        result.rows.push(record);
    }

    debug!("Query returned {} rows", result.rows.len());
    Ok(result)
}

fn to_json(value: Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Boolean(b) => JsonValue::Bool(b),
        Value::TinyInt(i) => i.into(),
        Value::SmallInt(i) => i.into(),
        Value::Int(i) => i.into(),
        Value::BigInt(i) => i.into(),
        Value::HugeInt(i) => i64::try_from(i)
            .map(JsonValue::from)
            .unwrap_or_else(|_| JsonValue::String(i.to_string())),
        Value::UTinyInt(i) => i.into(),
        Value::USmallInt(i) => i.into(),
        Value::UInt(i) => i.into(),
        Value::UBigInt(i) => i.into(),
        Value::Float(f) => JsonValue::from(f as f64),
        Value::Double(f) => JsonValue::from(f),
        Value::Decimal(d) => {
            let text = d.to_string();
            text.parse::<serde_json::Number>()
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::String(text))
        }
        Value::Text(s) | Value::Enum(s) => JsonValue::String(s),
        Value::Date32(days) => DateTime::from_timestamp(i64::from(days) * 86_400, 0)
            .map(|dt| JsonValue::String(dt.date_naive().to_string()))
            .unwrap_or(JsonValue::Null),
        // Out-of-range values such as 'infinity' have no calendar form
        Value::Timestamp(unit, v) => to_micros(unit, v)
            .and_then(DateTime::from_timestamp_micros)
            .map(|dt| JsonValue::String(dt.naive_utc().to_string()))
            .unwrap_or(JsonValue::Null),
        Value::Time64(unit, v) => to_micros(unit, v)
            .and_then(|micros| {
                NaiveTime::from_num_seconds_from_midnight_opt(
                    u32::try_from(micros / 1_000_000).ok()?,
                    u32::try_from((micros % 1_000_000) * 1_000).ok()?,
                )
            })
            .map(|t| JsonValue::String(t.to_string()))
            .unwrap_or(JsonValue::Null),
        Value::Interval {
            months,
            days,
            nanos,
        } => JsonValue::String(interval_text(months, days, nanos)),
        Value::Blob(bytes) => JsonValue::String(blob_text(&bytes)),
        Value::List(items) => {
            JsonValue::Array(items.into_iter().map(to_json).collect())
        }
        other => JsonValue::String(format!("{:?}", other)),
    }
}

fn to_micros(unit: TimeUnit, v: i64) -> Option<i64> {
    match unit {
        TimeUnit::Second => v.checked_mul(1_000_000),
        TimeUnit::Millisecond => v.checked_mul(1_000),
        TimeUnit::Microsecond => Some(v),
        TimeUnit::Nanosecond => Some(v / 1_000),
    }
}

/// Same shape DuckDB prints: `1 year 2 months 3 days 04:05:06.5`.
fn interval_text(months: i32, days: i32, nanos: i64) -> String {
    fn unit(parts: &mut Vec<String>, n: i64, name: &str) {
        if n != 0 {
            let plural = if n.abs() == 1 { "" } else { "s" };
            parts.push(format!("{n} {name}{plural}"));
        }
    }

    let mut parts = Vec::new();
    unit(&mut parts, i64::from(months / 12), "year");
    unit(&mut parts, i64::from(months % 12), "month");
    unit(&mut parts, i64::from(days), "day");

    let micros = nanos / 1_000;
    if micros != 0 || parts.is_empty() {
        let sign = if micros < 0 { "-" } else { "" };
        let micros = micros.unsigned_abs();
        let secs = micros / 1_000_000;
        let mut time = format!(
            "{sign}{:02}:{:02}:{:02}",
            secs / 3_600,
            secs / 60 % 60,
            secs % 60
        );
        let fraction = micros % 1_000_000;
        if fraction != 0 {
            let digits = format!("{fraction:06}");
            time.push('.');
            time.push_str(digits.trim_end_matches('0'));
        }
        parts.push(time);
    }
    parts.join(" ")
}

/// Printable ASCII kept as is, everything else as `\xHH`.
fn blob_text(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        if (0x20..=0x7e).contains(&b) && b != b'\\' && b != b'\'' && b != b'"' {
            out.push(b as char);
        } else {
            out.push_str(&format!("\\x{b:02X}"));
        }
    }
    out
}
