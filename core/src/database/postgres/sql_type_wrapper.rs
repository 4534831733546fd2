use std::{error::Error, fmt::Display, str::FromStr};

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type as PgType};

/// A single scalar bound as a positional statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Numeric(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
    Json(Value),
    /// Text read from a file together with the type it looks like. The text is what gets bound.
    Inferred { raw: String, value: Box<SqlValue> },
}

/// One row, positionally aligned to the target column list.
pub type Row = Vec<SqlValue>;

#[derive(thiserror::Error, Debug)]
pub enum BindError {
    #[error("Can not bind a {value} value to a parameter of type {ty}")]
    Unsupported { value: &'static str, ty: PgType },

    #[error("Can not read {raw:?} as {ty}: {reason}")]
    Parse { raw: String, ty: PgType, reason: String },
}

impl SqlValue {
    pub fn raw_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "Null",
            SqlValue::Bool(_) => "Bool",
            SqlValue::Int(_) => "Int",
            SqlValue::Float(_) => "Float",
            SqlValue::Numeric(_) => "Numeric",
            SqlValue::Text(_) => "Text",
            SqlValue::Bytes(_) => "Bytes",
            SqlValue::Timestamp(_) => "Timestamp",
            SqlValue::Date(_) => "Date",
            SqlValue::Json(_) => "Json",
            SqlValue::Inferred { .. } => "Inferred",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// The typed value, looking through `Inferred`.
    pub fn inferred(&self) -> &SqlValue {
        match self {
            SqlValue::Inferred { value, .. } => value,
            other => other,
        }
    }

    fn unsupported(&self, ty: &PgType) -> Box<dyn Error + Sync + Send> {
        Box::new(BindError::Unsupported { value: self.raw_name(), ty: ty.clone() })
    }
}

fn is_text(ty: &PgType) -> bool {
    matches!(*ty, PgType::TEXT | PgType::VARCHAR | PgType::BPCHAR | PgType::NAME)
}

fn parse_error(raw: &str, ty: &PgType, reason: impl Display) -> BindError {
    BindError::Parse { raw: raw.to_string(), ty: ty.clone(), reason: reason.to_string() }
}

fn parse_as<T>(raw: &str, ty: &PgType) -> Result<T, BindError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim().parse::<T>().map_err(|e| parse_error(raw, ty, e))
}

fn parse_bool(raw: &str, ty: &PgType) -> Result<bool, BindError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "on" | "1" => Ok(true),
        "false" | "f" | "no" | "n" | "off" | "0" => Ok(false),
        _ => Err(parse_error(raw, ty, "not a boolean")),
    }
}

fn parse_date(raw: &str, ty: &PgType) -> Result<NaiveDate, BindError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|e| parse_error(raw, ty, e))
}

fn parse_naive_datetime(raw: &str, ty: &PgType) -> Result<NaiveDateTime, BindError> {
    const FORMATS: [&str; 4] =
        ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"];

    let raw_trimmed = raw.trim();
    FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw_trimmed, format).ok())
        .map_or_else(|| parse_date(raw, ty).map(|date| date.and_time(NaiveTime::default())), Ok)
}

/// Offsets are honoured; a timestamp without one is taken as UTC.
fn parse_utc_datetime(raw: &str, ty: &PgType) -> Result<DateTime<Utc>, BindError> {
    let raw_trimmed = raw.trim();
    if let Ok(value) = DateTime::parse_from_rfc3339(raw_trimmed) {
        return Ok(value.with_timezone(&Utc));
    }
    if let Ok(value) = DateTime::parse_from_str(raw_trimmed, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Ok(value.with_timezone(&Utc));
    }

    parse_naive_datetime(raw, ty).map(|naive| Utc.from_utc_datetime(&naive))
}

fn parse_decimal(raw: &str, ty: &PgType) -> Result<Decimal, BindError> {
    let raw_trimmed = raw.trim();
    Decimal::from_str(raw_trimmed)
        .or_else(|_| Decimal::from_scientific(raw_trimmed))
        .map_err(|e| parse_error(raw, ty, e))
}

/// Binds text to whatever type the server inferred, parsing it when the column is not text.
fn text_to_sql(
    raw: &str,
    ty: &PgType,
    out: &mut BytesMut,
) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
    match *ty {
        _ if is_text(ty) => raw.to_sql(ty, out),
        PgType::BOOL => parse_bool(raw, ty)?.to_sql(ty, out),
        PgType::INT2 => parse_as::<i16>(raw, ty)?.to_sql(ty, out),
        PgType::INT4 => parse_as::<i32>(raw, ty)?.to_sql(ty, out),
        PgType::INT8 => parse_as::<i64>(raw, ty)?.to_sql(ty, out),
        PgType::FLOAT4 => parse_as::<f32>(raw, ty)?.to_sql(ty, out),
        PgType::FLOAT8 => parse_as::<f64>(raw, ty)?.to_sql(ty, out),
        PgType::NUMERIC => parse_decimal(raw, ty)?.to_sql(ty, out),
        PgType::DATE => parse_date(raw, ty)?.to_sql(ty, out),
        PgType::TIMESTAMP => parse_naive_datetime(raw, ty)?.to_sql(ty, out),
        PgType::TIMESTAMPTZ => parse_utc_datetime(raw, ty)?.to_sql(ty, out),
        PgType::JSON | PgType::JSONB => {
            serde_json::from_str::<Value>(raw).map_err(|e| parse_error(raw, ty, e))?.to_sql(ty, out)
        }
        _ => Err(BindError::Unsupported { value: "Text", ty: ty.clone() }.into()),
    }
}

// Placeholders are untyped, so the server infers each parameter type from the column. Every
// variant is written in the representation of that type, or rejected.
impl ToSql for SqlValue {
    fn to_sql(
        &self,
        ty: &PgType,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Bool(value) => match *ty {
                PgType::BOOL => value.to_sql(ty, out),
                _ if is_text(ty) => value.to_string().to_sql(ty, out),
                _ => Err(self.unsupported(ty)),
            },
            SqlValue::Int(value) => match *ty {
                PgType::INT2 => i16::try_from(*value)?.to_sql(ty, out),
                PgType::INT4 => i32::try_from(*value)?.to_sql(ty, out),
                PgType::INT8 => value.to_sql(ty, out),
                PgType::FLOAT4 => (*value as f32).to_sql(ty, out),
                PgType::FLOAT8 => (*value as f64).to_sql(ty, out),
                PgType::NUMERIC => Decimal::from(*value).to_sql(ty, out),
                _ if is_text(ty) => value.to_string().to_sql(ty, out),
                _ => Err(self.unsupported(ty)),
            },
            SqlValue::Float(value) => match *ty {
                PgType::FLOAT4 => (*value as f32).to_sql(ty, out),
                PgType::FLOAT8 => value.to_sql(ty, out),
                PgType::NUMERIC => Decimal::try_from(*value)?.to_sql(ty, out),
                _ if is_text(ty) => value.to_string().to_sql(ty, out),
                _ => Err(self.unsupported(ty)),
            },
            SqlValue::Numeric(value) => match *ty {
                PgType::NUMERIC => value.to_sql(ty, out),
                _ if is_text(ty) => value.to_string().to_sql(ty, out),
                _ => Err(self.unsupported(ty)),
            },
            SqlValue::Text(value) => text_to_sql(value, ty, out),
            SqlValue::Bytes(value) => match *ty {
                PgType::BYTEA => value.to_sql(ty, out),
                _ => Err(self.unsupported(ty)),
            },
            SqlValue::Timestamp(value) => match *ty {
                PgType::TIMESTAMPTZ => value.to_sql(ty, out),
                PgType::TIMESTAMP => value.naive_utc().to_sql(ty, out),
                PgType::DATE => value.date_naive().to_sql(ty, out),
                _ if is_text(ty) => value.to_rfc3339().to_sql(ty, out),
                _ => Err(self.unsupported(ty)),
            },
            SqlValue::Date(value) => match *ty {
                PgType::DATE => value.to_sql(ty, out),
                PgType::TIMESTAMP => value.and_time(NaiveTime::default()).to_sql(ty, out),
                PgType::TIMESTAMPTZ => {
                    Utc.from_utc_datetime(&value.and_time(NaiveTime::default())).to_sql(ty, out)
                }
                _ if is_text(ty) => value.to_string().to_sql(ty, out),
                _ => Err(self.unsupported(ty)),
            },
            SqlValue::Json(value) => match *ty {
                PgType::JSON | PgType::JSONB => value.to_sql(ty, out),
                _ if is_text(ty) => value.to_string().to_sql(ty, out),
                _ => Err(self.unsupported(ty)),
            },
            SqlValue::Inferred { raw, .. } => text_to_sql(raw, ty, out),
        }
    }

    // Mismatches are reported by `to_sql` with the offending value.
    fn accepts(_ty: &PgType) -> bool {
        true
    }

    to_sql_checked!();
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl From<i16> for SqlValue {
    fn from(value: i16) -> Self {
        SqlValue::Int(value.into())
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Int(value.into())
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Float(value)
    }
}

impl From<Decimal> for SqlValue {
    fn from(value: Decimal) -> Self {
        SqlValue::Numeric(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(value: Vec<u8>) -> Self {
        SqlValue::Bytes(value)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(value: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(value)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(value: NaiveDate) -> Self {
        SqlValue::Date(value)
    }
}

impl From<Value> for SqlValue {
    fn from(value: Value) -> Self {
        SqlValue::Json(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(SqlValue::Null, Into::into)
    }
}
