//! Runtime values for request payloads, query parameters and row data.

use std::error::Error as StdError;
use std::fmt;

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tokio_postgres::types::{IsNull, Kind, ToSql, Type, WrongType};

type BoxError = Box<dyn StdError + Sync + Send>;

/// A runtime SQL value.
///
/// Request payloads decode into this, the builder binds it as a query
/// parameter, and rows decode back into it.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// NULL
    #[default]
    Null,

    /// Boolean
    Bool(bool),

    /// 16-bit signed integer (SMALLINT)
    I16(i16),

    /// 32-bit signed integer (INTEGER)
    I32(i32),

    /// 64-bit signed integer (BIGINT)
    I64(i64),

    /// 32-bit float (REAL)
    F32(f32),

    /// 64-bit float (DOUBLE PRECISION)
    F64(f64),

    /// Decimal (NUMERIC)
    Decimal(Decimal),

    /// Text (TEXT, VARCHAR, enum labels)
    String(String),

    /// Binary data (BYTEA)
    Bytes(Vec<u8>),

    /// JSON/JSONB document
    Json(serde_json::Value),

    /// Point in time (TIMESTAMPTZ)
    Timestamp(DateTime<Utc>),

    /// Calendar date (DATE)
    Date(NaiveDate),

    /// Ordered sequence, possibly heterogeneous
    Array(Vec<Value>),
}

/// Runtime type tag of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Bool,
    I16,
    I32,
    I64,
    F32,
    F64,
    Decimal,
    String,
    Bytes,
    Json,
    Timestamp,
    Date,
    Array,
}

impl ValueKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::I16 => "int16",
            ValueKind::I32 => "int32",
            ValueKind::I64 => "int64",
            ValueKind::F32 => "float32",
            ValueKind::F64 => "float64",
            ValueKind::Decimal => "decimal",
            ValueKind::String => "string",
            ValueKind::Bytes => "bytes",
            ValueKind::Json => "json",
            ValueKind::Timestamp => "timestamp",
            ValueKind::Date => "date",
            ValueKind::Array => "array",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Value {
    /// Returns true if this is a NULL value.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::I16(_) => ValueKind::I16,
            Value::I32(_) => ValueKind::I32,
            Value::I64(_) => ValueKind::I64,
            Value::F32(_) => ValueKind::F32,
            Value::F64(_) => ValueKind::F64,
            Value::Decimal(_) => ValueKind::Decimal,
            Value::String(_) => ValueKind::String,
            Value::Bytes(_) => ValueKind::Bytes,
            Value::Json(_) => ValueKind::Json,
            Value::Timestamp(_) => ValueKind::Timestamp,
            Value::Date(_) => ValueKind::Date,
            Value::Array(_) => ValueKind::Array,
        }
    }

    /// Build an array value from anything convertible.
    pub fn array<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Decode a dynamic JSON payload value.
    ///
    /// Integral numbers become `I64`, other numbers `F64`. Strings stay
    /// strings, arrays become `Array` and objects are kept as `Json`.
    pub fn from_json(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;

        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::I64(i),
                None => match n.as_f64() {
                    Some(f) => Value::F64(f),
                    None => Value::Json(Json::Number(n)),
                },
            },
            Json::String(s) => Value::String(s),
            Json::Array(items) => Value::Array(items.into_iter().map(Value::from_json).collect()),
            obj @ Json::Object(_) => Value::Json(obj),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => s.serialize_none(),
            Value::Bool(v) => s.serialize_bool(*v),
            Value::I16(v) => s.serialize_i16(*v),
            Value::I32(v) => s.serialize_i32(*v),
            Value::I64(v) => s.serialize_i64(*v),
            Value::F32(v) => s.serialize_f32(*v),
            Value::F64(v) => s.serialize_f64(*v),
            Value::Decimal(v) => Serialize::serialize(v, s),
            Value::String(v) => s.serialize_str(v),
            Value::Bytes(v) => s.serialize_bytes(v),
            Value::Json(v) => v.serialize(s),
            Value::Timestamp(v) => v.serialize(s),
            Value::Date(v) => v.serialize(s),
            Value::Array(items) => items.serialize(s),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(d).map(Value::from_json)
    }
}

// Convenient From impls
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::I16(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::F32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

/// Wrapper to make our Value usable as a ToSql parameter.
///
/// Coerces to the wire type Postgres inferred for the placeholder. Integers
/// and floats cross over in both directions with range checks. Timestamps
/// truncate to DATE, and arrays encode element by element against the
/// array's member type or as a JSON document.
#[derive(Debug)]
pub struct SqlParam<'a>(pub &'a Value);

impl ToSql for SqlParam<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self.0 {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(v) => v.to_sql_checked(ty, out),
            Value::I16(v) => int_to_sql(i64::from(*v), ty, out),
            Value::I32(v) => int_to_sql(i64::from(*v), ty, out),
            Value::I64(v) => int_to_sql(*v, ty, out),
            Value::F32(v) => float_to_sql(f64::from(*v), ty, out),
            Value::F64(v) => float_to_sql(*v, ty, out),
            Value::Decimal(v) => v.to_sql_checked(ty, out),
            Value::String(v) => {
                // Enum labels travel as their text in the binary protocol.
                if let Kind::Enum(_) = ty.kind() {
                    out.extend_from_slice(v.as_bytes());
                    Ok(IsNull::No)
                } else {
                    v.to_sql_checked(ty, out)
                }
            }
            Value::Bytes(v) => v.to_sql_checked(ty, out),
            Value::Json(v) => json_to_sql(v, ty, out),
            Value::Timestamp(v) => match *ty {
                Type::TIMESTAMP => v.naive_utc().to_sql(ty, out),
                Type::DATE => v.date_naive().to_sql(ty, out),
                _ => v.to_sql_checked(ty, out),
            },
            Value::Date(v) => match *ty {
                Type::TIMESTAMPTZ => v.and_time(NaiveTime::MIN).and_utc().to_sql(ty, out),
                Type::TIMESTAMP => v.and_time(NaiveTime::MIN).to_sql(ty, out),
                _ => v.to_sql_checked(ty, out),
            },
            Value::Array(items) => match ty.kind() {
                Kind::Array(_) => {
                    let params: Vec<SqlParam<'_>> = items.iter().map(SqlParam).collect();
                    params.to_sql(ty, out)
                }
                // A list is a valid JSON document too.
                _ if *ty == Type::JSON || *ty == Type::JSONB => json_to_sql(self.0, ty, out),
                _ => Err(Box::new(WrongType::new::<Vec<Value>>(ty.clone()))),
            },
        }
    }

    fn accepts(_ty: &Type) -> bool {
        // Each variant checks the concrete type in to_sql.
        true
    }

    tokio_postgres::types::to_sql_checked!();
}

fn int_to_sql(n: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 => i16::try_from(n)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(n)?.to_sql(ty, out),
        Type::INT8 => n.to_sql(ty, out),
        Type::FLOAT4 => (n as f32).to_sql(ty, out),
        Type::FLOAT8 => (n as f64).to_sql(ty, out),
        Type::NUMERIC => Decimal::from(n).to_sql(ty, out),
        _ => n.to_sql_checked(ty, out),
    }
}

/// Floats bind to integer columns only when they hold a whole number that
/// fits the column.
fn float_to_sql(v: f64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 | Type::INT4 | Type::INT8 => int_to_sql(whole(v, ty)?, ty, out),
        Type::FLOAT4 => (v as f32).to_sql(ty, out),
        Type::FLOAT8 => v.to_sql(ty, out),
        Type::NUMERIC => Decimal::try_from(v)?.to_sql(ty, out),
        _ => v.to_sql_checked(ty, out),
    }
}

fn whole(v: f64, ty: &Type) -> Result<i64, BoxError> {
    // i64::MAX is not representable as f64; 2^63 is the first value past it.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if v.fract() == 0.0 && (-LIMIT..LIMIT).contains(&v) {
        Ok(v as i64)
    } else {
        Err(format!("{v} is not a whole number in range for {ty}").into())
    }
}

fn json_to_sql(
    doc: &impl Serialize,
    ty: &Type,
    out: &mut BytesMut,
) -> Result<IsNull, BoxError> {
    if *ty == Type::JSONB {
        out.extend_from_slice(&[1]); // JSONB version 1
    } else if *ty != Type::JSON {
        return Err(Box::new(WrongType::new::<serde_json::Value>(ty.clone())));
    }
    out.extend_from_slice(&serde_json::to_vec(doc)?);
    Ok(IsNull::No)
}
