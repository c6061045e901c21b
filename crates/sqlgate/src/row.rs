//! Reading Postgres rows into records.

use std::error::Error as StdError;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use tokio_postgres::Row;
use tokio_postgres::types::{FromSql, Kind, Type, WrongType};

use crate::model::Field;
use crate::registry::Registry;
use crate::request::Record;
use crate::value::Value;
use crate::{Error, Result};

type BoxError = Box<dyn StdError + Sync + Send>;

/// Raw JSON or JSONB bytes, parsed without going through a typed decoder.
struct JsonRaw(serde_json::Value);

impl<'a> FromSql<'a> for JsonRaw {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        // JSONB carries a 1-byte version prefix
        let bytes = if *ty == Type::JSONB {
            match raw.split_first() {
                Some((1, rest)) => rest,
                Some((version, _)) => {
                    return Err(format!("unsupported JSONB version {version}").into());
                }
                None => raw,
            }
        } else {
            raw
        };
        Ok(JsonRaw(serde_json::from_slice(bytes)?))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::JSON || *ty == Type::JSONB
    }
}

/// An enum label, read as text.
struct EnumText(String);

impl<'a> FromSql<'a> for EnumText {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        Ok(EnumText(std::str::from_utf8(raw)?.to_owned()))
    }

    fn accepts(ty: &Type) -> bool {
        matches!(ty.kind(), Kind::Enum(_))
    }
}

/// Decode every row, keeping only `fields`, keyed by external name.
pub fn decode_rows(rows: &[Row], fields: &[&Field], registry: &Registry) -> Result<Vec<Record>> {
    rows.iter()
        .map(|row| decode_row(row, fields, registry))
        .collect()
}

/// Decode one row. Fields whose column the row lacks are left out.
pub fn decode_row(row: &Row, fields: &[&Field], registry: &Registry) -> Result<Record> {
    let mut record = Record::with_capacity(fields.len());
    for field in fields {
        let Some(idx) = row
            .columns()
            .iter()
            .position(|c| c.name() == field.column_name)
        else {
            continue;
        };
        let scanner = field
            .declared
            .custom_name()
            .and_then(|name| registry.scanner(name));
        let value = match scanner {
            Some(scan) => scan(row, idx)?,
            None => decode_column(row, idx, &field.column_name)?,
        };
        record.insert(field.external_name.clone(), value);
    }
    Ok(record)
}

fn read_error(
    row: &Row,
    idx: usize,
    column: &str,
    expected: &str,
    e: tokio_postgres::Error,
) -> Error {
    let actual = row
        .columns()
        .get(idx)
        .map(|c| c.type_().name().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let message = if e
        .source()
        .and_then(|s| s.downcast_ref::<WrongType>())
        .is_some()
    {
        format!("column has type {actual}")
    } else {
        e.to_string()
    };

    Error::ColumnRead {
        column: column.to_string(),
        expected: expected.to_string(),
        message,
    }
}

fn get<'r, T: FromSql<'r>>(
    row: &'r Row,
    idx: usize,
    column: &str,
    expected: &str,
) -> Result<Option<T>> {
    row.try_get::<_, Option<T>>(idx)
        .map_err(|e| read_error(row, idx, column, expected, e))
}

fn scalar<'r, T: FromSql<'r> + Into<Value>>(
    row: &'r Row,
    idx: usize,
    column: &str,
    expected: &str,
) -> Result<Value> {
    Ok(get::<T>(row, idx, column, expected)?.map_or(Value::Null, Into::into))
}

fn array<'r, T: FromSql<'r> + Into<Value>>(
    row: &'r Row,
    idx: usize,
    column: &str,
    expected: &str,
) -> Result<Value> {
    Ok(get::<Vec<Option<T>>>(row, idx, column, expected)?
        .map_or(Value::Null, |items| Value::array(items)))
}

/// Decode a column according to the type Postgres reports for it.
fn decode_column(row: &Row, idx: usize, column: &str) -> Result<Value> {
    let Some(ty) = row.columns().get(idx).map(|c| c.type_().clone()) else {
        return Ok(Value::Null);
    };

    match ty {
        Type::BOOL => scalar::<bool>(row, idx, column, "bool"),
        Type::INT2 => scalar::<i16>(row, idx, column, "smallint"),
        Type::INT4 => scalar::<i32>(row, idx, column, "integer"),
        Type::INT8 => scalar::<i64>(row, idx, column, "bigint"),
        Type::FLOAT4 => scalar::<f32>(row, idx, column, "real"),
        Type::FLOAT8 => scalar::<f64>(row, idx, column, "double precision"),
        Type::NUMERIC => scalar::<Decimal>(row, idx, column, "numeric"),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
            scalar::<String>(row, idx, column, "text")
        }
        Type::BYTEA => scalar::<Vec<u8>>(row, idx, column, "bytea"),
        Type::TIMESTAMPTZ => scalar::<DateTime<Utc>>(row, idx, column, "timestamptz"),
        Type::TIMESTAMP => Ok(get::<NaiveDateTime>(row, idx, column, "timestamp")?
            .map_or(Value::Null, |ts| Value::Timestamp(ts.and_utc()))),
        Type::DATE => scalar::<NaiveDate>(row, idx, column, "date"),
        Type::JSON | Type::JSONB => Ok(get::<JsonRaw>(row, idx, column, "jsonb")?
            .map_or(Value::Null, |json| Value::Json(json.0))),

        Type::BOOL_ARRAY => array::<bool>(row, idx, column, "bool[]"),
        Type::INT2_ARRAY => array::<i16>(row, idx, column, "smallint[]"),
        Type::INT4_ARRAY => array::<i32>(row, idx, column, "integer[]"),
        Type::INT8_ARRAY => array::<i64>(row, idx, column, "bigint[]"),
        Type::FLOAT4_ARRAY => array::<f32>(row, idx, column, "real[]"),
        Type::FLOAT8_ARRAY => array::<f64>(row, idx, column, "double precision[]"),
        Type::NUMERIC_ARRAY => array::<Decimal>(row, idx, column, "numeric[]"),
        Type::TEXT_ARRAY | Type::VARCHAR_ARRAY => array::<String>(row, idx, column, "text[]"),
        Type::TIMESTAMPTZ_ARRAY => array::<DateTime<Utc>>(row, idx, column, "timestamptz[]"),
        Type::DATE_ARRAY => array::<NaiveDate>(row, idx, column, "date[]"),

        ref other => match other.kind() {
            Kind::Enum(_) => Ok(get::<EnumText>(row, idx, column, "enum")?
                .map_or(Value::Null, |label| Value::String(label.0))),
            _ => Err(Error::ColumnRead {
                column: column.to_string(),
                expected: "a supported column type".to_string(),
                message: format!("column has type {}", other.name()),
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jsonb_strips_version_byte() {
        let mut raw = vec![1u8];
        raw.extend_from_slice(br#"{"a": [1, 2]}"#);
        let json = JsonRaw::from_sql(&Type::JSONB, &raw).unwrap();
        assert_eq!(json.0, serde_json::json!({"a": [1, 2]}));

        let json = JsonRaw::from_sql(&Type::JSON, br#"[true]"#).unwrap();
        assert_eq!(json.0, serde_json::json!([true]));

        assert!(JsonRaw::from_sql(&Type::JSONB, &[2, b'1']).is_err());
        assert!(JsonRaw::accepts(&Type::JSONB));
        assert!(!JsonRaw::accepts(&Type::TEXT));
    }

    #[test]
    fn enum_labels_read_as_text() {
        let label = EnumText::from_sql(&Type::TEXT, b"active").unwrap();
        assert_eq!(label.0, "active");
        assert!(!EnumText::accepts(&Type::TEXT));
    }
}
