//! Declared field types and the compatibility rules between them and values.

use std::fmt;

use crate::value::{Value, ValueKind};

/// Declared type of a model field or raw-query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Bool,
    I16,
    I32,
    I64,
    F32,
    F64,
    Decimal,
    Text,
    Bytes,
    Json,
    Timestamptz,
    Date,
    /// Postgres enum, matched as its text label.
    Enum(&'static str),
    /// Nullable column.
    Optional(&'static FieldType),
    Array(&'static FieldType),
    /// Application type stored as `repr`; scanners and converters are looked
    /// up by `name`.
    Custom {
        name: &'static str,
        repr: &'static FieldType,
    },
    Any,
}

impl FieldType {
    pub fn is_optional(&self) -> bool {
        matches!(self, FieldType::Optional(_))
    }

    /// Strip any number of `Optional` wrappers.
    pub fn required(&self) -> &FieldType {
        let mut ty = self;
        while let FieldType::Optional(inner) = ty {
            ty = *inner;
        }
        ty
    }

    /// Name used to look up scanners and converters.
    pub fn custom_name(&self) -> Option<&'static str> {
        match self.required() {
            FieldType::Custom { name, .. } => Some(*name),
            _ => None,
        }
    }

    /// Declared element type, when this is an array.
    pub fn element(&self) -> Option<&'static FieldType> {
        match self.required() {
            FieldType::Array(elem) => Some(*elem),
            FieldType::Custom { repr, .. } => repr.element(),
            _ => None,
        }
    }
}

/// Canonical type used for compatibility checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedType {
    Any,
    String,
    Bool,
    Integer,
    Float,
    Timestamp,
    Bytes,
    Json,
    Array(Box<NormalizedType>),
}

impl NormalizedType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, NormalizedType::Integer | NormalizedType::Float)
    }

    pub fn element(&self) -> Option<&NormalizedType> {
        match self {
            NormalizedType::Array(elem) => Some(&**elem),
            _ => None,
        }
    }

    /// Canonical type of a non-array value kind. `None` for null and arrays.
    pub fn of_kind(kind: ValueKind) -> Option<NormalizedType> {
        Some(match kind {
            ValueKind::Null | ValueKind::Array => return None,
            ValueKind::Bool => NormalizedType::Bool,
            ValueKind::I16 | ValueKind::I32 | ValueKind::I64 => NormalizedType::Integer,
            ValueKind::F32 | ValueKind::F64 | ValueKind::Decimal => NormalizedType::Float,
            ValueKind::String => NormalizedType::String,
            ValueKind::Bytes => NormalizedType::Bytes,
            ValueKind::Json => NormalizedType::Json,
            ValueKind::Timestamp | ValueKind::Date => NormalizedType::Timestamp,
        })
    }
}

impl fmt::Display for NormalizedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizedType::Any => f.write_str("any"),
            NormalizedType::String => f.write_str("string"),
            NormalizedType::Bool => f.write_str("bool"),
            NormalizedType::Integer => f.write_str("integer"),
            NormalizedType::Float => f.write_str("float"),
            NormalizedType::Timestamp => f.write_str("timestamp"),
            NormalizedType::Bytes => f.write_str("bytes"),
            NormalizedType::Json => f.write_str("json"),
            NormalizedType::Array(elem) => write!(f, "array<{elem}>"),
        }
    }
}

/// Map a declared type onto the canonical set.
pub fn normalize(ty: &FieldType) -> NormalizedType {
    match ty {
        FieldType::Bool => NormalizedType::Bool,
        FieldType::I16 | FieldType::I32 | FieldType::I64 => NormalizedType::Integer,
        FieldType::F32 | FieldType::F64 | FieldType::Decimal => NormalizedType::Float,
        FieldType::Text | FieldType::Enum(_) => NormalizedType::String,
        FieldType::Bytes => NormalizedType::Bytes,
        FieldType::Json => NormalizedType::Json,
        FieldType::Timestamptz | FieldType::Date => NormalizedType::Timestamp,
        FieldType::Optional(inner) => normalize(inner),
        FieldType::Array(elem) => NormalizedType::Array(Box::new(normalize(elem))),
        FieldType::Custom { repr, .. } => normalize(repr),
        FieldType::Any => NormalizedType::Any,
    }
}

/// Whether a value of canonical type `actual` may be used where `declared`
/// is expected.
pub fn types_compatible(declared: &NormalizedType, actual: &NormalizedType) -> bool {
    use NormalizedType as N;

    match (declared, actual) {
        (N::Any, _) | (_, N::Any) => true,
        (N::Array(d), N::Array(a)) => types_compatible(d, a),
        (d, a) if d.is_numeric() && a.is_numeric() => true,
        (d, a) => d == a,
    }
}

/// Whether a non-null value fits `declared`.
///
/// Arrays are checked element by element since they may be heterogeneous.
/// Null elements inside an array are accepted; a top-level null is not,
/// callers decide where null is allowed. Any list is a valid JSON document.
pub fn value_compatible(declared: &NormalizedType, value: &Value) -> bool {
    match (declared, value) {
        (NormalizedType::Any, _) => true,
        (_, Value::Null) => false,
        (NormalizedType::Json, Value::Array(_)) => true,
        (NormalizedType::Array(elem), Value::Array(items)) => items
            .iter()
            .all(|item| item.is_null() || value_compatible(elem, item)),
        (_, Value::Array(_)) => false,
        (declared, value) => NormalizedType::of_kind(value.kind())
            .is_some_and(|actual| types_compatible(declared, &actual)),
    }
}

/// Find the first element of `items` that does not fit `declared`.
pub fn first_incompatible<'a>(
    declared: &NormalizedType,
    items: &'a [Value],
) -> Option<(usize, &'a Value)> {
    items
        .iter()
        .enumerate()
        .find(|(_, item)| item.is_null() || !value_compatible(declared, item))
}

/// Parse RFC 3339 timestamps and `YYYY-MM-DD` dates where a timestamp or
/// date is declared.
///
/// JSON carries no timestamp type, so requests spell them as strings. Values
/// that do not parse are returned unchanged and fail the compatibility check.
pub fn coerce(declared: &NormalizedType, value: Value) -> Value {
    match (declared, value) {
        (NormalizedType::Timestamp, Value::String(s)) => {
            if let Ok(ts) = chrono::DateTime::parse_from_rfc3339(&s) {
                Value::Timestamp(ts.with_timezone(&chrono::Utc))
            } else if let Ok(date) = chrono::NaiveDate::parse_from_str(&s, "%Y-%m-%d") {
                Value::Date(date)
            } else {
                Value::String(s)
            }
        }
        (NormalizedType::Array(elem), Value::Array(items)) => Value::Array(
            items.into_iter().map(|item| coerce(elem, item)).collect(),
        ),
        (_, value) => value,
    }
}
