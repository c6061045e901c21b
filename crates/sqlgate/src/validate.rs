//! Request validation against model metadata.
//!
//! Every check here runs before any SQL is built, so a bad field name or a
//! mistyped value never reaches the database.

use crate::error::Clause;
use crate::model::{Field, ModelMetadata};
use crate::request::{Condition, Operator, QueryRequest, SELECT_ALL, UpdateRequest};
use crate::types::{NormalizedType, coerce, first_incompatible, value_compatible};
use crate::value::{Value, ValueKind};
use crate::{Error, Result};

/// Validate a structured read request.
pub fn validate_query(req: &QueryRequest, meta: &ModelMetadata) -> Result<()> {
    check_query(req, meta).inspect_err(|e| {
        tracing::debug!(table = %meta.table_name, error = %e, "query request rejected");
    })
}

/// Validate a structured update request.
pub fn validate_update(req: &UpdateRequest, meta: &ModelMetadata) -> Result<()> {
    check_update(req, meta).inspect_err(|e| {
        tracing::debug!(table = %meta.table_name, error = %e, "update request rejected");
    })
}

fn check_query(req: &QueryRequest, meta: &ModelMetadata) -> Result<()> {
    if req.select.is_empty() {
        return Err(Error::EmptySelect);
    }
    for name in req.select.iter().filter(|name| name.as_str() != SELECT_ALL) {
        resolve(meta, name, Clause::Select)?;
    }

    for condition in &req.where_ {
        validate_condition(condition, meta)?;
    }

    for clause in &req.order_by {
        resolve(meta, &clause.field, Clause::OrderBy)?;
    }

    non_negative("limit", req.limit)?;
    non_negative("offset", req.offset)?;
    Ok(())
}

fn check_update(req: &UpdateRequest, meta: &ModelMetadata) -> Result<()> {
    if req.set.is_empty() {
        return Err(Error::EmptySet);
    }
    if req.where_.is_empty() {
        return Err(Error::MissingWhere);
    }

    for (name, value) in &req.set {
        let field = resolve(meta, name, Clause::Set)?;
        validate_set_value(field, value)?;
    }

    for condition in &req.where_ {
        validate_condition(condition, meta)?;
    }
    Ok(())
}

/// Look up a field by external name.
pub fn resolve<'m>(meta: &'m ModelMetadata, name: &str, clause: Clause) -> Result<&'m Field> {
    meta.field(name).ok_or_else(|| Error::UnknownField {
        clause,
        field: name.to_owned(),
    })
}

fn non_negative(name: &'static str, value: Option<i64>) -> Result<()> {
    match value {
        Some(value) if value < 0 => Err(Error::NegativeBound { name, value }),
        _ => Ok(()),
    }
}

/// Whether `op` may be applied to `field` at all, regardless of value.
pub fn operator_applies(op: Operator, field: &Field) -> bool {
    use NormalizedType as N;

    match op {
        Operator::Eq
        | Operator::Ne
        | Operator::IsNull
        | Operator::IsNotNull
        | Operator::In
        | Operator::NotIn => true,
        Operator::Gt | Operator::Lt | Operator::Ge | Operator::Le => matches!(
            field.normalized,
            N::Any | N::Integer | N::Float | N::String | N::Timestamp
        ),
        Operator::Like | Operator::ILike => matches!(field.normalized, N::Any | N::String),
        Operator::Any | Operator::Contains => field.is_array(),
    }
}

/// Validate one WHERE condition.
pub fn validate_condition(cond: &Condition, meta: &ModelMetadata) -> Result<()> {
    let field = resolve(meta, &cond.field, Clause::Where)?;
    let op = cond.operator;

    if !operator_applies(op, field) {
        return Err(Error::OperatorMismatch {
            field: field.external_name.clone(),
            operator: op,
            field_type: field.normalized.clone(),
        });
    }

    match op {
        Operator::IsNull | Operator::IsNotNull => {
            if !cond.value.is_null() {
                return Err(Error::UnexpectedValue {
                    field: field.external_name.clone(),
                    operator: op,
                    actual: cond.value.kind(),
                });
            }
            Ok(())
        }
        Operator::In | Operator::NotIn => check_elements(field, op, &field.normalized, &cond.value),
        Operator::Contains => {
            let element = element_type(field);
            check_elements(field, op, element, &cond.value)
        }
        Operator::Any => {
            let element = element_type(field);
            check_scalar(field, op, element, &cond.value)
        }
        _ => check_scalar(field, op, &field.normalized, &cond.value),
    }
}

fn element_type(field: &Field) -> &NormalizedType {
    static UNTYPED: NormalizedType = NormalizedType::Any;
    field.array.as_ref().map_or(&UNTYPED, |a| &a.element)
}

fn check_scalar(
    field: &Field,
    op: Operator,
    expected: &NormalizedType,
    value: &Value,
) -> Result<()> {
    if value.is_null() {
        return Err(Error::NullValue {
            field: field.external_name.clone(),
            operator: op,
        });
    }
    let value = coerce(expected, value.clone());
    if !value_compatible(expected, &value) {
        return Err(Error::TypeMismatch {
            field: field.external_name.clone(),
            expected: expected.clone(),
            actual: value.kind(),
        });
    }
    Ok(())
}

fn check_elements(
    field: &Field,
    op: Operator,
    expected: &NormalizedType,
    value: &Value,
) -> Result<()> {
    let Value::Array(items) = value else {
        return Err(Error::ExpectedSequence {
            field: field.external_name.clone(),
            operator: op,
            actual: value.kind(),
        });
    };
    let items: Vec<Value> = items.iter().map(|v| coerce(expected, v.clone())).collect();
    if let Some((index, item)) = first_incompatible(expected, &items) {
        return Err(Error::ElementTypeMismatch {
            field: field.external_name.clone(),
            index,
            expected: expected.clone(),
            actual: item.kind(),
        });
    }
    Ok(())
}

fn validate_set_value(field: &Field, value: &Value) -> Result<()> {
    if value.is_null() {
        if field.declared.is_optional() || field.normalized == NormalizedType::Any {
            return Ok(());
        }
        return Err(Error::TypeMismatch {
            field: field.external_name.clone(),
            expected: field.normalized.clone(),
            actual: ValueKind::Null,
        });
    }
    let value = coerce(&field.normalized, value.clone());
    if !value_compatible(&field.normalized, &value) {
        return Err(Error::TypeMismatch {
            field: field.external_name.clone(),
            expected: field.normalized.clone(),
            actual: value.kind(),
        });
    }
    Ok(())
}
