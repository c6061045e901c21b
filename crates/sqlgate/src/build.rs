//! SQL generation for structured requests.
//!
//! Requests are validated, translated from external names to columns, and
//! rendered through `sqlgate_sql`. Every value is bound as a parameter.

use std::collections::HashMap;

use sqlgate_sql::{
    BinOp, Expr, OrderBy, ParamName, RenderedSql, SelectColumn, SelectStmt, UpdateStmt, render,
};

use crate::error::Clause;
use crate::model::{Field, ModelMetadata};
use crate::pagination::PageLimits;
use crate::registry::Registry;
use crate::request::{Condition, Operator, QueryRequest, SELECT_ALL, UpdateRequest};
use crate::types::{NormalizedType, coerce};
use crate::validate::{resolve, validate_query, validate_update};
use crate::value::{SqlParam, Value};
use crate::{Error, Result};

/// A rendered statement and its arguments, in `$n` order.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltQuery {
    pub sql: String,
    pub args: Vec<Value>,
}

impl BuiltQuery {
    /// Arguments wrapped for binding.
    pub fn params(&self) -> Vec<SqlParam<'_>> {
        self.args.iter().map(SqlParam).collect()
    }
}

/// Values bound while building one statement, keyed by generated name.
struct Binder<'r> {
    registry: &'r Registry,
    values: HashMap<ParamName, Value>,
}

impl<'r> Binder<'r> {
    fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            values: HashMap::new(),
        }
    }

    /// Bind a value for `field`, running the field's converter if any.
    fn bind(&mut self, field: &Field, value: &Value) -> Result<Expr> {
        let value = coerce(&field.normalized, value.clone());
        let value = self.convert(field, value)?;
        Ok(self.push(value))
    }

    /// Bind a single element of an array field.
    fn bind_element(&mut self, field: &Field, value: &Value) -> Result<Expr> {
        let element = field
            .array
            .as_ref()
            .map_or(NormalizedType::Any, |a| a.element.clone());
        Ok(self.push(coerce(&element, value.clone())))
    }

    fn convert(&self, field: &Field, value: Value) -> Result<Value> {
        if value.is_null() {
            return Ok(value);
        }
        let Some(converter) = field
            .declared
            .custom_name()
            .and_then(|name| self.registry.converter(name))
        else {
            return Ok(value);
        };
        converter(value).map_err(|message| Error::Bind {
            field: field.external_name.clone(),
            message,
        })
    }

    fn push(&mut self, value: Value) -> Expr {
        let name = ParamName::from(format!("p{}", self.values.len()));
        self.values.insert(name.clone(), value);
        Expr::Param(name)
    }

    fn finish(mut self, rendered: RenderedSql) -> BuiltQuery {
        let args = rendered
            .params
            .iter()
            .map(|name| self.values.remove(name).unwrap_or_default())
            .collect();
        BuiltQuery {
            sql: rendered.sql,
            args,
        }
    }
}

/// Fields a read request projects, in output order.
pub fn selected_fields<'m>(select: &[String], meta: &'m ModelMetadata) -> Result<Vec<&'m Field>> {
    if select.iter().any(|name| name == SELECT_ALL) {
        return Ok(meta.fields.values().collect());
    }
    select
        .iter()
        .map(|name| resolve(meta, name, Clause::Select))
        .collect()
}

/// Builds SELECT, COUNT and UPDATE statements.
#[derive(Clone, Copy)]
pub struct QueryBuilder<'r> {
    registry: &'r Registry,
    limits: PageLimits,
}

impl<'r> QueryBuilder<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            limits: PageLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: PageLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn select(&self, req: &QueryRequest, meta: &ModelMetadata) -> Result<BuiltQuery> {
        validate_query(req, meta)?;
        let mut binder = Binder::new(self.registry);

        let columns = selected_fields(&req.select, meta)?
            .into_iter()
            .map(|field| SelectColumn::expr(Expr::column(field.column_name.as_str())));
        let mut stmt = SelectStmt::new()
            .columns(columns)
            .from(meta.table_name.as_str());

        if let Some(where_) = where_expr(&req.where_, meta, &mut binder)? {
            stmt = stmt.and_where(where_);
        }

        for clause in &req.order_by {
            let field = resolve(meta, &clause.field, Clause::OrderBy)?;
            let column = Expr::column(field.column_name.as_str());
            stmt = stmt.order_by(if clause.desc {
                OrderBy::desc(column)
            } else {
                OrderBy::asc(column)
            });
        }

        let (limit, offset) = match &req.pagination {
            Some(pagination) => {
                let page = pagination.normalize(&self.limits);
                (Some(page.limit()), Some(page.offset()))
            }
            None => (req.limit, req.offset),
        };
        if let Some(limit) = limit {
            stmt = stmt.limit(Expr::int(limit));
        }
        if let Some(offset) = offset {
            stmt = stmt.offset(Expr::int(offset));
        }

        let built = binder.finish(render(&stmt));
        tracing::debug!(
            table = %meta.table_name,
            sql = %built.sql,
            params = built.args.len(),
            "built select"
        );
        Ok(built)
    }

    /// `SELECT COUNT(*)` over the rows a read request matches, ignoring
    /// projection, ordering and bounds.
    pub fn count(&self, req: &QueryRequest, meta: &ModelMetadata) -> Result<BuiltQuery> {
        validate_query(req, meta)?;
        let mut binder = Binder::new(self.registry);

        let mut stmt = SelectStmt::new()
            .column(SelectColumn::expr(Expr::count_all()))
            .from(meta.table_name.as_str());
        if let Some(where_) = where_expr(&req.where_, meta, &mut binder)? {
            stmt = stmt.and_where(where_);
        }

        Ok(binder.finish(render(&stmt)))
    }

    pub fn update(&self, req: &UpdateRequest, meta: &ModelMetadata) -> Result<BuiltQuery> {
        validate_update(req, meta)?;
        let mut binder = Binder::new(self.registry);

        let mut stmt = UpdateStmt::new(meta.table_name.as_str());
        for (name, value) in &req.set {
            let field = resolve(meta, name, Clause::Set)?;
            let expr = binder.bind(field, value)?;
            stmt = stmt.set(field.column_name.as_str(), expr);
        }

        match where_expr(&req.where_, meta, &mut binder)? {
            Some(where_) => stmt = stmt.and_where(where_),
            None => return Err(Error::MissingWhere),
        }

        let built = binder.finish(render(&stmt));
        tracing::debug!(
            table = %meta.table_name,
            sql = %built.sql,
            params = built.args.len(),
            "built update"
        );
        Ok(built)
    }
}

fn where_expr(
    conditions: &[Condition],
    meta: &ModelMetadata,
    binder: &mut Binder<'_>,
) -> Result<Option<Expr>> {
    let mut combined: Option<Expr> = None;
    for condition in conditions {
        let field = resolve(meta, &condition.field, Clause::Where)?;
        let predicate = predicate(condition, field, binder)?;
        combined = Some(match combined {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
    }
    Ok(combined)
}

fn predicate(cond: &Condition, field: &Field, binder: &mut Binder<'_>) -> Result<Expr> {
    let column = Expr::column(field.column_name.as_str());
    let value = &cond.value;

    let compare = |op: BinOp, binder: &mut Binder<'_>| -> Result<Expr> {
        Ok(column.clone().binop(op, binder.bind(field, value)?))
    };

    Ok(match cond.operator {
        Operator::Eq => compare(BinOp::Eq, binder)?,
        Operator::Ne => compare(BinOp::Ne, binder)?,
        Operator::Gt => compare(BinOp::Gt, binder)?,
        Operator::Lt => compare(BinOp::Lt, binder)?,
        Operator::Ge => compare(BinOp::Ge, binder)?,
        Operator::Le => compare(BinOp::Le, binder)?,
        Operator::Like => column.like(binder.bind(field, value)?),
        Operator::ILike => column.ilike(binder.bind(field, value)?),
        Operator::In | Operator::NotIn => {
            let negated = cond.operator == Operator::NotIn;
            let items = value.as_array().unwrap_or_default();
            if items.is_empty() {
                // Nothing is IN an empty list.
                Expr::Bool(negated)
            } else {
                let list = items
                    .iter()
                    .map(|item| binder.bind(field, item))
                    .collect::<Result<Vec<_>>>()?;
                if negated {
                    column.not_in_list(list)
                } else {
                    column.in_list(list)
                }
            }
        }
        Operator::IsNull => column.is_null(),
        Operator::IsNotNull => column.is_not_null(),
        Operator::Any => binder.bind_element(field, value)?.eq_any(column),
        Operator::Contains => column.contains(binder.bind(field, value)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FieldDef;
    use crate::request::OrderByClause;
    use crate::types::FieldType;
    use bytes::BytesMut;
    use tokio_postgres::types::{ToSql, Type};

    const I64: FieldType = FieldType::I64;
    const TEXT: FieldType = FieldType::Text;

    fn users() -> ModelMetadata {
        ModelMetadata::from_defs(
            "User",
            "users",
            &[
                FieldDef::new("id", "id", FieldType::I64),
                FieldDef::new("name", "name", FieldType::Text),
                FieldDef::new("createdAt", "created_at", FieldType::Timestamptz),
                FieldDef::new("nickname", "nickname", FieldType::Optional(&TEXT)),
                FieldDef::new(
                    "flag",
                    "flag",
                    FieldType::Custom {
                        name: "yes_no",
                        repr: &FieldType::Bool,
                    },
                ),
            ],
        )
        .unwrap()
    }

    fn employees() -> ModelMetadata {
        ModelMetadata::from_defs(
            "Employee",
            "employees",
            &[
                FieldDef::new("id", "id", FieldType::I64),
                FieldDef::new("name", "name", FieldType::Text),
                FieldDef::new("reportingTo", "reporting_to", FieldType::Array(&I64)),
            ],
        )
        .unwrap()
    }

    fn events() -> ModelMetadata {
        ModelMetadata::from_defs(
            "Event",
            "events",
            &[
                FieldDef::new("id", "id", FieldType::I32),
                FieldDef::new("score", "score", FieldType::F32),
                FieldDef::new("day", "day", FieldType::Date),
                FieldDef::new("payload", "payload", FieldType::Json),
            ],
        )
        .unwrap()
    }

    fn encode(arg: &Value, ty: &Type) -> bool {
        let mut buf = BytesMut::new();
        SqlParam(arg).to_sql_checked(ty, &mut buf).is_ok()
    }

    fn cond(field: &str, op: Operator, value: impl Into<Value>) -> Condition {
        Condition::new(field, op, value)
    }

    #[test]
    fn select_by_id() {
        let registry = Registry::new();
        let req = QueryRequest::select(["id", "name"]).filter(cond("id", Operator::Eq, 25i64));
        let built = QueryBuilder::new(&registry).select(&req, &users()).unwrap();
        insta::assert_snapshot!(built.sql, @r#"SELECT "id", "name" FROM "users" WHERE "id" = $1"#);
        assert_eq!(built.args, vec![Value::I64(25)]);
    }

    #[test]
    fn select_in_list() {
        let registry = Registry::new();
        let req = QueryRequest::select(["id", "name"])
            .filter(cond("name", Operator::In, Value::array(["a", "b"])));
        let built = QueryBuilder::new(&registry).select(&req, &users()).unwrap();
        insta::assert_snapshot!(
            built.sql,
            @r#"SELECT "id", "name" FROM "users" WHERE "name" IN ($1, $2)"#
        );
        assert_eq!(built.args, vec![Value::from("a"), Value::from("b")]);

        let bare = QueryRequest::select(["id"]).filter(cond("name", Operator::In, "a"));
        assert!(matches!(
            QueryBuilder::new(&registry).select(&bare, &users()),
            Err(Error::ExpectedSequence { .. })
        ));
    }

    #[test]
    fn empty_in_lists() {
        let registry = Registry::new();
        let req = QueryRequest::select(["id"])
            .filter(cond("id", Operator::In, Value::Array(vec![])))
            .filter(cond("id", Operator::NotIn, Value::Array(vec![])));
        let built = QueryBuilder::new(&registry).select(&req, &users()).unwrap();
        assert_eq!(built.sql, r#"SELECT "id" FROM "users" WHERE FALSE AND TRUE"#);
        assert!(built.args.is_empty());
    }

    #[test]
    fn select_all_in_declaration_order() {
        let registry = Registry::new();
        let req = QueryRequest::select([SELECT_ALL]);
        let built = QueryBuilder::new(&registry).select(&req, &users()).unwrap();
        insta::assert_snapshot!(
            built.sql,
            @r#"SELECT "id", "name", "created_at", "nickname", "flag" FROM "users""#
        );
    }

    #[test]
    fn mixed_operators_and_ordering() {
        let registry = Registry::new();
        let req = QueryRequest::select(["name"])
            .filter(cond("name", Operator::ILike, "%an%"))
            .filter(cond("nickname", Operator::IsNull, Value::Null))
            .filter(cond("id", Operator::Ge, 10i64))
            .filter(cond("id", Operator::Ne, 13i64))
            .order_by(OrderByClause::desc("createdAt"))
            .order_by(OrderByClause::asc("name"));
        let mut req = req;
        req.limit = Some(5);
        req.offset = Some(0);
        let built = QueryBuilder::new(&registry).select(&req, &users()).unwrap();
        insta::assert_snapshot!(
            built.sql,
            @r#"SELECT "name" FROM "users" WHERE "name" ILIKE $1 AND "nickname" IS NULL AND "id" >= $2 AND "id" <> $3 ORDER BY "created_at" DESC, "name" ASC LIMIT 5 OFFSET 0"#
        );
        assert_eq!(
            built.args,
            vec![Value::from("%an%"), Value::I64(10), Value::I64(13)]
        );
    }

    #[test]
    fn pagination_overrides_limit_and_offset() {
        let registry = Registry::new();
        let mut req = QueryRequest::select(["id"]).paginate(3, 20);
        req.limit = Some(1);
        req.offset = Some(1);
        let built = QueryBuilder::new(&registry).select(&req, &users()).unwrap();
        assert_eq!(built.sql, r#"SELECT "id" FROM "users" LIMIT 20 OFFSET 40"#);

        let req = QueryRequest::select(["id"]).paginate(0, 10_000);
        let built = QueryBuilder::new(&registry).select(&req, &users()).unwrap();
        assert_eq!(built.sql, r#"SELECT "id" FROM "users" LIMIT 100 OFFSET 0"#);
    }

    #[test]
    fn huge_page_numbers_saturate() {
        let registry = Registry::new();
        let req = QueryRequest::select(["id"]).paginate(i64::MAX, 10);
        let built = QueryBuilder::new(&registry).select(&req, &users()).unwrap();
        assert_eq!(
            built.sql,
            r#"SELECT "id" FROM "users" LIMIT 10 OFFSET 9223372036854775807"#
        );
    }

    #[test]
    fn numeric_values_bind_across_families() {
        let registry = Registry::new();
        let req: QueryRequest = serde_json::from_value(serde_json::json!({
            "select": ["id"],
            "where": [
                {"field": "id", "operator": "=", "value": 25.0},
                {"field": "score", "operator": ">", "value": 5}
            ]
        }))
        .unwrap();
        let built = QueryBuilder::new(&registry).select(&req, &events()).unwrap();
        assert_eq!(built.args, vec![Value::F64(25.0), Value::I64(5)]);
        assert!(encode(&built.args[0], &Type::INT4));
        assert!(encode(&built.args[1], &Type::FLOAT4));

        let req = QueryRequest::select(["id"]).filter(cond("id", Operator::Eq, 2.5f64));
        let built = QueryBuilder::new(&registry).select(&req, &events()).unwrap();
        assert!(!encode(&built.args[0], &Type::INT4));
    }

    #[test]
    fn dates_and_json_lists_bind() {
        let registry = Registry::new();
        let req: UpdateRequest = serde_json::from_value(serde_json::json!({
            "set": {"payload": [1, "two", null]},
            "where": [{"field": "day", "operator": ">=", "value": "2024-01-01"}]
        }))
        .unwrap();
        let built = QueryBuilder::new(&registry).update(&req, &events()).unwrap();
        insta::assert_snapshot!(
            built.sql,
            @r#"UPDATE "events" SET "payload" = $1 WHERE "day" >= $2"#
        );
        assert_eq!(built.args[1].kind(), crate::value::ValueKind::Date);
        assert!(encode(&built.args[0], &Type::JSONB));
        assert!(encode(&built.args[1], &Type::DATE));
    }

    #[test]
    fn timestamps_bind_as_timestamps() {
        let registry = Registry::new();
        let req = QueryRequest::select(["id"])
            .filter(cond("createdAt", Operator::Gt, "2024-05-01T00:00:00Z"));
        let built = QueryBuilder::new(&registry).select(&req, &users()).unwrap();
        assert_eq!(built.args[0].kind(), crate::value::ValueKind::Timestamp);
    }

    #[test]
    fn array_operators() {
        let registry = Registry::new();
        let req = QueryRequest::select(["id", "name"])
            .filter(cond("reportingTo", Operator::Any, 7i64))
            .filter(cond("reportingTo", Operator::Contains, Value::array([1i64, 2])));
        let built = QueryBuilder::new(&registry).select(&req, &employees()).unwrap();
        insta::assert_snapshot!(
            built.sql,
            @r#"SELECT "id", "name" FROM "employees" WHERE $1 = ANY("reporting_to") AND "reporting_to" @> $2"#
        );
        assert_eq!(
            built.args,
            vec![Value::I64(7), Value::array([1i64, 2])]
        );
    }

    #[test]
    fn count_keeps_filters_only() {
        let registry = Registry::new();
        let req = QueryRequest::select(["id"])
            .filter(cond("name", Operator::Like, "a%"))
            .order_by(OrderByClause::asc("name"))
            .paginate(2, 10);
        let built = QueryBuilder::new(&registry).count(&req, &users()).unwrap();
        assert_eq!(
            built.sql,
            r#"SELECT COUNT(*) FROM "users" WHERE "name" LIKE $1"#
        );
        assert_eq!(built.args, vec![Value::from("a%")]);
    }

    #[test]
    fn update_set_then_where() {
        let registry = Registry::new();
        let req = UpdateRequest::default()
            .set("name", "Ann")
            .set("nickname", Value::Null)
            .filter(cond("id", Operator::Eq, 1i64));
        let built = QueryBuilder::new(&registry).update(&req, &users()).unwrap();
        insta::assert_snapshot!(
            built.sql,
            @r#"UPDATE "users" SET "name" = $1, "nickname" = $2 WHERE "id" = $3"#
        );
        assert_eq!(
            built.args,
            vec![Value::from("Ann"), Value::Null, Value::I64(1)]
        );
    }

    #[test]
    fn update_without_where_never_builds() {
        let registry = Registry::new();
        let req = UpdateRequest::default().set("name", "Ann");
        assert!(matches!(
            QueryBuilder::new(&registry).update(&req, &users()),
            Err(Error::MissingWhere)
        ));
        let req = UpdateRequest::default().filter(cond("id", Operator::Eq, 1i64));
        assert!(matches!(
            QueryBuilder::new(&registry).update(&req, &users()),
            Err(Error::EmptySet)
        ));
    }

    #[test]
    fn converters_apply_to_custom_fields() {
        let registry = Registry::new();
        registry.register_converter("yes_no", |v| match v {
            Value::Bool(b) => Ok(Value::from(if b { "Y" } else { "N" })),
            other => Err(format!("cannot convert {}", other.kind())),
        });
        let req = QueryRequest::select(["id"]).filter(cond("flag", Operator::Eq, true));
        let built = QueryBuilder::new(&registry).select(&req, &users()).unwrap();
        assert_eq!(built.args, vec![Value::from("Y")]);

        let req = UpdateRequest::default()
            .set("flag", false)
            .filter(cond("id", Operator::Eq, 1i64));
        let built = QueryBuilder::new(&registry).update(&req, &users()).unwrap();
        assert_eq!(built.args, vec![Value::from("N"), Value::I64(1)]);
    }
}
