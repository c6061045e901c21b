//! Raw SELECT queries with `{{name}}` placeholders.
//!
//! A raw request goes through a fixed sequence of checks, each of which must
//! pass before the next runs:
//!
//! 1. extract the distinct placeholder names, in first-occurrence order
//! 2. compare them with the supplied parameters (missing and extra names)
//! 3. type-check every value against the caller's [`ParamSchema`]
//! 4. rewrite each `{{name}}` to `$k`, reusing `k` for repeated names
//! 5. parse the result and require exactly one read-only SELECT
//!
//! Only then is the statement handed to the executor.

use std::sync::OnceLock;

use indexmap::IndexSet;
use regex::{Captures, Regex};
use sqlparser::ast::{Query, SetExpr, Statement};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

use crate::error::Clause;
use crate::model::{Field, ModelMetadata};
use crate::request::{ExecuteRawRequest, SELECT_ALL};
use crate::types::{FieldType, NormalizedType, coerce, normalize, value_compatible};
use crate::validate::resolve;
use crate::value::{SqlParam, Value};
use crate::{Error, Result};

/// Type information for one named parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamDef {
    pub name: &'static str,
    pub ty: FieldType,
}

impl ParamDef {
    pub const fn new(name: &'static str, ty: FieldType) -> Self {
        Self { name, ty }
    }
}

/// Declares the parameters a raw query accepts.
pub trait ParamSchema {
    fn params() -> &'static [ParamDef];
}

/// No parameters.
impl ParamSchema for () {
    fn params() -> &'static [ParamDef] {
        &[]
    }
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{\{([A-Za-z0-9_]+)\}\}").expect("valid placeholder regex"))
}

/// Distinct placeholder names in first-occurrence order.
pub fn extract_placeholders(query: &str) -> IndexSet<String> {
    placeholder_pattern()
        .captures_iter(query)
        .map(|caps| caps[1].to_owned())
        .collect()
}

/// Both directions: every placeholder has a value, every value a placeholder.
pub fn check_param_shape(
    placeholders: &IndexSet<String>,
    req: &ExecuteRawRequest,
) -> Result<()> {
    let missing: Vec<String> = placeholders
        .iter()
        .filter(|name| !req.params.contains_key(name.as_str()))
        .cloned()
        .collect();
    let extra: Vec<String> = req
        .params
        .keys()
        .filter(|name| !placeholders.contains(name.as_str()))
        .cloned()
        .collect();

    if missing.is_empty() && extra.is_empty() {
        Ok(())
    } else {
        Err(Error::ParamMismatch { missing, extra })
    }
}

/// Type-check and collect argument values in placeholder order.
pub fn bind_params<P: ParamSchema>(
    placeholders: &IndexSet<String>,
    req: &ExecuteRawRequest,
) -> Result<Vec<Value>> {
    let defs = P::params();
    placeholders
        .iter()
        .map(|name| {
            let def = defs
                .iter()
                .find(|def| def.name == name.as_str())
                .ok_or_else(|| Error::UntypedParam {
                    param: name.clone(),
                })?;
            let value = req.params.get(name).cloned().unwrap_or_default();
            check_param(name, &def.ty, value)
        })
        .collect()
}

fn check_param(name: &str, ty: &FieldType, value: Value) -> Result<Value> {
    let expected = normalize(ty);
    let value = coerce(&expected, value);
    let accepted = if value.is_null() {
        ty.is_optional() || expected == NormalizedType::Any
    } else {
        value_compatible(&expected, &value)
    };
    if !accepted {
        return Err(Error::ParamType {
            param: name.to_owned(),
            expected,
            actual: value.kind(),
        });
    }
    Ok(value)
}

/// Replace each `{{name}}` with `$k`, `k` being the name's 1-based position.
pub fn rewrite_placeholders(query: &str, placeholders: &IndexSet<String>) -> String {
    placeholder_pattern()
        .replace_all(query, |caps: &Captures<'_>| {
            match placeholders.get_index_of(&caps[1]) {
                Some(idx) => format!("${}", idx + 1),
                None => caps[0].to_owned(),
            }
        })
        .into_owned()
}

/// Accept exactly one read-only SELECT statement.
pub fn validate_select(sql: &str) -> Result<()> {
    let statements = Parser::parse_sql(&PostgreSqlDialect {}, sql)
        .map_err(|e| Error::SqlSyntax(e.to_string()))?;

    let statement = match statements.as_slice() {
        [] => return Err(Error::EmptySql),
        [statement] => statement,
        many => return Err(Error::MultipleStatements(many.len())),
    };

    match statement {
        Statement::Query(query) if query_is_read_only(query) => Ok(()),
        Statement::Query(_) => Err(Error::NotSelect("SELECT INTO".into())),
        other => Err(Error::NotSelect(statement_kind(other))),
    }
}

fn query_is_read_only(query: &Query) -> bool {
    let ctes_ok = query
        .with
        .as_ref()
        .is_none_or(|with| with.cte_tables.iter().all(|cte| query_is_read_only(&cte.query)));
    ctes_ok && body_is_read_only(&query.body)
}

fn body_is_read_only(body: &SetExpr) -> bool {
    match body {
        SetExpr::Select(select) => select.into.is_none(),
        SetExpr::Query(query) => query_is_read_only(query),
        SetExpr::SetOperation { left, right, .. } => {
            body_is_read_only(left) && body_is_read_only(right)
        }
        SetExpr::Values(_) | SetExpr::Table(_) => true,
        _ => false,
    }
}

/// Leading keyword of a statement, for error messages.
fn statement_kind(statement: &Statement) -> String {
    let text = statement.to_string();
    text.split_whitespace()
        .next()
        .unwrap_or("statement")
        .to_uppercase()
}

/// A raw query that passed every check, ready to execute.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRaw {
    pub sql: String,
    pub args: Vec<Value>,
    pub placeholders: Vec<String>,
}

impl PreparedRaw {
    pub fn params(&self) -> Vec<SqlParam<'_>> {
        self.args.iter().map(SqlParam).collect()
    }
}

/// Run the raw pipeline up to execution.
pub fn prepare<P: ParamSchema>(req: &ExecuteRawRequest) -> Result<PreparedRaw> {
    let placeholders = extract_placeholders(&req.query);
    check_param_shape(&placeholders, req)?;
    let args = bind_params::<P>(&placeholders, req)?;
    let sql = rewrite_placeholders(&req.query, &placeholders);
    validate_select(&sql)?;

    tracing::debug!(sql = %sql, params = args.len(), "prepared raw query");
    Ok(PreparedRaw {
        sql,
        args,
        placeholders: placeholders.into_iter().collect(),
    })
}

/// Result fields a raw request projects. Empty means every field.
pub fn output_fields<'m>(
    select_fields: &[String],
    meta: &'m ModelMetadata,
) -> Result<Vec<&'m Field>> {
    if select_fields.is_empty() || select_fields.iter().any(|name| name == SELECT_ALL) {
        return Ok(meta.fields.values().collect());
    }
    select_fields
        .iter()
        .map(|name| resolve(meta, name, Clause::SelectFields))
        .collect()
}
