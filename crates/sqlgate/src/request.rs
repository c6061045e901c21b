//! Request and response payloads.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::Error;
use crate::pagination::{PageMeta, PaginationRequest};
use crate::value::Value;

/// Select sentinel that expands to every registered field.
pub const SELECT_ALL: &str = "ALL";

/// A result row: external field name to value, in selection order.
pub type Record = IndexMap<String, Value>;

/// Filter operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    Like,
    ILike,
    In,
    NotIn,
    IsNull,
    IsNotNull,
    /// Value equals any element of an array column.
    Any,
    /// Array column contains every given element.
    Contains,
}

impl Operator {
    pub const ALL: [Operator; 14] = [
        Operator::Eq,
        Operator::Ne,
        Operator::Gt,
        Operator::Lt,
        Operator::Ge,
        Operator::Le,
        Operator::Like,
        Operator::ILike,
        Operator::In,
        Operator::NotIn,
        Operator::IsNull,
        Operator::IsNotNull,
        Operator::Any,
        Operator::Contains,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Ge => ">=",
            Operator::Le => "<=",
            Operator::Like => "LIKE",
            Operator::ILike => "ILIKE",
            Operator::In => "IN",
            Operator::NotIn => "NOT IN",
            Operator::IsNull => "IS NULL",
            Operator::IsNotNull => "IS NOT NULL",
            Operator::Any => "ANY",
            Operator::Contains => "CONTAINS",
        }
    }

    pub fn is_null_check(self) -> bool {
        matches!(self, Operator::IsNull | Operator::IsNotNull)
    }

    pub fn is_membership(self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }

    pub fn is_array_op(self) -> bool {
        matches!(self, Operator::Any | Operator::Contains)
    }

    pub fn is_pattern(self) -> bool {
        matches!(self, Operator::Like | Operator::ILike)
    }

    pub fn is_ordering(self) -> bool {
        matches!(self, Operator::Gt | Operator::Lt | Operator::Ge | Operator::Le)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase();
        match normalized.as_str() {
            "<>" => return Ok(Operator::Ne),
            "@>" => return Ok(Operator::Contains),
            _ => {}
        }
        Operator::ALL
            .into_iter()
            .find(|op| op.as_str() == normalized)
            .ok_or_else(|| Error::UnsupportedOperator(s.to_owned()))
    }
}

impl TryFrom<String> for Operator {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Operator> for &'static str {
    fn from(op: Operator) -> Self {
        op.as_str()
    }
}

/// One filter predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: Value,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderByClause {
    pub field: String,
    #[serde(default)]
    pub desc: bool,
}

impl OrderByClause {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            desc: false,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            desc: true,
        }
    }
}

/// A structured read request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub select: Vec<String>,
    #[serde(rename = "where", default)]
    pub where_: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order_by: Vec<OrderByClause>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PaginationRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
}

impl QueryRequest {
    pub fn select<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> Self {
        Self {
            select: fields.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.where_.push(condition);
        self
    }

    pub fn order_by(mut self, clause: OrderByClause) -> Self {
        self.order_by.push(clause);
        self
    }

    pub fn paginate(mut self, page: i64, page_size: i64) -> Self {
        self.pagination = Some(PaginationRequest { page, page_size });
        self
    }

    pub fn selects_all(&self) -> bool {
        self.select.iter().any(|f| f == SELECT_ALL)
    }
}

/// A structured update request. `set` keeps the caller's order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub set: IndexMap<String, Value>,
    #[serde(rename = "where", default)]
    pub where_: Vec<Condition>,
}

impl UpdateRequest {
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.insert(field.into(), value.into());
        self
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.where_.push(condition);
        self
    }
}

/// A raw SELECT with `{{name}}` placeholders.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecuteRawRequest {
    pub query: String,
    #[serde(default)]
    pub params: IndexMap<String, Value>,
    #[serde(default)]
    pub select_fields: Vec<String>,
}

impl ExecuteRawRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn select_fields<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.select_fields = fields.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    pub data: Vec<Record>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PageMeta>,
}
