//! SQL expressions.

use crate::{ColumnName, ParamName};

/// A SQL expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A parameter placeholder (e.g., p0 -> $1)
    Param(ParamName),
    /// A column reference
    Column(ColumnName),
    /// An integer literal
    Int(i64),
    /// A boolean literal
    Bool(bool),
    /// `*`, only meaningful as a function argument (`COUNT(*)`)
    Star,
    /// Binary operation (e.g., a = b, a AND b)
    BinOp {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    /// IS NULL / IS NOT NULL
    IsNull { expr: Box<Expr>, negated: bool },
    /// LIKE pattern match
    Like { expr: Box<Expr>, pattern: Box<Expr> },
    /// ILIKE pattern match
    ILike { expr: Box<Expr>, pattern: Box<Expr> },
    /// IN (...) / NOT IN (...)
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    /// `expr = ANY(array)`
    Any { expr: Box<Expr>, array: Box<Expr> },
    /// `expr @> value`
    Contains { expr: Box<Expr>, value: Box<Expr> },
    /// Function call
    FnCall { name: String, args: Vec<Expr> },
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
}

impl BinOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinOp::Eq => "=",
            BinOp::Ne => "<>",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "AND",
        }
    }
}

// Convenience constructors
impl Expr {
    pub fn param(name: impl Into<ParamName>) -> Self {
        Expr::Param(name.into())
    }

    pub fn column(name: impl Into<ColumnName>) -> Self {
        Expr::Column(name.into())
    }

    pub fn int(n: i64) -> Self {
        Expr::Int(n)
    }

    /// `COUNT(*)`
    pub fn count_all() -> Self {
        Expr::FnCall {
            name: "COUNT".into(),
            args: vec![Expr::Star],
        }
    }

    /// Create a binary comparison: self <op> other
    pub fn binop(self, op: BinOp, other: Expr) -> Self {
        Expr::BinOp {
            left: Box::new(self),
            op,
            right: Box::new(other),
        }
    }

    /// Create an AND expression: self AND other
    pub fn and(self, other: Expr) -> Self {
        self.binop(BinOp::And, other)
    }

    /// Create IS NULL expression
    pub fn is_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    /// Create IS NOT NULL expression
    pub fn is_not_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: true,
        }
    }

    /// Create LIKE expression
    pub fn like(self, pattern: Expr) -> Self {
        Expr::Like {
            expr: Box::new(self),
            pattern: Box::new(pattern),
        }
    }

    /// Create ILIKE expression
    pub fn ilike(self, pattern: Expr) -> Self {
        Expr::ILike {
            expr: Box::new(self),
            pattern: Box::new(pattern),
        }
    }

    /// Create `self IN (list...)`
    pub fn in_list(self, list: Vec<Expr>) -> Self {
        Expr::InList {
            expr: Box::new(self),
            list,
            negated: false,
        }
    }

    /// Create `self NOT IN (list...)`
    pub fn not_in_list(self, list: Vec<Expr>) -> Self {
        Expr::InList {
            expr: Box::new(self),
            list,
            negated: true,
        }
    }

    /// Create `self = ANY(array)`
    pub fn eq_any(self, array: Expr) -> Self {
        Expr::Any {
            expr: Box::new(self),
            array: Box::new(array),
        }
    }

    /// Create `self @> value`
    pub fn contains(self, value: Expr) -> Self {
        Expr::Contains {
            expr: Box::new(self),
            value: Box::new(value),
        }
    }
}
