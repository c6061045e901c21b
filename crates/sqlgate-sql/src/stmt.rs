//! SQL statements.

use crate::expr::Expr;
use crate::{ColumnName, TableName};

/// A SELECT statement over a single table.
#[derive(Debug, Clone, Default)]
pub struct SelectStmt {
    pub columns: Vec<SelectColumn>,
    pub from: Option<TableName>,
    pub where_: Option<Expr>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<Expr>,
    pub offset: Option<Expr>,
}

/// A column in a SELECT clause.
#[derive(Debug, Clone)]
pub struct SelectColumn {
    pub expr: Expr,
}

impl SelectColumn {
    pub fn expr(expr: Expr) -> Self {
        Self { expr }
    }
}

/// ORDER BY clause.
#[derive(Debug, Clone)]
pub struct OrderBy {
    pub expr: Expr,
    pub desc: bool,
}

impl OrderBy {
    pub fn asc(expr: Expr) -> Self {
        Self { expr, desc: false }
    }

    pub fn desc(expr: Expr) -> Self {
        Self { expr, desc: true }
    }
}

/// An assignment in UPDATE SET.
#[derive(Debug, Clone)]
pub struct UpdateAssignment {
    pub column: ColumnName,
    pub value: Expr,
}

impl UpdateAssignment {
    pub fn new(column: impl Into<ColumnName>, value: Expr) -> Self {
        Self {
            column: column.into(),
            value,
        }
    }
}

// ============================================================================
// UPDATE statement
// ============================================================================

/// An UPDATE statement.
#[derive(Debug, Clone)]
pub struct UpdateStmt {
    pub table: TableName,
    pub assignments: Vec<UpdateAssignment>,
    pub where_: Option<Expr>,
}

// ============================================================================
// Builder-style constructors
// ============================================================================

impl SelectStmt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn column(mut self, col: SelectColumn) -> Self {
        self.columns.push(col);
        self
    }

    pub fn columns(mut self, cols: impl IntoIterator<Item = SelectColumn>) -> Self {
        self.columns.extend(cols);
        self
    }

    pub fn from(mut self, table: impl Into<TableName>) -> Self {
        self.from = Some(table.into());
        self
    }

    pub fn and_where(mut self, expr: Expr) -> Self {
        self.where_ = Some(match self.where_ {
            Some(existing) => existing.and(expr),
            None => expr,
        });
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn limit(mut self, expr: Expr) -> Self {
        self.limit = Some(expr);
        self
    }

    pub fn offset(mut self, expr: Expr) -> Self {
        self.offset = Some(expr);
        self
    }
}

impl UpdateStmt {
    pub fn new(table: impl Into<TableName>) -> Self {
        Self {
            table: table.into(),
            assignments: Vec::new(),
            where_: None,
        }
    }

    pub fn set(mut self, column: impl Into<ColumnName>, value: Expr) -> Self {
        self.assignments.push(UpdateAssignment::new(column, value));
        self
    }

    pub fn and_where(mut self, expr: Expr) -> Self {
        self.where_ = Some(match self.where_ {
            Some(existing) => existing.and(expr),
            None => expr,
        });
        self
    }
}
