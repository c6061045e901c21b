//! Render SQL AST to string.

use std::cell::RefCell;
use std::fmt;

use indexmap::IndexMap;

use crate::expr::Expr;
use crate::stmt::*;
use crate::{Ident, ParamName, RenderedSql};

/// Mutable parameter tracking state.
struct ParamState {
    /// Named parameters mapped to their assigned positional index.
    params: IndexMap<ParamName, usize>,
    /// Next parameter index to assign (starts at 1 for `$1`).
    next_param_idx: usize,
}

impl ParamState {
    fn new() -> Self {
        Self {
            params: IndexMap::new(),
            next_param_idx: 1,
        }
    }

    /// Get or create a parameter index.
    fn get_or_insert(&mut self, name: &ParamName) -> usize {
        *self.params.entry(name.clone()).or_insert_with(|| {
            let idx = self.next_param_idx;
            self.next_param_idx += 1;
            idx
        })
    }
}

/// Rendering context that tracks parameter assignment.
///
/// Uses interior mutability (`RefCell`) so that `Render::render` can take `&self`,
/// enabling the `Fmt` wrapper to implement `Display`.
pub struct RenderContext {
    params: RefCell<ParamState>,
}

impl RenderContext {
    pub fn new() -> Self {
        Self {
            params: RefCell::new(ParamState::new()),
        }
    }

    /// Get or create a parameter placeholder index.
    fn param_idx(&self, name: &ParamName) -> usize {
        self.params.borrow_mut().get_or_insert(name)
    }

    /// Finish rendering and return the collected params.
    fn into_params(self) -> Vec<ParamName> {
        self.params.into_inner().params.into_keys().collect()
    }
}

impl Default for RenderContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Wrapper for rendering a `Render` type via `Display`.
///
/// Allows using `write!(f, "{}", Fmt(ctx, &expr))` in format strings.
pub struct Fmt<'a, T: Render>(&'a RenderContext, &'a T);

impl<T: Render> fmt::Display for Fmt<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.1.render(self.0, f)
    }
}

/// Trait for types that can be rendered to SQL.
pub trait Render {
    fn render(&self, ctx: &RenderContext, f: &mut fmt::Formatter<'_>) -> fmt::Result;
}

impl Render for Expr {
    fn render(&self, ctx: &RenderContext, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Param(name) => {
                let idx = ctx.param_idx(name);
                write!(f, "${idx}")
            }
            Expr::Column(col) => {
                let col = Ident(col.as_str());
                write!(f, "{col}")
            }
            Expr::Int(n) => write!(f, "{n}"),
            Expr::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Expr::Star => write!(f, "*"),
            Expr::BinOp { left, op, right } => {
                let left = Fmt(ctx, left.as_ref());
                let right = Fmt(ctx, right.as_ref());
                let op = op.as_str();
                write!(f, "{left} {op} {right}")
            }
            Expr::IsNull { expr, negated } => {
                let expr = Fmt(ctx, expr.as_ref());
                let suffix = if *negated { " IS NOT NULL" } else { " IS NULL" };
                write!(f, "{expr}{suffix}")
            }
            Expr::Like { expr, pattern } => {
                let expr = Fmt(ctx, expr.as_ref());
                let pattern = Fmt(ctx, pattern.as_ref());
                write!(f, "{expr} LIKE {pattern}")
            }
            Expr::ILike { expr, pattern } => {
                let expr = Fmt(ctx, expr.as_ref());
                let pattern = Fmt(ctx, pattern.as_ref());
                write!(f, "{expr} ILIKE {pattern}")
            }
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                let expr = Fmt(ctx, expr.as_ref());
                let op = if *negated { "NOT IN" } else { "IN" };
                write!(f, "{expr} {op} (")?;
                for (i, item) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", Fmt(ctx, item))?;
                }
                write!(f, ")")
            }
            Expr::Any { expr, array } => {
                let expr = Fmt(ctx, expr.as_ref());
                let array = Fmt(ctx, array.as_ref());
                write!(f, "{expr} = ANY({array})")
            }
            Expr::Contains { expr, value } => {
                let expr = Fmt(ctx, expr.as_ref());
                let value = Fmt(ctx, value.as_ref());
                write!(f, "{expr} @> {value}")
            }
            Expr::FnCall { name, args } => {
                write!(f, "{name}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", Fmt(ctx, arg))?;
                }
                write!(f, ")")
            }
        }
    }
}

impl Render for SelectStmt {
    fn render(&self, ctx: &RenderContext, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SELECT")?;

        if self.columns.is_empty() {
            write!(f, " *")?;
        } else {
            for (i, col) in self.columns.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, " {}", Fmt(ctx, col))?;
            }
        }

        if let Some(from) = &self.from {
            let table = Ident(from.as_str());
            write!(f, " FROM {table}")?;
        }

        if let Some(where_) = &self.where_ {
            let where_ = Fmt(ctx, where_);
            write!(f, " WHERE {where_}")?;
        }

        if !self.order_by.is_empty() {
            write!(f, " ORDER BY ")?;
            for (i, order) in self.order_by.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                let expr = Fmt(ctx, &order.expr);
                let dir = if order.desc { " DESC" } else { " ASC" };
                write!(f, "{expr}{dir}")?;
            }
        }

        if let Some(limit) = &self.limit {
            let limit = Fmt(ctx, limit);
            write!(f, " LIMIT {limit}")?;
        }

        if let Some(offset) = &self.offset {
            let offset = Fmt(ctx, offset);
            write!(f, " OFFSET {offset}")?;
        }

        Ok(())
    }
}

impl Render for SelectColumn {
    fn render(&self, ctx: &RenderContext, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let expr = Fmt(ctx, &self.expr);
        write!(f, "{expr}")
    }
}

impl Render for UpdateStmt {
    fn render(&self, ctx: &RenderContext, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = Ident(self.table.as_str());
        write!(f, "UPDATE {table} SET ")?;

        for (i, assign) in self.assignments.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            let col = Ident(assign.column.as_str());
            let val = Fmt(ctx, &assign.value);
            write!(f, "{col} = {val}")?;
        }

        if let Some(where_) = &self.where_ {
            let where_ = Fmt(ctx, where_);
            write!(f, " WHERE {where_}")?;
        }

        Ok(())
    }
}

/// Render a statement to SQL.
pub fn render(stmt: &impl Render) -> RenderedSql {
    let ctx = RenderContext::new();
    let sql = format!("{}", Fmt(&ctx, stmt));
    RenderedSql {
        sql,
        params: ctx.into_params(),
    }
}
