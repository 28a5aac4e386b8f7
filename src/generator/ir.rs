//! Clause-structured query representation.
//!
//! [`QueryAst`] is produced once by [`crate::generator::query_builder`] and
//! consumed by [`crate::output::renderer`]. It carries resolved expressions
//! only: every column is qualified by an alias declared in `from` or `joins`.

use crate::classifier::clauses::{JoinKind, SortDirection};
use crate::expr::{ColumnRef, Expr, ExprNode};

/// A table with its alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    /// Table name.
    pub table: String,
    /// Alias used by every column of this table.
    pub alias: String,
}

/// One entry of the `SELECT` list.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// `alias.*`
    Wildcard {
        /// Relation alias.
        alias: String,
    },
    /// A value expression.
    Expr(Expr),
}

/// `kind table AS alias ON left = right`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinItem {
    /// Join type.
    pub kind: JoinKind,
    /// Joined relation.
    pub relation: TableRef,
    /// Column of an earlier relation.
    pub left: ColumnRef,
    /// Column of the joined relation.
    pub right: ColumnRef,
}

/// One `ORDER BY` key.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    /// Sort key.
    pub expr: Expr,
    /// Direction.
    pub direction: SortDirection,
}

/// A complete `SELECT` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryAst {
    /// Selection list; never empty.
    pub select: Vec<SelectItem>,
    /// Base relation.
    pub from: TableRef,
    /// Joined relations, in declaration order.
    pub joins: Vec<JoinItem>,
    /// `WHERE` condition.
    pub where_clause: Option<ExprNode>,
    /// `GROUP BY` keys.
    pub group_by: Vec<Expr>,
    /// `HAVING` condition.
    pub having: Option<ExprNode>,
    /// `ORDER BY` keys.
    pub order_by: Vec<OrderItem>,
}

impl QueryAst {
    /// Highest explicit parameter number anywhere in the statement.
    pub fn max_parameter(&self) -> Option<usize> {
        let mut max = None;
        let mut scan = |expr: &Expr| max = max.max(expr.max_parameter());
        for item in &self.select {
            if let SelectItem::Expr(expr) = item {
                scan(expr);
            }
        }
        for condition in [&self.where_clause, &self.having].into_iter().flatten() {
            for leaf in condition.leaves() {
                scan(leaf);
            }
        }
        self.group_by.iter().for_each(&mut scan);
        for item in &self.order_by {
            scan(&item.expr);
        }
        max
    }
}
