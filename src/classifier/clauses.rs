use std::fmt;

use serde::{Deserialize, Serialize};

use crate::expr::{AttributePath, ColumnRef, Expr, ExprNode};

/// SQL join types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKind {
    /// `INNER JOIN`
    Inner,
    /// `LEFT JOIN`
    Left,
    /// `RIGHT JOIN`
    Right,
    /// `FULL JOIN`
    Full,
}

impl JoinKind {
    /// The same join seen from the other side.
    pub fn swapped(self) -> Self {
        match self {
            JoinKind::Left => JoinKind::Right,
            JoinKind::Right => JoinKind::Left,
            other => other,
        }
    }
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinKind::Inner => write!(f, "INNER JOIN"),
            JoinKind::Left => write!(f, "LEFT JOIN"),
            JoinKind::Right => write!(f, "RIGHT JOIN"),
            JoinKind::Full => write!(f, "FULL JOIN"),
        }
    }
}

/// `ORDER BY` direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "ASC"),
            SortDirection::Desc => write!(f, "DESC"),
        }
    }
}

/// A join marker as written in the filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinClause {
    /// Join type.
    pub kind: JoinKind,
    /// First argument.
    pub left: AttributePath,
    /// Second argument.
    pub right: AttributePath,
}

/// A join clause attached to the entity it brings into the query.
///
/// `right` always belongs to the joined entity; `left` to an entity declared
/// before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrientedJoin {
    /// Declaration index of the joined entity.
    pub entity: usize,
    /// Join type, adjusted for the orientation.
    pub kind: JoinKind,
    /// Column of the earlier entity.
    pub left: ColumnRef,
    /// Column of the joined entity.
    pub right: ColumnRef,
}

/// One `ORDER BY` directive.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    /// Sort key.
    pub expr: Expr,
    /// Direction.
    pub direction: SortDirection,
}

/// One entry of the selection list.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionItem {
    /// Every column of the entity with this alias.
    Wildcard(String),
    /// A resolved expression.
    Expr(Expr),
}

/// The intents of a query, sorted into clauses.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedQuery {
    /// Selection list.
    pub selection: Vec<SelectionItem>,
    /// One join per entity after the first, in declaration order.
    pub joins: Vec<OrientedJoin>,
    /// Conditions without aggregates.
    pub where_clause: Option<ExprNode>,
    /// Conditions on aggregates.
    pub having: Option<ExprNode>,
    /// Grouping keys; empty unless the query aggregates.
    pub group_by: Vec<Expr>,
    /// Sort directives.
    pub order_by: Vec<OrderBy>,
}

impl ClassifiedQuery {
    /// True when the selection or `HAVING` uses an aggregate.
    pub fn is_aggregate(&self) -> bool {
        self.having.is_some()
            || self.selection.iter().any(|item| match item {
                SelectionItem::Expr(expr) => expr.contains_aggregate(),
                SelectionItem::Wildcard(_) => false,
            })
    }
}
