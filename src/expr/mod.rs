//! Expression model shared by every stage after trace evaluation.

/// Boolean structure over predicates.
pub mod node;
/// Value-level expressions.
pub mod value;

pub use node::ExprNode;
pub use value::{AggregateCall, AggregateFunction, AttributePath, ColumnRef, DatePart, Expr};
