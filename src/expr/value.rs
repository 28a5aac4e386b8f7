use std::fmt;

use serde::{Deserialize, Serialize};

use crate::generator::ir::QueryAst;
use crate::trace::instruction::{BinaryOperator, CompareOp, Literal, UnaryOperator};
use crate::trace::QueryTrace;

/// `variable.attribute` as written in a trace, before metadata resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttributePath {
    /// Entity variable.
    pub variable: String,
    /// Attribute accessed on it.
    pub attribute: String,
}

impl AttributePath {
    /// Create a path.
    pub fn new(variable: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            attribute: attribute.into(),
        }
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.variable, self.attribute)
    }
}

/// A column qualified by the alias of the relation it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    /// Relation alias.
    pub alias: String,
    /// Column name.
    pub column: String,
}

impl ColumnRef {
    /// Create a column reference.
    pub fn new(alias: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            column: column.into(),
        }
    }
}

/// Aggregate functions with a direct SQL counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunction {
    /// `MIN`
    Min,
    /// `MAX`
    Max,
    /// `SUM`
    Sum,
    /// `AVG`
    Avg,
    /// `COUNT`
    Count,
}

impl AggregateFunction {
    /// SQL function name.
    pub fn sql_name(self) -> &'static str {
        match self {
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Avg => "AVG",
            AggregateFunction::Count => "COUNT",
        }
    }
}

/// Fields accepted by `EXTRACT(field FROM ...)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatePart {
    /// `YEAR`
    Year,
    /// `MONTH`
    Month,
    /// `DAY`
    Day,
    /// `HOUR`
    Hour,
    /// `MINUTE`
    Minute,
    /// `SECOND`
    Second,
}

impl DatePart {
    /// SQL field keyword.
    pub fn sql_name(self) -> &'static str {
        match self {
            DatePart::Year => "YEAR",
            DatePart::Month => "MONTH",
            DatePart::Day => "DAY",
            DatePart::Hour => "HOUR",
            DatePart::Minute => "MINUTE",
            DatePart::Second => "SECOND",
        }
    }
}

/// An aggregate call, optionally restricted by a `FILTER (WHERE ...)` condition.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateCall {
    /// Aggregate function.
    pub function: AggregateFunction,
    /// Aggregated value; `None` aggregates whole rows (`COUNT(*)`).
    pub argument: Option<Box<Expr>>,
    /// Condition of a conditional aggregate.
    pub filter: Option<Box<Expr>>,
}

/// Value-level expression recovered from a trace.
///
/// The evaluator produces attribute paths, entities and raw calls; the
/// resolver replaces them with columns and the role-specific variants
/// (`Aggregate`, `Extract`, `CurrentTimestamp`) and plans nested query traces
/// into `Subquery`, so only resolved expressions reach the query AST.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Unresolved `variable.attribute`.
    Attribute(AttributePath),
    /// Bare entity variable.
    Entity(String),
    /// Resolved column.
    Column(ColumnRef),
    /// Constant.
    Literal(Literal),
    /// Query parameter `$n`, numbered from 1.
    Parameter(usize),
    /// Function call. Before resolution `function` is the trace-level name,
    /// afterwards it is the SQL name of a scalar function.
    Call {
        /// Function name.
        function: String,
        /// Positional arguments.
        args: Vec<Expr>,
    },
    /// Arithmetic or bitwise operation.
    Binary {
        /// Operator.
        op: BinaryOperator,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// Prefix operation.
    Unary {
        /// Operator.
        op: UnaryOperator,
        /// Operand.
        operand: Box<Expr>,
    },
    /// Comparison.
    Compare {
        /// Operator.
        op: CompareOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// Tuple of values: a selection list or the right side of `IN`.
    Tuple(Vec<Expr>),
    /// Aggregate call.
    Aggregate(AggregateCall),
    /// `EXTRACT(field FROM operand)`.
    Extract {
        /// Date part.
        field: DatePart,
        /// Timestamp or interval operand.
        operand: Box<Expr>,
    },
    /// `CURRENT_TIMESTAMP`.
    CurrentTimestamp,
    /// Nested query trace, not yet planned.
    NestedQuery(Box<QueryTrace>),
    /// Planned nested statement.
    Subquery(Box<QueryAst>),
}

impl Expr {
    /// Comparison of two expressions.
    pub fn compare(op: CompareOp, left: Expr, right: Expr) -> Self {
        Expr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Arithmetic or bitwise operation.
    pub fn binary(op: BinaryOperator, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Unresolved attribute access.
    pub fn attribute(variable: &str, attribute: &str) -> Self {
        Expr::Attribute(AttributePath::new(variable, attribute))
    }

    /// Visit this expression and every nested one, parents first.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Expr)) {
        visit(self);
        match self {
            Expr::Call { args, .. } | Expr::Tuple(args) => {
                for arg in args {
                    arg.walk(visit);
                }
            }
            Expr::Binary { left, right, .. } | Expr::Compare { left, right, .. } => {
                left.walk(visit);
                right.walk(visit);
            }
            Expr::Unary { operand, .. } | Expr::Extract { operand, .. } => operand.walk(visit),
            Expr::Aggregate(call) => {
                if let Some(argument) = &call.argument {
                    argument.walk(visit);
                }
                if let Some(filter) = &call.filter {
                    filter.walk(visit);
                }
            }
            Expr::Attribute(_)
            | Expr::Entity(_)
            | Expr::Column(_)
            | Expr::Literal(_)
            | Expr::Parameter(_)
            | Expr::CurrentTimestamp
            | Expr::NestedQuery(_)
            | Expr::Subquery(_) => {}
        }
    }

    /// True if an aggregate call occurs anywhere in this expression.
    pub fn contains_aggregate(&self) -> bool {
        let mut found = false;
        self.walk(&mut |expr| found |= matches!(expr, Expr::Aggregate(_)));
        found
    }

    /// Highest explicit parameter number used, if any, nested statements
    /// included.
    pub fn max_parameter(&self) -> Option<usize> {
        let mut max = None;
        self.walk(&mut |expr| match expr {
            Expr::Parameter(n) => max = max.max(Some(*n)),
            Expr::Subquery(query) => max = max.max(query.max_parameter()),
            _ => {}
        });
        max
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Attribute(path) => write!(f, "{path}"),
            Expr::Entity(variable) => f.write_str(variable),
            Expr::Column(column) => write!(f, "{}.{}", column.alias, column.column),
            Expr::Literal(value) => write!(f, "{value}"),
            Expr::Parameter(n) => write!(f, "p_{n}"),
            Expr::Call { function, args } => {
                write!(f, "{function}(")?;
                write_list(f, args)?;
                f.write_str(")")
            }
            Expr::Binary { op, left, right } => write!(f, "({left} {op:?} {right})"),
            Expr::Unary { op, operand } => write!(f, "{op:?}({operand})"),
            Expr::Compare { op, left, right } => write!(f, "{left} {op} {right}"),
            Expr::Tuple(items) => {
                f.write_str("(")?;
                write_list(f, items)?;
                f.write_str(")")
            }
            Expr::Aggregate(call) => {
                write!(f, "{}(", call.function.sql_name().to_lowercase())?;
                match &call.argument {
                    Some(argument) => write!(f, "{argument}")?,
                    None => f.write_str("*")?,
                }
                if let Some(filter) = &call.filter {
                    write!(f, " if {filter}")?;
                }
                f.write_str(")")
            }
            Expr::Extract { field, operand } => {
                write!(f, "{}({operand})", field.sql_name().to_lowercase())
            }
            Expr::CurrentTimestamp => f.write_str("now()"),
            Expr::NestedQuery(_) | Expr::Subquery(_) => f.write_str("<subquery>"),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}
