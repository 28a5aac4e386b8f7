use crate::classifier::clauses::{JoinClause, SortDirection};
use crate::classifier::function_registry::FunctionRegistry;
use crate::error::{Result, TranslationError};
use crate::expr::{Expr, ExprNode};

/// Try to recognize a join marker `kind(left.path, right.path)` standing as a
/// whole filter conjunct.
///
/// Returns `Ok(None)` for anything that is not a call to a join marker. A
/// join marker with arguments other than two attribute paths is an error.
pub fn recognize_join(expr: &Expr, registry: &FunctionRegistry) -> Result<Option<JoinClause>> {
    let Expr::Call { function, args } = expr else {
        return Ok(None);
    };
    let Some(kind) = registry.join_marker(function) else {
        return Ok(None);
    };
    match args.as_slice() {
        [Expr::Attribute(left), Expr::Attribute(right)] => Ok(Some(JoinClause {
            kind,
            left: left.clone(),
            right: right.clone(),
        })),
        _ => Err(TranslationError::InvalidJoinUsage(format!(
            "'{function}' expects two attribute paths, got {expr}"
        ))),
    }
}

/// Try to recognize an ordering marker `asc(x)` / `desc(x)` around a
/// selection item, returning the direction and the wrapped expression.
pub fn recognize_order(
    expr: Expr,
    registry: &FunctionRegistry,
) -> Result<(Option<SortDirection>, Expr)> {
    let direction = match &expr {
        Expr::Call { function, .. } => registry.order_marker(function),
        _ => None,
    };
    match (direction, expr) {
        (Some(direction), Expr::Call { function, mut args }) => match args.pop() {
            Some(inner) if args.is_empty() => Ok((Some(direction), inner)),
            _ => Err(TranslationError::UnsupportedExpression(format!(
                "'{function}' expects 1 argument"
            ))),
        },
        (_, expr) => Ok((None, expr)),
    }
}

/// How a filter conjunct relates to aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateShape {
    /// No predicate uses an aggregate: the conjunct belongs in `WHERE`.
    Plain,
    /// Every predicate uses an aggregate: the conjunct belongs in `HAVING`.
    Aggregated,
    /// Aggregate and plain predicates combined under `OR`/`NOT`.
    Mixed,
}

/// Classify a resolved conjunct by the aggregates its predicates use.
pub fn aggregate_shape(conjunct: &ExprNode) -> AggregateShape {
    let leaves = conjunct.leaves();
    let aggregated = leaves
        .iter()
        .filter(|leaf| leaf.contains_aggregate())
        .count();
    if aggregated == 0 {
        AggregateShape::Plain
    } else if aggregated == leaves.len() {
        AggregateShape::Aggregated
    } else {
        AggregateShape::Mixed
    }
}
