use tracing::{debug, instrument};

use crate::classifier::clauses::{
    ClassifiedQuery, JoinClause, OrderBy, OrientedJoin, SelectionItem,
};
use crate::classifier::function_registry::FunctionRegistry;
use crate::classifier::recognizers::{
    aggregate_shape, recognize_join, recognize_order, AggregateShape,
};
use crate::classifier::resolver::{Resolver, SubqueryPlanner};
use crate::error::{Result, TranslationError};
use crate::expr::{Expr, ExprNode};
use crate::metadata::AliasContext;

/// Sort a selection value and a structured filter into query clauses.
///
/// Nested query operands are handed to `subqueries`; without a planner they
/// are unsupported.
#[instrument(level = "trace", skip_all, name = "trace2sql::classify")]
pub fn classify_query(
    selection: Expr,
    filter: Option<ExprNode>,
    aliases: &AliasContext<'_>,
    registry: &FunctionRegistry,
    subqueries: Option<SubqueryPlanner<'_>>,
) -> Result<ClassifiedQuery> {
    let resolver = Resolver::new(registry, aliases).with_subqueries(subqueries);

    let (selection, order_by) = classify_selection(selection, aliases, &resolver, registry)?;

    let mut join_clauses = Vec::new();
    let mut where_conjuncts = Vec::new();
    let mut having_conjuncts = Vec::new();
    for conjunct in filter.map(ExprNode::into_conjuncts).unwrap_or_default() {
        if let ExprNode::Leaf(leaf) = &conjunct {
            if let Some(clause) = recognize_join(leaf, registry)? {
                join_clauses.push(clause);
                continue;
            }
        }
        let resolved = conjunct.try_map_leaves(&mut |leaf| resolver.resolve(leaf))?;
        match aggregate_shape(&resolved) {
            AggregateShape::Plain => where_conjuncts.push(resolved),
            AggregateShape::Aggregated => having_conjuncts.push(resolved),
            AggregateShape::Mixed => {
                return Err(TranslationError::UnsupportedMixedAggregate(format!(
                    "{resolved}"
                )))
            }
        }
    }

    let joins = assign_joins(join_clauses, aliases)?;

    let mut classified = ClassifiedQuery {
        selection,
        joins,
        where_clause: ExprNode::from_conjuncts(where_conjuncts),
        having: ExprNode::from_conjuncts(having_conjuncts),
        group_by: Vec::new(),
        order_by,
    };
    if classified.is_aggregate() {
        classified.group_by = group_by_keys(&classified.selection);
    }

    debug!(
        selected = classified.selection.len(),
        joins = classified.joins.len(),
        has_where = classified.where_clause.is_some(),
        has_having = classified.having.is_some(),
        grouped = classified.group_by.len(),
        ordered = classified.order_by.len(),
        "classified query"
    );
    Ok(classified)
}

fn classify_selection(
    selection: Expr,
    aliases: &AliasContext<'_>,
    resolver: &Resolver<'_, '_>,
    registry: &FunctionRegistry,
) -> Result<(Vec<SelectionItem>, Vec<OrderBy>)> {
    let items = match selection {
        Expr::Tuple(items) => items,
        single => vec![single],
    };

    let mut selected = Vec::with_capacity(items.len());
    let mut order_by = Vec::new();
    for item in items {
        let (direction, item) = recognize_order(item, registry)?;
        match item {
            Expr::Entity(variable) => {
                if direction.is_some() {
                    return Err(TranslationError::MisplacedOrderMarker(format!(
                        "cannot order by the whole entity '{variable}'"
                    )));
                }
                selected.push(SelectionItem::Wildcard(aliases.alias(&variable)?.to_string()));
            }
            item => {
                let resolved = resolver.resolve(item)?;
                if let Some(direction) = direction {
                    order_by.push(OrderBy {
                        expr: resolved.clone(),
                        direction,
                    });
                }
                selected.push(SelectionItem::Expr(resolved));
            }
        }
    }
    Ok((selected, order_by))
}

/// Pair every entity after the first with the one clause linking it to an
/// earlier entity, oriented so the joined entity is on the right.
fn assign_joins(clauses: Vec<JoinClause>, aliases: &AliasContext<'_>) -> Result<Vec<OrientedJoin>> {
    let mut indexed = Vec::with_capacity(clauses.len());
    for clause in clauses {
        let (left_index, left) = aliases.resolve_indexed(&clause.left)?;
        let (right_index, right) = aliases.resolve_indexed(&clause.right)?;
        if left_index == right_index {
            return Err(TranslationError::InvalidJoinUsage(format!(
                "'{}' is joined with itself",
                clause.left.variable
            )));
        }
        indexed.push((clause.kind, left_index, left, right_index, right));
    }

    let mut joins = Vec::new();
    for (entity, bound) in aliases.entries().iter().enumerate().skip(1) {
        let mut linking = indexed
            .iter()
            .filter(|(_, left, _, right, _)| (*left).max(*right) == entity);
        let (Some(found), None) = (linking.next(), linking.next()) else {
            let count = indexed
                .iter()
                .filter(|(_, left, _, right, _)| (*left).max(*right) == entity)
                .count();
            return Err(TranslationError::MissingJoinCondition(format!(
                "entity '{}' ('{}') has {count} join conditions linking it to earlier entities, expected exactly one",
                bound.alias, bound.def.name
            )));
        };
        let (kind, left_index, left, _, right) = found.clone();
        joins.push(if left_index == entity {
            OrientedJoin {
                entity,
                kind: kind.swapped(),
                left: right,
                right: left,
            }
        } else {
            OrientedJoin {
                entity,
                kind,
                left,
                right,
            }
        });
    }
    Ok(joins)
}

fn group_by_keys(selection: &[SelectionItem]) -> Vec<Expr> {
    let mut keys: Vec<Expr> = Vec::new();
    for item in selection {
        if let SelectionItem::Expr(expr) = item {
            if !expr.contains_aggregate() && !keys.contains(expr) {
                keys.push(expr.clone());
            }
        }
    }
    keys
}
