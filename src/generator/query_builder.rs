use tracing::{instrument, trace};

use crate::classifier::clauses::{ClassifiedQuery, SelectionItem};
use crate::error::{Result, TranslationError};
use crate::generator::ir::{JoinItem, OrderItem, QueryAst, SelectItem, TableRef};
use crate::metadata::alias::BoundEntity;
use crate::metadata::AliasContext;

fn table_ref(entity: &BoundEntity<'_>) -> TableRef {
    TableRef {
        table: entity.def.table.clone(),
        alias: entity.alias.to_string(),
    }
}

/// Assemble the statement: the first entity is the base relation and every
/// later one is joined through its classified join clause.
#[instrument(level = "trace", skip_all, name = "trace2sql::build_query")]
pub fn build_query(classified: ClassifiedQuery, aliases: &AliasContext<'_>) -> Result<QueryAst> {
    let joins = classified
        .joins
        .into_iter()
        .map(|join| {
            let entity = aliases.get(join.entity).ok_or_else(|| {
                TranslationError::MissingJoinCondition(format!(
                    "no entity declared at position {}",
                    join.entity
                ))
            })?;
            Ok(JoinItem {
                kind: join.kind,
                relation: table_ref(entity),
                left: join.left,
                right: join.right,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let select = classified
        .selection
        .into_iter()
        .map(|item| match item {
            SelectionItem::Wildcard(alias) => SelectItem::Wildcard { alias },
            SelectionItem::Expr(expr) => SelectItem::Expr(expr),
        })
        .collect();

    let order_by = classified
        .order_by
        .into_iter()
        .map(|order| OrderItem {
            expr: order.expr,
            direction: order.direction,
        })
        .collect();

    let ast = QueryAst {
        select,
        from: table_ref(aliases.base()),
        joins,
        where_clause: classified.where_clause,
        group_by: classified.group_by,
        having: classified.having,
        order_by,
    };
    trace!(?ast, "built query");
    Ok(ast)
}
