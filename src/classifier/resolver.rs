use crate::classifier::function_registry::{FunctionRegistry, FunctionRole};
use crate::error::{Result, TranslationError};
use crate::expr::{AggregateCall, AggregateFunction, Expr};
use crate::generator::ir::QueryAst;
use crate::metadata::AliasContext;
use crate::trace::instruction::CompareOp;
use crate::trace::QueryTrace;

/// Plans a nested query trace into a statement of its own.
pub type SubqueryPlanner<'a> = &'a dyn Fn(&QueryTrace) -> Result<QueryAst>;

/// Turns trace-level expressions into SQL-level ones: attribute paths become
/// columns and calls take the role the registry assigns them.
pub struct Resolver<'a, 'm> {
    registry: &'a FunctionRegistry,
    aliases: &'a AliasContext<'m>,
    subqueries: Option<SubqueryPlanner<'a>>,
}

impl<'a, 'm> Resolver<'a, 'm> {
    /// Create a resolver over one query's aliases. Nested queries are
    /// rejected until a planner is attached.
    pub fn new(registry: &'a FunctionRegistry, aliases: &'a AliasContext<'m>) -> Self {
        Self {
            registry,
            aliases,
            subqueries: None,
        }
    }

    /// Plan nested queries with `planner`.
    #[must_use]
    pub fn with_subqueries(mut self, planner: Option<SubqueryPlanner<'a>>) -> Self {
        self.subqueries = planner;
        self
    }

    /// Resolve a value expression.
    ///
    /// Join and ordering markers are rejected here; the classifier strips
    /// them from the positions where they are allowed before calling this.
    pub fn resolve(&self, expr: Expr) -> Result<Expr> {
        match expr {
            Expr::Attribute(path) => Ok(Expr::Column(self.aliases.resolve(&path)?)),
            Expr::Entity(variable) => {
                self.aliases.alias(&variable)?;
                Err(TranslationError::UnsupportedExpression(format!(
                    "entity '{variable}' cannot be used as a value"
                )))
            }
            Expr::Call { function, args } => self.resolve_call(function, args),
            Expr::Binary { op, left, right } => Ok(Expr::binary(
                op,
                self.resolve(*left)?,
                self.resolve(*right)?,
            )),
            Expr::Unary { op, operand } => Ok(Expr::Unary {
                op,
                operand: Box::new(self.resolve(*operand)?),
            }),
            Expr::Compare {
                op: op @ (CompareOp::In | CompareOp::NotIn),
                right,
                ..
            } if matches!(right.as_ref(), Expr::Tuple(items) if items.is_empty()) => {
                Err(TranslationError::UnsupportedExpression(format!(
                    "'{op}' against an empty tuple"
                )))
            }
            Expr::Compare { op, left, right } => Ok(Expr::compare(
                op,
                self.resolve(*left)?,
                self.resolve(*right)?,
            )),
            Expr::Tuple(items) => Ok(Expr::Tuple(self.resolve_all(items)?)),
            Expr::NestedQuery(query) => {
                let planner = self.subqueries.ok_or_else(|| {
                    TranslationError::UnsupportedExpression(
                        "nested query without a subquery planner".to_string(),
                    )
                })?;
                Ok(Expr::Subquery(Box::new(planner(query.as_ref())?)))
            }
            resolved @ (Expr::Column(_)
            | Expr::Literal(_)
            | Expr::Parameter(_)
            | Expr::Aggregate(_)
            | Expr::Extract { .. }
            | Expr::CurrentTimestamp
            | Expr::Subquery(_)) => Ok(resolved),
        }
    }

    fn resolve_all(&self, exprs: Vec<Expr>) -> Result<Vec<Expr>> {
        exprs.into_iter().map(|expr| self.resolve(expr)).collect()
    }

    fn resolve_call(&self, function: String, args: Vec<Expr>) -> Result<Expr> {
        let role = self.registry.get(&function).ok_or_else(|| {
            TranslationError::UnsupportedExpression(format!("unknown function '{function}'"))
        })?;
        if let Some(arity) = role.arity() {
            if args.len() != arity {
                return Err(TranslationError::UnsupportedExpression(format!(
                    "'{function}' expects {arity} argument(s), got {}",
                    args.len()
                )));
            }
        }

        match role {
            FunctionRole::Join { .. } => Err(TranslationError::InvalidJoinUsage(format!(
                "'{function}' may only appear as a top-level filter condition"
            ))),
            FunctionRole::Order { .. } => Err(TranslationError::MisplacedOrderMarker(format!(
                "'{function}' may only wrap a top-level selection item"
            ))),
            FunctionRole::Aggregate { function: aggregate } => {
                let mut args = args.into_iter();
                let argument = self.aggregate_argument(*aggregate, args.next())?;
                Ok(Expr::Aggregate(AggregateCall {
                    function: *aggregate,
                    argument,
                    filter: None,
                }))
            }
            FunctionRole::ConditionalAggregate { function: aggregate } => {
                let mut args = args.into_iter();
                let argument = self.aggregate_argument(*aggregate, args.next())?;
                let condition = args
                    .next()
                    .map(|condition| self.resolve(condition))
                    .transpose()?;
                if condition.as_ref().is_some_and(Expr::contains_aggregate) {
                    return Err(TranslationError::UnsupportedExpression(format!(
                        "aggregate inside the condition of '{function}'"
                    )));
                }
                Ok(Expr::Aggregate(AggregateCall {
                    function: *aggregate,
                    argument,
                    filter: condition.map(Box::new),
                }))
            }
            FunctionRole::Extract { field } => {
                let operand = args.into_iter().next().ok_or_else(|| {
                    TranslationError::UnsupportedExpression(format!("'{function}' needs an operand"))
                })?;
                Ok(Expr::Extract {
                    field: *field,
                    operand: Box::new(self.resolve(operand)?),
                })
            }
            FunctionRole::CurrentTimestamp => Ok(Expr::CurrentTimestamp),
            FunctionRole::Scalar { sql_name, .. } => Ok(Expr::Call {
                function: sql_name.clone(),
                args: self.resolve_all(args)?,
            }),
        }
    }

    /// `count(entity)` counts rows; every other argument is a value.
    fn aggregate_argument(
        &self,
        function: AggregateFunction,
        argument: Option<Expr>,
    ) -> Result<Option<Box<Expr>>> {
        let Some(argument) = argument else {
            return Ok(None);
        };
        if let (AggregateFunction::Count, Expr::Entity(variable)) = (function, &argument) {
            self.aliases.alias(variable)?;
            return Ok(None);
        }
        let resolved = self.resolve(argument)?;
        if resolved.contains_aggregate() {
            return Err(TranslationError::UnsupportedExpression(format!(
                "nested aggregate in {}",
                function.sql_name()
            )));
        }
        Ok(Some(Box::new(resolved)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{ColumnRef, DatePart};
    use crate::metadata::{AttributeDef, Catalog, EntityDef};
    use crate::trace::instruction::Literal;
    use crate::trace::EntityBinding;

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new();
        catalog.register(EntityDef {
            name: "person".to_string(),
            table: "person".to_string(),
            attributes: ["id", "name", "birth_date"]
                .into_iter()
                .map(|name| AttributeDef {
                    name: name.to_string(),
                    column: name.to_string(),
                })
                .collect(),
        });
        catalog
    }

    fn call(function: &str, args: Vec<Expr>) -> Expr {
        Expr::Call {
            function: function.to_string(),
            args,
        }
    }

    fn with_resolver(check: impl FnOnce(&Resolver<'_, '_>)) {
        let catalog = catalog();
        let bindings = vec![EntityBinding::new("p", "person")];
        let aliases = AliasContext::bind(&bindings, &catalog).expect("person is known");
        let registry = FunctionRegistry::new();
        check(&Resolver::new(&registry, &aliases));
    }

    #[test]
    fn paths_become_columns() {
        with_resolver(|resolver| {
            let expr = Expr::compare(
                CompareOp::Eq,
                Expr::attribute("p", "name"),
                Expr::Literal(Literal::Str("x".into())),
            );
            assert_eq!(
                resolver.resolve(expr).expect("p.name resolves"),
                Expr::compare(
                    CompareOp::Eq,
                    Expr::Column(ColumnRef::new("p", "name")),
                    Expr::Literal(Literal::Str("x".into())),
                )
            );
        });
    }

    #[test]
    fn count_of_entity_counts_rows() {
        with_resolver(|resolver| {
            let resolved = resolver
                .resolve(call("count", vec![Expr::Entity("p".to_string())]))
                .expect("count(p) is valid");
            assert_eq!(
                resolved,
                Expr::Aggregate(AggregateCall {
                    function: AggregateFunction::Count,
                    argument: None,
                    filter: None,
                })
            );
        });
    }

    #[test]
    fn date_parts_and_now_take_their_roles() {
        with_resolver(|resolver| {
            let resolved = resolver
                .resolve(call("year", vec![Expr::attribute("p", "birth_date")]))
                .expect("year(p.birth_date) is valid");
            assert_eq!(
                resolved,
                Expr::Extract {
                    field: DatePart::Year,
                    operand: Box::new(Expr::Column(ColumnRef::new("p", "birth_date"))),
                }
            );
            assert_eq!(
                resolver.resolve(call("now", vec![])).expect("now() is valid"),
                Expr::CurrentTimestamp
            );
        });
    }

    #[test]
    fn nested_queries_go_through_the_planner() {
        use crate::generator::ir::{SelectItem, TableRef};

        let nested = QueryTrace {
            entities: vec![EntityBinding::new("a", "address")],
            selection: Vec::new(),
            filter: Vec::new(),
        };
        let planned = QueryAst {
            select: vec![SelectItem::Wildcard {
                alias: "a".to_string(),
            }],
            from: TableRef {
                table: "address".to_string(),
                alias: "a".to_string(),
            },
            joins: Vec::new(),
            where_clause: None,
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
        };
        let expr = Expr::compare(
            CompareOp::In,
            Expr::attribute("p", "id"),
            Expr::NestedQuery(Box::new(nested.clone())),
        );

        with_resolver(|resolver| {
            assert!(matches!(
                resolver.resolve(expr.clone()),
                Err(TranslationError::UnsupportedExpression(_))
            ));
        });

        let catalog = catalog();
        let bindings = vec![EntityBinding::new("p", "person")];
        let aliases = AliasContext::bind(&bindings, &catalog).expect("person is known");
        let registry = FunctionRegistry::new();
        let planner = |query: &QueryTrace| -> Result<QueryAst> {
            assert_eq!(query, &nested);
            Ok(planned.clone())
        };
        let resolver = Resolver::new(&registry, &aliases).with_subqueries(Some(&planner));
        assert_eq!(
            resolver.resolve(expr).expect("nested query is planned"),
            Expr::compare(
                CompareOp::In,
                Expr::Column(ColumnRef::new("p", "id")),
                Expr::Subquery(Box::new(planned.clone())),
            )
        );
    }

    #[test]
    fn markers_outside_their_positions_are_rejected() {
        with_resolver(|resolver| {
            let join = call(
                "inner_join",
                vec![Expr::attribute("p", "id"), Expr::attribute("p", "id")],
            );
            assert!(matches!(
                resolver.resolve(join),
                Err(TranslationError::InvalidJoinUsage(_))
            ));
            let order = call("asc", vec![Expr::attribute("p", "id")]);
            assert!(matches!(
                resolver.resolve(order),
                Err(TranslationError::MisplacedOrderMarker(_))
            ));
        });
    }

    #[test]
    fn unknown_functions_and_bad_arity_are_unsupported() {
        with_resolver(|resolver| {
            assert!(matches!(
                resolver.resolve(call("soundex", vec![Expr::attribute("p", "name")])),
                Err(TranslationError::UnsupportedExpression(_))
            ));
            assert!(matches!(
                resolver.resolve(call("min", vec![])),
                Err(TranslationError::UnsupportedExpression(_))
            ));
            assert!(matches!(
                resolver.resolve(call(
                    "max",
                    vec![call("min", vec![Expr::attribute("p", "id")])]
                )),
                Err(TranslationError::UnsupportedExpression(_))
            ));
        });
    }

    #[test]
    fn membership_in_an_empty_tuple_is_unsupported() {
        with_resolver(|resolver| {
            let expr = Expr::compare(
                CompareOp::NotIn,
                Expr::attribute("p", "id"),
                Expr::Tuple(Vec::new()),
            );
            assert!(matches!(
                resolver.resolve(expr),
                Err(TranslationError::UnsupportedExpression(_))
            ));
        });
    }
}
