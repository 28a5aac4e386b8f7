/// Clause-level types: joins, ordering, selection items and the classified query.
pub mod clauses;
/// Maps call names to their query role (join, aggregate, ordering, date part, scalar).
pub mod function_registry;
/// Top-level query classification: splits the filter into joins, `WHERE` and `HAVING`.
pub mod query_classifier;
/// Individual recognizers that probe a single expression or conjunct.
pub mod recognizers;
/// Attribute-path and call resolution against metadata and the registry.
pub mod resolver;
