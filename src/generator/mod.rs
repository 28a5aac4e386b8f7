/// Clause-structured query representation shared by the builder and the renderer.
pub mod ir;
/// Assembles a [`ir::QueryAst`] from a classified query.
pub mod query_builder;
