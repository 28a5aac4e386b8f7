/// Identifier and string quoting conventions.
pub mod dialect;
/// Serializes a [`crate::generator::ir::QueryAst`] to SQL text.
pub mod renderer;

pub use dialect::{Dialect, QuoteStyle};
pub use renderer::{render_query, RenderedQuery, Renderer};
