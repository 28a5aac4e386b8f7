//! Translate query-predicate instruction traces into SQL `SELECT` statements.
#![warn(missing_docs)]

/// Process-wide memoization of rendered queries.
pub mod cache;
/// Basic blocks, control-flow graph assembly and boolean structuring.
pub mod cfg;
/// Query classification: joins, `WHERE`/`HAVING` split, grouping and ordering.
pub mod classifier;
/// The error taxonomy shared by every stage.
pub mod error;
/// Value expressions and boolean expression trees.
pub mod expr;
/// Clause-structured query construction.
pub mod generator;
/// Entity metadata providers and alias binding.
pub mod metadata;
/// SQL text rendering.
pub mod output;
/// Instruction trace input format.
pub mod trace;
/// Pipeline entry points and options.
pub mod translate;

pub use cache::TranslationCache;
pub use error::{Result, TranslationError};
pub use metadata::{Catalog, EntityMetadata};
pub use output::{QuoteStyle, RenderedQuery};
pub use trace::QueryTrace;
pub use translate::{translate, TranslateOptions, Translator};
