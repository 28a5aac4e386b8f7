//! Control-flow recovery: from a branching trace to a boolean expression tree.

/// Linking blocks into a graph with two outcome sinks.
pub mod assembler;
/// Symbolic execution of a block's stack operations.
pub mod evaluator;
/// Splitting traces into basic blocks.
pub mod segmenter;
/// Reducing the graph to `And`/`Or`/`Not` structure.
pub mod structurer;

pub use assembler::{assemble, ControlFlowGraph};
pub use evaluator::evaluate_selection;
pub use segmenter::{segment, BasicBlock};
pub use structurer::{structure, structure_filter};
