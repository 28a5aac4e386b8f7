//! Instruction traces: the input format of a translation.

use serde::{Deserialize, Serialize};

/// Label-based trace assembly.
pub mod builder;
/// Opcodes, literals and operators.
pub mod instruction;

pub use builder::TraceBuilder;
pub use instruction::{BinaryOperator, CompareOp, Instruction, Literal, Opcode, UnaryOperator};

/// Declaration of one entity taking part in the query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityBinding {
    /// Variable name used by the traces; also the SQL alias.
    pub variable: String,
    /// Entity name known to the metadata provider.
    pub entity: String,
}

impl EntityBinding {
    /// Bind `variable` to `entity`.
    pub fn new(variable: impl Into<String>, entity: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            entity: entity.into(),
        }
    }
}

/// Everything needed to translate one query.
///
/// `selection` is a straight-line trace returning the selected value (a tuple
/// for several columns). `filter` is a branching predicate trace; an empty
/// filter means the query has no conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryTrace {
    /// Entity declarations, in order. The first one is the base relation.
    pub entities: Vec<EntityBinding>,
    /// Trace computing the selection list.
    pub selection: Vec<Instruction>,
    /// Trace computing the filter predicate.
    #[serde(default)]
    pub filter: Vec<Instruction>,
}

impl QueryTrace {
    /// Parse a trace from its JSON form.
    pub fn from_json(json: &str) -> Result<Self, String> {
        serde_json::from_str(json).map_err(|e| format!("Invalid query trace JSON: {e}"))
    }

    /// True when the query carries a filter predicate.
    pub fn has_filter(&self) -> bool {
        !self.filter.is_empty()
    }
}
