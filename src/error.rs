use thiserror::Error;

/// Terminal failure of a translation.
///
/// Every stage aborts on the first problem it finds, so a caller always sees
/// exactly one of these and never a partially rendered query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslationError {
    /// The instruction trace cannot be segmented or evaluated.
    #[error("malformed trace: {0}")]
    MalformedTrace(String),

    /// A block, or one of the two outcomes, cannot be reached from the entry.
    #[error("unreachable block: {0}")]
    UnreachableBlock(String),

    /// The control-flow graph does not reduce to a single boolean expression.
    #[error("irreducible control flow: {0}")]
    Structuring(String),

    /// An attribute path does not resolve to a column of a declared entity.
    #[error("unknown attribute '{variable}.{attribute}'")]
    UnknownAttribute {
        /// Entity variable the attribute was accessed on.
        variable: String,
        /// Attribute name that failed to resolve.
        attribute: String,
    },

    /// A declared entity is not known to the metadata provider.
    #[error("unknown entity '{0}'")]
    UnknownEntity(String),

    /// A join marker appears somewhere other than a bare top-level conjunct,
    /// or with arguments other than two attribute paths.
    #[error("invalid join usage: {0}")]
    InvalidJoinUsage(String),

    /// A declared entity beyond the first has no unique join condition.
    #[error("missing join condition: {0}")]
    MissingJoinCondition(String),

    /// A conjunct mixes aggregate and plain conditions across `OR`/`NOT`.
    #[error("cannot split aggregate and non-aggregate conditions: {0}")]
    UnsupportedMixedAggregate(String),

    /// An ordering marker wraps something other than a top-level selection item.
    #[error("misplaced order marker: {0}")]
    MisplacedOrderMarker(String),

    /// A call or operand that has no SQL rendering.
    #[error("unsupported expression: {0}")]
    UnsupportedExpression(String),
}

/// Result alias used by every translation stage.
pub type Result<T> = std::result::Result<T, TranslationError>;
