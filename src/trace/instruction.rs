use serde::{Deserialize, Serialize};
use std::fmt;

use crate::trace::QueryTrace;

/// Distance between consecutive instruction offsets produced by [`crate::trace::builder::TraceBuilder`].
pub const INSTRUCTION_WIDTH: usize = 2;

/// A constant operand pushed by [`Opcode::LoadConst`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Literal {
    /// SQL `NULL`.
    Null,
    /// Boolean constant.
    Bool(bool),
    /// Integer constant.
    Int(i64),
    /// Floating-point constant.
    Float(f64),
    /// String constant.
    Str(String),
}

impl Literal {
    /// Boolean payload, if this is a boolean constant.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Literal::Bool(value) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => write!(f, "None"),
            Literal::Bool(value) => write!(f, "{value}"),
            Literal::Int(value) => write!(f, "{value}"),
            Literal::Float(value) => write!(f, "{value:?}"),
            Literal::Str(value) => write!(f, "{value:?}"),
        }
    }
}

/// Comparison operator consumed by [`Opcode::Compare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    /// `==`
    Eq,
    /// `!=`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
    /// Membership test.
    In,
    /// Negated membership test.
    NotIn,
    /// Identity test.
    Is,
    /// Negated identity test.
    IsNot,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            CompareOp::Eq => "==",
            CompareOp::NotEq => "!=",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
            CompareOp::In => "in",
            CompareOp::NotIn => "not in",
            CompareOp::Is => "is",
            CompareOp::IsNot => "is not",
        };
        f.write_str(symbol)
    }
}

/// Arithmetic and bitwise operator consumed by [`Opcode::BinaryOp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOperator {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
    /// `**`
    Pow,
    /// `&`
    BitAnd,
    /// `|`
    BitOr,
    /// `^`
    BitXor,
    /// `<<`
    Shl,
    /// `>>`
    Shr,
}

/// Unary operator consumed by [`Opcode::UnaryOp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOperator {
    /// Arithmetic negation.
    Neg,
    /// Unary plus.
    Plus,
    /// Bitwise complement.
    Invert,
    /// Logical negation of a value (not a branch).
    Not,
}

/// Operation performed by a single trace instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "opcode", rename_all = "snake_case")]
pub enum Opcode {
    /// Push the entity bound to a declared variable.
    LoadVar {
        /// Variable name from the entity declaration.
        name: String,
    },
    /// Replace the top of the stack with one of its attributes.
    LoadAttr {
        /// Attribute name.
        name: String,
    },
    /// Push a constant.
    LoadConst {
        /// The constant.
        value: Literal,
    },
    /// Push a global name: a function to call or a query parameter `p_N`.
    LoadGlobal {
        /// Global name.
        name: String,
    },
    /// Push a nested query, translated on its own and used as an operand.
    LoadSubquery {
        /// The nested query.
        query: Box<QueryTrace>,
    },
    /// Pop two operands and push their comparison.
    Compare {
        /// Comparison operator.
        op: CompareOp,
    },
    /// Pop two operands and push the operator applied to them.
    BinaryOp {
        /// Operator.
        op: BinaryOperator,
    },
    /// Replace the top of the stack with the operator applied to it.
    UnaryOp {
        /// Operator.
        op: UnaryOperator,
    },
    /// Pop `argc` arguments and the callee below them, push the call.
    Call {
        /// Number of positional arguments.
        argc: usize,
    },
    /// Pop `count` values and push them as one tuple.
    BuildTuple {
        /// Number of elements.
        count: usize,
    },
    /// Pop the condition and jump to `target` when it holds.
    JumpIfTrue {
        /// Offset of the instruction to continue at.
        target: usize,
    },
    /// Pop the condition and jump to `target` when it does not hold.
    JumpIfFalse {
        /// Offset of the instruction to continue at.
        target: usize,
    },
    /// Continue at `target` unconditionally.
    Jump {
        /// Offset of the instruction to continue at.
        target: usize,
    },
    /// Pop the outcome and end evaluation.
    Return,
}

impl Opcode {
    /// Net change in operand stack depth caused by this operation.
    pub fn stack_effect(&self) -> isize {
        match self {
            Opcode::LoadVar { .. }
            | Opcode::LoadConst { .. }
            | Opcode::LoadGlobal { .. }
            | Opcode::LoadSubquery { .. } => 1,
            Opcode::LoadAttr { .. } | Opcode::UnaryOp { .. } | Opcode::Jump { .. } => 0,
            Opcode::Compare { .. } | Opcode::BinaryOp { .. } => -1,
            Opcode::Call { argc } => -(*argc as isize),
            Opcode::BuildTuple { count } => 1 - *count as isize,
            Opcode::JumpIfTrue { .. } | Opcode::JumpIfFalse { .. } | Opcode::Return => -1,
        }
    }

    /// Offset this operation may jump to.
    pub fn jump_target(&self) -> Option<usize> {
        match self {
            Opcode::JumpIfTrue { target }
            | Opcode::JumpIfFalse { target }
            | Opcode::Jump { target } => Some(*target),
            _ => None,
        }
    }

    /// True for conditional and unconditional jumps.
    pub fn is_jump(&self) -> bool {
        self.jump_target().is_some()
    }

    /// True when no instruction may follow this one inside the same block.
    pub fn ends_block(&self) -> bool {
        self.is_jump() || matches!(self, Opcode::Return)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Opcode::LoadVar { name } => write!(f, "LOAD_VAR {name}"),
            Opcode::LoadAttr { name } => write!(f, "LOAD_ATTR {name}"),
            Opcode::LoadConst { value } => write!(f, "LOAD_CONST {value}"),
            Opcode::LoadGlobal { name } => write!(f, "LOAD_GLOBAL {name}"),
            Opcode::LoadSubquery { query } => {
                write!(f, "LOAD_SUBQUERY over {} entities", query.entities.len())
            }
            Opcode::Compare { op } => write!(f, "COMPARE {op}"),
            Opcode::BinaryOp { op } => write!(f, "BINARY_OP {op:?}"),
            Opcode::UnaryOp { op } => write!(f, "UNARY_OP {op:?}"),
            Opcode::Call { argc } => write!(f, "CALL {argc}"),
            Opcode::BuildTuple { count } => write!(f, "BUILD_TUPLE {count}"),
            Opcode::JumpIfTrue { target } => write!(f, "JUMP_IF_TRUE {target}"),
            Opcode::JumpIfFalse { target } => write!(f, "JUMP_IF_FALSE {target}"),
            Opcode::Jump { target } => write!(f, "JUMP {target}"),
            Opcode::Return => write!(f, "RETURN"),
        }
    }
}

/// One trace instruction at a fixed program offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    /// Program offset; strictly increasing along the trace.
    pub offset: usize,
    /// Operation performed.
    #[serde(flatten)]
    pub opcode: Opcode,
}

impl Instruction {
    /// Create an instruction at `offset`.
    pub fn new(offset: usize, opcode: Opcode) -> Self {
        Self { offset, opcode }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>4} {}", self.offset, self.opcode)
    }
}
