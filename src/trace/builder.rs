use std::collections::HashMap;

use crate::error::{Result, TranslationError};
use crate::trace::instruction::{
    BinaryOperator, CompareOp, Instruction, Literal, Opcode, UnaryOperator, INSTRUCTION_WIDTH,
};
use crate::trace::QueryTrace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JumpKind {
    IfTrue,
    IfFalse,
    Always,
}

#[derive(Debug, Clone)]
enum Pending {
    Op(Opcode),
    Jump { kind: JumpKind, label: String },
}

/// Assembles a trace with symbolic jump labels.
///
/// Instructions are laid out [`INSTRUCTION_WIDTH`] offsets apart; labels are
/// resolved to offsets by [`TraceBuilder::build`]. A label placed after the
/// last instruction resolves to an offset outside the trace, which the
/// segmenter rejects.
#[derive(Debug, Clone, Default)]
pub struct TraceBuilder {
    ops: Vec<Pending>,
    labels: HashMap<String, usize>,
    fresh: usize,
}

impl TraceBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, op: Opcode) -> &mut Self {
        self.ops.push(Pending::Op(op));
        self
    }

    fn jump(&mut self, kind: JumpKind, label: &str) -> &mut Self {
        self.ops.push(Pending::Jump {
            kind,
            label: label.to_string(),
        });
        self
    }

    /// Reserve a label name that has not been handed out before.
    pub fn fresh_label(&mut self) -> String {
        let label = format!("L{}", self.fresh);
        self.fresh += 1;
        label
    }

    /// Bind `label` to the position of the next instruction.
    pub fn label(&mut self, label: &str) -> &mut Self {
        self.labels.insert(label.to_string(), self.ops.len());
        self
    }

    /// Push an entity variable.
    pub fn load_var(&mut self, name: &str) -> &mut Self {
        self.push(Opcode::LoadVar {
            name: name.to_string(),
        })
    }

    /// Access an attribute of the value on top of the stack.
    pub fn load_attr(&mut self, name: &str) -> &mut Self {
        self.push(Opcode::LoadAttr {
            name: name.to_string(),
        })
    }

    /// Shorthand for `load_var(variable)` followed by `load_attr(attribute)`.
    pub fn load_path(&mut self, variable: &str, attribute: &str) -> &mut Self {
        self.load_var(variable).load_attr(attribute)
    }

    /// Push a constant.
    pub fn load_const(&mut self, value: impl Into<Literal>) -> &mut Self {
        self.push(Opcode::LoadConst {
            value: value.into(),
        })
    }

    /// Push a global name.
    pub fn load_global(&mut self, name: &str) -> &mut Self {
        self.push(Opcode::LoadGlobal {
            name: name.to_string(),
        })
    }

    /// Push a nested query.
    pub fn load_subquery(&mut self, query: QueryTrace) -> &mut Self {
        self.push(Opcode::LoadSubquery {
            query: Box::new(query),
        })
    }

    /// Compare the two topmost values.
    pub fn compare(&mut self, op: CompareOp) -> &mut Self {
        self.push(Opcode::Compare { op })
    }

    /// Combine the two topmost values.
    pub fn binary(&mut self, op: BinaryOperator) -> &mut Self {
        self.push(Opcode::BinaryOp { op })
    }

    /// Apply a unary operator to the topmost value.
    pub fn unary(&mut self, op: UnaryOperator) -> &mut Self {
        self.push(Opcode::UnaryOp { op })
    }

    /// Call the global below `argc` arguments.
    pub fn call(&mut self, argc: usize) -> &mut Self {
        self.push(Opcode::Call { argc })
    }

    /// Pack the topmost `count` values into a tuple.
    pub fn build_tuple(&mut self, count: usize) -> &mut Self {
        self.push(Opcode::BuildTuple { count })
    }

    /// Pop the condition and jump to `label` when it holds.
    pub fn jump_if_true(&mut self, label: &str) -> &mut Self {
        self.jump(JumpKind::IfTrue, label)
    }

    /// Pop the condition and jump to `label` when it does not hold.
    pub fn jump_if_false(&mut self, label: &str) -> &mut Self {
        self.jump(JumpKind::IfFalse, label)
    }

    /// Jump to `label`.
    pub fn jump_to(&mut self, label: &str) -> &mut Self {
        self.jump(JumpKind::Always, label)
    }

    /// Return the topmost value.
    pub fn ret(&mut self) -> &mut Self {
        self.push(Opcode::Return)
    }

    /// Return a boolean constant.
    pub fn ret_const(&mut self, outcome: bool) -> &mut Self {
        self.load_const(outcome).ret()
    }

    /// Resolve labels and produce the instruction list.
    pub fn build(&self) -> Result<Vec<Instruction>> {
        self.ops
            .iter()
            .enumerate()
            .map(|(index, pending)| {
                let opcode = match pending {
                    Pending::Op(op) => op.clone(),
                    Pending::Jump { kind, label } => {
                        let position = self.labels.get(label).ok_or_else(|| {
                            TranslationError::MalformedTrace(format!("undefined label '{label}'"))
                        })?;
                        let target = position * INSTRUCTION_WIDTH;
                        match kind {
                            JumpKind::IfTrue => Opcode::JumpIfTrue { target },
                            JumpKind::IfFalse => Opcode::JumpIfFalse { target },
                            JumpKind::Always => Opcode::Jump { target },
                        }
                    }
                };
                Ok(Instruction::new(index * INSTRUCTION_WIDTH, opcode))
            })
            .collect()
    }
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Literal::Bool(value)
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Literal::Int(value)
    }
}

impl From<i32> for Literal {
    fn from(value: i32) -> Self {
        Literal::Int(i64::from(value))
    }
}

impl From<f64> for Literal {
    fn from(value: f64) -> Self {
        Literal::Float(value)
    }
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::Str(value.to_string())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Literal::Str(value)
    }
}
