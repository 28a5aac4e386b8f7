use tracing::instrument;

use crate::cfg::segmenter::{segment, BasicBlock};
use crate::error::{Result, TranslationError};
use crate::expr::{AttributePath, Expr};
use crate::trace::instruction::{Instruction, Opcode};

/// Entry on the symbolic operand stack.
#[derive(Debug, Clone, PartialEq)]
enum StackValue {
    Value(Expr),
    /// A global name that is only legal as the target of a call.
    Callee(String),
}

/// How control leaves a block.
#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    /// Conditional jump to `target` when `condition` equals `jump_if`,
    /// otherwise fallthrough.
    Branch {
        /// Tested predicate.
        condition: Expr,
        /// Outcome of `condition` that takes the jump.
        jump_if: bool,
        /// Target offset.
        target: usize,
    },
    /// Unconditional jump to an offset.
    Jump {
        /// Target offset.
        target: usize,
    },
    /// Control continues with the next block.
    Fallthrough,
    /// Evaluation ends with this value.
    Return(Expr),
}

/// Global names of the form `p_<n>`, `n >= 1`, are query parameters.
pub fn parameter_index(name: &str) -> Option<usize> {
    name.strip_prefix("p_")
        .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|digits| digits.parse().ok())
        .filter(|&n: &usize| n >= 1)
}

/// Symbolically execute a block and report how it ends.
///
/// The stack starts empty and must be empty again once the terminator has
/// consumed its operand.
pub fn evaluate_block(block: &BasicBlock) -> Result<Terminator> {
    let mut stack = Vec::new();
    let mut terminator = Terminator::Fallthrough;

    for instruction in &block.instructions {
        if let Some(end) = step(&mut stack, instruction)? {
            terminator = end;
        }
    }

    if !stack.is_empty() {
        return Err(TranslationError::MalformedTrace(format!(
            "block at offset {} leaves {} value(s) on the stack",
            block.start_offset,
            stack.len()
        )));
    }
    Ok(terminator)
}

/// Evaluate a straight-line trace that returns a value.
#[instrument(level = "trace", skip_all, name = "trace2sql::evaluate_selection")]
pub fn evaluate_selection(trace: &[Instruction]) -> Result<Expr> {
    let blocks = segment(trace)?;
    let [block] = blocks.as_slice() else {
        return Err(TranslationError::MalformedTrace(format!(
            "selection must be straight-line, found {} blocks",
            blocks.len()
        )));
    };
    match evaluate_block(block)? {
        Terminator::Return(value) => Ok(value),
        _ => Err(TranslationError::MalformedTrace(
            "selection does not end in a return".to_string(),
        )),
    }
}

fn step(stack: &mut Vec<StackValue>, instruction: &Instruction) -> Result<Option<Terminator>> {
    let offset = instruction.offset;
    match &instruction.opcode {
        Opcode::LoadVar { name } => stack.push(StackValue::Value(Expr::Entity(name.clone()))),
        Opcode::LoadAttr { name } => match pop_value(stack, offset)? {
            Expr::Entity(variable) => stack.push(StackValue::Value(Expr::Attribute(
                AttributePath::new(variable, name.clone()),
            ))),
            other => {
                return Err(TranslationError::UnsupportedExpression(format!(
                    "attribute '{name}' accessed on computed value {other}"
                )))
            }
        },
        Opcode::LoadConst { value } => stack.push(StackValue::Value(Expr::Literal(value.clone()))),
        Opcode::LoadGlobal { name } => stack.push(match parameter_index(name) {
            Some(n) => StackValue::Value(Expr::Parameter(n)),
            None => StackValue::Callee(name.clone()),
        }),
        Opcode::LoadSubquery { query } => {
            stack.push(StackValue::Value(Expr::NestedQuery(query.clone())))
        }
        Opcode::Compare { op } => {
            let right = pop_value(stack, offset)?;
            let left = pop_value(stack, offset)?;
            stack.push(StackValue::Value(Expr::compare(*op, left, right)));
        }
        Opcode::BinaryOp { op } => {
            let right = pop_value(stack, offset)?;
            let left = pop_value(stack, offset)?;
            stack.push(StackValue::Value(Expr::binary(*op, left, right)));
        }
        Opcode::UnaryOp { op } => {
            let operand = pop_value(stack, offset)?;
            stack.push(StackValue::Value(Expr::Unary {
                op: *op,
                operand: Box::new(operand),
            }));
        }
        Opcode::Call { argc } => {
            let args = pop_values(stack, *argc, offset)?;
            let function = match stack.pop() {
                Some(StackValue::Callee(name)) => name,
                Some(StackValue::Value(value)) => {
                    return Err(TranslationError::MalformedTrace(format!(
                        "call at offset {offset} targets {value}, not a global name"
                    )))
                }
                None => return Err(underflow(offset)),
            };
            stack.push(StackValue::Value(Expr::Call { function, args }));
        }
        Opcode::BuildTuple { count } => {
            let items = pop_values(stack, *count, offset)?;
            stack.push(StackValue::Value(Expr::Tuple(items)));
        }
        Opcode::JumpIfTrue { target } | Opcode::JumpIfFalse { target } => {
            let condition = pop_value(stack, offset)?;
            return Ok(Some(Terminator::Branch {
                condition,
                jump_if: matches!(instruction.opcode, Opcode::JumpIfTrue { .. }),
                target: *target,
            }));
        }
        Opcode::Jump { target } => return Ok(Some(Terminator::Jump { target: *target })),
        Opcode::Return => return Ok(Some(Terminator::Return(pop_value(stack, offset)?))),
    }
    Ok(None)
}

fn pop_value(stack: &mut Vec<StackValue>, offset: usize) -> Result<Expr> {
    match stack.pop() {
        Some(StackValue::Value(value)) => Ok(value),
        Some(StackValue::Callee(name)) => Err(TranslationError::MalformedTrace(format!(
            "global '{name}' used as a value at offset {offset}"
        ))),
        None => Err(underflow(offset)),
    }
}

fn pop_values(stack: &mut Vec<StackValue>, count: usize, offset: usize) -> Result<Vec<Expr>> {
    let mut values = (0..count)
        .map(|_| pop_value(stack, offset))
        .collect::<Result<Vec<_>>>()?;
    values.reverse();
    Ok(values)
}

fn underflow(offset: usize) -> TranslationError {
    TranslationError::MalformedTrace(format!("stack underflow at offset {offset}"))
}
