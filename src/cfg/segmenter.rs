use std::collections::{BTreeSet, HashMap};

use tracing::trace;

use crate::error::{Result, TranslationError};
use crate::trace::instruction::Instruction;

/// Maximal straight-line run of instructions.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    /// Position of the block in program order.
    pub id: usize,
    /// Offset of the first instruction.
    pub start_offset: usize,
    /// Instructions, in program order.
    pub instructions: Vec<Instruction>,
}

/// Split a trace into basic blocks.
///
/// A block starts at the first instruction, at every jump target and after
/// every jump or `Return`.
pub fn segment(trace: &[Instruction]) -> Result<Vec<BasicBlock>> {
    let Some(first) = trace.first() else {
        return Err(TranslationError::MalformedTrace("empty trace".to_string()));
    };

    for pair in trace.windows(2) {
        if pair[1].offset <= pair[0].offset {
            return Err(TranslationError::MalformedTrace(format!(
                "offset {} follows offset {}; offsets must strictly increase",
                pair[1].offset, pair[0].offset
            )));
        }
    }

    let positions: HashMap<usize, usize> = trace
        .iter()
        .enumerate()
        .map(|(index, instruction)| (instruction.offset, index))
        .collect();
    let last_offset = trace[trace.len() - 1].offset;

    let mut leaders = BTreeSet::from([0usize]);
    for (index, instruction) in trace.iter().enumerate() {
        if let Some(target) = instruction.opcode.jump_target() {
            let Some(&position) = positions.get(&target) else {
                let reason = if target < first.offset || target > last_offset {
                    "outside the trace"
                } else {
                    "into the middle of an instruction"
                };
                return Err(TranslationError::MalformedTrace(format!(
                    "jump at offset {} targets offset {target}, {reason}",
                    instruction.offset
                )));
            };
            leaders.insert(position);
        }
        if instruction.opcode.ends_block() && index + 1 < trace.len() {
            leaders.insert(index + 1);
        }
    }

    let starts: Vec<usize> = leaders.into_iter().collect();
    let blocks: Vec<BasicBlock> = starts
        .iter()
        .enumerate()
        .map(|(id, &start)| {
            let end = starts.get(id + 1).copied().unwrap_or(trace.len());
            BasicBlock {
                id,
                start_offset: trace[start].offset,
                instructions: trace[start..end].to_vec(),
            }
        })
        .collect();

    trace!(
        instructions = trace.len(),
        blocks = blocks.len(),
        "segmented trace"
    );
    Ok(blocks)
}

/// Id of the block starting at `offset`.
pub fn block_at(blocks: &[BasicBlock], offset: usize) -> Option<usize> {
    blocks
        .binary_search_by_key(&offset, |block| block.start_offset)
        .ok()
}
