use std::collections::VecDeque;

use tracing::{debug, instrument};

use crate::cfg::evaluator::{evaluate_block, Terminator};
use crate::cfg::segmenter::{block_at, BasicBlock};
use crate::error::{Result, TranslationError};
use crate::expr::Expr;
use crate::trace::instruction::Literal;

/// Target of a control-flow edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRef {
    /// A block, by id.
    Block(usize),
    /// The filter holds.
    TrueSink,
    /// The filter does not hold.
    FalseSink,
}

impl NodeRef {
    /// The sink for a boolean outcome.
    pub fn sink(outcome: bool) -> Self {
        if outcome {
            NodeRef::TrueSink
        } else {
            NodeRef::FalseSink
        }
    }
}

/// Which outcome of its source an edge is taken on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeLabel {
    /// Source predicate holds.
    True,
    /// Source predicate does not hold.
    False,
    /// Source has no predicate.
    Unconditional,
}

/// Directed edge between a block and its successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CfgEdge {
    /// Source block id.
    pub source: usize,
    /// Successor.
    pub target: NodeRef,
    /// Outcome the edge is taken on.
    pub label: EdgeLabel,
}

/// What a block contributes to the graph.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Tests a predicate and branches on it.
    Predicate(Expr),
    /// Passes control on unconditionally.
    Trampoline,
    /// Returns a boolean constant; stands for the corresponding sink.
    Sink(bool),
}

/// One block of the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct CfgNode {
    /// Block id.
    pub id: usize,
    /// Offset of the block's first instruction.
    pub start_offset: usize,
    /// Role of the block.
    pub kind: NodeKind,
}

/// Control-flow graph of a filter trace.
///
/// Nodes are indexed by block id. Edges whose target block is a constant
/// return point directly at the matching sink, so sink blocks have neither
/// incoming nor outgoing edges.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlFlowGraph {
    /// Blocks in program order.
    pub nodes: Vec<CfgNode>,
    /// All edges, grouped by source.
    pub edges: Vec<CfgEdge>,
    /// Where evaluation starts.
    pub entry: NodeRef,
}

impl ControlFlowGraph {
    /// Target of the edge leaving `source` with `label`.
    pub fn successor(&self, source: usize, label: EdgeLabel) -> Option<NodeRef> {
        self.edges
            .iter()
            .find(|edge| edge.source == source && edge.label == label)
            .map(|edge| edge.target)
    }

    /// Number of blocks that test a predicate.
    pub fn predicate_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| matches!(node.kind, NodeKind::Predicate(_)))
            .count()
    }

    /// Walk the graph from the entry, asking `leaf` for each predicate met,
    /// and report which sink is reached.
    pub fn simulate(&self, leaf: &mut impl FnMut(&Expr) -> bool) -> Result<bool> {
        let mut current = self.entry;
        for _ in 0..=self.nodes.len() {
            let id = match current {
                NodeRef::TrueSink => return Ok(true),
                NodeRef::FalseSink => return Ok(false),
                NodeRef::Block(id) => id,
            };
            let label = match &self.nodes[id].kind {
                NodeKind::Predicate(expr) => {
                    if leaf(expr) {
                        EdgeLabel::True
                    } else {
                        EdgeLabel::False
                    }
                }
                NodeKind::Trampoline => EdgeLabel::Unconditional,
                NodeKind::Sink(outcome) => return Ok(*outcome),
            };
            current = self.successor(id, label).ok_or_else(|| {
                TranslationError::MalformedTrace(format!("block {id} has no {label:?} edge"))
            })?;
        }
        Err(TranslationError::Structuring(
            "evaluation revisits a block".to_string(),
        ))
    }
}

/// Link basic blocks into a control-flow graph and check reachability.
#[instrument(level = "trace", skip_all, name = "trace2sql::assemble")]
pub fn assemble(blocks: &[BasicBlock]) -> Result<ControlFlowGraph> {
    let terminators = blocks
        .iter()
        .map(evaluate_block)
        .collect::<Result<Vec<_>>>()?;

    let mut nodes = Vec::with_capacity(blocks.len());
    for (block, terminator) in blocks.iter().zip(&terminators) {
        let kind = match terminator {
            Terminator::Branch { condition, .. } => NodeKind::Predicate(condition.clone()),
            Terminator::Jump { .. } | Terminator::Fallthrough => NodeKind::Trampoline,
            Terminator::Return(Expr::Literal(Literal::Bool(outcome))) => NodeKind::Sink(*outcome),
            Terminator::Return(Expr::Literal(other)) => {
                return Err(TranslationError::MalformedTrace(format!(
                    "block at offset {} returns non-boolean constant {other}",
                    block.start_offset
                )))
            }
            Terminator::Return(predicate) => NodeKind::Predicate(predicate.clone()),
        };
        nodes.push(CfgNode {
            id: block.id,
            start_offset: block.start_offset,
            kind,
        });
    }

    // Edges point straight at sinks instead of at constant-return blocks.
    let resolve = |id: usize| match nodes[id].kind {
        NodeKind::Sink(outcome) => NodeRef::sink(outcome),
        _ => NodeRef::Block(id),
    };
    let jump_target = |offset: usize| {
        block_at(blocks, offset).map(resolve).ok_or_else(|| {
            TranslationError::MalformedTrace(format!("no block starts at offset {offset}"))
        })
    };
    let next_block = |block: &BasicBlock| {
        if block.id + 1 < blocks.len() {
            Ok(resolve(block.id + 1))
        } else {
            Err(TranslationError::MalformedTrace(format!(
                "block at offset {} falls off the end of the trace",
                block.start_offset
            )))
        }
    };

    let mut edges = Vec::new();
    for (block, terminator) in blocks.iter().zip(&terminators) {
        let source = block.id;
        match (terminator, &nodes[source].kind) {
            (_, NodeKind::Sink(_)) => {}
            (
                Terminator::Branch {
                    jump_if, target, ..
                },
                _,
            ) => {
                let taken = jump_target(*target)?;
                let fallthrough = next_block(block)?;
                let (on_true, on_false) = if *jump_if {
                    (taken, fallthrough)
                } else {
                    (fallthrough, taken)
                };
                edges.push(CfgEdge {
                    source,
                    target: on_true,
                    label: EdgeLabel::True,
                });
                edges.push(CfgEdge {
                    source,
                    target: on_false,
                    label: EdgeLabel::False,
                });
            }
            (Terminator::Jump { target }, _) => edges.push(CfgEdge {
                source,
                target: jump_target(*target)?,
                label: EdgeLabel::Unconditional,
            }),
            (Terminator::Fallthrough, _) => edges.push(CfgEdge {
                source,
                target: next_block(block)?,
                label: EdgeLabel::Unconditional,
            }),
            (Terminator::Return(_), _) => {
                edges.push(CfgEdge {
                    source,
                    target: NodeRef::TrueSink,
                    label: EdgeLabel::True,
                });
                edges.push(CfgEdge {
                    source,
                    target: NodeRef::FalseSink,
                    label: EdgeLabel::False,
                });
            }
        }
    }

    let entry = resolve(0);
    let graph = ControlFlowGraph {
        entry,
        nodes,
        edges,
    };
    check_reachability(&graph)?;

    debug!(
        blocks = graph.nodes.len(),
        predicates = graph.predicate_count(),
        edges = graph.edges.len(),
        "assembled control-flow graph"
    );
    Ok(graph)
}

fn check_reachability(graph: &ControlFlowGraph) -> Result<()> {
    let mut seen = vec![false; graph.nodes.len()];
    let mut reached_true = false;
    let mut reached_false = false;
    let mut queue = VecDeque::from([graph.entry]);

    while let Some(node) = queue.pop_front() {
        match node {
            NodeRef::TrueSink => reached_true = true,
            NodeRef::FalseSink => reached_false = true,
            NodeRef::Block(id) => {
                if std::mem::replace(&mut seen[id], true) {
                    continue;
                }
                queue.extend(
                    graph
                        .edges
                        .iter()
                        .filter(|edge| edge.source == id)
                        .map(|edge| edge.target),
                );
            }
        }
    }

    if let Some(node) = graph
        .nodes
        .iter()
        .find(|node| !seen[node.id] && !matches!(node.kind, NodeKind::Sink(_)))
    {
        return Err(TranslationError::UnreachableBlock(format!(
            "block {} at offset {} is never reached",
            node.id, node.start_offset
        )));
    }
    if !reached_true {
        return Err(TranslationError::UnreachableBlock(
            "the filter can never hold".to_string(),
        ));
    }
    if !reached_false {
        return Err(TranslationError::UnreachableBlock(
            "the filter can never fail".to_string(),
        ));
    }
    Ok(())
}
