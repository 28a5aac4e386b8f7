//! Reduction of a filter CFG to a single boolean expression.
//!
//! Predicate blocks become nodes with a true and a false successor. Two nodes
//! are merged when the second has the first as its only predecessor and both
//! share the edge the merged condition would leave through:
//!
//! ```text
//!   N --t--> M --t--> X          N --f--> M --f--> Y
//!   |        |                   |        |
//!   f        f          AND      t        t          OR
//!   '------> Y                   '------> X
//! ```
//!
//! When the shared edge carries the opposite label on the two nodes, one of
//! them is negated first. Every merge keeps the lower id and removes one
//! node, so the loop terminates.

use tracing::{debug, instrument, trace};

use crate::cfg::assembler::{assemble, ControlFlowGraph, EdgeLabel, NodeKind, NodeRef};
use crate::cfg::segmenter::segment;
use crate::error::{Result, TranslationError};
use crate::expr::ExprNode;
use crate::trace::instruction::Instruction;

#[derive(Debug, Clone)]
struct SNode {
    expr: ExprNode,
    on_true: NodeRef,
    on_false: NodeRef,
}

/// Decompile a filter trace into a boolean expression tree.
pub fn structure_filter(trace: &[Instruction]) -> Result<ExprNode> {
    let blocks = segment(trace)?;
    let graph = assemble(&blocks)?;
    structure(&graph)
}

/// Reduce an assembled graph to one expression whose true edge reaches the
/// true sink and whose false edge reaches the false sink.
#[instrument(level = "trace", skip_all, name = "trace2sql::structure")]
pub fn structure(graph: &ControlFlowGraph) -> Result<ExprNode> {
    let entry = forward(graph, graph.entry)?;
    let NodeRef::Block(root) = entry else {
        return Err(TranslationError::Structuring(
            "the filter does not test any predicate".to_string(),
        ));
    };

    let mut arena = build_arena(graph)?;
    reject_cycles(&arena, root)?;

    let mut live = arena.iter().filter(|node| node.is_some()).count();
    let bound = (live * live).max(1);
    let mut attempts = 0;
    while live > 1 {
        attempts += 1;
        if attempts > bound {
            return Err(TranslationError::Structuring(format!(
                "no reduction after {bound} attempts"
            )));
        }
        if !reduce_once(&mut arena, root) {
            return Err(TranslationError::Structuring(format!(
                "{live} predicate nodes remain and no reduction applies"
            )));
        }
        live -= 1;
    }

    let Some(last) = arena[root].take() else {
        return Err(TranslationError::Structuring(
            "entry node was merged away".to_string(),
        ));
    };
    let expr = match (last.on_true, last.on_false) {
        (NodeRef::TrueSink, NodeRef::FalseSink) => last.expr,
        (NodeRef::FalseSink, NodeRef::TrueSink) => last.expr.negate(),
        (on_true, on_false) => {
            return Err(TranslationError::Structuring(format!(
                "final node targets {on_true:?}/{on_false:?} instead of the two outcomes"
            )))
        }
    };
    debug!(reductions = attempts, "structured filter: {expr}");
    Ok(expr)
}

/// Follow unconditional edges until a predicate block or a sink.
fn forward(graph: &ControlFlowGraph, start: NodeRef) -> Result<NodeRef> {
    let mut current = start;
    for _ in 0..=graph.nodes.len() {
        match current {
            NodeRef::Block(id) if matches!(graph.nodes[id].kind, NodeKind::Trampoline) => {
                current = graph
                    .successor(id, EdgeLabel::Unconditional)
                    .ok_or_else(|| {
                        TranslationError::MalformedTrace(format!("block {id} has no successor"))
                    })?;
            }
            _ => return Ok(current),
        }
    }
    Err(TranslationError::Structuring(
        "cycle of unconditional jumps".to_string(),
    ))
}

fn build_arena(graph: &ControlFlowGraph) -> Result<Vec<Option<SNode>>> {
    let mut arena = vec![None; graph.nodes.len()];
    for node in &graph.nodes {
        let NodeKind::Predicate(predicate) = &node.kind else {
            continue;
        };
        let edge = |label| {
            graph.successor(node.id, label).ok_or_else(|| {
                TranslationError::MalformedTrace(format!("block {} has no {label:?} edge", node.id))
            })
        };
        let on_true = forward(graph, edge(EdgeLabel::True)?)?;
        let on_false = forward(graph, edge(EdgeLabel::False)?)?;
        if on_true == on_false {
            return Err(TranslationError::Structuring(format!(
                "block {} reaches {on_true:?} on both outcomes",
                node.id
            )));
        }
        arena[node.id] = Some(SNode {
            expr: ExprNode::Leaf(predicate.clone()),
            on_true,
            on_false,
        });
    }
    Ok(arena)
}

fn reject_cycles(arena: &[Option<SNode>], root: usize) -> Result<()> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        Active,
        Done,
    }

    let mut marks = vec![Mark::Unvisited; arena.len()];
    let mut stack = vec![(root, false)];
    while let Some((id, finished)) = stack.pop() {
        if finished {
            marks[id] = Mark::Done;
            continue;
        }
        match marks[id] {
            Mark::Done => continue,
            Mark::Active => {
                return Err(TranslationError::Structuring(format!(
                    "loop through block {id}"
                )))
            }
            Mark::Unvisited => {}
        }
        marks[id] = Mark::Active;
        stack.push((id, true));
        let Some(node) = &arena[id] else { continue };
        for next in [node.on_true, node.on_false] {
            if let NodeRef::Block(next) = next {
                match marks[next] {
                    Mark::Active => {
                        return Err(TranslationError::Structuring(format!(
                            "loop through block {next}"
                        )))
                    }
                    Mark::Unvisited => stack.push((next, false)),
                    Mark::Done => {}
                }
            }
        }
    }
    Ok(())
}

fn incoming_counts(arena: &[Option<SNode>]) -> Vec<usize> {
    let mut counts = vec![0; arena.len()];
    for node in arena.iter().flatten() {
        for target in [node.on_true, node.on_false] {
            if let NodeRef::Block(id) = target {
                counts[id] += 1;
            }
        }
    }
    counts
}

/// Prefer the variant that keeps each sink on the edge of the same name.
fn sink_score(on_true: NodeRef, on_false: NodeRef) -> i32 {
    let score_true = match on_true {
        NodeRef::TrueSink => 1,
        NodeRef::FalseSink => -1,
        NodeRef::Block(_) => 0,
    };
    let score_false = match on_false {
        NodeRef::FalseSink => 1,
        NodeRef::TrueSink => -1,
        NodeRef::Block(_) => 0,
    };
    score_true + score_false
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Merge {
    /// `N and M`
    And,
    /// `N or M`
    Or,
    /// `N and not M`
    AndNotSecond,
    /// `not N or M`
    OrNotFirst,
    /// `N or not M`
    OrNotSecond,
    /// `not N and M`
    AndNotFirst,
}

/// Decide how `first` absorbs its successor `second`, and the edges of the result.
fn plan_merge(first: &SNode, second: &SNode, via_true: bool) -> Option<(Merge, NodeRef, NodeRef)> {
    if via_true {
        if first.on_false == second.on_false {
            return Some((Merge::And, second.on_true, second.on_false));
        }
        if first.on_false == second.on_true {
            let shared = first.on_false;
            let keep_first = (Merge::AndNotSecond, second.on_false, shared);
            let negate_first = (Merge::OrNotFirst, shared, second.on_false);
            return Some(
                if sink_score(negate_first.1, negate_first.2) > sink_score(keep_first.1, keep_first.2)
                {
                    negate_first
                } else {
                    keep_first
                },
            );
        }
    } else {
        if first.on_true == second.on_true {
            return Some((Merge::Or, second.on_true, second.on_false));
        }
        if first.on_true == second.on_false {
            let shared = first.on_true;
            let keep_first = (Merge::OrNotSecond, shared, second.on_true);
            let negate_first = (Merge::AndNotFirst, second.on_true, shared);
            return Some(
                if sink_score(negate_first.1, negate_first.2) > sink_score(keep_first.1, keep_first.2)
                {
                    negate_first
                } else {
                    keep_first
                },
            );
        }
    }
    None
}

/// Apply the reduction at the lowest-id eligible node. Returns false when
/// nothing applies.
fn reduce_once(arena: &mut [Option<SNode>], root: usize) -> bool {
    let incoming = incoming_counts(arena);

    for first_id in 0..arena.len() {
        let Some(first) = &arena[first_id] else {
            continue;
        };
        for (via_true, successor) in [(true, first.on_true), (false, first.on_false)] {
            let NodeRef::Block(second_id) = successor else {
                continue;
            };
            if second_id == root || incoming[second_id] != 1 {
                continue;
            }
            let Some(second) = &arena[second_id] else {
                continue;
            };
            let Some((merge, on_true, on_false)) = plan_merge(first, second, via_true) else {
                continue;
            };

            let (Some(first), Some(second)) = (arena[first_id].take(), arena[second_id].take())
            else {
                return false;
            };
            trace!(first_id, second_id, ?merge, "merging predicate nodes");
            let (n, m) = (first.expr, second.expr);
            let expr = match merge {
                Merge::And => ExprNode::and(n, m),
                Merge::Or => ExprNode::or(n, m),
                Merge::AndNotSecond => ExprNode::and(n, m.negate()),
                Merge::OrNotFirst => ExprNode::or(n.negate(), m),
                Merge::OrNotSecond => ExprNode::or(n, m.negate()),
                Merge::AndNotFirst => ExprNode::and(n.negate(), m),
            };
            arena[first_id] = Some(SNode {
                expr,
                on_true,
                on_false,
            });
            return true;
        }
    }
    false
}
