use std::fmt;

use crate::error::Result;
use crate::expr::value::Expr;

/// Boolean expression tree produced by the structurer.
///
/// Children are evaluated left to right with short-circuiting, matching the
/// order in which the trace tested them.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprNode {
    /// Single predicate.
    Leaf(Expr),
    /// Conjunction.
    And(Box<ExprNode>, Box<ExprNode>),
    /// Disjunction.
    Or(Box<ExprNode>, Box<ExprNode>),
    /// Negation.
    Not(Box<ExprNode>),
}

impl ExprNode {
    /// `left AND right`.
    pub fn and(left: ExprNode, right: ExprNode) -> Self {
        ExprNode::And(Box::new(left), Box::new(right))
    }

    /// `left OR right`.
    pub fn or(left: ExprNode, right: ExprNode) -> Self {
        ExprNode::Or(Box::new(left), Box::new(right))
    }

    /// Logical negation; `Not(Not(x))` collapses to `x`.
    pub fn negate(self) -> Self {
        match self {
            ExprNode::Not(inner) => *inner,
            other => ExprNode::Not(Box::new(other)),
        }
    }

    /// Evaluate with short-circuiting, asking `leaf` for each predicate reached.
    pub fn evaluate(&self, leaf: &mut impl FnMut(&Expr) -> bool) -> bool {
        match self {
            ExprNode::Leaf(expr) => leaf(expr),
            ExprNode::And(left, right) => left.evaluate(leaf) && right.evaluate(leaf),
            ExprNode::Or(left, right) => left.evaluate(leaf) || right.evaluate(leaf),
            ExprNode::Not(child) => !child.evaluate(leaf),
        }
    }

    /// Predicates in left-to-right order.
    pub fn leaves(&self) -> Vec<&Expr> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Expr>) {
        match self {
            ExprNode::Leaf(expr) => out.push(expr),
            ExprNode::And(left, right) | ExprNode::Or(left, right) => {
                left.collect_leaves(out);
                right.collect_leaves(out);
            }
            ExprNode::Not(child) => child.collect_leaves(out),
        }
    }

    /// Flatten the top-level `And` chain; any other node is one conjunct.
    pub fn into_conjuncts(self) -> Vec<ExprNode> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            match node {
                ExprNode::And(left, right) => {
                    stack.push(*right);
                    stack.push(*left);
                }
                other => out.push(other),
            }
        }
        out
    }

    /// Re-join conjuncts left-deep with `And`; `None` when there are none.
    pub fn from_conjuncts(conjuncts: impl IntoIterator<Item = ExprNode>) -> Option<Self> {
        conjuncts.into_iter().reduce(ExprNode::and)
    }

    /// Rebuild the tree with every predicate replaced by `f`'s result.
    pub fn try_map_leaves(self, f: &mut impl FnMut(Expr) -> Result<Expr>) -> Result<Self> {
        Ok(match self {
            ExprNode::Leaf(expr) => ExprNode::Leaf(f(expr)?),
            ExprNode::And(left, right) => {
                ExprNode::and(left.try_map_leaves(f)?, right.try_map_leaves(f)?)
            }
            ExprNode::Or(left, right) => {
                ExprNode::or(left.try_map_leaves(f)?, right.try_map_leaves(f)?)
            }
            ExprNode::Not(child) => ExprNode::Not(Box::new(child.try_map_leaves(f)?)),
        })
    }
}

impl fmt::Display for ExprNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExprNode::Leaf(expr) => write!(f, "{expr}"),
            ExprNode::And(left, right) => write!(f, "({left} and {right})"),
            ExprNode::Or(left, right) => write!(f, "({left} or {right})"),
            ExprNode::Not(child) => write!(f, "not {child}"),
        }
    }
}
