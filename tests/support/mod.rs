#![allow(dead_code)]

use std::path::PathBuf;

use trace2sql::classifier::function_registry::FunctionRegistry;
use trace2sql::expr::Expr;
use trace2sql::trace::{CompareOp, EntityBinding, Instruction, TraceBuilder};
use trace2sql::{Catalog, QueryTrace};

pub(crate) fn fixture_path(relative: &str) -> PathBuf {
    PathBuf::from("tests/fixtures").join(relative)
}

pub(crate) fn read_fixture(relative: &str) -> String {
    std::fs::read_to_string(fixture_path(relative)).expect("fixture should be readable")
}

pub(crate) fn load_catalog() -> Catalog {
    let mut catalog = Catalog::new();
    catalog
        .load_from_json(&read_fixture("catalog.json"))
        .expect("fixture catalog should parse");
    catalog
}

pub(crate) fn load_registry() -> FunctionRegistry {
    let mut registry = FunctionRegistry::new();
    registry
        .load_from_json(&read_fixture("function_registry.json"))
        .expect("fixture registry should parse");
    registry
}

pub(crate) fn load_trace(name: &str) -> QueryTrace {
    QueryTrace::from_json(&read_fixture(&format!("traces/{name}.json")))
        .expect("fixture trace should parse")
}

pub(crate) fn person_and_address() -> Vec<EntityBinding> {
    vec![
        EntityBinding::new("p", "person"),
        EntityBinding::new("a", "address"),
    ]
}

/// Boolean shape compiled the way a short-circuiting compiler lays out
/// conditional jumps. Leaf `i` tests attribute `f{i}` of entity `x`.
#[derive(Debug, Clone)]
pub(crate) enum Cond {
    Leaf(usize),
    Not(Box<Cond>),
    And(Box<Cond>, Box<Cond>),
    Or(Box<Cond>, Box<Cond>),
}

impl Cond {
    pub(crate) fn leaf(index: usize) -> Self {
        Cond::Leaf(index)
    }

    pub(crate) fn not(inner: Cond) -> Self {
        Cond::Not(Box::new(inner))
    }

    pub(crate) fn and(left: Cond, right: Cond) -> Self {
        Cond::And(Box::new(left), Box::new(right))
    }

    pub(crate) fn or(left: Cond, right: Cond) -> Self {
        Cond::Or(Box::new(left), Box::new(right))
    }

    pub(crate) fn leaf_count(&self) -> usize {
        match self {
            Cond::Leaf(_) => 1,
            Cond::Not(inner) => inner.leaf_count(),
            Cond::And(left, right) | Cond::Or(left, right) => {
                left.leaf_count() + right.leaf_count()
            }
        }
    }

    /// Value under an assignment where bit `i` of `bits` is leaf `i`.
    pub(crate) fn eval(&self, bits: u32) -> bool {
        match self {
            Cond::Leaf(index) => bits >> index & 1 == 1,
            Cond::Not(inner) => !inner.eval(bits),
            Cond::And(left, right) => left.eval(bits) && right.eval(bits),
            Cond::Or(left, right) => left.eval(bits) || right.eval(bits),
        }
    }

    /// Full filter trace: `return <self>` with constant-returning exits.
    pub(crate) fn compile(&self) -> Vec<Instruction> {
        let mut builder = TraceBuilder::new();
        self.emit(&mut builder, "no", false);
        builder.ret_const(true).label("no").ret_const(false);
        builder.build().expect("compiled condition should build")
    }

    /// Emit code that jumps to `target` when the condition equals
    /// `jump_when` and falls through otherwise.
    fn emit(&self, builder: &mut TraceBuilder, target: &str, jump_when: bool) {
        match self {
            Cond::Leaf(index) => {
                builder
                    .load_path("x", &format!("f{index}"))
                    .load_const(*index as i64)
                    .compare(CompareOp::Eq);
                if jump_when {
                    builder.jump_if_true(target);
                } else {
                    builder.jump_if_false(target);
                }
            }
            Cond::Not(inner) => inner.emit(builder, target, !jump_when),
            Cond::And(left, right) if !jump_when => {
                left.emit(builder, target, false);
                right.emit(builder, target, false);
            }
            Cond::And(left, right) => {
                let skip = builder.fresh_label();
                left.emit(builder, &skip, false);
                right.emit(builder, target, true);
                builder.label(&skip);
            }
            Cond::Or(left, right) if jump_when => {
                left.emit(builder, target, true);
                right.emit(builder, target, true);
            }
            Cond::Or(left, right) => {
                let skip = builder.fresh_label();
                left.emit(builder, &skip, true);
                right.emit(builder, target, false);
                builder.label(&skip);
            }
        }
    }
}

/// Every shape over leaves `lo..hi` in order, with `And`/`Or` at each inner
/// node and an optional negation on every node.
pub(crate) fn all_shapes(lo: usize, hi: usize) -> Vec<Cond> {
    if hi - lo == 1 {
        return vec![Cond::leaf(lo), Cond::not(Cond::leaf(lo))];
    }
    let mut shapes = Vec::new();
    for split in lo + 1..hi {
        let lefts = all_shapes(lo, split);
        let rights = all_shapes(split, hi);
        for left in &lefts {
            for right in &rights {
                for combined in [
                    Cond::and(left.clone(), right.clone()),
                    Cond::or(left.clone(), right.clone()),
                ] {
                    shapes.push(Cond::not(combined.clone()));
                    shapes.push(combined);
                }
            }
        }
    }
    shapes
}

/// Every `And`/`Or` tree over leaves `lo..hi` in order, with negation
/// allowed on leaves only.
pub(crate) fn connective_shapes(lo: usize, hi: usize) -> Vec<Cond> {
    if hi - lo == 1 {
        return vec![Cond::leaf(lo), Cond::not(Cond::leaf(lo))];
    }
    let mut shapes = Vec::new();
    for split in lo + 1..hi {
        let lefts = connective_shapes(lo, split);
        let rights = connective_shapes(split, hi);
        for left in &lefts {
            for right in &rights {
                shapes.push(Cond::and(left.clone(), right.clone()));
                shapes.push(Cond::or(left.clone(), right.clone()));
            }
        }
    }
    shapes
}

/// Leaf oracle for compiled conditions: reads the leaf index back from the
/// `x.f{i}` attribute the leaf compares.
pub(crate) fn leaf_oracle(bits: u32) -> impl FnMut(&Expr) -> bool {
    move |expr| {
        let Expr::Compare { left, .. } = expr else {
            panic!("unexpected leaf {expr}");
        };
        let Expr::Attribute(path) = left.as_ref() else {
            panic!("unexpected leaf operand {left}");
        };
        let index: u32 = path.attribute[1..]
            .parse()
            .expect("leaf attribute should be f<index>");
        bits >> index & 1 == 1
    }
}
