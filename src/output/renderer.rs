//! Deterministic SQL text for a [`QueryAst`].
//!
//! Clauses are emitted on one line in the order `SELECT`, `FROM` (with
//! joins), `WHERE`, `GROUP BY`, `HAVING`, `ORDER BY`; empty ones are left
//! out. Operands are parenthesized only where `PostgreSQL` precedence would
//! otherwise regroup them.

use std::fmt;

use serde::Serialize;

use crate::expr::{ColumnRef, Expr, ExprNode};
use crate::generator::ir::{QueryAst, SelectItem, TableRef};
use crate::output::dialect::Dialect;
use crate::trace::instruction::{BinaryOperator, CompareOp, Literal, UnaryOperator};

/// Final output of a translation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedQuery {
    /// Query text.
    pub sql: String,
    /// Values for the generated placeholders, in placeholder order. Empty
    /// unless parameterized rendering was requested.
    pub parameters: Vec<Literal>,
}

impl fmt::Display for RenderedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

// Binding strength, loosest first.
const OR: u8 = 1;
const AND: u8 = 2;
const NOT: u8 = 3;
const IS: u8 = 4;
const COMPARISON: u8 = 5;
const MEMBERSHIP: u8 = 6;
const BITWISE: u8 = 7;
const ADDITIVE: u8 = 8;
const MULTIPLICATIVE: u8 = 9;
const EXPONENT: u8 = 10;
const PREFIX: u8 = 11;
const ATOM: u8 = 12;

fn node_precedence(node: &ExprNode) -> u8 {
    match node {
        ExprNode::Or(..) => OR,
        ExprNode::And(..) => AND,
        ExprNode::Not(_) => NOT,
        ExprNode::Leaf(expr) => expr_precedence(expr),
    }
}

fn binary_precedence(op: BinaryOperator) -> u8 {
    match op {
        BinaryOperator::BitAnd
        | BinaryOperator::BitOr
        | BinaryOperator::BitXor
        | BinaryOperator::Shl
        | BinaryOperator::Shr => BITWISE,
        BinaryOperator::Add | BinaryOperator::Sub => ADDITIVE,
        BinaryOperator::Mul | BinaryOperator::Div | BinaryOperator::Mod => MULTIPLICATIVE,
        BinaryOperator::Pow => EXPONENT,
    }
}

fn compare_precedence(op: CompareOp, right: &Expr) -> u8 {
    match op {
        CompareOp::Is | CompareOp::IsNot => IS,
        CompareOp::In | CompareOp::NotIn
            if matches!(right, Expr::Tuple(_) | Expr::Subquery(_)) =>
        {
            MEMBERSHIP
        }
        _ => COMPARISON,
    }
}

fn expr_precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Compare { op, right, .. } => compare_precedence(*op, right),
        Expr::Binary { op, .. } => binary_precedence(*op),
        Expr::Unary {
            op: UnaryOperator::Not,
            ..
        } => NOT,
        Expr::Unary { .. } => PREFIX,
        Expr::Literal(Literal::Int(value)) if *value < 0 => PREFIX,
        Expr::Literal(Literal::Float(value)) if value.is_sign_negative() => PREFIX,
        _ => ATOM,
    }
}

fn binary_symbol(op: BinaryOperator) -> &'static str {
    match op {
        BinaryOperator::Add => "+",
        BinaryOperator::Sub => "-",
        BinaryOperator::Mul => "*",
        BinaryOperator::Div => "/",
        BinaryOperator::Mod => "%",
        BinaryOperator::Pow => "^",
        BinaryOperator::BitAnd => "&",
        BinaryOperator::BitOr => "|",
        BinaryOperator::BitXor => "#",
        BinaryOperator::Shl => "<<",
        BinaryOperator::Shr => ">>",
    }
}

/// Stateful renderer; placeholders are numbered as they are emitted.
#[derive(Debug, Clone)]
pub struct Renderer {
    dialect: Dialect,
    parameterize: bool,
    next_placeholder: usize,
    parameters: Vec<Literal>,
}

impl Renderer {
    /// Create a renderer. With `parameterize`, string and numeric literals
    /// become placeholders numbered after the highest explicit parameter.
    pub fn new(dialect: Dialect, parameterize: bool) -> Self {
        Self {
            dialect,
            parameterize,
            next_placeholder: 1,
            parameters: Vec::new(),
        }
    }

    /// Render a statement. Placeholder numbering runs on through nested
    /// statements in the order they appear.
    pub fn render(mut self, ast: &QueryAst) -> RenderedQuery {
        self.next_placeholder = ast.max_parameter().unwrap_or(0) + 1;
        let sql = self.statement(ast);
        RenderedQuery {
            sql,
            parameters: self.parameters,
        }
    }

    fn statement(&mut self, ast: &QueryAst) -> String {
        let select = ast
            .select
            .iter()
            .map(|item| match item {
                SelectItem::Wildcard { alias } => format!("{}.*", self.dialect.ident(alias)),
                SelectItem::Expr(expr) => self.expr(expr),
            })
            .collect::<Vec<_>>()
            .join(", ");
        let mut clauses = vec![format!("SELECT {select}")];

        let mut from = format!("FROM {}", self.table(&ast.from));
        for join in &ast.joins {
            from.push_str(&format!(
                " {} {} ON {} = {}",
                join.kind,
                self.table(&join.relation),
                self.column(&join.left),
                self.column(&join.right)
            ));
        }
        clauses.push(from);

        if let Some(condition) = &ast.where_clause {
            clauses.push(format!("WHERE {}", self.node(condition)));
        }
        if !ast.group_by.is_empty() {
            let keys = ast
                .group_by
                .iter()
                .map(|key| self.expr(key))
                .collect::<Vec<_>>()
                .join(", ");
            clauses.push(format!("GROUP BY {keys}"));
        }
        if let Some(condition) = &ast.having {
            clauses.push(format!("HAVING {}", self.node(condition)));
        }
        if !ast.order_by.is_empty() {
            let keys = ast
                .order_by
                .iter()
                .map(|item| format!("{} {}", self.expr(&item.expr), item.direction))
                .collect::<Vec<_>>()
                .join(", ");
            clauses.push(format!("ORDER BY {keys}"));
        }

        clauses.join(" ")
    }

    fn table(&self, table: &TableRef) -> String {
        format!(
            "{} AS {}",
            self.dialect.ident(&table.table),
            self.dialect.ident(&table.alias)
        )
    }

    fn column(&self, column: &ColumnRef) -> String {
        format!(
            "{}.{}",
            self.dialect.ident(&column.alias),
            self.dialect.ident(&column.column)
        )
    }

    fn node(&mut self, node: &ExprNode) -> String {
        match node {
            ExprNode::Leaf(expr) => self.expr(expr),
            ExprNode::And(left, right) => {
                let left = self.node_operand(left, AND);
                let right = self.node_operand(right, AND);
                format!("{left} AND {right}")
            }
            ExprNode::Or(left, right) => {
                let left = self.node_operand(left, OR);
                let right = self.node_operand(right, OR);
                format!("{left} OR {right}")
            }
            ExprNode::Not(child) => format!("NOT {}", self.node_operand(child, NOT)),
        }
    }

    fn node_operand(&mut self, node: &ExprNode, parent: u8) -> String {
        let text = self.node(node);
        if node_precedence(node) < parent {
            format!("({text})")
        } else {
            text
        }
    }

    /// Render `expr`, parenthesized if it binds looser than `min`.
    fn operand(&mut self, expr: &Expr, min: u8) -> String {
        let text = self.expr(expr);
        if expr_precedence(expr) < min {
            format!("({text})")
        } else {
            text
        }
    }

    fn list(&mut self, items: &[Expr]) -> String {
        items
            .iter()
            .map(|item| self.expr(item))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn expr(&mut self, expr: &Expr) -> String {
        match expr {
            Expr::Column(column) => self.column(column),
            Expr::Literal(value) => self.literal(value),
            Expr::Parameter(n) => format!("${n}"),
            Expr::Call { function, args } => format!("{function}({})", self.list(args)),
            Expr::Binary { op, left, right } => {
                let level = binary_precedence(*op);
                let left = self.operand(left, level);
                let right = self.operand(right, level + 1);
                format!("{left} {} {right}", binary_symbol(*op))
            }
            Expr::Unary { op, operand } => match op {
                UnaryOperator::Not => format!("NOT {}", self.operand(operand, NOT)),
                UnaryOperator::Invert => format!("~{}", self.operand(operand, ATOM)),
                UnaryOperator::Neg | UnaryOperator::Plus => {
                    let sign = if *op == UnaryOperator::Neg { "-" } else { "+" };
                    let text = self.operand(operand, PREFIX);
                    if text.starts_with(['-', '+']) {
                        format!("{sign}({text})")
                    } else {
                        format!("{sign}{text}")
                    }
                }
            },
            Expr::Compare { op, left, right } => self.comparison(*op, left, right),
            Expr::Tuple(items) => format!("({})", self.list(items)),
            Expr::Aggregate(call) => {
                let argument = match &call.argument {
                    Some(argument) => self.expr(argument),
                    None => "*".to_string(),
                };
                let mut text = format!("{}({argument})", call.function.sql_name());
                if let Some(filter) = &call.filter {
                    text.push_str(&format!(" FILTER (WHERE {})", self.expr(filter)));
                }
                text
            }
            Expr::Extract { field, operand } => {
                format!("EXTRACT({} FROM {})", field.sql_name(), self.expr(operand))
            }
            Expr::CurrentTimestamp => "CURRENT_TIMESTAMP".to_string(),
            Expr::Subquery(query) => format!("({})", self.statement(query)),
            // Unresolved forms never reach a built query.
            Expr::Attribute(path) => format!(
                "{}.{}",
                self.dialect.ident(&path.variable),
                self.dialect.ident(&path.attribute)
            ),
            Expr::Entity(variable) => format!("{}.*", self.dialect.ident(variable)),
            Expr::NestedQuery(_) => "(...)".to_string(),
        }
    }

    fn comparison(&mut self, op: CompareOp, left: &Expr, right: &Expr) -> String {
        let level = compare_precedence(op, right);
        let lhs = self.operand(left, level + 1);
        match (op, right) {
            (CompareOp::Is, Expr::Literal(Literal::Null)) => format!("{lhs} IS NULL"),
            (CompareOp::IsNot, Expr::Literal(Literal::Null)) => format!("{lhs} IS NOT NULL"),
            (CompareOp::Is, Expr::Literal(Literal::Bool(value))) => {
                format!("{lhs} IS {}", if *value { "TRUE" } else { "FALSE" })
            }
            (CompareOp::IsNot, Expr::Literal(Literal::Bool(value))) => {
                format!("{lhs} IS NOT {}", if *value { "TRUE" } else { "FALSE" })
            }
            (CompareOp::Is, _) => {
                format!("{lhs} IS NOT DISTINCT FROM {}", self.operand(right, level + 1))
            }
            (CompareOp::IsNot, _) => {
                format!("{lhs} IS DISTINCT FROM {}", self.operand(right, level + 1))
            }
            (CompareOp::In, Expr::Tuple(items)) => format!("{lhs} IN ({})", self.list(items)),
            (CompareOp::NotIn, Expr::Tuple(items)) => {
                format!("{lhs} NOT IN ({})", self.list(items))
            }
            (CompareOp::In, Expr::Subquery(query)) => {
                format!("{lhs} IN ({})", self.statement(query))
            }
            (CompareOp::NotIn, Expr::Subquery(query)) => {
                format!("{lhs} NOT IN ({})", self.statement(query))
            }
            (CompareOp::In, _) => format!("{lhs} = ANY({})", self.expr(right)),
            (CompareOp::NotIn, _) => format!("{lhs} <> ALL({})", self.expr(right)),
            (op, _) => {
                let symbol = match op {
                    CompareOp::Eq => "=",
                    CompareOp::NotEq => "<>",
                    CompareOp::Lt => "<",
                    CompareOp::LtEq => "<=",
                    CompareOp::Gt => ">",
                    _ => ">=",
                };
                format!("{lhs} {symbol} {}", self.operand(right, level + 1))
            }
        }
    }

    fn literal(&mut self, value: &Literal) -> String {
        match value {
            Literal::Null => "NULL".to_string(),
            Literal::Bool(true) => "TRUE".to_string(),
            Literal::Bool(false) => "FALSE".to_string(),
            _ if self.parameterize => {
                let placeholder = format!("${}", self.next_placeholder);
                self.next_placeholder += 1;
                self.parameters.push(value.clone());
                placeholder
            }
            Literal::Int(value) => value.to_string(),
            Literal::Float(value) if value.is_nan() => self.dialect.string("NaN"),
            Literal::Float(value) if value.is_infinite() => self.dialect.string(if *value > 0.0 {
                "Infinity"
            } else {
                "-Infinity"
            }),
            Literal::Float(value) => format!("{value:?}"),
            Literal::Str(value) => self.dialect.string(value),
        }
    }
}

/// Render with default options: double-quoted identifiers, inline literals.
pub fn render_query(ast: &QueryAst) -> RenderedQuery {
    Renderer::new(Dialect::default(), false).render(ast)
}
