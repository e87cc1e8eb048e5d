//! Flatline Intermediate Representation (IR)
//!
//! The validated program tree consumed by the backend. Parsing, overload
//! resolution and type checking happen upstream; by the time a [`Program`]
//! reaches the backend every call names a known function with the right number
//! of arguments and every return kind is known.
//!
//! All types deserialize from TOML/JSON-like documents with internally tagged
//! `kind` fields, which is how the command-line driver reads programs.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::backend::target::{BinOp, VarScope};

/// Position in source code (line and column, 0-indexed)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Line number (0-indexed)
    pub row: usize,
    /// Column number (0-indexed, in bytes)
    pub column: usize,
}

impl Position {
    pub fn new(row: usize, column: usize) -> Self {
        Self { row, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.row + 1, self.column + 1)
    }
}

/// Source range attached to statements for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    /// Start position (inclusive)
    pub start: Position,
    /// End position (exclusive)
    pub end: Position,
}

impl Span {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Span covering a single line
    pub fn line(row: usize) -> Self {
        Self::new(Position::new(row, 0), Position::new(row + 1, 0))
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// A whole program: shared globals, callable functions, and rules
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    #[serde(default)]
    pub globals: Vec<GlobalDecl>,
    #[serde(default)]
    pub functions: Vec<Function>,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl Program {
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }
}

/// Program-level variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalDecl {
    pub name: String,
    #[serde(default)]
    pub scope: VarScope,
}

impl GlobalDecl {
    pub fn global(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope: VarScope::Global,
        }
    }
}

/// How a function hands back control
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReturnKind {
    #[default]
    Void,
    /// Returns a value. With `multiple_paths` more than one `return` may
    /// supply it; otherwise the single returned expression is used directly.
    Value {
        #[serde(default)]
        multiple_paths: bool,
    },
}

impl ReturnKind {
    pub fn returns_value(self) -> bool {
        matches!(self, ReturnKind::Value { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default)]
    pub returns: ReturnKind,
    /// Function may call itself; compiled to a dispatcher loop
    #[serde(default)]
    pub recursive: bool,
    pub body: Vec<Stmt>,
    #[serde(default)]
    pub span: Span,
}

impl Function {
    /// Whether more than one `return` may supply the value.
    ///
    /// Recursive functions always use a shared return slot.
    pub fn multiple_paths(&self) -> bool {
        match self.returns {
            ReturnKind::Void => true,
            ReturnKind::Value { multiple_paths } => multiple_paths || self.recursive,
        }
    }
}

/// Top-level entry point executed by the rule engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    /// Storage bank for the rule's locals
    #[serde(default)]
    pub scope: VarScope,
    pub body: Vec<Stmt>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Stmt {
    /// Declare a block-scoped local
    Let { name: String, value: Expr },
    /// Assign to a local or global, optionally to one element of it
    Assign {
        target: String,
        #[serde(default)]
        index: Option<Expr>,
        value: Expr,
    },
    If {
        condition: Expr,
        then: Vec<Stmt>,
        #[serde(default)]
        otherwise: Vec<Stmt>,
    },
    While { condition: Expr, body: Vec<Stmt> },
    Break {
        #[serde(default)]
        span: Span,
    },
    Continue {
        #[serde(default)]
        span: Span,
    },
    Return {
        #[serde(default)]
        value: Option<Expr>,
        #[serde(default)]
        span: Span,
    },
    /// Evaluate for side effects
    Expr { expr: Expr },
    /// Yield to the host
    Wait,
    /// Precompute shortest-path parents for every node of a graph held in
    /// storage, writing the bakemap (the graph plus one parent array per
    /// source node) into `result`.
    ///
    /// `progress` names a read-only binding to the live completion fraction,
    /// readable by later statements and rules. `progress_snapshot` is a
    /// variable that also receives the fraction after every tick.
    Bake {
        result: String,
        nodes: String,
        segments: String,
        attributes: String,
        enabled: Expr,
        #[serde(default)]
        progress: Option<String>,
        #[serde(default)]
        progress_snapshot: Option<String>,
    },
}

impl Stmt {
    pub fn local(name: impl Into<String>, value: Expr) -> Self {
        Stmt::Let {
            name: name.into(),
            value,
        }
    }

    pub fn assign(target: impl Into<String>, value: Expr) -> Self {
        Stmt::Assign {
            target: target.into(),
            index: None,
            value,
        }
    }

    pub fn ret(value: Option<Expr>) -> Self {
        Stmt::Return {
            value,
            span: Span::default(),
        }
    }

    pub fn if_then(condition: Expr, then: Vec<Stmt>) -> Self {
        Stmt::If {
            condition,
            then,
            otherwise: Vec::new(),
        }
    }

    pub fn while_loop(condition: Expr, body: Vec<Stmt>) -> Self {
        Stmt::While { condition, body }
    }

    pub fn expr(expr: Expr) -> Self {
        Stmt::Expr { expr }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    Number { value: f64 },
    Bool { value: bool },
    Null,
    Var { name: String },
    Array { items: Vec<Expr> },
    Index { array: Box<Expr>, index: Box<Expr> },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Not { operand: Box<Expr> },
    CountOf { array: Box<Expr> },
    Call {
        name: String,
        #[serde(default)]
        args: Vec<Expr>,
        #[serde(default)]
        span: Span,
    },
}

impl Expr {
    pub fn number(value: f64) -> Self {
        Expr::Number { value }
    }

    pub fn bool(value: bool) -> Self {
        Expr::Bool { value }
    }

    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var { name: name.into() }
    }

    pub fn binary(op: BinOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn not(operand: Expr) -> Self {
        Expr::Not {
            operand: Box::new(operand),
        }
    }

    pub fn index(array: Expr, index: Expr) -> Self {
        Expr::Index {
            array: Box::new(array),
            index: Box::new(index),
        }
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            name: name.into(),
            args,
            span: Span::default(),
        }
    }

    /// Visit every call expression, innermost arguments first
    pub fn for_each_call<'a>(&'a self, f: &mut impl FnMut(&'a str)) {
        match self {
            Expr::Number { .. } | Expr::Bool { .. } | Expr::Null | Expr::Var { .. } => {}
            Expr::Array { items } => items.iter().for_each(|e| e.for_each_call(f)),
            Expr::Index { array, index } => {
                array.for_each_call(f);
                index.for_each_call(f);
            }
            Expr::Binary { left, right, .. } => {
                left.for_each_call(f);
                right.for_each_call(f);
            }
            Expr::Not { operand } => operand.for_each_call(f),
            Expr::CountOf { array } => array.for_each_call(f),
            Expr::Call { name, args, .. } => {
                args.iter().for_each(|e| e.for_each_call(f));
                f(name);
            }
        }
    }

    pub fn contains_call(&self) -> bool {
        let mut found = false;
        self.for_each_call(&mut |_| found = true);
        found
    }

    /// Literals read the same before and after any call
    pub fn is_constant(&self) -> bool {
        matches!(self, Expr::Number { .. } | Expr::Bool { .. } | Expr::Null)
    }

    /// Direct subexpressions in evaluation order
    pub fn operands(&self) -> Vec<&Expr> {
        match self {
            Expr::Number { .. } | Expr::Bool { .. } | Expr::Null | Expr::Var { .. } => Vec::new(),
            Expr::Array { items } => items.iter().collect(),
            Expr::Index { array, index } => vec![array.as_ref(), index.as_ref()],
            Expr::Binary { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            Expr::Not { operand } => vec![operand.as_ref()],
            Expr::CountOf { array } => vec![array.as_ref()],
            Expr::Call { args, .. } => args.iter().collect(),
        }
    }

    /// Operands anywhere in this tree that have to be saved before a later
    /// sibling runs its call
    pub fn saved_operand_count(&self) -> usize {
        let operands = self.operands();
        let nested: usize = operands.iter().map(|e| e.saved_operand_count()).sum();
        nested + saved_in_group(&operands)
    }
}

/// Calls emit their actions ahead of the term that reads their result, so an
/// operand evaluated before a sibling containing a call must be copied out
/// first or it would observe the call's side effects.
pub fn must_save_operand(operand: &Expr, later: &[&Expr]) -> bool {
    !operand.is_constant() && later.iter().any(|e| e.contains_call())
}

fn saved_in_group(group: &[&Expr]) -> usize {
    (0..group.len())
        .filter(|&i| must_save_operand(group[i], &group[i + 1..]))
        .count()
}

/// Visit the expressions each statement evaluates, nested blocks included
pub fn for_each_expr_in<'a>(body: &'a [Stmt], f: &mut impl FnMut(&'a Expr)) {
    for stmt in body {
        match stmt {
            Stmt::Let { value, .. } => f(value),
            Stmt::Assign { index, value, .. } => {
                if let Some(index) = index {
                    f(index);
                }
                f(value);
            }
            Stmt::If {
                condition,
                then,
                otherwise,
            } => {
                f(condition);
                for_each_expr_in(then, f);
                for_each_expr_in(otherwise, f);
            }
            Stmt::While { condition, body } => {
                f(condition);
                for_each_expr_in(body, f);
            }
            Stmt::Return { value: Some(v), .. } => f(v),
            Stmt::Expr { expr } => f(expr),
            Stmt::Bake { enabled, .. } => f(enabled),
            Stmt::Return { value: None, .. }
            | Stmt::Break { .. }
            | Stmt::Continue { .. }
            | Stmt::Wait => {}
        }
    }
}

/// Visit every call expression in a statement list, nested blocks included
pub fn for_each_call_in<'a>(body: &'a [Stmt], f: &mut impl FnMut(&'a str)) {
    for_each_expr_in(body, &mut |expr| expr.for_each_call(&mut *f));
}

/// Operand saves a statement list needs, including an element assignment's
/// index when its value contains a call
pub fn saved_operand_count_in(body: &[Stmt]) -> usize {
    let mut count = 0;
    for_each_expr_in(body, &mut |expr| count += expr.saved_operand_count());
    visit_assignments(body, &mut |index, value| {
        if must_save_operand(index, &[value]) {
            count += 1;
        }
    });
    count
}

fn visit_assignments<'a>(body: &'a [Stmt], f: &mut impl FnMut(&'a Expr, &'a Expr)) {
    for stmt in body {
        match stmt {
            Stmt::Assign {
                index: Some(index),
                value,
                ..
            } => f(index, value),
            Stmt::If { then, otherwise, .. } => {
                visit_assignments(then, f);
                visit_assignments(otherwise, f);
            }
            Stmt::While { body, .. } => visit_assignments(body, f),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_from_toml() {
        let src = r#"
            [[globals]]
            name = "result"

            [[functions]]
            name = "double"
            params = ["x"]
            returns = { kind = "value" }

            [[functions.body]]
            kind = "return"
            value = { kind = "binary", op = "mul", left = { kind = "var", name = "x" }, right = { kind = "number", value = 2.0 } }

            [[rules]]
            name = "main"

            [[rules.body]]
            kind = "assign"
            target = "result"
            value = { kind = "call", name = "double", args = [{ kind = "number", value = 21.0 }] }
        "#;
        let program: Program = toml::from_str(src).unwrap();
        assert_eq!(program.globals, vec![GlobalDecl::global("result")]);
        let double = program.function("double").unwrap();
        assert_eq!(double.returns, ReturnKind::Value { multiple_paths: false });
        assert!(!double.multiple_paths());
        assert_eq!(program.rules[0].scope, VarScope::Global);
        assert!(matches!(program.rules[0].body[0], Stmt::Assign { .. }));
    }

    #[test]
    fn test_for_each_call_visits_nested() {
        let body = vec![
            Stmt::local("a", Expr::call("f", vec![Expr::call("g", vec![])])),
            Stmt::while_loop(
                Expr::call("h", vec![]),
                vec![Stmt::ret(Some(Expr::call("f", vec![])))],
            ),
        ];
        let mut seen = Vec::new();
        for_each_call_in(&body, &mut |name| seen.push(name));
        assert_eq!(seen, vec!["g", "f", "h", "f"]);
    }
}
