//! Return and loop-control validation
//!
//! Runs over the program tree before generation and collects user-facing
//! diagnostics without stopping at the first one. Generation is only
//! attempted when no error was reported, so the generator can treat the
//! problems caught here as internal defects.

use std::fmt;

use crate::ir::{Expr, Function, Program, ReturnKind, Rule, Span, Stmt};

pub const MUST_RETURN_VALUE: &str = "Must return a value.";
pub const MORE_THAN_ONE_RETURN: &str =
    "Cannot have more than one return statement if the function's return type is constant.";
pub const NOT_ALL_PATHS_RETURN: &str = "Not all code paths return a value.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub span: Span,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>, span: Span) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            span,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}: {}", self.severity, self.span, self.message)
    }
}

/// Per-body return checker
struct ReturnValidator<'d> {
    /// Name used in the "is void" message
    owner: String,
    must_return_value: bool,
    allow_multiple: bool,
    return_found: bool,
    loop_depth: usize,
    diagnostics: &'d mut Vec<Diagnostic>,
}

impl<'d> ReturnValidator<'d> {
    fn for_function(function: &Function, diagnostics: &'d mut Vec<Diagnostic>) -> Self {
        Self {
            owner: function.name.clone(),
            must_return_value: function.returns.returns_value(),
            allow_multiple: function.multiple_paths(),
            return_found: false,
            loop_depth: 0,
            diagnostics,
        }
    }

    fn for_rule(rule: &Rule, diagnostics: &'d mut Vec<Diagnostic>) -> Self {
        Self {
            owner: rule.name.clone(),
            must_return_value: false,
            allow_multiple: true,
            return_found: false,
            loop_depth: 0,
            diagnostics,
        }
    }

    fn error(&mut self, message: impl Into<String>, span: Span) {
        self.diagnostics.push(Diagnostic::error(message, span));
    }

    fn validate_return(&mut self, value: Option<&Expr>, span: Span) {
        if !self.must_return_value {
            if value.is_some() {
                let message = format!("{} is void, so no value can be returned.", self.owner);
                self.error(message, span);
            }
            return;
        }
        if value.is_none() {
            self.error(MUST_RETURN_VALUE, span);
            return;
        }
        if !self.allow_multiple && self.return_found {
            self.error(MORE_THAN_ONE_RETURN, span);
            return;
        }
        self.return_found = true;
    }

    fn visit_block(&mut self, body: &[Stmt]) {
        for stmt in body {
            self.visit(stmt);
        }
    }

    fn visit(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Return { value, span } => self.validate_return(value.as_ref(), *span),
            Stmt::If { then, otherwise, .. } => {
                self.visit_block(then);
                self.visit_block(otherwise);
            }
            Stmt::While { body, .. } => {
                self.loop_depth += 1;
                self.visit_block(body);
                self.loop_depth -= 1;
            }
            Stmt::Break { span } if self.loop_depth == 0 => {
                self.error("'break' is only valid inside a loop.", *span)
            }
            Stmt::Continue { span } if self.loop_depth == 0 => {
                self.error("'continue' is only valid inside a loop.", *span)
            }
            _ => {}
        }
    }
}

/// Whether control can never fall off the end of `body`
fn always_returns(body: &[Stmt]) -> bool {
    body.iter().any(|stmt| match stmt {
        Stmt::Return { .. } => true,
        Stmt::If { then, otherwise, .. } => always_returns(then) && always_returns(otherwise),
        _ => false,
    })
}

/// Validate every function and rule, collecting all diagnostics
pub fn validate(program: &Program) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    for function in &program.functions {
        let mut validator = ReturnValidator::for_function(function, &mut diagnostics);
        validator.visit_block(&function.body);
        if matches!(function.returns, ReturnKind::Value { .. }) && !always_returns(&function.body) {
            diagnostics.push(Diagnostic::error(NOT_ALL_PATHS_RETURN, function.span));
        }
    }
    for rule in &program.rules {
        ReturnValidator::for_rule(rule, &mut diagnostics).visit_block(&rule.body);
    }
    diagnostics
}
