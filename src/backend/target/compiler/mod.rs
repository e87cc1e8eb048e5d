//! Action-list compiler for flatline programs
//!
//! This module lowers validated [`Program`]s to one [`ActionList`] per rule.
//! The compiler handles:
//! - Locals, globals and element assignment
//! - `if`/`while`/`break`/`continue` via skip markers (see `control_flow`)
//! - Function calls: inlined per call site, or expanded to a dispatcher loop
//!   with explicit frame stacks for recursive functions (see `functions`)
//! - `return` through per-invocation return handlers (see `returns`)
//! - Baking graph searches into the loop construct (see `crate::backend::pathfind`)

pub(crate) mod context;
pub(crate) mod control_flow;
pub mod error;
pub(crate) mod functions;
pub mod returns;

#[cfg(test)]
mod tests;

use std::collections::HashMap;

use tracing::debug;

use crate::backend::pathfind::{self, Dijkstra, Pathmap};
use crate::config::CompilerConfig;
use crate::ir::{self, Expr, Program, Rule, Stmt};

use super::action::Action;
use super::sequence::{ActionList, ActionSequence};
use super::term::Term;
use super::vars::{IndexReference, Slot, VarCollection, VarScope};

pub use context::{CompileContext, Frame, LocalVar};
pub use control_flow::{ConditionLoop, CountedLoop};
pub use error::{CompileError, CompileResult};
pub use returns::{FunctionReturnHandler, ReturnHandler, ReturnState, RuleReturnHandler};

/// Mutable generation state handed to emitters outside the statement compiler
pub struct Emitter<'a> {
    pub seq: &'a mut ActionSequence,
    pub vars: &'a mut VarCollection,
    /// Bank for any slot the emitter allocates
    pub scope: VarScope,
}

impl Emitter<'_> {
    pub fn push(&mut self, action: Action) -> usize {
        self.seq.push(action)
    }

    pub fn assign(&mut self, name: &str) -> CompileResult<IndexReference> {
        self.vars.assign(name, self.scope)
    }
}

/// A compiled rule
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledRule {
    pub name: String,
    pub scope: VarScope,
    pub actions: ActionList,
}

/// Output of generation for a whole program
#[derive(Debug, Clone)]
pub struct CompiledProgram {
    pub rules: Vec<CompiledRule>,
    pub variables: VarCollection,
    globals: HashMap<String, Slot>,
    bindings: HashMap<String, Term>,
}

impl CompiledProgram {
    pub fn rule(&self, name: &str) -> Option<&CompiledRule> {
        self.rules.iter().find(|r| r.name == name)
    }

    /// Slot of a declared program global
    pub fn global(&self, name: &str) -> Option<Slot> {
        self.globals.get(name).copied()
    }

    /// Live expression bound to `name`, such as a bake's progress
    pub fn binding(&self, name: &str) -> Option<&Term> {
        self.bindings.get(name)
    }

    pub fn disassemble(&self) -> String {
        self.rules
            .iter()
            .map(|r| r.actions.disassemble())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Statement compiler
pub struct Compiler<'p> {
    program: &'p Program,
    config: &'p CompilerConfig,
    /// The rule being built
    pub(crate) seq: ActionSequence,
    pub(crate) context: CompileContext,
    pub(crate) vars: VarCollection,
    globals: HashMap<String, IndexReference>,
    /// Read-only names for live terms, visible from the point they are bound
    bindings: HashMap<String, Term>,
}

impl<'p> Compiler<'p> {
    /// Create a compiler and allocate the program's globals
    pub fn new(program: &'p Program, config: &'p CompilerConfig) -> CompileResult<Self> {
        let mut vars = VarCollection::new(config.variables.max_global, config.variables.max_entity);
        let mut globals = HashMap::with_capacity(program.globals.len());
        for decl in &program.globals {
            let reference = vars.assign(&decl.name, decl.scope)?;
            globals.insert(decl.name.clone(), reference);
        }
        Ok(Self {
            program,
            config,
            seq: ActionSequence::new(""),
            context: CompileContext::new(),
            vars,
            globals,
            bindings: HashMap::new(),
        })
    }

    /// Compile one rule into a finished action list
    pub fn compile_rule(&mut self, rule: &'p Rule) -> CompileResult<CompiledRule> {
        debug!(rule = %rule.name, "compiling rule");
        self.seq = ActionSequence::new(rule.name.clone());
        self.context = CompileContext::new();
        self.context.push_frame(Frame::new(
            None,
            rule.scope,
            ReturnHandler::Rule(RuleReturnHandler::new(&rule.name)),
            None,
        ));

        self.compile_block(&rule.body)?;
        self.context.pop_frame()?;

        let seq = std::mem::replace(&mut self.seq, ActionSequence::new(""));
        let actions = seq.finish()?;
        debug!(rule = %rule.name, actions = actions.len(), skips = actions.bindings().len(), "compiled rule");
        Ok(CompiledRule {
            name: rule.name.clone(),
            scope: rule.scope,
            actions,
        })
    }

    /// Hand over the compiled rules together with the slot table
    pub fn finish(self, rules: Vec<CompiledRule>) -> CompiledProgram {
        CompiledProgram {
            rules,
            variables: self.vars,
            globals: self
                .globals
                .into_iter()
                .map(|(name, r)| (name, r.slot()))
                .collect(),
            bindings: self.bindings,
        }
    }

    pub(crate) fn compile_block(&mut self, body: &'p [Stmt]) -> CompileResult<()> {
        for stmt in body {
            self.compile_stmt(stmt)?;
        }
        Ok(())
    }

    /// Compile a block in its own scope, popping its recursive locals at the end
    pub(crate) fn compile_scoped_block(&mut self, body: &'p [Stmt]) -> CompileResult<()> {
        self.context.begin_scope()?;
        self.compile_block(body)?;
        for local in self.context.end_scope()? {
            self.seq.push(local.pop());
        }
        Ok(())
    }

    fn compile_stmt(&mut self, stmt: &'p Stmt) -> CompileResult<()> {
        match stmt {
            Stmt::Let { name, value } => self.compile_let(name, value),
            Stmt::Assign {
                target,
                index,
                value,
            } => self.compile_assign(target, index.as_ref(), value),
            Stmt::If {
                condition,
                then,
                otherwise,
            } => self.compile_if(condition, then, otherwise),
            Stmt::While { condition, body } => self.compile_while(condition, body),
            Stmt::Break { .. } => self.compile_break(),
            Stmt::Continue { .. } => self.compile_continue(),
            Stmt::Return { value, .. } => self.compile_return(value.as_ref()),
            Stmt::Expr { expr } => self.compile_expr(expr).map(|_| ()),
            Stmt::Wait => {
                self.seq.push(Action::Wait);
                Ok(())
            }
            Stmt::Bake {
                result,
                nodes,
                segments,
                attributes,
                enabled,
                progress,
                progress_snapshot,
            } => {
                let graph = Pathmap::new(
                    self.read_var(nodes)?,
                    self.read_var(segments)?,
                    self.read_var(attributes)?,
                );
                self.compile_bake(
                    result,
                    graph,
                    enabled,
                    progress.as_deref(),
                    progress_snapshot.as_deref(),
                )
            }
        }
    }

    fn compile_let(&mut self, name: &str, value: &'p Expr) -> CompileResult<()> {
        let value = self.compile_expr(value)?;
        let frame = self.context.frame()?;
        let scope = frame.var_scope;
        let slot_name = match &frame.function {
            Some(function) => format!("{}_{}", function, name),
            None => name.to_string(),
        };

        let local = if frame.is_recursive() {
            let stack = self.vars.assign_recursive(&slot_name, scope)?;
            self.seq.push(stack.push(value));
            LocalVar::Recursive(stack)
        } else {
            let slot = self.vars.assign(&slot_name, scope)?;
            self.seq.push(slot.set(value));
            LocalVar::Static(slot)
        };
        self.context.declare(name, local, true)
    }

    fn compile_assign(
        &mut self,
        target: &str,
        index: Option<&'p Expr>,
        value: &'p Expr,
    ) -> CompileResult<()> {
        let (index, value) = match index {
            Some(index) => {
                let (index, value) = self.compile_pair(index, value)?;
                (Some(index), value)
            }
            None => (None, self.compile_expr(value)?),
        };
        let target = self.resolve_target(target)?;
        let action = match index {
            Some(index) => target.set_at(index, value),
            None => target.set(value),
        };
        self.seq.push(action);
        Ok(())
    }

    fn compile_return(&mut self, value: Option<&'p Expr>) -> CompileResult<()> {
        let value = value.map(|v| self.compile_expr(v)).transpose()?;
        let frame = self.context.frame_mut()?;
        if let Some(value) = value {
            frame.handler.return_value(&mut self.seq, value)?;
        }
        let teardown = frame.teardown_from(0);
        let recursive = frame.is_recursive();
        frame.handler.return_control(&mut self.seq, &teardown, recursive)
    }

    fn compile_bake(
        &mut self,
        result: &str,
        graph: Pathmap,
        enabled: &'p Expr,
        progress: Option<&str>,
        snapshot: Option<&str>,
    ) -> CompileResult<()> {
        let enabled = self.compile_expr(enabled)?;
        let result = self.resolve_target(result)?;
        let snapshot = snapshot.map(|p| self.resolve_target(p)).transpose()?;
        if let Some(name) = progress {
            if self.is_bound_name(name) {
                return Err(CompileError::DuplicateBinding(name.to_string()));
            }
        }
        let scope = self.context.frame()?.var_scope;
        let yield_interval = self.config.bake.yield_interval;

        let mut em = Emitter {
            seq: &mut self.seq,
            vars: &mut self.vars,
            scope,
        };
        let algorithm = Dijkstra::new(&mut em)?;
        let output = pathfind::bake(&mut em, &graph, enabled, algorithm, snapshot.as_ref(), yield_interval)?;
        em.push(result.set(output.bakemap.to_term()));

        if let Some(name) = progress {
            debug!(binding = name, "bound bake progress");
            self.bindings.insert(name.to_string(), output.progress);
        }
        Ok(())
    }

    /// Compile an expression to the term that reads its value.
    ///
    /// Calls emit their actions first, so the returned term is only valid
    /// right after them. Operands are observed left to right: one followed by
    /// a call is copied out before the call's actions.
    pub(crate) fn compile_expr(&mut self, expr: &'p Expr) -> CompileResult<Term> {
        Ok(match expr {
            Expr::Number { value } => Term::Number(*value),
            Expr::Bool { value } => Term::Bool(*value),
            Expr::Null => Term::Null,
            Expr::Var { name } => self.read_var(name)?,
            Expr::Array { items } => Term::Array(self.compile_args(items)?),
            Expr::Index { array, index } => {
                let (array, index) = self.compile_pair(array, index)?;
                array.index(index)
            }
            Expr::Binary { op, left, right } => {
                let (left, right) = self.compile_pair(left, right)?;
                Term::binary(*op, left, right)
            }
            Expr::Not { operand } => Term::not(self.compile_expr(operand)?),
            Expr::CountOf { array } => self.compile_expr(array)?.count_of(),
            Expr::Call { name, args, .. } => self.compile_call(name, args)?,
        })
    }

    pub(crate) fn compile_args(&mut self, args: &'p [Expr]) -> CompileResult<Vec<Term>> {
        let mut terms = Vec::with_capacity(args.len());
        for (i, arg) in args.iter().enumerate() {
            let term = self.compile_expr(arg)?;
            let later: Vec<&Expr> = args[i + 1..].iter().collect();
            terms.push(if ir::must_save_operand(arg, &later) {
                self.save_operand(term)?
            } else {
                term
            });
        }
        Ok(terms)
    }

    fn compile_pair(&mut self, first: &'p Expr, second: &'p Expr) -> CompileResult<(Term, Term)> {
        let mut first_term = self.compile_expr(first)?;
        if ir::must_save_operand(first, &[second]) {
            first_term = self.save_operand(first_term)?;
        }
        Ok((first_term, self.compile_expr(second)?))
    }

    /// Local in the current frame, else a binding, else a program global
    fn read_var(&self, name: &str) -> CompileResult<Term> {
        if self.context.resolve(name).is_none() {
            if let Some(term) = self.bindings.get(name) {
                return Ok(term.clone());
            }
        }
        Ok(self.resolve_target(name)?.get())
    }

    /// Writable variable: local in the current frame, else a program global
    fn resolve_target(&self, name: &str) -> CompileResult<LocalVar> {
        if let Some(local) = self.context.resolve(name) {
            return Ok(local);
        }
        if self.bindings.contains_key(name) {
            return Err(CompileError::ReadOnlyBinding(name.to_string()));
        }
        self.globals
            .get(name)
            .map(|g| LocalVar::Static(g.clone()))
            .ok_or_else(|| CompileError::UnknownVariable(name.to_string()))
    }

    fn is_bound_name(&self, name: &str) -> bool {
        self.bindings.contains_key(name) || self.globals.contains_key(name)
    }
}

/// Generate every rule of an already validated program
pub fn generate(program: &Program, config: &CompilerConfig) -> CompileResult<CompiledProgram> {
    let mut compiler = Compiler::new(program, config)?;
    let rules = program
        .rules
        .iter()
        .map(|rule| compiler.compile_rule(rule))
        .collect::<CompileResult<Vec<_>>>()?;
    Ok(compiler.finish(rules))
}
