//! Control flow lowering.
//!
//! This module lowers structured control flow onto forward skips:
//! - if/else: a conditional skip over the then-branch, an unconditional skip
//!   over the else-branch
//! - while: one `LoopBegin`/`LoopIf(true)` pair with a conditional exit skip
//! - break/continue: unconditional skips bound when the loop closes
//!
//! It also provides the counted and condition-only loop builders used when
//! baking algorithms into a rule.

use crate::backend::target::action::{Action, ModifyOp};
use crate::backend::target::sequence::StartMarker;
use crate::backend::target::term::{BinOp, Term};
use crate::backend::target::vars::IndexReference;
use crate::ir::{Expr, Stmt};

use super::error::{CompileError, CompileResult};
use super::{Compiler, Emitter};

impl<'p> Compiler<'p> {
    /// Compile `if condition { then } else { otherwise }`
    ///
    /// ```text
    ///   skip_if !cond -> else
    ///   <then>
    ///   skip -> end          (only with an else branch)
    /// else:
    ///   <otherwise>
    /// end:
    /// ```
    pub(crate) fn compile_if(
        &mut self,
        condition: &'p Expr,
        then: &'p [Stmt],
        otherwise: &'p [Stmt],
    ) -> CompileResult<()> {
        let condition = self.compile_expr(condition)?;
        let to_else = self.seq.emit_conditional_skip(condition.negate());
        self.compile_scoped_block(then)?;

        if otherwise.is_empty() {
            self.seq.bind_here(to_else)?;
            return Ok(());
        }

        let to_end = self.seq.emit_skip();
        self.seq.bind_here(to_else)?;
        self.compile_scoped_block(otherwise)?;
        self.seq.bind_here(to_end)?;
        Ok(())
    }

    /// Compile `while condition { body }`
    ///
    /// ```text
    ///   loop
    ///     <condition actions>
    ///     skip_if !cond -> break
    ///     <body>
    ///   continue:
    ///   loop_if true
    /// break:
    /// ```
    pub(crate) fn compile_while(&mut self, condition: &'p Expr, body: &'p [Stmt]) -> CompileResult<()> {
        self.context.begin_loop()?;
        self.seq.push(Action::LoopBegin);

        let condition = self.compile_expr(condition)?;
        let exit = self.seq.emit_conditional_skip(condition.negate());
        self.compile_scoped_block(body)?;

        let frame = self.context.end_loop()?;
        let repeat = self.seq.place_end();
        for skip in frame.continue_skips {
            self.seq.bind(skip, repeat)?;
        }
        self.seq.push(Action::LoopIf {
            condition: Term::Bool(true),
        });

        let after = self.seq.place_end();
        self.seq.bind(exit, after)?;
        for skip in frame.break_skips {
            self.seq.bind(skip, after)?;
        }
        Ok(())
    }

    pub(crate) fn compile_break(&mut self) -> CompileResult<()> {
        let skip = self.leave_loop_body(CompileError::BreakOutsideLoop)?;
        if let Some(frame) = self.context.innermost_loop_mut() {
            frame.break_skips.push(skip);
        }
        Ok(())
    }

    pub(crate) fn compile_continue(&mut self) -> CompileResult<()> {
        let skip = self.leave_loop_body(CompileError::ContinueOutsideLoop)?;
        if let Some(frame) = self.context.innermost_loop_mut() {
            frame.continue_skips.push(skip);
        }
        Ok(())
    }

    /// Pop the locals of every scope inside the innermost loop, then skip
    fn leave_loop_body(&mut self, outside: CompileError) -> CompileResult<StartMarker> {
        let depth = self.context.innermost_loop_depth().ok_or(outside)?;
        for local in self.context.frame()?.teardown_from(depth) {
            self.seq.push(local.pop());
        }
        Ok(self.seq.emit_skip())
    }
}

/// `for counter in 0..limit` built from the loop primitive
///
/// ```text
///   set counter = 0
///   skip_if counter >= limit -> exit
///   loop
///     <body>
///     modify counter add 1
///   loop_if counter < limit
/// exit:
/// ```
#[derive(Debug)]
pub struct CountedLoop {
    counter: IndexReference,
    limit: Term,
    exit: StartMarker,
}

impl CountedLoop {
    pub fn begin(em: &mut Emitter<'_>, name: &str, limit: Term) -> CompileResult<Self> {
        let counter = em.assign(name)?;
        em.push(counter.set(Term::number(0)));
        let exit = em
            .seq
            .emit_conditional_skip(Term::binary(BinOp::Ge, counter.get(), limit.clone()));
        em.push(Action::LoopBegin);
        Ok(Self {
            counter,
            limit,
            exit,
        })
    }

    /// Current iteration index
    pub fn value(&self) -> Term {
        self.counter.get()
    }

    pub fn end(self, em: &mut Emitter<'_>) -> CompileResult<()> {
        em.push(self.counter.modify(ModifyOp::Add, Term::number(1)));
        em.push(Action::LoopIf {
            condition: Term::binary(BinOp::Lt, self.counter.get(), self.limit),
        });
        em.seq.bind_here(self.exit)?;
        Ok(())
    }
}

/// Loop repeating while `condition` holds, checked before the first pass
#[derive(Debug)]
pub struct ConditionLoop {
    condition: Term,
    exit: StartMarker,
}

impl ConditionLoop {
    pub fn begin(em: &mut Emitter<'_>, condition: Term) -> Self {
        let exit = em.seq.emit_conditional_skip(condition.clone().negate());
        em.push(Action::LoopBegin);
        Self { condition, exit }
    }

    pub fn end(self, em: &mut Emitter<'_>) -> CompileResult<()> {
        em.push(Action::LoopIf {
            condition: self.condition,
        });
        em.seq.bind_here(self.exit)?;
        Ok(())
    }
}
