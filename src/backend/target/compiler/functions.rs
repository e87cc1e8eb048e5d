//! Call emulation.
//!
//! The target has no calls, so every call site is expanded in place.
//!
//! Non-recursive functions are inlined with fresh parameter and local slots.
//!
//! A recursive function becomes a dispatcher loop per outside call site. Each
//! parameter, and each frame temporary (call results and operands saved
//! ahead of a call), gets a stack slot; a return-address stack records which self-call site to
//! resume:
//!
//! ```text
//!   push args, push 0 per temporary, push EXIT onto return addresses
//!   set resume = EXIT
//!   loop
//!     skip_if resume == 1 -> resume_1       one per self-call site
//!     skip_if resume == 2 -> resume_2
//!     <body>                                 self call k: push frame,
//!                                            push k, skip -> repeat
//!                                            resume_k: copy result
//!   epilogue:
//!     set resume = last(return addresses); pop return addresses
//!     skip_if resume == EXIT -> exit
//!   repeat:
//!   loop_if true
//! exit:
//! ```

use std::iter;

use tracing::debug;

use crate::backend::target::action::Action;
use crate::backend::target::sequence::StartMarker;
use crate::backend::target::term::{BinOp, Term};
use crate::backend::target::vars::{IndexReference, RecursiveIndexReference};
use crate::ir::{self, Expr, Function};

use super::context::{Frame, LocalVar};
use super::error::{CompileError, CompileResult};
use super::returns::{FunctionReturnHandler, ReturnHandler};
use super::Compiler;

/// Return address meaning "leave the dispatcher"
const EXIT_ADDRESS: f64 = 0.0;

/// Dispatcher bookkeeping for one recursive function instance
#[derive(Debug)]
pub struct RecursionState {
    params: Vec<RecursiveIndexReference>,
    /// Call results and saved operands, one stack per use in the body
    temps: Vec<RecursiveIndexReference>,
    next_temp: usize,
    return_addresses: RecursiveIndexReference,
    resume: IndexReference,
    /// Dispatch skip of self-call site `k` at index `k - 1`
    dispatch: Vec<StartMarker>,
    next_site: usize,
    /// Self-call skips to the repeat point
    repeat_skips: Vec<StartMarker>,
}

impl RecursionState {
    fn take_temp(&mut self, function: &str) -> CompileResult<RecursiveIndexReference> {
        let temp = self
            .temps
            .get(self.next_temp)
            .cloned()
            .ok_or_else(|| CompileError::FrameLayout {
                function: function.to_string(),
            })?;
        self.next_temp += 1;
        Ok(temp)
    }
}

/// Frame temporaries a body needs (one per call expression plus one per
/// saved operand), and how many of the calls target `name`
fn scan_calls(body: &[ir::Stmt], name: &str) -> (usize, usize) {
    let mut calls = Vec::new();
    ir::for_each_call_in(body, &mut |callee| calls.push(callee));
    let self_calls = calls.iter().filter(|&&callee| callee == name).count();
    (calls.len() + ir::saved_operand_count_in(body), self_calls)
}

impl<'p> Compiler<'p> {
    /// Compile a call expression to the term holding its result
    pub(crate) fn compile_call(&mut self, name: &str, args: &'p [Expr]) -> CompileResult<Term> {
        let function = self
            .program
            .function(name)
            .ok_or_else(|| CompileError::UnknownFunction(name.to_string()))?;
        if function.params.len() != args.len() {
            return Err(CompileError::InvalidArity {
                function: name.to_string(),
                expected: function.params.len(),
                got: args.len(),
            });
        }

        let result = if !function.recursive {
            if self.context.is_generating(name) {
                return Err(CompileError::UndeclaredRecursion {
                    function: name.to_string(),
                });
            }
            self.inline_call(function, args)?
        } else if self.context.current_function() == Some(name) && self.context.frame()?.is_recursive() {
            self.compile_self_call(function, args)?
        } else if self.context.is_generating(name) {
            return Err(CompileError::MutualRecursion {
                function: name.to_string(),
                caller: self.context.current_function().unwrap_or_default().to_string(),
            });
        } else {
            self.expand_recursive(function, args)?
        };

        self.preserve_call_result(result)
    }

    /// Inside a recursive frame, park a call's result in the frame's
    /// temporary so deeper recursion cannot overwrite it.
    fn preserve_call_result(&mut self, result: Term) -> CompileResult<Term> {
        match self.take_frame_temp()? {
            Some(temp) => {
                self.seq.push(temp.set(result));
                Ok(temp.get())
            }
            None => Ok(result),
        }
    }

    /// Copy an operand's current value out before a sibling call can change
    /// what it reads. Recursive frames use a frame temporary, everything else
    /// a fresh slot.
    pub(crate) fn save_operand(&mut self, value: Term) -> CompileResult<Term> {
        if let Some(temp) = self.take_frame_temp()? {
            self.seq.push(temp.set(value));
            return Ok(temp.get());
        }
        let frame = self.context.frame()?;
        let name = match &frame.function {
            Some(function) => format!("{}_operand", function),
            None => "operand".to_string(),
        };
        let slot = self.vars.assign(&name, frame.var_scope)?;
        self.seq.push(slot.set(value));
        Ok(slot.get())
    }

    fn take_frame_temp(&mut self) -> CompileResult<Option<RecursiveIndexReference>> {
        let frame = self.context.frame_mut()?;
        let function = frame.function.clone().unwrap_or_default();
        frame
            .recursion
            .as_mut()
            .map(|state| state.take_temp(&function))
            .transpose()
    }

    fn inline_call(&mut self, function: &'p Function, args: &'p [Expr]) -> CompileResult<Term> {
        let args = self.compile_args(args)?;
        let scope = self.context.frame()?.var_scope;
        debug!(function = %function.name, depth = self.context.depth(), "inlining call");

        let handler = FunctionReturnHandler::new(
            &mut self.vars,
            &function.name,
            scope,
            function.returns.returns_value() && function.multiple_paths(),
        )?;
        self.context.push_frame(Frame::new(
            Some(function.name.clone()),
            scope,
            ReturnHandler::Function(handler),
            None,
        ));

        for (param, arg) in function.params.iter().zip(args) {
            let slot = self.vars.assign(&format!("{}_{}", function.name, param), scope)?;
            self.seq.push(slot.set(arg));
            self.context.declare(param, LocalVar::Static(slot), true)?;
        }
        self.compile_block(&function.body)?;

        let mut frame = self.context.pop_frame()?;
        frame.handler.finalize(&mut self.seq)?;
        frame.handler.returned_value()
    }

    /// Expand an outside call of a recursive function into its dispatcher loop
    fn expand_recursive(&mut self, function: &'p Function, args: &'p [Expr]) -> CompileResult<Term> {
        let args = self.compile_args(args)?;
        let scope = self.context.frame()?.var_scope;
        let name = function.name.as_str();
        let (temp_count, site_count) = scan_calls(&function.body, name);
        debug!(function = name, sites = site_count, temporaries = temp_count, "expanding recursive call");

        let params = function
            .params
            .iter()
            .map(|p| self.vars.assign_recursive(&format!("{}_{}", name, p), scope))
            .collect::<CompileResult<Vec<_>>>()?;
        let temps = (0..temp_count)
            .map(|i| self.vars.assign_recursive(&format!("{}_temp{}", name, i), scope))
            .collect::<CompileResult<Vec<_>>>()?;
        let return_addresses = self
            .vars
            .assign_recursive(&format!("{}_return_address", name), scope)?;
        let resume = self.vars.assign(&format!("{}_resume", name), scope)?;

        let mut handler =
            FunctionReturnHandler::new(&mut self.vars, name, scope, function.returns.returns_value())?;
        handler
            .additional_pop_on_return()
            .extend(params.iter().chain(&temps).cloned());

        // Fresh stacks holding only the outermost frame
        for stack in params.iter().chain(&temps).chain(iter::once(&return_addresses)) {
            self.seq.push(stack.reset());
        }
        for (param, arg) in params.iter().zip(args) {
            self.seq.push(param.push(arg));
        }
        for temp in &temps {
            self.seq.push(temp.push(Term::number(0)));
        }
        self.seq.push(return_addresses.push(Term::Number(EXIT_ADDRESS)));
        self.seq.push(resume.set(Term::Number(EXIT_ADDRESS)));

        self.seq.push(Action::LoopBegin);
        let dispatch = (1..=site_count)
            .map(|site| {
                self.seq.emit_conditional_skip(Term::binary(
                    BinOp::Eq,
                    resume.get(),
                    Term::number(site as f64),
                ))
            })
            .collect();

        self.context.push_frame(Frame::new(
            Some(name.to_string()),
            scope,
            ReturnHandler::Function(handler),
            Some(RecursionState {
                params: params.clone(),
                temps,
                next_temp: 0,
                return_addresses,
                resume,
                dispatch,
                next_site: 0,
                repeat_skips: Vec::new(),
            }),
        ));
        for (param, stack) in function.params.iter().zip(params) {
            self.context.declare(param, LocalVar::Recursive(stack), false)?;
        }

        self.compile_block(&function.body)?;

        // Falling off the end of the body returns without a value
        let frame = self.context.frame_mut()?;
        let teardown = frame.teardown_from(0);
        frame.handler.return_control(&mut self.seq, &teardown, true)?;

        let mut frame = self.context.pop_frame()?;
        frame.handler.finalize(&mut self.seq)?;
        let result = frame.handler.returned_value()?;
        let state = frame.recursion.take().ok_or_else(|| CompileError::FrameLayout {
            function: name.to_string(),
        })?;
        if state.next_site != site_count || state.next_temp != temp_count {
            return Err(CompileError::FrameLayout {
                function: name.to_string(),
            });
        }

        self.seq.push(state.resume.set(state.return_addresses.get()));
        self.seq.push(state.return_addresses.pop());
        let exit = self.seq.emit_conditional_skip(Term::binary(
            BinOp::Eq,
            state.resume.get(),
            Term::Number(EXIT_ADDRESS),
        ));
        let repeat = self.seq.place_end();
        for skip in state.repeat_skips {
            self.seq.bind(skip, repeat)?;
        }
        self.seq.push(Action::LoopIf {
            condition: Term::Bool(true),
        });
        self.seq.bind_here(exit)?;
        Ok(result)
    }

    /// A recursive function calling itself: push a frame and jump back to the
    /// dispatcher head, resuming after the call once the callee returns.
    fn compile_self_call(&mut self, function: &'p Function, args: &'p [Expr]) -> CompileResult<Term> {
        let args = self.compile_args(args)?;
        let scope = self.context.frame()?.var_scope;
        let name = function.name.as_str();

        // Arguments may read the current frame, so stage them before pushing
        let mut staged = Vec::with_capacity(args.len());
        for (i, arg) in args.into_iter().enumerate() {
            let slot = self.vars.assign(&format!("{}_arg{}", name, i), scope)?;
            self.seq.push(slot.set(arg));
            staged.push(slot);
        }

        let frame = self.context.frame_mut()?;
        let layout_error = || CompileError::FrameLayout {
            function: name.to_string(),
        };
        let state = frame.recursion.as_mut().ok_or_else(layout_error)?;
        for (param, slot) in state.params.iter().zip(&staged) {
            self.seq.push(param.push(slot.get()));
        }
        for temp in &state.temps {
            self.seq.push(temp.push(Term::number(0)));
        }

        state.next_site += 1;
        let site = state.next_site;
        let dispatch = state.dispatch.get(site - 1).copied().ok_or_else(layout_error)?;
        self.seq.push(state.return_addresses.push(Term::number(site as f64)));
        self.seq.push(state.resume.set(Term::Number(EXIT_ADDRESS)));
        state.repeat_skips.push(self.seq.emit_skip());

        let resume_point = self.seq.place_end();
        self.seq.bind(dispatch, resume_point)?;
        frame.handler.returned_value()
    }
}
