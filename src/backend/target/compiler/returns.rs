//! Return handling
//!
//! Every function invocation gets its own [`ReturnHandler`]. A `return`
//! statement is split in two:
//!
//! - [`ReturnHandler::return_value`] captures the value;
//! - [`ReturnHandler::return_control`] tears down the frame and skips to the
//!   epilogue.
//!
//! [`ReturnHandler::finalize`] places the epilogue and binds every pending
//! return skip to it. Rules have no caller, so their handler turns `return`
//! into `Abort` and refuses value operations.

use tracing::trace;

use crate::backend::target::action::Action;
use crate::backend::target::sequence::{ActionSequence, StartMarker};
use crate::backend::target::term::Term;
use crate::backend::target::vars::{
    IndexReference, RecursiveIndexReference, VarCollection, VarScope,
};

use super::error::{CompileError, CompileResult};

/// Lifecycle of a function return handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnState {
    NoReturnYet,
    ReturnSeen,
    Finalized,
}

/// Return handling for one function invocation
#[derive(Debug)]
pub struct FunctionReturnHandler {
    function: String,
    multiple_paths: bool,
    /// Shared slot written by every returning path (multiple paths only)
    return_store: Option<IndexReference>,
    /// Term captured by the single returning path
    returning_value: Option<Term>,
    state: ReturnState,
    return_skips: Vec<StartMarker>,
    /// Frame stacks popped on every return (parameters, call temporaries)
    additional_pop_on_return: Vec<RecursiveIndexReference>,
}

impl FunctionReturnHandler {
    pub fn new(
        vars: &mut VarCollection,
        function: &str,
        scope: VarScope,
        multiple_paths: bool,
    ) -> CompileResult<Self> {
        let return_store = if multiple_paths {
            Some(vars.assign(&format!("_{}ReturnValue", function), scope)?)
        } else {
            None
        };
        Ok(Self {
            function: function.to_string(),
            multiple_paths,
            return_store,
            returning_value: None,
            state: ReturnState::NoReturnYet,
            return_skips: Vec::new(),
            additional_pop_on_return: Vec::new(),
        })
    }

    pub fn state(&self) -> ReturnState {
        self.state
    }

    pub fn additional_pop_on_return(&mut self) -> &mut Vec<RecursiveIndexReference> {
        &mut self.additional_pop_on_return
    }

    fn ensure_open(&self) -> CompileResult<()> {
        if self.state == ReturnState::Finalized {
            return Err(CompileError::HandlerFinalized {
                function: self.function.clone(),
            });
        }
        Ok(())
    }

    fn return_value(&mut self, seq: &mut ActionSequence, value: Term) -> CompileResult<()> {
        self.ensure_open()?;
        match &self.return_store {
            Some(store) => {
                seq.push(store.set(value));
            }
            None => {
                if self.returning_value.is_some() {
                    return Err(CompileError::MultipleReturnValues {
                        function: self.function.clone(),
                    });
                }
                self.returning_value = Some(value);
            }
        }
        self.state = ReturnState::ReturnSeen;
        Ok(())
    }

    fn return_control(
        &mut self,
        seq: &mut ActionSequence,
        teardown: &[RecursiveIndexReference],
        recursive: bool,
    ) -> CompileResult<()> {
        self.ensure_open()?;
        if recursive {
            for local in teardown {
                seq.push(local.pop());
            }
            for stack in &self.additional_pop_on_return {
                seq.push(stack.pop());
            }
        }
        self.return_skips.push(seq.emit_skip());
        Ok(())
    }

    fn finalize(&mut self, seq: &mut ActionSequence) -> CompileResult<()> {
        self.ensure_open()?;
        let epilogue = seq.place_end();
        for skip in self.return_skips.drain(..) {
            seq.bind(skip, epilogue)?;
        }
        trace!(target: "flatline::returns", function = %self.function, position = epilogue.position(), "placed epilogue");
        self.state = ReturnState::Finalized;
        Ok(())
    }

    fn returned_value(&self) -> Term {
        match (&self.return_store, &self.returning_value) {
            (Some(store), _) => store.get(),
            (None, Some(value)) => value.clone(),
            (None, None) => Term::Null,
        }
    }

    pub fn multiple_paths(&self) -> bool {
        self.multiple_paths
    }
}

/// Return handling for a rule body
#[derive(Debug)]
pub struct RuleReturnHandler {
    rule: String,
}

impl RuleReturnHandler {
    pub fn new(rule: &str) -> Self {
        Self {
            rule: rule.to_string(),
        }
    }

    pub fn rule(&self) -> &str {
        &self.rule
    }
}

#[derive(Debug)]
pub enum ReturnHandler {
    Function(FunctionReturnHandler),
    Rule(RuleReturnHandler),
}

impl ReturnHandler {
    /// Capture the value of a `return` statement
    pub fn return_value(&mut self, seq: &mut ActionSequence, value: Term) -> CompileResult<()> {
        match self {
            ReturnHandler::Function(h) => h.return_value(seq, value),
            ReturnHandler::Rule(_) => Err(CompileError::UnsupportedInRule("returning a value")),
        }
    }

    /// Leave the current invocation.
    ///
    /// Inside a recursive function `teardown` lists the live frame-scoped
    /// locals; each is popped, followed by the handler's additional pops.
    pub fn return_control(
        &mut self,
        seq: &mut ActionSequence,
        teardown: &[RecursiveIndexReference],
        recursive: bool,
    ) -> CompileResult<()> {
        match self {
            ReturnHandler::Function(h) => h.return_control(seq, teardown, recursive),
            ReturnHandler::Rule(_) => {
                seq.push(Action::Abort);
                Ok(())
            }
        }
    }

    /// Place the epilogue and bind all return skips to it
    pub fn finalize(&mut self, seq: &mut ActionSequence) -> CompileResult<()> {
        match self {
            ReturnHandler::Function(h) => h.finalize(seq),
            ReturnHandler::Rule(_) => Err(CompileError::UnsupportedInRule("applying return skips")),
        }
    }

    /// Term to use at the call site.
    ///
    /// Void functions that never returned a value yield null.
    pub fn returned_value(&self) -> CompileResult<Term> {
        match self {
            ReturnHandler::Function(h) => Ok(h.returned_value()),
            ReturnHandler::Rule(_) => Err(CompileError::UnsupportedInRule("reading the returned value")),
        }
    }

    pub fn as_function_mut(&mut self) -> Option<&mut FunctionReturnHandler> {
        match self {
            ReturnHandler::Function(h) => Some(h),
            ReturnHandler::Rule(_) => None,
        }
    }
}
