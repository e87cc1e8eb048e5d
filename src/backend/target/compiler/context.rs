//! Compilation context for tracking frames, scopes and loops.
//!
//! A frame is pushed for the rule being compiled and for every function
//! invocation generated into it (inlined or recursive). Each frame owns its
//! lexical scopes, its enclosing loops and its return handler.

use crate::backend::target::action::Action;
use crate::backend::target::sequence::StartMarker;
use crate::backend::target::term::Term;
use crate::backend::target::vars::{IndexReference, RecursiveIndexReference, VarScope};

use super::error::{CompileError, CompileResult};
use super::functions::RecursionState;
use super::returns::ReturnHandler;

/// Storage backing a named local
#[derive(Debug, Clone, PartialEq)]
pub enum LocalVar {
    /// One slot for the whole invocation
    Static(IndexReference),
    /// One stack element per active recursive frame
    Recursive(RecursiveIndexReference),
}

impl LocalVar {
    pub fn get(&self) -> Term {
        match self {
            LocalVar::Static(r) => r.get(),
            LocalVar::Recursive(r) => r.get(),
        }
    }

    pub fn set(&self, value: Term) -> Action {
        match self {
            LocalVar::Static(r) => r.set(value),
            LocalVar::Recursive(r) => r.set(value),
        }
    }

    pub fn set_at(&self, index: Term, value: Term) -> Action {
        match self {
            LocalVar::Static(r) => r.set_at(index, value),
            LocalVar::Recursive(r) => r.set_at(index, value),
        }
    }
}

#[derive(Debug)]
struct ScopeEntry {
    name: String,
    var: LocalVar,
    /// Popped when the scope is left; parameters are popped by the handler
    pop_on_exit: bool,
}

#[derive(Debug, Default)]
struct Scope {
    entries: Vec<ScopeEntry>,
}

/// An enclosing `while` and the skips waiting for its ends
#[derive(Debug)]
pub struct LoopFrame {
    /// Scope depth outside the loop body
    pub scope_depth: usize,
    pub break_skips: Vec<StartMarker>,
    pub continue_skips: Vec<StartMarker>,
}

/// One rule or function invocation being generated
#[derive(Debug)]
pub struct Frame {
    /// Function name; `None` for the rule itself
    pub function: Option<String>,
    pub var_scope: VarScope,
    pub handler: ReturnHandler,
    pub recursion: Option<RecursionState>,
    scopes: Vec<Scope>,
    loops: Vec<LoopFrame>,
}

impl Frame {
    pub fn new(
        function: Option<String>,
        var_scope: VarScope,
        handler: ReturnHandler,
        recursion: Option<RecursionState>,
    ) -> Self {
        Self {
            function,
            var_scope,
            handler,
            recursion,
            scopes: vec![Scope::default()],
            loops: Vec::new(),
        }
    }

    pub fn is_recursive(&self) -> bool {
        self.recursion.is_some()
    }

    /// Frame-scoped locals declared at depth `depth` or deeper, most recent
    /// first. Only recursive storage needs tearing down.
    pub fn teardown_from(&self, depth: usize) -> Vec<RecursiveIndexReference> {
        self.scopes
            .iter()
            .skip(depth)
            .flat_map(|s| s.entries.iter())
            .rev()
            .filter(|e| e.pop_on_exit)
            .filter_map(|e| match &e.var {
                LocalVar::Recursive(r) => Some(r.clone()),
                LocalVar::Static(_) => None,
            })
            .collect()
    }
}

/// Stack of frames being generated
#[derive(Debug, Default)]
pub struct CompileContext {
    frames: Vec<Frame>,
}

impl CompileContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_frame(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub fn pop_frame(&mut self) -> CompileResult<Frame> {
        self.frames
            .pop()
            .ok_or_else(|| CompileError::InvalidProgram("no frame to pop".to_string()))
    }

    pub fn frame(&self) -> CompileResult<&Frame> {
        self.frames
            .last()
            .ok_or_else(|| CompileError::InvalidProgram("no active frame".to_string()))
    }

    pub fn frame_mut(&mut self) -> CompileResult<&mut Frame> {
        self.frames
            .last_mut()
            .ok_or_else(|| CompileError::InvalidProgram("no active frame".to_string()))
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Whether `function` already has a frame on the stack
    pub fn is_generating(&self, function: &str) -> bool {
        self.frames
            .iter()
            .any(|f| f.function.as_deref() == Some(function))
    }

    /// Name of the innermost function frame, if any
    pub fn current_function(&self) -> Option<&str> {
        self.frames.last().and_then(|f| f.function.as_deref())
    }

    pub fn scope_depth(&self) -> usize {
        self.frames.last().map_or(0, |f| f.scopes.len())
    }

    pub fn begin_scope(&mut self) -> CompileResult<()> {
        self.frame_mut()?.scopes.push(Scope::default());
        Ok(())
    }

    /// Close the innermost scope, returning the stacks to pop
    pub fn end_scope(&mut self) -> CompileResult<Vec<RecursiveIndexReference>> {
        let frame = self.frame_mut()?;
        let depth = frame.scopes.len().saturating_sub(1);
        let teardown = frame.teardown_from(depth);
        frame.scopes.pop();
        Ok(teardown)
    }

    /// Declare a local in the innermost scope, shadowing outer ones
    pub fn declare(&mut self, name: &str, var: LocalVar, pop_on_exit: bool) -> CompileResult<()> {
        let frame = self.frame_mut()?;
        let scope = frame
            .scopes
            .last_mut()
            .ok_or_else(|| CompileError::InvalidProgram("no open scope".to_string()))?;
        scope.entries.push(ScopeEntry {
            name: name.to_string(),
            var,
            pop_on_exit,
        });
        Ok(())
    }

    /// Resolve a local in the current frame, innermost scope first
    pub fn resolve(&self, name: &str) -> Option<LocalVar> {
        let frame = self.frames.last()?;
        frame
            .scopes
            .iter()
            .rev()
            .flat_map(|s| s.entries.iter().rev())
            .find(|e| e.name == name)
            .map(|e| e.var.clone())
    }

    pub fn begin_loop(&mut self) -> CompileResult<()> {
        let frame = self.frame_mut()?;
        let scope_depth = frame.scopes.len();
        frame.loops.push(LoopFrame {
            scope_depth,
            break_skips: Vec::new(),
            continue_skips: Vec::new(),
        });
        Ok(())
    }

    pub fn end_loop(&mut self) -> CompileResult<LoopFrame> {
        self.frame_mut()?
            .loops
            .pop()
            .ok_or_else(|| CompileError::InvalidProgram("no loop to close".to_string()))
    }

    pub fn innermost_loop_mut(&mut self) -> Option<&mut LoopFrame> {
        self.frames.last_mut()?.loops.last_mut()
    }

    pub fn innermost_loop_depth(&self) -> Option<usize> {
        self.frames.last()?.loops.last().map(|l| l.scope_depth)
    }
}
