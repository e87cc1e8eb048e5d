//! Action sequences and skip markers
//!
//! [`ActionSequence`] is the append-only builder for one rule. Forward control
//! flow is expressed with skip markers that are resolved late, the same way an
//! assembler patches forward jumps:
//!
//! 1. [`ActionSequence::emit_conditional_skip`] / [`ActionSequence::emit_skip`]
//!    append a `Skip` with an unknown length and return a [`StartMarker`].
//! 2. [`ActionSequence::place_end`] appends an `End` action and returns an
//!    [`EndMarker`].
//! 3. [`ActionSequence::bind`] writes `end - start - 1` into the skip.
//!
//! Positions never move once appended, so a distance computed at bind time
//! stays valid. [`ActionSequence::finish`] refuses to produce an
//! [`ActionList`] while any skip is unbound.

use std::collections::BTreeSet;

use itertools::Itertools;
use tracing::trace;

use super::action::{Action, SkipLength};
use super::compiler::error::{CompileError, CompileResult};
use super::term::Term;

/// Position of an unbound skip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StartMarker {
    position: usize,
}

impl StartMarker {
    pub fn position(self) -> usize {
        self.position
    }
}

/// Position of an `End` action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EndMarker {
    position: usize,
}

impl EndMarker {
    pub fn position(self) -> usize {
        self.position
    }
}

/// A resolved skip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkipBinding {
    pub start: usize,
    pub end: usize,
}

impl SkipBinding {
    /// Number of actions jumped over
    pub fn distance(&self) -> usize {
        self.end - self.start - 1
    }
}

/// Builder for one rule's action list
#[derive(Debug)]
pub struct ActionSequence {
    name: String,
    actions: Vec<Action>,
    /// Positions of skips still waiting for an end marker
    unbound: BTreeSet<usize>,
    bindings: Vec<SkipBinding>,
}

impl ActionSequence {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            actions: Vec::new(),
            unbound: BTreeSet::new(),
            bindings: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Append an action, returning its position
    pub fn push(&mut self, action: Action) -> usize {
        let position = self.actions.len();
        if let Action::Skip {
            length: SkipLength::Unbound,
            ..
        } = action
        {
            self.unbound.insert(position);
        }
        self.actions.push(action);
        position
    }

    /// Append a skip taken when `predicate` is truthy
    pub fn emit_conditional_skip(&mut self, predicate: Term) -> StartMarker {
        self.emit_unbound(Some(predicate))
    }

    /// Append a skip that is always taken
    pub fn emit_skip(&mut self) -> StartMarker {
        self.emit_unbound(None)
    }

    fn emit_unbound(&mut self, condition: Option<Term>) -> StartMarker {
        let position = self.push(Action::Skip {
            condition,
            length: SkipLength::Unbound,
        });
        StartMarker { position }
    }

    /// Append a skip whose length is already known
    pub fn emit_fixed_skip(&mut self, condition: Option<Term>, length: usize) -> usize {
        self.push(Action::Skip {
            condition,
            length: SkipLength::Count(length),
        })
    }

    /// Append a zero-effect `End` to skip to
    pub fn place_end(&mut self) -> EndMarker {
        EndMarker {
            position: self.push(Action::End),
        }
    }

    /// Resolve `start` so that taking it lands on `end`
    pub fn bind(&mut self, start: StartMarker, end: EndMarker) -> CompileResult<()> {
        let (s, e) = (start.position, end.position);
        if !matches!(self.actions.get(e), Some(Action::End)) {
            return Err(CompileError::NotAnEnd { position: e });
        }
        if e <= s {
            return Err(CompileError::BackwardSkip { start: s, end: e });
        }
        let Some(Action::Skip { length, .. }) = self.actions.get_mut(s) else {
            return Err(CompileError::NotASkip { position: s });
        };
        if !self.unbound.remove(&s) {
            return Err(CompileError::SkipAlreadyBound { position: s });
        }

        let binding = SkipBinding { start: s, end: e };
        *length = SkipLength::Count(binding.distance());
        trace!(target: "flatline::sequence", start = s, end = e, distance = binding.distance(), "bound skip");
        self.bindings.push(binding);
        Ok(())
    }

    /// Place an `End` here and bind `start` to it
    pub fn bind_here(&mut self, start: StartMarker) -> CompileResult<EndMarker> {
        let end = self.place_end();
        self.bind(start, end)?;
        Ok(end)
    }

    pub fn unbound_count(&self) -> usize {
        self.unbound.len()
    }

    /// Freeze the sequence. Every skip must be bound.
    pub fn finish(self) -> CompileResult<ActionList> {
        if let Some(&position) = self.unbound.iter().next() {
            return Err(CompileError::UnboundSkip {
                sequence: self.name,
                position,
            });
        }
        Ok(ActionList {
            name: self.name,
            actions: self.actions,
            bindings: self.bindings,
        })
    }
}

/// A finished rule body with every skip resolved
#[derive(Debug, Clone, PartialEq)]
pub struct ActionList {
    name: String,
    actions: Vec<Action>,
    bindings: Vec<SkipBinding>,
}

impl ActionList {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn bindings(&self) -> &[SkipBinding] {
        &self.bindings
    }

    /// Number of actions matching `pred`
    pub fn count(&self, pred: impl Fn(&Action) -> bool) -> usize {
        self.actions.iter().filter(|a| pred(a)).count()
    }

    /// Distances re-derived from the binding table, in binding order
    pub fn recompute_distances(&self) -> Vec<usize> {
        self.bindings.iter().map(SkipBinding::distance).collect()
    }

    /// Check every bound skip against its recorded binding.
    ///
    /// Fails on the first skip whose stored length disagrees with
    /// `end - start - 1`, or that was never bound.
    pub fn verify_skips(&self) -> CompileResult<()> {
        for binding in &self.bindings {
            match self.actions.get(binding.start).and_then(Action::skip_length) {
                Some(n) if n == binding.distance() => {}
                _ => {
                    return Err(CompileError::SkipMismatch {
                        start: binding.start,
                        end: binding.end,
                    })
                }
            }
        }
        // Fixed-length skips have no binding; only unbound ones are defects here
        let unbound = self.actions.iter().position(|a| {
            matches!(
                a,
                Action::Skip {
                    length: SkipLength::Unbound,
                    ..
                }
            )
        });
        match unbound {
            Some(position) => Err(CompileError::UnboundSkip {
                sequence: self.name.clone(),
                position,
            }),
            None => Ok(()),
        }
    }

    /// Human-readable listing, one action per line.
    ///
    /// Skip targets are annotated with the positions that land on them.
    pub fn disassemble(&self) -> String {
        let landings = self
            .bindings
            .iter()
            .into_group_map_by(|b| b.end);

        let mut output = String::new();
        output.push_str(&format!("=== {} ===\n", self.name));
        output.push_str(&format!(
            "actions: {}, skips: {}\n",
            self.actions.len(),
            self.bindings.len()
        ));

        let mut depth = 0usize;
        for (position, action) in self.actions.iter().enumerate() {
            if matches!(action, Action::LoopIf { .. }) {
                depth = depth.saturating_sub(1);
            }
            let indent = "  ".repeat(depth);
            output.push_str(&format!("{:04} {}{}", position, indent, action));
            if let Some(sources) = landings.get(&position) {
                let from = sources.iter().map(|b| b.start).sorted().join(", ");
                output.push_str(&format!("    <- {}", from));
            }
            output.push('\n');
            if matches!(action, Action::LoopBegin) {
                depth += 1;
            }
        }
        output
    }
}
