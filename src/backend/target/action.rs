//! Target instruction set
//!
//! A rule is a flat list of [`Action`]s executed top to bottom. Control flow
//! is limited to forward skips and a single loop construct:
//!
//! ```text
//! Skip { condition, length }   jump over the next `length` actions when taken
//! End                          no-op, the landing point of a skip
//! LoopBegin ... LoopIf(cond)   jump back to just after LoopBegin while cond holds
//! ```
//!
//! `LoopBegin`/`LoopIf` pairs are matched statically by nesting.

use std::fmt;

use smallvec::SmallVec;

use super::term::Term;
use super::vars::Slot;

/// In-place modification applied by [`Action::Modify`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModifyOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    /// Append the value as a single element
    Append,
    /// Remove the first element equal to the value
    RemoveByValue,
    /// Remove the element at the given index
    RemoveByIndex,
}

impl ModifyOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            ModifyOp::Add => "add",
            ModifyOp::Subtract => "sub",
            ModifyOp::Multiply => "mul",
            ModifyOp::Divide => "div",
            ModifyOp::Modulo => "mod",
            ModifyOp::Append => "append",
            ModifyOp::RemoveByValue => "remove_value",
            ModifyOp::RemoveByIndex => "remove_index",
        }
    }
}

/// Length of a skip; `Unbound` until its end marker is bound
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipLength {
    Unbound,
    Count(usize),
}

/// One target instruction
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// `slot[path...] = value`
    Set {
        slot: Slot,
        path: SmallVec<[Term; 2]>,
        value: Term,
    },
    /// `slot[path...] <op>= value`
    Modify {
        slot: Slot,
        path: SmallVec<[Term; 2]>,
        op: ModifyOp,
        value: Term,
    },
    /// Skip the next `length` actions; unconditional when `condition` is `None`
    Skip {
        condition: Option<Term>,
        length: SkipLength,
    },
    /// Zero-effect skip target
    End,
    LoopBegin,
    /// Repeat from the matching `LoopBegin` while `condition` holds
    LoopIf { condition: Term },
    /// Yield to the host, resetting the watchdog
    Wait,
    /// Stop the rule
    Abort,
}

impl Action {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Action::Set { .. } => "set",
            Action::Modify { .. } => "modify",
            Action::Skip {
                condition: Some(_),
                ..
            } => "skip_if",
            Action::Skip { condition: None, .. } => "skip",
            Action::End => "end",
            Action::LoopBegin => "loop",
            Action::LoopIf { .. } => "loop_if",
            Action::Wait => "wait",
            Action::Abort => "abort",
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, Action::Skip { .. })
    }

    /// Length of a bound skip
    pub fn skip_length(&self) -> Option<usize> {
        match self {
            Action::Skip {
                length: SkipLength::Count(n),
                ..
            } => Some(*n),
            _ => None,
        }
    }
}

fn write_target(f: &mut fmt::Formatter<'_>, slot: &Slot, path: &[Term]) -> fmt::Result {
    write!(f, "{}", slot)?;
    for index in path {
        write!(f, "[{}]", index)?;
    }
    Ok(())
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Set { slot, path, value } => {
                write!(f, "set ")?;
                write_target(f, slot, path)?;
                write!(f, " = {}", value)
            }
            Action::Modify {
                slot,
                path,
                op,
                value,
            } => {
                write!(f, "modify ")?;
                write_target(f, slot, path)?;
                write!(f, " {} {}", op.mnemonic(), value)
            }
            Action::Skip { condition, length } => {
                let length = match length {
                    SkipLength::Count(n) => n.to_string(),
                    SkipLength::Unbound => "?".to_string(),
                };
                match condition {
                    Some(c) => write!(f, "skip_if {} by {}", c, length),
                    None => write!(f, "skip by {}", length),
                }
            }
            Action::LoopIf { condition } => write!(f, "loop_if {}", condition),
            other => write!(f, "{}", other.mnemonic()),
        }
    }
}
