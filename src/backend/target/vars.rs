//! Storage slot allocation
//!
//! The target has a fixed bank of global slots and a fixed bank of per-entity
//! slots. [`VarCollection`] hands them out during generation; every request
//! gets a fresh slot, so two call sites of the same function never share
//! parameter or return storage. Slots are never released.
//!
//! # References
//!
//! - [`IndexReference`]: a slot plus an index path into array-shaped storage.
//! - [`RecursiveIndexReference`]: the same storage used as a stack, one element
//!   per active call frame.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use tracing::trace;

use super::action::{Action, ModifyOp};
use super::compiler::error::{CompileError, CompileResult};
use super::term::Term;

/// Which storage bank a slot lives in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarScope {
    #[default]
    Global,
    /// One copy per entity the rule runs on
    Entity,
}

impl fmt::Display for VarScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarScope::Global => write!(f, "global"),
            VarScope::Entity => write!(f, "entity"),
        }
    }
}

/// A storage slot address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slot {
    pub scope: VarScope,
    pub index: u32,
}

impl Slot {
    pub fn new(scope: VarScope, index: u32) -> Self {
        Self { scope, index }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scope {
            VarScope::Global => write!(f, "g{}", self.index),
            VarScope::Entity => write!(f, "e{}", self.index),
        }
    }
}

/// Allocation record for one slot
#[derive(Debug, Clone, PartialEq)]
pub struct VarInfo {
    pub name: String,
    pub slot: Slot,
    /// Slot is used as a call-frame stack
    pub recursive: bool,
}

/// Allocator for the global and entity slot banks
#[derive(Debug, Clone)]
pub struct VarCollection {
    globals: Vec<VarInfo>,
    entity: Vec<VarInfo>,
    max_global: usize,
    max_entity: usize,
    /// Times each base name was requested, for unique display names
    name_counts: HashMap<String, usize>,
}

impl VarCollection {
    pub fn new(max_global: usize, max_entity: usize) -> Self {
        Self {
            globals: Vec::new(),
            entity: Vec::new(),
            max_global,
            max_entity,
            name_counts: HashMap::new(),
        }
    }

    /// Allocate a fresh slot named after `name`.
    ///
    /// Repeated names get a numeric suffix; the slot itself is always new.
    pub fn assign(&mut self, name: &str, scope: VarScope) -> CompileResult<IndexReference> {
        let slot = self.allocate(name, scope, false)?;
        Ok(IndexReference::new(slot))
    }

    /// Allocate a fresh slot to be used as a call-frame stack
    pub fn assign_recursive(
        &mut self,
        name: &str,
        scope: VarScope,
    ) -> CompileResult<RecursiveIndexReference> {
        let slot = self.allocate(name, scope, true)?;
        Ok(RecursiveIndexReference::new(IndexReference::new(slot)))
    }

    fn allocate(&mut self, name: &str, scope: VarScope, recursive: bool) -> CompileResult<Slot> {
        let (bank, max) = match scope {
            VarScope::Global => (&mut self.globals, self.max_global),
            VarScope::Entity => (&mut self.entity, self.max_entity),
        };
        if bank.len() >= max {
            return Err(CompileError::TooManyVariables { scope, max });
        }

        let count = self.name_counts.entry(name.to_string()).or_insert(0);
        let label = if *count == 0 {
            name.to_string()
        } else {
            format!("{}_{}", name, count)
        };
        *count += 1;

        let slot = Slot::new(scope, bank.len() as u32);
        trace!(target: "flatline::vars", %slot, name = %label, recursive, "assigned slot");
        bank.push(VarInfo {
            name: label,
            slot,
            recursive,
        });
        Ok(slot)
    }

    /// All allocated slots, globals first
    pub fn iter(&self) -> impl Iterator<Item = &VarInfo> {
        self.globals.iter().chain(self.entity.iter())
    }

    /// Look up an allocation by its (possibly suffixed) display name
    pub fn find(&self, name: &str) -> Option<&VarInfo> {
        self.iter().find(|v| v.name == name)
    }

    pub fn info(&self, slot: Slot) -> Option<&VarInfo> {
        match slot.scope {
            VarScope::Global => self.globals.get(slot.index as usize),
            VarScope::Entity => self.entity.get(slot.index as usize),
        }
    }

    pub fn len(&self, scope: VarScope) -> usize {
        match scope {
            VarScope::Global => self.globals.len(),
            VarScope::Entity => self.entity.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.globals.is_empty() && self.entity.is_empty()
    }
}

/// A slot plus an index path into it
#[derive(Debug, Clone, PartialEq)]
pub struct IndexReference {
    slot: Slot,
    path: SmallVec<[Term; 2]>,
}

impl IndexReference {
    pub fn new(slot: Slot) -> Self {
        Self {
            slot,
            path: SmallVec::new(),
        }
    }

    pub fn slot(&self) -> Slot {
        self.slot
    }

    pub fn path(&self) -> &[Term] {
        &self.path
    }

    /// Reference to element `index` of this reference
    pub fn child(&self, index: Term) -> IndexReference {
        let mut path = self.path.clone();
        path.push(index);
        IndexReference {
            slot: self.slot,
            path,
        }
    }

    /// Read term
    pub fn get(&self) -> Term {
        self.path
            .iter()
            .fold(Term::Var(self.slot), |acc, index| acc.index(index.clone()))
    }

    /// Overwrite the referenced value
    pub fn set(&self, value: Term) -> Action {
        Action::Set {
            slot: self.slot,
            path: self.path.clone(),
            value,
        }
    }

    /// Overwrite element `index` of the referenced array
    pub fn set_at(&self, index: Term, value: Term) -> Action {
        self.child(index).set(value)
    }

    pub fn modify(&self, op: ModifyOp, value: Term) -> Action {
        Action::Modify {
            slot: self.slot,
            path: self.path.clone(),
            op,
            value,
        }
    }
}

/// Array-shaped storage used as an explicit call stack.
///
/// The last element is the current frame. Pushes happen at function entry and
/// every exit path pops exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct RecursiveIndexReference {
    base: IndexReference,
}

impl RecursiveIndexReference {
    pub fn new(base: IndexReference) -> Self {
        Self { base }
    }

    pub fn slot(&self) -> Slot {
        self.base.slot()
    }

    /// The whole stack
    pub fn stack(&self) -> Term {
        self.base.get()
    }

    /// Value in the current frame
    pub fn get(&self) -> Term {
        self.stack().last()
    }

    /// Overwrite the value in the current frame
    pub fn set(&self, value: Term) -> Action {
        self.base.set_at(self.stack().last_index(), value)
    }

    /// Overwrite element `index` of the array held in the current frame
    pub fn set_at(&self, index: Term, value: Term) -> Action {
        self.base
            .child(self.stack().last_index())
            .set_at(index, value)
    }

    /// Open a new frame holding `value`
    pub fn push(&self, value: Term) -> Action {
        self.base.modify(ModifyOp::Append, value)
    }

    /// Drop the current frame
    pub fn pop(&self) -> Action {
        self.base
            .modify(ModifyOp::RemoveByIndex, self.stack().last_index())
    }

    /// Empty the stack
    pub fn reset(&self) -> Action {
        self.base.set(Term::empty_array())
    }
}
