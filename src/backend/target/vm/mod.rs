//! Reference executor for action lists
//!
//! Runs an [`ActionList`] the way the rule engine does: top to bottom, forward
//! skips, statically paired `LoopBegin`/`LoopIf`, and a watchdog that aborts
//! the run when too many actions execute without a `Wait`. Used to check that
//! generated code computes what the source program meant.
//!
//! This module is organized into submodules:
//! - `types`: Values, errors, configuration and run statistics
//! - `eval`: Term evaluation

use std::collections::HashMap;

use tracing::{debug, trace};

use super::action::{Action, ModifyOp, SkipLength};
use super::sequence::ActionList;
use super::term::Term;
use super::vars::{Slot, VarScope};

mod eval;
mod types;


pub use types::{RunOutcome, Value, VmConfig, VmError, VmResult, VmStats};

/// The reference executor
#[derive(Debug, Default)]
pub struct TargetVm {
    config: VmConfig,
    globals: Vec<Value>,
    entity: Vec<Value>,
    stats: VmStats,
    /// Slot whose every write is recorded
    watched: Option<Slot>,
    samples: Vec<Value>,
    /// Term evaluated at every `Wait`
    yield_sample_term: Option<Term>,
    yield_samples: Vec<Value>,
}

/// `LoopIf` position -> matching `LoopBegin` position
fn pair_loops(actions: &[Action]) -> VmResult<HashMap<usize, usize>> {
    let mut open = Vec::new();
    let mut pairs = HashMap::new();
    for (position, action) in actions.iter().enumerate() {
        match action {
            Action::LoopBegin => open.push(position),
            Action::LoopIf { .. } => {
                let begin = open.pop().ok_or(VmError::UnbalancedLoop(position))?;
                pairs.insert(position, begin);
            }
            _ => {}
        }
    }
    match open.pop() {
        Some(position) => Err(VmError::UnbalancedLoop(position)),
        None => Ok(pairs),
    }
}

/// Walk `path` from `root`, growing arrays as needed
fn place_mut<'v>(mut current: &'v mut Value, path: &[usize]) -> &'v mut Value {
    for &index in path {
        let node = current;
        if !matches!(node, Value::Array(_)) {
            *node = Value::Array(Vec::new());
        }
        current = match node {
            Value::Array(items) => {
                if items.len() <= index {
                    items.resize(index + 1, Value::Null);
                }
                &mut items[index]
            }
            other => other,
        };
    }
    current
}

fn apply_modify(target: &mut Value, op: ModifyOp, value: Value) {
    let x = target.as_number();
    let y = value.as_number();
    match op {
        ModifyOp::Add => *target = Value::Number(x + y),
        ModifyOp::Subtract => *target = Value::Number(x - y),
        ModifyOp::Multiply => *target = Value::Number(x * y),
        ModifyOp::Divide => *target = Value::Number(if y == 0.0 { 0.0 } else { x / y }),
        ModifyOp::Modulo => *target = Value::Number(if y == 0.0 { 0.0 } else { x % y }),
        ModifyOp::Append => {
            let mut items = match std::mem::take(target) {
                Value::Array(items) => items,
                Value::Null => Vec::new(),
                scalar => vec![scalar],
            };
            items.push(value);
            *target = Value::Array(items);
        }
        ModifyOp::RemoveByValue => {
            if let Value::Array(items) = target {
                if let Some(position) = items.iter().position(|v| v.loose_eq(&value)) {
                    items.remove(position);
                }
            }
        }
        ModifyOp::RemoveByIndex => {
            if let (Value::Array(items), Some(index)) = (target, value.as_index()) {
                if index < items.len() {
                    items.remove(index);
                }
            }
        }
    }
}

impl TargetVm {
    pub fn new(config: VmConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Current value of a slot; unwritten slots are null
    pub fn value(&self, slot: Slot) -> Value {
        let bank = match slot.scope {
            VarScope::Global => &self.globals,
            VarScope::Entity => &self.entity,
        };
        bank.get(slot.index as usize).cloned().unwrap_or_default()
    }

    pub fn set(&mut self, slot: Slot, value: Value) {
        *self.storage_mut(slot) = value;
    }

    fn storage_mut(&mut self, slot: Slot) -> &mut Value {
        let bank = match slot.scope {
            VarScope::Global => &mut self.globals,
            VarScope::Entity => &mut self.entity,
        };
        let index = slot.index as usize;
        if bank.len() <= index {
            bank.resize(index + 1, Value::Null);
        }
        &mut bank[index]
    }

    /// Record the value of `slot` after every write to it
    pub fn watch(&mut self, slot: Slot) {
        self.watched = Some(slot);
        self.samples.clear();
    }

    pub fn samples(&self) -> &[Value] {
        &self.samples
    }

    /// Evaluate `term` each time a rule yields, as a host display would
    pub fn sample_at_yields(&mut self, term: Term) {
        self.yield_sample_term = Some(term);
        self.yield_samples.clear();
    }

    pub fn yield_samples(&self) -> &[Value] {
        &self.yield_samples
    }

    pub fn stats(&self) -> &VmStats {
        &self.stats
    }

    /// Evaluate an index path; `None` when any index is not a valid position
    fn eval_path(&self, path: &[Term]) -> VmResult<Option<Vec<usize>>> {
        let mut indices = Vec::with_capacity(path.len());
        for term in path {
            match self.eval(term)?.as_index() {
                Some(index) => indices.push(index),
                None => return Ok(None),
            }
        }
        Ok(Some(indices))
    }

    fn record(&mut self, slot: Slot) {
        if self.watched == Some(slot) {
            let value = self.value(slot);
            self.samples.push(value);
        }
    }

    /// Execute `list` from the top
    pub fn run(&mut self, list: &ActionList) -> VmResult<RunOutcome> {
        let actions = list.actions();
        let loops = pair_loops(actions)?;
        self.stats = VmStats::default();
        debug!(rule = list.name(), actions = actions.len(), "running rule");

        let mut pc = 0;
        let mut since_wait = 0usize;
        while let Some(action) = actions.get(pc) {
            self.stats.executed += 1;
            since_wait += 1;
            self.stats.longest_stretch = self.stats.longest_stretch.max(since_wait);
            if self.stats.executed > self.config.max_steps {
                return Err(VmError::StepLimit(self.config.max_steps));
            }
            if since_wait > self.config.watchdog_budget {
                return Err(VmError::Watchdog {
                    executed: since_wait,
                    budget: self.config.watchdog_budget,
                });
            }
            if self.config.trace {
                trace!(target: "flatline::vm", pc, %action);
            }

            match action {
                Action::Set { slot, path, value } => {
                    let value = self.eval(value)?;
                    if let Some(path) = self.eval_path(path)? {
                        *place_mut(self.storage_mut(*slot), &path) = value;
                        self.record(*slot);
                    }
                }
                Action::Modify {
                    slot,
                    path,
                    op,
                    value,
                } => {
                    let value = self.eval(value)?;
                    if let Some(path) = self.eval_path(path)? {
                        apply_modify(place_mut(self.storage_mut(*slot), &path), *op, value);
                        self.record(*slot);
                    }
                }
                Action::Skip { condition, length } => {
                    let SkipLength::Count(length) = length else {
                        return Err(VmError::UnboundSkip(pc));
                    };
                    let taken = match condition {
                        Some(condition) => self.eval(condition)?.is_truthy(),
                        None => true,
                    };
                    if taken {
                        self.stats.skips_taken += 1;
                        pc += length;
                    }
                }
                Action::End | Action::LoopBegin => {}
                Action::LoopIf { condition } => {
                    if self.eval(condition)?.is_truthy() {
                        let begin = loops.get(&pc).copied().ok_or(VmError::UnbalancedLoop(pc))?;
                        self.stats.loop_repeats += 1;
                        pc = begin;
                    }
                }
                Action::Wait => {
                    self.stats.waits += 1;
                    since_wait = 0;
                    if let Some(term) = &self.yield_sample_term {
                        let value = self.eval(term)?;
                        self.yield_samples.push(value);
                    }
                }
                Action::Abort => {
                    debug!(rule = list.name(), pc, "rule aborted");
                    return Ok(RunOutcome::Aborted);
                }
            }
            pc += 1;
        }

        debug!(
            rule = list.name(),
            executed = self.stats.executed,
            waits = self.stats.waits,
            "rule completed"
        );
        Ok(RunOutcome::Completed)
    }
}
