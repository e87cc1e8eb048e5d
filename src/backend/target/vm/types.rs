//! Type definitions for the reference executor.
//!
//! This module contains:
//! - Value: Runtime values held in storage slots
//! - VmError: Error types that can occur during execution
//! - VmConfig: Executor limits and tracing
//! - VmStats / RunOutcome: What a run did

use std::fmt;

use serde::Deserialize;

/// Result of executor operations
pub type VmResult<T> = Result<T, VmError>;

/// Runtime value
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Number(f64),
    Bool(bool),
    Array(Vec<Value>),
}

impl Value {
    /// Numeric view: null and false are 0, true is 1, arrays are 0
    pub fn as_number(&self) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::Bool(true) => 1.0,
            Value::Null | Value::Bool(false) | Value::Array(_) => 0.0,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Bool(b) => *b,
            Value::Array(items) => !items.is_empty(),
        }
    }

    pub fn as_array(&self) -> &[Value] {
        match self {
            Value::Array(items) => items,
            _ => &[],
        }
    }

    /// Equality as the rule engine sees it: scalars compare numerically
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loose_eq(y))
            }
            (Value::Array(_), _) | (_, Value::Array(_)) => false,
            (a, b) => a.as_number() == b.as_number(),
        }
    }

    /// Array index, if this is a non-negative integral number
    pub fn as_index(&self) -> Option<usize> {
        let n = self.as_number();
        (n >= 0.0 && n.fract() == 0.0 && n.is_finite()).then_some(n as usize)
    }

    pub fn numbers(values: &[f64]) -> Value {
        Value::Array(values.iter().copied().map(Value::Number).collect())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Number(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Errors that can occur during execution
#[derive(Debug, Clone, PartialEq)]
pub enum VmError {
    /// Too many actions ran without a `Wait`
    Watchdog { executed: usize, budget: usize },
    /// Total action limit reached
    StepLimit(usize),
    /// Skip with no resolved length
    UnboundSkip(usize),
    /// `LoopIf` without a matching `LoopBegin`, or the reverse
    UnbalancedLoop(usize),
    /// Array placeholder used outside an array combinator
    NoArrayElement,
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Watchdog { executed, budget } => write!(
                f,
                "Watchdog: {} actions without a wait (budget {})",
                executed, budget
            ),
            Self::StepLimit(n) => write!(f, "Step limit of {} actions reached", n),
            Self::UnboundSkip(pos) => write!(f, "Unbound skip at {}", pos),
            Self::UnbalancedLoop(pos) => write!(f, "Unbalanced loop at {}", pos),
            Self::NoArrayElement => write!(f, "Array element used outside an array operation"),
        }
    }
}

impl std::error::Error for VmError {}

/// Configuration for the executor
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Actions allowed between two waits
    pub watchdog_budget: usize,
    /// Hard cap on actions per run
    pub max_steps: usize,
    /// Log every action
    pub trace: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            watchdog_budget: 2000,
            max_steps: 1_000_000,
            trace: false,
        }
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Fell off the end of the action list
    Completed,
    /// Executed `Abort`
    Aborted,
}

/// Counters from the last run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VmStats {
    pub executed: usize,
    pub waits: usize,
    pub skips_taken: usize,
    pub loop_repeats: usize,
    /// Most actions seen between two waits
    pub longest_stretch: usize,
}
