//! Generation-time error types.
//!
//! These are defects in the generator or in a program that slipped past
//! validation. User-facing problems are reported as
//! [`Diagnostic`](crate::backend::validate::Diagnostic)s instead.

use crate::backend::target::vars::VarScope;

/// Generation-time defects
#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    /// A skip was never bound to an end marker
    UnboundSkip { sequence: String, position: usize },
    /// A skip was bound twice
    SkipAlreadyBound { position: usize },
    /// End marker does not come after the skip
    BackwardSkip { start: usize, end: usize },
    /// Start marker does not point at a skip
    NotASkip { position: usize },
    /// End marker does not point at an `End`
    NotAnEnd { position: usize },
    /// Stored skip length disagrees with its binding
    SkipMismatch { start: usize, end: usize },
    /// Second value returned from a single-path function
    MultipleReturnValues { function: String },
    /// Return handler used after its epilogue was placed
    HandlerFinalized { function: String },
    /// Value-return operation used inside a rule
    UnsupportedInRule(&'static str),
    BreakOutsideLoop,
    ContinueOutsideLoop,
    UnknownFunction(String),
    UnknownVariable(String),
    /// Write to a name bound to a live expression
    ReadOnlyBinding(String),
    /// Binding name already taken by a global or an earlier binding
    DuplicateBinding(String),
    InvalidArity {
        function: String,
        expected: usize,
        got: usize,
    },
    /// Recursion between two distinct functions
    MutualRecursion { function: String, caller: String },
    /// A function reached itself without being declared recursive
    UndeclaredRecursion { function: String },
    /// Pre-scan disagreed with what generation consumed
    FrameLayout { function: String },
    TooManyVariables { scope: VarScope, max: usize },
    /// Generation was asked for a program that failed validation
    InvalidProgram(String),
}

/// Result type alias for generation operations
pub type CompileResult<T> = Result<T, CompileError>;

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnboundSkip { sequence, position } => {
                write!(f, "Unbound skip at {} in {}", position, sequence)
            }
            Self::SkipAlreadyBound { position } => {
                write!(f, "Skip at {} is already bound", position)
            }
            Self::BackwardSkip { start, end } => {
                write!(f, "Skip at {} cannot land on {}: skips only go forward", start, end)
            }
            Self::NotASkip { position } => write!(f, "Action at {} is not a skip", position),
            Self::NotAnEnd { position } => write!(f, "Action at {} is not an end marker", position),
            Self::SkipMismatch { start, end } => {
                write!(f, "Skip at {} does not match its binding to {}", start, end)
            }
            Self::MultipleReturnValues { function } => {
                write!(f, "{} returns more than one value on a single path", function)
            }
            Self::HandlerFinalized { function } => {
                write!(f, "Return handler for {} is already finalized", function)
            }
            Self::UnsupportedInRule(what) => {
                write!(f, "{} is unsupported in this context", what)
            }
            Self::BreakOutsideLoop => write!(f, "'break' outside of a loop"),
            Self::ContinueOutsideLoop => write!(f, "'continue' outside of a loop"),
            Self::UnknownFunction(name) => write!(f, "Unknown function: {}", name),
            Self::UnknownVariable(name) => write!(f, "Variable not found: {}", name),
            Self::ReadOnlyBinding(name) => write!(f, "{} is read-only", name),
            Self::DuplicateBinding(name) => write!(f, "{} is already defined", name),
            Self::InvalidArity {
                function,
                expected,
                got,
            } => write!(
                f,
                "Invalid arity for {}: expected {}, got {}",
                function, expected, got
            ),
            Self::MutualRecursion { function, caller } => write!(
                f,
                "Mutual recursion between {} and {} is not supported",
                caller, function
            ),
            Self::UndeclaredRecursion { function } => {
                write!(f, "{} calls itself but is not declared recursive", function)
            }
            Self::FrameLayout { function } => {
                write!(f, "Frame layout of {} does not match its call sites", function)
            }
            Self::TooManyVariables { scope, max } => {
                write!(f, "Too many {} variables (max {})", scope, max)
            }
            Self::InvalidProgram(msg) => write!(f, "Invalid program: {}", msg),
        }
    }
}

impl std::error::Error for CompileError {}
