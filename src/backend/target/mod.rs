//! Flat rule-engine target
//!
//! Everything needed to describe and produce code for the target:
//!
//! - `term` / `action`: the instruction set
//! - `sequence`: append-only builder with late-bound skip markers
//! - `vars`: storage slot allocation and frame-stack references
//! - `compiler`: lowering of program trees to action lists
//! - `vm`: reference executor used to check generated code

pub mod action;
pub mod compiler;
pub mod sequence;
pub mod term;
pub mod vars;
pub mod vm;

pub use action::{Action, ModifyOp, SkipLength};
pub use compiler::{
    generate, CompileError, CompileResult, CompiledProgram, CompiledRule, Compiler, Emitter,
};
pub use sequence::{ActionList, ActionSequence, EndMarker, SkipBinding, StartMarker};
pub use term::{BinOp, Term};
pub use vars::{IndexReference, RecursiveIndexReference, Slot, VarCollection, VarInfo, VarScope};
pub use vm::{RunOutcome, TargetVm, Value, VmConfig, VmError};
