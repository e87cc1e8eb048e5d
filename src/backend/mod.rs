// Backend for flatline programs
//
// This module provides the pipeline from a validated program tree to
// rule-engine action lists:
// - `validate`: return and loop-control diagnostics, reported all at once
// - `target`: the instruction set, skip engine, compiler and reference executor
// - `pathfind`: graph searches baked into the target's single loop construct

pub mod pathfind;
pub mod target;
pub mod validate;

use tracing::{debug, warn};

use crate::config::CompilerConfig;
use crate::ir::Program;

pub use target::{generate, CompileError, CompileResult, CompiledProgram, CompiledRule};
pub use validate::{validate, Diagnostic, Severity};

/// Result of running the whole backend on a program
#[derive(Debug, Clone)]
pub struct Compilation {
    pub diagnostics: Vec<Diagnostic>,
    /// `None` when validation reported an error
    pub output: Option<CompiledProgram>,
}

impl Compilation {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

/// Validate `program` and, if it is free of errors, generate its rules.
///
/// User mistakes come back as diagnostics; an `Err` means generation itself
/// hit a defect.
pub fn compile(program: &Program, config: &CompilerConfig) -> CompileResult<Compilation> {
    let diagnostics = validate(program);
    for diagnostic in &diagnostics {
        warn!(%diagnostic, "validation");
    }
    if diagnostics.iter().any(Diagnostic::is_error) {
        debug!(errors = diagnostics.len(), "skipping generation");
        return Ok(Compilation {
            diagnostics,
            output: None,
        });
    }

    let output = generate(program, config)?;
    Ok(Compilation {
        diagnostics,
        output: Some(output),
    })
}
