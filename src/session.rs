//! Last successful compilation
//!
//! Editors and build watchers recompile on every change, and most of those
//! attempts fail halfway through an edit. A [`CompileSession`] keeps the most
//! recent compilation that succeeded so consumers always have runnable action
//! lists. Results are versioned by the caller; a result only replaces the
//! stored one when its version is strictly newer, so a slow compile finishing
//! late cannot overwrite a fresher one.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::backend::{compile, Compilation};
use crate::backend::target::{CompileResult, CompiledProgram};
use crate::config::CompilerConfig;
use crate::ir::Program;

/// A compiled program tagged with the version it was compiled from
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub version: u64,
    pub program: Arc<CompiledProgram>,
}

/// Single-writer, multi-reader slot holding the newest successful compilation
#[derive(Debug, Default)]
pub struct LastSuccessful {
    slot: RwLock<Option<Snapshot>>,
}

impl LastSuccessful {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `program` unless an equal or newer version is already held.
    ///
    /// Returns whether the slot was updated.
    pub fn publish(&self, version: u64, program: CompiledProgram) -> bool {
        let mut slot = self.slot.write();
        if let Some(current) = slot.as_ref() {
            if current.version >= version {
                trace!(version, held = current.version, "ignoring stale compilation");
                return false;
            }
        }
        *slot = Some(Snapshot {
            version,
            program: Arc::new(program),
        });
        true
    }

    pub fn latest(&self) -> Option<Snapshot> {
        self.slot.read().clone()
    }

    pub fn version(&self) -> Option<u64> {
        self.slot.read().as_ref().map(|s| s.version)
    }
}

/// Compiles successive revisions of a program and tracks the last good one
#[derive(Debug, Default)]
pub struct CompileSession {
    config: CompilerConfig,
    last: LastSuccessful,
}

impl CompileSession {
    pub fn new(config: CompilerConfig) -> Self {
        Self {
            config,
            last: LastSuccessful::new(),
        }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compile revision `version` of `program`.
    ///
    /// The diagnostics are returned either way; only a clean compilation is
    /// published. Generation errors are returned as-is and publish nothing.
    pub fn submit(&self, version: u64, program: &Program) -> CompileResult<Compilation> {
        let compilation = compile(program, &self.config)?;
        match &compilation.output {
            Some(output) => {
                let published = self.last.publish(version, output.clone());
                debug!(version, published, "compilation finished");
            }
            None => debug!(version, diagnostics = compilation.diagnostics.len(), "compilation rejected"),
        }
        Ok(compilation)
    }

    pub fn last_successful(&self) -> Option<Snapshot> {
        self.last.latest()
    }
}
