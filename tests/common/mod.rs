//! Shared helpers for flatline integration tests
//!
//! Programs are written as TOML documents, compiled through the public
//! pipeline and executed on the reference executor.
#![allow(dead_code)]

use flatline::backend::pathfind::Bakemap;
use flatline::backend::target::{RunOutcome, TargetVm, Value, VmConfig, VmError};
use flatline::ir::Program;
use flatline::{compile, CompiledProgram, CompilerConfig};

/// Parse a program tree from TOML
pub fn parse(source: &str) -> Program {
    toml::from_str(source).expect("program should parse")
}

/// Compile a program that is expected to validate and generate cleanly
pub fn compile_ok(program: &Program, config: &CompilerConfig) -> CompiledProgram {
    let compilation = compile(program, config).expect("generation should succeed");
    assert!(
        compilation.diagnostics.is_empty(),
        "unexpected diagnostics: {:?}",
        compilation.diagnostics
    );
    compilation.output.expect("clean program should produce output")
}

/// Executor with a relaxed watchdog, for code that legitimately never yields
pub fn relaxed_vm() -> TargetVm {
    TargetVm::new(VmConfig {
        watchdog_budget: 1_000_000,
        ..VmConfig::default()
    })
}

/// Run the named rule
pub fn run_rule(
    compiled: &CompiledProgram,
    vm: &mut TargetVm,
    rule: &str,
) -> Result<RunOutcome, VmError> {
    let rule = compiled.rule(rule).expect("rule should exist");
    vm.run(&rule.actions)
}

pub fn set_global(compiled: &CompiledProgram, vm: &mut TargetVm, name: &str, value: Value) {
    let slot = compiled.global(name).expect("global should exist");
    vm.set(slot, value);
}

pub fn get_global(compiled: &CompiledProgram, vm: &TargetVm, name: &str) -> Value {
    vm.value(compiled.global(name).expect("global should exist"))
}

/// Graph arrays: node positions, `[a, b]` segments, per-segment attributes
pub struct Graph {
    pub nodes: Value,
    pub segments: Value,
    pub attributes: Value,
}

impl Graph {
    /// `count` nodes on a line, neighbours joined, every segment always usable
    pub fn chain(count: usize) -> Self {
        let nodes = (0..count).map(|i| Value::numbers(&[i as f64, 0.0])).collect();
        let segments = (1..count)
            .map(|i| Value::numbers(&[(i - 1) as f64, i as f64]))
            .collect();
        Self {
            nodes: Value::Array(nodes),
            segments: Value::Array(segments),
            attributes: Value::numbers(&vec![0.0; count.saturating_sub(1)]),
        }
    }

    /// Three nodes, only the first two joined
    pub fn split() -> Self {
        Self {
            nodes: Value::Array(vec![
                Value::numbers(&[0.0, 0.0]),
                Value::numbers(&[1.0, 0.0]),
                Value::numbers(&[5.0, 5.0]),
            ]),
            segments: Value::Array(vec![Value::numbers(&[0.0, 1.0])]),
            attributes: Value::numbers(&[0.0]),
        }
    }

    pub fn load(&self, compiled: &CompiledProgram, vm: &mut TargetVm) {
        set_global(compiled, vm, "nodes", self.nodes.clone());
        set_global(compiled, vm, "segments", self.segments.clone());
        set_global(compiled, vm, "attributes", self.attributes.clone());
    }
}

/// Rule `main` baking `nodes`/`segments`/`attributes` into `paths`. Progress
/// is bound live as `bake_progress` and copied into `progress` every tick.
pub const BAKE_PROGRAM: &str = r#"
    [[globals]]
    name = "nodes"

    [[globals]]
    name = "segments"

    [[globals]]
    name = "attributes"

    [[globals]]
    name = "paths"

    [[globals]]
    name = "progress"

    [[rules]]
    name = "main"

    [[rules.body]]
    kind = "bake"
    result = "paths"
    nodes = "nodes"
    segments = "segments"
    attributes = "attributes"
    enabled = { kind = "number", value = 1.0 }
    progress = "bake_progress"
    progress_snapshot = "progress"
"#;

/// Per-source parent arrays of a stored bakemap
pub fn parents(bakemap: &Value) -> &[Value] {
    bakemap.as_array()[Bakemap::PARENTS].as_array()
}
