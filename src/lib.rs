/// Flatline - Code Generation Backend for Flat Rule Engines
///
/// This library lowers structured programs (functions, recursion, loops,
/// early returns) onto a rule engine whose rules are flat, ordered action
/// lists. The target has no calls, no native recursion, and no backward
/// jumps apart from one loop-repeat primitive. A watchdog also aborts any
/// rule that runs too long without yielding.
///
/// # Architecture
///
/// 1. **Program tree** (`ir` module)
///    - Validated functions, rules and globals, deserializable from TOML
///
/// 2. **Backend** (`backend` module)
///    - `validate`: user diagnostics for returns and loop control
///    - `target`: instruction set, skip-marker engine, slot allocation,
///      return handlers, call emulation and a reference executor
///    - `pathfind`: Dijkstra baked into the loop construct with periodic yields
///
/// 3. **Session** (`session` module)
///    - Keeps the newest successful compilation across edits
///
/// # Example
///
/// ```rust
/// use flatline::backend::target::{TargetVm, Value};
/// use flatline::ir::{Expr, GlobalDecl, Program, Rule, Stmt};
/// use flatline::{compile, CompilerConfig};
///
/// let program = Program {
///     globals: vec![GlobalDecl::global("answer")],
///     functions: vec![],
///     rules: vec![Rule {
///         name: "main".into(),
///         scope: Default::default(),
///         body: vec![Stmt::assign("answer", Expr::number(42.0))],
///         span: Default::default(),
///     }],
/// };
///
/// let config = CompilerConfig::default();
/// let compiled = compile(&program, &config).unwrap().output.unwrap();
/// let mut vm = TargetVm::new(config.vm.clone());
/// vm.run(&compiled.rules[0].actions).unwrap();
/// let slot = compiled.global("answer").unwrap();
/// assert_eq!(vm.value(slot), Value::Number(42.0));
/// ```

pub mod backend;
pub mod config;
pub mod ir;
pub mod session;

pub use backend::{compile, Compilation, Diagnostic};
pub use backend::target::{ActionList, CompileError, CompileResult, CompiledProgram, TargetVm};
pub use config::{CompilerConfig, ConfigError};
pub use session::CompileSession;
