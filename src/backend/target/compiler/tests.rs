//! Unit tests for the action-list compiler.

use crate::backend::pathfind::Bakemap;
use crate::backend::target::action::{Action, ModifyOp, SkipLength};
use crate::backend::target::term::{BinOp, Term};
use crate::backend::target::vars::VarScope;
use crate::backend::target::vm::{RunOutcome, TargetVm, Value, VmConfig};
use crate::config::CompilerConfig;
use crate::ir::{Expr, Function, GlobalDecl, Program, ReturnKind, Rule, Span, Stmt};

use super::error::CompileError;
use super::{generate, CompiledProgram};

fn rule(body: Vec<Stmt>) -> Rule {
    Rule {
        name: "main".to_string(),
        scope: VarScope::Global,
        body,
        span: Span::default(),
    }
}

fn program(globals: &[&str], functions: Vec<Function>, body: Vec<Stmt>) -> Program {
    Program {
        globals: globals.iter().map(|g| GlobalDecl::global(*g)).collect(),
        functions,
        rules: vec![rule(body)],
    }
}

fn function(name: &str, params: &[&str], returns: ReturnKind, body: Vec<Stmt>) -> Function {
    Function {
        name: name.to_string(),
        params: params.iter().map(|p| p.to_string()).collect(),
        returns,
        recursive: false,
        body,
        span: Span::default(),
    }
}

fn recursive(mut function: Function) -> Function {
    function.recursive = true;
    function
}

fn single_value() -> ReturnKind {
    ReturnKind::Value {
        multiple_paths: false,
    }
}

fn many_values() -> ReturnKind {
    ReturnKind::Value {
        multiple_paths: true,
    }
}

fn num(value: f64) -> Expr {
    Expr::number(value)
}

fn bin(op: BinOp, left: Expr, right: Expr) -> Expr {
    Expr::binary(op, left, right)
}

fn compile(program: &Program) -> CompiledProgram {
    generate(program, &CompilerConfig::default()).expect("generation should succeed")
}

fn run(compiled: &CompiledProgram, inputs: &[(&str, Value)]) -> (TargetVm, RunOutcome) {
    let mut vm = TargetVm::new(VmConfig {
        watchdog_budget: 100_000,
        ..VmConfig::default()
    });
    for (name, value) in inputs {
        vm.set(compiled.global(name).unwrap(), value.clone());
    }
    let outcome = vm.run(&compiled.rules[0].actions).unwrap();
    (vm, outcome)
}

fn global(compiled: &CompiledProgram, vm: &TargetVm, name: &str) -> Value {
    vm.value(compiled.global(name).unwrap())
}

/// Contiguous stack pops right before every unconditional skip, sorted
fn pops_before_unconditional_skips(actions: &[Action]) -> Vec<usize> {
    let mut counts: Vec<usize> = actions
        .iter()
        .enumerate()
        .filter(|(_, a)| matches!(a, Action::Skip { condition: None, .. }))
        .map(|(i, _)| {
            actions[..i]
                .iter()
                .rev()
                .take_while(|a| {
                    matches!(
                        a,
                        Action::Modify {
                            op: ModifyOp::RemoveByIndex,
                            ..
                        }
                    )
                })
                .count()
        })
        .collect();
    counts.sort_unstable();
    counts
}

// ========================================================================
// Statement Lowering Tests
// ========================================================================

#[test]
fn test_compile_assign_global() {
    let compiled = compile(&program(&["out"], vec![], vec![Stmt::assign("out", num(42.0))]));
    let actions = compiled.rules[0].actions.actions();
    assert_eq!(actions.len(), 1);
    assert!(matches!(actions[0], Action::Set { .. }));

    let (vm, outcome) = run(&compiled, &[]);
    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(global(&compiled, &vm, "out"), Value::Number(42.0));
}

#[test]
fn test_compile_element_assign() {
    let compiled = compile(&program(
        &["arr"],
        vec![],
        vec![
            Stmt::assign(
                "arr",
                Expr::Array {
                    items: vec![num(0.0), num(0.0), num(0.0)],
                },
            ),
            Stmt::Assign {
                target: "arr".to_string(),
                index: Some(num(1.0)),
                value: num(5.0),
            },
        ],
    ));
    let (vm, _) = run(&compiled, &[]);
    assert_eq!(global(&compiled, &vm, "arr"), Value::numbers(&[0.0, 5.0, 0.0]));
}

#[test]
fn test_compile_let_in_rule_uses_static_slot() {
    let compiled = compile(&program(
        &["out"],
        vec![],
        vec![
            Stmt::local("x", num(3.0)),
            Stmt::assign("out", bin(BinOp::Mul, Expr::var("x"), num(2.0))),
        ],
    ));
    assert!(compiled.variables.find("x").is_some_and(|v| !v.recursive));
    let (vm, _) = run(&compiled, &[]);
    assert_eq!(global(&compiled, &vm, "out"), Value::Number(6.0));
}

#[test]
fn test_unknown_variable() {
    let result = generate(
        &program(&[], vec![], vec![Stmt::assign("nowhere", num(1.0))]),
        &CompilerConfig::default(),
    );
    assert_eq!(result.unwrap_err(), CompileError::UnknownVariable("nowhere".to_string()));
}

#[test]
fn test_too_many_variables() {
    let mut config = CompilerConfig::default();
    config.variables.max_global = 1;
    let result = generate(&program(&["a", "b"], vec![], vec![]), &config);
    assert_eq!(
        result.unwrap_err(),
        CompileError::TooManyVariables {
            scope: VarScope::Global,
            max: 1
        }
    );
}

// ========================================================================
// If / Else Tests
// ========================================================================

#[test]
fn test_if_without_else_layout() {
    let compiled = compile(&program(
        &["flag", "out"],
        vec![],
        vec![Stmt::if_then(Expr::var("flag"), vec![Stmt::assign("out", num(1.0))])],
    ));
    let actions = compiled.rules[0].actions.actions();
    assert_eq!(actions.len(), 3);
    assert_eq!(actions[0].skip_length(), Some(1));
    assert_eq!(actions[2], Action::End);
}

#[test]
fn test_if_else_layout_and_execution() {
    let compiled = compile(&program(
        &["x", "out"],
        vec![],
        vec![Stmt::If {
            condition: bin(BinOp::Gt, Expr::var("x"), num(0.0)),
            then: vec![Stmt::assign("out", num(1.0))],
            otherwise: vec![Stmt::assign("out", num(2.0))],
        }],
    ));
    let list = &compiled.rules[0].actions;
    // skip_if, set, skip, end, set, end
    assert_eq!(list.len(), 6);
    assert!(matches!(
        &list.actions()[0],
        Action::Skip {
            condition: Some(Term::Binary(BinOp::Le, _, _)),
            length: SkipLength::Count(2)
        }
    ));
    assert!(matches!(
        list.actions()[2],
        Action::Skip {
            condition: None,
            length: SkipLength::Count(2)
        }
    ));
    assert_eq!(list.recompute_distances(), vec![2, 2]);

    let (vm, _) = run(&compiled, &[("x", Value::Number(5.0))]);
    assert_eq!(global(&compiled, &vm, "out"), Value::Number(1.0));
    let (vm, _) = run(&compiled, &[("x", Value::Number(-1.0))]);
    assert_eq!(global(&compiled, &vm, "out"), Value::Number(2.0));
}

// ========================================================================
// Loop Tests
// ========================================================================

#[test]
fn test_while_layout() {
    let compiled = compile(&program(
        &["flag"],
        vec![],
        vec![Stmt::while_loop(
            Expr::var("flag"),
            vec![Stmt::assign("flag", Expr::bool(false))],
        )],
    ));
    let actions = compiled.rules[0].actions.actions();
    // loop, skip_if !flag, set, end (continue), loop_if true, end (break)
    assert_eq!(actions.len(), 6);
    assert_eq!(actions[0], Action::LoopBegin);
    assert_eq!(actions[1].skip_length(), Some(3));
    assert_eq!(
        actions[4],
        Action::LoopIf {
            condition: Term::Bool(true)
        }
    );
    assert_eq!(actions[5], Action::End);
}

#[test]
fn test_while_break_continue() {
    let i = || Expr::var("i");
    let compiled = compile(&program(
        &["i", "total"],
        vec![],
        vec![
            Stmt::assign("i", num(0.0)),
            Stmt::assign("total", num(0.0)),
            Stmt::while_loop(
                bin(BinOp::Lt, i(), num(10.0)),
                vec![
                    Stmt::assign("i", bin(BinOp::Add, i(), num(1.0))),
                    Stmt::if_then(
                        bin(BinOp::Eq, i(), num(3.0)),
                        vec![Stmt::Continue {
                            span: Span::default(),
                        }],
                    ),
                    Stmt::if_then(
                        bin(BinOp::Gt, i(), num(5.0)),
                        vec![Stmt::Break {
                            span: Span::default(),
                        }],
                    ),
                    Stmt::assign("total", bin(BinOp::Add, Expr::var("total"), i())),
                ],
            ),
        ],
    ));
    let list = &compiled.rules[0].actions;
    assert_eq!(list.count(|a| matches!(a, Action::LoopBegin)), 1);
    assert_eq!(list.count(|a| matches!(a, Action::LoopIf { .. })), 1);
    list.verify_skips().unwrap();

    let (vm, _) = run(&compiled, &[]);
    assert_eq!(global(&compiled, &vm, "total"), Value::Number(12.0));
    assert_eq!(global(&compiled, &vm, "i"), Value::Number(6.0));
}

#[test]
fn test_nested_loops_break_inner_only() {
    let compiled = compile(&program(
        &["outer", "hits"],
        vec![],
        vec![
            Stmt::assign("outer", num(0.0)),
            Stmt::assign("hits", num(0.0)),
            Stmt::while_loop(
                bin(BinOp::Lt, Expr::var("outer"), num(3.0)),
                vec![
                    Stmt::assign("outer", bin(BinOp::Add, Expr::var("outer"), num(1.0))),
                    Stmt::while_loop(
                        Expr::bool(true),
                        vec![
                            Stmt::assign("hits", bin(BinOp::Add, Expr::var("hits"), num(1.0))),
                            Stmt::Break {
                                span: Span::default(),
                            },
                        ],
                    ),
                ],
            ),
        ],
    ));
    let (vm, _) = run(&compiled, &[]);
    assert_eq!(global(&compiled, &vm, "hits"), Value::Number(3.0));
}

#[test]
fn test_break_outside_loop() {
    let result = generate(
        &program(
            &[],
            vec![],
            vec![Stmt::Break {
                span: Span::default(),
            }],
        ),
        &CompilerConfig::default(),
    );
    assert_eq!(result.unwrap_err(), CompileError::BreakOutsideLoop);

    let result = generate(
        &program(
            &[],
            vec![],
            vec![Stmt::Continue {
                span: Span::default(),
            }],
        ),
        &CompilerConfig::default(),
    );
    assert_eq!(result.unwrap_err(), CompileError::ContinueOutsideLoop);
}

// ========================================================================
// Rule Return Tests
// ========================================================================

#[test]
fn test_rule_return_aborts() {
    let compiled = compile(&program(
        &["stop", "out"],
        vec![],
        vec![
            Stmt::if_then(Expr::var("stop"), vec![Stmt::ret(None)]),
            Stmt::assign("out", num(1.0)),
        ],
    ));
    assert_eq!(compiled.rules[0].actions.count(|a| *a == Action::Abort), 1);

    let (vm, outcome) = run(&compiled, &[("stop", Value::Bool(true))]);
    assert_eq!(outcome, RunOutcome::Aborted);
    assert_eq!(global(&compiled, &vm, "out"), Value::Null);

    let (vm, outcome) = run(&compiled, &[("stop", Value::Bool(false))]);
    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(global(&compiled, &vm, "out"), Value::Number(1.0));
}

#[test]
fn test_rule_return_value_rejected() {
    let result = generate(
        &program(&[], vec![], vec![Stmt::ret(Some(num(1.0)))]),
        &CompilerConfig::default(),
    );
    assert_eq!(
        result.unwrap_err(),
        CompileError::UnsupportedInRule("returning a value")
    );
}

// ========================================================================
// Inlined Call Tests
// ========================================================================

#[test]
fn test_inline_single_path() {
    let double = function(
        "double",
        &["x"],
        single_value(),
        vec![Stmt::ret(Some(bin(BinOp::Mul, Expr::var("x"), num(2.0))))],
    );
    let compiled = compile(&program(
        &["out"],
        vec![double],
        vec![Stmt::assign("out", Expr::call("double", vec![num(21.0)]))],
    ));
    assert!(compiled.variables.find("_doubleReturnValue").is_none());
    let (vm, _) = run(&compiled, &[]);
    assert_eq!(global(&compiled, &vm, "out"), Value::Number(42.0));
}

#[test]
fn test_inline_multiple_paths_fresh_slots_per_site() {
    let sign = function(
        "sign",
        &["x"],
        many_values(),
        vec![
            Stmt::if_then(
                bin(BinOp::Gt, Expr::var("x"), num(0.0)),
                vec![Stmt::ret(Some(num(1.0)))],
            ),
            Stmt::ret(Some(num(-1.0))),
        ],
    );
    let compiled = compile(&program(
        &["a", "b"],
        vec![sign],
        vec![
            Stmt::assign("a", Expr::call("sign", vec![num(5.0)])),
            Stmt::assign("b", Expr::call("sign", vec![num(-5.0)])),
        ],
    ));
    let first = compiled.variables.find("_signReturnValue").unwrap().slot;
    let second = compiled.variables.find("_signReturnValue_1").unwrap().slot;
    assert_ne!(first, second);
    assert_ne!(
        compiled.variables.find("sign_x").unwrap().slot,
        compiled.variables.find("sign_x_1").unwrap().slot
    );

    let (vm, _) = run(&compiled, &[]);
    assert_eq!(global(&compiled, &vm, "a"), Value::Number(1.0));
    assert_eq!(global(&compiled, &vm, "b"), Value::Number(-1.0));
}

#[test]
fn test_inline_void_function() {
    let bump = function(
        "bump",
        &[],
        ReturnKind::Void,
        vec![
            Stmt::if_then(
                bin(BinOp::Ge, Expr::var("counter"), num(5.0)),
                vec![Stmt::ret(None)],
            ),
            Stmt::assign("counter", bin(BinOp::Add, Expr::var("counter"), num(1.0))),
        ],
    );
    let compiled = compile(&program(
        &["counter", "seen"],
        vec![bump],
        vec![
            Stmt::assign("counter", num(0.0)),
            Stmt::expr(Expr::call("bump", vec![])),
            Stmt::assign("seen", Expr::call("bump", vec![])),
        ],
    ));
    let (vm, _) = run(&compiled, &[]);
    assert_eq!(global(&compiled, &vm, "counter"), Value::Number(2.0));
    assert_eq!(global(&compiled, &vm, "seen"), Value::Null);
}

#[test]
fn test_nested_inline_calls() {
    let inc = function(
        "inc",
        &["x"],
        single_value(),
        vec![Stmt::ret(Some(bin(BinOp::Add, Expr::var("x"), num(1.0))))],
    );
    let twice = function(
        "twice",
        &["x"],
        single_value(),
        vec![Stmt::ret(Some(Expr::call(
            "inc",
            vec![Expr::call("inc", vec![Expr::var("x")])],
        )))],
    );
    let compiled = compile(&program(
        &["out"],
        vec![inc, twice],
        vec![Stmt::assign("out", Expr::call("twice", vec![num(40.0)]))],
    ));
    let (vm, _) = run(&compiled, &[]);
    assert_eq!(global(&compiled, &vm, "out"), Value::Number(42.0));
}

/// bump() sets x to 100 and returns 0
fn bump() -> Function {
    function(
        "bump",
        &[],
        single_value(),
        vec![Stmt::assign("x", num(100.0)), Stmt::ret(Some(num(0.0)))],
    )
}

#[test]
fn test_operands_read_before_later_call() {
    let minus = function(
        "minus",
        &["a", "b"],
        single_value(),
        vec![Stmt::ret(Some(bin(BinOp::Sub, Expr::var("a"), Expr::var("b"))))],
    );
    let compiled = compile(&program(
        &["x", "sum", "diff", "picked"],
        vec![bump(), minus],
        vec![
            Stmt::assign("x", num(1.0)),
            Stmt::assign("sum", bin(BinOp::Add, Expr::var("x"), Expr::call("bump", vec![]))),
            Stmt::assign("x", num(1.0)),
            Stmt::assign(
                "diff",
                Expr::call("minus", vec![Expr::var("x"), Expr::call("bump", vec![])]),
            ),
            Stmt::assign("x", num(1.0)),
            Stmt::assign(
                "picked",
                Expr::Array {
                    items: vec![Expr::var("x"), Expr::call("bump", vec![]), Expr::var("x")],
                },
            ),
        ],
    ));
    let (vm, _) = run(&compiled, &[]);
    assert_eq!(global(&compiled, &vm, "sum"), Value::Number(1.0));
    assert_eq!(global(&compiled, &vm, "diff"), Value::Number(1.0));
    assert_eq!(
        global(&compiled, &vm, "picked"),
        Value::numbers(&[1.0, 0.0, 100.0])
    );
}

#[test]
fn test_constant_operands_are_not_saved() {
    let compiled = compile(&program(
        &["x", "out"],
        vec![bump()],
        vec![Stmt::assign("out", bin(BinOp::Add, num(1.0), Expr::call("bump", vec![])))],
    ));
    assert!(compiled.variables.find("operand").is_none());
    let (vm, _) = run(&compiled, &[]);
    assert_eq!(global(&compiled, &vm, "out"), Value::Number(1.0));
}

#[test]
fn test_call_arity_and_unknown_function() {
    let id = function("id", &["x"], single_value(), vec![Stmt::ret(Some(Expr::var("x")))]);
    let result = generate(
        &program(&[], vec![id], vec![Stmt::expr(Expr::call("id", vec![]))]),
        &CompilerConfig::default(),
    );
    assert_eq!(
        result.unwrap_err(),
        CompileError::InvalidArity {
            function: "id".to_string(),
            expected: 1,
            got: 0
        }
    );

    let result = generate(
        &program(&[], vec![], vec![Stmt::expr(Expr::call("ghost", vec![]))]),
        &CompilerConfig::default(),
    );
    assert_eq!(result.unwrap_err(), CompileError::UnknownFunction("ghost".to_string()));
}

// ========================================================================
// Recursive Call Tests
// ========================================================================

fn fib() -> Function {
    let n = || Expr::var("n");
    recursive(function(
        "fib",
        &["n"],
        single_value(),
        vec![
            Stmt::if_then(bin(BinOp::Lt, n(), num(2.0)), vec![Stmt::ret(Some(n()))]),
            Stmt::ret(Some(bin(
                BinOp::Add,
                Expr::call("fib", vec![bin(BinOp::Sub, n(), num(1.0))]),
                Expr::call("fib", vec![bin(BinOp::Sub, n(), num(2.0))]),
            ))),
        ],
    ))
}

/// let a = n * 2; if n <= 0 { return a }; let b = walk(n - 1);
/// while true { let c = b + 1; if c > 0 { break } }; return a + b
fn walk() -> Function {
    let n = || Expr::var("n");
    recursive(function(
        "walk",
        &["n"],
        single_value(),
        vec![
            Stmt::local("a", bin(BinOp::Mul, n(), num(2.0))),
            Stmt::if_then(
                bin(BinOp::Le, n(), num(0.0)),
                vec![Stmt::ret(Some(Expr::var("a")))],
            ),
            Stmt::local("b", Expr::call("walk", vec![bin(BinOp::Sub, n(), num(1.0))])),
            Stmt::while_loop(
                Expr::bool(true),
                vec![
                    Stmt::local("c", bin(BinOp::Add, Expr::var("b"), num(1.0))),
                    Stmt::if_then(
                        bin(BinOp::Gt, Expr::var("c"), num(0.0)),
                        vec![Stmt::Break {
                            span: Span::default(),
                        }],
                    ),
                ],
            ),
            Stmt::ret(Some(bin(BinOp::Add, Expr::var("a"), Expr::var("b")))),
        ],
    ))
}

fn assert_stacks_empty(compiled: &CompiledProgram, vm: &TargetVm) {
    for info in compiled.variables.iter().filter(|v| v.recursive) {
        assert_eq!(vm.value(info.slot), Value::Array(vec![]), "stack {}", info.name);
    }
}

#[test]
fn test_recursive_fib() {
    let compiled = compile(&program(
        &["n", "out"],
        vec![fib()],
        vec![Stmt::assign("out", Expr::call("fib", vec![Expr::var("n")]))],
    ));
    let expected = [0.0, 1.0, 1.0, 2.0, 3.0, 5.0, 8.0, 13.0, 21.0, 34.0, 55.0];
    for (n, want) in expected.iter().enumerate() {
        let (vm, outcome) = run(&compiled, &[("n", Value::Number(n as f64))]);
        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(global(&compiled, &vm, "out"), Value::Number(*want), "fib({})", n);
        assert_stacks_empty(&compiled, &vm);
    }
}

#[test]
fn test_recursive_dispatcher_shape() {
    let compiled = compile(&program(
        &["out"],
        vec![fib()],
        vec![Stmt::assign("out", Expr::call("fib", vec![num(4.0)]))],
    ));
    let list = &compiled.rules[0].actions;
    // One dispatcher loop, no native recursion
    assert_eq!(list.count(|a| matches!(a, Action::LoopBegin)), 1);
    // One dispatch skip per self-call site
    let dispatch = list.count(|a| {
        matches!(
            a,
            Action::Skip {
                condition: Some(Term::Binary(BinOp::Eq, _, right)),
                ..
            } if matches!(**right, Term::Number(n) if n == 1.0 || n == 2.0)
        )
    });
    assert_eq!(dispatch, 2);
    assert!(compiled.variables.find("fib_n").is_some_and(|v| v.recursive));
    assert!(compiled.variables.find("fib_return_address").is_some_and(|v| v.recursive));
    assert!(compiled.variables.find("_fibReturnValue").is_some());
}

#[test]
fn test_recursive_pops_match_live_locals() {
    let compiled = compile(&program(
        &["out"],
        vec![walk()],
        vec![Stmt::assign("out", Expr::call("walk", vec![num(3.0)]))],
    ));
    let actions = compiled.rules[0].actions.actions();
    // self call: 0, break: c, `return a`: a + n + temp,
    // `return a + b` and the implicit return: b + a + n + temp
    assert_eq!(pops_before_unconditional_skips(actions), vec![0, 1, 3, 4, 4]);

    let (vm, _) = run(&compiled, &[]);
    assert_eq!(global(&compiled, &vm, "out"), Value::Number(12.0));
    assert_stacks_empty(&compiled, &vm);
}

#[test]
fn test_recursive_operand_saved_per_frame() {
    // level = n; return level + depth(n - 1), with `level` a global every
    // frame overwrites
    let n = || Expr::var("n");
    let depth = recursive(function(
        "depth",
        &["n"],
        single_value(),
        vec![
            Stmt::if_then(bin(BinOp::Le, n(), num(0.0)), vec![Stmt::ret(Some(num(0.0)))]),
            Stmt::assign("level", n()),
            Stmt::ret(Some(bin(
                BinOp::Add,
                Expr::var("level"),
                Expr::call("depth", vec![bin(BinOp::Sub, n(), num(1.0))]),
            ))),
        ],
    ));
    let compiled = compile(&program(
        &["level", "out"],
        vec![depth],
        vec![Stmt::assign("out", Expr::call("depth", vec![num(4.0)]))],
    ));
    assert!(compiled.variables.find("depth_temp1").is_some_and(|v| v.recursive));

    let (vm, outcome) = run(&compiled, &[]);
    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(global(&compiled, &vm, "out"), Value::Number(10.0));
    assert_stacks_empty(&compiled, &vm);
}

#[test]
fn test_two_outside_call_sites_get_two_dispatchers() {
    let compiled = compile(&program(
        &["a", "b"],
        vec![fib()],
        vec![
            Stmt::assign("a", Expr::call("fib", vec![num(5.0)])),
            Stmt::assign("b", Expr::call("fib", vec![num(6.0)])),
        ],
    ));
    let list = &compiled.rules[0].actions;
    assert_eq!(list.count(|a| matches!(a, Action::LoopBegin)), 2);
    assert!(compiled.variables.find("fib_n_1").is_some());

    let (vm, _) = run(&compiled, &[]);
    assert_eq!(global(&compiled, &vm, "a"), Value::Number(5.0));
    assert_eq!(global(&compiled, &vm, "b"), Value::Number(8.0));
}

#[test]
fn test_mutual_recursion_rejected() {
    let f = recursive(function(
        "f",
        &["x"],
        single_value(),
        vec![Stmt::ret(Some(Expr::call("g", vec![Expr::var("x")])))],
    ));
    let g = function(
        "g",
        &["x"],
        single_value(),
        vec![Stmt::ret(Some(Expr::call("f", vec![Expr::var("x")])))],
    );
    let result = generate(
        &program(&[], vec![f, g], vec![Stmt::expr(Expr::call("f", vec![num(1.0)]))]),
        &CompilerConfig::default(),
    );
    assert_eq!(
        result.unwrap_err(),
        CompileError::MutualRecursion {
            function: "f".to_string(),
            caller: "g".to_string()
        }
    );
}

#[test]
fn test_undeclared_recursion_rejected() {
    let h = function(
        "h",
        &["x"],
        single_value(),
        vec![Stmt::ret(Some(Expr::call("h", vec![Expr::var("x")])))],
    );
    let result = generate(
        &program(&[], vec![h], vec![Stmt::expr(Expr::call("h", vec![num(1.0)]))]),
        &CompilerConfig::default(),
    );
    assert_eq!(
        result.unwrap_err(),
        CompileError::UndeclaredRecursion {
            function: "h".to_string()
        }
    );
}

// ========================================================================
// Skip Binding Invariant Tests
// ========================================================================

#[test]
fn test_every_skip_bound_and_consistent() {
    let compiled = compile(&program(
        &["out", "other"],
        vec![fib(), walk()],
        vec![
            Stmt::assign("out", Expr::call("fib", vec![num(6.0)])),
            Stmt::assign("other", Expr::call("walk", vec![num(2.0)])),
        ],
    ));
    let list = &compiled.rules[0].actions;
    assert_eq!(
        list.count(|a| matches!(
            a,
            Action::Skip {
                length: SkipLength::Unbound,
                ..
            }
        )),
        0
    );
    for binding in list.bindings() {
        assert_eq!(list.actions()[binding.end], Action::End);
        assert_eq!(
            list.actions()[binding.start].skip_length(),
            Some(binding.end - binding.start - 1)
        );
    }
    // Recomputing from the binding table is stable
    let first = list.recompute_distances();
    list.verify_skips().unwrap();
    assert_eq!(list.recompute_distances(), first);
    list.verify_skips().unwrap();
}

// ========================================================================
// Bake Tests
// ========================================================================

fn line_graph() -> Vec<(&'static str, Value)> {
    vec![
        (
            "nodes",
            Value::Array(vec![
                Value::numbers(&[0.0, 0.0]),
                Value::numbers(&[1.0, 0.0]),
                Value::numbers(&[2.0, 0.0]),
            ]),
        ),
        (
            "segments",
            Value::Array(vec![Value::numbers(&[0.0, 1.0]), Value::numbers(&[1.0, 2.0])]),
        ),
        ("attributes", Value::numbers(&[0.0, 0.0])),
    ]
}

fn bake_stmt(enabled: f64, progress: Option<&str>) -> Stmt {
    Stmt::Bake {
        result: "paths".to_string(),
        nodes: "nodes".to_string(),
        segments: "segments".to_string(),
        attributes: "attributes".to_string(),
        enabled: num(enabled),
        progress: progress.map(str::to_string),
        progress_snapshot: None,
    }
}

fn bake_program(enabled: f64) -> Program {
    program(
        &["nodes", "segments", "attributes", "paths"],
        vec![],
        vec![bake_stmt(enabled, None)],
    )
}

fn parents_of(compiled: &CompiledProgram, vm: &TargetVm) -> Value {
    global(compiled, vm, "paths").as_array()[Bakemap::PARENTS].clone()
}

#[test]
fn test_bake_line_graph_parents() {
    let compiled = compile(&bake_program(1.0));
    let (vm, outcome) = run(&compiled, &line_graph());
    assert_eq!(outcome, RunOutcome::Completed);
    assert_eq!(
        parents_of(&compiled, &vm),
        Value::Array(vec![
            Value::numbers(&[0.0, 0.0, 1.0]),
            Value::numbers(&[1.0, 1.0, 1.0]),
            Value::numbers(&[1.0, 2.0, 2.0]),
        ])
    );
    // Nine ticks, one yield
    assert_eq!(vm.stats().waits, 1);
}

#[test]
fn test_bake_single_guarded_wait() {
    let compiled = compile(&bake_program(1.0));
    let actions = compiled.rules[0].actions.actions();
    let waits: Vec<usize> = actions
        .iter()
        .enumerate()
        .filter(|(_, a)| **a == Action::Wait)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(waits.len(), 1);
    match &actions[waits[0] - 1] {
        Action::Skip {
            condition: Some(Term::Binary(BinOp::Mod, _, interval)),
            length: SkipLength::Count(1),
        } => assert_eq!(**interval, Term::Number(6.0)),
        other => panic!("expected wait guard, got {}", other),
    }
}

#[test]
fn test_bake_respects_disabled_segments() {
    let mut inputs = line_graph();
    inputs[2] = ("attributes", Value::numbers(&[0.0, 2.0]));
    let compiled = compile(&bake_program(1.0));
    let (vm, _) = run(&compiled, &inputs);
    assert_eq!(
        parents_of(&compiled, &vm),
        Value::Array(vec![
            Value::numbers(&[0.0, 0.0, -1.0]),
            Value::numbers(&[1.0, 1.0, -1.0]),
            Value::numbers(&[-1.0, -1.0, 2.0]),
        ])
    );

    // Sharing a bit with the mask makes the segment usable again
    let compiled = compile(&bake_program(3.0));
    let (vm, _) = run(&compiled, &inputs);
    assert_eq!(
        parents_of(&compiled, &vm).as_array()[0],
        Value::numbers(&[0.0, 0.0, 1.0])
    );
}

#[test]
fn test_bake_progress_binding_readable_later() {
    let mut baking = program(
        &["nodes", "segments", "attributes", "paths", "seen", "shown"],
        vec![],
        vec![
            bake_stmt(1.0, Some("bake_progress")),
            Stmt::assign("seen", Expr::var("bake_progress")),
        ],
    );
    let mut report = rule(vec![Stmt::assign("shown", Expr::var("bake_progress"))]);
    report.name = "report".to_string();
    baking.rules.push(report);

    let compiled = compile(&baking);
    assert!(compiled.binding("bake_progress").is_some());
    assert!(compiled.variables.find("bake_progress").is_none());

    let (mut vm, _) = run(&compiled, &line_graph());
    assert_eq!(global(&compiled, &vm, "seen"), Value::Number(1.0));
    vm.run(&compiled.rules[1].actions).unwrap();
    assert_eq!(global(&compiled, &vm, "shown"), Value::Number(1.0));
}

#[test]
fn test_bake_progress_binding_is_read_only() {
    let globals = ["nodes", "segments", "attributes", "paths"];
    let result = generate(
        &program(
            &globals,
            vec![],
            vec![
                bake_stmt(1.0, Some("bake_progress")),
                Stmt::assign("bake_progress", num(0.0)),
            ],
        ),
        &CompilerConfig::default(),
    );
    assert_eq!(
        result.unwrap_err(),
        CompileError::ReadOnlyBinding("bake_progress".to_string())
    );

    let result = generate(
        &program(&globals, vec![], vec![bake_stmt(1.0, Some("paths"))]),
        &CompilerConfig::default(),
    );
    assert_eq!(result.unwrap_err(), CompileError::DuplicateBinding("paths".to_string()));
}
