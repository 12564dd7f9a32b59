//! Integration tests for BlockScript programs that compile cleanly but
//! fail during execution.

use blockscript::{error::RuntimeError, Compiler, Host, HostConfig};

/// Compiles `src` against a bare host and runs it to completion, returning
/// the runtime error it halted on. Panics if compilation or execution
/// succeeds.
fn expect_runtime_error(host: Host, src: &str) -> RuntimeError {
    let compiled = Compiler::compile(src.to_string(), host)
        .unwrap_or_else(|e| panic!("expected `{}` to compile, got {:#}", src, e));
    let mut vm = compiled.vm();
    let result = vm.run();
    assert!(result.is_err(), "expected `{}` to fail at runtime", src);
    vm.error().unwrap().errors()[0].error().clone()
}

#[test]
fn division_by_zero_halts_the_vm() {
    let error = expect_runtime_error(
        Host::new(HostConfig::default()),
        "int z = 0; int x = 1 / z;",
    );
    assert!(matches!(error, RuntimeError::DivideByZero));
}

#[test]
fn modulo_by_zero_halts_the_vm() {
    let error = expect_runtime_error(
        Host::new(HostConfig::default()),
        "int z = 0; int x = 1 % z;",
    );
    assert!(matches!(error, RuntimeError::DivideByZero));
}

#[test]
fn out_of_bounds_array_access_halts_the_vm() {
    let error = expect_runtime_error(
        Host::new(HostConfig::default()),
        "
        static_array<int, 3> xs;
        int i = 5;
        xs[i] = 1;
        ",
    );
    assert!(matches!(
        error,
        RuntimeError::IndexOutOfBounds { index: 5, len: 3 }
    ));
}

#[test]
fn runaway_loop_hits_the_cycle_limit() {
    let mut config = HostConfig::default();
    config.max_cycle_count = 50;
    let error = expect_runtime_error(
        Host::new(config),
        "int i = 0; while (i < 1000000) { i = i + 1; }",
    );
    assert!(matches!(error, RuntimeError::TooManyCycles));
}
