//! Integration tests for BlockScript programs that should fail during
//! compilation (parsing or type-checking), never during execution.

use blockscript::{error::CompileError, Compiler, Host, HostConfig};

/// Compiles `src` against a bare host (no stdlib registered) and returns
/// the first accumulated error. Panics if compilation succeeds.
fn expect_compile_error(src: &str) -> CompileError {
    let host = Host::new(HostConfig::default());
    let err = Compiler::compile(src.to_string(), host)
        .err()
        .unwrap_or_else(|| panic!("expected `{}` to fail to compile", src));
    assert!(err.error_count() >= 1);
    err.errors()[0].error().clone()
}

#[test]
fn syntax_error_on_missing_expression() {
    let error = expect_compile_error("int x = ;");
    assert!(matches!(error, CompileError::Syntax { .. }));
}

#[test]
fn undefined_symbol_is_rejected() {
    let error = expect_compile_error("int x = y;");
    assert!(matches!(error, CompileError::UndefinedSymbol { name } if name == "y"));
}

#[test]
fn assigning_incompatible_types_is_a_type_mismatch() {
    let error = expect_compile_error("float2 v = 1;");
    assert!(matches!(error, CompileError::TypeMismatch { .. }));
}

#[test]
fn calling_an_undeclared_function_has_no_matching_overload() {
    let error = expect_compile_error("int x = foo(1);");
    assert!(matches!(error, CompileError::NoMatchingOverload { name } if name == "foo"));
}

#[test]
fn redefining_a_function_body_is_a_duplicate_definition() {
    let error = expect_compile_error(
        "
        int f(int n) { return n; }
        int f(int n) { return n; }
        ",
    );
    assert!(matches!(error, CompileError::DuplicateDefinition { name } if name == "f"));
}

#[test]
fn assigning_to_a_literal_is_an_invalid_lvalue() {
    let error = expect_compile_error("1 = 2;");
    assert!(matches!(error, CompileError::InvalidLvalue));
}

#[test]
fn return_outside_a_function_body_is_rejected() {
    let error = expect_compile_error("return 1;");
    assert!(matches!(error, CompileError::ReturnOutsideFunction));
}

#[test]
fn invalid_swizzle_component_is_rejected() {
    let error = expect_compile_error("float2 v = float2(1.0, 2.0); float x = v.z;");
    assert!(matches!(error, CompileError::InvalidSwizzle { .. }));
}
