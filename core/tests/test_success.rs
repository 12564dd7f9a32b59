//! Integration tests for BlockScript programs that should compile and run
//! to a successful outcome. Since the public API exposes no way to peek at
//! VM memory from outside the crate, success is observed the way a host
//! actually would: through values passed to a registered native function.

use std::cell::RefCell;
use std::rc::Rc;

use blockscript::{host, Compiler, Host, HostConfig};

/// Builds a host with the stdlib intrinsics plus a single `output(int)`
/// function that appends its argument to a shared buffer.
fn host_with_output() -> (Host, Rc<RefCell<Vec<i32>>>) {
    let mut host = Host::new(HostConfig::default());
    host::stdlib::register_all(&mut host);
    let output = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&output);
    let id = host.register_intrinsic(move |ctx| {
        sink.borrow_mut().push(ctx.arg_i32(0));
        Ok(())
    });
    host.register_function("output", vec!["int"], "int", id);
    (host, output)
}

/// Compiles and runs `src` to completion, panicking on a compile or runtime
/// error, and returns the values passed to `output` along the way.
fn run_to_success(src: &str) -> Vec<i32> {
    let (host, output) = host_with_output();
    let compiled = Compiler::compile(src.to_string(), host)
        .unwrap_or_else(|e| panic!("compile failed: {:#}", e));
    let mut vm = compiled.vm();
    vm.run().unwrap_or_else(|e| panic!("runtime error: {:#}", e));
    assert!(vm.terminated());
    assert!(vm.error().is_none());
    output.borrow().clone()
}

#[test]
fn arithmetic_and_variable_assignment() {
    let values = run_to_success("int x = 2 + 3 * 4; output(x);");
    assert_eq!(values, vec![14]);
}

#[test]
fn while_loop_counts_to_ten() {
    let values = run_to_success("int i = 0; while (i < 10) { output(i); i = i + 1; }");
    assert_eq!(values, (0..10).collect::<Vec<_>>());
}

#[test]
fn if_else_chain_picks_the_right_branch() {
    let values = run_to_success(
        "
        int x = 7;
        if (x < 5) {
            output(0);
        } else if (x < 10) {
            output(1);
        } else {
            output(2);
        }
        ",
    );
    assert_eq!(values, vec![1]);
}

#[test]
fn recursive_function_call() {
    let values = run_to_success(
        "
        int fact(int n) {
            if (n <= 1) { return 1; }
            return n * fact(n - 1);
        }
        output(fact(5));
        ",
    );
    assert_eq!(values, vec![120]);
}

#[test]
fn struct_field_assignment_and_read() {
    let values = run_to_success(
        "
        struct P { int a; int b; }
        P p;
        p.a = 3;
        p.b = 4;
        output(p.a + p.b);
        ",
    );
    assert_eq!(values, vec![7]);
}

#[test]
fn array_indexing() {
    let values = run_to_success(
        "
        static_array<int, 3> xs;
        xs[0] = 10;
        xs[1] = 20;
        xs[2] = 30;
        output(xs[0] + xs[1] + xs[2]);
        ",
    );
    assert_eq!(values, vec![60]);
}

#[test]
fn stdlib_sqrt_and_lerp() {
    let mut host = Host::new(HostConfig::default());
    host::stdlib::register_all(&mut host);
    let captured = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&captured);
    let id = host.register_intrinsic(move |ctx| {
        sink.borrow_mut().push(ctx.arg_f32(0));
        Ok(())
    });
    host.register_function("output_f", vec!["float"], "float", id);

    let src = "
        float a = sqrt(16.0);
        float b = lerp(0.0, 10.0, 0.5);
        output_f(a);
        output_f(b);
    ";
    let compiled = Compiler::compile(src.to_string(), host).unwrap();
    let mut vm = compiled.vm();
    vm.run().unwrap();

    let values = captured.borrow();
    assert!((values[0] - 4.0).abs() < 1e-6);
    assert!((values[1] - 5.0).abs() < 1e-6);
}

/// Builds a host with the stdlib intrinsics plus a single `output_f(float)`
/// function that appends its argument to a shared buffer.
fn host_with_float_output() -> (Host, Rc<RefCell<Vec<f32>>>) {
    let mut host = Host::new(HostConfig::default());
    host::stdlib::register_all(&mut host);
    let captured = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&captured);
    let id = host.register_intrinsic(move |ctx| {
        sink.borrow_mut().push(ctx.arg_f32(0));
        Ok(())
    });
    host.register_function("output_f", vec!["float"], "float", id);
    (host, captured)
}

#[test]
fn vector_constructor_and_contiguous_swizzle() {
    let (host, captured) = host_with_float_output();
    let src = "
        float4 v = float4(1.0, 2.0, 3.0, 4.0);
        float3 xyz = v.xyz;
        output_f(xyz.x);
        output_f(xyz.y);
        output_f(xyz.z);
    ";
    let compiled = Compiler::compile(src.to_string(), host).unwrap();
    let mut vm = compiled.vm();
    vm.run().unwrap();
    assert_eq!(*captured.borrow(), vec![1.0, 2.0, 3.0]);
}

#[test]
fn vector_swizzle_non_contiguous_read() {
    let (host, captured) = host_with_float_output();
    let src = "
        float4 v = float4(1.0, 2.0, 3.0, 4.0);
        float2 w = v.zx;
        output_f(w.x);
        output_f(w.y);
    ";
    let compiled = Compiler::compile(src.to_string(), host).unwrap();
    let mut vm = compiled.vm();
    vm.run().unwrap();
    assert_eq!(*captured.borrow(), vec![3.0, 1.0]);
}

#[test]
fn vector_swizzle_non_contiguous_write_as_statement() {
    let (host, captured) = host_with_float_output();
    let src = "
        float4 v = float4(1.0, 2.0, 3.0, 4.0);
        v.zx = float2(10.0, 20.0);
        output_f(v.x);
        output_f(v.y);
        output_f(v.z);
        output_f(v.w);
    ";
    let compiled = Compiler::compile(src.to_string(), host).unwrap();
    let mut vm = compiled.vm();
    vm.run().unwrap();
    assert_eq!(*captured.borrow(), vec![20.0, 2.0, 10.0, 4.0]);
}

#[test]
fn vector_swizzle_non_contiguous_write_via_nested_assignment() {
    let (host, captured) = host_with_float_output();
    let src = "
        float4 v = float4(1.0, 2.0, 3.0, 4.0);
        float2 w = float2(10.0, 20.0);
        float2 u;
        u = (v.zx = w);
        output_f(v.x);
        output_f(v.z);
        output_f(u.x);
        output_f(u.y);
    ";
    let compiled = Compiler::compile(src.to_string(), host).unwrap();
    let mut vm = compiled.vm();
    vm.run().unwrap();
    assert_eq!(*captured.borrow(), vec![20.0, 10.0, 10.0, 20.0]);
}
