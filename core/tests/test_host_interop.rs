//! Integration tests for the host interop surface: calling a native function
//! by name, reading/writing properties on a host-registered object type, and
//! seeding global state with a heap object handle before running.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use blockscript::host::{CallContext, PropertyCallback};
use blockscript::{Compiler, Host, HostConfig, Value};

/// Shared backing store for `Vec3` instances, keyed by heap handle. Stands
/// in for whatever a real host would use (a component store, a scene
/// graph) -- the property callbacks only ever see the handle, never the VM.
type Vec3Store = Rc<RefCell<HashMap<u32, [f32; 3]>>>;

fn register_vec3_type(host: &mut Host, store: &Vec3Store) {
    let components = [("x", 0usize), ("y", 1), ("z", 2)];
    let mut properties = Vec::new();
    for (name, index) in components {
        let get_store = Rc::clone(store);
        let set_store = Rc::clone(store);
        let callback = host.register_property(PropertyCallback {
            get: Some(Box::new(move |handle, ctx: &mut CallContext| {
                let value = get_store.borrow()[&handle][index];
                ctx.set_ret_f32(value);
                Ok(())
            })),
            set: Some(Box::new(move |handle, ctx: &CallContext| {
                set_store.borrow_mut().get_mut(&handle).unwrap()[index] = ctx.arg_f32(0);
                Ok(())
            })),
        });
        properties.push((name, "float", callback));
    }
    host.register_object_type("Vec3", properties);
}

#[test]
fn native_function_is_callable_by_name() {
    let mut host = Host::new(HostConfig::default());
    let captured = Rc::new(RefCell::new(0i32));
    let sink = Rc::clone(&captured);
    let id = host.register_intrinsic(move |ctx| {
        *sink.borrow_mut() = ctx.arg_i32(0) * 2;
        Ok(())
    });
    host.register_function("double_it", vec!["int"], "int", id);

    let compiled = Compiler::compile("double_it(21);".to_string(), host).unwrap();
    let mut vm = compiled.vm();
    vm.run().unwrap();
    assert!(vm.terminated());
    assert_eq!(*captured.borrow(), 42);
}

#[test]
fn unresolvable_signature_is_silently_inert() {
    // "Widget" is never registered as a type, so this declaration can't be
    // resolved and is simply skipped rather than failing the whole compile.
    let mut host = Host::new(HostConfig::default());
    let id = host.register_intrinsic(|_ctx| Ok(()));
    host.register_function("touch", vec!["Widget"], "int", id);

    let compiled = Compiler::compile("int x = 1;".to_string(), host);
    assert!(compiled.is_ok());
}

#[test]
fn object_property_read_and_write_round_trip_through_a_heap_handle() {
    let store: Vec3Store = Rc::new(RefCell::new(HashMap::new()));
    let mut host = Host::new(HostConfig::default());
    blockscript::host::stdlib::register_all(&mut host);
    register_vec3_type(&mut host, &store);

    let captured = Rc::new(RefCell::new(0.0f32));
    let sink = Rc::clone(&captured);
    let output_id = host.register_intrinsic(move |ctx| {
        *sink.borrow_mut() = ctx.arg_f32(0);
        Ok(())
    });
    host.register_function("output", vec!["float"], "float", output_id);

    let src = "
        Vec3 v;
        v.x = 10.0;
        v.y = 20.0;
        output(v.x + v.y + v.z);
    ";
    let compiled = Compiler::compile(src.to_string(), host).unwrap();

    let vec3_ty = compiled
        .symtab()
        .find_by_name(compiled.strings().find("Vec3").unwrap())
        .unwrap();
    let global_entry = compiled
        .symtab()
        .frame(compiled.symtab().globals)
        .find(compiled.strings().find("v").unwrap())
        .unwrap()
        .clone();

    let mut vm = compiled.vm();
    let handle = vm.insert_heap_object(vec3_ty, Box::new(()));
    store.borrow_mut().insert(handle, [1.0, 2.0, 3.0]);
    vm.write_global(global_entry.offset, Value::Object(handle));

    vm.run().unwrap_or_else(|e| panic!("runtime error: {:#}", e));
    assert!(vm.terminated());

    // x and y were overwritten by the script, z is untouched.
    assert_eq!(store.borrow()[&handle], [10.0, 20.0, 3.0]);
    assert!((*captured.borrow() - 33.0).abs() < 1e-6);
}

#[test]
fn read_global_reports_the_value_written_before_run() {
    let host = Host::new(HostConfig::default());
    let compiled = Compiler::compile("int counter = 0;".to_string(), host).unwrap();

    let global_entry = compiled
        .symtab()
        .frame(compiled.symtab().globals)
        .find(compiled.strings().find("counter").unwrap())
        .unwrap()
        .clone();

    let mut vm = compiled.vm();
    vm.write_global(global_entry.offset, Value::Int(7));
    assert_eq!(vm.read_global(global_entry.offset, global_entry.ty), Value::Int(7));
}
