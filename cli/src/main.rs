#![deny(clippy::all)]

use anyhow::Context;
use blockscript::host::{CallContext, PropertyCallback};
use blockscript::{host, Compiler, Host, HostConfig, Value};
use serde::de::DeserializeOwned;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::{fs, path::PathBuf, process};
use structopt::StructOpt;

/// Backing store for every `Vec3` instance handed out this run, keyed by
/// heap handle. A real embedder would back this with whatever already holds
/// its scene state; this one is just a flat map for the demo.
type Vec3Store = Rc<RefCell<HashMap<u32, [f32; 3]>>>;

/// Registers `Vec3` as an object-reference type with `x`/`y`/`z` float
/// properties, the way a rendering host would expose a vector/transform
/// type to script without making it a built-in language primitive.
fn register_vec3_type(host: &mut Host, store: &Vec3Store) {
    let components = [("x", 0usize), ("y", 1), ("z", 2)];
    let mut properties = Vec::new();
    for (name, index) in components {
        let get_store = Rc::clone(store);
        let set_store = Rc::clone(store);
        let callback = host.register_property(PropertyCallback {
            get: Some(Box::new(move |handle, ctx: &mut CallContext| {
                ctx.set_ret_f32(get_store.borrow()[&handle][index]);
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

/// The sub-command to execute.
#[derive(Debug, StructOpt)]
enum Command {
    /// Compile source code and print the canonical assembly.
    #[structopt(name = "compile")]
    Compile {
        /// Path to a host config file, in JSON format. If not provided, a
        /// default config will be used.
        #[structopt(parse(from_os_str), long = "config")]
        config_path: Option<PathBuf>,
        /// Path to the source code file
        #[structopt(parse(from_os_str), long = "source", short = "s")]
        source_path: PathBuf,
    },

    /// Compile and execute source code from its global entry point.
    #[structopt(name = "run")]
    Run {
        /// Path to a host config file, in JSON format. If not provided, a
        /// default config will be used.
        #[structopt(parse(from_os_str), long = "config")]
        config_path: Option<PathBuf>,
        /// Path to the source code file
        #[structopt(parse(from_os_str), long = "source", short = "s")]
        source_path: PathBuf,
    },
}

/// BlockScript executable, for compiling and executing BlockScript programs
#[derive(Debug, StructOpt)]
#[structopt(name = "blockscript")]
struct Opt {
    #[structopt(subcommand)]
    cmd: Command,
}

fn read_file(path: &PathBuf) -> anyhow::Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read file {:?}", path))
}

/// Loads a host config from a file. If the path is `None`, returns the
/// default config instead.
fn load_spec<T: Default + DeserializeOwned>(path_opt: &Option<PathBuf>) -> anyhow::Result<T> {
    match path_opt {
        None => Ok(T::default()),
        Some(path) => {
            let spec_str = read_file(path)?;
            Ok(serde_json::from_str(&spec_str)?)
        }
    }
}

/// Builds a [`Host`] carrying every stdlib intrinsic
/// (`sqrt`/`sin`/`cos`/`abs`/`min`/`max`/`lerp`), a `print` demo intrinsic
/// for each scalar type, and a toy `Vec3` object-reference type, so a
/// script can declare `Vec3 v;` and read/write `v.x`/`v.y`/`v.z`. A real
/// embedder registers its own intrinsics and object types on top of this
/// the same way.
fn build_host(config: HostConfig) -> (Host, Vec3Store) {
    let mut host = Host::new(config);
    host::stdlib::register_all(&mut host);

    let print_int = host.register_intrinsic(|ctx| {
        println!("{}", ctx.arg_i32(0));
        Ok(())
    });
    host.register_function("print", vec!["int"], "int", print_int);
    let print_float = host.register_intrinsic(|ctx| {
        println!("{}", ctx.arg_f32(0));
        Ok(())
    });
    host.register_function("print", vec!["float"], "float", print_float);

    let store: Vec3Store = Rc::new(RefCell::new(HashMap::new()));
    register_vec3_type(&mut host, &store);
    (host, store)
}

fn run(opt: Opt) -> anyhow::Result<()> {
    match opt.cmd {
        Command::Compile {
            config_path,
            source_path,
        } => {
            let config: HostConfig = load_spec(&config_path)?;
            let source = read_file(&source_path)?;
            let (host, _store) = build_host(config);
            let compiled =
                Compiler::compile(source, host).map_err(|e| anyhow::anyhow!("{:#}", e))?;
            print!("{}", compiled.assembly());
        }

        Command::Run {
            config_path,
            source_path,
        } => {
            let config: HostConfig = load_spec(&config_path)?;
            let source = read_file(&source_path)?;
            let (host, store) = build_host(config);
            let compiled =
                Compiler::compile(source, host).map_err(|e| anyhow::anyhow!("{:#}", e))?;

            let mut vm = compiled.vm();

            // Hand every global `Vec3` a fresh, zeroed instance before the
            // script gets to run -- the same seeding a real embedder would
            // do for its own object-reference globals (a scene root, a
            // render target) ahead of `Vm::run`.
            if let Some(vec3_ty) = compiled
                .strings()
                .find("Vec3")
                .and_then(|sym| compiled.symtab().find_by_name(sym))
            {
                let globals: Vec<_> = compiled
                    .symtab()
                    .frame(compiled.symtab().globals)
                    .entries
                    .iter()
                    .filter(|entry| entry.ty == vec3_ty)
                    .map(|entry| entry.offset)
                    .collect();
                for offset in globals {
                    let handle = vm.insert_heap_object(vec3_ty, Box::new(()));
                    store.borrow_mut().insert(handle, [0.0, 0.0, 0.0]);
                    vm.write_global(offset, Value::Object(handle));
                }
            }

            let success = vm.run().is_ok();

            println!(
                "Cycles: {}\nProgram completed with {}",
                vm.cycle_count(),
                if success { "SUCCESS" } else { "FAILURE" },
            );
            if let Some(err) = vm.error() {
                println!("{:#}", err);
            }
        }
    }
    Ok(())
}

fn main() {
    let exit_code = match run(Opt::from_args()) {
        Ok(_) => 0,
        Err(err) => {
            eprintln!("{:#}", err);
            1
        }
    };
    process::exit(exit_code);
}
