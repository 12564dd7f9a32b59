//! Core implementation of BlockScript: an embeddable, statically-typed
//! scripting language and virtual machine for per-frame render logic and
//! procedural content. The main entry point is [`Compiler::compile`], which
//! runs a source string through parsing, type-checking, and canonicalization
//! into an [`asm::Assembly`] a [`Vm`] can execute.
//!
//! A script runs against a [`Host`], which registers the native intrinsics
//! and object properties the script is allowed to call into -- playing the
//! same gatekeeping role a fixed hardware description plays for a
//! register-machine VM, generalized to an open-ended native surface instead
//! of a fixed register file.
//!
//! ```
//! use blockscript::{Compiler, Host, HostConfig};
//!
//! let mut host = Host::new(HostConfig::default());
//! blockscript::host::stdlib::register_all(&mut host);
//!
//! let source = "int x = 2 + 3 * 4;".to_string();
//! let compiled = Compiler::compile(source, host).unwrap();
//!
//! let mut vm = compiled.vm();
//! vm.run().unwrap();
//! assert!(vm.terminated());
//! assert!(vm.error().is_none());
//! ```

#![deny(clippy::all)]

mod alloc;
pub mod asm;
pub mod ast;
mod canon;
mod check;
mod consts;
pub mod error;
pub mod host;
mod machine;
mod parse;
pub mod strings;
pub mod symbols;
pub mod types;
mod util;

pub use consts::{DEFAULT_MAX_CYCLE_COUNT, DEFAULT_TIME_BUDGET_MS};
pub use host::{CallContext, Host, HostConfig};
pub use machine::{HeapObject, Value, Vm};
pub use util::Span;

use error::{CompileError, WithSource};
use strings::StringPool;
use symbols::SymbolTable;
use types::TypeTable;

/// Drives a source program through the compilation pipeline. `T` is the
/// program's current representation, changing at each stage: it starts as
/// `()`, becomes a parsed [`ast::Program<Span>`], then a checked
/// [`ast::Program<ast::Checked>`], then a canonical [`asm::Assembly`]. See
/// the crate-level documentation for how to drive one end to end.
pub struct Compiler<T> {
    // Deliberately private, to prevent direct construction outside of the
    // pipeline stages in `parse`/`check`/`canon`.
    source: String,
    host: Host,
    strings: StringPool,
    symtab: SymbolTable,
    ast: T,
}

impl Compiler<()> {
    /// Compile a source program against `host`'s registered intrinsics and
    /// properties, running it through parsing, type-checking, and
    /// canonicalization. The resulting [`Compiler<asm::Assembly>`] can be
    /// handed to [`Compiler::vm`] to execute, or inspected directly for
    /// tooling (a disassembler, a language server).
    pub fn compile(
        source: String,
        host: Host,
    ) -> Result<Compiler<asm::Assembly>, WithSource<CompileError>> {
        let mut strings = StringPool::new();
        let types = TypeTable::new(&mut strings);
        let symtab = SymbolTable::new(types);
        Self {
            source,
            host,
            strings,
            symtab,
            ast: (),
        }
        .debug()
        .parse()?
        .debug()
        .check()?
        .debug()
        .canonicalize()
        .debug()
        .ok()
    }
}

impl Compiler<asm::Assembly> {
    /// The canonical assembly this program was lowered to.
    pub fn assembly(&self) -> &asm::Assembly {
        &self.ast
    }

    pub fn symtab(&self) -> &SymbolTable {
        &self.symtab
    }

    pub fn strings(&self) -> &StringPool {
        &self.strings
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    /// Build a [`Vm`] ready to execute this program from its global entry
    /// point. Borrows from `self`, so the compiled program must outlive any
    /// `Vm` built from it.
    pub fn vm(&self) -> Vm<'_> {
        Vm::new(&self.ast, &self.symtab, &self.strings, &self.host, &self.source)
    }
}

impl<T> Compiler<T> {
    /// Print out the current state of this compiler, if debug mode is
    /// enabled. Takes `self` and returns it unchanged, so it threads through
    /// the pipeline's call chain.
    fn debug(self) -> Self
    where
        T: std::fmt::Debug,
    {
        debug!(println!("{:?}", &self.ast));
        self
    }

    /// `Result::ok`-style passthrough for the infallible final pipeline
    /// stage, so `compile` can keep using `?` up through `check` without an
    /// awkward `Ok(...)` wrapping the whole chain.
    fn ok<E>(self) -> Result<Self, E> {
        Ok(self)
    }
}
