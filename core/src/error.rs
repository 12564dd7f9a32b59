//! All error-related BlockScript types.
//!
//! Errors partition into four kinds, each with its own propagation style:
//! - [`CompileError`] covers both lex/parse errors and semantic errors. Both
//!   accumulate in a [`WithSource`] rather than aborting after the first one.
//! - [`RuntimeError`] is raised by the VM or an intrinsic while a script is
//!   executing; it halts the step loop and the state must be reset.
//! - [`HostError`] covers host-contract violations (bad buffer sizes, nested
//!   `execute_function` calls) and never touches script source, so it's a
//!   plain `thiserror` enum with no [`Span`].

use crate::util::{self, Span};
use serde::Serialize;
use std::fmt::{self, Debug, Display, Formatter};
use thiserror::Error;

/// A trait for any error that originates in source code. These rely on
/// having the source text present in order to display themselves.
pub trait SourceError: 'static + Send + Sync + Debug + Serialize {
    /// A short label for this error's kind, e.g. `"Syntax"` or `"Runtime"`.
    fn type_label(&self) -> &'static str;

    /// Format this error into a human-readable message. `spanned_src` is the
    /// slice of source code covered by this error's [Span].
    fn fmt_msg(&self, f: &mut Formatter<'_>, spanned_src: &str) -> fmt::Result;
}

/// An error detected while parsing or type-checking a program. This always
/// indicates a flaw in the script, never a bug in the compiler.
#[derive(Clone, Debug, Serialize)]
pub enum CompileError {
    /// A syntax error; `expected` names the grammar element the parser was
    /// looking for when it gave up.
    Syntax { expected: &'static str },
    /// An identifier (or manufactured temporary name) exceeded the string
    /// pool's capacity.
    IdentifierTooLong { name: String },
    /// Reference to a name that isn't bound to anything in scope.
    UndefinedSymbol { name: String },
    /// A name was declared more than once in a way that collides (two
    /// function bodies with the same signature, two structs/enums/globals
    /// with the same name, etc).
    DuplicateDefinition { name: String },
    /// An operator or assignment was applied to operands whose types are
    /// incompatible, and no implicit promotion rule covers the case.
    TypeMismatch {
        expected: String,
        found: String,
    },
    /// No overload of a function matches the given argument types.
    NoMatchingOverload { name: String },
    /// More than one overload (ignoring wildcard parameters) matches the
    /// given argument types.
    AmbiguousOverload { name: String },
    /// The left-hand side of an assignment isn't something that can be
    /// assigned to (not an identifier, field, element, or swizzle).
    InvalidLvalue,
    /// A vector swizzle referenced a component that doesn't exist on the
    /// source vector (e.g. `.w` on a `float2`).
    InvalidSwizzle { swizzle: String },
    /// A `return` expression's type doesn't match the enclosing function's
    /// declared return type.
    ReturnTypeMismatch {
        expected: String,
        found: String,
    },
    /// `return` used outside of any function body.
    ReturnOutsideFunction,
    /// A type name was referenced that has never been declared or imported.
    UnknownType { name: String },
}

impl SourceError for CompileError {
    fn type_label(&self) -> &'static str {
        match self {
            Self::Syntax { .. } => "Syntax",
            _ => "Semantic",
        }
    }

    fn fmt_msg(&self, f: &mut Formatter<'_>, spanned_src: &str) -> fmt::Result {
        match self {
            Self::Syntax { expected } => write!(f, "expected {}", expected),
            Self::IdentifierTooLong { name } => write!(
                f,
                "identifier `{}` is longer than the string pool's slot \
                 capacity",
                name
            ),
            Self::UndefinedSymbol { name } => {
                write!(f, "undefined symbol `{}`", name)
            }
            Self::DuplicateDefinition { name } => {
                write!(f, "`{}` is already defined", name)
            }
            Self::TypeMismatch { expected, found } => write!(
                f,
                "expected a value of type `{}`, found `{}` (`{}`)",
                expected, found, spanned_src
            ),
            Self::NoMatchingOverload { name } => write!(
                f,
                "no overload of `{}` matches these argument types",
                name
            ),
            Self::AmbiguousOverload { name } => write!(
                f,
                "call to `{}` is ambiguous between multiple overloads",
                name
            ),
            Self::InvalidLvalue => write!(
                f,
                "`{}` cannot appear on the left-hand side of an assignment",
                spanned_src
            ),
            Self::InvalidSwizzle { swizzle } => {
                write!(f, "invalid swizzle `.{}`", swizzle)
            }
            Self::ReturnTypeMismatch { expected, found } => write!(
                f,
                "function returns `{}`, but this `return` yields `{}`",
                expected, found
            ),
            Self::ReturnOutsideFunction => {
                write!(f, "`return` used outside of a function body")
            }
            Self::UnknownType { name } => {
                write!(f, "unknown type `{}`", name)
            }
        }
    }
}

/// An error raised while executing a compiled program. Always a flaw in the
/// script (or the host it's calling into), never a VM bug -- VM bugs panic.
#[derive(Clone, Debug, Serialize)]
pub enum RuntimeError {
    /// Integer division or modulo with a zero divisor.
    DivideByZero,
    /// An array index was out of the array's bounds.
    IndexOutOfBounds { index: i32, len: u32 },
    /// An object-reference property callback returned a null pointer,
    /// meaning the property doesn't exist on the concrete object.
    InvalidObjectProperty { property: String },
    /// A heap slot was addressed that doesn't hold an object of the
    /// expected type.
    HeapTypeMismatch,
    /// Execution exceeded [`crate::consts::DEFAULT_MAX_CYCLE_COUNT`] (or a
    /// host-supplied override) instructions.
    TooManyCycles,
    /// Execution exceeded the development-build wall-clock time budget for
    /// a single host-initiated call.
    TimeBudgetExceeded,
    /// An intrinsic signalled failure.
    IntrinsicFailed { name: String, message: String },
}

impl SourceError for RuntimeError {
    fn type_label(&self) -> &'static str {
        "Runtime"
    }

    fn fmt_msg(&self, f: &mut Formatter<'_>, spanned_src: &str) -> fmt::Result {
        match self {
            Self::DivideByZero => write!(f, "divide by zero"),
            Self::IndexOutOfBounds { index, len } => write!(
                f,
                "index {} is out of bounds for array of length {} (`{}`)",
                index, len, spanned_src
            ),
            Self::InvalidObjectProperty { property } => write!(
                f,
                "object has no property `{}` (`{}`)",
                property, spanned_src
            ),
            Self::HeapTypeMismatch => write!(
                f,
                "heap slot does not hold an object of the expected type"
            ),
            Self::TooManyCycles => write!(
                f,
                "maximum cycle count reached while executing `{}`",
                spanned_src
            ),
            Self::TimeBudgetExceeded => {
                write!(f, "execution exceeded the time budget")
            }
            Self::IntrinsicFailed { name, message } => {
                write!(f, "intrinsic `{}` failed: {}", name, message)
            }
        }
    }
}

/// A host-contract violation: the host called into the VM in a way its own
/// API forbids. These never touch or modify VM state.
#[derive(Clone, Debug, Error, Serialize)]
pub enum HostError {
    #[error(
        "buffer size {actual} does not match the declared size {expected}"
    )]
    BufferSizeMismatch { expected: usize, actual: usize },
    #[error("execute_function called while the VM was already executing")]
    NestedExecuteFunction,
    #[error("no bind point exists for id {0:?}")]
    UnknownBindPoint(u32),
    #[error("no function or global named `{0}` was found")]
    UnknownName(String),
}

/// A wrapper around a [SourceError], carrying the [Span] that triggered it
/// and the slice of source code that span covers, so the error can be
/// displayed without any other context.
#[derive(Clone, Debug, Error, Serialize)]
pub struct SourceErrorWrapper<E: SourceError> {
    error: E,
    span: Span,
    spanned_source: String,
}

impl<E: SourceError> SourceErrorWrapper<E> {
    pub fn new(error: E, span: Span, src: &str) -> Self {
        Self {
            error,
            span,
            spanned_source: span.get_source_slice(src).into(),
        }
    }

    pub fn span(&self) -> Span {
        self.span
    }

    pub fn error(&self) -> &E {
        &self.error
    }
}

impl<E: SourceError> Display for SourceErrorWrapper<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} error at {}:{}: ",
            self.error.type_label(),
            self.span.start_line,
            self.span.start_col,
        )?;
        self.error.fmt_msg(f, &self.spanned_source)?;
        Ok(())
    }
}

/// A collection of [SourceError]s plus the source code they occurred in, so
/// they can be rendered with excerpts via `{:#}`.
#[derive(Clone, Debug, Error, Serialize)]
pub struct WithSource<E: SourceError> {
    errors: Vec<SourceErrorWrapper<E>>,
    #[serde(skip)]
    source_code: String,
}

impl<E: SourceError> WithSource<E> {
    pub(crate) fn new(
        errors: impl IntoIterator<Item = SourceErrorWrapper<E>>,
        source: String,
    ) -> Self {
        Self {
            errors: errors.into_iter().collect(),
            source_code: source,
        }
    }

    /// Get a reference to the wrapped errors.
    pub fn errors(&self) -> &[SourceErrorWrapper<E>] {
        &self.errors
    }

    /// The number of errors accumulated. Hosts should check this before
    /// trusting a compiled assembly.
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }
}

impl<E: SourceError> Display for WithSource<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", error)?;
            if f.alternate() {
                util::fmt_src_highlights(f, &error.span, &self.source_code)?;
            }
        }
        Ok(())
    }
}

/// All errors that can come out of [`crate::compile`].
pub type CompileErrors = WithSource<CompileError>;
