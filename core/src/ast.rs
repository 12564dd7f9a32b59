//! All the different types that can appear in a BlockScript abstract syntax
//! tree. There is no behavior implemented here, just shapes. Every node is
//! generic over a metadata type `M`, carried alongside the node's data the
//! way a [Span] rides along a parsed node -- the source-level tree (fresh
//! out of the parser) instantiates `M = Span`; after the builder finishes,
//! the same tree shape is reused with `M = Checked`, which additionally
//! carries the resolved type descriptor.

use crate::{strings::Symbol, types::TypeId, util::Span};

/// A generic AST node container: data plus metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct Node<T, M>(pub T, pub M);

impl<T, M> Node<T, M> {
    pub fn value(&self) -> &T {
        &self.0
    }

    pub fn metadata(&self) -> &M {
        &self.1
    }

    pub fn map<U>(self, mapper: impl FnOnce(T) -> U) -> Node<U, M> {
        Node(mapper(self.0), self.1)
    }
}

/// Metadata attached to an expression node once the builder has resolved
/// its type. Untyped (fresh-from-parser) expression nodes use `Span`
/// directly; checked ones use this.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Checked {
    pub span: Span,
    pub ty: TypeId,
}

/// Sentinel used for an identifier's frame index and offset before (or when)
/// the builder fails to resolve it: when these are still -1 after the
/// builder finishes, the identifier is an unresolved free variable.
pub const UNRESOLVED: i32 = -1;

/// An `Idd` (identifier) reference. `frame_index` and `offset` start at
/// [`UNRESOLVED`] when the parser produces this node, and are filled in by
/// the builder once the name is resolved against the symbol table; a global
/// reference sets `is_global` and leaves `frame_index` at [`UNRESOLVED`].
#[derive(Clone, Debug, PartialEq)]
pub struct Identifier {
    pub name: Symbol,
    pub frame_index: i32,
    pub offset: i32,
    pub is_global: bool,
}

impl Identifier {
    pub fn unresolved(name: Symbol) -> Self {
        Identifier {
            name,
            frame_index: UNRESOLVED,
            offset: UNRESOLVED,
            is_global: false,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.frame_index != UNRESOLVED || self.is_global
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
    Assign,
    /// `.field`, `.swizzle`, or `[index]` access, lowered by the canonizer
    /// into pointer arithmetic.
    Access,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
    /// An implicit or explicit numeric/vector cast inserted by the builder
    /// during promotion, or written directly by the programmer.
    Cast,
}

/// A literal immediate value.
#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Int(i32),
    Float(f32),
}

/// A type reference as written in source: either a bare name (`int`,
/// `float3`, a struct/enum/object-ref name) or `static_array<T, N>`
/// (`type ::= IDENT | "static_array" "<" type "," INT ">"`).
#[derive(Clone, Debug, PartialEq)]
pub enum TypeExpr {
    Named(Symbol),
    StaticArray(Box<TypeExpr>, u32),
}

/// An expression node. Generic over `M` so the same shape serves both the
/// freshly parsed tree (`M = Span`) and the checked tree (`M = Checked`).
#[derive(Clone, Debug, PartialEq)]
pub enum Expr<M> {
    Idd(Identifier),
    Binop(BinOp, Box<Node<Expr<M>, M>>, Box<Node<Expr<M>, M>>),
    Unop(UnOp, Box<Node<Expr<M>, M>>),
    /// A call to a named function or intrinsic. `resolved` is filled in by
    /// the builder with the matched [`crate::symbols::FunctionId`]'s raw
    /// index once overload resolution succeeds.
    FunCall {
        name: Symbol,
        args: Vec<Node<Expr<M>, M>>,
        resolved: Option<u32>,
    },
    /// `receiver->name(args)`. The receiver's type becomes the first
    /// argument of the signature the builder resolves against: methods are
    /// matched with the receiver type standing in as the first argument.
    MethodCall {
        receiver: Box<Node<Expr<M>, M>>,
        name: Symbol,
        args: Vec<Node<Expr<M>, M>>,
        resolved: Option<u32>,
    },
    /// `sizeof(type)`, resolved to an `int` immediate at check time once
    /// the named type's byte size is known.
    Sizeof(TypeExpr),
    Imm(Literal),
    StrImm(String),
}

pub type SourceExpr = Node<Expr<Span>, Span>;
pub type CheckedExpr = Node<Expr<Checked>, Checked>;

/// One argument declaration in a function's parameter list or a struct's
/// field list -- struct definitions synthesize their field list as an
/// argument list of this same shape.
#[derive(Clone, Debug, PartialEq)]
pub struct ArgDec {
    pub ty: TypeExpr,
    pub name: Symbol,
}

pub type ArgList = Vec<ArgDec>;
pub type ExpList<M> = Vec<Node<Expr<M>, M>>;

/// A function declaration or definition.
#[derive(Clone, Debug, PartialEq)]
pub struct FunDec<M> {
    pub return_type: TypeExpr,
    pub name: Symbol,
    pub params: ArgList,
    /// `None` for a forward declaration with no body.
    pub body: Option<StmtList<M>>,
}

/// The tail of an `if` chain: `else if (...) { ... }` repeated any number of
/// times, optionally followed by a plain `else { ... }`.
#[derive(Clone, Debug, PartialEq)]
pub struct ElseIfTail<M> {
    pub cond: Node<Expr<M>, M>,
    pub body: StmtList<M>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ElseTail<M> {
    pub else_ifs: Vec<ElseIfTail<M>>,
    pub else_body: Option<StmtList<M>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StructDef {
    pub name: Symbol,
    pub fields: ArgList,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EnumDef {
    pub name: Symbol,
    /// `(name, explicit value)`; unspecified values are auto-numbered by
    /// the builder starting from the previous enumerant's value + 1 (or 0
    /// for the first).
    pub variants: Vec<(Symbol, Option<i32>)>,
}

/// A named, unconditionally-executed nested scope (`modifier name { ... }`)
/// used to group per-frame logic the host's scene tree can address by name
/// (e.g. to toggle a named block on or off without touching the script
/// text). It carries no dedicated VM instruction -- the canonizer lowers it
/// exactly like an `if (true)` body, wrapped in its own `PushFrame`/
/// `PopFrame` pair -- reusing the conditional-frame machinery rather than
/// inventing a separate unconditional-block instruction.
#[derive(Clone, Debug, PartialEq)]
pub struct TreeModifier<M> {
    pub name: Symbol,
    pub body: StmtList<M>,
}

/// A local variable declaration: `type IDENT ("=" exp)? ";"`. Its own
/// statement form rather than an overloaded bare identifier assignment, so
/// `int x = 2 + 3 * 4;`-style declarations parse unambiguously. `init` is
/// optional so a host-facing type (an array, a struct, an object
/// reference) can be declared without an initializer expression the
/// grammar has no literal for, and seeded externally before the program
/// runs.
#[derive(Clone, Debug, PartialEq)]
pub struct VarDec<M> {
    pub ty: TypeExpr,
    pub name: Symbol,
    pub init: Option<Node<Expr<M>, M>>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt<M> {
    Exp(Node<Expr<M>, M>),
    Return(Option<Node<Expr<M>, M>>),
    VarDec(VarDec<M>),
    FunDec(FunDec<M>),
    If(Node<Expr<M>, M>, StmtList<M>, Option<ElseTail<M>>),
    While(Node<Expr<M>, M>, StmtList<M>),
    StructDef(StructDef),
    EnumDef(EnumDef),
    TreeModifier(TreeModifier<M>),
}

pub type StmtList<M> = Vec<Node<Stmt<M>, M>>;

#[derive(Clone, Debug, PartialEq)]
pub struct Program<M> {
    pub body: StmtList<M>,
}

pub type SourceProgram = Program<Span>;
pub type CheckedProgram = Program<Checked>;
