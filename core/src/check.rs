//! The AST builder / type checker: walks the freshly
//! parsed tree, resolves every identifier and call against the symbol
//! table, assigns frame offsets to new declarations, inserts implicit
//! promotions, and produces a [`Checked`]-tagged tree with every expression
//! carrying its resolved type. A simpler validator only needs to check
//! register/stack references against a fixed hardware description; this
//! builder does the much larger job of a real type checker because
//! BlockScript programs are source trees, not pre-linearized instructions.

use crate::{
    ast::{
        ArgDec, BinOp, Checked, ElseTail, EnumDef, Expr, FunDec, Identifier, Literal, Node,
        Program, SourceExpr, Stmt, StmtList, StructDef, TreeModifier, TypeExpr, UnOp, VarDec,
    },
    error::{CompileError, SourceErrorWrapper, WithSource},
    host::Host,
    strings::Symbol,
    symbols::{
        resolve_identifier, FrameCategory, FrameId, FunctionDescriptor, OverloadResolution,
        ResolvedName, Signature, SymbolTable,
    },
    types::{AluEngine, Enumerant, Modifier, PropertyNode, StructField, TypeId, TypeTable},
    util::Span,
};

/// Accumulates errors across the whole tree instead of aborting on the
/// first one, so a host can report every problem in a script at once
/// instead of forcing a fix-one-recompile-repeat loop.
struct Context<'a> {
    symtab: &'a mut SymbolTable,
    strings: &'a mut crate::strings::StringPool,
    errors: Vec<(CompileError, Span)>,
    /// The function's declared return type, for checking `return` statements;
    /// `None` at the top level, where `return` is not allowed.
    return_type: Option<TypeId>,
}

impl<'a> Context<'a> {
    fn error(&mut self, error: CompileError, span: Span) {
        self.errors.push((error, span));
    }

    fn type_name(&self, ty: TypeId) -> String {
        self.strings.resolve(self.symtab.types.get(ty).name).to_string()
    }
}

/// Resolve a [`TypeExpr`] against the type table, registering an array type
/// on demand (`static_array<T, N>`).
fn resolve_type_expr(ctx: &mut Context, ty: &TypeExpr, span: Span) -> Option<TypeId> {
    match ty {
        TypeExpr::Named(name) => {
            let found = ctx.symtab.types.find_by_name(*name);
            if found.is_none() {
                ctx.error(
                    CompileError::UnknownType { name: ctx.strings.resolve(*name).to_string() },
                    span,
                );
            }
            found
        }
        TypeExpr::StaticArray(elem, len) => {
            let elem_ty = resolve_type_expr(ctx, elem, span)?;
            let elem_name = ctx.symtab.types.get(elem_ty).name;
            let array_name_text = format!("{}[{}]", ctx.strings.resolve(elem_name), len);
            let array_name = intern_or_error(ctx, &array_name_text, span)?;
            Some(ctx.symtab.types.create_type(
                Modifier::Array,
                array_name,
                Some(elem_ty),
                *len,
                AluEngine::None,
                None,
                None,
            ))
        }
    }
}

fn intern_or_error(ctx: &mut Context, text: &str, span: Span) -> Option<Symbol> {
    match ctx.strings.intern(text) {
        Ok(symbol) => Some(symbol),
        Err(err) => {
            ctx.error(err, span);
            None
        }
    }
}

/// Is `from` implicitly convertible to `to` in an assignment/argument
/// context? Scalar-to-vector widening is deliberately excluded here and
/// restricted to binary-operator contexts only.
fn assignable(types: &TypeTable, from: TypeId, to: TypeId) -> bool {
    types.get(from) == types.get(to)
        || (types.get(from).alu_engine == AluEngine::Int
            && types.get(to).alu_engine == AluEngine::Float)
}

/// Binary-operator type resolution, including the scalar->vector widening
/// rule (allowed silently in this context only). Returns the result type,
/// or `None` if the operator isn't defined for these operand types.
fn binop_result_type(ctx: &Context, op: BinOp, lhs: TypeId, rhs: TypeId) -> Option<TypeId> {
    let types = &ctx.symtab.types;
    let l = types.get(lhs);
    let r = types.get(rhs);

    match op {
        BinOp::And | BinOp::Or => {
            if l.alu_engine == AluEngine::Int && r.alu_engine == AluEngine::Int {
                Some(types.int_ty)
            } else {
                None
            }
        }
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge | BinOp::Eq | BinOp::Ne => {
            if matches!(l.alu_engine, AluEngine::Int | AluEngine::Float)
                && matches!(r.alu_engine, AluEngine::Int | AluEngine::Float)
            {
                Some(types.int_ty)
            } else if l.modifier == Modifier::Enum && r.modifier == Modifier::Enum && l == r {
                Some(types.int_ty)
            } else {
                None
            }
        }
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => {
            if l == r {
                return Some(lhs);
            }
            // Scalar<->vector widening: the vector side wins.
            if l.modifier == Modifier::Vector && r.alu_engine == AluEngine::Float {
                return Some(lhs);
            }
            if r.modifier == Modifier::Vector && l.alu_engine == AluEngine::Float {
                return Some(rhs);
            }
            if l.alu_engine == AluEngine::Int && r.alu_engine == AluEngine::Float {
                return Some(rhs);
            }
            if l.alu_engine == AluEngine::Float && r.alu_engine == AluEngine::Int {
                return Some(lhs);
            }
            None
        }
        BinOp::Assign | BinOp::Access => unreachable!("handled by their own call sites"),
    }
}

fn check_expr(
    ctx: &mut Context,
    frame: FrameId,
    expr: &SourceExpr,
) -> Node<Expr<Checked>, Checked> {
    let span = *expr.metadata();
    match expr.value() {
        Expr::Imm(Literal::Int(v)) => {
            let ty = ctx.symtab.types.int_ty;
            Node(Expr::Imm(Literal::Int(*v)), Checked { span, ty })
        }
        Expr::Imm(Literal::Float(v)) => {
            let ty = ctx.symtab.types.float_ty;
            Node(Expr::Imm(Literal::Float(*v)), Checked { span, ty })
        }
        Expr::StrImm(s) => {
            let ty = ctx.symtab.types.string_ty;
            Node(Expr::StrImm(s.clone()), Checked { span, ty })
        }
        Expr::Sizeof(ty_expr) => {
            let ty = resolve_type_expr(ctx, ty_expr, span);
            let size = ty.map(|t| ctx.symtab.types.get(t).byte_size as i32).unwrap_or(0);
            let int_ty = ctx.symtab.types.int_ty;
            Node(Expr::Imm(Literal::Int(size)), Checked { span, ty: int_ty })
        }
        Expr::Idd(id) => check_identifier(ctx, frame, id, span),
        Expr::Unop(UnOp::Neg, inner) => {
            let checked_inner = check_expr(ctx, frame, inner);
            let ty = checked_inner.metadata().ty;
            if !matches!(
                ctx.symtab.types.get(ty).alu_engine,
                AluEngine::Int | AluEngine::Float | AluEngine::Float2 | AluEngine::Float3 | AluEngine::Float4
            ) {
                ctx.error(
                    CompileError::TypeMismatch {
                        expected: "a numeric or vector type".into(),
                        found: ctx.type_name(ty),
                    },
                    span,
                );
            }
            Node(Expr::Unop(UnOp::Neg, Box::new(checked_inner)), Checked { span, ty })
        }
        Expr::Unop(UnOp::Not, inner) => {
            let checked_inner = check_expr(ctx, frame, inner);
            let int_ty = ctx.symtab.types.int_ty;
            if ctx.symtab.types.get(checked_inner.metadata().ty).alu_engine != AluEngine::Int {
                ctx.error(
                    CompileError::TypeMismatch {
                        expected: "int".into(),
                        found: ctx.type_name(checked_inner.metadata().ty),
                    },
                    span,
                );
            }
            Node(Expr::Unop(UnOp::Not, Box::new(checked_inner)), Checked { span, ty: int_ty })
        }
        Expr::Unop(UnOp::Cast, inner) => {
            // A bare `Unop(Cast, ...)` never comes straight out of the
            // parser (there's no cast-expression grammar production); it's
            // only ever synthesized by this checker when inserting an
            // implicit promotion, which always already carries `Checked`
            // metadata. Treated as a no-op pass-through here for
            // completeness.
            check_expr(ctx, frame, inner)
        }
        Expr::Binop(BinOp::Assign, lhs, rhs) => check_assign(ctx, frame, lhs, rhs, span),
        Expr::Binop(BinOp::Access, lhs, rhs) => check_access(ctx, frame, lhs, rhs, span),
        Expr::Binop(op, lhs, rhs) => {
            let checked_lhs = check_expr(ctx, frame, lhs);
            let checked_rhs = check_expr(ctx, frame, rhs);
            let lhs_ty = checked_lhs.metadata().ty;
            let rhs_ty = checked_rhs.metadata().ty;
            let ty = binop_result_type(ctx, *op, lhs_ty, rhs_ty).unwrap_or_else(|| {
                ctx.error(
                    CompileError::TypeMismatch {
                        expected: ctx.type_name(lhs_ty),
                        found: ctx.type_name(rhs_ty),
                    },
                    span,
                );
                lhs_ty
            });
            Node(
                Expr::Binop(*op, Box::new(checked_lhs), Box::new(checked_rhs)),
                Checked { span, ty },
            )
        }
        Expr::FunCall { name, args, .. } => check_fun_call(ctx, frame, *name, args, span),
        Expr::MethodCall { receiver, name, args, .. } => {
            check_method_call(ctx, frame, receiver, *name, args, span)
        }
    }
}

fn check_identifier(
    ctx: &mut Context,
    frame: FrameId,
    id: &Identifier,
    span: Span,
) -> Node<Expr<Checked>, Checked> {
    match resolve_identifier(ctx.symtab, frame, id.name) {
        Some(ResolvedName::Local { frame: f, offset, ty }) => Node(
            Expr::Idd(Identifier {
                name: id.name,
                frame_index: f.index() as i32,
                offset: offset as i32,
                is_global: false,
            }),
            Checked { span, ty },
        ),
        Some(ResolvedName::Global { offset, ty }) => Node(
            Expr::Idd(Identifier { name: id.name, frame_index: -1, offset: offset as i32, is_global: true }),
            Checked { span, ty },
        ),
        None => {
            // An enum variant referenced bare (`Color.Red` is field access,
            // but a lone enumerant name is legal wherever the compiler can
            // tell from context -- resolved through the same identifier
            // path as variables).
            if let Some((enum_ty, value)) = ctx.symtab.types.find_enum_by_value_name(id.name) {
                return Node(
                    Expr::Imm(Literal::Int(value)),
                    Checked { span, ty: enum_ty },
                );
            }
            ctx.error(
                CompileError::UndefinedSymbol { name: ctx.strings.resolve(id.name).to_string() },
                span,
            );
            let wildcard = ctx.symtab.types.wildcard_ty;
            Node(
                Expr::Idd(Identifier { name: id.name, frame_index: -1, offset: -1, is_global: false }),
                Checked { span, ty: wildcard },
            )
        }
    }
}

/// Is `expr` something that can legally sit on the left of `=`? Identifiers,
/// field/array access, and swizzles all qualify; everything else is an
/// [`CompileError::InvalidLvalue`].
fn is_lvalue(expr: &Expr<Span>) -> bool {
    match expr {
        Expr::Idd(_) => true,
        Expr::Binop(BinOp::Access, _, _) => true,
        _ => false,
    }
}

fn check_assign(
    ctx: &mut Context,
    frame: FrameId,
    lhs: &SourceExpr,
    rhs: &SourceExpr,
    span: Span,
) -> Node<Expr<Checked>, Checked> {
    if !is_lvalue(lhs.value()) {
        ctx.error(CompileError::InvalidLvalue, *lhs.metadata());
    }
    let checked_lhs = check_expr(ctx, frame, lhs);
    let checked_rhs = check_expr(ctx, frame, rhs);
    let lhs_ty = checked_lhs.metadata().ty;
    let rhs_ty = checked_rhs.metadata().ty;
    let checked_rhs = promote(ctx, checked_rhs, lhs_ty);
    if !assignable(&ctx.symtab.types, checked_rhs.metadata().ty, lhs_ty) {
        ctx.error(
            CompileError::TypeMismatch { expected: ctx.type_name(lhs_ty), found: ctx.type_name(rhs_ty) },
            span,
        );
    }
    Node(
        Expr::Binop(BinOp::Assign, Box::new(checked_lhs), Box::new(checked_rhs)),
        Checked { span, ty: lhs_ty },
    )
}

/// Insert an implicit int->float promotion when assigning/passing an int
/// where a float is expected. Vectors are never
/// implicitly promoted outside binary operators.
fn promote(ctx: &mut Context, expr: Node<Expr<Checked>, Checked>, target: TypeId) -> Node<Expr<Checked>, Checked> {
    let from = expr.metadata().ty;
    if from == target {
        return expr;
    }
    if ctx.symtab.types.get(from).alu_engine == AluEngine::Int
        && ctx.symtab.types.get(target).alu_engine == AluEngine::Float
    {
        let span = expr.metadata().span;
        return Node(Expr::Unop(UnOp::Cast, Box::new(expr)), Checked { span, ty: target });
    }
    expr
}

const SWIZZLE_COMPONENTS: [char; 4] = ['x', 'y', 'z', 'w'];

fn check_access(
    ctx: &mut Context,
    frame: FrameId,
    lhs: &SourceExpr,
    rhs: &SourceExpr,
    span: Span,
) -> Node<Expr<Checked>, Checked> {
    let checked_lhs = check_expr(ctx, frame, lhs);
    let lhs_ty = checked_lhs.metadata().ty;
    let lhs_desc = ctx.symtab.types.get(lhs_ty);

    // `[index]` access: rhs is a real expression to evaluate as an index.
    if !matches!(rhs.value(), Expr::Idd(_)) || lhs_desc.modifier == Modifier::Array {
        if lhs_desc.modifier != Modifier::Array {
            ctx.error(
                CompileError::TypeMismatch { expected: "an array".into(), found: ctx.type_name(lhs_ty) },
                span,
            );
            let checked_rhs = check_expr(ctx, frame, rhs);
            let wildcard = ctx.symtab.types.wildcard_ty;
            return Node(
                Expr::Binop(BinOp::Access, Box::new(checked_lhs), Box::new(checked_rhs)),
                Checked { span, ty: wildcard },
            );
        }
        let checked_rhs = check_expr(ctx, frame, rhs);
        let elem_ty = lhs_desc.child.unwrap();
        return Node(
            Expr::Binop(BinOp::Access, Box::new(checked_lhs), Box::new(checked_rhs)),
            Checked { span, ty: elem_ty },
        );
    }

    // `.field` or `.swizzle` access: rhs is a bare identifier naming either
    // a struct field or a vector swizzle.
    let field_name = match rhs.value() {
        Expr::Idd(id) => id.name,
        _ => unreachable!(),
    };
    let field_text = ctx.strings.resolve(field_name).to_string();

    if lhs_desc.modifier == Modifier::Struct {
        let field = lhs_desc
            .struct_fields
            .as_ref()
            .and_then(|fields| fields.iter().find(|f| f.name == field_name));
        return match field {
            Some(f) => {
                let ty = f.ty;
                let field_node = Node(Expr::Idd(Identifier::unresolved(field_name)), Checked { span, ty });
                Node(
                    Expr::Binop(BinOp::Access, Box::new(checked_lhs), Box::new(field_node)),
                    Checked { span, ty },
                )
            }
            None => {
                ctx.error(CompileError::UndefinedSymbol { name: field_text }, span);
                let wildcard = ctx.symtab.types.wildcard_ty;
                Node(Expr::Imm(Literal::Int(0)), Checked { span, ty: wildcard })
            }
        };
    }

    if lhs_desc.modifier == Modifier::ObjectRef {
        let property = lhs_desc
            .properties
            .as_ref()
            .and_then(|props| props.iter().find(|p| p.name == field_name));
        return match property {
            Some(p) => {
                let ty = p.ty;
                let field_node = Node(Expr::Idd(Identifier::unresolved(field_name)), Checked { span, ty });
                Node(
                    Expr::Binop(BinOp::Access, Box::new(checked_lhs), Box::new(field_node)),
                    Checked { span, ty },
                )
            }
            None => {
                ctx.error(CompileError::UndefinedSymbol { name: field_text }, span);
                let wildcard = ctx.symtab.types.wildcard_ty;
                Node(Expr::Imm(Literal::Int(0)), Checked { span, ty: wildcard })
            }
        };
    }

    if lhs_desc.modifier == Modifier::Vector {
        let width = lhs_desc.modifier_property as usize;
        let valid = field_text.chars().all(|c| {
            SWIZZLE_COMPONENTS[..width].contains(&c)
        }) && !field_text.is_empty()
            && field_text.len() <= 4;
        if !valid {
            ctx.error(CompileError::InvalidSwizzle { swizzle: field_text }, span);
            let wildcard = ctx.symtab.types.wildcard_ty;
            return Node(Expr::Imm(Literal::Int(0)), Checked { span, ty: wildcard });
        }
        let result_ty = match field_text.len() {
            1 => ctx.symtab.types.float_ty,
            n => ctx.symtab.types.vector_of_width(n as u32).unwrap(),
        };
        let field_node = Node(Expr::Idd(Identifier::unresolved(field_name)), Checked { span, ty: result_ty });
        return Node(
            Expr::Binop(BinOp::Access, Box::new(checked_lhs), Box::new(field_node)),
            Checked { span, ty: result_ty },
        );
    }

    ctx.error(
        CompileError::TypeMismatch { expected: "a struct, object reference, or vector".into(), found: ctx.type_name(lhs_ty) },
        span,
    );
    let wildcard = ctx.symtab.types.wildcard_ty;
    Node(Expr::Imm(Literal::Int(0)), Checked { span, ty: wildcard })
}

/// Vector types construct like any other native function call: casts
/// between scalars and vectors are realized by calling the corresponding
/// constructor intrinsic, which itself is a
/// registered native function"), but the constructor itself is a language
/// builtin rather than something a host registers, so it's resolved here
/// directly against the type table instead of through the function table.
/// Accepts either one scalar argument (broadcast to every component) or
/// exactly `width` scalar arguments (one per component).
fn check_vector_constructor(
    ctx: &mut Context,
    name: Symbol,
    checked_args: &[Node<Expr<Checked>, Checked>],
    span: Span,
) -> Option<TypeId> {
    let vector_ty = ctx.symtab.types.find_by_name(name)?;
    if ctx.symtab.types.get(vector_ty).modifier != Modifier::Vector {
        return None;
    }
    let width = ctx.symtab.types.get(vector_ty).modifier_property as usize;
    if checked_args.len() != 1 && checked_args.len() != width {
        ctx.error(
            CompileError::NoMatchingOverload { name: ctx.strings.resolve(name).to_string() },
            span,
        );
        return Some(vector_ty);
    }
    for arg in checked_args {
        if !matches!(
            ctx.symtab.types.get(arg.metadata().ty).alu_engine,
            AluEngine::Int | AluEngine::Float
        ) {
            ctx.error(
                CompileError::TypeMismatch {
                    expected: "a scalar".into(),
                    found: ctx.type_name(arg.metadata().ty),
                },
                span,
            );
        }
    }
    Some(vector_ty)
}

fn check_fun_call(
    ctx: &mut Context,
    frame: FrameId,
    name: Symbol,
    args: &[SourceExpr],
    span: Span,
) -> Node<Expr<Checked>, Checked> {
    let checked_args: Vec<_> = args.iter().map(|a| check_expr(ctx, frame, a)).collect();

    if let Some(vector_ty) = check_vector_constructor(ctx, name, &checked_args, span) {
        return Node(
            Expr::FunCall { name, args: checked_args, resolved: None },
            Checked { span, ty: vector_ty },
        );
    }

    let arg_types: Vec<TypeId> = checked_args.iter().map(|a| a.metadata().ty).collect();

    match ctx.symtab.functions.resolve(name, &arg_types, &ctx.symtab.types) {
        OverloadResolution::Found(id) => {
            let ret_ty = ctx.symtab.functions.get(id).return_type;
            Node(
                Expr::FunCall { name, args: checked_args, resolved: Some(id.index()) },
                Checked { span, ty: ret_ty },
            )
        }
        OverloadResolution::NoMatch => {
            ctx.error(
                CompileError::NoMatchingOverload { name: ctx.strings.resolve(name).to_string() },
                span,
            );
            let wildcard = ctx.symtab.types.wildcard_ty;
            Node(Expr::FunCall { name, args: checked_args, resolved: None }, Checked { span, ty: wildcard })
        }
        OverloadResolution::Ambiguous => {
            ctx.error(
                CompileError::AmbiguousOverload { name: ctx.strings.resolve(name).to_string() },
                span,
            );
            let wildcard = ctx.symtab.types.wildcard_ty;
            Node(Expr::FunCall { name, args: checked_args, resolved: None }, Checked { span, ty: wildcard })
        }
    }
}

/// `receiver->name(args)`: the receiver's type is prepended to the call
/// signature.
fn check_method_call(
    ctx: &mut Context,
    frame: FrameId,
    receiver: &SourceExpr,
    name: Symbol,
    args: &[SourceExpr],
    span: Span,
) -> Node<Expr<Checked>, Checked> {
    let checked_receiver = check_expr(ctx, frame, receiver);
    let checked_args: Vec<_> = args.iter().map(|a| check_expr(ctx, frame, a)).collect();
    let mut sig_types = vec![checked_receiver.metadata().ty];
    sig_types.extend(checked_args.iter().map(|a| a.metadata().ty));

    let resolution = ctx.symtab.functions.resolve(name, &sig_types, &ctx.symtab.types);
    match resolution {
        OverloadResolution::Found(id) => {
            let ret_ty = ctx.symtab.functions.get(id).return_type;
            Node(
                Expr::MethodCall {
                    receiver: Box::new(checked_receiver),
                    name,
                    args: checked_args,
                    resolved: Some(id.index()),
                },
                Checked { span, ty: ret_ty },
            )
        }
        OverloadResolution::NoMatch | OverloadResolution::Ambiguous => {
            let error = if matches!(resolution, OverloadResolution::NoMatch) {
                CompileError::NoMatchingOverload { name: ctx.strings.resolve(name).to_string() }
            } else {
                CompileError::AmbiguousOverload { name: ctx.strings.resolve(name).to_string() }
            };
            ctx.error(error, span);
            let wildcard = ctx.symtab.types.wildcard_ty;
            Node(
                Expr::MethodCall { receiver: Box::new(checked_receiver), name, args: checked_args, resolved: None },
                Checked { span, ty: wildcard },
            )
        }
    }
}

fn check_arg_list(ctx: &mut Context, args: &[ArgDec], span: Span) -> Vec<TypeId> {
    args.iter()
        .map(|a| resolve_type_expr(ctx, &a.ty, span).unwrap_or(ctx.symtab.types.wildcard_ty))
        .collect()
}

fn check_stmt_list(ctx: &mut Context, frame: FrameId, stmts: &StmtList<Span>) -> StmtList<Checked> {
    stmts.iter().map(|s| check_stmt(ctx, frame, s)).collect()
}

fn check_stmt(ctx: &mut Context, frame: FrameId, stmt: &Node<Stmt<Span>, Span>) -> Node<Stmt<Checked>, Checked> {
    let span = *stmt.metadata();
    let ty = ctx.symtab.types.wildcard_ty;
    let meta = Checked { span, ty };
    match stmt.value() {
        Stmt::Exp(e) => Node(Stmt::Exp(check_expr(ctx, frame, e)), meta),
        Stmt::Return(None) => Node(Stmt::Return(None), meta),
        Stmt::Return(Some(e)) => {
            let checked = check_expr(ctx, frame, e);
            match ctx.return_type {
                Some(expected) => {
                    let promoted = promote(ctx, checked, expected);
                    if !assignable(&ctx.symtab.types, promoted.metadata().ty, expected) {
                        ctx.error(
                            CompileError::ReturnTypeMismatch {
                                expected: ctx.type_name(expected),
                                found: ctx.type_name(promoted.metadata().ty),
                            },
                            span,
                        );
                    }
                    Node(Stmt::Return(Some(promoted)), meta)
                }
                None => {
                    ctx.error(CompileError::ReturnOutsideFunction, span);
                    Node(Stmt::Return(Some(checked)), meta)
                }
            }
        }
        Stmt::VarDec(VarDec { ty: ty_expr, name, init }) => {
            let declared_ty = resolve_type_expr(ctx, ty_expr, span).unwrap_or(ctx.symtab.types.wildcard_ty);
            ctx.symtab.frame_mut(frame).allocate(*name, declared_ty, &ctx.symtab.types);
            let checked_init = init.as_ref().map(|e| {
                let checked = check_expr(ctx, frame, e);
                let promoted = promote(ctx, checked, declared_ty);
                if !assignable(&ctx.symtab.types, promoted.metadata().ty, declared_ty) {
                    ctx.error(
                        CompileError::TypeMismatch {
                            expected: ctx.type_name(declared_ty),
                            found: ctx.type_name(promoted.metadata().ty),
                        },
                        span,
                    );
                }
                promoted
            });
            Node(Stmt::VarDec(VarDec { ty: ty_expr.clone(), name: *name, init: checked_init }), meta)
        }
        Stmt::FunDec(FunDec { return_type, name, params, body }) => {
            check_fun_dec(ctx, return_type, *name, params, body, span)
        }
        Stmt::If(cond, then_body, else_tail) => check_if(ctx, frame, cond, then_body, else_tail, span),
        Stmt::While(cond, body) => {
            let checked_cond = check_expr(ctx, frame, cond);
            let body_frame = ctx.symtab.push_frame(Some(frame), FrameCategory::ForBody, span.start_line);
            let checked_body = check_stmt_list(ctx, body_frame, body);
            Node(Stmt::While(checked_cond, checked_body), meta)
        }
        Stmt::StructDef(StructDef { name, fields }) => {
            let field_types = check_arg_list(ctx, fields, span);
            let struct_fields: Vec<StructField> = fields
                .iter()
                .zip(field_types)
                .map(|(f, ty)| StructField { name: f.name, ty })
                .collect();
            ctx.symtab.types.create_type(
                Modifier::Struct,
                *name,
                None,
                0,
                AluEngine::None,
                Some(struct_fields),
                None,
            );
            Node(Stmt::StructDef(StructDef { name: *name, fields: fields.clone() }), meta)
        }
        Stmt::EnumDef(EnumDef { name, variants }) => {
            let mut next_value = 0;
            let enumerants: Vec<Enumerant> = variants
                .iter()
                .map(|(variant_name, explicit)| {
                    let value = explicit.unwrap_or(next_value);
                    next_value = value + 1;
                    Enumerant { name: *variant_name, value }
                })
                .collect();
            ctx.symtab.types.create_type(
                Modifier::Enum,
                *name,
                None,
                0,
                AluEngine::None,
                None,
                Some(enumerants),
            );
            Node(Stmt::EnumDef(EnumDef { name: *name, variants: variants.clone() }), meta)
        }
        Stmt::TreeModifier(TreeModifier { name, body }) => {
            let body_frame = ctx.symtab.push_frame(Some(frame), FrameCategory::IfBody, span.start_line);
            let checked_body = check_stmt_list(ctx, body_frame, body);
            Node(Stmt::TreeModifier(TreeModifier { name: *name, body: checked_body }), meta)
        }
    }
}

fn check_if(
    ctx: &mut Context,
    frame: FrameId,
    cond: &SourceExpr,
    then_body: &StmtList<Span>,
    else_tail: &Option<ElseTail<Span>>,
    span: Span,
) -> Node<Stmt<Checked>, Checked> {
    let checked_cond = check_expr(ctx, frame, cond);
    let then_frame = ctx.symtab.push_frame(Some(frame), FrameCategory::IfBody, span.start_line);
    let checked_then = check_stmt_list(ctx, then_frame, then_body);

    let checked_else = else_tail.as_ref().map(|tail| {
        let else_ifs = tail
            .else_ifs
            .iter()
            .map(|ei| {
                let checked_ei_cond = check_expr(ctx, frame, &ei.cond);
                let ei_frame = ctx.symtab.push_frame(Some(frame), FrameCategory::IfBody, span.start_line);
                crate::ast::ElseIfTail { cond: checked_ei_cond, body: check_stmt_list(ctx, ei_frame, &ei.body) }
            })
            .collect();
        let else_body = tail.else_body.as_ref().map(|body| {
            let else_frame = ctx.symtab.push_frame(Some(frame), FrameCategory::IfBody, span.start_line);
            check_stmt_list(ctx, else_frame, body)
        });
        ElseTail { else_ifs, else_body }
    });

    let ty = ctx.symtab.types.wildcard_ty;
    Node(Stmt::If(checked_cond, checked_then, checked_else), Checked { span, ty })
}

fn check_fun_dec(
    ctx: &mut Context,
    return_type: &TypeExpr,
    name: Symbol,
    params: &[ArgDec],
    body: &Option<StmtList<Span>>,
    span: Span,
) -> Node<Stmt<Checked>, Checked> {
    let ret_ty = resolve_type_expr(ctx, return_type, span).unwrap_or(ctx.symtab.types.wildcard_ty);
    let param_types = check_arg_list(ctx, params, span);

    let fn_frame = ctx.symtab.push_frame(Some(ctx.symtab.globals), FrameCategory::FunctionBody, span.start_line);
    for (param, ty) in params.iter().zip(&param_types) {
        ctx.symtab.frame_mut(fn_frame).allocate(param.name, *ty, &ctx.symtab.types);
    }

    let desc = FunctionDescriptor {
        signature: Signature { name, params: param_types },
        return_type: ret_ty,
        is_method: false,
        has_body: body.is_some(),
        entry_label: None,
        native_callback: None,
    };
    if ctx.symtab.functions.declare(desc, &ctx.symtab.types).is_none() {
        ctx.error(
            CompileError::DuplicateDefinition { name: ctx.strings.resolve(name).to_string() },
            span,
        );
    }

    let prior_return_type = ctx.return_type.replace(ret_ty);
    let checked_body = body.as_ref().map(|b| check_stmt_list(ctx, fn_frame, b));
    ctx.return_type = prior_return_type;

    let ty = ctx.symtab.types.wildcard_ty;
    Node(
        Stmt::FunDec(FunDec { return_type: return_type.clone(), name, params: params.to_vec(), body: checked_body }),
        Checked { span, ty },
    )
}

/// First pass over the top level: register every struct/enum/function
/// declaration before checking bodies, so forward references (a function
/// calling one declared later in the file) resolve -- declarations are
/// hoisted to file scope.
/// Creates every object-reference type the host has registered, attaching
/// its property list so `.field` access on a variable of this type resolves
/// to a property-callback read/write instead of a struct field offset. Runs
/// before [`predeclare_native_functions`], since a native function's
/// signature may reference one of these types by name.
fn predeclare_native_object_types(ctx: &mut Context, host: &Host) {
    for obj in host.object_types() {
        let name = match ctx.strings.intern(&obj.name) {
            Ok(s) => s,
            Err(_) => continue,
        };
        let id = ctx
            .symtab
            .types
            .create_type(Modifier::ObjectRef, name, None, 0, AluEngine::None, None, None);
        let mut properties = Vec::with_capacity(obj.properties.len());
        for property in &obj.properties {
            let prop_name = match ctx.strings.intern(&property.name) {
                Ok(s) => s,
                Err(_) => continue,
            };
            let prop_ty = match ctx
                .strings
                .intern(&property.ty)
                .ok()
                .and_then(|sym| ctx.symtab.types.find_by_name(sym))
            {
                Some(ty) => ty,
                None => continue,
            };
            properties.push(PropertyNode { name: prop_name, ty: prop_ty, callback: property.callback });
        }
        ctx.symtab.types.set_properties(id, properties);
    }
}

/// Declares every native function the host has registered as a callable
/// symbol, bound to its intrinsic id so `eval_call` can dispatch straight
/// into the host without an entry label. Runs before [`predeclare`] so a
/// script-level declaration of the same name collides with it normally.
fn predeclare_native_functions(ctx: &mut Context, host: &Host) {
    for (spec, intrinsic_id) in host.native_functions() {
        let name = match ctx.strings.intern(&spec.name) {
            Ok(s) => s,
            Err(_) => continue,
        };
        let mut params = Vec::with_capacity(spec.params.len());
        for param in &spec.params {
            let resolved = ctx
                .strings
                .intern(param)
                .ok()
                .and_then(|sym| ctx.symtab.types.find_by_name(sym));
            match resolved {
                Some(ty) => params.push(ty),
                None => continue,
            }
        }
        if params.len() != spec.params.len() {
            continue;
        }
        let return_type = match ctx
            .strings
            .intern(&spec.return_type)
            .ok()
            .and_then(|sym| ctx.symtab.types.find_by_name(sym))
        {
            Some(ty) => ty,
            None => continue,
        };
        let desc = FunctionDescriptor {
            signature: Signature { name, params },
            return_type,
            is_method: false,
            has_body: true,
            entry_label: None,
            native_callback: Some(*intrinsic_id),
        };
        ctx.symtab.functions.declare(desc, &ctx.symtab.types);
    }
}

fn predeclare(ctx: &mut Context, stmts: &StmtList<Span>) {
    for stmt in stmts {
        if let Stmt::FunDec(FunDec { return_type, name, params, body }) = stmt.value() {
            let span = *stmt.metadata();
            let ret_ty = resolve_type_expr(ctx, return_type, span).unwrap_or(ctx.symtab.types.wildcard_ty);
            let param_types = check_arg_list(ctx, params, span);
            let desc = FunctionDescriptor {
                signature: Signature { name: *name, params: param_types },
                return_type: ret_ty,
                is_method: false,
                has_body: false,
                entry_label: None,
                native_callback: None,
            };
            // Declarations only (no body yet); `check_fun_dec` rebinds the
            // body later. Ignore duplicate-declaration collisions here --
            // the second pass reports them against the definition.
            let _ = body;
            ctx.symtab.functions.declare(desc, &ctx.symtab.types);
        }
    }
}

impl crate::Compiler<Program<Span>> {
    /// Type-checks the parsed program, producing a tree annotated with
    /// resolved types and frame offsets.
    pub(crate) fn check(mut self) -> Result<crate::Compiler<Program<Checked>>, WithSource<CompileError>> {
        let globals = self.symtab.globals;
        let mut ctx = Context { symtab: &mut self.symtab, strings: &mut self.strings, errors: Vec::new(), return_type: None };

        predeclare_native_object_types(&mut ctx, &self.host);
        predeclare_native_functions(&mut ctx, &self.host);
        predeclare(&mut ctx, &self.ast.body);
        let body = check_stmt_list(&mut ctx, globals, &self.ast.body);

        if ctx.errors.is_empty() {
            Ok(crate::Compiler {
                source: self.source,
                host: self.host,
                strings: self.strings,
                symtab: self.symtab,
                ast: Program { body },
            })
        } else {
            let errors: Vec<_> = ctx
                .errors
                .into_iter()
                .map(|(error, span)| SourceErrorWrapper::new(error, span, &self.source))
                .collect();
            Err(WithSource::new(errors, self.source))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{Host, HostConfig};
    use crate::strings::StringPool;

    fn check_source(src: &str) -> Result<crate::Compiler<Program<Checked>>, WithSource<CompileError>> {
        let strings = StringPool::new();
        let mut strings = strings;
        let types = TypeTable::new(&mut strings);
        let symtab = SymbolTable::new(types);
        let compiler = crate::Compiler {
            source: src.to_string(),
            host: Host::new(HostConfig::default()),
            strings,
            symtab,
            ast: (),
        };
        compiler.parse().unwrap().check()
    }

    #[test]
    fn resolves_simple_declaration() {
        let result = check_source("int x = 2 + 3 * 4;");
        let compiled = result.unwrap();
        match compiled.ast.body[0].value() {
            Stmt::VarDec(VarDec { init: Some(e), .. }) => {
                assert_eq!(e.metadata().ty, compiled.symtab.types.int_ty);
            }
            other => panic!("unexpected statement: {:?}", other),
        }
    }

    #[test]
    fn undefined_symbol_is_reported() {
        let result = check_source("int x = y + 1;");
        assert!(result.is_err());
    }

    #[test]
    fn recursive_function_resolves_its_own_call() {
        let result = check_source(
            "int fact(int n) { if (n <= 1) { return 1; } return n * fact(n - 1); }",
        );
        assert!(result.is_ok());
    }

    #[test]
    fn swizzle_resolves_to_correct_width() {
        let result = check_source("float3 v = float3(1.0, 2.0, 3.0); float2 xy = v.xy;");
        assert!(result.is_ok());
    }

    #[test]
    fn assigning_mismatched_types_is_rejected() {
        let result = check_source("struct P { int a; } int x = 0; P p; p = x;");
        assert!(result.is_err());
    }

    #[test]
    fn int_to_float_promotes_implicitly() {
        let result = check_source("float f = 1;");
        assert!(result.is_ok());
    }
}
