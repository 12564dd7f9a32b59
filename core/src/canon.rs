//! The canonizer: lowers the checked AST into labelled
//! [`crate::asm::Block`]s of [`crate::asm::Instruction`]s. An
//! already-linear instruction stream only needs its textual labels resolved
//! to offsets; BlockScript's source tree needs a full visitor since control
//! flow, calls, and addressing all have to be synthesized from scratch. Like
//! that simpler pass, this one can't fail -- every error it would hit was
//! already reported by [`crate::check`], and [`crate::Compiler::check`]
//! refuses to hand a tree with errors onward.
//!
//! Arithmetic stays tree-shaped: the VM's four ALU engines recurse over an
//! expression subtree themselves, so this pass's job is the statement- and
//! address-level lowering around that -- control
//! flow blocks, call argument staging, return lowering, and resolving
//! identifiers/field/array/swizzle access down to a [`Location`] the VM can
//! read or write directly.

use crate::{
    alloc::Id,
    ast::{
        BinOp, Checked, ElseTail, Expr, FunDec, Identifier, Node, Program, Stmt, StmtList,
        TreeModifier, TypeExpr, VarDec,
    },
    asm::{Assembly, Block, Instruction, Location, Operand, Reg},
    strings::{StringPool, Symbol},
    symbols::{FunctionId, OverloadResolution, SymbolTable},
    types::{Modifier, TypeId, TypeTable},
};

/// Parse a vector swizzle field name into its component indices (`x` = 0 ..
/// `w` = 3). Returns `None` if any character isn't a vector component
/// letter -- the checker has already rejected that case, so this is only
/// ever `None` here on a malformed internal call.
fn swizzle_indices(strings: &StringPool, field: Symbol) -> Option<Vec<usize>> {
    let text = strings.resolve(field);
    let components = ['x', 'y', 'z', 'w'];
    let indices: Vec<usize> =
        text.chars().filter_map(|c| components.iter().position(|&x| x == c)).collect();
    if indices.len() != text.chars().count() {
        return None;
    }
    Some(indices)
}

fn is_contiguous(indices: &[usize]) -> bool {
    indices.windows(2).all(|w| w[1] == w[0] + 1)
}

/// Resolve a [`TypeExpr`] to the [`TypeId`] the checker already created for
/// it. Every type named here is guaranteed to already exist in
/// `symtab.types` by the time canonicalization runs, including synthetic
/// array-type names (`"int[4]"`), which the checker interned while building
/// the declared array type.
fn type_expr_to_id(symtab: &SymbolTable, strings: &StringPool, ty: &TypeExpr) -> Option<TypeId> {
    match ty {
        TypeExpr::Named(name) => symtab.types.find_by_name(*name),
        TypeExpr::StaticArray(elem, len) => {
            let elem_ty = type_expr_to_id(symtab, strings, elem)?;
            let elem_name = symtab.types.get(elem_ty).name;
            let text = format!("{}[{}]", strings.resolve(elem_name), len);
            let array_name = strings.find(&text)?;
            symtab.types.find_by_name(array_name)
        }
    }
}

/// Tracks the chain of runtime-pushed frames active at the current point in
/// the lowering walk, innermost last. A checked [`Identifier`]'s
/// `frame_index` is the raw index the symbol table's frame arena assigned
/// when [`crate::check`] called `push_frame`; reconstructing it here (rather
/// than pushing fresh frames of our own) requires visiting every
/// `FunDec`/`If`/`ElseIfTail`/else/`While`/`TreeModifier` in the exact same
/// depth-first order the checker did, so the Nth frame this pass enters is
/// the same frame the checker numbered N.
struct FrameCursor {
    next_id: u32,
    stack: Vec<u32>,
}

impl FrameCursor {
    fn new() -> Self {
        FrameCursor { next_id: 1, stack: Vec::new() }
    }

    fn enter(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.stack.push(id);
        id
    }

    fn exit(&mut self) {
        self.stack.pop();
    }

    /// Frames-up distance from the current (innermost) frame to the frame
    /// identified by `target` (a raw frame-arena index), 0 if `target` is
    /// the innermost frame itself.
    fn frames_up(&self, target: u32) -> u32 {
        match self.stack.iter().rposition(|&id| id == target) {
            Some(pos) => (self.stack.len() - 1 - pos) as u32,
            None => 0,
        }
    }
}

struct Canon<'a> {
    symtab: &'a SymbolTable,
    strings: &'a StringPool,
    asm: Assembly,
    cursor: FrameCursor,
    current_return: Option<TypeId>,
}

impl<'a> Canon<'a> {
    fn type_size(&self, ty: TypeId) -> u32 {
        self.symtab.types.get(ty).byte_size
    }

    /// Resolve an identifier's checked metadata to a [`Location`], given
    /// the identifier already carries its frame index/offset/is_global from
    /// the builder.
    fn identifier_location(&self, id: &Identifier, ty: TypeId) -> Location {
        if id.is_global {
            Location::Global { offset: id.offset as u32, ty }
        } else {
            let frames_up = self.cursor.frames_up(id.frame_index as u32);
            Location::Local { frames_up, offset: id.offset as u32, ty }
        }
    }

    /// Compute the static extra byte offset a field/swizzle access adds on
    /// top of its receiver's address, when that offset is known at compile
    /// time (struct fields, and single/contiguous vector swizzles). Returns
    /// `None` for swizzles the canonizer can't express as a pure offset
    /// (non-contiguous, e.g. `.zx`), which get a materializing fallback.
    fn static_field_offset(&self, receiver_ty: TypeId, field: Symbol) -> Option<(u32, TypeId)> {
        let desc = self.symtab.types.get(receiver_ty);
        match desc.modifier {
            Modifier::Struct => {
                let fields = desc.struct_fields.as_ref()?;
                let mut offset = 0;
                for f in fields {
                    if f.name == field {
                        return Some((offset, f.ty));
                    }
                    offset += self.type_size(f.ty);
                }
                None
            }
            Modifier::Vector => {
                let indices = swizzle_indices(self.strings, field)?;
                if !is_contiguous(&indices) {
                    return None;
                }
                let start = *indices.first()?;
                let width = indices.len() as u32;
                let ty = if width == 1 {
                    self.symtab.types.float_ty
                } else {
                    self.symtab.types.vector_of_width(width)?
                };
                Some((start as u32 * 4, ty))
            }
            _ => None,
        }
    }

    /// Resolve an expression to the [`Location`] it reads from or writes
    /// to, emitting any address-computation instructions this requires
    /// into `block`. Object-reference property access is handled by the
    /// caller before reaching here (see [`Canon::lower_exp_stmt`]), since
    /// that needs `ReadObjProp`/`WriteObjProp`, not a plain [`Location`].
    fn resolve_location(
        &mut self,
        block: &mut Block,
        expr: &Node<Expr<Checked>, Checked>,
    ) -> Location {
        match expr.value() {
            Expr::Idd(id) => self.identifier_location(id, expr.metadata().ty),
            Expr::Binop(BinOp::Access, receiver, field) => {
                let receiver_ty = receiver.metadata().ty;
                let receiver_loc = self.resolve_location(block, receiver);

                // Array element: the field side is a real index expression,
                // not a bare field name. Compute byte offset
                // i * element-size, add to base.
                if self.symtab.types.get(receiver_ty).modifier == Modifier::Array {
                    let elem_ty = self.symtab.types.get(receiver_ty).child.unwrap();
                    let elem_size = self.type_size(elem_ty);
                    block.push(Instruction::ComputeIndexAddr {
                        dst: Reg::B,
                        base: receiver_loc,
                        index: Operand::Expr(field.clone()),
                        elem_size,
                    });
                    return Location::Indirect { addr: Reg::B, ty: elem_ty };
                }

                let field_name = match field.value() {
                    Expr::Idd(id) => id.name,
                    _ => return receiver_loc,
                };
                match self.static_field_offset(receiver_ty, field_name) {
                    Some((extra, ty)) => add_offset(receiver_loc, extra, ty),
                    None => {
                        // A non-contiguous vector swizzle (e.g. `.zx`) isn't
                        // expressible as a single offset + type. As an
                        // assignment target this is intercepted earlier, in
                        // `lower_exp_stmt`, which emits `ScatterSwizzle`
                        // instead of calling this function; reaching here
                        // with one means it surfaced some other way the
                        // checker should have rejected.
                        block.push(Instruction::LoadAddr { dst: Reg::B, src: receiver_loc });
                        Location::Indirect { addr: Reg::B, ty: expr.metadata().ty }
                    }
                }
            }
            _ => {
                // Not addressable on its own (an arithmetic expression, a
                // call result) -- stage it through a scratch register.
                block.push(Instruction::Load {
                    dst: Reg::A,
                    src: Operand::Expr(Box::new(expr.clone())),
                });
                Location::Register(Reg::A)
            }
        }
    }

    fn lower_stmt_list(&mut self, block: &mut Block, stmts: &StmtList<Checked>) {
        for stmt in stmts {
            self.lower_stmt(block, stmt);
        }
    }

    fn lower_stmt(&mut self, block: &mut Block, stmt: &Node<Stmt<Checked>, Checked>) {
        match stmt.value() {
            Stmt::Exp(e) => self.lower_exp_stmt(block, e),
            Stmt::VarDec(VarDec { name, init, .. }) => {
                if let Some(init) = init {
                    self.lower_assignment_to_name(block, *name, init);
                }
            }
            Stmt::Return(value) => self.lower_return(block, value.as_ref()),
            Stmt::FunDec(fun_dec) => self.lower_fun_dec(fun_dec),
            Stmt::If(cond, then_body, else_tail) => {
                self.lower_if(block, cond, then_body, else_tail.as_ref())
            }
            Stmt::While(cond, body) => self.lower_while(block, cond, body),
            Stmt::TreeModifier(TreeModifier { body, .. }) => {
                let frame_size = self.current_frame_size();
                let frame_id = self.cursor.next_id;
                block.push(Instruction::PushFrame { frame_size, frame_id });
                self.cursor.enter();
                self.lower_stmt_list(block, body);
                self.cursor.exit();
                block.push(Instruction::PopFrame);
            }
            Stmt::StructDef(_) | Stmt::EnumDef(_) => {
                // Pure compile-time declarations; nothing to emit.
            }
        }
    }

    fn current_frame_size(&self) -> u32 {
        // The frame about to be entered is the next one `FrameCursor` will
        // hand out; its size was already computed by the checker.
        let id = Id::new(self.cursor.next_id);
        self.symtab.frame(id).total_size
    }

    fn lower_exp_stmt(&mut self, block: &mut Block, expr: &Node<Expr<Checked>, Checked>) {
        if let Expr::Binop(BinOp::Assign, lhs, rhs) = expr.value() {
            if let Expr::Binop(BinOp::Access, receiver, field) = lhs.value() {
                let receiver_ty = receiver.metadata().ty;
                if self.symtab.types.get(receiver_ty).modifier == Modifier::ObjectRef {
                    let property = match field.value() {
                        Expr::Idd(id) => id.name,
                        _ => unreachable!(
                            "object property access always carries a field-name node"
                        ),
                    };
                    let obj = self.resolve_location(block, receiver);
                    block.push(Instruction::WriteObjProp {
                        obj,
                        property,
                        src: Operand::Expr(rhs.clone()),
                    });
                    return;
                }
                if self.symtab.types.get(receiver_ty).modifier == Modifier::Vector {
                    if let Expr::Idd(id) = field.value() {
                        if let Some(indices) = swizzle_indices(self.strings, id.name) {
                            if !is_contiguous(&indices) {
                                let base = self.resolve_location(block, receiver);
                                block.push(Instruction::ScatterSwizzle {
                                    base,
                                    indices: indices.iter().map(|&i| i as u32).collect(),
                                    src: Operand::Expr(rhs.clone()),
                                });
                                return;
                            }
                        }
                    }
                }
            }
            let dst = self.resolve_location(block, lhs);
            let ty = expr.metadata().ty;
            block.push(Instruction::Move { dst, src: Operand::Expr(rhs.clone()), ty });
            return;
        }
        // Any other top-level expression statement is evaluated purely for
        // its side effects (a call); the result is discarded.
        block.push(Instruction::Load { dst: Reg::A, src: Operand::Expr(Box::new(expr.clone())) });
    }

    fn lower_assignment_to_name(
        &mut self,
        block: &mut Block,
        name: Symbol,
        init: &Node<Expr<Checked>, Checked>,
    ) {
        let frame_id = Id::new(*self.cursor.stack.last().unwrap_or(&0));
        let entry = self
            .symtab
            .frame(frame_id)
            .find(name)
            .expect("the checker always allocates a slot for every VarDec in its own frame");
        let dst = if self.cursor.stack.is_empty() {
            Location::Global { offset: entry.offset, ty: entry.ty }
        } else {
            Location::Local { frames_up: 0, offset: entry.offset, ty: entry.ty }
        };
        let ty = init.metadata().ty;
        block.push(Instruction::Move { dst, src: Operand::Expr(Box::new(init.clone())), ty });
    }

    /// Lower a `return`: a sequence of `PopFrame`s unwinding every scope
    /// pushed since the enclosing function body, then the value transfer
    /// (a register `Load` for small values, a `CopyToAddr` through `RET`
    /// for oversized ones), then `Ret`.
    fn lower_return(&mut self, block: &mut Block, value: Option<&Node<Expr<Checked>, Checked>>) {
        let unwind_count = self.cursor.stack.len().saturating_sub(1);
        for _ in 0..unwind_count {
            block.push(Instruction::PopFrame);
        }

        if let Some(expr) = value {
            let ty = self.current_return.unwrap_or(expr.metadata().ty);
            if self.type_size(ty) <= 4 {
                block.push(Instruction::Load {
                    dst: Reg::Ret,
                    src: Operand::Expr(Box::new(expr.clone())),
                });
            } else {
                block.push(Instruction::CopyToAddr {
                    addr: Reg::Ret,
                    src: Operand::Expr(Box::new(expr.clone())),
                    len: self.type_size(ty),
                });
            }
        }
        block.push(Instruction::Ret);
    }

    /// `if`/`while`/`else if` all lower to a head block (evaluate
    /// condition, `JmpCond` to the join on false), a body block, a branch
    /// back to the head (`while`) or forward to the join (`if`), and a join
    /// block.
    fn lower_if(
        &mut self,
        block: &mut Block,
        cond: &Node<Expr<Checked>, Checked>,
        then_body: &StmtList<Checked>,
        else_tail: Option<&ElseTail<Checked>>,
    ) {
        let join_label = self.asm.new_block();

        self.lower_branch(block, cond, then_body, join_label);

        if let Some(tail) = else_tail {
            for else_if in &tail.else_ifs {
                let elseif_label = self.asm.new_block();
                block.next_block = Some(elseif_label);
                *block = Block::new(elseif_label);
                self.lower_branch(block, &else_if.cond, &else_if.body, join_label);
            }
            if let Some(else_body) = &tail.else_body {
                let frame_size = self.current_frame_size();
                let frame_id = self.cursor.next_id;
                block.push(Instruction::PushFrame { frame_size, frame_id });
                self.cursor.enter();
                self.lower_stmt_list(block, else_body);
                self.cursor.exit();
                block.push(Instruction::PopFrame);
            }
        }

        block.push(Instruction::Jmp { label: join_label });
        block.next_block = Some(join_label);
        *block = Block::new(join_label);
    }

    /// Emit one condition-check + body pair, jumping to `join_label` when
    /// the condition is false (used by both plain `if` and `else if`).
    fn lower_branch(
        &mut self,
        block: &mut Block,
        cond: &Node<Expr<Checked>, Checked>,
        body: &StmtList<Checked>,
        join_label: u32,
    ) {
        block.push(Instruction::JmpCond {
            cond: Operand::Expr(Box::new(cond.clone())),
            value: 0,
            label: join_label,
        });
        let frame_size = self.current_frame_size();
        let frame_id = self.cursor.next_id;
        block.push(Instruction::PushFrame { frame_size, frame_id });
        self.cursor.enter();
        self.lower_stmt_list(block, body);
        self.cursor.exit();
        block.push(Instruction::PopFrame);
    }

    fn lower_while(
        &mut self,
        block: &mut Block,
        cond: &Node<Expr<Checked>, Checked>,
        body: &StmtList<Checked>,
    ) {
        let head_label = self.asm.new_block();
        let join_label = self.asm.new_block();

        block.push(Instruction::Jmp { label: head_label });
        block.next_block = Some(head_label);

        let mut head = Block::new(head_label);
        head.push(Instruction::JmpCond {
            cond: Operand::Expr(Box::new(cond.clone())),
            value: 0,
            label: join_label,
        });
        let frame_size = self.current_frame_size();
        let frame_id = self.cursor.next_id;
        head.push(Instruction::PushFrame { frame_size, frame_id });
        self.cursor.enter();
        self.lower_stmt_list(&mut head, body);
        self.cursor.exit();
        head.push(Instruction::PopFrame);
        head.push(Instruction::Jmp { label: head_label });
        head.next_block = Some(join_label);
        *self.asm.block_mut(head_label) = head;

        *block = Block::new(join_label);
    }

    fn lower_fun_dec(&mut self, fun_dec: &FunDec<Checked>) {
        let body = match &fun_dec.body {
            Some(body) => body,
            None => return,
        };

        let arg_types: Vec<TypeId> = fun_dec
            .params
            .iter()
            .map(|p| {
                type_expr_to_id(self.symtab, self.strings, &p.ty)
                    .unwrap_or(self.symtab.types.wildcard_ty)
            })
            .collect();

        let function_id: FunctionId =
            match self.symtab.functions.resolve(fun_dec.name, &arg_types, &self.symtab.types) {
                OverloadResolution::Found(id) => id,
                // `check()` already guarantees every top-level function
                // declaration resolves unambiguously; anything else here
                // means that guarantee was violated upstream, which is a
                // bug in the checker rather than something to report here.
                _ => return,
            };

        let entry_label = self.asm.new_block();
        let frame_id = self.cursor.next_id;
        self.asm.bind_function(function_id, entry_label, frame_id);

        let return_ty = self.symtab.functions.get(function_id).return_type;
        let prior = self.current_return.replace(return_ty);

        let mut fn_block = Block::new(entry_label);
        self.cursor.enter();
        self.lower_stmt_list(&mut fn_block, body);
        self.cursor.exit();
        fn_block.push(Instruction::Ret);
        *self.asm.block_mut(entry_label) = fn_block;

        self.current_return = prior;
    }
}

fn add_offset(loc: Location, extra: u32, ty: TypeId) -> Location {
    match loc {
        Location::Local { frames_up, offset, .. } => {
            Location::Local { frames_up, offset: offset + extra, ty }
        }
        Location::Global { offset, .. } => Location::Global { offset: offset + extra, ty },
        Location::Indirect { addr, .. } => Location::Indirect { addr, ty },
        Location::Register(r) => Location::Register(r),
    }
}

impl crate::Compiler<Program<Checked>> {
    /// Lowers the checked program into a canonical [`Assembly`]. Every
    /// top-level statement is visited in source order, exactly mirroring
    /// [`crate::check`]'s traversal so [`Identifier::frame_index`] values
    /// resolve against the same frame numbering the checker assigned.
    pub(crate) fn canonicalize(self) -> crate::Compiler<Assembly> {
        let mut canon = Canon {
            symtab: &self.symtab,
            strings: &self.strings,
            asm: Assembly::new(),
            cursor: FrameCursor::new(),
            current_return: None,
        };

        let global_entry = canon.asm.new_block();
        let mut global_block = Block::new(global_entry);
        for stmt in &self.ast.body {
            canon.lower_stmt(&mut global_block, stmt);
        }
        global_block.push(Instruction::Exit);
        *canon.asm.block_mut(global_entry) = global_block;

        crate::Compiler {
            source: self.source,
            host: self.host,
            strings: self.strings,
            symtab: self.symtab,
            ast: canon.asm,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{Host, HostConfig};

    fn canonicalize(src: &str) -> Assembly {
        let mut strings = StringPool::new();
        let types = TypeTable::new(&mut strings);
        let symtab = SymbolTable::new(types);
        let compiler = crate::Compiler {
            source: src.to_string(),
            host: Host::new(HostConfig::default()),
            strings,
            symtab,
            ast: (),
        };
        compiler.parse().unwrap().check().unwrap().canonicalize().ast
    }

    #[test]
    fn simple_assignment_lowers_to_one_block() {
        let asm = canonicalize("int x = 2 + 3 * 4;");
        assert!(!asm.blocks.is_empty());
        assert!(matches!(asm.blocks[0].instructions.last(), Some(Instruction::Exit)));
    }

    #[test]
    fn function_declaration_binds_an_entry_label() {
        let asm =
            canonicalize("int fact(int n) { if (n <= 1) { return 1; } return n * fact(n - 1); }");
        assert_eq!(asm.entry_labels.len(), 1);
    }

    #[test]
    fn while_loop_emits_head_and_join_blocks() {
        let asm = canonicalize("int i = 0; while (i < 10) { i = i + 1; }");
        assert!(asm.blocks.len() >= 3);
    }

    #[test]
    fn if_else_chain_wires_distinct_join_block() {
        let asm = canonicalize(
            "int x = 1; if (x == 1) { x = 2; } else if (x == 2) { x = 3; } else { x = 4; }",
        );
        assert!(asm.blocks.len() >= 2);
    }
}
