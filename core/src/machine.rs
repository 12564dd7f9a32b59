//! The virtual machine: a steppable executor over a
//! canonical [`Assembly`]. The register file, growable stack RAM,
//! fetch/execute `step` loop, and runtime-error storage follow the shape of
//! a classic register-machine VM, but swap its flat instruction set for
//! block-addressed control flow plus four ALU engines that recurse directly
//! over a `Checked` expression subtree rather than a flattened bytecode
//! stream.

use std::collections::HashMap;
use std::convert::TryInto;

use crate::{
    asm::{Assembly, Instruction, Location, Operand, Reg},
    ast::{BinOp, Checked, Expr, Literal, Node, UnOp},
    consts::{FRAME_SENTINEL, STACK_PAGE_SIZE, TIME_BUDGET_SAMPLE_INTERVAL},
    debug,
    error::{HostError, RuntimeError, SourceErrorWrapper, WithSource},
    host::{CallContext, Host},
    strings::Symbol,
    symbols::{FunctionId, SymbolTable},
    types::{AluEngine, Modifier, TypeId},
    util::Span,
};

/// An evaluated BlockScript value, sized and shaped by its [`TypeId`]'s
/// [`AluEngine`]. Structs and arrays never appear here -- reading/writing
/// one is always decomposed into per-field/per-element scalar or vector
/// operations by the canonizer.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Value {
    Int(i32),
    Float(f32),
    Float2([f32; 2]),
    Float3([f32; 3]),
    Float4([f32; 4]),
    /// A heap slot index (object references and strings alike).
    Object(u32),
}

impl Value {
    fn as_bytes(self) -> Vec<u8> {
        match self {
            Value::Int(v) => v.to_le_bytes().to_vec(),
            Value::Float(v) => v.to_le_bytes().to_vec(),
            Value::Float2(v) => v.iter().flat_map(|c| c.to_le_bytes()).collect(),
            Value::Float3(v) => v.iter().flat_map(|c| c.to_le_bytes()).collect(),
            Value::Float4(v) => v.iter().flat_map(|c| c.to_le_bytes()).collect(),
            Value::Object(v) => v.to_le_bytes().to_vec(),
        }
    }

    fn as_i32(self) -> i32 {
        match self {
            Value::Int(v) => v,
            _ => 0,
        }
    }

    /// Extract a heap handle or raw address, from either an `int` or an
    /// object-reference value.
    fn as_handle(self) -> u32 {
        match self {
            Value::Object(v) => v,
            Value::Int(v) => v as u32,
            _ => 0,
        }
    }

    fn as_f32(self) -> f32 {
        match self {
            Value::Float(v) => v,
            Value::Int(v) => v as f32,
            _ => 0.0,
        }
    }

    fn components(self) -> Vec<f32> {
        match self {
            Value::Float2(v) => v.to_vec(),
            Value::Float3(v) => v.to_vec(),
            Value::Float4(v) => v.to_vec(),
            Value::Float(v) => vec![v],
            _ => Vec::new(),
        }
    }

    fn from_components(engine: AluEngine, components: &[f32]) -> Value {
        match engine {
            AluEngine::Float2 => Value::Float2([components[0], components[1]]),
            AluEngine::Float3 => Value::Float3([components[0], components[1], components[2]]),
            AluEngine::Float4 => {
                Value::Float4([components[0], components[1], components[2], components[3]])
            }
            _ => Value::Float(components[0]),
        }
    }

    fn from_bytes(bytes: &[u8], engine: AluEngine, modifier: Modifier) -> Value {
        match engine {
            AluEngine::Int => Value::Int(i32::from_le_bytes(bytes[0..4].try_into().unwrap())),
            AluEngine::Float => Value::Float(f32::from_le_bytes(bytes[0..4].try_into().unwrap())),
            AluEngine::Float2 | AluEngine::Float3 | AluEngine::Float4 => {
                let width = match engine {
                    AluEngine::Float2 => 2,
                    AluEngine::Float3 => 3,
                    _ => 4,
                };
                let components: Vec<f32> = (0..width)
                    .map(|i| f32::from_le_bytes(bytes[i * 4..i * 4 + 4].try_into().unwrap()))
                    .collect();
                Value::from_components(engine, &components)
            }
            AluEngine::None => {
                if modifier == Modifier::ObjectRef {
                    Value::Object(u32::from_le_bytes(bytes[0..4].try_into().unwrap()))
                } else {
                    Value::Int(i32::from_le_bytes(bytes[0..4].try_into().unwrap()))
                }
            }
        }
    }
}

/// A runtime object stored in the heap slot table: a boxed, host-opaque
/// payload (a `String` for a string literal, or a host object registered via
/// [`Vm::insert_heap_object`], tagged with its [`TypeId`] so a later
/// `ReadObjProp`/`WriteObjProp` can look up which property callbacks the
/// object's concrete type exposes).
pub enum HeapObject {
    String(String),
    Host { type_id: TypeId, payload: Box<dyn std::any::Any> },
}

/// One entry of the runtime call stack, tracking what a `Ret` needs to
/// restore: the caller's current block and instruction index. The frame
/// this call pushed is tracked separately on `frame_bases`/`frame_stack`,
/// which `Ret` pops in lockstep.
struct CallFrame {
    return_label: u32,
    return_index: usize,
}

/// The two ways [`Vm::call_function`] (the `ExecuteFunction` bind point) can
/// fail: a host-contract violation caught before any VM state changes, or a
/// runtime error raised while the callee actually ran.
#[derive(Debug)]
pub enum CallFunctionError<'a> {
    Host(HostError),
    Runtime(&'a WithSource<RuntimeError>),
}

impl std::fmt::Display for CallFunctionError<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CallFunctionError::Host(e) => write!(f, "{}", e),
            CallFunctionError::Runtime(e) => write!(f, "{}", e),
        }
    }
}

/// A steppable executor over a canonical [`Assembly`]: static inputs the VM
/// was built from, a runtime-error slot that halts further execution once
/// populated, and a cycle counter a host can read for profiling or to
/// enforce its own budget on top of the built-in one.
pub struct Vm<'a> {
    assembly: &'a Assembly,
    symtab: &'a SymbolTable,
    strings: &'a crate::strings::StringPool,
    host: &'a Host,
    source: &'a str,

    stack: Vec<u8>,
    heap: Vec<Option<HeapObject>>,
    registers: HashMap<Reg, Value>,
    frame_stack: Vec<u32>,
    frame_bases: Vec<usize>,
    /// Parallel to `frame_bases`/`frame_stack`: the sentinel written when a
    /// frame was pushed, checked on pop. A mismatch means the VM (or the
    /// canonizer that generated this assembly) pushed and popped frames out
    /// of order -- a bug, never a user-triggerable condition.
    frame_sentinels: Vec<u32>,
    call_stack: Vec<CallFrame>,

    block: u32,
    instr_index: usize,
    cycle_count: usize,
    error: Option<WithSource<RuntimeError>>,
    /// Wall-clock start, sampled every [`TIME_BUDGET_SAMPLE_INTERVAL`]
    /// cycles against `HostConfig::time_budget_ms` in debug builds.
    start_time: std::time::Instant,
}

impl<'a> Vm<'a> {
    pub fn new(
        assembly: &'a Assembly,
        symtab: &'a SymbolTable,
        strings: &'a crate::strings::StringPool,
        host: &'a Host,
        source: &'a str,
    ) -> Self {
        let globals_size = symtab.frame(symtab.globals).total_size as usize;
        let mut stack = vec![0u8; globals_size.max(STACK_PAGE_SIZE)];
        stack.resize(stack.len().max(globals_size), 0);

        Vm {
            assembly,
            symtab,
            strings,
            host,
            source,
            stack,
            heap: Vec::new(),
            registers: HashMap::new(),
            frame_stack: vec![0],
            frame_bases: vec![0],
            frame_sentinels: vec![FRAME_SENTINEL],
            call_stack: Vec::new(),
            block: 0,
            instr_index: 0,
            cycle_count: 0,
            error: None,
            start_time: std::time::Instant::now(),
        }
    }

    pub fn terminated(&self) -> bool {
        self.error.is_some() || self.block as usize >= self.assembly.blocks.len()
    }

    pub fn error(&self) -> Option<&WithSource<RuntimeError>> {
        self.error.as_ref()
    }

    pub fn cycle_count(&self) -> usize {
        self.cycle_count
    }

    /// Run a function from the global entry point (or a specific function,
    /// for a host's `ExecuteFunction` bind point) until it halts or errors.
    pub fn run(&mut self) -> Result<(), &WithSource<RuntimeError>> {
        while !self.terminated() {
            if self.step().is_err() {
                break;
            }
        }
        match &self.error {
            None => Ok(()),
            Some(_) => Err(self.error.as_ref().unwrap()),
        }
    }

    /// Call a host-bound function directly (the `ExecuteFunction` bind
    /// point), staging `args` and returning the little-endian return bytes.
    ///
    /// Rejects the call outright, before touching any VM state, if the VM
    /// is already mid-execution (no nested `ExecuteFunction`) or if `args`'
    /// combined byte size doesn't match the function's declared parameter
    /// types.
    pub fn call_function(
        &mut self,
        function: FunctionId,
        args: &[Value],
    ) -> Result<Vec<u8>, CallFunctionError<'_>> {
        if !self.call_stack.is_empty() {
            return Err(CallFunctionError::Host(HostError::NestedExecuteFunction));
        }

        let desc = self.symtab.functions.get(function);
        let expected: usize =
            desc.signature.params.iter().map(|&ty| self.symtab.types.get(ty).byte_size as usize).sum();
        let actual: usize = args.iter().map(|v| v.as_bytes().len()).sum();
        if expected != actual {
            return Err(CallFunctionError::Host(HostError::BufferSizeMismatch { expected, actual }));
        }

        if let Some(native) = desc.native_callback {
            let arg_bytes: Vec<u8> = args.iter().flat_map(|v| v.as_bytes()).collect();
            let mut ret = vec![0u8; self.symtab.types.get(desc.return_type).byte_size as usize];
            let mut ctx = CallContext { args: &arg_bytes, ret: &mut ret, user_context: None };
            return match self.host.call_intrinsic(native, &mut ctx) {
                Ok(()) => Ok(ret),
                Err(e) => {
                    self.error = Some(wrap(e, Span::default(), self.source));
                    Err(CallFunctionError::Runtime(self.error.as_ref().unwrap()))
                }
            };
        }

        let label = match self.assembly.entry_label(function) {
            Some(l) => l,
            None => {
                self.error = Some(wrap(RuntimeError::HeapTypeMismatch, Span::default(), self.source));
                return Err(CallFunctionError::Runtime(self.error.as_ref().unwrap()));
            }
        };
        let frame_id = self.assembly.body_frame(function).unwrap_or(0);
        let frame_size = self.symtab.frame(crate::alloc::Id::new(frame_id)).total_size as usize;

        let base = self.stack.len();
        self.grow_stack_to(base + frame_size);
        for (i, arg) in args.iter().enumerate() {
            let offset = base + i * 4;
            let bytes = arg.as_bytes();
            self.stack[offset..offset + bytes.len()].copy_from_slice(&bytes);
        }

        self.call_stack.push(CallFrame {
            return_label: self.block,
            return_index: self.instr_index,
        });
        self.frame_stack.push(frame_id);
        self.frame_bases.push(base);
        self.frame_sentinels.push(FRAME_SENTINEL);
        self.block = label;
        self.instr_index = 0;

        while !self.call_stack.is_empty() && self.error.is_none() {
            if self.step().is_err() {
                break;
            }
        }

        match &self.error {
            None => Ok(self.registers.get(&Reg::Ret).copied().unwrap_or(Value::Int(0)).as_bytes()),
            Some(_) => Err(CallFunctionError::Runtime(self.error.as_ref().unwrap())),
        }
    }

    fn grow_stack_to(&mut self, len: usize) {
        if len > self.stack.len() {
            let grown = ((len - self.stack.len()) / STACK_PAGE_SIZE + 1) * STACK_PAGE_SIZE;
            self.stack.resize(self.stack.len() + grown, 0);
        }
    }

    /// Frames-up distance from the current innermost runtime frame to the
    /// frame whose static id is `target` -- the mirror image of
    /// [`crate::canon::FrameCursor::frames_up`], but computed over the
    /// runtime's own pushed-frame-id stack instead of the canonizer's.
    fn frames_up(&self, target: u32) -> usize {
        self.frame_stack.iter().rposition(|&id| id == target).map_or(0, |pos| self.frame_stack.len() - 1 - pos)
    }

    fn base_for(&self, frames_up: usize) -> usize {
        let idx = self.frame_bases.len().saturating_sub(1 + frames_up);
        self.frame_bases[idx]
    }

    fn location_address(&self, loc: &Location) -> usize {
        match loc {
            Location::Global { offset, .. } => *offset as usize,
            Location::Local { frames_up, offset, .. } => {
                self.base_for(*frames_up as usize) + *offset as usize
            }
            Location::Indirect { addr, .. } => match self.registers.get(addr) {
                Some(Value::Int(v)) | Some(Value::Object(_)) if *v >= 0 => *v as usize,
                Some(v) => v.as_i32().max(0) as usize,
                None => 0,
            },
            Location::Register(_) => unreachable!("registers aren't memory-addressed"),
        }
    }

    fn location_type(&self, loc: &Location) -> TypeId {
        match loc {
            Location::Global { ty, .. }
            | Location::Local { ty, .. }
            | Location::Indirect { ty, .. } => *ty,
            Location::Register(_) => self.symtab.types.int_ty,
        }
    }

    fn read_location(&self, loc: &Location) -> Value {
        if let Location::Register(r) = loc {
            return self.registers.get(r).copied().unwrap_or(Value::Int(0));
        }
        let ty = self.location_type(loc);
        let desc = self.symtab.types.get(ty);
        let addr = self.location_address(loc);
        Value::from_bytes(&self.stack[addr..addr + desc.byte_size as usize], desc.alu_engine, desc.modifier)
    }

    fn write_location(&mut self, loc: &Location, value: Value) {
        if let Location::Register(r) = loc {
            self.registers.insert(*r, value);
            return;
        }
        let addr = self.location_address(loc);
        let bytes = value.as_bytes();
        self.grow_stack_to(addr + bytes.len());
        self.stack[addr..addr + bytes.len()].copy_from_slice(&bytes);
    }

    /// Write `value`'s components to `base_addr`, scattered to the
    /// individual component slots named by `indices` (e.g. `.zx`'s `[2, 0]`
    /// against a `float4` base writes `value`'s first component at byte
    /// offset 8 and its second at offset 0).
    fn scatter_vector_components(&mut self, base_addr: usize, indices: &[usize], value: Value) {
        let comps = value.components();
        for (slot, &component_index) in indices.iter().enumerate() {
            let addr = base_addr + component_index * 4;
            let bytes = comps[slot].to_le_bytes();
            self.grow_stack_to(addr + 4);
            self.stack[addr..addr + 4].copy_from_slice(&bytes);
        }
    }

    /// Evaluate a checked expression subtree. The ALU engines recurse
    /// directly over the AST rather than a flattened bytecode stream.
    fn eval(&mut self, expr: &Node<Expr<Checked>, Checked>) -> Result<Value, RuntimeError> {
        let ty = expr.metadata().ty;
        match expr.value() {
            Expr::Imm(Literal::Int(v)) => Ok(Value::Int(*v)),
            Expr::Imm(Literal::Float(v)) => Ok(Value::Float(*v)),
            Expr::StrImm(s) => Ok(Value::Object(self.insert_string(s.clone()))),
            Expr::Idd(id) => {
                let loc = if id.is_global {
                    Location::Global { offset: id.offset as u32, ty }
                } else {
                    let frames_up = self.frames_up(id.frame_index as u32) as u32;
                    Location::Local { frames_up, offset: id.offset as u32, ty }
                };
                Ok(self.read_location(&loc))
            }
            Expr::Unop(UnOp::Neg, inner) => {
                let v = self.eval(inner)?;
                Ok(match v {
                    Value::Int(i) => Value::Int(i.wrapping_neg()),
                    Value::Float(f) => Value::Float(-f),
                    other => {
                        let engine = self.symtab.types.get(ty).alu_engine;
                        Value::from_components(
                            engine,
                            &other.components().iter().map(|c| -c).collect::<Vec<_>>(),
                        )
                    }
                })
            }
            Expr::Unop(UnOp::Not, inner) => {
                let v = self.eval(inner)?.as_i32();
                Ok(Value::Int(if v == 0 { 1 } else { 0 }))
            }
            Expr::Unop(UnOp::Cast, inner) => {
                let v = self.eval(inner)?;
                Ok(Value::Float(v.as_f32()))
            }
            Expr::Binop(BinOp::Access, receiver, field) => self.eval_access(expr, receiver, field),
            Expr::Binop(op, lhs, rhs) => self.eval_binop(*op, lhs, rhs, ty),
            Expr::FunCall { args, resolved, .. } => self.eval_call(None, args, *resolved, ty),
            Expr::MethodCall { receiver, args, resolved, .. } => {
                self.eval_call(Some(receiver), args, *resolved, ty)
            }
            Expr::Sizeof(_) => {
                // The checker always folds `sizeof` down to an `Imm(Int)`
                // immediate before this tree reaches the VM.
                unreachable!("sizeof is resolved at check time")
            }
        }
    }

    fn eval_binop(
        &mut self,
        op: BinOp,
        lhs: &Node<Expr<Checked>, Checked>,
        rhs: &Node<Expr<Checked>, Checked>,
        result_ty: TypeId,
    ) -> Result<Value, RuntimeError> {
        if op == BinOp::Assign {
            let value = self.eval(rhs)?;
            if let Expr::Binop(BinOp::Access, receiver, field) = lhs.value() {
                let receiver_ty = receiver.metadata().ty;
                if self.symtab.types.get(receiver_ty).modifier == Modifier::Vector {
                    if let Expr::Idd(id) = field.value() {
                        if let Some(indices) = swizzle_indices(self.strings, id.name) {
                            if !is_contiguous(&indices) {
                                let receiver_loc = self.lvalue_location(receiver)?;
                                let base_addr = self.location_address(&receiver_loc);
                                self.scatter_vector_components(base_addr, &indices, value);
                                return Ok(value);
                            }
                        }
                    }
                }
            }
            let loc = self.lvalue_location(lhs)?;
            self.write_location(&loc, value);
            return Ok(value);
        }

        let lv = self.eval(lhs)?;
        let rv = self.eval(rhs)?;

        match op {
            BinOp::And => return Ok(Value::Int(if lv.as_i32() != 0 && rv.as_i32() != 0 { 1 } else { 0 })),
            BinOp::Or => return Ok(Value::Int(if lv.as_i32() != 0 || rv.as_i32() != 0 { 1 } else { 0 })),
            _ => {}
        }

        let engine = self.symtab.types.get(result_ty).alu_engine;
        if matches!(op, BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge | BinOp::Eq | BinOp::Ne) {
            return Ok(Value::Int(self.compare(op, lv, rv)? as i32));
        }

        match engine {
            AluEngine::Int => {
                let (a, b) = (lv.as_i32(), rv.as_i32());
                Ok(Value::Int(match op {
                    BinOp::Add => a.wrapping_add(b),
                    BinOp::Sub => a.wrapping_sub(b),
                    BinOp::Mul => a.wrapping_mul(b),
                    BinOp::Div => {
                        if b == 0 {
                            return Err(RuntimeError::DivideByZero);
                        }
                        a.wrapping_div(b)
                    }
                    BinOp::Mod => {
                        if b == 0 {
                            return Err(RuntimeError::DivideByZero);
                        }
                        a.wrapping_rem(b)
                    }
                    _ => unreachable!("comparison/logical ops handled above"),
                }))
            }
            AluEngine::Float => {
                let (a, b) = (lv.as_f32(), rv.as_f32());
                Ok(Value::Float(match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => a / b,
                    BinOp::Mod => a % b,
                    _ => unreachable!("comparison/logical ops handled above"),
                }))
            }
            AluEngine::Float2 | AluEngine::Float3 | AluEngine::Float4 => {
                // Vector binop against either another vector (component-wise)
                // or a scalar (broadcast) -- a scalar operand is widened to
                // every component.
                let a = lv.components();
                let b = rv.components();
                let width = a.len().max(b.len());
                let widened = |v: &[f32]| -> Vec<f32> {
                    if v.len() == width { v.to_vec() } else { vec![v[0]; width] }
                };
                let (a, b) = (widened(&a), widened(&b));
                let components: Vec<f32> = a
                    .iter()
                    .zip(&b)
                    .map(|(x, y)| match op {
                        BinOp::Add => x + y,
                        BinOp::Sub => x - y,
                        BinOp::Mul => x * y,
                        BinOp::Div => x / y,
                        BinOp::Mod => x % y,
                        _ => unreachable!("comparison/logical ops handled above"),
                    })
                    .collect();
                Ok(Value::from_components(engine, &components))
            }
            AluEngine::None => Ok(lv),
        }
    }

    fn compare(&self, op: BinOp, lv: Value, rv: Value) -> Result<bool, RuntimeError> {
        let ordering = match (lv, rv) {
            (Value::Int(a), Value::Int(b)) => a.partial_cmp(&b),
            _ => lv.as_f32().partial_cmp(&rv.as_f32()),
        };
        let ordering = ordering.unwrap_or(std::cmp::Ordering::Equal);
        Ok(match op {
            BinOp::Lt => ordering.is_lt(),
            BinOp::Le => ordering.is_le(),
            BinOp::Gt => ordering.is_gt(),
            BinOp::Ge => ordering.is_ge(),
            BinOp::Eq => ordering.is_eq(),
            BinOp::Ne => ordering.is_ne(),
            _ => unreachable!(),
        })
    }

    fn eval_access(
        &mut self,
        full: &Node<Expr<Checked>, Checked>,
        receiver: &Node<Expr<Checked>, Checked>,
        field: &Node<Expr<Checked>, Checked>,
    ) -> Result<Value, RuntimeError> {
        let receiver_ty = receiver.metadata().ty;
        let receiver_desc = self.symtab.types.get(receiver_ty);

        if receiver_desc.modifier == Modifier::ObjectRef {
            let property_name = match field.value() {
                Expr::Idd(id) => id.name,
                _ => unreachable!(),
            };
            let handle = self.eval(receiver)?.as_handle();
            let property = receiver_desc
                .properties
                .as_ref()
                .and_then(|props| props.iter().find(|p| p.name == property_name))
                .expect("checker already validated this property exists");
            let mut ret = vec![0u8; self.symtab.types.get(property.ty).byte_size as usize];
            let args = Vec::new();
            let mut ctx = CallContext { args: &args, ret: &mut ret, user_context: None };
            self.host.call_property_get(property.callback, handle, &mut ctx)?;
            let desc = self.symtab.types.get(property.ty);
            return Ok(Value::from_bytes(&ret, desc.alu_engine, desc.modifier));
        }

        if receiver_desc.modifier == Modifier::Array {
            let index = self.eval(field)?.as_i32();
            let elem_ty = receiver_desc.child.unwrap();
            let len = receiver_desc.modifier_property;
            if index < 0 || index as u32 >= len {
                return Err(RuntimeError::IndexOutOfBounds { index, len });
            }
            // Arrays live in contiguous stack memory; resolve the receiver's
            // own address through the lvalue path rather than evaluating it
            // as a value.
            let base_addr = self.lvalue_location(receiver)?;
            let addr = self.location_address(&base_addr) + index as usize * self.symtab.types.get(elem_ty).byte_size as usize;
            let elem_desc = self.symtab.types.get(elem_ty);
            return Ok(Value::from_bytes(
                &self.stack[addr..addr + elem_desc.byte_size as usize],
                elem_desc.alu_engine,
                elem_desc.modifier,
            ));
        }

        if receiver_desc.modifier == Modifier::Vector {
            let field_name = match field.value() {
                Expr::Idd(id) => id.name,
                _ => unreachable!("vector swizzle access always carries a field-name node"),
            };
            let indices = swizzle_indices(self.strings, field_name)
                .expect("checker already validated the swizzle's component letters");
            let receiver_value = self.eval(receiver)?;
            let comps = receiver_value.components();
            let picked: Vec<f32> = indices.iter().map(|&i| comps[i]).collect();
            let engine = self.symtab.types.get(full.metadata().ty).alu_engine;
            return Ok(Value::from_components(engine, &picked));
        }

        // Struct field: resolve to a location and read it.
        let loc = self.lvalue_location(full)?;
        Ok(self.read_location(&loc))
    }

    /// Resolve an expression that appears as an assignment target (or the
    /// receiver of a nested `.field`/`[index]` access) down to a concrete
    /// [`Location`], mirroring [`crate::canon::Canon::resolve_location`] but
    /// at runtime, against live memory instead of static offsets.
    fn lvalue_location(&mut self, expr: &Node<Expr<Checked>, Checked>) -> Result<Location, RuntimeError> {
        let ty = expr.metadata().ty;
        match expr.value() {
            Expr::Idd(id) => {
                if id.is_global {
                    Ok(Location::Global { offset: id.offset as u32, ty })
                } else {
                    let frames_up = self.frames_up(id.frame_index as u32) as u32;
                    Ok(Location::Local { frames_up, offset: id.offset as u32, ty })
                }
            }
            Expr::Binop(BinOp::Access, receiver, field) => {
                let receiver_ty = receiver.metadata().ty;
                let receiver_desc = self.symtab.types.get(receiver_ty);
                let receiver_loc = self.lvalue_location(receiver)?;

                if receiver_desc.modifier == Modifier::Array {
                    let elem_ty = receiver_desc.child.unwrap();
                    let elem_size = self.symtab.types.get(elem_ty).byte_size;
                    let index = self.eval(field)?.as_i32();
                    let len = receiver_desc.modifier_property;
                    if index < 0 || index as u32 >= len {
                        return Err(RuntimeError::IndexOutOfBounds { index, len });
                    }
                    let base = self.location_address(&receiver_loc);
                    let addr = base + index as usize * elem_size as usize;
                    self.registers.insert(Reg::B, Value::Object(addr as u32));
                    return Ok(Location::Indirect { addr: Reg::B, ty: elem_ty });
                }

                let field_name = match field.value() {
                    Expr::Idd(id) => id.name,
                    _ => return Ok(receiver_loc),
                };
                match struct_or_swizzle_offset(self.symtab, self.strings, receiver_ty, field_name) {
                    Some((extra, ty)) => Ok(add_offset(receiver_loc, extra, ty)),
                    None => {
                        // A non-contiguous vector swizzle (e.g. `.zx`) isn't
                        // expressible as a single offset + type; both
                        // `eval_access` (reads) and `eval_binop`'s `Assign`
                        // arm (writes) intercept that case before calling
                        // this function, so reaching here means the checker
                        // let through a field access this type doesn't
                        // support.
                        let base = self.location_address(&receiver_loc);
                        self.registers.insert(Reg::B, Value::Object(base as u32));
                        Ok(Location::Indirect { addr: Reg::B, ty })
                    }
                }
            }
            _ => {
                // Not addressable; materialize through a scratch register.
                let value = self.eval(expr)?;
                self.registers.insert(Reg::A, value);
                Ok(Location::Register(Reg::A))
            }
        }
    }

    /// Evaluate a vector type's constructor call: one scalar argument
    /// broadcast to every component, or exactly `width` scalar arguments,
    /// one per component -- the same two shapes
    /// `crate::check::check_vector_constructor` accepted at compile time.
    fn eval_vector_constructor(
        &mut self,
        args: &[Node<Expr<Checked>, Checked>],
        ty: TypeId,
    ) -> Result<Value, RuntimeError> {
        let desc = self.symtab.types.get(ty);
        let width = desc.modifier_property as usize;
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg)?.as_f32());
        }
        let components = if values.len() == 1 { vec![values[0]; width] } else { values };
        Ok(Value::from_components(desc.alu_engine, &components))
    }

    fn eval_call(
        &mut self,
        receiver: Option<&Node<Expr<Checked>, Checked>>,
        args: &[Node<Expr<Checked>, Checked>],
        resolved: Option<u32>,
        ty: TypeId,
    ) -> Result<Value, RuntimeError> {
        let function_id = match resolved {
            Some(idx) => crate::alloc::Id::new(idx),
            // Vector types construct like any other call but are a language
            // builtin rather than a registered function (see
            // `crate::check::check_vector_constructor`), so there's no
            // `FunctionId` to resolve against here.
            None => return self.eval_vector_constructor(args, ty),
        };

        let mut values = Vec::new();
        if let Some(receiver) = receiver {
            values.push(self.eval(receiver)?);
        }
        for arg in args {
            values.push(self.eval(arg)?);
        }

        let desc = self.symtab.functions.get(function_id);
        if let Some(native) = desc.native_callback {
            let arg_bytes: Vec<u8> = values.iter().flat_map(|v| v.as_bytes()).collect();
            let mut ret = vec![0u8; self.symtab.types.get(desc.return_type).byte_size as usize];
            let mut ctx = CallContext { args: &arg_bytes, ret: &mut ret, user_context: None };
            self.host.call_intrinsic(native, &mut ctx)?;
            let ret_desc = self.symtab.types.get(desc.return_type);
            return Ok(Value::from_bytes(&ret, ret_desc.alu_engine, ret_desc.modifier));
        }

        let label = match self.assembly.entry_label(function_id) {
            Some(l) => l,
            None => return Ok(Value::Int(0)),
        };
        let frame_id = self.assembly.body_frame(function_id).unwrap_or(0);
        let frame_size = self.symtab.frame(crate::alloc::Id::new(frame_id)).total_size as usize;

        let base = self.stack.len();
        self.grow_stack_to(base + frame_size);
        for (i, value) in values.iter().enumerate() {
            let offset = base + i * 4;
            let bytes = value.as_bytes();
            self.grow_stack_to(offset + bytes.len());
            self.stack[offset..offset + bytes.len()].copy_from_slice(&bytes);
        }

        self.call_stack.push(CallFrame {
            return_label: self.block,
            return_index: self.instr_index,
        });
        self.frame_stack.push(frame_id);
        self.frame_bases.push(base);
        self.frame_sentinels.push(FRAME_SENTINEL);
        self.block = label;
        self.instr_index = 0;

        let target_depth = self.call_stack.len() - 1;
        while self.call_stack.len() > target_depth && self.error.is_none() {
            if self.step().is_err() {
                break;
            }
        }
        if let Some(err) = &self.error {
            return Err(err.errors()[0].error().clone());
        }

        let desc = self.symtab.types.get(ty);
        Ok(self.registers.get(&Reg::Ret).copied().unwrap_or(Value::from_components(desc.alu_engine, &[0.0; 4])))
    }

    fn insert_string(&mut self, s: String) -> u32 {
        self.heap.push(Some(HeapObject::String(s)));
        (self.heap.len() - 1) as u32
    }

    /// Write a value directly into global storage at `offset` (as reported
    /// by the compiled program's [`crate::symbols::SymbolTable`] for a
    /// global looked up by name). Lets a host seed global state -- handing
    /// a freshly inserted heap object's handle to a script, for instance --
    /// before calling [`Vm::run`].
    pub fn write_global(&mut self, offset: u32, value: Value) {
        let bytes = value.as_bytes();
        let offset = offset as usize;
        self.grow_stack_to(offset + bytes.len());
        self.stack[offset..offset + bytes.len()].copy_from_slice(&bytes);
    }

    /// Read a value out of global storage at `offset`, typed as `ty`.
    pub fn read_global(&self, offset: u32, ty: TypeId) -> Value {
        let desc = self.symtab.types.get(ty);
        let offset = offset as usize;
        Value::from_bytes(&self.stack[offset..offset + desc.byte_size as usize], desc.alu_engine, desc.modifier)
    }

    /// Register a host-owned object in the heap slot table, tagged with its
    /// BlockScript [`TypeId`] so property dispatch can find the right
    /// callbacks later. Returns the handle a script's object-reference
    /// variable stores.
    pub fn insert_heap_object(&mut self, type_id: TypeId, obj: Box<dyn std::any::Any>) -> u32 {
        self.heap.push(Some(HeapObject::Host { type_id, payload: obj }));
        (self.heap.len() - 1) as u32
    }

    pub fn heap_object(&self, handle: u32) -> Option<&HeapObject> {
        self.heap.get(handle as usize).and_then(|o| o.as_ref())
    }

    /// Execute the single next instruction. Split into an infallible outer
    /// wrapper that stores any error before returning it by reference, so a
    /// halted [`Vm`] keeps reporting the same error on repeated calls.
    pub fn step(&mut self) -> Result<(), &WithSource<RuntimeError>> {
        if self.terminated() {
            return Ok(());
        }
        match self.step_inner() {
            Ok(()) => Ok(()),
            Err(e) => {
                self.error = Some(wrap(e, Span::default(), self.source));
                Err(self.error.as_ref().unwrap())
            }
        }
    }

    fn step_inner(&mut self) -> Result<(), RuntimeError> {
        if cfg!(debug_assertions)
            && self.cycle_count > 0
            && self.cycle_count % TIME_BUDGET_SAMPLE_INTERVAL == 0
        {
            let elapsed_ms = self.start_time.elapsed().as_millis() as u64;
            if elapsed_ms > self.host.config().time_budget_ms {
                return Err(RuntimeError::TimeBudgetExceeded);
            }
        }
        if self.cycle_count >= self.host.config().max_cycle_count {
            return Err(RuntimeError::TooManyCycles);
        }

        let block = &self.assembly.blocks[self.block as usize];
        let instruction = match block.instructions.get(self.instr_index) {
            Some(i) => i.clone(),
            None => match block.next_block {
                Some(next) => {
                    self.block = next;
                    self.instr_index = 0;
                    return Ok(());
                }
                None => {
                    self.block = self.assembly.blocks.len() as u32;
                    return Ok(());
                }
            },
        };
        self.cycle_count += 1;
        self.instr_index += 1;

        match instruction {
            Instruction::Move { dst, src, .. } => {
                let value = self.eval_operand(&src)?;
                self.write_location(&dst, value);
            }
            Instruction::Save { dst, src } => {
                let value = self.registers.get(&src).copied().unwrap_or(Value::Int(0));
                self.write_location(&dst, value);
            }
            Instruction::Load { dst, src } => {
                let value = self.eval_operand(&src)?;
                self.registers.insert(dst, value);
            }
            Instruction::LoadAddr { dst, src } => {
                let addr = self.location_address(&src);
                self.registers.insert(dst, Value::Object(addr as u32));
            }
            Instruction::SaveToAddr { addr, src } => {
                let address = self.registers.get(&addr).map(|v| v.as_i32()).unwrap_or(0) as usize;
                let value = self.registers.get(&src).copied().unwrap_or(Value::Int(0));
                let bytes = value.as_bytes();
                self.grow_stack_to(address + bytes.len());
                self.stack[address..address + bytes.len()].copy_from_slice(&bytes);
            }
            Instruction::CopyToAddr { addr, src, len } => {
                let value = self.eval_operand(&src)?;
                let address = self.registers.get(&addr).map(|v| v.as_i32()).unwrap_or(0) as usize;
                let mut bytes = value.as_bytes();
                bytes.resize(len as usize, 0);
                self.grow_stack_to(address + bytes.len());
                self.stack[address..address + bytes.len()].copy_from_slice(&bytes);
            }
            Instruction::ComputeIndexAddr { dst, base, index, elem_size } => {
                let base_addr = self.location_address(&base);
                let index_val = self.eval_operand(&index)?.as_i32();
                let addr = base_addr as i64 + index_val as i64 * elem_size as i64;
                self.registers.insert(dst, Value::Object(addr.max(0) as u32));
            }
            Instruction::InsertDataToHeap { dst, ty } => {
                let slot = self.insert_heap_object(ty, Box::new(()));
                self.write_location(&dst, Value::Object(slot));
            }
            Instruction::ScatterSwizzle { base, indices, src } => {
                let value = self.eval_operand(&src)?;
                let base_addr = self.location_address(&base);
                let indices: Vec<usize> = indices.iter().map(|&i| i as usize).collect();
                self.scatter_vector_components(base_addr, &indices, value);
            }
            Instruction::Cast { reg, to_float } => {
                let v = self.registers.get(&reg).copied().unwrap_or(Value::Int(0));
                let new_value = if to_float { Value::Float(v.as_f32()) } else { Value::Int(v.as_i32()) };
                self.registers.insert(reg, new_value);
            }
            Instruction::ReadObjProp { dst, obj, property } => {
                let handle = self.read_location(&obj).as_handle();
                let property_id = self.resolve_property_callback(handle, property)?;
                let ty = self.location_type(&dst);
                let mut ret = vec![0u8; self.symtab.types.get(ty).byte_size as usize];
                let args = Vec::new();
                let mut ctx = CallContext { args: &args, ret: &mut ret, user_context: None };
                self.host.call_property_get(property_id, handle, &mut ctx)?;
                let desc = self.symtab.types.get(ty);
                let value = Value::from_bytes(&ret, desc.alu_engine, desc.modifier);
                self.write_location(&dst, value);
            }
            Instruction::WriteObjProp { obj, property, src } => {
                let handle = self.read_location(&obj).as_handle();
                let property_id = self.resolve_property_callback(handle, property)?;
                let value = self.eval_operand(&src)?;
                let bytes = value.as_bytes();
                let ctx = CallContext { args: &bytes, ret: &mut [], user_context: None };
                self.host.call_property_set(property_id, handle, &ctx)?;
            }
            Instruction::FunGo { function, args, label } => {
                let values: Result<Vec<Value>, RuntimeError> =
                    args.iter().map(|op| self.eval_operand(op)).collect();
                let values = values?;
                if let Some(label) = label {
                    let frame_id = self.assembly.body_frame(function).unwrap_or(0);
                    let frame_size = self.symtab.frame(crate::alloc::Id::new(frame_id)).total_size as usize;
                    let base = self.stack.len();
                    self.grow_stack_to(base + frame_size);
                    for (i, value) in values.iter().enumerate() {
                        let offset = base + i * 4;
                        let bytes = value.as_bytes();
                        self.stack[offset..offset + bytes.len()].copy_from_slice(&bytes);
                    }
                    self.call_stack.push(CallFrame {
                        return_label: self.block,
                        return_index: self.instr_index,
                    });
                    self.frame_stack.push(frame_id);
                    self.frame_bases.push(base);
                    self.frame_sentinels.push(FRAME_SENTINEL);
                    self.block = label;
                    self.instr_index = 0;
                } else {
                    let desc = self.symtab.functions.get(function);
                    if let Some(native) = desc.native_callback {
                        let arg_bytes: Vec<u8> = values.iter().flat_map(|v| v.as_bytes()).collect();
                        let mut ret = vec![0u8; self.symtab.types.get(desc.return_type).byte_size as usize];
                        let mut ctx = CallContext { args: &arg_bytes, ret: &mut ret, user_context: None };
                        self.host.call_intrinsic(native, &mut ctx)?;
                        self.registers.insert(Reg::Ret, Value::from_bytes(
                            &ret,
                            self.symtab.types.get(desc.return_type).alu_engine,
                            self.symtab.types.get(desc.return_type).modifier,
                        ));
                    }
                }
            }
            Instruction::Ret => {
                if let Some(frame) = self.call_stack.pop() {
                    let sentinel = self.frame_sentinels.pop();
                    assert_eq!(sentinel, Some(FRAME_SENTINEL), "frame stack corrupted on return");
                    self.stack.truncate(self.frame_bases.pop().unwrap_or(self.stack.len()));
                    self.frame_stack.pop();
                    self.block = frame.return_label;
                    self.instr_index = frame.return_index;
                } else {
                    self.block = self.assembly.blocks.len() as u32;
                }
            }
            Instruction::PushFrame { frame_size, frame_id } => {
                let base = self.frame_bases.last().copied().unwrap_or(0)
                    + self.symtab.frame(crate::alloc::Id::new(*self.frame_stack.last().unwrap_or(&0))).total_size as usize;
                self.grow_stack_to(base + frame_size as usize);
                self.frame_bases.push(base);
                self.frame_stack.push(frame_id);
                self.frame_sentinels.push(FRAME_SENTINEL);
            }
            Instruction::PopFrame => {
                let sentinel = self.frame_sentinels.pop();
                assert_eq!(sentinel, Some(FRAME_SENTINEL), "frame stack corrupted on pop");
                self.frame_bases.pop();
                self.frame_stack.pop();
            }
            Instruction::Jmp { label } => {
                self.block = label;
                self.instr_index = 0;
            }
            Instruction::JmpCond { cond, value, label } => {
                let v = self.eval_operand(&cond)?.as_i32();
                if v == value {
                    self.block = label;
                    self.instr_index = 0;
                }
            }
            Instruction::Exit => {
                self.block = self.assembly.blocks.len() as u32;
            }
        }
        debug!(println!("executed instruction at block {}", self.block));
        Ok(())
    }

    /// Look up which property callback a host registered for `property` on
    /// the concrete type of the object at `handle`. The instruction alone
    /// only carries the property name, not the object's static type, so this
    /// goes through the heap slot's own [`TypeId`] tag (set when the object
    /// was registered via [`Vm::insert_heap_object`]).
    fn resolve_property_callback(&self, handle: u32, property: Symbol) -> Result<u32, RuntimeError> {
        let not_found = || RuntimeError::InvalidObjectProperty {
            property: self.strings.resolve(property).to_string(),
        };
        match self.heap.get(handle as usize).and_then(|o| o.as_ref()) {
            Some(HeapObject::Host { type_id, .. }) => self
                .symtab
                .types
                .get(*type_id)
                .properties
                .as_ref()
                .and_then(|props| props.iter().find(|p| p.name == property))
                .map(|p| p.callback)
                .ok_or_else(not_found),
            _ => Err(not_found()),
        }
    }

    fn eval_operand(&mut self, operand: &Operand) -> Result<Value, RuntimeError> {
        match operand {
            Operand::Location(loc) => Ok(self.read_location(loc)),
            Operand::ImmInt(v) => Ok(Value::Int(*v)),
            Operand::ImmFloat(v) => Ok(Value::Float(*v)),
            Operand::Expr(expr) => self.eval(expr),
        }
    }
}

/// Parse a vector swizzle field name into its component indices (`x` = 0 ..
/// `w` = 3), mirroring [`crate::canon::Canon::static_field_offset`]'s
/// validation. `None` if any character isn't a vector component letter.
fn swizzle_indices(strings: &crate::strings::StringPool, field: crate::strings::Symbol) -> Option<Vec<usize>> {
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

fn struct_or_swizzle_offset(
    symtab: &SymbolTable,
    strings: &crate::strings::StringPool,
    receiver_ty: TypeId,
    field: crate::strings::Symbol,
) -> Option<(u32, TypeId)> {
    let desc = symtab.types.get(receiver_ty);
    match desc.modifier {
        Modifier::Struct => {
            let fields = desc.struct_fields.as_ref()?;
            let mut offset = 0;
            for f in fields {
                if f.name == field {
                    return Some((offset, f.ty));
                }
                offset += symtab.types.get(f.ty).byte_size;
            }
            None
        }
        Modifier::Vector => {
            let indices = swizzle_indices(strings, field)?;
            if !is_contiguous(&indices) {
                return None;
            }
            let start = *indices.first()?;
            let width = indices.len() as u32;
            let ty = if width == 1 {
                symtab.types.float_ty
            } else {
                symtab.types.vector_of_width(width)?
            };
            Some((start as u32 * 4, ty))
        }
        _ => None,
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

fn wrap(error: RuntimeError, span: Span, source: &str) -> WithSource<RuntimeError> {
    WithSource::new(std::iter::once(SourceErrorWrapper::new(error, span, source)), source.to_string())
}

impl Default for Span {
    fn default() -> Self {
        Span { offset: 0, length: 0, start_line: 0, start_col: 0, end_line: 0, end_col: 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostConfig;
    use crate::strings::StringPool;
    use crate::types::TypeTable;

    fn run(src: &str) -> (Assembly, SymbolTable, StringPool, Host) {
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
        let compiled = compiler.parse().unwrap().check().unwrap().canonicalize();
        (compiled.ast, compiled.symtab, compiled.strings, compiled.host)
    }

    #[test]
    fn runs_simple_arithmetic_to_completion() {
        let (asm, symtab, strings, host) = run("int x = 2 + 3 * 4;");
        let mut vm = Vm::new(&asm, &symtab, &strings, &host, "int x = 2 + 3 * 4;");
        vm.run().unwrap();
        assert!(vm.terminated());
        assert!(vm.error().is_none());
    }

    #[test]
    fn while_loop_counts_to_ten() {
        let src = "int i = 0; while (i < 10) { i = i + 1; }";
        let (asm, symtab, strings, host) = run(src);
        let mut vm = Vm::new(&asm, &symtab, &strings, &host, src);
        vm.run().unwrap();
        let value = vm.read_location(&Location::Global { offset: 0, ty: symtab.types.int_ty });
        assert_eq!(value, Value::Int(10));
    }

    #[test]
    fn division_by_zero_is_a_runtime_error() {
        let src = "int z = 0; int x = 1 / z;";
        let (asm, symtab, strings, host) = run(src);
        let mut vm = Vm::new(&asm, &symtab, &strings, &host, src);
        let result = vm.run();
        assert!(result.is_err());
    }

    fn native_double_it() -> (Assembly, SymbolTable, StringPool, Host, crate::symbols::FunctionId) {
        let mut host = Host::new(HostConfig::default());
        let id = host.register_intrinsic(|ctx| {
            ctx.set_ret_i32(ctx.arg_i32(0) * 2);
            Ok(())
        });
        host.register_function("double_it", vec!["int"], "int", id);

        let src = "";
        let mut strings = StringPool::new();
        let types = TypeTable::new(&mut strings);
        let symtab = SymbolTable::new(types);
        let compiler = crate::Compiler { source: src.to_string(), host, strings, symtab, ast: () };
        let compiled = compiler.parse().unwrap().check().unwrap().canonicalize();

        let function_id = match compiled.symtab.functions.resolve(
            compiled.strings.find("double_it").unwrap(),
            &[compiled.symtab.types.int_ty],
            &compiled.symtab.types,
        ) {
            crate::symbols::OverloadResolution::Found(id) => id,
            _ => panic!("expected to resolve double_it to exactly one overload"),
        };
        (compiled.ast, compiled.symtab, compiled.strings, compiled.host, function_id)
    }

    #[test]
    fn call_function_runs_a_native_function_with_matching_args() {
        let (asm, symtab, strings, host, function_id) = native_double_it();
        let mut vm = Vm::new(&asm, &symtab, &strings, &host, "");
        let result = vm.call_function(function_id, &[Value::Int(21)]).unwrap();
        assert_eq!(i32::from_le_bytes(result.try_into().unwrap()), 42);
    }

    #[test]
    fn call_function_rejects_a_buffer_size_mismatch() {
        let (asm, symtab, strings, host, function_id) = native_double_it();
        let mut vm = Vm::new(&asm, &symtab, &strings, &host, "");
        let result = vm.call_function(function_id, &[]);
        assert!(matches!(
            result,
            Err(CallFunctionError::Host(HostError::BufferSizeMismatch { expected: 4, actual: 0 }))
        ));
    }

    #[test]
    fn call_function_rejects_nested_execution() {
        let (asm, symtab, strings, host, function_id) = native_double_it();
        let mut vm = Vm::new(&asm, &symtab, &strings, &host, "");
        vm.call_stack.push(CallFrame { return_label: 0, return_index: 0 });
        let result = vm.call_function(function_id, &[Value::Int(21)]);
        assert!(matches!(result, Err(CallFunctionError::Host(HostError::NestedExecuteFunction))));
    }

    #[test]
    fn swizzle_indices_parses_non_contiguous_fields() {
        let mut strings = StringPool::new();
        let zx = strings.intern("zx").unwrap();
        let indices = swizzle_indices(&strings, zx).unwrap();
        assert_eq!(indices, vec![2, 0]);
        assert!(!is_contiguous(&indices));

        let value = Value::Float4([1.0, 2.0, 3.0, 4.0]);
        let comps = value.components();
        let picked: Vec<f32> = indices.iter().map(|&i| comps[i]).collect();
        assert_eq!(picked, vec![3.0, 1.0]);
    }
}
