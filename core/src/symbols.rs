//! Symbol table, function table, and stack frame records.

use crate::{
    alloc::{Arena, Id},
    strings::Symbol,
    types::{TypeId, TypeTable},
};

pub type FrameId = Id<StackFrame>;
pub type FunctionId = Id<FunctionDescriptor>;

/// What kind of lexical scope a [`StackFrame`] was opened for. Purely
/// informational -- it doesn't change layout rules, but the canonizer uses
/// it to decide whether a frame is poppable mid-statement (if/while bodies)
/// or only at a `return` (function bodies).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameCategory {
    None,
    IfBody,
    ForBody,
    FunctionBody,
}

/// One named slot in a [`StackFrame`].
#[derive(Clone, Debug)]
pub struct FrameEntry {
    pub name: Symbol,
    pub offset: u32,
    pub ty: TypeId,
}

/// A per-lexical-scope descriptor: a list of (name, offset, type) entries,
/// the frame's total byte size (including any temporaries allocated into it
/// by the canonizer), and a link to its lexical parent.
#[derive(Clone, Debug)]
pub struct StackFrame {
    pub entries: Vec<FrameEntry>,
    pub total_size: u32,
    pub temp_size: u32,
    pub parent: Option<FrameId>,
    pub category: FrameCategory,
    pub source_line: u32,
}

impl StackFrame {
    pub fn new(parent: Option<FrameId>, category: FrameCategory, source_line: u32) -> Self {
        StackFrame {
            entries: Vec::new(),
            total_size: 0,
            temp_size: 0,
            parent,
            category,
            source_line,
        }
    }

    /// Append a new named entry, growing the frame by the type's byte size.
    /// No alignment padding is inserted -- every core type is 4-byte sized
    /// and 4-byte aligned by construction.
    pub fn allocate(&mut self, name: Symbol, ty: TypeId, types: &TypeTable) -> u32 {
        let offset = self.total_size;
        self.entries.push(FrameEntry { name, offset, ty });
        self.total_size += types.get(ty).byte_size;
        offset
    }

    /// Allocate an unnamed temporary inside this frame's temporary area,
    /// used by the canonizer to stage sub-expression results. Temporaries
    /// live past the named entries, at `named_size + temp_size`.
    pub fn allocate_temporary(&mut self, ty: TypeId, types: &TypeTable) -> u32 {
        let named_size: u32 = self.entries.iter().map(|e| types.get(e.ty).byte_size).sum();
        let offset = named_size + self.temp_size;
        self.temp_size += types.get(ty).byte_size;
        self.total_size = named_size + self.temp_size;
        offset
    }

    /// Drop the temporary area, keeping named entries. Called at the start
    /// of each statement so the frame doesn't grow unbounded across a
    /// function body.
    pub fn reset_temporaries(&mut self, types: &TypeTable) {
        let named_size: u32 = self.entries.iter().map(|e| types.get(e.ty).byte_size).sum();
        self.temp_size = 0;
        self.total_size = named_size;
    }

    pub fn find(&self, name: Symbol) -> Option<&FrameEntry> {
        self.entries.iter().find(|e| e.name == name)
    }
}

/// A function's callable signature: name plus the ordered list of
/// parameter types. Two signatures are equal iff their name and parameter
/// type lists match -- there's no packed buffer to compare byte-wise in a
/// safe-Rust rendition, so `Vec<TypeId>` equality already is the linear-scan
/// comparison this needs.
#[derive(Clone, Debug, PartialEq)]
pub struct Signature {
    pub name: Symbol,
    pub params: Vec<TypeId>,
}

/// The compiled-in behavior of a native (host-provided) function: an opaque
/// id resolved through [`crate::host`]'s intrinsic registry at call time.
pub type NativeCallbackId = u32;

/// A function's declaration and (if present) its binding. Free functions and
/// methods both live here; methods carry the receiver type as the first
/// parameter of their signature.
#[derive(Clone, Debug)]
pub struct FunctionDescriptor {
    pub signature: Signature,
    pub return_type: TypeId,
    pub is_method: bool,
    pub has_body: bool,
    pub entry_label: Option<u32>,
    pub native_callback: Option<NativeCallbackId>,
}

impl FunctionDescriptor {
    /// Does `args` match this function's parameter list exactly, or via the
    /// wildcard type? (`TypeDescriptor::eq` already treats wildcard as
    /// matching anything, so this just compares through the type table.)
    fn matches(&self, args: &[TypeId], types: &TypeTable) -> bool {
        if self.signature.params.len() != args.len() {
            return false;
        }
        self.signature
            .params
            .iter()
            .zip(args)
            .all(|(p, a)| types.get(*p) == types.get(*a))
    }

    /// Whether this descriptor's parameter list has any exact (non-wildcard)
    /// type in common position with `other`'s, used to detect ambiguous
    /// overloads once more than one candidate matches.
    fn is_exact_match(&self, args: &[TypeId], types: &TypeTable) -> bool {
        self.signature
            .params
            .iter()
            .zip(args)
            .all(|(p, a)| p.index() == a.index() || types.get(*p).name == types.get(*a).name)
    }
}

/// Deduplicating registry of function declarations and definitions.
/// Deduplication is by signature: a definition binds a body to a matching
/// declaration; two bodies with the same signature collide.
#[derive(Default)]
pub struct FunctionTable {
    arena: Arena<FunctionDescriptor>,
}

/// The outcome of looking a call up against a [`FunctionTable`].
pub enum OverloadResolution {
    Found(FunctionId),
    NoMatch,
    Ambiguous,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare or define a function. If a descriptor with the same
    /// signature already exists:
    /// - if the existing one has no body and `has_body` is true, the new
    ///   body binds to it (in place) and its id is returned;
    /// - if the existing one already has a body and `has_body` is true,
    ///   this is a duplicate-definition collision and `None` is returned;
    /// - otherwise (re-declaration of the same signature) the existing id
    ///   is returned unchanged.
    pub fn declare(&mut self, desc: FunctionDescriptor, types: &TypeTable) -> Option<FunctionId> {
        for (id, existing) in self.arena.iter() {
            if existing.signature.name == desc.signature.name
                && existing.signature.params.len() == desc.signature.params.len()
                && existing
                    .signature
                    .params
                    .iter()
                    .zip(&desc.signature.params)
                    .all(|(a, b)| types.get(*a) == types.get(*b))
            {
                if desc.has_body {
                    if existing.has_body {
                        return None;
                    }
                    let id_copy = id;
                    let slot = self.arena.get_mut(id_copy);
                    slot.has_body = true;
                    slot.entry_label = desc.entry_label;
                    slot.native_callback = desc.native_callback;
                    return Some(id_copy);
                }
                return Some(id);
            }
        }
        Some(self.arena.push(desc))
    }

    pub fn get(&self, id: FunctionId) -> &FunctionDescriptor {
        self.arena.get(id)
    }

    pub fn get_mut(&mut self, id: FunctionId) -> &mut FunctionDescriptor {
        self.arena.get_mut(id)
    }

    /// Resolve a call by name and argument types, ignoring wildcard
    /// parameters when checking for ambiguity -- a call that matches more
    /// than one candidate this way is a semantic error.
    pub fn resolve(&self, name: Symbol, args: &[TypeId], types: &TypeTable) -> OverloadResolution {
        let matches: Vec<FunctionId> = self
            .arena
            .iter()
            .filter(|(_, f)| f.signature.name == name && f.matches(args, types))
            .map(|(id, _)| id)
            .collect();

        match matches.len() {
            0 => OverloadResolution::NoMatch,
            1 => OverloadResolution::Found(matches[0]),
            _ => {
                let exact: Vec<FunctionId> = matches
                    .iter()
                    .copied()
                    .filter(|id| self.arena.get(*id).is_exact_match(args, types))
                    .collect();
                match exact.len() {
                    1 => OverloadResolution::Found(exact[0]),
                    _ => OverloadResolution::Ambiguous,
                }
            }
        }
    }
}

/// Composes one type table, one function table, and a vector of stack
/// frames for a single compilation. Struct/enum/object-ref types compose by
/// reference within this one table (a struct field's type, an object
/// property's type) rather than through any cross-table mechanism.
pub struct SymbolTable {
    pub types: TypeTable,
    pub functions: FunctionTable,
    pub frames: Vec<StackFrame>,
    pub globals: FrameId,
}

impl SymbolTable {
    pub fn new(types: TypeTable) -> Self {
        let globals_frame = StackFrame::new(None, FrameCategory::None, 0);
        SymbolTable {
            types,
            functions: FunctionTable::new(),
            frames: vec![globals_frame],
            globals: Id::new(0),
        }
    }

    pub fn push_frame(&mut self, parent: Option<FrameId>, category: FrameCategory, line: u32) -> FrameId {
        self.frames.push(StackFrame::new(parent, category, line));
        Id::new((self.frames.len() - 1) as u32)
    }

    pub fn frame(&self, id: FrameId) -> &StackFrame {
        &self.frames[id.index() as usize]
    }

    pub fn frame_mut(&mut self, id: FrameId) -> &mut StackFrame {
        &mut self.frames[id.index() as usize]
    }

    pub fn find_by_name(&self, name: Symbol) -> Option<TypeId> {
        self.types.find_by_name(name)
    }
}

/// A name, resolved at builder time, paired with where it lives.
#[derive(Copy, Clone, Debug)]
pub enum ResolvedName {
    Local { frame: FrameId, offset: u32, ty: TypeId },
    Global { offset: u32, ty: TypeId },
}

/// Helper used by the builder to look a bare identifier up through a chain
/// of lexically enclosing frames, stopping at the first frame that binds
/// it.
pub fn resolve_identifier(
    symtab: &SymbolTable,
    start: FrameId,
    name: Symbol,
) -> Option<ResolvedName> {
    let mut current = Some(start);
    while let Some(id) = current {
        let frame = symtab.frame(id);
        if let Some(entry) = frame.find(name) {
            return if id == symtab.globals {
                Some(ResolvedName::Global { offset: entry.offset, ty: entry.ty })
            } else {
                Some(ResolvedName::Local { frame: id, offset: entry.offset, ty: entry.ty })
            };
        }
        current = frame.parent;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strings::StringPool;
    use crate::types::{AluEngine, Modifier};

    fn fresh_symtab() -> (SymbolTable, StringPool) {
        let mut strings = StringPool::new();
        let types = TypeTable::new(&mut strings);
        (SymbolTable::new(types), strings)
    }

    #[test]
    fn frame_allocate_grows_by_type_size() {
        let (mut symtab, mut strings) = fresh_symtab();
        let x = strings.intern("x").unwrap();
        let int_ty = symtab.types.int_ty;
        let offset = symtab.frame_mut(symtab.globals).allocate(x, int_ty, &symtab.types);
        assert_eq!(offset, 0);
        assert_eq!(symtab.frame(symtab.globals).total_size, 4);

        let y = strings.intern("y").unwrap();
        let float3_ty = symtab.types.float3_ty;
        let offset2 = symtab.frame_mut(symtab.globals).allocate(y, float3_ty, &symtab.types);
        assert_eq!(offset2, 4);
        assert_eq!(symtab.frame(symtab.globals).total_size, 16);
    }

    #[test]
    fn function_table_binds_body_to_declaration() {
        let (mut symtab, mut strings) = fresh_symtab();
        let name = strings.intern("f").unwrap();
        let int_ty = symtab.types.int_ty;
        let decl = FunctionDescriptor {
            signature: Signature { name, params: vec![int_ty] },
            return_type: int_ty,
            is_method: false,
            has_body: false,
            entry_label: None,
            native_callback: None,
        };
        let id1 = symtab.functions.declare(decl, &symtab.types).unwrap();

        let def = FunctionDescriptor {
            signature: Signature { name, params: vec![int_ty] },
            return_type: int_ty,
            is_method: false,
            has_body: true,
            entry_label: Some(7),
            native_callback: None,
        };
        let id2 = symtab.functions.declare(def, &symtab.types).unwrap();
        assert_eq!(id1, id2);
        assert!(symtab.functions.get(id2).has_body);
        assert_eq!(symtab.functions.get(id2).entry_label, Some(7));
    }

    #[test]
    fn duplicate_definitions_collide() {
        let (mut symtab, mut strings) = fresh_symtab();
        let name = strings.intern("f").unwrap();
        let int_ty = symtab.types.int_ty;
        let def = FunctionDescriptor {
            signature: Signature { name, params: vec![int_ty] },
            return_type: int_ty,
            is_method: false,
            has_body: true,
            entry_label: Some(1),
            native_callback: None,
        };
        symtab.functions.declare(def.clone(), &symtab.types).unwrap();
        let result = symtab.functions.declare(def, &symtab.types);
        assert!(result.is_none());
    }

    #[test]
    fn overload_resolution_prefers_exact_over_wildcard() {
        let (mut symtab, mut strings) = fresh_symtab();
        let name = strings.intern("echo").unwrap();
        let int_ty = symtab.types.int_ty;
        let wildcard_ty = symtab.types.wildcard_ty;

        symtab
            .functions
            .declare(
                FunctionDescriptor {
                    signature: Signature { name, params: vec![wildcard_ty] },
                    return_type: int_ty,
                    is_method: false,
                    has_body: true,
                    entry_label: Some(1),
                    native_callback: Some(1),
                },
                &symtab.types,
            )
            .unwrap();
        let exact_id = symtab
            .functions
            .declare(
                FunctionDescriptor {
                    signature: Signature { name, params: vec![int_ty] },
                    return_type: int_ty,
                    is_method: false,
                    has_body: true,
                    entry_label: Some(2),
                    native_callback: Some(2),
                },
                &symtab.types,
            )
            .unwrap();

        match symtab.functions.resolve(name, &[int_ty], &symtab.types) {
            OverloadResolution::Found(id) => assert_eq!(id, exact_id),
            _ => panic!("expected exact match to win"),
        }
    }

    #[test]
    fn resolve_identifier_walks_parent_chain() {
        let (mut symtab, mut strings) = fresh_symtab();
        let int_ty = symtab.types.int_ty;
        let outer = symtab.push_frame(Some(symtab.globals), FrameCategory::FunctionBody, 1);
        let inner = symtab.push_frame(Some(outer), FrameCategory::IfBody, 2);

        let n = strings.intern("n").unwrap();
        symtab.frame_mut(outer).allocate(n, int_ty, &symtab.types);

        let resolved = resolve_identifier(&symtab, inner, n);
        assert!(matches!(resolved, Some(ResolvedName::Local { .. })));
    }

    #[test]
    fn alu_engine_wiring_sanity() {
        let (symtab, _strings) = fresh_symtab();
        assert_eq!(symtab.types.get(symtab.types.int_ty).alu_engine, AluEngine::Int);
        assert_eq!(symtab.types.get(symtab.types.float2_ty).modifier, Modifier::Vector);
    }
}
