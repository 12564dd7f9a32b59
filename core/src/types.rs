//! Type table & type descriptors.

use crate::{alloc::Arena, strings::Symbol};

/// A handle to a [`TypeDescriptor`] owned by some [`TypeTable`].
pub type TypeId = crate::alloc::Id<TypeDescriptor>;

/// Which arithmetic evaluator handles a type's operators.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AluEngine {
    /// Not an arithmetic type (structs, enums, object-refs, wildcard).
    None,
    Int,
    Float,
    Float2,
    Float3,
    Float4,
}

/// The shape a [`TypeDescriptor`] takes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Modifier {
    Scalar,
    Vector,
    Array,
    Struct,
    Enum,
    /// A handle to a host-owned object, resolved through the heap slot table.
    ObjectRef,
    /// The `*` type: compares equal to every other type, used by variadic
    /// intrinsics.
    Wildcard,
}

/// One field of a struct type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StructField {
    pub name: Symbol,
    pub ty: TypeId,
}

/// One member of an enum type.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Enumerant {
    pub name: Symbol,
    pub value: i32,
}

/// A host-object property: a named, typed field reachable through a
/// registered accessor callback. `callback` is an id into the host's
/// property-callback registry (see [`crate::host`]), not the callback
/// itself -- descriptors need to stay `Clone`/comparison-friendly, and
/// properties are deliberately excluded from [`TypeDescriptor`]'s
/// dedup-equality, which only compares name/modifier/child/
/// modifier-property/byte-size/struct-members/enum-list.
#[derive(Copy, Clone, Debug)]
pub struct PropertyNode {
    pub name: Symbol,
    pub ty: TypeId,
    pub callback: crate::host::PropertyCallbackId,
}

/// A type in the BlockScript type system. Owned exclusively by a
/// [`TypeTable`]; every other reference to a type is a non-owning [`TypeId`].
#[derive(Clone, Debug)]
pub struct TypeDescriptor {
    pub name: Symbol,
    pub modifier: Modifier,
    /// Element type (arrays) or component type (vectors).
    pub child: Option<TypeId>,
    /// Vector width or array length; unused (0) for other modifiers.
    pub modifier_property: u32,
    pub alu_engine: AluEngine,
    pub struct_fields: Option<Vec<StructField>>,
    pub enumerants: Option<Vec<Enumerant>>,
    pub properties: Option<Vec<PropertyNode>>,
    pub byte_size: u32,
}

impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        if self.modifier == Modifier::Wildcard || other.modifier == Modifier::Wildcard {
            return true;
        }
        self.name == other.name
            && self.modifier == other.modifier
            && self.child == other.child
            && self.modifier_property == other.modifier_property
            && self.byte_size == other.byte_size
            && self.struct_fields == other.struct_fields
            && self.enumerants == other.enumerants
    }
}

fn compute_byte_size(
    modifier: Modifier,
    child: Option<TypeId>,
    modifier_property: u32,
    struct_fields: &Option<Vec<StructField>>,
    table: &Arena<TypeDescriptor>,
) -> u32 {
    match modifier {
        Modifier::Scalar | Modifier::Enum | Modifier::ObjectRef | Modifier::Wildcard => 4,
        Modifier::Vector => 4 * modifier_property,
        Modifier::Array => {
            let child_size = child.map(|c| table.get(c).byte_size).unwrap_or(0);
            modifier_property * child_size
        }
        Modifier::Struct => struct_fields
            .as_ref()
            .map(|fields| {
                fields
                    .iter()
                    .map(|f| table.get(f.ty).byte_size)
                    .sum()
            })
            .unwrap_or(0),
    }
}

/// Deduplicated registry of every type known to a compilation unit.
pub struct TypeTable {
    arena: Arena<TypeDescriptor>,
    pub int_ty: TypeId,
    pub float_ty: TypeId,
    pub float2_ty: TypeId,
    pub float3_ty: TypeId,
    pub float4_ty: TypeId,
    pub string_ty: TypeId,
    pub wildcard_ty: TypeId,
}

impl TypeTable {
    pub fn new(strings: &mut crate::strings::StringPool) -> Self {
        let mut arena = Arena::new();

        let name = |s: &mut crate::strings::StringPool, n: &str| s.intern(n).unwrap();

        let int_ty = arena.push(TypeDescriptor {
            name: name(strings, "int"),
            modifier: Modifier::Scalar,
            child: None,
            modifier_property: 0,
            alu_engine: AluEngine::Int,
            struct_fields: None,
            enumerants: None,
            properties: None,
            byte_size: 4,
        });
        let float_ty = arena.push(TypeDescriptor {
            name: name(strings, "float"),
            modifier: Modifier::Scalar,
            child: None,
            modifier_property: 0,
            alu_engine: AluEngine::Float,
            struct_fields: None,
            enumerants: None,
            properties: None,
            byte_size: 4,
        });

        let mut vector = |strings: &mut crate::strings::StringPool,
                           arena: &mut Arena<TypeDescriptor>,
                           n: &str,
                           width: u32,
                           engine: AluEngine| {
            arena.push(TypeDescriptor {
                name: name(strings, n),
                modifier: Modifier::Vector,
                child: Some(float_ty),
                modifier_property: width,
                alu_engine: engine,
                struct_fields: None,
                enumerants: None,
                properties: None,
                byte_size: 4 * width,
            })
        };
        let float2_ty = vector(strings, &mut arena, "float2", 2, AluEngine::Float2);
        let float3_ty = vector(strings, &mut arena, "float3", 3, AluEngine::Float3);
        let float4_ty = vector(strings, &mut arena, "float4", 4, AluEngine::Float4);

        // `string` is represented the same way a host object-reference is
        // (a 4-byte heap slot index) rather than a separate constants
        // segment, so string literals and host-registered object types
        // share one read/write/property-dispatch path through the VM.
        let string_ty = arena.push(TypeDescriptor {
            name: name(strings, "string"),
            modifier: Modifier::ObjectRef,
            child: None,
            modifier_property: 0,
            alu_engine: AluEngine::None,
            struct_fields: None,
            enumerants: None,
            properties: None,
            byte_size: 4,
        });

        let wildcard_ty = arena.push(TypeDescriptor {
            name: name(strings, "*"),
            modifier: Modifier::Wildcard,
            child: None,
            modifier_property: 0,
            alu_engine: AluEngine::None,
            struct_fields: None,
            enumerants: None,
            properties: None,
            byte_size: 4,
        });

        TypeTable {
            arena,
            int_ty,
            float_ty,
            float2_ty,
            float3_ty,
            float4_ty,
            string_ty,
            wildcard_ty,
        }
    }

    pub fn get(&self, id: TypeId) -> &TypeDescriptor {
        self.arena.get(id)
    }

    /// Get the vector type matching `width` (2, 3, or 4 components of
    /// `float`), if it's one of the builtins.
    pub fn vector_of_width(&self, width: u32) -> Option<TypeId> {
        match width {
            2 => Some(self.float2_ty),
            3 => Some(self.float3_ty),
            4 => Some(self.float4_ty),
            _ => None,
        }
    }

    /// Create (or return the existing, deduplicated) type descriptor.
    /// Dedup key is `(name, modifier, child, modifier_property)` -- byte
    /// size and struct-member lists are derived deterministically from
    /// those, so they don't need to be part of the scan key.
    #[allow(clippy::too_many_arguments)]
    pub fn create_type(
        &mut self,
        modifier: Modifier,
        name: Symbol,
        child: Option<TypeId>,
        modifier_property: u32,
        alu_engine: AluEngine,
        struct_fields: Option<Vec<StructField>>,
        enumerants: Option<Vec<Enumerant>>,
    ) -> TypeId {
        for (id, existing) in self.arena.iter() {
            if existing.name == name
                && existing.modifier == modifier
                && existing.child == child
                && existing.modifier_property == modifier_property
            {
                return id;
            }
        }

        let byte_size = compute_byte_size(
            modifier,
            child,
            modifier_property,
            &struct_fields,
            &self.arena,
        );
        self.arena.push(TypeDescriptor {
            name,
            modifier,
            child,
            modifier_property,
            alu_engine,
            struct_fields,
            enumerants,
            properties: None,
            byte_size,
        })
    }

    /// Attach (or replace) the property list on an object-reference type.
    /// Used by the host when registering a class type.
    pub fn set_properties(&mut self, id: TypeId, properties: Vec<PropertyNode>) {
        self.arena.get_mut(id).properties = Some(properties);
    }

    pub fn find_by_name(&self, name: Symbol) -> Option<TypeId> {
        self.arena
            .iter()
            .find(|(_, ty)| ty.name == name)
            .map(|(id, _)| id)
    }

    /// Search every enum type for an enumerant named `name`, returning the
    /// owning type and the matched value.
    pub fn find_enum_by_value_name(&self, name: Symbol) -> Option<(TypeId, i32)> {
        for (id, ty) in self.arena.iter() {
            if let Some(enumerants) = &ty.enumerants {
                if let Some(e) = enumerants.iter().find(|e| e.name == name) {
                    return Some((id, e.value));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strings::StringPool;

    #[test]
    fn builtins_are_registered_with_correct_sizes() {
        let mut strings = StringPool::new();
        let table = TypeTable::new(&mut strings);
        assert_eq!(table.get(table.int_ty).byte_size, 4);
        assert_eq!(table.get(table.float_ty).byte_size, 4);
        assert_eq!(table.get(table.float2_ty).byte_size, 8);
        assert_eq!(table.get(table.float3_ty).byte_size, 12);
        assert_eq!(table.get(table.float4_ty).byte_size, 16);
        assert_eq!(table.get(table.string_ty).byte_size, 4);
    }

    #[test]
    fn create_type_dedups_identical_arrays() {
        let mut strings = StringPool::new();
        let mut table = TypeTable::new(&mut strings);
        let name = strings.intern("int[4]").unwrap();
        let a = table.create_type(
            Modifier::Array,
            name,
            Some(table.int_ty),
            4,
            AluEngine::None,
            None,
            None,
        );
        let b = table.create_type(
            Modifier::Array,
            name,
            Some(table.int_ty),
            4,
            AluEngine::None,
            None,
            None,
        );
        assert_eq!(a, b);
        assert_eq!(table.get(a).byte_size, 16);
    }

    #[test]
    fn struct_byte_size_is_sum_of_members_no_padding() {
        let mut strings = StringPool::new();
        let mut table = TypeTable::new(&mut strings);
        let struct_name = strings.intern("P").unwrap();
        let field_a = strings.intern("a").unwrap();
        let field_b = strings.intern("b").unwrap();
        let id = table.create_type(
            Modifier::Struct,
            struct_name,
            None,
            0,
            AluEngine::None,
            Some(vec![
                StructField { name: field_a, ty: table.int_ty },
                StructField { name: field_b, ty: table.float_ty },
            ]),
            None,
        );
        assert_eq!(table.get(id).byte_size, 8);
    }

    #[test]
    fn wildcard_compares_equal_to_anything() {
        let mut strings = StringPool::new();
        let table = TypeTable::new(&mut strings);
        assert_eq!(table.get(table.int_ty), table.get(table.wildcard_ty));
        assert_eq!(table.get(table.wildcard_ty), table.get(table.float3_ty));
    }
}
