//! Host interop surface: the intrinsic-function registry and call context,
//! object-property read/write dispatch, and the bidirectional bind points
//! (`GetFunctionBindPoint`/`ExecuteFunction`, `ReadGlobalValue`/
//! `WriteGlobalValue`) a host uses to drive the VM.

use std::any::Any;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::{
    consts::{ARENA_PAGE_LEN, DEFAULT_MAX_CYCLE_COUNT, DEFAULT_TIME_BUDGET_MS, MAX_IDENTIFIER_LEN},
    error::RuntimeError,
};

/// Tunable knobs a host can override at compile/VM-init time: a plain,
/// `serde`-friendly struct with a sensible `Default`.
#[derive(Copy, Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub arena_page_len: usize,
    pub max_identifier_len: usize,
    pub max_cycle_count: usize,
    pub time_budget_ms: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        HostConfig {
            arena_page_len: ARENA_PAGE_LEN,
            max_identifier_len: MAX_IDENTIFIER_LEN,
            max_cycle_count: DEFAULT_MAX_CYCLE_COUNT,
            time_budget_ms: DEFAULT_TIME_BUDGET_MS,
        }
    }
}

pub type IntrinsicId = u32;
pub type PropertyCallbackId = u32;

/// A narrow view into VM memory handed to an intrinsic or property callback:
/// the raw bytes of the packed argument list, the output slot to write a
/// return value into, and (for the duration of this one call) a handle to
/// whatever context the host passed into `ExecuteFunction`/`Run`.
pub struct CallContext<'a> {
    pub args: &'a [u8],
    pub ret: &'a mut [u8],
    pub user_context: Option<&'a mut dyn Any>,
}

impl<'a> CallContext<'a> {
    pub fn arg_i32(&self, offset: usize) -> i32 {
        i32::from_le_bytes(self.args[offset..offset + 4].try_into().unwrap())
    }

    pub fn arg_f32(&self, offset: usize) -> f32 {
        f32::from_le_bytes(self.args[offset..offset + 4].try_into().unwrap())
    }

    pub fn set_ret_i32(&mut self, value: i32) {
        self.ret[0..4].copy_from_slice(&value.to_le_bytes());
    }

    pub fn set_ret_f32(&mut self, value: f32) {
        self.ret[0..4].copy_from_slice(&value.to_le_bytes());
    }

    /// Downcast the host-supplied user context to a concrete type, the way
    /// an intrinsic reaches back into host state (e.g. a test output
    /// buffer, or the renderer's current scene).
    pub fn user<T: 'static>(&mut self) -> Option<&mut T> {
        self.user_context.as_deref_mut().and_then(|c| c.downcast_mut())
    }
}

pub type IntrinsicFn = dyn Fn(&mut CallContext) -> Result<(), RuntimeError>;
pub type PropertyGetFn = dyn Fn(u32, &mut CallContext) -> Result<(), RuntimeError>;
pub type PropertySetFn = dyn Fn(u32, &CallContext) -> Result<(), RuntimeError>;

/// A registered object-property accessor pair. Either side may be absent
/// (write-only or read-only properties), in which case the VM raises
/// [`RuntimeError::InvalidObjectProperty`] on the disallowed direction.
pub struct PropertyCallback {
    pub get: Option<Box<PropertyGetFn>>,
    pub set: Option<Box<PropertySetFn>>,
}

/// A named native function signature a script can call directly, by type
/// name (`"int"`, `"float3"`, a registered struct/object-ref name, ...).
/// Bound to the [`IntrinsicId`] that actually runs the call.
pub struct NativeFunctionSpec {
    pub name: String,
    pub params: Vec<String>,
    pub return_type: String,
}

/// One property exposed on a host-registered object-reference type, bound
/// to a [`PropertyCallbackId`] set up via [`Host::register_property`].
pub struct NativeObjectProperty {
    pub name: String,
    pub ty: String,
    pub callback: PropertyCallbackId,
}

/// A class of opaque object handles (a scene node, a render target) a
/// script can hold and address properties on by name, the way `string`
/// itself is just a built-in object-reference type with no properties.
pub struct NativeObjectType {
    pub name: String,
    pub properties: Vec<NativeObjectProperty>,
}

/// Registry of everything the host has handed the compiler/VM: native
/// intrinsic callbacks, the named functions and object types bound to
/// them, object-property accessors, and (at compile time only) the
/// `#include` file resolver. Owned by the [`crate::Compiler`] through
/// every pipeline stage, then handed to the VM for execution.
#[derive(Default)]
pub struct Host {
    config: HostConfig,
    intrinsics: Vec<Box<IntrinsicFn>>,
    native_functions: Vec<(NativeFunctionSpec, IntrinsicId)>,
    object_types: Vec<NativeObjectType>,
    properties: Vec<PropertyCallback>,
    include_resolver: Option<Rc<dyn Fn(&str) -> Option<String>>>,
}

impl Host {
    pub fn new(config: HostConfig) -> Self {
        Host {
            config,
            intrinsics: Vec::new(),
            native_functions: Vec::new(),
            object_types: Vec::new(),
            properties: Vec::new(),
            include_resolver: None,
        }
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Register a native callback, returning the id used to bind it to a
    /// [`crate::symbols::FunctionDescriptor`].
    pub fn register_intrinsic(
        &mut self,
        f: impl Fn(&mut CallContext) -> Result<(), RuntimeError> + 'static,
    ) -> IntrinsicId {
        self.intrinsics.push(Box::new(f));
        (self.intrinsics.len() - 1) as IntrinsicId
    }

    pub fn register_property(&mut self, callback: PropertyCallback) -> PropertyCallbackId {
        self.properties.push(callback);
        (self.properties.len() - 1) as PropertyCallbackId
    }

    /// Make an already-registered intrinsic callable from script under
    /// `name`, with the given parameter and return type names. Type names
    /// are resolved against the builtin type table at check time; an
    /// unresolvable name (a host type that hasn't been declared as a
    /// script-visible struct) makes this declaration silently inert rather
    /// than failing the whole compile.
    pub fn register_function(
        &mut self,
        name: impl Into<String>,
        params: impl IntoIterator<Item = impl Into<String>>,
        return_type: impl Into<String>,
        intrinsic: IntrinsicId,
    ) {
        self.native_functions.push((
            NativeFunctionSpec {
                name: name.into(),
                params: params.into_iter().map(Into::into).collect(),
                return_type: return_type.into(),
            },
            intrinsic,
        ));
    }

    pub(crate) fn native_functions(&self) -> &[(NativeFunctionSpec, IntrinsicId)] {
        &self.native_functions
    }

    /// Declare a new object-reference type named `name`, with `properties`
    /// as `(property name, property type name, callback id)` triples. The
    /// type becomes usable in script as `name var_name;`, and each property
    /// as `var_name.property_name`, dispatching reads/writes through the
    /// bound [`PropertyCallback`].
    pub fn register_object_type(
        &mut self,
        name: impl Into<String>,
        properties: impl IntoIterator<Item = (impl Into<String>, impl Into<String>, PropertyCallbackId)>,
    ) {
        self.object_types.push(NativeObjectType {
            name: name.into(),
            properties: properties
                .into_iter()
                .map(|(name, ty, callback)| NativeObjectProperty {
                    name: name.into(),
                    ty: ty.into(),
                    callback,
                })
                .collect(),
        });
    }

    pub(crate) fn object_types(&self) -> &[NativeObjectType] {
        &self.object_types
    }

    pub fn set_include_resolver(&mut self, f: impl Fn(&str) -> Option<String> + 'static) {
        self.include_resolver = Some(Rc::new(f));
    }

    pub(crate) fn include_resolver(&self) -> Rc<dyn Fn(&str) -> Option<String>> {
        self.include_resolver
            .clone()
            .unwrap_or_else(|| Rc::new(|_: &str| None))
    }

    pub fn call_intrinsic(
        &self,
        id: IntrinsicId,
        ctx: &mut CallContext,
    ) -> Result<(), RuntimeError> {
        (self.intrinsics[id as usize])(ctx)
    }

    pub fn call_property_get(
        &self,
        id: PropertyCallbackId,
        handle: u32,
        ctx: &mut CallContext,
    ) -> Result<(), RuntimeError> {
        match &self.properties[id as usize].get {
            Some(get) => get(handle, ctx),
            None => Err(RuntimeError::InvalidObjectProperty {
                property: format!("<property {} is write-only>", id),
            }),
        }
    }

    pub fn call_property_set(
        &self,
        id: PropertyCallbackId,
        handle: u32,
        ctx: &CallContext,
    ) -> Result<(), RuntimeError> {
        match &self.properties[id as usize].set {
            Some(set) => set(handle, ctx),
            None => Err(RuntimeError::InvalidObjectProperty {
                property: format!("<property {} is read-only>", id),
            }),
        }
    }
}

/// Standard-library intrinsics every host gets for free: the common scalar
/// math functions a per-frame render script needs --
/// `sqrt`/`sin`/`cos`/`abs`/`min`/`max`/`lerp` -- registered the same way a
/// host would register its own native functions.
pub mod stdlib {
    use super::*;

    pub fn sqrt(ctx: &mut CallContext) -> Result<(), RuntimeError> {
        let x = ctx.arg_f32(0);
        if x < 0.0 {
            return Err(RuntimeError::IntrinsicFailed {
                name: "sqrt".into(),
                message: "negative argument".into(),
            });
        }
        ctx.set_ret_f32(x.sqrt());
        Ok(())
    }

    pub fn sin(ctx: &mut CallContext) -> Result<(), RuntimeError> {
        ctx.set_ret_f32(ctx.arg_f32(0).sin());
        Ok(())
    }

    pub fn cos(ctx: &mut CallContext) -> Result<(), RuntimeError> {
        ctx.set_ret_f32(ctx.arg_f32(0).cos());
        Ok(())
    }

    pub fn abs(ctx: &mut CallContext) -> Result<(), RuntimeError> {
        ctx.set_ret_f32(ctx.arg_f32(0).abs());
        Ok(())
    }

    pub fn min(ctx: &mut CallContext) -> Result<(), RuntimeError> {
        ctx.set_ret_f32(ctx.arg_f32(0).min(ctx.arg_f32(4)));
        Ok(())
    }

    pub fn max(ctx: &mut CallContext) -> Result<(), RuntimeError> {
        ctx.set_ret_f32(ctx.arg_f32(0).max(ctx.arg_f32(4)));
        Ok(())
    }

    pub fn lerp(ctx: &mut CallContext) -> Result<(), RuntimeError> {
        let a = ctx.arg_f32(0);
        let b = ctx.arg_f32(4);
        let t = ctx.arg_f32(8);
        ctx.set_ret_f32(a + (b - a) * t);
        Ok(())
    }

    /// Register every stdlib intrinsic against `host` and make each
    /// callable from script under its own name, returning their ids in
    /// declaration order (`sqrt, sin, cos, abs, min, max, lerp`).
    pub fn register_all(host: &mut Host) -> Vec<IntrinsicId> {
        let sqrt_id = host.register_intrinsic(sqrt);
        host.register_function("sqrt", vec!["float"], "float", sqrt_id);
        let sin_id = host.register_intrinsic(sin);
        host.register_function("sin", vec!["float"], "float", sin_id);
        let cos_id = host.register_intrinsic(cos);
        host.register_function("cos", vec!["float"], "float", cos_id);
        let abs_id = host.register_intrinsic(abs);
        host.register_function("abs", vec!["float"], "float", abs_id);
        let min_id = host.register_intrinsic(min);
        host.register_function("min", vec!["float", "float"], "float", min_id);
        let max_id = host.register_intrinsic(max);
        host.register_function("max", vec!["float", "float"], "float", max_id);
        let lerp_id = host.register_intrinsic(lerp);
        host.register_function("lerp", vec!["float", "float", "float"], "float", lerp_id);
        vec![sqrt_id, sin_id, cos_id, abs_id, min_id, max_id, lerp_id]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_config_defaults_match_consts() {
        let config = HostConfig::default();
        assert_eq!(config.max_cycle_count, DEFAULT_MAX_CYCLE_COUNT);
        assert_eq!(config.time_budget_ms, DEFAULT_TIME_BUDGET_MS);
    }

    #[test]
    fn intrinsic_round_trip() {
        let mut host = Host::new(HostConfig::default());
        let id = host.register_intrinsic(|ctx| {
            let x = ctx.arg_i32(0);
            ctx.set_ret_i32(x * 2);
            Ok(())
        });
        let args = 21i32.to_le_bytes();
        let mut ret = [0u8; 4];
        let mut ctx = CallContext { args: &args, ret: &mut ret, user_context: None };
        host.call_intrinsic(id, &mut ctx).unwrap();
        assert_eq!(i32::from_le_bytes(ret), 42);
    }

    #[test]
    fn write_only_property_rejects_read() {
        let mut host = Host::new(HostConfig::default());
        let id = host.register_property(PropertyCallback {
            get: None,
            set: Some(Box::new(|_handle, _ctx| Ok(()))),
        });
        let args = [];
        let mut ret = [0u8; 4];
        let mut ctx = CallContext { args: &args, ret: &mut ret, user_context: None };
        assert!(host.call_property_get(id, 0, &mut ctx).is_err());
    }

    #[test]
    fn stdlib_lerp() {
        let mut host = Host::new(HostConfig::default());
        let ids = stdlib::register_all(&mut host);
        let lerp_id = ids[6];
        let mut args = Vec::new();
        args.extend_from_slice(&0f32.to_le_bytes());
        args.extend_from_slice(&10f32.to_le_bytes());
        args.extend_from_slice(&0.5f32.to_le_bytes());
        let mut ret = [0u8; 4];
        let mut ctx = CallContext { args: &args, ret: &mut ret, user_context: None };
        host.call_intrinsic(lerp_id, &mut ctx).unwrap();
        assert_eq!(f32::from_le_bytes(ret), 5.0);
    }
}
