//! Execution contexts
//!
//! A [`Context`] owns one script engine and its global namespace and runs
//! script source against it. Handles are cheap to clone; the context lives
//! while any strong handle does. Script functions keep only a weak
//! reference back to it, so a host closure that needs to re-enter its own
//! context should capture a [`WeakContext`].
//!
//! All execution in one context is serialized: other threads block, while
//! the thread already executing (for example a host function calling back
//! into its own context) nests freely.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rquickjs::{Ctx, Value as JsValue};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::bridge::Callable;
use crate::engine::errors::{self, OrFault};
use crate::engine::{convert, eval_options, handles, Engine};
use crate::error::{Error, Result};
use crate::host::function::call_with_values;
use crate::host::to_host::{value_to_host, value_to_host_dynamic};
use crate::host::to_script::import;
use crate::host::{
    from_host, to_host, ConvertOptions, Described, HostFunction, HostValue, Param, ParamMode,
    Signature, TypeDescriptor,
};
use crate::value::{FunctionHandle, FunctionKind, Value};

/* ===================== Options ===================== */

/// Default engine stack budget in bytes
pub const DEFAULT_STACK_SIZE: usize = 256 * 1024;
/// Smallest accepted `max_stack_size`
pub const MIN_STACK_SIZE: usize = 16 * 1024;
/// Largest accepted `max_stack_size`; leaves headroom on the 2 MiB stack of
/// spawned threads for the host frames around the engine
pub const MAX_STACK_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextOptions {
    /// Nesting limit for conversions
    pub max_depth: usize,
    /// Native stack the engine may use, in bytes, before scripts get a
    /// RangeError
    pub max_stack_size: usize,
    /// Engine heap limit in bytes; unlimited when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_limit: Option<usize>,
    /// Install the full set of standard globals plus `console`
    pub stdlib: bool,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            max_depth: 128,
            max_stack_size: DEFAULT_STACK_SIZE,
            memory_limit: None,
            stdlib: true,
        }
    }
}

impl ContextOptions {
    pub fn validate(&self) -> Result<()> {
        if self.max_depth == 0 {
            return Err(Error::InvalidOptions(
                "max_depth must be at least 1".to_string(),
            ));
        }
        if !(MIN_STACK_SIZE..=MAX_STACK_SIZE).contains(&self.max_stack_size) {
            return Err(Error::InvalidOptions(format!(
                "max_stack_size must be between {} and {} bytes, got {}",
                MIN_STACK_SIZE, MAX_STACK_SIZE, self.max_stack_size
            )));
        }
        if self.memory_limit == Some(0) {
            return Err(Error::InvalidOptions(
                "memory_limit must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Idle,
    /// Some thread is running script code in this context
    Executing,
}

/* ===================== Shared State ===================== */

pub(crate) struct ContextShared {
    pub id: Uuid,
    pub options: ContextOptions,
    engine: Engine,
    nesting: AtomicUsize,
    /// Handle table ids whose last host handle has dropped
    released: Mutex<Vec<u64>>,
    /// Host errors raised into scripts and not yet seen again
    host_errors: Mutex<HashMap<u64, Error>>,
    next_error: AtomicU64,
}

struct Nesting<'a>(&'a AtomicUsize);

impl Drop for Nesting<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ContextShared {
    fn new(options: ContextOptions) -> Result<Arc<Self>> {
        options.validate()?;
        let id = Uuid::new_v4();
        let shared = Arc::new(Self {
            id,
            options,
            engine: Engine::new(id, &options)?,
            nesting: AtomicUsize::new(0),
            released: Mutex::new(Vec::new()),
            host_errors: Mutex::new(HashMap::new()),
            next_error: AtomicU64::new(1),
        });
        debug!(context = %shared.id, ?options, "context created");
        Ok(shared)
    }

    pub fn convert_options(&self) -> ConvertOptions {
        ConvertOptions {
            max_depth: self.options.max_depth,
        }
    }

    /// Run `f` inside this context's engine
    pub fn run<R, F>(self: &Arc<Self>, f: F) -> Result<R>
    where
        F: for<'js> FnOnce(&Ctx<'js>) -> Result<R> + Send,
        R: Send,
    {
        self.engine.with(|ctx, outermost| {
            self.nesting.fetch_add(1, Ordering::SeqCst);
            let _nesting = Nesting(&self.nesting);
            if outermost {
                self.drain_released(ctx);
            }
            let result = f(ctx);
            if outermost {
                self.host_errors.lock().clear();
            }
            result
        })
    }

    fn drain_released(&self, ctx: &Ctx<'_>) {
        let ids = std::mem::take(&mut *self.released.lock());
        for id in ids {
            if let Err(err) = handles::release(ctx, id).or_fault(self, ctx) {
                debug!(context = %self.id, handle = id, error = %err, "handle release failed");
            }
        }
    }

    pub fn release_handle(&self, id: u64) {
        self.released.lock().push(id);
    }

    pub fn stash_host_error(&self, err: Error) -> u64 {
        let id = self.next_error.fetch_add(1, Ordering::SeqCst);
        self.host_errors.lock().insert(id, err);
        id
    }

    pub fn take_host_error(&self, id: u64) -> Option<Error> {
        self.host_errors.lock().remove(&id)
    }

    fn state(&self) -> ContextState {
        if self.nesting.load(Ordering::SeqCst) > 0 {
            ContextState::Executing
        } else {
            ContextState::Idle
        }
    }

    /// Import a host argument, conforming it to its declared parameter type
    fn import_arg(
        self: &Arc<Self>,
        arg: &HostValue,
        param: Option<&Param>,
        opts: &ConvertOptions,
    ) -> Result<Value> {
        let value = import(self, arg, opts)?;
        match param {
            Some(param) if param.ty != TypeDescriptor::Any => {
                import(self, &value_to_host(&value, &param.ty, opts)?, opts)
            }
            _ => Ok(value),
        }
    }

    /// Call one of this context's functions with host arguments
    ///
    /// In-out arguments are replaced with the callee's final value of the
    /// corresponding parameter.
    pub fn invoke(
        self: &Arc<Self>,
        handle: &FunctionHandle,
        args: &mut [HostValue],
        signature: &Signature,
    ) -> Result<HostValue> {
        debug!(context = %self.id, function = %handle.name(), argc = args.len(), "bridged call");

        let opts = self.convert_options();
        let values = args
            .iter()
            .enumerate()
            .map(|(i, arg)| self.import_arg(arg, signature.params.get(i), &opts))
            .collect::<Result<Vec<_>>>()?;

        let (finals, result) = match handle.kind() {
            FunctionKind::Script(slot) => self.call_script(slot.id, &values, signature)?,
            FunctionKind::Host(func) => self.call_host(func, &values, signature)?,
        };

        for (i, value) in finals {
            if let (Some(slot), Some(param)) = (args.get_mut(i), signature.params.get(i)) {
                *slot = value_to_host(&value, &param.ty, &opts)?;
            }
        }
        value_to_host(&result, &signature.ret, &opts)
    }

    fn call_script(
        self: &Arc<Self>,
        id: u64,
        values: &[Value],
        signature: &Signature,
    ) -> Result<(Vec<(usize, Value)>, Value)> {
        self.run(|ctx| {
            let func = handles::load(ctx, id).or_fault(self, ctx)?;
            let Some(func) = func.as_function() else {
                return Err(Error::DanglingContext { context: self.id });
            };
            let args = values
                .iter()
                .map(|value| convert::write(self, ctx, value))
                .collect::<Result<Vec<_>>>()?;

            let result: JsValue = func
                .call((rquickjs::function::Rest(args.clone()),))
                .or_fault(self, ctx)?;

            let mut finals = Vec::new();
            for (i, param) in signature.params.iter().enumerate() {
                if param.mode != ParamMode::InOut {
                    continue;
                }
                if let Some(arg) = args.get(i) {
                    finals.push((i, convert::read(self, ctx, arg)?));
                }
            }
            Ok((finals, convert::read(self, ctx, &result)?))
        })
    }

    /// A host function reached through a handle never enters the engine
    fn call_host(
        self: &Arc<Self>,
        func: &HostFunction,
        values: &[Value],
        signature: &Signature,
    ) -> Result<(Vec<(usize, Value)>, Value)> {
        let opts = self.convert_options();
        let (host_args, result) = call_with_values(func, values, &opts)?;
        let mut finals = Vec::new();
        for (i, param) in signature.params.iter().enumerate() {
            if param.mode != ParamMode::InOut {
                continue;
            }
            if let Some(arg) = host_args.get(i) {
                finals.push((i, import(self, arg, &opts)?));
            }
        }
        Ok((finals, import(self, &result, &opts)?))
    }
}

impl Drop for ContextShared {
    fn drop(&mut self) {
        debug!(context = %self.id, "context destroyed");
    }
}

/* ===================== Context ===================== */

#[derive(Clone)]
pub struct Context {
    shared: Arc<ContextShared>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .finish()
    }
}

impl Context {
    pub fn new() -> Result<Self> {
        Self::with_options(ContextOptions::default())
    }

    /// Fails with `Error::InvalidOptions` when an option is out of range
    pub fn with_options(options: ContextOptions) -> Result<Self> {
        Ok(Self {
            shared: ContextShared::new(options)?,
        })
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn state(&self) -> ContextState {
        self.shared.state()
    }

    pub fn options(&self) -> &ContextOptions {
        &self.shared.options
    }

    pub fn downgrade(&self) -> WeakContext {
        WeakContext {
            shared: Arc::downgrade(&self.shared),
        }
    }

    pub(crate) fn shared(&self) -> &Arc<ContextShared> {
        &self.shared
    }

    /* ===================== Execution ===================== */

    /// Run source in the global scope, returning its completion value
    pub fn execute(&self, source: &str) -> Result<Value> {
        debug!(context = %self.shared.id, bytes = source.len(), "execute");
        let shared = &self.shared;
        shared
            .run(|ctx| {
                let value: JsValue = ctx
                    .eval_with_options(source, eval_options())
                    .or_fault(shared, ctx)?;
                convert::read(shared, ctx, &value)
            })
            .map_err(|err| {
                debug!(context = %shared.id, error = %err, "execute failed");
                err
            })
    }

    /// Look up a global function and call it with host arguments
    pub fn call(&self, name: &str, args: &[HostValue]) -> Result<HostValue> {
        let value = self.try_get(name)?.unwrap_or(Value::Null);
        self.bridge(&value)?.call(args)
    }

    /* ===================== Namespace ===================== */

    /// Convert a host value and install it as a global
    pub fn bind(&self, name: &str, value: impl Into<HostValue>) -> Result<()> {
        let value = self.to_value(&value.into())?;
        debug!(context = %self.shared.id, name, kind = %value.kind(), "bind");
        let shared = &self.shared;
        shared.run(|ctx| {
            let value = convert::write(shared, ctx, &value)?;
            ctx.globals().set(name, value).or_fault(shared, ctx)
        })
    }

    pub fn bind_fn(&self, name: &str, func: HostFunction) -> Result<()> {
        self.bind(name, func)
    }

    /// Bind any serde type
    pub fn bind_serialized<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<()> {
        self.bind(name, to_host(value)?)
    }

    /// Snapshot of a global; `None` when it is absent, undefined or unreadable
    pub fn get(&self, name: &str) -> Option<Value> {
        match self.try_get(name) {
            Ok(value) => value,
            Err(err) => {
                debug!(context = %self.shared.id, name, error = %err, "global not readable");
                None
            }
        }
    }

    /// Snapshot of a global, including top-level `let` and `const` bindings
    pub fn try_get(&self, name: &str) -> Result<Option<Value>> {
        let shared = &self.shared;
        shared.run(|ctx| {
            let globals = ctx.globals();
            let value: JsValue = if globals.contains_key(name).or_fault(shared, ctx)? {
                globals.get(name).or_fault(shared, ctx)?
            } else if is_identifier(name) {
                // lexical globals are not properties of the global object
                match ctx.eval_with_options::<JsValue, _>(name, eval_options()) {
                    Ok(value) => value,
                    Err(rquickjs::Error::Exception) => {
                        ctx.catch();
                        return Ok(None);
                    }
                    Err(err) => return Err(errors::internal(err)),
                }
            } else {
                return Ok(None);
            };
            if value.is_undefined() {
                return Ok(None);
            }
            convert::read(shared, ctx, &value).map(Some)
        })
    }

    /// Read a global and convert it to `T`; a missing global reads as null
    pub fn get_as<T: DeserializeOwned + Described>(&self, name: &str) -> Result<T> {
        let value = self.try_get(name)?.unwrap_or(Value::Null);
        self.export_as(&value)
    }

    /// Enumerable properties of the global object
    pub fn global_names(&self) -> Vec<String> {
        let shared = &self.shared;
        shared
            .run(|ctx| {
                ctx.globals()
                    .keys::<String>()
                    .collect::<rquickjs::Result<Vec<_>>>()
                    .or_fault(shared, ctx)
            })
            .unwrap_or_default()
    }

    /* ===================== Conversion ===================== */

    pub fn to_value(&self, host: &HostValue) -> Result<Value> {
        import(&self.shared, host, &self.shared.convert_options())
    }

    pub fn export(&self, value: &Value, target: &TypeDescriptor) -> Result<HostValue> {
        value_to_host(value, target, &self.shared.convert_options())
    }

    pub fn export_dynamic(&self, value: &Value) -> Result<HostValue> {
        value_to_host_dynamic(value, &self.shared.convert_options())
    }

    pub fn export_as<T: DeserializeOwned + Described>(&self, value: &Value) -> Result<T> {
        from_host(self.export(value, &T::descriptor())?)
    }

    /// Overwrite `target` with the converted value
    pub fn export_into<T: DeserializeOwned + Described>(
        &self,
        value: &Value,
        target: &mut T,
    ) -> Result<()> {
        *target = self.export_as(value)?;
        Ok(())
    }

    /* ===================== Bridge ===================== */

    /// Wrap a function value for calling from the host
    pub fn bridge(&self, value: &Value) -> Result<Callable> {
        self.bridge_with(value, Signature::dynamic())
    }

    pub fn bridge_with(&self, value: &Value, signature: Signature) -> Result<Callable> {
        match value {
            Value::Function(handle) => Ok(Callable::with_signature(handle.clone(), signature)),
            other => Err(Error::type_mismatch("$", "function", other.kind())),
        }
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// Non-owning context handle
#[derive(Clone, Debug)]
pub struct WeakContext {
    shared: Weak<ContextShared>,
}

impl WeakContext {
    pub fn upgrade(&self) -> Option<Context> {
        self.shared.upgrade().map(|shared| Context { shared })
    }
}
