//! Moving values between the engine and the boundary representation
//!
//! Reading copies script data out into a [`Value`] snapshot; functions are
//! stored in the handle table and come out as handles. Writing builds fresh
//! script values, except that a handle returning to its own context restores
//! the original function. In-out parameters update existing script objects
//! in place through [`write_back`].

use std::sync::Arc;

use rquickjs::function::Rest;
use rquickjs::{Array as JsArray, Ctx, Function, Object as JsObject, Value as JsValue};
use tracing::trace;

use super::errors::{self, OrFault};
use super::handles;
use crate::bridge::Callable;
use crate::context::ContextShared;
use crate::error::{Error, Result};
use crate::host::function::call_with_values;
use crate::host::to_script::{import, import_at};
use crate::host::{HostFunction, HostValue, ParamMode};
use crate::value::{Array, FunctionHandle, FunctionKind, Object, Value};

/// Copy a script value out of the engine
pub(crate) fn read<'js>(
    shared: &Arc<ContextShared>,
    ctx: &Ctx<'js>,
    value: &JsValue<'js>,
) -> Result<Value> {
    Walker::new(shared, ctx).read(value, "$", 0)
}

/// Build the script value for `value`
pub(crate) fn write<'js>(
    shared: &Arc<ContextShared>,
    ctx: &Ctx<'js>,
    value: &Value,
) -> Result<JsValue<'js>> {
    Walker::new(shared, ctx).write(value, "$", 0)
}

/// Copy a host value's contents into an existing script value
///
/// Objects and arrays keep their identity; their fields and elements are
/// replaced and keys the host value does not mention are left alone.
/// Primitives have nothing to update.
pub(crate) fn write_back<'js>(
    shared: &Arc<ContextShared>,
    ctx: &Ctx<'js>,
    target: &JsValue<'js>,
    host: &HostValue,
) -> Result<()> {
    Walker::new(shared, ctx).write_back(target, host, "$", 0)
}

struct Walker<'a, 'js> {
    shared: &'a Arc<ContextShared>,
    ctx: &'a Ctx<'js>,
    max_depth: usize,
}

impl<'a, 'js> Walker<'a, 'js> {
    fn new(shared: &'a Arc<ContextShared>, ctx: &'a Ctx<'js>) -> Self {
        Self {
            shared,
            ctx,
            max_depth: shared.options.max_depth,
        }
    }

    fn check_depth(&self, path: &str, depth: usize) -> Result<()> {
        if depth > self.max_depth {
            return Err(Error::DepthLimit {
                limit: self.max_depth,
                path: path.to_string(),
            });
        }
        Ok(())
    }

    /* ===================== Reading ===================== */

    fn read(&self, value: &JsValue<'js>, path: &str, depth: usize) -> Result<Value> {
        self.check_depth(path, depth)?;

        if value.is_undefined() || value.is_null() {
            return Ok(Value::Null);
        }
        if let Some(b) = value.as_bool() {
            return Ok(Value::Bool(b));
        }
        if let Some(n) = value.as_number() {
            return Ok(Value::Number(n));
        }
        if let Some(s) = value.as_string() {
            let s = s.to_string().or_fault(self.shared, self.ctx)?;
            return Ok(Value::String(s));
        }
        if value.is_function() {
            let id = handles::save(self.ctx, value).or_fault(self.shared, self.ctx)?;
            let name = handles::name_of(self.ctx, value).or_fault(self.shared, self.ctx)?;
            return Ok(Value::Function(FunctionHandle::script(self.shared, id, name)));
        }
        if let Some(arr) = value.as_array() {
            let items = Array::new();
            for i in 0..arr.len() {
                let item: JsValue = arr.get(i).or_fault(self.shared, self.ctx)?;
                items.push(self.read(&item, &format!("{}[{}]", path, i), depth + 1)?);
            }
            return Ok(Value::Array(items));
        }
        if let Some(obj) = value.as_object() {
            let out = Object::new();
            for key in obj.keys::<String>() {
                let key = key.or_fault(self.shared, self.ctx)?;
                let item: JsValue = obj.get(key.as_str()).or_fault(self.shared, self.ctx)?;
                let child = format!("{}.{}", path, key);
                out.set(key, self.read(&item, &child, depth + 1)?);
            }
            return Ok(Value::Object(out));
        }

        Err(Error::UnsupportedType(format!(
            "script {:?} at {} has no host representation",
            value.type_of(),
            path
        )))
    }

    /* ===================== Writing ===================== */

    fn write(&self, value: &Value, path: &str, depth: usize) -> Result<JsValue<'js>> {
        self.check_depth(path, depth)?;
        let ctx = self.ctx.clone();

        Ok(match value {
            Value::Null => JsValue::new_null(ctx),
            Value::Bool(b) => JsValue::new_bool(ctx, *b),
            Value::Number(n) => number(ctx, *n),
            Value::String(s) => rquickjs::String::from_str(ctx, s)
                .or_fault(self.shared, self.ctx)?
                .into_value(),
            Value::Array(arr) => {
                let out = JsArray::new(ctx).or_fault(self.shared, self.ctx)?;
                for (i, item) in arr.to_vec().iter().enumerate() {
                    let item = self.write(item, &format!("{}[{}]", path, i), depth + 1)?;
                    out.set(i, item).or_fault(self.shared, self.ctx)?;
                }
                out.into_value()
            }
            Value::Object(obj) => {
                let out = JsObject::new(ctx).or_fault(self.shared, self.ctx)?;
                for (key, item) in obj.entries() {
                    let item = self.write(&item, &format!("{}.{}", path, key), depth + 1)?;
                    out.set(key.as_str(), item).or_fault(self.shared, self.ctx)?;
                }
                out.into_value()
            }
            Value::Function(handle) => self.function(handle)?,
        })
    }

    fn function(&self, handle: &FunctionHandle) -> Result<JsValue<'js>> {
        match handle.kind() {
            FunctionKind::Script(slot) if handle.owner_id() == self.shared.id => {
                let value = handles::load(self.ctx, slot.id).or_fault(self.shared, self.ctx)?;
                if !value.is_function() {
                    return Err(Error::DanglingContext {
                        context: self.shared.id,
                    });
                }
                Ok(value)
            }
            // another context's function is called through the bridge
            FunctionKind::Script(_) => {
                let bridged = HostFunction::bridged(Callable::new(handle.clone()));
                host_function(self.shared, self.ctx, &bridged)
            }
            FunctionKind::Host(func) => match func.as_callable() {
                Some(callable) if callable.owner_id() == self.shared.id => {
                    self.function(callable.handle())
                }
                _ => host_function(self.shared, self.ctx, func),
            },
        }
    }

    /* ===================== Write-back ===================== */

    fn write_back(
        &self,
        target: &JsValue<'js>,
        host: &HostValue,
        path: &str,
        depth: usize,
    ) -> Result<()> {
        self.check_depth(path, depth)?;
        if target.is_function() {
            return Ok(());
        }

        if let Some(arr) = target.as_array() {
            let HostValue::Seq(items) = host else {
                return Ok(());
            };
            for (i, item) in items.iter().enumerate() {
                let child = format!("{}[{}]", path, i);
                let existing: JsValue = arr.get(i).or_fault(self.shared, self.ctx)?;
                if same_shape(&existing, item) {
                    self.write_back(&existing, item, &child, depth + 1)?;
                } else {
                    let value = self.import(item, &child, depth + 1)?;
                    arr.set(i, value).or_fault(self.shared, self.ctx)?;
                }
            }
            if let Some(obj) = target.as_object() {
                obj.set("length", items.len() as f64)
                    .or_fault(self.shared, self.ctx)?;
            }
            return Ok(());
        }

        let Some(obj) = target.as_object() else {
            return Ok(());
        };
        let fields: Vec<(&str, &HostValue)> = match host {
            HostValue::Record(record) => {
                record.fields.iter().map(|(k, v)| (k.as_str(), v)).collect()
            }
            HostValue::Map(entries) => entries.iter().map(|(k, v)| (k.as_str(), v)).collect(),
            _ => return Ok(()),
        };
        for (key, value) in fields {
            let child = format!("{}.{}", path, key);
            let existing: JsValue = obj.get(key).or_fault(self.shared, self.ctx)?;
            if same_shape(&existing, value) {
                self.write_back(&existing, value, &child, depth + 1)?;
            } else {
                let value = self.import(value, &child, depth + 1)?;
                obj.set(key, value).or_fault(self.shared, self.ctx)?;
            }
        }
        Ok(())
    }

    fn import(&self, host: &HostValue, path: &str, depth: usize) -> Result<JsValue<'js>> {
        let opts = self.shared.convert_options();
        let value = import_at(self.shared, host, &opts, path, depth)?;
        self.write(&value, path, depth)
    }
}

/// Whether an existing script value can be updated in place from `host`
fn same_shape(value: &JsValue<'_>, host: &HostValue) -> bool {
    if value.is_function() {
        return false;
    }
    match host {
        HostValue::Seq(_) => value.is_array(),
        HostValue::Record(_) | HostValue::Map(_) => {
            !value.is_array() && value.as_object().is_some()
        }
        _ => false,
    }
}

/// Integral numbers in i32 range are stored as engine ints
fn number(ctx: Ctx<'_>, n: f64) -> JsValue<'_> {
    let int = n as i32;
    if int as f64 == n && !(n == 0.0 && n.is_sign_negative()) {
        JsValue::new_int(ctx, int)
    } else {
        JsValue::new_float(ctx, n)
    }
}

/* ===================== Host functions ===================== */

/// Script function that calls `func`
///
/// The function holds its context weakly; a host closure that needs its
/// own context back should capture a `WeakContext`.
pub(crate) fn host_function<'js>(
    shared: &Arc<ContextShared>,
    ctx: &Ctx<'js>,
    func: &HostFunction,
) -> Result<JsValue<'js>> {
    let owner = Arc::downgrade(shared);
    let context = shared.id;
    let target = func.clone();

    Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, args: Rest<JsValue<'js>>| -> rquickjs::Result<JsValue<'js>> {
            let Some(shared) = owner.upgrade() else {
                let message = Error::DanglingContext { context }.to_string();
                return Err(match rquickjs::String::from_str(ctx.clone(), &message) {
                    Ok(message) => ctx.throw(message.into_value()),
                    Err(err) => err,
                });
            };
            call_host(&shared, &ctx, &target, &args.0)
                .map_err(|err| errors::throw_host(&shared, &ctx, err))
        },
    )
    .and_then(|f| f.with_name(func.name()))
    .map(|f| f.into_value())
    .or_fault(shared, ctx)
}

fn call_host<'js>(
    shared: &Arc<ContextShared>,
    ctx: &Ctx<'js>,
    func: &HostFunction,
    args: &[JsValue<'js>],
) -> Result<JsValue<'js>> {
    trace!(context = %shared.id, function = func.name(), "host call from script");
    let opts = shared.convert_options();
    let values = args
        .iter()
        .map(|arg| read(shared, ctx, arg))
        .collect::<Result<Vec<_>>>()?;

    let (host_args, result) = call_with_values(func, &values, &opts)?;

    for (i, param) in func.signature().params.iter().enumerate() {
        if param.mode != ParamMode::InOut {
            continue;
        }
        if let (Some(target), Some(host)) = (args.get(i), host_args.get(i)) {
            write_back(shared, ctx, target, host)?;
        }
    }

    let value = import(shared, &result, &opts)?;
    write(shared, ctx, &value)
}
