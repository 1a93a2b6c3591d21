//! Script exceptions and their conversion to host errors

use rquickjs::convert::Coerced;
use rquickjs::{Ctx, Object as JsObject, Value as JsValue};

use super::handles::{self, HOST_ERROR_KEY};
use crate::context::ContextShared;
use crate::error::{Error, Location, Result, ScriptFault};

pub(crate) trait OrFault<T> {
    /// Convert an engine failure, taking the pending exception if any
    fn or_fault(self, shared: &ContextShared, ctx: &Ctx<'_>) -> Result<T>;
}

impl<T> OrFault<T> for rquickjs::Result<T> {
    fn or_fault(self, shared: &ContextShared, ctx: &Ctx<'_>) -> Result<T> {
        self.map_err(|err| match err {
            rquickjs::Error::Exception => {
                let thrown = ctx.catch();
                thrown_to_error(shared, ctx, &thrown)
            }
            other => internal(other),
        })
    }
}

/// Engine failure that is not a script exception
pub(crate) fn internal(err: rquickjs::Error) -> Error {
    fault("InternalError", err.to_string(), None)
}

fn fault(name: impl Into<String>, message: impl Into<String>, location: Option<Location>) -> Error {
    Error::ScriptFault(ScriptFault {
        name: name.into(),
        message: message.into(),
        location,
    })
}

/// Convert an exception that escaped the script into a host error
///
/// Error objects raised for host errors give back the original error.
pub(crate) fn thrown_to_error<'js>(
    shared: &ContextShared,
    ctx: &Ctx<'js>,
    thrown: &JsValue<'js>,
) -> Error {
    if let Some(obj) = thrown.as_object() {
        if let Ok(Some(id)) = obj.get::<_, Option<f64>>(HOST_ERROR_KEY) {
            if let Some(err) = shared.take_host_error(id as u64) {
                return err;
            }
        }

        if obj.contains_key("message").unwrap_or(false) {
            let name = string_prop(obj, "name").unwrap_or_else(|| "Error".to_string());
            let message = string_prop(obj, "message").unwrap_or_default();
            let location = string_prop(obj, "stack").and_then(|stack| location_in(&stack));

            // native stack exhaustion
            if name == "InternalError" && message == "stack overflow" {
                return fault("RangeError", "Maximum call stack size exceeded", location);
            }
            return fault(name, message, location);
        }
    }

    let message = match thrown.get::<Coerced<String>>() {
        Ok(Coerced(message)) => message,
        Err(_) => {
            ctx.catch();
            String::new()
        }
    };
    fault("Error", message, None)
}

fn string_prop(obj: &JsObject<'_>, key: &str) -> Option<String> {
    let value: JsValue = obj.get(key).ok()?;
    value.as_string()?.to_string().ok()
}

/// First script frame of a stack trace: `at fn (file:line:col)` or `at file:line`
fn location_in(stack: &str) -> Option<Location> {
    stack.lines().find_map(|line| {
        let frame = line.trim().strip_prefix("at ")?;
        let place = match frame.rfind('(') {
            Some(open) if frame.ends_with(')') => &frame[open + 1..frame.len() - 1],
            _ => frame,
        };
        let mut parts = place.rsplitn(3, ':');
        let last = parts.next()?.parse::<usize>().ok()?;
        match parts.next().map(str::parse::<usize>) {
            Some(Ok(line)) => Some(Location {
                line,
                column: Some(last),
            }),
            _ => Some(Location {
                line: last,
                column: None,
            }),
        }
    })
}

/// Raise a host failure inside the script
///
/// Scripts may catch it like any other error object. If nothing does, the
/// original host error is what the outermost call returns.
pub(crate) fn throw_host<'js>(shared: &ContextShared, ctx: &Ctx<'js>, err: Error) -> rquickjs::Error {
    let (name, message) = match &err {
        Error::ScriptFault(fault) => (fault.name.clone(), fault.message.clone()),
        other => (other.script_name().to_string(), other.to_string()),
    };
    let id = shared.stash_host_error(err);
    match handles::host_error(ctx, &name, &message, id) {
        Ok(value) => ctx.throw(value),
        Err(err) => err,
    }
}
