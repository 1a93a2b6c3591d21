//! Script functions referenced from the host
//!
//! Functions read out of the engine are kept in a table that lives in the
//! script heap, so the garbage collector sees every reference and collects
//! cycles through them. The host only holds numeric ids.

use rquickjs::{Ctx, Function, Object, Value as JsValue};

/// Hidden, non-enumerable global holding the table
const TABLE: &str = "__hostbridge__";

/// Own property marking an error object raised for a host error
pub(crate) const HOST_ERROR_KEY: &str = "hostErrorId";

const BOOTSTRAP: &str = r#"
(() => {
    const table = Object.create(null);
    let next = 0;
    const api = {
        save(value) {
            next += 1;
            table[next] = value;
            return next;
        },
        load(id) {
            return table[id];
        },
        release(id) {
            delete table[id];
        },
        nameOf(value) {
            const name = value.name;
            return typeof name === "string" ? name : "";
        },
        error(name, message, id) {
            const err = new Error(message);
            err.name = name;
            Object.defineProperty(err, "hostErrorId", { value: id });
            return err;
        },
    };
    Object.defineProperty(globalThis, "__hostbridge__", { value: Object.freeze(api) });
})();
"#;

pub fn install(ctx: &Ctx<'_>) -> rquickjs::Result<()> {
    ctx.eval::<(), _>(BOOTSTRAP)
}

fn helper<'js>(ctx: &Ctx<'js>, name: &str) -> rquickjs::Result<Function<'js>> {
    let table: Object = ctx.globals().get(TABLE)?;
    table.get(name)
}

/// Store a function and return its id
pub fn save<'js>(ctx: &Ctx<'js>, value: &JsValue<'js>) -> rquickjs::Result<u64> {
    let id: f64 = helper(ctx, "save")?.call((value.clone(),))?;
    Ok(id as u64)
}

/// Undefined once the id has been released
pub fn load<'js>(ctx: &Ctx<'js>, id: u64) -> rquickjs::Result<JsValue<'js>> {
    helper(ctx, "load")?.call((id as f64,))
}

pub fn release(ctx: &Ctx<'_>, id: u64) -> rquickjs::Result<()> {
    helper(ctx, "release")?.call((id as f64,))
}

pub fn name_of<'js>(ctx: &Ctx<'js>, value: &JsValue<'js>) -> rquickjs::Result<String> {
    helper(ctx, "nameOf")?.call((value.clone(),))
}

/// Error object standing for host error `id`
pub fn host_error<'js>(
    ctx: &Ctx<'js>,
    name: &str,
    message: &str,
    id: u64,
) -> rquickjs::Result<JsValue<'js>> {
    helper(ctx, "error")?.call((name, message, id as f64))
}
