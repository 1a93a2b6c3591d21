//! `console` routed to `tracing`
//!
//! Arguments print the way a browser console shows them on one line:
//! strings raw, objects and arrays as JSON.

use rquickjs::{Ctx, Function};
use uuid::Uuid;

const CONSOLE: &str = r#"
(emit) => {
    const render = (arg) => {
        if (typeof arg === "object" && arg !== null) {
            try {
                return JSON.stringify(arg);
            } catch (_) {
                return String(arg);
            }
        }
        return String(arg);
    };
    const line = (args) => args.map(render).join(" ");
    const console = {
        log: (...args) => emit("log", line(args)),
        info: (...args) => emit("info", line(args)),
        warn: (...args) => emit("warn", line(args)),
        error: (...args) => emit("error", line(args)),
    };
    Object.defineProperty(globalThis, "console", {
        value: console,
        writable: true,
        configurable: true,
    });
}
"#;

pub fn install(ctx: &Ctx<'_>, context: Uuid) -> rquickjs::Result<()> {
    let emit = Function::new(ctx.clone(), move |level: String, line: String| {
        match level.as_str() {
            "warn" => tracing::warn!(target: "hostbridge::console", %context, "{}", line),
            "error" => tracing::error!(target: "hostbridge::console", %context, "{}", line),
            _ => tracing::info!(target: "hostbridge::console", %context, "{}", line),
        }
    })?;
    let setup: Function = ctx.eval(CONSOLE)?;
    setup.call::<_, ()>((emit,))
}
