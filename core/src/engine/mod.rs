//! Embedded script engine
//!
//! Every context owns one QuickJS runtime. Entering the engine takes the
//! runtime lock, so other threads block until the current entry returns.
//! A thread that is already inside an engine (a host function calling back
//! into its own context) reuses the live `Ctx` instead of locking again.

mod console;
pub(crate) mod convert;
pub(crate) mod errors;
pub(crate) mod handles;

#[cfg(test)]
mod tests;

use std::cell::RefCell;

use rquickjs::context::{intrinsic, EvalOptions};
use rquickjs::{Context as JsContext, Ctx, Runtime};
use uuid::Uuid;

use crate::context::ContextOptions;
use crate::error::Result;

thread_local! {
    /// Engines entered on this thread, innermost last
    static ACTIVE: RefCell<Vec<(Uuid, Ctx<'static>)>> = RefCell::new(Vec::new());
}

pub(crate) struct Engine {
    id: Uuid,
    context: JsContext,
    _runtime: Runtime,
}

impl Engine {
    pub fn new(id: Uuid, options: &ContextOptions) -> Result<Self> {
        let runtime = Runtime::new().map_err(errors::internal)?;
        runtime.set_max_stack_size(options.max_stack_size);
        if let Some(limit) = options.memory_limit {
            runtime.set_memory_limit(limit);
        }

        let context = if options.stdlib {
            JsContext::full(&runtime)
        } else {
            JsContext::custom::<intrinsic::Eval>(&runtime)
        }
        .map_err(errors::internal)?;

        let engine = Self {
            id,
            context,
            _runtime: runtime,
        };
        let stdlib = options.stdlib;
        engine.with(|ctx, _| -> Result<()> {
            handles::install(ctx).map_err(errors::internal)?;
            if stdlib {
                console::install(ctx, id).map_err(errors::internal)?;
            }
            Ok(())
        })?;
        Ok(engine)
    }

    /// Run `f` inside the engine
    ///
    /// The flag passed to `f` is true for the outermost entry on this thread.
    pub fn with<F, R>(&self, f: F) -> R
    where
        F: for<'js> FnOnce(&Ctx<'js>, bool) -> R + Send,
        R: Send,
    {
        let nested = ACTIVE.with(|active| {
            active
                .borrow()
                .iter()
                .rev()
                .find(|(id, _)| *id == self.id)
                .map(|(_, ctx)| ctx.clone())
        });
        if let Some(ctx) = nested {
            return f(&ctx, false);
        }

        let id = self.id;
        self.context.with(move |ctx| {
            let _active = ActiveEntry::push(id, &ctx);
            f(&ctx, true)
        })
    }
}

/// Marks an engine as entered on this thread until dropped
struct ActiveEntry;

impl ActiveEntry {
    fn push(id: Uuid, ctx: &Ctx<'_>) -> Self {
        // SAFETY: the entry is popped when the guard drops, which happens
        // before `Context::with` returns and releases the runtime lock, so the
        // stored ctx is only ever used while it is live and locked by this
        // thread.
        let ctx = unsafe { std::mem::transmute::<Ctx<'_>, Ctx<'static>>(ctx.clone()) };
        ACTIVE.with(|active| active.borrow_mut().push((id, ctx)));
        ActiveEntry
    }
}

impl Drop for ActiveEntry {
    fn drop(&mut self) {
        let entry = ACTIVE.with(|active| active.borrow_mut().pop());
        drop(entry);
    }
}

/// Global-scope, non-strict evaluation: top-level assignments create globals
pub(crate) fn eval_options() -> EvalOptions {
    let mut options = EvalOptions::default();
    options.global = true;
    options.strict = false;
    options
}
