//! Host/script value bridge
//!
//! Embeds a QuickJS JavaScript engine behind a marshaling layer.
//! Host data goes in through [`Context::bind`], script values come back out
//! through descriptor-driven export, and script functions are called from
//! the host (or from other contexts) through [`Callable`].
//!
//! ```
//! use hostbridge_core::Context;
//!
//! let ctx = Context::new().unwrap();
//! ctx.execute("function inc(x) { return x + 1 }").unwrap();
//! let inc = ctx.bridge(&ctx.get("inc").unwrap()).unwrap();
//! let answer: i64 = inc.call1(&41).unwrap();
//! assert_eq!(answer, 42);
//! ```

pub mod bridge;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod host;
pub mod value;

mod engine;

pub use bridge::Callable;
pub use config::Config;
pub use context::{Context, ContextOptions, ContextState, WeakContext};
pub use error::{Error, Location, Result, ScriptFault};
pub use host::{
    from_host, to_host, Described, HostFunction, HostValue, Record, RecordDescriptor, Signature,
    TypeDescriptor,
};
pub use value::{Array, FunctionHandle, Kind, Object, Value};
