//! Test helpers for engine tests
//!
//! Each helper runs source in a fresh context so tests stay independent.

use crate::context::Context;
use crate::error::{Error, ScriptFault};
use crate::value::Value;

/// Execute source and return its completion value
pub fn eval(source: &str) -> Value {
    let ctx = Context::new().unwrap();
    match ctx.execute(source) {
        Ok(value) => value,
        Err(e) => panic!("execution failed: {}\nsource: {}", e, source),
    }
}

pub fn eval_num(source: &str) -> f64 {
    eval(source)
        .as_number()
        .unwrap_or_else(|| panic!("expected a number from: {}", source))
}

pub fn eval_str(source: &str) -> String {
    match eval(source) {
        Value::String(s) => s,
        other => panic!("expected a string from {}, got {:?}", source, other),
    }
}

pub fn eval_bool(source: &str) -> bool {
    eval(source)
        .as_bool()
        .unwrap_or_else(|| panic!("expected a boolean from: {}", source))
}

/// Execute source that must fail with an uncaught script error
pub fn eval_fault(source: &str) -> ScriptFault {
    let ctx = Context::new().unwrap();
    match ctx.execute(source) {
        Err(Error::ScriptFault(fault)) => fault,
        Err(other) => panic!("expected a script fault, got {:?}", other),
        Ok(value) => panic!("expected a script fault, got value {:?}", value),
    }
}
