//! Boundary value representation
//!
//! `Value` is the closed set of kinds that can cross the host/script boundary.
//! Values read out of the engine are snapshots: primitives are plain data,
//! Object and Array are shared host-side handles (cloning a `Value` clones the
//! handle), and functions stay in the engine, referenced through a
//! [`FunctionHandle`] that holds its owning context weakly.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Weak};
use uuid::Uuid;

use crate::context::ContextShared;
use crate::host::HostFunction;

/* ===================== Kinds ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Null,
    Boolean,
    Number,
    String,
    Object,
    Array,
    Function,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Null => "null",
            Kind::Boolean => "boolean",
            Kind::Number => "number",
            Kind::String => "string",
            Kind::Object => "object",
            Kind::Array => "array",
            Kind::Function => "function",
        };
        f.write_str(name)
    }
}

/* ===================== Value ===================== */

/// Runtime value
///
/// Script `undefined` is folded into `Null`.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Object(Object),
    Array(Array),
    Function(FunctionHandle),
}

impl Value {
    pub fn kind(&self) -> Kind {
        match self {
            Value::Null => Kind::Null,
            Value::Bool(_) => Kind::Boolean,
            Value::Number(_) => Kind::Number,
            Value::String(_) => Kind::String,
            Value::Object(_) => Kind::Object,
            Value::Array(_) => Kind::Array,
            Value::Function(_) => Kind::Function,
        }
    }

    /// Result of the script `typeof` operator
    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Null | Value::Object(_) | Value::Array(_) => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Function(_) => "function",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionHandle> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    /// String coercion used by the CLI and for diagnostics
    ///
    /// Arrays join their elements with commas; an array nested inside itself
    /// prints as empty, as in script.
    pub fn to_display_string(&self) -> String {
        let mut out = String::new();
        self.write_display(&mut out, &mut HashSet::new());
        out
    }

    fn write_display(&self, out: &mut String, open: &mut HashSet<usize>) {
        match self {
            Value::Null => out.push_str("null"),
            Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            Value::Number(n) => out.push_str(&format_number(*n)),
            Value::String(s) => out.push_str(s),
            Value::Object(_) => out.push_str("[object Object]"),
            Value::Array(a) => {
                if !open.insert(a.addr()) {
                    return;
                }
                for (i, item) in a.to_vec().iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    if !item.is_null() {
                        item.write_display(out, open);
                    }
                }
                open.remove(&a.addr());
            }
            Value::Function(f) => {
                out.push_str(&format!("function {}() {{ [native code] }}", f.name()))
            }
        }
    }

    /// `===` semantics: primitives by value, handles by identity
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.strict_equals(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Number(n) => write!(f, "Number({})", n),
            Value::String(s) => write!(f, "String({:?})", s),
            Value::Object(o) => write!(f, "Object({:?})", o.keys()),
            Value::Array(a) => write!(f, "Array(len={})", a.len()),
            Value::Function(func) => write!(f, "Function({})", func.name()),
        }
    }
}

/// Format a number the way scripts print it
///
/// Shortest round-trip digits; integral values print without a fraction.
/// Magnitudes of 1e21 and up, or below 1e-6, use exponent notation with a
/// signed exponent.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    let abs = n.abs();
    if abs != 0.0 && !(1e-6..1e21).contains(&abs) {
        let formatted = format!("{:e}", n);
        return match formatted.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{}e+{}", mantissa, exp),
            _ => formatted,
        };
    }
    if n == 0.0 {
        // -0 prints as 0
        return "0".to_string();
    }
    format!("{}", n)
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Object> for Value {
    fn from(o: Object) -> Self {
        Value::Object(o)
    }
}

impl From<Array> for Value {
    fn from(a: Array) -> Self {
        Value::Array(a)
    }
}

/* ===================== Object ===================== */

/// Insertion-ordered property storage
#[derive(Default)]
struct Properties {
    entries: Vec<(String, Value)>,
    index: HashMap<String, usize>,
}

impl Properties {
    fn get(&self, key: &str) -> Option<&Value> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    fn insert(&mut self, key: String, value: Value) {
        match self.index.get(&key) {
            Some(&i) => self.entries[i].1 = value,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
            }
        }
    }
}

/// Shared handle to a script object
///
/// Locks are held only for the duration of a single accessor call.
#[derive(Clone, Default)]
pub struct Object(Arc<Mutex<Properties>>);

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut props = Properties::default();
        for (k, v) in entries {
            props.insert(k, v);
        }
        Object(Arc::new(Mutex::new(props)))
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.lock().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.0.lock().insert(key.into(), value);
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.lock().index.contains_key(key)
    }

    /// Keys in insertion order
    pub fn keys(&self) -> Vec<String> {
        self.0.lock().entries.iter().map(|(k, _)| k.clone()).collect()
    }

    /// Entries in insertion order
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.0.lock().entries.clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ptr_eq(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Object").field(&self.keys()).finish()
    }
}

/* ===================== Array ===================== */

/// Shared handle to a script array
#[derive(Clone, Default)]
pub struct Array(Arc<Mutex<Vec<Value>>>);

impl Array {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(values: Vec<Value>) -> Self {
        Array(Arc::new(Mutex::new(values)))
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.lock().get(index).cloned()
    }

    /// Set an element, padding with nulls when writing past the end
    pub fn set(&self, index: usize, value: Value) {
        let mut items = self.0.lock();
        if index >= items.len() {
            items.resize(index + 1, Value::Null);
        }
        items[index] = value;
    }

    pub fn push(&self, value: Value) -> usize {
        let mut items = self.0.lock();
        items.push(value);
        items.len()
    }

    pub fn pop(&self) -> Option<Value> {
        self.0.lock().pop()
    }

    pub fn truncate(&self, len: usize) {
        self.0.lock().truncate(len);
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the current elements
    pub fn to_vec(&self) -> Vec<Value> {
        self.0.lock().clone()
    }

    pub fn ptr_eq(&self, other: &Array) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Array(len={})", self.len())
    }
}

/* ===================== Functions ===================== */

/// What a function value refers to
pub(crate) enum FunctionKind {
    /// Script function kept alive in its owner's handle table
    Script(ScriptSlot),
    /// Host closure or bridged callable, installed into an engine on use
    Host(HostFunction),
}

/// Handle table entry; released when the last handle to it drops
pub(crate) struct ScriptSlot {
    pub id: u64,
    pub name: String,
    owner: Weak<ContextShared>,
}

impl Drop for ScriptSlot {
    fn drop(&mut self) {
        if let Some(owner) = self.owner.upgrade() {
            owner.release_handle(self.id);
        }
    }
}

/// Opaque callable handle bound to its owning context
///
/// The owner is held weakly; invoking a handle whose context has been
/// dropped fails with `Error::DanglingContext`.
#[derive(Clone)]
pub struct FunctionHandle {
    owner: Weak<ContextShared>,
    owner_id: Uuid,
    kind: Arc<FunctionKind>,
}

impl FunctionHandle {
    pub(crate) fn host(owner: &Arc<ContextShared>, func: HostFunction) -> Self {
        Self {
            owner: Arc::downgrade(owner),
            owner_id: owner.id,
            kind: Arc::new(FunctionKind::Host(func)),
        }
    }

    pub(crate) fn script(owner: &Arc<ContextShared>, id: u64, name: String) -> Self {
        let slot = ScriptSlot {
            id,
            name,
            owner: Arc::downgrade(owner),
        };
        Self {
            owner: Arc::downgrade(owner),
            owner_id: owner.id,
            kind: Arc::new(FunctionKind::Script(slot)),
        }
    }

    pub fn name(&self) -> String {
        match self.kind.as_ref() {
            FunctionKind::Script(slot) => slot.name.clone(),
            FunctionKind::Host(f) => f.name().to_string(),
        }
    }

    /// Id of the context this function belongs to
    pub fn owner_id(&self) -> Uuid {
        self.owner_id
    }

    pub fn is_alive(&self) -> bool {
        self.owner.strong_count() > 0
    }

    pub(crate) fn owner(&self) -> Option<Arc<ContextShared>> {
        self.owner.upgrade()
    }

    pub(crate) fn kind(&self) -> &FunctionKind {
        &self.kind
    }

    pub fn ptr_eq(&self, other: &FunctionHandle) -> bool {
        Arc::ptr_eq(&self.kind, &other.kind)
    }
}

impl fmt::Debug for FunctionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionHandle")
            .field("name", &self.name())
            .field("owner", &self.owner_id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(42.0), "42");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(1.5), "1.5");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(format_number(123456789012.0), "123456789012");
        assert_eq!(format_number(2f64.powi(60)), "1152921504606847000");
    }

    #[test]
    fn test_format_number_uses_exponent_at_extremes() {
        assert_eq!(format_number(1e21), "1e+21");
        assert_eq!(format_number(-2.5e22), "-2.5e+22");
        assert_eq!(format_number(1e300), "1e+300");
        assert_eq!(format_number(999999999999999900000.0), "999999999999999900000");
        assert_eq!(format_number(0.000001), "0.000001");
        assert_eq!(format_number(1e-7), "1e-7");
        assert_eq!(format_number(1.5e-10), "1.5e-10");
    }

    #[test]
    fn test_object_preserves_insertion_order() {
        let obj = Object::new();
        obj.set("zebra", Value::from(1));
        obj.set("apple", Value::from(2));
        obj.set("mango", Value::from(3));
        obj.set("zebra", Value::from(4));

        assert_eq!(obj.keys(), vec!["zebra", "apple", "mango"]);
        assert_eq!(obj.get("zebra"), Some(Value::Number(4.0)));
        assert_eq!(obj.len(), 3);
    }

    #[test]
    fn test_handles_share_contents() {
        let obj = Object::new();
        let alias = Value::Object(obj.clone());
        obj.set("Name", Value::from("Dave"));

        let Value::Object(seen) = alias else {
            unreachable!("alias is an object");
        };
        assert_eq!(seen.get("Name"), Some(Value::from("Dave")));
        assert!(seen.ptr_eq(&obj));
    }

    #[test]
    fn test_strict_equality_uses_identity_for_objects() {
        let a = Value::Object(Object::new());
        let b = Value::Object(Object::new());
        assert!(a.strict_equals(&a.clone()));
        assert!(!a.strict_equals(&b));
    }

    #[test]
    fn test_array_set_pads_with_null() {
        let arr = Array::new();
        arr.set(2, Value::from("c"));
        assert_eq!(arr.len(), 3);
        assert_eq!(arr.get(0), Some(Value::Null));
        assert_eq!(Value::Array(arr).to_display_string(), ",,c");
    }

    #[test]
    fn test_display_of_self_containing_array_is_linear() {
        let arr = Array::from_vec(vec![Value::from(1)]);
        for _ in 0..40 {
            arr.push(Value::Array(arr.clone()));
        }
        let shown = Value::Array(arr.clone()).to_display_string();
        assert_eq!(shown, format!("1{}", ",".repeat(40)));

        let outer = Array::from_vec(vec![Value::Array(arr), Value::from("x")]);
        assert_eq!(
            Value::Array(outer).to_display_string(),
            format!("1{},x", ",".repeat(40))
        );
    }

    #[test]
    fn test_display_repeats_shared_arrays() {
        let inner = Array::from_vec(vec![Value::from("a"), Value::from("b")]);
        let outer = Array::from_vec(vec![Value::Array(inner.clone()), Value::Array(inner)]);
        assert_eq!(Value::Array(outer).to_display_string(), "a,b,a,b");
    }
}
