//! Host-side values and the converters between them and script values
//!
//! [`HostValue`] is the host's view of data crossing the boundary. Typed
//! Rust data reaches it through serde (`to_host` / `from_host`), and
//! [`TypeDescriptor`]s describe the destination shape when converting
//! script values back.

pub mod descriptor;
pub mod function;
pub mod to_host;
pub mod to_script;
pub mod typed;

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub use descriptor::{
    Described, FieldDescriptor, FloatWidth, IntWidth, Param, ParamMode, RecordDescriptor,
    Signature, TypeDescriptor,
};
pub use function::HostFunction;
pub use typed::{from_host, to_host};

/// Limits applied while walking nested values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvertOptions {
    pub max_depth: usize,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self { max_depth: 128 }
    }
}

/* ===================== Records ===================== */

/// A struct-like value: fields in declaration order
///
/// Records exported from dynamic script objects carry no type name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    pub type_name: Option<String>,
    pub fields: Vec<(String, HostValue)>,
}

impl Record {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: Some(type_name.into()),
            fields: Vec::new(),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Builder form of [`Record::set`]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<HostValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&HostValue> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut HostValue> {
        self.fields
            .iter_mut()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    /// Set a field, keeping its position if it already exists
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<HostValue>) {
        let name = name.into();
        let value = value.into();
        match self.get_mut(&name) {
            Some(slot) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }
}

/* ===================== Host Values ===================== */

/// Data on the host side of the boundary
#[derive(Clone, Default)]
pub enum HostValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    Seq(Vec<HostValue>),
    Record(Record),
    Map(BTreeMap<String, HostValue>),
    Function(HostFunction),
    /// Raw host resource; cannot be represented in a script
    Opaque(Arc<dyn Any + Send + Sync>),
}

impl HostValue {
    pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
        HostValue::Opaque(Arc::new(value))
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            HostValue::Null => "null",
            HostValue::Bool(_) => "bool",
            HostValue::Int(_) => "int",
            HostValue::UInt(_) => "uint",
            HostValue::Float(_) => "float",
            HostValue::String(_) => "string",
            HostValue::Seq(_) => "seq",
            HostValue::Record(_) => "record",
            HostValue::Map(_) => "map",
            HostValue::Function(_) => "function",
            HostValue::Opaque(_) => "opaque",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, HostValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HostValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            HostValue::Int(i) => Some(*i),
            HostValue::UInt(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HostValue::Int(i) => Some(*i as f64),
            HostValue::UInt(u) => Some(*u as f64),
            HostValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[HostValue]> {
        match self {
            HostValue::Seq(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            HostValue::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&HostFunction> {
        match self {
            HostValue::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Field of a record or entry of a map
    pub fn field(&self, name: &str) -> Option<&HostValue> {
        match self {
            HostValue::Record(r) => r.get(name),
            HostValue::Map(m) => m.get(name),
            _ => None,
        }
    }
}

impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (HostValue::Null, HostValue::Null) => true,
            (HostValue::Bool(a), HostValue::Bool(b)) => a == b,
            (HostValue::Int(a), HostValue::Int(b)) => a == b,
            (HostValue::UInt(a), HostValue::UInt(b)) => a == b,
            (HostValue::Float(a), HostValue::Float(b)) => a == b,
            (HostValue::String(a), HostValue::String(b)) => a == b,
            (HostValue::Seq(a), HostValue::Seq(b)) => a == b,
            (HostValue::Record(a), HostValue::Record(b)) => a == b,
            (HostValue::Map(a), HostValue::Map(b)) => a == b,
            (HostValue::Function(a), HostValue::Function(b)) => a.ptr_eq(b),
            (HostValue::Opaque(a), HostValue::Opaque(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Null => f.write_str("Null"),
            HostValue::Bool(b) => write!(f, "Bool({})", b),
            HostValue::Int(i) => write!(f, "Int({})", i),
            HostValue::UInt(u) => write!(f, "UInt({})", u),
            HostValue::Float(x) => write!(f, "Float({})", x),
            HostValue::String(s) => write!(f, "String({:?})", s),
            HostValue::Seq(items) => f.debug_tuple("Seq").field(items).finish(),
            HostValue::Record(r) => {
                let mut s = f.debug_struct(r.type_name.as_deref().unwrap_or("Record"));
                for (k, v) in &r.fields {
                    s.field(k, v);
                }
                s.finish()
            }
            HostValue::Map(m) => f.debug_tuple("Map").field(m).finish(),
            HostValue::Function(func) => write!(f, "Function({})", func.name()),
            HostValue::Opaque(_) => f.write_str("Opaque(..)"),
        }
    }
}

/* ===================== Conversions ===================== */

impl From<()> for HostValue {
    fn from(_: ()) -> Self {
        HostValue::Null
    }
}

impl From<bool> for HostValue {
    fn from(b: bool) -> Self {
        HostValue::Bool(b)
    }
}

macro_rules! from_signed {
    ($($t:ty),*) => {$(
        impl From<$t> for HostValue {
            fn from(n: $t) -> Self {
                HostValue::Int(n as i64)
            }
        }
    )*};
}

macro_rules! from_unsigned {
    ($($t:ty),*) => {$(
        impl From<$t> for HostValue {
            fn from(n: $t) -> Self {
                HostValue::UInt(n as u64)
            }
        }
    )*};
}

from_signed!(i8, i16, i32, i64, isize);
from_unsigned!(u8, u16, u32, u64, usize);

impl From<f32> for HostValue {
    fn from(n: f32) -> Self {
        HostValue::Float(n as f64)
    }
}

impl From<f64> for HostValue {
    fn from(n: f64) -> Self {
        HostValue::Float(n)
    }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        HostValue::String(s.to_string())
    }
}

impl From<String> for HostValue {
    fn from(s: String) -> Self {
        HostValue::String(s)
    }
}

impl<T: Into<HostValue>> From<Vec<T>> for HostValue {
    fn from(items: Vec<T>) -> Self {
        HostValue::Seq(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<HostValue>> From<Option<T>> for HostValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(HostValue::Null)
    }
}

impl<T: Into<HostValue>> From<BTreeMap<String, T>> for HostValue {
    fn from(entries: BTreeMap<String, T>) -> Self {
        HostValue::Map(entries.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl From<Record> for HostValue {
    fn from(r: Record) -> Self {
        HostValue::Record(r)
    }
}

impl From<HostFunction> for HostValue {
    fn from(f: HostFunction) -> Self {
        HostValue::Function(f)
    }
}

impl From<crate::bridge::Callable> for HostValue {
    fn from(c: crate::bridge::Callable) -> Self {
        HostValue::Function(HostFunction::bridged(c))
    }
}
