//! Destination type descriptors
//!
//! A descriptor is passed wherever a script value is converted into a host
//! value. It decides truncation, range checks, which record fields are read
//! and what a missing value becomes.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use super::{HostValue, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntWidth {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
}

impl IntWidth {
    pub fn is_signed(self) -> bool {
        matches!(self, IntWidth::I8 | IntWidth::I16 | IntWidth::I32 | IntWidth::I64)
    }

    /// Representable range as (inclusive min, exclusive max)
    pub(crate) fn bounds(self) -> (f64, f64) {
        match self {
            IntWidth::I8 => (-128.0, 128.0),
            IntWidth::I16 => (-32_768.0, 32_768.0),
            IntWidth::I32 => (-2_147_483_648.0, 2_147_483_648.0),
            IntWidth::I64 => (-9_223_372_036_854_775_808.0, 9_223_372_036_854_775_808.0),
            IntWidth::U8 => (0.0, 256.0),
            IntWidth::U16 => (0.0, 65_536.0),
            IntWidth::U32 => (0.0, 4_294_967_296.0),
            IntWidth::U64 => (0.0, 18_446_744_073_709_551_616.0),
        }
    }
}

impl fmt::Display for IntWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IntWidth::I8 => "i8",
            IntWidth::I16 => "i16",
            IntWidth::I32 => "i32",
            IntWidth::I64 => "i64",
            IntWidth::U8 => "u8",
            IntWidth::U16 => "u16",
            IntWidth::U32 => "u32",
            IntWidth::U64 => "u64",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatWidth {
    F32,
    F64,
}

/* ===================== Type Descriptor ===================== */

#[derive(Debug, Clone, PartialEq)]
pub enum TypeDescriptor {
    /// No constraint: convert dynamically
    Any,
    Bool,
    Int(IntWidth),
    Float(FloatWidth),
    String,
    Optional(Box<TypeDescriptor>),
    Seq(Box<TypeDescriptor>),
    /// String-keyed map with uniform values
    Map(Box<TypeDescriptor>),
    Record(RecordDescriptor),
    Function(Signature),
}

impl TypeDescriptor {
    pub fn optional(inner: TypeDescriptor) -> Self {
        TypeDescriptor::Optional(Box::new(inner))
    }

    pub fn seq(element: TypeDescriptor) -> Self {
        TypeDescriptor::Seq(Box::new(element))
    }

    pub fn map(value: TypeDescriptor) -> Self {
        TypeDescriptor::Map(Box::new(value))
    }

    /// Value a missing field or a null source converts to
    pub fn zero_value(&self) -> HostValue {
        match self {
            TypeDescriptor::Any | TypeDescriptor::Optional(_) | TypeDescriptor::Function(_) => {
                HostValue::Null
            }
            TypeDescriptor::Bool => HostValue::Bool(false),
            TypeDescriptor::Int(width) if width.is_signed() => HostValue::Int(0),
            TypeDescriptor::Int(_) => HostValue::UInt(0),
            TypeDescriptor::Float(_) => HostValue::Float(0.0),
            TypeDescriptor::String => HostValue::String(String::new()),
            TypeDescriptor::Seq(_) => HostValue::Seq(Vec::new()),
            TypeDescriptor::Map(_) => HostValue::Map(BTreeMap::new()),
            TypeDescriptor::Record(desc) => HostValue::Record(Record {
                type_name: Some(desc.name.clone()),
                fields: desc
                    .fields
                    .iter()
                    .map(|f| (f.name.clone(), f.ty.zero_value()))
                    .collect(),
            }),
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Any => f.write_str("any"),
            TypeDescriptor::Bool => f.write_str("bool"),
            TypeDescriptor::Int(width) => write!(f, "{}", width),
            TypeDescriptor::Float(FloatWidth::F32) => f.write_str("f32"),
            TypeDescriptor::Float(FloatWidth::F64) => f.write_str("f64"),
            TypeDescriptor::String => f.write_str("string"),
            TypeDescriptor::Optional(inner) => write!(f, "optional {}", inner),
            TypeDescriptor::Seq(inner) => write!(f, "[{}]", inner),
            TypeDescriptor::Map(inner) => write!(f, "map<string, {}>", inner),
            TypeDescriptor::Record(desc) => write!(f, "record {}", desc.name),
            TypeDescriptor::Function(_) => f.write_str("function"),
        }
    }
}

impl From<RecordDescriptor> for TypeDescriptor {
    fn from(desc: RecordDescriptor) -> Self {
        TypeDescriptor::Record(desc)
    }
}

impl From<Signature> for TypeDescriptor {
    fn from(sig: Signature) -> Self {
        TypeDescriptor::Function(sig)
    }
}

/* ===================== Records ===================== */

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub ty: TypeDescriptor,
}

/// Named record with fields in declaration order
#[derive(Debug, Clone, PartialEq)]
pub struct RecordDescriptor {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
}

impl RecordDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Add a field whose descriptor comes from a host type
    pub fn field<T: Described>(self, name: impl Into<String>) -> Self {
        self.field_with(name, T::descriptor())
    }

    pub fn field_with(mut self, name: impl Into<String>, ty: impl Into<TypeDescriptor>) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.into(),
            ty: ty.into(),
        });
        self
    }
}

/* ===================== Signatures ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParamMode {
    #[default]
    ByValue,
    /// The callee's final value of the argument is copied back to the caller
    InOut,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub ty: TypeDescriptor,
    pub mode: ParamMode,
}

/// Parameter and return descriptors of a function crossing the boundary
///
/// Arguments beyond the declared parameters convert dynamically.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub params: Vec<Param>,
    pub ret: Box<TypeDescriptor>,
}

impl Default for Signature {
    fn default() -> Self {
        Self::dynamic()
    }
}

impl Signature {
    /// No declared parameters; everything converts dynamically
    pub fn dynamic() -> Self {
        Self {
            params: Vec::new(),
            ret: Box::new(TypeDescriptor::Any),
        }
    }

    pub fn param(mut self, ty: impl Into<TypeDescriptor>) -> Self {
        self.params.push(Param {
            ty: ty.into(),
            mode: ParamMode::ByValue,
        });
        self
    }

    pub fn in_out(mut self, ty: impl Into<TypeDescriptor>) -> Self {
        self.params.push(Param {
            ty: ty.into(),
            mode: ParamMode::InOut,
        });
        self
    }

    pub fn returns(mut self, ty: impl Into<TypeDescriptor>) -> Self {
        self.ret = Box::new(ty.into());
        self
    }

    pub fn has_in_out(&self) -> bool {
        self.params.iter().any(|p| p.mode == ParamMode::InOut)
    }
}

/* ===================== Described ===================== */

/// Host types that know their destination descriptor
///
/// Implement it for records with [`RecordDescriptor`]:
///
/// ```
/// use hostbridge_core::host::{Described, RecordDescriptor, TypeDescriptor};
///
/// struct Person { name: String, age: i64 }
///
/// impl Described for Person {
///     fn descriptor() -> TypeDescriptor {
///         RecordDescriptor::new("Person")
///             .field::<String>("Name")
///             .field::<i64>("Age")
///             .into()
///     }
/// }
/// ```
pub trait Described {
    fn descriptor() -> TypeDescriptor;
}

macro_rules! described {
    ($($t:ty => $desc:expr),* $(,)?) => {$(
        impl Described for $t {
            fn descriptor() -> TypeDescriptor {
                $desc
            }
        }
    )*};
}

described! {
    () => TypeDescriptor::Any,
    bool => TypeDescriptor::Bool,
    i8 => TypeDescriptor::Int(IntWidth::I8),
    i16 => TypeDescriptor::Int(IntWidth::I16),
    i32 => TypeDescriptor::Int(IntWidth::I32),
    i64 => TypeDescriptor::Int(IntWidth::I64),
    isize => TypeDescriptor::Int(IntWidth::I64),
    u8 => TypeDescriptor::Int(IntWidth::U8),
    u16 => TypeDescriptor::Int(IntWidth::U16),
    u32 => TypeDescriptor::Int(IntWidth::U32),
    u64 => TypeDescriptor::Int(IntWidth::U64),
    usize => TypeDescriptor::Int(IntWidth::U64),
    f32 => TypeDescriptor::Float(FloatWidth::F32),
    f64 => TypeDescriptor::Float(FloatWidth::F64),
    String => TypeDescriptor::String,
    HostValue => TypeDescriptor::Any,
    serde_json::Value => TypeDescriptor::Any,
}

impl<T: Described> Described for Option<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::optional(T::descriptor())
    }
}

impl<T: Described> Described for Box<T> {
    fn descriptor() -> TypeDescriptor {
        T::descriptor()
    }
}

impl<T: Described> Described for Vec<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::seq(T::descriptor())
    }
}

impl<T: Described> Described for HashMap<String, T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::map(T::descriptor())
    }
}

impl<T: Described> Described for BTreeMap<String, T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::map(T::descriptor())
    }
}
