//! Script-to-host conversion
//!
//! Walks a script value against a destination descriptor. Every step down
//! extends a JSONPath-like location (`$.Person.Age`, `$[1]`) used in errors.

use tracing::trace;

use super::descriptor::{FloatWidth, IntWidth, RecordDescriptor, TypeDescriptor};
use super::function::HostFunction;
use super::{ConvertOptions, HostValue, Record};
use crate::bridge::Callable;
use crate::error::{Error, Result};
use crate::value::{Object, Value};

/// Largest magnitude at which every integer is exactly representable in f64
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Convert a script value into the host shape described by `target`
pub fn value_to_host(
    value: &Value,
    target: &TypeDescriptor,
    opts: &ConvertOptions,
) -> Result<HostValue> {
    Exporter { opts }.convert(value, target, "$", 0)
}

/// Convert without a destination: the natural host shape of each kind
pub fn value_to_host_dynamic(value: &Value, opts: &ConvertOptions) -> Result<HostValue> {
    value_to_host(value, &TypeDescriptor::Any, opts)
}

struct Exporter<'a> {
    opts: &'a ConvertOptions,
}

impl Exporter<'_> {
    fn convert(
        &self,
        value: &Value,
        target: &TypeDescriptor,
        path: &str,
        depth: usize,
    ) -> Result<HostValue> {
        if depth > self.opts.max_depth {
            return Err(Error::DepthLimit {
                limit: self.opts.max_depth,
                path: path.to_string(),
            });
        }

        match (target, value) {
            (TypeDescriptor::Optional(_), Value::Null) => Ok(HostValue::Null),
            (TypeDescriptor::Optional(inner), _) => self.convert(value, inner, path, depth),
            (TypeDescriptor::Any, _) => self.dynamic(value, path, depth),

            // null fills non-optional destinations with their zero value
            (_, Value::Null) => Ok(target.zero_value()),

            (TypeDescriptor::Bool, Value::Bool(b)) => Ok(HostValue::Bool(*b)),
            (TypeDescriptor::Int(width), Value::Number(n)) => number_to_int(*n, *width, path),
            (TypeDescriptor::Float(width), Value::Number(n)) => number_to_float(*n, *width, path),
            (TypeDescriptor::String, Value::String(s)) => Ok(HostValue::String(s.clone())),

            (TypeDescriptor::Seq(element), Value::Array(arr)) => arr
                .to_vec()
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    self.convert(item, element, &format!("{}[{}]", path, i), depth + 1)
                })
                .collect::<Result<Vec<_>>>()
                .map(HostValue::Seq),

            (TypeDescriptor::Map(element), Value::Object(obj)) => obj
                .entries()
                .iter()
                .map(|(key, item)| -> Result<(String, HostValue)> {
                    let converted =
                        self.convert(item, element, &format!("{}.{}", path, key), depth + 1)?;
                    Ok((key.clone(), converted))
                })
                .collect::<Result<_>>()
                .map(HostValue::Map),

            (TypeDescriptor::Record(desc), Value::Object(obj)) => {
                self.record(obj, desc, path, depth)
            }

            (TypeDescriptor::Function(sig), Value::Function(handle)) => {
                Ok(HostValue::Function(HostFunction::bridged(
                    Callable::with_signature(handle.clone(), sig.clone()),
                )))
            }

            (target, value) => Err(Error::type_mismatch(path, target, value.kind())),
        }
    }

    /// Fields are read by declared name; absent fields take their zero value
    fn record(
        &self,
        obj: &Object,
        desc: &RecordDescriptor,
        path: &str,
        depth: usize,
    ) -> Result<HostValue> {
        let mut fields = Vec::with_capacity(desc.fields.len());
        for field in &desc.fields {
            let value = match obj.get(&field.name) {
                Some(value) => {
                    let field_path = format!("{}.{}", path, field.name);
                    self.convert(&value, &field.ty, &field_path, depth + 1)?
                }
                None => {
                    trace!(path, field = %field.name, "missing field takes zero value");
                    field.ty.zero_value()
                }
            };
            fields.push((field.name.clone(), value));
        }
        Ok(HostValue::Record(Record {
            type_name: Some(desc.name.clone()),
            fields,
        }))
    }

    fn dynamic(&self, value: &Value, path: &str, depth: usize) -> Result<HostValue> {
        Ok(match value {
            Value::Null => HostValue::Null,
            Value::Bool(b) => HostValue::Bool(*b),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
                    HostValue::Int(*n as i64)
                } else {
                    HostValue::Float(*n)
                }
            }
            Value::String(s) => HostValue::String(s.clone()),
            Value::Array(arr) => HostValue::Seq(
                arr.to_vec()
                    .iter()
                    .enumerate()
                    .map(|(i, item)| {
                        let child = format!("{}[{}]", path, i);
                        self.convert(item, &TypeDescriptor::Any, &child, depth + 1)
                    })
                    .collect::<Result<_>>()?,
            ),
            Value::Object(obj) => HostValue::Record(Record {
                type_name: None,
                fields: obj
                    .entries()
                    .iter()
                    .map(|(key, item)| -> Result<(String, HostValue)> {
                        let child = format!("{}.{}", path, key);
                        let converted = self.convert(item, &TypeDescriptor::Any, &child, depth + 1)?;
                        Ok((key.clone(), converted))
                    })
                    .collect::<Result<_>>()?,
            }),
            Value::Function(handle) => {
                HostValue::Function(HostFunction::bridged(Callable::new(handle.clone())))
            }
        })
    }
}

/// Truncate toward zero, rejecting values the width cannot hold
fn number_to_int(n: f64, width: IntWidth, path: &str) -> Result<HostValue> {
    if !n.is_finite() {
        return Err(Error::range(path, format!("cannot convert {} to {}", n, width)));
    }
    let truncated = n.trunc();
    let (min, max) = width.bounds();
    if truncated < min || truncated >= max {
        return Err(Error::range(path, format!("{} is out of range for {}", n, width)));
    }
    Ok(if width.is_signed() {
        HostValue::Int(truncated as i64)
    } else {
        HostValue::UInt(truncated as u64)
    })
}

fn number_to_float(n: f64, width: FloatWidth, path: &str) -> Result<HostValue> {
    match width {
        FloatWidth::F64 => Ok(HostValue::Float(n)),
        FloatWidth::F32 => {
            if n.is_finite() && n.abs() > f32::MAX as f64 {
                return Err(Error::range(path, format!("{} overflows f32", n)));
            }
            Ok(HostValue::Float(n as f32 as f64))
        }
    }
}
