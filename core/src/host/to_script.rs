//! Host-to-script conversion
//!
//! Imports always build fresh values. Updating an existing script object
//! from host data (in-out parameters) happens inside the engine, which
//! calls back into [`import_at`] for every field it replaces.

use std::sync::Arc;

use super::{ConvertOptions, HostValue};
use crate::context::{Context, ContextShared};
use crate::error::{Error, Result};
use crate::value::{Array, FunctionHandle, Object, Value};

/// Convert a host value into a script value owned by `ctx`
pub fn host_to_value(ctx: &Context, host: &HostValue) -> Result<Value> {
    let shared = ctx.shared();
    import(shared, host, &shared.convert_options())
}

pub(crate) fn import(
    shared: &Arc<ContextShared>,
    host: &HostValue,
    opts: &ConvertOptions,
) -> Result<Value> {
    import_at(shared, host, opts, "$", 0)
}

/// Import a value found at `path`, `depth` levels below the root
pub(crate) fn import_at(
    shared: &Arc<ContextShared>,
    host: &HostValue,
    opts: &ConvertOptions,
    path: &str,
    depth: usize,
) -> Result<Value> {
    Importer { shared, opts }.convert(host, path, depth)
}

struct Importer<'a> {
    shared: &'a Arc<ContextShared>,
    opts: &'a ConvertOptions,
}

impl Importer<'_> {
    fn check_depth(&self, path: &str, depth: usize) -> Result<()> {
        if depth > self.opts.max_depth {
            return Err(Error::DepthLimit {
                limit: self.opts.max_depth,
                path: path.to_string(),
            });
        }
        Ok(())
    }

    fn convert(&self, host: &HostValue, path: &str, depth: usize) -> Result<Value> {
        self.check_depth(path, depth)?;

        Ok(match host {
            HostValue::Null => Value::Null,
            HostValue::Bool(b) => Value::Bool(*b),
            HostValue::Int(i) => Value::Number(*i as f64),
            HostValue::UInt(u) => Value::Number(*u as f64),
            HostValue::Float(f) => Value::Number(*f),
            HostValue::String(s) => Value::String(s.clone()),
            HostValue::Seq(items) => Value::Array(Array::from_vec(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| self.convert(item, &format!("{}[{}]", path, i), depth + 1))
                    .collect::<Result<_>>()?,
            )),
            HostValue::Record(record) => Value::Object(self.entries(
                record.fields.iter().map(|(k, v)| (k.as_str(), v)),
                path,
                depth,
            )?),
            HostValue::Map(entries) => Value::Object(self.entries(
                entries.iter().map(|(k, v)| (k.as_str(), v)),
                path,
                depth,
            )?),
            HostValue::Function(func) => {
                // a bridged script function returning home is the original function
                if let Some(callable) = func.as_callable() {
                    if callable.owner_id() == self.shared.id {
                        return Ok(Value::Function(callable.handle().clone()));
                    }
                }
                Value::Function(FunctionHandle::host(self.shared, func.clone()))
            }
            HostValue::Opaque(_) => {
                return Err(Error::UnsupportedType(format!(
                    "opaque host resource at {} has no script representation",
                    path
                )))
            }
        })
    }

    fn entries<'v>(
        &self,
        entries: impl Iterator<Item = (&'v str, &'v HostValue)>,
        path: &str,
        depth: usize,
    ) -> Result<Object> {
        let obj = Object::new();
        for (key, value) in entries {
            let child = format!("{}.{}", path, key);
            obj.set(key, self.convert(value, &child, depth + 1)?);
        }
        Ok(obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextOptions;
    use crate::host::{HostFunction, Record};
    use maplit::btreemap;

    #[test]
    fn test_record_keeps_field_order() {
        let ctx = Context::new().unwrap();
        let record = Record::new("Person").with("Name", "Lemmy").with("Age", 70);
        let value = host_to_value(&ctx, &record.into()).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj.keys(), vec!["Name", "Age"]);
        assert_eq!(obj.get("Age"), Some(Value::from(70)));
    }

    #[test]
    fn test_map_becomes_object() {
        let ctx = Context::new().unwrap();
        let map = HostValue::Map(btreemap! {
            "b".to_string() => HostValue::Bool(true),
            "a".to_string() => HostValue::UInt(7),
        });
        let value = host_to_value(&ctx, &map).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj.get("a").and_then(|v| v.as_number()), Some(7.0));
        assert_eq!(obj.get("b").and_then(|v| v.as_bool()), Some(true));
    }

    #[test]
    fn test_opaque_is_unsupported() {
        let ctx = Context::new().unwrap();
        let host = Record::anonymous().with("handle", HostValue::opaque(5u32));
        match host_to_value(&ctx, &host.into()) {
            Err(Error::UnsupportedType(message)) => assert!(message.contains("$.handle")),
            other => panic!("expected unsupported type, got {:?}", other),
        }
    }

    #[test]
    fn test_depth_limit() {
        let ctx = Context::with_options(ContextOptions {
            max_depth: 2,
            ..ContextOptions::default()
        })
        .unwrap();
        let nested = HostValue::Seq(vec![HostValue::Seq(vec![HostValue::Seq(vec![
            HostValue::Seq(vec![]),
        ])])]);
        match host_to_value(&ctx, &nested) {
            Err(Error::DepthLimit { limit, path }) => {
                assert_eq!(limit, 2);
                assert_eq!(path, "$[0][0][0]");
            }
            other => panic!("expected depth limit, got {:?}", other),
        }
    }

    #[test]
    fn test_host_function_is_owned_by_target() {
        let ctx = Context::new().unwrap();
        let func = HostFunction::dynamic("two", |_| Ok(HostValue::Int(2)));
        let value = host_to_value(&ctx, &func.into()).unwrap();
        let handle = value.as_function().unwrap();
        assert_eq!(handle.owner_id(), ctx.id());
        assert_eq!(handle.name(), "two");
    }
}
