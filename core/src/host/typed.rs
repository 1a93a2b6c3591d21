//! Typed Rust data to and from host values through serde
//!
//! `serde_json` is the intermediate form; with `preserve_order` enabled,
//! struct fields keep their declaration order.

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{HostValue, Record};
use crate::error::{Error, Result};

/// Serialize any serde type into a host value
pub fn to_host<T: Serialize + ?Sized>(value: &T) -> Result<HostValue> {
    let json = serde_json::to_value(value)
        .map_err(|e| Error::UnsupportedType(format!("cannot serialize host value: {}", e)))?;
    Ok(HostValue::from_json(json))
}

/// Deserialize a host value into a serde type
pub fn from_host<T: DeserializeOwned>(value: HostValue) -> Result<T> {
    let json = value.to_json("$")?;
    serde_json::from_value(json)
        .map_err(|e| Error::type_mismatch("$", std::any::type_name::<T>(), e))
}

impl HostValue {
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => HostValue::Null,
            serde_json::Value::Bool(b) => HostValue::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    HostValue::Int(i)
                } else if let Some(u) = n.as_u64() {
                    HostValue::UInt(u)
                } else {
                    HostValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => HostValue::String(s),
            serde_json::Value::Array(items) => {
                HostValue::Seq(items.into_iter().map(HostValue::from_json).collect())
            }
            serde_json::Value::Object(map) => HostValue::Record(Record {
                type_name: None,
                fields: map
                    .into_iter()
                    .map(|(k, v)| (k, HostValue::from_json(v)))
                    .collect(),
            }),
        }
    }

    /// JSON form of this value; functions and opaque handles have none
    pub fn to_json(&self, path: &str) -> Result<serde_json::Value> {
        Ok(match self {
            HostValue::Null => serde_json::Value::Null,
            HostValue::Bool(b) => serde_json::Value::Bool(*b),
            HostValue::Int(i) => serde_json::Value::from(*i),
            HostValue::UInt(u) => serde_json::Value::from(*u),
            HostValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .ok_or_else(|| Error::range(path, format!("{} has no JSON representation", f)))?,
            HostValue::String(s) => serde_json::Value::String(s.clone()),
            HostValue::Seq(items) => serde_json::Value::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| item.to_json(&format!("{}[{}]", path, i)))
                    .collect::<Result<_>>()?,
            ),
            HostValue::Record(record) => {
                let mut map = serde_json::Map::new();
                for (key, value) in &record.fields {
                    map.insert(key.clone(), value.to_json(&format!("{}.{}", path, key))?);
                }
                serde_json::Value::Object(map)
            }
            HostValue::Map(entries) => {
                let mut map = serde_json::Map::new();
                for (key, value) in entries {
                    map.insert(key.clone(), value.to_json(&format!("{}.{}", path, key))?);
                }
                serde_json::Value::Object(map)
            }
            HostValue::Function(_) | HostValue::Opaque(_) => {
                return Err(Error::UnsupportedType(format!(
                    "{} value at {} cannot be serialized",
                    self.kind_name(),
                    path
                )))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::hashmap;
    use serde::Deserialize;
    use std::collections::HashMap;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    struct Person {
        name: String,
        age: i64,
    }

    #[test]
    fn test_struct_becomes_record_in_field_order() {
        let host = to_host(&Person {
            name: "Lemmy".into(),
            age: 70,
        })
        .unwrap();
        let record = host.as_record().unwrap();
        let names: Vec<_> = record.fields.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, vec!["Name", "Age"]);
        assert_eq!(record.get("Age"), Some(&HostValue::Int(70)));
    }

    #[test]
    fn test_round_trip_through_host_value() {
        let people = vec![
            Person {
                name: "Lemmy".into(),
                age: 70,
            },
            Person {
                name: "Ozzy".into(),
                age: 73,
            },
        ];
        let back: Vec<Person> = from_host(to_host(&people).unwrap()).unwrap();
        assert_eq!(back, people);
    }

    #[test]
    fn test_string_keyed_maps() {
        let scores = hashmap! { "a".to_string() => 1u32, "b".to_string() => 2u32 };
        let back: HashMap<String, u32> = from_host(to_host(&scores).unwrap()).unwrap();
        assert_eq!(back, scores);
    }

    #[test]
    fn test_non_string_keys_are_unsupported() {
        let mut odd = HashMap::new();
        odd.insert((1, 2), "pair");
        let err = to_host(&odd).unwrap_err();
        assert!(matches!(err, Error::UnsupportedType(_)));
    }

    #[test]
    fn test_wrong_shape_is_type_mismatch() {
        let err = from_host::<Person>(HostValue::from("nope")).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }

    #[test]
    fn test_non_finite_float_has_no_json_form() {
        let err = HostValue::Float(f64::INFINITY).to_json("$").unwrap_err();
        assert!(matches!(err, Error::RangeError { .. }));
    }
}
