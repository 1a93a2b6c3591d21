//! Host functions callable from scripts
//!
//! A [`HostFunction`] is either a native Rust closure or a bridged script
//! function from some context. Both carry a [`Signature`] that drives the
//! conversion of script arguments on the way in.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::trace;

use super::descriptor::{Described, Signature};
use super::to_host::{value_to_host, value_to_host_dynamic};
use super::typed::{from_host, to_host};
use super::{ConvertOptions, HostValue};
use crate::bridge::Callable;
use crate::error::Result;
use crate::value::Value;

type NativeFn = dyn Fn(&mut [HostValue]) -> Result<HostValue> + Send + Sync;

enum Target {
    Native(Box<NativeFn>),
    Bridged(Callable),
}

struct Inner {
    name: String,
    signature: Signature,
    target: Target,
}

/// Cheaply clonable host callable
#[derive(Clone)]
pub struct HostFunction {
    inner: Arc<Inner>,
}

impl HostFunction {
    /// Wrap a closure over raw host values
    ///
    /// The closure receives one slot per declared parameter (missing
    /// arguments are zero-filled) followed by any extra arguments. Slots of
    /// in-out parameters may be overwritten; their final contents are
    /// copied back to the caller.
    pub fn new<F>(name: impl Into<String>, signature: Signature, f: F) -> Self
    where
        F: Fn(&mut [HostValue]) -> Result<HostValue> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                signature,
                target: Target::Native(Box::new(f)),
            }),
        }
    }

    /// Closure taking every argument dynamically converted
    pub fn dynamic<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&[HostValue]) -> Result<HostValue> + Send + Sync + 'static,
    {
        Self::new(name, Signature::dynamic(), move |args| f(args))
    }

    pub fn from_fn0<R, F>(name: impl Into<String>, f: F) -> Self
    where
        R: Serialize + Described,
        F: Fn() -> R + Send + Sync + 'static,
    {
        let signature = Signature::dynamic().returns(R::descriptor());
        Self::new(name, signature, move |_| to_host(&f()))
    }

    pub fn from_fn1<A, R, F>(name: impl Into<String>, f: F) -> Self
    where
        A: DeserializeOwned + Described,
        R: Serialize + Described,
        F: Fn(A) -> R + Send + Sync + 'static,
    {
        let signature = Signature::dynamic()
            .param(A::descriptor())
            .returns(R::descriptor());
        Self::new(name, signature, move |args| {
            let a = from_host(args[0].clone())?;
            to_host(&f(a))
        })
    }

    pub fn from_fn2<A, B, R, F>(name: impl Into<String>, f: F) -> Self
    where
        A: DeserializeOwned + Described,
        B: DeserializeOwned + Described,
        R: Serialize + Described,
        F: Fn(A, B) -> R + Send + Sync + 'static,
    {
        let signature = Signature::dynamic()
            .param(A::descriptor())
            .param(B::descriptor())
            .returns(R::descriptor());
        Self::new(name, signature, move |args| {
            let a = from_host(args[0].clone())?;
            let b = from_host(args[1].clone())?;
            to_host(&f(a, b))
        })
    }

    /// Closure that mutates its single argument in place
    ///
    /// The argument is an in-out parameter: when called from a script, the
    /// caller's object is updated with the closure's changes.
    pub fn from_mut_fn<T, R, F>(name: impl Into<String>, f: F) -> Self
    where
        T: Serialize + DeserializeOwned + Described,
        R: Serialize + Described,
        F: Fn(&mut T) -> R + Send + Sync + 'static,
    {
        let signature = Signature::dynamic()
            .in_out(T::descriptor())
            .returns(R::descriptor());
        Self::new(name, signature, move |args| {
            let mut value: T = from_host(args[0].clone())?;
            let ret = f(&mut value);
            args[0] = to_host(&value)?;
            to_host(&ret)
        })
    }

    pub(crate) fn bridged(callable: Callable) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: callable.name(),
                signature: callable.signature().clone(),
                target: Target::Bridged(callable),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn signature(&self) -> &Signature {
        &self.inner.signature
    }

    pub fn call(&self, args: &[HostValue]) -> Result<HostValue> {
        let mut args = args.to_vec();
        self.call_mut(&mut args)
    }

    /// Call, leaving the final value of in-out arguments in `args`
    pub fn call_mut(&self, args: &mut Vec<HostValue>) -> Result<HostValue> {
        let params = &self.inner.signature.params;
        while args.len() < params.len() {
            args.push(params[args.len()].ty.zero_value());
        }
        match &self.inner.target {
            Target::Native(f) => f(args.as_mut_slice()),
            Target::Bridged(callable) => callable.call_mut(args.as_mut_slice()),
        }
    }

    /// The script function behind a bridged host function
    pub fn as_callable(&self) -> Option<&Callable> {
        match &self.inner.target {
            Target::Bridged(callable) => Some(callable),
            Target::Native(_) => None,
        }
    }

    pub fn ptr_eq(&self, other: &HostFunction) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.inner.target {
            Target::Native(_) => "native",
            Target::Bridged(_) => "bridged",
        };
        f.debug_struct("HostFunction")
            .field("name", &self.inner.name)
            .field("kind", &kind)
            .field("params", &self.inner.signature.params.len())
            .finish()
    }
}

/// Convert script arguments and invoke a host function
///
/// Arguments convert against the declared parameters; extra arguments
/// convert dynamically. Returns the final argument slots, so the caller can
/// write in-out parameters back, together with the result.
pub(crate) fn call_with_values(
    func: &HostFunction,
    args: &[Value],
    opts: &ConvertOptions,
) -> Result<(Vec<HostValue>, HostValue)> {
    let signature = func.signature();
    trace!(function = func.name(), argc = args.len(), "calling host function");

    let mut host_args = Vec::with_capacity(args.len().max(signature.params.len()));
    for (i, param) in signature.params.iter().enumerate() {
        host_args.push(match args.get(i) {
            Some(arg) => value_to_host(arg, &param.ty, opts)?,
            None => param.ty.zero_value(),
        });
    }
    for extra in args.iter().skip(signature.params.len()) {
        host_args.push(value_to_host_dynamic(extra, opts)?);
    }

    let result = func.call_mut(&mut host_args)?;
    Ok((host_args, result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::host::{Record, RecordDescriptor};
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    struct Person {
        name: String,
        age: i64,
    }

    impl Described for Person {
        fn descriptor() -> crate::host::TypeDescriptor {
            RecordDescriptor::new("Person")
                .field::<String>("Name")
                .field::<i64>("Age")
                .into()
        }
    }

    #[test]
    fn test_typed_closure() {
        let add = HostFunction::from_fn2("add", |a: i64, b: i64| a + b);
        assert_eq!(add.signature().params.len(), 2);
        let sum = add.call(&[HostValue::Int(40), HostValue::Int(2)]).unwrap();
        assert_eq!(sum, HostValue::Int(42));
    }

    #[test]
    fn test_missing_arguments_are_zero_filled() {
        let echo = HostFunction::from_fn1("echo", |s: String| format!("[{}]", s));
        assert_eq!(echo.call(&[]).unwrap(), HostValue::from("[]"));
    }

    #[test]
    fn test_mut_fn_updates_argument_slot() {
        let fill = HostFunction::from_mut_fn("fillIn", |p: &mut Person| {
            p.name = "Methusela".into();
            p.age = 969;
        });
        let mut args = vec![HostValue::from(
            Record::new("Person").with("Name", "Dave").with("Age", 44),
        )];
        fill.call_mut(&mut args).unwrap();
        assert_eq!(args[0].field("Name"), Some(&HostValue::from("Methusela")));
        assert_eq!(args[0].field("Age"), Some(&HostValue::Int(969)));
    }

    #[test]
    fn test_native_error_propagates() {
        let fail = HostFunction::dynamic("fail", |_| {
            Err(Error::UnsupportedType("nothing to see".into()))
        });
        assert!(matches!(fail.call(&[]), Err(Error::UnsupportedType(_))));
    }

    #[test]
    fn test_values_convert_against_parameters() {
        let add = HostFunction::from_fn2("add", |a: i64, b: i64| a + b);
        let (args, sum) = call_with_values(
            &add,
            &[Value::from(40.9), Value::from(2), Value::from("extra")],
            &ConvertOptions::default(),
        )
        .unwrap();
        assert_eq!(sum, HostValue::Int(42));
        assert_eq!(args[0], HostValue::Int(40));
        assert_eq!(args[2], HostValue::from("extra"));
    }

    #[test]
    fn test_clones_share_identity() {
        let f = HostFunction::from_fn0("now", || 1u8);
        assert!(f.ptr_eq(&f.clone()));
        assert!(!f.ptr_eq(&HostFunction::from_fn0("now", || 1u8)));
        assert!(f.as_callable().is_none());
    }
}
