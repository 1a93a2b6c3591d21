//! Cross-context function bridge
//!
//! A [`Callable`] lets host code (or another context) invoke a script
//! function. Every call upgrades the owning context, enters its engine
//! and marshals arguments and results by copy, so no script object is
//! ever shared between two contexts.

use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::host::{from_host, to_host, Described, HostValue, Param, ParamMode, Signature};
use crate::value::FunctionHandle;

#[derive(Debug, Clone)]
pub struct Callable {
    handle: FunctionHandle,
    signature: Signature,
}

impl Callable {
    /// Bridge with a dynamic signature
    pub fn new(handle: FunctionHandle) -> Self {
        Self::with_signature(handle, Signature::dynamic())
    }

    pub fn with_signature(handle: FunctionHandle, signature: Signature) -> Self {
        Self { handle, signature }
    }

    pub fn name(&self) -> String {
        self.handle.name()
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn handle(&self) -> &FunctionHandle {
        &self.handle
    }

    pub fn owner_id(&self) -> Uuid {
        self.handle.owner_id()
    }

    /// Whether the owning context still exists
    pub fn is_alive(&self) -> bool {
        self.handle.is_alive()
    }

    pub fn call(&self, args: &[HostValue]) -> Result<HostValue> {
        let mut args = args.to_vec();
        self.call_mut(&mut args)
    }

    /// Call, copying in-out arguments back into `args` afterwards
    pub fn call_mut(&self, args: &mut [HostValue]) -> Result<HostValue> {
        self.invoke(args, &self.signature)
    }

    fn invoke(&self, args: &mut [HostValue], signature: &Signature) -> Result<HostValue> {
        let owner = self.handle.owner().ok_or(Error::DanglingContext {
            context: self.owner_id(),
        })?;
        owner.invoke(&self.handle, args, signature)
    }

    /// Call and deserialize the result
    pub fn call_as<R: DeserializeOwned>(&self, args: &[HostValue]) -> Result<R> {
        from_host(self.call(args)?)
    }

    pub fn call1<A, R>(&self, arg: &A) -> Result<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.call_as(&[to_host(arg)?])
    }

    /// Pass `value` as an in-out argument
    ///
    /// Whatever the script function leaves in its first parameter is
    /// converted against `T`'s descriptor and stored back into `value`.
    pub fn call_in_out<T>(&self, value: &mut T) -> Result<HostValue>
    where
        T: Serialize + DeserializeOwned + Described,
    {
        let mut signature = self.signature.clone();
        let param = Param {
            ty: T::descriptor(),
            mode: ParamMode::InOut,
        };
        match signature.params.first_mut() {
            Some(first) => *first = param,
            None => signature.params.push(param),
        }

        let mut args = [to_host(value)?];
        let ret = self.invoke(&mut args, &signature)?;
        let [updated] = args;
        *value = from_host(updated)?;
        Ok(ret)
    }
}
