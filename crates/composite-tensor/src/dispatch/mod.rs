//! Operation routing for composite proxies.
//!
//! [`dispatch`] is the single entry point. When the active [`OverrideRegistry`] holds an
//! override for the operation, the override receives the call with every argument untouched.
//! Otherwise each composite in the arguments is replaced by its own source component and the
//! call is forwarded to the host's [`HostExecutor`], whose result is returned as is.
//!
//! ```rust,ignore
//! let registry = Arc::new(OverrideRegistry::new());
//! registry.register(ops::CLONE, |call| clone_every_component(call))?;
//! let out = with_registry(registry, || dispatch(&host, ops::CLONE, args, Kwargs::new()))?;
//! ```

pub mod registry;
pub mod runtime;

use std::fmt;

use anyhow::{anyhow, Result};
use tracing::trace;

use crate::proxy::CompositeTensor;
use crate::tree::{unwrap_args, unwrap_kwargs};
use crate::value::{Kwargs, Value};

pub use registry::{
    default_registry, ensure_registrars_loaded, register_override, OverrideFn, OverrideRegistry,
    OverrideRegistryHandle, RegistrationPolicy, OVERRIDE_REGISTRARS,
};
pub use runtime::{
    active_registry, push_registry, scope_depth, scoped_registry, with_registry, RegistryGuard,
};

/// Opaque token naming an operation in the host's execution model (e.g. `"aten::add"`).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct OpKey(&'static str);

impl OpKey {
    pub const fn new(name: &'static str) -> Self {
        OpKey(name)
    }

    /// Returns the string representation of the key.
    /// This is the lookup key inside registries and the name used in log events.
    pub fn as_str(self) -> &'static str {
        self.0
    }
}

impl fmt::Display for OpKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// The host's ordinary execution path for fully unwrapped arguments.
pub trait HostExecutor<T> {
    fn execute(&self, op: OpKey, args: &[Value<T>], kwargs: &Kwargs<T>) -> Result<Value<T>>;
}

impl<T, F> HostExecutor<T> for F
where
    F: Fn(OpKey, &[Value<T>], &Kwargs<T>) -> Result<Value<T>>,
{
    fn execute(&self, op: OpKey, args: &[Value<T>], kwargs: &Kwargs<T>) -> Result<Value<T>> {
        self(op, args, kwargs)
    }
}

/// Invocation handed to an override: the untouched arguments plus the host engine.
pub struct OpCall<'a, T> {
    pub op: OpKey,
    pub args: &'a [Value<T>],
    pub kwargs: &'a Kwargs<T>,
    pub host: &'a dyn HostExecutor<T>,
}

impl<'a, T> OpCall<'a, T> {
    pub fn arg(&self, index: usize) -> Result<&'a Value<T>> {
        self.args.get(index).ok_or_else(|| {
            anyhow!(
                "{} expects at least {} positional arguments, got {}",
                self.op,
                index + 1,
                self.args.len()
            )
        })
    }

    pub fn composite_arg(&self, index: usize) -> Result<&'a CompositeTensor<T>> {
        let value = self.arg(index)?;
        value.as_composite().ok_or_else(|| {
            anyhow!(
                "{} expects a composite at position {}, got {}",
                self.op,
                index,
                value.kind()
            )
        })
    }

    pub fn kwarg(&self, name: &str) -> Option<&'a Value<T>> {
        self.kwargs.get(name)
    }

    /// Runs `op` on the host directly, bypassing the override registry.
    pub fn execute(&self, op: OpKey, args: &[Value<T>], kwargs: &Kwargs<T>) -> Result<Value<T>> {
        self.host.execute(op, args, kwargs)
    }
}

impl<T> OpCall<'_, T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Routes a nested call through [`dispatch`] with the same host engine.
    pub fn redispatch(
        &self,
        op: OpKey,
        args: Vec<Value<T>>,
        kwargs: Kwargs<T>,
    ) -> Result<Value<T>> {
        dispatch(self.host, op, args, kwargs)
    }
}

/// Routes `op` either to its registered override or to the host with composites unwrapped.
///
/// Errors from the override or the host are returned unchanged.
pub fn dispatch<T>(
    host: &dyn HostExecutor<T>,
    op: OpKey,
    args: Vec<Value<T>>,
    kwargs: Kwargs<T>,
) -> Result<Value<T>>
where
    T: Clone + Send + Sync + 'static,
{
    ensure_registrars_loaded();

    let registry = active_registry::<T>();
    if let Some(handler) = registry.get(op) {
        trace!(op = %op, "routing to registered override");
        return handler(OpCall {
            op,
            args: &args,
            kwargs: &kwargs,
            host,
        });
    }

    trace!(op = %op, "no override registered; forwarding source components");
    let args = unwrap_args(args);
    let kwargs = unwrap_kwargs(kwargs);
    host.execute(op, &args, &kwargs)
}
