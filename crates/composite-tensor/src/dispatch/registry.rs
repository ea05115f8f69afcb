//! Override tables keyed by operation identity.
//!
//! Each host tensor type owns one process-wide default registry, created empty on first use.
//! External code extends it with [`register_override`] or by contributing a registrar to
//! [`OVERRIDE_REGISTRARS`]; registrars run once, before the first dispatch in the process.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::panic;
use std::sync::{Arc, Mutex, Once, OnceLock, PoisonError, RwLock};

use anyhow::Result;
use tracing::{debug, warn};

use super::{OpCall, OpKey};
use crate::error::{ProxyError, ProxyResult};
use crate::value::Value;

/// Override body. It receives the call with composites intact.
pub type OverrideFn<T> = Arc<dyn Fn(OpCall<'_, T>) -> Result<Value<T>> + Send + Sync>;

/// Shared pointer to an override registry.
pub type OverrideRegistryHandle<T> = Arc<OverrideRegistry<T>>;

/// What happens when an operation that already has an override is registered again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegistrationPolicy {
    /// Last write wins.
    #[default]
    Overwrite,
    /// Re-registration fails with [`ProxyError::DuplicateOverride`].
    Strict,
}

impl RegistrationPolicy {
    /// Policy for default registries, controlled by `COMPOSITE_TENSOR_STRICT_OVERRIDES`.
    pub fn from_env() -> Self {
        if crate::env::strict_overrides_enabled() {
            RegistrationPolicy::Strict
        } else {
            RegistrationPolicy::Overwrite
        }
    }
}

/// Mapping from operation identity to override function.
pub struct OverrideRegistry<T> {
    overrides: RwLock<HashMap<OpKey, OverrideFn<T>>>,
    policy: RegistrationPolicy,
}

impl<T> OverrideRegistry<T> {
    /// Creates an empty registry that overwrites on re-registration.
    pub fn new() -> Self {
        Self::with_policy(RegistrationPolicy::Overwrite)
    }

    pub fn with_policy(policy: RegistrationPolicy) -> Self {
        OverrideRegistry {
            overrides: RwLock::new(HashMap::new()),
            policy,
        }
    }

    pub fn policy(&self) -> RegistrationPolicy {
        self.policy
    }

    /// Installs `handler` as the override for `op`.
    pub fn register<F>(&self, op: OpKey, handler: F) -> ProxyResult<()>
    where
        F: Fn(OpCall<'_, T>) -> Result<Value<T>> + Send + Sync + 'static,
    {
        self.register_fn(op, Arc::new(handler))
    }

    pub fn register_fn(&self, op: OpKey, handler: OverrideFn<T>) -> ProxyResult<()> {
        let mut overrides = self
            .overrides
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if overrides.contains_key(&op) {
            match self.policy {
                RegistrationPolicy::Strict => {
                    return Err(ProxyError::DuplicateOverride { op: op.as_str() })
                }
                RegistrationPolicy::Overwrite => debug!(op = %op, "replacing registered override"),
            }
        } else {
            debug!(op = %op, "registering override");
        }
        overrides.insert(op, handler);
        Ok(())
    }

    /// Returns the override for `op` without holding the lock past the call.
    pub fn get(&self, op: OpKey) -> Option<OverrideFn<T>> {
        self.overrides
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&op)
            .cloned()
    }

    pub fn contains(&self, op: OpKey) -> bool {
        self.overrides
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&op)
    }

    pub fn remove(&self, op: OpKey) -> Option<OverrideFn<T>> {
        self.overrides
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&op)
    }

    pub fn len(&self) -> usize {
        self.overrides
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered operations, sorted by name.
    pub fn ops(&self) -> Vec<OpKey> {
        let mut ops: Vec<OpKey> = self
            .overrides
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        ops.sort();
        ops
    }
}

impl<T> Default for OverrideRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for OverrideRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverrideRegistry")
            .field("policy", &self.policy)
            .field("ops", &self.ops())
            .finish()
    }
}

static DEFAULT_REGISTRIES: OnceLock<Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>> =
    OnceLock::new();

/// The module-level registry consulted for `T` when no scope has installed another.
pub fn default_registry<T: Send + Sync + 'static>() -> OverrideRegistryHandle<T> {
    let registries = DEFAULT_REGISTRIES.get_or_init(|| Mutex::new(HashMap::new()));
    let mut guard = registries.lock().unwrap_or_else(PoisonError::into_inner);
    let entry = guard.entry(TypeId::of::<T>()).or_insert_with(|| {
        let registry: OverrideRegistryHandle<T> =
            Arc::new(OverrideRegistry::with_policy(RegistrationPolicy::from_env()));
        registry as Arc<dyn Any + Send + Sync>
    });
    let arc = entry.clone();
    drop(guard);

    arc.downcast::<OverrideRegistry<T>>()
        .expect("default override registry stored with wrong type")
}

/// Registers `handler` for `op` in the default registry of `T`.
pub fn register_override<T, F>(op: OpKey, handler: F) -> ProxyResult<()>
where
    T: Send + Sync + 'static,
    F: Fn(OpCall<'_, T>) -> Result<Value<T>> + Send + Sync + 'static,
{
    default_registry::<T>().register(op, handler)
}

/// Link-time list of functions that populate default registries.
///
/// Registrars must not call [`super::dispatch`]; they run while dispatch is being initialised.
/// A registrar that panics is logged and skipped, and the remaining registrars still run.
#[linkme::distributed_slice]
pub static OVERRIDE_REGISTRARS: [fn()] = [..];

static REGISTRARS_LOADED: Once = Once::new();

/// Runs every registrar in [`OVERRIDE_REGISTRARS`] exactly once per process.
pub fn ensure_registrars_loaded() {
    REGISTRARS_LOADED.call_once(|| {
        debug!(count = OVERRIDE_REGISTRARS.len(), "loading override registrars");
        run_registrars(&OVERRIDE_REGISTRARS);
    });
}

/// Runs `registrars` in order and returns how many of them panicked.
fn run_registrars(registrars: &[fn()]) -> usize {
    let mut failed = 0;
    for (index, registrar) in registrars.iter().enumerate() {
        if panic::catch_unwind(*registrar).is_err() {
            warn!(index, "override registrar panicked; its overrides are not installed");
            failed += 1;
        }
    }
    failed
}
