//! Scoped activation of override registries.
//!
//! Each thread keeps its own stack of installed registries, so a scope opened on one thread is
//! never observed by another. Lookups walk the stack from the top for an entry of the requested
//! host tensor type and fall back to the process-wide default registry.

use std::any::{Any, TypeId};
use std::cell::{Cell, RefCell};
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{trace, warn};

use super::registry::{default_registry, OverrideRegistry, OverrideRegistryHandle};

thread_local! {
    static REGISTRY_STACK: RefCell<Vec<RegistryEntry>> = const { RefCell::new(Vec::new()) };
    static NEXT_SCOPE_ID: Cell<u64> = const { Cell::new(0) };
}

struct RegistryEntry {
    id: u64,
    type_id: TypeId,
    registry: Arc<dyn Any + Send + Sync>,
}

/// RAII guard that keeps a registry active on the thread-local stack.
///
/// Dropping the guard removes exactly the entry it pushed, on normal exit and while unwinding.
/// Scopes released out of order leave every other live scope in place.
#[must_use = "the registry is deactivated as soon as the guard is dropped"]
pub struct RegistryGuard {
    id: u64,
    _thread_bound: PhantomData<*const ()>,
}

impl RegistryGuard {
    /// Pushes `registry` onto the current thread's stack and returns the guard.
    pub fn push<T: Send + Sync + 'static>(registry: OverrideRegistryHandle<T>) -> Self {
        let type_id = TypeId::of::<T>();
        let registry_any: Arc<dyn Any + Send + Sync> = registry;
        let id = NEXT_SCOPE_ID.with(|next| {
            let id = next.get();
            next.set(id + 1);
            id
        });
        let depth = REGISTRY_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            stack.push(RegistryEntry {
                id,
                type_id,
                registry: registry_any,
            });
            stack.len()
        });
        trace!(id, depth, "override registry scope entered");
        RegistryGuard {
            id,
            _thread_bound: PhantomData,
        }
    }
}

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        let id = self.id;
        let _ = REGISTRY_STACK.try_with(|stack| {
            let mut stack = stack.borrow_mut();
            match stack.iter().rposition(|entry| entry.id == id) {
                Some(position) => {
                    if position + 1 != stack.len() {
                        warn!(
                            id,
                            position,
                            depth = stack.len(),
                            "override registry scope released out of order"
                        );
                    }
                    stack.remove(position);
                }
                None => warn!(id, "override registry scope already removed"),
            }
        });
        trace!(id, "override registry scope exited");
    }
}

/// Convenience helper for pushing a registry and returning its guard.
pub fn push_registry<T: Send + Sync + 'static>(
    registry: OverrideRegistryHandle<T>,
) -> RegistryGuard {
    RegistryGuard::push(registry)
}

/// Runs `f` with `registry` installed as the active registry for `T`.
///
/// The previously active registry is back in place when this returns, including when `f`
/// returns an error or panics.
pub fn with_registry<T, F, R>(registry: OverrideRegistryHandle<T>, f: F) -> R
where
    T: Send + Sync + 'static,
    F: FnOnce() -> R,
{
    let guard = push_registry(registry);
    let result = f();
    drop(guard);
    result
}

/// Returns the innermost registry installed for `T` on this thread, if any.
pub fn scoped_registry<T: Send + Sync + 'static>() -> Option<OverrideRegistryHandle<T>> {
    let type_id = TypeId::of::<T>();
    REGISTRY_STACK.with(|stack| {
        for entry in stack.borrow().iter().rev() {
            if entry.type_id == type_id {
                let arc = entry.registry.clone();
                return arc.downcast::<OverrideRegistry<T>>().ok();
            }
        }
        None
    })
}

/// The registry [`super::dispatch`] consults for `T` right now.
pub fn active_registry<T: Send + Sync + 'static>() -> OverrideRegistryHandle<T> {
    scoped_registry::<T>().unwrap_or_else(default_registry::<T>)
}

/// Number of scopes currently open on this thread, across all host tensor types.
pub fn scope_depth() -> usize {
    REGISTRY_STACK.with(|stack| stack.borrow().len())
}
