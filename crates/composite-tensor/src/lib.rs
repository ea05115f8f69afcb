//! Composite tensor proxies and per-operation override routing.
//!
//! A [`CompositeTensor`] carries several named components but presents the shape and
//! metadata of one of them, its source. Operations reach it through [`dispatch()`], which
//! either hands the untouched call to a registered override or strips every proxy down to
//! its source component and forwards the call to the host engine.

pub use linkme;

pub mod dispatch;
mod env;
pub mod error;
pub mod proxy;
pub mod serialization;
pub mod tensor;
pub mod tree;
pub mod value;

pub use dispatch::{
    active_registry, default_registry, dispatch, register_override, with_registry, HostExecutor,
    OpCall, OpKey, OverrideRegistry, OverrideRegistryHandle, RegistrationPolicy,
};
pub use error::{ProxyError, ProxyResult};
pub use proxy::{CompositeTensor, FlattenContext};
pub use tensor::{DType, Device, Layout, Shape, TensorLike, TensorMeta};
pub use value::{Kwargs, Value};
