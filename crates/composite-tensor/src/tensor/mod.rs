//! Tensor metadata shared by host values and composite proxies.
//!
//! Nothing in this crate computes on tensor data. Host tensors only have to describe
//! themselves through [`TensorLike`] so a proxy can mirror their identity.

mod device;
pub mod dtype;
mod meta;
pub mod shape;

pub use device::{Device, Layout, ParseDeviceError};
pub use dtype::DType;
pub use meta::{TensorLike, TensorMeta};
pub use shape::Shape;
