//! Reference CPU host engine for `composite-tensor`.
//!
//! Provides [`CpuTensor`] as a host tensor type, [`CpuExecutor`] as the engine that runs
//! unwrapped operations, and the built-in composite overrides for `clone`, `to` and `zeros_like`.

pub mod cpu;
pub mod ops;
mod overrides;

pub use cpu::{CpuExecutor, CpuTensor, TensorData};
/// Installs the built-in composite overrides into the default [`CpuTensor`] registry.
///
/// Linking this crate registers them automatically before the first dispatch; calling this
/// again is harmless.
pub use overrides::register_cpu_overrides;
