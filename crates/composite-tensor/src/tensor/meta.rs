//! Identity-defining tensor metadata and the host tensor contract.

use serde::{Deserialize, Serialize};

use super::{DType, Device, Layout, Shape};

/// Everything a caller can observe about a tensor without touching its data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorMeta {
    pub shape: Shape,
    pub strides: Vec<usize>,
    pub storage_offset: usize,
    pub device: Device,
    pub layout: Layout,
    pub requires_grad: bool,
    pub dtype: DType,
}

impl TensorMeta {
    /// Dense row-major metadata on the CPU.
    pub fn contiguous(shape: impl Into<Shape>, dtype: DType) -> Self {
        let shape = shape.into();
        let strides = shape.contiguous_strides();
        TensorMeta {
            shape,
            strides,
            storage_offset: 0,
            device: Device::Cpu,
            layout: Layout::Strided,
            requires_grad: false,
            dtype,
        }
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn with_requires_grad(mut self, requires_grad: bool) -> Self {
        self.requires_grad = requires_grad;
        self
    }

    pub fn with_storage_offset(mut self, storage_offset: usize) -> Self {
        self.storage_offset = storage_offset;
        self
    }

    pub fn with_strides(mut self, strides: Vec<usize>) -> Self {
        self.strides = strides;
        self
    }

    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    pub fn is_contiguous(&self) -> bool {
        self.strides == self.shape.contiguous_strides()
    }
}

/// Contract for host values that a composite proxy can wrap.
///
/// Only [`TensorLike::meta`] is required; the remaining accessors project out of it.
pub trait TensorLike {
    fn meta(&self) -> TensorMeta;

    fn shape(&self) -> Shape {
        self.meta().shape
    }

    fn dtype(&self) -> DType {
        self.meta().dtype
    }

    fn device(&self) -> Device {
        self.meta().device
    }

    fn requires_grad(&self) -> bool {
        self.meta().requires_grad
    }
}

impl<T: TensorLike + ?Sized> TensorLike for &T {
    fn meta(&self) -> TensorMeta {
        (**self).meta()
    }
}
