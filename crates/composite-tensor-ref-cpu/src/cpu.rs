//! Dense host tensors and the reference executor that runs operations on them.

use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{anyhow, bail, ensure, Result};
use composite_tensor::{
    DType, Device, HostExecutor, Kwargs, OpKey, Shape, TensorLike, TensorMeta, Value,
};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::ops;

/// Element storage of a [`CpuTensor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TensorData {
    F32(Vec<f32>),
    I64(Vec<i64>),
}

impl TensorData {
    pub fn len(&self) -> usize {
        match self {
            TensorData::F32(values) => values.len(),
            TensorData::I64(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn dtype(&self) -> DType {
        match self {
            TensorData::F32(_) => DType::F32,
            TensorData::I64(_) => DType::I64,
        }
    }

    fn zeros_like(&self) -> Self {
        match self {
            TensorData::F32(values) => TensorData::F32(vec![0.0; values.len()]),
            TensorData::I64(values) => TensorData::I64(vec![0; values.len()]),
        }
    }
}

/// Contiguous host tensor used by tests and as the default host value type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuTensor {
    meta: TensorMeta,
    data: TensorData,
}

impl CpuTensor {
    /// Constructs an `F32` tensor, validating the length against the shape.
    pub fn from_vec(shape: impl Into<Shape>, data: Vec<f32>) -> Result<Self> {
        Self::from_data(shape.into(), TensorData::F32(data))
    }

    /// Constructs an `I64` tensor, validating the length against the shape.
    pub fn from_i64(shape: impl Into<Shape>, data: Vec<i64>) -> Result<Self> {
        Self::from_data(shape.into(), TensorData::I64(data))
    }

    fn from_data(shape: Shape, data: TensorData) -> Result<Self> {
        ensure!(
            data.len() == shape.num_elements(),
            "tensor data length ({}) does not match shape {:?}",
            data.len(),
            shape.dims()
        );
        Ok(CpuTensor {
            meta: TensorMeta::contiguous(shape, data.dtype()),
            data,
        })
    }

    pub fn scalar(value: f32) -> Self {
        CpuTensor {
            meta: TensorMeta::contiguous(Shape::scalar(), DType::F32),
            data: TensorData::F32(vec![value]),
        }
    }

    /// Sets the gradient-tracking flag.
    pub fn requires_grad(mut self, flag: bool) -> Self {
        self.meta.requires_grad = flag;
        self
    }

    /// Relabels the tensor as living on `device`; storage stays on the host.
    pub fn on_device(mut self, device: Device) -> Self {
        self.meta.device = device;
        self
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    /// Borrows the `f32` payload, failing for other dtypes.
    pub fn as_f32(&self) -> Result<&[f32]> {
        match &self.data {
            TensorData::F32(values) => Ok(values),
            other => bail!("tensor data is {:?}, not f32", other.dtype()),
        }
    }

    pub fn as_i64(&self) -> Result<&[i64]> {
        match &self.data {
            TensorData::I64(values) => Ok(values),
            other => bail!("tensor data is {:?}, not i64", other.dtype()),
        }
    }

    fn with_data(&self, data: TensorData) -> Self {
        CpuTensor {
            meta: TensorMeta::contiguous(self.meta.shape.clone(), data.dtype())
                .with_device(self.meta.device)
                .with_requires_grad(self.meta.requires_grad),
            data,
        }
    }
}

impl TensorLike for CpuTensor {
    fn meta(&self) -> TensorMeta {
        self.meta.clone()
    }
}

/// Host engine for [`CpuTensor`] arguments.
///
/// Composites never reach this executor; [`composite_tensor::dispatch()`] unwraps them first.
#[derive(Debug, Default)]
pub struct CpuExecutor {
    calls: AtomicUsize,
}

impl CpuExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of operations this executor has run.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl HostExecutor<CpuTensor> for CpuExecutor {
    fn execute(
        &self,
        op: OpKey,
        args: &[Value<CpuTensor>],
        kwargs: &Kwargs<CpuTensor>,
    ) -> Result<Value<CpuTensor>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        trace!(op = %op, args = args.len(), "cpu executor");

        let out = match op {
            ops::ADD => binary(op, args, |a, b| a + b, |a, b| a + b)?,
            ops::MUL => binary(op, args, |a, b| a * b, |a, b| a * b)?,
            ops::NEG => {
                let input = tensor_arg(op, args, 0)?;
                let data = match &input.data {
                    TensorData::F32(values) => {
                        TensorData::F32(values.iter().map(|v| -v).collect())
                    }
                    TensorData::I64(values) => {
                        TensorData::I64(values.iter().map(|v| -v).collect())
                    }
                };
                input.with_data(data)
            }
            ops::SUM => {
                let input = tensor_arg(op, args, 0)?;
                let data = match &input.data {
                    TensorData::F32(values) => TensorData::F32(vec![values.iter().sum()]),
                    TensorData::I64(values) => TensorData::I64(vec![values.iter().sum()]),
                };
                CpuTensor {
                    meta: TensorMeta::contiguous(Shape::scalar(), data.dtype())
                        .with_device(input.meta.device)
                        .with_requires_grad(input.meta.requires_grad),
                    data,
                }
            }
            ops::CLONE => tensor_arg(op, args, 0)?.clone(),
            ops::DETACH => tensor_arg(op, args, 0)?.clone().requires_grad(false),
            ops::ZEROS_LIKE => {
                let input = tensor_arg(op, args, 0)?;
                input.with_data(input.data.zeros_like())
            }
            ops::TO => {
                let input = tensor_arg(op, args, 0)?;
                let device = device_arg(op, args, kwargs)?;
                input.clone().on_device(device)
            }
            other => bail!("{other} is not implemented by the cpu reference executor"),
        };
        Ok(Value::Tensor(out))
    }
}

fn tensor_arg<'a>(
    op: OpKey,
    args: &'a [Value<CpuTensor>],
    index: usize,
) -> Result<&'a CpuTensor> {
    let value = args
        .get(index)
        .ok_or_else(|| anyhow!("{op} expects an argument at position {index}"))?;
    value.as_tensor().ok_or_else(|| {
        anyhow!(
            "{op} expects a tensor at position {index}, got {}",
            value.kind()
        )
    })
}

fn device_arg(
    op: OpKey,
    args: &[Value<CpuTensor>],
    kwargs: &Kwargs<CpuTensor>,
) -> Result<Device> {
    let raw = kwargs
        .get("device")
        .or_else(|| args.get(1))
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("{op} expects a device string"))?;
    Ok(raw.parse::<Device>()?)
}

fn binary(
    op: OpKey,
    args: &[Value<CpuTensor>],
    float_op: impl Fn(f32, f32) -> f32,
    int_op: impl Fn(i64, i64) -> i64,
) -> Result<CpuTensor> {
    let lhs = tensor_arg(op, args, 0)?;
    let rhs = args
        .get(1)
        .ok_or_else(|| anyhow!("{op} expects an argument at position 1"))?;

    let data = match (rhs, &lhs.data) {
        (Value::Tensor(rhs), lhs_data) => {
            ensure!(
                rhs.meta.shape == lhs.meta.shape,
                "{op} shape mismatch: {:?} vs {:?}",
                lhs.meta.shape.dims(),
                rhs.meta.shape.dims()
            );
            match (lhs_data, &rhs.data) {
                (TensorData::F32(a), TensorData::F32(b)) => {
                    TensorData::F32(a.iter().zip(b).map(|(a, b)| float_op(*a, *b)).collect())
                }
                (TensorData::I64(a), TensorData::I64(b)) => {
                    TensorData::I64(a.iter().zip(b).map(|(a, b)| int_op(*a, *b)).collect())
                }
                (a, b) => bail!("{op} dtype mismatch: {:?} vs {:?}", a.dtype(), b.dtype()),
            }
        }
        (Value::Float(scalar), TensorData::F32(a)) => {
            let scalar = *scalar as f32;
            TensorData::F32(a.iter().map(|a| float_op(*a, scalar)).collect())
        }
        (Value::Int(scalar), TensorData::F32(a)) => {
            let scalar = *scalar as f32;
            TensorData::F32(a.iter().map(|a| float_op(*a, scalar)).collect())
        }
        (Value::Int(scalar), TensorData::I64(a)) => {
            TensorData::I64(a.iter().map(|a| int_op(*a, *scalar)).collect())
        }
        (other, _) => bail!("{op} cannot combine a tensor with {}", other.kind()),
    };

    let mut out = lhs.with_data(data);
    if let Value::Tensor(rhs) = rhs {
        out.meta.requires_grad |= rhs.meta.requires_grad;
    }
    Ok(out)
}
