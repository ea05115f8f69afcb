//! Enumerates the scalar element types a tensor-like value can report.

use serde::{Deserialize, Serialize};

/// Logical dtype identifier shared between host tensors and composite proxies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    /// 32-bit floating point following IEEE-754 semantics.
    F32,
    /// 16-bit floating point with full mantissa (fp16).
    F16,
    /// 16-bit bfloat16 precision as used by many accelerators.
    BF16,
    /// 64-bit floating point.
    F64,
    /// 32-bit signed integer.
    I32,
    /// 64-bit signed integer, the usual type of offset and length buffers.
    I64,
    Bool,
}

