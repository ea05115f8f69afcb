//! Device placement and memory layout descriptors.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Where a tensor's storage lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Device {
    #[default]
    Cpu,
    Cuda(u32),
    Xpu(u32),
    /// Metadata-only placement with no backing storage.
    Meta,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid device string '{0}'")]
pub struct ParseDeviceError(String);

impl FromStr for Device {
    type Err = ParseDeviceError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim().to_ascii_lowercase();
        let (kind, index) = match trimmed.split_once(':') {
            Some((kind, index)) => {
                let index = index
                    .parse::<u32>()
                    .map_err(|_| ParseDeviceError(raw.to_string()))?;
                (kind.to_string(), Some(index))
            }
            None => (trimmed, None),
        };

        match (kind.as_str(), index) {
            ("cpu", None) => Ok(Device::Cpu),
            ("meta", None) => Ok(Device::Meta),
            ("cuda", index) => Ok(Device::Cuda(index.unwrap_or(0))),
            ("xpu", index) => Ok(Device::Xpu(index.unwrap_or(0))),
            _ => Err(ParseDeviceError(raw.to_string())),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda(index) => write!(f, "cuda:{index}"),
            Device::Xpu(index) => write!(f, "xpu:{index}"),
            Device::Meta => write!(f, "meta"),
        }
    }
}

/// Memory layout of a tensor's storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Layout {
    #[default]
    Strided,
    Jagged,
}
