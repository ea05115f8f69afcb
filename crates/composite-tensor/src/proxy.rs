//! Composite proxy that carries several named tensors while presenting itself as one of them.
//!
//! A [`CompositeTensor`] owns an insertion-ordered mapping of components and a designated
//! source key. Shape, strides, storage offset, device, layout, gradient flag and dtype are
//! copied from the source component once at construction and never change afterwards; a new
//! proxy is only ever produced by constructing one or by [`CompositeTensor::unflatten`].

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{ProxyError, ProxyResult};
use crate::tensor::{DType, Device, Layout, Shape, TensorLike, TensorMeta};

/// Type name reported in attribute errors and stored in serialized records.
pub const COMPOSITE_TYPE_NAME: &str = "CompositeTensor";

/// Opaque slot reserved for a symbolic-size link owned by a higher-level system.
pub type SymbolicSize = Arc<dyn Any + Send + Sync>;

/// Context produced by [`CompositeTensor::flatten`] and consumed by [`CompositeTensor::unflatten`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlattenContext {
    pub source_key: String,
}

/// Bundle of named components that masquerades as its source component.
#[derive(Clone)]
pub struct CompositeTensor<T> {
    components: IndexMap<String, T>,
    source_key: String,
    source_index: usize,
    meta: TensorMeta,
    symbolic_size: Option<SymbolicSize>,
}

impl<T: TensorLike> CompositeTensor<T> {
    /// Builds a proxy whose identity is taken from `components[source_key]`.
    ///
    /// Fails with [`ProxyError::MissingSource`] when the key is absent, which includes an
    /// empty mapping. No proxy exists on the error path.
    pub fn new(
        components: IndexMap<String, T>,
        source_key: impl Into<String>,
    ) -> ProxyResult<Self> {
        let source_key = source_key.into();
        let (source_index, _, source) = components
            .get_full(source_key.as_str())
            .ok_or_else(|| ProxyError::MissingSource {
                key: source_key.clone(),
            })?;
        let meta = source.meta();

        Ok(CompositeTensor {
            components,
            source_key,
            source_index,
            meta,
            symbolic_size: None,
        })
    }

    /// Convenience constructor over any iterator of `(name, component)` pairs.
    pub fn from_components<I, K>(
        components: I,
        source_key: impl Into<String>,
    ) -> ProxyResult<Self>
    where
        I: IntoIterator<Item = (K, T)>,
        K: Into<String>,
    {
        let components = components
            .into_iter()
            .map(|(name, component)| (name.into(), component))
            .collect();
        Self::new(components, source_key)
    }

    /// Rebuilds a proxy from components keyed as returned by [`CompositeTensor::flatten`].
    ///
    /// The symbolic-size slot of the reconstructed proxy starts empty.
    pub fn unflatten(inner: IndexMap<String, T>, context: FlattenContext) -> ProxyResult<Self> {
        Self::new(inner, context.source_key)
    }
}

impl<T> CompositeTensor<T> {
    /// Returns the component stored under `name`.
    pub fn component(&self, name: &str) -> ProxyResult<&T> {
        self.components
            .get(name)
            .ok_or_else(|| ProxyError::UnknownAttribute {
                type_name: COMPOSITE_TYPE_NAME,
                name: name.to_string(),
            })
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.components.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.components.contains_key(name)
    }

    /// The component whose metadata the proxy exposes.
    pub fn source(&self) -> &T {
        &self.components[self.source_index]
    }

    pub fn source_key(&self) -> &str {
        &self.source_key
    }

    /// Component names in flatten order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.components.keys().map(String::as_str)
    }

    pub fn components(&self) -> &IndexMap<String, T> {
        &self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn into_components(self) -> IndexMap<String, T> {
        self.components
    }

    /// Every component name in insertion order plus the context needed to rebuild the proxy.
    pub fn flatten(&self) -> (Vec<String>, FlattenContext) {
        let keys = self.components.keys().cloned().collect();
        let context = FlattenContext {
            source_key: self.source_key.clone(),
        };
        (keys, context)
    }

    pub fn meta(&self) -> &TensorMeta {
        &self.meta
    }

    pub fn shape(&self) -> &Shape {
        &self.meta.shape
    }

    pub fn strides(&self) -> &[usize] {
        &self.meta.strides
    }

    pub fn storage_offset(&self) -> usize {
        self.meta.storage_offset
    }

    pub fn device(&self) -> Device {
        self.meta.device
    }

    pub fn layout(&self) -> Layout {
        self.meta.layout
    }

    pub fn requires_grad(&self) -> bool {
        self.meta.requires_grad
    }

    pub fn dtype(&self) -> DType {
        self.meta.dtype
    }

    pub fn symbolic_size(&self) -> Option<&SymbolicSize> {
        self.symbolic_size.as_ref()
    }

    pub fn set_symbolic_size(&mut self, value: Option<SymbolicSize>) {
        self.symbolic_size = value;
    }
}

impl<T> TensorLike for CompositeTensor<T> {
    fn meta(&self) -> TensorMeta {
        self.meta.clone()
    }
}

impl<T: fmt::Debug> fmt::Debug for CompositeTensor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{COMPOSITE_TYPE_NAME}({:?})", self.source())
    }
}

impl<T: fmt::Debug> fmt::Display for CompositeTensor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
