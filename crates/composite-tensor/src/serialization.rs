//! Persistence of composite proxies behind a reconstruction allow-list.
//!
//! A serialized proxy is a [`CompositeRecord`]: the type name, the source key, and the
//! components in flatten order. Loading refuses any record that does not name the composite
//! proxy or whose type name has not been allow-listed, and only then rebuilds the proxy through [`CompositeTensor::unflatten`].

use std::collections::BTreeSet;
use std::sync::{OnceLock, PoisonError, RwLock};

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ProxyError, ProxyResult};
use crate::proxy::{CompositeTensor, FlattenContext, COMPOSITE_TYPE_NAME};
use crate::tensor::TensorLike;

static SAFE_TYPES: OnceLock<RwLock<BTreeSet<String>>> = OnceLock::new();

fn safe_types_table() -> &'static RwLock<BTreeSet<String>> {
    SAFE_TYPES.get_or_init(|| {
        let mut types = BTreeSet::new();
        types.insert(COMPOSITE_TYPE_NAME.to_string());
        RwLock::new(types)
    })
}

/// Marks `type_name` as safe to reconstruct from untrusted data.
pub fn add_safe_type(type_name: impl Into<String>) {
    let type_name = type_name.into();
    debug!(type_name = %type_name, "allow-listing type for reconstruction");
    safe_types_table()
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(type_name);
}

pub fn is_safe_type(type_name: &str) -> bool {
    safe_types_table()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .contains(type_name)
}

/// Allow-listed type names in sorted order.
pub fn safe_types() -> Vec<String> {
    safe_types_table()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .cloned()
        .collect()
}

/// Serialized form of a composite proxy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeRecord<T> {
    pub type_name: String,
    pub source_key: String,
    pub components: IndexMap<String, T>,
}

impl<T: Clone> CompositeRecord<T> {
    pub fn from_composite(composite: &CompositeTensor<T>) -> Self {
        let (keys, context) = composite.flatten();
        let components = keys
            .into_iter()
            .filter_map(|key| {
                let component = composite.get(&key)?.clone();
                Some((key, component))
            })
            .collect();
        CompositeRecord {
            type_name: COMPOSITE_TYPE_NAME.to_string(),
            source_key: context.source_key,
            components,
        }
    }
}

impl<T: TensorLike> CompositeRecord<T> {
    /// Checks that the record names the composite proxy and that the name is allow-listed,
    /// then rebuilds the proxy.
    pub fn into_composite(self) -> ProxyResult<CompositeTensor<T>> {
        if self.type_name != COMPOSITE_TYPE_NAME || !is_safe_type(&self.type_name) {
            return Err(ProxyError::UnsafeType {
                type_name: self.type_name,
            });
        }
        CompositeTensor::unflatten(
            self.components,
            FlattenContext {
                source_key: self.source_key,
            },
        )
    }
}

pub fn to_json<T>(composite: &CompositeTensor<T>) -> ProxyResult<String>
where
    T: Clone + Serialize,
{
    let record = CompositeRecord::from_composite(composite);
    Ok(serde_json::to_string_pretty(&record)?)
}

pub fn from_json<T>(raw: &str) -> ProxyResult<CompositeTensor<T>>
where
    T: TensorLike + DeserializeOwned,
{
    let record: CompositeRecord<T> = serde_json::from_str(raw)?;
    record.into_composite()
}

pub fn to_bytes<T>(composite: &CompositeTensor<T>) -> ProxyResult<Vec<u8>>
where
    T: Clone + Serialize,
{
    let record = CompositeRecord::from_composite(composite);
    Ok(bincode::serialize(&record)?)
}

pub fn from_bytes<T>(bytes: &[u8]) -> ProxyResult<CompositeTensor<T>>
where
    T: TensorLike + DeserializeOwned,
{
    let record: CompositeRecord<T> = bincode::deserialize(bytes)?;
    record.into_composite()
}
