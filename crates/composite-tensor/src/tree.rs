//! Structural traversal over argument trees that may contain composite proxies.
//!
//! Composites are opened through [`CompositeTensor::flatten`] and closed again through
//! [`CompositeTensor::unflatten`], so any transformation applied here keeps every component
//! and the source key intact.

use anyhow::Result;
use indexmap::IndexMap;

use crate::proxy::CompositeTensor;
use crate::tensor::TensorLike;
use crate::value::{Kwargs, Value};

/// Replaces every composite in `value`, at any depth, with its own source component.
pub fn unwrap_composites<T: Clone>(value: Value<T>) -> Value<T> {
    match value {
        Value::Composite(composite) => Value::Tensor(composite.source().clone()),
        Value::List(items) => Value::List(items.into_iter().map(unwrap_composites).collect()),
        Value::Dict(entries) => Value::Dict(unwrap_kwargs(entries)),
        other => other,
    }
}

pub fn unwrap_args<T: Clone>(args: Vec<Value<T>>) -> Vec<Value<T>> {
    args.into_iter().map(unwrap_composites).collect()
}

pub fn unwrap_kwargs<T: Clone>(kwargs: Kwargs<T>) -> Kwargs<T> {
    kwargs
        .into_iter()
        .map(|(name, value)| (name, unwrap_composites(value)))
        .collect()
}

/// Applies `f` to every tensor leaf, including each component of each composite.
///
/// Composites are rebuilt from the transformed components with their original source key.
pub fn map_tensors<T, F>(value: Value<T>, f: &mut F) -> Result<Value<T>>
where
    T: TensorLike + Clone,
    F: FnMut(T) -> Result<T>,
{
    match value {
        Value::Tensor(tensor) => Ok(Value::Tensor(f(tensor)?)),
        Value::Composite(composite) => Ok(Value::Composite(map_composite(&composite, f)?)),
        Value::List(items) => items
            .into_iter()
            .map(|item| map_tensors(item, f))
            .collect::<Result<Vec<_>>>()
            .map(Value::List),
        Value::Dict(entries) => entries
            .into_iter()
            .map(|(name, item)| map_tensors(item, f).map(|mapped| (name, mapped)))
            .collect::<Result<IndexMap<_, _>>>()
            .map(Value::Dict),
        other => Ok(other),
    }
}

/// Transforms every component of one composite and reassembles it.
pub fn map_composite<T, F>(
    composite: &CompositeTensor<T>,
    f: &mut F,
) -> Result<CompositeTensor<T>>
where
    T: TensorLike + Clone,
    F: FnMut(T) -> Result<T>,
{
    let (keys, context) = composite.flatten();
    let mut inner = IndexMap::with_capacity(keys.len());
    for key in keys {
        let component = composite.component(&key)?.clone();
        inner.insert(key, f(component)?);
    }
    Ok(CompositeTensor::unflatten(inner, context)?)
}

/// Collects tensor leaves in traversal order; composites contribute all of their components.
pub fn leaves<T>(value: &Value<T>) -> Vec<&T> {
    let mut out = Vec::new();
    collect_leaves(value, &mut out);
    out
}

fn collect_leaves<'a, T>(value: &'a Value<T>, out: &mut Vec<&'a T>) {
    match value {
        Value::Tensor(tensor) => out.push(tensor),
        Value::Composite(composite) => out.extend(composite.components().values()),
        Value::List(items) => items.iter().for_each(|item| collect_leaves(item, out)),
        Value::Dict(entries) => entries.values().for_each(|item| collect_leaves(item, out)),
        _ => {}
    }
}

pub fn contains_composite<T>(value: &Value<T>) -> bool {
    match value {
        Value::Composite(_) => true,
        Value::List(items) => items.iter().any(contains_composite),
        Value::Dict(entries) => entries.values().any(contains_composite),
        _ => false,
    }
}
