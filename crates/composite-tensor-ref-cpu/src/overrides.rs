//! Built-in composite overrides for the CPU host type.
//!
//! Construction-style operations should produce a composite again rather than collapse to the
//! source component, so they are taught to the default registry here.

use anyhow::Result;
use composite_tensor::dispatch::OVERRIDE_REGISTRARS;
use composite_tensor::tree::{map_composite, unwrap_args, unwrap_kwargs};
use composite_tensor::{register_override, CompositeTensor, OpCall, OpKey, Value};
use tracing::warn;

use crate::cpu::CpuTensor;
use crate::ops;

type Handler = fn(OpCall<'_, CpuTensor>) -> Result<Value<CpuTensor>>;

/// Installs the CPU composite overrides into the default registry.
///
/// Runs automatically before the first dispatch in a process; calling it again re-installs
/// the same handlers.
pub fn register_cpu_overrides() {
    let handlers: [(OpKey, Handler); 3] = [
        (ops::CLONE, per_component),
        (ops::TO, per_component),
        (ops::ZEROS_LIKE, zeros_like_source),
    ];
    for (op, handler) in handlers {
        if let Err(err) = register_override::<CpuTensor, _>(op, handler) {
            warn!(op = %op, error = %err, "skipping cpu composite override");
        }
    }
}

#[composite_tensor::linkme::distributed_slice(OVERRIDE_REGISTRARS)]
#[linkme(crate = composite_tensor::linkme)]
static REGISTER_CPU_OVERRIDES: fn() = register_cpu_overrides;

/// Applies the call's op to every component of the leading composite, keeping the rest of the
/// arguments as given. Calls without a leading composite run on the host unwrapped.
fn per_component(call: OpCall<'_, CpuTensor>) -> Result<Value<CpuTensor>> {
    let Some(composite) = call.args.first().and_then(Value::as_composite) else {
        return forward_unwrapped(&call);
    };

    let rest = unwrap_args(call.args[1..].to_vec());
    let kwargs = unwrap_kwargs(call.kwargs.clone());
    let rebuilt = map_composite(composite, &mut |component: CpuTensor| {
        let mut args = Vec::with_capacity(rest.len() + 1);
        args.push(Value::Tensor(component));
        args.extend(rest.iter().cloned());
        into_tensor(call.op, call.execute(call.op, &args, &kwargs)?)
    })?;
    Ok(Value::Composite(rebuilt))
}

/// Zeroes the source component and shares every other component with the input.
fn zeros_like_source(call: OpCall<'_, CpuTensor>) -> Result<Value<CpuTensor>> {
    let Some(composite) = call.args.first().and_then(Value::as_composite) else {
        return forward_unwrapped(&call);
    };

    let source = call.execute(
        call.op,
        &[Value::Tensor(composite.source().clone())],
        &unwrap_kwargs(call.kwargs.clone()),
    )?;
    let source = into_tensor(call.op, source)?;

    let mut components = composite.components().clone();
    components.insert(composite.source_key().to_string(), source);
    let rebuilt = CompositeTensor::new(components, composite.source_key())?;
    Ok(Value::Composite(rebuilt))
}

fn forward_unwrapped(call: &OpCall<'_, CpuTensor>) -> Result<Value<CpuTensor>> {
    let args = unwrap_args(call.args.to_vec());
    let kwargs = unwrap_kwargs(call.kwargs.clone());
    call.execute(call.op, &args, &kwargs)
}

fn into_tensor(op: OpKey, value: Value<CpuTensor>) -> Result<CpuTensor> {
    let kind = value.kind();
    value
        .into_tensor()
        .ok_or_else(|| anyhow::anyhow!("{op} returned {kind} where a tensor was expected"))
}
