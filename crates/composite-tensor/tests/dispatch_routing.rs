use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use anyhow::Result;
use composite_tensor::dispatch::{scope_depth, scoped_registry};
use composite_tensor::{
    active_registry, dispatch, register_override, with_registry, CompositeTensor, Device,
    HostExecutor, Kwargs, OpCall, OpKey, OverrideRegistry, OverrideRegistryHandle, TensorLike,
    Value,
};
use composite_tensor_ref_cpu::{ops, CpuExecutor, CpuTensor};
use thiserror::Error;

fn values() -> CpuTensor {
    CpuTensor::from_vec([2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap()
}

fn offsets() -> CpuTensor {
    CpuTensor::from_i64([3], vec![0, 1, 2]).unwrap()
}

fn jagged() -> CompositeTensor<CpuTensor> {
    CompositeTensor::from_components([("offsets", offsets()), ("values", values())], "values")
        .unwrap()
}

fn tensor(value: Value<CpuTensor>) -> CpuTensor {
    value.into_tensor().expect("expected a plain tensor result")
}

fn scoped() -> OverrideRegistryHandle<CpuTensor> {
    Arc::new(OverrideRegistry::new())
}

static TEST_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

fn acquire_lock() -> MutexGuard<'static, ()> {
    TEST_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Error, PartialEq)]
#[error("override refused {0}")]
struct Refused(&'static str);

#[test]
fn unregistered_ops_match_direct_source_calls() {
    let host = CpuExecutor::new();
    let proxy = jagged();

    for op in [ops::NEG, ops::SUM, ops::DETACH] {
        let routed = dispatch(&host, op, vec![proxy.clone().into()], Kwargs::new()).unwrap();
        let direct = host
            .execute(op, &[Value::Tensor(proxy.source().clone())], &Kwargs::new())
            .unwrap();
        assert_eq!(tensor(routed), tensor(direct), "{op} diverged");
    }
}

#[test]
fn each_composite_unwraps_to_its_own_source() {
    let host = CpuExecutor::new();
    let lhs = jagged();
    let rhs = CompositeTensor::from_components(
        [
            ("scale", CpuTensor::from_vec([2, 2], vec![10.0; 4]).unwrap()),
            ("values", values()),
        ],
        "scale",
    )
    .unwrap();

    let out = dispatch(&host, ops::ADD, vec![lhs.into(), rhs.into()], Kwargs::new()).unwrap();
    assert_eq!(tensor(out).as_f32().unwrap(), &[11.0, 12.0, 13.0, 14.0]);
}

#[test]
fn nested_and_keyword_composites_are_unwrapped() {
    let seen = Mutex::new(Vec::new());
    let host = |op: OpKey, args: &[Value<CpuTensor>], kwargs: &Kwargs<CpuTensor>| {
        let mut kinds: Vec<String> = args.iter().map(|arg| arg.kind().to_string()).collect();
        if let Some(Value::List(items)) = args.get(1) {
            kinds.extend(items.iter().map(|item| item.kind().to_string()));
        }
        kinds.extend(kwargs.values().map(|arg| arg.kind().to_string()));
        seen.lock().unwrap().push((op, kinds));
        Ok::<_, anyhow::Error>(Value::None)
    };

    let mut kwargs = Kwargs::new();
    kwargs.insert("other".to_string(), jagged().into());
    let op = OpKey::new("test::nested_unwrap");
    dispatch(
        &host,
        op,
        vec![jagged().into(), Value::List(vec![jagged().into(), Value::Int(1)])],
        kwargs,
    )
    .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, op);
    assert_eq!(seen[0].1, vec!["tensor", "list", "tensor", "int", "tensor"]);
}

#[test]
fn override_receives_untouched_composites() {
    let host = CpuExecutor::new();
    let registry = scoped();
    registry
        .register(ops::ADD, |call: OpCall<'_, CpuTensor>| {
            let composite = call.composite_arg(0)?;
            assert_eq!(composite.keys().collect::<Vec<_>>(), vec!["offsets", "values"]);
            let offsets = composite.component("offsets")?;
            Ok(Value::Int(offsets.as_i64()?.len() as i64))
        })
        .unwrap();

    let out = with_registry(registry, || {
        dispatch(&host, ops::ADD, vec![jagged().into(), Value::Float(1.0)], Kwargs::new())
    })
    .unwrap();

    assert_eq!(out.as_int(), Some(3));
    assert_eq!(host.calls(), 0, "override path must not reach the host");
}

#[test]
fn override_errors_propagate_verbatim() {
    let host = CpuExecutor::new();
    let registry = scoped();
    registry
        .register(ops::MUL, |_call: OpCall<'_, CpuTensor>| {
            Err(Refused("mul").into())
        })
        .unwrap();

    let err = with_registry(registry, || {
        dispatch(&host, ops::MUL, vec![jagged().into()], Kwargs::new())
    })
    .unwrap_err();

    assert_eq!(err.downcast_ref::<Refused>(), Some(&Refused("mul")));
    assert_eq!(err.to_string(), "override refused mul");
    assert!(err.chain().nth(1).is_none(), "router must not add context");
}

#[test]
fn host_errors_propagate_verbatim() {
    let host = CpuExecutor::new();
    let err = dispatch(
        &host,
        OpKey::new("aten::fft"),
        vec![jagged().into()],
        Kwargs::new(),
    )
    .unwrap_err();
    assert_eq!(
        err.to_string(),
        "aten::fft is not implemented by the cpu reference executor"
    );
    assert!(err.chain().nth(1).is_none());
}

#[test]
fn scoped_registry_shadows_default_and_is_restored() {
    let _lock = acquire_lock();
    let host = CpuExecutor::new();
    let before = active_registry::<CpuTensor>();

    // An empty scope hides the built-in clone override, so clone collapses to the source.
    let collapsed = with_registry(scoped(), || {
        dispatch(&host, ops::CLONE, vec![jagged().into()], Kwargs::new())
    })
    .unwrap();
    assert_eq!(tensor(collapsed), values());

    assert!(Arc::ptr_eq(&active_registry::<CpuTensor>(), &before));
    let rebuilt = dispatch(&host, ops::CLONE, vec![jagged().into()], Kwargs::new()).unwrap();
    assert!(rebuilt.is_composite());
}

#[test]
fn failing_scope_body_restores_registry() {
    let host = CpuExecutor::new();
    let registry = scoped();
    let result: Result<Value<CpuTensor>> = with_registry(Arc::clone(&registry), || {
        dispatch(&host, OpKey::new("aten::missing"), vec![], Kwargs::new())
    });
    assert!(result.is_err());
    assert!(scoped_registry::<CpuTensor>().is_none());
    assert_eq!(scope_depth(), 0);
}

#[test]
fn nested_scopes_route_to_innermost_registry() {
    let host = CpuExecutor::new();
    let op = OpKey::new("test::which_scope");
    let outer = scoped();
    outer
        .register(op, |_call: OpCall<'_, CpuTensor>| Ok(Value::from("outer")))
        .unwrap();
    let inner = scoped();
    inner
        .register(op, |_call: OpCall<'_, CpuTensor>| Ok(Value::from("inner")))
        .unwrap();

    with_registry(Arc::clone(&outer), || {
        let run = || dispatch(&host, op, vec![], Kwargs::<CpuTensor>::new()).unwrap();
        assert_eq!(run().as_str(), Some("outer"));
        with_registry(Arc::clone(&inner), || {
            assert_eq!(run().as_str(), Some("inner"));
        });
        assert_eq!(run().as_str(), Some("outer"));
    });
}

#[test]
fn override_can_redispatch_through_router() {
    let host = CpuExecutor::new();
    let registry = scoped();
    registry
        .register(ops::NEG, |call: OpCall<'_, CpuTensor>| {
            let composite = call.composite_arg(0)?.clone();
            let source = Value::Tensor(composite.source().clone());
            let once = call.execute(ops::NEG, &[source], call.kwargs)?;
            call.redispatch(ops::ADD, vec![once, composite.into()], Kwargs::new())
        })
        .unwrap();

    let out = with_registry(registry, || {
        dispatch(&host, ops::NEG, vec![jagged().into()], Kwargs::new())
    })
    .unwrap();
    assert_eq!(tensor(out).as_f32().unwrap(), &[0.0; 4]);
}

#[test]
fn register_override_extends_default_registry() {
    let _lock = acquire_lock();
    static CALLS: AtomicUsize = AtomicUsize::new(0);
    let op = OpKey::new("test::default_registered");
    register_override::<CpuTensor, _>(op, |call: OpCall<'_, CpuTensor>| {
        CALLS.fetch_add(1, Ordering::SeqCst);
        Ok(Value::Bool(call.args[0].is_composite()))
    })
    .unwrap();

    let host = CpuExecutor::new();
    let out = dispatch(&host, op, vec![jagged().into()], Kwargs::new()).unwrap();
    assert!(matches!(out, Value::Bool(true)));
    assert_eq!(CALLS.load(Ordering::SeqCst), 1);

    // A fresh scope does not inherit default registrations.
    let err = with_registry(scoped(), || {
        dispatch(&host, op, vec![jagged().into()], Kwargs::new())
    })
    .unwrap_err();
    assert!(err.to_string().contains("not implemented"));
}

#[test]
fn builtin_clone_override_keeps_every_component() {
    let _lock = acquire_lock();
    let host = CpuExecutor::new();
    let out = dispatch(&host, ops::CLONE, vec![jagged().into()], Kwargs::new()).unwrap();
    let cloned = out.into_composite().unwrap();
    assert_eq!(cloned.source_key(), "values");
    assert_eq!(cloned.components(), jagged().components());
    assert_eq!(host.calls(), 2);
}

#[test]
fn builtin_to_override_moves_every_component() {
    let _lock = acquire_lock();
    let host = CpuExecutor::new();
    let mut kwargs = Kwargs::new();
    kwargs.insert("device".to_string(), Value::from("cuda:0"));
    let out = dispatch(&host, ops::TO, vec![jagged().into()], kwargs).unwrap();
    let moved = out.into_composite().unwrap();

    assert_eq!(moved.device(), Device::Cuda(0));
    assert_eq!(
        moved.component("offsets").unwrap().meta().device,
        Device::Cuda(0)
    );
}

#[test]
fn builtin_zeros_like_shares_auxiliary_components() {
    let _lock = acquire_lock();
    let host = CpuExecutor::new();
    let out = dispatch(&host, ops::ZEROS_LIKE, vec![jagged().into()], Kwargs::new()).unwrap();
    let zeros = out.into_composite().unwrap();

    assert_eq!(zeros.source().as_f32().unwrap(), &[0.0; 4]);
    assert_eq!(zeros.component("offsets").unwrap(), &offsets());
    assert_eq!(zeros.shape(), jagged().shape());
}

#[test]
fn builtin_overrides_fall_back_for_plain_tensors() {
    let _lock = acquire_lock();
    let host = CpuExecutor::new();
    let out = dispatch(&host, ops::CLONE, vec![Value::Tensor(values())], Kwargs::new()).unwrap();
    assert_eq!(tensor(out), values());
}
