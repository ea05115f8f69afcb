use composite_tensor::{
    CompositeTensor, DType, Device, Layout, ProxyError, TensorLike, TensorMeta,
};
use composite_tensor_ref_cpu::CpuTensor;
use indexmap::IndexMap;

fn values() -> CpuTensor {
    CpuTensor::from_vec([4, 3], (0..12).map(|v| v as f32).collect()).unwrap()
}

fn offsets() -> CpuTensor {
    CpuTensor::from_i64([5], vec![0, 3, 5, 9, 12]).unwrap()
}

fn jagged() -> CompositeTensor<CpuTensor> {
    CompositeTensor::from_components([("values", values()), ("offsets", offsets())], "values")
        .unwrap()
}

#[test]
fn jagged_example_exposes_values_shape() {
    let proxy = jagged();
    assert_eq!(proxy.shape().dims(), &[4, 3]);
    assert_eq!(proxy.component("offsets").unwrap(), &offsets());

    let err = proxy.component("lengths").unwrap_err();
    assert!(matches!(
        err,
        ProxyError::UnknownAttribute {
            type_name: "CompositeTensor",
            ref name,
        } if name == "lengths"
    ));
    assert!(err.to_string().contains("'lengths'"));
}

#[test]
fn metadata_is_copied_from_source_exactly() {
    let source = values().requires_grad(true).on_device(Device::Xpu(1));
    let expected = source.meta();
    let proxy =
        CompositeTensor::from_components([("offsets", offsets()), ("values", source)], "values")
            .unwrap();

    assert_eq!(proxy.meta(), &expected);
    assert_eq!(proxy.strides(), expected.strides.as_slice());
    assert_eq!(proxy.storage_offset(), expected.storage_offset);
    assert_eq!(proxy.device(), Device::Xpu(1));
    assert_eq!(proxy.layout(), Layout::Strided);
    assert!(proxy.requires_grad());
    assert_eq!(proxy.dtype(), DType::F32);
    assert_eq!(TensorLike::meta(&proxy), expected);
}

#[derive(Debug, Clone, PartialEq)]
struct ViewStub {
    meta: TensorMeta,
}

impl TensorLike for ViewStub {
    fn meta(&self) -> TensorMeta {
        self.meta.clone()
    }
}

#[test]
fn strided_view_metadata_is_not_recomputed() {
    // Transposed view into a larger buffer: strides are not the contiguous ones for [3, 4].
    let view = ViewStub {
        meta: TensorMeta::contiguous([3, 4], DType::BF16)
            .with_strides(vec![1, 3])
            .with_storage_offset(7)
            .with_layout(Layout::Jagged)
            .with_device(Device::Cuda(2)),
    };
    let lengths = ViewStub {
        meta: TensorMeta::contiguous([3], DType::I64),
    };
    assert!(!view.meta.is_contiguous());

    let proxy =
        CompositeTensor::from_components([("lengths", lengths), ("values", view.clone())], "values")
            .unwrap();

    assert_eq!(proxy.strides(), &[1, 3]);
    assert_eq!(proxy.storage_offset(), 7);
    assert_eq!(proxy.layout(), Layout::Jagged);
    assert_eq!(proxy.dtype(), DType::BF16);
    assert_eq!(proxy.device(), Device::Cuda(2));
    assert_eq!(proxy.meta(), &view.meta);

    let (_, context) = proxy.flatten();
    let rebuilt = CompositeTensor::unflatten(proxy.into_components(), context).unwrap();
    assert_eq!(rebuilt.meta(), &view.meta);
}

#[test]
fn source_can_be_an_auxiliary_looking_component() {
    let proxy =
        CompositeTensor::from_components([("values", values()), ("offsets", offsets())], "offsets")
            .unwrap();
    assert_eq!(proxy.shape().dims(), &[5]);
    assert_eq!(proxy.dtype(), DType::I64);
    assert_eq!(proxy.source(), &offsets());
}

#[test]
fn absent_source_key_fails_with_lookup_error() {
    let mut components = IndexMap::new();
    components.insert("values".to_string(), values());
    let err = CompositeTensor::new(components, "offsets").unwrap_err();
    assert!(matches!(err, ProxyError::MissingSource { ref key } if key == "offsets"));
}

#[test]
fn flatten_unflatten_round_trip_with_non_leading_source() {
    let proxy =
        CompositeTensor::from_components([("offsets", offsets()), ("values", values())], "values")
            .unwrap();

    let (keys, context) = proxy.flatten();
    assert_eq!(keys, vec!["offsets".to_string(), "values".to_string()]);

    let inner: IndexMap<String, CpuTensor> = keys
        .iter()
        .map(|key| (key.clone(), proxy.component(key).unwrap().clone()))
        .collect();
    let rebuilt = CompositeTensor::unflatten(inner, context).unwrap();

    assert_eq!(rebuilt.source_key(), proxy.source_key());
    assert_eq!(rebuilt.components(), proxy.components());
    assert_eq!(rebuilt.meta(), proxy.meta());
    assert_eq!(
        rebuilt.keys().collect::<Vec<_>>(),
        proxy.keys().collect::<Vec<_>>()
    );
}

#[test]
fn unflatten_with_replaced_components_rederives_metadata() {
    let proxy = jagged();
    let (keys, context) = proxy.flatten();
    let inner: IndexMap<String, CpuTensor> = keys
        .into_iter()
        .map(|key| {
            let component = proxy.component(&key).unwrap().clone();
            (key, component.on_device(Device::Cuda(0)))
        })
        .collect();

    let moved = CompositeTensor::unflatten(inner, context).unwrap();
    assert_eq!(moved.device(), Device::Cuda(0));
    assert_eq!(proxy.device(), Device::Cpu);
}

#[test]
fn display_mirrors_source_component() {
    let proxy = jagged();
    assert_eq!(
        proxy.to_string(),
        format!("CompositeTensor({:?})", proxy.source())
    );
}

#[test]
fn metadata_constructor_defaults() {
    let meta = TensorMeta::contiguous([2, 3], DType::F16);
    assert!(meta.is_contiguous());
    assert_eq!(meta.device, Device::Cpu);
    assert!(!meta.requires_grad);
}
