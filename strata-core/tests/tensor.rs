use proptest::prelude::*;
use strata_core::{
    contiguous_strides, AnyTensor, BaseTensor, Cpu, Device, DimensionRange, DimensionType,
    DimensionTypeTuple, Error, Ownership, ShapeTuple, StrideTuple, Tensor, ViewType, ALL,
};

use DimensionType::*;

fn tensor(shape: &[usize]) -> Tensor<f32, Cpu> {
    let types = [Sample, Channel, Spatial, Spatial, Sequence, Spatial, Spatial, Spatial];
    Tensor::new(
        ShapeTuple::try_from_slice(shape).unwrap(),
        DimensionTypeTuple::try_from_slice(&types[..shape.len()]).unwrap(),
    )
    .unwrap()
}

fn iota(shape: &[usize]) -> Tensor<f32, Cpu> {
    let mut t = tensor(shape);
    let n = t.numel();
    let ptr = t.data().unwrap();
    for i in 0..n {
        unsafe { *ptr.add(i) = i as f32 };
    }
    t
}

fn inner(err: Error) -> Error {
    match err {
        Error::WithBacktrace { inner, .. } => *inner,
        other => other,
    }
}

#[test]
fn owning_tensor_metadata() {
    let t = tensor(&[3, 4, 5]);
    assert_eq!(t.shape().as_slice(), &[3, 4, 5]);
    assert_eq!(t.dim_types().as_slice(), &[Sample, Channel, Spatial]);
    assert_eq!(t.strides().as_slice(), &[20, 5, 1]);
    assert_eq!(t.stride(1), 5);
    assert_eq!(t.view_type(), ViewType::None);
    assert_eq!(t.device(), Device::Cpu);
    assert_eq!(t.ownership(), Ownership::Owned);
    assert_eq!(t.numel(), 60);
    assert!(t.is_contiguous());
    assert_eq!(t.get(&[2, 3, 4]).unwrap(), 0.0);
}

#[test]
fn oversized_shape_rejected() {
    for shape in [[usize::MAX, 2], [usize::MAX / 2 + 2, 2]] {
        let err = Tensor::<u8, Cpu>::new(shape.into(), [Sample, Channel].into()).unwrap_err();
        assert!(matches!(err, Error::ShapeOverflow { .. }), "{err:?}");
    }
    let mut t = tensor(&[1, 2]);
    let err = t
        .resize_with_dim_types([usize::MAX, 3].into(), [Sample, Channel].into())
        .unwrap_err();
    assert!(matches!(err, Error::ShapeOverflow { .. }));
}

#[test]
fn unallocatable_shape_is_an_error() {
    // Representable element count, but more bytes than an allocation may hold.
    let res = Tensor::<i64, Cpu>::new([usize::MAX / 4].into(), [Sample].into());
    assert!(res.is_err());
}

#[test]
fn scalar_view_has_one_element() {
    let mut t = iota(&[2, 3]);
    let v = t
        .view_of(&[DimensionRange::Index(1), DimensionRange::Index(2)])
        .unwrap();
    assert_eq!(v.ndim(), 0);
    assert_eq!(v.numel(), 1);
    assert!(!v.is_empty());
    assert_eq!(v.get(&[]).unwrap(), 5.0);

    let owned = Tensor::<f32, Cpu>::new(ShapeTuple::new(), DimensionTypeTuple::new()).unwrap();
    assert_eq!(owned.numel(), 0);
    assert!(owned.is_empty());
}

#[test]
fn mismatched_dim_types_rejected() {
    let err = Tensor::<f32, Cpu>::new([2, 2].into(), [Sample].into()).unwrap_err();
    assert!(matches!(err, Error::RankMismatch { expected: 2, got: 1 }));
}

#[test]
fn view_aliases_parent() {
    let mut t = iota(&[4, 6]);
    let mut v = t
        .view_of(&[DimensionRange::range(1, 3), DimensionRange::range(2, 5)])
        .unwrap();
    assert_eq!(v.view_type(), ViewType::Mutable);
    assert_eq!(v.ownership(), Ownership::Aliased);
    assert_eq!(v.shape().as_slice(), &[2, 3]);
    assert_eq!(v.strides().as_slice(), &[6, 1]);
    assert!(!v.is_contiguous());
    assert_eq!(v.get(&[0, 0]).unwrap(), 8.0);
    assert_eq!(v.get(&[1, 2]).unwrap(), 16.0);

    v.set(&[1, 1], -1.0).unwrap();
    assert_eq!(t.get(&[2, 3]).unwrap(), -1.0);
    assert_eq!(v.const_data(), t.const_data().wrapping_add(8));
}

#[test]
fn index_selection_reduces_rank() {
    let mut t = iota(&[2, 3, 4]);
    let v = t.view_of(&[ALL, DimensionRange::Index(1)]).unwrap();
    assert_eq!(v.shape().as_slice(), &[2, 4]);
    assert_eq!(v.dim_types().as_slice(), &[Sample, Spatial]);
    assert_eq!(v.strides().as_slice(), &[12, 1]);
    assert_eq!(v.get(&[1, 3]).unwrap(), 12.0 + 4.0 + 3.0);
}

#[test]
fn full_view_round_trip() {
    let mut t = iota(&[3, 2, 5]);
    let v = t.view_of(&[ALL, ALL, ALL]).unwrap();
    assert_eq!(v.shape(), t.shape());
    assert_eq!(v.dim_types(), t.dim_types());
    assert_eq!(v.strides(), t.strides());
    let v = t.view().unwrap();
    assert_eq!(v.shape(), t.shape());
    assert!(v.is_contiguous());
}

#[test]
fn view_out_of_bounds() {
    let mut t = tensor(&[3, 3]);
    assert!(matches!(
        t.view_of(&[DimensionRange::range(2, 4)]),
        Err(Error::OutOfBounds { .. })
    ));
    assert!(matches!(
        t.view_of(&[ALL, ALL, ALL]),
        Err(Error::RankMismatch { .. })
    ));
    assert!(matches!(t.get(&[3, 0]), Err(Error::OutOfBounds { .. })));
}

#[test]
fn const_view_refuses_mutation() {
    let t = iota(&[2, 2]);
    let mut c = t.const_view().unwrap();
    assert_eq!(c.view_type(), ViewType::Const);
    assert!(matches!(c.data(), Err(Error::InvalidAccess(_))));
    assert!(matches!(c.set(&[0, 0], 1.0), Err(Error::InvalidAccess(_))));
    assert!(matches!(c.view(), Err(Error::InvalidAccess(_))));
    assert_eq!(c.const_data(), t.const_data());
    assert_eq!(c.get(&[1, 1]).unwrap(), 3.0);

    let cc = c.const_view_of(&[DimensionRange::Index(1)]).unwrap();
    assert_eq!(cc.get(&[0]).unwrap(), 2.0);
}

#[test]
fn empty_view_leaves_parent_alone() {
    let mut t = iota(&[3, 4]);
    let mut v = t.view_of(&[DimensionRange::Index(1)]).unwrap();
    v.empty();
    assert_eq!(v.view_type(), ViewType::None);
    assert!(v.shape().is_empty());
    assert!(v.dim_types().is_empty());
    assert!(v.const_data().is_null());

    assert_eq!(t.shape().as_slice(), &[3, 4]);
    for i in 0..12 {
        assert_eq!(t.get(&[i / 4, i % 4]).unwrap(), i as f32);
    }
}

#[test]
fn unview_matches_empty() {
    let mut t = iota(&[5]);
    let mut v = t.view().unwrap();
    v.unview();
    assert!(!v.is_view());
    assert_eq!(v.ownership(), Ownership::Empty);
    assert_eq!(t.get(&[4]).unwrap(), 4.0);
}

#[test]
fn view_survives_parent_empty() {
    let mut t = iota(&[2, 3]);
    let v = t.const_view_of(&[DimensionRange::Index(1)]).unwrap();
    t.empty();
    assert!(t.const_data().is_null());
    assert_eq!(t.ownership(), Ownership::Empty);
    assert_eq!(v.get(&[2]).unwrap(), 5.0);
}

#[test]
fn empty_then_resize() {
    let mut t = tensor(&[2, 2]);
    t.empty();
    assert!(t.is_empty());
    t.resize_with_dim_types([3, 5].into(), [Sample, Sequence].into())
        .unwrap();
    assert_eq!(t.shape().as_slice(), &[3, 5]);
    assert_eq!(t.strides().as_slice(), &[5, 1]);
    assert!(!t.const_data().is_null());
}

#[test]
fn resize_rules() {
    let mut t = tensor(&[2, 3, 4]);
    t.resize([6, 2].into()).unwrap();
    assert_eq!(t.shape().as_slice(), &[6, 2]);
    assert_eq!(t.dim_types().as_slice(), &[Sample, Channel]);
    assert_eq!(t.strides().as_slice(), &[2, 1]);

    t.resize([7, 7].into()).unwrap();
    assert_eq!(t.dim_types().as_slice(), &[Sample, Channel]);

    let err = t.resize([1, 2, 3].into()).unwrap_err();
    assert!(matches!(inner(err), Error::InvalidOperation(_)));

    t.resize_with_dim_types([1, 2, 3].into(), [Spatial, Spatial, Spatial].into())
        .unwrap();
    assert_eq!(t.ndim(), 3);

    let err = t
        .resize_with_dim_types([1, 2].into(), [Spatial].into())
        .unwrap_err();
    assert!(matches!(err, Error::RankMismatch { .. }));
}

#[test]
fn resize_view_fails() {
    let mut t = tensor(&[4, 4]);
    let mut v = t.view().unwrap();
    assert!(matches!(v.resize([2, 2].into()), Err(Error::InvalidOperation(_))));
    assert!(matches!(
        v.resize_with_dim_types([2].into(), [Sample].into()),
        Err(Error::InvalidOperation(_))
    ));
    let mut c = t.const_view().unwrap();
    assert!(matches!(c.resize([1].into()), Err(Error::InvalidOperation(_))));
}

#[test]
fn contiguous_is_a_view_or_not_implemented() {
    let mut t = iota(&[3, 3]);
    let c = t.contiguous().unwrap();
    assert_eq!(c.view_type(), ViewType::Mutable);
    assert_eq!(c.const_data(), t.const_data());

    let mut strided = t.view_of(&[ALL, DimensionRange::range(0, 2)]).unwrap();
    assert!(matches!(
        strided.contiguous(),
        Err(Error::NotImplemented(_))
    ));

    let mut row = t.const_view_of(&[DimensionRange::Index(1)]).unwrap();
    assert_eq!(row.contiguous().unwrap().view_type(), ViewType::Const);
}

#[test]
fn raw_parts_views() {
    let mut buf: Vec<i32> = (0..12).collect();
    let mut t = unsafe {
        Tensor::<i32, Cpu>::from_raw_parts(
            buf.as_mut_ptr(),
            [3, 2].into(),
            [Sample, Channel].into(),
            StrideTuple::from([4, 2]),
        )
    }
    .unwrap();
    assert!(t.is_view());
    assert_eq!(t.ownership(), Ownership::Borrowed);
    assert!(!t.is_contiguous());
    assert_eq!(t.get(&[2, 1]).unwrap(), 10);
    assert!(matches!(t.resize([1, 1].into()), Err(Error::InvalidOperation(_))));
    t.set(&[0, 1], 100).unwrap();

    let c = unsafe {
        Tensor::<i32, Cpu>::from_raw_parts_const(
            buf.as_ptr(),
            [12].into(),
            [Sequence].into(),
            [1].into(),
        )
    }
    .unwrap();
    assert!(c.is_const_view());
    assert_eq!(c.get(&[2]).unwrap(), 100);
    drop((t, c));
    assert_eq!(buf[2], 100);
}

#[test]
fn any_tensor_delegates() {
    let mut t: AnyTensor<f64> = Tensor::<f64, Cpu>::new([2, 3].into(), [Sample, Channel].into())
        .unwrap()
        .into();
    assert_eq!(t.device(), Device::Cpu);
    assert!(t.is_contiguous());
    let v = t.view().unwrap();
    assert!(matches!(v, AnyTensor::Cpu(_)));
    assert_eq!(v.view_type(), ViewType::Mutable);
    let c = t.const_view().unwrap();
    assert_eq!(c.view_type(), ViewType::Const);
    t.empty();
    assert!(t.shape().is_empty());
}

fn shapes() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(1usize..6, 1..5)
}

fn shape_and_selector() -> impl Strategy<Value = (Vec<usize>, Vec<DimensionRange>)> {
    shapes().prop_flat_map(|shape| {
        let sel: Vec<_> = shape
            .iter()
            .map(|&d| {
                prop_oneof![
                    Just(ALL),
                    (0..d).prop_map(DimensionRange::Index),
                    (0..d)
                        .prop_flat_map(move |s| (Just(s), s + 1..=d))
                        .prop_map(|(s, e)| DimensionRange::range(s, e)),
                ]
            })
            .collect();
        (Just(shape), sel)
    })
}

proptest! {
    #[test]
    fn owning_tensors_are_contiguous(shape in shapes()) {
        let t = tensor(&shape);
        prop_assert!(t.is_contiguous());
        let expected = contiguous_strides(&shape).unwrap();
        prop_assert_eq!(t.strides().as_slice(), expected.as_slice());
    }

    #[test]
    fn views_alias_without_copy((shape, sel) in shape_and_selector()) {
        let mut t = iota(&shape);
        let parent_strides = t.strides().clone();
        let mut v = t.view_of(&sel).unwrap();

        let kept: Vec<usize> = sel
            .iter()
            .zip(parent_strides.iter())
            .filter(|(c, _)| !c.is_trivial())
            .map(|(_, &s)| s)
            .collect();
        prop_assert_eq!(v.strides().as_slice(), kept.as_slice());

        let offset: usize = sel
            .iter()
            .zip(parent_strides.iter())
            .map(|(c, s)| c.start() * s)
            .sum();
        prop_assert_eq!(v.const_data(), t.const_data().wrapping_add(offset));

        if v.ndim() > 0 {
            let zero = vec![0; v.ndim()];
            v.set(&zero, -7.0).unwrap();
            let parent_coord: Vec<usize> = sel.iter().map(|c| c.start()).collect();
            prop_assert_eq!(t.get(&parent_coord).unwrap(), -7.0);
        }
    }
}
