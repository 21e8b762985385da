use tessel_device::{Dim, Shape, VectorDims};
use test_case::test_case;

use crate::eltwise::policy::{broadcast_dims, broadcast_mask, broadcast_strides};
use crate::eltwise::{BroadcastingPolicy, determine_broadcasting_policy};

#[test_case(&[2, 3, 4, 5], &[1, 3, 1, 1], BroadcastingPolicy::PerChannel; "per channel")]
#[test_case(&[2, 3, 4, 5], &[1, 1, 1, 1], BroadcastingPolicy::PerTensor; "per tensor")]
#[test_case(&[2, 3, 4, 5], &[1], BroadcastingPolicy::PerTensor; "scalar")]
#[test_case(&[2, 1, 4, 1], &[2, 1, 4, 1], BroadcastingPolicy::Undefined; "non channel dims")]
#[test_case(&[2, 3, 4, 5], &[3, 1, 1], BroadcastingPolicy::PerChannel; "right aligned channel")]
#[test_case(&[2, 3, 4, 3], &[3], BroadcastingPolicy::Undefined; "aligned to last axis")]
#[test_case(&[2, 3, 4, 5], &[1, 4, 1, 1], BroadcastingPolicy::Undefined; "channel mismatch")]
#[test_case(&[3], &[1, 3], BroadcastingPolicy::Undefined; "param rank exceeds input")]
fn test_broadcasting_policy(main: &[usize], param: &[usize], expected: BroadcastingPolicy) {
    assert_eq!(determine_broadcasting_policy(&Shape::from_static(main), &Shape::from_static(param)), expected);
}

#[test]
fn test_dynamic_channel_is_per_channel() {
    let main = Shape::new([Dim::Static(1), Dim::dynamic(), Dim::Static(4)]);
    assert_eq!(determine_broadcasting_policy(&main, &Shape::from_static(&[1, 8, 1])), BroadcastingPolicy::PerChannel);
}

#[test]
fn test_dynamic_param_is_undefined() {
    let main = Shape::from_static(&[1, 8, 4]);
    let param = Shape::new([Dim::Static(1), Dim::dynamic(), Dim::Static(1)]);
    assert_eq!(determine_broadcasting_policy(&main, &param), BroadcastingPolicy::Undefined);
}

#[test]
fn test_broadcast_dims() {
    let dims = broadcast_dims(&[VectorDims::from_slice(&[2, 1, 4]), VectorDims::from_slice(&[3, 1])]).unwrap();
    assert_eq!(dims.as_slice(), &[2, 3, 4]);
    assert!(broadcast_dims(&[VectorDims::from_slice(&[2, 3]), VectorDims::from_slice(&[4])]).is_err());
}

#[test]
fn test_broadcast_mask_right_aligned() {
    assert_eq!(broadcast_mask(&[3, 1], 3).as_slice(), &[true, false, true]);
    assert_eq!(broadcast_mask(&[2, 3, 4], 3).as_slice(), &[false, false, false]);
}

#[test]
fn test_broadcast_strides() {
    assert_eq!(broadcast_strides(&[3, 1], &[2, 3, 4]).unwrap().as_slice(), &[0, 1, 0]);
    assert_eq!(broadcast_strides(&[2, 3, 4], &[2, 3, 4]).unwrap().as_slice(), &[12, 4, 1]);
    assert!(broadcast_strides(&[5], &[2, 3, 4]).is_err());
}
