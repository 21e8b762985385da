use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use tessel_device::{Allocator, CpuAllocator, Memory, MemoryDesc};
use tessel_dtype::Precision;
use test_case::test_case;

use crate::post_ops::{erf, padded_channels};
use crate::{Algorithm, Arg, ExecArgs, PostOp, PostOps, ResolvedPostOps};

fn allocator() -> Arc<dyn Allocator> {
    Arc::new(CpuAllocator)
}

fn hash_of<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

#[test_case(Algorithm::EltwiseRelu, -2.0, 0.5, 0.0, -1.0; "leaky relu")]
#[test_case(Algorithm::EltwiseRelu, 3.0, 0.0, 0.0, 3.0; "relu positive")]
#[test_case(Algorithm::EltwiseClip, 7.0, -1.0, 6.0, 6.0; "clip upper")]
#[test_case(Algorithm::EltwiseLinear, 2.0, 3.0, 1.0, 7.0; "linear")]
#[test_case(Algorithm::EltwisePow, 3.0, 2.0, 2.0, 18.0; "pow")]
#[test_case(Algorithm::EltwiseHardswish, 6.0, 1.0 / 6.0, 0.5, 6.0; "hardswish saturated")]
#[test_case(Algorithm::EltwiseRoundHalfToEven, 2.5, 0.0, 0.0, 2.0; "round half to even")]
#[test_case(Algorithm::EltwiseRoundHalfAwayFromZero, 2.5, 0.0, 0.0, 3.0; "round half away")]
#[test_case(Algorithm::EltwiseLogistic, 0.0, 0.0, 0.0, 0.5; "logistic")]
fn test_eltwise(alg: Algorithm, x: f32, alpha: f32, beta: f32, expected: f32) {
    assert!((alg.eltwise(x, alpha, beta) - expected).abs() < 1e-6);
}

#[test_case(Algorithm::BinaryAdd, 5.0)]
#[test_case(Algorithm::BinarySub, 1.0)]
#[test_case(Algorithm::BinaryMul, 6.0)]
#[test_case(Algorithm::BinaryDiv, 1.5)]
#[test_case(Algorithm::BinaryMax, 3.0)]
#[test_case(Algorithm::BinaryMin, 2.0)]
#[test_case(Algorithm::BinarySquaredDifference, 1.0)]
#[test_case(Algorithm::BinaryPow, 9.0)]
fn test_binary(alg: Algorithm, expected: f32) {
    assert_eq!(alg.binary(3.0, 2.0), expected);
}

#[test]
fn test_erf() {
    assert!(erf(0.0).abs() < 1e-6);
    assert!((erf(1.0) - 0.842_700_8).abs() < 1e-5);
    assert!((erf(-1.0) + 0.842_700_8).abs() < 1e-5);
}

#[test]
fn test_padded_channels() {
    assert_eq!(padded_channels(1), 16);
    assert_eq!(padded_channels(16), 16);
    assert_eq!(padded_channels(17), 32);
}

#[test]
fn test_chain_applies_in_order() {
    let mut builder = PostOps::builder();
    builder.eltwise(Algorithm::EltwiseLinear, 2.0, 0.0).eltwise(Algorithm::EltwiseLinear, 1.0, 1.0);
    let (post_ops, operands) = builder.build();
    assert!(operands.is_empty());

    let resolved = ResolvedPostOps::resolve(&post_ops, &ExecArgs::new()).unwrap();
    // (x * 2) + 1, not (x + 1) * 2
    assert_eq!(resolved.apply(3.0, 0), 7.0);
}

#[test]
fn test_scale_shift_per_channel() {
    let padded = padded_channels(2);
    let mut values = vec![0.0; 2 * padded];
    values[0] = 2.0;
    values[1] = 3.0;
    values[padded] = 1.0;
    values[padded + 1] = -1.0;
    let operand = Memory::from_values(allocator(), Arc::new(MemoryDesc::planar(Precision::F32, &[2 * padded])), &values)
        .unwrap();

    let mut builder = PostOps::builder();
    builder.eltwise(Algorithm::EltwiseRelu, 0.0, 0.0);
    builder.push_with_operand(
        PostOp::ScaleShift { alg: Algorithm::DepthwiseScaleShift, axis: 1, operand: operand.desc().clone() },
        operand,
    );
    let (post_ops, operands) = builder.build();
    assert_eq!(operands.len(), 1);
    assert_eq!(operands[0].0, 1);

    let mut args = ExecArgs::new();
    for (index, memory) in operands {
        args.bind(Arg::PostOp(index), memory);
    }
    let resolved = ResolvedPostOps::resolve(&post_ops, &args).unwrap();
    assert_eq!(resolved.apply(1.0, 0), 3.0);
    assert_eq!(resolved.apply(1.0, 1), 2.0);
    assert_eq!(resolved.apply(-5.0, 1), -1.0);
}

#[test]
fn test_missing_operand_is_reported() {
    let desc = Arc::new(MemoryDesc::planar(Precision::F32, &[16]));
    let mut builder = PostOps::builder();
    builder.push(PostOp::Binary { alg: Algorithm::BinaryAdd, axis: 1, operand: desc });
    let (post_ops, _) = builder.build();

    assert!(ResolvedPostOps::resolve(&post_ops, &ExecArgs::new()).is_err());
}

#[test]
fn test_convert_saturates() {
    let mut builder = PostOps::builder();
    builder.eltwise(Algorithm::EltwiseLinear, 100.0, 0.0).convert(Precision::I8);
    let (post_ops, _) = builder.build();

    assert_eq!(post_ops.output_precision(Precision::F32), Precision::I8);
    let resolved = ResolvedPostOps::resolve(&post_ops, &ExecArgs::new()).unwrap();
    assert_eq!(resolved.apply(2.0, 0), 127.0);
}

#[test]
fn test_equal_chains_hash_equal() {
    let operand = |dims: &[usize]| Arc::new(MemoryDesc::planar(Precision::F32, dims));
    let chain = |dims: &[usize]| {
        let mut builder = PostOps::builder();
        builder.eltwise(Algorithm::EltwiseElu, 1.0, 0.0).push(PostOp::Binary {
            alg: Algorithm::BinaryMul,
            axis: 1,
            operand: operand(dims),
        });
        builder.build().0
    };

    // Distinct descriptor objects with equal content
    assert_eq!(chain(&[16]), chain(&[16]));
    assert_eq!(hash_of(&chain(&[16])), hash_of(&chain(&[16])));
    assert_ne!(chain(&[16]), chain(&[32]));
}

#[test]
fn test_immediates_compare_bitwise() {
    let a = PostOp::Eltwise { alg: Algorithm::EltwiseLinear, alpha: 0.0, beta: 0.0 };
    let b = PostOp::Eltwise { alg: Algorithm::EltwiseLinear, alpha: -0.0, beta: 0.0 };
    assert_ne!(a, b);
    assert_eq!(a, a.clone());
}

#[test]
fn test_extend_keeps_existing_ops() {
    let mut builder = PostOps::builder();
    builder.eltwise(Algorithm::EltwiseTanh, 0.0, 0.0);
    let (base, _) = builder.build();

    let mut extended = base.extend();
    extended.convert(Precision::BF16);
    let (extended, _) = extended.build();

    assert_eq!(base.len(), 1);
    assert_eq!(extended.len(), 2);
    assert_eq!(extended.as_slice()[0], base.as_slice()[0]);
}
