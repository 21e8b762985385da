use std::sync::Arc;

use smallvec::smallvec;
use tessel_device::{Dim, Shape, VectorDims};
use tessel_dtype::Precision;
use tessel_runtime::{Algorithm, Arg, Error, ExecArgs, Isa, PostOps};
use test_case::test_case;

use crate::eltwise::executor::build_executor;
use crate::eltwise::{EltwiseData, EltwiseImplType, EltwiseKey, EltwiseOp};
use crate::node::{Node, compile, run};
use crate::test::{assert_close, context, memory, zeros};
use crate::{BroadcastingPolicy, Config, Eltwise, GraphContext, IsaCap, OpKind, Operation, Port};

fn unary(kind: OpKind) -> Eltwise {
    let port = Port::from_dims(&[2, 3], Precision::F32);
    Eltwise::new(&Operation::new("unary", kind, vec![port.clone()], vec![port])).unwrap()
}

/// Binary op on a `[2, 3]` data input with a constant at `constant_port`.
fn with_constant(kind: OpKind, constant_port: usize, dims: &[usize], values: &[f32]) -> Eltwise {
    let data = Port::from_dims(&[2, 3], Precision::F32);
    let mut inputs = vec![data.clone(), data.clone()];
    inputs[constant_port] = Port::constant(dims, values.to_vec());
    Eltwise::new(&Operation::new("binary", kind, inputs, vec![data])).unwrap()
}

#[test]
fn test_activation_initializers() {
    let hswish = unary(OpKind::HSwish);
    assert_eq!(hswish.backend_algorithm(), Algorithm::EltwiseHardswish);
    assert_eq!(hswish.alpha(), 1.0 / 6.0);
    assert_eq!(hswish.beta(), 0.5);

    let negative = unary(OpKind::Negative);
    assert_eq!(negative.backend_algorithm(), Algorithm::EltwiseLinear);
    assert_eq!(negative.alpha(), -1.0);

    let leaky = unary(OpKind::LeakyRelu { slope: 0.1 });
    assert_eq!(leaky.backend_algorithm(), Algorithm::EltwiseRelu);
    assert_eq!(leaky.alpha(), 0.1);

    let clamp = unary(OpKind::Clamp { min: -1.0, max: 2.0 });
    assert_eq!((clamp.alpha(), clamp.beta()), (-1.0, 2.0));
    assert_eq!(clamp.op(), EltwiseOp::Activation);
}

#[test_case(1.0, 0.0, Algorithm::EltwisePow; "plain power")]
#[test_case(3.0, 1.0, Algorithm::Undef; "scaled power")]
fn test_power_static_algorithm(scale: f32, shift: f32, expected: Algorithm) {
    let node = unary(OpKind::PowerStatic { power: 2.0, scale, shift });
    assert_eq!(node.backend_algorithm(), expected);
    assert_eq!((node.alpha(), node.beta(), node.gamma()), (2.0, scale, shift));
}

#[test_case(OpKind::Add, 1, &[1.0, 2.0, 3.0], &[1.0], &[1.0, 2.0, 3.0]; "add")]
#[test_case(OpKind::Subtract, 1, &[1.0, 2.0, 3.0], &[1.0], &[-1.0, -2.0, -3.0]; "subtract constant")]
#[test_case(OpKind::Subtract, 0, &[1.0, 2.0, 3.0], &[-1.0], &[1.0, 2.0, 3.0]; "subtract from constant")]
#[test_case(OpKind::Multiply, 0, &[2.0, 4.0, 8.0], &[2.0, 4.0, 8.0], &[0.0]; "multiply")]
#[test_case(OpKind::Divide, 1, &[2.0, 4.0, 8.0], &[0.5, 0.25, 0.125], &[0.0]; "divide")]
#[test_case(OpKind::Divide, 0, &[2.0, 4.0, 8.0], &[], &[]; "divide constant")]
#[test_case(OpKind::Maximum, 0, &[2.0, 4.0, 8.0], &[2.0, 4.0, 8.0], &[]; "maximum")]
fn test_scales_and_shifts(kind: OpKind, port: usize, values: &[f32], scales: &[f32], shifts: &[f32]) {
    let node = with_constant(kind, port, &[1, 3], values);
    assert_eq!(node.scales(), scales);
    assert_eq!(node.shifts(), shifts);
    assert_eq!(node.expressible_as_post_ops(), !scales.is_empty());
    assert_eq!(node.broadcasting_policy(), BroadcastingPolicy::PerChannel);
}

#[test_case(Precision::BF16, Precision::F32, Precision::F32; "wider second")]
#[test_case(Precision::I8, Precision::BF16, Precision::BF16; "float over int")]
fn test_runtime_precision(lhs: Precision, rhs: Precision, expected: Precision) {
    let op = Operation::new(
        "add",
        OpKind::Add,
        vec![Port::from_dims(&[2, 3], lhs), Port::from_dims(&[2, 3], rhs)],
        vec![Port::from_dims(&[2, 3], expected)],
    );
    assert_eq!(Eltwise::new(&op).unwrap().runtime_precision(), expected);
}

#[test]
fn test_runtime_precision_ignores_constants() {
    let op = Operation::new(
        "add",
        OpKind::Add,
        vec![Port::from_dims(&[2, 3], Precision::I8), Port::constant(&[1], vec![1.0])],
        vec![Port::from_dims(&[2, 3], Precision::I8)],
    );
    assert_eq!(Eltwise::new(&op).unwrap().runtime_precision(), Precision::I8);
}

#[test]
fn test_is_with_broadcast() {
    assert!(with_constant(OpKind::Add, 1, &[1, 3], &[1.0, 2.0, 3.0]).is_with_broadcast());
    assert!(!with_constant(OpKind::Add, 1, &[2, 3], &[0.0; 6]).is_with_broadcast());
    assert!(!unary(OpKind::Relu).is_with_broadcast());
}

#[test]
fn test_unsupported_operations() {
    let port = Port::from_dims(&[2, 3], Precision::F32);
    let cases = [
        Operation::new("softmax", OpKind::Softmax { axis: 1 }, vec![port.clone()], vec![port.clone()]),
        Operation::new("add", OpKind::Add, vec![port.clone()], vec![port.clone()]),
        Operation::new(
            "add",
            OpKind::Add,
            vec![Port::constant(&[1], vec![1.0]), Port::constant(&[1], vec![2.0])],
            vec![port.clone()],
        ),
        Operation::new("relu", OpKind::Relu, vec![port.clone()], vec![port.clone(), port]),
    ];
    for op in &cases {
        assert!(matches!(Eltwise::new(op), Err(Error::UnsupportedOperation { .. })), "{}", op.kind);
    }
}

fn add_node(lhs: &[usize], rhs: &[usize], out: &[usize]) -> Eltwise {
    let op = Operation::new(
        "add",
        OpKind::Add,
        vec![Port::from_dims(lhs, Precision::F32), Port::from_dims(rhs, Precision::F32)],
        vec![Port::from_dims(out, Precision::F32)],
    );
    Eltwise::new(&op).unwrap()
}

#[test_case(IsaCap::Force(Isa::Avx2), EltwiseImplType::Optimized; "optimized")]
#[test_case(IsaCap::Disabled, EltwiseImplType::Reference; "reference")]
fn test_binary_broadcast(isa: IsaCap, expected: EltwiseImplType) {
    let ctx = context(isa);
    let lhs: Vec<f32> = (0..24).map(|v| v as f32).collect();
    let rhs = [100.0, 200.0, 300.0];

    let mut node = add_node(&[2, 3, 4], &[1, 3, 1], &[2, 3, 4]);
    let dst = zeros(Precision::F32, &[2, 3, 4]);
    node.base_mut().bind_input(0, memory(&[2, 3, 4], &lhs));
    node.base_mut().bind_input(1, memory(&[1, 3, 1], &rhs));
    node.base_mut().bind_output(0, dst.clone());

    compile(&mut node, &ctx).unwrap();
    assert_eq!(node.impl_type(), expected);
    run(&mut node, &ctx).unwrap();

    let expected: Vec<f32> = lhs.iter().enumerate().map(|(i, v)| v + rhs[(i / 4) % 3]).collect();
    assert_close(&dst.to_values().unwrap(), &expected);
}

fn multiply_key(impl_type: EltwiseImplType, lhs: &[usize], rhs: &[usize]) -> EltwiseKey {
    let in_dims: Vec<VectorDims> = vec![VectorDims::from_slice(lhs), VectorDims::from_slice(rhs)];
    EltwiseKey {
        data: EltwiseData { op: EltwiseOp::Multiply, algorithm: Algorithm::BinaryMul, alpha: 0.0, beta: 0.0, gamma: 0.0 },
        out_blocked_dims: VectorDims::from_slice(lhs),
        out_order: (0..lhs.len()).collect(),
        in_dims,
        in_precisions: smallvec![Precision::F32, Precision::F32],
        out_precision: Precision::F32,
        post_ops: PostOps::default(),
        impl_type,
    }
}

#[test]
fn test_executors_agree() {
    let lhs: Vec<f32> = (0..24).map(|v| v as f32 * 0.5).collect();
    let rhs = [1.0, -1.0, 2.0];
    let expected: Vec<f32> = lhs.iter().enumerate().map(|(i, v)| v * rhs[(i / 4) % 3]).collect();

    for impl_type in [EltwiseImplType::Reference, EltwiseImplType::Optimized, EltwiseImplType::ShapeAgnostic] {
        let executor = build_executor(&multiply_key(impl_type, &[2, 3, 4], &[3, 1])).unwrap();
        assert_eq!(executor.impl_type(), impl_type);
        assert_eq!(executor.out_dims(), &[2, 3, 4]);
        assert_eq!(executor.batch_dim_idx(), 0);

        let dst = zeros(Precision::F32, &[2, 3, 4]);
        let args = ExecArgs::new()
            .with(Arg::Src(0), memory(&[2, 3, 4], &lhs))
            .with(Arg::Src(1), memory(&[3, 1], &rhs))
            .with(Arg::Dst, dst.clone());
        executor.exec(&args, &[2, 3, 4]).unwrap();
        assert_close(&dst.to_values().unwrap(), &expected);
    }
}

#[test]
fn test_optimized_rejects_other_dims() {
    let executor = build_executor(&multiply_key(EltwiseImplType::Optimized, &[2, 3, 4], &[3, 1])).unwrap();
    let args = ExecArgs::new()
        .with(Arg::Src(0), memory(&[1, 3, 4], &[0.0; 12]))
        .with(Arg::Src(1), memory(&[3, 1], &[0.0; 3]))
        .with(Arg::Dst, zeros(Precision::F32, &[1, 3, 4]));
    assert!(matches!(executor.exec(&args, &[1, 3, 4]), Err(Error::InvalidConfiguration { .. })));
}

#[test]
fn test_shape_agnostic_serves_new_dims() {
    let executor = build_executor(&multiply_key(EltwiseImplType::ShapeAgnostic, &[2, 3, 4], &[3, 1])).unwrap();
    let lhs: Vec<f32> = (0..15).map(|v| v as f32).collect();
    let dst = zeros(Precision::F32, &[1, 3, 5]);
    let args = ExecArgs::new()
        .with(Arg::Src(0), memory(&[1, 3, 5], &lhs))
        .with(Arg::Src(1), memory(&[3, 1], &[1.0, 2.0, 3.0]))
        .with(Arg::Dst, dst.clone());
    executor.exec(&args, &[1, 3, 5]).unwrap();

    let expected: Vec<f32> = lhs.iter().enumerate().map(|(i, v)| v * (i / 5 + 1) as f32).collect();
    assert_close(&dst.to_values().unwrap(), &expected);
}

fn dynamic_add() -> Eltwise {
    let data = Port::new(Shape::new([Dim::dynamic(), Dim::Static(3)]), Precision::F32);
    let op = Operation::new(
        "add",
        OpKind::Add,
        vec![data.clone(), Port::constant(&[1, 3], vec![10.0, 20.0, 30.0])],
        vec![data],
    );
    Eltwise::new(&op).unwrap()
}

fn run_rows(node: &mut Eltwise, ctx: &GraphContext, rows: usize) {
    let input: Vec<f32> = (0..rows * 3).map(|v| v as f32).collect();
    let dst = zeros(Precision::F32, &[rows, 3]);
    node.base_mut().bind_input(0, memory(&[rows, 3], &input));
    node.base_mut().bind_output(0, dst.clone());
    run(node, ctx).unwrap();

    let expected: Vec<f32> = input.iter().enumerate().map(|(i, v)| v + [10.0, 20.0, 30.0][i % 3]).collect();
    assert_close(&dst.to_values().unwrap(), &expected);
}

#[test]
fn test_shape_agnostic_skips_prepare() {
    let ctx = context(IsaCap::Force(Isa::Avx2));
    let mut node = dynamic_add();
    compile(&mut node, &ctx).unwrap();

    run_rows(&mut node, &ctx, 2);
    assert_eq!(node.impl_type(), EltwiseImplType::ShapeAgnostic);
    let executor = Arc::clone(node.executor().unwrap());

    node.base_mut().bind_input(0, memory(&[5, 3], &[0.0; 15]));
    assert!(!node.need_prepare_params());
    run_rows(&mut node, &ctx, 5);
    assert!(Arc::ptr_eq(&executor, node.executor().unwrap()));

    // A unit batch changes the broadcast mask
    node.base_mut().bind_input(0, memory(&[1, 3], &[0.0; 3]));
    assert!(node.need_prepare_params());
    run_rows(&mut node, &ctx, 1);
    assert!(!Arc::ptr_eq(&executor, node.executor().unwrap()));
}

#[test]
fn test_shape_agnostic_disabled() {
    let ctx = GraphContext::new(Config::builder().isa(IsaCap::Force(Isa::Avx2)).shape_agnostic(false).build());
    let mut node = dynamic_add();
    compile(&mut node, &ctx).unwrap();

    run_rows(&mut node, &ctx, 2);
    assert_eq!(node.impl_type(), EltwiseImplType::Optimized);
    node.base_mut().bind_input(0, memory(&[4, 3], &[0.0; 12]));
    assert!(node.need_prepare_params());
    run_rows(&mut node, &ctx, 4);
}

#[test]
fn test_standalone_convert_saturates() {
    let ctx = context(IsaCap::Disabled);
    let op = Operation::new(
        "convert",
        OpKind::Convert { to: Precision::U8 },
        vec![Port::from_dims(&[4], Precision::F32)],
        vec![Port::from_dims(&[4], Precision::U8)],
    );
    let mut node = Eltwise::new(&op).unwrap();
    let dst = zeros(Precision::U8, &[4]);
    node.base_mut().bind_input(0, memory(&[4], &[-1.5, 0.4, 200.7, 300.0]));
    node.base_mut().bind_output(0, dst.clone());

    compile(&mut node, &ctx).unwrap();
    run(&mut node, &ctx).unwrap();
    assert_eq!(dst.to_values().unwrap(), vec![0.0, 0.0, 201.0, 255.0]);
}

#[test]
fn test_execute_before_prepare() {
    let ctx = context(IsaCap::Disabled);
    let mut node = unary(OpKind::Relu);
    compile(&mut node, &ctx).unwrap();
    assert!(matches!(node.execute(&ctx), Err(Error::ExecutorNotInitialized { .. })));
}

#[test]
fn test_activations_compute() {
    let ctx = context(IsaCap::Force(Isa::Sse42));
    let input = [-2.0, -0.5, 0.0, 0.5, 2.0, 4.0];
    let cases: [(OpKind, fn(f32) -> f32); 4] = [
        (OpKind::Relu, |x| x.max(0.0)),
        (OpKind::Clamp { min: -1.0, max: 1.0 }, |x| x.clamp(-1.0, 1.0)),
        (OpKind::PowerStatic { power: 2.0, scale: 2.0, shift: 1.0 }, |x| (1.0 + 2.0 * x).powi(2)),
        (OpKind::Negative, |x| -x),
    ];

    for (kind, reference) in cases {
        let mut node = unary(kind);
        let dst = zeros(Precision::F32, &[2, 3]);
        node.base_mut().bind_input(0, memory(&[2, 3], &input));
        node.base_mut().bind_output(0, dst.clone());
        compile(&mut node, &ctx).unwrap();
        run(&mut node, &ctx).unwrap();

        let expected: Vec<f32> = input.iter().map(|&x| reference(x)).collect();
        assert_close(&dst.to_values().unwrap(), &expected);
    }
}
