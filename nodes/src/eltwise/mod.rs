//! Elementwise node.
//!
//! One node type covers binary arithmetic, unary activations, the fused
//! multiply-add and conversions. A node whose constant parameters broadcast
//! per tensor or per channel can also be folded into an upstream kernel as
//! post-ops, see [`Eltwise::fuse_into`].

pub mod executor;
pub mod key;
pub mod policy;

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use smallvec::SmallVec;
use snafu::ensure;
use tessel_device::{Allocator, Layout, Memory, MemoryDesc, VectorDims};
use tessel_dtype::Precision;
use tessel_runtime::error::{ExecutorNotInitializedSnafu, InvalidConfigurationSnafu, Result, UnsupportedOperationSnafu};
use tessel_runtime::post_ops::padded_channels;
use tessel_runtime::{Algorithm, Arg, ExecArgs, ImplType, PostOp, PostOpsBuilder};
use tracing::{debug, instrument, trace};

use crate::context::GraphContext;
use crate::fusion;
use crate::node::{Node, NodeBase, NodeConfig, NodeDesc, PortConfig, PostOpSource};
use crate::op::{GeluApproximation, OpKind, Operation, Port, RoundMode};

pub use executor::{EltwiseExecutor, EltwiseExecutorPtr};
pub use key::EltwiseKey;
pub use policy::{BroadcastingPolicy, determine_broadcasting_policy};

/// Operation family an eltwise node computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum EltwiseOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Maximum,
    Minimum,
    SquaredDifference,
    Power,
    /// `(gamma + beta * x) ^ alpha`
    PowerStatic,
    Prelu,
    MulAdd,
    /// Unary function given by the node's [`Algorithm`].
    Activation,
    Convert { to: Precision },
}

impl EltwiseOp {
    fn arity(self) -> usize {
        match self {
            Self::Activation | Self::PowerStatic | Self::Convert { .. } => 1,
            Self::MulAdd => 3,
            _ => 2,
        }
    }
}

/// Kernel variant an eltwise executor is built as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, strum::Display)]
pub enum EltwiseImplType {
    #[default]
    Reference,
    Optimized,
    ShapeAgnostic,
}

/// Operation plus its immediate parameters.
#[derive(Debug, Clone, Copy)]
pub struct EltwiseData {
    pub op: EltwiseOp,
    pub algorithm: Algorithm,
    pub alpha: f32,
    pub beta: f32,
    pub gamma: f32,
}

impl EltwiseData {
    fn new(op: EltwiseOp, algorithm: Algorithm) -> Self {
        Self { op, algorithm, alpha: 0.0, beta: 0.0, gamma: 0.0 }
    }

    fn with_params(mut self, alpha: f32, beta: f32, gamma: f32) -> Self {
        self.alpha = alpha;
        self.beta = beta;
        self.gamma = gamma;
        self
    }

    /// Value of one output element from its input elements.
    pub fn compute(&self, x: &[f32]) -> f32 {
        match self.op {
            EltwiseOp::Add
            | EltwiseOp::Subtract
            | EltwiseOp::Multiply
            | EltwiseOp::Divide
            | EltwiseOp::Maximum
            | EltwiseOp::Minimum
            | EltwiseOp::SquaredDifference
            | EltwiseOp::Power => self.algorithm.binary(x[0], x[1]),
            EltwiseOp::PowerStatic => (self.gamma + self.beta * x[0]).powf(self.alpha),
            EltwiseOp::Prelu => {
                if x[0] > 0.0 {
                    x[0]
                } else {
                    x[0] * x[1]
                }
            }
            EltwiseOp::MulAdd => x[0] * x[1] + x[2],
            EltwiseOp::Activation => self.algorithm.eltwise(x[0], self.alpha, self.beta),
            EltwiseOp::Convert { .. } => x[0],
        }
    }
}

impl PartialEq for EltwiseData {
    fn eq(&self, other: &Self) -> bool {
        self.op == other.op
            && self.algorithm == other.algorithm
            && self.alpha.to_bits() == other.alpha.to_bits()
            && self.beta.to_bits() == other.beta.to_bits()
            && self.gamma.to_bits() == other.gamma.to_bits()
    }
}

impl Eq for EltwiseData {}

impl Hash for EltwiseData {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.op.hash(state);
        self.algorithm.hash(state);
        self.alpha.to_bits().hash(state);
        self.beta.to_bits().hash(state);
        self.gamma.to_bits().hash(state);
    }
}

/// Data and backend algorithm for each operation kind.
fn initializer(kind: &OpKind) -> Option<EltwiseData> {
    use Algorithm as A;
    use EltwiseOp as E;

    let activation = |alg| EltwiseData::new(E::Activation, alg);
    Some(match *kind {
        OpKind::Add => EltwiseData::new(E::Add, A::BinaryAdd),
        OpKind::Subtract => EltwiseData::new(E::Subtract, A::BinarySub),
        OpKind::Multiply => EltwiseData::new(E::Multiply, A::BinaryMul),
        OpKind::Divide => EltwiseData::new(E::Divide, A::BinaryDiv),
        OpKind::Maximum => EltwiseData::new(E::Maximum, A::BinaryMax),
        OpKind::Minimum => EltwiseData::new(E::Minimum, A::BinaryMin),
        OpKind::SquaredDifference => EltwiseData::new(E::SquaredDifference, A::BinarySquaredDifference),
        OpKind::Power => EltwiseData::new(E::Power, A::BinaryPow),
        OpKind::PowerStatic { power, scale, shift } => {
            let alg = if scale == 1.0 && shift == 0.0 { A::EltwisePow } else { A::Undef };
            EltwiseData::new(E::PowerStatic, alg).with_params(power, scale, shift)
        }
        OpKind::Prelu => EltwiseData::new(E::Prelu, A::DepthwisePrelu),
        OpKind::MulAdd => EltwiseData::new(E::MulAdd, A::DepthwiseScaleShift),

        OpKind::Relu => activation(A::EltwiseRelu),
        OpKind::LeakyRelu { slope } => activation(A::EltwiseRelu).with_params(slope, 0.0, 0.0),
        OpKind::Elu { alpha } => activation(A::EltwiseElu).with_params(alpha, 0.0, 0.0),
        OpKind::Gelu { approximation: GeluApproximation::Erf } => activation(A::EltwiseGeluErf),
        OpKind::Gelu { approximation: GeluApproximation::Tanh } => activation(A::EltwiseGeluTanh),
        OpKind::Tanh => activation(A::EltwiseTanh),
        OpKind::Sigmoid => activation(A::EltwiseLogistic),
        OpKind::Abs => activation(A::EltwiseAbs),
        OpKind::Sqrt => activation(A::EltwiseSqrt),
        OpKind::Exp => activation(A::EltwiseExp),
        OpKind::Log => activation(A::EltwiseLog),
        OpKind::Clamp { min, max } => activation(A::EltwiseClip).with_params(min, max, 0.0),
        OpKind::Swish { beta } => activation(A::EltwiseSwish).with_params(beta, 0.0, 0.0),
        OpKind::HSwish => activation(A::EltwiseHardswish).with_params(1.0 / 6.0, 0.5, 0.0),
        OpKind::Mish => activation(A::EltwiseMish),
        OpKind::SoftPlus => activation(A::EltwiseSoftRelu).with_params(1.0, 0.0, 0.0),
        OpKind::Round { mode: RoundMode::HalfToEven } => activation(A::EltwiseRoundHalfToEven),
        OpKind::Round { mode: RoundMode::HalfAwayFromZero } => activation(A::EltwiseRoundHalfAwayFromZero),
        OpKind::Erf => activation(A::EltwiseErf),
        OpKind::Negative => activation(A::EltwiseLinear).with_params(-1.0, 0.0, 0.0),
        OpKind::Convert { to } => EltwiseData::new(E::Convert { to }, A::Undef),

        OpKind::Softmax { .. } | OpKind::SoftmaxV8 { .. } => return None,
    })
}

/// Precisions the optimized kernels load and store.
fn optimized_precision(precision: Precision, isa: tessel_runtime::Isa) -> bool {
    matches!(precision, Precision::I8 | Precision::U8) || isa.supports(precision)
}

pub struct Eltwise {
    base: NodeBase,
    data: EltwiseData,
    policy: BroadcastingPolicy,
    scales: Vec<f32>,
    shifts: Vec<f32>,
    /// Memory of each constant input, by port.
    constants: Vec<Option<Memory>>,
    impl_type: EltwiseImplType,
    executor: Option<EltwiseExecutorPtr>,
}

impl Eltwise {
    /// Check if `op` can be handled by this node.
    pub fn is_supported_operation(op: &Operation) -> Result<()> {
        let data = initializer(&op.kind).ok_or_else(|| {
            UnsupportedOperationSnafu { reason: format!("{} is not an eltwise operation", op.kind) }.build()
        })?;
        let arity = data.op.arity();
        ensure!(
            op.inputs.len() == arity && op.outputs.len() == 1,
            UnsupportedOperationSnafu {
                reason: format!(
                    "{} expects {arity} inputs and 1 output, got {} and {}",
                    op.kind,
                    op.inputs.len(),
                    op.outputs.len()
                ),
            }
        );
        ensure!(
            op.inputs.iter().any(|p| !p.is_constant()),
            UnsupportedOperationSnafu { reason: format!("{} has no non-constant input", op.kind) }
        );
        Ok(())
    }

    pub fn new(op: &Operation) -> Result<Self> {
        Self::is_supported_operation(op)?;
        let data = initializer(&op.kind)
            .ok_or_else(|| UnsupportedOperationSnafu { reason: op.kind.to_string() }.build())?;

        let (scales, shifts) = Self::scales_and_shifts(data.op, &op.inputs);
        let policy = Self::policy(&op.inputs);
        trace!(name = %op.name, op = %data.op, %policy, "eltwise initialized");

        Ok(Self {
            base: NodeBase::new(op.name.clone(), op.inputs.clone(), op.outputs.clone()),
            data,
            policy,
            scales,
            shifts,
            constants: vec![None; op.inputs.len()],
            impl_type: EltwiseImplType::default(),
            executor: None,
        })
    }

    /// Broadcasting of every constant input against the main input.
    ///
    /// One undefined parameter makes the whole node undefined; otherwise any
    /// per-channel parameter makes it per-channel.
    fn policy(inputs: &[Port]) -> BroadcastingPolicy {
        let Some(main) = inputs.iter().find(|p| !p.is_constant()) else {
            return BroadcastingPolicy::Undefined;
        };

        let mut combined = None;
        for param in inputs.iter().filter(|p| p.is_constant()) {
            match determine_broadcasting_policy(&main.shape, &param.shape) {
                BroadcastingPolicy::Undefined => return BroadcastingPolicy::Undefined,
                BroadcastingPolicy::PerChannel => combined = Some(BroadcastingPolicy::PerChannel),
                BroadcastingPolicy::PerTensor => {
                    combined.get_or_insert(BroadcastingPolicy::PerTensor);
                }
            }
        }
        combined.unwrap_or(BroadcastingPolicy::Undefined)
    }

    /// Express the constant operands as `x * scale + shift`, or as the binary
    /// operand in `scales`. Empty when the constants cannot be expressed that way.
    fn scales_and_shifts(op: EltwiseOp, inputs: &[Port]) -> (Vec<f32>, Vec<f32>) {
        let constant = |port: usize| inputs.get(port).and_then(|p| p.constant.as_deref());
        let (c0, c1) = (constant(0), constant(1));

        match (op, c0, c1) {
            (EltwiseOp::Add, None, Some(c)) | (EltwiseOp::Add, Some(c), None) => (vec![1.0], c.to_vec()),
            (EltwiseOp::Subtract, None, Some(c)) => (vec![1.0], c.iter().map(|v| -v).collect()),
            (EltwiseOp::Subtract, Some(c), None) => (vec![-1.0], c.to_vec()),
            (EltwiseOp::Multiply, None, Some(c)) | (EltwiseOp::Multiply, Some(c), None) => (c.to_vec(), vec![0.0]),
            (EltwiseOp::Divide, None, Some(c)) => (c.iter().map(|v| 1.0 / v).collect(), vec![0.0]),
            (EltwiseOp::MulAdd, None, Some(c)) => match constant(2) {
                Some(shift) => (c.to_vec(), shift.to_vec()),
                None => Default::default(),
            },
            (EltwiseOp::Prelu, None, Some(c))
            | (EltwiseOp::Maximum | EltwiseOp::Minimum | EltwiseOp::SquaredDifference, _, Some(c))
            | (EltwiseOp::Maximum | EltwiseOp::Minimum | EltwiseOp::SquaredDifference, Some(c), None)
            | (EltwiseOp::Power, None, Some(c)) => (c.to_vec(), Vec::new()),
            _ => Default::default(),
        }
    }

    pub fn op(&self) -> EltwiseOp {
        self.data.op
    }

    pub fn data(&self) -> &EltwiseData {
        &self.data
    }

    pub fn alpha(&self) -> f32 {
        self.data.alpha
    }

    pub fn beta(&self) -> f32 {
        self.data.beta
    }

    pub fn gamma(&self) -> f32 {
        self.data.gamma
    }

    pub fn scales(&self) -> &[f32] {
        &self.scales
    }

    pub fn shifts(&self) -> &[f32] {
        &self.shifts
    }

    pub fn backend_algorithm(&self) -> Algorithm {
        self.data.algorithm
    }

    pub fn broadcasting_policy(&self) -> BroadcastingPolicy {
        self.policy
    }

    pub fn impl_type(&self) -> EltwiseImplType {
        self.impl_type
    }

    pub fn executor(&self) -> Option<&EltwiseExecutorPtr> {
        self.executor.as_ref()
    }

    pub fn convert_target(&self) -> Option<Precision> {
        match self.data.op {
            EltwiseOp::Convert { to } => Some(to),
            _ => None,
        }
    }

    pub fn non_constant_inputs(&self) -> usize {
        self.base.input_ports().iter().filter(|p| !p.is_constant()).count()
    }

    pub fn has_constant_inputs(&self) -> bool {
        self.base.input_ports().iter().any(Port::is_constant)
    }

    /// Check if the operation maps onto the post-op forms.
    pub fn expressible_as_post_ops(&self) -> bool {
        match self.data.op {
            EltwiseOp::Activation | EltwiseOp::PowerStatic | EltwiseOp::Convert { .. } => true,
            _ => !self.scales.is_empty(),
        }
    }

    /// Check if any input shape differs from the output shape.
    pub fn is_with_broadcast(&self) -> bool {
        let Some(out) = self.base.output_shape(0) else {
            return false;
        };
        self.base.input_ports().iter().any(|p| &p.shape != out)
    }

    /// Widest precision among the non-constant inputs.
    pub fn runtime_precision(&self) -> Precision {
        Precision::max_of(self.base.input_ports().iter().filter(|p| !p.is_constant()).map(|p| p.precision))
            .unwrap_or(Precision::F32)
    }

    /// Check if the optimized kernels handle every precision on this context.
    fn optimized_supported(&self, ctx: &GraphContext) -> bool {
        let Some(isa) = ctx.isa() else {
            return false;
        };
        if ctx.config().force_ref {
            return false;
        }
        let precisions = self
            .base
            .input_ports()
            .iter()
            .filter(|p| !p.is_constant())
            .chain(self.base.output_ports())
            .map(|p| p.precision);
        precisions.into_iter().all(|p| optimized_precision(p, isa))
    }

    /// Allocate memory for each constant input the first time it is needed.
    fn ensure_constants(&mut self, allocator: &Arc<dyn Allocator>) -> Result<()> {
        for (port, slot) in self.base.input_ports().iter().zip(self.constants.iter_mut()) {
            if slot.is_some() {
                continue;
            }
            let (Some(values), Some(dims)) = (&port.constant, port.shape.static_dims()) else {
                continue;
            };
            let desc = Arc::new(MemoryDesc::planar(Precision::F32, &dims));
            *slot = Some(Memory::from_values(Arc::clone(allocator), desc, values)?);
        }
        Ok(())
    }

    fn input(&self, port: usize) -> Result<&Memory> {
        match self.constants.get(port) {
            Some(Some(memory)) => Ok(memory),
            _ => self.base.input_memory(port),
        }
    }

    fn input_dims(&self) -> Result<Vec<VectorDims>> {
        (0..self.base.input_ports().len()).map(|port| Ok(self.input(port)?.desc().dims()?)).collect()
    }

    /// Fold this node into `parent` as post-ops. The parent evaluates them
    /// after every operation fused before.
    pub fn fuse_into(self: Box<Self>, parent: &mut dyn Node) -> Result<()> {
        ensure!(
            parent.can_fuse(&*self),
            InvalidConfigurationSnafu {
                reason: format!("node '{}' cannot be fused into '{}'", self.base.name(), parent.name()),
            }
        );
        parent.base_mut().add_fused(Arc::new(*self));
        Ok(())
    }

    /// Operand of `values` broadcast over `channels` padded channels.
    fn padded(values: &[f32], channels: usize) -> Vec<f32> {
        (0..padded_channels(channels))
            .map(|ch| match values.len() {
                1 => values[0],
                _ => values.get(ch).copied().unwrap_or(0.0),
            })
            .collect()
    }

    fn operand(values: Vec<f32>, allocator: &Arc<dyn Allocator>) -> Result<Memory> {
        let desc = Arc::new(MemoryDesc::planar(Precision::F32, &[values.len()]));
        Ok(Memory::from_values(Arc::clone(allocator), desc, &values)?)
    }
}

impl std::fmt::Debug for Eltwise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Eltwise")
            .field("base", &self.base)
            .field("data", &self.data)
            .field("policy", &self.policy)
            .field("impl_type", &self.impl_type)
            .finish()
    }
}

impl PostOpSource for Eltwise {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn append_post_ops(
        &self,
        ops: &mut PostOpsBuilder,
        channel_axis: usize,
        channels: Option<usize>,
        allocator: &Arc<dyn Allocator>,
    ) -> Result<()> {
        let per_tensor = self.policy == BroadcastingPolicy::PerTensor;
        let channels = channels.unwrap_or_else(|| self.scales.len().max(self.shifts.len()));
        let first = |values: &[f32], default: f32| values.first().copied().unwrap_or(default);

        match self.data.op {
            EltwiseOp::Activation => {
                ops.eltwise(self.data.algorithm, self.data.alpha, self.data.beta);
            }
            EltwiseOp::PowerStatic => {
                if self.data.beta != 1.0 || self.data.gamma != 0.0 {
                    ops.eltwise(Algorithm::EltwiseLinear, self.data.beta, self.data.gamma);
                }
                if self.data.alpha != 1.0 {
                    ops.eltwise(Algorithm::EltwisePow, 1.0, self.data.alpha);
                }
            }
            EltwiseOp::Convert { to } => {
                ops.convert(to);
            }
            EltwiseOp::Add | EltwiseOp::Subtract | EltwiseOp::Multiply | EltwiseOp::Divide | EltwiseOp::MulAdd => {
                if per_tensor && self.scales.len() <= 1 && self.shifts.len() <= 1 {
                    ops.eltwise(Algorithm::EltwiseLinear, first(&self.scales, 1.0), first(&self.shifts, 0.0));
                } else {
                    let mut values = Self::padded(&self.scales, channels);
                    values.extend(Self::padded(&self.shifts, channels));
                    let operand = Self::operand(values, allocator)?;
                    let desc = Arc::clone(operand.desc());
                    ops.push_with_operand(
                        PostOp::ScaleShift { alg: Algorithm::DepthwiseScaleShift, axis: channel_axis, operand: desc },
                        operand,
                    );
                }
            }
            EltwiseOp::Prelu => {
                if per_tensor {
                    ops.eltwise(Algorithm::EltwiseRelu, first(&self.scales, 0.0), 0.0);
                } else {
                    let operand = Self::operand(Self::padded(&self.scales, channels), allocator)?;
                    let desc = Arc::clone(operand.desc());
                    ops.push_with_operand(
                        PostOp::ScaleShift { alg: Algorithm::DepthwisePrelu, axis: channel_axis, operand: desc },
                        operand,
                    );
                }
            }
            EltwiseOp::Maximum | EltwiseOp::Minimum | EltwiseOp::SquaredDifference | EltwiseOp::Power => {
                let values = if per_tensor { vec![first(&self.scales, 0.0)] } else { Self::padded(&self.scales, channels) };
                let operand = Self::operand(values, allocator)?;
                let desc = Arc::clone(operand.desc());
                ops.push_with_operand(
                    PostOp::Binary { alg: self.data.algorithm, axis: channel_axis, operand: desc },
                    operand,
                );
            }
        }
        Ok(())
    }

    fn fused_inputs(&self) -> usize {
        self.base.input_ports().iter().filter(|p| p.is_constant()).count()
    }

    fn convert_target(&self) -> Option<Precision> {
        Eltwise::convert_target(self)
    }
}

impl Node for Eltwise {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn supported_descriptors(&mut self) -> Result<()> {
        let name = self.base.name().to_string();
        ensure!(
            self.base.input_ports().len() == self.data.op.arity(),
            InvalidConfigurationSnafu { reason: format!("node '{name}': incorrect number of input edges") }
        );
        ensure!(
            self.base.output_ports().len() == 1,
            InvalidConfigurationSnafu { reason: format!("node '{name}': incorrect number of output edges") }
        );
        Ok(())
    }

    fn init_supported_primitive_descriptors(&mut self, ctx: &GraphContext) -> Result<()> {
        if !self.base.supported().is_empty() {
            return Ok(());
        }

        let impl_type = match (self.optimized_supported(ctx), ctx.isa()) {
            (true, Some(isa)) => isa.impl_type(),
            _ => ImplType::REF,
        };

        self.base.post_ops(ctx.allocator())?;
        let output = self.base.output_ports()[0].clone();
        let rank = output.shape.rank();
        let out_channels = output.shape.dims().get(Layout::CHANNEL_AXIS).copied();
        let out_precision = self.base.output_precision(0);

        // Channel-major layouts need every data input to match the output channels.
        let uniform = self
            .base
            .input_ports()
            .iter()
            .filter(|p| !p.is_constant())
            .all(|p| p.shape.rank() == rank && p.shape.dims().get(Layout::CHANNEL_AXIS).copied() == out_channels);

        for layout in Layout::available_for_rank(rank) {
            if layout != Layout::Planar && !uniform {
                continue;
            }

            let mut inputs = Vec::with_capacity(self.base.input_ports().len());
            for port in self.base.input_ports() {
                let desc = match &port.constant {
                    Some(_) => MemoryDesc::new(Precision::F32, port.shape.clone(), Layout::Planar)?,
                    None => MemoryDesc::new(port.precision, port.shape.clone(), layout)?,
                };
                inputs.push(PortConfig::new(Arc::new(desc)));
            }
            let outputs = vec![PortConfig::new(Arc::new(MemoryDesc::new(out_precision, output.shape.clone(), layout)?))];

            self.base.add_supported(NodeDesc { config: NodeConfig { inputs, outputs }, impl_type });
        }
        debug!(node = %self.base.name(), %impl_type, count = self.base.supported().len(), "eltwise descriptors");
        Ok(())
    }

    fn need_prepare_params(&self) -> bool {
        if self.executor.is_none() {
            return true;
        }
        let (Some(prepared), Ok(live)) = (self.base.prepared_dims(), self.base.live_input_dims()) else {
            return true;
        };
        if self.impl_type != EltwiseImplType::ShapeAgnostic {
            return prepared != live.as_slice();
        }

        let masks = |dims: &[VectorDims]| {
            let rank = dims.iter().map(|d| d.len()).max().unwrap_or(0);
            dims.iter().map(|d| policy::broadcast_mask(d, rank)).collect::<Vec<_>>()
        };
        masks(prepared) != masks(&live)
    }

    #[instrument(skip_all, fields(node = %self.base.name()))]
    fn prepare_params(&mut self, ctx: &GraphContext) -> Result<()> {
        self.ensure_constants(ctx.allocator())?;
        let selected = self.base.require_selected()?.impl_type;
        let impl_type = if !selected.is_jit() {
            EltwiseImplType::Reference
        } else if self.base.is_dynamic() && ctx.config().shape_agnostic {
            EltwiseImplType::ShapeAgnostic
        } else {
            EltwiseImplType::Optimized
        };

        let post_ops = self.base.post_ops(ctx.allocator())?.0.clone();
        let in_dims = self.input_dims()?;
        let out_dims = policy::broadcast_dims(&in_dims)?;
        let out_desc = self.base.output_memory(0)?.desc().clone_with_dims(&out_dims)?;
        let in_precisions: SmallVec<[Precision; 4]> = (0..in_dims.len())
            .map(|port| Ok(self.input(port)?.desc().precision()))
            .collect::<Result<_>>()?;

        let key = EltwiseKey {
            data: self.data,
            in_dims,
            out_blocked_dims: out_desc.blocked_dims()?,
            out_order: out_desc.order(),
            in_precisions,
            out_precision: out_desc.precision(),
            post_ops,
            impl_type,
        };

        let (executor, status) = ctx.cache().get_or_create(&key, executor::build_executor)?;
        debug!(?status, %impl_type, "eltwise executor ready");

        self.impl_type = impl_type;
        self.executor = Some(executor);
        let dims = self.base.live_input_dims()?;
        self.base.set_prepared_dims(dims);
        Ok(())
    }

    fn execute(&self, _ctx: &GraphContext) -> Result<()> {
        let Some(executor) = &self.executor else {
            return ExecutorNotInitializedSnafu { node: self.base.name().to_string() }.fail();
        };

        let mut args = ExecArgs::new();
        for port in 0..self.base.input_ports().len() {
            args.bind(Arg::Src(port), self.input(port)?.clone());
        }
        args.bind(Arg::Dst, self.base.output_memory(0)?.clone());
        self.base.bind_post_op_operands(&mut args);

        let dims_out = policy::broadcast_dims(&self.input_dims()?)?;
        executor.exec(&args, &dims_out)
    }

    fn can_fuse(&self, child: &dyn Node) -> bool {
        let optimized = self.base.selected().is_none_or(|d| d.impl_type.is_jit());
        fusion::can_fuse_into(&self.base, optimized, child)
    }

    fn as_eltwise(&self) -> Option<&Eltwise> {
        Some(self)
    }
}
