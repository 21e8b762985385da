//! Fused post-op chains and primitive attributes.
//!
//! A [`PostOps`] list is immutable and cheap to clone; it is produced by a
//! [`PostOpsBuilder`] and travels inside [`PrimitiveAttr`] into descriptor
//! keys and primitive requests. Operand buffers of per-channel post-ops are
//! not part of the list, they are bound at execution time under
//! [`Arg::PostOp`].

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use smallvec::SmallVec;
use tessel_device::{Memory, MemoryDescPtr, same_desc};
use tessel_dtype::Precision;

use crate::error::Result;
use crate::primitive::{Arg, ExecArgs};

/// Channel-indexed operands are padded to a multiple of this many entries.
pub const OPERAND_PADDING: usize = 16;

/// Padded length of a per-channel operand vector.
pub fn padded_channels(channels: usize) -> usize {
    channels.div_ceil(OPERAND_PADDING) * OPERAND_PADDING
}

/// Numeric algorithm of a backend kernel or post-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Algorithm {
    /// No backend counterpart.
    Undef,

    /// `x > 0 ? x : alpha * x`
    EltwiseRelu,
    EltwiseElu,
    EltwiseGeluErf,
    EltwiseGeluTanh,
    EltwiseTanh,
    EltwiseLogistic,
    EltwiseAbs,
    EltwiseSqrt,
    EltwiseExp,
    EltwiseLog,
    /// Clamp into `[alpha, beta]`.
    EltwiseClip,
    EltwiseSwish,
    EltwiseHardswish,
    EltwiseMish,
    EltwiseSoftRelu,
    EltwiseRoundHalfToEven,
    EltwiseRoundHalfAwayFromZero,
    /// `alpha * x + beta`
    EltwiseLinear,
    /// `alpha * x ^ beta`
    EltwisePow,
    EltwiseErf,

    BinaryAdd,
    BinarySub,
    BinaryMul,
    BinaryDiv,
    BinaryMax,
    BinaryMin,
    BinarySquaredDifference,
    BinaryPow,

    /// `x * scale + shift` per channel.
    DepthwiseScaleShift,
    /// `x > 0 ? x : x * slope` per channel.
    DepthwisePrelu,
}

impl Algorithm {
    pub fn is_eltwise(self) -> bool {
        matches!(
            self,
            Self::EltwiseRelu
                | Self::EltwiseElu
                | Self::EltwiseGeluErf
                | Self::EltwiseGeluTanh
                | Self::EltwiseTanh
                | Self::EltwiseLogistic
                | Self::EltwiseAbs
                | Self::EltwiseSqrt
                | Self::EltwiseExp
                | Self::EltwiseLog
                | Self::EltwiseClip
                | Self::EltwiseSwish
                | Self::EltwiseHardswish
                | Self::EltwiseMish
                | Self::EltwiseSoftRelu
                | Self::EltwiseRoundHalfToEven
                | Self::EltwiseRoundHalfAwayFromZero
                | Self::EltwiseLinear
                | Self::EltwisePow
                | Self::EltwiseErf
        )
    }

    pub fn is_binary(self) -> bool {
        matches!(
            self,
            Self::BinaryAdd
                | Self::BinarySub
                | Self::BinaryMul
                | Self::BinaryDiv
                | Self::BinaryMax
                | Self::BinaryMin
                | Self::BinarySquaredDifference
                | Self::BinaryPow
        )
    }

    pub fn is_depthwise(self) -> bool {
        matches!(self, Self::DepthwiseScaleShift | Self::DepthwisePrelu)
    }

    /// Evaluate a unary eltwise algorithm. Non-eltwise algorithms return `x`.
    pub fn eltwise(self, x: f32, alpha: f32, beta: f32) -> f32 {
        match self {
            Self::EltwiseRelu => {
                if x > 0.0 {
                    x
                } else {
                    alpha * x
                }
            }
            Self::EltwiseElu => {
                if x > 0.0 {
                    x
                } else {
                    alpha * x.exp_m1()
                }
            }
            Self::EltwiseGeluErf => 0.5 * x * (1.0 + erf(x * std::f32::consts::FRAC_1_SQRT_2)),
            Self::EltwiseGeluTanh => {
                const SQRT_2_OVER_PI: f32 = 0.797_884_6;
                0.5 * x * (1.0 + (SQRT_2_OVER_PI * (x + 0.044_715 * x * x * x)).tanh())
            }
            Self::EltwiseTanh => x.tanh(),
            Self::EltwiseLogistic => logistic(x),
            Self::EltwiseAbs => x.abs(),
            Self::EltwiseSqrt => x.sqrt(),
            Self::EltwiseExp => x.exp(),
            Self::EltwiseLog => x.ln(),
            Self::EltwiseClip => x.max(alpha).min(beta),
            Self::EltwiseSwish => x * logistic(alpha * x),
            Self::EltwiseHardswish => x * (alpha * x + beta).clamp(0.0, 1.0),
            Self::EltwiseMish => x * soft_relu(x).tanh(),
            Self::EltwiseSoftRelu => soft_relu(x),
            Self::EltwiseRoundHalfToEven => x.round_ties_even(),
            Self::EltwiseRoundHalfAwayFromZero => x.round(),
            Self::EltwiseLinear => alpha * x + beta,
            Self::EltwisePow => alpha * x.powf(beta),
            Self::EltwiseErf => erf(x),
            _ => x,
        }
    }

    /// Evaluate a binary algorithm. Non-binary algorithms return `lhs`.
    pub fn binary(self, lhs: f32, rhs: f32) -> f32 {
        match self {
            Self::BinaryAdd => lhs + rhs,
            Self::BinarySub => lhs - rhs,
            Self::BinaryMul => lhs * rhs,
            Self::BinaryDiv => lhs / rhs,
            Self::BinaryMax => lhs.max(rhs),
            Self::BinaryMin => lhs.min(rhs),
            Self::BinarySquaredDifference => (lhs - rhs) * (lhs - rhs),
            Self::BinaryPow => lhs.powf(rhs),
            _ => lhs,
        }
    }
}

fn logistic(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn soft_relu(x: f32) -> f32 {
    // ln(1 + e^x) overflows long before it stops being ~x
    if x > 20.0 { x } else { x.exp().ln_1p() }
}

/// Gauss error function, Abramowitz-Stegun 7.1.26 (max error 1.5e-7).
pub fn erf(x: f32) -> f32 {
    const A1: f64 = 0.254_829_592;
    const A2: f64 = -0.284_496_736;
    const A3: f64 = 1.421_413_741;
    const A4: f64 = -1.453_152_027;
    const A5: f64 = 1.061_405_429;
    const P: f64 = 0.327_591_1;

    let x = x as f64;
    let sign = x.signum();
    let x = x.abs();
    let t = 1.0 / (1.0 + P * x);
    let y = 1.0 - (((((A5 * t + A4) * t) + A3) * t + A2) * t + A1) * t * (-x * x).exp();
    (sign * y) as f32
}

/// One entry of a fused post-op chain.
#[derive(Debug, Clone)]
pub enum PostOp {
    /// Unary activation with immediate parameters.
    Eltwise { alg: Algorithm, alpha: f32, beta: f32 },
    /// Per-channel scale/shift or prelu with an operand buffer.
    ///
    /// The operand holds `padded_channels(channels)` scales followed by as
    /// many shifts for [`Algorithm::DepthwiseScaleShift`], or only the slopes
    /// for [`Algorithm::DepthwisePrelu`].
    ScaleShift { alg: Algorithm, axis: usize, operand: MemoryDescPtr },
    /// Binary op against an operand that is a scalar or a per-channel vector.
    Binary { alg: Algorithm, axis: usize, operand: MemoryDescPtr },
    /// Saturating conversion of the output.
    Convert { to: Precision },
}

impl PostOp {
    pub fn has_operand(&self) -> bool {
        matches!(self, Self::ScaleShift { .. } | Self::Binary { .. })
    }
}

impl PartialEq for PostOp {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Eltwise { alg: a, alpha: aa, beta: ab }, Self::Eltwise { alg: b, alpha: ba, beta: bb }) => {
                a == b && aa.to_bits() == ba.to_bits() && ab.to_bits() == bb.to_bits()
            }
            (
                Self::ScaleShift { alg: a, axis: ax, operand: ao },
                Self::ScaleShift { alg: b, axis: bx, operand: bo },
            )
            | (Self::Binary { alg: a, axis: ax, operand: ao }, Self::Binary { alg: b, axis: bx, operand: bo }) => {
                a == b && ax == bx && same_desc(ao, bo)
            }
            (Self::Convert { to: a }, Self::Convert { to: b }) => a == b,
            _ => false,
        }
    }
}

impl Eq for PostOp {}

impl Hash for PostOp {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Eltwise { alg, alpha, beta } => {
                alg.hash(state);
                alpha.to_bits().hash(state);
                beta.to_bits().hash(state);
            }
            Self::ScaleShift { alg, axis, operand } | Self::Binary { alg, axis, operand } => {
                alg.hash(state);
                axis.hash(state);
                operand.content_hash().hash(state);
            }
            Self::Convert { to } => to.hash(state),
        }
    }
}

/// Immutable, ordered post-op chain. Order is execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PostOps(Arc<[PostOp]>);

impl PostOps {
    pub fn builder() -> PostOpsBuilder {
        PostOpsBuilder::default()
    }

    /// Builder seeded with this chain, for appending further post-ops.
    pub fn extend(&self) -> PostOpsBuilder {
        PostOpsBuilder { ops: self.0.to_vec(), operands: SmallVec::new() }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PostOp> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[PostOp] {
        &self.0
    }

    /// Output precision after every fused conversion.
    pub fn output_precision(&self, precision: Precision) -> Precision {
        self.0.iter().fold(precision, |acc, op| match op {
            PostOp::Convert { to } => *to,
            _ => acc,
        })
    }
}

impl<'a> IntoIterator for &'a PostOps {
    type Item = &'a PostOp;
    type IntoIter = std::slice::Iter<'a, PostOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Operand memory of a chain, keyed by post-op position.
pub type PostOpOperands = SmallVec<[(usize, Memory); 4]>;

/// Accumulates post-ops and their operand buffers in evaluation order.
#[derive(Debug, Default)]
pub struct PostOpsBuilder {
    ops: Vec<PostOp>,
    operands: PostOpOperands,
}

impl PostOpsBuilder {
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Append an immediate post-op.
    pub fn push(&mut self, op: PostOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    /// Append a post-op backed by `operand`. Its descriptor replaces the one in `op`.
    pub fn push_with_operand(&mut self, op: PostOp, operand: Memory) -> &mut Self {
        let desc = operand.desc().clone();
        let op = match op {
            PostOp::ScaleShift { alg, axis, .. } => PostOp::ScaleShift { alg, axis, operand: desc },
            PostOp::Binary { alg, axis, .. } => PostOp::Binary { alg, axis, operand: desc },
            other => other,
        };
        self.operands.push((self.ops.len(), operand));
        self.ops.push(op);
        self
    }

    pub fn eltwise(&mut self, alg: Algorithm, alpha: f32, beta: f32) -> &mut Self {
        self.push(PostOp::Eltwise { alg, alpha, beta })
    }

    pub fn convert(&mut self, to: Precision) -> &mut Self {
        self.push(PostOp::Convert { to })
    }

    pub fn build(self) -> (PostOps, PostOpOperands) {
        (PostOps(self.ops.into()), self.operands)
    }
}

/// Whether the kernel owns its scratch memory or expects it to be passed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScratchpadMode {
    Library,
    #[default]
    User,
}

/// Attribute set attached to a primitive request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct PrimitiveAttr {
    pub post_ops: PostOps,
    pub scratchpad_mode: ScratchpadMode,
}

impl PrimitiveAttr {
    pub fn with_post_ops(post_ops: PostOps) -> Self {
        Self { post_ops, scratchpad_mode: ScratchpadMode::User }
    }
}

enum Resolved {
    Eltwise { alg: Algorithm, alpha: f32, beta: f32 },
    ScaleShift { alg: Algorithm, padded: usize, values: Vec<f32> },
    Binary { alg: Algorithm, values: Vec<f32> },
    Convert { to: Precision },
}

/// A post-op chain with its operands loaded, ready to be applied per element.
pub struct ResolvedPostOps {
    ops: Vec<Resolved>,
}

impl ResolvedPostOps {
    /// Load every operand of `post_ops` from the `Arg::PostOp` bindings of `args`.
    pub fn resolve(post_ops: &PostOps, args: &ExecArgs) -> Result<Self> {
        let mut ops = Vec::with_capacity(post_ops.len());
        for (index, op) in post_ops.iter().enumerate() {
            ops.push(match op {
                PostOp::Eltwise { alg, alpha, beta } => Resolved::Eltwise { alg: *alg, alpha: *alpha, beta: *beta },
                PostOp::ScaleShift { alg, operand, .. } => {
                    let values = args.get(Arg::PostOp(index))?.to_values()?;
                    let padded = match alg {
                        Algorithm::DepthwiseScaleShift => values.len() / 2,
                        _ => values.len(),
                    };
                    debug_assert_eq!(operand.element_count().ok(), Some(values.len()));
                    Resolved::ScaleShift { alg: *alg, padded, values }
                }
                PostOp::Binary { alg, .. } => {
                    Resolved::Binary { alg: *alg, values: args.get(Arg::PostOp(index))?.to_values()? }
                }
                PostOp::Convert { to } => Resolved::Convert { to: *to },
            });
        }
        Ok(Self { ops })
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Run the chain on `value` of an element in `channel`.
    pub fn apply(&self, mut value: f32, channel: usize) -> f32 {
        for op in &self.ops {
            value = match op {
                Resolved::Eltwise { alg, alpha, beta } => alg.eltwise(value, *alpha, *beta),
                Resolved::ScaleShift { alg: Algorithm::DepthwisePrelu, values, .. } => {
                    let slope = per_channel(values, channel);
                    if value > 0.0 { value } else { value * slope }
                }
                Resolved::ScaleShift { padded, values, .. } => {
                    let (scales, shifts) = values.split_at(*padded);
                    value * per_channel(scales, channel) + per_channel(shifts, channel)
                }
                Resolved::Binary { alg, values } => alg.binary(value, per_channel(values, channel)),
                Resolved::Convert { to } => to.saturate(value),
            };
        }
        value
    }
}

fn per_channel(values: &[f32], channel: usize) -> f32 {
    match values.len() {
        0 => 0.0,
        1 => values[0],
        _ => values[channel.min(values.len() - 1)],
    }
}
