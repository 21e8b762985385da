//! Source operations nodes are constructed from.

use std::sync::Arc;

use tessel_device::Shape;
use tessel_dtype::Precision;

/// Tensor port of a source operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Port {
    pub shape: Shape,
    pub precision: Precision,
    /// Values of a constant input, row-major.
    pub constant: Option<Arc<[f32]>>,
}

impl Port {
    pub fn new(shape: Shape, precision: Precision) -> Self {
        Self { shape, precision, constant: None }
    }

    pub fn from_dims(dims: &[usize], precision: Precision) -> Self {
        Self::new(Shape::from_static(dims), precision)
    }

    /// Constant f32 input with static `dims`.
    pub fn constant(dims: &[usize], values: impl Into<Arc<[f32]>>) -> Self {
        Self { shape: Shape::from_static(dims), precision: Precision::F32, constant: Some(values.into()) }
    }

    pub fn is_constant(&self) -> bool {
        self.constant.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum GeluApproximation {
    Erf,
    Tanh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum RoundMode {
    HalfToEven,
    HalfAwayFromZero,
}

/// Operation kind with its attributes.
#[derive(Debug, Clone, PartialEq, strum::Display)]
pub enum OpKind {
    /// Opset-1 softmax, non-negative axis.
    Softmax { axis: usize },
    /// Opset-8 softmax, axis may be negative.
    SoftmaxV8 { axis: i64 },

    Add,
    Subtract,
    Multiply,
    Divide,
    Maximum,
    Minimum,
    SquaredDifference,
    Power,
    /// `(shift + scale * x) ^ power`
    PowerStatic { power: f32, scale: f32, shift: f32 },
    Prelu,
    /// `a * b + c`
    MulAdd,

    Relu,
    LeakyRelu { slope: f32 },
    Elu { alpha: f32 },
    Gelu { approximation: GeluApproximation },
    Tanh,
    Sigmoid,
    Abs,
    Sqrt,
    Exp,
    Log,
    Clamp { min: f32, max: f32 },
    Swish { beta: f32 },
    HSwish,
    Mish,
    SoftPlus,
    Round { mode: RoundMode },
    Erf,
    Negative,
    Convert { to: Precision },
}

#[derive(Debug, Clone)]
pub struct Operation {
    pub name: String,
    pub kind: OpKind,
    pub inputs: Vec<Port>,
    pub outputs: Vec<Port>,
}

impl Operation {
    pub fn new(name: impl Into<String>, kind: OpKind, inputs: Vec<Port>, outputs: Vec<Port>) -> Self {
        Self { name: name.into(), kind, inputs, outputs }
    }
}
