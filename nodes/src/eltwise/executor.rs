//! Eltwise executors.
//!
//! All three variants compute the same values. They differ in how much of the
//! broadcast indexing is fixed when they are built:
//!
//! - [`ReferenceExecutor`]: derives strides from the bound memory on every call
//! - [`OptimizedExecutor`]: precomputes every input offset for one output shape
//! - [`ShapeAgnosticExecutor`]: keeps only the broadcast masks and serves any
//!   output shape that agrees with them

use std::fmt::Debug;
use std::sync::Arc;

use smallvec::SmallVec;
use snafu::{OptionExt, ensure};
use tessel_device::{Layout, VectorDims};
use tessel_runtime::error::{InvalidConfigurationSnafu, Result};
use tessel_runtime::{Arg, ExecArgs, PostOps, ResolvedPostOps};

use super::key::EltwiseKey;
use super::policy::{BroadcastMask, broadcast_dims, broadcast_mask, broadcast_strides, element_offset};
use super::{EltwiseData, EltwiseImplType};

pub trait EltwiseExecutor: Send + Sync + Debug {
    /// Compute `args`' `Dst` for an output of logical `dims_out`.
    fn exec(&self, args: &ExecArgs, dims_out: &[usize]) -> Result<()>;

    fn impl_type(&self) -> EltwiseImplType;

    /// Output dims the executor was built for.
    fn out_dims(&self) -> &[usize];

    fn batch_dim_idx(&self) -> usize {
        0
    }
}

pub type EltwiseExecutorPtr = Arc<dyn EltwiseExecutor>;

/// Build the executor a key describes.
pub fn build_executor(key: &EltwiseKey) -> Result<EltwiseExecutorPtr> {
    let kernel = Kernel { data: key.data, inputs: key.in_dims.len(), post_ops: key.post_ops.clone() };
    let out_dims = broadcast_dims(&key.in_dims)?;

    Ok(match key.impl_type {
        EltwiseImplType::Reference => Arc::new(ReferenceExecutor { kernel, out_dims }),
        EltwiseImplType::Optimized => Arc::new(OptimizedExecutor::new(kernel, &key.in_dims, out_dims)?),
        EltwiseImplType::ShapeAgnostic => {
            let masks = key.in_dims.iter().map(|dims| broadcast_mask(dims, out_dims.len())).collect();
            let ranks = key.in_dims.iter().map(|dims| dims.len()).collect();
            Arc::new(ShapeAgnosticExecutor { kernel, masks, ranks, out_dims })
        }
    })
}

#[derive(Debug, Clone)]
struct Kernel {
    data: EltwiseData,
    inputs: usize,
    post_ops: PostOps,
}

impl Kernel {
    fn run(&self, args: &ExecArgs, dims_out: &[usize], offset: impl Fn(usize, usize) -> usize) -> Result<()> {
        let values = (0..self.inputs)
            .map(|i| Ok(args.get(Arg::Src(i))?.to_values()?))
            .collect::<Result<Vec<_>>>()?;
        let post_ops = ResolvedPostOps::resolve(&self.post_ops, args)?;

        let count: usize = dims_out.iter().product();
        let channels = dims_out.get(Layout::CHANNEL_AXIS).copied().unwrap_or(1).max(1);
        let spatial: usize = dims_out.iter().skip(Layout::CHANNEL_AXIS + 1).product::<usize>().max(1);

        let mut out = Vec::with_capacity(count);
        let mut operands: SmallVec<[f32; 4]> = SmallVec::new();
        for index in 0..count {
            operands.clear();
            for (input, input_values) in values.iter().enumerate() {
                let value = input_values.get(offset(input, index)).copied().context(InvalidConfigurationSnafu {
                    reason: format!("eltwise input {input} is smaller than its broadcast dims"),
                })?;
                operands.push(value);
            }
            let value = self.data.compute(&operands);
            out.push(post_ops.apply(value, (index / spatial) % channels));
        }

        args.get(Arg::Dst)?.write_values(&out)?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct ReferenceExecutor {
    kernel: Kernel,
    out_dims: VectorDims,
}

impl EltwiseExecutor for ReferenceExecutor {
    fn exec(&self, args: &ExecArgs, dims_out: &[usize]) -> Result<()> {
        let strides = (0..self.kernel.inputs)
            .map(|i| broadcast_strides(&args.get(Arg::Src(i))?.desc().dims()?, dims_out))
            .collect::<Result<Vec<_>>>()?;
        self.kernel.run(args, dims_out, |input, index| element_offset(index, dims_out, &strides[input]))
    }

    fn impl_type(&self) -> EltwiseImplType {
        EltwiseImplType::Reference
    }

    fn out_dims(&self) -> &[usize] {
        &self.out_dims
    }
}

#[derive(Debug)]
pub struct OptimizedExecutor {
    kernel: Kernel,
    out_dims: VectorDims,
    /// Per input: `None` when it matches the output, otherwise every element's offset.
    offsets: Vec<Option<Vec<usize>>>,
}

impl OptimizedExecutor {
    fn new(kernel: Kernel, in_dims: &[VectorDims], out_dims: VectorDims) -> Result<Self> {
        let count: usize = out_dims.iter().product();
        let mut offsets = Vec::with_capacity(in_dims.len());
        for dims in in_dims {
            if dims.as_slice() == out_dims.as_slice() {
                offsets.push(None);
                continue;
            }
            let strides = broadcast_strides(dims, &out_dims)?;
            offsets.push(Some((0..count).map(|index| element_offset(index, &out_dims, &strides)).collect()));
        }
        Ok(Self { kernel, out_dims, offsets })
    }
}

impl EltwiseExecutor for OptimizedExecutor {
    fn exec(&self, args: &ExecArgs, dims_out: &[usize]) -> Result<()> {
        ensure!(
            dims_out == self.out_dims.as_slice(),
            InvalidConfigurationSnafu {
                reason: format!("eltwise executor built for {:?} got {dims_out:?}", self.out_dims),
            }
        );
        self.kernel.run(args, dims_out, |input, index| match &self.offsets[input] {
            Some(offsets) => offsets[index],
            None => index,
        })
    }

    fn impl_type(&self) -> EltwiseImplType {
        EltwiseImplType::Optimized
    }

    fn out_dims(&self) -> &[usize] {
        &self.out_dims
    }
}

#[derive(Debug)]
pub struct ShapeAgnosticExecutor {
    kernel: Kernel,
    masks: Vec<BroadcastMask>,
    ranks: Vec<usize>,
    out_dims: VectorDims,
}

impl EltwiseExecutor for ShapeAgnosticExecutor {
    fn exec(&self, args: &ExecArgs, dims_out: &[usize]) -> Result<()> {
        let rank = dims_out.len();
        ensure!(
            self.masks.iter().all(|mask| mask.len() == rank),
            InvalidConfigurationSnafu { reason: format!("eltwise executor cannot serve rank {rank}") }
        );

        let mut strides = Vec::with_capacity(self.masks.len());
        for (input, (mask, &in_rank)) in self.masks.iter().zip(&self.ranks).enumerate() {
            let in_dims: VectorDims =
                (rank - in_rank..rank).map(|axis| if mask[axis] { 1 } else { dims_out[axis] }).collect();
            let bound = args.get(Arg::Src(input))?.desc().dims()?;
            ensure!(
                bound == in_dims,
                InvalidConfigurationSnafu {
                    reason: format!("eltwise input {input} has dims {bound:?}, broadcast masks expect {in_dims:?}"),
                }
            );
            strides.push(broadcast_strides(&in_dims, dims_out)?);
        }
        self.kernel.run(args, dims_out, |input, index| element_offset(index, dims_out, &strides[input]))
    }

    fn impl_type(&self) -> EltwiseImplType {
        EltwiseImplType::ShapeAgnostic
    }

    fn out_dims(&self) -> &[usize] {
        &self.out_dims
    }
}
