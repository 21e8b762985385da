//! Softmax kernels of the CPU backend.
//!
//! Both kernels compute in f32 and run the fused post-op chain on every
//! output element. The `jit` tiers walk contiguous rows of the physical
//! buffer and keep the exponentials of one row in the scratchpad; `ref`
//! gathers the logical tensor and walks the axis with a stride.

use std::sync::Arc;

use tessel_device::{MemoryDesc, MemoryDescPtr, VectorDims};
use tessel_dtype::Precision;

use super::cpu::Isa;
use crate::error::Result;
use crate::impl_type::ImplType;
use crate::post_ops::{PostOps, ResolvedPostOps};
use crate::primitive::{Arg, Candidate, ExecArgs, Primitive};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoftmaxKernel {
    Jit(Isa),
    Ref,
}

pub struct SoftmaxCandidate {
    kernel: SoftmaxKernel,
    info: String,
    scratchpad: MemoryDescPtr,
    softmax: Softmax,
}

impl SoftmaxCandidate {
    pub fn new(
        kernel: SoftmaxKernel,
        src: MemoryDescPtr,
        dst: MemoryDescPtr,
        axis: usize,
        post_ops: PostOps,
    ) -> Result<Self> {
        let dims = src.dims()?;
        let (info, workspace) = match kernel {
            SoftmaxKernel::Jit(isa) => (format!("jit:{isa}"), dims[axis]),
            SoftmaxKernel::Ref => ("ref:any".to_string(), 0),
        };
        let scratchpad = Arc::new(MemoryDesc::planar(Precision::F32, &[workspace]));
        Ok(Self { kernel, info, scratchpad, softmax: Softmax { src, dst, dims, axis, post_ops } })
    }
}

impl Candidate for SoftmaxCandidate {
    fn info(&self) -> &str {
        &self.info
    }

    fn impl_type(&self) -> ImplType {
        match self.kernel {
            SoftmaxKernel::Jit(isa) => isa.impl_type(),
            SoftmaxKernel::Ref => ImplType::REF_ANY,
        }
    }

    fn scratchpad_desc(&self) -> MemoryDescPtr {
        Arc::clone(&self.scratchpad)
    }

    fn create(self: Box<Self>) -> Result<Box<dyn Primitive>> {
        Ok(match self.kernel {
            SoftmaxKernel::Jit(_) => Box::new(JitSoftmax(self.softmax)),
            SoftmaxKernel::Ref => Box::new(RefSoftmax(self.softmax)),
        })
    }
}

struct Softmax {
    src: MemoryDescPtr,
    dst: MemoryDescPtr,
    dims: VectorDims,
    axis: usize,
    post_ops: PostOps,
}

impl Softmax {
    /// (outer, axis, inner) extents around the softmax axis.
    fn extents(&self) -> (usize, usize, usize) {
        let outer = self.dims[..self.axis].iter().product();
        let inner = self.dims[self.axis + 1..].iter().product();
        (outer, self.dims[self.axis], inner)
    }

    /// Channel of the element at row-major logical `index`.
    fn channel(&self, index: usize) -> usize {
        if self.dims.len() < 2 {
            return 0;
        }
        let spatial: usize = self.dims[2..].iter().product();
        (index / spatial.max(1)) % self.dims[1].max(1)
    }

    fn store(&self, args: &ExecArgs, values: &[f32]) -> Result<()> {
        let dst = args.get(Arg::Dst)?;
        debug_assert_eq!(dst.desc().dims().ok(), self.dst.dims().ok());
        dst.write_values(values)?;
        Ok(())
    }
}

struct JitSoftmax(Softmax);

impl Primitive for JitSoftmax {
    fn execute(&self, args: &ExecArgs) -> Result<()> {
        let softmax = &self.0;
        let src = args.get(Arg::Src(0))?;
        let scratch = args.get(Arg::Scratchpad)?;
        let post_ops = ResolvedPostOps::resolve(&softmax.post_ops, args)?;

        let precision = softmax.src.precision();
        let offsets = softmax.src.logical_offsets()?;
        let (outer, len, inner) = softmax.extents();
        if len == 0 || offsets.is_empty() {
            return Ok(());
        }
        let mut out = vec![0.0f32; offsets.len()];

        src.read(|bytes| {
            scratch.write(|workspace| {
                for o in 0..outer {
                    for i in 0..inner {
                        let first = o * len * inner + i;
                        // The axis is dense, so the row is contiguous from here
                        let base = offsets[first];

                        let mut max = f32::NEG_INFINITY;
                        for k in 0..len {
                            let value = precision.load(bytes, base + k);
                            Precision::F32.store(workspace, k, value);
                            max = max.max(value);
                        }

                        let mut sum = 0.0f32;
                        for k in 0..len {
                            let e = (Precision::F32.load(workspace, k) - max).exp();
                            Precision::F32.store(workspace, k, e);
                            sum += e;
                        }

                        for k in 0..len {
                            let at = first + k * inner;
                            let value = Precision::F32.load(workspace, k) / sum;
                            out[at] = post_ops.apply(value, softmax.channel(at));
                        }
                    }
                }
            })
        })??;

        softmax.store(args, &out)
    }
}

struct RefSoftmax(Softmax);

impl Primitive for RefSoftmax {
    fn execute(&self, args: &ExecArgs) -> Result<()> {
        let softmax = &self.0;
        let values = args.get(Arg::Src(0))?.to_values()?;
        let post_ops = ResolvedPostOps::resolve(&softmax.post_ops, args)?;

        let (outer, len, inner) = softmax.extents();
        let mut out = vec![0.0f32; values.len()];

        for o in 0..outer {
            for i in 0..inner {
                let at = |k: usize| o * len * inner + k * inner + i;

                let max = (0..len).map(|k| values[at(k)]).fold(f32::NEG_INFINITY, f32::max);
                let sum: f32 = (0..len).map(|k| (values[at(k)] - max).exp()).sum();
                for k in 0..len {
                    let value = (values[at(k)] - max).exp() / sum;
                    out[at(k)] = post_ops.apply(value, softmax.channel(at(k)));
                }
            }
        }

        softmax.store(args, &out)
    }
}
