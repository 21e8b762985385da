//! Broadcasting of eltwise parameters against the main input.

use smallvec::{SmallVec, smallvec};
use tessel_device::{Layout, Shape, VectorDims};
use tessel_runtime::error::{InvalidConfigurationSnafu, Result};

/// How a constant parameter spreads over the main input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum BroadcastingPolicy {
    /// One value per channel.
    PerChannel,
    /// One value for the whole tensor.
    PerTensor,
    /// Anything else. The node cannot be fused as a post-op.
    Undefined,
}

/// Classify a `param` shape against the `main` input shape.
///
/// Shapes are right-aligned. A parameter with a single element is
/// per-tensor; one whose every non-unit dim lands on the channel axis (and
/// matches the channel extent when that is known) is per-channel.
pub fn determine_broadcasting_policy(main: &Shape, param: &Shape) -> BroadcastingPolicy {
    let Some(param_dims) = param.static_dims() else {
        return BroadcastingPolicy::Undefined;
    };
    if param_dims.iter().product::<usize>() == 1 {
        return BroadcastingPolicy::PerTensor;
    }

    let rank = main.rank();
    if param_dims.len() > rank {
        return BroadcastingPolicy::Undefined;
    }

    let offset = rank - param_dims.len();
    for (i, &dim) in param_dims.iter().enumerate() {
        if dim == 1 {
            continue;
        }
        let axis = offset + i;
        if axis != Layout::CHANNEL_AXIS {
            return BroadcastingPolicy::Undefined;
        }
        if let Some(channels) = main.dims()[axis].as_static()
            && channels != dim
        {
            return BroadcastingPolicy::Undefined;
        }
    }
    BroadcastingPolicy::PerChannel
}

/// Per output axis: `true` where the input has extent 1 (or no axis at all) and is broadcast.
pub type BroadcastMask = SmallVec<[bool; 6]>;

pub fn broadcast_mask(in_dims: &[usize], out_rank: usize) -> BroadcastMask {
    let offset = out_rank.saturating_sub(in_dims.len());
    let mut mask: BroadcastMask = smallvec![true; out_rank];
    for (i, &dim) in in_dims.iter().enumerate() {
        if let Some(slot) = mask.get_mut(offset + i) {
            *slot = dim == 1;
        }
    }
    mask
}

/// Numpy-style broadcast of every input's dims.
pub fn broadcast_dims(in_dims: &[VectorDims]) -> Result<VectorDims> {
    let rank = in_dims.iter().map(|d| d.len()).max().unwrap_or(0);
    let mut out: VectorDims = smallvec![1; rank];
    for dims in in_dims {
        let offset = rank - dims.len();
        for (i, &dim) in dims.iter().enumerate() {
            let slot = &mut out[offset + i];
            if *slot == 1 {
                *slot = dim;
            } else if dim != 1 && dim != *slot {
                return InvalidConfigurationSnafu {
                    reason: format!("eltwise input dims {dims:?} do not broadcast to {out:?}"),
                }
                .fail();
            }
        }
    }
    Ok(out)
}

/// Element stride of every output axis within an input of `in_dims`, 0 where broadcast.
pub fn broadcast_strides(in_dims: &[usize], out_dims: &[usize]) -> Result<VectorDims> {
    let rank = out_dims.len();
    snafu::ensure!(
        in_dims.len() <= rank,
        InvalidConfigurationSnafu { reason: format!("eltwise input dims {in_dims:?} exceed output rank {rank}") }
    );

    let offset = rank - in_dims.len();
    let mut strides: VectorDims = smallvec![0; rank];
    let mut stride = 1;
    for i in (0..in_dims.len()).rev() {
        let axis = offset + i;
        let dim = in_dims[i];
        snafu::ensure!(
            dim == 1 || dim == out_dims[axis],
            InvalidConfigurationSnafu { reason: format!("eltwise input dims {in_dims:?} do not fit {out_dims:?}") }
        );
        strides[axis] = if dim == 1 { 0 } else { stride };
        stride *= dim;
    }
    Ok(strides)
}

/// Input element offset of the row-major output element `index`.
pub fn element_offset(index: usize, out_dims: &[usize], strides: &[usize]) -> usize {
    let mut rest = index;
    let mut offset = 0;
    for axis in (0..out_dims.len()).rev() {
        let dim = out_dims[axis].max(1);
        offset += (rest % dim) * strides[axis];
        rest /= dim;
    }
    offset
}
