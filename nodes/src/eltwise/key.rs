use std::hash::{Hash, Hasher};

use smallvec::SmallVec;
use tessel_device::VectorDims;
use tessel_dtype::Precision;
use tessel_runtime::{CacheKey, PostOps, hash_combine, hash_key};

use super::policy::{BroadcastMask, broadcast_mask};
use super::{EltwiseData, EltwiseImplType};

/// Identity of a cached eltwise executor.
///
/// Shape-agnostic keys only carry input ranks and broadcast masks, so a
/// single executor serves every shape with the same broadcast pattern.
#[derive(Debug, Clone)]
pub struct EltwiseKey {
    pub data: EltwiseData,
    pub in_dims: Vec<VectorDims>,
    pub out_blocked_dims: VectorDims,
    pub out_order: VectorDims,
    pub in_precisions: SmallVec<[Precision; 4]>,
    pub out_precision: Precision,
    pub post_ops: PostOps,
    pub impl_type: EltwiseImplType,
}

impl EltwiseKey {
    fn shape_agnostic(&self) -> bool {
        self.impl_type == EltwiseImplType::ShapeAgnostic
    }

    fn out_rank(&self) -> usize {
        self.in_dims.iter().map(|dims| dims.len()).max().unwrap_or(0)
    }

    pub fn broadcast_masks(&self) -> Vec<BroadcastMask> {
        let rank = self.out_rank();
        self.in_dims.iter().map(|dims| broadcast_mask(dims, rank)).collect()
    }
}

impl CacheKey for EltwiseKey {
    fn hash_value(&self) -> u64 {
        let mut seed = 0;
        seed = hash_combine(seed, &self.data);
        seed = hash_combine(seed, &self.impl_type);
        seed = hash_combine(seed, self.in_precisions.as_slice());
        seed = hash_combine(seed, &self.out_precision);
        seed = hash_combine(seed, self.out_order.as_slice());
        seed = hash_combine(seed, &self.post_ops);

        if self.shape_agnostic() {
            for (dims, mask) in self.in_dims.iter().zip(self.broadcast_masks()) {
                seed = hash_combine(seed, &dims.len());
                seed = hash_combine(seed, mask.as_slice());
            }
        } else {
            for dims in &self.in_dims {
                seed = hash_combine(seed, dims.as_slice());
            }
            seed = hash_combine(seed, self.out_blocked_dims.as_slice());
        }
        seed
    }
}

impl PartialEq for EltwiseKey {
    fn eq(&self, other: &Self) -> bool {
        let common = self.data == other.data
            && self.impl_type == other.impl_type
            && self.in_precisions == other.in_precisions
            && self.out_precision == other.out_precision
            && self.out_order == other.out_order
            && self.post_ops == other.post_ops
            && self.in_dims.len() == other.in_dims.len();
        if !common {
            return false;
        }

        if self.shape_agnostic() {
            self.in_dims.iter().zip(&other.in_dims).all(|(a, b)| a.len() == b.len())
                && self.broadcast_masks() == other.broadcast_masks()
        } else {
            self.in_dims == other.in_dims && self.out_blocked_dims == other.out_blocked_dims
        }
    }
}

impl Eq for EltwiseKey {}

impl Hash for EltwiseKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        hash_key(self, state)
    }
}
