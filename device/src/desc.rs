//! Memory descriptors.
//!
//! A [`MemoryDesc`] is immutable once built and is shared through
//! [`MemoryDescPtr`]. Equality is deep, but callers that hold two pointers
//! should compare with [`same_desc`] which short-circuits on identity.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

use snafu::ensure;
use tessel_dtype::Precision;

use crate::error::{InvalidLayoutSnafu, Result, UndefinedDescSnafu};
use crate::layout::Layout;
use crate::shape::{Shape, VectorDims};

pub type MemoryDescPtr = Arc<MemoryDesc>;

pub struct MemoryDesc {
    precision: Precision,
    shape: Shape,
    layout: Layout,
    content_hash: OnceLock<u64>,
}

impl MemoryDesc {
    pub fn new(precision: Precision, shape: Shape, layout: Layout) -> Result<Self> {
        ensure!(layout.is_applicable(shape.rank()), InvalidLayoutSnafu { layout, rank: shape.rank() });
        Ok(Self { precision, shape, layout, content_hash: OnceLock::new() })
    }

    /// Planar descriptor of a fully static shape.
    pub fn planar(precision: Precision, dims: &[usize]) -> Self {
        Self { precision, shape: Shape::from_static(dims), layout: Layout::Planar, content_hash: OnceLock::new() }
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn is_defined(&self) -> bool {
        self.shape.is_static()
    }

    /// Concrete logical dims of a defined descriptor.
    pub fn dims(&self) -> Result<VectorDims> {
        self.shape.static_dims().ok_or_else(|| UndefinedDescSnafu { desc: self.to_string() }.build())
    }

    pub fn blocked_dims(&self) -> Result<VectorDims> {
        Ok(self.layout.blocked_dims(&self.dims()?))
    }

    pub fn order(&self) -> VectorDims {
        self.layout.order(self.rank())
    }

    /// Number of elements physically stored, padding included.
    pub fn element_count(&self) -> Result<usize> {
        Ok(self.blocked_dims()?.iter().product())
    }

    pub fn size_bytes(&self) -> Result<usize> {
        Ok(self.element_count()? * self.precision.bytes())
    }

    /// Check if the blocked layout pads the channel dimension.
    pub fn blocks_extended(&self) -> bool {
        match (self.layout, self.shape.dims().get(Layout::CHANNEL_AXIS)) {
            (Layout::Blocked(block), Some(channels)) => match channels.as_static() {
                Some(c) => c % block != 0,
                None => true,
            },
            _ => false,
        }
    }

    /// Same precision and layout with new concrete dims.
    pub fn clone_with_dims(&self, dims: &[usize]) -> Result<Self> {
        Self::new(self.precision, Shape::from_static(dims), self.layout)
    }

    /// Replacement for an undefined descriptor, every dynamic dim set to its dummy value.
    ///
    /// Defined descriptors are returned as an equal copy.
    pub fn make_dummy(&self) -> Result<Self> {
        self.clone_with_dims(&self.shape.dummy_dims())
    }

    /// Check if memory described by `other` can be consumed through `self`.
    ///
    /// Precision and layout must match; dims must match wherever both sides are static.
    pub fn is_compatible(&self, other: &MemoryDesc) -> bool {
        self.precision == other.precision
            && self.layout == other.layout
            && self.rank() == other.rank()
            && self.shape.dims().iter().zip(other.shape.dims()).all(|(a, b)| match (a.as_static(), b.as_static()) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            })
    }

    /// Physical element offset of every logical element, in row-major logical order.
    pub fn logical_offsets(&self) -> Result<Vec<usize>> {
        let dims = self.dims()?;
        let count = dims.iter().product::<usize>();
        let mut offsets = Vec::with_capacity(count);
        if count == 0 {
            return Ok(offsets);
        }

        let mut index: VectorDims = dims.iter().map(|_| 0).collect();
        for _ in 0..count {
            offsets.push(self.layout.offset(&dims, &index));
            for axis in (0..dims.len()).rev() {
                index[axis] += 1;
                if index[axis] < dims[axis] {
                    break;
                }
                index[axis] = 0;
            }
        }
        Ok(offsets)
    }

    /// Check if walking logical `axis` is unit-stride.
    pub fn is_dense_axis(&self, axis: usize) -> bool {
        axis < self.rank() && self.layout.is_dense_axis(self.rank(), axis)
    }

    /// Content hash, computed once and cached.
    pub fn content_hash(&self) -> u64 {
        *self.content_hash.get_or_init(|| {
            use xxhash_rust::xxh64::Xxh64;

            let mut hasher = Xxh64::new(0);
            self.hash(&mut hasher);
            hasher.finish()
        })
    }
}

/// Identity first, then deep comparison.
pub fn same_desc(lhs: &MemoryDescPtr, rhs: &MemoryDescPtr) -> bool {
    Arc::ptr_eq(lhs, rhs) || **lhs == **rhs
}

impl Clone for MemoryDesc {
    fn clone(&self) -> Self {
        Self {
            precision: self.precision,
            shape: self.shape.clone(),
            layout: self.layout,
            content_hash: self.content_hash.clone(),
        }
    }
}

impl PartialEq for MemoryDesc {
    fn eq(&self, other: &Self) -> bool {
        self.precision == other.precision && self.layout == other.layout && self.shape == other.shape
    }
}

impl Eq for MemoryDesc {}

impl Hash for MemoryDesc {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.precision.hash(state);
        self.layout.hash(state);
        self.shape.hash(state);
    }
}

impl fmt::Debug for MemoryDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryDesc")
            .field("precision", &self.precision)
            .field("shape", &self.shape)
            .field("layout", &self.layout)
            .finish()
    }
}

impl fmt::Display for MemoryDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.precision, self.layout, self.shape)
    }
}
