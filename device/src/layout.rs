//! Physical layouts of tensor memory.
//!
//! A layout maps logical dims to physical "blocked dims" plus an order that
//! tells which logical axis every blocked dim walks. The channel axis is
//! always logical axis 1.

use std::fmt;

use smallvec::{SmallVec, smallvec};

use crate::shape::VectorDims;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layout {
    /// Row-major, `abcd`.
    Planar,
    /// Channels innermost, `acdb`.
    ChannelsLast,
    /// Channels split into blocks of the given size stored innermost, `aBcd16b`.
    Blocked(usize),
}

impl Layout {
    pub const CHANNEL_AXIS: usize = 1;

    /// Layouts worth offering for a tensor of the given rank, most generic first.
    pub fn available_for_rank(rank: usize) -> SmallVec<[Layout; 4]> {
        match rank {
            3..=5 => smallvec![Layout::Planar, Layout::ChannelsLast, Layout::Blocked(16), Layout::Blocked(8)],
            _ => smallvec![Layout::Planar],
        }
    }

    pub fn is_applicable(&self, rank: usize) -> bool {
        match self {
            Self::Planar => true,
            Self::ChannelsLast => (3..=5).contains(&rank),
            Self::Blocked(block) => *block > 0 && (3..=5).contains(&rank),
        }
    }

    /// Logical axis walked by every blocked dim, outermost first.
    pub fn order(&self, rank: usize) -> VectorDims {
        match self {
            Self::Planar => (0..rank).collect(),
            Self::ChannelsLast => std::iter::once(0).chain(2..rank).chain(std::iter::once(1)).collect(),
            Self::Blocked(_) => (0..rank).chain(std::iter::once(Self::CHANNEL_AXIS)).collect(),
        }
    }

    /// Physical dims of a tensor with logical `dims`.
    ///
    /// Blocked layouts round the channel count up to a whole number of blocks.
    pub fn blocked_dims(&self, dims: &[usize]) -> VectorDims {
        match self {
            Self::Planar => dims.iter().copied().collect(),
            Self::ChannelsLast => self.order(dims.len()).iter().map(|&axis| dims[axis]).collect(),
            Self::Blocked(block) => {
                let mut blocked: VectorDims = dims.iter().copied().collect();
                blocked[Self::CHANNEL_AXIS] = dims[Self::CHANNEL_AXIS].div_ceil(*block);
                blocked.push(*block);
                blocked
            }
        }
    }

    /// Element offset of logical `index` within a buffer of logical `dims`.
    pub fn offset(&self, dims: &[usize], index: &[usize]) -> usize {
        let blocked = self.blocked_dims(dims);
        let mut offset = 0;
        for (pos, &axis) in self.order(dims.len()).iter().enumerate() {
            let coord = match self {
                Self::Blocked(block) if axis == Self::CHANNEL_AXIS => {
                    if pos == dims.len() { index[axis] % block } else { index[axis] / block }
                }
                _ => index[axis],
            };
            offset = offset * blocked[pos] + coord;
        }
        offset
    }

    /// Check if walking logical `axis` is a unit-stride walk in memory.
    pub fn is_dense_axis(&self, rank: usize, axis: usize) -> bool {
        match self {
            Self::Planar => axis + 1 == rank,
            Self::ChannelsLast => axis == Self::CHANNEL_AXIS,
            Self::Blocked(_) => false,
        }
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Planar => write!(f, "ncsp"),
            Self::ChannelsLast => write!(f, "nspc"),
            Self::Blocked(block) => write!(f, "nCsp{block}c"),
        }
    }
}
