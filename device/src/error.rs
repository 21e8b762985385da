use snafu::Snafu;

use crate::layout::Layout;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Descriptor still has dynamic dimensions where concrete ones are required.
    #[snafu(display("memory descriptor is not defined: {desc}"))]
    UndefinedDesc { desc: String },

    #[snafu(display("layout {layout} is not applicable to rank {rank}"))]
    InvalidLayout { layout: Layout, rank: usize },

    #[snafu(display("size mismatch: expected {expected}, got {actual}"))]
    SizeMismatch { expected: usize, actual: usize },

    /// Shape of target memory does not match expected shape.
    #[snafu(display("shape mismatch: expected {expected:?}, got {actual:?}"))]
    ShapeMismatch { expected: Vec<usize>, actual: Vec<usize> },

    #[snafu(display("failed to allocate {size} bytes"))]
    AllocationFailed { size: usize },

    /// Descriptor does not fit into the memory it is placed on.
    #[snafu(display("view of {size} bytes exceeds buffer size {buffer_size}"))]
    InvalidView { size: usize, buffer_size: usize },
}
