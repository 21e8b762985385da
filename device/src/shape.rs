//! Logical tensor shapes with possibly unresolved dimensions.

use std::fmt;

use smallvec::SmallVec;

/// Concrete dimensions, stack-allocated up to rank 6.
pub type VectorDims = SmallVec<[usize; 6]>;

/// Value substituted for unresolved dimensions when a dummy descriptor is built.
pub const DUMMY_DIM: usize = 64;

/// A single dimension of a [`Shape`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dim {
    Static(usize),
    /// Resolved only at runtime. `max` is `None` for unbounded dimensions.
    Dynamic { min: usize, max: Option<usize> },
}

impl Dim {
    pub const fn dynamic() -> Self {
        Self::Dynamic { min: 0, max: None }
    }

    pub const fn as_static(&self) -> Option<usize> {
        match self {
            Self::Static(d) => Some(*d),
            Self::Dynamic { .. } => None,
        }
    }

    /// Check if a concrete runtime value is admissible for this dimension.
    pub fn admits(&self, value: usize) -> bool {
        match *self {
            Self::Static(d) => d == value,
            Self::Dynamic { min, max } => value >= min && max.is_none_or(|max| value <= max),
        }
    }

    /// Value used in place of this dimension in a dummy descriptor.
    pub fn dummy(&self) -> usize {
        match *self {
            Self::Static(d) => d,
            Self::Dynamic { min, max } => DUMMY_DIM.max(min).min(max.unwrap_or(usize::MAX)),
        }
    }
}

impl From<usize> for Dim {
    fn from(d: usize) -> Self {
        Self::Static(d)
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(d) => write!(f, "{d}"),
            Self::Dynamic { min: 0, max: None } => write!(f, "?"),
            Self::Dynamic { min, max: None } => write!(f, "{min}.."),
            Self::Dynamic { min, max: Some(max) } => write!(f, "{min}..{max}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape {
    dims: SmallVec<[Dim; 6]>,
}

impl Shape {
    pub fn new(dims: impl IntoIterator<Item = Dim>) -> Self {
        Self { dims: dims.into_iter().collect() }
    }

    pub fn from_static(dims: &[usize]) -> Self {
        Self::new(dims.iter().copied().map(Dim::Static))
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn dims(&self) -> &[Dim] {
        &self.dims
    }

    pub fn is_static(&self) -> bool {
        self.dims.iter().all(|d| d.as_static().is_some())
    }

    /// Concrete dims, or `None` while any dimension is dynamic.
    pub fn static_dims(&self) -> Option<VectorDims> {
        self.dims.iter().map(Dim::as_static).collect()
    }

    pub fn dummy_dims(&self) -> VectorDims {
        self.dims.iter().map(Dim::dummy).collect()
    }

    /// Check if concrete `dims` can be the runtime value of this shape.
    pub fn admits(&self, dims: &[usize]) -> bool {
        self.rank() == dims.len() && self.dims.iter().zip(dims).all(|(d, &v)| d.admits(v))
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Self::from_static(dims)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}
