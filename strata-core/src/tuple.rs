//! Fixed-capacity tuples describing shapes, strides, dimension roles and
//! coordinate selections.

use std::{
    fmt,
    ops::{Deref, Index},
};

use smallvec::SmallVec;

use crate::{Error, Result};

/// Maximum number of dimensions a tensor may have.
pub const MAX_TENSOR_DIMS: usize = 8;

/// An ordered sequence of at most [`MAX_TENSOR_DIMS`] entries.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct NTuple<T: Copy>(SmallVec<[T; MAX_TENSOR_DIMS]>);

pub type ShapeTuple = NTuple<usize>;
pub type StrideTuple = NTuple<usize>;
pub type SingleCoordTuple = NTuple<usize>;
pub type DimensionTypeTuple = NTuple<DimensionType>;
pub type CoordTuple = NTuple<DimensionRange>;

impl<T: Copy> NTuple<T> {
    pub fn new() -> Self {
        Self(SmallVec::new())
    }

    /// Build a tuple from a slice, failing if it has too many entries.
    pub fn try_from_slice(values: &[T]) -> Result<Self> {
        if values.len() > MAX_TENSOR_DIMS {
            return Err(Error::MaxRankExceeded { rank: values.len() });
        }
        Ok(Self(SmallVec::from_slice(values)))
    }

    /// A tuple of `len` copies of `value`.
    pub fn filled(len: usize, value: T) -> Result<Self> {
        if len > MAX_TENSOR_DIMS {
            return Err(Error::MaxRankExceeded { rank: len });
        }
        Ok(Self(SmallVec::from_elem(value, len)))
    }

    pub fn size(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.0
    }

    /// Truncate to `len` entries. Growing is not supported.
    pub fn truncate(&mut self, len: usize) {
        self.0.truncate(len);
    }

    pub(crate) fn push(&mut self, value: T) {
        debug_assert!(self.0.len() < MAX_TENSOR_DIMS);
        self.0.push(value);
    }
}

impl<T: Copy> Deref for NTuple<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.0
    }
}

impl<T: Copy> Index<usize> for NTuple<T> {
    type Output = T;

    fn index(&self, i: usize) -> &T {
        &self.0[i]
    }
}

impl<T: Copy + fmt::Debug> fmt::Debug for NTuple<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

impl<T: Copy, const N: usize> From<[T; N]> for NTuple<T> {
    /// Panics if `N` exceeds [`MAX_TENSOR_DIMS`]; use
    /// [`NTuple::try_from_slice`] for runtime-sized input.
    fn from(values: [T; N]) -> Self {
        assert!(N <= MAX_TENSOR_DIMS, "tuple of {N} entries exceeds maximum rank");
        Self(SmallVec::from_slice(&values))
    }
}

impl<T: Copy> TryFrom<&[T]> for NTuple<T> {
    type Error = Error;

    fn try_from(values: &[T]) -> Result<Self> {
        Self::try_from_slice(values)
    }
}

/// Semantic role of a tensor dimension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum DimensionType {
    #[default]
    Scalar,
    Sample,
    Channel,
    Spatial,
    Sequence,
}

/// Selection along one dimension.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum DimensionRange {
    /// The entire dimension.
    #[default]
    All,
    /// A single index. The dimension is dropped from the result.
    Index(usize),
    /// The half-open range `start..end`.
    Range { start: usize, end: usize },
}

/// Select the entire dimension.
pub const ALL: DimensionRange = DimensionRange::All;

impl DimensionRange {
    pub fn range(start: usize, end: usize) -> Self {
        Self::Range { start, end }
    }

    /// First index selected along a dimension.
    pub fn start(&self) -> usize {
        match *self {
            Self::All => 0,
            Self::Index(i) => i,
            Self::Range { start, .. } => start,
        }
    }

    /// Whether this selection removes its dimension.
    pub fn is_trivial(&self) -> bool {
        matches!(self, Self::Index(_))
    }

    /// Number of indices selected from a dimension of extent `dim`.
    pub fn len_in(&self, dim: usize) -> usize {
        match *self {
            Self::All => dim,
            Self::Index(_) => 1,
            Self::Range { start, end } => end.saturating_sub(start),
        }
    }

    fn in_bounds(&self, dim: usize) -> bool {
        match *self {
            Self::All => true,
            Self::Index(i) => i < dim,
            Self::Range { start, end } => start <= end && end <= dim,
        }
    }
}

impl From<usize> for DimensionRange {
    fn from(i: usize) -> Self {
        Self::Index(i)
    }
}

impl From<std::ops::Range<usize>> for DimensionRange {
    fn from(r: std::ops::Range<usize>) -> Self {
        Self::Range {
            start: r.start,
            end: r.end,
        }
    }
}

impl From<std::ops::RangeFull> for DimensionRange {
    fn from(_: std::ops::RangeFull) -> Self {
        Self::All
    }
}

/// Number of elements described by `shape`. The empty shape has no elements.
///
/// Fails with [`Error::ShapeOverflow`] when the count does not fit in `usize`.
pub fn product(shape: &[usize]) -> Result<usize> {
    if shape.is_empty() {
        return Ok(0);
    }
    shape
        .iter()
        .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
        .ok_or_else(|| Error::ShapeOverflow {
            shape: shape.to_vec(),
        })
}

/// Compute default (contiguous, row-major) strides for a tensor of given shape.
pub fn contiguous_strides(shape: &[usize]) -> Result<StrideTuple> {
    let mut strides = NTuple(SmallVec::from_elem(0, shape.len()));
    let mut acc = 1usize;
    // Iterate dims in reverse to accumulate products
    for (i, dim) in shape.iter().enumerate().rev() {
        strides.0[i] = acc;
        acc = acc.checked_mul(*dim).ok_or_else(|| Error::ShapeOverflow {
            shape: shape.to_vec(),
        })?;
    }
    Ok(strides)
}

/// Whether `strides` are exactly the contiguous strides implied by `shape`.
pub fn are_strides_contiguous(shape: &[usize], strides: &[usize]) -> bool {
    shape.len() == strides.len()
        && contiguous_strides(shape).is_ok_and(|c| c.as_slice() == strides)
}

/// Pad `coords` with [`ALL`] up to `rank`, checking each entry against `shape`.
pub(crate) fn normalize_coords(coords: &[DimensionRange], shape: &[usize]) -> Result<CoordTuple> {
    if coords.len() > shape.len() {
        return Err(Error::RankMismatch {
            expected: shape.len(),
            got: coords.len(),
        });
    }
    let mut out = CoordTuple::new();
    for (i, &dim) in shape.iter().enumerate() {
        let c = coords.get(i).copied().unwrap_or(ALL);
        if !c.in_bounds(dim) {
            return Err(Error::OutOfBounds {
                coord: coords.iter().map(DimensionRange::start).collect(),
                shape: shape.to_vec(),
            });
        }
        out.push(c);
    }
    Ok(out)
}

/// Shape of the region selected by `coords`, with single-index dimensions
/// removed.
pub fn get_range_shape(coords: &[DimensionRange], shape: &[usize]) -> Result<ShapeTuple> {
    let coords = normalize_coords(coords, shape)?;
    let mut out = ShapeTuple::new();
    for (c, &dim) in coords.iter().zip(shape.iter()) {
        if !c.is_trivial() {
            out.push(c.len_in(dim));
        }
    }
    Ok(out)
}

/// Keep the entries of `tuple` whose coordinate is not a single index.
pub fn filter_by_trivial<T: Copy>(coords: &[DimensionRange], tuple: &NTuple<T>) -> NTuple<T> {
    let mut out = NTuple::new();
    for (i, v) in tuple.iter().enumerate() {
        if !coords.get(i).is_some_and(DimensionRange::is_trivial) {
            out.push(*v);
        }
    }
    out
}
