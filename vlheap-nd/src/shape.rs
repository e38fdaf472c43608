use std::fmt::{Display, Formatter};

use itertools::Itertools;
use vlheap_error::{VlsResult, vls_bail, vls_err};

/// The extents of an N-dimensional array, declared slowest to fastest varying.
///
/// A shape of rank 0 is a scalar and holds exactly one element. The stride vector is
/// computed once on construction, which also guarantees that every partial product of the
/// extents fits in a `u64`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape {
    dims: Vec<u64>,
    strides: Vec<u64>,
    num_elements: u64,
}

impl Shape {
    /// Create a shape from its extents.
    ///
    /// Fails if the number of elements, or any stride, would overflow a `u64`.
    pub fn try_new(dims: impl Into<Vec<u64>>) -> VlsResult<Self> {
        let dims = dims.into();
        let mut strides = vec![0u64; dims.len()];
        let mut stride = 1u64;
        for (s, &extent) in strides.iter_mut().zip(dims.iter()).rev() {
            *s = stride;
            stride = stride.checked_mul(extent).ok_or_else(|| {
                vls_err!(
                    "shape [{}] has more elements than fit in a u64",
                    dims.iter().join(", ")
                )
            })?;
        }

        Ok(Self {
            dims,
            strides,
            num_elements: stride,
        })
    }

    /// The shape of a 0-dimensional array.
    pub fn scalar() -> Self {
        Self {
            dims: Vec::new(),
            strides: Vec::new(),
            num_elements: 1,
        }
    }

    /// The extents, slowest varying dimension first.
    #[inline]
    pub fn dims(&self) -> &[u64] {
        &self.dims
    }

    /// The number of dimensions.
    #[inline]
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Whether this is the shape of a 0-dimensional array.
    #[inline]
    pub fn is_scalar(&self) -> bool {
        self.dims.is_empty()
    }

    /// The total number of elements. A scalar has one element; any zero extent gives zero.
    #[inline]
    pub fn num_elements(&self) -> u64 {
        self.num_elements
    }

    /// Whether the array has no elements at all.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.num_elements == 0
    }

    /// The element stride of every dimension.
    ///
    /// The last (fastest varying) dimension has stride 1 and every other dimension's stride
    /// is the product of the extents of all the dimensions that vary faster than it.
    #[inline]
    pub fn strides(&self) -> &[u64] {
        &self.strides
    }

    /// Whether `coord` has the right rank and lies inside the array.
    pub fn contains(&self, coord: &[u64]) -> bool {
        coord.len() == self.rank() && coord.iter().zip(&self.dims).all(|(&c, &d)| c < d)
    }

    /// The position of `coord` in the flat, fastest-dimension-last element order.
    pub fn flat_index(&self, coord: &[u64]) -> VlsResult<u64> {
        if coord.len() != self.rank() {
            vls_bail!(
                ShapeMismatch: format!("rank {}", self.rank()),
                format!("coordinate {}", fmt_coord(coord))
            );
        }
        let mut flat = 0;
        for ((&c, &extent), &stride) in coord.iter().zip(&self.dims).zip(&self.strides) {
            if c >= extent {
                vls_bail!(OutOfBounds: c, 0, extent);
            }
            flat += c * stride;
        }
        Ok(flat)
    }

    /// The coordinate of the element at position `flat` of the flat element order.
    ///
    /// This is the inverse of [`Shape::flat_index`].
    pub fn unravel(&self, flat: u64) -> VlsResult<Vec<u64>> {
        if flat >= self.num_elements {
            vls_bail!(OutOfBounds: flat, 0, self.num_elements);
        }
        let mut remainder = flat;
        Ok(self
            .strides
            .iter()
            .map(|&stride| {
                let c = remainder / stride;
                remainder %= stride;
                c
            })
            .collect())
    }
}

impl AsRef<[u64]> for Shape {
    fn as_ref(&self) -> &[u64] {
        &self.dims
    }
}

impl Display for Shape {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.dims.iter().join(", "))
    }
}

/// Render a coordinate as `(i, j, k)`, for error messages and logs.
pub fn fmt_coord(coord: &[u64]) -> String {
    format!("({})", coord.iter().join(", "))
}
