use std::fmt::{Display, Formatter};

use itertools::Itertools;
use vlheap_error::{VlsResult, vls_bail, vls_err};

use crate::Shape;

/// A hyperrectangular region of an array, described by a `(start, count)` pair per dimension.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Slab {
    starts: Vec<u64>,
    counts: Vec<u64>,
    len: u64,
}

impl Slab {
    /// Create a slab from per-dimension starts and counts.
    pub fn try_new(
        starts: impl Into<Vec<u64>>,
        counts: impl Into<Vec<u64>>,
    ) -> VlsResult<Self> {
        let starts = starts.into();
        let counts = counts.into();
        if starts.len() != counts.len() {
            vls_bail!(
                ShapeMismatch: format!("{} counts", starts.len()),
                format!("{} counts", counts.len())
            );
        }
        let len = counts
            .iter()
            .try_fold(1u64, |acc, &c| acc.checked_mul(c))
            .ok_or_else(|| vls_err!("slab counts [{}] overflow a u64", counts.iter().join(", ")))?;
        Ok(Self {
            starts,
            counts,
            len,
        })
    }

    /// Create a slab from counts that are already known to describe a valid region.
    pub(crate) fn new_unchecked(starts: Vec<u64>, counts: Vec<u64>) -> Self {
        let len = counts.iter().product();
        Self {
            starts,
            counts,
            len,
        }
    }

    /// The slab covering every element of `shape`.
    pub fn whole(shape: &Shape) -> Self {
        Self {
            starts: vec![0; shape.rank()],
            counts: shape.dims().to_vec(),
            len: shape.num_elements(),
        }
    }

    /// The single-element slab at `coord`.
    pub fn element(coord: &[u64]) -> Self {
        Self {
            starts: coord.to_vec(),
            counts: vec![1; coord.len()],
            len: 1,
        }
    }

    /// A one dimensional slab of `count` elements beginning at `start`.
    pub fn range(start: u64, count: u64) -> Self {
        Self {
            starts: vec![start],
            counts: vec![count],
            len: count,
        }
    }

    /// The first coordinate of the slab in every dimension.
    #[inline]
    pub fn starts(&self) -> &[u64] {
        &self.starts
    }

    /// The extent of the slab in every dimension.
    #[inline]
    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// The number of dimensions.
    #[inline]
    pub fn rank(&self) -> usize {
        self.starts.len()
    }

    /// The number of elements inside the slab.
    #[inline]
    pub fn num_elements(&self) -> u64 {
        self.len
    }

    /// Whether the slab covers no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Fail unless the slab has the rank of `shape` and lies entirely inside it.
    pub fn check_within(&self, shape: &Shape) -> VlsResult<()> {
        if self.rank() != shape.rank() {
            vls_bail!(ShapeMismatch: format!("rank {}", shape.rank()), format!("slab {}", self));
        }
        for ((&start, &count), &extent) in self.starts.iter().zip(&self.counts).zip(shape.dims()) {
            let end = start
                .checked_add(count)
                .ok_or_else(|| vls_err!("slab {} overflows a u64", self))?;
            if end > extent {
                vls_bail!(OutOfBounds: end, 0, extent);
            }
        }
        Ok(())
    }
}

impl Display for Slab {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}]",
            self.starts
                .iter()
                .zip(&self.counts)
                .format_with(", ", |(start, count), f| f(&format_args!(
                    "{}..{}",
                    start,
                    start.saturating_add(*count)
                )))
        )
    }
}
