use std::iter::FusedIterator;

use vlheap_error::{VlsResult, vls_bail};

use crate::Slab;

/// The flat index of the first element of a slab starting at `starts`.
#[inline]
pub fn slab_start_flat_index(strides: &[u64], starts: &[u64]) -> u64 {
    strides.iter().zip(starts).map(|(&s, &i)| s * i).sum()
}

/// Enumerates the flat indices of the elements of a slab, in odometer order.
///
/// A running flat index is kept alongside one position counter per dimension. Stepping
/// bumps the fastest counter and adds its stride; a counter that reaches its count is
/// reset and its `stride * count` subtracted before carrying into the next slower
/// dimension. Each step is O(1) amortized.
#[derive(Debug, Clone)]
pub struct SlabIndices<'a> {
    strides: &'a [u64],
    counts: &'a [u64],
    positions: Vec<u64>,
    current: u64,
    remaining: u64,
}

impl<'a> SlabIndices<'a> {
    /// Create an iterator over `slab`, using the strides of the array the slab belongs to.
    pub fn new(strides: &'a [u64], slab: &'a Slab) -> VlsResult<Self> {
        if strides.len() != slab.rank() {
            vls_bail!(ShapeMismatch: format!("rank {}", strides.len()), format!("slab {}", slab));
        }
        Ok(Self {
            strides,
            counts: slab.counts(),
            positions: vec![0; slab.rank()],
            current: slab_start_flat_index(strides, slab.starts()),
            remaining: slab.num_elements(),
        })
    }

    /// The number of indices left to produce.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    fn step(&mut self) {
        for ((position, &count), &stride) in self
            .positions
            .iter_mut()
            .zip(self.counts)
            .zip(self.strides)
            .rev()
        {
            *position += 1;
            self.current += stride;
            if *position < count {
                return;
            }
            *position = 0;
            self.current -= stride * count;
        }
    }
}

impl Iterator for SlabIndices<'_> {
    type Item = u64;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let index = self.current;
        self.remaining -= 1;
        if self.remaining > 0 {
            self.step();
        }
        Some(index)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match usize::try_from(self.remaining) {
            Ok(n) => (n, Some(n)),
            Err(_) => (usize::MAX, None),
        }
    }
}

impl FusedIterator for SlabIndices<'_> {}
