use std::iter::FusedIterator;
use std::mem;

use itertools::{Itertools, izip};
use vlheap_error::{VlsResult, vls_bail};

use crate::{Shape, Slab, plan_block};

/// Walks an array block by block.
///
/// Slabs are produced in odometer order: the fastest varying (last) dimension advances
/// first and carries into slower dimensions when it runs off the end of the array. Every
/// slab has the block shape except at the far edge of a dimension, where it is truncated
/// to the remaining extent. Together the slabs cover every element exactly once.
///
/// The iterator is not restartable. Build a new one for each pass over the array.
#[derive(Debug, Clone)]
pub struct SlabIterator {
    full_shape: Vec<u64>,
    block_shape: Vec<u64>,
    state: State,
}

#[derive(Debug, Clone)]
enum State {
    Active(Slab),
    Finished,
}

impl SlabIterator {
    /// Create an iterator over `full_shape` in blocks of `block_shape`.
    ///
    /// An all-zero block shape, or an array with no elements, yields no slabs at all. The
    /// array must have an element count that fits in a `u64`.
    pub fn try_new(full_shape: &[u64], block_shape: &[u64]) -> VlsResult<Self> {
        Shape::try_new(full_shape)?;
        if full_shape.len() != block_shape.len() {
            vls_bail!(
                ShapeMismatch: format!("block rank {}", full_shape.len()),
                format!("block rank {}", block_shape.len())
            );
        }

        let no_elements = full_shape.contains(&0);
        let degenerate = !block_shape.is_empty() && block_shape.iter().all(|&b| b == 0);
        if !no_elements && !degenerate && block_shape.contains(&0) {
            vls_bail!(
                "block [{}] cannot cover array [{}]",
                block_shape.iter().join(", "),
                full_shape.iter().join(", ")
            );
        }

        let mut iter = Self {
            full_shape: full_shape.to_vec(),
            block_shape: block_shape.to_vec(),
            state: State::Finished,
        };
        if !no_elements && !degenerate {
            iter.state = State::Active(iter.slab_at(vec![0; full_shape.len()]));
        }
        Ok(iter)
    }

    /// Plan a chunk-aligned block shape with [`plan_block`] and iterate the array with it.
    pub fn planned(
        full_shape: &[u64],
        chunk_shape: Option<&[u64]>,
        element_budget: u64,
    ) -> VlsResult<Self> {
        let block_shape = plan_block(chunk_shape, full_shape, element_budget)?;
        Self::try_new(full_shape, &block_shape)
    }

    /// The shape of the array being iterated.
    pub fn full_shape(&self) -> &[u64] {
        &self.full_shape
    }

    /// The nominal shape of every slab.
    pub fn block_shape(&self) -> &[u64] {
        &self.block_shape
    }

    /// The slab the iterator is positioned on, or `None` once finished.
    pub fn current(&self) -> Option<&Slab> {
        match &self.state {
            State::Active(slab) => Some(slab),
            State::Finished => None,
        }
    }

    /// Whether every slab has been produced.
    pub fn finished(&self) -> bool {
        matches!(self.state, State::Finished)
    }

    /// The number of elements in the current slab, zero once finished.
    pub fn block_element_count(&self) -> u64 {
        self.current().map_or(0, Slab::num_elements)
    }

    /// Move to the next slab.
    pub fn advance(&mut self) {
        self.next();
    }

    /// The total number of slabs a fresh pass over this array produces.
    pub fn slab_count(&self) -> u64 {
        let degenerate = !self.block_shape.is_empty() && self.block_shape.iter().all(|&b| b == 0);
        if degenerate || self.full_shape.contains(&0) {
            return 0;
        }
        self.full_shape
            .iter()
            .zip(&self.block_shape)
            .map(|(&f, &b)| f.div_ceil(b))
            .product()
    }

    /// The number of slabs not yet produced, including the current one.
    pub fn remaining(&self) -> u64 {
        let Some(slab) = self.current() else {
            return 0;
        };
        // The position of the current slab, read as a mixed radix number of block indices.
        let mut consumed = 0;
        let mut radix = 1;
        let dims = izip!(slab.starts(), &self.full_shape, &self.block_shape);
        for (&start, &full, &block) in dims.rev() {
            consumed += start / block * radix;
            radix *= full.div_ceil(block);
        }
        radix - consumed
    }

    fn slab_at(&self, starts: Vec<u64>) -> Slab {
        let counts = izip!(&starts, &self.block_shape, &self.full_shape)
            .map(|(&start, &block, &full)| block.min(full - start))
            .collect();
        Slab::new_unchecked(starts, counts)
    }

    fn successor(&self, slab: &Slab) -> Option<Slab> {
        let mut starts = slab.starts().to_vec();
        let mut advanced = false;
        for ((start, &block), &full) in starts
            .iter_mut()
            .zip(&self.block_shape)
            .zip(&self.full_shape)
            .rev()
        {
            if block < full - *start {
                *start += block;
                advanced = true;
                break;
            }
            *start = 0;
        }
        advanced.then(|| self.slab_at(starts))
    }
}

impl Iterator for SlabIterator {
    type Item = Slab;

    fn next(&mut self) -> Option<Self::Item> {
        let State::Active(slab) = mem::replace(&mut self.state, State::Finished) else {
            return None;
        };
        if let Some(next) = self.successor(&slab) {
            self.state = State::Active(next);
        }
        Some(slab)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match usize::try_from(self.remaining()) {
            Ok(n) => (n, Some(n)),
            Err(_) => (usize::MAX, None),
        }
    }
}

impl FusedIterator for SlabIterator {}
