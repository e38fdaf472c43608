#![deny(missing_docs)]

//! N-dimensional index arithmetic for vlheap.
//!
//! Shapes are declared slowest to fastest varying: the last extent is the dimension whose
//! elements are adjacent in storage. That convention is applied once, when computing
//! [`Shape::strides`], and everything else in this crate works on plain coordinates.
//!
//! The crate provides three building blocks:
//!
//! * [`plan_block`] picks a chunk-aligned block shape that fits an element budget.
//! * [`SlabIterator`] walks an array block by block, yielding [`Slab`]s in odometer order.
//! * [`SlabIndices`] enumerates the flat indices of the elements inside one slab.

pub use indices::*;
pub use iter::*;
pub use planner::*;
pub use shape::*;
pub use slab::*;

mod indices;
mod iter;
mod planner;
mod shape;
mod slab;
