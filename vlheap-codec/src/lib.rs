#![deny(missing_docs)]

//! Store arrays of variable-length byte strings inside a chunked array container.
//!
//! Containers only hold fixed-size elements, so an array of variable-length elements is
//! split into two datasets:
//!
//! 1. The pointer dataset, shaped exactly like the logical array (or a single record for a
//!    0-dimensional array). Every element is a 16 byte [`PointerRecord`] holding the
//!    `(offset, length)` of its content.
//!
//! 2. The heap, a 1-dimensional extensible dataset of bytes. Contents are appended back to
//!    back in flat order, where the last dimension varies fastest.
//!
//! ```text
//!   pointers [2, 3]                          heap
//! ┌─────────┬─────────┬─────────┐          ┌───┬────┬─────┬──────┬───────┬────────┐
//! │ (0, 1)  │ (1, 2)  │ (3, 3)  │   ───▶   │ a │ bb │ ccc │ dddd │ eeeee │ ffffff │
//! ├─────────┼─────────┼─────────┤          └───┴────┴─────┴──────┴───────┴────────┘
//! │ (6, 4)  │ (10, 5) │ (15, 6) │          0   1    3     6      10      15       21
//! └─────────┴─────────┴─────────┘
//! ```
//!
//! # Writing
//!
//! [`VlsWriter`] streams contents into the heap through a [`HeapWriter`], which appends to
//! the container in flushes of [`WriteOptions::flush_threshold`] bytes. The pointer dataset
//! is then filled one chunk-aligned block at a time, so no more than
//! [`WriteOptions::element_budget`] records are held in memory.
//!
//! # Reading
//!
//! [`VlsReader`] pulls pointer records block by block and resolves each against the heap.
//! Every record is bounds-checked against the heap length first; a record pointing past
//! the end of the heap fails the read with a corruption error naming the element.
//!
//! [`VlsArray`] ties both to a pair of datasets in a container group.

pub use array::*;
pub use heap::*;
pub use options::*;
pub use pointer::*;
pub use read::*;
pub use write::*;

mod array;
mod heap;
mod options;
mod pointer;
mod read;
mod write;
