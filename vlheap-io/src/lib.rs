#![deny(missing_docs)]

//! The boundary between vlheap and the chunked array container it stores data in.
//!
//! A container holds a hierarchy of groups and typed datasets. Datasets are read and
//! written one [slab][vlheap_nd::Slab] at a time and report their chunk layout so callers
//! can keep their I/O aligned with the underlying storage blocks.
//!
//! [`MemoryContainer`] is a complete in-memory implementation, chunked the same way a
//! file-backed container would be.

pub use config::*;
pub use dataset::*;
pub use memory::*;

mod config;
mod dataset;
mod memory;
