use serde::{Deserialize, Serialize};
use vlheap_io::DatasetConfig;
use vlheap_nd::Shape;

use crate::{DEFAULT_FLUSH_THRESHOLD, Trim};

/// Elements per block when neither caller nor config picks a budget.
pub const DEFAULT_ELEMENT_BUDGET: u64 = 1 << 20;

/// Options for writing a variable-length array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteOptions {
    /// Upper bound on the pointer records held in memory per block.
    pub element_budget: u64,
    /// Heap bytes buffered between appends to the heap dataset.
    pub flush_threshold: usize,
    /// Chunk extents of the pointer dataset. Only used when `compression_level > 0`.
    pub chunk_shape: Vec<u64>,
    /// Deflate level of both datasets, zero for the container's default layout.
    pub compression_level: u8,
    /// Chunk length of the heap dataset, or the container's default.
    pub heap_chunk_len: Option<u64>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            element_budget: DEFAULT_ELEMENT_BUDGET,
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            chunk_shape: Vec::new(),
            compression_level: 0,
            heap_chunk_len: None,
        }
    }
}

impl WriteOptions {
    /// Set the element budget.
    pub fn with_element_budget(mut self, element_budget: u64) -> Self {
        self.element_budget = element_budget;
        self
    }

    /// Set the heap flush threshold.
    pub fn with_flush_threshold(mut self, flush_threshold: usize) -> Self {
        self.flush_threshold = flush_threshold;
        self
    }

    /// Chunk and compress the pointer dataset, and compress the heap at the same level.
    pub fn with_compression(
        mut self,
        chunk_shape: impl Into<Vec<u64>>,
        compression_level: u8,
    ) -> Self {
        self.chunk_shape = chunk_shape.into();
        self.compression_level = compression_level;
        self
    }

    /// Set the heap chunk length.
    pub fn with_heap_chunk_len(mut self, heap_chunk_len: u64) -> Self {
        self.heap_chunk_len = Some(heap_chunk_len);
        self
    }

    /// The config of the pointer dataset of an array of `shape`.
    pub fn pointer_config(&self, shape: &Shape) -> DatasetConfig {
        if shape.is_scalar() {
            return DatasetConfig::scalar();
        }
        DatasetConfig::new(shape.dims())
            .with_compression(self.chunk_shape.clone(), self.compression_level)
    }

    /// Load options from JSON. Missing fields take their defaults.
    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> vlheap_error::VlsResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Options for reading a variable-length array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadOptions {
    /// Upper bound on the pointer records held in memory per block.
    pub element_budget: u64,
    /// Post-processing applied to every element's content.
    pub trim: Trim,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            element_budget: DEFAULT_ELEMENT_BUDGET,
            trim: Trim::default(),
        }
    }
}

impl ReadOptions {
    /// Set the element budget.
    pub fn with_element_budget(mut self, element_budget: u64) -> Self {
        self.element_budget = element_budget;
        self
    }

    /// Set the trim applied to decoded content.
    pub fn with_trim(mut self, trim: Trim) -> Self {
        self.trim = trim;
        self
    }

    /// Load options from JSON. Missing fields take their defaults.
    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> vlheap_error::VlsResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
