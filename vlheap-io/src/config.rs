use std::fmt::{Display, Formatter};

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use vlheap_error::{VlsResult, vls_bail};
use vlheap_nd::Shape;

/// The highest deflate level a dataset may be configured with.
pub const MAX_COMPRESSION_LEVEL: u8 = 9;

/// How a dataset is created: its extents, chunking and compression.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Array extents, slowest varying dimension first.
    pub dimensions: Vec<u64>,
    /// Chunk extents. Only used when `compression_level > 0`.
    pub chunk_shape: Vec<u64>,
    /// Zero for the default contiguous layout, otherwise the deflate level to request.
    pub compression_level: u8,
    /// Create a single 0-dimensional element. `dimensions` and `chunk_shape` are ignored.
    pub scalar: bool,
}

impl DatasetConfig {
    /// A contiguous, uncompressed dataset of the given extents.
    pub fn new(dimensions: impl Into<Vec<u64>>) -> Self {
        Self {
            dimensions: dimensions.into(),
            ..Default::default()
        }
    }

    /// A 0-dimensional dataset holding exactly one element.
    pub fn scalar() -> Self {
        Self {
            scalar: true,
            ..Default::default()
        }
    }

    /// Chunk the dataset and compress it at `compression_level`.
    pub fn with_compression(
        mut self,
        chunk_shape: impl Into<Vec<u64>>,
        compression_level: u8,
    ) -> Self {
        self.chunk_shape = chunk_shape.into();
        self.compression_level = compression_level;
        self
    }

    /// The shape of the dataset this config creates.
    pub fn shape(&self) -> VlsResult<Shape> {
        if self.scalar {
            return Ok(Shape::scalar());
        }
        Shape::try_new(self.dimensions.clone())
    }

    /// Validate the config and resolve the storage layout it asks for.
    pub fn layout(&self) -> VlsResult<Layout> {
        if self.scalar {
            return Ok(Layout::Contiguous);
        }
        if !self.chunk_shape.is_empty() && self.chunk_shape.len() != self.dimensions.len() {
            vls_bail!(ShapeMismatch:
                format!("chunk shape of rank {}", self.dimensions.len()),
                format!("[{}]", self.chunk_shape.iter().join(", "))
            );
        }
        if self.compression_level == 0 {
            return Ok(Layout::Contiguous);
        }
        if self.compression_level > MAX_COMPRESSION_LEVEL {
            vls_bail!(
                "compression level {} exceeds the maximum of {}",
                self.compression_level,
                MAX_COMPRESSION_LEVEL
            );
        }
        if self.chunk_shape.is_empty() {
            vls_bail!("a compressed dataset needs a chunk shape");
        }
        if self.chunk_shape.contains(&0) {
            vls_bail!(
                "chunk shape [{}] has a zero extent",
                self.chunk_shape.iter().join(", ")
            );
        }
        Ok(Layout::Chunked {
            chunk_shape: self.chunk_shape.clone(),
            filters: vec![Filter::Shuffle, Filter::Deflate(self.compression_level)],
        })
    }
}

/// The storage layout of a dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Layout {
    /// The container's default: a single unchunked, uncompressed block.
    #[default]
    Contiguous,
    /// Fixed-size chunks, each passed through the filter pipeline.
    Chunked {
        /// Extents of every chunk.
        chunk_shape: Vec<u64>,
        /// Filters applied to each chunk, in order.
        filters: Vec<Filter>,
    },
}

impl Layout {
    /// The chunk extents, or `None` for an unchunked dataset.
    pub fn chunk_shape(&self) -> Option<&[u64]> {
        match self {
            Layout::Contiguous => None,
            Layout::Chunked { chunk_shape, .. } => Some(chunk_shape),
        }
    }

    /// The filter pipeline, empty for an unchunked dataset.
    pub fn filters(&self) -> &[Filter] {
        match self {
            Layout::Contiguous => &[],
            Layout::Chunked { filters, .. } => filters,
        }
    }
}

impl Display for Layout {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Layout::Contiguous => write!(f, "contiguous"),
            Layout::Chunked {
                chunk_shape,
                filters,
            } => write!(
                f,
                "chunked([{}], [{}])",
                chunk_shape.iter().join(", "),
                filters.iter().join(", ")
            ),
        }
    }
}

/// A chunk filter. Filters are recorded on the layout for the container to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Filter {
    /// Byte shuffle, grouping the n-th byte of every element together.
    Shuffle,
    /// Generic deflate at the given level.
    Deflate(u8),
}

impl Display for Filter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Filter::Shuffle => write!(f, "shuffle"),
            Filter::Deflate(level) => write!(f, "deflate({})", level),
        }
    }
}
