use vlheap_error::VlsResult;
use vlheap_nd::{Shape, Slab};

use crate::{DatasetConfig, Layout};

/// A fixed-size value a dataset can hold.
pub trait Element: Copy + Default + Send + Sync + 'static {}

impl<T: Copy + Default + Send + Sync + 'static> Element for T {}

/// A typed N-dimensional dataset inside a container.
pub trait Dataset<T: Element> {
    /// The current extents of the dataset.
    fn shape(&self) -> Shape;

    /// The storage layout, used to align reads and writes with whole chunks.
    fn layout(&self) -> &Layout;

    /// Read every element of `slab`, in odometer order.
    ///
    /// Fails if the slab does not lie inside the dataset.
    fn read_slab(&self, slab: &Slab) -> VlsResult<Vec<T>>;

    /// Write `values`, in odometer order, to the elements of `slab`.
    fn write_slab(&mut self, slab: &Slab, values: &[T]) -> VlsResult<()>;
}

/// A one dimensional dataset that grows at its tail.
pub trait ExtensibleDataset<T: Element>: Dataset<T> {
    /// The number of elements appended so far.
    fn len(&self) -> u64;

    /// Whether nothing has been appended yet.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Grow the dataset by `values`.
    fn append(&mut self, values: &[T]) -> VlsResult<()>;
}

/// A hierarchy of groups and datasets, addressed by `/`-separated paths.
///
/// A dataset or group can only be created inside a group that already exists; the root
/// group always exists.
pub trait Container {
    /// A handle to one dataset of the container.
    type Dataset<T: Element>: ExtensibleDataset<T>;

    /// Create a group at `path`.
    fn create_group(&mut self, path: &str) -> VlsResult<()>;

    /// Whether a group exists at `path`.
    fn has_group(&self, path: &str) -> bool;

    /// Whether a dataset exists at `path`.
    fn has_dataset(&self, path: &str) -> bool;

    /// Create a fixed-shape dataset at `path`.
    fn create_dataset<T: Element>(
        &mut self,
        path: &str,
        config: &DatasetConfig,
    ) -> VlsResult<Self::Dataset<T>>;

    /// Create an empty one dimensional dataset that grows by
    /// [appending][ExtensibleDataset::append].
    ///
    /// Extensible datasets are always chunked; `chunk_len` picks the chunk length and falls
    /// back to a container default when `None`.
    fn create_extensible<T: Element>(
        &mut self,
        path: &str,
        chunk_len: Option<u64>,
        compression_level: u8,
    ) -> VlsResult<Self::Dataset<T>>;

    /// Open an existing dataset of element type `T`.
    fn open_dataset<T: Element>(&self, path: &str) -> VlsResult<Self::Dataset<T>>;
}
