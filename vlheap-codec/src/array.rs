use bytes::Bytes;
use vlheap_error::VlsResult;
use vlheap_io::{Container, Dataset, ExtensibleDataset};
use vlheap_nd::Shape;

use crate::{PointerRecord, ReadOptions, VlsReader, VlsWriter, WriteOptions};

/// Name of the pointer dataset inside an array's group.
pub const POINTERS_DATASET: &str = "pointers";
/// Name of the heap dataset inside an array's group.
pub const HEAP_DATASET: &str = "heap";

/// A variable-length array stored in a container group.
///
/// The group holds two datasets: `pointers`, one [`PointerRecord`] per element shaped like
/// the array, and `heap`, an extensible byte dataset holding the contents.
pub struct VlsArray<C: Container> {
    group: String,
    pub(crate) pointers: C::Dataset<PointerRecord>,
    pub(crate) heap: C::Dataset<u8>,
}

impl<C: Container> VlsArray<C> {
    /// Create the datasets of an array of `shape` in `group`, creating the group if needed.
    ///
    /// The heap starts empty; nothing is written until [`write`][Self::write].
    pub fn create(
        container: &mut C,
        group: &str,
        shape: &Shape,
        options: &WriteOptions,
    ) -> VlsResult<Self> {
        let group = group.trim_matches('/').to_string();
        if !container.has_group(&group) {
            container.create_group(&group)?;
        }
        let pointers = container.create_dataset::<PointerRecord>(
            &child(&group, POINTERS_DATASET),
            &options.pointer_config(shape),
        )?;
        let heap = container.create_extensible::<u8>(
            &child(&group, HEAP_DATASET),
            options.heap_chunk_len,
            options.compression_level,
        )?;
        log::debug!(
            "Created variable-length array '{}' of shape {} with {} pointers",
            group,
            shape,
            pointers.layout()
        );
        Ok(Self {
            group,
            pointers,
            heap,
        })
    }

    /// Open the array stored in `group`.
    pub fn open(container: &C, group: &str) -> VlsResult<Self> {
        let group = group.trim_matches('/').to_string();
        let pointers = container
            .open_dataset::<PointerRecord>(&child(&group, POINTERS_DATASET))
            .map_err(|e| e.with_context(format!("opening variable-length array '{}'", group)))?;
        let heap = container
            .open_dataset::<u8>(&child(&group, HEAP_DATASET))
            .map_err(|e| e.with_context(format!("opening variable-length array '{}'", group)))?;
        Ok(Self {
            group,
            pointers,
            heap,
        })
    }

    /// The group holding the array.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// The logical shape of the array.
    pub fn shape(&self) -> Shape {
        self.pointers.shape()
    }

    /// The number of bytes in the heap.
    pub fn heap_len(&self) -> u64 {
        self.heap.len()
    }

    /// The pointer dataset.
    pub fn pointers(&self) -> &C::Dataset<PointerRecord> {
        &self.pointers
    }

    /// The heap dataset.
    pub fn heap(&self) -> &C::Dataset<u8> {
        &self.heap
    }

    /// Write `elements`, in flat order, one per element of the array.
    pub fn write<B: AsRef<[u8]>>(
        &mut self,
        elements: &[B],
        options: &WriteOptions,
    ) -> VlsResult<()> {
        VlsWriter::new(options.clone())
            .write_elements(&mut self.pointers, &mut self.heap, elements)
    }

    /// The content of every element, in flat order.
    pub fn read(&self, options: &ReadOptions) -> VlsResult<Vec<Bytes>> {
        VlsReader::new(options.clone())
            .read_array(&self.pointers, &self.heap)
    }

    /// The content of every element decoded as UTF-8, in flat order.
    pub fn read_strings(&self, options: &ReadOptions) -> VlsResult<Vec<String>> {
        VlsReader::new(options.clone())
            .read_strings(&self.pointers, &self.heap)
    }

    /// The content of the element at `coord`.
    pub fn read_element(&self, coord: &[u64], options: &ReadOptions) -> VlsResult<Bytes> {
        VlsReader::new(options.clone())
            .read_element(&self.pointers, &self.heap, coord)
    }
}

fn child(group: &str, name: &str) -> String {
    if group.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", group, name)
    }
}
