use itertools::Itertools;
use vlheap_error::{VlsResult, vls_bail};
use vlheap_io::{Container, Dataset, ExtensibleDataset};
use vlheap_nd::{Shape, SlabIterator};

use crate::{
    HeapWriter, PointerCodec, PointerRecord, VlsArray, WriteOptions, cumulative_offsets_from,
};

/// Where a batch of element contents landed in the heap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapSpan {
    /// Heap length before the batch was appended.
    pub start: u64,
    /// Content length of every element of the batch, in flat order.
    pub lengths: Vec<u64>,
}

impl HeapSpan {
    /// Heap offset of every element of the batch.
    pub fn offsets(&self) -> VlsResult<Vec<u64>> {
        cumulative_offsets_from(self.start, &self.lengths)
    }
}

/// Writes variable-length elements as a pointer dataset plus a heap dataset.
///
/// Content is streamed into the heap in flat order through a [`HeapWriter`]. Pointer
/// records are then written one chunk-aligned block at a time, so at most
/// `element_budget` records are held in memory.
#[derive(Debug, Clone, Default)]
pub struct VlsWriter {
    options: WriteOptions,
}

impl VlsWriter {
    /// Create a writer driven by `options`.
    pub fn new(options: WriteOptions) -> Self {
        Self { options }
    }

    /// The options this writer was created with.
    pub fn options(&self) -> &WriteOptions {
        &self.options
    }

    /// Append the content of `elements` to `heap`, in order.
    pub fn write_heap<H, B>(
        &self,
        heap: &mut H,
        elements: impl IntoIterator<Item = B>,
    ) -> VlsResult<HeapSpan>
    where
        H: ExtensibleDataset<u8>,
        B: AsRef<[u8]>,
    {
        let mut writer = HeapWriter::new(heap, self.options.flush_threshold);
        let start = writer.len();
        let lengths = elements
            .into_iter()
            .map(|element| {
                let content = element.as_ref();
                writer.append(content)?;
                Ok(content.len() as u64)
            })
            .collect::<VlsResult<Vec<_>>>()?;
        let end = writer.finish()?;

        log::debug!(
            "Appended {} elements to the heap, bytes {}..{}",
            lengths.len(),
            start,
            end
        );
        Ok(HeapSpan { start, lengths })
    }

    /// Write a pointer record for every element of `span`, addressed by flat index.
    pub fn write_pointers<P>(&self, pointers: &mut P, span: &HeapSpan) -> VlsResult<()>
    where
        P: Dataset<PointerRecord>,
    {
        let codec = PointerCodec::new(pointers.shape());
        if span.lengths.len() as u64 != codec.shape().num_elements() {
            vls_bail!(ShapeMismatch:
                format!("{} elements for array {}", codec.shape().num_elements(), codec.shape()),
                format!("{} elements", span.lengths.len())
            );
        }
        let offsets = span.offsets()?;

        let slabs = SlabIterator::planned(
            codec.shape().dims(),
            pointers.layout().chunk_shape(),
            self.options.element_budget,
        )?;
        log::debug!(
            "Writing {} pointer records in {} blocks of [{}]",
            span.lengths.len(),
            slabs.slab_count(),
            slabs.block_shape().iter().join(", ")
        );
        for slab in slabs {
            let records = codec.encode_slab(&slab, &offsets, &span.lengths)?;
            pointers.write_slab(&slab, &records)?;
            log::trace!("Wrote {} pointer records to {}", records.len(), slab);
        }
        Ok(())
    }

    /// Write `elements`, in flat order, to an existing pair of datasets.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub fn write_elements<P, H, B>(
        &self,
        pointers: &mut P,
        heap: &mut H,
        elements: &[B],
    ) -> VlsResult<()>
    where
        P: Dataset<PointerRecord>,
        H: ExtensibleDataset<u8>,
        B: AsRef<[u8]>,
    {
        check_element_count(&pointers.shape(), elements.len())?;
        let span = self.write_heap(heap, elements)?;
        self.write_pointers(pointers, &span)
    }

    /// Create a variable-length array in `group` of `container` and write `elements` to it.
    ///
    /// `elements` are in flat order and must hold exactly one entry per element of `shape`.
    pub fn write_array<C, B>(
        &self,
        container: &mut C,
        group: &str,
        shape: &Shape,
        elements: &[B],
    ) -> VlsResult<VlsArray<C>>
    where
        C: Container,
        B: AsRef<[u8]>,
    {
        check_element_count(shape, elements.len())?;
        let mut array = VlsArray::create(container, group, shape, &self.options)?;
        self.write_elements(&mut array.pointers, &mut array.heap, elements)?;
        Ok(array)
    }
}

fn check_element_count(shape: &Shape, len: usize) -> VlsResult<()> {
    if len as u64 != shape.num_elements() {
        vls_bail!(ShapeMismatch:
            format!("{} elements for array {}", shape.num_elements(), shape),
            format!("{} elements", len)
        );
    }
    Ok(())
}
