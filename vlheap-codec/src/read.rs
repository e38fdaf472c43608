use bytes::Bytes;
use vlheap_error::{VlsResult, vls_err};
use vlheap_io::Dataset;
use vlheap_nd::{Slab, SlabIterator};

use crate::heap::preview;
use crate::{HeapReader, PointerCodec, PointerRecord, ReadOptions};

/// Reads variable-length elements back from a pointer dataset and a heap dataset.
///
/// Pointer records are pulled one chunk-aligned block at a time and every record is
/// checked against the heap length before its content is read. A record pointing outside
/// the heap fails the whole read with a corruption error naming the element.
#[derive(Debug, Clone, Default)]
pub struct VlsReader {
    options: ReadOptions,
}

impl VlsReader {
    /// Create a reader driven by `options`.
    pub fn new(options: ReadOptions) -> Self {
        Self { options }
    }

    /// The options this reader was created with.
    pub fn options(&self) -> &ReadOptions {
        &self.options
    }

    /// Every pointer record, in flat order.
    pub fn read_pointers<P>(&self, pointers: &P) -> VlsResult<Vec<PointerRecord>>
    where
        P: Dataset<PointerRecord>,
    {
        let codec = PointerCodec::new(pointers.shape());
        let len = to_usize(codec.shape().num_elements())?;
        let mut records = vec![PointerRecord::default(); len];
        self.for_each_record(pointers, &codec, |flat, record| {
            *slot(&mut records, flat)? = record;
            Ok(())
        })?;
        Ok(records)
    }

    /// The content of every element, in flat order.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    pub fn read_array<P, H>(&self, pointers: &P, heap: &H) -> VlsResult<Vec<Bytes>>
    where
        P: Dataset<PointerRecord>,
        H: Dataset<u8>,
    {
        let codec = PointerCodec::new(pointers.shape());
        let heap = HeapReader::new(heap);
        let len = to_usize(codec.shape().num_elements())?;
        let mut elements = vec![Bytes::new(); len];
        self.for_each_record(pointers, &codec, |flat, record| {
            let content = heap
                .read(&record)
                .map_err(|e| e.with_context(codec.locate(flat)))?;
            *slot(&mut elements, flat)? = self.options.trim.apply(content);
            Ok(())
        })?;

        log::debug!(
            "Read {} elements of {} from a heap of {} bytes",
            elements.len(),
            codec.shape(),
            heap.len()
        );
        Ok(elements)
    }

    /// Like [`read_array`][Self::read_array], decoding every element as UTF-8.
    pub fn read_strings<P, H>(&self, pointers: &P, heap: &H) -> VlsResult<Vec<String>>
    where
        P: Dataset<PointerRecord>,
        H: Dataset<u8>,
    {
        let codec = PointerCodec::new(pointers.shape());
        self.read_array(pointers, heap)?
            .iter()
            .enumerate()
            .map(|(flat, content)| {
                let text = std::str::from_utf8(content).map_err(|e| {
                    vls_err!(
                        "{} is not valid UTF-8: {} in {}",
                        codec.locate(flat as u64),
                        e,
                        preview(content)
                    )
                })?;
                Ok(text.to_owned())
            })
            .collect()
    }

    /// The content of the single element at `coord`.
    pub fn read_element<P, H>(&self, pointers: &P, heap: &H, coord: &[u64]) -> VlsResult<Bytes>
    where
        P: Dataset<PointerRecord>,
        H: Dataset<u8>,
    {
        let codec = PointerCodec::new(pointers.shape());
        let flat = codec.shape().flat_index(coord)?;
        let record = pointers
            .read_slab(&Slab::element(coord))?
            .first()
            .copied()
            .ok_or_else(|| vls_err!(Corruption: "no pointer record for {}", codec.locate(flat)))?;
        let content = HeapReader::new(heap)
            .read(&record)
            .map_err(|e| e.with_context(codec.locate(flat)))?;
        Ok(self.options.trim.apply(content))
    }

    fn for_each_record<P, F>(
        &self,
        pointers: &P,
        codec: &PointerCodec,
        mut visit: F,
    ) -> VlsResult<()>
    where
        P: Dataset<PointerRecord>,
        F: FnMut(u64, PointerRecord) -> VlsResult<()>,
    {
        let slabs = SlabIterator::planned(
            codec.shape().dims(),
            pointers.layout().chunk_shape(),
            self.options.element_budget,
        )?;
        for slab in slabs {
            let records = pointers.read_slab(&slab)?;
            log::trace!("Read {} pointer records from {}", records.len(), slab);
            codec.decode_slab(&slab, &records, &mut visit)?;
        }
        Ok(())
    }
}

fn to_usize(n: u64) -> VlsResult<usize> {
    usize::try_from(n).map_err(|_| vls_err!("{} elements do not fit in memory", n))
}

fn slot<T>(values: &mut [T], flat: u64) -> VlsResult<&mut T> {
    let len = values.len() as u64;
    usize::try_from(flat)
        .ok()
        .and_then(|idx| values.get_mut(idx))
        .ok_or_else(|| vls_err!(OutOfBounds: flat, 0, len))
}
