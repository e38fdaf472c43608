use std::fmt::{Display, Formatter};
use std::ops::Range;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use vlheap_error::{VlsResult, vls_bail, vls_err};
use vlheap_nd::{Shape, Slab, SlabIndices, fmt_coord, slab_start_flat_index};

/// Size in bytes of one serialized [`PointerRecord`].
pub const POINTER_RECORD_SIZE: usize = 16;

/// The location of one element's content inside the heap.
///
/// The content occupies heap bytes `[offset, offset + length)`. Records are serialized as
/// two little-endian `u64`s, offset first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PointerRecord {
    /// Byte offset of the content inside the heap.
    pub offset: u64,
    /// Length of the content in bytes.
    pub length: u64,
}

impl PointerRecord {
    /// A record pointing at `length` bytes starting at `offset`.
    pub const fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    /// The heap byte range of the content, or `None` if it overflows.
    pub fn byte_range(&self) -> Option<Range<u64>> {
        self.offset
            .checked_add(self.length)
            .map(|end| self.offset..end)
    }

    /// Check the record lies inside a heap of `heap_len` bytes.
    pub fn check_within(&self, heap_len: u64) -> VlsResult<Range<u64>> {
        match self.byte_range() {
            Some(range) if range.end <= heap_len => Ok(range),
            _ => Err(vls_err!(
                Corruption: "pointer {} out of range of the heap of {} bytes",
                self,
                heap_len
            )),
        }
    }

    /// Serialize as 16 little-endian bytes.
    pub fn to_bytes(&self) -> [u8; POINTER_RECORD_SIZE] {
        let mut bytes = [0; POINTER_RECORD_SIZE];
        let mut buf = &mut bytes[..];
        buf.put_u64_le(self.offset);
        buf.put_u64_le(self.length);
        bytes
    }

    /// Deserialize from 16 little-endian bytes.
    pub fn from_bytes(bytes: [u8; POINTER_RECORD_SIZE]) -> Self {
        let mut buf = &bytes[..];
        let offset = buf.get_u64_le();
        let length = buf.get_u64_le();
        Self { offset, length }
    }
}

impl Display for PointerRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "(offset {}, length {})", self.offset, self.length)
    }
}

/// Serialize records back to back, for containers that only store bytes.
pub fn encode_records(records: &[PointerRecord]) -> Bytes {
    let mut buf = BytesMut::with_capacity(records.len() * POINTER_RECORD_SIZE);
    for record in records {
        buf.put_slice(&record.to_bytes());
    }
    buf.freeze()
}

/// Parse records serialized by [`encode_records`].
pub fn decode_records(bytes: &[u8]) -> VlsResult<Vec<PointerRecord>> {
    if bytes.len() % POINTER_RECORD_SIZE != 0 {
        vls_bail!(
            InvalidSerde: "{} bytes is not a whole number of {} byte pointer records",
            bytes.len(),
            POINTER_RECORD_SIZE
        );
    }
    let mut buf = bytes;
    let mut records = Vec::with_capacity(bytes.len() / POINTER_RECORD_SIZE);
    while buf.has_remaining() {
        let offset = buf.get_u64_le();
        let length = buf.get_u64_le();
        records.push(PointerRecord::new(offset, length));
    }
    Ok(records)
}

/// The exclusive prefix sum of `lengths`: the heap offset of every element when the
/// contents are laid out back to back in flat order.
pub fn cumulative_offsets(lengths: &[u64]) -> VlsResult<Vec<u64>> {
    cumulative_offsets_from(0, lengths)
}

/// Like [`cumulative_offsets`], for contents appended to a heap already holding `start` bytes.
pub fn cumulative_offsets_from(start: u64, lengths: &[u64]) -> VlsResult<Vec<u64>> {
    let mut next = start;
    lengths
        .iter()
        .map(|&length| {
            let offset = next;
            next = next
                .checked_add(length)
                .ok_or_else(|| vls_err!("heap offsets overflow past {}", offset))?;
            Ok(offset)
        })
        .collect()
}

/// Converts between slabs of pointer records and the flat index space of the logical array.
#[derive(Debug, Clone)]
pub struct PointerCodec {
    shape: Shape,
}

impl PointerCodec {
    /// A codec for an array of the given shape.
    pub fn new(shape: Shape) -> Self {
        Self { shape }
    }

    /// The shape of the logical array.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// The flat index of the first element of `slab`.
    pub fn slab_start_flat_index(&self, slab: &Slab) -> u64 {
        slab_start_flat_index(self.shape.strides(), slab.starts())
    }

    /// The flat indices of every element of `slab`, in odometer order.
    pub fn flat_indices<'a>(&'a self, slab: &'a Slab) -> VlsResult<SlabIndices<'a>> {
        slab.check_within(&self.shape)?;
        SlabIndices::new(self.shape.strides(), slab)
    }

    /// Build the records of `slab` from per-element offsets and lengths indexed by flat index.
    pub fn encode_slab(
        &self,
        slab: &Slab,
        offsets: &[u64],
        lengths: &[u64],
    ) -> VlsResult<Vec<PointerRecord>> {
        self.check_flat_len("offsets", offsets.len())?;
        self.check_flat_len("lengths", lengths.len())?;
        self.flat_indices(slab)?
            .map(|flat| {
                let idx = usize::try_from(flat)
                    .map_err(|_| vls_err!("flat index {} does not fit in memory", flat))?;
                match (offsets.get(idx), lengths.get(idx)) {
                    (Some(&offset), Some(&length)) => Ok(PointerRecord::new(offset, length)),
                    _ => Err(vls_err!(OutOfBounds: flat, 0, self.shape.num_elements())),
                }
            })
            .collect()
    }

    /// Pair every record of `slab` with its flat index.
    ///
    /// `records` are in the slab's odometer order, as returned by reading the slab.
    pub fn decode_slab<F>(
        &self,
        slab: &Slab,
        records: &[PointerRecord],
        mut visit: F,
    ) -> VlsResult<()>
    where
        F: FnMut(u64, PointerRecord) -> VlsResult<()>,
    {
        let indices = self.flat_indices(slab)?;
        if indices.remaining() != records.len() as u64 {
            vls_bail!(ShapeMismatch:
                format!("{} records for slab {}", indices.remaining(), slab),
                format!("{} records", records.len())
            );
        }
        for (flat, record) in indices.zip(records) {
            visit(flat, *record)?;
        }
        Ok(())
    }

    /// Describe where a flat index lies, for error context.
    pub fn locate(&self, flat: u64) -> String {
        match self.shape.unravel(flat) {
            Ok(coord) => format!("flat index {} at coordinate {}", flat, fmt_coord(&coord)),
            Err(_) => format!("flat index {}", flat),
        }
    }

    fn check_flat_len(&self, what: &str, len: usize) -> VlsResult<()> {
        if len as u64 != self.shape.num_elements() {
            vls_bail!(ShapeMismatch:
                format!("{} {} for array {}", self.shape.num_elements(), what, self.shape),
                format!("{} {}", len, what)
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rstest::rstest;
    use vlheap_error::VlsError;
    use vlheap_nd::SlabIterator;

    use super::*;

    #[test]
    fn record_bytes_are_little_endian() {
        let record = PointerRecord::new(0x0102, 7);
        let bytes = record.to_bytes();
        assert_eq!(bytes[..2], [0x02, 0x01]);
        assert_eq!(bytes[8], 7);
        assert_eq!(PointerRecord::from_bytes(bytes), record);
    }

    #[test]
    fn bulk_records() {
        let records = vec![
            PointerRecord::new(0, 3),
            PointerRecord::new(3, 0),
            PointerRecord::new(3, 9),
        ];
        let bytes = encode_records(&records);
        assert_eq!(bytes.len(), 48);
        assert_eq!(decode_records(&bytes).unwrap(), records);
        assert!(matches!(
            decode_records(&bytes[..20]).unwrap_err(),
            VlsError::InvalidSerde(..)
        ));
    }

    #[rstest]
    #[case(vec![], vec![])]
    #[case(vec![5], vec![0])]
    #[case(vec![1, 2, 3, 4, 5, 6], vec![0, 1, 3, 6, 10, 15])]
    #[case(vec![0, 0, 4, 0], vec![0, 0, 0, 4])]
    fn exclusive_prefix_sum(#[case] lengths: Vec<u64>, #[case] expected: Vec<u64>) {
        assert_eq!(cumulative_offsets(&lengths).unwrap(), expected);
    }

    #[test]
    fn prefix_sum_overflow() {
        assert!(cumulative_offsets(&[u64::MAX, 1, 1]).is_err());
        assert_eq!(
            cumulative_offsets(&[u64::MAX, 0]).unwrap(),
            vec![0, u64::MAX]
        );
        assert_eq!(cumulative_offsets_from(21, &[2, 3]).unwrap(), vec![21, 23]);
    }

    #[rstest]
    #[case(PointerRecord::new(0, 21), 21, true)]
    #[case(PointerRecord::new(21, 0), 21, true)]
    #[case(PointerRecord::new(20, 2), 21, false)]
    #[case(PointerRecord::new(u64::MAX, 2), u64::MAX, false)]
    fn bounds(#[case] record: PointerRecord, #[case] heap_len: u64, #[case] ok: bool) {
        let result = record.check_within(heap_len);
        assert_eq!(result.is_ok(), ok);
        if let Err(err) = result {
            assert!(err.is_corruption());
        }
    }

    #[test]
    fn two_by_three_scenario() {
        let shape = Shape::try_new([2, 3]).unwrap();
        assert_eq!(shape.strides(), &[3, 1]);
        let lengths = [1, 2, 3, 4, 5, 6];
        let offsets = cumulative_offsets(&lengths).unwrap();
        assert_eq!(offsets.last().unwrap() + lengths.last().unwrap(), 21);

        let codec = PointerCodec::new(shape);
        let slab = Slab::element(&[1, 1]);
        assert_eq!(codec.slab_start_flat_index(&slab), 4);
        assert_eq!(
            codec.encode_slab(&slab, &offsets, &lengths).unwrap(),
            vec![PointerRecord::new(10, 5)]
        );
        assert_eq!(codec.locate(4), "flat index 4 at coordinate (1, 1)");
    }

    #[test]
    fn encode_then_decode_visits_every_flat_index() {
        let mut rng = StdRng::seed_from_u64(7);
        let shape = Shape::try_new([3, 4, 5]).unwrap();
        let lengths: Vec<u64> = (0..60).map(|_| rng.random_range(0..10)).collect();
        let offsets = cumulative_offsets(&lengths).unwrap();
        let codec = PointerCodec::new(shape.clone());

        let mut seen = vec![None; 60];
        let chunk = [2, 2, 2];
        let slabs = SlabIterator::planned(shape.dims(), Some(&chunk[..]), 16);
        for slab in slabs.unwrap() {
            let records = codec.encode_slab(&slab, &offsets, &lengths).unwrap();
            codec
                .decode_slab(&slab, &records, |flat, record| {
                    seen[usize::try_from(flat).unwrap()] = Some(record);
                    Ok(())
                })
                .unwrap();
        }
        for (flat, record) in seen.into_iter().enumerate() {
            assert_eq!(
                record,
                Some(PointerRecord::new(offsets[flat], lengths[flat]))
            );
        }
    }

    #[test]
    fn mismatched_inputs() {
        let codec = PointerCodec::new(Shape::try_new([2, 3]).unwrap());
        let slab = Slab::try_new([0, 0], [1, 3]).unwrap();
        assert!(codec.encode_slab(&slab, &[0; 5], &[0; 6]).is_err());
        let records = [PointerRecord::default(); 2];
        assert!(codec.decode_slab(&slab, &records, |_, _| Ok(())).is_err());
        assert!(
            codec
                .encode_slab(&Slab::try_new([1, 0], [2, 3]).unwrap(), &[0; 6], &[0; 6])
                .is_err()
        );
    }
}
