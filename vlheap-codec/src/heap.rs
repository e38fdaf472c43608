use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use vlheap_error::VlsResult;
use vlheap_io::{Dataset, ExtensibleDataset};
use vlheap_nd::Slab;

use crate::PointerRecord;

/// Bytes buffered by a [`HeapWriter`] before they are appended to the heap dataset.
pub const DEFAULT_FLUSH_THRESHOLD: usize = 4 << 20;

/// Buffers element contents and appends them to an extensible heap dataset in large flushes.
///
/// Contents are laid out back to back in the order they are appended. Every flush appends
/// exactly `flush_threshold` bytes, splitting contents across flushes where needed, except
/// the final one. An unfinished writer flushes whatever it still buffers when dropped; call
/// [`finish`][HeapWriter::finish] to observe flush errors.
pub struct HeapWriter<'a, D: ExtensibleDataset<u8>> {
    dataset: &'a mut D,
    buffer: BytesMut,
    flush_threshold: usize,
    finished: bool,
}

impl<'a, D: ExtensibleDataset<u8>> HeapWriter<'a, D> {
    /// Append to `dataset`, flushing every `flush_threshold` bytes.
    ///
    /// A threshold of zero disables buffering, appending every content as it arrives.
    pub fn new(dataset: &'a mut D, flush_threshold: usize) -> Self {
        Self {
            dataset,
            buffer: BytesMut::with_capacity(flush_threshold),
            flush_threshold,
            finished: false,
        }
    }

    /// The heap length once everything appended so far is flushed.
    pub fn len(&self) -> u64 {
        self.dataset.len() + self.buffer.len() as u64
    }

    /// Whether the heap is still empty, counting buffered bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append one element's content, returning the heap offset it starts at.
    pub fn append(&mut self, content: &[u8]) -> VlsResult<u64> {
        let offset = self.len();
        if self.flush_threshold == 0 {
            if !content.is_empty() {
                self.dataset.append(content)?;
            }
            return Ok(offset);
        }

        let mut rest = content;
        while !rest.is_empty() {
            let room = self.flush_threshold - self.buffer.len();
            let (head, tail) = rest.split_at(room.min(rest.len()));
            self.buffer.extend_from_slice(head);
            rest = tail;
            if self.buffer.len() == self.flush_threshold {
                self.flush()?;
            }
        }
        Ok(offset)
    }

    /// Flush the remaining buffer, returning the final heap length.
    pub fn finish(mut self) -> VlsResult<u64> {
        self.finished = true;
        self.flush()?;
        Ok(self.dataset.len())
    }

    fn flush(&mut self) -> VlsResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.dataset.append(&self.buffer)?;
        log::debug!(
            "Flushed {} bytes to the heap, now {} bytes",
            self.buffer.len(),
            self.dataset.len()
        );
        self.buffer.clear();
        Ok(())
    }
}

impl<D: ExtensibleDataset<u8>> Drop for HeapWriter<'_, D> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(err) = self.flush() {
            log::warn!(
                "Dropping {} unflushed heap bytes: {}",
                self.buffer.len(),
                err
            );
        }
    }
}

/// Bounds-checked ranged reads from a heap dataset.
pub struct HeapReader<'a, D: Dataset<u8>> {
    dataset: &'a D,
    len: u64,
}

impl<'a, D: Dataset<u8>> HeapReader<'a, D> {
    /// Read from `dataset`, whose current length bounds every read.
    pub fn new(dataset: &'a D) -> Self {
        let len = dataset.shape().num_elements();
        Self { dataset, len }
    }

    /// The heap length in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the heap holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read `length` bytes starting at `offset`.
    ///
    /// A range reaching past the end of the heap is reported as corruption before the
    /// dataset is touched.
    pub fn read_range(&self, offset: u64, length: u64) -> VlsResult<Bytes> {
        self.read(&PointerRecord::new(offset, length))
    }

    /// Read the content `record` points at.
    pub fn read(&self, record: &PointerRecord) -> VlsResult<Bytes> {
        let range = record.check_within(self.len)?;
        if range.is_empty() {
            return Ok(Bytes::new());
        }
        let bytes = self
            .dataset
            .read_slab(&Slab::range(range.start, record.length))?;
        Ok(Bytes::from(bytes))
    }
}

/// How element content is post-processed when it is decoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trim {
    /// Return the content exactly as stored.
    #[default]
    Keep,
    /// Truncate at the first NUL byte, for content written by fixed-width producers.
    Nul,
}

impl Trim {
    /// Apply the trim to decoded content.
    pub fn apply(self, content: Bytes) -> Bytes {
        match self {
            Trim::Keep => content,
            Trim::Nul => {
                let len = trim_at_nul(&content).len();
                content.slice(..len)
            }
        }
    }
}

/// The prefix of `bytes` before its first NUL byte.
pub fn trim_at_nul(bytes: &[u8]) -> &[u8] {
    bytes
        .iter()
        .position(|&b| b == 0)
        .map_or(bytes, |nul| &bytes[..nul])
}

/// Materialize a short summary of `bytes` for log lines and error messages.
pub(crate) fn preview(bytes: &[u8]) -> String {
    const MAX: usize = 16;
    let head = &bytes[..bytes.len().min(MAX)];
    let shown = String::from_utf8_lossy(head).into_owned();
    if bytes.len() > MAX {
        format!("\"{}\"... ({} bytes)", shown, bytes.len())
    } else {
        format!("\"{}\"", shown)
    }
}
