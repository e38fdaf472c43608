use std::any::{Any, type_name};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use itertools::Itertools;
use parking_lot::RwLock;
use vlheap_error::{VlsResult, vls_bail, vls_err};
use vlheap_nd::{Shape, Slab};

use crate::{Container, Dataset, DatasetConfig, Element, ExtensibleDataset, Layout};

/// Chunk length of extensible datasets created without an explicit one.
pub const DEFAULT_EXTENSIBLE_CHUNK_LEN: u64 = 64 * 1024;

type Node = Arc<dyn Any + Send + Sync>;

#[derive(Default)]
struct Tree {
    groups: BTreeSet<String>,
    datasets: BTreeMap<String, Node>,
}

impl Tree {
    fn group_exists(&self, path: &str) -> bool {
        path.is_empty() || self.groups.contains(path)
    }

    fn check_vacant(&self, path: &str) -> VlsResult<()> {
        if path.is_empty() {
            vls_bail!("the root group already exists");
        }
        let parent = path.rsplit_once('/').map_or("", |(parent, _)| parent);
        if !self.group_exists(parent) {
            vls_bail!("parent group '{}' of '{}' does not exist", parent, path);
        }
        if self.groups.contains(path) || self.datasets.contains_key(path) {
            vls_bail!("'{}' already exists", path);
        }
        Ok(())
    }
}

fn normalize(path: &str) -> String {
    path.split('/').filter(|part| !part.is_empty()).join("/")
}

fn to_usize(value: u64) -> VlsResult<usize> {
    usize::try_from(value).map_err(|_| vls_err!("{} does not fit in memory", value))
}

/// An in-memory chunked container.
///
/// Cloning the container, or opening the same dataset twice, shares the underlying storage.
#[derive(Clone, Default)]
pub struct MemoryContainer {
    tree: Arc<RwLock<Tree>>,
}

impl MemoryContainer {
    /// An empty container holding only the root group.
    pub fn new() -> Self {
        Self::default()
    }

    /// The paths of every dataset, in lexicographic order.
    pub fn dataset_paths(&self) -> Vec<String> {
        self.tree.read().datasets.keys().cloned().collect()
    }

    fn insert<T: Element>(
        &mut self,
        path: &str,
        storage: Storage<T>,
    ) -> VlsResult<MemoryDataset<T>> {
        let path = normalize(path);
        let mut tree = self.tree.write();
        tree.check_vacant(&path)?;

        log::debug!(
            "Creating dataset '{}' of {} with shape {} and {} layout",
            path,
            type_name::<T>(),
            storage.shape,
            storage.layout
        );
        if !storage.layout.filters().is_empty() {
            log::debug!(
                "Filters of '{}' are recorded but not applied in memory",
                path
            );
        }

        let layout = storage.layout.clone();
        let storage = Arc::new(RwLock::new(storage));
        tree.datasets.insert(path.clone(), storage.clone() as Node);
        Ok(MemoryDataset {
            path,
            layout,
            storage,
        })
    }
}

impl Container for MemoryContainer {
    type Dataset<T: Element> = MemoryDataset<T>;

    fn create_group(&mut self, path: &str) -> VlsResult<()> {
        let path = normalize(path);
        let mut tree = self.tree.write();
        tree.check_vacant(&path)?;
        tree.groups.insert(path);
        Ok(())
    }

    fn has_group(&self, path: &str) -> bool {
        self.tree.read().group_exists(&normalize(path))
    }

    fn has_dataset(&self, path: &str) -> bool {
        self.tree.read().datasets.contains_key(&normalize(path))
    }

    fn create_dataset<T: Element>(
        &mut self,
        path: &str,
        config: &DatasetConfig,
    ) -> VlsResult<MemoryDataset<T>> {
        let storage = Storage::try_new(config.shape()?, config.layout()?, false)?;
        self.insert(path, storage)
    }

    fn create_extensible<T: Element>(
        &mut self,
        path: &str,
        chunk_len: Option<u64>,
        compression_level: u8,
    ) -> VlsResult<MemoryDataset<T>> {
        let chunk_len = chunk_len.unwrap_or(DEFAULT_EXTENSIBLE_CHUNK_LEN);
        if chunk_len == 0 {
            vls_bail!(
                "extensible dataset '{}' needs a non-zero chunk length",
                path
            );
        }
        let layout = match DatasetConfig::new([0])
            .with_compression([chunk_len], compression_level)
            .layout()?
        {
            Layout::Contiguous => Layout::Chunked {
                chunk_shape: vec![chunk_len],
                filters: Vec::new(),
            },
            chunked => chunked,
        };
        let storage = Storage::try_new(Shape::try_new([0])?, layout, true)?;
        self.insert(path, storage)
    }

    fn open_dataset<T: Element>(&self, path: &str) -> VlsResult<MemoryDataset<T>> {
        let path = normalize(path);
        let node = self
            .tree
            .read()
            .datasets
            .get(&path)
            .cloned()
            .ok_or_else(|| vls_err!("no dataset at '{}'", path))?;
        let storage = node
            .downcast::<RwLock<Storage<T>>>()
            .map_err(|_| vls_err!("dataset '{}' does not hold {}", path, type_name::<T>()))?;
        let layout = storage.read().layout.clone();
        Ok(MemoryDataset {
            path,
            layout,
            storage,
        })
    }
}

/// A handle to a dataset of a [`MemoryContainer`].
pub struct MemoryDataset<T> {
    path: String,
    layout: Layout,
    storage: Arc<RwLock<Storage<T>>>,
}

impl<T> MemoryDataset<T> {
    /// The path of the dataset inside its container.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The number of chunks that have been written at least once.
    pub fn allocated_chunks(&self) -> usize {
        self.storage.read().chunks.len()
    }
}

impl<T> Clone for MemoryDataset<T> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            layout: self.layout.clone(),
            storage: self.storage.clone(),
        }
    }
}

impl<T: Element> Dataset<T> for MemoryDataset<T> {
    fn shape(&self) -> Shape {
        self.storage.read().shape.clone()
    }

    fn layout(&self) -> &Layout {
        &self.layout
    }

    fn read_slab(&self, slab: &Slab) -> VlsResult<Vec<T>> {
        self.storage
            .read()
            .read_values(slab)
            .map_err(|e| e.with_context(format!("reading {} from '{}'", slab, self.path)))
    }

    fn write_slab(&mut self, slab: &Slab, values: &[T]) -> VlsResult<()> {
        self.storage
            .write()
            .write_values(slab, values)
            .map_err(|e| e.with_context(format!("writing {} to '{}'", slab, self.path)))
    }
}

impl<T: Element> ExtensibleDataset<T> for MemoryDataset<T> {
    fn len(&self) -> u64 {
        self.storage.read().shape.num_elements()
    }

    fn append(&mut self, values: &[T]) -> VlsResult<()> {
        let mut storage = self.storage.write();
        if !storage.extensible {
            vls_bail!("dataset '{}' is not extensible", self.path);
        }
        storage
            .append(values)
            .map_err(|e| e.with_context(format!("appending to '{}'", self.path)))
    }
}

/// The elements of one dataset, stored sparsely as whole chunks.
///
/// A contiguous dataset is stored as a single chunk spanning the whole array. Chunks that were
/// never written read back as `T::default()`.
struct Storage<T> {
    shape: Shape,
    layout: Layout,
    extensible: bool,
    chunk_shape: Vec<u64>,
    chunk_len: usize,
    chunks: HashMap<Vec<u64>, Box<[T]>>,
}

impl<T: Element> Storage<T> {
    fn try_new(shape: Shape, layout: Layout, extensible: bool) -> VlsResult<Self> {
        let chunk_shape = match layout.chunk_shape() {
            Some(chunk_shape) => chunk_shape.to_vec(),
            None => shape.dims().iter().map(|&d| d.max(1)).collect(),
        };
        if chunk_shape.len() != shape.rank() {
            vls_bail!(
                ShapeMismatch: format!("chunk rank {}", shape.rank()),
                format!("chunk rank {}", chunk_shape.len())
            );
        }
        let chunk_len = to_usize(Shape::try_new(chunk_shape.clone())?.num_elements())?;
        Ok(Self {
            shape,
            layout,
            extensible,
            chunk_shape,
            chunk_len,
            chunks: HashMap::new(),
        })
    }

    fn read_values(&self, slab: &Slab) -> VlsResult<Vec<T>> {
        slab.check_within(&self.shape)?;
        let mut values = Vec::with_capacity(to_usize(slab.num_elements())?);
        for_each_run(&self.chunk_shape, slab, |key, offset, run| {
            match self.chunks.get(&key) {
                Some(chunk) => values.extend_from_slice(&chunk[offset..offset + run]),
                None => values.resize(values.len() + run, T::default()),
            }
            Ok(())
        })?;
        Ok(values)
    }

    fn write_values(&mut self, slab: &Slab, values: &[T]) -> VlsResult<()> {
        let shape = self.shape.clone();
        self.write_within(&shape, slab, values)
    }

    /// Grow a 1-dimensional dataset by `values`.
    ///
    /// The new length is only committed once every value is stored.
    fn append(&mut self, values: &[T]) -> VlsResult<()> {
        let start = self.shape.num_elements();
        let count = u64::try_from(values.len())
            .map_err(|_| vls_err!("cannot append {} elements", values.len()))?;
        let end = start
            .checked_add(count)
            .ok_or_else(|| vls_err!("cannot grow {} elements past {}", start, u64::MAX))?;
        let grown = Shape::try_new([end])?;
        self.write_within(&grown, &Slab::range(start, count), values)?;
        self.shape = grown;
        Ok(())
    }

    fn write_within(&mut self, shape: &Shape, slab: &Slab, values: &[T]) -> VlsResult<()> {
        slab.check_within(shape)?;
        if to_usize(slab.num_elements())? != values.len() {
            vls_bail!(
                ShapeMismatch: format!("{} values", slab.num_elements()),
                format!("{} values", values.len())
            );
        }
        let chunk_len = self.chunk_len;
        let chunks = &mut self.chunks;
        let mut consumed = 0;
        for_each_run(&self.chunk_shape, slab, |key, offset, run| {
            let chunk = chunks
                .entry(key)
                .or_insert_with(|| vec![T::default(); chunk_len].into_boxed_slice());
            chunk[offset..offset + run].copy_from_slice(&values[consumed..consumed + run]);
            consumed += run;
            Ok(())
        })
    }
}

/// Split `slab` into runs along the fastest dimension that never cross a chunk boundary.
///
/// `f` receives the chunk coordinate, the offset of the run inside that chunk and the run
/// length. Runs are visited in odometer order, so their concatenation is the slab's element
/// order.
fn for_each_run(
    chunk_shape: &[u64],
    slab: &Slab,
    mut f: impl FnMut(Vec<u64>, usize, usize) -> VlsResult<()>,
) -> VlsResult<()> {
    if slab.is_empty() {
        return Ok(());
    }
    let Some(last) = slab.rank().checked_sub(1) else {
        return f(Vec::new(), 0, 1);
    };

    let starts = slab.starts();
    let counts = slab.counts();
    let chunk_strides = Shape::try_new(chunk_shape.to_vec())?.strides().to_vec();
    let row_end = starts[last] + counts[last];
    let mut coord = starts.to_vec();

    loop {
        while coord[last] < row_end {
            let pos = coord[last];
            let chunk_end = (pos / chunk_shape[last] + 1).saturating_mul(chunk_shape[last]);
            let run = chunk_end.min(row_end) - pos;

            let key = coord
                .iter()
                .zip(chunk_shape)
                .map(|(&c, &k)| c / k)
                .collect();
            let offset: u64 = coord
                .iter()
                .zip(chunk_shape)
                .zip(&chunk_strides)
                .map(|((&c, &k), &stride)| c % k * stride)
                .sum();
            f(key, to_usize(offset)?, to_usize(run)?)?;
            coord[last] += run;
        }
        coord[last] = starts[last];

        let mut carried = true;
        for d in (0..last).rev() {
            coord[d] += 1;
            if coord[d] < starts[d] + counts[d] {
                carried = false;
                break;
            }
            coord[d] = starts[d];
        }
        if carried {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn iota(n: u32) -> Vec<u32> {
        (1..=n).collect()
    }

    #[rstest]
    #[case(DatasetConfig::new([5, 7]))]
    #[case(DatasetConfig::new([5, 7]).with_compression([2, 3], 1))]
    #[case(DatasetConfig::new([5, 7]).with_compression([5, 7], 9))]
    #[case(DatasetConfig::new([5, 7]).with_compression([8, 8], 2))]
    fn slabs_round_trip_across_chunks(#[case] config: DatasetConfig) {
        let mut container = MemoryContainer::new();
        let mut dataset = container.create_dataset::<u32>("values", &config).unwrap();

        let whole = Slab::whole(&dataset.shape());
        dataset.write_slab(&whole, &iota(35)).unwrap();
        assert_eq!(dataset.read_slab(&whole).unwrap(), iota(35));

        let inner = Slab::try_new([1, 2], [3, 4]).unwrap();
        let expected: Vec<u32> = (1..4)
            .flat_map(|i| (2..6).map(move |j| i * 7 + j + 1))
            .collect();
        assert_eq!(dataset.read_slab(&inner).unwrap(), expected);
    }

    #[test]
    fn partial_writes_leave_defaults() {
        let mut container = MemoryContainer::new();
        let config = DatasetConfig::new([4, 4]).with_compression([2, 2], 1);
        let mut dataset = container.create_dataset::<u8>("bytes", &config).unwrap();

        dataset
            .write_slab(&Slab::try_new([1, 1], [2, 2]).unwrap(), &[1, 2, 3, 4])
            .unwrap();
        assert_eq!(dataset.allocated_chunks(), 4);
        assert_eq!(
            dataset.read_slab(&Slab::whole(&dataset.shape())).unwrap(),
            vec![0, 0, 0, 0, 0, 1, 2, 0, 0, 3, 4, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn slabs_outside_the_dataset_fail() {
        let mut container = MemoryContainer::new();
        let mut dataset = container
            .create_dataset::<u8>("bytes", &DatasetConfig::new([4]))
            .unwrap();
        assert!(dataset.read_slab(&Slab::range(2, 3)).is_err());
        assert!(dataset.write_slab(&Slab::range(0, 2), &[1]).is_err());
    }

    #[test]
    fn scalar_dataset() {
        let mut container = MemoryContainer::new();
        let mut dataset = container
            .create_dataset::<(u64, u64)>("record", &DatasetConfig::scalar())
            .unwrap();
        let slab = Slab::whole(&Shape::scalar());
        assert_eq!(dataset.read_slab(&slab).unwrap(), vec![(0, 0)]);
        dataset.write_slab(&slab, &[(3, 4)]).unwrap();
        assert_eq!(dataset.read_slab(&slab).unwrap(), vec![(3, 4)]);
    }

    #[test]
    fn extensible_appends_across_chunks() {
        let mut container = MemoryContainer::new();
        let mut heap = container
            .create_extensible::<u8>("heap", Some(4), 0)
            .unwrap();
        assert!(heap.is_empty());
        assert_eq!(heap.layout().chunk_shape(), Some(&[4][..]));

        heap.append(b"hello").unwrap();
        heap.append(b"").unwrap();
        heap.append(b" world").unwrap();
        assert_eq!(heap.len(), 11);
        assert_eq!(heap.allocated_chunks(), 3);
        assert_eq!(heap.read_slab(&Slab::range(3, 5)).unwrap(), b"lo wo");
        assert!(heap.read_slab(&Slab::range(10, 2)).is_err());
    }

    fn byte_storage(len: u64) -> Storage<u8> {
        let layout = Layout::Chunked {
            chunk_shape: vec![4],
            filters: Vec::new(),
        };
        let empty = Shape::try_new([0]).unwrap();
        let mut storage = Storage::try_new(empty, layout, true).unwrap();
        storage.shape = Shape::try_new([len]).unwrap();
        storage
    }

    #[test]
    fn failed_appends_keep_the_length() {
        let mut storage = byte_storage(u64::MAX - 1);
        assert!(storage.append(&[1, 2]).is_err());
        assert_eq!(storage.shape.num_elements(), u64::MAX - 1);
        assert!(storage.chunks.is_empty());

        storage.append(&[7]).unwrap();
        assert_eq!(storage.shape.num_elements(), u64::MAX);
        assert_eq!(
            storage.read_values(&Slab::range(u64::MAX - 1, 1)).unwrap(),
            vec![7]
        );
    }

    #[test]
    fn rejected_writes_do_not_grow() {
        let mut storage = byte_storage(2);
        let grown = Shape::try_new([5]).unwrap();
        assert!(
            storage
                .write_within(&grown, &Slab::range(2, 3), &[1, 2])
                .is_err()
        );
        assert_eq!(storage.shape.num_elements(), 2);
        assert!(storage.read_values(&Slab::range(2, 1)).is_err());
    }

    #[test]
    fn fixed_datasets_do_not_grow() {
        let mut container = MemoryContainer::new();
        let mut dataset = container
            .create_dataset::<u8>("fixed", &DatasetConfig::new([2]))
            .unwrap();
        assert!(dataset.append(&[1]).is_err());
    }

    #[test]
    fn hierarchy() {
        let mut container = MemoryContainer::new();
        assert!(container.has_group("/"));
        assert!(container.create_group("a/b").is_err());
        container.create_group("/a/").unwrap();
        container.create_group("a/b").unwrap();
        assert!(container.create_group("a").is_err());
        assert!(container.has_group("a/b"));

        container
            .create_dataset::<u8>("a/b/values", &DatasetConfig::new([1]))
            .unwrap();
        assert!(container.has_dataset("/a/b/values"));
        assert!(
            container
                .create_dataset::<u8>("a/b/values", &DatasetConfig::new([1]))
                .is_err()
        );
        assert!(
            container
                .create_dataset::<u8>("missing/values", &DatasetConfig::new([1]))
                .is_err()
        );
        assert_eq!(container.dataset_paths(), vec!["a/b/values".to_string()]);
    }

    #[test]
    fn reopened_handles_share_storage() {
        let mut container = MemoryContainer::new();
        let mut heap = container.create_extensible::<u8>("heap", None, 0).unwrap();
        heap.append(b"abc").unwrap();

        let reopened = container.open_dataset::<u8>("heap").unwrap();
        assert_eq!(reopened.len(), 3);
        assert_eq!(reopened.layout(), heap.layout());
        assert!(container.open_dataset::<u32>("heap").is_err());
        assert!(container.open_dataset::<u8>("nope").is_err());
    }
}
