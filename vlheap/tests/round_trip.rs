#![allow(clippy::unwrap_used)]

use bytes::Bytes;
use itertools::Itertools;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rstest::rstest;
use vlheap::error::VlsError;
use vlheap::io::{Container, Dataset, MemoryContainer};
use vlheap::nd::{Shape, Slab};
use vlheap::{PointerRecord, ReadOptions, Trim, VlsArray, VlsReader, VlsWriter, WriteOptions};

fn shape(dims: &[u64]) -> Shape {
    Shape::try_new(dims).unwrap()
}

fn random_elements(rng: &mut StdRng, count: u64) -> Vec<Vec<u8>> {
    (0..count)
        .map(|_| {
            let len = if rng.random_bool(0.2) {
                0
            } else {
                rng.random_range(1..40)
            };
            (0..len).map(|_| rng.random()).collect()
        })
        .collect()
}

#[rstest]
#[case(vec![7], None, 1 << 20, 64)]
#[case(vec![7], Some(vec![3]), 4, 64)]
#[case(vec![3, 4], None, 1 << 20, 7)]
#[case(vec![3, 4], Some(vec![2, 3]), 5, 64)]
#[case(vec![2, 3, 4], None, 1, 1)]
#[case(vec![5, 3, 4], Some(vec![2, 2, 3]), 1 << 20, 64)]
#[case(vec![5, 3, 4], Some(vec![8, 8, 8]), 10, 64)]
fn bytes_round_trip(
    #[case] dims: Vec<u64>,
    #[case] chunk_shape: Option<Vec<u64>>,
    #[case] element_budget: u64,
    #[case] flush_threshold: usize,
) {
    let mut options = WriteOptions::default()
        .with_element_budget(element_budget)
        .with_flush_threshold(flush_threshold)
        .with_heap_chunk_len(13);
    if let Some(chunk_shape) = chunk_shape {
        options = options.with_compression(chunk_shape, 6);
    }

    let mut rng = StdRng::seed_from_u64(dims.iter().product());
    let shape = shape(&dims);
    let elements = random_elements(&mut rng, shape.num_elements());
    let total: usize = elements.iter().map(Vec::len).sum();

    let mut container = MemoryContainer::new();
    let array = VlsWriter::new(options)
        .write_array(&mut container, "array", &shape, &elements)
        .unwrap();
    assert_eq!(array.heap_len(), total as u64);

    for budget in [1, 3, 1 << 20] {
        let read = ReadOptions::default().with_element_budget(budget);
        let reopened = VlsArray::open(&container, "array").unwrap();
        assert_eq!(reopened.read(&read).unwrap(), elements);
    }

    let coord = shape.unravel(shape.num_elements() / 2).unwrap();
    let flat = usize::try_from(shape.flat_index(&coord).unwrap()).unwrap();
    let read = ReadOptions::default();
    assert_eq!(array.read_element(&coord, &read).unwrap(), elements[flat]);
}

#[test]
fn strings_round_trip() {
    let words = [
        "",
        "α",
        "βγ",
        "plain",
        "",
        "with space",
        "tab\tbed",
        "emoji 🦀",
        "",
        "z",
        "yy",
        "xxx",
    ];
    let mut container = MemoryContainer::new();
    container.create_group("strings").unwrap();
    let array = VlsWriter::new(WriteOptions::default().with_flush_threshold(5))
        .write_array(&mut container, "strings/words", &shape(&[2, 2, 3]), &words)
        .unwrap();

    let read = ReadOptions::default();
    assert_eq!(array.read_strings(&read).unwrap(), words);
    assert_eq!(array.read_element(&[1, 0, 1], &read).unwrap(), "emoji 🦀");
}

#[test]
fn two_by_three_layout() {
    let mut container = MemoryContainer::new();
    let elements = ["a", "bb", "ccc", "dddd", "eeeee", "ffffff"];
    let array = VlsWriter::default()
        .write_array(&mut container, "", &shape(&[2, 3]), &elements)
        .unwrap();

    let records = VlsReader::default()
        .read_pointers(array.pointers())
        .unwrap();
    assert_eq!(
        records.iter().map(|r| r.offset).collect_vec(),
        vec![0, 1, 3, 6, 10, 15]
    );
    assert_eq!(records[4], PointerRecord::new(10, 5));
    assert_eq!(array.heap_len(), 21);
    assert_eq!(
        array.heap().read_slab(&Slab::range(10, 5)).unwrap(),
        b"eeeee"
    );
}

#[test]
fn scalar_round_trip() {
    let mut container = MemoryContainer::new();
    let array = VlsWriter::default()
        .write_array(&mut container, "scalar", &Shape::scalar(), &["only"])
        .unwrap();
    assert!(array.shape().is_scalar());
    assert!(array.pointers().shape().is_scalar());

    let read = ReadOptions::default();
    assert_eq!(array.read_strings(&read).unwrap(), ["only"]);
    assert_eq!(array.read_element(&[], &read).unwrap(), "only");
}

#[rstest]
#[case(vec![0])]
#[case(vec![0, 5])]
#[case(vec![3, 0, 2])]
fn empty_arrays(#[case] dims: Vec<u64>) {
    let mut container = MemoryContainer::new();
    let shape = shape(&dims);
    let elements: Vec<Bytes> = Vec::new();
    let chunk_shape = vec![1; shape.rank()];
    let options = WriteOptions::default().with_compression(chunk_shape, 1);
    let array = VlsWriter::new(options)
        .write_array(&mut container, "empty", &shape, &elements)
        .unwrap();
    assert_eq!(array.heap_len(), 0);
    assert!(array.read(&ReadOptions::default()).unwrap().is_empty());
}

#[test]
fn corrupt_pointer_names_the_element() {
    let mut container = MemoryContainer::new();
    let elements = ["a", "b", "c", "d", "e", "f", "g", "h"];
    VlsWriter::default()
        .write_array(&mut container, "array", &shape(&[2, 2, 2]), &elements)
        .unwrap();

    let mut pointers = container
        .open_dataset::<PointerRecord>("array/pointers")
        .unwrap();
    pointers
        .write_slab(&Slab::element(&[1, 0, 1]), &[PointerRecord::new(7, 2)])
        .unwrap();

    let array = VlsArray::open(&container, "array").unwrap();
    let read = ReadOptions::default();
    let err = array.read(&read).unwrap_err();
    assert!(err.is_corruption());
    assert!(matches!(err, VlsError::Context(..)));
    assert!(
        err.to_string()
            .contains("flat index 5 at coordinate (1, 0, 1)")
    );

    // Only the tampered element is unreadable.
    assert_eq!(array.read_element(&[1, 0, 0], &read).unwrap(), "e");
}

#[test]
fn overflowing_pointer_is_corruption() {
    let mut container = MemoryContainer::new();
    VlsWriter::default()
        .write_array(&mut container, "array", &shape(&[2]), &["a", "b"])
        .unwrap();
    let mut pointers = container
        .open_dataset::<PointerRecord>("array/pointers")
        .unwrap();
    pointers
        .write_slab(&Slab::range(1, 1), &[PointerRecord::new(u64::MAX, 2)])
        .unwrap();

    let err = VlsArray::open(&container, "array")
        .unwrap()
        .read_element(&[1], &ReadOptions::default())
        .unwrap_err();
    assert!(err.is_corruption());
}

#[test]
fn nul_trimming_is_a_read_option() {
    let mut container = MemoryContainer::new();
    let elements = [&b"one\0\0"[..], b"two\0", b"three"];
    let array = VlsWriter::default()
        .write_array(&mut container, "padded", &shape(&[3]), &elements)
        .unwrap();

    let trimmed = ReadOptions::default().with_trim(Trim::Nul);
    assert_eq!(
        array.read_strings(&trimmed).unwrap(),
        ["one", "two", "three"]
    );
    assert_eq!(array.heap_len(), 14);
}

#[test]
fn arrays_share_a_container() {
    let mut container = MemoryContainer::new();
    let writer = VlsWriter::default();
    writer
        .write_array(&mut container, "left", &shape(&[2]), &["l0", "l1"])
        .unwrap();
    writer
        .write_array(&mut container, "right", &shape(&[1]), &["r0"])
        .unwrap();
    assert!(
        writer
            .write_array(&mut container, "left", &shape(&[1]), &["again"])
            .is_err()
    );

    let read = ReadOptions::default();
    let left = VlsArray::open(&container, "left").unwrap();
    assert_eq!(left.read_strings(&read).unwrap(), ["l0", "l1"]);
    let right = VlsArray::open(&container, "right").unwrap();
    assert_eq!(right.read_strings(&read).unwrap(), ["r0"]);
    assert_eq!(
        container.dataset_paths(),
        [
            "left/heap",
            "left/pointers",
            "right/heap",
            "right/pointers",
        ]
    );
}

#[test]
fn options_from_json() {
    let write_json = concat!(
        r#"{"element_budget": 2, "flush_threshold": 3, "#,
        r#""chunk_shape": [1, 2], "compression_level": 5}"#,
    );
    let write = WriteOptions::from_json(write_json).unwrap();
    let read_json = r#"{"element_budget": 3, "trim": "keep"}"#;
    let read = ReadOptions::from_json(read_json).unwrap();

    let mut container = MemoryContainer::new();
    let elements = ["a", "b", "c", "d", "e", "f"];
    let array = VlsWriter::new(write)
        .write_array(&mut container, "json", &shape(&[2, 3]), &elements)
        .unwrap();
    assert_eq!(array.pointers().layout().chunk_shape(), Some(&[1, 2][..]));
    assert_eq!(array.read_strings(&read).unwrap().concat(), "abcdef");

    let err = WriteOptions::from_json(r#"{"element_budget": -1}"#);
    assert!(matches!(err, Err(VlsError::SerdeJson(..))));
}
