use itertools::Itertools;
use vlheap_error::{VlsResult, vls_bail};

/// Choose the shape of the blocks used to stream an array of `full_shape` through memory.
///
/// The block starts out as one storage chunk (all ones when the array is unchunked) clamped
/// to the array extent. It is then grown, fastest dimension first, by the largest whole
/// multiple of the chunk that keeps the block at or under `element_budget` elements. Growth
/// stops at the first dimension where not even two chunks fit.
///
/// An array with a zero extent plans to an all-zero block, meaning there is nothing to
/// iterate. A rank 0 array plans to the empty block.
pub fn plan_block(
    chunk_shape: Option<&[u64]>,
    full_shape: &[u64],
    element_budget: u64,
) -> VlsResult<Vec<u64>> {
    let rank = full_shape.len();
    let mut block = match chunk_shape {
        None => vec![1; rank],
        Some(chunk) if chunk.len() != rank => {
            vls_bail!(
                ShapeMismatch: format!("chunk rank {}", rank),
                format!("chunk rank {}", chunk.len())
            )
        }
        Some(chunk) => chunk.to_vec(),
    };

    for (b, &extent) in block.iter_mut().zip(full_shape) {
        if *b == 0 && extent != 0 {
            vls_bail!(
                "chunk shape [{}] has a zero extent",
                chunk_shape.unwrap_or_default().iter().join(", ")
            );
        }
        *b = (*b).min(extent);
    }

    let base_size = block.iter().fold(1u64, |acc, &b| acc.saturating_mul(b));
    if base_size == 0 {
        return Ok(vec![0; rank]);
    }

    let mut block_size = base_size;
    for (b, &extent) in block.iter_mut().zip(full_shape).rev() {
        let multiple = element_budget / block_size;
        if multiple <= 1 {
            break;
        }
        let scaled = extent.min(b.saturating_mul(multiple));
        block_size = block_size / *b * scaled;
        *b = scaled;
    }

    log::trace!(
        "Planned block [{}] of {} elements for array [{}] under budget {}",
        block.iter().join(", "),
        block_size,
        full_shape.iter().join(", "),
        element_budget
    );
    Ok(block)
}
