use arrow::array::UInt64Array;
use arrow::compute;
use arrow::record_batch::RecordBatch;
use geolens_common::Result;
use tracing::info;
use xxhash_rust::xxh3::xxh3_64;

use crate::dataset::Dataset;

// splitmix64: full 64-bit avalanche so the sort order scrambles even
// small row indices
fn mix(index: u64, seed: u64) -> u64 {
    let mut z = index
        .wrapping_add(seed)
        .wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Deterministic uniform sample of at most `target` rows. The same dataset,
/// target and seed always select the same rows, in their original order.
/// Datasets at or under the target pass through unchanged.
pub fn sample_rows(dataset: &Dataset, target: usize, seed: u64) -> Result<Dataset> {
    let total = dataset.row_count();
    if total <= target {
        return Ok(dataset.clone());
    }

    let mut order: Vec<usize> = (0..total).collect();
    order.sort_by_key(|&i| mix(i as u64, seed));
    let mut keep: Vec<usize> = order.into_iter().take(target).collect();
    keep.sort_unstable();

    let mut batches = Vec::with_capacity(dataset.batches.len());
    let mut offset = 0usize;
    let mut cursor = 0usize;
    for batch in &dataset.batches {
        let end = offset + batch.num_rows();
        let mut local = Vec::new();
        while cursor < keep.len() && keep[cursor] < end {
            local.push((keep[cursor] - offset) as u64);
            cursor += 1;
        }
        if !local.is_empty() {
            batches.push(take_rows(batch, &local)?);
        }
        offset = end;
    }

    info!(
        from = total,
        to = target,
        seed,
        "dataset sampled for large-input analysis"
    );
    // derive a distinct fingerprint so caches never confuse the sample
    // with its source
    let mut key = [0u8; 24];
    key[..8].copy_from_slice(&dataset.fingerprint.to_le_bytes());
    key[8..16].copy_from_slice(&(target as u64).to_le_bytes());
    key[16..].copy_from_slice(&seed.to_le_bytes());

    Ok(Dataset {
        name: dataset.name.clone(),
        schema: dataset.schema.clone(),
        batches,
        geometry: dataset.geometry.clone(),
        crs: dataset.crs.clone(),
        warnings: dataset.warnings.clone(),
        fingerprint: xxh3_64(&key),
    })
}

fn take_rows(batch: &RecordBatch, indices: &[u64]) -> Result<RecordBatch> {
    let indices = UInt64Array::from(indices.to_vec());
    let columns = batch
        .columns()
        .iter()
        .map(|c| compute::take(c.as_ref(), &indices, None))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(RecordBatch::try_new(batch.schema(), columns)?)
}
