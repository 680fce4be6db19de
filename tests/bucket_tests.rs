//! Integration tests for bucket writing, shuffling, and random tours.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::tempdir;

use ctxbank::progress::Quiet;
use ctxbank::{BucketReader, BucketWriter, CtxbankError, GenomicPosition};

fn fill_bucket(path: &Path, values: impl IntoIterator<Item = u64>) -> Result<()> {
    let mut writer = BucketWriter::<u64>::open(path, 700)?;
    for v in values {
        writer.push_back(v)?;
    }
    writer.close()?;
    Ok(())
}

fn read_all(path: &Path) -> Result<Vec<u64>> {
    let reader = BucketReader::<u64>::open(path, 900)?;
    let mut values = Vec::new();
    for v in reader.iter() {
        values.push(v?);
    }
    Ok(values)
}

/// Write a few values, read them back in insertion order, hit one randomly.
#[test]
fn test_write_then_read_in_order() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("bucket.bin");

    fill_bucket(&path, [7, 3, 42])?;

    let reader = BucketReader::<u64>::open(&path, 900)?;
    assert_eq!(reader.size(), 3);
    assert_eq!(read_all(&path)?, vec![7, 3, 42]);
    assert_eq!(reader.get(1)?, 3);
    Ok(())
}

#[test]
fn test_large_dataset_in_order_across_small_caches() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("bucket.bin");

    // A 700-byte write cache forces many intermediate flushes.
    fill_bucket(&path, 0..10_000)?;

    let values = read_all(&path)?;
    assert_eq!(values, (0..10_000).collect::<Vec<u64>>());
    Ok(())
}

#[test]
fn test_random_access_matches_positions() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("bucket.bin");
    fill_bucket(&path, 0..1_000)?;

    let reader = BucketReader::<u64>::open(&path, 900)?;
    let mut rng = StdRng::seed_from_u64(0);
    use rand::seq::SliceRandom;
    let mut indices: Vec<u64> = (0..1_000).collect();
    indices.shuffle(&mut rng);

    for i in indices {
        assert_eq!(reader.get(i)?, i);
    }
    Ok(())
}

/// In-memory shuffle: the contents stay a permutation and actually move.
#[test]
fn test_in_memory_shuffle_permutes() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("bucket.bin");
    fill_bucket(&path, 0..1_000)?;

    let mut writer = BucketWriter::<u64>::open(&path, 700)?;
    let mut rng = StdRng::seed_from_u64(0);
    // 8000 bytes hold all 1000 records: the in-memory strategy runs.
    writer.shuffle(&mut rng, 8_000, dir.path(), &mut Quiet)?;
    writer.close()?;

    let values = read_all(&path)?;
    assert_eq!(values.len(), 1_000);
    let unique: BTreeSet<u64> = values.iter().copied().collect();
    assert_eq!(unique.len(), 1_000);
    assert_ne!(values, (0..1_000).collect::<Vec<u64>>());

    // Fixed points of a uniform permutation follow Poisson(1); dozens of
    // them would mean the shuffle barely moved anything.
    let fixed_points = values.iter().enumerate().filter(|(i, &v)| v == *i as u64).count();
    assert!(fixed_points < 30, "{} fixed points", fixed_points);
    Ok(())
}

/// External shuffle with a tiny buffer: chunked spill, permutation, and no
/// leftover temporary files.
#[test]
fn test_external_shuffle_permutes_and_cleans_up() -> Result<()> {
    let dir = tempdir()?;
    let tmp = tempdir()?;
    let path = dir.path().join("bucket.bin");
    fill_bucket(&path, 0..10_000)?;

    let mut writer = BucketWriter::<u64>::open(&path, 700)?;
    let mut rng = StdRng::seed_from_u64(0);
    // 32 bytes: chunks of two records each.
    writer.shuffle(&mut rng, 32, tmp.path(), &mut Quiet)?;
    writer.close()?;

    let values = read_all(&path)?;
    assert_eq!(values.len(), 10_000);
    let unique: BTreeSet<u64> = values.iter().copied().collect();
    assert_eq!(unique.len(), 10_000);
    assert_ne!(values, (0..10_000).collect::<Vec<u64>>());

    let leftovers: Vec<_> = std::fs::read_dir(tmp.path())?.collect();
    assert!(leftovers.is_empty(), "temporary chunk files were left behind");
    Ok(())
}

#[test]
fn test_shuffle_with_roomier_external_buffer() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("bucket.bin");
    fill_bucket(&path, 0..10_000)?;

    let mut writer = BucketWriter::<u64>::open(&path, 700)?;
    let mut rng = StdRng::seed_from_u64(1);
    writer.shuffle(&mut rng, 700, dir.path(), &mut Quiet)?;
    writer.close()?;

    let values = read_all(&path)?;
    let unique: BTreeSet<u64> = values.iter().copied().collect();
    assert_eq!(unique.len(), 10_000);
    Ok(())
}

/// The first value of a tour is uniform over the bucket: every record shows
/// up as the opener in roughly a quarter of seeded tours.
#[test]
fn test_tour_first_value_is_uniform() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("bucket.bin");
    fill_bucket(&path, [0, 1, 2, 3])?;

    let reader = BucketReader::<u64>::open(&path, 900)?;

    let trials = 2_000u64;
    let mut histogram: BTreeMap<u64, u64> = BTreeMap::new();
    for seed in 0..trials {
        let tour = reader.random_tour(StdRng::seed_from_u64(seed), 64)?;
        let mut it = tour.begin()?;
        let first = it.take_next()?.expect("bucket is not empty");
        *histogram.entry(first).or_insert(0) += 1;
    }

    assert_eq!(histogram.len(), 4);
    for (&value, &count) in &histogram {
        // Expected 500 per value; the binomial spread is ~20.
        assert!(
            (300..=700).contains(&count),
            "value {} opened {} of {} tours",
            value,
            count,
            trials
        );
    }
    Ok(())
}

/// A tour visits every value exactly once, whatever the cache size.
#[test]
fn test_tour_visits_everything_once() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("bucket.bin");
    fill_bucket(&path, 0..10_000)?;

    let reader = BucketReader::<u64>::open(&path, 900)?;

    for cache_bytes in [8usize, 96, 900, 100_000] {
        let tour = reader.random_tour(StdRng::seed_from_u64(7), cache_bytes)?;
        let mut it = tour.begin()?;

        let mut remaining: BTreeSet<u64> = (0..10_000).collect();
        while let Some(value) = it.take_next()? {
            assert!(remaining.remove(&value), "value {} visited twice", value);
        }
        assert!(remaining.is_empty());
        assert!(it.is_end());
    }
    Ok(())
}

/// Buckets of fixed-size domain records work the same as integer buckets.
#[test]
fn test_genomic_position_bucket() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("positions.bin");

    let dataset: Vec<GenomicPosition> = (0..5_000u32)
        .map(|i| GenomicPosition::new((i % 22) as u8, i))
        .collect();

    let mut writer = BucketWriter::<GenomicPosition>::open(&path, 700)?;
    for &pos in &dataset {
        writer.push_back(pos)?;
    }

    let mut rng = StdRng::seed_from_u64(0);
    writer.shuffle(&mut rng, 400, dir.path(), &mut Quiet)?;
    writer.close()?;

    let reader = BucketReader::<GenomicPosition>::open(&path, 900)?;
    assert_eq!(reader.size(), 5_000);

    let mut remaining: BTreeSet<GenomicPosition> = dataset.iter().copied().collect();
    for value in reader.iter() {
        assert!(remaining.remove(&value?));
    }
    assert!(remaining.is_empty());
    Ok(())
}

/// Variable-footprint records: sequential reads and front-started tours
/// still work (random access and `choose` only exist for constant-footprint
/// records).
#[test]
fn test_variable_footprint_bucket() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("names.bin");

    let dataset: Vec<String> = (0..200).map(|i| format!("sample_{:04}", i)).collect();

    let mut writer = BucketWriter::<String>::open(&path, 4_096)?;
    for name in &dataset {
        writer.push_back(name.clone())?;
    }
    writer.close()?;

    let reader = BucketReader::<String>::open(&path, 512)?;
    assert_eq!(reader.size(), 200);
    let read_back: Vec<String> = reader.iter().collect::<ctxbank::Result<_>>()?;
    assert_eq!(read_back, dataset);

    // A tour over variable records starts at the front but still visits
    // every record exactly once.
    let tour = reader.random_tour(StdRng::seed_from_u64(2), 512)?;
    let mut it = tour.begin()?;
    let mut remaining: BTreeSet<String> = dataset.iter().cloned().collect();
    while let Some(name) = it.take_next()? {
        assert!(remaining.remove(&name));
    }
    assert!(remaining.is_empty());
    Ok(())
}

/// A writer must not silently accept a foreign file.
#[test]
fn test_foreign_file_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("junk.bin");
    std::fs::write(&path, b"definitely not a bucket")?;

    let err = BucketWriter::<u64>::open(&path, 700).unwrap_err();
    assert!(matches!(err, CtxbankError::Format { .. }));

    let err = BucketReader::<u64>::open(&path, 900).unwrap_err();
    assert!(matches!(err, CtxbankError::Format { .. }));
    Ok(())
}
