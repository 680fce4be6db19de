//! Random tours: bounded-memory iteration over a uniform permutation.
//!
//! A tour visits every value in a bucket exactly once. At any time only one
//! cache-sized chunk of the file is in memory: chunks are consecutive disk
//! segments starting at a random record offset (when records have a constant
//! footprint) and cycling once around the file; inside a chunk, values are
//! picked uniformly among the unvisited ones and swapped to the back of the
//! cache, the pick-and-swap step of a Fisher-Yates shuffle. Random start
//! plus uniform in-chunk selection makes every prefix of the emitted order
//! uniform.
//!
//! A tour snapshots the generator it is given: two tours built from equal
//! generator states visit the bucket in the same order. The bucket file must
//! not change while a tour is alive.

use rand::Rng;

use crate::bucket::BucketLayout;
use crate::codec::Codec;
use crate::error::{CtxbankError, Result};

/// Factory for tour iterators over one bucket.
#[derive(Debug)]
pub struct RandomTour<V: Codec, R: Rng + Clone> {
    layout: BucketLayout,
    rng: R,
    cacheable_values: usize,
    _marker: std::marker::PhantomData<V>,
}

impl<V: Codec, R: Rng + Clone> RandomTour<V, R> {
    pub(crate) fn new(layout: BucketLayout, rng: R, cache_bytes: usize) -> Result<Self> {
        let slot = crate::codec::slot_size::<V>();
        let cacheable_values = cache_bytes / slot;
        if cacheable_values == 0 {
            return Err(CtxbankError::invalid_argument(format!(
                "the minimum tour cache is {} bytes, got {}",
                slot, cache_bytes
            )));
        }

        Ok(Self {
            layout,
            rng,
            cacheable_values,
            _marker: std::marker::PhantomData,
        })
    }

    /// Start a tour. For constant-footprint records of a non-empty bucket
    /// the first read offset is drawn uniformly over the records; otherwise
    /// the tour starts at the front of the file.
    pub fn begin(&self) -> Result<TourIter<V, R>> {
        let mut rng = self.rng.clone();

        let mut initial_pos = self.layout.data_pos;
        if let Some(record_size) = V::ENCODED_SIZE {
            if self.layout.num_values > 0 {
                let first_index = rng.gen_range(0..self.layout.num_values);
                initial_pos = self.layout.value_pos(first_index, record_size);
            }
        }

        TourIter::new(self.layout.clone(), rng, initial_pos, self.cacheable_values)
    }

    /// Tour cache size in bytes, rounded to whole records.
    pub fn cache_size(&self) -> usize {
        self.cacheable_values * crate::codec::slot_size::<V>()
    }
}

/// A running tour.
///
/// `current()` is the value the tour is standing on; `advance()` moves to
/// the next one. The tour has ended when every value has been visited:
/// `is_end()` holds and `current()` is `None`.
#[derive(Debug)]
pub struct TourIter<V: Codec, R: Rng> {
    layout: BucketLayout,
    rng: R,
    cache: Vec<V>,
    capacity: usize,
    initial_pos: u64,
    read_pos: u64,
    available_in_cache: usize,
    iterated: u64,
}

impl<V: Codec, R: Rng> TourIter<V, R> {
    fn new(layout: BucketLayout, rng: R, initial_pos: u64, capacity: usize) -> Result<Self> {
        let mut tour = Self {
            layout,
            rng,
            cache: Vec::new(),
            capacity,
            initial_pos,
            read_pos: initial_pos,
            available_in_cache: 0,
            iterated: 0,
        };

        let mut init = true;
        tour.cache = tour.layout.load_chunk_cyclic(
            tour.capacity,
            &mut tour.read_pos,
            tour.initial_pos,
            &mut init,
        )?;
        tour.available_in_cache = tour.cache.len();
        tour.select_a_value_in_cache();

        Ok(tour)
    }

    /// Pick a value uniformly among the unvisited cached ones and move it to
    /// the back of the cache, where `current()` finds it.
    fn select_a_value_in_cache(&mut self) {
        if self.available_in_cache > 0 {
            let pos = self.rng.gen_range(0..self.available_in_cache);
            self.cache.swap(pos, self.available_in_cache - 1);
            self.iterated += 1;
        }
    }

    /// Whether every value has been visited.
    pub fn is_end(&self) -> bool {
        self.available_in_cache == 0 && self.read_pos == self.initial_pos
    }

    /// The value the tour is standing on, `None` once the tour has ended.
    pub fn current(&self) -> Option<&V> {
        if self.is_end() {
            None
        } else {
            Some(&self.cache[self.available_in_cache - 1])
        }
    }

    /// Move to the next value in the randomized order. A no-op once the tour
    /// has ended.
    pub fn advance(&mut self) -> Result<()> {
        if self.is_end() {
            return Ok(());
        }

        if self.available_in_cache > 0 {
            self.available_in_cache -= 1;
        }
        if self.available_in_cache == 0 && self.read_pos != self.initial_pos {
            let mut init = false;
            self.cache = self.layout.load_chunk_cyclic(
                self.capacity,
                &mut self.read_pos,
                self.initial_pos,
                &mut init,
            )?;
            self.available_in_cache = self.cache.len();
        }

        if self.is_end() {
            self.iterated += 1;
        } else {
            self.select_a_value_in_cache();
        }

        Ok(())
    }

    /// How many values the tour has already reached.
    pub fn reached_values(&self) -> u64 {
        self.iterated
    }

    /// How many values are still to come, the current one included.
    pub fn remaining_values(&self) -> u64 {
        if self.is_end() {
            0
        } else {
            self.layout.num_values + 1 - self.iterated
        }
    }
}

impl<V: Codec + Clone, R: Rng> TourIter<V, R> {
    /// Clone the current value and advance past it.
    pub fn take_next(&mut self) -> Result<Option<V>> {
        match self.current().cloned() {
            Some(value) => {
                self.advance()?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }
}

impl<V: Codec + Clone, R: Rng> Iterator for TourIter<V, R> {
    type Item = Result<V>;

    fn next(&mut self) -> Option<Self::Item> {
        self.take_next().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::{BucketReader, BucketWriter};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::BTreeSet;
    use std::path::Path;
    use tempfile::tempdir;

    fn write_bucket(path: &Path, values: &[u64]) {
        let mut writer = BucketWriter::<u64>::open(path, 256).unwrap();
        for &v in values {
            writer.push_back(v).unwrap();
        }
        writer.close().unwrap();
    }

    fn collect_tour(tour: &mut TourIter<u64, StdRng>) -> Vec<u64> {
        let mut values = Vec::new();
        while let Some(v) = tour.take_next().unwrap() {
            values.push(v);
        }
        values
    }

    #[test]
    fn test_tour_is_a_permutation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("b.bin");
        let values: Vec<u64> = (0..500).collect();
        write_bucket(&path, &values);

        let reader = BucketReader::<u64>::open(&path, 256).unwrap();
        // A 7-record cache forces chunked, wrapped reads.
        let tour = reader
            .random_tour(StdRng::seed_from_u64(17), 56)
            .unwrap();
        let mut it = tour.begin().unwrap();

        let seen = collect_tour(&mut it);
        assert_eq!(seen.len(), values.len());
        let unique: BTreeSet<u64> = seen.iter().copied().collect();
        assert_eq!(unique.len(), values.len());
        assert!(it.is_end());
        assert_eq!(it.remaining_values(), 0);
    }

    #[test]
    fn test_remaining_accounting() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("b.bin");
        write_bucket(&path, &[1, 2, 3, 4]);

        let reader = BucketReader::<u64>::open(&path, 256).unwrap();
        let tour = reader.random_tour(StdRng::seed_from_u64(3), 64).unwrap();
        let mut it = tour.begin().unwrap();

        for expected in (1..=4u64).rev() {
            assert_eq!(it.remaining_values(), expected);
            it.take_next().unwrap().unwrap();
        }
        assert!(it.is_end());
        assert_eq!(it.remaining_values(), 0);
    }

    #[test]
    fn test_empty_bucket_tour_ends_immediately() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("b.bin");
        write_bucket(&path, &[]);

        let reader = BucketReader::<u64>::open(&path, 256).unwrap();
        let tour = reader.random_tour(StdRng::seed_from_u64(0), 64).unwrap();
        let mut it = tour.begin().unwrap();
        assert!(it.is_end());
        assert_eq!(it.remaining_values(), 0);
        assert!(it.take_next().unwrap().is_none());
    }

    #[test]
    fn test_equal_generators_give_equal_tours() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("b.bin");
        write_bucket(&path, &(0..100).collect::<Vec<u64>>());

        let reader = BucketReader::<u64>::open(&path, 256).unwrap();
        let a = reader.random_tour(StdRng::seed_from_u64(9), 80).unwrap();
        let b = reader.random_tour(StdRng::seed_from_u64(9), 80).unwrap();

        let seen_a = collect_tour(&mut a.begin().unwrap());
        let seen_b = collect_tour(&mut b.begin().unwrap());
        assert_eq!(seen_a, seen_b);
    }

    #[test]
    fn test_different_generators_differ() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("b.bin");
        write_bucket(&path, &(0..100).collect::<Vec<u64>>());

        let reader = BucketReader::<u64>::open(&path, 256).unwrap();
        let mut orders = BTreeSet::new();
        for seed in 0..5 {
            let tour = reader
                .random_tour(StdRng::seed_from_u64(seed), 80)
                .unwrap();
            orders.insert(collect_tour(&mut tour.begin().unwrap()));
        }
        assert!(orders.len() > 1);
    }

    #[test]
    fn test_repeated_begin_replays_the_tour() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("b.bin");
        write_bucket(&path, &(0..50).collect::<Vec<u64>>());

        let reader = BucketReader::<u64>::open(&path, 256).unwrap();
        let tour = reader.random_tour(StdRng::seed_from_u64(4), 64).unwrap();

        let first = collect_tour(&mut tour.begin().unwrap());
        let second = collect_tour(&mut tour.begin().unwrap());
        assert_eq!(first, second);
    }
}
