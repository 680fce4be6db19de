//! Reading side of an index.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::Path;

use rand::Rng;

use crate::archive::ArchiveReader;
use crate::bucket::{BucketReader, TourIter};
use crate::codec::{Codec, ConstantSizeCodec};
use crate::error::{CtxbankError, Result};
use crate::index::partition::KeyPartition;
use crate::index::{IndexLayout, INDEX_MAGIC, INDEX_VERSION};
use crate::progress::Progress;

/// Reads an index directory: random access into per-key buckets and
/// without-replacement extraction backed by bucket tours.
///
/// Extraction consumes values logically, not physically: an extracted value
/// stays on disk but is not returned again until [`reset`](Self::reset).
/// The reader never mutates any file, so several readers can serve the same
/// directory at once.
#[derive(Debug)]
pub struct IndexReader<K, V, R>
where
    K: Ord + Clone + Display + Codec,
    V: Codec,
    R: Rng + Clone,
{
    layout: IndexLayout,
    buckets: BTreeMap<K, BucketReader<V>>,
    tours: BTreeMap<K, TourIter<V, R>>,
}

impl<K, V, R> IndexReader<K, V, R>
where
    K: Ord + Clone + Display + Codec,
    V: Codec,
    R: Rng + Clone,
{
    /// Open an index directory.
    ///
    /// Loads the map file and opens a reader for every bucket, splitting
    /// `cache_bytes` evenly over them. Fails when the directory or the map
    /// file is missing, the map is malformed, or any bucket file is missing
    /// or malformed.
    pub fn open(index_dir: impl AsRef<Path>, cache_bytes: usize) -> Result<Self> {
        let dir = index_dir.as_ref().to_path_buf();

        if cache_bytes == 0 {
            return Err(CtxbankError::invalid_argument(
                "the index cache size must be greater than 0",
            ));
        }
        if !dir.exists() {
            return Err(CtxbankError::not_found(&dir));
        }
        if !dir.is_dir() {
            return Err(CtxbankError::format(&dir, "not a directory"));
        }

        let mut layout = IndexLayout {
            dir,
            cache_size: cache_bytes,
            bucket_prefix: String::new(),
        };

        let map_path = layout.map_path();
        let mut archive = ArchiveReader::open(&map_path)?;
        archive.read_header(INDEX_MAGIC, INDEX_VERSION)?;
        layout.bucket_prefix = archive.read_string()?;

        let num_of_keys = archive.read_u64()? as usize;
        let bucket_cache = layout.cache_per_bucket(num_of_keys);

        let mut buckets = BTreeMap::new();
        for _ in 0..num_of_keys {
            let key = K::decode(&mut archive)
                .map_err(|e| crate::archive::map_read_err(&map_path, "read key", e))?;
            let bucket_path = layout.bucket_path(&key);
            buckets.insert(key, BucketReader::open(bucket_path, bucket_cache)?);
        }

        Ok(Self {
            layout,
            buckets,
            tours: BTreeMap::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.layout.dir
    }

    /// The keys, in map-file (ascending) order.
    pub fn get_keys(&self) -> Vec<K> {
        self.buckets.keys().cloned().collect()
    }

    pub fn num_of_keys(&self) -> usize {
        self.buckets.len()
    }

    /// The bucket of a key, `None` when the key is not in the index.
    pub fn bucket(&self, key: &K) -> Option<&BucketReader<V>> {
        self.buckets.get(key)
    }

    /// Number of values under a key, 0 when the key is not in the index.
    pub fn num_of_values(&self, key: &K) -> u64 {
        self.buckets.get(key).map_or(0, |bucket| bucket.size())
    }

    /// Number of values still extractable for a key: the remaining length of
    /// its tour when one is running, the bucket size otherwise.
    pub fn extractable_for(&self, key: &K) -> u64 {
        if let Some(tour) = self.tours.get(key) {
            return tour.remaining_values();
        }
        self.num_of_values(key)
    }

    /// Discard every tour; all values become extractable again.
    pub fn reset(&mut self) {
        self.tours.clear();
    }

    fn ensure_tour(&mut self, rng: &R, key: &K) -> Result<()> {
        if self.tours.contains_key(key) {
            return Ok(());
        }

        let bucket = self
            .buckets
            .get(key)
            .ok_or_else(|| CtxbankError::not_found(self.layout.bucket_path(key)))?;

        let bucket_cache = self.layout.cache_per_bucket(self.buckets.len());
        let tour = bucket.random_tour(rng.clone(), bucket_cache)?;
        self.tours.insert(key.clone(), tour.begin()?);
        Ok(())
    }

    /// Start a tour for every key that does not have one yet, loading its
    /// first chunk. Amortizes the first-extraction cost over a single pass.
    pub fn boot_up_tours(&mut self, rng: &R, progress: &mut dyn Progress) -> Result<()> {
        progress.set_message("Booting context index");

        let keys = self.get_keys();
        let total = keys.len().max(1);
        for (booted, key) in keys.iter().enumerate() {
            self.ensure_tour(rng, key)?;
            progress.set_progress((100 * (booted + 1) / total) as u8);
        }

        Ok(())
    }
}

impl<K, V, R> IndexReader<K, V, R>
where
    K: Ord + Clone + Display + Codec,
    V: Codec + Clone,
    R: Rng + Clone,
{
    /// Extract a random value for a key, without replacement.
    ///
    /// The first extraction for a key snapshots `rng` into a tour over the
    /// key's bucket; later extractions continue that tour. Once every value
    /// has been handed out the call fails with `Exhausted` until
    /// [`reset`](Self::reset).
    pub fn extract(&mut self, rng: &R, key: &K) -> Result<V> {
        self.ensure_tour(rng, key)?;

        let tour = self.tours.get_mut(key).expect("tour was just created");
        match tour.take_next()? {
            Some(value) => Ok(value),
            None => Err(CtxbankError::exhausted(format!(
                "no more values available for {}",
                key
            ))),
        }
    }

    /// Extract a random value from the class of a key.
    ///
    /// Draws uniformly over every value still extractable in the class, then
    /// extracts from the member the draw lands in. Returns the member key
    /// together with the value.
    pub fn extract_from_class<P: KeyPartition<K>>(
        &mut self,
        rng: &mut R,
        key: &K,
    ) -> Result<(K, V)> {
        let key_class = P::class_of(key);

        let available_in_class: u64 = key_class
            .iter()
            .map(|class_key| self.extractable_for(class_key))
            .sum();
        if available_in_class == 0 {
            return Err(CtxbankError::exhausted(format!(
                "no value available in the class of {}",
                key
            )));
        }

        let mut pos = rng.gen_range(0..available_in_class);
        for class_key in &key_class {
            let available_for = self.extractable_for(class_key);
            if pos < available_for {
                let value = self.extract(rng, class_key)?;
                return Ok((class_key.clone(), value));
            }
            pos -= available_for;
        }

        let value = self.extract(rng, key)?;
        Ok((key.clone(), value))
    }
}

impl<K, V, R> IndexReader<K, V, R>
where
    K: Ord + Clone + Display + Codec,
    V: ConstantSizeCodec,
    R: Rng + Clone,
{
    /// Draw a random value for a key with replacement.
    pub fn choose(&self, rng: &mut R, key: &K) -> Result<V> {
        let bucket = self
            .buckets
            .get(key)
            .ok_or_else(|| CtxbankError::not_found(self.layout.bucket_path(key)))?;
        bucket.choose(rng)
    }

    /// Draw a random value from the class of a key with replacement.
    ///
    /// Weighted like [`extract_from_class`](Self::extract_from_class) but
    /// nothing is consumed.
    pub fn choose_from_class<P: KeyPartition<K>>(&self, rng: &mut R, key: &K) -> Result<(K, V)> {
        let key_class = P::class_of(key);

        let available_in_class: u64 = key_class
            .iter()
            .map(|class_key| self.extractable_for(class_key))
            .sum();
        if available_in_class == 0 {
            return Err(CtxbankError::exhausted(format!(
                "no value available in the class of {}",
                key
            )));
        }

        let mut pos = rng.gen_range(0..available_in_class);
        for class_key in &key_class {
            let available_for = self.extractable_for(class_key);
            if pos < available_for {
                let value = self.choose(rng, class_key)?;
                return Ok((class_key.clone(), value));
            }
            pos -= available_for;
        }

        let value = self.choose(rng, key)?;
        Ok((key.clone(), value))
    }
}

impl<K, V, R> IndexReader<K, V, R>
where
    K: Ord + Clone + Display + Codec,
    V: Codec,
    R: Rng + Clone,
{
    /// Number of values under the whole class of a key.
    pub fn num_of_class_values<P: KeyPartition<K>>(&self, key: &K) -> u64 {
        P::class_of(key)
            .iter()
            .map(|class_key| self.num_of_values(class_key))
            .sum()
    }

    /// Number of values still extractable from the class of a key.
    pub fn extractable_from_class<P: KeyPartition<K>>(&self, key: &K) -> u64 {
        P::class_of(key)
            .iter()
            .map(|class_key| self.extractable_for(class_key))
            .sum()
    }
}
