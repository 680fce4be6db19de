//! Reading side of a bucket.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use rand::Rng;

use crate::archive::{map_read_err, ArchiveReader};
use crate::bucket::{not_a_bucket_file, BucketLayout, RandomTour};
use crate::codec::{slot_size, Codec, ConstantSizeCodec};
use crate::error::{CtxbankError, Result};

/// A bucket opened for reading. Never mutates the file (except through an
/// explicit [`rename`](Self::rename)).
#[derive(Debug)]
pub struct BucketReader<V: Codec> {
    layout: BucketLayout,
    cacheable_values: usize,
    _marker: std::marker::PhantomData<V>,
}

impl<V: Codec> BucketReader<V> {
    /// Open an existing bucket file.
    ///
    /// Fails when the path is missing, is not a regular file, does not carry
    /// a bucket header, or `cache_bytes` cannot hold a single record.
    pub fn open(path: impl AsRef<Path>, cache_bytes: usize) -> Result<Self> {
        let path = path.as_ref();
        let slot = slot_size::<V>();
        let cacheable_values = cache_bytes / slot;
        if cacheable_values == 0 {
            return Err(CtxbankError::invalid_argument(format!(
                "the minimum bucket read cache is {} bytes, got {}",
                slot, cache_bytes
            )));
        }

        if !path.exists() {
            return Err(CtxbankError::not_found(path));
        }
        if !path.is_file() {
            return Err(not_a_bucket_file(path));
        }

        let layout = BucketLayout::read_from(path)?;

        Ok(Self {
            layout,
            cacheable_values,
            _marker: std::marker::PhantomData,
        })
    }

    /// Number of values in the bucket.
    pub fn size(&self) -> u64 {
        self.layout.num_values
    }

    pub fn is_empty(&self) -> bool {
        self.layout.num_values == 0
    }

    pub fn path(&self) -> &Path {
        &self.layout.path
    }

    /// Read cache capacity in bytes, rounded to whole records.
    pub fn cache_size(&self) -> usize {
        self.cacheable_values * slot_size::<V>()
    }

    /// Iterate the values in file order. The iterator owns its own cursor
    /// and cache; several can run over the same bucket independently.
    pub fn iter(&self) -> BucketIter<V> {
        BucketIter {
            layout: self.layout.clone(),
            capacity: self.cacheable_values,
            read_pos: self.layout.data_pos,
            queue: VecDeque::new(),
            done: false,
        }
    }

    /// Move the underlying file.
    pub fn rename(&mut self, new_path: impl AsRef<Path>) -> Result<()> {
        let new_path = new_path.as_ref();
        fs::rename(&self.layout.path, new_path)
            .map_err(|e| CtxbankError::io(&self.layout.path, "rename", e))?;
        self.layout.path = new_path.to_path_buf();
        Ok(())
    }

    /// Build a random tour over the bucket as it is now. The tour keeps its
    /// own copy of `rng`, so equal generator states yield equal tours.
    pub fn random_tour<R: Rng + Clone>(&self, rng: R, cache_bytes: usize) -> Result<RandomTour<V, R>> {
        RandomTour::new(self.layout.clone(), rng, cache_bytes)
    }

}

impl<V: ConstantSizeCodec> BucketReader<V> {
    /// Read the `i`-th value in file order.
    pub fn get(&self, i: u64) -> Result<V> {
        if i >= self.layout.num_values {
            return Err(CtxbankError::out_of_range(i, self.layout.num_values));
        }

        let mut archive = ArchiveReader::open(&self.layout.path)?;
        archive.seek_to(self.layout.value_pos(i, V::SIZE))?;
        V::decode(&mut archive).map_err(|e| map_read_err(&self.layout.path, "read record", e))
    }

    /// Draw a value uniformly at random; the value stays in the bucket.
    pub fn choose<R: Rng>(&self, rng: &mut R) -> Result<V> {
        if self.layout.num_values == 0 {
            return Err(CtxbankError::exhausted("no value in the bucket"));
        }

        let i = rng.gen_range(0..self.layout.num_values);
        self.get(i)
    }
}

/// Chunked forward iterator over a bucket.
#[derive(Debug)]
pub struct BucketIter<V: Codec> {
    layout: BucketLayout,
    capacity: usize,
    read_pos: u64,
    queue: VecDeque<V>,
    done: bool,
}

impl<V: Codec> Iterator for BucketIter<V> {
    type Item = Result<V>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.queue.is_empty() {
            if self.done {
                return None;
            }
            match self.layout.load_chunk(self.capacity, &mut self.read_pos) {
                Ok(values) if values.is_empty() => {
                    self.done = true;
                    return None;
                }
                Ok(values) => self.queue = values.into(),
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }

        self.queue.pop_front().map(Ok)
    }
}
