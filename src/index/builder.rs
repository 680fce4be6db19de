//! Building side of an index.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::fs;
use std::path::Path;

use rand::Rng;

use crate::archive::ArchiveWriter;
use crate::bucket::BucketWriter;
use crate::codec::Codec;
use crate::error::{CtxbankError, Result};
use crate::index::{IndexLayout, DEFAULT_BUCKET_PREFIX, INDEX_MAGIC, INDEX_VERSION};
use crate::progress::Progress;

/// Writes an index: a directory of per-key buckets plus a map file.
///
/// The builder owns its directory exclusively from creation to drop. The
/// map file is written by [`close`](Self::close) and, best effort, when the
/// builder is dropped.
#[derive(Debug)]
pub struct IndexBuilder<K, V>
where
    K: Ord + Clone + Display + Codec,
    V: Codec,
{
    layout: IndexLayout,
    buckets: BTreeMap<K, BucketWriter<V>>,
}

impl<K, V> IndexBuilder<K, V>
where
    K: Ord + Clone + Display + Codec,
    V: Codec,
{
    /// Create a builder over a fresh directory with the default bucket
    /// filename prefix.
    pub fn open(index_dir: impl AsRef<Path>, cache_bytes: usize) -> Result<Self> {
        Self::with_prefix(index_dir, cache_bytes, DEFAULT_BUCKET_PREFIX)
    }

    /// Create a builder over a fresh directory.
    ///
    /// Fails when the directory already exists or `cache_bytes` is zero.
    pub fn with_prefix(
        index_dir: impl AsRef<Path>,
        cache_bytes: usize,
        bucket_prefix: impl Into<String>,
    ) -> Result<Self> {
        let dir = index_dir.as_ref().to_path_buf();

        if cache_bytes == 0 {
            return Err(CtxbankError::invalid_argument(
                "the index cache size must be greater than 0",
            ));
        }
        if dir.exists() {
            return Err(CtxbankError::already_exists(&dir));
        }
        fs::create_dir(&dir).map_err(|e| CtxbankError::io(&dir, "create directory", e))?;

        Ok(Self {
            layout: IndexLayout {
                dir,
                cache_size: cache_bytes,
                bucket_prefix: bucket_prefix.into(),
            },
            buckets: BTreeMap::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.layout.dir
    }

    pub fn num_of_keys(&self) -> usize {
        self.buckets.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.buckets.keys()
    }

    /// Insert a value under a key.
    ///
    /// The first value of a key creates its bucket file; that file must not
    /// pre-exist on disk. Every existing bucket's write cache shrinks to
    /// `cache / (n + 1)` so the budget keeps covering all buckets.
    pub fn insert(&mut self, key: K, value: V) -> Result<()> {
        if !self.buckets.contains_key(&key) {
            self.add_bucket_for(key.clone())?;
        }

        self.buckets
            .get_mut(&key)
            .expect("bucket was just created")
            .push_back(value)
    }

    fn add_bucket_for(&mut self, key: K) -> Result<()> {
        let bucket_path = self.layout.bucket_path(&key);
        if bucket_path.exists() {
            return Err(CtxbankError::already_exists(&bucket_path));
        }

        let bucket_cache = self.layout.cache_per_bucket(self.buckets.len() + 1);
        for bucket in self.buckets.values_mut() {
            bucket.set_cache_size(bucket_cache)?;
        }

        let writer = BucketWriter::open(&bucket_path, bucket_cache)?;
        self.buckets.insert(key, writer);
        Ok(())
    }

    /// Shuffle every bucket into a uniform random permutation.
    ///
    /// All buckets are flushed first; each then gets the whole cache budget
    /// for its shuffle, spilling to `tmp_dir` when the bucket is larger.
    pub fn shuffle<R: Rng>(
        &mut self,
        rng: &mut R,
        tmp_dir: &Path,
        progress: &mut dyn Progress,
    ) -> Result<()> {
        progress.set_message("Shuffling index");

        for bucket in self.buckets.values_mut() {
            progress.tick();
            bucket.flush()?;
        }

        let num_of_buckets = self.buckets.len();
        let buffer = self.layout.cache_size;
        for (done, bucket) in self.buckets.values_mut().enumerate() {
            bucket.shuffle(rng, buffer, tmp_dir, progress)?;
            progress.set_progress((100 * (done + 1) / (num_of_buckets + 1)) as u8);
        }

        progress.set_progress(100);
        Ok(())
    }

    /// Flush every bucket and write the map file.
    pub fn save_map(&mut self) -> Result<()> {
        for bucket in self.buckets.values_mut() {
            bucket.flush()?;
        }

        let mut archive = ArchiveWriter::create(self.layout.map_path())?;
        archive.write_header(INDEX_MAGIC, INDEX_VERSION)?;
        archive.write_string(&self.layout.bucket_prefix)?;
        archive.write_u64(self.buckets.len() as u64)?;

        for key in self.buckets.keys() {
            key.encode(&mut archive)
                .map_err(|e| CtxbankError::io(self.layout.map_path(), "write key", e))?;
        }

        archive.flush()
    }

    /// Write the map file and consume the builder, surfacing any failure.
    pub fn close(mut self) -> Result<()> {
        self.save_map()
    }
}

impl<K, V> Drop for IndexBuilder<K, V>
where
    K: Ord + Clone + Display + Codec,
    V: Codec,
{
    fn drop(&mut self) {
        if let Err(err) = self.save_map() {
            log::error!(
                "failed to save the map of index '{}' on drop: {}",
                self.layout.dir.display(),
                err
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_rejects_existing_directory() {
        let dir = tempdir().unwrap();
        let err = IndexBuilder::<String, u64>::open(dir.path(), 1000).unwrap_err();
        assert!(matches!(err, CtxbankError::AlreadyExists { .. }));
    }

    #[test]
    fn test_rejects_zero_cache() {
        let dir = tempdir().unwrap();
        let err = IndexBuilder::<String, u64>::open(dir.path().join("idx"), 0).unwrap_err();
        assert!(matches!(err, CtxbankError::InvalidArgument(_)));
    }

    #[test]
    fn test_bucket_files_appear_per_key() {
        let dir = tempdir().unwrap();
        let index_dir = dir.path().join("idx");

        let mut builder = IndexBuilder::<String, u64>::open(&index_dir, 1000).unwrap();
        builder.insert("ACA".to_string(), 1).unwrap();
        builder.insert("TCT".to_string(), 2).unwrap();
        builder.insert("ACA".to_string(), 3).unwrap();
        assert_eq!(builder.num_of_keys(), 2);
        builder.close().unwrap();

        assert!(index_dir.join("bucket_ACA.bin").exists());
        assert!(index_dir.join("bucket_TCT.bin").exists());
        assert!(index_dir.join("map.bin").exists());
    }

    #[test]
    fn test_pre_existing_bucket_file_is_fatal() {
        let dir = tempdir().unwrap();
        let index_dir = dir.path().join("idx");

        let mut builder = IndexBuilder::<String, u64>::open(&index_dir, 1000).unwrap();
        std::fs::write(index_dir.join("bucket_ACA.bin"), b"junk").unwrap();
        let err = builder.insert("ACA".to_string(), 1).unwrap_err();
        assert!(matches!(err, CtxbankError::AlreadyExists { .. }));
    }
}
