//! Appending side of a bucket.

use std::fs;
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::Rng;

use crate::archive::{map_read_err, ArchiveReader, ArchiveWriter};
use crate::bucket::{not_a_bucket_file, BucketLayout, BUCKET_MAGIC, BUCKET_VERSION};
use crate::codec::{slot_size, Codec};
use crate::error::{CtxbankError, Result};
use crate::progress::Progress;

/// A bucket opened for appending.
///
/// Values are buffered in a bounded write cache and hit the disk on
/// [`flush`](Self::flush), which also rewrites the record count in the
/// header. Dropping the writer flushes; failures on that path are logged
/// because nothing can be returned from a destructor. Call
/// [`close`](Self::close) where the error matters.
#[derive(Debug)]
pub struct BucketWriter<V: Codec> {
    layout: BucketLayout,
    cache: Vec<V>,
    cache_capacity: usize,
}

impl<V: Codec> BucketWriter<V> {
    /// Open `path` as a bucket, creating it when absent and appending when
    /// it already holds a bucket file.
    ///
    /// Fails when `path` exists but is not a regular bucket file, or when
    /// `cache_bytes` cannot hold a single record.
    pub fn open(path: impl AsRef<Path>, cache_bytes: usize) -> Result<Self> {
        let path = path.as_ref();
        let slot = slot_size::<V>();
        if cache_bytes < slot {
            return Err(CtxbankError::invalid_argument(format!(
                "the minimum bucket write cache is {} bytes, got {}",
                slot, cache_bytes
            )));
        }

        let layout = if path.exists() {
            if !path.is_file() {
                return Err(not_a_bucket_file(path));
            }
            BucketLayout::read_from(path)?
        } else {
            BucketLayout::create(path)?
        };

        Ok(Self {
            layout,
            cache: Vec::new(),
            cache_capacity: cache_bytes / slot,
        })
    }

    /// Number of values in the bucket, cached ones included.
    pub fn size(&self) -> u64 {
        self.layout.num_values
    }

    pub fn path(&self) -> &Path {
        &self.layout.path
    }

    /// Write cache capacity in bytes, rounded to whole records.
    pub fn cache_size(&self) -> usize {
        self.cache_capacity * slot_size::<V>()
    }

    /// Append a value. Flushes first when the cache is full.
    pub fn push_back(&mut self, value: V) -> Result<()> {
        if self.cache.len() == self.cache_capacity {
            self.flush()?;
        }

        self.cache.push(value);
        self.layout.num_values += 1;
        Ok(())
    }

    /// Resize the write cache. Cached values that no longer fit are flushed
    /// first. Fails when `cache_bytes` cannot hold a single record.
    pub fn set_cache_size(&mut self, cache_bytes: usize) -> Result<()> {
        let slot = slot_size::<V>();
        if cache_bytes < slot {
            return Err(CtxbankError::invalid_argument(format!(
                "the minimum bucket write cache is {} bytes, got {}",
                slot, cache_bytes
            )));
        }

        let capacity = cache_bytes / slot;
        if self.cache.len() > capacity {
            self.flush()?;
        }
        self.cache_capacity = capacity;
        Ok(())
    }

    /// Persist the record count and append every cached value.
    ///
    /// Idempotent; must run before a reader opens the file.
    pub fn flush(&mut self) -> Result<()> {
        let mut archive = ArchiveWriter::update(&self.layout.path)?;
        archive.seek_to(self.layout.size_pos)?;
        archive.write_u64(self.layout.num_values)?;

        if !self.cache.is_empty() {
            archive.seek_end()?;
            for value in &self.cache {
                value
                    .encode(&mut archive)
                    .map_err(|e| CtxbankError::io(&self.layout.path, "append record", e))?;
            }
            self.cache.clear();

            archive.flush()?;
            self.layout.final_pos = archive.tell()?;
        } else {
            archive.flush()?;
        }

        Ok(())
    }

    /// Flush and consume the writer, surfacing any failure.
    pub fn close(mut self) -> Result<()> {
        self.flush()
    }

    // ------------------------------------------------------------------
    // Shuffling
    // ------------------------------------------------------------------

    /// Replace the on-disk order with a uniform random permutation.
    ///
    /// When `buffer_bytes` holds the whole bucket the permutation happens in
    /// memory; otherwise the values are spilled into temporary chunk files
    /// under `tmp_dir` (transient footprint at most twice the bucket) and
    /// the bucket is rebuilt chunk by chunk. Fails when `buffer_bytes`
    /// cannot hold two records. A no-op on an empty bucket.
    pub fn shuffle<R: Rng>(
        &mut self,
        rng: &mut R,
        buffer_bytes: usize,
        tmp_dir: &Path,
        progress: &mut dyn Progress,
    ) -> Result<()> {
        let slot = slot_size::<V>();
        if (buffer_bytes / slot) as u64 >= self.layout.num_values {
            self.shuffle_in_memory(rng, progress)
        } else {
            self.shuffle_on_disk(rng, buffer_bytes, tmp_dir, progress)
        }
    }

    fn shuffle_in_memory<R: Rng>(&mut self, rng: &mut R, progress: &mut dyn Progress) -> Result<()> {
        self.flush()?;

        if self.layout.num_values == 0 {
            return Ok(());
        }

        let mut read_pos = self.layout.data_pos;
        let mut values: Vec<V> =
            self.layout
                .load_chunk(self.layout.num_values as usize, &mut read_pos)?;
        if values.len() as u64 != self.layout.num_values {
            return Err(CtxbankError::format(
                &self.layout.path,
                "bucket is shorter than its header claims",
            ));
        }

        values.shuffle(rng);
        progress.tick();

        self.rewrite_with(values.iter())?;
        progress.tick();
        Ok(())
    }

    fn shuffle_on_disk<R: Rng>(
        &mut self,
        rng: &mut R,
        buffer_bytes: usize,
        tmp_dir: &Path,
        progress: &mut dyn Progress,
    ) -> Result<()> {
        self.flush()?;

        if self.layout.num_values == 0 {
            return Ok(());
        }

        // Half the buffer reads the bucket, the other half sizes the chunks.
        let slot = slot_size::<V>();
        let chunk_values = (buffer_bytes / 2) / slot;
        if chunk_values == 0 {
            return Err(CtxbankError::invalid_argument(format!(
                "the minimum shuffle buffer is {} bytes, got {}",
                2 * slot,
                buffer_bytes
            )));
        }

        let chunk_paths = self.split_in_random_chunks(rng, chunk_values, tmp_dir, progress)?;

        let mut archive = ArchiveWriter::create(&self.layout.path)?;
        archive.write_header(BUCKET_MAGIC, BUCKET_VERSION)?;
        self.layout.size_pos = archive.tell()?;
        archive.write_u64(self.layout.num_values)?;
        self.layout.data_pos = archive.tell()?;

        for chunk_path in &chunk_paths {
            let mut values: Vec<V> = read_chunk_file(chunk_path, chunk_values)?;
            fs::remove_file(chunk_path)
                .map_err(|e| CtxbankError::io(chunk_path, "remove chunk", e))?;

            values.shuffle(rng);

            for value in &values {
                value
                    .encode(&mut archive)
                    .map_err(|e| CtxbankError::io(&self.layout.path, "append record", e))?;
            }
            progress.tick();
        }

        archive.flush()?;
        self.layout.final_pos = archive.tell()?;
        Ok(())
    }

    /// Distribute the bucket values over freshly created chunk files, each
    /// value landing in a chunk drawn uniformly among the ones that still
    /// have room. Chunk names never collide with existing files.
    ///
    /// Chunk files are appended through short-lived handles; with a small
    /// buffer a big bucket needs more chunks than the process may hold open
    /// at once.
    fn split_in_random_chunks<R: Rng>(
        &self,
        rng: &mut R,
        max_chunk_values: usize,
        tmp_dir: &Path,
        progress: &mut dyn Progress,
    ) -> Result<Vec<PathBuf>> {
        let size = self.layout.num_values as usize;
        let num_chunks = (size - 1) / max_chunk_values + 1;

        let mut chunk_paths = Vec::with_capacity(num_chunks);
        let mut name_num = 0usize;
        for _ in 0..num_chunks {
            let path = loop {
                name_num += 1;
                let candidate = tmp_dir.join(format!("tmp_chunk{}.tmp", name_num));
                if !candidate.exists() {
                    break candidate;
                }
            };
            fs::File::create(&path).map_err(|e| CtxbankError::io(&path, "create chunk", e))?;
            chunk_paths.push(path);
        }

        let mut chunk_sizes = vec![0usize; num_chunks];
        let mut active: Vec<usize> = (0..num_chunks).collect();
        let mut last_active = num_chunks - 1;

        let mut read_pos = self.layout.data_pos;
        let mut pending: Vec<V> = Vec::new();
        let mut cursor = 0usize;
        let mut record = Vec::new();

        for _ in 0..size {
            if cursor == pending.len() {
                pending = self.layout.load_chunk(max_chunk_values, &mut read_pos)?;
                cursor = 0;
                progress.tick();
                if pending.is_empty() {
                    return Err(CtxbankError::format(
                        &self.layout.path,
                        "bucket is shorter than its header claims",
                    ));
                }
            }

            let pos = rng.gen_range(0..=last_active);
            let index = active[pos];

            chunk_sizes[index] += 1;
            record.clear();
            pending[cursor]
                .encode(&mut record)
                .map_err(|e| CtxbankError::io(&chunk_paths[index], "encode record", e))?;
            append_to_chunk(&chunk_paths[index], &record)?;
            cursor += 1;

            if chunk_sizes[index] == max_chunk_values && last_active > 0 {
                active.swap(pos, last_active);
                last_active -= 1;
            }
        }

        Ok(chunk_paths)
    }

    /// Rewrite the bucket file from scratch with the given records.
    fn rewrite_with<'a>(&mut self, values: impl Iterator<Item = &'a V>) -> Result<()>
    where
        V: 'a,
    {
        let mut archive = ArchiveWriter::create(&self.layout.path)?;
        archive.write_header(BUCKET_MAGIC, BUCKET_VERSION)?;
        self.layout.size_pos = archive.tell()?;
        archive.write_u64(self.layout.num_values)?;
        self.layout.data_pos = archive.tell()?;

        for value in values {
            value
                .encode(&mut archive)
                .map_err(|e| CtxbankError::io(&self.layout.path, "append record", e))?;
        }

        archive.flush()?;
        self.layout.final_pos = archive.tell()?;
        Ok(())
    }
}

impl<V: Codec> Drop for BucketWriter<V> {
    fn drop(&mut self) {
        if let Err(err) = self.flush() {
            log::error!(
                "failed to flush bucket '{}' on drop: {}",
                self.layout.path.display(),
                err
            );
        }
    }
}

/// Append one encoded record to a chunk file.
fn append_to_chunk(path: &Path, record: &[u8]) -> Result<()> {
    use std::io::Write;

    let mut file = fs::OpenOptions::new()
        .append(true)
        .open(path)
        .map_err(|e| CtxbankError::io(path, "open chunk", e))?;
    file.write_all(record)
        .map_err(|e| CtxbankError::io(path, "write chunk", e))
}

/// Load a whole chunk file written by `split_in_random_chunks`. Chunk files
/// carry no header, just records.
fn read_chunk_file<V: Codec>(path: &Path, capacity: usize) -> Result<Vec<V>> {
    let mut archive = ArchiveReader::open(path)?;
    let file_end = archive.len();

    let mut values = Vec::with_capacity(capacity);
    let mut pos = 0u64;
    while pos < file_end {
        if values.len() == capacity {
            return Err(CtxbankError::format(
                path,
                "chunk file is larger than the shuffle buffer",
            ));
        }
        let value = V::decode(&mut archive).map_err(|e| map_read_err(path, "read chunk", e))?;
        pos = archive.tell()?;
        values.push(value);
    }

    Ok(values)
}
