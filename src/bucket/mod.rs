//! File-backed buckets: append-only ordered multisets of values of one type.
//!
//! A bucket lives in a single file:
//!
//! | offset | bytes | meaning                             |
//! |--------|-------|-------------------------------------|
//! | 0      | 12    | magic `"RACES Bucket"`              |
//! | 12     | 1     | version `0x00`                      |
//! | 13     | 8     | number of records (u64 LE)          |
//! | 21     | ...   | the records, serialized back-to-back|
//!
//! [`BucketWriter`] appends through a bounded write cache and can replace
//! the on-disk order with a uniform random permutation, spilling to
//! temporary chunk files when the values do not fit the shuffle buffer.
//! [`BucketReader`] iterates sequentially in chunks and, for records with a
//! constant on-disk footprint, offers constant-time random access and
//! [`RandomTour`]s: bounded-memory iterators that visit every record exactly
//! once in uniformly random order.
//!
//! A bucket file must not be open in a writer and a reader at the same time.

mod reader;
mod tour;
mod writer;

pub use reader::{BucketIter, BucketReader};
pub use tour::{RandomTour, TourIter};
pub use writer::BucketWriter;

use std::path::{Path, PathBuf};

use crate::archive::{map_read_err, ArchiveReader, ArchiveWriter};
use crate::codec::Codec;
use crate::error::{CtxbankError, Result};

pub(crate) const BUCKET_MAGIC: &str = "RACES Bucket";
pub(crate) const BUCKET_VERSION: u8 = 0;

/// File geometry shared by writers, readers, iterators, and tours: where the
/// size field and the records sit, and how many records the header claims.
#[derive(Debug, Clone)]
pub(crate) struct BucketLayout {
    pub path: PathBuf,
    pub size_pos: u64,
    pub data_pos: u64,
    pub final_pos: u64,
    pub num_values: u64,
}

impl BucketLayout {
    /// Read the header of an existing bucket file.
    pub fn read_from(path: &Path) -> Result<Self> {
        let mut archive = ArchiveReader::open(path)?;
        archive.read_header(BUCKET_MAGIC, BUCKET_VERSION)?;

        let size_pos = archive.tell()?;
        let num_values = archive.read_u64()?;
        let data_pos = archive.tell()?;
        let final_pos = archive.len();

        Ok(Self {
            path: path.to_path_buf(),
            size_pos,
            data_pos,
            final_pos,
            num_values,
        })
    }

    /// Create a fresh bucket file holding zero records.
    pub fn create(path: &Path) -> Result<Self> {
        let mut archive = ArchiveWriter::create(path)?;
        archive.write_header(BUCKET_MAGIC, BUCKET_VERSION)?;
        let size_pos = archive.tell()?;
        archive.write_u64(0)?;
        let data_pos = archive.tell()?;
        archive.flush()?;

        Ok(Self {
            path: path.to_path_buf(),
            size_pos,
            data_pos,
            final_pos: data_pos,
            num_values: 0,
        })
    }

    /// Byte offset of the `i`-th record; only meaningful for records with a
    /// constant on-disk footprint.
    pub fn value_pos(&self, i: u64, record_size: usize) -> u64 {
        if i < self.num_values {
            self.data_pos + i * record_size as u64
        } else {
            self.final_pos
        }
    }

    /// Load up to `capacity` records starting at `*read_pos`, advancing it.
    /// Stops early at the end of the file; an empty result means there is
    /// nothing left to read.
    pub fn load_chunk<V: Codec>(&self, capacity: usize, read_pos: &mut u64) -> Result<Vec<V>> {
        let mut archive = ArchiveReader::open(&self.path)?;
        let file_end = archive.len();

        if *read_pos < self.data_pos {
            *read_pos = self.data_pos;
        } else if *read_pos >= file_end {
            return Ok(Vec::new());
        }
        archive.seek_to(*read_pos)?;

        let mut values = Vec::with_capacity(capacity);
        while values.len() < capacity && *read_pos < file_end {
            let value =
                V::decode(&mut archive).map_err(|e| map_read_err(&self.path, "read record", e))?;
            *read_pos = archive.tell()?;
            values.push(value);
        }

        Ok(values)
    }

    /// Load up to `capacity` records for a tour: reading wraps from the end
    /// of the file back to the first record and stops when `*read_pos`
    /// reaches `initial_pos` again. The very first load is allowed to cross
    /// `initial_pos` once, controlled by `*init`.
    pub fn load_chunk_cyclic<V: Codec>(
        &self,
        capacity: usize,
        read_pos: &mut u64,
        initial_pos: u64,
        init: &mut bool,
    ) -> Result<Vec<V>> {
        if self.num_values == 0 {
            *init = false;
            return Ok(Vec::new());
        }

        let mut archive = ArchiveReader::open(&self.path)?;
        let file_end = archive.len();

        if *read_pos < self.data_pos {
            *read_pos = self.data_pos;
        }
        archive.seek_to(*read_pos)?;

        let mut values = Vec::with_capacity(capacity);
        while values.len() < capacity {
            if *read_pos >= file_end {
                *read_pos = self.data_pos;
                archive.seek_to(*read_pos)?;
            }
            if *read_pos == initial_pos {
                if !*init {
                    return Ok(values);
                }
                *init = false;
            }
            let value =
                V::decode(&mut archive).map_err(|e| map_read_err(&self.path, "read record", e))?;
            *read_pos = archive.tell()?;
            values.push(value);
        }

        Ok(values)
    }
}

/// Error for a path that exists but cannot back a bucket.
pub(crate) fn not_a_bucket_file(path: &Path) -> CtxbankError {
    CtxbankError::format(path, "not a regular bucket file")
}
