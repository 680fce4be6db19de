//! Key→bucket indices persisted as a directory.
//!
//! An index directory holds one bucket file per key plus a map file:
//!
//! | offset | bytes | meaning                                  |
//! |--------|-------|------------------------------------------|
//! | 0      | 11    | magic `"RACES index"`                    |
//! | 11     | 1     | version `0x00`                           |
//! | 12     | var   | length-prefixed bucket filename prefix   |
//! | ...    | 8     | number of keys (u64 LE)                  |
//! | ...    | var   | the keys, serialized in ascending order  |
//!
//! Bucket filenames are `<prefix>_<key>.bin`, where `<key>` is the key's
//! display form. [`IndexBuilder`] owns its directory exclusively while it
//! exists; [`IndexReader`] never mutates any file, so several readers can
//! share a directory.

mod builder;
pub mod partition;
mod reader;

pub use builder::IndexBuilder;
pub use partition::{IdContextClasses, KeyPartition, SbsContextClasses, Singleton};
pub use reader::IndexReader;

use std::fmt::Display;
use std::path::PathBuf;

pub(crate) const INDEX_MAGIC: &str = "RACES index";
pub(crate) const INDEX_VERSION: u8 = 0;
pub(crate) const MAP_FILENAME: &str = "map.bin";
pub(crate) const DEFAULT_BUCKET_PREFIX: &str = "bucket";

/// Directory, cache budget, and bucket naming shared by builder and reader.
#[derive(Debug, Clone)]
pub(crate) struct IndexLayout {
    pub dir: PathBuf,
    pub cache_size: usize,
    pub bucket_prefix: String,
}

impl IndexLayout {
    pub fn bucket_path<K: Display>(&self, key: &K) -> PathBuf {
        self.dir.join(format!("{}_{}.bin", self.bucket_prefix, key))
    }

    pub fn map_path(&self) -> PathBuf {
        self.dir.join(MAP_FILENAME)
    }

    /// The cache budget is split evenly over the buckets.
    pub fn cache_per_bucket(&self, num_of_keys: usize) -> usize {
        self.cache_size / num_of_keys.max(1)
    }
}
