//! Disk-backed, shuffle-on-write index of genomic mutation contexts.
//!
//! A mutation simulator needs to place millions of mutations at loci whose
//! local sequence matches a given context, drawing each locus uniformly at
//! random and, usually, never twice. This crate stores the candidate loci of
//! a whole genome on disk, grouped by context, and serves them back with
//! uniform-random semantics under a bounded memory budget:
//!
//! - [`bucket`]: append-only file-backed vectors of fixed-footprint
//!   records, with in-memory and external-memory uniform shuffling and
//!   bounded-memory *random tours* that visit every record exactly once in
//!   uniformly random order.
//! - [`index`]: a context-to-bucket mapping persisted as a directory. A
//!   builder fans inserted pairs out to per-key buckets; a reader offers
//!   random access, without-replacement extraction, and extraction over
//!   caller-defined key classes (e.g. a context together with its reverse
//!   complement).
//! - [`repeats`]: a suffix-array scanner that finds every tandem repeat,
//!   microhomology, and null indel context of a chromosome and feeds an
//!   index builder.
//! - [`sbs`]: the trinucleotide-context counterpart.
//!
//! The `ctxbank` binary wraps genome scanning, inspection, and sampling in
//! a small CLI.

pub mod archive;
pub mod bucket;
pub mod codec;
pub mod config;
pub mod context;
pub mod error;
pub mod genome;
pub mod index;
pub mod logging;
pub mod progress;
pub mod repeats;
pub mod sbs;

pub use bucket::{BucketReader, BucketWriter, RandomTour, TourIter};
pub use codec::{Codec, ConstantSizeCodec};
pub use context::{FragmentType, IdContext, RepetitionReference, SbsContext};
pub use error::{CtxbankError, Result};
pub use genome::{ChrPosition, ChromosomeId, GenomicPosition, GenomicRegion};
pub use index::{
    IdContextClasses, IndexBuilder, IndexReader, KeyPartition, SbsContextClasses, Singleton,
};
pub use progress::{LogProgress, Progress, Quiet};
pub use repeats::{IdContextIndex, RepetitionScanner};
pub use sbs::{SbsContextIndex, SbsContextScanner};
