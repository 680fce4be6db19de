//! Single-base-substitution context discovery.
//!
//! An SBS index maps every trinucleotide context to the genomic positions
//! it occurs at (the position of the window's center base). Construction can
//! sample the genome instead of recording every occurrence: with a sampling
//! delta of Δ, each context code records one occurrence out of every Δ seen,
//! tracked by a per-code skip counter that survives chromosome boundaries.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use rand::Rng;

use crate::archive::{ArchiveReader, ArchiveWriter};
use crate::context::{is_dna_base, SbsContext};
use crate::error::{CtxbankError, Result};
use crate::genome::{
    read_chr_lengths, split_by_chromosome, write_chr_lengths, ChrPosition, ChromosomeId,
    GenomicPosition, GenomicRegion,
};
use crate::index::{IndexBuilder, IndexReader};
use crate::progress::Progress;

/// Name of the SBS-index data trailer inside the index directory.
pub const SBS_CONTEXT_DATA_FILENAME: &str = "SBS_context_index_data.bin";

const NUM_CONTEXT_CODES: usize = 64;

type Builder = IndexBuilder<SbsContext, GenomicPosition>;

/// Finds trinucleotide contexts and feeds them into an index builder.
#[derive(Debug)]
pub struct SbsContextScanner {
    sampling_delta: u8,
    skipped_contexts: [u8; NUM_CONTEXT_CODES],
}

impl SbsContextScanner {
    /// `sampling_delta` must be at least 1; 1 records every occurrence.
    pub fn new(sampling_delta: u8) -> Result<Self> {
        if sampling_delta == 0 {
            return Err(CtxbankError::invalid_argument(
                "the sampling delta must be at least 1",
            ));
        }
        Ok(Self {
            sampling_delta,
            skipped_contexts: [0; NUM_CONTEXT_CODES],
        })
    }

    pub fn sampling_delta(&self) -> u8 {
        self.sampling_delta
    }

    /// Count an occurrence of a context code; true when this one is due for
    /// recording.
    fn update_skipped_contexts(&mut self, code: u8) -> bool {
        let counter = &mut self.skipped_contexts[code as usize];
        *counter += 1;
        if *counter == self.sampling_delta {
            *counter = 0;
            return true;
        }
        false
    }

    /// Scan a chromosome, inserting the position of every (sampled)
    /// trinucleotide context into `builder`. Bases inside `regions_to_avoid`
    /// (all on this chromosome) and anything but `A`/`C`/`G`/`T` interrupt
    /// the context window.
    pub fn scan_chromosome(
        &mut self,
        builder: &mut Builder,
        chr_id: ChromosomeId,
        sequence: &[u8],
        regions_to_avoid: &BTreeSet<GenomicRegion>,
        progress: &mut dyn Progress,
    ) -> Result<()> {
        let mut regions = regions_to_avoid.iter().peekable();
        let mut window = [0u8; 3];
        let mut valid_bases = 0usize;

        for i in 0..sequence.len() {
            let position = GenomicPosition::new(chr_id, (i + 1) as ChrPosition);

            while let Some(region) = regions.peek() {
                if region.ends_before(&position) {
                    regions.next();
                } else {
                    break;
                }
            }
            let masked = regions.peek().is_some_and(|region| region.contains(&position));

            let base = sequence[i].to_ascii_uppercase();
            if !is_dna_base(base) || masked {
                valid_bases = 0;
                continue;
            }

            window.rotate_left(1);
            window[2] = base;
            valid_bases += 1;

            if valid_bases >= 3 {
                let context = SbsContext::from_bases(window)
                    .expect("window only holds DNA bases");
                if self.update_skipped_contexts(context.code()) {
                    // The context position is its center base, i in 1-based
                    // coordinates.
                    let center = GenomicPosition::new(chr_id, i as ChrPosition);
                    builder.insert(context, center)?;
                }
            }

            if i % (1 << 22) == 0 {
                progress.tick();
            }
        }

        Ok(())
    }
}

// ============================================================================
// Whole-genome build and the finished index
// ============================================================================

/// Build an SBS context index from chromosome sequences.
///
/// Scans every `(chromosome, sequence)` pair, shuffles every bucket, writes
/// the map file and the chromosome-length trailer, and reopens the finished
/// directory as an [`SbsContextIndex`].
#[allow(clippy::too_many_arguments)]
pub fn build_sbs_context_index<R, I>(
    rng: &mut R,
    index_path: impl AsRef<Path>,
    chromosomes: I,
    regions_to_avoid: &BTreeSet<GenomicRegion>,
    sampling_delta: u8,
    tmp_dir: &Path,
    cache_bytes: usize,
    progress: &mut dyn Progress,
) -> Result<SbsContextIndex<R>>
where
    R: Rng + Clone,
    I: IntoIterator<Item = (ChromosomeId, Vec<u8>)>,
{
    let index_path = index_path.as_ref();
    let mut scanner = SbsContextScanner::new(sampling_delta)?;
    let mut builder = Builder::open(index_path, cache_bytes)?;

    let regions_by_chr = split_by_chromosome(regions_to_avoid);
    let no_regions = BTreeSet::new();

    let mut chr_lengths = BTreeMap::new();
    for (chr_id, sequence) in chromosomes {
        progress.set_message(&format!("Processing chromosome {}", chr_id));

        let regions = regions_by_chr.get(&chr_id).unwrap_or(&no_regions);
        scanner.scan_chromosome(&mut builder, chr_id, &sequence, regions, progress)?;
        chr_lengths.insert(chr_id, sequence.len() as ChrPosition);
    }

    builder.shuffle(rng, tmp_dir, progress)?;
    builder.close()?;

    let mut archive = ArchiveWriter::create(index_path.join(SBS_CONTEXT_DATA_FILENAME))?;
    write_chr_lengths(&mut archive, &chr_lengths)?;
    archive.flush()?;

    SbsContextIndex::open(index_path, cache_bytes)
}

/// A finished SBS context index: the generic reader plus the chromosome
/// lengths recorded at build time.
#[derive(Debug)]
pub struct SbsContextIndex<R: Rng + Clone> {
    reader: IndexReader<SbsContext, GenomicPosition, R>,
    chr_lengths: BTreeMap<ChromosomeId, ChrPosition>,
}

impl<R: Rng + Clone> SbsContextIndex<R> {
    /// Open a built SBS context index directory.
    pub fn open(index_path: impl AsRef<Path>, cache_bytes: usize) -> Result<Self> {
        let index_path = index_path.as_ref();
        let reader = IndexReader::open(index_path, cache_bytes)?;

        let mut archive = ArchiveReader::open(index_path.join(SBS_CONTEXT_DATA_FILENAME))?;
        let chr_lengths = read_chr_lengths(&mut archive)?;

        Ok(Self {
            reader,
            chr_lengths,
        })
    }

    /// Length of every indexed chromosome.
    pub fn chromosome_lengths(&self) -> &BTreeMap<ChromosomeId, ChrPosition> {
        &self.chr_lengths
    }

    pub fn chromosome_ids(&self) -> Vec<ChromosomeId> {
        self.chr_lengths.keys().copied().collect()
    }
}

impl<R: Rng + Clone> std::ops::Deref for SbsContextIndex<R> {
    type Target = IndexReader<SbsContext, GenomicPosition, R>;

    fn deref(&self) -> &Self::Target {
        &self.reader
    }
}

impl<R: Rng + Clone> std::ops::DerefMut for SbsContextIndex<R> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.reader
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::Quiet;
    use tempfile::tempdir;

    fn scan(sequence: &[u8], sampling_delta: u8) -> Vec<(String, u32)> {
        let dir = tempdir().unwrap();
        let index_dir = dir.path().join("idx");
        let mut builder = Builder::open(&index_dir, 10_000).unwrap();
        let mut scanner = SbsContextScanner::new(sampling_delta).unwrap();
        scanner
            .scan_chromosome(&mut builder, 1, sequence, &BTreeSet::new(), &mut Quiet)
            .unwrap();
        builder.close().unwrap();

        let reader: IndexReader<SbsContext, GenomicPosition, rand::rngs::StdRng> =
            IndexReader::open(&index_dir, 10_000).unwrap();
        let mut seen = Vec::new();
        for key in reader.get_keys() {
            for value in reader.bucket(&key).unwrap().iter() {
                seen.push((key.to_string(), value.unwrap().position));
            }
        }
        seen.sort_by(|a, b| a.1.cmp(&b.1));
        seen
    }

    #[test]
    fn test_contexts_are_centered() {
        let seen = scan(b"ACGTA", 1);
        assert_eq!(
            seen,
            vec![
                ("ACG".to_string(), 2),
                ("CGT".to_string(), 3),
                ("GTA".to_string(), 4),
            ]
        );
    }

    #[test]
    fn test_n_interrupts_the_window() {
        // The N at position 3 kills the windows overlapping it.
        let seen = scan(b"ACNTAG", 1);
        assert_eq!(seen, vec![("TAG".to_string(), 5)]);
    }

    #[test]
    fn test_sampling_delta_halves_records() {
        // Twelve A-homopolymer windows; delta 2 keeps every other one.
        let all = scan(&[b'A'; 14], 1);
        let sampled = scan(&[b'A'; 14], 2);
        assert_eq!(all.len(), 12);
        assert_eq!(sampled.len(), 6);
    }

    #[test]
    fn test_zero_sampling_delta_is_rejected() {
        assert!(SbsContextScanner::new(0).is_err());
    }
}
