//! Tandem-repeat and microhomology discovery over chromosome sequences.
//!
//! [`RepetitionScanner`] walks a chromosome, finds every maximal tandem
//! repeat whose unit is at most `max_unit_size` bases, every short
//! microhomology between uncovered stretches, and the loci where an indel
//! context exists with no repetition at all, and feeds the resulting
//! `(IdContext, RepetitionReference)` pairs into an [`IndexBuilder`].
//!
//! Repeats are found with a prefix-doubling suffix array built per run of
//! clean bases: at order `h`, adjacent suffix-array entries at a constant
//! distance `h + δ` with matching classes delimit a tandem repeat of unit
//! size `h + δ` in `[h, 2h)`. Every position covered by a repeat is marked
//! so shorter repetitions inside a longer one, microhomologies, and null
//! contexts never double-report a locus.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use rand::Rng;

use crate::archive::{ArchiveReader, ArchiveWriter};
use crate::context::{is_dna_base, IdContext, RepetitionReference};
use crate::error::Result;
use crate::genome::{
    read_chr_lengths, split_by_chromosome, write_chr_lengths, ChrPosition, ChromosomeId,
    GenomicPosition, GenomicRegion,
};
use crate::index::{IndexBuilder, IndexReader};
use crate::progress::Progress;

/// Largest repetition unit searched for by default.
pub const DEFAULT_MAX_UNIT_SIZE: u8 = 50;

/// Farthest a microhomology tail may sit from its head.
const MICROHOMOLOGY_WINDOW: usize = 50;

/// Name of the indel-index data trailer inside the index directory.
pub const ID_CONTEXT_DATA_FILENAME: &str = "ID_context_index_data.bin";

// Context codes saturate: units above 5 and repetition counts above 6 share
// one bucket apiece, mirroring the standard indel classification.

fn unit_size_code(unit_size: usize) -> u8 {
    unit_size.min(5) as u8
}

fn num_of_repetitions_code(num_of_repetitions: usize) -> u8 {
    num_of_repetitions.min(6) as u8
}

fn homology_size_code(homology_size: usize) -> u8 {
    homology_size.min(5) as u8
}

/// Initialize the cyclic suffix array of `seq` with a counting sort over
/// single characters. Returns the number of distinct classes.
fn init_suffix_array(seq: &[u8], suffix_array: &mut [u32], classes: &mut [u32]) -> usize {
    let mut counter = [0usize; 256];
    for &base in seq {
        counter[base as usize] += 1;
    }
    for i in 1..256 {
        counter[i] += counter[i - 1];
    }
    for i in (0..seq.len()).rev() {
        let slot = &mut counter[seq[i] as usize];
        *slot -= 1;
        suffix_array[*slot] = i as u32;
    }

    classes[suffix_array[0] as usize] = 0;
    let mut num_of_classes = 1usize;
    for i in 1..seq.len() {
        if seq[suffix_array[i] as usize] != seq[suffix_array[i - 1] as usize] {
            num_of_classes += 1;
        }
        classes[suffix_array[i] as usize] = (num_of_classes - 1) as u32;
    }

    num_of_classes
}

/// One prefix-doubling step: upgrade an (h)-sorted cyclic suffix array to a
/// (2h)-sorted one by counting-sorting on the class of the suffix shifted
/// back by `h`, then recomputing classes from adjacent pairs.
fn update_suffix_array(
    h: usize,
    suffix_array: &mut [u32],
    classes: &mut Vec<u32>,
    num_of_classes: &mut usize,
    tmp_a: &mut [u32],
    tmp_b: &mut Vec<u32>,
) {
    let n = suffix_array.len();
    let h = h as u32;

    for i in 0..n {
        tmp_a[i] = if suffix_array[i] >= h {
            suffix_array[i] - h
        } else {
            suffix_array[i] + n as u32 - h
        };
    }

    let counter = &mut *tmp_b;
    counter[..*num_of_classes].fill(0);
    for i in 0..n {
        counter[classes[tmp_a[i] as usize] as usize] += 1;
    }
    for i in 1..*num_of_classes {
        counter[i] += counter[i - 1];
    }
    for i in (0..n).rev() {
        let curr = tmp_a[i];
        let slot = &mut counter[classes[curr as usize] as usize];
        *slot -= 1;
        suffix_array[*slot as usize] = curr;
    }

    let h = h as usize;
    let new_classes = &mut *tmp_b;
    new_classes[suffix_array[0] as usize] = 0;
    *num_of_classes = 1;
    for i in 1..n {
        let curr = suffix_array[i] as usize;
        let prev = suffix_array[i - 1] as usize;
        if classes[curr] != classes[prev]
            || classes[(curr + h) % n] != classes[(prev + h) % n]
        {
            *num_of_classes += 1;
        }
        new_classes[curr] = (*num_of_classes - 1) as u32;
    }

    std::mem::swap(classes, tmp_b);
}

/// Candidate repeats at order `h`: a map from the repeat's first position to
/// a map from unit size to the position of the last unit's first base.
fn collect_candidates(
    h: usize,
    suffix_array: &[u32],
    classes: &[u32],
) -> BTreeMap<u32, BTreeMap<usize, u32>> {
    let n = suffix_array.len();
    let next_h = if h > usize::MAX / 2 { usize::MAX } else { 2 * h };

    let mut candidates: BTreeMap<u32, BTreeMap<usize, u32>> = BTreeMap::new();
    let mut r_begin = 0u32;
    let mut r_end = 0u32;
    // `next_h` doubles as the "no delta yet" sentinel: real deltas are < h.
    let mut curr_delta = next_h;

    for i in 1..n {
        let curr = suffix_array[i] as usize;
        let prev = suffix_array[i - 1] as usize;

        let matches = classes[curr] == classes[prev] && curr >= prev + h && curr < prev + next_h && {
            let delta = curr - prev - h;
            curr + delta < n && classes[curr + delta] == classes[prev + delta]
        };

        if matches {
            let delta = curr - prev - h;
            if delta != curr_delta && curr_delta != next_h && r_begin < r_end {
                candidates
                    .entry(r_begin)
                    .or_default()
                    .insert(h + curr_delta, r_end);
                r_begin = curr as u32;
            }

            curr_delta = delta;
            r_end = curr as u32;
        } else {
            if r_begin < r_end {
                candidates
                    .entry(r_begin)
                    .or_default()
                    .insert(h + curr_delta, r_end);
            }

            r_begin = curr as u32;
            r_end = curr as u32;
            curr_delta = next_h;
        }
    }
    if r_begin < r_end {
        candidates
            .entry(r_begin)
            .or_default()
            .insert(h + curr_delta, r_end);
    }

    candidates
}

/// The indel-context index builder driver.
#[derive(Debug)]
pub struct RepetitionScanner {
    max_unit_size: u8,
}

type Builder = IndexBuilder<IdContext, RepetitionReference>;

impl RepetitionScanner {
    /// `max_unit_size` must be at least 1.
    pub fn new(max_unit_size: u8) -> Result<Self> {
        if max_unit_size == 0 {
            return Err(crate::error::CtxbankError::invalid_argument(
                "the maximum unit size must be at least 1",
            ));
        }
        Ok(Self { max_unit_size })
    }

    pub fn max_unit_size(&self) -> u8 {
        self.max_unit_size
    }

    /// Scan a whole chromosome, inserting every discovered context into
    /// `builder`.
    ///
    /// The sequence is split into maximal runs of `A`/`C`/`G`/`T` that do
    /// not touch any of `regions_to_avoid` (all on this chromosome); each
    /// run of at least two bases is scanned on its own.
    pub fn scan_chromosome(
        &self,
        builder: &mut Builder,
        chr_id: ChromosomeId,
        sequence: &[u8],
        regions_to_avoid: &BTreeSet<GenomicRegion>,
        progress: &mut dyn Progress,
    ) -> Result<()> {
        let sequence: Vec<u8> = sequence.iter().map(|b| b.to_ascii_uppercase()).collect();

        let mut regions = regions_to_avoid.iter().peekable();
        let mut run_begin: ChrPosition = 1;
        let mut run_length: usize = 0;

        for i in 0..sequence.len() {
            let position = GenomicPosition::new(chr_id, (i + 1) as ChrPosition);

            while let Some(region) = regions.peek() {
                if region.ends_before(&position) {
                    regions.next();
                } else {
                    break;
                }
            }
            let skipped = regions.peek().is_some_and(|region| region.contains(&position));

            if is_dna_base(sequence[i]) && !skipped {
                if run_length == 0 {
                    run_begin = position.position;
                }
                run_length += 1;
            } else if run_length > 0 {
                let start = (run_begin - 1) as usize;
                self.scan_run(
                    builder,
                    chr_id,
                    &sequence[start..start + run_length],
                    run_begin,
                    progress,
                )?;
                run_length = 0;
            }
        }

        if run_length > 0 {
            let start = (run_begin - 1) as usize;
            self.scan_run(
                builder,
                chr_id,
                &sequence[start..start + run_length],
                run_begin,
                progress,
            )?;
        }

        Ok(())
    }

    /// Scan one clean run. `begin` is the 1-based chromosome position of
    /// `seq[0]`. Runs shorter than two bases carry no indel context.
    fn scan_run(
        &self,
        builder: &mut Builder,
        chr_id: ChromosomeId,
        seq: &[u8],
        begin: ChrPosition,
        progress: &mut dyn Progress,
    ) -> Result<()> {
        if seq.len() < 2 {
            return Ok(());
        }

        let mut covered = self.mark_repetitions(builder, chr_id, seq, begin, progress)?;
        self.add_microhomologies(builder, chr_id, seq, begin, &covered)?;
        self.add_non_repeated(builder, chr_id, seq, begin, &mut covered)?;

        Ok(())
    }

    /// Find and emit every tandem repeat in the run, doubling the suffix
    /// array order until the configured unit range is exhausted. Returns the
    /// coverage mask.
    fn mark_repetitions(
        &self,
        builder: &mut Builder,
        chr_id: ChromosomeId,
        seq: &[u8],
        begin: ChrPosition,
        progress: &mut dyn Progress,
    ) -> Result<Vec<bool>> {
        let length = seq.len();
        let mut covered = vec![false; length];

        let mut suffix_array = vec![0u32; length];
        let mut classes = vec![0u32; length];
        let mut tmp_a = vec![0u32; length];
        let mut tmp_b = vec![0u32; length];

        let mut num_of_classes = init_suffix_array(seq, &mut suffix_array, &mut classes);

        let mut h_max = (self.max_unit_size as usize + 1) / 2;
        if h_max > length {
            h_max = length;
        }

        let mut h = 1usize;
        while h < h_max {
            self.add_repetitions_at(
                builder,
                chr_id,
                seq,
                begin,
                h,
                &suffix_array,
                &classes,
                &mut covered,
            )?;
            update_suffix_array(
                h,
                &mut suffix_array,
                &mut classes,
                &mut num_of_classes,
                &mut tmp_a,
                &mut tmp_b,
            );
            progress.tick();

            h = h.saturating_mul(2);
        }
        self.add_repetitions_at(
            builder,
            chr_id,
            seq,
            begin,
            h,
            &suffix_array,
            &classes,
            &mut covered,
        )?;

        Ok(covered)
    }

    /// Emit the repeats with unit size in `[h, 2h)`. For each unit size only
    /// the candidate reaching farthest right survives; shorter candidates
    /// are contained in it.
    #[allow(clippy::too_many_arguments)]
    fn add_repetitions_at(
        &self,
        builder: &mut Builder,
        chr_id: ChromosomeId,
        seq: &[u8],
        begin: ChrPosition,
        h: usize,
        suffix_array: &[u32],
        classes: &[u32],
        covered: &mut [bool],
    ) -> Result<()> {
        let candidates = collect_candidates(h, suffix_array, classes);

        let mut r_endings: BTreeMap<usize, u32> = BTreeMap::new();
        for (r_begin, by_unit_size) in candidates {
            for (unit_size, r_end) in by_unit_size {
                let extends = match r_endings.get(&unit_size) {
                    Some(&seen_end) => seen_end < r_end,
                    None => true,
                };
                if extends {
                    r_endings.insert(unit_size, r_end);
                    self.add_repetition(
                        builder, chr_id, seq, begin, unit_size, r_begin, r_end, covered,
                    )?;
                }
            }
        }

        Ok(())
    }

    /// Emit one repeat and mark the bases it covers.
    #[allow(clippy::too_many_arguments)]
    fn add_repetition(
        &self,
        builder: &mut Builder,
        chr_id: ChromosomeId,
        seq: &[u8],
        begin: ChrPosition,
        unit_size: usize,
        r_begin: u32,
        r_end: u32,
        covered: &mut [bool],
    ) -> Result<()> {
        let num_of_repetitions = 1 + (r_end - r_begin) as usize / unit_size;
        let position = GenomicPosition::new(chr_id, begin + r_begin);

        self.add_polymer(
            builder,
            position,
            num_of_repetitions,
            &seq[r_begin as usize..],
            unit_size,
        )?;

        let cover_end = (r_end as usize + unit_size).min(covered.len());
        for slot in &mut covered[r_begin as usize..cover_end] {
            *slot = true;
        }

        Ok(())
    }

    /// Emit a polymeric context: a homopolymer when the unit is one base,
    /// a heteropolymer otherwise.
    fn add_polymer(
        &self,
        builder: &mut Builder,
        position: GenomicPosition,
        num_of_repetitions: usize,
        unit: &[u8],
        unit_size: usize,
    ) -> Result<()> {
        let context = if unit_size == 1 {
            IdContext::for_homopolymer(unit[0], num_of_repetitions_code(num_of_repetitions))
        } else {
            IdContext::for_heteropolymer(
                unit_size_code(unit_size),
                num_of_repetitions_code(num_of_repetitions),
            )
        };

        let reference =
            RepetitionReference::new(position.chr_id, position.position, unit_size.min(255) as u8);

        builder.insert(context, reference)
    }

    /// Probe every uncovered base for a nearby copy of its prefix: a
    /// microhomology of size `k` at distance `j - i` exists when
    /// `seq[i..i+k) == seq[j..j+k)` with `k < j - i`, everything uncovered
    /// and within the probe window.
    fn add_microhomologies(
        &self,
        builder: &mut Builder,
        chr_id: ChromosomeId,
        seq: &[u8],
        begin: ChrPosition,
        covered: &[bool],
    ) -> Result<()> {
        let len = covered.len();
        if len < 3 {
            return Ok(());
        }

        for i in 1..len - 2 {
            if covered[i] {
                continue;
            }

            let window_end = (len - 1).min(i + MICROHOMOLOGY_WINDOW);
            let mut j = i + 2;
            while j < window_end && !covered[j] {
                let mut k = 0usize;
                while j + k < window_end && !covered[j + k] && seq[i + k] == seq[j + k] && i + k < j
                {
                    k += 1;
                }

                if k > 0 && i + k < j {
                    let homology_distance = j - i;
                    let context = IdContext::for_microhomology(
                        unit_size_code(homology_distance),
                        homology_size_code(k),
                    );
                    let reference =
                        RepetitionReference::new(chr_id, begin + i as u32, k.min(255) as u8);
                    builder.insert(context, reference)?;
                }

                j += 1;
            }
        }

        Ok(())
    }

    /// Emit the contexts of the stretches no repeat covers: a one-repetition
    /// polymer at every admissible position, plus the null (zero-repetition)
    /// heteropolymer and homopolymer contexts marking loci where an indel of
    /// that class could arise without any repetition present.
    fn add_non_repeated(
        &self,
        builder: &mut Builder,
        chr_id: ChromosomeId,
        seq: &[u8],
        begin: ChrPosition,
        covered: &mut [bool],
    ) -> Result<()> {
        let mut begin_uncovered = 0usize;
        let mut last_char = [0usize; 256];

        for i in 0..covered.len() {
            if covered[i] {
                if begin_uncovered != i {
                    for unit_size in 2..6usize {
                        let mut j = begin_uncovered;
                        while j + unit_size < i {
                            self.add_repetition(
                                builder, chr_id, seq, begin, unit_size, j as u32, j as u32, covered,
                            )?;
                            self.add_null_heteropolymer(builder, chr_id, unit_size, begin, j as u32)?;
                            j += 1;
                        }
                    }
                }
                begin_uncovered = i + 1;
            } else {
                if begin_uncovered == i {
                    for base in [b'A', b'C', b'G', b'T'] {
                        last_char[base as usize] = i;
                    }
                }

                let curr_char = seq[i];
                if last_char[curr_char as usize] + 4 < i {
                    for j in last_char[curr_char as usize] + 2..i - 2 {
                        self.add_null_homopolymer(builder, i, seq, chr_id, begin, j as u32)?;
                    }
                }
                last_char[curr_char as usize] = i;

                self.add_repetition(builder, chr_id, seq, begin, 1, i as u32, i as u32, covered)?;
            }
        }

        Ok(())
    }

    /// A heteropolymer context with zero repetitions at the base after
    /// `r_begin`.
    fn add_null_heteropolymer(
        &self,
        builder: &mut Builder,
        chr_id: ChromosomeId,
        unit_size: usize,
        begin: ChrPosition,
        r_begin: u32,
    ) -> Result<()> {
        let context = IdContext::for_heteropolymer(
            unit_size_code(unit_size),
            num_of_repetitions_code(0),
        );
        let reference =
            RepetitionReference::new(chr_id, r_begin + begin + 1, unit_size.min(255) as u8);

        builder.insert(context, reference)
    }

    /// A homopolymer context with zero repetitions of the current base at
    /// the base after `r_begin`.
    fn add_null_homopolymer(
        &self,
        builder: &mut Builder,
        nucleotide_index: usize,
        seq: &[u8],
        chr_id: ChromosomeId,
        begin: ChrPosition,
        r_begin: u32,
    ) -> Result<()> {
        let position = GenomicPosition::new(chr_id, r_begin + begin + 1);

        self.add_polymer(builder, position, 0, &seq[nucleotide_index..], 1)
    }
}

// ============================================================================
// Whole-genome build and the finished index
// ============================================================================

/// Build an indel context index from chromosome sequences.
///
/// Scans every `(chromosome, sequence)` pair, shuffles every bucket, writes
/// the map file and the chromosome-length trailer, and reopens the finished
/// directory as an [`IdContextIndex`].
#[allow(clippy::too_many_arguments)]
pub fn build_id_context_index<R, I>(
    rng: &mut R,
    index_path: impl AsRef<Path>,
    chromosomes: I,
    regions_to_avoid: &BTreeSet<GenomicRegion>,
    max_unit_size: u8,
    tmp_dir: &Path,
    cache_bytes: usize,
    progress: &mut dyn Progress,
) -> Result<IdContextIndex<R>>
where
    R: Rng + Clone,
    I: IntoIterator<Item = (ChromosomeId, Vec<u8>)>,
{
    let index_path = index_path.as_ref();
    let scanner = RepetitionScanner::new(max_unit_size)?;
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

    let mut archive = ArchiveWriter::create(index_path.join(ID_CONTEXT_DATA_FILENAME))?;
    write_chr_lengths(&mut archive, &chr_lengths)?;
    archive.write_u8(max_unit_size)?;
    archive.flush()?;

    IdContextIndex::open(index_path, cache_bytes)
}

/// A finished indel context index: the generic reader plus the chromosome
/// lengths and unit-size bound recorded at build time.
#[derive(Debug)]
pub struct IdContextIndex<R: Rng + Clone> {
    reader: IndexReader<IdContext, RepetitionReference, R>,
    chr_lengths: BTreeMap<ChromosomeId, ChrPosition>,
    max_unit_size: u8,
}

impl<R: Rng + Clone> IdContextIndex<R> {
    /// Open a built indel context index directory.
    pub fn open(index_path: impl AsRef<Path>, cache_bytes: usize) -> Result<Self> {
        let index_path = index_path.as_ref();
        let reader = IndexReader::open(index_path, cache_bytes)?;

        let mut archive = ArchiveReader::open(index_path.join(ID_CONTEXT_DATA_FILENAME))?;
        let chr_lengths = read_chr_lengths(&mut archive)?;
        let max_unit_size = archive.read_u8()?;

        Ok(Self {
            reader,
            chr_lengths,
            max_unit_size,
        })
    }

    /// Length of every indexed chromosome.
    pub fn chromosome_lengths(&self) -> &BTreeMap<ChromosomeId, ChrPosition> {
        &self.chr_lengths
    }

    pub fn max_unit_size(&self) -> u8 {
        self.max_unit_size
    }
}

impl<R: Rng + Clone> std::ops::Deref for IdContextIndex<R> {
    type Target = IndexReader<IdContext, RepetitionReference, R>;

    fn deref(&self) -> &Self::Target {
        &self.reader
    }
}

impl<R: Rng + Clone> std::ops::DerefMut for IdContextIndex<R> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.reader
    }
}

// ============================================================================
// Tests
// ============================================================================
