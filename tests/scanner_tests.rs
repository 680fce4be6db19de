//! Integration tests for the repetition scanner and the whole-genome builds.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::tempdir;

use ctxbank::progress::Quiet;
use ctxbank::repeats::{build_id_context_index, RepetitionScanner};
use ctxbank::sbs::build_sbs_context_index;
use ctxbank::{
    GenomicRegion, IdContext, IdContextClasses, IndexBuilder, IndexReader, RepetitionReference,
};

type Builder = IndexBuilder<IdContext, RepetitionReference>;
type Reader = IndexReader<IdContext, RepetitionReference, StdRng>;

/// Scan one chromosome into a fresh index and return every emitted
/// `(context, position, unit size)` triple, sorted.
fn scan(sequence: &[u8], max_unit_size: u8) -> Result<Vec<(String, u32, u8)>> {
    scan_with_regions(sequence, max_unit_size, &BTreeSet::new())
}

fn scan_with_regions(
    sequence: &[u8],
    max_unit_size: u8,
    regions: &BTreeSet<GenomicRegion>,
) -> Result<Vec<(String, u32, u8)>> {
    let dir = tempdir()?;
    let index_dir = dir.path().join("idx");

    let mut builder = Builder::open(&index_dir, 100_000)?;
    let scanner = RepetitionScanner::new(max_unit_size)?;
    scanner.scan_chromosome(&mut builder, 1, sequence, regions, &mut Quiet)?;
    builder.close()?;

    let reader = Reader::open(&index_dir, 100_000)?;
    let mut emitted = Vec::new();
    for key in reader.get_keys() {
        for value in reader.bucket(&key).expect("key is in the index").iter() {
            let value = value?;
            emitted.push((key.to_string(), value.position.position, value.unit_size));
        }
    }
    emitted.sort();
    Ok(emitted)
}

fn counts(emitted: &[(String, u32, u8)]) -> BTreeMap<&str, usize> {
    let mut by_context: BTreeMap<&str, usize> = BTreeMap::new();
    for (context, _, _) in emitted {
        *by_context.entry(context).or_insert(0) += 1;
    }
    by_context
}

/// A dinucleotide repeat and a homopolymer separated by `N`s: exactly one
/// context each, nothing else.
#[test]
fn test_repeat_and_homopolymer_across_n_gap() -> Result<()> {
    let emitted = scan(b"ACACACACNNCCCCC", 5)?;
    assert_eq!(
        emitted,
        vec![
            ("1C5".to_string(), 11, 1),
            ("2R4".to_string(), 1, 2),
        ]
    );
    Ok(())
}

/// With unit size capped at 1 only homopolymers, microhomologies, and null
/// contexts can come out; a repeat-free sequence yields a fully predictable
/// multiset.
#[test]
fn test_repeat_free_sequence_contexts() -> Result<()> {
    let emitted = scan(b"ACGTGCTA", 1)?;

    let mut expected = vec![
        // One single-base "repetition" per base.
        ("1A1".to_string(), 1, 1),
        ("1C1".to_string(), 2, 1),
        ("1G1".to_string(), 3, 1),
        ("1T1".to_string(), 4, 1),
        ("1G1".to_string(), 5, 1),
        ("1C1".to_string(), 6, 1),
        ("1T1".to_string(), 7, 1),
        ("1A1".to_string(), 8, 1),
        // The final A repeats the opening A at distances beyond 4, marking
        // the positions in between as zero-repetition A loci.
        ("1A0".to_string(), 4, 1),
        ("1A0".to_string(), 5, 1),
        ("1A0".to_string(), 6, 1),
        // Single-base prefix copies within the probe window.
        ("4M1".to_string(), 2, 1),
        ("2M1".to_string(), 3, 1),
        ("3M1".to_string(), 4, 1),
    ];
    expected.sort();

    assert_eq!(emitted, expected);
    Ok(())
}

/// A homopolymer run after a repeat-free stretch: the stretch gets null
/// heteropolymer contexts for every unit size that fits.
#[test]
fn test_null_heteropolymers_before_a_repeat() -> Result<()> {
    let emitted = scan(b"ACGTGCTAAAAA", 5)?;
    let by_context = counts(&emitted);

    // The A-run is a five-fold homopolymer at position 8.
    assert!(emitted.contains(&("1A5".to_string(), 8, 1)));
    assert_eq!(by_context["1A5"], 1);

    // The seven bases before it host r=1 heteropolymers and their null
    // (r=0) counterparts for every unit size fitting the gap.
    assert_eq!(by_context["2R1"], 5);
    assert_eq!(by_context["2R0"], 5);
    assert_eq!(by_context["3R1"], 4);
    assert_eq!(by_context["3R0"], 4);
    assert_eq!(by_context["4R1"], 3);
    assert_eq!(by_context["4R0"], 3);
    assert_eq!(by_context["5R1"], 2);
    assert_eq!(by_context["5R0"], 2);

    // Null heteropolymers sit one base after their anchor.
    let null_2r: Vec<u32> = emitted
        .iter()
        .filter(|(context, _, _)| context == "2R0")
        .map(|(_, position, _)| *position)
        .collect();
    assert_eq!(null_2r, vec![2, 3, 4, 5, 6]);

    // Microhomologies only in the uncovered stretch.
    assert_eq!(by_context["4M1"], 1);
    assert_eq!(by_context["2M1"], 1);
    assert_eq!(by_context["3M1"], 1);
    Ok(())
}

/// Longer repeats suppress the shorter repeats they contain.
#[test]
fn test_contained_repeats_are_not_double_reported() -> Result<()> {
    // AGAGAGAG: a unit-2 repeat, no unit-1 repeats inside it.
    let emitted = scan(b"AGAGAGAG", 5)?;
    assert_eq!(emitted, vec![("2R4".to_string(), 1, 2)]);
    Ok(())
}

#[test]
fn test_unit_and_repetition_codes_saturate() -> Result<()> {
    // A 6-base unit repeated twice: the unit code caps at 5.
    let emitted = scan(b"ACGTTGACGTTG", 12)?;
    assert!(emitted.iter().any(|(context, position, unit_size)| {
        context == "5R2" && *position == 1 && *unit_size == 6
    }));

    // Twelve repetitions of AC: the repetition code caps at 6.
    let emitted = scan(b"ACACACACACACACACACACACAC", 5)?;
    assert!(emitted.contains(&("2R6".to_string(), 1, 2)));
    Ok(())
}

/// Masking a stretch with a skip region is the same as hard-masking it
/// with `N`s.
#[test]
fn test_skip_region_matches_hard_masking() -> Result<()> {
    let masked_by_n = scan(b"AAAAANNNNN", 5)?;

    let mut regions = BTreeSet::new();
    regions.insert(GenomicRegion::new(1, 6, 5));
    let masked_by_region = scan_with_regions(b"AAAAACCCCC", 5, &regions)?;

    assert_eq!(masked_by_n, masked_by_region);
    assert_eq!(masked_by_region, vec![("1A5".to_string(), 1, 1)]);
    Ok(())
}

#[test]
fn test_short_runs_are_ignored() -> Result<()> {
    assert!(scan(b"", 5)?.is_empty());
    assert!(scan(b"A", 5)?.is_empty());
    assert!(scan(b"ANANAN", 5)?.is_empty());
    Ok(())
}

#[test]
fn test_lowercase_sequences_are_normalized() -> Result<()> {
    let lower = scan(b"acacacacnnccccc", 5)?;
    let upper = scan(b"ACACACACNNCCCCC", 5)?;
    assert_eq!(lower, upper);
    Ok(())
}

// ============================================================================
// Whole-genome builds
// ============================================================================

#[test]
fn test_build_id_context_index_end_to_end() -> Result<()> {
    let dir = tempdir()?;
    let tmp = tempdir()?;
    let index_dir = dir.path().join("idx");

    let chromosomes = vec![
        (1u8, b"ACACACACNNCCCCC".to_vec()),
        (2u8, b"ACGTGCTA".to_vec()),
    ];

    let mut rng = StdRng::seed_from_u64(0);
    let mut index = build_id_context_index(
        &mut rng,
        &index_dir,
        chromosomes,
        &BTreeSet::new(),
        5,
        tmp.path(),
        100_000,
        &mut Quiet,
    )?;

    assert_eq!(index.max_unit_size(), 5);
    assert_eq!(
        index.chromosome_lengths(),
        &BTreeMap::from([(1u8, 15u32), (2u8, 8u32)])
    );

    // Chromosome 1 contributes its repeat and homopolymer.
    let repeat: IdContext = "2R4".parse().unwrap();
    assert_eq!(index.num_of_values(&repeat), 1);
    let rng_snapshot = StdRng::seed_from_u64(7);
    let value = index.extract(&rng_snapshot, &repeat)?;
    assert_eq!(value.position.position, 1);
    assert_eq!(value.unit_size, 2);
    assert!(index.extract(&rng_snapshot, &repeat).is_err());
    index.reset();
    assert!(index.extract(&rng_snapshot, &repeat).is_ok());

    // The homopolymer class pairs 1C5 with its complement 1G5; only the C
    // run exists, so the class holds exactly that one value.
    let homopolymer: IdContext = "1C5".parse().unwrap();
    assert_eq!(index.num_of_class_values::<IdContextClasses>(&homopolymer), 1);

    Ok(())
}

#[test]
fn test_build_rejects_existing_directory() -> Result<()> {
    let dir = tempdir()?;
    let tmp = tempdir()?;

    let mut rng = StdRng::seed_from_u64(0);
    let err = build_id_context_index(
        &mut rng,
        dir.path(),
        vec![(1u8, b"ACGT".to_vec())],
        &BTreeSet::new(),
        5,
        tmp.path(),
        100_000,
        &mut Quiet,
    )
    .unwrap_err();
    assert!(matches!(err, ctxbank::CtxbankError::AlreadyExists { .. }));
    Ok(())
}

#[test]
fn test_build_sbs_context_index_end_to_end() -> Result<()> {
    let dir = tempdir()?;
    let tmp = tempdir()?;
    let index_dir = dir.path().join("idx");

    let mut rng = StdRng::seed_from_u64(0);
    let mut index = build_sbs_context_index(
        &mut rng,
        &index_dir,
        vec![(1u8, b"ACGTACGT".to_vec())],
        &BTreeSet::new(),
        1,
        tmp.path(),
        100_000,
        &mut Quiet,
    )?;

    assert_eq!(index.chromosome_lengths(), &BTreeMap::from([(1u8, 8u32)]));

    // Six windows: ACG CGT GTA TAC ACG CGT.
    let acg: ctxbank::SbsContext = "ACG".parse().unwrap();
    assert_eq!(index.num_of_values(&acg), 2);

    let total: u64 = index
        .get_keys()
        .iter()
        .map(|key| index.num_of_values(key))
        .sum();
    assert_eq!(total, 6);

    // Extraction drains the ACG bucket: positions 2 and 6.
    let rng_snapshot = StdRng::seed_from_u64(3);
    let mut positions = vec![
        index.extract(&rng_snapshot, &acg)?.position,
        index.extract(&rng_snapshot, &acg)?.position,
    ];
    positions.sort();
    assert_eq!(positions, vec![2, 6]);

    Ok(())
}
