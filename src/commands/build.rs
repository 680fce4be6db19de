//! `build-id` and `build-sbs`: scan a genome FASTA into a context index.

use anyhow::{Context, Result};
use clap::Args;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeSet;
use std::path::PathBuf;

use ctxbank::config::parse_skip_regions;
use ctxbank::genome::GenomicRegion;
use ctxbank::progress::LogProgress;
use ctxbank::repeats::{build_id_context_index, DEFAULT_MAX_UNIT_SIZE};
use ctxbank::sbs::build_sbs_context_index;

#[derive(Debug, Args)]
pub struct CommonBuildArgs {
    /// Genome FASTA file (plain or gzipped)
    #[arg(short, long)]
    pub genome: PathBuf,

    /// Directory the index is created in; must not exist yet
    #[arg(short, long)]
    pub output: PathBuf,

    /// Cache budget in bytes, split over the context buckets
    #[arg(short, long, default_value_t = 10_000_000)]
    pub cache: usize,

    /// Directory for temporary shuffle files (defaults to the system one)
    #[arg(long)]
    pub tmp_dir: Option<PathBuf>,

    /// Seed of the shuffling random number generator
    #[arg(short, long, default_value_t = 0)]
    pub seed: u64,

    /// TOML file listing genomic regions to skip
    #[arg(long)]
    pub skip: Option<PathBuf>,
}

impl CommonBuildArgs {
    fn skip_regions(&self) -> Result<BTreeSet<GenomicRegion>> {
        match &self.skip {
            Some(path) => parse_skip_regions(path),
            None => Ok(BTreeSet::new()),
        }
    }

    fn tmp_dir(&self) -> PathBuf {
        self.tmp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

#[derive(Debug, Args)]
pub struct BuildIdArgs {
    #[command(flatten)]
    pub common: CommonBuildArgs,

    /// Largest repetition unit searched for
    #[arg(long, default_value_t = DEFAULT_MAX_UNIT_SIZE)]
    pub max_unit_size: u8,
}

pub fn run_build_id(args: BuildIdArgs) -> Result<()> {
    let regions = args.common.skip_regions()?;
    let chromosomes = super::fasta::read_genome(&args.common.genome)?;
    let mut rng = StdRng::seed_from_u64(args.common.seed);
    let mut progress = LogProgress::new("Building indel context index");

    let index = build_id_context_index(
        &mut rng,
        &args.common.output,
        chromosomes,
        &regions,
        args.max_unit_size,
        &args.common.tmp_dir(),
        args.common.cache,
        &mut progress,
    )
    .with_context(|| {
        format!(
            "failed to build the indel context index in {}",
            args.common.output.display()
        )
    })?;

    let total: u64 = index
        .get_keys()
        .iter()
        .map(|key| index.num_of_values(key))
        .sum();
    println!(
        "Indexed {} repetition references under {} contexts in {}",
        total,
        index.num_of_keys(),
        args.common.output.display()
    );
    Ok(())
}

#[derive(Debug, Args)]
pub struct BuildSbsArgs {
    #[command(flatten)]
    pub common: CommonBuildArgs,

    /// Record one context occurrence out of this many
    #[arg(long, default_value_t = 1)]
    pub sampling_delta: u8,
}

pub fn run_build_sbs(args: BuildSbsArgs) -> Result<()> {
    let regions = args.common.skip_regions()?;
    let chromosomes = super::fasta::read_genome(&args.common.genome)?;
    let mut rng = StdRng::seed_from_u64(args.common.seed);
    let mut progress = LogProgress::new("Building SBS context index");

    let index = build_sbs_context_index(
        &mut rng,
        &args.common.output,
        chromosomes,
        &regions,
        args.sampling_delta,
        &args.common.tmp_dir(),
        args.common.cache,
        &mut progress,
    )
    .with_context(|| {
        format!(
            "failed to build the SBS context index in {}",
            args.common.output.display()
        )
    })?;

    let total: u64 = index
        .get_keys()
        .iter()
        .map(|key| index.num_of_values(key))
        .sum();
    println!(
        "Indexed {} positions under {} contexts in {}",
        total,
        index.num_of_keys(),
        args.common.output.display()
    );
    Ok(())
}
