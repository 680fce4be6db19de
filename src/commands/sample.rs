//! `sample`: draw values from a context's bucket.

use anyhow::{Context, Result};
use clap::Args;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;

use super::inspect::IndexKind;
use ctxbank::context::{IdContext, SbsContext};
use ctxbank::repeats::IdContextIndex;
use ctxbank::sbs::SbsContextIndex;

#[derive(Debug, Args)]
pub struct SampleArgs {
    /// Index directory
    #[arg(short, long)]
    pub index: PathBuf,

    /// Which kind of context index the directory holds
    #[arg(short, long, value_enum)]
    pub kind: IndexKind,

    /// The context to sample, e.g. `2R4` or `ACA`
    #[arg(long)]
    pub context: String,

    /// How many values to draw
    #[arg(short = 'n', long, default_value_t = 1)]
    pub count: usize,

    /// Draw with replacement instead of extracting without replacement
    #[arg(long)]
    pub with_replacement: bool,

    /// Seed of the sampling random number generator
    #[arg(short, long, default_value_t = 0)]
    pub seed: u64,

    /// Cache budget in bytes
    #[arg(short, long, default_value_t = 10_000_000)]
    pub cache: usize,
}

pub fn run_sample(args: SampleArgs) -> Result<()> {
    let mut rng = StdRng::seed_from_u64(args.seed);

    match args.kind {
        IndexKind::Id => {
            let key: IdContext = args
                .context
                .parse()
                .with_context(|| format!("'{}' is not an indel context", args.context))?;
            let mut index: IdContextIndex<StdRng> = IdContextIndex::open(&args.index, args.cache)?;

            for _ in 0..args.count {
                let value = if args.with_replacement {
                    index.choose(&mut rng, &key)?
                } else {
                    index.extract(&rng, &key)?
                };
                println!("{}", value);
            }
        }
        IndexKind::Sbs => {
            let key: SbsContext = args
                .context
                .parse()
                .with_context(|| format!("'{}' is not an SBS context", args.context))?;
            let mut index: SbsContextIndex<StdRng> = SbsContextIndex::open(&args.index, args.cache)?;

            for _ in 0..args.count {
                let value = if args.with_replacement {
                    index.choose(&mut rng, &key)?
                } else {
                    index.extract(&rng, &key)?
                };
                println!("{}", value);
            }
        }
    }

    Ok(())
}
