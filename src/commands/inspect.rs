//! `inspect`: list the contexts of an index and their bucket sizes.

use anyhow::Result;
use clap::{Args, ValueEnum};
use rand::rngs::StdRng;
use std::path::PathBuf;

use ctxbank::repeats::IdContextIndex;
use ctxbank::sbs::SbsContextIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum IndexKind {
    /// Indel (repetition) context index
    Id,
    /// Single-base-substitution context index
    Sbs,
}

#[derive(Debug, Args)]
pub struct InspectArgs {
    /// Index directory
    #[arg(short, long)]
    pub index: PathBuf,

    /// Which kind of context index the directory holds
    #[arg(short, long, value_enum)]
    pub kind: IndexKind,

    /// Cache budget in bytes
    #[arg(short, long, default_value_t = 10_000_000)]
    pub cache: usize,
}

pub fn run_inspect(args: InspectArgs) -> Result<()> {
    match args.kind {
        IndexKind::Id => {
            let index: IdContextIndex<StdRng> = IdContextIndex::open(&args.index, args.cache)?;

            println!("max unit size: {}", index.max_unit_size());
            for (chr_id, length) in index.chromosome_lengths() {
                println!("chromosome {}: {} bp", chr_id, length);
            }
            println!("contexts: {}", index.num_of_keys());
            for key in index.get_keys() {
                println!("{}\t{}", key, index.num_of_values(&key));
            }
        }
        IndexKind::Sbs => {
            let index: SbsContextIndex<StdRng> = SbsContextIndex::open(&args.index, args.cache)?;

            for (chr_id, length) in index.chromosome_lengths() {
                println!("chromosome {}: {} bp", chr_id, length);
            }
            println!("contexts: {}", index.num_of_keys());
            for key in index.get_keys() {
                println!("{}\t{}", key, index.num_of_values(&key));
            }
        }
    }

    Ok(())
}
