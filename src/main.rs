use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::build::{run_build_id, run_build_sbs, BuildIdArgs, BuildSbsArgs};
use commands::inspect::{run_inspect, InspectArgs};
use commands::sample::{run_sample, SampleArgs};

#[derive(Parser)]
#[command(name = "ctxbank")]
#[command(about = "Disk-backed index of genomic mutation contexts", long_about = None)]
struct Cli {
    /// Log to stderr (-v progress, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an indel (repetition) context index from a genome FASTA
    BuildId(BuildIdArgs),

    /// Build an SBS (trinucleotide) context index from a genome FASTA
    BuildSbs(BuildSbsArgs),

    /// List the contexts of an index and their bucket sizes
    Inspect(InspectArgs),

    /// Draw values from a context's bucket
    Sample(SampleArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    ctxbank::logging::init_logger(cli.verbose);

    match cli.command {
        Commands::BuildId(args) => run_build_id(args),
        Commands::BuildSbs(args) => run_build_sbs(args),
        Commands::Inspect(args) => run_inspect(args),
        Commands::Sample(args) => run_sample(args),
    }
}
