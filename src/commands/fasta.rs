//! FASTA input for the CLI.
//!
//! The index core consumes `(chromosome id, sequence)` pairs; this module
//! produces them from a FASTA file, mapping common chromosome header styles
//! (`1`, `chr1`, `chrX`, `MT`) onto numeric identifiers. Sequences whose
//! header does not look like a chromosome are skipped with a warning.

use anyhow::{Context, Result};
use needletail::parse_fastx_file;
use std::path::Path;

use ctxbank::genome::ChromosomeId;

/// Map a FASTA sequence header onto a chromosome identifier.
///
/// The first whitespace-separated token is used, a leading `chr` is
/// dropped, and `X`, `Y`, and `M`/`MT` become 23, 24, and 25.
pub fn decode_chromosome_name(header: &str) -> Option<ChromosomeId> {
    let token = header.split_whitespace().next()?;
    let name = token
        .strip_prefix("chr")
        .or_else(|| token.strip_prefix("CHR"))
        .unwrap_or(token);

    match name.to_ascii_uppercase().as_str() {
        "X" => Some(23),
        "Y" => Some(24),
        "M" | "MT" => Some(25),
        other => other.parse::<ChromosomeId>().ok().filter(|&n| n > 0),
    }
}

/// Load every chromosome of a FASTA file.
pub fn read_genome(path: &Path) -> Result<Vec<(ChromosomeId, Vec<u8>)>> {
    let mut reader = parse_fastx_file(path)
        .with_context(|| format!("Failed to open genome FASTA: {}", path.display()))?;

    let mut chromosomes = Vec::new();
    while let Some(record) = reader.next() {
        let record = record.context("Invalid FASTA record")?;
        let header = String::from_utf8_lossy(record.id()).to_string();

        match decode_chromosome_name(&header) {
            Some(chr_id) => chromosomes.push((chr_id, record.seq().into_owned())),
            None => log::warn!("skipping sequence '{}': not a chromosome header", header),
        }
    }

    Ok(chromosomes)
}
