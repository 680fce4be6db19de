use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use crate::genome::GenomicRegion;

/// Skip-region file: regions of the genome the scanners must not touch
/// (assembly gaps, decoys, blacklisted intervals).
///
/// ```toml
/// [[skip]]
/// chromosome = 5
/// begin = 100000
/// length = 5000
/// ```
#[derive(Debug, Deserialize)]
pub struct SkipRegionsFile {
    #[serde(default)]
    pub skip: Vec<SkipRegionEntry>,
}

#[derive(Debug, Deserialize)]
pub struct SkipRegionEntry {
    pub chromosome: u8,
    pub begin: u32,
    pub length: u32,
}

/// Parse and validate a skip-region TOML file.
pub fn parse_skip_regions(path: &Path) -> Result<BTreeSet<GenomicRegion>> {
    let contents = fs::read_to_string(path)
        .context(format!("Failed to read skip-region file: {}", path.display()))?;

    let file: SkipRegionsFile =
        toml::from_str(&contents).context("Failed to parse TOML skip-region file")?;

    let mut regions = BTreeSet::new();
    for (i, entry) in file.skip.iter().enumerate() {
        if entry.begin == 0 {
            return Err(anyhow!(
                "skip entry #{}: positions are 1-based, begin must be >= 1",
                i + 1
            ));
        }
        if entry.length == 0 {
            return Err(anyhow!("skip entry #{}: length must be >= 1", i + 1));
        }
        regions.insert(GenomicRegion::new(entry.chromosome, entry.begin, entry.length));
    }

    Ok(regions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_parse_regions() {
        let file = write_file(
            "[[skip]]\nchromosome = 5\nbegin = 100\nlength = 50\n\n\
             [[skip]]\nchromosome = 1\nbegin = 7\nlength = 1\n",
        );
        let regions = parse_skip_regions(file.path()).unwrap();
        assert_eq!(regions.len(), 2);
        let first = regions.iter().next().unwrap();
        assert_eq!(first.chromosome_id(), 1);
        assert_eq!(first.begin(), 7);
    }

    #[test]
    fn test_empty_file_is_empty_set() {
        let file = write_file("");
        assert!(parse_skip_regions(file.path()).unwrap().is_empty());
    }

    #[test]
    fn test_zero_begin_is_rejected() {
        let file = write_file("[[skip]]\nchromosome = 1\nbegin = 0\nlength = 5\n");
        assert!(parse_skip_regions(file.path()).is_err());
    }
}
