//! Minimal genomic coordinate types.
//!
//! Positions are 1-based within a chromosome. These types are the narrow
//! slice of the genome model the index needs: a fixed-footprint position
//! record, and regions used to mask parts of a chromosome during scanning.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::{self, Read, Write};

use crate::archive::{ArchiveReader, ArchiveWriter};
use crate::codec::{Codec, ConstantSizeCodec};
use crate::error::Result;

/// Numeric chromosome identifier.
pub type ChromosomeId = u8;

/// 1-based position within a chromosome.
pub type ChrPosition = u32;

/// A position in the genome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GenomicPosition {
    pub chr_id: ChromosomeId,
    pub position: ChrPosition,
}

impl GenomicPosition {
    pub fn new(chr_id: ChromosomeId, position: ChrPosition) -> Self {
        Self { chr_id, position }
    }
}

impl fmt::Display for GenomicPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chr_id, self.position)
    }
}

impl Codec for GenomicPosition {
    const ENCODED_SIZE: Option<usize> = Some(5);

    fn encode(&self, out: &mut impl Write) -> io::Result<()> {
        self.chr_id.encode(out)?;
        self.position.encode(out)
    }

    fn decode(input: &mut impl Read) -> io::Result<Self> {
        let chr_id = u8::decode(input)?;
        let position = u32::decode(input)?;
        Ok(Self { chr_id, position })
    }
}

impl ConstantSizeCodec for GenomicPosition {
    const SIZE: usize = 5;
}

/// A contiguous stretch of a chromosome, `length` bases from `begin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GenomicRegion {
    position: GenomicPosition,
    length: ChrPosition,
}

impl GenomicRegion {
    /// `length` must be at least 1; a region always covers its begin base.
    pub fn new(chr_id: ChromosomeId, begin: ChrPosition, length: ChrPosition) -> Self {
        Self {
            position: GenomicPosition::new(chr_id, begin),
            length: length.max(1),
        }
    }

    pub fn chromosome_id(&self) -> ChromosomeId {
        self.position.chr_id
    }

    /// 1-based position of the first covered base.
    pub fn begin(&self) -> ChrPosition {
        self.position.position
    }

    /// 1-based position of the last covered base.
    pub fn end(&self) -> ChrPosition {
        self.position.position + self.length - 1
    }

    pub fn length(&self) -> ChrPosition {
        self.length
    }

    pub fn contains(&self, pos: &GenomicPosition) -> bool {
        self.position.chr_id == pos.chr_id
            && self.begin() <= pos.position
            && pos.position <= self.end()
    }

    pub fn ends_before(&self, pos: &GenomicPosition) -> bool {
        self.position.chr_id < pos.chr_id
            || (self.position.chr_id == pos.chr_id && self.end() < pos.position)
    }
}

impl fmt::Display for GenomicRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}-{}",
            self.position.chr_id,
            self.begin(),
            self.end()
        )
    }
}

/// Group a set of regions by chromosome.
pub fn split_by_chromosome(
    regions: &BTreeSet<GenomicRegion>,
) -> BTreeMap<ChromosomeId, BTreeSet<GenomicRegion>> {
    let mut split: BTreeMap<ChromosomeId, BTreeSet<GenomicRegion>> = BTreeMap::new();
    for region in regions {
        split
            .entry(region.chromosome_id())
            .or_default()
            .insert(*region);
    }
    split
}

/// Write a chromosome-length map into an open archive.
pub(crate) fn write_chr_lengths(
    archive: &mut ArchiveWriter,
    lengths: &BTreeMap<ChromosomeId, ChrPosition>,
) -> Result<()> {
    archive.write_u64(lengths.len() as u64)?;
    for (chr_id, length) in lengths {
        archive.write_u8(*chr_id)?;
        archive.write_u32(*length)?;
    }
    Ok(())
}

/// Read a chromosome-length map from an open archive.
pub(crate) fn read_chr_lengths(
    archive: &mut ArchiveReader,
) -> Result<BTreeMap<ChromosomeId, ChrPosition>> {
    let entries = archive.read_u64()?;
    let mut lengths = BTreeMap::new();
    for _ in 0..entries {
        let chr_id = archive.read_u8()?;
        let length = archive.read_u32()?;
        lengths.insert(chr_id, length);
    }
    Ok(lengths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_position_codec_roundtrip() {
        let pos = GenomicPosition::new(17, 123_456_789);
        let mut buf = Vec::new();
        pos.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), GenomicPosition::SIZE);
        assert_eq!(GenomicPosition::decode(&mut Cursor::new(buf)).unwrap(), pos);
    }

    #[test]
    fn test_region_bounds() {
        let region = GenomicRegion::new(3, 100, 50);
        assert_eq!(region.begin(), 100);
        assert_eq!(region.end(), 149);

        assert!(region.contains(&GenomicPosition::new(3, 100)));
        assert!(region.contains(&GenomicPosition::new(3, 149)));
        assert!(!region.contains(&GenomicPosition::new(3, 150)));
        assert!(!region.contains(&GenomicPosition::new(4, 120)));

        assert!(region.ends_before(&GenomicPosition::new(3, 150)));
        assert!(!region.ends_before(&GenomicPosition::new(3, 149)));
        assert!(region.ends_before(&GenomicPosition::new(4, 1)));
    }

    #[test]
    fn test_split_by_chromosome() {
        let mut regions = BTreeSet::new();
        regions.insert(GenomicRegion::new(1, 10, 5));
        regions.insert(GenomicRegion::new(1, 100, 5));
        regions.insert(GenomicRegion::new(2, 10, 5));

        let split = split_by_chromosome(&regions);
        assert_eq!(split.len(), 2);
        assert_eq!(split[&1].len(), 2);
        assert_eq!(split[&2].len(), 1);
    }
}
