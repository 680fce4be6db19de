//! Mutation context keys and the records stored under them.
//!
//! Two key families index the genome:
//!
//! - [`IdContext`] classifies loci for insertions/deletions: a repeated
//!   sequence type (homopolymer, heteropolymer, or microhomology) plus two
//!   level codes. Its textual form is `{number}{A,C,G,T,R,M}{number}`, e.g.
//!   `1A5` (five `A`s), `2R4` (a 2-base unit repeated four times), `3M2`
//!   (a microhomology of size 2 at distance 3).
//! - [`SbsContext`] classifies loci for single-base substitutions: the
//!   trinucleotide surrounding a position, e.g. `ACA`.
//!
//! [`RepetitionReference`] is the fixed-footprint record an indel index
//! stores: where the repeated sequence starts and how long its unit is.

use std::fmt;
use std::io::{self, Read, Write};
use std::str::FromStr;

use crate::codec::{Codec, ConstantSizeCodec};
use crate::error::CtxbankError;
use crate::genome::{ChrPosition, ChromosomeId, GenomicPosition};

/// Watson-Crick complement of an upper-case base. Anything that is not a
/// DNA base is returned unchanged.
pub fn complement(base: u8) -> u8 {
    match base {
        b'A' => b'T',
        b'C' => b'G',
        b'G' => b'C',
        b'T' => b'A',
        other => other,
    }
}

/// True for the four upper-case DNA bases.
pub fn is_dna_base(base: u8) -> bool {
    matches!(base, b'A' | b'C' | b'G' | b'T')
}

// ============================================================================
// IdContext
// ============================================================================

/// The kind of repeated sequence an indel context describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FragmentType {
    /// A repeated sequence whose nucleotides are all the same.
    Homopolymer,
    /// A repeated sequence whose nucleotides may differ.
    Heteropolymer,
    /// A fragment followed by a sequence matching its prefix.
    Microhomology,
}

/// An indel context: fragment type plus two level codes.
///
/// For homopolymers the first level code is the unit base (ASCII); for
/// heteropolymers and microhomologies it is the unit size. The second level
/// code is the number of repetitions for polymers and the homology size for
/// microhomologies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IdContext {
    ftype: FragmentType,
    fl_code: u8,
    sl_code: u8,
}

impl IdContext {
    pub fn for_homopolymer(unit_base: u8, num_of_repetitions: u8) -> Self {
        debug_assert!(is_dna_base(unit_base));
        Self {
            ftype: FragmentType::Homopolymer,
            fl_code: unit_base,
            sl_code: num_of_repetitions,
        }
    }

    pub fn for_heteropolymer(unit_size: u8, num_of_repetitions: u8) -> Self {
        Self {
            ftype: FragmentType::Heteropolymer,
            fl_code: unit_size,
            sl_code: num_of_repetitions,
        }
    }

    pub fn for_microhomology(homology_distance: u8, homology_size: u8) -> Self {
        Self {
            ftype: FragmentType::Microhomology,
            fl_code: homology_distance,
            sl_code: homology_size,
        }
    }

    pub fn fragment_type(&self) -> FragmentType {
        self.ftype
    }

    pub fn first_level_code(&self) -> u8 {
        self.fl_code
    }

    pub fn second_level_code(&self) -> u8 {
        self.sl_code
    }

    /// The unit base of a homopolymer.
    pub fn unit_base(&self) -> Option<u8> {
        match self.ftype {
            FragmentType::Homopolymer => Some(self.fl_code),
            _ => None,
        }
    }

    /// The unit size of a heteropolymer or microhomology.
    pub fn unit_size(&self) -> Option<u8> {
        match self.ftype {
            FragmentType::Homopolymer => None,
            _ => Some(self.fl_code),
        }
    }

    /// The number of repetitions of a homo- or heteropolymer.
    pub fn num_of_repetitions(&self) -> Option<u8> {
        match self.ftype {
            FragmentType::Microhomology => None,
            _ => Some(self.sl_code),
        }
    }

    /// The homology size of a microhomology.
    pub fn microhomology_size(&self) -> Option<u8> {
        match self.ftype {
            FragmentType::Microhomology => Some(self.sl_code),
            _ => None,
        }
    }
}

impl fmt::Display for IdContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ftype {
            FragmentType::Homopolymer => {
                write!(f, "1{}{}", self.fl_code as char, self.sl_code)
            }
            FragmentType::Heteropolymer => write!(f, "{}R{}", self.fl_code, self.sl_code),
            FragmentType::Microhomology => write!(f, "{}M{}", self.fl_code, self.sl_code),
        }
    }
}

impl FromStr for IdContext {
    type Err = CtxbankError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || {
            CtxbankError::invalid_argument(format!(
                "\"{}\" does not represent an indel context: expected \
                 {{number}}{{A,C,G,T,R,M}}{{number}}",
                s
            ))
        };

        let bytes = s.as_bytes();
        let digits = bytes.iter().take_while(|b| b.is_ascii_digit()).count();
        if digits == 0 || digits + 1 > bytes.len() {
            return Err(malformed());
        }

        let num1: u8 = s[..digits].parse().map_err(|_| malformed())?;
        let kind = bytes[digits];
        let num2: u8 = s[digits + 1..].parse().map_err(|_| malformed())?;

        match kind.to_ascii_uppercase() {
            base @ (b'A' | b'C' | b'G' | b'T') => Ok(Self::for_homopolymer(base, num2)),
            b'R' => Ok(Self::for_heteropolymer(num1, num2)),
            b'M' => Ok(Self::for_microhomology(num1, num2)),
            _ => Err(malformed()),
        }
    }
}

impl Codec for IdContext {
    const ENCODED_SIZE: Option<usize> = Some(3);

    fn encode(&self, out: &mut impl Write) -> io::Result<()> {
        let ftype = match self.ftype {
            FragmentType::Homopolymer => 0u8,
            FragmentType::Heteropolymer => 1,
            FragmentType::Microhomology => 2,
        };
        ftype.encode(out)?;
        self.fl_code.encode(out)?;
        self.sl_code.encode(out)
    }

    fn decode(input: &mut impl Read) -> io::Result<Self> {
        let ftype = match u8::decode(input)? {
            0 => FragmentType::Homopolymer,
            1 => FragmentType::Heteropolymer,
            2 => FragmentType::Microhomology,
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unknown fragment type code {}", other),
                ))
            }
        };
        let fl_code = u8::decode(input)?;
        let sl_code = u8::decode(input)?;
        Ok(Self {
            ftype,
            fl_code,
            sl_code,
        })
    }
}

impl ConstantSizeCodec for IdContext {
    const SIZE: usize = 3;
}

// ============================================================================
// RepetitionReference
// ============================================================================

/// Where a repeated sequence starts and how long its unit is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RepetitionReference {
    /// First base of the repeated sequence.
    pub position: GenomicPosition,
    /// Unit size for polymers, homology size for microhomologies.
    pub unit_size: u8,
}

impl RepetitionReference {
    /// `unit_size` must be at least 1.
    pub fn new(chr_id: ChromosomeId, begin: ChrPosition, unit_size: u8) -> Self {
        debug_assert!(unit_size > 0);
        Self {
            position: GenomicPosition::new(chr_id, begin),
            unit_size,
        }
    }
}

impl fmt::Display for RepetitionReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.unit_size, self.position)
    }
}

impl Codec for RepetitionReference {
    const ENCODED_SIZE: Option<usize> = Some(6);

    fn encode(&self, out: &mut impl Write) -> io::Result<()> {
        self.position.encode(out)?;
        self.unit_size.encode(out)
    }

    fn decode(input: &mut impl Read) -> io::Result<Self> {
        let position = GenomicPosition::decode(input)?;
        let unit_size = u8::decode(input)?;
        Ok(Self {
            position,
            unit_size,
        })
    }
}

impl ConstantSizeCodec for RepetitionReference {
    const SIZE: usize = 6;
}

// ============================================================================
// SbsContext
// ============================================================================

/// A trinucleotide context, packed two bits per base into a single code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SbsContext {
    code: u8,
}

fn base_to_bits(base: u8) -> Option<u8> {
    match base {
        b'A' => Some(0),
        b'C' => Some(1),
        b'G' => Some(2),
        b'T' => Some(3),
        _ => None,
    }
}

fn bits_to_base(bits: u8) -> u8 {
    match bits & 0b11 {
        0 => b'A',
        1 => b'C',
        2 => b'G',
        _ => b'T',
    }
}

impl SbsContext {
    /// Build a context from three upper-case DNA bases; `None` if any byte
    /// is not a base.
    pub fn from_bases(bases: [u8; 3]) -> Option<Self> {
        let b0 = base_to_bits(bases[0])?;
        let b1 = base_to_bits(bases[1])?;
        let b2 = base_to_bits(bases[2])?;
        Some(Self {
            code: (b0 << 4) | (b1 << 2) | b2,
        })
    }

    /// The packed context code, in `0..64`.
    pub fn code(&self) -> u8 {
        self.code
    }

    pub fn bases(&self) -> [u8; 3] {
        [
            bits_to_base(self.code >> 4),
            bits_to_base(self.code >> 2),
            bits_to_base(self.code),
        ]
    }

    /// The context read on the opposite strand.
    pub fn reverse_complement(&self) -> Self {
        let bases = self.bases();
        Self::from_bases([
            complement(bases[2]),
            complement(bases[1]),
            complement(bases[0]),
        ])
        .expect("complement of a DNA base is a DNA base")
    }
}

impl fmt::Display for SbsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bases = self.bases();
        write!(
            f,
            "{}{}{}",
            bases[0] as char, bases[1] as char, bases[2] as char
        )
    }
}

impl FromStr for SbsContext {
    type Err = CtxbankError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != 3 {
            return Err(CtxbankError::invalid_argument(format!(
                "\"{}\" is not a trinucleotide context",
                s
            )));
        }
        Self::from_bases([
            bytes[0].to_ascii_uppercase(),
            bytes[1].to_ascii_uppercase(),
            bytes[2].to_ascii_uppercase(),
        ])
        .ok_or_else(|| {
            CtxbankError::invalid_argument(format!("\"{}\" contains a non-DNA base", s))
        })
    }
}

impl Codec for SbsContext {
    const ENCODED_SIZE: Option<usize> = Some(1);

    fn encode(&self, out: &mut impl Write) -> io::Result<()> {
        self.code.encode(out)
    }

    fn decode(input: &mut impl Read) -> io::Result<Self> {
        let code = u8::decode(input)?;
        if code >= 64 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid trinucleotide code {}", code),
            ));
        }
        Ok(Self { code })
    }
}

impl ConstantSizeCodec for SbsContext {
    const SIZE: usize = 1;
}

// ============================================================================
// Tests
// ============================================================================
