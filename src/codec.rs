//! On-disk value encoding.
//!
//! Buckets are generic over the record type they store. A record only needs
//! to know how to write itself to and read itself back from a byte stream in
//! little-endian form. Types whose serialized footprint is the same for
//! every instance additionally implement [`ConstantSizeCodec`], which is
//! what unlocks random access, uniform `choose`, and uniform-start tours on
//! their buckets.

use std::io::{self, Read, Write};

/// A value that can be serialized into a bucket.
pub trait Codec: Sized {
    /// Serialized length in bytes when every instance occupies the same
    /// space on disk, `None` for variable-footprint types.
    const ENCODED_SIZE: Option<usize>;

    /// Write the little-endian serialized form.
    fn encode(&self, out: &mut impl Write) -> io::Result<()>;

    /// Read a value back from its serialized form.
    fn decode(input: &mut impl Read) -> io::Result<Self>;
}

/// Marker for codecs with a statically known footprint.
///
/// `SIZE` must equal `ENCODED_SIZE.unwrap()`.
pub trait ConstantSizeCodec: Codec {
    const SIZE: usize;
}

/// Cache-slot size used to convert byte budgets into value counts.
///
/// Constant-size codecs use their on-disk footprint; variable ones fall back
/// to the in-memory size as an estimate, never less than one byte.
pub(crate) fn slot_size<V: Codec>() -> usize {
    V::ENCODED_SIZE.unwrap_or_else(|| std::mem::size_of::<V>().max(1))
}

macro_rules! impl_int_codec {
    ($($ty:ty),*) => {
        $(
            impl Codec for $ty {
                const ENCODED_SIZE: Option<usize> = Some(std::mem::size_of::<$ty>());

                fn encode(&self, out: &mut impl Write) -> io::Result<()> {
                    out.write_all(&self.to_le_bytes())
                }

                fn decode(input: &mut impl Read) -> io::Result<Self> {
                    let mut buf = [0u8; std::mem::size_of::<$ty>()];
                    input.read_exact(&mut buf)?;
                    Ok(<$ty>::from_le_bytes(buf))
                }
            }

            impl ConstantSizeCodec for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();
            }
        )*
    };
}

impl_int_codec!(u8, u16, u32, u64, i32, i64);

/// Strings are u64-length-prefixed UTF-8; their footprint varies, so string
/// buckets only support sequential access.
impl Codec for String {
    const ENCODED_SIZE: Option<usize> = None;

    fn encode(&self, out: &mut impl Write) -> io::Result<()> {
        (self.len() as u64).encode(out)?;
        out.write_all(self.as_bytes())
    }

    fn decode(input: &mut impl Read) -> io::Result<Self> {
        let len = u64::decode(input)? as usize;
        let mut buf = vec![0u8; len];
        input.read_exact(&mut buf)?;
        String::from_utf8(buf)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}
