//! Little-endian binary archives with magic/version headers.
//!
//! Every persistent file in a context bank (bucket files, the index map
//! file, the per-index data trailers) is written and read through the two
//! types in this module. An archive is a thin, buffered cursor over a file:
//! typed little-endian primitives, u64-length-prefixed strings, and a header
//! consisting of an ASCII magic string followed by a single version byte.
//!
//! No partial-write recovery is attempted anywhere; failures surface to the
//! caller with the path and the operation that failed.

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{CtxbankError, Result};

/// Map a read failure to the library error, turning a clean EOF into a
/// format error: running out of bytes mid-record means the file is shorter
/// than its own header claims.
pub(crate) fn map_read_err(path: &Path, operation: &'static str, err: io::Error) -> CtxbankError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        CtxbankError::format(path, format!("unexpected end of file during {}", operation))
    } else {
        CtxbankError::io(path, operation, err)
    }
}

// ============================================================================
// ArchiveReader
// ============================================================================

/// A read-only archive over an existing file.
#[derive(Debug)]
pub struct ArchiveReader {
    path: PathBuf,
    inner: BufReader<File>,
    len: u64,
}

impl ArchiveReader {
    /// Open an existing file for reading.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                CtxbankError::not_found(&path)
            } else {
                CtxbankError::io(&path, "open", e)
            }
        })?;
        let len = file
            .metadata()
            .map_err(|e| CtxbankError::io(&path, "stat", e))?
            .len();

        Ok(Self {
            path,
            inner: BufReader::new(file),
            len,
        })
    }

    /// Read and validate a magic string and version byte.
    pub fn read_header(&mut self, magic: &str, version: u8) -> Result<()> {
        let mut found = vec![0u8; magic.len()];
        self.inner
            .read_exact(&mut found)
            .map_err(|e| map_read_err(&self.path, "read header", e))?;
        if found != magic.as_bytes() {
            return Err(CtxbankError::format(
                &self.path,
                format!(
                    "bad magic (expected {:?}, found {:?})",
                    magic,
                    String::from_utf8_lossy(&found)
                ),
            ));
        }

        let found_version = self.read_u8()?;
        if found_version != version {
            return Err(CtxbankError::format(
                &self.path,
                format!(
                    "unsupported version {} (expected {})",
                    found_version, version
                ),
            ));
        }

        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.inner
            .read_exact(&mut buf)
            .map_err(|e| map_read_err(&self.path, "read u8", e))?;
        Ok(buf[0])
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.inner
            .read_exact(&mut buf)
            .map_err(|e| map_read_err(&self.path, "read u32", e))?;
        Ok(u32::from_le_bytes(buf))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.inner
            .read_exact(&mut buf)
            .map_err(|e| map_read_err(&self.path, "read u64", e))?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Read a u64-length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_u64()? as usize;
        let mut buf = vec![0u8; len];
        self.inner
            .read_exact(&mut buf)
            .map_err(|e| map_read_err(&self.path, "read string", e))?;
        String::from_utf8(buf)
            .map_err(|_| CtxbankError::format(&self.path, "string is not valid UTF-8"))
    }

    /// Current byte offset of the cursor.
    pub fn tell(&mut self) -> Result<u64> {
        self.inner
            .stream_position()
            .map_err(|e| CtxbankError::io(&self.path, "tell", e))
    }

    /// Move the cursor to an absolute byte offset.
    pub fn seek_to(&mut self, pos: u64) -> Result<()> {
        self.inner
            .seek(SeekFrom::Start(pos))
            .map_err(|e| CtxbankError::io(&self.path, "seek", e))?;
        Ok(())
    }

    /// Total byte length of the file at open time.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Read for ArchiveReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

// ============================================================================
// ArchiveWriter
// ============================================================================

/// A writable archive over a file.
pub struct ArchiveWriter {
    path: PathBuf,
    inner: BufWriter<File>,
}

impl ArchiveWriter {
    /// Create the file, truncating any previous content.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|e| CtxbankError::io(&path, "create", e))?;

        Ok(Self {
            path,
            inner: BufWriter::new(file),
        })
    }

    /// Open an existing file for read-write updates without truncation.
    pub fn update(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| {
                if e.kind() == io::ErrorKind::NotFound {
                    CtxbankError::not_found(&path)
                } else {
                    CtxbankError::io(&path, "open", e)
                }
            })?;

        Ok(Self {
            path,
            inner: BufWriter::new(file),
        })
    }

    /// Write a magic string and version byte at the current position.
    pub fn write_header(&mut self, magic: &str, version: u8) -> Result<()> {
        self.write_bytes(magic.as_bytes())?;
        self.write_u8(version)
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_bytes(&[value])
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Write a u64-length-prefixed UTF-8 string.
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_u64(value.len() as u64)?;
        self.write_bytes(value.as_bytes())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner
            .write_all(bytes)
            .map_err(|e| CtxbankError::io(&self.path, "write", e))
    }

    /// Current byte offset of the cursor.
    pub fn tell(&mut self) -> Result<u64> {
        self.inner
            .stream_position()
            .map_err(|e| CtxbankError::io(&self.path, "tell", e))
    }

    /// Move the cursor to an absolute byte offset. Buffered bytes are
    /// flushed first.
    pub fn seek_to(&mut self, pos: u64) -> Result<()> {
        self.inner
            .seek(SeekFrom::Start(pos))
            .map_err(|e| CtxbankError::io(&self.path, "seek", e))?;
        Ok(())
    }

    /// Move the cursor to the end of the file and return the offset.
    pub fn seek_end(&mut self) -> Result<u64> {
        self.inner
            .seek(SeekFrom::End(0))
            .map_err(|e| CtxbankError::io(&self.path, "seek", e))
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner
            .flush()
            .map_err(|e| CtxbankError::io(&self.path, "flush", e))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Write for ArchiveWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

// ============================================================================
// Tests
// ============================================================================
