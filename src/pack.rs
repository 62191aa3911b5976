//! Append-only packed blob writer.
//!
//! The blob has no in-band framing: it is the plain concatenation of the
//! appended payloads, and the returned [`Span`]s are the only index into it.

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

/// Chunk size used when hashing a finished blob.
pub const CHECKSUM_CHUNK_SIZE: usize = 1024;

/// Half-open byte range `[start, end)` inside a packed blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: u64,
    pub end:   u64,
}

impl Span {
    #[inline]
    pub fn len(&self) -> u64 { self.end - self.start }

    #[inline]
    pub fn is_empty(&self) -> bool { self.end <= self.start }
}

pub struct PackWriter<W: Write> {
    writer:   W,
    position: u64,
}

impl PackWriter<BufWriter<File>> {
    /// Create (or truncate) the blob file at `path`.
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> PackWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, position: 0 }
    }

    /// Bytes written so far.
    #[inline]
    pub fn position(&self) -> u64 { self.position }

    /// Append `bytes` and return the span they occupy.  Spans from one writer
    /// are contiguous and strictly increasing.
    pub fn append(&mut self, bytes: &[u8]) -> io::Result<Span> {
        if bytes.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "cannot append an empty entry"));
        }
        let start = self.position;
        self.writer.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(Span { start, end: self.position })
    }

    /// Flush and hand back the underlying writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Lowercase hex MD5 of everything `reader` yields, read in
/// [`CHECKSUM_CHUNK_SIZE`] chunks.
pub fn md5_hex<R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = Md5::new();
    let mut buf    = [0u8; CHECKSUM_CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

pub fn md5_file<P: AsRef<Path>>(path: P) -> io::Result<String> {
    md5_hex(File::open(path)?)
}
