//! Byte sources: random-access input of known length, and sequential
//! streams over one range of it.

pub mod planner;

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::error::{RankError, Result};

/// A randomly addressable byte source of known total length.
pub trait ByteSource {
    /// Total length in bytes.
    fn len(&self) -> u64;

    /// Read up to `buf.len()` bytes starting at `offset`.
    ///
    /// Returns 0 only at or past the end of the source.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A file on disk, read with seek + read.
pub struct FileSource {
    path: PathBuf,
    file: File,
    len: u64,
}

impl FileSource {
    /// Open a file as a byte source. Its length is fixed at open time.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = std::fs::metadata(&path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                RankError::FileNotFound(path.clone())
            } else {
                RankError::io(&path, e)
            }
        })?;
        let file = File::open(&path).map_err(|e| RankError::io(&path, e))?;
        Ok(Self {
            path,
            file,
            len: metadata.len(),
        })
    }

    /// Path to the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ByteSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read(buf)
    }
}

impl ByteSource for [u8] {
    fn len(&self) -> u64 {
        <[u8]>::len(self) as u64
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let data: &[u8] = self;
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }
}

impl ByteSource for Vec<u8> {
    fn len(&self) -> u64 {
        self.as_slice().len() as u64
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.as_mut_slice().read_at(offset, buf)
    }
}

/// Fill as much of `buf` as the source allows, retrying short reads.
pub(crate) fn read_full<S: ByteSource + ?Sized>(
    source: &mut S,
    offset: u64,
    buf: &mut [u8],
) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read_at(offset + filled as u64, &mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Sequential reader over exactly `[start, end)` of a source.
pub struct RangeReader<'a, S: ByteSource + ?Sized> {
    source: &'a mut S,
    pos: u64,
    end: u64,
}

impl<'a, S: ByteSource + ?Sized> RangeReader<'a, S> {
    pub fn new(source: &'a mut S, range: std::ops::Range<u64>) -> Self {
        trace!(start = range.start, end = range.end, "Opening range reader");
        Self {
            source,
            pos: range.start,
            end: range.end.max(range.start),
        }
    }

    /// Offset of the next byte to be read.
    pub fn position(&self) -> u64 {
        self.pos
    }
}

impl<S: ByteSource + ?Sized> Read for RangeReader<'_, S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.end || buf.is_empty() {
            return Ok(0);
        }
        let want = (self.end - self.pos).min(buf.len() as u64) as usize;
        let n = self.source.read_at(self.pos, &mut buf[..want])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("source ended at {} before range end {}", self.pos, self.end),
            ));
        }
        self.pos += n as u64;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_read_at() {
        let mut data = b"hello world".to_vec();
        let mut buf = [0u8; 5];
        assert_eq!(data.read_at(6, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"world");
        assert_eq!(data.read_at(11, &mut buf).unwrap(), 0);
        assert_eq!(data.read_at(400, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_range_reader_stays_in_range() {
        let mut data = b"0123456789".to_vec();
        let mut reader = RangeReader::new(&mut data, 2..7);
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "23456");
        assert_eq!(reader.position(), 7);
    }

    #[test]
    fn test_range_reader_past_end_of_source() {
        let mut data = b"0123".to_vec();
        let mut reader = RangeReader::new(&mut data, 2..10);
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_file_source() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("a.mbox");
        std::fs::write(&path, b"From a\nFrom: a@b.c\n").unwrap();
        let mut source = FileSource::open(&path).unwrap();
        assert_eq!(source.len(), 19);
        let mut buf = [0u8; 4];
        assert_eq!(read_full(&mut source, 7, &mut buf).unwrap(), 4);
        assert_eq!(&buf, b"From");
    }

    #[test]
    fn test_file_source_missing() {
        let err = FileSource::open("/definitely/not/here.mbox").err().unwrap();
        assert!(matches!(err, RankError::FileNotFound(_)));
    }
}
