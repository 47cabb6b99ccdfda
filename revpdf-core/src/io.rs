//! Seekable storage used by the cross-reference writer
//!
//! [`PdfStorage`] is the byte-addressable stream a PDF lives in. It adds
//! the line and range helpers the xref machinery needs on top of
//! `Read + Write + Seek`, plus truncation so a shorter save can drop the
//! stale tail of a longer one.

use std::fs::{File, OpenOptions};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

const LINE_CHUNK: usize = 256;

/// Seekable read/write stream holding a PDF file
pub trait PdfStorage: Read + Write + Seek {
    /// Cut the stream at `len` bytes
    fn truncate(&mut self, len: u64) -> io::Result<()>;

    fn get_pos(&mut self) -> io::Result<u64> {
        self.stream_position()
    }

    fn set_pos(&mut self, pos: u64) -> io::Result<()> {
        self.seek(SeekFrom::Start(pos)).map(|_| ())
    }

    /// Rewind to the first byte
    fn reset(&mut self) -> io::Result<()> {
        self.set_pos(0)
    }

    /// Total length in bytes; the current position is kept
    fn len(&mut self) -> io::Result<u64> {
        let pos = self.stream_position()?;
        let end = self.seek(SeekFrom::End(0))?;
        self.seek(SeekFrom::Start(pos))?;
        Ok(end)
    }

    fn is_empty(&mut self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Read one line without its terminator (CR, LF or CRLF)
    ///
    /// Returns `None` at end of stream. The position is left just past the
    /// terminator.
    fn get_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        read_line(self)
    }

    /// Copy `[from, to)` into `out`, returning the number of bytes copied
    fn clone_range(&mut self, out: &mut dyn Write, from: u64, to: u64) -> io::Result<u64> {
        self.set_pos(from)?;
        let wanted = to.saturating_sub(from);
        let copied = io::copy(&mut Read::take(&mut *self, wanted), out)?;
        if copied != wanted {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("range {from}..{to} runs past the end of the stream"),
            ));
        }
        Ok(copied)
    }

    /// Reader positioned at `offset`, for handing to a lexer
    fn sub_stream(&mut self, offset: u64) -> io::Result<SubStream<'_, Self>>
    where
        Self: Sized,
    {
        SubStream::new(self, offset)
    }
}

impl PdfStorage for File {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

impl PdfStorage for Cursor<Vec<u8>> {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        let len = usize::try_from(len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "length overflows usize"))?;
        self.get_mut().truncate(len);
        Ok(())
    }
}

impl<S: PdfStorage + ?Sized> PdfStorage for &mut S {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        (**self).truncate(len)
    }
}

/// Open an existing PDF for reading and appending revisions
pub fn open_file<P: AsRef<Path>>(path: P) -> io::Result<File> {
    OpenOptions::new().read(true).write(true).open(path)
}

/// Line reader shared by [`PdfStorage::get_line`] and the xref parser
pub(crate) fn read_line<R: Read + Seek + ?Sized>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    let start = reader.stream_position()?;
    let mut line = Vec::new();
    let mut buf = [0u8; LINE_CHUNK];
    let mut consumed = 0u64;
    let mut saw_cr = false;

    'outer: loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        for &byte in &buf[..n] {
            if saw_cr {
                if byte == b'\n' {
                    consumed += 1;
                }
                break 'outer;
            }
            consumed += 1;
            match byte {
                b'\n' => break 'outer,
                b'\r' => saw_cr = true,
                _ => line.push(byte),
            }
        }
    }

    reader.seek(SeekFrom::Start(start + consumed))?;
    if consumed == 0 {
        Ok(None)
    } else {
        Ok(Some(line))
    }
}

/// Borrowed reader starting at a fixed offset of a larger stream
///
/// Lexers buffer ahead, so the underlying position is unspecified once the
/// sub-stream has been read from. Callers that care restore it themselves.
pub struct SubStream<'a, S: ?Sized> {
    inner: &'a mut S,
    base: u64,
}

impl<'a, S: Read + Seek + ?Sized> SubStream<'a, S> {
    pub fn new(inner: &'a mut S, base: u64) -> io::Result<Self> {
        inner.seek(SeekFrom::Start(base))?;
        Ok(Self { inner, base })
    }

    /// Absolute offset of the first byte of this sub-stream
    pub fn base(&self) -> u64 {
        self.base
    }
}

impl<S: Read + ?Sized> Read for SubStream<'_, S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}
