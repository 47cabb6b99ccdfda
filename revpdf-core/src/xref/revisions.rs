//! Revision discovery
//!
//! Walks the trailer `Prev` chain from the newest xref section back to the
//! original file body. Each hop is one revision. A damaged chain ends the
//! walk early; the revisions found so far stay usable.

use crate::io::{PdfStorage, SubStream};
use crate::parser::trailer::prev_link;
use crate::parser::xref::read_object_header;
use crate::parser::{Lexer, PdfDictionary, PdfObject, PrevLink, Token};
use std::io;
use tracing::{debug, error};

/// Why the revision walk stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevisionScanEnd {
    /// The oldest trailer has no `Prev` (or a null one)
    NoPrev,
    /// `Prev` is not an integer offset
    NonIntegerPrev,
    /// `Prev` points at a section already visited
    Cycle,
    /// `startxref` came before any `trailer` after an `xref` keyword
    MissingTrailer,
    /// The section at `Prev` is neither an xref table nor an xref stream
    Malformed,
    /// End of stream while looking for the trailer
    Eof,
}

impl RevisionScanEnd {
    /// Whether the walk stopped because the file is damaged
    pub fn is_corruption(&self) -> bool {
        !matches!(self, RevisionScanEnd::NoPrev)
    }
}

enum Step {
    Next(PdfDictionary),
    Stop(RevisionScanEnd),
}

/// Collect xref section offsets, newest first
///
/// `newest` and `trailer` describe the active section. The stream position
/// is left where it was.
pub fn collect_revisions<S: PdfStorage + ?Sized>(
    stream: &mut S,
    newest: u64,
    trailer: &PdfDictionary,
) -> io::Result<(Vec<u64>, RevisionScanEnd)> {
    let pos = stream.get_pos()?;
    let result = walk(stream, newest, trailer.clone());
    stream.set_pos(pos)?;
    result
}

fn walk<S: PdfStorage + ?Sized>(
    stream: &mut S,
    newest: u64,
    mut trailer: PdfDictionary,
) -> io::Result<(Vec<u64>, RevisionScanEnd)> {
    let mut revisions = Vec::new();
    let mut offset = newest;

    loop {
        debug!("Revision {} xref at {offset}", revisions.len());
        revisions.push(offset);

        offset = match prev_link(&trailer) {
            PrevLink::Absent => {
                debug!("No previous revision");
                return Ok((revisions, RevisionScanEnd::NoPrev));
            }
            PrevLink::Invalid => {
                error!("Trailer of xref at {offset} has a non-integer Prev");
                return Ok((revisions, RevisionScanEnd::NonIntegerPrev));
            }
            PrevLink::Offset(prev) if revisions.contains(&prev) => {
                error!("Prev of xref at {offset} points back to {prev}, the file is corrupted");
                return Ok((revisions, RevisionScanEnd::Cycle));
            }
            PrevLink::Offset(prev) => prev,
        };

        trailer = match read_section_trailer(stream, offset)? {
            Step::Next(dict) => dict,
            Step::Stop(end) => return Ok((revisions, end)),
        };
    }
}

fn read_section_trailer<S: PdfStorage + ?Sized>(stream: &mut S, offset: u64) -> io::Result<Step> {
    let mut lexer = Lexer::new(SubStream::new(&mut *stream, offset)?);
    match lexer.next_token() {
        Ok(Token::XRef) => {
            let after_keyword = offset + lexer.position() as u64;
            drop(lexer);
            find_table_trailer(stream, after_keyword)
        }
        Ok(token @ Token::Integer(_)) => {
            lexer.push_token(token);
            Ok(stream_section_trailer(&mut lexer, offset))
        }
        Ok(token) => {
            error!("Unexpected {token:?} at xref offset {offset}, the file is corrupted");
            Ok(Step::Stop(RevisionScanEnd::Malformed))
        }
        Err(e) => {
            error!("Unreadable xref section at {offset}: {e}");
            Ok(Step::Stop(RevisionScanEnd::Malformed))
        }
    }
}

/// Scan line by line for `trailer` and parse the dictionary after it
fn find_table_trailer<S: PdfStorage + ?Sized>(stream: &mut S, from: u64) -> io::Result<Step> {
    stream.set_pos(from)?;
    loop {
        let line_start = stream.get_pos()?;
        let line = match stream.get_line()? {
            Some(line) => line,
            None => {
                error!("End of file before the trailer of xref table at {from}");
                return Ok(Step::Stop(RevisionScanEnd::Eof));
            }
        };

        if contains(&line, b"startxref") {
            error!("startxref found before trailer of xref table at {from}, the file is corrupted");
            return Ok(Step::Stop(RevisionScanEnd::MissingTrailer));
        }
        let Some(idx) = find(&line, b"trailer") else {
            continue;
        };

        let dict_start = line_start + (idx + b"trailer".len()) as u64;
        let mut lexer = Lexer::new(SubStream::new(&mut *stream, dict_start)?);
        return Ok(match PdfObject::parse(&mut lexer) {
            Ok(PdfObject::Dictionary(dict)) => Step::Next(dict),
            Ok(other) => {
                error!("Trailer at {dict_start} is a {}, not a dictionary", other.kind());
                Step::Stop(RevisionScanEnd::Malformed)
            }
            Err(e) => {
                error!("Unreadable trailer at {dict_start}: {e}");
                Step::Stop(RevisionScanEnd::Malformed)
            }
        });
    }
}

/// `int int obj` followed by a `/Type /XRef` stream
fn stream_section_trailer<R: io::Read>(lexer: &mut Lexer<R>, offset: u64) -> Step {
    if read_object_header(lexer).is_none() {
        error!("Bad object header for xref stream at {offset}, the file is corrupted");
        return Step::Stop(RevisionScanEnd::Malformed);
    }
    match PdfObject::parse(lexer) {
        Ok(PdfObject::Stream(stream)) if stream.dict.get_type() == Some("XRef") => {
            Step::Next(stream.dict)
        }
        Ok(other) => {
            error!(
                "Object at {offset} is a {} but an xref stream was expected",
                other.kind()
            );
            Step::Stop(RevisionScanEnd::Malformed)
        }
        Err(e) => {
            error!("Unreadable xref stream at {offset}: {e}");
            Step::Stop(RevisionScanEnd::Malformed)
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    find(haystack, needle).is_some()
}
