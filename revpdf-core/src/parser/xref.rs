//! PDF Cross-Reference Parser
//!
//! Parses classic xref tables (ISO 32000-1 Section 7.5.4), xref streams
//! (Section 7.5.8) and hybrid files, and merges the whole `Prev` chain
//! into one table where newer sections win.

use super::lexer::Lexer;
use super::objects::{ObjRef, PdfDictionary, PdfObject};
use super::xref_stream::XRefStream;
use super::{ParseError, ParseResult, Token};
use crate::io::{read_line, SubStream};
use std::collections::{HashMap, HashSet};
use std::io::{Read, Seek, SeekFrom};
use tracing::{debug, warn};

/// Bytes scanned at the end of the file for `startxref`
const TAIL_SCAN_LEN: u64 = 1024;

/// Cross-reference entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    /// Free object entry
    Free { next_free: u32, generation: u16 },
    /// Object stored at a byte offset
    InUse { offset: u64, generation: u16 },
    /// Object stored inside an object stream (PDF 1.5+)
    Compressed { stream_num: u32, index: u32 },
}

impl XRefEntry {
    pub fn generation(&self) -> u16 {
        match self {
            XRefEntry::Free { generation, .. } | XRefEntry::InUse { generation, .. } => {
                *generation
            }
            XRefEntry::Compressed { .. } => 0,
        }
    }

    pub fn is_in_use(&self) -> bool {
        !matches!(self, XRefEntry::Free { .. })
    }
}

/// Location of the newest xref section and of the end of the newest revision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartXRef {
    /// Offset named by the last `startxref`
    pub xref_offset: u64,
    /// First byte after the last `%%EOF` marker and its end-of-line
    pub eof_pos: u64,
}

/// Find the last `startxref` near the end of the file
pub fn find_startxref<R: Read + Seek + ?Sized>(reader: &mut R) -> ParseResult<StartXRef> {
    let file_size = reader.seek(SeekFrom::End(0))?;
    let read_size = TAIL_SCAN_LEN.min(file_size);
    let tail_start = file_size - read_size;
    reader.seek(SeekFrom::Start(tail_start))?;

    let mut tail = vec![0u8; read_size as usize];
    reader.read_exact(&mut tail)?;

    let keyword = rfind(&tail, b"startxref").ok_or(ParseError::MissingStartXRef)?;
    let after = &tail[keyword + b"startxref".len()..];
    let digits: Vec<u8> = after
        .iter()
        .copied()
        .skip_while(|b| b.is_ascii_whitespace())
        .take_while(|b| b.is_ascii_digit())
        .collect();
    let xref_offset = std::str::from_utf8(&digits)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or(ParseError::MissingStartXRef)?;

    let eof_pos = match rfind(&tail, b"%%EOF").filter(|&pos| pos > keyword) {
        Some(pos) => {
            let mut end = pos + b"%%EOF".len();
            if tail.get(end) == Some(&b'\r') {
                end += 1;
            }
            if tail.get(end) == Some(&b'\n') {
                end += 1;
            }
            tail_start + end as u64
        }
        None => {
            warn!("No %%EOF marker after startxref, using end of file");
            file_size
        }
    };

    Ok(StartXRef {
        xref_offset,
        eof_pos,
    })
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    (0..=haystack.len() - needle.len())
        .rev()
        .find(|&i| haystack[i..].starts_with(needle))
}

/// One xref section as stored in the file
#[derive(Debug, Clone)]
pub struct XRefSection {
    /// Offset of the `xref` keyword or of the xref stream object
    pub offset: u64,
    /// Entries in file order
    pub entries: Vec<(u32, XRefEntry)>,
    /// Trailer dictionary (the stream dictionary for xref streams)
    pub trailer: PdfDictionary,
    /// Whether the section is an xref stream
    pub is_stream: bool,
}

impl XRefSection {
    /// Parse the section starting at `offset`
    pub fn parse_at<R: Read + Seek + ?Sized>(reader: &mut R, offset: u64) -> ParseResult<Self> {
        reader.seek(SeekFrom::Start(offset))?;
        let first = read_line(reader)?.ok_or(ParseError::InvalidXRef(offset))?;

        if trim_ascii(&first).starts_with(b"xref") {
            // The reader now sits on the first subsection header
            Self::parse_table(reader, offset)
        } else {
            Self::parse_stream(reader, offset)
        }
    }

    /// Parse a classic table; the reader is positioned after the `xref` line
    fn parse_table<R: Read + Seek + ?Sized>(reader: &mut R, offset: u64) -> ParseResult<Self> {
        let mut entries = Vec::new();

        loop {
            let line_start = reader.stream_position()?;
            let raw = read_line(reader)?.ok_or(ParseError::InvalidXRef(offset))?;
            let line = trim_ascii(&raw);

            if line.is_empty() {
                continue;
            }

            if let Some(idx) = find(&raw, b"trailer") {
                let dict_start = line_start + (idx + b"trailer".len()) as u64;
                let trailer = Self::parse_trailer_dict(reader, dict_start, offset)?;
                return Ok(XRefSection {
                    offset,
                    entries,
                    trailer,
                    is_stream: false,
                });
            }

            // Subsection header: first object number and count
            let (first_num, count) = parse_subsection_header(line).ok_or_else(|| {
                debug!("Bad xref subsection header at {line_start}");
                ParseError::InvalidXRef(offset)
            })?;

            for i in 0..count {
                let raw = read_line(reader)?.ok_or(ParseError::InvalidXRef(offset))?;
                let entry = parse_xref_entry(&raw).ok_or(ParseError::InvalidXRef(offset))?;
                entries.push((first_num.saturating_add(i), entry));
            }
        }
    }

    fn parse_trailer_dict<R: Read + Seek + ?Sized>(
        reader: &mut R,
        dict_start: u64,
        offset: u64,
    ) -> ParseResult<PdfDictionary> {
        let mut lexer = Lexer::new(SubStream::new(reader, dict_start)?);
        match PdfObject::parse(&mut lexer)? {
            PdfObject::Dictionary(dict) => Ok(dict),
            other => {
                debug!(
                    "Trailer of xref section at {offset} is a {} instead of a dictionary",
                    other.kind()
                );
                Err(ParseError::InvalidTrailer)
            }
        }
    }

    fn parse_stream<R: Read + Seek + ?Sized>(reader: &mut R, offset: u64) -> ParseResult<Self> {
        let mut lexer = Lexer::new(SubStream::new(reader, offset)?);
        let (_, object) =
            PdfObject::parse_indirect(&mut lexer).map_err(|_| ParseError::InvalidXRef(offset))?;

        let stream = match object {
            PdfObject::Stream(stream) if stream.dict.get_type() == Some("XRef") => stream,
            _ => return Err(ParseError::InvalidXRef(offset)),
        };

        let entries = XRefStream::from_stream(&stream)?.to_xref_entries()?;
        Ok(XRefSection {
            offset,
            entries,
            trailer: stream.dict,
            is_stream: true,
        })
    }

    /// Offset of the previous section, when `Prev` is an integer
    pub fn prev(&self) -> Option<u64> {
        self.trailer
            .get("Prev")
            .and_then(|obj| obj.as_integer())
            .and_then(|i| u64::try_from(i).ok())
    }

    /// Offset of the companion xref stream in a hybrid file
    pub fn xref_stm(&self) -> Option<u64> {
        self.trailer
            .get("XRefStm")
            .and_then(|obj| obj.as_integer())
            .and_then(|i| u64::try_from(i).ok())
    }
}

fn leading_ws(line: &[u8]) -> usize {
    line.iter().take_while(|b| b.is_ascii_whitespace()).count()
}

fn trim_ascii(bytes: &[u8]) -> &[u8] {
    let start = leading_ws(bytes);
    let end = bytes.len()
        - bytes[start..]
            .iter()
            .rev()
            .take_while(|b| b.is_ascii_whitespace())
            .count();
    &bytes[start..end]
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn parse_subsection_header(line: &[u8]) -> Option<(u32, u32)> {
    let text = std::str::from_utf8(line).ok()?;
    let mut parts = text.split_whitespace();
    let first = parts.next()?.parse::<u32>().ok()?;
    let count = parts.next()?.parse::<u32>().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((first, count))
}

/// Parse a single `nnnnnnnnnn ggggg n` entry line
fn parse_xref_entry(line: &[u8]) -> Option<XRefEntry> {
    let text = std::str::from_utf8(line).ok()?;
    let mut parts = text.split_whitespace();
    let offset = parts.next()?.parse::<u64>().ok()?;
    let generation = parts.next()?.parse::<u16>().ok()?;
    match parts.next()? {
        "n" => Some(XRefEntry::InUse { offset, generation }),
        "f" => Some(XRefEntry::Free {
            next_free: u32::try_from(offset).unwrap_or(0),
            generation,
        }),
        _ => None,
    }
}

/// Cross-reference table merged across the `Prev` chain
#[derive(Debug, Clone, Default)]
pub struct XRefTable {
    entries: HashMap<u32, XRefEntry>,
    trailer: PdfDictionary,
    start_offset: u64,
    sections: Vec<u64>,
}

impl XRefTable {
    /// Load the section at `offset` and everything it chains back to
    ///
    /// The newest section must parse. Older sections that fail to parse, or
    /// `Prev` links that loop, end the chain with a warning.
    pub fn load<R: Read + Seek + ?Sized>(reader: &mut R, offset: u64) -> ParseResult<Self> {
        let mut table = XRefTable {
            start_offset: offset,
            ..Default::default()
        };
        let mut visited = HashSet::new();
        let mut next = Some(offset);

        while let Some(current) = next.take() {
            if !visited.insert(current) {
                warn!("Xref Prev chain loops back to offset {current}");
                break;
            }

            let section = match XRefSection::parse_at(reader, current) {
                Ok(section) => section,
                Err(e) if table.sections.is_empty() => return Err(e),
                Err(e) => {
                    warn!("Ignoring unreadable xref section at {current}: {e}");
                    break;
                }
            };

            let mut section_entries: HashMap<u32, XRefEntry> =
                section.entries.iter().copied().collect();
            if let Some(stm_offset) = section.xref_stm() {
                match XRefSection::parse_at(reader, stm_offset) {
                    Ok(stm) if stm.is_stream => {
                        for (num, entry) in stm.entries {
                            let replace = section_entries
                                .get(&num)
                                .map_or(true, |existing| !existing.is_in_use());
                            if replace {
                                section_entries.insert(num, entry);
                            }
                        }
                    }
                    Ok(_) => warn!("XRefStm {stm_offset} does not point to an xref stream"),
                    Err(e) => warn!("Ignoring unreadable XRefStm at {stm_offset}: {e}"),
                }
            }

            for (num, entry) in section_entries {
                table.entries.entry(num).or_insert(entry);
            }

            if table.sections.is_empty() {
                table.trailer = section.trailer.clone();
            }
            table.sections.push(current);
            next = section.prev();
        }

        debug!(
            "Loaded {} xref entries from {} section(s) starting at {offset}",
            table.entries.len(),
            table.sections.len()
        );
        Ok(table)
    }

    /// Get an xref entry by object number
    pub fn get_entry(&self, obj_num: u32) -> Option<&XRefEntry> {
        self.entries.get(&obj_num)
    }

    /// Entry for `reference` if it is in use with the same generation
    pub fn in_use_entry(&self, reference: ObjRef) -> Option<&XRefEntry> {
        self.entries
            .get(&reference.num)
            .filter(|e| e.is_in_use() && e.generation() == reference.gen)
    }

    /// Trailer of the newest section
    pub fn trailer(&self) -> &PdfDictionary {
        &self.trailer
    }

    /// Offset of the newest section
    pub fn start_offset(&self) -> u64 {
        self.start_offset
    }

    /// Offsets of every section read, newest first
    pub fn sections(&self) -> &[u64] {
        &self.sections
    }

    /// Highest object number with an entry
    pub fn max_object_number(&self) -> Option<u32> {
        self.entries.keys().copied().max()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u32, &XRefEntry)> {
        self.entries.iter()
    }
}

/// Read an `int int obj` header at the lexer position
pub(crate) fn read_object_header<R: Read>(lexer: &mut Lexer<R>) -> Option<ObjRef> {
    let num = match lexer.next_token().ok()? {
        Token::Integer(n) => u32::try_from(n).ok()?,
        _ => return None,
    };
    let gen = match lexer.next_token().ok()? {
        Token::Integer(g) => u16::try_from(g).ok()?,
        _ => return None,
    };
    match lexer.next_token().ok()? {
        Token::Obj => Some(ObjRef::new(num, gen)),
        _ => None,
    }
}
