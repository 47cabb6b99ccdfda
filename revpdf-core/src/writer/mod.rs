//! Writer strategies for incremental updates
//!
//! A [`PdfWriter`] appends one revision to a PDF: the changed objects,
//! then an xref section, the trailer, `startxref` and `%%EOF`. Two
//! strategies are provided, a classic xref table ([`OldStylePdfWriter`])
//! and a PDF 1.5 cross-reference stream ([`XRefStreamPdfWriter`]).

mod old_style;
mod serializer;
mod xref_stream_writer;

pub use old_style::OldStylePdfWriter;
pub use serializer::{write_indirect_object, write_object_value};
pub use xref_stream_writer::XRefStreamPdfWriter;

use crate::error::Result;
use crate::io::PdfStorage;
use crate::parser::{ObjRef, PdfDictionary, PdfObject};
use std::io::{Read, Write};

/// Trailer keys that only make sense in an xref stream dictionary
const XREF_STREAM_KEYS: [&str; 8] = [
    "Type",
    "W",
    "Index",
    "Filter",
    "DecodeParms",
    "Length",
    "XRefStm",
    "DL",
];

/// Where the previous xref section is and how many objects it covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrevSecInfo {
    pub prev_xref: u64,
    pub prev_object_count: u32,
}

/// Serialization strategy for one incremental update
pub trait PdfWriter {
    /// Write `objects` starting at byte `from`
    ///
    /// The offsets of the written objects are remembered for the following
    /// [`write_trailer`](PdfWriter::write_trailer) call.
    fn write_content(
        &mut self,
        objects: &[(ObjRef, &PdfObject)],
        stream: &mut dyn PdfStorage,
        from: u64,
    ) -> Result<()>;

    /// Write the xref section, trailer, `startxref` and `%%EOF` at the
    /// current position
    ///
    /// Returns the position just past the final end-of-line.
    fn write_trailer(
        &mut self,
        trailer: &PdfDictionary,
        prev: PrevSecInfo,
        stream: &mut dyn PdfStorage,
    ) -> Result<u64>;

    /// Short strategy name for logs
    fn name(&self) -> &'static str;
}

/// Cross-reference section style written by [`writer_for`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum XRefStyle {
    /// Classic `xref` table
    #[default]
    Table,
    /// PDF 1.5 cross-reference stream
    Stream,
}

/// Configuration for PDF writer strategies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterConfig {
    /// Style of the xref section appended with each revision
    pub xref_style: XRefStyle,
    /// Flate-compress xref stream data (ignored for tables)
    pub compress_streams: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            xref_style: XRefStyle::Table,
            compress_streams: crate::compression::is_available(),
        }
    }
}

/// Build the strategy matching `config`
pub fn writer_for(config: &WriterConfig) -> Box<dyn PdfWriter> {
    match config.xref_style {
        XRefStyle::Table => Box::new(OldStylePdfWriter::new()),
        XRefStyle::Stream => Box::new(XRefStreamPdfWriter::new(config.compress_streams)),
    }
}

/// Write each object and record where it starts
fn write_objects(
    objects: &[(ObjRef, &PdfObject)],
    stream: &mut dyn PdfStorage,
    from: u64,
) -> Result<Vec<(ObjRef, u64)>> {
    start_line_at(stream, from)?;
    let mut offsets = Vec::with_capacity(objects.len());
    for (reference, object) in objects {
        offsets.push((*reference, stream.get_pos()?));
        write_indirect_object(&mut *stream, *reference, object)?;
    }
    Ok(offsets)
}

/// Position the stream at `from`, adding an end-of-line when the byte
/// before it does not end one (files that stop right after `%%EOF`)
fn start_line_at(stream: &mut dyn PdfStorage, from: u64) -> Result<()> {
    if from > 0 {
        stream.set_pos(from - 1)?;
        let mut last = [0u8; 1];
        let read = stream.read(&mut last)?;
        stream.set_pos(from)?;
        if read == 1 && !matches!(last[0], b'\r' | b'\n') {
            stream.write_all(b"\n")?;
        }
        return Ok(());
    }
    stream.set_pos(from)?;
    Ok(())
}

/// Sort offsets by object number, keeping the last write of a number
fn sorted_offsets(offsets: &[(ObjRef, u64)]) -> Vec<(ObjRef, u64)> {
    let mut sorted = offsets.to_vec();
    sorted.sort_by_key(|(r, _)| r.num);
    let mut deduped: Vec<(ObjRef, u64)> = Vec::with_capacity(sorted.len());
    for entry in sorted {
        match deduped.last_mut() {
            Some(last) if last.0.num == entry.0.num => *last = entry,
            _ => deduped.push(entry),
        }
    }
    deduped
}

/// Group sorted object numbers into runs of consecutive numbers
fn subsections<T: Copy>(entries: &[(u32, T)]) -> Vec<(u32, Vec<T>)> {
    let mut runs: Vec<(u32, Vec<T>)> = Vec::new();
    for &(num, value) in entries {
        match runs.last_mut() {
            Some((first, values)) if *first + values.len() as u32 == num => values.push(value),
            _ => runs.push((num, vec![value])),
        }
    }
    runs
}

/// Trailer for the new section: the current trailer minus stream-only keys,
/// with `Size` and `Prev` updated
fn section_trailer(trailer: &PdfDictionary, prev: PrevSecInfo, size: u32) -> PdfDictionary {
    let mut dict = trailer.clone();
    for key in XREF_STREAM_KEYS {
        dict.remove(key);
    }
    dict.insert("Size", PdfObject::Integer(size as i64));
    dict.insert("Prev", PdfObject::Integer(prev.prev_xref as i64));
    dict
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::PdfName;

    #[test]
    fn test_subsections_split_on_gaps() {
        let entries = [(1u32, 'a'), (2, 'b'), (3, 'c'), (7, 'd'), (9, 'e'), (10, 'f')];
        let runs = subsections(&entries);
        assert_eq!(
            runs,
            vec![
                (1, vec!['a', 'b', 'c']),
                (7, vec!['d']),
                (9, vec!['e', 'f'])
            ]
        );
        assert!(subsections::<u8>(&[]).is_empty());
    }

    #[test]
    fn test_sorted_offsets_keeps_last_write() {
        let offsets = [
            (ObjRef::new(5, 0), 10),
            (ObjRef::new(2, 0), 20),
            (ObjRef::new(5, 0), 30),
        ];
        assert_eq!(
            sorted_offsets(&offsets),
            vec![(ObjRef::new(2, 0), 20), (ObjRef::new(5, 0), 30)]
        );
    }

    #[test]
    fn test_section_trailer_drops_stream_keys() {
        let mut trailer = PdfDictionary::new();
        trailer.insert("Type", PdfObject::Name(PdfName::new("XRef")));
        trailer.insert("Size", PdfObject::Integer(4));
        trailer.insert("Root", PdfObject::Reference(ObjRef::new(1, 0)));
        trailer.insert("W", PdfObject::Integer(0));
        trailer.insert("Length", PdfObject::Integer(99));

        let prev = PrevSecInfo {
            prev_xref: 1234,
            prev_object_count: 4,
        };
        let dict = section_trailer(&trailer, prev, 6);

        let keys: Vec<&str> = dict.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["Size", "Root", "Prev"]);
        assert_eq!(dict.get("Size"), Some(&PdfObject::Integer(6)));
        assert_eq!(dict.get("Prev"), Some(&PdfObject::Integer(1234)));
    }

    #[test]
    fn test_write_objects_starts_on_new_line() {
        let object = PdfObject::Integer(7);
        let objects = [(ObjRef::new(3, 0), &object)];

        let mut stream = std::io::Cursor::new(b"%%EOF".to_vec());
        let offsets = write_objects(&objects, &mut stream, 5).unwrap();
        assert_eq!(offsets, vec![(ObjRef::new(3, 0), 6)]);
        assert!(stream.get_ref().starts_with(b"%%EOF\n3 0 obj\n"));

        let mut stream = std::io::Cursor::new(b"%%EOF\r\n".to_vec());
        let offsets = write_objects(&objects, &mut stream, 7).unwrap();
        assert_eq!(offsets, vec![(ObjRef::new(3, 0), 7)]);
        assert!(stream.get_ref().starts_with(b"%%EOF\r\n3 0 obj"));
    }

    #[test]
    fn test_writer_for_config() {
        let table = writer_for(&WriterConfig::default());
        assert_eq!(table.name(), "old-style");

        let stream = writer_for(&WriterConfig {
            xref_style: XRefStyle::Stream,
            compress_streams: false,
        });
        assert_eq!(stream.name(), "xref-stream");
    }
}
