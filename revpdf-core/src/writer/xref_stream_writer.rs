//! XRef Stream Writer for PDF 1.5+
//!
//! This module implements writing cross-reference streams according to
//! ISO 32000-1:2008 Section 7.5.8. Each incremental update gets its own
//! `/Type /XRef` stream object whose dictionary doubles as the trailer.

use super::{
    section_trailer, sorted_offsets, subsections, write_indirect_object, write_objects, PdfWriter,
    PrevSecInfo,
};
use crate::error::Result;
use crate::io::PdfStorage;
use crate::parser::{ObjRef, PdfArray, PdfDictionary, PdfName, PdfObject, PdfStream};
use std::io::Write;
use tracing::debug;

/// Writes incremental updates with a cross-reference stream
#[derive(Debug)]
pub struct XRefStreamPdfWriter {
    offsets: Vec<(ObjRef, u64)>,
    compress: bool,
}

impl XRefStreamPdfWriter {
    /// `compress` is ignored when built without the `compression` feature
    pub fn new(compress: bool) -> Self {
        Self {
            offsets: Vec::new(),
            compress: compress && crate::compression::is_available(),
        }
    }

    /// Minimum bytes needed to represent a value
    fn bytes_needed(value: u64) -> usize {
        if value == 0 {
            1
        } else {
            ((value.ilog2() / 8) + 1) as usize
        }
    }

    /// Write a big-endian field with the specified width
    fn write_field(data: &mut Vec<u8>, value: u64, width: usize) {
        for i in (0..width).rev() {
            data.push(((value >> (i * 8)) & 0xFF) as u8);
        }
    }

    /// Type 1 rows for `(offset, generation)` entries
    fn encode_entries(entries: &[(u32, (u64, u16))], widths: [usize; 3]) -> Vec<u8> {
        let mut data = Vec::with_capacity(entries.len() * widths.iter().sum::<usize>());
        for (_, (offset, gen)) in entries {
            Self::write_field(&mut data, 1, widths[0]);
            Self::write_field(&mut data, *offset, widths[1]);
            Self::write_field(&mut data, *gen as u64, widths[2]);
        }
        data
    }

    /// Stream dictionary: `/Type /XRef` followed by the trailer entries
    fn create_dictionary(
        trailer: PdfDictionary,
        widths: [usize; 3],
        index: Vec<(u32, u32)>,
        compressed: bool,
    ) -> PdfDictionary {
        let mut dict = PdfDictionary::new();
        dict.insert("Type", PdfObject::Name(PdfName::new("XRef")));
        for (key, value) in trailer.0 {
            dict.0.insert(key, value);
        }

        dict.insert(
            "W",
            PdfObject::Array(PdfArray(
                widths.iter().map(|w| PdfObject::Integer(*w as i64)).collect(),
            )),
        );

        let mut index_array = PdfArray::new();
        for (first, count) in index {
            index_array.push(PdfObject::Integer(first as i64));
            index_array.push(PdfObject::Integer(count as i64));
        }
        dict.insert("Index", PdfObject::Array(index_array));

        if compressed {
            dict.insert("Filter", PdfObject::Name(PdfName::new("FlateDecode")));
        }
        dict
    }
}

impl Default for XRefStreamPdfWriter {
    fn default() -> Self {
        Self::new(true)
    }
}

impl PdfWriter for XRefStreamPdfWriter {
    fn write_content(
        &mut self,
        objects: &[(ObjRef, &PdfObject)],
        stream: &mut dyn PdfStorage,
        from: u64,
    ) -> Result<()> {
        self.offsets = write_objects(objects, stream, from)?;
        debug!("Wrote {} objects starting at {from}", self.offsets.len());
        Ok(())
    }

    fn write_trailer(
        &mut self,
        trailer: &PdfDictionary,
        prev: PrevSecInfo,
        stream: &mut dyn PdfStorage,
    ) -> Result<u64> {
        let xref_pos = stream.get_pos()?;
        let mut entries: Vec<(u32, (u64, u16))> = sorted_offsets(&self.offsets)
            .into_iter()
            .map(|(r, offset)| (r.num, (offset, r.gen)))
            .collect();

        // The stream object takes the first number past everything known
        let stream_num = entries
            .last()
            .map_or(0, |(num, _)| num.saturating_add(1))
            .max(prev.prev_object_count);
        entries.push((stream_num, (xref_pos, 0)));

        let max_offset = entries.iter().map(|(_, (o, _))| *o).max().unwrap_or(0);
        let max_gen = entries.iter().map(|(_, (_, g))| *g).max().unwrap_or(0);
        let widths = [
            1,
            Self::bytes_needed(max_offset),
            Self::bytes_needed(max_gen as u64),
        ];

        let index: Vec<(u32, u32)> = subsections(&entries)
            .into_iter()
            .map(|(first, run)| (first, run.len() as u32))
            .collect();

        let rows = Self::encode_entries(&entries, widths);
        let data = if self.compress {
            crate::compression::compress(&rows)?
        } else {
            rows
        };

        let size = stream_num.saturating_add(1);
        let dict = Self::create_dictionary(
            section_trailer(trailer, prev, size),
            widths,
            index,
            self.compress,
        );

        let mut out = Vec::new();
        write_indirect_object(
            &mut out,
            ObjRef::new(stream_num, 0),
            &PdfObject::Stream(PdfStream::new(dict, data)),
        )?;
        write!(out, "startxref\n{xref_pos}\n%%EOF\n")?;

        stream.write_all(&out)?;
        self.offsets.clear();
        Ok(stream.get_pos()?)
    }

    fn name(&self) -> &'static str {
        "xref-stream"
    }
}
