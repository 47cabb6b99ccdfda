//! Classic cross-reference table writer

use super::{section_trailer, sorted_offsets, subsections, write_objects, PdfWriter, PrevSecInfo};
use crate::error::Result;
use crate::io::PdfStorage;
use crate::parser::{ObjRef, PdfDictionary, PdfObject};
use std::io::Write;
use tracing::debug;

/// Writes incremental updates with an `xref` table and a `trailer` dictionary
#[derive(Debug, Default)]
pub struct OldStylePdfWriter {
    offsets: Vec<(ObjRef, u64)>,
}

impl OldStylePdfWriter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PdfWriter for OldStylePdfWriter {
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
        let entries: Vec<(u32, (u64, u16))> = sorted_offsets(&self.offsets)
            .into_iter()
            .map(|(r, offset)| (r.num, (offset, r.gen)))
            .collect();

        let mut out = Vec::with_capacity(32 + entries.len() * 20);
        out.extend_from_slice(b"xref\n");
        for (first, run) in subsections(&entries) {
            writeln!(out, "{} {}", first, run.len())?;
            for (offset, gen) in run {
                // 20 bytes per entry, including the two-byte end of line
                write!(out, "{offset:010} {gen:05} n \n")?;
            }
        }

        let size = entries
            .last()
            .map_or(0, |(num, _)| num.saturating_add(1))
            .max(prev.prev_object_count);
        let dict = section_trailer(trailer, prev, size);

        out.extend_from_slice(b"trailer\n");
        super::write_object_value(&mut out, &PdfObject::Dictionary(dict))?;
        write!(out, "\nstartxref\n{xref_pos}\n%%EOF\n")?;

        stream.write_all(&out)?;
        self.offsets.clear();
        Ok(stream.get_pos()?)
    }

    fn name(&self) -> &'static str {
        "old-style"
    }
}
