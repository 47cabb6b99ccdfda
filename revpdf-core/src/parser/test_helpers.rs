//! Helper functions for creating valid test PDFs with correct offsets

/// Builds a PDF one revision at a time
///
/// Object bodies are raw PDF syntax; offsets, xref sections, `Size` and
/// `Prev` are computed.
pub struct PdfBuilder {
    data: Vec<u8>,
    last_xref: Option<u64>,
    size: u32,
}

impl PdfBuilder {
    pub fn new(version: &str) -> Self {
        let mut data = format!("%PDF-{version}\n").into_bytes();
        data.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");
        Self {
            data,
            last_xref: None,
            size: 1,
        }
    }

    /// Append raw bytes (for headers, linearization dictionaries, junk)
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.data.extend_from_slice(bytes);
        self
    }

    fn write_objects(&mut self, objects: &[(u32, &str)]) -> Vec<(u32, u64)> {
        let mut offsets = Vec::new();
        for (num, body) in objects {
            offsets.push((*num, self.data.len() as u64));
            self.data
                .extend_from_slice(format!("{num} 0 obj\n{body}\nendobj\n").as_bytes());
            self.size = self.size.max(num + 1);
        }
        offsets
    }

    fn prev_entry(&self) -> String {
        self.last_xref
            .map(|p| format!(" /Prev {p}"))
            .unwrap_or_default()
    }

    /// Append a revision with a classic xref table; returns its xref offset
    pub fn revision(&mut self, objects: &[(u32, &str)], trailer_extra: &str) -> u64 {
        let offsets = self.write_objects(objects);
        let xref = self.data.len() as u64;

        let mut section = String::from("xref\n");
        if self.last_xref.is_none() {
            section.push_str("0 1\n0000000000 65535 f \n");
        }
        for (num, offset) in &offsets {
            section.push_str(&format!("{num} 1\n{offset:010} 00000 n \n"));
        }
        section.push_str(&format!(
            "trailer\n<< /Size {}{} {trailer_extra} >>\nstartxref\n{xref}\n%%EOF\n",
            self.size,
            self.prev_entry()
        ));
        self.data.extend_from_slice(section.as_bytes());
        self.last_xref = Some(xref);
        xref
    }

    /// Append a revision with an uncompressed xref stream; returns its offset
    pub fn stream_revision(&mut self, objects: &[(u32, &str)], trailer_extra: &str) -> u64 {
        let mut offsets = self.write_objects(objects);
        let stream_num = self.size;
        let xref = self.data.len() as u64;
        offsets.push((stream_num, xref));
        self.size = stream_num + 1;

        let mut rows = Vec::new();
        let mut index = String::new();
        for (num, offset) in &offsets {
            rows.push(1u8);
            rows.extend_from_slice(&(*offset as u32).to_be_bytes());
            rows.push(0);
            index.push_str(&format!("{num} 1 "));
        }

        let dict = format!(
            "<< /Type /XRef /Size {} /W [1 4 1] /Index [{}] /Length {}{} {trailer_extra} >>",
            self.size,
            index.trim_end(),
            rows.len(),
            self.prev_entry()
        );
        self.data
            .extend_from_slice(format!("{stream_num} 0 obj\n{dict}\nstream\n").as_bytes());
        self.data.extend_from_slice(&rows);
        self.data.extend_from_slice(
            format!("\nendstream\nendobj\nstartxref\n{xref}\n%%EOF\n").as_bytes(),
        );
        self.last_xref = Some(xref);
        xref
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn finish(self) -> Vec<u8> {
        self.data
    }
}

/// Creates a minimal single-revision PDF with an Info dictionary
pub fn create_pdf_with_info() -> Vec<u8> {
    let mut builder = PdfBuilder::new("1.4");
    builder.revision(
        &[
            (1, "<< /Type /Catalog /Pages 2 0 R >>"),
            (2, "<< /Type /Pages /Kids [] /Count 0 >>"),
            (3, "<< /Title (A) /Producer (test) >>"),
        ],
        "/Root 1 0 R /Info 3 0 R",
    );
    builder.finish()
}

/// Creates a PDF with two classic revisions; the second replaces object 3
pub fn create_two_revision_pdf() -> Vec<u8> {
    let mut builder = PdfBuilder::new("1.4");
    builder.revision(
        &[
            (1, "<< /Type /Catalog /Pages 2 0 R >>"),
            (2, "<< /Type /Pages /Kids [] /Count 0 >>"),
            (3, "<< /Title (A) >>"),
        ],
        "/Root 1 0 R /Info 3 0 R",
    );
    builder.revision(&[(3, "<< /Title (B) >>")], "/Root 1 0 R /Info 3 0 R");
    builder.finish()
}
