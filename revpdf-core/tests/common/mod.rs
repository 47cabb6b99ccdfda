//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;

/// Builds PDFs revision by revision with correct offsets
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

    fn table_revision(&mut self, objects: &[(u32, &str)], prev: Option<u64>, extra: &str) -> u64 {
        let offsets = self.write_objects(objects);
        let xref = self.data.len() as u64;
        // A self-referencing section needs its own offset as Prev
        let prev = prev.or(self.last_xref);

        let mut section = String::from("xref\n");
        if self.last_xref.is_none() {
            section.push_str("0 1\n0000000000 65535 f \n");
        }
        for (num, offset) in &offsets {
            section.push_str(&format!("{num} 1\n{offset:010} 00000 n \n"));
        }
        let prev_entry = prev.map(|p| format!(" /Prev {p}")).unwrap_or_default();
        section.push_str(&format!(
            "trailer\n<< /Size {}{prev_entry} {extra} >>\nstartxref\n{xref}\n%%EOF\n",
            self.size
        ));
        self.data.extend_from_slice(section.as_bytes());
        self.last_xref = Some(xref);
        xref
    }

    /// Append a revision with a classic xref table; returns its offset
    pub fn revision(&mut self, objects: &[(u32, &str)], trailer_extra: &str) -> u64 {
        self.table_revision(objects, None, trailer_extra)
    }

    /// Append a revision whose trailer `Prev` points at its own xref table
    pub fn cyclic_revision(&mut self, objects: &[(u32, &str)], trailer_extra: &str) -> u64 {
        let body_len: usize = objects
            .iter()
            .map(|(num, body)| format!("{num} 0 obj\n{body}\nendobj\n").len())
            .sum();
        let xref = (self.data.len() + body_len) as u64;
        self.table_revision(objects, Some(xref), trailer_extra)
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

        let prev_entry = self
            .last_xref
            .map(|p| format!(" /Prev {p}"))
            .unwrap_or_default();
        let dict = format!(
            "<< /Type /XRef /Size {} /W [1 4 1] /Index [{}] /Length {}{prev_entry} {trailer_extra} >>",
            self.size,
            index.trim_end(),
            rows.len(),
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

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn finish(self) -> Vec<u8> {
        self.data
    }
}

/// One revision: catalog, empty page tree, Info with `Title (A)`
pub fn single_revision_pdf() -> Vec<u8> {
    let mut builder = PdfBuilder::new("1.4");
    builder.revision(
        &[
            (1, "<< /Type /Catalog /Pages 2 0 R >>"),
            (2, "<< /Type /Pages /Kids [] /Count 0 >>"),
            (3, "<< /Title (A) /Producer (revpdf tests) >>"),
        ],
        "/Root 1 0 R /Info 3 0 R",
    );
    builder.finish()
}

/// Two table sections where the newest one's `Prev` points further into
/// the file, at the section written after it
pub fn forward_prev_pdf() -> Vec<u8> {
    let mut data = b"%PDF-1.4\n".to_vec();
    let catalog = data.len();
    data.extend_from_slice(b"1 0 obj\n<< /Type /Catalog >>\nendobj\n");

    let newest = data.len();
    let section = |prev: usize| {
        format!(
            "xref\n0 2\n0000000000 65535 f \n{catalog:010} 00000 n \n\
             trailer\n<< /Size 2 /Root 1 0 R /Prev {prev:010} >>\nstartxref\n{newest}\n%%EOF\n"
        )
    };
    let oldest = newest + section(0).len();
    data.extend_from_slice(section(oldest).as_bytes());
    data.extend_from_slice(
        format!(
            "xref\n0 2\n0000000000 65535 f \n{catalog:010} 00000 n \n\
             trailer\n<< /Size 2 /Root 1 0 R >>\nstartxref\n{newest}\n%%EOF\n"
        )
        .as_bytes(),
    );
    data
}

/// Same as [`single_revision_pdf`] with a second revision retitling Info
pub fn two_revision_pdf() -> Vec<u8> {
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

/// Log sink for a capturing `tracing_subscriber::fmt` subscriber
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        let bytes = self.0.lock().map(|b| b.clone()).unwrap_or_default();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Ok(mut inner) = self.0.lock() {
            inner.extend_from_slice(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Run `f` with every log event at `DEBUG` and above captured
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let logs = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, logs.contents())
}
