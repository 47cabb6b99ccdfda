//! Incremental cross-reference writer

use super::base::{BaseXRef, RefState};
use super::linearization;
use super::revisions::{collect_revisions, RevisionScanEnd};
use super::{PolicyProbe, WriteMode, XRefWriterOptions};
use crate::error::{PdfError, Result};
use crate::io::PdfStorage;
use crate::parser::{ObjRef, ObjectKind, PdfDictionary, PdfObject};
use crate::writer::{writer_for, PdfWriter, PrevSecInfo};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::rc::{Rc, Weak};
use tracing::{debug, info, warn};

/// Whether `new` may replace `old`
///
/// Same kind, or anything over a null. References are compared by kind
/// only and never followed.
pub fn type_compatible(old: &PdfObject, new: &PdfObject) -> bool {
    old.is_null() || old.kind() == new.kind()
}

/// Validates changes to a PDF and appends them as incremental updates
///
/// Revision 0 is the newest. Only the newest revision accepts changes;
/// older ones can be browsed with [`change_revision`](Self::change_revision)
/// and extracted with [`clone_revision`](Self::clone_revision).
pub struct XRefWriter<S: PdfStorage> {
    base: BaseXRef<S>,
    mode: WriteMode,
    policy: Option<Weak<dyn PolicyProbe>>,
    revision: usize,
    revisions: Vec<u64>,
    store_pos: u64,
    linearized: Option<ObjRef>,
    pdf_writer: Option<Box<dyn PdfWriter>>,
    scan_end: Option<RevisionScanEnd>,
}

impl XRefWriter<File> {
    /// Open a file for reading and appending revisions
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(crate::io::open_file(path)?)
    }
}

impl<S: PdfStorage> XRefWriter<S> {
    pub fn new(stream: S) -> Result<Self> {
        Self::with_options(stream, XRefWriterOptions::default())
    }

    pub fn with_options(stream: S, options: XRefWriterOptions) -> Result<Self> {
        let mut base = BaseXRef::open(stream)?;
        let linearized = linearization::probe(base.stream_mut(), options.linearized_probe_len);

        let (revisions, scan_end) = if let Some(reference) = linearized {
            warn!("Document is linearized by {reference}, revisions are not collected");
            (Vec::new(), None)
        } else {
            let newest = base.last_xref_pos();
            let trailer = base.trailer().clone();
            let (revisions, end) = collect_revisions(base.stream_mut(), newest, &trailer)?;
            (revisions, Some(end))
        };

        info!(
            "Opened document with {} revision(s), appending at {}",
            revisions.len(),
            base.eof_pos()
        );

        Ok(Self {
            store_pos: base.eof_pos(),
            base,
            mode: options.mode,
            policy: None,
            revision: 0,
            revisions,
            linearized,
            pdf_writer: Some(writer_for(&options.writer)),
            scan_end,
        })
    }

    fn check_writable(&self) -> Result<()> {
        if self.revision != 0 {
            debug!("Change refused in revision {}", self.revision);
            return Err(PdfError::ReadOnlyRevision);
        }
        let read_only = self
            .policy
            .as_ref()
            .and_then(Weak::upgrade)
            .is_some_and(|policy| policy.is_read_only());
        if read_only {
            debug!("Change refused, document is read-only");
            return Err(PdfError::ReadOnlyDocument);
        }
        Ok(())
    }

    /// Replace the value of `reference`
    pub fn change_object(&mut self, reference: ObjRef, object: PdfObject) -> Result<()> {
        self.check_writable()?;

        if self.mode == WriteMode::Paranoid {
            match self.base.knows_ref(reference) {
                RefState::Unused => {
                    return Err(PdfError::BadType(format!(
                        "{reference} is not allocated in this revision"
                    )));
                }
                RefState::Uninitialized => {}
                RefState::Initialized => {
                    let current = self.base.fetch(reference)?;
                    if !type_compatible(&current, &object) {
                        return Err(PdfError::BadType(format!(
                            "{} cannot replace {} in {reference}",
                            object.kind(),
                            current.kind()
                        )));
                    }
                }
            }
        }

        debug!("Changing {reference} to a {}", object.kind());
        self.base.change_object(reference, object);
        Ok(())
    }

    /// Set a trailer entry, returning the previous value
    pub fn change_trailer(&mut self, name: &str, value: PdfObject) -> Result<Option<PdfObject>> {
        self.check_writable()?;

        if self.mode == WriteMode::Paranoid {
            let current = self.base.trailer().get(name).unwrap_or(&PdfObject::Null);
            if !type_compatible(current, &value) {
                return Err(PdfError::BadType(format!(
                    "{} cannot replace {} in trailer entry {name}",
                    value.kind(),
                    current.kind()
                )));
            }
        }

        debug!("Changing trailer entry {name}");
        Ok(self.base.change_trailer(name, value))
    }

    /// Allocate a new reference without an object body
    pub fn reserve_ref(&mut self) -> Result<ObjRef> {
        self.check_writable()?;
        Ok(self.base.reserve_ref())
    }

    /// New default object of `kind`, with a reserved reference if `want_ref`
    pub fn create_object(
        &mut self,
        kind: ObjectKind,
        want_ref: bool,
    ) -> Result<(PdfObject, Option<ObjRef>)> {
        self.check_writable()?;
        Ok(self.base.create_object(kind, want_ref))
    }

    /// Write pending changes after the newest revision
    ///
    /// With `new_revision == false` the bytes are written but the next save
    /// overwrites them. With `true` they become a new revision 0.
    pub fn save_changes(&mut self, new_revision: bool) -> Result<()> {
        if self.linearized.is_some() {
            warn!("Document is linearized and changes may break linearization");
        }
        if self.base.changes().is_empty() {
            info!("Nothing to be saved");
            return Ok(());
        }
        let writer = self.pdf_writer.as_mut().ok_or(PdfError::NoWriter)?;

        let prev = PrevSecInfo {
            prev_xref: self.base.last_xref_pos(),
            prev_object_count: self.base.num_objects(),
        };
        let store_pos = self.store_pos;
        let (changes, trailer, stream) = self.base.save_parts();
        let objects = changes.snapshot();

        writer.write_content(&objects, &mut *stream, store_pos)?;
        let xref_pos = stream.get_pos()?;
        let new_eof = writer.write_trailer(trailer, prev, &mut *stream)?;
        stream.truncate(new_eof)?;
        stream.flush()?;
        debug!(
            "{} writer stored {} objects at {store_pos}, xref at {xref_pos}",
            writer.name(),
            objects.len()
        );

        if !new_revision {
            return Ok(());
        }

        self.store_pos = new_eof;
        self.base.reopen(xref_pos)?;
        self.revisions.insert(0, xref_pos);
        info!(
            "Saved new revision with xref at {xref_pos}, {} revision(s) now",
            self.revisions.len()
        );
        Ok(())
    }

    /// Make revision `n` (0 is the newest) the active one
    ///
    /// Pending changes are discarded. Revisions other than 0 are read-only.
    pub fn change_revision(&mut self, n: usize) -> Result<()> {
        if self.linearized.is_some() {
            warn!("Revision change requested on a linearized document");
            return Err(PdfError::NotImplemented(
                "changing revisions of a linearized document".to_string(),
            ));
        }
        if n == self.revision {
            return Ok(());
        }
        let offset = *self.revisions.get(n).ok_or(PdfError::OutOfRange {
            index: n,
            count: self.revisions.len(),
        })?;

        self.base.reopen(offset)?;
        self.revision = n;
        info!("Revision changed to {n}");
        Ok(())
    }

    /// Position just past the `startxref` offset line of the section at `xref_start`
    pub fn revision_end(&mut self, xref_start: u64) -> Result<u64> {
        let stream = self.base.stream_mut();
        let pos = stream.get_pos()?;
        stream.set_pos(xref_start)?;
        while let Some(line) = stream.get_line()? {
            if line.starts_with(b"startxref") {
                stream.get_line()?;
                break;
            }
        }
        let end = stream.get_pos()?;
        stream.set_pos(pos)?;
        Ok(end)
    }

    /// Bytes that revision `rev` adds on top of the revision before it
    ///
    /// With `include_xref` the count runs to the end of the `startxref`
    /// block, otherwise to the start of the xref section.
    pub fn revision_size(&mut self, rev: usize, include_xref: bool) -> Result<u64> {
        let start = *self.revisions.get(rev).ok_or(PdfError::OutOfRange {
            index: rev,
            count: self.revisions.len(),
        })?;
        let rev_start = if include_xref {
            self.revision_end(start)?
        } else {
            start
        };
        let prev_end = match self.revisions.get(rev + 1) {
            Some(&prev) => self.revision_end(prev)?,
            None => 0,
        };

        if rev_start <= prev_end {
            warn!("Revision {rev} ends at {rev_start}, not after the previous one at {prev_end}");
            return Ok(0);
        }
        Ok(rev_start - prev_end)
    }

    /// Copy the file as it was at the active revision into `out`
    pub fn clone_revision<W: Write>(&mut self, out: &mut W) -> Result<()> {
        if self.linearized.is_some() {
            return Err(PdfError::NotImplemented(
                "cloning revisions of a linearized document".to_string(),
            ));
        }
        let start = *self.revisions.get(self.revision).ok_or(PdfError::OutOfRange {
            index: self.revision,
            count: self.revisions.len(),
        })?;

        let end = self.revision_end(start)?;
        let stream = self.base.stream_mut();
        let pos = stream.get_pos()?;
        debug!("Cloning revision {} ({end} bytes)", self.revision);
        stream.clone_range(out, 0, end)?;
        stream.set_pos(pos)?;

        out.write_all(b"%%EOF\n")?;
        out.flush()?;
        Ok(())
    }

    /// Install a writer strategy, returning the previous one
    pub fn set_pdf_writer(
        &mut self,
        writer: Option<Box<dyn PdfWriter>>,
    ) -> Option<Box<dyn PdfWriter>> {
        std::mem::replace(&mut self.pdf_writer, writer)
    }

    pub fn set_mode(&mut self, mode: WriteMode) {
        self.mode = mode;
    }

    pub fn mode(&self) -> WriteMode {
        self.mode
    }

    /// Consult `policy` before every change; it is not kept alive
    pub fn set_policy(&mut self, policy: &Rc<dyn PolicyProbe>) {
        self.policy = Some(Rc::downgrade(policy));
    }

    pub fn clear_policy(&mut self) {
        self.policy = None;
    }

    pub fn is_linearized(&self) -> bool {
        self.linearized.is_some()
    }

    /// Reference of the linearization dictionary
    pub fn linearized_ref(&self) -> Option<ObjRef> {
        self.linearized
    }

    /// Where the next revision will be written
    pub fn store_pos(&self) -> u64 {
        self.store_pos
    }

    pub fn revision_count(&self) -> usize {
        self.revisions.len()
    }

    /// Index of the active revision, 0 being the newest
    pub fn actual_revision(&self) -> usize {
        self.revision
    }

    /// Xref section offsets, newest first
    pub fn revisions(&self) -> &[u64] {
        &self.revisions
    }

    /// Why revision discovery stopped; `None` for linearized documents
    pub fn revision_scan_end(&self) -> Option<RevisionScanEnd> {
        self.scan_end
    }

    pub fn has_unsaved_changes(&self) -> bool {
        !self.base.changes().is_empty()
    }

    pub fn fetch(&mut self, reference: ObjRef) -> Result<PdfObject> {
        self.base.fetch(reference)
    }

    pub fn knows_ref(&self, reference: ObjRef) -> RefState {
        self.base.knows_ref(reference)
    }

    pub fn trailer(&self) -> &PdfDictionary {
        self.base.trailer()
    }

    pub fn num_objects(&self) -> u32 {
        self.base.num_objects()
    }

    pub fn into_inner(self) -> S {
        self.base.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::test_helpers::{create_pdf_with_info, create_two_revision_pdf, PdfBuilder};
    use crate::parser::{PdfName, PdfString};
    use std::cell::Cell;
    use std::io::Cursor;

    struct Policy(Cell<bool>);

    impl PolicyProbe for Policy {
        fn is_read_only(&self) -> bool {
            self.0.get()
        }
    }

    fn open(data: Vec<u8>) -> XRefWriter<Cursor<Vec<u8>>> {
        XRefWriter::new(Cursor::new(data)).unwrap()
    }

    fn info_with_title(title: &str) -> PdfObject {
        let mut dict = PdfDictionary::new();
        dict.insert("Title", PdfObject::String(PdfString::from(title)));
        PdfObject::Dictionary(dict)
    }

    #[test]
    fn test_type_compatible() {
        let int = PdfObject::Integer(1);
        let real = PdfObject::Real(1.0);
        assert!(type_compatible(&int, &PdfObject::Integer(2)));
        assert!(!type_compatible(&int, &real));
        assert!(type_compatible(&PdfObject::Null, &real));
        assert!(!type_compatible(&real, &PdfObject::Null));
        assert!(type_compatible(
            &PdfObject::Reference(ObjRef::new(1, 0)),
            &PdfObject::Reference(ObjRef::new(9, 0))
        ));
    }

    #[test]
    fn test_open_collects_revisions() {
        let xrw = open(create_two_revision_pdf());
        assert_eq!(xrw.revision_count(), 2);
        assert_eq!(xrw.actual_revision(), 0);
        assert!(!xrw.is_linearized());
        assert_eq!(xrw.revision_scan_end(), Some(RevisionScanEnd::NoPrev));
        assert!(xrw.revisions()[0] > xrw.revisions()[1]);
    }

    #[test]
    fn test_paranoid_rejections() {
        let mut xrw = open(create_pdf_with_info());

        let err = xrw
            .change_object(ObjRef::new(3, 0), PdfObject::Integer(1))
            .unwrap_err();
        assert!(matches!(err, PdfError::BadType(_)));

        let err = xrw
            .change_object(ObjRef::new(30, 0), PdfObject::Integer(1))
            .unwrap_err();
        assert!(matches!(err, PdfError::BadType(_)));

        let err = xrw
            .change_trailer("Size", PdfObject::Name(PdfName::new("X")))
            .unwrap_err();
        assert!(matches!(err, PdfError::BadType(_)));
        assert_eq!(xrw.trailer().get("Size"), Some(&PdfObject::Integer(4)));
        assert!(!xrw.has_unsaved_changes());
    }

    #[test]
    fn test_easy_mode_accepts_anything() {
        let mut xrw = open(create_pdf_with_info());
        xrw.set_mode(WriteMode::Easy);
        xrw.change_object(ObjRef::new(3, 0), PdfObject::Integer(1))
            .unwrap();
        xrw.change_object(ObjRef::new(30, 0), PdfObject::Integer(1))
            .unwrap();
        assert_eq!(xrw.fetch(ObjRef::new(3, 0)).unwrap(), PdfObject::Integer(1));
    }

    #[test]
    fn test_reserved_ref_accepts_any_type() {
        let mut xrw = open(create_pdf_with_info());
        let reference = xrw.reserve_ref().unwrap();
        assert_eq!(xrw.knows_ref(reference), RefState::Uninitialized);
        xrw.change_object(reference, PdfObject::Real(2.5)).unwrap();
        assert_eq!(xrw.knows_ref(reference), RefState::Initialized);
    }

    #[test]
    fn test_change_trailer_returns_previous() {
        let mut xrw = open(create_pdf_with_info());
        let previous = xrw
            .change_trailer("Info", PdfObject::Reference(ObjRef::new(2, 0)))
            .unwrap();
        assert_eq!(previous, Some(PdfObject::Reference(ObjRef::new(3, 0))));
        let absent = xrw
            .change_trailer("Custom", PdfObject::Boolean(true))
            .unwrap();
        assert_eq!(absent, None);
    }

    #[test]
    fn test_policy_gate_and_weak_reference() {
        let mut xrw = open(create_pdf_with_info());
        let policy = Rc::new(Policy(Cell::new(true)));
        let probe: Rc<dyn PolicyProbe> = policy.clone();
        xrw.set_policy(&probe);
        drop(probe);

        assert!(matches!(xrw.reserve_ref(), Err(PdfError::ReadOnlyDocument)));
        assert!(matches!(
            xrw.create_object(ObjectKind::Dictionary, false),
            Err(PdfError::ReadOnlyDocument)
        ));

        policy.0.set(false);
        assert!(xrw.reserve_ref().is_ok());

        policy.0.set(true);
        drop(policy);
        // dropped policy means no policy
        assert!(xrw.reserve_ref().is_ok());
    }

    #[test]
    fn test_save_new_revision() {
        let mut xrw = open(create_pdf_with_info());
        let info = ObjRef::new(3, 0);
        let old_xref = xrw.revisions()[0];
        xrw.change_object(info, info_with_title("Hello")).unwrap();
        xrw.save_changes(true).unwrap();

        assert_eq!(xrw.revision_count(), 2);
        assert_eq!(xrw.revisions()[1], old_xref);
        assert!(!xrw.has_unsaved_changes());
        let len = xrw.base.stream_mut().len().unwrap();
        assert_eq!(xrw.store_pos(), len);
        assert_eq!(xrw.fetch(info).unwrap(), info_with_title("Hello"));

        xrw.change_revision(1).unwrap();
        let old_title = xrw.fetch(info).unwrap();
        assert_eq!(
            old_title.as_dict().and_then(|d| d.get("Title")),
            Some(&PdfObject::String(PdfString::from("A")))
        );
    }

    #[test]
    fn test_save_without_changes_leaves_file() {
        let data = create_pdf_with_info();
        let mut xrw = open(data.clone());
        xrw.save_changes(true).unwrap();
        assert_eq!(xrw.revision_count(), 1);
        assert_eq!(xrw.into_inner().into_inner(), data);
    }

    #[test]
    fn test_no_writer() {
        let mut xrw = open(create_pdf_with_info());
        assert!(xrw.set_pdf_writer(None).is_some());
        xrw.change_object(ObjRef::new(3, 0), info_with_title("x"))
            .unwrap();
        assert!(matches!(xrw.save_changes(true), Err(PdfError::NoWriter)));
    }

    #[test]
    fn test_temporary_save_is_overwritten() {
        let mut xrw = open(create_pdf_with_info());
        let store_pos = xrw.store_pos();
        xrw.change_object(ObjRef::new(3, 0), info_with_title("a long title to shrink later"))
            .unwrap();
        xrw.save_changes(false).unwrap();
        assert_eq!(xrw.store_pos(), store_pos);
        assert_eq!(xrw.revision_count(), 1);

        xrw.change_object(ObjRef::new(3, 0), info_with_title("b")).unwrap();
        xrw.save_changes(false).unwrap();
        let first = xrw.into_inner().into_inner();

        let mut direct = open(create_pdf_with_info());
        direct.change_object(ObjRef::new(3, 0), info_with_title("b")).unwrap();
        direct.save_changes(false).unwrap();
        assert_eq!(first, direct.into_inner().into_inner());
    }

    #[test]
    fn test_older_revision_is_read_only() {
        let mut xrw = open(create_two_revision_pdf());
        xrw.change_revision(1).unwrap();
        assert_eq!(xrw.actual_revision(), 1);

        assert!(matches!(
            xrw.change_object(ObjRef::new(3, 0), info_with_title("x")),
            Err(PdfError::ReadOnlyRevision)
        ));
        assert!(matches!(
            xrw.change_trailer("Size", PdfObject::Integer(1)),
            Err(PdfError::ReadOnlyRevision)
        ));
        assert!(matches!(xrw.reserve_ref(), Err(PdfError::ReadOnlyRevision)));

        assert!(matches!(
            xrw.change_revision(2),
            Err(PdfError::OutOfRange { index: 2, count: 2 })
        ));
        xrw.change_revision(0).unwrap();
        assert!(xrw.reserve_ref().is_ok());
    }

    #[test]
    fn test_revision_sizes_cover_file() {
        let data = create_two_revision_pdf();
        let len = data.len() as u64;
        let mut xrw = open(data);

        let total: u64 = (0..xrw.revision_count())
            .map(|r| xrw.revision_size(r, true).unwrap())
            .sum();
        assert_eq!(total + b"%%EOF\n".len() as u64, len);

        let without_xref = xrw.revision_size(0, false).unwrap();
        assert!(without_xref < xrw.revision_size(0, true).unwrap());
        assert!(matches!(
            xrw.revision_size(5, true),
            Err(PdfError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_clone_older_revision() {
        let mut xrw = open(create_two_revision_pdf());
        xrw.change_revision(1).unwrap();
        let end = xrw.revision_end(xrw.revisions()[1]).unwrap();

        let mut out = Vec::new();
        xrw.clone_revision(&mut out).unwrap();
        assert_eq!(out.len() as u64, end + 6);

        let clone = open(out);
        assert_eq!(clone.revision_count(), 1);
    }

    #[test]
    fn test_linearized_document() {
        let mut builder = PdfBuilder::new("1.5");
        builder.revision(
            &[
                (1, "<< /Linearized 1 /L 1000 >>"),
                (2, "<< /Type /Catalog >>"),
            ],
            "/Root 2 0 R",
        );
        let mut xrw = open(builder.finish());

        assert!(xrw.is_linearized());
        assert_eq!(xrw.linearized_ref(), Some(ObjRef::new(1, 0)));
        assert!(xrw.revisions().is_empty());
        assert_eq!(xrw.revision_scan_end(), None);
        assert!(matches!(
            xrw.change_revision(0),
            Err(PdfError::NotImplemented(_))
        ));
        assert!(matches!(
            xrw.clone_revision(&mut Vec::new()),
            Err(PdfError::NotImplemented(_))
        ));

        let catalog = ObjRef::new(2, 0);
        let mut dict = PdfDictionary::new();
        dict.insert("Type", PdfObject::Name(PdfName::new("Catalog")));
        xrw.change_object(catalog, PdfObject::Dictionary(dict)).unwrap();
        xrw.save_changes(true).unwrap();
        assert_eq!(xrw.revision_count(), 1);
    }
}
