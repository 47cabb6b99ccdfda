//! Cross-reference state of an open PDF
//!
//! [`BaseXRef`] owns the storage, the merged xref table of the active
//! revision, the working trailer and the pending changes. It answers
//! "what is object N G" for the layer above and knows nothing about
//! saving.

use super::change_store::ChangeStore;
use crate::error::Result;
use crate::io::{PdfStorage, SubStream};
use crate::parser::object_stream::ObjectStream;
use crate::parser::xref::find_startxref;
use crate::parser::{
    Lexer, ObjRef, ObjectKind, ParseError, PdfDictionary, PdfObject, XRefEntry, XRefTable,
};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::{debug, warn};

/// What the active revision knows about a reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefState {
    /// Never allocated, or freed
    Unused,
    /// Reserved without an object body
    Uninitialized,
    /// Has a body, in the file or among the pending changes
    Initialized,
}

pub struct BaseXRef<S: PdfStorage> {
    stream: S,
    table: XRefTable,
    trailer: PdfDictionary,
    last_xref_pos: u64,
    eof_pos: u64,
    changes: ChangeStore,
    object_streams: HashMap<u32, ObjectStream>,
}

impl<S: PdfStorage> BaseXRef<S> {
    /// Locate the newest xref section and load the chain behind it
    pub fn open(mut stream: S) -> Result<Self> {
        let start = find_startxref(&mut stream)?;
        let table = XRefTable::load(&mut stream, start.xref_offset)?;
        stream.reset()?;

        debug!(
            "Opened xref at {} ({} entries), end of file data at {}",
            start.xref_offset,
            table.len(),
            start.eof_pos
        );

        Ok(Self {
            stream,
            trailer: table.trailer().clone(),
            table,
            last_xref_pos: start.xref_offset,
            eof_pos: start.eof_pos,
            changes: ChangeStore::new(),
            object_streams: HashMap::new(),
        })
    }

    /// Make the section at `offset` the active one
    ///
    /// Pending changes and trailer edits are discarded.
    pub fn reopen(&mut self, offset: u64) -> Result<()> {
        let pos = self.stream.get_pos()?;
        let table = XRefTable::load(&mut self.stream, offset)?;
        self.stream.set_pos(pos)?;

        self.trailer = table.trailer().clone();
        self.table = table;
        self.last_xref_pos = offset;
        self.changes.clear();
        self.object_streams.clear();
        debug!("Reopened xref at {offset}");
        Ok(())
    }

    pub fn knows_ref(&self, reference: ObjRef) -> RefState {
        if self.changes.contains(reference) {
            RefState::Initialized
        } else if self.changes.is_reserved(reference) {
            RefState::Uninitialized
        } else if self.table.in_use_entry(reference).is_some() {
            RefState::Initialized
        } else {
            RefState::Unused
        }
    }

    /// Current value of `reference`; unknown references are null
    ///
    /// The stream position is left where it was.
    pub fn fetch(&mut self, reference: ObjRef) -> Result<PdfObject> {
        if let Some(object) = self.changes.get(reference) {
            return Ok(object.clone());
        }
        if self.changes.is_reserved(reference) {
            return Ok(PdfObject::Null);
        }
        let entry = match self.table.in_use_entry(reference) {
            Some(entry) => *entry,
            None => {
                debug!("Object {reference} is not in use, fetching as null");
                return Ok(PdfObject::Null);
            }
        };

        let pos = self.stream.get_pos()?;
        let result = self.fetch_entry(reference, entry);
        self.stream.set_pos(pos)?;
        result
    }

    fn fetch_entry(&mut self, reference: ObjRef, entry: XRefEntry) -> Result<PdfObject> {
        match entry {
            XRefEntry::InUse { offset, .. } => read_indirect_at(&mut self.stream, offset, reference),
            XRefEntry::Compressed { stream_num, index } => {
                let object_stream = match self.object_streams.entry(stream_num) {
                    Entry::Occupied(e) => e.into_mut(),
                    Entry::Vacant(e) => {
                        let parsed = load_object_stream(&mut self.stream, &self.table, stream_num)?;
                        e.insert(parsed)
                    }
                };
                match object_stream.get_by_index(index) {
                    Some((num, object)) if num == reference.num => Ok(object.clone()),
                    _ => {
                        warn!("Object {reference} not found at index {index} of object stream {stream_num}");
                        Ok(PdfObject::Null)
                    }
                }
            }
            XRefEntry::Free { .. } => Ok(PdfObject::Null),
        }
    }

    /// Record a new value for `reference`, returning the pending value it replaces
    pub fn change_object(&mut self, reference: ObjRef, object: PdfObject) -> Option<PdfObject> {
        self.changes.insert(reference, object)
    }

    /// Set a trailer entry, returning the previous value
    pub fn change_trailer(&mut self, name: &str, value: PdfObject) -> Option<PdfObject> {
        self.trailer.insert(name, value)
    }

    /// Allocate the next free object number with generation 0
    pub fn reserve_ref(&mut self) -> ObjRef {
        let reference = ObjRef::new(self.num_objects(), 0);
        self.changes.reserve(reference);
        debug!("Reserved {reference}");
        reference
    }

    /// Fresh default object of `kind`, optionally with a reserved reference
    pub fn create_object(&mut self, kind: ObjectKind, want_ref: bool) -> (PdfObject, Option<ObjRef>) {
        let reference = want_ref.then(|| self.reserve_ref());
        (PdfObject::default_of(kind), reference)
    }

    /// One past the highest object number known to the active revision
    pub fn num_objects(&self) -> u32 {
        let size = self
            .trailer
            .get("Size")
            .and_then(|obj| obj.as_integer())
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(0);
        let next = |max: Option<u32>| max.map_or(0, |n| n.saturating_add(1));
        size.max(next(self.table.max_object_number()))
            .max(next(self.changes.max_object_number()))
    }

    pub fn trailer(&self) -> &PdfDictionary {
        &self.trailer
    }

    pub fn table(&self) -> &XRefTable {
        &self.table
    }

    pub fn changes(&self) -> &ChangeStore {
        &self.changes
    }

    /// Offset of the active xref section
    pub fn last_xref_pos(&self) -> u64 {
        self.last_xref_pos
    }

    /// First byte after the newest `%%EOF` line when the file was opened
    pub fn eof_pos(&self) -> u64 {
        self.eof_pos
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Everything a save needs, borrowed at once
    pub(crate) fn save_parts(&mut self) -> (&ChangeStore, &PdfDictionary, &mut S) {
        (&self.changes, &self.trailer, &mut self.stream)
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

/// Parse the indirect object at `offset`, which must be `expected`
pub(crate) fn read_indirect_at<S: PdfStorage>(
    stream: &mut S,
    offset: u64,
    expected: ObjRef,
) -> Result<PdfObject> {
    let mut lexer = Lexer::new(SubStream::new(stream, offset)?);
    let (found, object) = PdfObject::parse_indirect(&mut lexer)?;
    if found != expected {
        warn!("Expected object {expected} at offset {offset}, found {found}");
        return Err(ParseError::InvalidReference(expected.num, expected.gen).into());
    }
    Ok(object)
}

fn load_object_stream<S: PdfStorage>(
    stream: &mut S,
    table: &XRefTable,
    stream_num: u32,
) -> Result<ObjectStream> {
    let reference = ObjRef::new(stream_num, 0);
    let offset = match table.in_use_entry(reference) {
        Some(XRefEntry::InUse { offset, .. }) => *offset,
        _ => return Err(ParseError::InvalidReference(stream_num, 0).into()),
    };
    let object = read_indirect_at(stream, offset, reference)?;
    let data = object.as_stream().ok_or_else(|| ParseError::SyntaxError {
        position: offset as usize,
        message: format!("Object {reference} is not an object stream"),
    })?;
    Ok(ObjectStream::parse(data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::test_helpers::{create_pdf_with_info, create_two_revision_pdf, PdfBuilder};
    use crate::parser::PdfString;
    use std::io::Cursor;

    fn open(data: Vec<u8>) -> BaseXRef<Cursor<Vec<u8>>> {
        BaseXRef::open(Cursor::new(data)).unwrap()
    }

    fn title(object: &PdfObject) -> Vec<u8> {
        object
            .as_dict()
            .and_then(|d| d.get("Title"))
            .and_then(|t| t.as_string())
            .map(|s| s.as_bytes().to_vec())
            .unwrap_or_default()
    }

    #[test]
    fn test_open_and_fetch() {
        let data = create_pdf_with_info();
        let len = data.len() as u64;
        let mut base = open(data);

        assert_eq!(base.eof_pos(), len);
        assert_eq!(base.num_objects(), 4);
        assert_eq!(base.trailer().get("Info"), Some(&PdfObject::Reference(ObjRef::new(3, 0))));

        let info = base.fetch(ObjRef::new(3, 0)).unwrap();
        assert_eq!(title(&info), b"A");
        assert_eq!(base.fetch(ObjRef::new(40, 0)).unwrap(), PdfObject::Null);
        // wrong generation
        assert_eq!(base.fetch(ObjRef::new(3, 1)).unwrap(), PdfObject::Null);
    }

    #[test]
    fn test_fetch_keeps_position() {
        let mut base = open(create_pdf_with_info());
        base.stream_mut().set_pos(5).unwrap();
        base.fetch(ObjRef::new(1, 0)).unwrap();
        assert_eq!(base.stream_mut().get_pos().unwrap(), 5);
    }

    #[test]
    fn test_ref_states() {
        let mut base = open(create_pdf_with_info());
        assert_eq!(base.knows_ref(ObjRef::new(2, 0)), RefState::Initialized);
        assert_eq!(base.knows_ref(ObjRef::new(0, 65535)), RefState::Unused);
        assert_eq!(base.knows_ref(ObjRef::new(9, 0)), RefState::Unused);

        let reserved = base.reserve_ref();
        assert_eq!(reserved, ObjRef::new(4, 0));
        assert_eq!(base.knows_ref(reserved), RefState::Uninitialized);
        assert_eq!(base.fetch(reserved).unwrap(), PdfObject::Null);

        base.change_object(reserved, PdfObject::Integer(5));
        assert_eq!(base.knows_ref(reserved), RefState::Initialized);
        assert_eq!(base.reserve_ref(), ObjRef::new(5, 0));
    }

    #[test]
    fn test_changes_shadow_file_objects() {
        let mut base = open(create_pdf_with_info());
        let info = ObjRef::new(3, 0);
        let mut dict = PdfDictionary::new();
        dict.insert("Title", PdfObject::String(PdfString::from("Z")));

        assert_eq!(base.change_object(info, PdfObject::Dictionary(dict)), None);
        assert_eq!(title(&base.fetch(info).unwrap()), b"Z");

        let previous = base.change_trailer("Size", PdfObject::Integer(10));
        assert_eq!(previous, Some(PdfObject::Integer(4)));
        assert_eq!(base.num_objects(), 10);
    }

    #[test]
    fn test_reopen_older_revision() {
        let data = create_two_revision_pdf();
        let mut base = open(data);
        assert_eq!(title(&base.fetch(ObjRef::new(3, 0)).unwrap()), b"B");
        assert_eq!(base.table().sections().len(), 2);

        let older = base.table().sections()[1];
        base.change_object(ObjRef::new(1, 0), PdfObject::Null);
        base.reopen(older).unwrap();

        assert_eq!(base.last_xref_pos(), older);
        assert!(base.changes().is_empty());
        assert_eq!(title(&base.fetch(ObjRef::new(3, 0)).unwrap()), b"A");
    }

    #[test]
    fn test_create_object() {
        let mut base = open(create_pdf_with_info());
        let (object, reference) = base.create_object(ObjectKind::Array, true);
        assert_eq!(object.kind(), ObjectKind::Array);
        assert_eq!(reference, Some(ObjRef::new(4, 0)));

        let (object, reference) = base.create_object(ObjectKind::Integer, false);
        assert_eq!(object, PdfObject::Integer(0));
        assert_eq!(reference, None);
    }

    #[test]
    fn test_fetch_from_object_stream() {
        let mut builder = PdfBuilder::new("1.5");
        builder.revision(&[(1, "<< /Type /Catalog >>")], "/Root 1 0 R");
        let objstm_body = "<< /Type /ObjStm /N 1 /First 4 /Length 12 >>\nstream\n7 0 (inside)\nendstream";
        builder.revision(&[(5, objstm_body)], "/Root 1 0 R");
        let mut data = builder.finish();

        // Point object 7 into the object stream with a hybrid xref stream
        let stm_offset = data.len() as u64;
        let rows = [2u8, 0, 0, 0, 5, 0];
        let dict = format!(
            "8 0 obj\n<< /Type /XRef /Size 9 /W [1 4 1] /Index [7 1] /Length {} >>\nstream\n",
            rows.len()
        );
        data.extend_from_slice(dict.as_bytes());
        data.extend_from_slice(&rows);
        data.extend_from_slice(b"\nendstream\nendobj\n");

        let prev = find_startxref(&mut Cursor::new(&data)).unwrap().xref_offset;
        let xref = data.len();
        data.extend_from_slice(
            format!(
                "xref\n0 0\ntrailer\n<< /Size 9 /Root 1 0 R /Prev {prev} /XRefStm {stm_offset} >>\nstartxref\n{xref}\n%%EOF\n"
            )
            .as_bytes(),
        );

        let mut base = open(data);
        let inside = base.fetch(ObjRef::new(7, 0)).unwrap();
        assert_eq!(inside, PdfObject::String(PdfString::from("inside")));
    }
}
