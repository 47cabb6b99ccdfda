//! Pending object changes
//!
//! Objects changed since the last promoted save live here until
//! [`XRefWriter::save_changes`](super::XRefWriter::save_changes) writes
//! them. Entries keep insertion order so a save writes objects in the
//! order they were first changed.

use crate::parser::{ObjRef, PdfObject};
use indexmap::IndexMap;
use std::collections::HashSet;

/// In-memory buffer of changed objects and reserved references
#[derive(Debug, Default)]
pub struct ChangeStore {
    objects: IndexMap<ObjRef, PdfObject>,
    reserved: HashSet<ObjRef>,
}

impl ChangeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `object` under `reference`, returning the value it replaces
    pub fn insert(&mut self, reference: ObjRef, object: PdfObject) -> Option<PdfObject> {
        self.reserved.remove(&reference);
        self.objects.insert(reference, object)
    }

    pub fn get(&self, reference: ObjRef) -> Option<&PdfObject> {
        self.objects.get(&reference)
    }

    pub fn contains(&self, reference: ObjRef) -> bool {
        self.objects.contains_key(&reference)
    }

    /// Mark `reference` as allocated without a body
    pub fn reserve(&mut self, reference: ObjRef) {
        if !self.objects.contains_key(&reference) {
            self.reserved.insert(reference);
        }
    }

    pub fn is_reserved(&self, reference: ObjRef) -> bool {
        self.reserved.contains(&reference)
    }

    /// Number of changed objects (reservations are not counted)
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn clear(&mut self) {
        self.objects.clear();
        self.reserved.clear();
    }

    /// Changed objects in insertion order
    pub fn snapshot(&self) -> Vec<(ObjRef, &PdfObject)> {
        self.objects.iter().map(|(r, o)| (*r, o)).collect()
    }

    /// Highest object number changed or reserved
    pub fn max_object_number(&self) -> Option<u32> {
        self.objects
            .keys()
            .chain(self.reserved.iter())
            .map(|r| r.num)
            .max()
    }
}
