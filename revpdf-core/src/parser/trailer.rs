//! PDF Trailer
//!
//! Interpretation of trailer dictionary entries (ISO 32000-1 Section 7.5.5)

use super::objects::{PdfDictionary, PdfObject};

/// What a trailer's `Prev` entry says about the previous section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrevLink {
    /// No `Prev`, or `Prev` is null: this is the oldest section
    Absent,
    /// Byte offset of the previous section
    Offset(u64),
    /// `Prev` is present but not a usable offset
    Invalid,
}

/// Classify the `Prev` entry of a trailer dictionary
pub fn prev_link(dict: &PdfDictionary) -> PrevLink {
    match dict.get("Prev") {
        None | Some(PdfObject::Null) => PrevLink::Absent,
        Some(PdfObject::Integer(i)) => match u64::try_from(*i) {
            Ok(offset) => PrevLink::Offset(offset),
            Err(_) => PrevLink::Invalid,
        },
        Some(_) => PrevLink::Invalid,
    }
}
