//! PDF Parser Module
//!
//! Low-level PDF syntax used by the cross-reference machinery: a lexer,
//! the object model, stream filters and parsers for xref tables, xref
//! streams and object streams, following ISO 32000-1 Section 7.

pub mod filters;
pub mod lexer;
pub mod object_stream;
pub mod objects;
pub mod trailer;
pub mod xref;
pub mod xref_stream;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use self::lexer::{Lexer, Token};
pub use self::objects::{
    ObjRef, ObjectKind, PdfArray, PdfDictionary, PdfName, PdfObject, PdfStream, PdfString,
};
pub use self::trailer::PrevLink;
pub use self::xref::{StartXRef, XRefEntry, XRefSection, XRefTable};

/// Result type for parser operations
pub type ParseResult<T> = Result<T, ParseError>;

/// PDF Parser errors
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Syntax error at position {position}: {message}")]
    SyntaxError { position: usize, message: String },

    #[error("Unexpected token: expected {expected}, found {found}")]
    UnexpectedToken { expected: String, found: String },

    #[error("Invalid object reference: {0} {1} R")]
    InvalidReference(u32, u16),

    #[error("Missing required key: {0}")]
    MissingKey(String),

    #[error("Invalid xref section at offset {0}")]
    InvalidXRef(u64),

    #[error("startxref not found")]
    MissingStartXRef,

    #[error("Invalid trailer")]
    InvalidTrailer,

    #[error("Stream decode error: {0}")]
    StreamDecodeError(String),
}
