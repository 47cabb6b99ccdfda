use crate::parser::ParseError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PdfError {
    #[error("Revision is read-only: only the newest revision can be changed")]
    ReadOnlyRevision,

    #[error("Document is opened read-only")]
    ReadOnlyDocument,

    #[error("Bad type: {0}")]
    BadType(String),

    #[error("Revision {index} out of range ({count} revisions)")]
    OutOfRange { index: usize, count: usize },

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("No PDF writer installed")]
    NoWriter,

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PdfError>;
