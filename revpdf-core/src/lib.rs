//! # revpdf
//!
//! Incremental updates for existing PDF files.
//!
//! A PDF grows by appending: each update adds the changed objects, a new
//! cross-reference section and a trailer pointing back at the previous
//! section. `revpdf` reads that chain, lets you change objects and trailer
//! entries with type checking, and appends the changes as a new revision
//! without touching the bytes that are already there.
//!
//! ## Features
//!
//! - **Revision discovery**: walks the trailer `Prev` chain through classic
//!   xref tables and xref streams, stopping cleanly on damaged chains
//! - **Checked changes**: paranoid mode refuses changes that would alter an
//!   object's type or touch unallocated references
//! - **Pluggable writers**: classic xref tables by default, PDF 1.5 xref
//!   streams on request
//! - **Revision browsing**: switch to any older revision read-only, or
//!   extract it as a standalone file
//! - **Linearization detection**: linearized files are recognized and
//!   handled conservatively
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use revpdf::parser::{ObjRef, PdfDictionary, PdfObject, PdfString};
//! use revpdf::XRefWriter;
//!
//! # fn main() -> revpdf::Result<()> {
//! let mut xrw = XRefWriter::open("document.pdf")?;
//! println!("{} revision(s)", xrw.revision_count());
//!
//! let mut info = PdfDictionary::new();
//! info.insert("Title", PdfObject::String(PdfString::from("Hello")));
//! let info_ref = xrw.reserve_ref()?;
//! xrw.change_object(info_ref, PdfObject::Dictionary(info))?;
//! xrw.change_trailer("Info", PdfObject::Reference(info_ref))?;
//!
//! xrw.save_changes(true)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Browsing revisions
//!
//! ```rust,no_run
//! use revpdf::XRefWriter;
//! use std::fs::File;
//!
//! # fn main() -> revpdf::Result<()> {
//! let mut xrw = XRefWriter::open("document.pdf")?;
//! let oldest = xrw.revision_count() - 1;
//! xrw.change_revision(oldest)?;
//! xrw.clone_revision(&mut File::create("original.pdf")?)?;
//! # Ok(())
//! # }
//! ```

pub mod compression;
pub mod error;
pub mod io;
pub mod parser;
pub mod writer;
pub mod xref;

pub use error::{PdfError, Result};
pub use io::PdfStorage;
pub use parser::{ObjRef, ObjectKind, PdfObject};
pub use writer::{PdfWriter, WriterConfig, XRefStyle};
pub use xref::{PolicyProbe, RefState, RevisionScanEnd, WriteMode, XRefWriter, XRefWriterOptions};

/// Current version of revpdf
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
