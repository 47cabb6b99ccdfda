//! Cross-reference handling and incremental updates
//!
//! [`XRefWriter`] is the entry point: it opens a PDF, finds its revisions,
//! validates changes to objects and to the trailer and appends them as a
//! new revision. [`BaseXRef`] underneath resolves references for the
//! active revision.

mod base;
mod change_store;
pub mod linearization;
mod revisions;
mod writer;

pub use base::{BaseXRef, RefState};
pub use change_store::ChangeStore;
pub use linearization::FIRST_LINEARIZED_BLOCK;
pub use revisions::{collect_revisions, RevisionScanEnd};
pub use writer::{type_compatible, XRefWriter};

use crate::writer::WriterConfig;

/// Document-level policy consulted before every change
pub trait PolicyProbe {
    fn is_read_only(&self) -> bool;
}

/// How strictly changes are validated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Check reference state and type before every change
    #[default]
    Paranoid,
    /// Accept any change
    Easy,
}

/// Options for opening an [`XRefWriter`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XRefWriterOptions {
    pub mode: WriteMode,
    /// Leading bytes searched for a linearization dictionary
    pub linearized_probe_len: u64,
    /// Strategy installed for saving
    pub writer: WriterConfig,
}

impl Default for XRefWriterOptions {
    fn default() -> Self {
        Self {
            mode: WriteMode::default(),
            linearized_probe_len: FIRST_LINEARIZED_BLOCK,
            writer: WriterConfig::default(),
        }
    }
}

impl XRefWriterOptions {
    pub fn with_mode(mut self, mode: WriteMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_linearized_probe_len(mut self, len: u64) -> Self {
        self.linearized_probe_len = len;
        self
    }

    pub fn with_writer(mut self, writer: WriterConfig) -> Self {
        self.writer = writer;
        self
    }
}
