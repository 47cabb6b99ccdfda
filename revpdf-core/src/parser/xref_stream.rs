//! Cross-reference stream support for PDF 1.5+
//!
//! This module implements cross-reference streams according to
//! ISO 32000-1:2008 Section 7.5.8 (Cross-Reference Streams).
//!
//! Cross-reference streams are an alternative to traditional xref tables,
//! providing more compact representation and supporting compressed object streams.

use super::objects::{PdfDictionary, PdfStream};
use super::xref::XRefEntry;
use super::{ParseError, ParseResult};
use tracing::warn;

/// Decoded cross-reference stream
#[derive(Debug, Clone)]
pub struct XRefStream {
    /// Stream dictionary (doubles as the trailer)
    pub dict: PdfDictionary,
    /// Decoded stream data
    pub data: Vec<u8>,
    /// Field widths from W array
    pub widths: [usize; 3],
    /// Index array (pairs of [first_object_number, count])
    pub index: Vec<(u32, u32)>,
}

impl XRefStream {
    /// Decode an xref stream object
    pub fn from_stream(stream: &PdfStream) -> ParseResult<Self> {
        let dict = &stream.dict;

        let w_array = dict
            .get("W")
            .and_then(|obj| obj.as_array())
            .ok_or_else(|| ParseError::MissingKey("W".to_string()))?;
        if w_array.len() != 3 {
            return Err(ParseError::SyntaxError {
                position: 0,
                message: format!("W array must have 3 elements, found {}", w_array.len()),
            });
        }
        let mut widths = [0usize; 3];
        for (slot, obj) in widths.iter_mut().zip(&w_array.0) {
            *slot = obj
                .as_integer()
                .and_then(|n| usize::try_from(n).ok())
                .filter(|n| *n <= 8)
                .ok_or_else(|| ParseError::SyntaxError {
                    position: 0,
                    message: "Invalid width in W array".to_string(),
                })?;
        }

        let index = match dict.get("Index").and_then(|obj| obj.as_array()) {
            Some(array) => {
                if array.len() % 2 != 0 {
                    return Err(ParseError::SyntaxError {
                        position: 0,
                        message: "Index array must have an even number of elements".to_string(),
                    });
                }
                array
                    .0
                    .chunks(2)
                    .map(|pair| {
                        let first = pair[0].as_integer().and_then(|n| u32::try_from(n).ok());
                        let count = pair[1].as_integer().and_then(|n| u32::try_from(n).ok());
                        first.zip(count).ok_or_else(|| ParseError::SyntaxError {
                            position: 0,
                            message: "Index values must be non-negative integers".to_string(),
                        })
                    })
                    .collect::<ParseResult<Vec<_>>>()?
            }
            None => {
                // Default: start at 0, count is Size
                let size = dict
                    .get("Size")
                    .and_then(|obj| obj.as_integer())
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(|| ParseError::MissingKey("Size".to_string()))?;
                vec![(0, size)]
            }
        };

        Ok(XRefStream {
            dict: dict.clone(),
            data: stream.decode()?,
            widths,
            index,
        })
    }

    /// Convert the stream rows into xref entries, in stream order
    pub fn to_xref_entries(&self) -> ParseResult<Vec<(u32, XRefEntry)>> {
        let entry_size = self.widths.iter().sum::<usize>();
        if entry_size == 0 {
            return Err(ParseError::SyntaxError {
                position: 0,
                message: "Invalid entry size (0) in xref stream".to_string(),
            });
        }

        let mut entries = Vec::new();
        let mut rows = self.data.chunks_exact(entry_size);

        for &(first_obj, count) in &self.index {
            for i in 0..count {
                let row = rows.next().ok_or_else(|| ParseError::SyntaxError {
                    position: 0,
                    message: "Xref stream data truncated".to_string(),
                })?;
                let obj_num = first_obj.saturating_add(i);

                let (type_bytes, rest) = row.split_at(self.widths[0]);
                let (field2_bytes, field3_bytes) = rest.split_at(self.widths[1]);
                // A zero-width type field defaults to 1
                let entry_type = if self.widths[0] == 0 {
                    1
                } else {
                    read_field(type_bytes)
                };
                let field2 = read_field(field2_bytes);
                let field3 = read_field(field3_bytes);

                let entry = match entry_type {
                    0 => XRefEntry::Free {
                        next_free: field2 as u32,
                        generation: field3 as u16,
                    },
                    1 => XRefEntry::InUse {
                        offset: field2,
                        generation: field3 as u16,
                    },
                    2 => XRefEntry::Compressed {
                        stream_num: field2 as u32,
                        index: field3 as u32,
                    },
                    other => {
                        // Unknown types are references to the null object
                        warn!("Unknown xref stream entry type {other} for object {obj_num}");
                        continue;
                    }
                };
                entries.push((obj_num, entry));
            }
        }

        Ok(entries)
    }
}

/// Read a big-endian field
pub(crate) fn read_field(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(0u64, |value, &byte| (value << 8) | byte as u64)
}
