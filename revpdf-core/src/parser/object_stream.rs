//! PDF Object Stream Parser
//!
//! Handles compressed objects stored in object streams (PDF 1.5+)

use super::lexer::{Lexer, Token};
use super::objects::{PdfObject, PdfStream};
use super::{ParseError, ParseResult};
use std::io::Cursor;

/// A decoded object stream (`/Type /ObjStm`)
#[derive(Debug)]
pub struct ObjectStream {
    /// Number of objects in the stream
    n: u32,
    /// Offset of first object
    first: u32,
    /// Objects in stream order, with their object numbers
    objects: Vec<(u32, PdfObject)>,
}

impl ObjectStream {
    /// Parse an object stream
    pub fn parse(stream: &PdfStream) -> ParseResult<Self> {
        let dict = &stream.dict;

        let n = dict
            .get("N")
            .and_then(|obj| obj.as_integer())
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| ParseError::MissingKey("N".to_string()))?;

        let first = dict
            .get("First")
            .and_then(|obj| obj.as_integer())
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| ParseError::MissingKey("First".to_string()))?;

        let data = stream.decode()?;
        let objects = Self::parse_objects(&data, n, first)?;

        Ok(ObjectStream { n, first, objects })
    }

    fn parse_objects(data: &[u8], n: u32, first: u32) -> ParseResult<Vec<(u32, PdfObject)>> {
        let mut header = Lexer::new(Cursor::new(data));
        let mut offsets = Vec::with_capacity(n as usize);
        for _ in 0..n {
            let obj_num = Self::header_int(&mut header, "object number")?;
            let offset = Self::header_int(&mut header, "offset")?;
            offsets.push((obj_num, offset));
        }

        let mut objects = Vec::with_capacity(offsets.len());
        for (obj_num, offset) in offsets {
            let start = first as usize + offset as usize;
            let body = data.get(start..).ok_or_else(|| ParseError::SyntaxError {
                position: start,
                message: format!("Object {obj_num} offset past end of object stream"),
            })?;
            let mut lexer = Lexer::new(Cursor::new(body));
            objects.push((obj_num, PdfObject::parse(&mut lexer)?));
        }

        Ok(objects)
    }

    fn header_int(lexer: &mut Lexer<Cursor<&[u8]>>, what: &str) -> ParseResult<u32> {
        match lexer.next_token()? {
            Token::Integer(n) if n >= 0 && n <= u32::MAX as i64 => Ok(n as u32),
            other => Err(ParseError::UnexpectedToken {
                expected: format!("{what} in object stream header"),
                found: format!("{other:?}"),
            }),
        }
    }

    /// Object at `index` in stream order, with its object number
    pub fn get_by_index(&self, index: u32) -> Option<(u32, &PdfObject)> {
        self.objects
            .get(index as usize)
            .map(|(num, obj)| (*num, obj))
    }

    /// Get an object by its object number
    pub fn get_object(&self, obj_num: u32) -> Option<&PdfObject> {
        self.objects
            .iter()
            .find(|(num, _)| *num == obj_num)
            .map(|(_, obj)| obj)
    }

    pub fn len(&self) -> usize {
        self.n as usize
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn first(&self) -> u32 {
        self.first
    }
}
