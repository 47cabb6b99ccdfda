//! PDF Object Parser
//!
//! Parses PDF objects from tokens according to ISO 32000-1 Section 7.3

use super::lexer::{Lexer, Token};
use super::{ParseError, ParseResult};
use indexmap::IndexMap;
use std::borrow::Borrow;
use std::fmt;
use std::io::Read;

/// Indirect object reference: object number and generation number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ObjRef {
    pub num: u32,
    pub gen: u16,
}

impl ObjRef {
    pub fn new(num: u32, gen: u16) -> Self {
        Self { num, gen }
    }
}

impl fmt::Display for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} R", self.num, self.gen)
    }
}

impl From<(u32, u16)> for ObjRef {
    fn from((num, gen): (u32, u16)) -> Self {
        Self { num, gen }
    }
}

/// Type tag of a [`PdfObject`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Null,
    Boolean,
    Integer,
    Real,
    String,
    Name,
    Array,
    Dictionary,
    Stream,
    Reference,
    Command,
}

impl ObjectKind {
    /// All kinds, in declaration order
    pub const ALL: [ObjectKind; 11] = [
        ObjectKind::Null,
        ObjectKind::Boolean,
        ObjectKind::Integer,
        ObjectKind::Real,
        ObjectKind::String,
        ObjectKind::Name,
        ObjectKind::Array,
        ObjectKind::Dictionary,
        ObjectKind::Stream,
        ObjectKind::Reference,
        ObjectKind::Command,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Null => "null",
            ObjectKind::Boolean => "bool",
            ObjectKind::Integer => "int",
            ObjectKind::Real => "real",
            ObjectKind::String => "string",
            ObjectKind::Name => "name",
            ObjectKind::Array => "array",
            ObjectKind::Dictionary => "dict",
            ObjectKind::Stream => "stream",
            ObjectKind::Reference => "ref",
            ObjectKind::Command => "cmd",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// PDF Name object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PdfName(pub String);

impl Borrow<str> for PdfName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// PDF String object
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PdfString(pub Vec<u8>);

/// PDF Array object
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PdfArray(pub Vec<PdfObject>);

/// PDF Dictionary object, keys kept in insertion order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PdfDictionary(pub IndexMap<PdfName, PdfObject>);

/// PDF Stream object
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PdfStream {
    pub dict: PdfDictionary,
    pub data: Vec<u8>,
}

impl PdfStream {
    pub fn new(dict: PdfDictionary, data: Vec<u8>) -> Self {
        Self { dict, data }
    }

    /// Get the decompressed stream data
    pub fn decode(&self) -> ParseResult<Vec<u8>> {
        super::filters::decode_stream(&self.data, &self.dict)
    }

    /// Get the raw (possibly compressed) stream data
    pub fn raw_data(&self) -> &[u8] {
        &self.data
    }
}

/// PDF Object types
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PdfObject {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    String(PdfString),
    Name(PdfName),
    Array(PdfArray),
    Dictionary(PdfDictionary),
    Stream(PdfStream),
    Reference(ObjRef),
    /// Bare keyword outside of a data structure (`obj`, `xref`, operators)
    Command(String),
}

impl PdfObject {
    /// Parse a PDF object from a lexer
    pub fn parse<R: Read>(lexer: &mut Lexer<R>) -> ParseResult<Self> {
        let token = lexer.next_token()?;
        Self::parse_from_token(lexer, token)
    }

    /// Parse an indirect object `num gen obj ... endobj`
    ///
    /// The closing `endobj` is optional; when something else follows the
    /// body that token is left in the lexer.
    pub fn parse_indirect<R: Read>(lexer: &mut Lexer<R>) -> ParseResult<(ObjRef, Self)> {
        let num = match Self::next_significant(lexer)? {
            Token::Integer(n) if n >= 0 && n <= u32::MAX as i64 => n as u32,
            other => {
                return Err(ParseError::UnexpectedToken {
                    expected: "object number".to_string(),
                    found: format!("{other:?}"),
                })
            }
        };
        let gen = match lexer.next_token()? {
            Token::Integer(g) if (0..=u16::MAX as i64).contains(&g) => g as u16,
            other => {
                return Err(ParseError::UnexpectedToken {
                    expected: "generation number".to_string(),
                    found: format!("{other:?}"),
                })
            }
        };
        lexer.expect_keyword("obj")?;

        let object = Self::parse(lexer)?;
        match lexer.next_token()? {
            Token::EndObj => {}
            other => lexer.push_token(other),
        }

        Ok((ObjRef::new(num, gen), object))
    }

    fn next_significant<R: Read>(lexer: &mut Lexer<R>) -> ParseResult<Token> {
        loop {
            match lexer.next_token()? {
                Token::Comment(_) => continue,
                token => return Ok(token),
            }
        }
    }

    /// Parse a PDF object starting from a specific token
    fn parse_from_token<R: Read>(lexer: &mut Lexer<R>, token: Token) -> ParseResult<Self> {
        match token {
            Token::Null => Ok(PdfObject::Null),
            Token::Boolean(b) => Ok(PdfObject::Boolean(b)),
            Token::Integer(i) => Self::parse_integer_or_reference(lexer, i),
            Token::Real(r) => Ok(PdfObject::Real(r)),
            Token::String(s) => Ok(PdfObject::String(PdfString(s))),
            Token::Name(n) => Ok(PdfObject::Name(PdfName(n))),
            Token::ArrayStart => Self::parse_array(lexer),
            Token::DictStart => Self::parse_dictionary_or_stream(lexer),
            Token::Comment(_) => {
                // Skip comments and parse next object
                Self::parse(lexer)
            }
            Token::Eof => Err(ParseError::SyntaxError {
                position: lexer.position(),
                message: "Unexpected end of file".to_string(),
            }),
            ref other => match other.keyword() {
                Some(word) => Ok(PdfObject::Command(word.to_string())),
                None => Err(ParseError::UnexpectedToken {
                    expected: "PDF object".to_string(),
                    found: format!("{token:?}"),
                }),
            },
        }
    }

    /// An integer may start a `num gen R` reference; look two tokens ahead
    fn parse_integer_or_reference<R: Read>(lexer: &mut Lexer<R>, value: i64) -> ParseResult<Self> {
        if !(0..=u32::MAX as i64).contains(&value) {
            return Ok(PdfObject::Integer(value));
        }

        let second = lexer.next_token()?;
        let gen = match second {
            Token::Integer(g) if (0..=u16::MAX as i64).contains(&g) => g,
            other => {
                lexer.push_token(other);
                return Ok(PdfObject::Integer(value));
            }
        };

        let third = lexer.next_token()?;
        if matches!(&third, Token::Keyword(word) if word == "R") {
            return Ok(PdfObject::Reference(ObjRef::new(value as u32, gen as u16)));
        }

        // Not a reference: the buffer is a stack, so push in reverse order
        lexer.push_token(third);
        lexer.push_token(Token::Integer(gen));
        Ok(PdfObject::Integer(value))
    }

    /// Parse a PDF array
    fn parse_array<R: Read>(lexer: &mut Lexer<R>) -> ParseResult<Self> {
        let mut elements = Vec::new();

        loop {
            let token = lexer.next_token()?;
            match token {
                Token::ArrayEnd => break,
                Token::Comment(_) => continue, // Skip comments
                _ => {
                    let obj = Self::parse_from_token(lexer, token)?;
                    elements.push(obj);
                }
            }
        }

        Ok(PdfObject::Array(PdfArray(elements)))
    }

    /// Parse a PDF dictionary and check if it's followed by a stream
    fn parse_dictionary_or_stream<R: Read>(lexer: &mut Lexer<R>) -> ParseResult<Self> {
        let dict = Self::parse_dictionary_inner(lexer)?;

        // Check if this is followed by a stream
        loop {
            let token = lexer.next_token()?;
            match token {
                Token::Stream => {
                    let data = Self::parse_stream_data(lexer, &dict)?;
                    return Ok(PdfObject::Stream(PdfStream { dict, data }));
                }
                Token::Comment(_) => continue,
                _ => {
                    // Not a stream, just a dictionary
                    lexer.push_token(token);
                    return Ok(PdfObject::Dictionary(dict));
                }
            }
        }
    }

    /// Parse the inner dictionary
    fn parse_dictionary_inner<R: Read>(lexer: &mut Lexer<R>) -> ParseResult<PdfDictionary> {
        let mut dict = IndexMap::new();

        loop {
            let token = lexer.next_token()?;
            match token {
                Token::DictEnd => break,
                Token::Comment(_) => continue,
                Token::Name(key) => {
                    let value = Self::parse(lexer)?;
                    dict.insert(PdfName(key), value);
                }
                _ => {
                    return Err(ParseError::UnexpectedToken {
                        expected: "dictionary key (name) or >>".to_string(),
                        found: format!("{token:?}"),
                    });
                }
            }
        }

        Ok(PdfDictionary(dict))
    }

    /// Parse stream data
    ///
    /// A direct `/Length` is trusted. An indirect or missing one falls back
    /// to scanning for `endstream`.
    fn parse_stream_data<R: Read>(
        lexer: &mut Lexer<R>,
        dict: &PdfDictionary,
    ) -> ParseResult<Vec<u8>> {
        // Skip the newline after 'stream' keyword
        lexer.read_newline()?;

        match dict.get("Length") {
            Some(PdfObject::Integer(len)) if *len >= 0 => {
                let data = lexer.read_bytes(*len as usize)?;
                lexer.skip_whitespace()?;
                match lexer.next_token()? {
                    Token::EndStream => Ok(data),
                    token => Err(ParseError::UnexpectedToken {
                        expected: "endstream".to_string(),
                        found: format!("{token:?}"),
                    }),
                }
            }
            _ => {
                let mut data = lexer.read_until_sequence(b"endstream")?;
                if data.ends_with(b"\r\n") {
                    data.truncate(data.len() - 2);
                } else if data.ends_with(b"\n") || data.ends_with(b"\r") {
                    data.truncate(data.len() - 1);
                }
                Ok(data)
            }
        }
    }

    /// Type tag of this object
    pub fn kind(&self) -> ObjectKind {
        match self {
            PdfObject::Null => ObjectKind::Null,
            PdfObject::Boolean(_) => ObjectKind::Boolean,
            PdfObject::Integer(_) => ObjectKind::Integer,
            PdfObject::Real(_) => ObjectKind::Real,
            PdfObject::String(_) => ObjectKind::String,
            PdfObject::Name(_) => ObjectKind::Name,
            PdfObject::Array(_) => ObjectKind::Array,
            PdfObject::Dictionary(_) => ObjectKind::Dictionary,
            PdfObject::Stream(_) => ObjectKind::Stream,
            PdfObject::Reference(_) => ObjectKind::Reference,
            PdfObject::Command(_) => ObjectKind::Command,
        }
    }

    /// Fresh default value of the given kind
    pub fn default_of(kind: ObjectKind) -> Self {
        match kind {
            ObjectKind::Null => PdfObject::Null,
            ObjectKind::Boolean => PdfObject::Boolean(false),
            ObjectKind::Integer => PdfObject::Integer(0),
            ObjectKind::Real => PdfObject::Real(0.0),
            ObjectKind::String => PdfObject::String(PdfString::default()),
            ObjectKind::Name => PdfObject::Name(PdfName::new(String::new())),
            ObjectKind::Array => PdfObject::Array(PdfArray::new()),
            ObjectKind::Dictionary => PdfObject::Dictionary(PdfDictionary::new()),
            ObjectKind::Stream => PdfObject::Stream(PdfStream::default()),
            ObjectKind::Reference => PdfObject::Reference(ObjRef::default()),
            ObjectKind::Command => PdfObject::Command(String::new()),
        }
    }

    /// Check if this object is null
    pub fn is_null(&self) -> bool {
        matches!(self, PdfObject::Null)
    }

    /// Get as boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PdfObject::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as integer
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            PdfObject::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as real number
    pub fn as_real(&self) -> Option<f64> {
        match self {
            PdfObject::Real(r) => Some(*r),
            PdfObject::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Get as string
    pub fn as_string(&self) -> Option<&PdfString> {
        match self {
            PdfObject::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as name
    pub fn as_name(&self) -> Option<&PdfName> {
        match self {
            PdfObject::Name(n) => Some(n),
            _ => None,
        }
    }

    /// Get as array
    pub fn as_array(&self) -> Option<&PdfArray> {
        match self {
            PdfObject::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Get as dictionary (the dictionary of a stream counts)
    pub fn as_dict(&self) -> Option<&PdfDictionary> {
        match self {
            PdfObject::Dictionary(d) => Some(d),
            PdfObject::Stream(s) => Some(&s.dict),
            _ => None,
        }
    }

    pub fn as_dict_mut(&mut self) -> Option<&mut PdfDictionary> {
        match self {
            PdfObject::Dictionary(d) => Some(d),
            PdfObject::Stream(s) => Some(&mut s.dict),
            _ => None,
        }
    }

    /// Get as stream
    pub fn as_stream(&self) -> Option<&PdfStream> {
        match self {
            PdfObject::Stream(s) => Some(s),
            _ => None,
        }
    }

    /// Get as reference
    pub fn as_reference(&self) -> Option<ObjRef> {
        match self {
            PdfObject::Reference(r) => Some(*r),
            _ => None,
        }
    }

    /// Get as command keyword
    pub fn as_command(&self) -> Option<&str> {
        match self {
            PdfObject::Command(c) => Some(c),
            _ => None,
        }
    }
}

impl From<bool> for PdfObject {
    fn from(value: bool) -> Self {
        PdfObject::Boolean(value)
    }
}

impl From<i64> for PdfObject {
    fn from(value: i64) -> Self {
        PdfObject::Integer(value)
    }
}

impl From<f64> for PdfObject {
    fn from(value: f64) -> Self {
        PdfObject::Real(value)
    }
}

impl From<ObjRef> for PdfObject {
    fn from(value: ObjRef) -> Self {
        PdfObject::Reference(value)
    }
}

impl From<PdfDictionary> for PdfObject {
    fn from(value: PdfDictionary) -> Self {
        PdfObject::Dictionary(value)
    }
}

impl From<PdfArray> for PdfObject {
    fn from(value: PdfArray) -> Self {
        PdfObject::Array(value)
    }
}

impl From<PdfString> for PdfObject {
    fn from(value: PdfString) -> Self {
        PdfObject::String(value)
    }
}

impl From<PdfName> for PdfObject {
    fn from(value: PdfName) -> Self {
        PdfObject::Name(value)
    }
}

impl PdfDictionary {
    /// Create a new empty dictionary
    pub fn new() -> Self {
        PdfDictionary(IndexMap::new())
    }

    /// Get a value by key
    pub fn get(&self, key: &str) -> Option<&PdfObject> {
        self.0.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut PdfObject> {
        self.0.get_mut(key)
    }

    /// Insert a key-value pair, returning the value it replaced
    ///
    /// A replaced key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: PdfObject) -> Option<PdfObject> {
        self.0.insert(PdfName(key.into()), value)
    }

    /// Remove a key, keeping the order of the remaining entries
    pub fn remove(&mut self, key: &str) -> Option<PdfObject> {
        self.0.shift_remove(key)
    }

    /// Check if dictionary contains a key
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Get the dictionary type (value of /Type key)
    pub fn get_type(&self) -> Option<&str> {
        self.get("Type")
            .and_then(|obj| obj.as_name())
            .map(|n| n.0.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PdfName, &PdfObject)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl PdfArray {
    /// Create a new empty array
    pub fn new() -> Self {
        PdfArray(Vec::new())
    }

    /// Get array length
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if array is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get element at index
    pub fn get(&self, index: usize) -> Option<&PdfObject> {
        self.0.get(index)
    }

    /// Push an element
    pub fn push(&mut self, obj: PdfObject) {
        self.0.push(obj);
    }
}

impl PdfString {
    /// Create a new PDF string
    pub fn new(data: Vec<u8>) -> Self {
        PdfString(data)
    }

    /// Get as UTF-8 string if possible
    pub fn as_str(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.0)
    }

    /// Get as bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for PdfString {
    fn from(value: &str) -> Self {
        PdfString(value.as_bytes().to_vec())
    }
}

impl PdfName {
    /// Create a new PDF name
    pub fn new(name: impl Into<String>) -> Self {
        PdfName(name.into())
    }

    /// Get the name as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
