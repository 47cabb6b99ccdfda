//! PDF Lexer
//!
//! Tokenizes PDF syntax according to ISO 32000-1 Section 7.2

use super::{ParseError, ParseResult};
use std::io::Read;

/// One lexical unit of PDF syntax
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Boolean(bool),
    Integer(i64),
    Real(f64),
    /// Literal or hex string, decoded
    String(Vec<u8>),
    /// Name without the leading slash, `#xx` escapes resolved
    Name(String),
    ArrayStart,
    ArrayEnd,
    DictStart,
    DictEnd,
    Stream,
    EndStream,
    Obj,
    EndObj,
    XRef,
    Trailer,
    StartXRef,
    /// Any other bare keyword (`R`, `n`, `f`, content operators, ...)
    Keyword(String),
    Null,
    /// Text after `%` up to the end of line
    Comment(String),
    Eof,
}

impl Token {
    /// Keyword text for command-like tokens, `None` for data tokens
    pub fn keyword(&self) -> Option<&str> {
        match self {
            Token::Stream => Some("stream"),
            Token::EndStream => Some("endstream"),
            Token::Obj => Some("obj"),
            Token::EndObj => Some("endobj"),
            Token::XRef => Some("xref"),
            Token::Trailer => Some("trailer"),
            Token::StartXRef => Some("startxref"),
            Token::Keyword(word) => Some(word.as_str()),
            _ => None,
        }
    }
}

/// Pull tokenizer over any `Read` source
pub struct Lexer<R> {
    reader: std::io::BufReader<R>,
    position: usize,
    peek_buffer: Option<u8>,
    token_buffer: Vec<Token>,
}

impl<R: Read> Lexer<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: std::io::BufReader::new(reader),
            position: 0,
            peek_buffer: None,
            token_buffer: Vec::new(),
        }
    }

    /// Get the next token
    pub fn next_token(&mut self) -> ParseResult<Token> {
        if let Some(token) = self.token_buffer.pop() {
            return Ok(token);
        }

        self.skip_whitespace()?;

        let ch = match self.peek_char()? {
            Some(ch) => ch,
            None => return Ok(Token::Eof),
        };

        match ch {
            b'%' => self.read_comment(),
            b'/' => self.read_name(),
            b'(' => self.read_literal_string(),
            b'<' => self.read_angle_bracket(),
            b'>' => {
                self.consume_char()?;
                if self.peek_char()? == Some(b'>') {
                    self.consume_char()?;
                    Ok(Token::DictEnd)
                } else {
                    Err(ParseError::SyntaxError {
                        position: self.position,
                        message: "Expected '>' after '>'".to_string(),
                    })
                }
            }
            b'[' => {
                self.consume_char()?;
                Ok(Token::ArrayStart)
            }
            b']' => {
                self.consume_char()?;
                Ok(Token::ArrayEnd)
            }
            b't' | b'f' => self.read_boolean(),
            b'n' => self.read_null(),
            b'+' | b'-' | b'0'..=b'9' | b'.' => self.read_number(),
            _ if ch.is_ascii_alphabetic() || ch == b'\'' || ch == b'"' || ch == b'*' => {
                self.read_keyword()
            }
            _ => Err(ParseError::SyntaxError {
                position: self.position,
                message: format!("Unexpected character: {}", ch as char),
            }),
        }
    }

    fn peek_char(&mut self) -> ParseResult<Option<u8>> {
        if let Some(ch) = self.peek_buffer {
            return Ok(Some(ch));
        }

        let mut buf = [0u8; 1];
        match self.reader.read_exact(&mut buf) {
            Ok(_) => {
                self.peek_buffer = Some(buf[0]);
                Ok(Some(buf[0]))
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn consume_char(&mut self) -> ParseResult<Option<u8>> {
        let ch = self.peek_char()?;
        if ch.is_some() {
            self.peek_buffer = None;
            self.position += 1;
        }
        Ok(ch)
    }

    /// Skip whitespace and return the number of bytes skipped
    pub(crate) fn skip_whitespace(&mut self) -> ParseResult<usize> {
        let mut count = 0;
        while let Some(ch) = self.peek_char()? {
            if is_whitespace(ch) {
                self.consume_char()?;
                count += 1;
            } else {
                break;
            }
        }
        Ok(count)
    }

    fn read_comment(&mut self) -> ParseResult<Token> {
        self.consume_char()?;
        let mut comment = String::new();

        while let Some(ch) = self.peek_char()? {
            if ch == b'\n' || ch == b'\r' {
                break;
            }
            self.consume_char()?;
            comment.push(ch as char);
        }

        Ok(Token::Comment(comment))
    }

    fn read_name(&mut self) -> ParseResult<Token> {
        self.consume_char()?;
        let mut name = String::new();

        while let Some(ch) = self.peek_char()? {
            if is_whitespace(ch) || is_delimiter(ch) {
                break;
            }
            self.consume_char()?;

            // Handle hex codes in names (e.g., /A#20B means /A B)
            if ch == b'#' {
                let high = self.consume_hex_digit()?;
                let low = self.consume_hex_digit()?;
                name.push(((high << 4) | low) as char);
            } else {
                name.push(ch as char);
            }
        }

        Ok(Token::Name(name))
    }

    fn consume_hex_digit(&mut self) -> ParseResult<u8> {
        let ch = self
            .consume_char()?
            .ok_or_else(|| ParseError::SyntaxError {
                position: self.position,
                message: "Incomplete hex code in name".to_string(),
            })?;
        hex_digit_value(ch).ok_or_else(|| ParseError::SyntaxError {
            position: self.position,
            message: "Invalid hex code in name".to_string(),
        })
    }

    fn read_literal_string(&mut self) -> ParseResult<Token> {
        self.consume_char()?;
        let mut string = Vec::new();
        let mut paren_depth = 1;
        let mut escape = false;

        while paren_depth > 0 {
            let ch = self
                .consume_char()?
                .ok_or_else(|| ParseError::SyntaxError {
                    position: self.position,
                    message: "Unterminated string".to_string(),
                })?;

            if escape {
                escape = false;
                let escaped = match ch {
                    b'n' => b'\n',
                    b'r' => b'\r',
                    b't' => b'\t',
                    b'b' => b'\x08',
                    b'f' => b'\x0C',
                    b'0'..=b'7' => {
                        // Octal escape sequence
                        let mut value = ch - b'0';
                        for _ in 0..2 {
                            match self.peek_char()? {
                                Some(next @ b'0'..=b'7') => {
                                    self.consume_char()?;
                                    value = value.wrapping_mul(8).wrapping_add(next - b'0');
                                }
                                _ => break,
                            }
                        }
                        value
                    }
                    // Escaped end-of-line is a line continuation
                    b'\r' => {
                        if self.peek_char()? == Some(b'\n') {
                            self.consume_char()?;
                        }
                        continue;
                    }
                    b'\n' => continue,
                    _ => ch, // \( \) \\ and unknown escapes are literal
                };
                string.push(escaped);
            } else {
                match ch {
                    b'\\' => escape = true,
                    b'(' => {
                        string.push(ch);
                        paren_depth += 1;
                    }
                    b')' => {
                        paren_depth -= 1;
                        if paren_depth > 0 {
                            string.push(ch);
                        }
                    }
                    _ => string.push(ch),
                }
            }
        }

        Ok(Token::String(string))
    }

    /// `<<` or a hex string
    fn read_angle_bracket(&mut self) -> ParseResult<Token> {
        self.consume_char()?;

        if self.peek_char()? == Some(b'<') {
            self.consume_char()?;
            return Ok(Token::DictStart);
        }

        let mut digits = Vec::new();
        let mut found_end = false;

        while let Some(ch) = self.consume_char()? {
            if ch == b'>' {
                found_end = true;
                break;
            }
            if let Some(value) = hex_digit_value(ch) {
                digits.push(value);
            } else if !is_whitespace(ch) {
                return Err(ParseError::SyntaxError {
                    position: self.position,
                    message: "Invalid character in hex string".to_string(),
                });
            }
        }

        if !found_end {
            return Err(ParseError::SyntaxError {
                position: self.position,
                message: "Unterminated hex string".to_string(),
            });
        }

        // A final odd digit is followed by an implicit 0
        if digits.len() % 2 != 0 {
            digits.push(0);
        }

        let bytes = digits
            .chunks(2)
            .map(|pair| (pair[0] << 4) | pair[1])
            .collect();

        Ok(Token::String(bytes))
    }

    fn read_boolean(&mut self) -> ParseResult<Token> {
        let word = self.read_word()?;
        match word.as_str() {
            "true" => Ok(Token::Boolean(true)),
            "false" => Ok(Token::Boolean(false)),
            _ => Ok(Self::process_keyword(word)),
        }
    }

    fn read_null(&mut self) -> ParseResult<Token> {
        let word = self.read_word()?;
        if word == "null" {
            Ok(Token::Null)
        } else {
            Ok(Self::process_keyword(word))
        }
    }

    /// Read a number (integer or real)
    fn read_number(&mut self) -> ParseResult<Token> {
        let mut number_str = String::new();
        let mut has_dot = false;

        if let Some(ch @ (b'+' | b'-')) = self.peek_char()? {
            self.consume_char()?;
            number_str.push(ch as char);

            if let Some(next) = self.peek_char()? {
                if !next.is_ascii_digit() && next != b'.' {
                    return Err(ParseError::SyntaxError {
                        position: self.position,
                        message: "Expected digit after sign".to_string(),
                    });
                }
            }
        }

        while let Some(ch) = self.peek_char()? {
            match ch {
                b'0'..=b'9' => {
                    self.consume_char()?;
                    number_str.push(ch as char);
                }
                b'.' if !has_dot => {
                    self.consume_char()?;
                    number_str.push(ch as char);
                    has_dot = true;
                }
                _ => break,
            }
        }

        if has_dot {
            // "5." and ".5" are both valid PDF reals
            let normalized = if number_str.ends_with('.') {
                format!("{number_str}0")
            } else {
                number_str.clone()
            };
            let value = normalized
                .parse::<f64>()
                .map_err(|_| ParseError::SyntaxError {
                    position: self.position,
                    message: format!("Invalid real number: '{number_str}'"),
                })?;
            Ok(Token::Real(value))
        } else {
            let value = number_str
                .parse::<i64>()
                .map_err(|_| ParseError::SyntaxError {
                    position: self.position,
                    message: format!("Invalid integer: '{number_str}'"),
                })?;
            Ok(Token::Integer(value))
        }
    }

    fn read_keyword(&mut self) -> ParseResult<Token> {
        let word = self.read_word()?;
        Ok(Self::process_keyword(word))
    }

    fn process_keyword(word: String) -> Token {
        match word.as_str() {
            "stream" => Token::Stream,
            "endstream" => Token::EndStream,
            "obj" => Token::Obj,
            "endobj" => Token::EndObj,
            "xref" => Token::XRef,
            "trailer" => Token::Trailer,
            "startxref" => Token::StartXRef,
            _ => Token::Keyword(word),
        }
    }

    fn read_word(&mut self) -> ParseResult<String> {
        let mut word = String::new();

        while let Some(ch) = self.peek_char()? {
            if is_whitespace(ch) || is_delimiter(ch) {
                break;
            }
            self.consume_char()?;
            word.push(ch as char);
        }

        Ok(word)
    }

    /// Read a newline sequence (CR, LF, or CRLF)
    pub fn read_newline(&mut self) -> ParseResult<()> {
        match self.peek_char()? {
            Some(b'\r') => {
                self.consume_char()?;
                if self.peek_char()? == Some(b'\n') {
                    self.consume_char()?;
                }
                Ok(())
            }
            Some(b'\n') => {
                self.consume_char()?;
                Ok(())
            }
            _ => Err(ParseError::SyntaxError {
                position: self.position,
                message: "Expected newline".to_string(),
            }),
        }
    }

    /// Read exactly n bytes
    ///
    /// The buffer grows with the data actually read, so a bogus `n` taken
    /// from a damaged `/Length` fails as a short read.
    pub fn read_bytes(&mut self, n: usize) -> ParseResult<Vec<u8>> {
        let mut bytes = Vec::new();
        if n == 0 {
            return Ok(bytes);
        }
        if let Some(ch) = self.peek_buffer.take() {
            bytes.push(ch);
        }
        let wanted = (n - bytes.len()) as u64;
        (&mut self.reader).take(wanted).read_to_end(&mut bytes)?;
        self.position += bytes.len();
        if bytes.len() < n {
            return Err(ParseError::SyntaxError {
                position: self.position,
                message: format!("Expected {n} bytes, found {}", bytes.len()),
            });
        }
        Ok(bytes)
    }

    /// Read until a specific byte sequence is found
    pub fn read_until_sequence(&mut self, sequence: &[u8]) -> ParseResult<Vec<u8>> {
        let mut result = Vec::new();

        while let Some(ch) = self.consume_char()? {
            result.push(ch);
            if result.ends_with(sequence) {
                result.truncate(result.len() - sequence.len());
                return Ok(result);
            }
        }

        Err(ParseError::SyntaxError {
            position: self.position,
            message: format!(
                "Sequence '{}' not found",
                String::from_utf8_lossy(sequence)
            ),
        })
    }

    /// Bytes consumed so far; a peeked byte is not counted
    pub fn position(&self) -> usize {
        self.position
    }

    /// Push back a token to be returned by the next call to next_token
    pub fn push_token(&mut self, token: Token) {
        self.token_buffer.push(token);
    }

    /// Expect a specific keyword token
    pub fn expect_keyword(&mut self, keyword: &str) -> ParseResult<()> {
        let token = self.next_token()?;
        if token.keyword() == Some(keyword) {
            Ok(())
        } else {
            Err(ParseError::UnexpectedToken {
                expected: format!("keyword '{keyword}'"),
                found: format!("{token:?}"),
            })
        }
    }
}

/// PDF whitespace characters (ISO 32000-1 Table 1)
pub(crate) fn is_whitespace(ch: u8) -> bool {
    matches!(ch, b' ' | b'\t' | b'\n' | b'\r' | b'\x0C' | b'\0')
}

/// PDF delimiter characters (ISO 32000-1 Table 2)
pub(crate) fn is_delimiter(ch: u8) -> bool {
    matches!(
        ch,
        b'/' | b'<' | b'>' | b'[' | b']' | b'(' | b')' | b'{' | b'}' | b'%'
    )
}

pub(crate) fn hex_digit_value(ch: u8) -> Option<u8> {
    match ch {
        b'0'..=b'9' => Some(ch - b'0'),
        b'A'..=b'F' => Some(ch - b'A' + 10),
        b'a'..=b'f' => Some(ch - b'a' + 10),
        _ => None,
    }
}
