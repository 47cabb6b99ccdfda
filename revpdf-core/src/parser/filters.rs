//! PDF Stream Filters
//!
//! Decoding needed to read cross-reference streams and object streams
//! (ISO 32000-1 Section 7.4): FlateDecode with PNG/TIFF predictors,
//! ASCIIHexDecode and ASCII85Decode.

use super::lexer::hex_digit_value;
use super::objects::{PdfDictionary, PdfObject};
use super::{ParseError, ParseResult};

/// Stream filters understood by the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    ASCIIHexDecode,
    ASCII85Decode,
    FlateDecode,
}

impl Filter {
    /// Parse filter from name, `None` for filters this crate cannot decode
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ASCIIHexDecode" | "AHx" => Some(Filter::ASCIIHexDecode),
            "ASCII85Decode" | "A85" => Some(Filter::ASCII85Decode),
            "FlateDecode" | "Fl" => Some(Filter::FlateDecode),
            _ => None,
        }
    }
}

/// Predictor parameters from `/DecodeParms`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredictorParams {
    pub predictor: i64,
    pub colors: usize,
    pub bits_per_component: usize,
    pub columns: usize,
}

impl Default for PredictorParams {
    fn default() -> Self {
        Self {
            predictor: 1,
            colors: 1,
            bits_per_component: 8,
            columns: 1,
        }
    }
}

impl PredictorParams {
    fn from_dict(dict: Option<&PdfDictionary>) -> Self {
        let mut params = Self::default();
        let Some(dict) = dict else {
            return params;
        };
        let int = |key: &str| dict.get(key).and_then(|o| o.as_integer());
        if let Some(p) = int("Predictor") {
            params.predictor = p;
        }
        if let Some(c) = int("Colors").filter(|c| *c > 0) {
            params.colors = c as usize;
        }
        if let Some(b) = int("BitsPerComponent").filter(|b| *b > 0) {
            params.bits_per_component = b as usize;
        }
        if let Some(c) = int("Columns").filter(|c| *c > 0) {
            params.columns = c as usize;
        }
        params
    }

    fn bytes_per_pixel(&self) -> usize {
        (self.colors * self.bits_per_component).div_ceil(8).max(1)
    }

    fn row_len(&self) -> usize {
        (self.colors * self.bits_per_component * self.columns).div_ceil(8)
    }
}

/// Decode stream data according to the `/Filter` and `/DecodeParms` entries
pub fn decode_stream(data: &[u8], dict: &PdfDictionary) -> ParseResult<Vec<u8>> {
    let filters: Vec<&str> = match dict.get("Filter") {
        None | Some(PdfObject::Null) => return Ok(data.to_vec()),
        Some(PdfObject::Name(name)) => vec![name.as_str()],
        Some(PdfObject::Array(array)) => array
            .0
            .iter()
            .map(|obj| {
                obj.as_name().map(|n| n.as_str()).ok_or_else(|| {
                    ParseError::StreamDecodeError("Invalid filter in array".to_string())
                })
            })
            .collect::<ParseResult<_>>()?,
        Some(_) => {
            return Err(ParseError::StreamDecodeError(
                "Invalid Filter type".to_string(),
            ))
        }
    };

    let parms: Vec<Option<&PdfDictionary>> = match dict.get("DecodeParms") {
        Some(PdfObject::Dictionary(d)) => vec![Some(d)],
        Some(PdfObject::Array(array)) => array.0.iter().map(|o| o.as_dict()).collect(),
        _ => Vec::new(),
    };

    let mut result = data.to_vec();
    for (i, name) in filters.iter().enumerate() {
        let filter = Filter::from_name(name)
            .ok_or_else(|| ParseError::StreamDecodeError(format!("Unsupported filter: {name}")))?;
        result = apply_filter(&result, filter)?;

        let params = PredictorParams::from_dict(parms.get(i).copied().flatten());
        if filter == Filter::FlateDecode && params.predictor > 1 {
            result = apply_predictor(&result, &params)?;
        }
    }

    Ok(result)
}

/// Apply a single filter to data
pub fn apply_filter(data: &[u8], filter: Filter) -> ParseResult<Vec<u8>> {
    match filter {
        Filter::FlateDecode => crate::compression::decompress(data)
            .map_err(|e| ParseError::StreamDecodeError(format!("Flate decode error: {e}"))),
        Filter::ASCIIHexDecode => decode_ascii_hex(data),
        Filter::ASCII85Decode => decode_ascii85(data),
    }
}

/// Undo a TIFF (2) or PNG (10-15) predictor
pub fn apply_predictor(data: &[u8], params: &PredictorParams) -> ParseResult<Vec<u8>> {
    match params.predictor {
        1 => Ok(data.to_vec()),
        2 => decode_tiff_predictor(data, params),
        10..=15 => decode_png_predictor(data, params),
        other => Err(ParseError::StreamDecodeError(format!(
            "Unsupported predictor: {other}"
        ))),
    }
}

fn decode_tiff_predictor(data: &[u8], params: &PredictorParams) -> ParseResult<Vec<u8>> {
    if params.bits_per_component != 8 {
        return Err(ParseError::StreamDecodeError(
            "TIFF predictor only supports 8 bits per component".to_string(),
        ));
    }
    let row_len = params.row_len();
    let bpp = params.bytes_per_pixel();
    let mut result = data.to_vec();
    for row in result.chunks_mut(row_len) {
        for i in bpp..row.len() {
            row[i] = row[i].wrapping_add(row[i - bpp]);
        }
    }
    Ok(result)
}

fn decode_png_predictor(data: &[u8], params: &PredictorParams) -> ParseResult<Vec<u8>> {
    let row_len = params.row_len();
    let bpp = params.bytes_per_pixel();
    let mut result = Vec::with_capacity(data.len());
    let mut prev_row = vec![0u8; row_len];

    for chunk in data.chunks(row_len + 1) {
        let (&tag, encoded) = match chunk.split_first() {
            Some(split) => split,
            None => break,
        };
        if encoded.len() < row_len {
            return Err(ParseError::StreamDecodeError(
                "Truncated PNG predictor row".to_string(),
            ));
        }

        let mut row = encoded.to_vec();
        for i in 0..row_len {
            let left = if i >= bpp { row[i - bpp] } else { 0 };
            let up = prev_row[i];
            let up_left = if i >= bpp { prev_row[i - bpp] } else { 0 };
            row[i] = match tag {
                0 => row[i],
                1 => row[i].wrapping_add(left),
                2 => row[i].wrapping_add(up),
                3 => row[i].wrapping_add(((left as u16 + up as u16) / 2) as u8),
                4 => row[i].wrapping_add(paeth(left, up, up_left)),
                other => {
                    return Err(ParseError::StreamDecodeError(format!(
                        "Invalid PNG filter type: {other}"
                    )))
                }
            };
        }

        result.extend_from_slice(&row);
        prev_row = row;
    }

    Ok(result)
}

fn paeth(left: u8, up: u8, up_left: u8) -> u8 {
    let p = left as i16 + up as i16 - up_left as i16;
    let pa = (p - left as i16).abs();
    let pb = (p - up as i16).abs();
    let pc = (p - up_left as i16).abs();
    if pa <= pb && pa <= pc {
        left
    } else if pb <= pc {
        up
    } else {
        up_left
    }
}

/// Decode ASCIIHexDecode data
fn decode_ascii_hex(data: &[u8]) -> ParseResult<Vec<u8>> {
    let mut nibbles = Vec::new();
    for &ch in data.iter().filter(|b| !b.is_ascii_whitespace()) {
        if ch == b'>' {
            break;
        }
        let value = hex_digit_value(ch).ok_or_else(|| {
            ParseError::StreamDecodeError(format!("Invalid hex digit: {}", ch as char))
        })?;
        nibbles.push(value);
    }

    // Odd number of digits: the last one is followed by an implicit 0
    if nibbles.len() % 2 != 0 {
        nibbles.push(0);
    }

    Ok(nibbles
        .chunks(2)
        .map(|pair| (pair[0] << 4) | pair[1])
        .collect())
}

/// Decode ASCII85Decode data
fn decode_ascii85(data: &[u8]) -> ParseResult<Vec<u8>> {
    let mut body: Vec<u8> = data
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    if body.starts_with(b"<~") {
        body.drain(..2);
    }

    let mut result = Vec::new();
    let mut group = [0u8; 5];
    let mut filled = 0;
    let mut iter = body.iter().copied();

    while let Some(c) = iter.next() {
        match c {
            b'~' => {
                if iter.next() != Some(b'>') {
                    return Err(ParseError::StreamDecodeError(
                        "Invalid ASCII85 end marker".to_string(),
                    ));
                }
                break;
            }
            b'z' if filled == 0 => result.extend_from_slice(&[0; 4]),
            b'!'..=b'u' => {
                group[filled] = c - b'!';
                filled += 1;
                if filled == 5 {
                    result.extend_from_slice(&ascii85_group_value(&group).to_be_bytes());
                    filled = 0;
                }
            }
            _ => {
                return Err(ParseError::StreamDecodeError(format!(
                    "Invalid ASCII85 character: {}",
                    c as char
                )))
            }
        }
    }

    if filled > 0 {
        // Pad the partial group with 'u' and keep only the encoded bytes
        for slot in group.iter_mut().skip(filled) {
            *slot = b'u' - b'!';
        }
        let bytes = ascii85_group_value(&group).to_be_bytes();
        result.extend_from_slice(&bytes[..filled - 1]);
    }

    Ok(result)
}

fn ascii85_group_value(group: &[u8; 5]) -> u32 {
    group
        .iter()
        .fold(0u32, |acc, &digit| acc.wrapping_mul(85).wrapping_add(digit as u32))
}
