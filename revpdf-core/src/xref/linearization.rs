//! Linearization detection
//!
//! A linearized file carries a dictionary with a `Linearized` key as its
//! first indirect object, within the first kilobyte (ISO 32000-1 Annex F).

use crate::io::PdfStorage;
use crate::parser::{Lexer, ObjRef, PdfObject, Token};
use std::io::Read;
use tracing::debug;

/// Default number of leading bytes searched for the first object
pub const FIRST_LINEARIZED_BLOCK: u64 = 1024;

/// Look for a linearization dictionary in the first `probe_len` bytes
///
/// Returns the reference of that dictionary. Parse failures mean "not
/// linearized". The stream position is left where it was.
pub fn probe<S: PdfStorage + ?Sized>(stream: &mut S, probe_len: u64) -> Option<ObjRef> {
    let pos = stream.get_pos().ok()?;
    let found = stream.reset().ok().and_then(|_| scan(&mut *stream, probe_len));
    if stream.set_pos(pos).is_err() {
        debug!("Could not restore stream position after linearization probe");
    }
    found
}

fn scan<R: Read>(reader: R, probe_len: u64) -> Option<ObjRef> {
    let mut lexer = Lexer::new(reader);
    // The last two tokens, to spot `int int obj`
    let mut window: [Option<i64>; 2] = [None, None];

    while (lexer.position() as u64) < probe_len {
        let token = match lexer.next_token() {
            Ok(token) => token,
            Err(e) => {
                debug!("Linearization probe stopped: {e}");
                return None;
            }
        };

        match token {
            Token::Eof => return None,
            Token::Comment(_) => continue,
            Token::Obj => {
                let (Some(num), Some(gen)) = (window[0], window[1]) else {
                    window = [None, None];
                    continue;
                };
                let reference = ObjRef::new(u32::try_from(num).ok()?, u16::try_from(gen).ok()?);
                return linearization_dict(&mut lexer, reference);
            }
            Token::Integer(n) => window = [window[1], Some(n)],
            _ => window = [None, None],
        }
    }

    debug!("No indirect object in the first {probe_len} bytes");
    None
}

fn linearization_dict<R: Read>(lexer: &mut Lexer<R>, reference: ObjRef) -> Option<ObjRef> {
    let object = match PdfObject::parse(lexer) {
        Ok(object) => object,
        Err(e) => {
            debug!("First object {reference} does not parse: {e}");
            return None;
        }
    };

    let dict = match &object {
        PdfObject::Dictionary(dict) => dict,
        PdfObject::Stream(stream) => &stream.dict,
        _ => return None,
    };

    match dict.get("Linearized") {
        Some(value) if !value.is_null() => {
            debug!("Linearization dictionary found at {reference}");
            Some(reference)
        }
        _ => None,
    }
}
