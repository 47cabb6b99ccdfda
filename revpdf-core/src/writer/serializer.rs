//! Object serialization shared by the writer strategies

use crate::error::Result;
use crate::parser::lexer::{is_delimiter, is_whitespace};
use crate::parser::{ObjRef, PdfDictionary, PdfObject, PdfStream};
use std::io::Write;

/// Write `num gen obj ... endobj`
pub fn write_indirect_object<W: Write + ?Sized>(
    writer: &mut W,
    reference: ObjRef,
    object: &PdfObject,
) -> Result<()> {
    writeln!(writer, "{} {} obj", reference.num, reference.gen)?;
    write_object_value(writer, object)?;
    writer.write_all(b"\nendobj\n")?;
    Ok(())
}

/// Write a direct object in PDF syntax
pub fn write_object_value<W: Write + ?Sized>(writer: &mut W, object: &PdfObject) -> Result<()> {
    match object {
        PdfObject::Null => writer.write_all(b"null")?,
        PdfObject::Boolean(b) => writer.write_all(if *b { b"true" } else { b"false" })?,
        PdfObject::Integer(i) => write!(writer, "{i}")?,
        PdfObject::Real(f) => writer.write_all(format_real(*f).as_bytes())?,
        PdfObject::String(s) => write_string(writer, s.as_bytes())?,
        PdfObject::Name(n) => write_name(writer, n.as_str())?,
        PdfObject::Array(arr) => {
            writer.write_all(b"[")?;
            for (i, obj) in arr.0.iter().enumerate() {
                if i > 0 {
                    writer.write_all(b" ")?;
                }
                write_object_value(writer, obj)?;
            }
            writer.write_all(b"]")?;
        }
        PdfObject::Dictionary(dict) => write_dictionary(writer, dict)?,
        PdfObject::Stream(stream) => write_stream(writer, stream)?,
        PdfObject::Reference(r) => write!(writer, "{} {} R", r.num, r.gen)?,
        PdfObject::Command(keyword) => writer.write_all(keyword.as_bytes())?,
    }
    Ok(())
}

fn write_dictionary<W: Write + ?Sized>(writer: &mut W, dict: &PdfDictionary) -> Result<()> {
    writer.write_all(b"<<")?;
    for (key, value) in dict.iter() {
        writer.write_all(b"\n")?;
        write_name(writer, key.as_str())?;
        writer.write_all(b" ")?;
        write_object_value(writer, value)?;
    }
    writer.write_all(b"\n>>")?;
    Ok(())
}

/// `/Length` always matches the bytes written
fn write_stream<W: Write + ?Sized>(writer: &mut W, stream: &PdfStream) -> Result<()> {
    let length = PdfObject::Integer(stream.data.len() as i64);
    if stream.dict.get("Length") == Some(&length) {
        write_dictionary(writer, &stream.dict)?;
    } else {
        let mut dict = stream.dict.clone();
        dict.insert("Length", length);
        write_dictionary(writer, &dict)?;
    }
    writer.write_all(b"\nstream\n")?;
    writer.write_all(&stream.data)?;
    writer.write_all(b"\nendstream")?;
    Ok(())
}

/// Reals always keep a decimal point so they read back as reals
pub(crate) fn format_real(value: f64) -> String {
    if !value.is_finite() {
        return "0.0".to_string();
    }
    let formatted = format!("{value:.6}");
    let trimmed = formatted.trim_end_matches('0');
    let trimmed = if trimmed.ends_with('.') {
        format!("{trimmed}0")
    } else {
        trimmed.to_string()
    };
    if trimmed == "-0.0" {
        "0.0".to_string()
    } else {
        trimmed
    }
}

/// Literal string when printable, hexadecimal otherwise
fn write_string<W: Write + ?Sized>(writer: &mut W, bytes: &[u8]) -> Result<()> {
    let printable = bytes
        .iter()
        .all(|&b| (0x20..0x7F).contains(&b) || matches!(b, b'\n' | b'\r' | b'\t'));

    if !printable {
        writer.write_all(b"<")?;
        for byte in bytes {
            write!(writer, "{byte:02X}")?;
        }
        writer.write_all(b">")?;
        return Ok(());
    }

    writer.write_all(b"(")?;
    for &byte in bytes {
        match byte {
            b'(' | b')' | b'\\' => writer.write_all(&[b'\\', byte])?,
            b'\n' => writer.write_all(b"\\n")?,
            b'\r' => writer.write_all(b"\\r")?,
            b'\t' => writer.write_all(b"\\t")?,
            _ => writer.write_all(&[byte])?,
        }
    }
    writer.write_all(b")")?;
    Ok(())
}

fn write_name<W: Write + ?Sized>(writer: &mut W, name: &str) -> Result<()> {
    writer.write_all(b"/")?;
    for &byte in name.as_bytes() {
        if byte == b'#' || !(0x21..0x7F).contains(&byte) || is_delimiter(byte) || is_whitespace(byte)
        {
            write!(writer, "#{byte:02X}")?;
        } else {
            writer.write_all(&[byte])?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{Lexer, PdfArray, PdfName, PdfString};
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn serialize(object: &PdfObject) -> String {
        let mut out = Vec::new();
        write_object_value(&mut out, object).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn reparse(text: &str) -> PdfObject {
        let mut lexer = Lexer::new(Cursor::new(text.as_bytes().to_vec()));
        PdfObject::parse(&mut lexer).unwrap()
    }

    #[test]
    fn test_scalars() {
        assert_eq!(serialize(&PdfObject::Null), "null");
        assert_eq!(serialize(&PdfObject::Boolean(true)), "true");
        assert_eq!(serialize(&PdfObject::Integer(-42)), "-42");
        assert_eq!(serialize(&PdfObject::Reference(ObjRef::new(3, 1))), "3 1 R");
        assert_eq!(serialize(&PdfObject::Command("BT".to_string())), "BT");
    }

    #[test]
    fn test_real_formatting() {
        assert_eq!(format_real(5.0), "5.0");
        assert_eq!(format_real(0.25), "0.25");
        assert_eq!(format_real(-1.5), "-1.5");
        assert_eq!(format_real(-0.0), "0.0");
        assert_eq!(format_real(f64::NAN), "0.0");
        assert_eq!(reparse(&format_real(5.0)), PdfObject::Real(5.0));
    }

    #[test]
    fn test_string_escaping() {
        let text = PdfObject::String(PdfString::from("a (b) \\ c\n"));
        let written = serialize(&text);
        assert_eq!(written, "(a \\(b\\) \\\\ c\\n)");
        assert_eq!(reparse(&written), text);
    }

    #[test]
    fn test_binary_string_uses_hex() {
        let binary = PdfObject::String(PdfString(vec![0x00, 0xFF, 0x10]));
        let written = serialize(&binary);
        assert_eq!(written, "<00FF10>");
        assert_eq!(reparse(&written), binary);
    }

    #[test]
    fn test_name_escaping() {
        let name = PdfObject::Name(PdfName::new("A B#(x)"));
        let written = serialize(&name);
        assert_eq!(written, "/A#20B#23#28x#29");
        assert_eq!(reparse(&written), name);
    }

    #[test]
    fn test_dictionary_and_array() {
        let mut dict = PdfDictionary::new();
        dict.insert("Type", PdfObject::Name(PdfName::new("Page")));
        dict.insert(
            "Kids",
            PdfObject::Array(PdfArray(vec![
                PdfObject::Reference(ObjRef::new(4, 0)),
                PdfObject::Integer(7),
            ])),
        );
        let object = PdfObject::Dictionary(dict);

        let written = serialize(&object);
        assert_eq!(written, "<<\n/Type /Page\n/Kids [4 0 R 7]\n>>");
        assert_eq!(reparse(&written), object);
    }

    #[test]
    fn test_stream_length_is_fixed_up() {
        let mut dict = PdfDictionary::new();
        dict.insert("Length", PdfObject::Reference(ObjRef::new(9, 0)));
        let stream = PdfObject::Stream(PdfStream::new(dict, b"BT ET".to_vec()));

        let written = serialize(&stream);
        assert!(written.contains("/Length 5"));
        let back = reparse(&written);
        assert_eq!(back.as_stream().unwrap().raw_data(), b"BT ET");
    }

    #[test]
    fn test_indirect_object() {
        let mut out = Vec::new();
        write_indirect_object(&mut out, ObjRef::new(12, 0), &PdfObject::Integer(1)).unwrap();
        assert_eq!(out, b"12 0 obj\n1\nendobj\n".to_vec());
    }
}
