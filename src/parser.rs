//
// Copyright 2020 vpack Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! The single-pass JSON parser.
//!
//! Unlike a parser that builds an intermediate AST, this one drives a
//! [`Writer`] directly: every JSON token becomes a `push_value` /
//! `open_array` / `open_object` / `close` call as soon as it is recognized.

use tracing::trace;

use crate::error::{Error, Result};
use crate::options::WriterOptions;
use crate::scan;
use crate::writer::{Value, Writer};

const BOM: [u8; 3] = [0xef, 0xbb, 0xbf];

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
    /// Mirrors `WriterOptions::validate_utf8_strings`. When `false` (the
    /// default), string bodies are copied through raw and never forced into
    /// a validated `&str`; when `true`, every byte `>= 0x80` is checked as
    /// part of a well-formed multi-byte sequence.
    validate_utf8: bool,
}

impl<'a> Parser<'a> {
    fn new(input: &'a [u8], validate_utf8: bool) -> Self {
        Parser {
            input,
            pos: 0,
            validate_utf8,
        }
    }

    fn skip_bom(&mut self) {
        if self.input.starts_with(&BOM) {
            self.pos = BOM.len();
        }
    }

    fn skip_ws(&mut self) {
        self.pos += scan::skip_whitespace(&self.input[self.pos..]);
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek();
        if b.is_some() {
            self.pos += 1;
        }
        b
    }

    fn err_here(&self) -> Error {
        Error::ParseError { offset: self.pos }
    }

    fn expect_byte(&mut self, b: u8) -> Result<()> {
        if self.bump() == Some(b) {
            Ok(())
        } else {
            Err(self.err_here())
        }
    }

    fn expect_literal(&mut self, lit: &[u8]) -> Result<()> {
        if self.input[self.pos..].starts_with(lit) {
            self.pos += lit.len();
            Ok(())
        } else {
            Err(self.err_here())
        }
    }

    fn parse_value(&mut self, writer: &mut Writer) -> Result<()> {
        self.skip_ws();
        match self.peek() {
            Some(b'{') => {
                self.pos += 1;
                self.parse_object(writer)
            }
            Some(b'[') => {
                self.pos += 1;
                self.parse_array(writer)
            }
            Some(b'"') => {
                self.pos += 1;
                let start = self.pos;
                let bytes = self.parse_string_body()?;
                self.finish_string(writer, bytes, start)
            }
            Some(b't') => {
                self.expect_literal(b"true")?;
                writer.push_value(Value::Bool(true))
            }
            Some(b'f') => {
                self.expect_literal(b"false")?;
                writer.push_value(Value::Bool(false))
            }
            Some(b'n') => {
                self.expect_literal(b"null")?;
                writer.push_value(Value::Null)
            }
            Some(b'-') => self.parse_number(writer),
            Some(b'0'..=b'9') => self.parse_number(writer),
            _ => Err(self.err_here()),
        }
    }

    fn parse_object(&mut self, writer: &mut Writer) -> Result<()> {
        writer.open_object()?;
        self.skip_ws();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return writer.close();
        }
        loop {
            self.skip_ws();
            self.expect_byte(b'"')?;
            let key_start = self.pos;
            let key = self.parse_string_body()?;
            self.finish_string(writer, key, key_start)?;
            self.skip_ws();
            self.expect_byte(b':')?;
            self.parse_value(writer)?;
            self.skip_ws();
            match self.bump() {
                Some(b',') => continue,
                Some(b'}') => break,
                _ => return Err(self.err_here()),
            }
        }
        writer.close()
    }

    fn parse_array(&mut self, writer: &mut Writer) -> Result<()> {
        writer.open_array()?;
        self.skip_ws();
        if self.peek() == Some(b']') {
            self.pos += 1;
            return writer.close();
        }
        loop {
            self.parse_value(writer)?;
            self.skip_ws();
            match self.bump() {
                Some(b',') => continue,
                Some(b']') => break,
                _ => return Err(self.err_here()),
            }
        }
        writer.close()
    }

    /// Parses a string body, the opening quote already having been
    /// consumed, and returns its raw bytes. Leaves `pos` just past the
    /// closing quote.
    ///
    /// Whether those bytes are checked for well-formed UTF-8 depends on
    /// `validate_utf8`: when `false`, the fast scan (`copy_until_delim`)
    /// swallows bytes `>= 0x80` without inspecting them, so ill-formed
    /// sequences pass through untouched; when `true`, the checked scan
    /// (`copy_until_delim_checked`) stops at each one and
    /// [`Parser::read_utf8_sequence`] validates it byte-by-byte.
    fn parse_string_body(&mut self) -> Result<Vec<u8>> {
        let start = self.pos;
        let mut buf = Vec::new();
        loop {
            let n = if self.validate_utf8 {
                scan::copy_until_delim_checked(&mut buf, &self.input[self.pos..])
            } else {
                scan::copy_until_delim(&mut buf, &self.input[self.pos..])
            };
            self.pos += n;
            match self.peek() {
                None => return Err(Error::ParseError { offset: start }),
                Some(b'"') => {
                    self.pos += 1;
                    break;
                }
                Some(b'\\') => {
                    self.pos += 1;
                    self.parse_escape(&mut buf)?;
                }
                Some(c) if c < 0x20 => {
                    return Err(Error::UnexpectedControlCharacter { offset: self.pos })
                }
                Some(b) if b >= 0x80 => {
                    let seq = self.read_utf8_sequence()?;
                    buf.extend_from_slice(seq);
                }
                Some(_) => unreachable!(
                    "copy_until_delim only stops at '\"', '\\\\', or a control byte"
                ),
            }
        }
        Ok(buf)
    }

    /// Turns the raw bytes of a parsed string body into a pushed value.
    /// Validates UTF-8 and requires a clean `&str` when `validate_utf8` is
    /// set; otherwise pushes the bytes through as-is (see
    /// [`crate::writer::Writer::push_str_bytes`]).
    fn finish_string(&self, writer: &mut Writer, bytes: Vec<u8>, start: usize) -> Result<()> {
        if self.validate_utf8 {
            let s = std::str::from_utf8(&bytes)
                .map_err(|_| Error::InvalidUtf8Sequence { offset: start })?;
            writer.push_value(Value::Str(s))
        } else {
            writer.push_str_bytes(&bytes)
        }
    }

    /// Reads one multi-byte UTF-8 sequence starting at `pos` (the lead byte
    /// is `>= 0x80`), validating continuation bytes, and advances `pos`
    /// past it.
    fn read_utf8_sequence(&mut self) -> Result<&'a [u8]> {
        let input = self.input;
        let start = self.pos;
        let lead = input[start];
        let len = if lead & 0xe0 == 0xc0 {
            2
        } else if lead & 0xf0 == 0xe0 {
            3
        } else if lead & 0xf8 == 0xf0 {
            4
        } else {
            return Err(Error::InvalidUtf8Sequence { offset: start });
        };
        if start + len > input.len() {
            return Err(Error::InvalidUtf8Sequence { offset: start });
        }
        for &b in &input[start + 1..start + len] {
            if b & 0xc0 != 0x80 {
                return Err(Error::InvalidUtf8Sequence { offset: start });
            }
        }
        self.pos += len;
        Ok(&input[start..start + len])
    }

    fn parse_escape(&mut self, buf: &mut Vec<u8>) -> Result<()> {
        let offset = self.pos;
        match self.bump() {
            Some(b'"') => buf.push(b'"'),
            Some(b'\\') => buf.push(b'\\'),
            Some(b'/') => buf.push(b'/'),
            Some(b'b') => buf.push(0x08),
            Some(b'f') => buf.push(0x0c),
            Some(b'n') => buf.push(b'\n'),
            Some(b'r') => buf.push(b'\r'),
            Some(b't') => buf.push(b'\t'),
            Some(b'u') => {
                let cp = self.read_hex4(offset)?;
                if (0xd800..=0xdbff).contains(&cp) {
                    if self.input[self.pos..].starts_with(b"\\u") {
                        self.pos += 2;
                        let low_offset = self.pos;
                        let low = self.read_hex4(low_offset)?;
                        if !(0xdc00..=0xdfff).contains(&low) {
                            return Err(Error::ParseError { offset });
                        }
                        let combined =
                            0x10000 + (cp - 0xd800) * 0x400 + (low - 0xdc00);
                        push_codepoint(buf, combined, offset)?;
                    } else {
                        return Err(Error::ParseError { offset });
                    }
                } else if (0xdc00..=0xdfff).contains(&cp) {
                    return Err(Error::ParseError { offset });
                } else {
                    push_codepoint(buf, cp, offset)?;
                }
            }
            _ => return Err(Error::ParseError { offset }),
        }
        Ok(())
    }

    fn read_hex4(&mut self, offset: usize) -> Result<u32> {
        if self.pos + 4 > self.input.len() {
            return Err(Error::ParseError { offset });
        }
        let hex = std::str::from_utf8(&self.input[self.pos..self.pos + 4])
            .map_err(|_| Error::ParseError { offset })?;
        let v = u32::from_str_radix(hex, 16).map_err(|_| Error::ParseError { offset })?;
        self.pos += 4;
        Ok(v)
    }

    fn parse_number(&mut self, writer: &mut Writer) -> Result<()> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        match self.peek() {
            Some(b'0') => self.pos += 1,
            Some(b'1'..=b'9') => {
                while matches!(self.peek(), Some(b'0'..=b'9')) {
                    self.pos += 1;
                }
            }
            _ => return Err(self.err_here()),
        }
        let mut has_frac = false;
        let mut has_exp = false;
        if self.peek() == Some(b'.') {
            has_frac = true;
            self.pos += 1;
            if !matches!(self.peek(), Some(b'0'..=b'9')) {
                return Err(self.err_here());
            }
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some(b'e') | Some(b'E')) {
            has_exp = true;
            self.pos += 1;
            if matches!(self.peek(), Some(b'+') | Some(b'-')) {
                self.pos += 1;
            }
            if !matches!(self.peek(), Some(b'0'..=b'9')) {
                return Err(self.err_here());
            }
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.pos += 1;
            }
        }
        let token = std::str::from_utf8(&self.input[start..self.pos]).unwrap();
        let value = if has_frac || has_exp {
            let f: f64 = token.parse().map_err(|_| Error::ParseError { offset: start })?;
            check_finite(f)?;
            Value::Double(f)
        } else if let Some(stripped) = token.strip_prefix('-') {
            match stripped.parse::<u64>() {
                Ok(mag) if mag <= i64::MAX as u64 + 1 => Value::Int(-(mag as i128) as i64),
                _ => {
                    let f: f64 = token.parse().map_err(|_| Error::NumberOutOfRange)?;
                    check_finite(f)?;
                    Value::Double(f)
                }
            }
        } else {
            match token.parse::<u64>() {
                Ok(u) => Value::UInt(u),
                Err(_) => {
                    let f: f64 = token.parse().map_err(|_| Error::NumberOutOfRange)?;
                    check_finite(f)?;
                    Value::Double(f)
                }
            }
        };
        writer.push_value(value)
    }
}

fn check_finite(f: f64) -> Result<()> {
    if f.is_finite() {
        Ok(())
    } else {
        Err(Error::NumberOutOfRange)
    }
}

fn push_codepoint(buf: &mut Vec<u8>, codepoint: u32, offset: usize) -> Result<()> {
    let c = char::from_u32(codepoint).ok_or(Error::ParseError { offset })?;
    let mut tmp = [0u8; 4];
    buf.extend_from_slice(c.encode_utf8(&mut tmp).as_bytes());
    Ok(())
}

/// Parses exactly one top-level JSON value; only whitespace may follow it.
pub fn parse_one(input: &[u8], options: WriterOptions) -> Result<Vec<u8>> {
    trace!(len = input.len(), "parse_one");
    let mut parser = Parser::new(input, options.validate_utf8_strings);
    parser.skip_bom();
    let mut writer = Writer::with_options(options);
    parser.parse_value(&mut writer)?;
    parser.skip_ws();
    if parser.pos != parser.input.len() {
        return Err(Error::ParseError { offset: parser.pos });
    }
    writer.into_vec()
}

/// Parses a whitespace-separated sequence of top-level JSON values, writing
/// each as its own document in sequence. Returns the number parsed and the
/// concatenated bytes.
pub fn parse_multi(input: &[u8], options: WriterOptions) -> Result<(usize, Vec<u8>)> {
    trace!(len = input.len(), "parse_multi");
    let mut parser = Parser::new(input, options.validate_utf8_strings);
    parser.skip_bom();
    let mut writer = Writer::with_options(options);
    let mut count = 0usize;
    loop {
        parser.skip_ws();
        if parser.pos >= parser.input.len() {
            break;
        }
        parser.parse_value(&mut writer)?;
        count += 1;
    }
    Ok((count, writer.into_vec()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::Reader;
    use crate::tag::Tag;

    fn parse(json: &str) -> Vec<u8> {
        parse_one(json.as_bytes(), WriterOptions::default()).unwrap()
    }

    #[test]
    fn test_null_true_false() {
        assert_eq!(Reader::new(&parse("null")).tag(), Tag::Null);
        assert!(Reader::new(&parse("true")).as_bool().unwrap());
        assert!(!Reader::new(&parse("false")).as_bool().unwrap());
    }

    #[test]
    fn test_small_int_array() {
        let data = parse("[1,2,3]");
        let reader = Reader::new(&data);
        assert_eq!(data[0], crate::tag::HEAD_ARRAY_UNINDEXED_START);
        assert_eq!(reader.length().unwrap(), 3);
        assert_eq!(reader.at(0).unwrap().as_small_int().unwrap(), 1);
    }

    #[test]
    fn test_object_with_default_sort() {
        let data = parse(r#"{"foo":"bar","baz":true}"#);
        let reader = Reader::new(&data);
        assert_eq!(reader.get("foo").unwrap().unwrap().as_str().unwrap(), "bar");
        assert!(reader.get("baz").unwrap().unwrap().as_bool().unwrap());
    }

    #[test]
    fn test_string_escapes() {
        let data = parse(r#""a\n\tbé""#);
        let reader = Reader::new(&data);
        assert_eq!(reader.as_str().unwrap(), "a\n\tb\u{e9}");
    }

    #[test]
    fn test_surrogate_pair() {
        let data = parse(r#""😀""#);
        let reader = Reader::new(&data);
        assert_eq!(reader.as_str().unwrap(), "\u{1f600}");
    }

    #[test]
    fn test_ill_formed_utf8_passed_through_by_default() {
        // 0xc3 is a 2-byte lead; 0x28 is not a valid continuation byte.
        let raw: &[u8] = b"\"a\xc3\x28b\"";
        let data = parse_one(raw, WriterOptions::default()).unwrap();
        let reader = Reader::new(&data);
        assert_eq!(reader.tag(), Tag::String);
        // The ill-formed bytes were copied through untouched rather than
        // rejected at parse time; reading them back out as `&str` fails.
        assert!(reader.as_str().is_err());
        assert_eq!(&data[1..], raw[1..raw.len() - 1]);
    }

    #[test]
    fn test_ill_formed_utf8_rejected_when_validating() {
        let raw: &[u8] = b"\"a\xc3\x28b\"";
        let err = parse_one(
            raw,
            WriterOptions {
                validate_utf8_strings: true,
                ..WriterOptions::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidUtf8Sequence { .. }));
    }

    #[test]
    fn test_well_formed_multibyte_utf8_accepted_when_validating() {
        let data = parse_one(
            r#""bé""#.as_bytes(),
            WriterOptions {
                validate_utf8_strings: true,
                ..WriterOptions::default()
            },
        )
        .unwrap();
        let reader = Reader::new(&data);
        assert_eq!(reader.as_str().unwrap(), "b\u{e9}");
    }

    #[test]
    fn test_truncated_utf8_rejected_when_validating() {
        // 0xe2 0x82 0xac is the (complete) 3-byte encoding of U+20AC; here
        // the third byte is the closing quote instead of a continuation
        // byte, so the sequence is truncated.
        let raw: &[u8] = b"\"\xe2\x82\"";
        let err = parse_one(
            raw,
            WriterOptions {
                validate_utf8_strings: true,
                ..WriterOptions::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidUtf8Sequence { .. }));
    }

    #[test]
    fn test_number_forms() {
        assert_eq!(Reader::new(&parse("0")).as_small_int().unwrap(), 0);
        assert_eq!(Reader::new(&parse("-6")).as_small_int().unwrap(), -6);
        assert_eq!(Reader::new(&parse("1e2")).as_f64().unwrap(), 100.0);
        assert_eq!(Reader::new(&parse("3.5")).as_f64().unwrap(), 3.5);
        assert_eq!(Reader::new(&parse("-9223372036854775808")).as_i64().unwrap(), i64::MIN);
    }

    #[test]
    fn test_trailing_comma_rejected() {
        let err = parse_one(b"[1,2,]", WriterOptions::default()).unwrap_err();
        assert!(matches!(err, Error::ParseError { .. }));
    }

    #[test]
    fn test_duplicate_key_detection() {
        let err = parse_one(
            br#"{"x":1,"y":2,"x":3}"#,
            WriterOptions {
                check_attribute_uniqueness: true,
                ..WriterOptions::default()
            },
        )
        .unwrap_err();
        assert_eq!(err, Error::DuplicateAttributeName);
    }

    #[test]
    fn test_control_character_rejected() {
        let raw = b"\"a\x01b\"";
        let err = parse_one(raw, WriterOptions::default()).unwrap_err();
        assert!(matches!(err, Error::UnexpectedControlCharacter { .. }));
    }

    #[test]
    fn test_bom_skipped() {
        let mut input = vec![0xef, 0xbb, 0xbf];
        input.extend_from_slice(b"null");
        let data = parse_one(&input, WriterOptions::default()).unwrap();
        assert_eq!(Reader::new(&data).tag(), Tag::Null);
    }

    #[test]
    fn test_parse_multi() {
        let (count, data) = parse_multi(b"1 2 3", WriterOptions::default()).unwrap();
        assert_eq!(count, 3);
        let r1 = Reader::new(&data);
        assert_eq!(r1.as_small_int().unwrap(), 1);
    }
}
