//
// Copyright 2020 vpack Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! Renders a [`Reader`] back to JSON text.

use tracing::{trace, warn};

use crate::error::{Error, Result};
use crate::options::{DumpOptions, DumpStrategy};
use crate::reader::Reader;
use crate::tag::Tag;

/// Dumps `reader` as compact JSON into a fresh `String`.
pub fn dump_to_string(reader: &Reader, options: DumpOptions) -> Result<String> {
    let mut out = String::new();
    dump_into(reader, options, &mut out)?;
    Ok(out)
}

/// Dumps `reader` as JSON, appending to `sink`.
pub fn dump_into(reader: &Reader, options: DumpOptions, sink: &mut String) -> Result<()> {
    trace!(pretty = options.pretty, "dump");
    write_value(reader, options, sink, 0)
}

fn write_indent(sink: &mut String, depth: usize) {
    for _ in 0..depth {
        sink.push_str("  ");
    }
}

fn write_value(reader: &Reader, options: DumpOptions, sink: &mut String, depth: usize) -> Result<()> {
    match reader.tag() {
        Tag::Null => sink.push_str("null"),
        Tag::Bool => sink.push_str(if reader.as_bool()? { "true" } else { "false" }),
        Tag::SmallInt => write_i64(sink, reader.as_small_int()?),
        Tag::Int => write_i64(sink, reader.as_i64()?),
        Tag::UInt => write_u64(sink, reader.as_u64()?),
        Tag::Double => write_double(reader, options, sink)?,
        Tag::String => write_string(reader.as_str()?, sink),
        Tag::Array => write_array(reader, options, sink, depth)?,
        Tag::Object => write_object(reader, options, sink, depth)?,
        Tag::UtcDate
        | Tag::External
        | Tag::Binary
        | Tag::Bcd
        | Tag::MinKey
        | Tag::MaxKey
        | Tag::Custom
        | Tag::None => non_json(options, sink)?,
    }
    Ok(())
}

fn non_json(options: DumpOptions, sink: &mut String) -> Result<()> {
    match options.strategy {
        DumpStrategy::Fail => Err(Error::NoJsonEquivalent),
        DumpStrategy::Nullify => {
            warn!("dumping non-JSON tag under Nullify strategy");
            sink.push_str("null");
            Ok(())
        }
    }
}

fn write_double(reader: &Reader, options: DumpOptions, sink: &mut String) -> Result<()> {
    let f = reader.as_f64()?;
    if !f.is_finite() {
        return non_json(options, sink);
    }
    let mut buf = ryu::Buffer::new();
    sink.push_str(buf.format(f));
    Ok(())
}

fn write_array(reader: &Reader, options: DumpOptions, sink: &mut String, depth: usize) -> Result<()> {
    sink.push('[');
    let n = reader.length()?;
    for i in 0..n {
        if i > 0 {
            sink.push(',');
        }
        if options.pretty {
            sink.push('\n');
            write_indent(sink, depth + 1);
        }
        write_value(&reader.at(i)?, options, sink, depth + 1)?;
    }
    if options.pretty && n > 0 {
        sink.push('\n');
        write_indent(sink, depth);
    }
    sink.push(']');
    Ok(())
}

fn write_object(reader: &Reader, options: DumpOptions, sink: &mut String, depth: usize) -> Result<()> {
    sink.push('{');
    let n = reader.length()?;
    for i in 0..n {
        if i > 0 {
            sink.push(',');
        }
        if options.pretty {
            sink.push('\n');
            write_indent(sink, depth + 1);
        }
        let key = reader.key_at(i)?;
        write_string(key.as_str()?, sink);
        sink.push(':');
        if options.pretty {
            sink.push(' ');
        }
        write_value(&reader.value_at(i)?, options, sink, depth + 1)?;
    }
    if options.pretty && n > 0 {
        sink.push('\n');
        write_indent(sink, depth);
    }
    sink.push('}');
    Ok(())
}

/// Scalar digit extraction; avoids locale-dependent `format!` in the hot
/// loop. `i64::MIN` is special-cased since its magnitude has no positive
/// `i64` counterpart.
fn write_i64(sink: &mut String, value: i64) {
    if value == i64::MIN {
        sink.push_str("-9223372036854775808");
        return;
    }
    if value < 0 {
        sink.push('-');
        write_u64(sink, (-value) as u64);
    } else {
        write_u64(sink, value as u64);
    }
}

fn write_u64(sink: &mut String, mut value: u64) {
    if value == 0 {
        sink.push('0');
        return;
    }
    let mut digits = [0u8; 20];
    let mut i = digits.len();
    while value > 0 {
        i -= 1;
        digits[i] = b'0' + (value % 10) as u8;
        value /= 10;
    }
    sink.push_str(std::str::from_utf8(&digits[i..]).unwrap());
}

/// Maps each byte `0..=0xff` to its JSON string escape, or `None` if the
/// byte may be copied verbatim.
fn escape_for(byte: u8) -> Option<&'static str> {
    match byte {
        b'"' => Some("\\\""),
        b'\\' => Some("\\\\"),
        b'/' => Some("\\/"),
        0x08 => Some("\\b"),
        0x0c => Some("\\f"),
        b'\n' => Some("\\n"),
        b'\r' => Some("\\r"),
        b'\t' => Some("\\t"),
        0x00..=0x1f => None, // handled via \u escape below
        _ => None,
    }
}

fn write_string(s: &str, sink: &mut String) {
    sink.push('"');
    for b in s.bytes() {
        if let Some(escaped) = escape_for(b) {
            sink.push_str(escaped);
        } else if b < 0x20 {
            sink.push_str(&format!("\\u{:04X}", b));
        } else if b < 0x80 {
            sink.push(b as char);
        } else {
            // Part of a multi-byte UTF-8 sequence; `s` is a `&str` so these
            // bytes are always well-formed and safe to copy verbatim.
            unsafe {
                sink.as_mut_vec().push(b);
            }
        }
    }
    sink.push('"');
}
