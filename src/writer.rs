//
// Copyright 2020 vpack Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! The incremental writer.
//!
//! A [`Writer`] owns a growable buffer and a stack of open containers. Each
//! scalar or nested container is appended at the current write position;
//! closing a container computes its final offset-table layout, patches the
//! head byte and length fields in place, and pops back to the parent.

use std::collections::HashSet;

use tracing::{debug, trace};

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::options::WriterOptions;
use crate::reader::{compare_keys, read_uint_le, Reader};
use crate::tag;

/// Number of bytes reserved for a container's header when it is opened,
/// before the final width is known: 1 head byte + 8 bytes of byteLength.
const RESERVED_HEADER: usize = 9;

/// A scalar value to hand to [`Writer::push_value`]. Containers are built
/// incrementally via [`Writer::open_array`] / [`Writer::open_object`]
/// instead of being constructed as a `Value` up front.
#[derive(Clone, Debug, PartialEq)]
pub enum Value<'a> {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Double(f64),
    Str(&'a str),
    Binary(&'a [u8]),
    UtcDateMillis(i64),
    External(u64),
    MinKey,
    MaxKey,
}

struct Frame {
    /// Absolute offset of this container's head byte.
    start: usize,
    is_object: bool,
    /// Offsets of elements (Array) or keys (Object), relative to `start`.
    offsets: Vec<usize>,
    /// Object-only: true if the next `push_value` must supply a value
    /// (a key was just written and awaits its value).
    expecting_value: bool,
}

/// Builds a document incrementally into an owned buffer.
pub struct Writer {
    buffer: Buffer,
    stack: Vec<Frame>,
    options: WriterOptions,
}

impl Default for Writer {
    fn default() -> Self {
        Self::new()
    }
}

impl Writer {
    pub fn new() -> Self {
        Writer {
            buffer: Buffer::new(),
            stack: Vec::new(),
            options: WriterOptions::default(),
        }
    }

    pub fn with_options(options: WriterOptions) -> Self {
        Writer {
            buffer: Buffer::new(),
            stack: Vec::new(),
            options,
        }
    }

    pub fn options(&self) -> WriterOptions {
        self.options
    }

    /// Drops all state and reuses the underlying allocation.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.stack.clear();
    }

    fn will_be_key_position(&self) -> bool {
        matches!(self.stack.last(), Some(f) if f.is_object && !f.expecting_value)
    }

    /// Records `start` into the current frame (if any) and, for an object,
    /// toggles the key/value expectation. Returns whether `start` was
    /// written at a key position.
    fn after_push(&mut self, start: usize) -> bool {
        let is_key_position = self.will_be_key_position();
        if let Some(frame) = self.stack.last_mut() {
            if frame.is_object {
                if is_key_position {
                    frame.offsets.push(start - frame.start);
                }
                frame.expecting_value = !frame.expecting_value;
            } else {
                frame.offsets.push(start - frame.start);
            }
        }
        is_key_position
    }

    /// Appends a scalar value at the current position.
    pub fn push_value(&mut self, value: Value) -> Result<()> {
        if self.will_be_key_position() && !matches!(value, Value::Str(_)) {
            return Err(Error::BuilderUnexpectedValue);
        }
        let start = self.buffer.len();
        self.write_scalar(&value)?;
        self.after_push(start);
        Ok(())
    }

    /// Convenience: pushes `key` then `value` in sequence, for use inside an
    /// open object.
    pub fn push_entry(&mut self, key: &str, value: Value) -> Result<()> {
        self.push_value(Value::Str(key))?;
        self.push_value(value)
    }

    pub fn open_array(&mut self) -> Result<()> {
        self.open_container(false)
    }

    pub fn open_object(&mut self) -> Result<()> {
        self.open_container(true)
    }

    fn open_container(&mut self, is_object: bool) -> Result<()> {
        if self.will_be_key_position() {
            return Err(Error::BuilderUnexpectedValue);
        }
        let start = self.buffer.len();
        self.buffer.push(0);
        self.buffer.push_zeros(RESERVED_HEADER - 1);
        self.after_push(start);
        trace!(start, is_object, "open container");
        self.stack.push(Frame {
            start,
            is_object,
            offsets: Vec::new(),
            expecting_value: false,
        });
        Ok(())
    }

    /// Seals the innermost open container.
    pub fn close(&mut self) -> Result<()> {
        let mut frame = self
            .stack
            .pop()
            .ok_or(Error::BuilderNeedOpenContainer)?;
        if frame.is_object && frame.expecting_value {
            return Err(Error::BuilderUnexpectedValue);
        }

        let tos = frame.start;
        let is_object = frame.is_object;
        let n = frame.offsets.len();
        let cur_pos = self.buffer.len();

        if n == 0 {
            let head = if is_object {
                tag::HEAD_EMPTY_OBJECT
            } else {
                tag::HEAD_EMPTY_ARRAY
            };
            self.buffer.truncate(tos);
            self.buffer.push(head);
            debug!(tos, "closed empty container");
            return Ok(());
        }

        let content_bytes = cur_pos - tos - RESERVED_HEADER;
        let uniform = !is_object && is_uniform_sizes(&frame.offsets, cur_pos - tos);

        if uniform {
            self.close_uniform_array(tos, content_bytes, &mut frame.offsets)?;
        } else {
            self.close_indexed(tos, is_object, content_bytes, &mut frame.offsets)?;
        }
        debug!(tos, n, "closed container");
        Ok(())
    }

    fn close_uniform_array(
        &mut self,
        tos: usize,
        content_bytes: usize,
        offsets: &mut [usize],
    ) -> Result<()> {
        let w = smallest_fitting_width(|w| (1 + w) as u128 + content_bytes as u128)
            .ok_or(Error::NumberOutOfRange)?;
        let new_first_sub = 1 + w;
        self.compact(tos, new_first_sub, offsets);

        let byte_length = new_first_sub + content_bytes;
        check_value_length(byte_length)?;

        let head = tag::HEAD_ARRAY_UNINDEXED_START + nibble_for_width(w);
        self.buffer.patch(tos, &[head]);
        self.write_uint_at(tos + 1, w, byte_length as u64);
        Ok(())
    }

    fn close_indexed(
        &mut self,
        tos: usize,
        is_object: bool,
        content_bytes: usize,
        offsets: &mut Vec<usize>,
    ) -> Result<()> {
        let n = offsets.len();
        let need_table = n > 1;

        let w = smallest_fitting_width(|w| {
            let first_sub = if w < 8 { 1 + 2 * w } else { 9 };
            let table_bytes = if need_table { w * n } else { 0 };
            let trailing = if w == 8 { 8 } else { 0 };
            (first_sub + content_bytes + table_bytes + trailing) as u128
        })
        .ok_or(Error::NumberOutOfRange)?;

        let new_first_sub = if w < 8 { 1 + 2 * w } else { 9 };
        self.compact(tos, new_first_sub, offsets);

        if is_object && need_table && self.options.sort_attribute_names {
            let mut pairs: Vec<(usize, Vec<u8>)> = Vec::with_capacity(n);
            {
                let data = self.buffer.as_slice();
                for &off in offsets.iter() {
                    let key_bytes = find_key_bytes(&data[tos + off..])?.to_vec();
                    pairs.push((off, key_bytes));
                }
            }
            pairs.sort_by(|a, b| compare_keys(&a.1, &b.1));
            if self.options.check_attribute_uniqueness {
                for pair in pairs.windows(2) {
                    if compare_keys(&pair[0].1, &pair[1].1) == std::cmp::Ordering::Equal {
                        return Err(Error::DuplicateAttributeName);
                    }
                }
            }
            *offsets = pairs.into_iter().map(|(off, _)| off).collect();
        } else if is_object && self.options.check_attribute_uniqueness && n > 1 {
            let mut seen: HashSet<Vec<u8>> = HashSet::with_capacity(n);
            let data = self.buffer.as_slice();
            for &off in offsets.iter() {
                let key_bytes = find_key_bytes(&data[tos + off..])?.to_vec();
                if !seen.insert(key_bytes) {
                    return Err(Error::DuplicateAttributeName);
                }
            }
        }

        if need_table {
            let table_start = self.buffer.len();
            self.buffer.push_zeros(w * n);
            for (i, &off) in offsets.iter().enumerate() {
                self.write_uint_at(table_start + i * w, w, off as u64);
            }
        }
        if w == 8 {
            self.buffer.extend_from_slice(&(n as u64).to_le_bytes());
        }

        let byte_length = self.buffer.len() - tos;
        check_value_length(byte_length)?;

        let head = if !is_object {
            tag::HEAD_ARRAY_INDEXED_START + nibble_for_width(w)
        } else if self.options.sort_attribute_names {
            tag::HEAD_OBJECT_SORTED_START + nibble_for_width(w)
        } else {
            tag::HEAD_OBJECT_UNSORTED_START + nibble_for_width(w)
        };
        self.buffer.patch(tos, &[head]);
        self.write_uint_at(tos + 1, w, byte_length as u64);
        if w < 8 {
            self.write_uint_at(tos + 1 + w, w, n as u64);
        }
        Ok(())
    }

    /// Shifts the already-written content of a container down from the
    /// worst-case 9-byte reserved header to `new_first_sub` bytes, and
    /// rewrites `offsets` (relative to the container start) to match.
    fn compact(&mut self, tos: usize, new_first_sub: usize, offsets: &mut [usize]) {
        let delta = RESERVED_HEADER - new_first_sub;
        if delta == 0 {
            return;
        }
        let cur_len = self.buffer.len();
        let src = tos + RESERVED_HEADER;
        let dst = tos + new_first_sub;
        self.buffer.copy_within(src..cur_len, dst);
        self.buffer.truncate(cur_len - delta);
        for off in offsets.iter_mut() {
            *off -= delta;
        }
    }

    fn write_uint_at(&mut self, offset: usize, width: usize, value: u64) {
        let bytes = value.to_le_bytes();
        self.buffer.patch(offset, &bytes[..width]);
    }

    fn write_scalar(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Null => self.buffer.push(tag::HEAD_NULL),
            Value::Bool(b) => self
                .buffer
                .push(if *b { tag::HEAD_TRUE } else { tag::HEAD_FALSE }),
            Value::MinKey => self.buffer.push(tag::HEAD_MIN_KEY),
            Value::MaxKey => self.buffer.push(tag::HEAD_MAX_KEY),
            Value::Double(f) => {
                if !f.is_finite() {
                    return Err(Error::NumberOutOfRange);
                }
                self.buffer.push(tag::HEAD_DOUBLE);
                self.buffer.extend_from_slice(&f.to_bits().to_le_bytes());
            }
            Value::UtcDateMillis(ms) => {
                self.buffer.push(tag::HEAD_UTC_DATE);
                self.buffer.extend_from_slice(&(*ms as u64).to_le_bytes());
            }
            Value::External(bits) => {
                self.buffer.push(tag::HEAD_EXTERNAL);
                self.buffer.extend_from_slice(&bits.to_le_bytes());
            }
            Value::Int(i) => {
                if let Some(head) = tag::small_int_head(*i) {
                    self.buffer.push(head);
                } else {
                    let w = tag::smallest_int_width(*i);
                    self.buffer.push(tag::HEAD_INT_START + nibble_for_width(w));
                    let bytes = (*i as u64).to_le_bytes();
                    self.buffer.extend_from_slice(&bytes[..w]);
                }
            }
            Value::UInt(u) => {
                if *u <= 9 {
                    self.buffer.push(tag::small_int_head(*u as i64).unwrap());
                } else {
                    let w = tag::smallest_uint_width(*u);
                    self.buffer
                        .push(tag::HEAD_UINT_START + nibble_for_width(w));
                    let bytes = u.to_le_bytes();
                    self.buffer.extend_from_slice(&bytes[..w]);
                }
            }
            Value::Str(s) => self.write_str_bytes(s.as_bytes())?,
            Value::Binary(data) => {
                check_value_length(data.len())?;
                let w = tag::minimal_length_width(data.len() as u64);
                self.buffer
                    .push(tag::HEAD_BINARY_START + (w as u8 - 1));
                self.buffer
                    .extend_from_slice(&(data.len() as u64).to_le_bytes()[..w]);
                self.buffer.extend_from_slice(data);
            }
        }
        Ok(())
    }

    /// Encodes a string value's wire bytes, short or long layout depending
    /// on `bytes.len()`. Shared by [`Value::Str`] and [`Writer::push_str_bytes`]
    /// — the wire format stores a string as a length-prefixed byte run and
    /// never itself requires those bytes to be valid UTF-8.
    fn write_str_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() <= tag::SHORT_STRING_MAX_LEN {
            self.buffer
                .push(tag::HEAD_SHORT_STRING_START + bytes.len() as u8);
            self.buffer.extend_from_slice(bytes);
        } else {
            check_value_length(bytes.len())?;
            self.buffer.push(tag::HEAD_LONG_STRING);
            self.buffer
                .extend_from_slice(&(bytes.len() as u64).to_le_bytes());
            self.buffer.extend_from_slice(bytes);
        }
        Ok(())
    }

    /// Pushes a string value from raw bytes that are not required to be
    /// valid UTF-8. Used by the parser's `validate_utf8_strings = false`
    /// path, which intentionally lets ill-formed sequences through
    /// unexamined rather than forcing a `&str` on them.
    pub(crate) fn push_str_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let start = self.buffer.len();
        self.write_str_bytes(bytes)?;
        self.after_push(start);
        Ok(())
    }

    /// Produces a reader over the finished document. Legal only once every
    /// opened container has been closed.
    pub fn as_slice(&self) -> Result<&[u8]> {
        if !self.stack.is_empty() {
            return Err(Error::InternalError(
                "cannot finalize a writer with open containers",
            ));
        }
        Ok(self.buffer.as_slice())
    }

    pub fn into_reader(&self) -> Result<Reader<'_>> {
        Ok(Reader::new(self.as_slice()?))
    }

    /// Transfers the underlying storage out of the writer.
    pub fn into_vec(self) -> Result<Vec<u8>> {
        if !self.stack.is_empty() {
            return Err(Error::InternalError(
                "cannot finalize a writer with open containers",
            ));
        }
        Ok(self.buffer.into_vec())
    }
}

fn is_uniform_sizes(offsets: &[usize], total_rel_len: usize) -> bool {
    let n = offsets.len();
    if n <= 1 {
        return true;
    }
    let first = offsets[1] - offsets[0];
    for i in 1..n - 1 {
        if offsets[i + 1] - offsets[i] != first {
            return false;
        }
    }
    total_rel_len - offsets[n - 1] == first
}

fn nibble_for_width(w: usize) -> u8 {
    match w {
        1 => 0,
        2 => 1,
        4 => 2,
        8 => 3,
        _ => unreachable!("container width must be 1, 2, 4 or 8"),
    }
}

/// Chooses the smallest `W in {1, 2, 4, 8}` for which `total(W) <= 2^(8W)`.
fn smallest_fitting_width(total: impl Fn(usize) -> u128) -> Option<usize> {
    for w in [1usize, 2, 4, 8] {
        if total(w) <= (1u128 << (8 * w)) {
            return Some(w);
        }
    }
    None
}

fn check_value_length(len: usize) -> Result<()> {
    if len as u64 > tag::MAX_VALUE_LENGTH {
        Err(Error::NumberOutOfRange)
    } else {
        Ok(())
    }
}

/// Reads the UTF-8 bytes of a key at `data` (head byte first). Only String
/// heads are understood; any other head under a key position is a wire-level
/// misuse this crate does not support.
fn find_key_bytes(data: &[u8]) -> Result<&[u8]> {
    let head = data[0];
    if (tag::HEAD_SHORT_STRING_START..=tag::HEAD_SHORT_STRING_END).contains(&head) {
        let len = (head - tag::HEAD_SHORT_STRING_START) as usize;
        Ok(&data[1..1 + len])
    } else if head == tag::HEAD_LONG_STRING {
        let len = read_uint_le(&data[1..9]) as usize;
        Ok(&data[9..9 + len])
    } else {
        Err(Error::NotImplemented)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::Tag;

    #[test]
    fn test_empty_array() {
        let mut w = Writer::new();
        w.open_array().unwrap();
        w.close().unwrap();
        assert_eq!(w.as_slice().unwrap(), &[tag::HEAD_EMPTY_ARRAY]);
    }

    #[test]
    fn test_empty_object() {
        let mut w = Writer::new();
        w.open_object().unwrap();
        w.close().unwrap();
        assert_eq!(w.as_slice().unwrap(), &[tag::HEAD_EMPTY_OBJECT]);
    }

    #[test]
    fn test_uniform_small_int_array() {
        let mut w = Writer::new();
        w.open_array().unwrap();
        w.push_value(Value::Int(1)).unwrap();
        w.push_value(Value::Int(2)).unwrap();
        w.push_value(Value::Int(3)).unwrap();
        w.close().unwrap();
        let data = w.as_slice().unwrap().to_vec();
        assert_eq!(data[0], tag::HEAD_ARRAY_UNINDEXED_START);
        let reader = Reader::new(&data);
        assert_eq!(reader.length().unwrap(), 3);
        assert_eq!(reader.at(0).unwrap().as_small_int().unwrap(), 1);
        assert_eq!(reader.at(2).unwrap().as_small_int().unwrap(), 3);
    }

    #[test]
    fn test_object_sorted_by_default() {
        let mut w = Writer::new();
        w.open_object().unwrap();
        w.push_entry("foo", Value::Str("bar")).unwrap();
        w.push_entry("baz", Value::Bool(true)).unwrap();
        w.close().unwrap();
        let data = w.as_slice().unwrap().to_vec();
        let reader = Reader::new(&data);
        assert_eq!(reader.tag(), Tag::Object);
        assert_eq!(reader.get("foo").unwrap().unwrap().as_str().unwrap(), "bar");
        assert!(reader.get("baz").unwrap().unwrap().as_bool().unwrap());
        assert_eq!(reader.keys().unwrap(), vec!["baz", "foo"]);
    }

    #[test]
    fn test_nested_array_of_objects() {
        let mut w = Writer::new();
        w.open_array().unwrap();
        w.open_object().unwrap();
        w.push_entry("a", Value::Int(1)).unwrap();
        w.close().unwrap();
        w.open_object().unwrap();
        w.push_entry("b", Value::Int(2)).unwrap();
        w.close().unwrap();
        w.close().unwrap();
        let data = w.as_slice().unwrap().to_vec();
        let reader = Reader::new(&data);
        assert_eq!(reader.length().unwrap(), 2);
        assert_eq!(
            reader.at(0).unwrap().get("a").unwrap().unwrap().as_i64().unwrap(),
            1
        );
        assert_eq!(
            reader.at(1).unwrap().get("b").unwrap().unwrap().as_i64().unwrap(),
            2
        );
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let mut w = Writer::with_options(WriterOptions {
            check_attribute_uniqueness: true,
            ..WriterOptions::default()
        });
        w.open_object().unwrap();
        w.push_entry("x", Value::Int(1)).unwrap();
        w.push_entry("y", Value::Int(2)).unwrap();
        w.push_entry("x", Value::Int(3)).unwrap();
        let err = w.close().unwrap_err();
        assert_eq!(err, Error::DuplicateAttributeName);
    }

    #[test]
    fn test_unsorted_object_keeps_insertion_order() {
        let mut w = Writer::with_options(WriterOptions {
            sort_attribute_names: false,
            ..WriterOptions::default()
        });
        w.open_object().unwrap();
        w.push_entry("foo", Value::Int(1)).unwrap();
        w.push_entry("baz", Value::Int(2)).unwrap();
        w.close().unwrap();
        let data = w.as_slice().unwrap().to_vec();
        let reader = Reader::new(&data);
        assert_eq!(reader.keys().unwrap(), vec!["foo", "baz"]);
    }

    #[test]
    fn test_close_without_open_is_error() {
        let mut w = Writer::new();
        assert_eq!(w.close().unwrap_err(), Error::BuilderNeedOpenContainer);
    }

    #[test]
    fn test_non_string_object_key_rejected() {
        let mut w = Writer::new();
        w.open_object().unwrap();
        let err = w.push_value(Value::Int(1)).unwrap_err();
        assert_eq!(err, Error::BuilderUnexpectedValue);
    }

    #[test]
    fn test_width_promotion_with_256_elements() {
        let mut w = Writer::new();
        w.open_array().unwrap();
        for i in 0..256i64 {
            // Alternate widths so the array is non-uniform and must carry
            // an offset table.
            if i % 2 == 0 {
                w.push_value(Value::Int(i)).unwrap();
            } else {
                w.push_value(Value::Double(i as f64)).unwrap();
            }
        }
        w.close().unwrap();
        let data = w.as_slice().unwrap().to_vec();
        assert!((tag::HEAD_ARRAY_INDEXED_START..=tag::HEAD_ARRAY_INDEXED_END).contains(&data[0]));
        let reader = Reader::new(&data);
        assert_eq!(reader.length().unwrap(), 256);
        assert_eq!(reader.at(0).unwrap().as_small_int().unwrap(), 0);
        assert_eq!(reader.at(255).unwrap().as_f64().unwrap(), 255.0);
    }
}
