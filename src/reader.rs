//
// Copyright 2020 vpack Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! The zero-copy reader.
//!
//! A [`Reader`] is a non-owning view over a byte region whose first byte is a
//! valid value head. It never allocates and never copies the bytes it was
//! constructed over; typed accessors either reinterpret bytes in place or
//! (for strings) borrow a `&str` directly out of the backing buffer.

use crate::error::{Error, Result};
use crate::tag::{self, Tag};

/// A borrowed view over one value's bytes.
///
/// `Reader` is `Copy`: it is a fat pointer plus nothing else, and aliasing a
/// document with many concurrent readers is the common case, not the
/// exception.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Reader<'a> {
    data: &'a [u8],
}

impl<'a> Reader<'a> {
    /// Wraps `data` as a reader. `data` must start at a valid value head;
    /// trailing bytes beyond `byte_size()` are permitted and ignored (this
    /// is how a sub-value is read out of its parent container without
    /// slicing first).
    pub fn new(data: &'a [u8]) -> Self {
        Reader { data }
    }

    fn head(&self) -> u8 {
        self.data[0]
    }

    /// The logical tag of this value.
    pub fn tag(&self) -> Tag {
        tag::tag_of(self.head())
    }

    fn require_tag(&self, want: Tag) -> Result<()> {
        if self.tag() == want {
            Ok(())
        } else {
            Err(Error::InvalidValueType)
        }
    }

    fn require_container(&self) -> Result<()> {
        match self.tag() {
            Tag::Array | Tag::Object => Ok(()),
            _ => Err(Error::InvalidValueType),
        }
    }

    /// The total size of this value in bytes, head included.
    pub fn byte_size(&self) -> Result<usize> {
        let head = self.head();
        match self.tag() {
            Tag::None | Tag::Null | Tag::Bool | Tag::MinKey | Tag::MaxKey | Tag::SmallInt => {
                Ok(1)
            }
            Tag::Double | Tag::UtcDate | Tag::External => Ok(9),
            Tag::Int => Ok(1 + tag::int_byte_width(head)),
            Tag::UInt => Ok(1 + tag::uint_byte_width(head)),
            Tag::String => {
                if head == tag::HEAD_LONG_STRING {
                    let len = read_uint_le(&self.data[1..9]) as usize;
                    Ok(9 + len)
                } else {
                    Ok(1 + (head - tag::HEAD_SHORT_STRING_START) as usize)
                }
            }
            Tag::Binary => {
                let lw = tag::binary_length_field_width(head);
                let len = read_uint_le(&self.data[1..1 + lw]) as usize;
                Ok(1 + lw + len)
            }
            Tag::Array | Tag::Object => {
                if head == tag::HEAD_EMPTY_ARRAY || head == tag::HEAD_EMPTY_OBJECT {
                    Ok(1)
                } else {
                    let w = tag::container_width(head).ok_or(Error::InternalError(
                        "container head missing a width entry",
                    ))?;
                    Ok(read_uint_le(&self.data[1..1 + w]) as usize)
                }
            }
            Tag::Bcd | Tag::Custom => Err(Error::NotImplemented),
        }
    }

    /// The byte size of a `Custom`-tagged value whose length is known only
    /// to the caller (the wire format stores no length for `Custom`).
    pub fn custom_byte_size(&self, known_payload_len: usize) -> Result<usize> {
        self.require_tag(Tag::Custom)?;
        Ok(1 + known_payload_len)
    }

    /// The raw payload bytes of a `Custom` value, given its externally known
    /// length.
    pub fn custom_bytes(&self, known_payload_len: usize) -> Result<&'a [u8]> {
        self.require_tag(Tag::Custom)?;
        Ok(&self.data[1..1 + known_payload_len])
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self.head() {
            tag::HEAD_FALSE => Ok(false),
            tag::HEAD_TRUE => Ok(true),
            _ => Err(Error::InvalidValueType),
        }
    }

    pub fn as_f64(&self) -> Result<f64> {
        self.require_tag(Tag::Double)?;
        let bits = read_uint_le(&self.data[1..9]);
        Ok(f64::from_bits(bits))
    }

    /// Widening numeric accessor: returns the value as `i64` regardless of
    /// whether it was stored as `SmallInt`, `Int`, or non-negative `UInt`.
    pub fn as_i64(&self) -> Result<i64> {
        let head = self.head();
        match self.tag() {
            Tag::SmallInt => Ok(tag::small_int_value(head)),
            Tag::Int => {
                let w = tag::int_byte_width(head);
                Ok(sign_extend(read_uint_le(&self.data[1..1 + w]), w))
            }
            Tag::UInt => {
                let w = tag::uint_byte_width(head);
                let value = read_uint_le(&self.data[1..1 + w]);
                i64::try_from(value).map_err(|_| Error::NumberOutOfRange)
            }
            _ => Err(Error::InvalidValueType),
        }
    }

    /// Widening numeric accessor: returns the value as `u64`. Fails on a
    /// negative `Int`/`SmallInt`.
    pub fn as_u64(&self) -> Result<u64> {
        let head = self.head();
        match self.tag() {
            Tag::SmallInt => {
                let v = tag::small_int_value(head);
                u64::try_from(v).map_err(|_| Error::NumberOutOfRange)
            }
            Tag::Int => {
                let v = self.as_i64()?;
                u64::try_from(v).map_err(|_| Error::NumberOutOfRange)
            }
            Tag::UInt => {
                let w = tag::uint_byte_width(head);
                Ok(read_uint_le(&self.data[1..1 + w]))
            }
            _ => Err(Error::InvalidValueType),
        }
    }

    pub fn as_small_int(&self) -> Result<i64> {
        self.require_tag(Tag::SmallInt)?;
        Ok(tag::small_int_value(self.head()))
    }

    pub fn as_utc_date_millis(&self) -> Result<i64> {
        self.require_tag(Tag::UtcDate)?;
        let bits = read_uint_le(&self.data[1..9]);
        Ok(bits as i64)
    }

    /// The raw `u64` bit pattern of an `External` value. The codec attaches
    /// no portable meaning to this value; it is the caller's convention.
    pub fn as_external(&self) -> Result<u64> {
        self.require_tag(Tag::External)?;
        Ok(read_uint_le(&self.data[1..9]))
    }

    fn string_body(&self) -> Result<&'a [u8]> {
        self.require_tag(Tag::String)?;
        let head = self.head();
        if head == tag::HEAD_LONG_STRING {
            let len = read_uint_le(&self.data[1..9]) as usize;
            Ok(&self.data[9..9 + len])
        } else {
            let len = (head - tag::HEAD_SHORT_STRING_START) as usize;
            Ok(&self.data[1..1 + len])
        }
    }

    pub fn as_str(&self) -> Result<&'a str> {
        let body = self.string_body()?;
        std::str::from_utf8(body).map_err(|_| Error::InvalidUtf8Sequence { offset: 0 })
    }

    pub fn as_binary(&self) -> Result<&'a [u8]> {
        self.require_tag(Tag::Binary)?;
        let head = self.head();
        let lw = tag::binary_length_field_width(head);
        let len = read_uint_le(&self.data[1..1 + lw]) as usize;
        Ok(&self.data[1 + lw..1 + lw + len])
    }

    /// The number of elements (Array) or key/value pairs (Object).
    pub fn length(&self) -> Result<usize> {
        self.require_container()?;
        self.count()
    }

    fn is_empty_container(&self) -> bool {
        matches!(self.head(), tag::HEAD_EMPTY_ARRAY | tag::HEAD_EMPTY_OBJECT)
    }

    /// Element/pair count, valid for a container only.
    fn count(&self) -> Result<usize> {
        let head = self.head();
        if self.is_empty_container() {
            return Ok(0);
        }
        if tag::is_uniform_array_head(head) {
            let byte_length = self.byte_size()?;
            let first_sub = tag::first_data_offset(head).unwrap();
            if byte_length == first_sub {
                return Ok(0);
            }
            let elem_size = Reader::new(&self.data[first_sub..]).byte_size()?;
            return Ok((byte_length - first_sub) / elem_size);
        }
        let w = tag::container_width(head).ok_or(Error::InternalError(
            "container head missing a width entry",
        ))?;
        if w < 8 {
            Ok(read_uint_le(&self.data[1 + w..1 + 2 * w]) as usize)
        } else {
            let byte_length = self.byte_size()?;
            Ok(read_uint_le(&self.data[byte_length - 8..byte_length]) as usize)
        }
    }

    /// Offset (from the start of this value) of the offset-table's first
    /// entry, if one is physically present (`count > 1`).
    fn offset_table_base(&self, count: usize) -> Result<Option<usize>> {
        let head = self.head();
        if count <= 1 || tag::is_uniform_array_head(head) {
            return Ok(None);
        }
        let w = tag::container_width(head).unwrap();
        let byte_length = self.byte_size()?;
        let trailing_count = if w == 8 { 8 } else { 0 };
        Ok(Some(byte_length - count * w - trailing_count))
    }

    fn element_offset(&self, index: usize) -> Result<usize> {
        let head = self.head();
        let count = self.count()?;
        if index >= count {
            return Err(Error::IndexOutOfBounds {
                index,
                length: count,
            });
        }
        let first_sub = tag::first_data_offset(head).unwrap();
        if tag::is_uniform_array_head(head) {
            let elem_size = Reader::new(&self.data[first_sub..]).byte_size()?;
            return Ok(first_sub + index * elem_size);
        }
        match self.offset_table_base(count)? {
            None => Ok(first_sub),
            Some(base) => {
                let w = tag::container_width(head).unwrap();
                let entry = &self.data[base + index * w..base + (index + 1) * w];
                Ok(read_uint_le(entry) as usize)
            }
        }
    }

    /// The `i`-th element of an Array, or the `i`-th key of an Object.
    pub fn at(&self, index: usize) -> Result<Reader<'a>> {
        self.require_container()?;
        let offset = self.element_offset(index)?;
        Ok(Reader::new(&self.data[offset..]))
    }

    /// The key at position `i` of an Object.
    pub fn key_at(&self, index: usize) -> Result<Reader<'a>> {
        match self.tag() {
            Tag::Object => self.at(index),
            _ => Err(Error::InvalidValueType),
        }
    }

    /// The value at position `i` of an Object (the key's sibling).
    pub fn value_at(&self, index: usize) -> Result<Reader<'a>> {
        let key = self.key_at(index)?;
        let key_size = key.byte_size()?;
        let offset = self.element_offset(index)? + key_size;
        Ok(Reader::new(&self.data[offset..]))
    }

    /// Looks up `key` in an Object. Returns `Ok(None)` if absent, not an
    /// error.
    pub fn get(&self, key: &str) -> Result<Option<Reader<'a>>> {
        self.require_tag(Tag::Object)?;
        let count = self.count()?;
        if count == 0 {
            return Ok(None);
        }
        let head = self.head();
        if tag::is_sorted_object_head(head) && count >= 4 {
            return self.get_sorted(key, count);
        }
        for i in 0..count {
            let k = self.key_at(i)?;
            if k.tag() == Tag::String && k.as_str()? == key {
                return Ok(Some(self.value_at(i)?));
            }
        }
        Ok(None)
    }

    fn get_sorted(&self, key: &str, count: usize) -> Result<Option<Reader<'a>>> {
        let mut lo = 0isize;
        let mut hi = count as isize - 1;
        while lo <= hi {
            let mid = (lo + hi) / 2;
            let k = self.key_at(mid as usize)?;
            if k.tag() != Tag::String {
                // A non-string key breaks the sort-order assumption the
                // binary search relies on; abort rather than risk a false
                // negative.
                return Ok(None);
            }
            match compare_keys(k.as_str()?.as_bytes(), key.as_bytes()) {
                std::cmp::Ordering::Equal => return Ok(Some(self.value_at(mid as usize)?)),
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid - 1,
            }
        }
        Ok(None)
    }

    /// Looks up a nested `path` of keys, descending through Objects.
    pub fn get_path(&self, path: &[&str]) -> Result<Option<Reader<'a>>> {
        if path.is_empty() {
            return Err(Error::InvalidAttributePath);
        }
        let mut current = *self;
        for (i, key) in path.iter().enumerate() {
            match current.get(key)? {
                Some(next) => {
                    if i + 1 == path.len() {
                        return Ok(Some(next));
                    }
                    current = next;
                }
                None => return Ok(None),
            }
        }
        Ok(None)
    }

    /// An iterator over the elements of an Array, or the values of an
    /// Object (see [`Reader::keys`] to recover the matching key names).
    pub fn iter(&self) -> Result<ElementIter<'a>> {
        self.require_container()?;
        let count = self.count()?;
        let is_object = self.tag() == Tag::Object;
        Ok(ElementIter {
            reader: *self,
            index: 0,
            count,
            is_object,
        })
    }

    /// The key strings of an Object, in on-wire order.
    pub fn keys(&self) -> Result<Vec<&'a str>> {
        self.require_tag(Tag::Object)?;
        let count = self.count()?;
        let mut out = Vec::with_capacity(count);
        for i in 0..count {
            out.push(self.key_at(i)?.as_str()?);
        }
        Ok(out)
    }

    /// Borrows the raw bytes of this value, truncated to its `byte_size()`.
    pub fn as_bytes(&self) -> Result<&'a [u8]> {
        let size = self.byte_size()?;
        Ok(&self.data[..size])
    }
}

/// Iterator over the elements of an Array or the values of an Object.
pub struct ElementIter<'a> {
    reader: Reader<'a>,
    index: usize,
    count: usize,
    is_object: bool,
}

impl<'a> Iterator for ElementIter<'a> {
    type Item = Result<Reader<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.count {
            return None;
        }
        let result = if self.is_object {
            self.reader.value_at(self.index)
        } else {
            self.reader.at(self.index)
        };
        self.index += 1;
        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.count - self.index;
        (remaining, Some(remaining))
    }
}

/// The ordering used for sorted-object keys: unsigned byte comparison,
/// shorter-is-less on a tie (classical memcmp then length).
pub(crate) fn compare_keys(a: &[u8], b: &[u8]) -> std::cmp::Ordering {
    let min_len = a.len().min(b.len());
    match a[..min_len].cmp(&b[..min_len]) {
        std::cmp::Ordering::Equal => a.len().cmp(&b.len()),
        other => other,
    }
}

pub(crate) fn read_uint_le(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf[..bytes.len()].copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

fn sign_extend(raw: u64, width: usize) -> i64 {
    if width >= 8 {
        return raw as i64;
    }
    let shift = 64 - width * 8;
    ((raw << shift) as i64) >> shift
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null() {
        let data = [tag::HEAD_NULL];
        let r = Reader::new(&data);
        assert_eq!(r.tag(), Tag::Null);
        assert_eq!(r.byte_size().unwrap(), 1);
    }

    #[test]
    fn test_bool() {
        assert!(Reader::new(&[tag::HEAD_TRUE]).as_bool().unwrap());
        assert!(!Reader::new(&[tag::HEAD_FALSE]).as_bool().unwrap());
    }

    #[test]
    fn test_small_int() {
        let data = [0x31];
        let r = Reader::new(&data);
        assert_eq!(r.tag(), Tag::SmallInt);
        assert_eq!(r.as_small_int().unwrap(), 1);
        assert_eq!(r.as_i64().unwrap(), 1);
    }

    #[test]
    fn test_short_string() {
        let mut data = vec![tag::HEAD_SHORT_STRING_START + 3];
        data.extend_from_slice(b"foo");
        let r = Reader::new(&data);
        assert_eq!(r.as_str().unwrap(), "foo");
        assert_eq!(r.byte_size().unwrap(), 4);
    }

    #[test]
    fn test_double() {
        let mut data = vec![tag::HEAD_DOUBLE];
        data.extend_from_slice(&1.5f64.to_bits().to_le_bytes());
        let r = Reader::new(&data);
        assert_eq!(r.as_f64().unwrap(), 1.5);
    }

    #[test]
    fn test_compare_keys_prefix() {
        assert_eq!(compare_keys(b"ab", b"abc"), std::cmp::Ordering::Less);
        assert_eq!(compare_keys(b"abc", b"ab"), std::cmp::Ordering::Greater);
        assert_eq!(compare_keys(b"abc", b"abd"), std::cmp::Ordering::Less);
        assert_eq!(compare_keys(b"x", b"x"), std::cmp::Ordering::Equal);
    }

    #[test]
    fn test_wrong_type_error() {
        let r = Reader::new(&[tag::HEAD_TRUE]);
        assert_eq!(r.as_f64(), Err(Error::InvalidValueType));
    }
}
