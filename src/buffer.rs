//
// Copyright 2020 vpack Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! A growable byte buffer with small-buffer optimization.
//!
//! Most documents produced by the writer are small (a handful of attributes,
//! short strings); spilling every one of them to the heap is wasteful. `Buffer`
//! wraps a [`smallvec::SmallVec`] so documents up to [`INLINE_CAPACITY`] bytes
//! never allocate.

use smallvec::SmallVec;
use std::ops::{Deref, DerefMut};

/// Inline storage capacity, in bytes, before `Buffer` spills to the heap.
pub const INLINE_CAPACITY: usize = 64;

/// A `Vec<u8>`-like buffer that stores up to [`INLINE_CAPACITY`] bytes inline.
#[derive(Clone, Debug, Default)]
pub struct Buffer {
    inner: SmallVec<[u8; INLINE_CAPACITY]>,
}

impl Buffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self {
            inner: SmallVec::new(),
        }
    }

    /// Creates an empty buffer with room for at least `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: SmallVec::with_capacity(capacity),
        }
    }

    /// Appends a single byte.
    pub fn push(&mut self, byte: u8) {
        self.inner.push(byte);
    }

    /// Appends `bytes` in order.
    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.inner.extend_from_slice(bytes);
    }

    /// Appends `count` zero bytes, returning the offset of the first one.
    /// Used by the writer to reserve a fixed-width field to be patched later.
    pub fn push_zeros(&mut self, count: usize) -> usize {
        let start = self.inner.len();
        self.inner.resize(start + count, 0);
        start
    }

    /// Overwrites the `value.len()` bytes starting at `offset` in place.
    ///
    /// Used to patch a reserved header field (byte length, count, index
    /// table width) once the final value is known.
    pub fn patch(&mut self, offset: usize, value: &[u8]) {
        self.inner[offset..offset + value.len()].copy_from_slice(value);
    }

    /// Truncates the buffer to `len` bytes. A no-op if `len >= self.len()`.
    pub fn truncate(&mut self, len: usize) {
        self.inner.truncate(len);
    }

    /// Removes all bytes, retaining the allocation.
    pub fn clear(&mut self) {
        self.inner.clear();
    }

    /// Current length in bytes.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Borrows the full contents as a byte slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.inner
    }

    /// Consumes the buffer, returning an owned, heap-allocated `Vec<u8>`.
    pub fn into_vec(self) -> Vec<u8> {
        self.inner.into_vec()
    }

    /// True if every byte is currently held inline (no heap allocation).
    pub fn is_inline(&self) -> bool {
        !self.inner.spilled()
    }
}

impl Deref for Buffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.inner
    }
}

impl DerefMut for Buffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.inner
    }
}

impl From<Vec<u8>> for Buffer {
    fn from(vec: Vec<u8>) -> Self {
        Self {
            inner: SmallVec::from_vec(vec),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_empty_and_inline() {
        let buf = Buffer::new();
        assert!(buf.is_empty());
        assert!(buf.is_inline());
    }

    #[test]
    fn test_push_and_extend() {
        let mut buf = Buffer::new();
        buf.push(0x01);
        buf.extend_from_slice(&[0x02, 0x03]);
        assert_eq!(buf.as_slice(), &[0x01, 0x02, 0x03]);
    }

    #[test]
    fn test_push_zeros_and_patch() {
        let mut buf = Buffer::new();
        buf.push(0xff);
        let off = buf.push_zeros(4);
        assert_eq!(buf.len(), 5);
        buf.patch(off, &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(buf.as_slice(), &[0xff, 0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_spills_past_inline_capacity() {
        let mut buf = Buffer::new();
        for _ in 0..INLINE_CAPACITY {
            buf.push(0);
        }
        assert!(buf.is_inline());
        buf.push(0);
        assert!(!buf.is_inline());
    }

    #[test]
    fn test_truncate_and_clear() {
        let mut buf = Buffer::new();
        buf.extend_from_slice(&[1, 2, 3, 4]);
        buf.truncate(2);
        assert_eq!(buf.as_slice(), &[1, 2]);
        buf.clear();
        assert!(buf.is_empty());
    }
}
