//
// Copyright 2020 vpack Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// The closed set of failures the binary format codec can raise.
///
/// Every variant is fatal to the enclosing top-level call (`parse`, `close`,
/// `at`, `get`, `dump`); there is no internal retry.
#[derive(Error, Clone, Debug, PartialEq)]
pub enum Error {
    /// JSON syntax violation encountered at the given byte offset.
    #[error("invalid JSON syntax at byte offset {offset}")]
    ParseError { offset: usize },

    /// A raw control byte (< 0x20) was found inside a string body.
    #[error("unexpected control character in string body at byte offset {offset}")]
    UnexpectedControlCharacter { offset: usize },

    /// Ill-formed UTF-8 was encountered while `validate_utf8_strings` was enabled.
    #[error("invalid UTF-8 sequence in string body at byte offset {offset}")]
    InvalidUtf8Sequence { offset: usize },

    /// A numeric literal overflowed, or produced a non-finite `f64`.
    #[error("number out of range")]
    NumberOutOfRange,

    /// `at(i)` / `key_at(i)` / `value_at(i)` indexed past the end of a container.
    #[error("index {index} out of bounds for container of length {length}")]
    IndexOutOfBounds { index: usize, length: usize },

    /// An empty path was supplied to a multi-key `get`.
    #[error("attribute path must not be empty")]
    InvalidAttributePath,

    /// An accessor or operation does not match the slice's tag.
    #[error("invalid value type for this operation")]
    InvalidValueType,

    /// `check_attribute_uniqueness` found two equal keys in an object.
    #[error("duplicate attribute name")]
    DuplicateAttributeName,

    /// `push_value` / `close` was called with no matching open container.
    #[error("no open array or object to add to or close")]
    BuilderNeedOpenContainer,

    /// `push_value` was called with a value in the wrong position (key vs. value).
    #[error("unexpected value; a key was expected here (or vice versa)")]
    BuilderUnexpectedValue,

    /// A documented-but-unimplemented wire feature was exercised (`BCD`, or a
    /// non-string key encountered by the attribute sorter).
    #[error("not implemented")]
    NotImplemented,

    /// The dumper encountered a non-JSON tag under the `Fail` strategy.
    #[error("value has no JSON equivalent")]
    NoJsonEquivalent,

    /// An internal invariant was violated (e.g. a non-String key where one
    /// was expected). Indicates a bug in this crate or a corrupt document.
    #[error("internal error: {0}")]
    InternalError(&'static str),

    /// File I/O failure, surfaced by the `jsonize` binary.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::Io(value.to_string())
    }
}
