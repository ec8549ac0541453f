//
// Copyright 2020 vpack Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! Options threaded through the writer, parser, and dumper.

/// Behavior switches for [`crate::writer::Writer`] and the parser that
/// drives it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct WriterOptions {
    /// Sort object keys at `close()` time so lookups can binary search.
    /// Defaults to `true`.
    pub sort_attribute_names: bool,
    /// Reject an object whose keys are not all distinct. Defaults to
    /// `false`.
    pub check_attribute_uniqueness: bool,
    /// Reject string bodies that are not well-formed UTF-8. Defaults to
    /// `false`; the parser otherwise accepts whatever bytes it is given.
    pub validate_utf8_strings: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        WriterOptions {
            sort_attribute_names: true,
            check_attribute_uniqueness: false,
            validate_utf8_strings: false,
        }
    }
}

/// How the dumper handles a value with no JSON equivalent (`External`,
/// `UTCDate`, `Binary`, `BCD`, `MinKey`, `MaxKey`, a non-finite `Double`, and
/// `Custom` values with no registered callback).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DumpStrategy {
    /// Raise [`crate::error::Error::NoJsonEquivalent`].
    Fail,
    /// Emit the JSON literal `null` and continue.
    Nullify,
}

impl Default for DumpStrategy {
    fn default() -> Self {
        DumpStrategy::Fail
    }
}

/// Options controlling [`crate::dumper`] output.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DumpOptions {
    pub strategy: DumpStrategy,
    /// Two-space indentation and newlines after `[`/`{`/`,`.
    pub pretty: bool,
}

impl Default for DumpOptions {
    fn default() -> Self {
        DumpOptions {
            strategy: DumpStrategy::Fail,
            pretty: false,
        }
    }
}
