//
// Copyright 2020 vpack Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! A compact, self-describing binary serialization format for JSON-superset
//! documents.
//!
//! The crate is built around four pieces:
//!
//!   - [`reader::Reader`], a zero-copy view over an encoded value with
//!     constant-time indexed access and binary-searchable object keys.
//!   - [`writer::Writer`], an incremental builder that tracks a stack of
//!     open containers and seals each one's offset table on `close()`.
//!   - [`parser`], a single-pass JSON parser that drives a `Writer` directly.
//!   - [`dumper`], which walks a `Reader` back out to JSON text.
//!
//! ```
//! use vpack::{parser, dumper, reader::Reader, options::WriterOptions};
//!
//! let bytes = parser::parse_one(br#"{"a":1,"b":[true,null]}"#, WriterOptions::default()).unwrap();
//! let reader = Reader::new(&bytes);
//! assert_eq!(reader.get("a").unwrap().unwrap().as_i64().unwrap(), 1);
//! assert_eq!(dumper::dump_to_string(&reader, Default::default()).unwrap(), r#"{"a":1,"b":[true,null]}"#);
//! ```

pub mod buffer;
pub mod dumper;
pub mod error;
pub mod options;
pub mod parser;
pub mod reader;
pub mod scan;
pub mod tag;
pub mod writer;

pub use error::{Error, Result};
pub use options::{DumpOptions, DumpStrategy, WriterOptions};
pub use reader::Reader;
pub use tag::Tag;
pub use writer::{Value, Writer};
