//
// Copyright 2020 vpack Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! Compares this crate's parse+dump round trip against `serde_json` on a
//! representative document.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use vpack::dumper;
use vpack::options::{DumpOptions, WriterOptions};
use vpack::parser;
use vpack::reader::Reader;

fn sample_json() -> &'static str {
    r#"{"id":"task-set-example","active":true,"count":42,"ratio":3.14159,
        "tags":["alpha","beta","gamma"],"owner":{"name":"ops","level":7},"notes":null}"#
}

fn bench_vpack(c: &mut Criterion) {
    let json = sample_json();
    c.bench_function("vpack_parse", |b| {
        b.iter(|| parser::parse_one(black_box(json.as_bytes()), WriterOptions::default()).unwrap())
    });

    let encoded = parser::parse_one(json.as_bytes(), WriterOptions::default()).unwrap();
    c.bench_function("vpack_dump", |b| {
        b.iter(|| {
            let reader = Reader::new(black_box(&encoded));
            dumper::dump_to_string(&reader, DumpOptions::default()).unwrap()
        })
    });

    c.bench_function("vpack_roundtrip", |b| {
        b.iter(|| {
            let bytes = parser::parse_one(black_box(json.as_bytes()), WriterOptions::default())
                .unwrap();
            let reader = Reader::new(&bytes);
            dumper::dump_to_string(&reader, DumpOptions::default()).unwrap()
        })
    });
}

fn bench_serde_json(c: &mut Criterion) {
    let json = sample_json();
    c.bench_function("serde_json_roundtrip", |b| {
        b.iter(|| {
            let value: serde_json::Value = serde_json::from_str(black_box(json)).unwrap();
            serde_json::to_string(&value).unwrap()
        })
    });
}

criterion_group!(benches, bench_vpack, bench_serde_json);
criterion_main!(benches);
