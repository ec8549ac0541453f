//
// Copyright 2020 vpack Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.
//

//! Converts a JSON file to the binary format, or back.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser as ClapParser;
use tracing::{error, info};

use vpack::dumper;
use vpack::options::{DumpOptions, WriterOptions};
use vpack::parser;
use vpack::reader::Reader;

/// Converts between JSON text and the crate's binary document format.
#[derive(ClapParser, Debug)]
#[command(name = "jsonize", version, about)]
struct Args {
    /// Input file. Read as JSON unless `--decode` is given.
    infile: PathBuf,

    /// Output file. Written as the binary format unless `--decode` is given.
    outfile: PathBuf,

    /// Treat `infile` as the binary format and `outfile` as JSON.
    #[arg(long)]
    decode: bool,

    /// Pretty-print JSON output (only meaningful with `--decode`).
    #[arg(long)]
    pretty: bool,

    /// Parse `infile` as a whitespace-separated sequence of JSON values
    /// rather than exactly one.
    #[arg(long)]
    multi: bool,

    /// Leave object keys in source order instead of sorting them.
    #[arg(long = "no-sort-keys")]
    no_sort_keys: bool,

    /// Reject documents with duplicate object keys.
    #[arg(long = "check-duplicates")]
    check_duplicates: bool,

    /// Increase log verbosity (`-v` debug, `-vv` trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "jsonize failed");
            eprintln!("jsonize: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();
}

fn run(args: &Args) -> vpack::Result<()> {
    let input = fs::read(&args.infile)?;
    info!(path = %args.infile.display(), bytes = input.len(), "read input");

    if args.decode {
        let reader = Reader::new(&input);
        let opts = DumpOptions {
            pretty: args.pretty,
            ..DumpOptions::default()
        };
        let json = dumper::dump_to_string(&reader, opts)?;
        fs::write(&args.outfile, json)?;
    } else {
        let write_opts = WriterOptions {
            sort_attribute_names: !args.no_sort_keys,
            check_attribute_uniqueness: args.check_duplicates,
            ..WriterOptions::default()
        };
        let encoded = if args.multi {
            let (count, bytes) = parser::parse_multi(&input, write_opts)?;
            info!(count, "parsed multiple top-level values");
            bytes
        } else {
            parser::parse_one(&input, write_opts)?
        };
        fs::write(&args.outfile, encoded)?;
    }

    info!(path = %args.outfile.display(), "wrote output");
    Ok(())
}
