//! logster reads newly appended lines from a log file, turns them into
//! metrics with a format-specific parser and ships those metrics to one or
//! more monitoring backends. It is meant to be run from cron: every run picks
//! up where the previous one stopped, reports a single snapshot for the
//! elapsed interval and exits.
//!
//! The moving parts are:
//!
//!  * `parser::Parser`, which consumes lines and produces `metric::MetricValue`
//!    snapshots.
//!  * `output::Output`, which formats and transmits a snapshot.
//!  * `tail::LogTail`, which remembers how far into a file the last run got.
//!
//! See `logster --help` for the command line.
#![allow(unknown_lints)]
#![deny(trivial_numeric_casts, missing_docs, unstable_features, unused_import_braces)]
extern crate chrono;
extern crate clap;
extern crate libc;
extern crate regex;
extern crate rusoto_cloudwatch;
extern crate rusoto_core;
extern crate serde;
extern crate serde_json;
extern crate toml;

#[macro_use]
extern crate log;

#[macro_use]
extern crate lazy_static;

#[macro_use]
extern crate serde_derive;

#[cfg(test)]
extern crate quickcheck;
#[cfg(test)]
extern crate tempdir;

pub mod buckets;
pub mod config;
pub mod lock;
pub mod metric;
pub mod output;
pub mod parser;
pub mod percentile;
pub mod tail;
pub mod time;
