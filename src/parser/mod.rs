//! Parsers turn log lines into metric snapshots.
//!
//! A parser owns all of its accumulated state. The driver feeds it lines in
//! file order through `Parser::parse_line` and, once the file is exhausted,
//! asks for a snapshot with `Parser::get_state`. Taking a snapshot clears the
//! parser so the next snapshot only reflects lines seen after this one.

use clap::{App, AppSettings, ArgMatches};
use config::ConfigError;
use metric::MetricValue;
use std::error;
use std::fmt;

mod access_log;
mod latency;

pub use self::access_log::AccessLog;
pub use self::latency::Latency;

/// Why a single line contributed nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    /// The line does not have the shape this parser understands.
    NoMatch,
    /// The line matched but a captured field would not convert.
    Field {
        /// Name of the offending field.
        field: &'static str,
        /// The text that was captured.
        value: String,
        /// The conversion failure.
        reason: String,
    },
    /// The line's timestamp could not be understood.
    Timestamp(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ParseError::NoMatch => write!(f, "line did not match"),
            ParseError::Field {
                field,
                ref value,
                ref reason,
            } => write!(f, "could not convert {} {:?}: {}", field, value, reason),
            ParseError::Timestamp(ref reason) => write!(f, "bad timestamp: {}", reason),
        }
    }
}

impl error::Error for ParseError {
    fn description(&self) -> &str {
        match *self {
            ParseError::NoMatch => "line did not match",
            ParseError::Field { .. } => "field conversion failed",
            ParseError::Timestamp(_) => "bad timestamp",
        }
    }
}

/// A `Parser` digests one log format.
pub trait Parser {
    /// Consume one line, updating accumulated state.
    ///
    /// A line that is rejected leaves the state exactly as it was.
    fn parse_line(&mut self, line: &str) -> Result<(), ParseError>;

    /// Produce the metrics for everything seen since the last call and reset.
    ///
    /// `duration` is the length of the interval in seconds. The returned
    /// order is a deterministic function of the lines seen.
    fn get_state(&mut self, duration: f64) -> Vec<MetricValue>;
}

/// A registry entry for a parser.
#[derive(Clone, Copy)]
pub struct ParserKind {
    /// The name given on the command line.
    pub name: &'static str,
    /// One line description for `--help`.
    pub about: &'static str,
    /// Build the parser from its optional option string.
    pub build: fn(Option<&str>) -> Result<Box<dyn Parser>, ConfigError>,
}

impl fmt::Debug for ParserKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ParserKind").field("name", &self.name).finish()
    }
}

/// Every parser shipped with logster.
pub fn builtin_parsers() -> Vec<ParserKind> {
    vec![
        ParserKind {
            name: access_log::NAME,
            about: "request counts from an Apache/NCSA access log",
            build: AccessLog::build,
        },
        ParserKind {
            name: latency::NAME,
            about: "status classes and latency percentiles from an nginx log",
            build: Latency::build,
        },
    ]
}

/// Look a parser up by name and build it.
pub fn build(name: &str, options: Option<&str>) -> Result<Box<dyn Parser>, ConfigError> {
    match builtin_parsers().into_iter().find(|k| k.name == name) {
        Some(kind) => (kind.build)(options),
        None => Err(ConfigError::UnknownParser(name.to_string())),
    }
}

/// Parse a parser's option string against that parser's own grammar.
///
/// The option string is split on whitespace. An absent or blank string
/// yields the grammar's defaults.
pub fn parse_options<'a, 'b>(
    parser: &'static str,
    app: App<'a, 'b>,
    options: Option<&str>,
) -> Result<ArgMatches<'a>, ConfigError> {
    let tokens: Vec<&str> = options.map_or_else(Vec::new, |s| s.split_whitespace().collect());
    app.setting(AppSettings::NoBinaryName)
        .get_matches_from_safe(tokens)
        .map_err(|e| ConfigError::ParserOptions {
            parser: parser,
            reason: e.message,
        })
}

/// Feed lines to `parser`, logging and skipping any it rejects.
///
/// Returns the number of accepted and rejected lines.
pub fn feed<P, I, S>(parser: &mut P, lines: I) -> (usize, usize)
where
    P: Parser + ?Sized,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut accepted = 0;
    let mut rejected = 0;
    for line in lines {
        let line = line.as_ref();
        match parser.parse_line(line) {
            Ok(()) => accepted += 1,
            Err(e) => {
                rejected += 1;
                warn!("skipping line {:?}: {}", line.trim_end(), e);
            }
        }
    }
    (accepted, rejected)
}
