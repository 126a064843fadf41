//! Request counts from an Apache / NCSA style access log.
//!
//! Lines look like
//!
//! ```text
//! 127.0.0.1 - frank [10/Oct/2000:13:55:36 -0700] "GET /apache_pb.gif HTTP/1.0" 200 2326
//! ```
//!
//! Three families of counters are kept, each bucketed by the line's own
//! timestamp: all requests, requests by status code and requests by method
//! and path.

use buckets::{Buckets, KeyedBuckets};
use clap::{App, Arg};
use config::ConfigError;
use metric::MetricValue;
use parser::{parse_options, ParseError, Parser};
use regex::Regex;
use std::mem;
use time;

/// Registry name.
pub const NAME: &str = "apache-access";

const LINE_PATTERN: &str = r#"^(\S+)\s(\S+)\s(\S+)\s\[([0-9/:a-zA-Z +\-]+)\]\s"([A-Z]+) (.*)"\s(\d{3})\s(\d+|-)"#;

lazy_static! {
    static ref PROTOCOL: Regex = Regex::new(r" HTTP.*$").unwrap();
    static ref UNSAFE_PATH_CHARS: Regex = Regex::new(r"[^a-zA-Z0-9._\-]").unwrap();
}

/// Replace every character of `path` outside `[A-Za-z0-9._-]` with `_` and
/// join it to `method` with a dot.
///
/// # Examples
///
/// ```
/// use logster::parser::AccessLog;
///
/// assert_eq!(AccessLog::method_and_path("GET", "/foo bar/baz?x=1"),
///            "GET._foo_bar_baz_x_1");
/// ```
pub fn method_and_path(method: &str, path: &str) -> String {
    let sanitized = UNSAFE_PATH_CHARS.replace_all(path, "_");
    let mut key = String::with_capacity(method.len() + 1 + sanitized.len());
    key.push_str(method);
    key.push('.');
    key.push_str(&sanitized);
    key
}

#[derive(Debug, Default)]
struct Counts {
    requests: Buckets,
    by_status: KeyedBuckets,
    by_request: KeyedBuckets,
}

/// Parser for the `apache-access` log format.
///
/// Accepts the option `--start <time>` (`-S`): lines stamped before `<time>`
/// are ignored. See `time::parse_start_time` for the accepted formats.
pub struct AccessLog {
    reg: Regex,
    start_time: i64,
    counts: Counts,
}

impl AccessLog {
    /// Create a parser that accepts every line regardless of its timestamp.
    pub fn new() -> AccessLog {
        AccessLog::with_start_time(0)
    }

    /// Create a parser that skips lines stamped before `start_time`, in unix
    /// milliseconds.
    pub fn with_start_time(start_time: i64) -> AccessLog {
        AccessLog {
            reg: Regex::new(LINE_PATTERN).unwrap(),
            start_time: start_time,
            counts: Counts::default(),
        }
    }

    /// Build from an option string, as the parser registry does.
    pub fn build(options: Option<&str>) -> Result<Box<dyn Parser>, ConfigError> {
        let app = App::new(NAME).arg(
            Arg::with_name("start")
                .long("start")
                .short("S")
                .value_name("time")
                .takes_value(true)
                .default_value("0")
                .help("Time to start parsing"),
        );
        let matches = parse_options(NAME, app, options)?;
        let raw = matches.value_of("start").unwrap_or("0");
        let start_time = time::parse_start_time(raw).map_err(|e| ConfigError::Invalid {
            option: "start".to_string(),
            value: raw.to_string(),
            reason: e,
        })?;
        debug!("{} parser starting at {}", NAME, start_time);
        Ok(Box::new(AccessLog::with_start_time(start_time)))
    }

    /// Lines stamped before this time, in unix milliseconds, are skipped.
    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    /// See the module level `method_and_path`.
    pub fn method_and_path(method: &str, path: &str) -> String {
        method_and_path(method, path)
    }

    /// Requests counted in `bucket`.
    pub fn request_count(&self, bucket: i64) -> u64 {
        self.counts.requests.get(bucket)
    }

    /// Requests with `status` counted in `bucket`.
    pub fn status_count(&self, bucket: i64, status: &str) -> u64 {
        self.counts.by_status.get(bucket, status)
    }

    /// Requests for a sanitized `METHOD.path` counted in `bucket`.
    pub fn request_path_count(&self, bucket: i64, method_and_path: &str) -> u64 {
        self.counts.by_request.get(bucket, method_and_path)
    }
}

impl Default for AccessLog {
    fn default() -> AccessLog {
        AccessLog::new()
    }
}

impl Parser for AccessLog {
    fn parse_line(&mut self, line: &str) -> Result<(), ParseError> {
        trace!("processing access log line {}", line.trim());
        let caps = match self.reg.captures(line) {
            Some(caps) => caps,
            None => return Err(ParseError::NoMatch),
        };

        let ts = time::parse_clf_timestamp(&caps[4]).map_err(ParseError::Timestamp)?;
        if ts < self.start_time {
            return Ok(());
        }

        let path = PROTOCOL.replace(&caps[6], "");
        let key = method_and_path(&caps[5], &path);
        let status = &caps[7];

        self.counts.requests.incr(ts);
        self.counts.by_status.incr(ts, status);
        self.counts.by_request.incr(ts, &key);
        Ok(())
    }

    fn get_state(&mut self, _duration: f64) -> Vec<MetricValue> {
        let counts = mem::replace(&mut self.counts, Counts::default());

        let mut metrics = Vec::with_capacity(
            counts.requests.len() + counts.by_status.len() + counts.by_request.len(),
        );
        for (ts, count) in counts.requests {
            metrics.push(
                MetricValue::new("access.requests.count", count as f64).with_timestamp(ts),
            );
        }
        for (ts, status, count) in counts.by_status.iter() {
            metrics.push(
                MetricValue::new(format!("access.requests.status.{}", status), count as f64)
                    .with_timestamp(ts),
            );
        }
        for (ts, request, count) in counts.by_request.iter() {
            metrics.push(
                MetricValue::new(format!("access.requests.request.{}", request), count as f64)
                    .with_timestamp(ts),
            );
        }
        metrics
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use quickcheck::{QuickCheck, TestResult};

    const LINE: &str =
        r#"127.0.0.1 - frank [10/Oct/2000:13:55:36 -0700] "GET /apache_pb.gif HTTP/1.0" 200 2326"#;
    const TS: i64 = 971211336000;

    fn line(ts: &str, method: &str, path: &str, status: u16) -> String {
        format!(
            r#"10.0.0.1 - - [{}] "{} {} HTTP/1.1" {} 512"#,
            ts, method, path, status
        )
    }

    fn names(metrics: &[MetricValue]) -> Vec<String> {
        metrics.iter().map(|m| m.name().to_string()).collect()
    }

    #[test]
    fn single_line_snapshot() {
        let mut p = AccessLog::new();
        assert!(p.parse_line(LINE).is_ok());

        let state = p.get_state(60.0);
        assert_eq!(
            names(&state),
            vec![
                "access.requests.count",
                "access.requests.status.200",
                "access.requests.request.GET._apache_pb.gif",
            ]
        );
        for m in &state {
            assert_eq!(m.value(), 1.0);
            assert_eq!(m.timestamp(), TS);
        }
    }

    #[test]
    fn second_snapshot_is_empty() {
        let mut p = AccessLog::new();
        assert!(p.parse_line(LINE).is_ok());
        assert_eq!(p.get_state(60.0).len(), 3);
        assert!(p.get_state(60.0).is_empty());
        assert_eq!(p.request_count(TS), 0);
    }

    #[test]
    fn dash_byte_count_is_accepted() {
        let mut p = AccessLog::new();
        let l = r#"::1 - - [10/Oct/2000:13:55:36 -0700] "HEAD / HTTP/1.1" 304 -"#;
        assert!(p.parse_line(l).is_ok());
        assert_eq!(p.status_count(TS, "304"), 1);
        assert_eq!(p.request_path_count(TS, "HEAD._"), 1);
    }

    #[test]
    fn combined_log_format_is_accepted() {
        let mut p = AccessLog::new();
        let l = r#"10.1.1.1 - - [10/Oct/2000:13:55:36 -0700] "POST /login HTTP/1.1" 302 0 "http://example.com/" "Mozilla/5.0 (X11)""#;
        assert!(p.parse_line(l).is_ok());
        assert_eq!(p.status_count(TS, "302"), 1);
        assert_eq!(p.request_path_count(TS, "POST._login"), 1);
    }

    #[test]
    fn malformed_lines_leave_state_alone() {
        let mut p = AccessLog::new();
        assert!(p.parse_line(LINE).is_ok());
        assert_eq!(p.parse_line("not a log line"), Err(ParseError::NoMatch));
        match p.parse_line(&line("10/Oct/2000:13:55:36 0700", "GET", "/", 200)) {
            Err(ParseError::NoMatch) | Err(ParseError::Timestamp(_)) => {}
            other => panic!("unexpected {:?}", other),
        }
        match p.parse_line(&line("99/Oct/2000:13:55:36 -0700", "GET", "/", 200)) {
            Err(ParseError::Timestamp(_)) => {}
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(p.get_state(60.0).len(), 3);
    }

    #[test]
    fn start_time_skips_earlier_lines() {
        let mut p = AccessLog::build(Some("--start 2000-10-10T20:55:37Z")).unwrap();
        assert!(p.parse_line(LINE).is_ok());
        assert!(p.get_state(60.0).is_empty());

        let mut p = AccessLog::build(Some("-S 2000-10-10T20:55:36Z")).unwrap();
        assert!(p.parse_line(LINE).is_ok());
        assert_eq!(p.get_state(60.0).len(), 3);
    }

    #[test]
    fn start_time_option_is_validated() {
        assert!(AccessLog::build(Some("--start tomorrow")).is_err());
        assert!(AccessLog::build(Some("--start")).is_err());
        assert!(AccessLog::build(None).is_ok());
    }

    #[test]
    fn sanitizes_path() {
        assert_eq!(method_and_path("GET", "/foo bar/baz?x=1"), "GET._foo_bar_baz_x_1");
        assert_eq!(method_and_path("PUT", "a-b_c.d"), "PUT.a-b_c.d");
        let mut p = AccessLog::new();
        let l = line("10/Oct/2000:13:55:36 -0700", "GET", "/foo bar/baz?x=1", 200);
        assert!(p.parse_line(&l).is_ok());
        assert_eq!(p.request_path_count(TS, "GET._foo_bar_baz_x_1"), 1);
    }

    #[test]
    fn snapshot_order_is_deterministic() {
        let lines = vec![
            line("10/Oct/2000:13:55:37 -0700", "GET", "/b", 500),
            line("10/Oct/2000:13:55:36 -0700", "POST", "/a", 404),
            line("10/Oct/2000:13:55:36 -0700", "GET", "/a", 200),
            line("10/Oct/2000:13:55:37 -0700", "GET", "/b", 200),
        ];
        let mut p = AccessLog::new();
        for l in &lines {
            assert!(p.parse_line(l).is_ok());
        }
        let state = p.get_state(60.0);
        let got: Vec<(String, i64, f64)> = state
            .iter()
            .map(|m| (m.name().to_string(), m.timestamp(), m.value()))
            .collect();
        let t0 = TS;
        let t1 = TS + 1_000;
        assert_eq!(
            got,
            vec![
                ("access.requests.count".to_string(), t0, 2.0),
                ("access.requests.count".to_string(), t1, 2.0),
                ("access.requests.status.200".to_string(), t0, 1.0),
                ("access.requests.status.404".to_string(), t0, 1.0),
                ("access.requests.status.200".to_string(), t1, 1.0),
                ("access.requests.status.500".to_string(), t1, 1.0),
                ("access.requests.request.GET._a".to_string(), t0, 1.0),
                ("access.requests.request.POST._a".to_string(), t0, 1.0),
                ("access.requests.request.GET._b".to_string(), t1, 2.0),
            ]
        );
    }

    #[test]
    fn each_line_bumps_exactly_its_buckets() {
        fn inner(seconds: u8, status: u16, path_idx: u8) -> TestResult {
            let status = 100 + (status % 500);
            let paths = ["/", "/a", "/a/b", "/x y"];
            let path = paths[path_idx as usize % paths.len()];
            let stamp = format!("10/Oct/2000:13:55:{:02} -0700", seconds % 60);
            let ts = TS - 36_000 + i64::from(seconds % 60) * 1_000;
            let key = method_and_path("GET", path);

            let mut p = AccessLog::new();
            // background traffic in another bucket
            assert!(p.parse_line(&line("11/Oct/2000:13:55:36 -0700", "GET", "/", 200)).is_ok());
            let other = TS + 86_400_000;

            assert!(p.parse_line(&line(&stamp, "GET", path, status)).is_ok());

            assert_eq!(p.request_count(ts), 1);
            assert_eq!(p.status_count(ts, &status.to_string()), 1);
            assert_eq!(p.request_path_count(ts, &key), 1);
            assert_eq!(p.request_count(other), 1);
            assert_eq!(p.status_count(other, "200"), 1);
            assert_eq!(p.request_path_count(other, "GET._"), 1);
            assert_eq!(p.get_state(1.0).len(), 6);
            TestResult::passed()
        }
        QuickCheck::new()
            .tests(500)
            .max_tests(5000)
            .quickcheck(inner as fn(u8, u16, u8) -> TestResult);
    }
}
