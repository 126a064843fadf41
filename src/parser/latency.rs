//! Status classes and request latency percentiles from an nginx access log.
//!
//! The log format must carry `$request_time` quoted right after the status:
//!
//! ```text
//! log_format timed '$remote_addr - $remote_user [$time_local] "$request" '
//!                  '$status "$request_time" "$http_user_agent"';
//! ```
//!
//! Every snapshot has exactly ten metrics, whether or not any line was seen.

use clap::App;
use config::ConfigError;
use metric::{MetricValue, ValueType};
use parser::{parse_options, ParseError, Parser};
use percentile::percentile;
use regex::Regex;
use std::mem;
use time;

/// Registry name.
pub const NAME: &str = "nginx-latency";

const LINE_PATTERN: &str =
    r#".*HTTP/1\.\d" (?P<http_status_code>\d{3}) "(?P<request_time>[\d\.]+)" .*"#;

const PERCENTILES: [(&str, f64); 4] = [
    ("latency.p50", 0.5),
    ("latency.p90", 0.9),
    ("latency.p99", 0.99),
    ("latency.p999", 0.999),
];

/// Index of `status` among the five classes 1xx..5xx. Everything from 500 up,
/// including codes no server should send, is 5xx.
pub fn status_class(status: u16) -> usize {
    if status < 200 {
        0
    } else if status < 300 {
        1
    } else if status < 400 {
        2
    } else if status < 500 {
        3
    } else {
        4
    }
}

#[derive(Debug, Default)]
struct State {
    classes: [u64; 5],
    max: u64,
    latencies: Vec<u64>,
}

/// Parser for the `nginx-latency` log format. Takes no options.
pub struct Latency {
    reg: Regex,
    state: State,
}

impl Latency {
    /// A parser with nothing seen yet.
    pub fn new() -> Latency {
        Latency {
            reg: Regex::new(LINE_PATTERN).unwrap(),
            state: State::default(),
        }
    }

    /// Build from an option string, as the parser registry does. Any option
    /// is an error.
    pub fn build(options: Option<&str>) -> Result<Box<dyn Parser>, ConfigError> {
        parse_options(NAME, App::new(NAME), options)?;
        Ok(Box::new(Latency::new()))
    }

    /// Requests seen so far in each class, 1xx first.
    pub fn class_counts(&self) -> [u64; 5] {
        self.state.classes
    }

    /// The slowest request so far, in milliseconds.
    pub fn max_latency(&self) -> u64 {
        self.state.max
    }

    /// Every latency recorded so far, in milliseconds.
    pub fn samples(&self) -> &[u64] {
        &self.state.latencies
    }
}

impl Default for Latency {
    fn default() -> Latency {
        Latency::new()
    }
}

impl Parser for Latency {
    fn parse_line(&mut self, line: &str) -> Result<(), ParseError> {
        let caps = match self.reg.captures(line) {
            Some(caps) => caps,
            None => return Err(ParseError::NoMatch),
        };

        let raw_status = &caps["http_status_code"];
        let status: u16 = raw_status.parse().map_err(|e| ParseError::Field {
            field: "http_status_code",
            value: raw_status.to_string(),
            reason: format!("{}", e),
        })?;
        let raw_time = &caps["request_time"];
        let seconds: f64 = raw_time.parse().map_err(|e| ParseError::Field {
            field: "request_time",
            value: raw_time.to_string(),
            reason: format!("{}", e),
        })?;
        let request_time = (seconds * 1000.0) as u64;

        self.state.classes[status_class(status)] += 1;
        if request_time > self.state.max {
            self.state.max = request_time;
        }
        self.state.latencies.push(request_time);
        Ok(())
    }

    fn get_state(&mut self, _duration: f64) -> Vec<MetricValue> {
        let mut state = mem::replace(&mut self.state, State::default());
        state.latencies.sort_unstable();
        let now = time::now_millis();

        let mut metrics = Vec::with_capacity(10);
        for (i, count) in state.classes.iter().enumerate() {
            metrics.push(
                MetricValue::new(format!("requests.http_{}xx", i + 1), *count as f64)
                    .with_timestamp(now)
                    .with_value_type(ValueType::Int)
                    .with_units("Requests"),
            );
        }
        for &(name, p) in &PERCENTILES {
            metrics.push(
                MetricValue::new(name, percentile(&state.latencies, p))
                    .with_timestamp(now)
                    .with_units("Milliseconds"),
            );
        }
        metrics.push(
            MetricValue::new("latency.max", state.max as f64)
                .with_timestamp(now)
                .with_units("Milliseconds"),
        );
        metrics
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use quickcheck::{QuickCheck, TestResult};

    fn line(status: u16, request_time: &str) -> String {
        format!(
            r#"10.0.0.1 - - [10/Oct/2000:13:55:36 -0700] "GET /index.html HTTP/1.1" {} "{}" "curl/7.58.0""#,
            status, request_time
        )
    }

    fn value_of(metrics: &[MetricValue], name: &str) -> f64 {
        metrics
            .iter()
            .find(|m| m.name() == name)
            .map(|m| m.value())
            .unwrap_or_else(|| panic!("no metric {}", name))
    }

    #[test]
    fn status_class_boundaries() {
        assert_eq!(status_class(100), 0);
        assert_eq!(status_class(199), 0);
        assert_eq!(status_class(200), 1);
        assert_eq!(status_class(299), 1);
        assert_eq!(status_class(300), 2);
        assert_eq!(status_class(399), 2);
        assert_eq!(status_class(400), 3);
        assert_eq!(status_class(499), 3);
        assert_eq!(status_class(500), 4);
        assert_eq!(status_class(599), 4);
        assert_eq!(status_class(999), 4);
        assert_eq!(status_class(0), 0);
    }

    #[test]
    fn empty_snapshot_has_ten_zeroes() {
        let mut p = Latency::new();
        let state = p.get_state(60.0);
        let names: Vec<&str> = state.iter().map(|m| m.name()).collect();
        assert_eq!(
            names,
            vec![
                "requests.http_1xx",
                "requests.http_2xx",
                "requests.http_3xx",
                "requests.http_4xx",
                "requests.http_5xx",
                "latency.p50",
                "latency.p90",
                "latency.p99",
                "latency.p999",
                "latency.max",
            ]
        );
        assert!(state.iter().all(|m| m.value() == 0.0));
    }

    #[test]
    fn request_time_is_truncated_milliseconds() {
        let mut p = Latency::new();
        assert!(p.parse_line(&line(200, "0.0129")).is_ok());
        assert!(p.parse_line(&line(200, "1.5")).is_ok());
        assert!(p.parse_line(&line(200, "2")).is_ok());
        assert_eq!(p.samples(), &[12, 1500, 2000]);
        assert_eq!(p.max_latency(), 2000);
    }

    #[test]
    fn snapshot_values() {
        let mut p = Latency::new();
        for (status, rt) in vec![
            (200, "0.001"),
            (201, "0.002"),
            (302, "0.003"),
            (404, "0.004"),
            (503, "0.005"),
        ] {
            assert!(p.parse_line(&line(status, rt)).is_ok());
        }
        let state = p.get_state(60.0);
        assert_eq!(state.len(), 10);
        assert_eq!(value_of(&state, "requests.http_1xx"), 0.0);
        assert_eq!(value_of(&state, "requests.http_2xx"), 2.0);
        assert_eq!(value_of(&state, "requests.http_3xx"), 1.0);
        assert_eq!(value_of(&state, "requests.http_4xx"), 1.0);
        assert_eq!(value_of(&state, "requests.http_5xx"), 1.0);
        assert_eq!(value_of(&state, "latency.p50"), 3.0);
        assert!((value_of(&state, "latency.p90") - 4.6).abs() < 1e-9);
        assert_eq!(value_of(&state, "latency.max"), 5.0);

        let ts = state[0].timestamp();
        assert!(state.iter().all(|m| m.timestamp() == ts));
        assert_eq!(state[0].units(), "Requests");
        assert_eq!(state[0].value_type(), ValueType::Int);
        assert_eq!(state[9].units(), "Milliseconds");
    }

    #[test]
    fn snapshot_sorts_out_of_order_samples() {
        let mut p = Latency::new();
        for rt in &["0.005", "0.001", "0.004", "0.002", "0.003"] {
            assert!(p.parse_line(&line(200, rt)).is_ok());
        }
        let state = p.get_state(60.0);
        assert_eq!(value_of(&state, "latency.p50"), 3.0);
    }

    #[test]
    fn snapshot_resets() {
        let mut p = Latency::new();
        assert!(p.parse_line(&line(500, "0.250")).is_ok());
        let first = p.get_state(60.0);
        assert_eq!(value_of(&first, "requests.http_5xx"), 1.0);
        assert_eq!(value_of(&first, "latency.max"), 250.0);

        let second = p.get_state(60.0);
        assert_eq!(second.len(), 10);
        assert!(second.iter().all(|m| m.value() == 0.0));
        assert!(p.samples().is_empty());
    }

    #[test]
    fn rejects_bad_lines() {
        let mut p = Latency::new();
        assert_eq!(p.parse_line("garbage"), Err(ParseError::NoMatch));
        assert_eq!(
            p.parse_line(r#""GET / HTTP/1.1" 200 0.1 "-""#),
            Err(ParseError::NoMatch)
        );
        match p.parse_line(&line(200, "1.2.3")) {
            Err(ParseError::Field { field, .. }) => assert_eq!(field, "request_time"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(p.class_counts(), [0; 5]);
        assert!(p.samples().is_empty());
    }

    #[test]
    fn classes_partition_requests() {
        fn inner(statuses: Vec<u16>) -> TestResult {
            let mut p = Latency::new();
            let mut expected = 0;
            for status in &statuses {
                let status = 100 + (status % 900);
                assert!(p.parse_line(&line(status, "0.010")).is_ok());
                expected += 1;
            }
            let counts = p.class_counts();
            assert_eq!(counts.iter().sum::<u64>(), expected);
            assert_eq!(p.samples().len() as u64, expected);

            let state = p.get_state(1.0);
            let total: f64 = state[0..5].iter().map(|m| m.value()).sum();
            assert_eq!(total, expected as f64);
            TestResult::passed()
        }
        QuickCheck::new()
            .tests(500)
            .max_tests(5000)
            .quickcheck(inner as fn(Vec<u16>) -> TestResult);
    }
}
