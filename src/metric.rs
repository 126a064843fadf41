//! `MetricValue` is the unit of exchange between parsers and outputs.
//!
//! A parser creates metrics only when asked for a snapshot. Outputs borrow the
//! snapshot for the length of one submission and never hold on to it.

use std::fmt;
use time;

/// How a backend should interpret a metric's value over time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetricType {
    /// The value is the measurement for its timestamp.
    Gauge,
    /// The value is a count to be summed by the backend.
    Counter,
}

impl MetricType {
    /// The single-letter code statsd uses for this type.
    pub fn statsd_code(&self) -> &'static str {
        match *self {
            MetricType::Gauge => "g",
            MetricType::Counter => "c",
        }
    }
}

/// The numeric type of a metric's value, as some backends want to know it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ValueType {
    /// A floating point value.
    Float,
    /// An integer value.
    Int,
}

impl ValueType {
    /// The type name `gmetric` accepts for this value type.
    pub fn gmetric_type(&self) -> &'static str {
        match *self {
            ValueType::Float => "float",
            ValueType::Int => "int32",
        }
    }
}

/// One named, timestamped measurement.
///
/// Fields are fixed at construction. The builder methods consume and return
/// the value so a metric is complete before anyone else can see it.
///
/// # Examples
///
/// ```
/// use logster::metric::{MetricType, MetricValue};
///
/// let m = MetricValue::new("requests.http_2xx", 12.0)
///     .with_timestamp(971211336000)
///     .with_units("Requests");
///
/// assert_eq!(m.name(), "requests.http_2xx");
/// assert_eq!(m.timestamp(), 971211336000);
/// assert_eq!(m.metric_type(), MetricType::Gauge);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct MetricValue {
    name: String,
    value: f64,
    timestamp: i64,
    metric_type: MetricType,
    value_type: ValueType,
    units: String,
}

impl MetricValue {
    /// Create a gauge with a float value, no units and the current time as
    /// its timestamp.
    pub fn new<S>(name: S, value: f64) -> MetricValue
    where
        S: Into<String>,
    {
        MetricValue {
            name: name.into(),
            value: value,
            timestamp: time::now_millis(),
            metric_type: MetricType::Gauge,
            value_type: ValueType::Float,
            units: String::new(),
        }
    }

    /// Set the timestamp, in unix milliseconds.
    pub fn with_timestamp(mut self, timestamp: i64) -> MetricValue {
        self.timestamp = timestamp;
        self
    }

    /// Set the metric type.
    pub fn with_metric_type(mut self, metric_type: MetricType) -> MetricValue {
        self.metric_type = metric_type;
        self
    }

    /// Set the value type.
    pub fn with_value_type(mut self, value_type: ValueType) -> MetricValue {
        self.value_type = value_type;
        self
    }

    /// Set the units label.
    pub fn with_units<S>(mut self, units: S) -> MetricValue
    where
        S: Into<String>,
    {
        self.units = units.into();
        self
    }

    /// The metric name, before any prefix or suffix.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The measured value.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Unix milliseconds.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Unix seconds, truncated.
    pub fn timestamp_secs(&self) -> i64 {
        self.timestamp / 1_000
    }

    /// Gauge or counter.
    pub fn metric_type(&self) -> MetricType {
        self.metric_type
    }

    /// Float or integer.
    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// The units label, empty if there is none.
    pub fn units(&self) -> &str {
        &self.units
    }

    /// The value as it goes over the wire. Integer metrics never carry a
    /// fractional part.
    pub fn fmt_value(&self) -> String {
        match self.value_type {
            ValueType::Int => format!("{}", self.value.trunc() as i64),
            ValueType::Float => format!("{}", self.value),
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} {}", self.name, self.fmt_value(), self.timestamp)
    }
}
