//! statsd over UDP, one datagram per metric.

use config::{ConfigError, Settings};
use metric::MetricValue;
use output::{parse_host_port, require, OptionSpec, Output, OutputContext, OutputError, OutputKind};
use std::io::{self, Write};
use std::net::UdpSocket;

/// Registry entry for `statsd`.
pub const KIND: OutputKind = OutputKind {
    shortname: "statsd",
    options: &[
        OptionSpec {
            name: "statsd-host",
            value_name: "HOST:PORT",
            help: "Hostname and port for statsd collector, e.g. statsd.example.com:8125",
        },
    ],
    build: Statsd::build,
};

/// Statsd gauges over UDP.
pub struct Statsd {
    host: String,
    port: u16,
    ctx: OutputContext,
}

impl Statsd {
    /// Send to `host:port`.
    pub fn new(host: &str, port: u16, ctx: OutputContext) -> Statsd {
        Statsd {
            host: host.to_string(),
            port: port,
            ctx: ctx,
        }
    }

    fn build(settings: &Settings, ctx: &OutputContext) -> Result<Box<dyn Output>, ConfigError> {
        let target = require(settings, KIND.shortname, "statsd-host")?;
        let (host, port) = parse_host_port("statsd-host", target)?;
        Ok(Box::new(Statsd::new(&host, port, ctx.clone())))
    }

    /// One `name:value|g` datagram payload.
    pub fn format(&self, metric: &MetricValue) -> String {
        format!(
            "{}:{}|{}",
            self.ctx.metric_name(metric),
            metric.fmt_value(),
            metric.metric_type().statsd_code()
        )
    }

    /// Send one datagram per metric, or under a dry run print each.
    pub fn submit_to<W: Write>(&self, metrics: &[MetricValue], echo: &mut W) -> Result<(), OutputError> {
        if self.ctx.dry_run {
            for m in metrics {
                writeln!(echo, "{}:{} {}", self.host, self.port, self.format(m))?;
            }
            return Ok(());
        }
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        for m in metrics {
            socket.send_to(self.format(m).as_bytes(), (self.host.as_str(), self.port))?;
        }
        Ok(())
    }
}

impl Output for Statsd {
    fn shortname(&self) -> &'static str {
        KIND.shortname
    }

    fn submit(&mut self, metrics: &[MetricValue]) -> Result<(), OutputError> {
        let stdout = io::stdout();
        let mut lock = stdout.lock();
        self.submit_to(metrics, &mut lock)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use metric::{MetricType, ValueType};

    #[test]
    fn format_by_metric_type() {
        let s = Statsd::new("localhost", 8125, OutputContext::default());
        let gauge = MetricValue::new("latency.p99", 12.0);
        assert_eq!(s.format(&gauge), "latency.p99:12|g");
        let counter = MetricValue::new("requests.http_2xx", 7.0)
            .with_metric_type(MetricType::Counter)
            .with_value_type(ValueType::Int);
        assert_eq!(s.format(&counter), "requests.http_2xx:7|c");
    }

    #[test]
    fn build_validates_host() {
        let mut s = Settings::new();
        match Statsd::build(&s, &OutputContext::default()) {
            Err(ConfigError::Missing { option, .. }) => assert_eq!(option, "statsd-host"),
            _ => panic!("expected Missing"),
        }
        s.insert("statsd-host", "statsd:port");
        assert!(Statsd::build(&s, &OutputContext::default()).is_err());
        s.insert("statsd-host", "statsd:8125");
        assert!(Statsd::build(&s, &OutputContext::default()).is_ok());
    }

    #[test]
    fn datagram_per_metric() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = server.local_addr().unwrap().port();
        let ctx = OutputContext {
            metric_suffix: Some("web01".to_string()),
            ..OutputContext::default()
        };
        let s = Statsd::new("127.0.0.1", port, ctx);
        s.submit_to(&[MetricValue::new("a", 1.0), MetricValue::new("b", 2.5)], &mut Vec::new())
            .unwrap();

        let mut buf = [0; 128];
        let (n, _) = server.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"a.web01:1|g");
        let (n, _) = server.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"b.web01:2.5|g");
    }

    #[test]
    fn dry_run_prints_target() {
        let ctx = OutputContext {
            dry_run: true,
            ..OutputContext::default()
        };
        let s = Statsd::new("127.0.0.1", 1, ctx);
        let mut buf = Vec::new();
        s.submit_to(&[MetricValue::new("a", 1.0)], &mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "127.0.0.1:1 a:1|g\n");
    }
}
