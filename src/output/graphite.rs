//! Graphite plaintext protocol over TCP or UDP.

use config::{ConfigError, Settings};
use metric::MetricValue;
use output::{connect, parse_host_port, require, OptionSpec, Output, OutputContext, OutputError,
             OutputKind};
use std::io::{self, Write};
use std::net::UdpSocket;

/// Registry entry for `graphite`.
pub const KIND: OutputKind = OutputKind {
    shortname: "graphite",
    options: &[
        OptionSpec {
            name: "graphite-host",
            value_name: "HOST:PORT",
            help: "Hostname and port for Graphite collector, e.g. graphite.example.com:2003",
        },
        OptionSpec {
            name: "graphite-protocol",
            value_name: "tcp|udp",
            help: "Specify graphite socket protocol. Default is tcp",
        },
    ],
    build: Graphite::build,
};

/// How graphite lines are carried.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GraphiteProtocol {
    /// One connection per submission.
    Tcp,
    /// One datagram per metric.
    Udp,
}

/// Graphite plaintext protocol.
pub struct Graphite {
    host: String,
    port: u16,
    protocol: GraphiteProtocol,
    ctx: OutputContext,
}

impl Graphite {
    /// Send to `host:port` over `protocol`.
    pub fn new(host: &str, port: u16, protocol: GraphiteProtocol, ctx: OutputContext) -> Graphite {
        Graphite {
            host: host.to_string(),
            port: port,
            protocol: protocol,
            ctx: ctx,
        }
    }

    fn build(settings: &Settings, ctx: &OutputContext) -> Result<Box<dyn Output>, ConfigError> {
        let target = require(settings, KIND.shortname, "graphite-host")?;
        let (host, port) = parse_host_port("graphite-host", target)?;
        let protocol = match settings.get("graphite-protocol") {
            None | Some("tcp") => GraphiteProtocol::Tcp,
            Some("udp") => GraphiteProtocol::Udp,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    option: "graphite-protocol".to_string(),
                    value: other.to_string(),
                    reason: "expected tcp or udp".to_string(),
                })
            }
        };
        Ok(Box::new(Graphite::new(&host, port, protocol, ctx.clone())))
    }

    /// One plaintext line, timestamp in unix seconds.
    pub fn format(&self, metric: &MetricValue) -> String {
        format!(
            "{} {} {}\n",
            self.ctx.metric_name(metric),
            metric.fmt_value(),
            metric.timestamp_secs()
        )
    }

    /// Send `metrics`, or under a dry run print `host:port line` for each.
    pub fn submit_to<W: Write>(&self, metrics: &[MetricValue], echo: &mut W) -> Result<(), OutputError> {
        if self.ctx.dry_run {
            for m in metrics {
                write!(echo, "{}:{} {}", self.host, self.port, self.format(m))?;
            }
            return Ok(());
        }
        match self.protocol {
            GraphiteProtocol::Tcp => {
                let mut payload = String::with_capacity(metrics.len() * 64);
                for m in metrics {
                    payload.push_str(&self.format(m));
                }
                let mut stream = connect(&self.host, self.port)?;
                stream.write_all(payload.as_bytes())?;
                stream.flush()?;
            }
            GraphiteProtocol::Udp => {
                let socket = UdpSocket::bind("0.0.0.0:0")?;
                for m in metrics {
                    socket.send_to(self.format(m).as_bytes(), (self.host.as_str(), self.port))?;
                }
            }
        }
        debug!(
            "sent {} metrics to graphite at {}:{}",
            metrics.len(),
            self.host,
            self.port
        );
        Ok(())
    }
}

impl Output for Graphite {
    fn shortname(&self) -> &'static str {
        KIND.shortname
    }

    fn submit(&mut self, metrics: &[MetricValue]) -> Result<(), OutputError> {
        let stdout = io::stdout();
        let mut lock = stdout.lock();
        self.submit_to(metrics, &mut lock)
    }
}
