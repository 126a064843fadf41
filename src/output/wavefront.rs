//! Wavefront proxy line protocol.
//!
//! Each metric is sent as
//!
//! ```text
//! "<name>" <value> <timestamp> source=<source>
//! ```
//!
//! with the whole snapshot written over a single TCP connection. The
//! connection is dropped before `submit` returns whether or not the write
//! succeeded. The proxy only accepts ASCII, so a line that is not is refused
//! before connecting.

use config::{ConfigError, Settings};
use metric::MetricValue;
use output::{connect, parse_host_port, require, OptionSpec, Output, OutputContext, OutputError,
             OutputKind};
use std::io::{self, Write};

/// Registry entry for `wavefront`.
pub const KIND: OutputKind = OutputKind {
    shortname: "wavefront",
    options: &[
        OptionSpec {
            name: "wavefront-proxy",
            value_name: "HOST:PORT",
            help: "Wavefront proxy, e.g. wavefront.example.com:2878",
        },
        OptionSpec {
            name: "wavefront-source",
            value_name: "SOURCE",
            help: "Source tag attached to every metric",
        },
    ],
    build: Wavefront::build,
};

/// Sends a snapshot to a wavefront proxy.
pub struct Wavefront {
    proxy: String,
    host: String,
    port: u16,
    source: String,
    ctx: OutputContext,
}

impl Wavefront {
    /// Build from `host:port` and a source, validating the proxy address.
    /// The source and any metric prefix or suffix must be ASCII.
    pub fn new(proxy: &str, source: &str, ctx: OutputContext) -> Result<Wavefront, ConfigError> {
        let (host, port) = parse_host_port("wavefront-proxy", proxy)?;
        ascii_only("wavefront-source", source)?;
        if let Some(ref prefix) = ctx.metric_prefix {
            ascii_only("metric-prefix", prefix)?;
        }
        if let Some(ref suffix) = ctx.metric_suffix {
            ascii_only("metric-suffix", suffix)?;
        }
        Ok(Wavefront {
            proxy: proxy.to_string(),
            host: host,
            port: port,
            source: source.to_string(),
            ctx: ctx,
        })
    }

    fn build(settings: &Settings, ctx: &OutputContext) -> Result<Box<dyn Output>, ConfigError> {
        let proxy = require(settings, KIND.shortname, "wavefront-proxy")?;
        let source = require(settings, KIND.shortname, "wavefront-source")?;
        Ok(Box::new(Wavefront::new(proxy, source, ctx.clone())?))
    }

    /// One proxy line, newline terminated.
    pub fn format(&self, metric: &MetricValue) -> String {
        format!(
            "\"{}\" {} {} source={}\n",
            self.ctx.metric_name(metric),
            metric.fmt_value(),
            metric.timestamp(),
            self.source
        )
    }

    /// Send `metrics`, or under a dry run print `proxy line` for each.
    pub fn submit_to<W: Write>(&self, metrics: &[MetricValue], echo: &mut W) -> Result<(), OutputError> {
        let mut stats = String::with_capacity(metrics.len() * 80);
        for m in metrics {
            let line = self.format(m);
            if !line.is_ascii() {
                return Err(OutputError::Encode(format!(
                    "non-ASCII wavefront line: {}",
                    line.trim_end()
                )));
            }
            stats.push_str(&line);
        }
        if self.ctx.dry_run {
            for line in stats.lines() {
                writeln!(echo, "{} {}", self.proxy, line)?;
            }
            return Ok(());
        }

        let mut stream = connect(&self.host, self.port)?;
        stream.write_all(stats.as_bytes())?;
        stream.flush()?;
        debug!("flushed {} points to wavefront", metrics.len());
        Ok(())
    }
}

fn ascii_only(option: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.is_ascii() {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            option: option.to_string(),
            value: value.to_string(),
            reason: "wavefront accepts ASCII only".to_string(),
        })
    }
}

impl Output for Wavefront {
    fn shortname(&self) -> &'static str {
        KIND.shortname
    }

    fn submit(&mut self, metrics: &[MetricValue]) -> Result<(), OutputError> {
        let stdout = io::stdout();
        let mut lock = stdout.lock();
        self.submit_to(metrics, &mut lock)
    }
}
