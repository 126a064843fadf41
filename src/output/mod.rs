//! Outputs ship a metric snapshot to a monitoring backend.
//!
//! Each output is registered under a unique short name in
//! `builtin_outputs`. The registry entry declares the output's command line
//! options and knows how to build the output from `config::Settings`. All
//! validation happens at build time: an output that builds successfully can
//! only fail at submission because of its transport.

use clap::{App, Arg};
use config::{ConfigError, Settings};
use metric::MetricValue;
use regex::Regex;
use std::error;
use std::fmt;
use std::io;
use std::io::Write;
use std::net::{TcpStream, ToSocketAddrs};
use std::process::{Command, Stdio};

mod cloudwatch;
mod ganglia;
mod graphite;
mod nsca;
mod statsd;
mod stdout;
mod wavefront;

pub use self::cloudwatch::CloudWatch;
pub use self::ganglia::Ganglia;
pub use self::graphite::{Graphite, GraphiteProtocol};
pub use self::nsca::Nsca;
pub use self::statsd::Statsd;
pub use self::stdout::Stdout;
pub use self::wavefront::Wavefront;

lazy_static! {
    static ref HOST_PORT: Regex = Regex::new(r"^[\w.\-]+:\d+$").unwrap();
}

/// Transport failures.
#[derive(Debug)]
pub enum OutputError {
    /// Connecting, writing or spawning failed.
    Io(io::Error),
    /// A helper program ran but reported failure.
    Command {
        /// The program that was run.
        program: String,
        /// Its exit status, as printed by the OS.
        status: String,
    },
    /// A payload could not be encoded.
    Encode(String),
    /// A remote API rejected the request.
    Service(String),
}

impl fmt::Display for OutputError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            OutputError::Io(ref e) => write!(f, "{}", e),
            OutputError::Command {
                ref program,
                ref status,
            } => write!(f, "{} failed: {}", program, status),
            OutputError::Encode(ref reason) => write!(f, "could not encode payload: {}", reason),
            OutputError::Service(ref reason) => write!(f, "request rejected: {}", reason),
        }
    }
}

impl error::Error for OutputError {
    fn description(&self) -> &str {
        match *self {
            OutputError::Io(_) => "transport failure",
            OutputError::Command { .. } => "helper program failed",
            OutputError::Encode(_) => "encoding failure",
            OutputError::Service(_) => "service failure",
        }
    }
}

impl From<io::Error> for OutputError {
    fn from(e: io::Error) -> OutputError {
        OutputError::Io(e)
    }
}

/// A configured backend.
pub trait Output {
    /// The registry short name of this output.
    fn shortname(&self) -> &'static str;

    /// Format and transmit every metric in `metrics`, or print what would be
    /// transmitted under a dry run.
    ///
    /// Any connection opened here is closed before returning, on success or
    /// failure.
    fn submit(&mut self, metrics: &[MetricValue]) -> Result<(), OutputError>;
}

/// State shared by every output in a run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OutputContext {
    /// Print instead of transmitting, and never open a connection.
    pub dry_run: bool,
    /// Prepended to every metric name, joined with a dot.
    pub metric_prefix: Option<String>,
    /// Appended to every metric name, joined with a dot.
    pub metric_suffix: Option<String>,
}

impl OutputContext {
    /// The name `metric` goes out under: `prefix.name.suffix`, absent parts
    /// omitted.
    ///
    /// # Examples
    ///
    /// ```
    /// use logster::metric::MetricValue;
    /// use logster::output::OutputContext;
    ///
    /// let m = MetricValue::new("latency.p50", 1.0);
    /// let mut ctx = OutputContext::default();
    /// assert_eq!(ctx.metric_name(&m), "latency.p50");
    ///
    /// ctx.metric_prefix = Some("web01".to_string());
    /// assert_eq!(ctx.metric_name(&m), "web01.latency.p50");
    /// ```
    pub fn metric_name(&self, metric: &MetricValue) -> String {
        let mut name = String::with_capacity(metric.name().len() + 32);
        if let Some(ref prefix) = self.metric_prefix {
            name.push_str(prefix);
            name.push('.');
        }
        name.push_str(metric.name());
        if let Some(ref suffix) = self.metric_suffix {
            name.push('.');
            name.push_str(suffix);
        }
        name
    }
}

/// A command line option an output understands.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OptionSpec {
    /// Long flag name, also the key in `config::Settings`.
    pub name: &'static str,
    /// Placeholder shown in `--help`.
    pub value_name: &'static str,
    /// Help text.
    pub help: &'static str,
}

/// A registry entry for an output.
#[derive(Clone, Copy)]
pub struct OutputKind {
    /// The name used to select this output.
    pub shortname: &'static str,
    /// Options this output reads from `Settings`.
    pub options: &'static [OptionSpec],
    /// Validate settings and build the output.
    pub build: fn(&Settings, &OutputContext) -> Result<Box<dyn Output>, ConfigError>,
}

impl fmt::Debug for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("OutputKind")
            .field("shortname", &self.shortname)
            .field("options", &self.options)
            .finish()
    }
}

impl OutputKind {
    /// Register this output's options with `app`. Declares flags only, no
    /// defaults: defaults are applied at build time so config file values are
    /// not shadowed.
    pub fn add_options<'a, 'b>(&self, app: App<'a, 'b>) -> App<'a, 'b> {
        let mut app = app;
        for opt in self.options {
            app = app.arg(
                Arg::with_name(opt.name)
                    .long(opt.name)
                    .value_name(opt.value_name)
                    .takes_value(true)
                    .allow_hyphen_values(true)
                    .help(opt.help),
            );
        }
        app
    }
}

/// Every output shipped with logster, in `--help` order.
pub fn builtin_outputs() -> Vec<OutputKind> {
    vec![
        stdout::KIND,
        graphite::KIND,
        ganglia::KIND,
        statsd::KIND,
        cloudwatch::KIND,
        nsca::KIND,
        wavefront::KIND,
    ]
}

/// The registry entry for `shortname`, if there is one.
pub fn lookup(shortname: &str) -> Option<OutputKind> {
    builtin_outputs()
        .into_iter()
        .find(|k| k.shortname == shortname)
}

/// Check that no two outputs share a short name or an option name.
pub fn check_registry(kinds: &[OutputKind]) -> Result<(), ConfigError> {
    for (i, a) in kinds.iter().enumerate() {
        for b in &kinds[i + 1..] {
            if a.shortname == b.shortname {
                return Err(ConfigError::DuplicateOutput(a.shortname));
            }
            for opt in a.options {
                if b.options.iter().any(|o| o.name == opt.name) {
                    return Err(ConfigError::DuplicateOutput(b.shortname));
                }
            }
        }
    }
    Ok(())
}

/// Build the named outputs, in order. The first configuration problem wins.
pub fn build(
    names: &[String],
    settings: &Settings,
    ctx: &OutputContext,
) -> Result<Vec<Box<dyn Output>>, ConfigError> {
    check_registry(&builtin_outputs())?;
    let mut outputs = Vec::with_capacity(names.len());
    for name in names {
        let kind = lookup(name).ok_or_else(|| ConfigError::UnknownOutput(name.clone()))?;
        outputs.push((kind.build)(settings, ctx)?);
    }
    Ok(outputs)
}

/// Fetch a required option.
pub fn require<'a>(
    settings: &'a Settings,
    output: &'static str,
    option: &'static str,
) -> Result<&'a str, ConfigError> {
    match settings.get(option) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfigError::Missing {
            output: output,
            option: option,
        }),
    }
}

/// Split and validate a `host:port` option value.
pub fn parse_host_port(option: &'static str, value: &str) -> Result<(String, u16), ConfigError> {
    let invalid = |reason: &str| ConfigError::Invalid {
        option: option.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    };
    if !HOST_PORT.is_match(value) {
        return Err(invalid("expected host:port"));
    }
    let idx = value.rfind(':').ok_or_else(|| invalid("expected host:port"))?;
    let port = value[idx + 1..]
        .parse::<u16>()
        .map_err(|_| invalid("port out of range"))?;
    Ok((value[..idx].to_string(), port))
}

/// Connect to the first address of `host` that accepts a connection.
pub fn connect(host: &str, port: u16) -> io::Result<TcpStream> {
    let mut last_err = None;
    for addr in (host, port).to_socket_addrs()? {
        match TcpStream::connect(addr) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                info!(
                    "Unable to connect to {} using addr {} with error {}",
                    host, addr, e
                );
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            format!("no addresses for {}:{}", host, port),
        )
    }))
}

/// Run `program` with `args`, optionally writing `input` to its stdin, and
/// wait for it. A non-zero exit is an error.
pub fn run_command(program: &str, args: &[String], input: Option<&[u8]>) -> Result<(), OutputError> {
    let mut cmd = Command::new(program);
    cmd.args(args).stdout(Stdio::null());
    if input.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    let mut child = cmd.spawn()?;
    if let Some(input) = input {
        if let Some(mut stdin) = child.stdin.take() {
            let written = stdin.write_all(input);
            drop(stdin);
            if let Err(e) = written {
                let _ = child.wait();
                return Err(OutputError::Io(e));
            }
        }
    }
    let status = child.wait()?;
    if status.success() {
        Ok(())
    } else {
        Err(OutputError::Command {
            program: program.to_string(),
            status: format!("{}", status),
        })
    }
}

/// A command line as it would be typed, for dry runs.
pub fn shell_words(program: &str, args: &[String]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        if arg.is_empty() || arg.contains(|c: char| c.is_whitespace() || c == '"' || c == '\'') {
            line.push('\'');
            line.push_str(&arg.replace("'", "'\\''"));
            line.push('\'');
        } else {
            line.push_str(arg);
        }
    }
    line
}
