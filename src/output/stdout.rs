//! Print each metric on its own line.

use config::{ConfigError, Settings};
use metric::MetricValue;
use output::{Output, OutputContext, OutputError, OutputKind};
use std::io::{self, Write};

/// Registry entry for `stdout`.
pub const KIND: OutputKind = OutputKind {
    shortname: "stdout",
    options: &[],
    build: Stdout::build,
};

/// Writes `<name> <value> <timestamp>` per metric to standard out. A dry run
/// prints the same thing.
pub struct Stdout {
    ctx: OutputContext,
}

impl Stdout {
    /// Print with the prefix and suffix from `ctx`.
    pub fn new(ctx: OutputContext) -> Stdout {
        Stdout { ctx: ctx }
    }

    fn build(_: &Settings, ctx: &OutputContext) -> Result<Box<dyn Output>, ConfigError> {
        Ok(Box::new(Stdout::new(ctx.clone())))
    }

    /// `name value timestamp`.
    pub fn format(&self, metric: &MetricValue) -> String {
        format!(
            "{} {} {}",
            self.ctx.metric_name(metric),
            metric.fmt_value(),
            metric.timestamp()
        )
    }

    /// Write one line per metric to `out`.
    pub fn submit_to<W: Write>(&self, metrics: &[MetricValue], out: &mut W) -> Result<(), OutputError> {
        for m in metrics {
            writeln!(out, "{}", self.format(m))?;
        }
        out.flush()?;
        Ok(())
    }
}

impl Output for Stdout {
    fn shortname(&self) -> &'static str {
        KIND.shortname
    }

    fn submit(&mut self, metrics: &[MetricValue]) -> Result<(), OutputError> {
        let stdout = io::stdout();
        let mut lock = stdout.lock();
        self.submit_to(metrics, &mut lock)
    }
}
