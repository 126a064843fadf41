//! Ganglia, by running `gmetric` once per metric.

use config::{ConfigError, Settings};
use metric::MetricValue;
use output::{run_command, shell_words, OptionSpec, Output, OutputContext, OutputError, OutputKind};
use std::io::{self, Write};

const DEFAULT_OPTIONS: &str = "-d 180 -c /etc/ganglia/gmond.conf";

/// Registry entry for `ganglia`.
pub const KIND: OutputKind = OutputKind {
    shortname: "ganglia",
    options: &[
        OptionSpec {
            name: "gmetric-options",
            value_name: "OPTIONS",
            help: "Options to pass to gmetric such as \"-d 180 -c /etc/ganglia/gmond.conf\" \
                   (default). These are passed directly to gmetric.",
        },
    ],
    build: Ganglia::build,
};

/// Runs `gmetric` once per metric.
pub struct Ganglia {
    program: String,
    options: Vec<String>,
    ctx: OutputContext,
}

impl Ganglia {
    /// Run gmetric with `options` split on whitespace before the metric arguments.
    pub fn new(options: &str, ctx: OutputContext) -> Ganglia {
        Ganglia {
            program: "gmetric".to_string(),
            options: options.split_whitespace().map(|s| s.to_string()).collect(),
            ctx: ctx,
        }
    }

    /// Run `program` instead of `gmetric`.
    pub fn with_program(mut self, program: &str) -> Ganglia {
        self.program = program.to_string();
        self
    }

    fn build(settings: &Settings, ctx: &OutputContext) -> Result<Box<dyn Output>, ConfigError> {
        let options = settings.get("gmetric-options").unwrap_or(DEFAULT_OPTIONS);
        Ok(Box::new(Ganglia::new(options, ctx.clone())))
    }

    /// Arguments for one `gmetric` invocation.
    pub fn args(&self, metric: &MetricValue) -> Vec<String> {
        let mut args = self.options.clone();
        args.push("--name".to_string());
        args.push(self.ctx.metric_name(metric));
        args.push("--value".to_string());
        args.push(metric.fmt_value());
        args.push("--type".to_string());
        args.push(metric.value_type().gmetric_type().to_string());
        args.push("--units".to_string());
        args.push(metric.units().to_string());
        args
    }

    /// Run gmetric for each metric, or under a dry run print each command line.
    pub fn submit_to<W: Write>(&self, metrics: &[MetricValue], echo: &mut W) -> Result<(), OutputError> {
        for m in metrics {
            let args = self.args(m);
            if self.ctx.dry_run {
                writeln!(echo, "{}", shell_words(&self.program, &args))?;
            } else {
                run_command(&self.program, &args, None)?;
            }
        }
        Ok(())
    }
}

impl Output for Ganglia {
    fn shortname(&self) -> &'static str {
        KIND.shortname
    }

    fn submit(&mut self, metrics: &[MetricValue]) -> Result<(), OutputError> {
        let stdout = io::stdout();
        let mut lock = stdout.lock();
        self.submit_to(metrics, &mut lock)
    }
}
